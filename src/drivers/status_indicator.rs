//! Binary status output pulsed on validation outcomes.
//!
//! | Signal   | Pattern during the hold time             |
//! |----------|------------------------------------------|
//! | Accepted | solid on                                 |
//! | Rejected | blink, 100 ms period (50 ms on/off)      |
//!
//! The output returns to off when the hold time elapses. Pattern timing
//! advances from `update()`, so accuracy is bounded by the tick period.
//!
//! ## Dual-target design
//!
//! Generic over any `embedded_hal::digital::OutputPin`: an ESP-IDF
//! `PinDriver` on target and a recording mock on host.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::{IndicatorSignal, StatusIndicator};

pub const BLINK_PERIOD_MS: u64 = 100;

pub struct BinaryStatusIndicator<P> {
    pin: P,
    hold_ms: u64,
    active: Option<(IndicatorSignal, u64)>,
    level: bool,
}

impl<P: OutputPin> BinaryStatusIndicator<P> {
    pub fn new(mut pin: P, hold_ms: u32) -> Self {
        if let Err(e) = pin.set_low() {
            warn!("indicator: initial set_low failed: {:?}", e);
        }
        Self {
            pin,
            hold_ms: u64::from(hold_ms),
            active: None,
            level: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.level
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    fn drive(&mut self, now_ms: u64) {
        let on = match self.active {
            None => false,
            Some((signal, since)) => {
                let elapsed = now_ms.saturating_sub(since);
                if elapsed >= self.hold_ms {
                    self.active = None;
                    false
                } else {
                    match signal {
                        IndicatorSignal::Accepted => true,
                        IndicatorSignal::Rejected => elapsed % BLINK_PERIOD_MS < BLINK_PERIOD_MS / 2,
                    }
                }
            }
        };
        if on == self.level {
            return;
        }
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.level = on,
            Err(e) => warn!("indicator: pin write failed: {:?}", e),
        }
    }
}

impl<P: OutputPin> StatusIndicator for BinaryStatusIndicator<P> {
    fn signal(&mut self, signal: IndicatorSignal, now_ms: u64) {
        self.active = Some((signal, now_ms));
        self.drive(now_ms);
    }

    fn update(&mut self, now_ms: u64) {
        self.drive(now_ms);
    }
}

/// Used when no indicator output is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn signal(&mut self, _signal: IndicatorSignal, _now_ms: u64) {}
    fn update(&mut self, _now_ms: u64) {}
}
