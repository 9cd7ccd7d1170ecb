//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing pinpad events to the ESP-IDF logger
//! (which goes to UART / USB-CDC in production). Events never carry the
//! submitted code, so nothing secret can reach the console from here.

use log::info;

use crate::app::events::PinpadEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`PinpadEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged since boot.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &PinpadEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        let kind = event.kind().as_str();
        match event {
            PinpadEvent::Accepted { user, command } | PinpadEvent::Rejected { user, command } => {
                info!("EVENT | {} | user='{}' cmd='{}'", kind, user, command);
            }
            PinpadEvent::UserSelected { user } => {
                info!("EVENT | {} | user='{}'", kind, user);
            }
            PinpadEvent::UserCommand { user, command } => {
                info!("EVENT | {} | user='{}' cmd='{}'", kind, user, command);
            }
        }
    }
}
