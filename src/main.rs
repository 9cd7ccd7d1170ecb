//! BLE pinpad firmware: main entry point.
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleAdapter    NvsAdapter        Esp32TimeAdapter  LogEventSink│
//! │  (BlePort)     (Config+Counter)  (Clock)           (EventSink) │
//! │  BinaryStatusIndicator (StatusIndicator)   Triggers (EventSink)│
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            PinpadService (pure logic)                  │    │
//! │  │  parse · throttle · validate · session · advertising   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{anyhow, Result};
use log::{info, warn};

use blepinpad::adapters::ble::{self, BleAdapter, BleInbound};
use blepinpad::adapters::log_sink::LogEventSink;
use blepinpad::adapters::nvs::NvsAdapter;
use blepinpad::adapters::time::Esp32TimeAdapter;
use blepinpad::app::ports::{ConfigPort, StatusIndicator};
use blepinpad::app::service::PinpadService;
use blepinpad::app::triggers::Triggers;
use blepinpad::config::PinpadConfig;
use blepinpad::drivers::status_indicator::{BinaryStatusIndicator, NullIndicator};
use blepinpad::drivers::{tick_timer, watchdog::Watchdog};
use blepinpad::events::{self, Event};
use blepinpad::pins;

const DEVICE_NAME: &str = "blepinpad";

fn load_config(nvs: &NvsAdapter) -> Result<PinpadConfig> {
    match nvs.load() {
        Ok(Some(cfg)) => {
            info!("Config loaded from NVS");
            return Ok(cfg);
        }
        Ok(None) => info!("No stored config, using compiled-in pinpad.json"),
        Err(e) => warn!("NVS config load failed ({}), using compiled-in pinpad.json", e),
    }
    let cfg: PinpadConfig = serde_json::from_str(include_str!("../pinpad.json"))
        .map_err(|e| anyhow!("pinpad.json: {}", e))?;
    Ok(cfg)
}

fn build_indicator(config: &PinpadConfig) -> Result<Box<dyn StatusIndicator>> {
    use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};

    if !config.status_indicator {
        return Ok(Box::new(NullIndicator));
    }
    // SAFETY: the indicator GPIO is claimed by nothing else on this board.
    let pin = unsafe { AnyOutputPin::new(pins::STATUS_INDICATOR_GPIO) };
    let driver = PinDriver::output(pin)?;
    info!("indicator: GPIO{}", pins::STATUS_INDICATOR_GPIO);
    Ok(Box::new(BinaryStatusIndicator::new(
        driver,
        config.validation_hold_ms,
    )))
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BlePinpad v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let mut watchdog = Watchdog::new();

    // ── 2. Storage + config ───────────────────────────────────
    // The HOTP counter must persist, so no NVS means no service.
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = load_config(&nvs)?;

    // ── 3. Adapters ───────────────────────────────────────────
    let indicator = build_indicator(&config)?;
    let mut name = heapless::String::<24>::new();
    name.push_str(DEVICE_NAME)
        .map_err(|()| anyhow!("device name too long"))?;
    let mut radio = BleAdapter::new(name);
    radio.init().map_err(|e| anyhow!("BLE: {}", e))?;
    let clock = Esp32TimeAdapter::new();

    // ── 4. Service ────────────────────────────────────────────
    let mut pinpad = PinpadService::new(config, radio, nvs, indicator, clock)
        .map_err(|e| anyhow!("pinpad config rejected: {}", e))?;
    pinpad.dump_config();
    pinpad.setup();

    let mut triggers = Triggers::new();
    triggers
        .on_accepted(|user, cmd| info!("trigger: accepted user='{}' cmd='{}'", user, cmd))
        .on_rejected(|user, _| info!("trigger: rejected user='{}'", user));
    let mut sinks = (LogEventSink::new(), triggers);

    tick_timer::start();
    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    loop {
        // The inbound queue is polled every pass; its wake-up can be lost.
        ble::drain_inbound(|inbound| match inbound {
            BleInbound::Connected(conn) => pinpad.on_connect(conn),
            BleInbound::Disconnected(conn) => pinpad.on_disconnect(conn),
            BleInbound::Write {
                conn,
                characteristic,
                data,
            } => pinpad.on_write(conn, characteristic, &data, &mut sinks),
        });
        events::drain_events(|event| match event {
            Event::BleInbound => {}
            Event::ControlTick => pinpad.tick(),
        });

        watchdog.feed();

        // Yield to the Bluedroid and timer tasks until the next event.
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(10);
    }
}
