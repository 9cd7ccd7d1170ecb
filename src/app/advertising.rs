//! BLE discoverability policy.
//!
//! Tracks two flags: whether the application *wants* the device
//! discoverable and whether the radio currently *is* advertising. Bluedroid
//! halts advertising when a central connects, so the service reports
//! connect/disconnect here and re-syncs the radio with the desired state.
//!
//! Advertising and connection state are independent: [`stop`] never
//! drops a connected client.
//!
//! [`stop`]: AdvertisingController::stop

use log::info;

use super::ports::BlePort;

#[derive(Debug, Default)]
pub struct AdvertisingController {
    desired: bool,
    active: bool,
}

impl AdvertisingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the configured boot policy. Stop runs after start, so both
    /// flags set means "service registered, not discoverable".
    pub fn apply_boot_policy(&mut self, start: bool, stop: bool, ble: &mut impl BlePort) {
        if start {
            self.start(ble);
        }
        if stop {
            self.stop(ble);
        }
    }

    /// Make the device discoverable. No-op when already advertising.
    pub fn start(&mut self, ble: &mut impl BlePort) {
        self.desired = true;
        self.sync(ble);
    }

    /// Make the device non-discoverable. No-op when already stopped.
    pub fn stop(&mut self, ble: &mut impl BlePort) {
        self.desired = false;
        self.sync(ble);
    }

    /// The stack stopped advertising because a central connected.
    pub fn on_connect(&mut self) {
        self.active = false;
    }

    /// Bring the radio in line with the desired state.
    pub fn sync(&mut self, ble: &mut impl BlePort) {
        match (self.desired, self.active) {
            (true, false) => {
                ble.start_advertising();
                self.active = true;
                info!("BLE: advertising started");
            }
            (false, true) => {
                ble.stop_advertising();
                self.active = false;
                info!("BLE: advertising stopped");
            }
            _ => {}
        }
    }

    pub fn is_advertising(&self) -> bool {
        self.active
    }

    pub fn is_desired(&self) -> bool {
        self.desired
    }
}
