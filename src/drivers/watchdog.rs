//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the pinpad loop stops feeding it.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Loop stall tolerated before reset.
pub const WATCHDOG_TIMEOUT_MS: u32 = 10_000;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: u64,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Subscribe the calling task to the TWDT.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms: WATCHDOG_TIMEOUT_MS,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK as esp_err_t {
                log::warn!("watchdog: reconfigure returned {} (may already be configured)", ret);
            }
            let subscribed = esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK as esp_err_t;
            if subscribed {
                log::info!("watchdog: subscribed ({} ms, panic on trigger)", WATCHDOG_TIMEOUT_MS);
            } else {
                log::warn!("watchdog: subscribe failed, running unguarded");
            }
            Self { subscribed }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        log::info!("watchdog(sim): no-op");
        Self { feeds: 0 }
    }

    /// Must be called at least every [`WATCHDOG_TIMEOUT_MS`].
    #[cfg(target_os = "espidf")]
    pub fn feed(&mut self) {
        if self.subscribed {
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn feed(&mut self) {
        self.feeds += 1;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn feeds(&self) -> u64 {
        self.feeds
    }
}
