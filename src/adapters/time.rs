//! ESP32 time adapter.
//!
//! Implements [`Clock`] for the pinpad.
//!
//! - **`target_os = "espidf"`**: monotonic time from `esp_timer_get_time()`,
//!   wall-clock time from `gettimeofday()` once a client has set it
//!   through the time characteristic (`settimeofday()`).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and
//!   `SystemTime` for host-side testing and simulation. A set time
//!   overrides `SystemTime` and then runs on the monotonic clock.

use crate::app::ports::Clock;

/// Wall-clock readings before 2020-01-01 mean the RTC was never set.
const EPOCH_2020: u64 = 1_577_836_800;

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    wall: Option<(u64, std::time::Instant)>,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            wall: None,
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    #[cfg(target_os = "espidf")]
    fn raw_unix_secs(&self) -> Option<u64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        u64::try_from(tv.tv_sec).ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn raw_unix_secs(&self) -> Option<u64> {
        if let Some((secs, at)) = self.wall {
            return Some(secs.saturating_add(at.elapsed().as_secs()));
        }
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    }

    #[cfg(target_os = "espidf")]
    fn write_unix_secs(&mut self, secs: u64) -> bool {
        let Ok(tv_sec) = secs.try_into() else {
            return false;
        };
        let tv = esp_idf_svc::sys::timeval { tv_sec, tv_usec: 0 };
        let rc = unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) };
        if rc != 0 {
            log::warn!("time: settimeofday failed (rc={})", rc);
            return false;
        }
        true
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_unix_secs(&mut self, secs: u64) -> bool {
        self.wall = Some((secs, std::time::Instant::now()));
        true
    }
}

impl Clock for Esp32TimeAdapter {
    fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }

    fn unix_time_secs(&self) -> Option<u64> {
        self.raw_unix_secs().filter(|&secs| secs >= EPOCH_2020)
    }

    fn set_unix_time_secs(&mut self, secs: u64) -> bool {
        if secs < EPOCH_2020 {
            return false;
        }
        self.write_unix_secs(secs)
    }
}
