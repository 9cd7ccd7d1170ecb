//! Periodic service tick via ESP-IDF's esp_timer API.
//!
//! The callback runs in the ESP timer task context (not ISR) and only
//! pushes [`Event::ControlTick`](crate::events::Event::ControlTick); the
//! main loop does the work. On simulation targets the main loop sleeps
//! instead.

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Tick period. Half the indicator blink period, so the rejected pattern
/// is rendered at full resolution.
pub const TICK_PERIOD_MS: u64 = 50;

#[cfg(target_os = "espidf")]
static mut TICK_TIMER: esp_timer_handle_t = core::ptr::null_mut();

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::ControlTick);
}

/// Start the periodic tick timer.
#[cfg(target_os = "espidf")]
pub fn start() {
    // SAFETY: TICK_TIMER is written once here at boot from the main task,
    // before the callback can fire.
    unsafe {
        let args = esp_timer_create_args_t {
            callback: Some(tick_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"pinpad_tick\0".as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let ret = esp_timer_create(&args, &raw mut TICK_TIMER);
        if ret != ESP_OK as esp_err_t {
            log::error!("tick_timer: create failed (rc={}), service will not tick", ret);
            return;
        }
        let ret = esp_timer_start_periodic(TICK_TIMER, TICK_PERIOD_MS * 1_000);
        if ret != ESP_OK as esp_err_t {
            log::error!("tick_timer: start failed (rc={})", ret);
            return;
        }
        log::info!("tick_timer: started ({} ms)", TICK_PERIOD_MS);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn start() {
    log::info!("tick_timer(sim): not started (ticks driven by sleep loop)");
}
