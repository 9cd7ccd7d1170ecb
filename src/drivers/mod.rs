//! Output drivers and loop timing.

pub mod status_indicator;
pub mod tick_timer;
pub mod watchdog;
