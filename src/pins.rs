//! GPIO assignments for the pinpad board.
//!
//! Single source of truth: drivers reference this module rather than
//! hard-coding pin numbers.

/// Status indicator output (relay, LED or buzzer), active HIGH.
/// Only driven when `status_indicator` is enabled in the config.
pub const STATUS_INDICATOR_GPIO: i32 = 2;
