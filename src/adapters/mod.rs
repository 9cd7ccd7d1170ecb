//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements              | Connects to              |
//! |------------|-------------------------|--------------------------|
//! | `ble`      | BlePort                 | Bluedroid GATT server    |
//! | `log_sink` | EventSink               | Serial log output        |
//! | `nvs`      | ConfigPort, CounterStore| NVS / in-memory store    |
//! |            | StoragePort             |                          |
//! | `time`     | Clock                   | ESP32 system timer, RTC  |

pub mod ble;
pub mod log_sink;
pub mod nvs;
pub mod time;
