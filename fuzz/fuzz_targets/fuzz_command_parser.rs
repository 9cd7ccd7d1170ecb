//! Fuzz target: characteristic write parser.
//!
//! Feeds arbitrary bytes to every parser entry point. Any panic (slice
//! out of range, capacity overflow, invalid UTF-8 handling) is a bug.
//! Successful rpc parses must survive an encode/parse round trip.

#![no_main]

use blepinpad::app::commands::{self, MAX_INPUT_CAP};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = commands::parse_user_id(data, MAX_INPUT_CAP);
    let _ = commands::parse_free_command(data, MAX_INPUT_CAP);
    let _ = commands::is_submit_shaped(data);

    if let Ok(cmd) = commands::parse(data, MAX_INPUT_CAP) {
        let encoded = cmd.encode();
        if encoded.len() <= MAX_INPUT_CAP {
            assert_eq!(commands::parse(encoded.as_bytes(), MAX_INPUT_CAP), Ok(cmd));
        }
    }
});
