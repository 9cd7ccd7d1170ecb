//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - Bluedroid GATTS callbacks (connect, disconnect, characteristic write)
//! - The main loop's control timer
//!
//! Events are consumed by the main loop, which processes them one at a
//! time in FIFO order. BLE payloads (connection handle, written bytes)
//! travel separately through [`adapters::ble`](crate::adapters::ble);
//! this queue only carries the wake-up.
//!
//! The ring has one head index and two producer tasks, so two pushes that
//! race can land in the same slot and one event is lost. Consumers must
//! treat every event as a hint: the main loop drains the BLE inbound queue
//! on every pass, and a lost tick is made up by the next period.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GATTS cb    │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Timer       │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// At least one BLE callback is waiting in the inbound queue.
    BleInbound = 0,
    /// Service tick (indicator pattern, status hold, session timeout).
    ControlTick = 1,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// The Bluedroid task and the timer task write (produce), the main loop
// reads (consume). Uses atomic head/tail indices.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_BUFFER: [AtomicU8; EVENT_QUEUE_CAP] = [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false;
    }

    EVENT_BUFFER[head as usize].store(event as u8, Ordering::Relaxed);
    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None;
    }

    let raw = EVENT_BUFFER[tail as usize].load(Ordering::Relaxed);
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback, FIFO.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::BleInbound),
        1 => Some(Event::ControlTick),
        _ => None,
    }
}
