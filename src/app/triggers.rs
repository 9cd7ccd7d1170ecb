//! Automation hooks.
//!
//! Each event kind owns an ordered list of handlers. Handlers run
//! synchronously, in registration order, from inside the service call
//! that produced the event.

use super::events::{EventKind, PinpadEvent};
use super::ports::EventSink;

pub type Handler = Box<dyn FnMut(&PinpadEvent)>;

#[derive(Default)]
pub struct Triggers {
    handlers: [Vec<Handler>; EventKind::COUNT],
}

impl Triggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw handler for `kind`.
    pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&PinpadEvent) + 'static) -> &mut Self {
        self.handlers[kind.index()].push(Box::new(handler));
        self
    }

    /// `on_pinpad_accepted(user, cmd)`
    pub fn on_accepted(&mut self, mut f: impl FnMut(&str, &str) + 'static) -> &mut Self {
        self.on(EventKind::Accepted, move |event| {
            if let PinpadEvent::Accepted { user, command } = event {
                f(user.as_str(), command.as_str());
            }
        })
    }

    /// `on_pinpad_rejected(user, cmd)`
    pub fn on_rejected(&mut self, mut f: impl FnMut(&str, &str) + 'static) -> &mut Self {
        self.on(EventKind::Rejected, move |event| {
            if let PinpadEvent::Rejected { user, command } = event {
                f(user.as_str(), command.as_str());
            }
        })
    }

    /// `on_user_selected(user)`
    pub fn on_user_selected(&mut self, mut f: impl FnMut(&str) + 'static) -> &mut Self {
        self.on(EventKind::UserSelected, move |event| {
            if let PinpadEvent::UserSelected { user } = event {
                f(user.as_str());
            }
        })
    }

    /// `on_user_command_received(cmd)`
    pub fn on_user_command(&mut self, mut f: impl FnMut(&str) + 'static) -> &mut Self {
        self.on(EventKind::UserCommand, move |event| {
            if let PinpadEvent::UserCommand { command, .. } = event {
                f(command.as_str());
            }
        })
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers[kind.index()].len()
    }
}

impl EventSink for Triggers {
    fn emit(&mut self, event: &PinpadEvent) {
        for handler in &mut self.handlers[event.kind().index()] {
            handler(event);
        }
    }
}
