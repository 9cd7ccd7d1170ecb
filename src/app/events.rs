//! Outbound pinpad events.
//!
//! The [`PinpadService`](super::service::PinpadService) emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them: log to serial, fire automation
//! triggers, forward to another task.
//!
//! No variant carries the submitted code.

use super::commands::{CommandText, UserName};

/// Structured events emitted by the pinpad core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinpadEvent {
    /// A submitted code was accepted. `command` is the pending free
    /// command of the session, empty if none was sent.
    Accepted { user: UserName, command: CommandText },

    /// A submitted code (or submit-shaped garbage) was rejected.
    Rejected { user: UserName, command: CommandText },

    /// The client selected a user.
    UserSelected { user: UserName },

    /// The client sent a free command. No validation involved.
    UserCommand { user: UserName, command: CommandText },
}

impl PinpadEvent {
    /// Stable name used for log lines and trigger lookup.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Accepted { .. } => EventKind::Accepted,
            Self::Rejected { .. } => EventKind::Rejected,
            Self::UserSelected { .. } => EventKind::UserSelected,
            Self::UserCommand { .. } => EventKind::UserCommand,
        }
    }

    pub fn user(&self) -> &str {
        match self {
            Self::Accepted { user, .. }
            | Self::Rejected { user, .. }
            | Self::UserSelected { user }
            | Self::UserCommand { user, .. } => user.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Accepted,
    Rejected,
    UserSelected,
    UserCommand,
}

impl EventKind {
    pub(crate) const COUNT: usize = 4;

    pub const ALL: [EventKind; Self::COUNT] = [
        Self::Accepted,
        Self::Rejected,
        Self::UserSelected,
        Self::UserCommand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "pinpad_accepted",
            Self::Rejected => "pinpad_rejected",
            Self::UserSelected => "user_selected",
            Self::UserCommand => "user_command_received",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
