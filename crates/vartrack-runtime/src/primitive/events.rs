#![forbid(unsafe_code)]

//! Value events published by [`PrimitiveVariable`](super::PrimitiveVariable).

use std::cell::Cell;
use std::fmt;

/// What triggered a committed value change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueChangeSource {
    Update,
    TryUpdate,
    Reset,
}

impl fmt::Display for ValueChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::TryUpdate => "try-update",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Why `try_update` did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueChangeCancellationReason {
    /// The new value equals the current one.
    EqualityComparison,
    /// A changing listener cancelled.
    OnChangingEvent,
}

/// Published by `try_update` before the value changes.
#[derive(Debug)]
pub struct ValueChangingEvent<T> {
    pub original_value: Option<T>,
    pub current_value: Option<T>,
    pub next_value: Option<T>,
    cancelled: Cell<bool>,
}

impl<T> ValueChangingEvent<T> {
    pub(crate) fn new(
        original_value: Option<T>,
        current_value: Option<T>,
        next_value: Option<T>,
    ) -> Self {
        Self {
            original_value,
            current_value,
            next_value,
            cancelled: Cell::new(false),
        }
    }

    /// Veto the update.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Published after the value changed.
#[derive(Debug, Clone)]
pub struct ValueChangedEvent<T> {
    pub original_value: Option<T>,
    pub previous_value: Option<T>,
    pub current_value: Option<T>,
    pub source: ValueChangeSource,
}

/// Published when `try_update` gives up.
#[derive(Debug, Clone)]
pub struct ValueChangeCancelledEvent<T> {
    pub original_value: Option<T>,
    pub current_value: Option<T>,
    pub cancelled_value: Option<T>,
    pub reason: ValueChangeCancellationReason,
}
