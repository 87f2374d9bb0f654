#![forbid(unsafe_code)]

//! Validation callback lists.
//!
//! A [`ValidationAction`] runs synchronous callbacks in registration order
//! and merges their results. An [`AsyncValidationAction`] does the same for
//! callbacks returning futures; all futures are awaited together and merged
//! in registration order.

use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use vartrack_core::ValidationResult;

/// Synchronous validation callback.
pub type ValidationCallback<T> = Rc<dyn Fn(&T) -> Option<ValidationResult>>;

/// Asynchronous validation callback.
pub type AsyncValidationCallback<T> =
    Rc<dyn Fn(T) -> LocalBoxFuture<'static, Option<ValidationResult>>>;

fn merge_all(results: impl IntoIterator<Item = Option<ValidationResult>>) -> Option<ValidationResult> {
    results.into_iter().fold(None, ValidationResult::combine)
}

/// Ordered list of synchronous validation callbacks.
pub struct ValidationAction<T> {
    callbacks: Vec<ValidationCallback<T>>,
}

impl<T> Clone for ValidationAction<T> {
    fn clone(&self) -> Self {
        Self {
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<T> Default for ValidationAction<T> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for ValidationAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationAction")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<T: 'static> ValidationAction<T> {
    /// An action with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback.
    pub fn push(&mut self, callback: ValidationCallback<T>) {
        self.callbacks.push(callback);
    }

    /// Append a callback, builder style.
    #[must_use]
    pub fn with(mut self, callback: impl Fn(&T) -> Option<ValidationResult> + 'static) -> Self {
        self.callbacks.push(Rc::new(callback));
        self
    }

    /// Whether there are no callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every callback and merge the results.
    pub fn run(&self, value: &T) -> Option<ValidationResult> {
        merge_all(self.callbacks.iter().map(|callback| callback(value)))
    }
}

/// Ordered list of asynchronous validation callbacks.
pub struct AsyncValidationAction<T> {
    callbacks: Vec<AsyncValidationCallback<T>>,
}

impl<T> Clone for AsyncValidationAction<T> {
    fn clone(&self) -> Self {
        Self {
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<T> Default for AsyncValidationAction<T> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for AsyncValidationAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValidationAction")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<T: Clone + 'static> AsyncValidationAction<T> {
    /// An action with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback.
    pub fn push(&mut self, callback: AsyncValidationCallback<T>) {
        self.callbacks.push(callback);
    }

    /// Append a callback, builder style.
    #[must_use]
    pub fn with(
        mut self,
        callback: impl Fn(T) -> LocalBoxFuture<'static, Option<ValidationResult>> + 'static,
    ) -> Self {
        self.callbacks.push(Rc::new(callback));
        self
    }

    /// Whether there are no callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every callback concurrently and merge the results in
    /// registration order.
    pub fn run(&self, value: T) -> LocalBoxFuture<'static, Option<ValidationResult>> {
        let pending: Vec<_> = self
            .callbacks
            .iter()
            .map(|callback| callback(value.clone()))
            .collect();
        future::join_all(pending).map(merge_all).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn sync_results_merge_in_order() {
        let action = ValidationAction::<i32>::new()
            .with(|v| (*v < 0).then(|| ValidationResult::from_errors(["NEGATIVE"])))
            .with(|_| None)
            .with(|v| (*v % 2 != 0).then(|| ValidationResult::new(["ODD"], ["CHECK"])));

        let result = action.run(&-3).unwrap();
        assert_eq!(result.errors(), ["NEGATIVE", "ODD"]);
        assert_eq!(result.warnings(), ["CHECK"]);
        assert_eq!(action.run(&4), None);
    }

    #[test]
    fn empty_action_yields_nothing() {
        assert!(ValidationAction::<String>::new().run(&"x".to_string()).is_none());
        assert!(block_on(AsyncValidationAction::<u8>::new().run(1)).is_none());
    }

    #[test]
    fn async_results_merge_in_registration_order() {
        let action = AsyncValidationAction::<u32>::new()
            .with(|v| async move { Some(ValidationResult::from_errors([format!("A{v}")])) }.boxed_local())
            .with(|v| async move { Some(ValidationResult::from_errors([format!("B{v}")])) }.boxed_local());

        let result = block_on(action.run(7)).unwrap();
        assert_eq!(result.errors(), ["A7", "B7"]);
    }
}
