#![forbid(unsafe_code)]

//! Original-versus-current tracking for a single value.
//!
//! # Invariants
//!
//! 1. `has_changed()` ⟺ the current value is not equal to the original.
//! 2. A change event is published only when the tracked current value
//!    actually moved.
//! 3. While detached, value changes are ignored; `attach()` resynchronizes.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};
use vartrack_core::{
    Disposable, EventHandler, Subscription, VariableChangeEvent, VariableChangeTracker,
    VariableError, VariableResult,
};

use super::PrimitiveValue;
use super::events::ValueChangedEvent;
use super::variable::{PrimitiveVariable, WeakPrimitiveVariable};

const COMPONENT: &str = "change tracker";

/// Caller-supplied structural equality for values.
pub type ValueComparer<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Primitive change tracker configuration.
pub struct PrimitiveChangeTrackerConfig<T> {
    pub attach: bool,
    /// Baseline; the variable's initial value when absent.
    pub original_value: Option<Option<T>>,
    /// Widens `==` for present values.
    pub comparer: Option<ValueComparer<T>>,
}

impl<T> Default for PrimitiveChangeTrackerConfig<T> {
    fn default() -> Self {
        Self {
            attach: true,
            original_value: None,
            comparer: None,
        }
    }
}

impl<T> PrimitiveChangeTrackerConfig<T> {
    #[must_use]
    pub fn with_attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }

    #[must_use]
    pub fn with_original_value(mut self, value: Option<T>) -> Self {
        self.original_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_comparer(mut self, comparer: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.comparer = Some(Rc::new(comparer));
        self
    }
}

impl<T> fmt::Debug for PrimitiveChangeTrackerConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveChangeTrackerConfig")
            .field("attach", &self.attach)
            .field("has_original_value", &self.original_value.is_some())
            .field("has_comparer", &self.comparer.is_some())
            .finish()
    }
}

/// Original and current value pair, the tracker's change payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveChanges<T> {
    pub original_value: Option<T>,
    pub current_value: Option<T>,
}

/// Published when the tracked value moves.
#[derive(Debug)]
pub struct PrimitiveChangeEvent<T> {
    pub has_changed: bool,
    pub changes: PrimitiveChanges<T>,
    /// `None` for an explicit `detect_changes`.
    pub source: Option<Rc<ValueChangedEvent<T>>>,
}

struct TrackerState<T> {
    linked: Option<WeakPrimitiveVariable<T>>,
    pending_original: Option<Option<T>>,
    changes: PrimitiveChanges<T>,
    has_changed: bool,
    listener: Option<Subscription>,
    attached: bool,
    disposed: bool,
}

struct TrackerInner<T> {
    state: RefCell<TrackerState<T>>,
    on_change: EventHandler<Rc<PrimitiveChangeEvent<T>>>,
    comparer: Option<ValueComparer<T>>,
}

/// Tracks whether a [`PrimitiveVariable`] differs from its original value.
///
/// Cloning creates another handle to the same tracker.
pub struct PrimitiveVariableChangeTracker<T> {
    inner: Rc<TrackerInner<T>>,
}

impl<T> Clone for PrimitiveVariableChangeTracker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PrimitiveVariableChangeTracker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("PrimitiveVariableChangeTracker")
            .field("changes", &state.changes)
            .field("has_changed", &state.has_changed)
            .field("attached", &state.attached)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<T: PrimitiveValue> Default for PrimitiveVariableChangeTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PrimitiveValue> TrackerInner<T> {
    fn are_equal(&self, first: Option<&T>, second: Option<&T>) -> bool {
        match (first, second) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b || self.comparer.as_ref().is_some_and(|c| c(a, b)),
            _ => false,
        }
    }

    fn update_changes(&self, state: &mut TrackerState<T>, current: Option<T>) {
        state.has_changed = !self.are_equal(state.changes.original_value.as_ref(), current.as_ref());
        state.changes.current_value = current;
    }

    fn update_and_publish(&self, current: Option<T>, source: Option<Rc<ValueChangedEvent<T>>>) {
        let event = {
            let mut state = self.state.borrow_mut();
            self.update_changes(&mut state, current);
            Rc::new(PrimitiveChangeEvent {
                has_changed: state.has_changed,
                changes: state.changes.clone(),
                source,
            })
        };
        trace!(has_changed = event.has_changed, "primitive change tracked");
        self.on_change.publish(&event);
    }

    fn on_value_changed(&self, event: &Rc<ValueChangedEvent<T>>) {
        {
            let state = self.state.borrow();
            if !state.attached || state.disposed || state.changes.current_value == event.current_value
            {
                return;
            }
        }
        self.update_and_publish(event.current_value.clone(), Some(Rc::clone(event)));
    }
}

impl<T: PrimitiveValue> PrimitiveVariableChangeTracker<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PrimitiveChangeTrackerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: PrimitiveChangeTrackerConfig<T>) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                state: RefCell::new(TrackerState {
                    linked: None,
                    pending_original: config.original_value,
                    changes: PrimitiveChanges {
                        original_value: None,
                        current_value: None,
                    },
                    has_changed: false,
                    listener: None,
                    attached: config.attach,
                    disposed: false,
                }),
                on_change: EventHandler::new(),
                comparer: config.comparer,
            }),
        }
    }

    /// Bind the tracker to `variable` and fix its baseline.
    ///
    /// # Errors
    ///
    /// [`VariableError::Disposed`] or [`VariableError::AlreadyConfigured`].
    pub fn configure(&self, variable: &PrimitiveVariable<T>) -> VariableResult<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.disposed {
                return Err(VariableError::Disposed(COMPONENT));
            }
            if state.linked.is_some() {
                return Err(VariableError::AlreadyConfigured(COMPONENT));
            }
            state.linked = Some(variable.downgrade());
            let current = variable.value();
            state.changes.original_value = state
                .pending_original
                .take()
                .unwrap_or_else(|| current.clone());
            self.inner.update_changes(&mut state, current);
        }

        let weak: Weak<TrackerInner<T>> = Rc::downgrade(&self.inner);
        let listener = variable.events().changed.listen(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_value_changed(event);
            }
        });
        self.inner.state.borrow_mut().listener = Some(listener);
        debug!(has_changed = self.has_changed(), "primitive change tracker configured");
        Ok(())
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.state.borrow().linked.is_some()
    }

    pub fn on_change(&self) -> &EventHandler<Rc<PrimitiveChangeEvent<T>>> {
        &self.inner.on_change
    }

    /// Baseline value; `None` before configuration.
    #[must_use]
    pub fn original_value(&self) -> Option<T> {
        self.inner.state.borrow().changes.original_value.clone()
    }

    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.inner.state.borrow().has_changed
    }

    /// Original and current value when they differ.
    #[must_use]
    pub fn changes(&self) -> Option<PrimitiveChanges<T>> {
        let state = self.inner.state.borrow();
        state.has_changed.then(|| state.changes.clone())
    }

    /// `==`, widened by the configured comparer.
    pub fn are_equal(&self, first: Option<&T>, second: Option<&T>) -> bool {
        self.inner.are_equal(first, second)
    }

    /// Compare the tracked value with the variable's and publish if it moved.
    ///
    /// # Panics
    ///
    /// If the tracker is disposed or not configured.
    pub fn detect_changes(&self) {
        let variable = {
            let state = self.inner.state.borrow();
            assert!(!state.disposed, "{}", VariableError::Disposed(COMPONENT));
            let linked = state
                .linked
                .as_ref()
                .unwrap_or_else(|| panic!("{}", VariableError::NotConfigured(COMPONENT)));
            linked.upgrade()
        };
        let Some(variable) = variable else {
            return;
        };
        let current = variable.value();
        if self.inner.state.borrow().changes.current_value == current {
            return;
        }
        self.inner.update_and_publish(current, None);
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.state.borrow().attached
    }

    /// # Panics
    ///
    /// If the tracker is disposed.
    pub fn attach(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            assert!(!state.disposed, "{}", VariableError::Disposed(COMPONENT));
            if state.attached {
                return;
            }
            state.attached = true;
        }
        self.detect_changes();
    }

    /// # Panics
    ///
    /// If the tracker is disposed.
    pub fn detach(&self) {
        let mut state = self.inner.state.borrow_mut();
        assert!(!state.disposed, "{}", VariableError::Disposed(COMPONENT));
        state.attached = false;
    }

    pub fn dispose(&self) {
        let listener = {
            let mut state = self.inner.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.attached = false;
            state.linked = None;
            state.has_changed = false;
            state.changes.current_value = state.changes.original_value.clone();
            state.listener.take()
        };
        drop(listener);
        self.inner.on_change.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.borrow().disposed
    }
}

impl<T: PrimitiveValue> VariableChangeTracker for PrimitiveVariableChangeTracker<T> {
    fn has_changed(&self) -> bool {
        Self::has_changed(self)
    }

    /// `Rc<PrimitiveChanges<T>>` when the value differs.
    fn changes(&self) -> Option<Rc<dyn Any>> {
        Self::changes(self).map(|changes| Rc::new(changes) as Rc<dyn Any>)
    }

    fn listen_change(&self, listener: Box<dyn Fn(&VariableChangeEvent)>) -> Subscription {
        self.inner.on_change.listen(move |event| {
            listener(&VariableChangeEvent {
                has_changed: event.has_changed,
                changes: event
                    .has_changed
                    .then(|| Rc::new(event.changes.clone()) as Rc<dyn Any>),
                source: Rc::clone(event) as Rc<dyn Any>,
            });
        })
    }

    fn detect_changes(&self) {
        Self::detect_changes(self);
    }

    fn is_attached(&self) -> bool {
        Self::is_attached(self)
    }

    fn attach(&self) {
        Self::attach(self);
    }

    fn detach(&self) {
        Self::detach(self);
    }
}

impl<T: PrimitiveValue> Disposable for PrimitiveVariableChangeTracker<T> {
    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveVariableParams;

    fn name(initial: &str, config: PrimitiveChangeTrackerConfig<String>) -> PrimitiveVariable<String> {
        PrimitiveVariable::new(
            PrimitiveVariableParams::new(Some(initial.to_string()))
                .with_change_tracker_config(config),
        )
    }

    #[test]
    fn baseline_is_initial_value() {
        let var = name("ada", PrimitiveChangeTrackerConfig::default());
        assert_eq!(var.change_tracker().original_value().as_deref(), Some("ada"));
        assert!(!var.change_tracker().has_changed());
    }

    #[test]
    fn update_and_restore() {
        let var = name("ada", PrimitiveChangeTrackerConfig::default());
        let seen: Rc<RefCell<Vec<bool>>> = Rc::default();
        let seen_clone = Rc::clone(&seen);
        let _sub = var
            .change_tracker()
            .on_change()
            .listen(move |e| seen_clone.borrow_mut().push(e.has_changed));

        var.update(Some("grace".to_string()));
        var.update(Some("grace".to_string()));
        var.update(Some("ada".to_string()));

        assert_eq!(*seen.borrow(), vec![true, false]);
        assert_eq!(var.change_tracker().changes(), None);
    }

    #[test]
    fn comparer_widens_equality() {
        let config = PrimitiveChangeTrackerConfig::default()
            .with_comparer(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
        let var = name("ada", config);

        var.update(Some("ADA".to_string()));
        assert!(!var.change_tracker().has_changed());
        assert!(var.change_tracker().are_equal(None, None));
        assert!(!var.change_tracker().are_equal(Some(&"a".to_string()), None));
    }

    #[test]
    fn explicit_original_value() {
        let var = name(
            "ada",
            PrimitiveChangeTrackerConfig::default().with_original_value(None),
        );
        assert!(var.change_tracker().has_changed());
        assert_eq!(
            var.change_tracker().changes(),
            Some(PrimitiveChanges {
                original_value: None,
                current_value: Some("ada".to_string()),
            })
        );
    }

    #[test]
    fn detached_tracker_resyncs_on_attach() {
        let var = name("ada", PrimitiveChangeTrackerConfig::default().with_attach(false));
        var.update(Some("grace".to_string()));
        assert!(!var.change_tracker().has_changed());

        let sources: Rc<RefCell<Vec<bool>>> = Rc::default();
        let sources_clone = Rc::clone(&sources);
        let _sub = var
            .change_tracker()
            .on_change()
            .listen(move |e| sources_clone.borrow_mut().push(e.source.is_none()));
        var.change_tracker().attach();

        assert!(var.change_tracker().has_changed());
        assert_eq!(*sources.borrow(), vec![true]);
    }

    #[test]
    #[should_panic(expected = "change tracker has been disposed")]
    fn detect_after_dispose_panics() {
        let var = name("ada", PrimitiveChangeTrackerConfig::default());
        var.change_tracker().dispose();
        var.change_tracker().detect_changes();
    }
}
