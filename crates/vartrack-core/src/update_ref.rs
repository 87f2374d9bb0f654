#![forbid(unsafe_code)]

//! A pair of current and previous values.

use std::rc::Rc;

/// A potentially changed value: the new `value` alongside the `old_value`
/// it supersedes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRef<T> {
    /// Current value.
    pub value: T,
    /// Superseded value.
    pub old_value: T,
}

impl<T> UpdateRef<T> {
    /// Pair a new value with the value it replaces.
    #[must_use]
    pub const fn new(value: T, old_value: T) -> Self {
        Self { value, old_value }
    }

    /// Swap the roles of both values.
    #[must_use]
    pub fn reversed(self) -> Self {
        Self {
            value: self.old_value,
            old_value: self.value,
        }
    }
}

impl<T: PartialEq> UpdateRef<T> {
    /// Whether the current and old values differ.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.value != self.old_value
    }
}

impl<T> UpdateRef<Rc<T>> {
    /// Whether the current and old values are distinct allocations.
    #[must_use]
    pub fn is_new_ref(&self) -> bool {
        !Rc::ptr_eq(&self.value, &self.old_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_changed_by_value() {
        assert!(!UpdateRef::new(1, 1).has_changed());
        assert!(UpdateRef::new(1, 2).has_changed());
        assert!(UpdateRef::new(None, Some("foo")).has_changed());
        assert!(UpdateRef::new(Some("foo"), None).has_changed());
    }

    #[test]
    fn equal_contents_in_distinct_allocations_are_new_refs() {
        let a = Rc::new(String::from("x"));
        let b = Rc::new(String::from("x"));
        let same = UpdateRef::new(Rc::clone(&a), Rc::clone(&a));
        let distinct = UpdateRef::new(a, b);

        assert!(!same.is_new_ref());
        assert!(distinct.is_new_ref());
        assert!(!distinct.has_changed());
    }

    #[test]
    fn reversed_swaps() {
        let r = UpdateRef::new(2, 1).reversed();
        assert_eq!(r.value, 1);
        assert_eq!(r.old_value, 2);
    }
}
