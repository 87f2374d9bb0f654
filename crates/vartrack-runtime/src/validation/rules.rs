#![forbid(unsafe_code)]

//! Stateless validation rule builders.
//!
//! Every builder returns a [`ValidationCallback`] that can be pushed onto a
//! [`ValidationAction`](super::ValidationAction). Error codes are
//! upper-snake constants; parameterized rules append their arguments
//! (`LENGTH_LESS_THAN_3`, `NOT_BETWEEN_1_10`).

use std::fmt::Display;
use std::rc::Rc;

use vartrack_core::ValidationResult;

use super::action::ValidationCallback;

pub const REQUIRED: &str = "REQUIRED";
pub const EMPTY: &str = "EMPTY";
pub const LENGTH_LESS_THAN: &str = "LENGTH_LESS_THAN";
pub const LENGTH_GREATER_THAN: &str = "LENGTH_GREATER_THAN";
pub const LENGTH_NOT_BETWEEN: &str = "LENGTH_NOT_BETWEEN";
pub const NOT_GREATER_THAN: &str = "NOT_GREATER_THAN";
pub const NOT_LESS_THAN: &str = "NOT_LESS_THAN";
pub const NOT_BETWEEN: &str = "NOT_BETWEEN";
pub const NOT_IN: &str = "NOT_IN";
pub const NOT_IN_SET: &str = "NOT_IN_SET";

fn code(prefix: &str, arg: impl Display) -> String {
    format!("{prefix}_{}", arg.to_string().to_uppercase())
}

fn has_messages(result: &Option<ValidationResult>) -> bool {
    result
        .as_ref()
        .is_some_and(|r| !r.errors().is_empty() || !r.warnings().is_empty())
}

fn all_messages(result: ValidationResult) -> Vec<String> {
    result
        .warnings()
        .iter()
        .chain(result.errors())
        .cloned()
        .collect()
}

/// Fails with `REQUIRED` when the value is absent.
pub fn required<T: 'static>() -> ValidationCallback<Option<T>> {
    Rc::new(|value: &Option<T>| {
        value
            .is_none()
            .then(|| ValidationResult::from_errors([REQUIRED]))
    })
}

/// Lift a rule to optional values. Absent values pass.
pub fn optional<T: 'static>(rule: ValidationCallback<T>) -> ValidationCallback<Option<T>> {
    Rc::new(move |value: &Option<T>| value.as_ref().and_then(|v| rule(v)))
}

/// Report every message of `rule` as a warning.
pub fn as_warnings<T: 'static>(rule: ValidationCallback<T>) -> ValidationCallback<T> {
    Rc::new(move |value: &T| {
        rule(value).map(|r| ValidationResult::from_warnings(all_messages(r)))
    })
}

/// Report every message of `rule` as an error.
pub fn as_errors<T: 'static>(rule: ValidationCallback<T>) -> ValidationCallback<T> {
    Rc::new(move |value: &T| rule(value).map(|r| ValidationResult::from_errors(all_messages(r))))
}

/// Run every rule and merge all their messages.
pub fn and<T: 'static>(rules: Vec<ValidationCallback<T>>) -> ValidationCallback<T> {
    Rc::new(move |value: &T| {
        rules
            .iter()
            .map(|rule| rule(value))
            .fold(None, ValidationResult::combine)
    })
}

/// Pass as soon as one rule passes; otherwise merge all their messages.
pub fn or<T: 'static>(rules: Vec<ValidationCallback<T>>) -> ValidationCallback<T> {
    Rc::new(move |value: &T| {
        let mut failed = None;
        for rule in &rules {
            let result = rule(value);
            if !has_messages(&result) {
                return None;
            }
            failed = ValidationResult::combine(failed, result);
        }
        failed
    })
}

/// Fail with `on_pass()` when `rule` passes, pass when it fails.
pub fn not<T: 'static>(
    rule: ValidationCallback<T>,
    on_pass: impl Fn() -> ValidationResult + 'static,
) -> ValidationCallback<T> {
    Rc::new(move |value: &T| {
        if has_messages(&rule(value)) {
            None
        } else {
            Some(on_pass())
        }
    })
}

/// Fails with `EMPTY` on an empty string.
pub fn not_empty<S: AsRef<str> + 'static>() -> ValidationCallback<S> {
    Rc::new(|value: &S| {
        value
            .as_ref()
            .is_empty()
            .then(|| ValidationResult::from_errors([EMPTY]))
    })
}

/// Fails with `LENGTH_LESS_THAN_<n>` below `min` characters.
pub fn min_length<S: AsRef<str> + 'static>(min: usize) -> ValidationCallback<S> {
    let error = code(LENGTH_LESS_THAN, min);
    Rc::new(move |value: &S| {
        (value.as_ref().chars().count() < min)
            .then(|| ValidationResult::from_errors([error.clone()]))
    })
}

/// Fails with `LENGTH_GREATER_THAN_<n>` above `max` characters.
pub fn max_length<S: AsRef<str> + 'static>(max: usize) -> ValidationCallback<S> {
    let error = code(LENGTH_GREATER_THAN, max);
    Rc::new(move |value: &S| {
        (value.as_ref().chars().count() > max)
            .then(|| ValidationResult::from_errors([error.clone()]))
    })
}

/// Fails with `LENGTH_NOT_BETWEEN_<min>_<max>` outside `min..=max` characters.
pub fn length_between<S: AsRef<str> + 'static>(min: usize, max: usize) -> ValidationCallback<S> {
    let error = format!("{LENGTH_NOT_BETWEEN}_{min}_{max}");
    Rc::new(move |value: &S| {
        let len = value.as_ref().chars().count();
        (!(min..=max).contains(&len)).then(|| ValidationResult::from_errors([error.clone()]))
    })
}

/// Fails with `NOT_GREATER_THAN_<bound>` unless the value exceeds `bound`.
pub fn greater_than<T: PartialOrd + Display + 'static>(bound: T) -> ValidationCallback<T> {
    let error = code(NOT_GREATER_THAN, &bound);
    Rc::new(move |value: &T| {
        (*value <= bound).then(|| ValidationResult::from_errors([error.clone()]))
    })
}

/// Fails with `NOT_LESS_THAN_<bound>` unless the value is below `bound`.
pub fn less_than<T: PartialOrd + Display + 'static>(bound: T) -> ValidationCallback<T> {
    let error = code(NOT_LESS_THAN, &bound);
    Rc::new(move |value: &T| {
        (*value >= bound).then(|| ValidationResult::from_errors([error.clone()]))
    })
}

/// Fails with `NOT_BETWEEN_<min>_<max>` outside `min..=max`.
pub fn between<T: PartialOrd + Display + 'static>(min: T, max: T) -> ValidationCallback<T> {
    let error = format!(
        "{NOT_BETWEEN}_{}_{}",
        min.to_string().to_uppercase(),
        max.to_string().to_uppercase()
    );
    Rc::new(move |value: &T| {
        (*value < min || *value > max).then(|| ValidationResult::from_errors([error.clone()]))
    })
}

/// Fails with `NOT_IN_<set_name>` (or `NOT_IN_SET` when unnamed) unless the
/// value is one of `allowed`.
pub fn one_of<T: PartialEq + 'static>(
    allowed: Vec<T>,
    set_name: Option<&str>,
) -> ValidationCallback<T> {
    let error = match set_name {
        Some(name) if !name.is_empty() => format!("{NOT_IN}_{name}"),
        _ => NOT_IN_SET.to_string(),
    };
    Rc::new(move |value: &T| {
        (!allowed.contains(value)).then(|| ValidationResult::from_errors([error.clone()]))
    })
}
