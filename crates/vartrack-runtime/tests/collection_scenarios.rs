#![forbid(unsafe_code)]

//! End-to-end behaviour of collection variables through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use vartrack_core::UpdateRef;
use vartrack_runtime::collection::{
    CancellableEvent, CollectionChangeEvent, ElementChangeType, RecreateCancellationReason,
};
use vartrack_runtime::primitive::PrimitiveChanges;
use vartrack_runtime::{
    CollectionVariable, CollectionVariableParams, PrimitiveVariable, PrimitiveVariableParams,
};

#[derive(Debug)]
struct Item {
    id: u32,
    v: &'static str,
}

vartrack_core::plain_element!(Item);

fn item(id: u32, v: &'static str) -> Rc<Item> {
    Rc::new(Item { id, v })
}

fn items(initial: Vec<Rc<Item>>) -> CollectionVariable<u32, Item> {
    init_tracing();
    CollectionVariable::new(CollectionVariableParams::keyed_by(|i: &Item| i.id).with_value(initial))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn record<T: 'static, R: 'static>(
    handler: &vartrack_core::EventHandler<T>,
    map: impl Fn(&T) -> R + 'static,
) -> (Rc<RefCell<Vec<R>>>, vartrack_core::Subscription) {
    let log: Rc<RefCell<Vec<R>>> = Rc::default();
    let log_clone = Rc::clone(&log);
    let sub = handler.listen(move |event| log_clone.borrow_mut().push(map(event)));
    (log, sub)
}

#[test]
fn add_ignores_existing_keys() {
    let var = items(vec![item(1, "a")]);
    let (added, _sub) = record(var.on_elements_added(), |e| {
        e.added_elements.iter().map(|i| (i.id, i.v)).collect::<Vec<_>>()
    });

    var.add([item(1, "b"), item(2, "c")]);

    assert_eq!(*added.borrow(), vec![vec![(2, "c")]]);
    assert_eq!(var.get(&1).map(|i| i.v), Some("a"));
    assert_eq!(var.get_index(&Item { id: 2, v: "" }), Some(1));
}

#[test]
fn remove_ignores_absent_keys_and_tracks_removed_original() {
    let var = items(vec![item(1, "a")]);
    var.add([item(2, "c")]);
    let (removed, _sub) = record(var.on_elements_removed(), |e| {
        e.removed_elements.iter().map(|i| i.id).collect::<Vec<_>>()
    });

    var.remove([item(1, ""), item(99, "")]);

    assert_eq!(*removed.borrow(), vec![vec![1]]);
    let tracked: Vec<_> = var
        .change_tracker()
        .get_removed_elements()
        .iter()
        .map(|i| (i.id, i.v))
        .collect();
    assert_eq!(tracked, vec![(1, "a")]);
}

#[test]
fn replacing_an_added_element_stays_added() {
    let var = items(vec![item(1, "a")]);
    var.add([item(2, "c")]);
    let (replaced, _sub) = record(var.on_elements_replaced(), |e| {
        e.replaced_elements
            .iter()
            .map(|u| UpdateRef::new(u.value.v, u.old_value.v))
            .collect::<Vec<_>>()
    });

    var.replace([item(2, "d")]);

    assert_eq!(*replaced.borrow(), vec![vec![UpdateRef::new("d", "c")]]);
    assert_eq!(
        var.change_tracker().change_of(&2).map(|c| c.change_type),
        Some(ElementChangeType::Added)
    );
    assert_eq!(var.change_tracker().get_added_elements()[0].v, "d");
}

#[test]
fn try_recreate_with_identical_content_is_cancelled() {
    let first = item(1, "a");
    let var = items(vec![Rc::clone(&first)]);
    let (cancelled, _c) = record(var.on_recreate_cancelled(), |e| e.reason);
    let (recreating, _r) = record(var.on_recreating(), |_| ());
    let (recreated, _d) = record(var.on_recreated(), |_| ());

    assert!(!var.try_recreate([first]));

    assert_eq!(
        *cancelled.borrow(),
        vec![RecreateCancellationReason::EqualityComparison]
    );
    assert!(recreating.borrow().is_empty());
    assert!(recreated.borrow().is_empty());
}

#[test]
fn clear_on_empty_collection_is_silent() {
    let var = items(vec![]);
    let (recreated, _sub) = record(var.on_recreated(), |_| ());

    var.clear();

    assert!(recreated.borrow().is_empty());
    assert!(!var.change_tracker().has_changed());
}

#[test]
fn nested_variable_change_marks_element_changed() {
    init_tracing();
    let name = Rc::new(PrimitiveVariable::new(PrimitiveVariableParams::new(Some(
        "ada".to_string(),
    ))));
    let var = CollectionVariable::new(
        CollectionVariableParams::keyed_by(|v: &PrimitiveVariable<String>| {
            v.original_value().unwrap_or_default()
        })
        .with_value([Rc::clone(&name)]),
    );
    let (events, _sub) = record(var.change_tracker().on_change(), |e| {
        (
            e.is_element_event(),
            e.changes().iter().map(|c| c.change_type).collect::<Vec<_>>(),
        )
    });

    name.update(Some("grace".to_string()));

    let change = var.change_tracker().change_of(&"ada".to_string());
    let change = change.expect("nested change recorded");
    assert_eq!(change.change_type, ElementChangeType::Changed);
    let payload = change
        .element_changes
        .expect("nested payload")
        .downcast::<PrimitiveChanges<String>>()
        .expect("primitive payload");
    assert_eq!(payload.current_value.as_deref(), Some("grace"));

    name.update(Some("ada".to_string()));
    assert!(!var.change_tracker().has_changed());
    assert_eq!(
        *events.borrow(),
        vec![
            (true, vec![ElementChangeType::Changed]),
            (true, vec![ElementChangeType::RestoredAsExisting]),
        ]
    );
}

#[test]
fn nested_change_event_carries_the_element_source() {
    init_tracing();
    let name = Rc::new(PrimitiveVariable::new(PrimitiveVariableParams::new(Some(
        "ada".to_string(),
    ))));
    let var = CollectionVariable::new(
        CollectionVariableParams::keyed_by(|v: &PrimitiveVariable<String>| {
            v.original_value().unwrap_or_default()
        })
        .with_value([Rc::clone(&name)]),
    );
    let (sources, _sub) = record(var.change_tracker().on_change(), |e| match &**e {
        CollectionChangeEvent::Element { source, .. } => source.has_changed,
        CollectionChangeEvent::Collection { .. } => false,
    });

    name.update(Some("lin".to_string()));

    assert_eq!(*sources.borrow(), vec![true]);
}

#[test]
fn partial_cancellation_commits_the_rest() {
    let var = items(vec![]);
    let _veto = var.on_adding_elements().listen(|e| e.cancel(&Item { id: 2, v: "" }));
    let (ignored, _sub) = record(var.on_elements_added(), |e| {
        e.ignored_elements().iter().map(|i| i.id).collect::<Vec<_>>()
    });

    var.add([item(1, "a"), item(2, "b"), item(1, "dup")]);

    let ids: Vec<u32> = var.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(*ignored.borrow(), vec![vec![2, 1]]);
}

#[test]
fn reset_after_mutations_restores_baseline() {
    let var = CollectionVariable::new(
        CollectionVariableParams::keyed_by(|i: &Item| i.id)
            .with_value([item(1, "a"), item(2, "b")])
            .with_auto_dispose(false),
    );
    var.add([item(3, "c")]);
    var.replace([item(1, "z")]);
    var.remove([item(2, "")]);
    assert_eq!(var.change_tracker().element_changes().len(), 3);

    var.reset();

    let values: Vec<_> = var.iter().map(|i| (i.id, i.v)).collect();
    assert_eq!(values, vec![(1, "a"), (2, "b")]);
    assert!(!var.change_tracker().has_changed());
}
