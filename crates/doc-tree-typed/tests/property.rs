use std::cell::RefCell;
use std::rc::Rc;

use doc_tree::{Journal, Node};
use doc_tree_typed::TypedProperty;
use serde_json::json;

fn count_changes<T: doc_tree_typed::PropertyValue>(
    property: &mut TypedProperty<T>,
) -> Rc<RefCell<usize>> {
    let counter = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&counter);
    property.set_on_change(move || *seen.borrow_mut() += 1);
    counter
}

#[test]
fn unstored_property_reads_as_default() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);
    assert!(volume.is_valid());
    assert_eq!(volume.get(), 100);
    assert!(volume.is_using_default());
    assert!(!node.has_property("volume"));
}

#[test]
fn set_writes_through_and_resynchronizes() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);
    volume.set(64);
    assert_eq!(volume.get(), 64);
    assert_eq!(node.property("volume"), Some(json!(64)));
    assert!(!volume.is_using_default());
    assert!(volume == 64);
}

#[test]
fn setting_the_default_removes_the_property() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);
    volume.set(64);
    volume.set(100);
    assert!(!node.has_property("volume"));
    assert_eq!(volume.get(), 100);

    volume.set(64);
    volume.reset_to_default();
    assert!(!node.has_property("volume"));
    assert!(volume.is_using_default());
}

#[test]
fn external_edits_update_the_cache() {
    let node = Node::new("track");
    let mut name = TypedProperty::new(String::new());
    name.refer_to(&node, "name", None);
    let changes = count_changes(&mut name);

    node.set_property("name", json!("drums"), None);
    assert_eq!(name.get(), "drums");
    assert_eq!(*changes.borrow(), 1);

    node.remove_property("name", None);
    assert_eq!(name.get(), "");
    assert_eq!(*changes.borrow(), 2);

    // An unrelated key never disturbs the cache.
    node.set_property("color", json!("red"), None);
    assert_eq!(*changes.borrow(), 2);
}

#[test]
fn change_callback_skips_equal_values() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(0i64);
    volume.refer_to(&node, "volume", None);
    let changes = count_changes(&mut volume);
    volume.set(5);
    assert_eq!(*changes.borrow(), 1);
    volume.set(5);
    assert_eq!(*changes.borrow(), 1);
    volume.clear_on_change();
    volume.set(9);
    assert_eq!(*changes.borrow(), 1);
}

#[test]
fn undecodable_cell_falls_back_to_the_default() {
    let node = Node::new("track");
    node.set_property("volume", json!("loud"), None);
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);
    assert_eq!(volume.get(), 100);
    // The stored cell is left alone.
    assert_eq!(node.property("volume"), Some(json!("loud")));
}

#[test]
fn sync_default_keeps_the_default_stored() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);

    volume.set_sync_default(true);
    assert!(volume.is_sync_default());
    assert_eq!(node.property("volume"), Some(json!(100)));

    volume.set(100);
    assert_eq!(node.property("volume"), Some(json!(100)));

    // An external removal is undone on the spot.
    node.remove_property("volume", None);
    assert_eq!(node.property("volume"), Some(json!(100)));

    volume.set_sync_default(false);
    assert!(!node.has_property("volume"));
    assert_eq!(volume.get(), 100);
}

#[test]
fn constrainer_corrects_both_directions() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(0i64);
    volume.refer_to(&node, "volume", None);
    volume.set_constrainer(|value: &mut i64, _is_default| {
        *value = (*value).clamp(0, 10);
    });

    volume.set(42);
    assert_eq!(volume.get(), 10);
    assert_eq!(node.property("volume"), Some(json!(10)));

    // An external out-of-range write is corrected in the tree.
    node.set_property("volume", json!(99), None);
    assert_eq!(volume.get(), 10);
    assert_eq!(node.property("volume"), Some(json!(10)));

    node.set_property("volume", json!(-3), None);
    assert_eq!(volume.get(), 0);
    assert_eq!(node.property("volume"), Some(json!(0)));
}

#[test]
fn installing_a_constrainer_fixes_the_current_value() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(0i64);
    volume.refer_to(&node, "volume", None);
    volume.set(42);
    volume.set_constrainer(|value: &mut i64, _is_default| {
        *value = (*value).min(10);
    });
    assert_eq!(volume.get(), 10);
    assert_eq!(node.property("volume"), Some(json!(10)));
}

#[test]
fn changing_the_default_reclassifies_the_value() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);
    volume.set(64);
    assert!(!volume.is_using_default());

    volume.set_default(64);
    assert_eq!(volume.default_value(), 64);
    // The stored value now equals the default, so it goes back to being
    // represented by absence.
    assert!(!node.has_property("volume"));
    assert_eq!(volume.get(), 64);
    assert!(volume.is_using_default());
}

#[test]
fn changing_the_default_while_absent_moves_the_cache() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(100i64);
    volume.refer_to(&node, "volume", None);
    let changes = count_changes(&mut volume);

    volume.set_default(50);
    assert_eq!(volume.default_value(), 50);
    assert_eq!(volume.get(), 50);
    assert!(volume.is_using_default());
    assert!(!node.has_property("volume"));
    assert_eq!(*changes.borrow(), 1);
}

#[test]
fn refer_to_with_default_overrides_the_default() {
    let node = Node::new("track");
    let mut volume = TypedProperty::new(0i64);
    volume.refer_to_with_default(&node, "volume", None, 77);
    assert_eq!(volume.get(), 77);
    assert_eq!(volume.default_value(), 77);
}

#[test]
fn rebinding_resynchronizes_from_the_new_node() {
    let first = Node::new("track");
    first.set_property("volume", json!(3), None);
    let second = Node::new("track");
    second.set_property("volume", json!(7), None);

    let mut volume = TypedProperty::new(0i64);
    volume.refer_to(&first, "volume", None);
    assert_eq!(volume.get(), 3);
    volume.refer_to(&second, "volume", None);
    assert_eq!(volume.get(), 7);

    first.set_property("volume", json!(4), None);
    assert_eq!(volume.get(), 7);
    second.set_property("volume", json!(8), None);
    assert_eq!(volume.get(), 8);
}

#[test]
fn undo_and_redo_flow_through_the_cache() {
    let journal = Journal::new();
    let node = Node::new("track");
    let mut volume = TypedProperty::new(0i64);
    volume.refer_to(&node, "volume", Some(&journal));
    let changes = count_changes(&mut volume);

    volume.set(5);
    journal.begin_transaction();
    volume.set(9);
    assert_eq!(*changes.borrow(), 2);

    assert!(journal.undo());
    assert_eq!(volume.get(), 5);
    assert!(journal.undo());
    assert_eq!(volume.get(), 0);
    assert!(!node.has_property("volume"));
    assert!(journal.redo());
    assert_eq!(volume.get(), 5);
    assert_eq!(*changes.borrow(), 5);
}

#[test]
fn redirection_rebinds_to_the_replacement_node() {
    let old = Node::new("track");
    let replacement = Node::new("track");
    replacement.set_property("volume", json!(7), None);

    let mut volume = TypedProperty::new(0i64);
    volume.refer_to(&old, "volume", None);
    assert_eq!(volume.get(), 0);

    old.redirect(&replacement);
    assert_eq!(volume.get(), 7);
    assert_eq!(volume.node(), Some(replacement.clone()));

    // Changes now arrive from the replacement only.
    replacement.set_property("volume", json!(8), None);
    assert_eq!(volume.get(), 8);
    old.set_property("volume", json!(1), None);
    assert_eq!(volume.get(), 8);
}
