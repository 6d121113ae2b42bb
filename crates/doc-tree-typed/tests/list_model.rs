//! Model test: an observed child list must mirror the parent's matching
//! children after any interleaving of list-side and tree-side edits.

use doc_tree::Node;
use doc_tree_typed::{NodeWrapper, ObservedChildList, TypedNode, TypedProperty};
use proptest::prelude::*;

#[derive(Default)]
struct Clip {
    binding: TypedNode,
    start: TypedProperty<i64>,
}

impl NodeWrapper for Clip {
    fn typed_node(&self) -> &TypedNode {
        &self.binding
    }

    fn typed_node_mut(&mut self) -> &mut TypedNode {
        &mut self.binding
    }

    fn bind_members(&mut self) {
        if let Some(node) = self.binding.node().cloned() {
            self.start.refer_to(&node, "start", None);
        }
    }
}

#[derive(Clone, Debug)]
enum Edit {
    ListAdd,
    ListRemove(usize),
    TreeAppend,
    TreeAppendOther,
    TreeInsert(usize),
    TreeRemove(usize),
    TreeMove(usize, usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::ListAdd),
        (0usize..8).prop_map(Edit::ListRemove),
        Just(Edit::TreeAppend),
        Just(Edit::TreeAppendOther),
        (0usize..8).prop_map(Edit::TreeInsert),
        (0usize..8).prop_map(Edit::TreeRemove),
        (0usize..8, 0usize..8).prop_map(|(a, b)| Edit::TreeMove(a, b)),
    ]
}

proptest! {
    #[test]
    fn sequence_mirrors_matching_children(edits in proptest::collection::vec(edit(), 0..32)) {
        let lane = Node::new("lane");
        let mut list = ObservedChildList::<Clip>::new();
        prop_assert!(list.wrap(Some(&lane), "lane", "clip", None));

        for edit in edits {
            match edit {
                Edit::ListAdd => list.add(Clip::default()),
                Edit::ListRemove(index) => {
                    let len = list.len();
                    if len > 0 {
                        list.remove_at(index % len);
                    }
                }
                Edit::TreeAppend => lane.append_child(Node::new("clip"), None),
                Edit::TreeAppendOther => lane.append_child(Node::new("marker"), None),
                Edit::TreeInsert(index) => {
                    lane.insert_child(index, Node::new("clip"), None);
                }
                Edit::TreeRemove(index) => {
                    let count = lane.child_count();
                    if count > 0 {
                        lane.remove_child_at(index % count, None);
                    }
                }
                Edit::TreeMove(from, to) => {
                    let count = lane.child_count();
                    if count > 0 {
                        lane.move_child(from % count, to % count, None);
                    }
                }
            }
        }

        let mirror: Vec<Node> = lane
            .children()
            .into_iter()
            .filter(|child| child.tag() == "clip")
            .collect();
        prop_assert_eq!(list.nodes(), mirror);
    }
}
