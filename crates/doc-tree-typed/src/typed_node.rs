use doc_tree::{Journal, Node};

/// Binding state carried by every typed wrapper: the bound node (possibly
/// absent), the expected type tag and the journal threaded into mutations.
///
/// A freshly constructed `TypedNode` is unbound; binding happens through the
/// wrap protocol on [`NodeWrapper`]. Rebinding any number of times is fine.
/// Dropping a `TypedNode` never touches the underlying node.
#[derive(Default)]
pub struct TypedNode {
    node: Option<Node>,
    tag: Option<String>,
    journal: Option<Journal>,
}

impl TypedNode {
    pub fn new() -> TypedNode {
        TypedNode::default()
    }

    /// `true` iff a node is bound and carries the expected tag.
    pub fn is_valid(&self) -> bool {
        match (&self.node, &self.tag) {
            (Some(node), Some(tag)) => node.tag() == tag,
            _ => false,
        }
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    /// Runs the wrap protocol against `target` and returns whether a node
    /// ended up bound:
    ///
    /// 1. no target and creation allowed — create a fresh node of `tag`;
    /// 2. target carries `tag` — bind it directly;
    /// 3. child search allowed — bind the first child carrying `tag`,
    ///    creating one when none exists and creation is allowed;
    /// 4. otherwise unbound (a recoverable miss, not an error).
    ///
    /// An empty `tag` is a programming error.
    pub fn bind(
        &mut self,
        target: Option<&Node>,
        tag: &str,
        journal: Option<&Journal>,
        allow_create: bool,
        allow_child_search: bool,
    ) -> bool {
        debug_assert!(!tag.is_empty(), "wrap target tag must not be empty");
        self.node = None;
        self.tag = Some(tag.to_owned());
        self.journal = journal.cloned();
        match target {
            None => {
                if allow_create {
                    self.node = Some(Node::new(tag));
                }
            }
            Some(target) if target.tag() == tag => {
                self.node = Some(target.clone());
            }
            Some(target) if allow_child_search => {
                if let Some(child) = target.child_with_tag(tag) {
                    self.node = Some(child);
                } else if allow_create {
                    self.node = Some(target.get_or_create_child_with_tag(tag, journal));
                }
            }
            Some(_) => {}
        }
        self.is_valid()
    }
}

/// A strongly-typed view of one node.
///
/// Implementors embed a [`TypedNode`] plus whatever typed members
/// ([`TypedProperty`](crate::TypedProperty),
/// [`ObservedChildList`](crate::ObservedChildList),
/// [`OwningSlot`](crate::OwningSlot)) they expose, and re-attach those
/// members in [`bind_members`](NodeWrapper::bind_members).
///
/// Binding is always two-phase: construct first (`Default` for collection
/// elements), then call [`wrap`](NodeWrapper::wrap). The hook is only ever
/// reached through the provided wrap methods, never from a constructor.
pub trait NodeWrapper {
    fn typed_node(&self) -> &TypedNode;
    fn typed_node_mut(&mut self) -> &mut TypedNode;

    /// Invoked after every successful wrap, with the bound node available
    /// through [`typed_node`](NodeWrapper::typed_node). Attach typed
    /// properties and child collections here.
    fn bind_members(&mut self);

    /// Wrap with creation and child search enabled; see [`TypedNode::bind`].
    fn wrap(&mut self, target: Option<&Node>, tag: &str, journal: Option<&Journal>) -> bool {
        self.wrap_with(target, tag, journal, true, true)
    }

    fn wrap_with(
        &mut self,
        target: Option<&Node>,
        tag: &str,
        journal: Option<&Journal>,
        allow_create: bool,
        allow_child_search: bool,
    ) -> bool {
        let bound =
            self.typed_node_mut()
                .bind(target, tag, journal, allow_create, allow_child_search);
        if bound {
            self.bind_members();
        }
        bound
    }

    fn is_valid(&self) -> bool {
        self.typed_node().is_valid()
    }

    fn node(&self) -> Option<&Node> {
        self.typed_node().node()
    }

    /// Replaces this wrapper's node content with a deep copy of `source`'s
    /// and re-invokes the hook. A no-op unless both wrappers are valid and
    /// share the same tag.
    fn copy_from(&mut self, source: &dyn NodeWrapper) {
        if !self.is_valid()
            || !source.is_valid()
            || self.typed_node().tag() != source.typed_node().tag()
        {
            return;
        }
        let journal = self.typed_node().journal().cloned();
        let (dst, src) = match (self.typed_node().node(), source.typed_node().node()) {
            (Some(dst), Some(src)) => (dst.clone(), src.clone()),
            _ => return,
        };
        dst.copy_from(&src, journal.as_ref());
        self.bind_members();
    }
}
