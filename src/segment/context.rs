//! Traversal context threaded through the declaration walk.
//!
//! Each recursive call receives the context of its enclosing declaration
//! and derives a new one for its children with [`TraversalContext::enter`].
//! Nothing is pushed or popped, so sibling subtrees never observe each
//! other's state.

/// Enclosing-declaration state for one point in the walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalContext {
    parent_id: Option<String>,
    parent_fqn: Option<String>,
    depth: usize,
}

impl TraversalContext {
    /// Context for top-level declarations of a file.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Derive the context for children of a declaration.
    ///
    /// `id` is `None` when the declaration itself was not emitted; its
    /// children then stay attached to the nearest emitted ancestor.
    #[must_use]
    pub fn enter(&self, id: Option<&str>, fqn: &str) -> Self {
        Self {
            parent_id: id.map(str::to_string).or_else(|| self.parent_id.clone()),
            parent_fqn: Some(fqn.to_string()),
            depth: self.depth + 1,
        }
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    #[must_use]
    pub fn parent_fqn(&self) -> Option<&str> {
        self.parent_fqn.as_deref()
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// `Outer.Name` for nested types, `package.Name` at top level.
    #[must_use]
    pub fn type_fqn(&self, package: Option<&str>, name: &str) -> String {
        match (self.parent_fqn(), package) {
            (Some(parent), _) => format!("{parent}.{name}"),
            (None, Some(package)) if !package.is_empty() => format!("{package}.{name}"),
            _ => name.to_string(),
        }
    }

    /// `Owner#member`.
    #[must_use]
    pub fn member_fqn(&self, name: &str) -> String {
        self.parent_fqn()
            .map_or_else(|| name.to_string(), |parent| format!("{parent}#{name}"))
    }

    /// `Owner#static_initializer` or `Owner#instance_initializer`.
    #[must_use]
    pub fn initializer_fqn(&self, is_static: bool) -> String {
        let suffix = if is_static {
            "static_initializer"
        } else {
            "instance_initializer"
        };
        self.member_fqn(suffix)
    }

    /// `module#requires:java.sql`.
    #[must_use]
    pub fn directive_fqn(&self, keyword: &str, name: &str) -> String {
        self.member_fqn(&format!("{keyword}:{name}"))
    }
}
