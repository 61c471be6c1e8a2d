//! Sharing scope names and the scope tree
//!
//! Sharing scopes form a tree rooted at the global scope (the empty name).
//! A part resolved into a scope shares one cached instance per scope
//! *instance* at execution time; the tree declared here only fixes the
//! static nesting relationship the resolver and engine both consult.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Name of a sharing scope.
///
/// The empty name is reserved for the global scope, which always exists
/// and roots the tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeName(String);

impl ScopeName {
    /// The global scope (empty name)
    pub fn global() -> Self {
        Self(String::new())
    }

    /// Create a named scope
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// True for the global scope
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// Name as a string slice (empty for the global scope)
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "<global>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for ScopeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ScopeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Sharing assignment of a part after resolution completes.
///
/// Resolution replaces every inferred declaration with a concrete scope,
/// so the post-resolution model has exactly two cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedSharing {
    /// A fresh instance per request; never cached
    NonShared,
    /// One cached instance per instance of the named scope
    Shared(ScopeName),
}

impl ResolvedSharing {
    /// The scope name, if shared
    pub fn scope(&self) -> Option<&ScopeName> {
        match self {
            ResolvedSharing::NonShared => None,
            ResolvedSharing::Shared(s) => Some(s),
        }
    }
}

/// Errors raised while declaring the scope tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeTreeError {
    /// The global scope cannot be re-declared or given a parent
    #[error("the global scope is implicit and cannot be declared")]
    GlobalReserved,

    /// Scope declared twice
    #[error("scope `{0}` is already declared")]
    AlreadyDeclared(ScopeName),

    /// Parent scope does not exist
    #[error("scope `{scope}` declares unknown parent `{parent}`")]
    UnknownParent {
        /// Scope being declared
        scope: ScopeName,
        /// The missing parent
        parent: ScopeName,
    },
}

/// Static tree of sharing scopes, rooted at the global scope.
///
/// Declaration order requires parents before children, which keeps the
/// structure acyclic by construction. The tree is embedded in lowered
/// plans so a reloaded plan carries the same nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeTree {
    /// child -> parent; the global root is implicit and never stored
    parents: BTreeMap<ScopeName, ScopeName>,
}

impl ScopeTree {
    /// Tree containing only the global scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` directly under `parent`.
    ///
    /// The parent must be the global scope or already declared.
    pub fn declare(
        &mut self,
        child: impl Into<ScopeName>,
        parent: impl Into<ScopeName>,
    ) -> Result<(), ScopeTreeError> {
        let child = child.into();
        let parent = parent.into();
        if child.is_global() {
            return Err(ScopeTreeError::GlobalReserved);
        }
        if self.parents.contains_key(&child) {
            return Err(ScopeTreeError::AlreadyDeclared(child));
        }
        if !self.contains(&parent) {
            return Err(ScopeTreeError::UnknownParent {
                scope: child,
                parent,
            });
        }
        self.parents.insert(child, parent);
        Ok(())
    }

    /// True if the scope exists in the tree (the global scope always does)
    pub fn contains(&self, scope: &ScopeName) -> bool {
        scope.is_global() || self.parents.contains_key(scope)
    }

    /// Parent of a declared scope; `None` for the global scope or an
    /// unknown name (check `contains` first to distinguish).
    pub fn parent(&self, scope: &ScopeName) -> Option<&ScopeName> {
        self.parents.get(scope)
    }

    /// Scopes from `scope` up to and including the global root
    pub fn ancestors_of(&self, scope: &ScopeName) -> Vec<ScopeName> {
        let mut chain = vec![scope.clone()];
        let mut current = scope;
        while let Some(parent) = self.parents.get(current) {
            chain.push(parent.clone());
            current = parent;
        }
        if !chain.last().map(ScopeName::is_global).unwrap_or(false) {
            chain.push(ScopeName::global());
        }
        chain
    }

    /// True if `ancestor` is `scope` itself or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: &ScopeName, scope: &ScopeName) -> bool {
        if ancestor.is_global() {
            return true;
        }
        let mut current = Some(scope);
        while let Some(s) = current {
            if s == ancestor {
                return true;
            }
            current = self.parents.get(s);
        }
        false
    }

    /// Depth below the global root (global = 0)
    pub fn depth(&self, scope: &ScopeName) -> usize {
        self.ancestors_of(scope).len() - 1
    }

    /// Scopes to enter, outermost first, to get from `ancestor` down to
    /// `descendant` (exclusive of `ancestor`, inclusive of `descendant`).
    ///
    /// Returns `None` when `ancestor` is not actually an ancestor-or-self
    /// of `descendant`; returns an empty path when they are equal.
    pub fn path(&self, ancestor: &ScopeName, descendant: &ScopeName) -> Option<Vec<ScopeName>> {
        if !self.contains(descendant) {
            return None;
        }
        let mut path = Vec::new();
        let mut current = descendant.clone();
        loop {
            if &current == ancestor {
                path.reverse();
                return Some(path);
            }
            if current.is_global() {
                return None;
            }
            path.push(current.clone());
            current = match self.parents.get(&current) {
                Some(p) => p.clone(),
                None => ScopeName::global(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ScopeTree {
        // global -> session -> request -> operation
        //                   -> batch
        let mut tree = ScopeTree::new();
        tree.declare("session", ScopeName::global()).unwrap();
        tree.declare("request", "session").unwrap();
        tree.declare("operation", "request").unwrap();
        tree.declare("batch", "session").unwrap();
        tree
    }

    #[test]
    fn test_global_is_implicit_root() {
        let tree = ScopeTree::new();
        assert!(tree.contains(&ScopeName::global()));
        assert_eq!(tree.depth(&ScopeName::global()), 0);
        assert!(tree.parent(&ScopeName::global()).is_none());
    }

    #[test]
    fn test_declare_requires_known_parent() {
        let mut tree = ScopeTree::new();
        let err = tree.declare("request", "session").unwrap_err();
        assert!(matches!(err, ScopeTreeError::UnknownParent { .. }));
    }

    #[test]
    fn test_declare_rejects_global_and_duplicates() {
        let mut tree = ScopeTree::new();
        assert!(matches!(
            tree.declare(ScopeName::global(), ScopeName::global()),
            Err(ScopeTreeError::GlobalReserved)
        ));
        tree.declare("session", ScopeName::global()).unwrap();
        assert!(matches!(
            tree.declare("session", ScopeName::global()),
            Err(ScopeTreeError::AlreadyDeclared(_))
        ));
    }

    #[test]
    fn test_ancestor_or_self() {
        let tree = sample_tree();
        let global = ScopeName::global();
        let session = ScopeName::new("session");
        let request = ScopeName::new("request");
        let batch = ScopeName::new("batch");

        assert!(tree.is_ancestor_or_self(&global, &request));
        assert!(tree.is_ancestor_or_self(&session, &request));
        assert!(tree.is_ancestor_or_self(&request, &request));
        assert!(!tree.is_ancestor_or_self(&request, &session));
        assert!(!tree.is_ancestor_or_self(&batch, &request));
    }

    #[test]
    fn test_depth_and_ancestors() {
        let tree = sample_tree();
        let operation = ScopeName::new("operation");
        assert_eq!(tree.depth(&operation), 3);
        let chain = tree.ancestors_of(&operation);
        assert_eq!(
            chain,
            vec![
                ScopeName::new("operation"),
                ScopeName::new("request"),
                ScopeName::new("session"),
                ScopeName::global(),
            ]
        );
    }

    #[test]
    fn test_path_between_scopes() {
        let tree = sample_tree();
        let global = ScopeName::global();
        let session = ScopeName::new("session");
        let operation = ScopeName::new("operation");
        let batch = ScopeName::new("batch");

        assert_eq!(
            tree.path(&session, &operation),
            Some(vec![ScopeName::new("request"), ScopeName::new("operation")])
        );
        assert_eq!(tree.path(&session, &session), Some(vec![]));
        assert_eq!(
            tree.path(&global, &batch),
            Some(vec![ScopeName::new("session"), ScopeName::new("batch")])
        );
        // batch is not an ancestor of operation
        assert_eq!(tree.path(&batch, &operation), None);
    }

    #[test]
    fn test_scope_name_display() {
        assert_eq!(ScopeName::global().to_string(), "<global>");
        assert_eq!(ScopeName::new("request").to_string(), "request");
    }
}
