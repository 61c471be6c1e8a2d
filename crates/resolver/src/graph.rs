//! Validated composition graph
//!
//! The resolver's output: one node per reachable part, each carrying its
//! resolved sharing (never inferred once resolution completes) and, for
//! every import, the concrete list of matched exports.

use crate::matcher::ExportCandidate;
use std::collections::BTreeMap;
use std::sync::Arc;
use weft_core::{
    ImportRequirement, ImportSite, Laziness, PartDeclaration, PartId, ResolvedSharing, ScopeTree,
};

/// One import of a node after matching
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImport {
    /// Where the import lives on the part
    pub site: ImportSite,
    /// The declared requirement
    pub requirement: ImportRequirement,
    /// Matched exports, in stable matcher order (empty if optional and
    /// unmatched)
    pub matches: Vec<ExportCandidate>,
}

impl ResolvedImport {
    /// True for eager imports
    pub fn is_eager(&self) -> bool {
        self.requirement.laziness == Laziness::Eager
    }
}

/// One part in the composition graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// The underlying declaration
    pub part: Arc<PartDeclaration>,
    /// Resolved sharing; inference has already been applied
    pub sharing: ResolvedSharing,
    /// Constructor imports in parameter order, then member imports in
    /// declaration order
    pub imports: Vec<ResolvedImport>,
}

impl GraphNode {
    /// Providing parts of this node's eager imports, in import order.
    /// A provider appearing in several imports is yielded once per edge.
    pub fn eager_dependencies(&self) -> impl Iterator<Item = &PartId> {
        self.imports
            .iter()
            .filter(|i| i.is_eager())
            .flat_map(|i| i.matches.iter().map(|c| &c.part))
    }
}

/// Validated, in-memory dependency graph prior to flattening.
///
/// Nodes are keyed by part identity; iteration order is identity order so
/// downstream lowering is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionGraph {
    nodes: BTreeMap<PartId, GraphNode>,
    scope_tree: ScopeTree,
}

impl CompositionGraph {
    pub(crate) fn new(nodes: BTreeMap<PartId, GraphNode>, scope_tree: ScopeTree) -> Self {
        Self { nodes, scope_tree }
    }

    /// Look up a node by part identity
    pub fn node(&self, id: &PartId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Iterate nodes in identity order
    pub fn nodes(&self) -> impl Iterator<Item = (&PartId, &GraphNode)> {
        self.nodes.iter()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for the empty graph
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The scope tree resolution ran against
    pub fn scope_tree(&self) -> &ScopeTree {
        &self.scope_tree
    }

    pub(crate) fn remove_nodes(&mut self, ids: &std::collections::BTreeSet<PartId>) {
        self.nodes.retain(|id, _| !ids.contains(id));
        for node in self.nodes.values_mut() {
            for import in &mut node.imports {
                import.matches.retain(|c| !ids.contains(&c.part));
            }
        }
    }
}
