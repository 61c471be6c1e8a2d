//! The runtime composition plan
//!
//! A plan is the flattened, index-addressed form of a composition graph:
//! every part becomes one numbered node whose constructor and member slots
//! reference other nodes by index, never by name. Deferred edges become
//! boundary entries that capture just enough to instantiate later without
//! re-resolving. The plan is the unit of serialization; a decoded plan is
//! re-validated before use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use weft_core::{
    Cardinality, ContractName, HookName, Laziness, MemberName, Metadata, PartId, ResolvedSharing,
    ScopeName, ScopeTree,
};

/// Index of a node within a plan
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Index as usize, for slicing the node array
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One value feeding a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotValue {
    /// The instance of another node, or one of its exported members,
    /// constructed before this node by the DAG property
    Eager {
        /// Providing node; always smaller than the consuming node's index
        node: NodeIndex,
        /// Exporting member of the provider; `None` = the provider itself
        member: Option<MemberName>,
    },
    /// A handle built from the boundary entry at this position in the
    /// consuming node's boundary list
    Deferred {
        /// Index into the consuming node's `boundaries`
        boundary: u32,
    },
}

/// One constructor parameter or member assignment source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSlot {
    /// Declared cardinality of the originating import
    pub cardinality: Cardinality,
    /// Declared laziness; all values in a slot share it
    pub laziness: Laziness,
    /// Matched sources in stable match order
    pub values: Vec<SlotValue>,
}

/// A deferred edge, kept out of the eager DAG.
///
/// Captures the target index and the child-scope requirement so the
/// handle can instantiate later without any graph search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanBoundary {
    /// Node the handle resolves
    pub target: NodeIndex,
    /// Exporting member of the target; `None` = the target itself
    pub member: Option<MemberName>,
    /// Scope the handle must create (or fetch) before resolving; `None`
    /// when the target is resolvable on the invoking scope chain
    pub creates_scope: Option<ScopeName>,
}

/// One flattened part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Position in the plan; equals the node's slot in the array
    pub index: NodeIndex,
    /// Identity of the underlying part
    pub part: PartId,
    /// Resolved sharing
    pub sharing: ResolvedSharing,
    /// Constructor slots in parameter order; `None` for parts backed by a
    /// pre-built instance
    pub constructor: Option<Vec<PlanSlot>>,
    /// Member assignments in declaration order
    pub members: Vec<(MemberName, PlanSlot)>,
    /// Deferred edges leaving this node
    pub boundaries: Vec<PlanBoundary>,
    /// Post-construction hook to run after member assignment
    pub on_ready: Option<HookName>,
}

/// One entry in the contract lookup table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanExport {
    /// Providing node
    pub node: NodeIndex,
    /// Exporting member; `None` = the node's instance itself
    pub member: Option<MemberName>,
    /// Export metadata, matched against request constraints
    pub metadata: Metadata,
}

/// Structural defects of a plan.
///
/// Produced by [`CompositionPlan::validate`], which runs after lowering
/// and again after decoding so a corrupted or hand-edited plan cannot
/// reach the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A node's recorded index disagrees with its array position
    #[error("node `{part}` recorded index {recorded} at position {position}")]
    IndexMismatch {
        /// The inconsistent node
        part: PartId,
        /// Index stored in the node
        recorded: NodeIndex,
        /// Actual array position
        position: usize,
    },

    /// An eager slot references a node at or after the consumer
    #[error("node `{part}` has a forward eager reference to {referenced}")]
    ForwardEagerReference {
        /// Consuming node
        part: PartId,
        /// The offending reference
        referenced: NodeIndex,
    },

    /// A reference points outside the node array
    #[error("node `{part}` references {referenced}, but the plan has {len} nodes")]
    IndexOutOfRange {
        /// Referencing node
        part: PartId,
        /// The out-of-range reference
        referenced: NodeIndex,
        /// Plan length
        len: usize,
    },

    /// A slot's value count violates its cardinality
    #[error("node `{part}`: slot expected {expected} value(s), found {found}")]
    SlotShape {
        /// Owning node
        part: PartId,
        /// Declared cardinality
        expected: Cardinality,
        /// Actual value count
        found: usize,
    },

    /// A slot mixes laziness with its values
    #[error("node `{part}`: slot laziness disagrees with its values")]
    SlotLaziness {
        /// Owning node
        part: PartId,
    },

    /// A deferred value references a missing boundary entry
    #[error("node `{part}` references boundary {boundary}, but has {len} boundaries")]
    BoundaryOutOfRange {
        /// Owning node
        part: PartId,
        /// The out-of-range boundary index
        boundary: u32,
        /// Boundary list length
        len: usize,
    },

    /// An export table entry references a missing node
    #[error("export table for `{contract}` references {referenced}, but the plan has {len} nodes")]
    ExportOutOfRange {
        /// Contract of the bad entry
        contract: ContractName,
        /// The out-of-range reference
        referenced: NodeIndex,
        /// Plan length
        len: usize,
    },
}

/// Flattened, index-addressed, directly executable form of a composition
/// graph.
///
/// Execution walks node indices only; the embedded contract table and
/// scope tree make the plan self-contained for caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionPlan {
    /// Nodes in index order; eager references always point backwards
    pub nodes: Vec<PlanNode>,
    /// Contract name -> providing exports, in node-index order
    pub exports: BTreeMap<ContractName, Vec<PlanExport>>,
    /// The scope tree resolution ran against
    pub scope_tree: ScopeTree,
}

impl CompositionPlan {
    /// Look up a node
    pub fn node(&self, index: NodeIndex) -> Option<&PlanNode> {
        self.nodes.get(index.as_usize())
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for the empty plan
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Export entries for a contract name, in node-index order
    pub fn exports_for(&self, contract: &ContractName) -> &[PlanExport] {
        self.exports.get(contract).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Re-check the structural invariants.
    ///
    /// Restricted to eager references the indices must form a DAG, which
    /// the backward-reference rule guarantees; slot shapes must agree
    /// with their cardinalities and laziness.
    pub fn validate(&self) -> Result<(), PlanError> {
        let len = self.nodes.len();
        for (position, node) in self.nodes.iter().enumerate() {
            if node.index.as_usize() != position {
                return Err(PlanError::IndexMismatch {
                    part: node.part.clone(),
                    recorded: node.index,
                    position,
                });
            }

            let slots = node
                .constructor
                .iter()
                .flatten()
                .chain(node.members.iter().map(|(_, slot)| slot));
            for slot in slots {
                let found = slot.values.len();
                let shape_ok = match slot.cardinality {
                    Cardinality::ExactlyOne => found == 1,
                    Cardinality::ZeroOrOne => found <= 1,
                    Cardinality::Many => true,
                };
                if !shape_ok {
                    return Err(PlanError::SlotShape {
                        part: node.part.clone(),
                        expected: slot.cardinality,
                        found,
                    });
                }
                for value in &slot.values {
                    match value {
                        SlotValue::Eager { node: referenced, .. } => {
                            if slot.laziness != Laziness::Eager {
                                return Err(PlanError::SlotLaziness {
                                    part: node.part.clone(),
                                });
                            }
                            if referenced.as_usize() >= len {
                                return Err(PlanError::IndexOutOfRange {
                                    part: node.part.clone(),
                                    referenced: *referenced,
                                    len,
                                });
                            }
                            if referenced.as_usize() >= position {
                                return Err(PlanError::ForwardEagerReference {
                                    part: node.part.clone(),
                                    referenced: *referenced,
                                });
                            }
                        }
                        SlotValue::Deferred { boundary } => {
                            if slot.laziness != Laziness::Deferred {
                                return Err(PlanError::SlotLaziness {
                                    part: node.part.clone(),
                                });
                            }
                            if *boundary as usize >= node.boundaries.len() {
                                return Err(PlanError::BoundaryOutOfRange {
                                    part: node.part.clone(),
                                    boundary: *boundary,
                                    len: node.boundaries.len(),
                                });
                            }
                        }
                    }
                }
            }

            for boundary in &node.boundaries {
                if boundary.target.as_usize() >= len {
                    return Err(PlanError::IndexOutOfRange {
                        part: node.part.clone(),
                        referenced: boundary.target,
                        len,
                    });
                }
            }
        }

        for (contract, entries) in &self.exports {
            for entry in entries {
                if entry.node.as_usize() >= len {
                    return Err(PlanError::ExportOutOfRange {
                        contract: contract.clone(),
                        referenced: entry.node,
                        len,
                    });
                }
            }
        }
        Ok(())
    }
}
