//! Lowering a composition graph into a runtime composition plan
//!
//! Assigns every node a stable integer index (topological order over the
//! eager-edge DAG, ties broken by part id) so repeated lowering of an
//! equal graph produces identical plans. Each node's slots reference
//! already-assigned indices; deferred matches become boundary entries
//! that never need their target's index to exist at emit time.

use crate::plan::{
    CompositionPlan, NodeIndex, PlanBoundary, PlanExport, PlanNode, PlanSlot, SlotValue,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::info;
use weft_core::{
    Cardinality, ContractName, ImportSite, MemberName, PartId, ResolvedSharing, ScopeTree,
};
use weft_resolver::{CompositionGraph, GraphNode, ResolvedImport};

/// Lowering failures.
///
/// A graph that passed strict resolution never triggers these; they guard
/// against lowering a graph extracted with outstanding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    /// The eager subgraph contains a cycle
    #[error("eager dependency cycle prevents lowering; stuck parts: {stuck:?}")]
    EagerCycle {
        /// Parts that could not be ordered
        stuck: Vec<PartId>,
    },

    /// An import's match count violates its cardinality
    #[error("part `{part}`, {site}: {found} matches where {expected} was required")]
    InvalidCardinality {
        /// Importing part
        part: PartId,
        /// Import site
        site: ImportSite,
        /// Declared cardinality
        expected: Cardinality,
        /// Actual match count
        found: usize,
    },

    /// A match references a part absent from the graph
    #[error("part `{part}` matches `{missing}`, which is not in the graph")]
    MissingNode {
        /// Importing part
        part: PartId,
        /// The absent provider
        missing: PartId,
    },
}

/// Lower a validated graph into a flattened plan.
///
/// Deterministic: lowering the same graph twice, or two structurally
/// equal graphs built in different orders, yields identical plans.
pub fn lower(graph: &CompositionGraph) -> Result<CompositionPlan, LowerError> {
    let order = assign_indices(graph)?;
    let index_of: BTreeMap<&PartId, NodeIndex> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, NodeIndex(i as u32)))
        .collect();

    let mut nodes = Vec::with_capacity(order.len());
    for id in &order {
        let node = graph.node(id).expect("ordered id came from the graph");
        nodes.push(lower_node(graph, id, node, &index_of)?);
    }

    let exports = export_table(graph, &nodes, &index_of);

    let plan = CompositionPlan {
        nodes,
        exports,
        scope_tree: graph.scope_tree().clone(),
    };
    debug_assert!(plan.validate().is_ok());
    info!(target: "weft::lower", nodes = plan.len(), "lowering complete");
    Ok(plan)
}

/// Providers-first topological order, ties broken by part id.
fn assign_indices(graph: &CompositionGraph) -> Result<Vec<&PartId>, LowerError> {
    // Deduplicated eager dependencies per node
    let mut deps: BTreeMap<&PartId, BTreeSet<&PartId>> = BTreeMap::new();
    let mut consumers: BTreeMap<&PartId, Vec<&PartId>> = BTreeMap::new();
    for (id, node) in graph.nodes() {
        let entry = deps.entry(id).or_default();
        for provider in node.eager_dependencies() {
            if entry.insert(provider) {
                consumers.entry(provider).or_default().push(id);
            }
        }
    }

    let mut ready: BTreeSet<&PartId> = deps
        .iter()
        .filter(|(_, d)| d.is_empty())
        .map(|(id, _)| *id)
        .collect();
    let mut remaining: BTreeMap<&PartId, usize> = deps
        .iter()
        .map(|(id, d)| (*id, d.len()))
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        if let Some(consumers) = consumers.get(id) {
            for consumer in consumers {
                let count = remaining.get_mut(consumer).expect("consumer is a node");
                *count -= 1;
                if *count == 0 {
                    ready.insert(consumer);
                }
            }
        }
        remaining.remove(id);
    }

    // Popped nodes were removed from `remaining`; leftovers are cyclic
    let stuck: Vec<PartId> = remaining.keys().map(|id| (*id).clone()).collect();
    if !stuck.is_empty() {
        return Err(LowerError::EagerCycle { stuck });
    }
    Ok(order)
}

fn lower_node(
    graph: &CompositionGraph,
    id: &PartId,
    node: &GraphNode,
    index_of: &BTreeMap<&PartId, NodeIndex>,
) -> Result<PlanNode, LowerError> {
    let index = index_of[id];
    let mut boundaries = Vec::new();
    let mut ctor_slots = Vec::new();
    let mut member_slots: Vec<(MemberName, PlanSlot)> = Vec::new();

    for import in &node.imports {
        let slot = lower_slot(graph, id, node, import, index_of, &mut boundaries)?;
        match &import.site {
            ImportSite::Constructor(_) => ctor_slots.push(slot),
            ImportSite::Member(member) => member_slots.push((member.clone(), slot)),
        }
    }

    Ok(PlanNode {
        index,
        part: id.clone(),
        sharing: node.sharing.clone(),
        constructor: node.part.constructor.as_ref().map(|_| ctor_slots),
        members: member_slots,
        boundaries,
        on_ready: node.part.on_ready.clone(),
    })
}

fn lower_slot(
    graph: &CompositionGraph,
    id: &PartId,
    node: &GraphNode,
    import: &ResolvedImport,
    index_of: &BTreeMap<&PartId, NodeIndex>,
    boundaries: &mut Vec<PlanBoundary>,
) -> Result<PlanSlot, LowerError> {
    let found = import.matches.len();
    let shape_ok = match import.requirement.cardinality {
        Cardinality::ExactlyOne => found == 1,
        Cardinality::ZeroOrOne => found <= 1,
        Cardinality::Many => true,
    };
    if !shape_ok {
        return Err(LowerError::InvalidCardinality {
            part: id.clone(),
            site: import.site.clone(),
            expected: import.requirement.cardinality,
            found,
        });
    }

    let mut values = Vec::with_capacity(found);
    for candidate in &import.matches {
        let provider = graph
            .node(&candidate.part)
            .ok_or_else(|| LowerError::MissingNode {
                part: id.clone(),
                missing: candidate.part.clone(),
            })?;
        let target = index_of[&candidate.part];
        let member = provider.part.exports[candidate.export].member.clone();

        if import.is_eager() {
            values.push(SlotValue::Eager {
                node: target,
                member,
            });
        } else {
            let boundary = boundaries.len() as u32;
            boundaries.push(PlanBoundary {
                target,
                member,
                creates_scope: creates_scope(&node.sharing, &provider.sharing, graph.scope_tree()),
            });
            values.push(SlotValue::Deferred { boundary });
        }
    }

    Ok(PlanSlot {
        cardinality: import.requirement.cardinality,
        laziness: import.requirement.laziness,
        values,
    })
}

/// Child-scope requirement of a deferred edge.
///
/// Set when the target's scope is not already guaranteed to be on the
/// consumer's scope chain at invocation time.
fn creates_scope(
    consumer: &ResolvedSharing,
    target: &ResolvedSharing,
    tree: &ScopeTree,
) -> Option<weft_core::ScopeName> {
    let target_scope = match target {
        ResolvedSharing::NonShared => return None,
        ResolvedSharing::Shared(scope) => scope,
    };
    let on_chain = match consumer {
        ResolvedSharing::Shared(consumer_scope) => {
            tree.is_ancestor_or_self(target_scope, consumer_scope)
        }
        // A non-shared consumer's chain is unknown statically; only the
        // global scope is guaranteed to be on it.
        ResolvedSharing::NonShared => target_scope.is_global(),
    };
    if on_chain {
        None
    } else {
        Some(target_scope.clone())
    }
}

fn export_table(
    graph: &CompositionGraph,
    nodes: &[PlanNode],
    index_of: &BTreeMap<&PartId, NodeIndex>,
) -> BTreeMap<ContractName, Vec<PlanExport>> {
    let mut table: BTreeMap<ContractName, Vec<PlanExport>> = BTreeMap::new();
    // Node-index order keeps each entry list deterministic
    for plan_node in nodes {
        let node = graph.node(&plan_node.part).expect("plan node is in graph");
        for export in &node.part.exports {
            table
                .entry(export.contract.name().clone())
                .or_default()
                .push(PlanExport {
                    node: index_of[&plan_node.part],
                    member: export.member.clone(),
                    metadata: export.metadata.clone(),
                });
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{Catalog, Contract, ImportRequirement, PartDeclaration, ScopeName};
    use weft_resolver::{resolve, TolerancePolicy};

    fn lower_catalog(parts: Vec<PartDeclaration>, tree: &ScopeTree) -> CompositionPlan {
        let graph = resolve(&Catalog::from_parts(parts), tree)
            .into_graph(TolerancePolicy::Strict)
            .expect("clean resolution");
        lower(&graph).expect("lowering")
    }

    fn scope_tree() -> ScopeTree {
        let mut tree = ScopeTree::new();
        tree.declare("session", ScopeName::global()).unwrap();
        tree.declare("request", "session").unwrap();
        tree
    }

    fn chain_parts() -> Vec<PartDeclaration> {
        vec![
            PartDeclaration::builder("app::Server")
                .export(Contract::new("server"))
                .constructor([ImportRequirement::one(Contract::new("config"))])
                .shared()
                .build()
                .unwrap(),
            PartDeclaration::builder("app::Config")
                .export(Contract::new("config"))
                .constructor([])
                .shared()
                .build()
                .unwrap(),
        ]
    }

    #[test]
    fn test_eager_references_point_backwards() {
        let plan = lower_catalog(chain_parts(), &ScopeTree::new());
        assert_eq!(plan.len(), 2);
        assert!(plan.validate().is_ok());

        // Provider gets the smaller index
        let config = &plan.nodes[0];
        let server = &plan.nodes[1];
        assert_eq!(config.part, PartId::named("app::Config"));
        assert_eq!(server.part, PartId::named("app::Server"));
        match &server.constructor.as_ref().unwrap()[0].values[0] {
            SlotValue::Eager { node, member } => {
                assert_eq!(*node, NodeIndex(0));
                assert!(member.is_none());
            }
            other => panic!("expected eager value, got {other:?}"),
        }
    }

    #[test]
    fn test_lowering_is_deterministic() {
        let a = lower_catalog(chain_parts(), &ScopeTree::new());
        let b = lower_catalog(chain_parts(), &ScopeTree::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_equal_graphs_from_different_orders_lower_identically() {
        let mut reversed = chain_parts();
        reversed.reverse();
        let a = lower_catalog(chain_parts(), &ScopeTree::new());
        let b = lower_catalog(reversed, &ScopeTree::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_ties_break_by_part_id() {
        let parts = vec![
            PartDeclaration::builder("app::Zeta")
                .export(Contract::new("z"))
                .constructor([])
                .build()
                .unwrap(),
            PartDeclaration::builder("app::Alpha")
                .export(Contract::new("a"))
                .constructor([])
                .build()
                .unwrap(),
        ];
        let plan = lower_catalog(parts, &ScopeTree::new());
        assert_eq!(plan.nodes[0].part, PartId::named("app::Alpha"));
        assert_eq!(plan.nodes[1].part, PartId::named("app::Zeta"));
    }

    #[test]
    fn test_deferred_match_becomes_boundary() {
        let parts = vec![
            PartDeclaration::builder("app::A")
                .export(Contract::new("a"))
                .constructor([ImportRequirement::one(Contract::new("b")).deferred()])
                .shared()
                .build()
                .unwrap(),
            PartDeclaration::builder("app::B")
                .export(Contract::new("b"))
                .constructor([ImportRequirement::one(Contract::new("a"))])
                .shared()
                .build()
                .unwrap(),
        ];
        let plan = lower_catalog(parts, &ScopeTree::new());

        let a = plan
            .nodes
            .iter()
            .find(|n| n.part == PartId::named("app::A"))
            .unwrap();
        assert_eq!(a.boundaries.len(), 1);
        let b_index = plan
            .nodes
            .iter()
            .find(|n| n.part == PartId::named("app::B"))
            .unwrap()
            .index;
        assert_eq!(a.boundaries[0].target, b_index);
        // Both are globally shared: no child scope required
        assert!(a.boundaries[0].creates_scope.is_none());
        match &a.constructor.as_ref().unwrap()[0].values[0] {
            SlotValue::Deferred { boundary } => assert_eq!(*boundary, 0),
            other => panic!("expected deferred value, got {other:?}"),
        }
    }

    #[test]
    fn test_boundary_into_child_scope_sets_creates_scope() {
        // A global listener holds a deferred handle to a request-scoped
        // handler; invoking the handle must create the request scope.
        let tree = scope_tree();
        let parts = vec![
            PartDeclaration::builder("app::Listener")
                .export(Contract::new("listener"))
                .constructor([ImportRequirement::one(Contract::new("handler")).deferred()])
                .shared()
                .build()
                .unwrap(),
            PartDeclaration::builder("app::Handler")
                .export(Contract::new("handler"))
                .constructor([])
                .shared_in("request")
                .build()
                .unwrap(),
        ];
        let plan = lower_catalog(parts, &tree);
        let listener = plan
            .nodes
            .iter()
            .find(|n| n.part == PartId::named("app::Listener"))
            .unwrap();
        assert_eq!(
            listener.boundaries[0].creates_scope,
            Some(ScopeName::new("request"))
        );
    }

    #[test]
    fn test_boundary_up_the_chain_needs_no_scope() {
        // A request-scoped part deferring to a session-scoped one: the
        // session instance is on the chain already.
        let tree = scope_tree();
        let parts = vec![
            PartDeclaration::builder("app::Handler")
                .export(Contract::new("handler"))
                .constructor([ImportRequirement::one(Contract::new("session-state")).deferred()])
                .shared_in("request")
                .build()
                .unwrap(),
            PartDeclaration::builder("app::SessionState")
                .export(Contract::new("session-state"))
                .constructor([])
                .shared_in("session")
                .build()
                .unwrap(),
        ];
        let plan = lower_catalog(parts, &tree);
        let handler = plan
            .nodes
            .iter()
            .find(|n| n.part == PartId::named("app::Handler"))
            .unwrap();
        assert!(handler.boundaries[0].creates_scope.is_none());
    }

    #[test]
    fn test_member_export_reference_carries_member() {
        let parts = vec![
            PartDeclaration::builder("app::Host")
                .export(Contract::new("host"))
                .member_export("pool", Contract::new("pool"))
                .constructor([])
                .shared()
                .build()
                .unwrap(),
            PartDeclaration::builder("app::Worker")
                .export(Contract::new("worker"))
                .constructor([ImportRequirement::one(Contract::new("pool"))])
                .shared()
                .build()
                .unwrap(),
        ];
        let plan = lower_catalog(parts, &ScopeTree::new());
        let worker = plan
            .nodes
            .iter()
            .find(|n| n.part == PartId::named("app::Worker"))
            .unwrap();
        match &worker.constructor.as_ref().unwrap()[0].values[0] {
            SlotValue::Eager { member, .. } => {
                assert_eq!(member.as_ref().unwrap().as_str(), "pool");
            }
            other => panic!("expected eager value, got {other:?}"),
        }
    }

    #[test]
    fn test_export_table_covers_all_exports() {
        let plan = lower_catalog(chain_parts(), &ScopeTree::new());
        assert_eq!(plan.exports_for(&ContractName::new("server")).len(), 1);
        assert_eq!(plan.exports_for(&ContractName::new("config")).len(), 1);
        assert!(plan.exports_for(&ContractName::new("absent")).is_empty());
    }

    #[test]
    fn test_member_import_becomes_member_slot() {
        let parts = vec![
            PartDeclaration::builder("app::Service")
                .export(Contract::new("service"))
                .constructor([])
                .member_import("logger", ImportRequirement::one(Contract::new("logging")))
                .shared()
                .build()
                .unwrap(),
            PartDeclaration::builder("app::Logger")
                .export(Contract::new("logging"))
                .constructor([])
                .shared()
                .build()
                .unwrap(),
        ];
        let plan = lower_catalog(parts, &ScopeTree::new());
        let service = plan
            .nodes
            .iter()
            .find(|n| n.part == PartId::named("app::Service"))
            .unwrap();
        assert!(service.constructor.as_ref().unwrap().is_empty());
        assert_eq!(service.members.len(), 1);
        assert_eq!(service.members[0].0.as_str(), "logger");
    }
}
