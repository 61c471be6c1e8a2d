//! Graph resolution
//!
//! The central algorithm: rooting, expansion, cardinality checks, cycle
//! classification, scope inference, and prohibited-scope checks. Errors
//! from every phase are aggregated into one report; resolution always
//! completes and returns whatever graph could be built so tooling can
//! render partial results.

use crate::graph::{CompositionGraph, GraphNode, ResolvedImport};
use crate::matcher::match_import;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use weft_core::{
    Cardinality, Catalog, CompositionError, CyclePath, ErrorReport, PartDeclaration, PartId,
    ResolvedSharing, ScopeName, ScopeTree, SharingDeclaration,
};

/// How a caller treats a resolution with outstanding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TolerancePolicy {
    /// Any error fails the composition
    Strict,
    /// Prune the offending parts and proceed with the satisfiable subset.
    /// Internal-consistency defects are never tolerated.
    Degraded,
}

/// Resolver output: the best-effort graph plus every collected error
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The graph, complete when `errors` is empty
    pub graph: CompositionGraph,
    /// Aggregated composition errors from all phases
    pub errors: ErrorReport,
}

impl Resolution {
    /// True when resolution produced no errors
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Apply a tolerance policy.
    ///
    /// `Strict` returns the error report unless the resolution is clean.
    /// `Degraded` removes every part named by an error, then transitively
    /// removes parts whose `exactly-one` imports lost their match, and
    /// returns the remaining subset.
    pub fn into_graph(self, policy: TolerancePolicy) -> Result<CompositionGraph, ErrorReport> {
        if self.errors.is_empty() {
            return Ok(self.graph);
        }
        match policy {
            TolerancePolicy::Strict => Err(self.errors),
            TolerancePolicy::Degraded => {
                if self.errors.has_internal() {
                    return Err(self.errors);
                }

                let mut graph = self.graph;
                let mut doomed = BTreeSet::new();
                for error in self.errors.iter() {
                    match error {
                        CompositionError::IllegalEagerCycle { path } => {
                            doomed.extend(path.0.iter().cloned());
                        }
                        other => {
                            if let Some(part) = other.part() {
                                doomed.insert(part.clone());
                            }
                        }
                    }
                }

                let mut pruned = 0usize;
                while !doomed.is_empty() {
                    for part in &doomed {
                        warn!(target: "weft::resolve", part = %part, "degraded mode: pruning part");
                    }
                    pruned += doomed.len();
                    graph.remove_nodes(&doomed);

                    // A pruned provider may strand a dependent's required import
                    doomed = graph
                        .nodes()
                        .filter(|(_, node)| {
                            node.imports.iter().any(|import| {
                                import.requirement.cardinality == Cardinality::ExactlyOne
                                    && import.matches.is_empty()
                            })
                        })
                        .map(|(id, _)| id.clone())
                        .collect();
                }

                info!(
                    target: "weft::resolve",
                    pruned,
                    remaining = graph.len(),
                    "degraded composition"
                );
                Ok(graph)
            }
        }
    }
}

/// Resolve a catalog into a composition graph.
///
/// Runs matching, cardinality validation, eager-cycle classification,
/// scope inference, and prohibited-scope checks. See [`Resolution`] for
/// how errors are surfaced.
pub fn resolve(catalog: &Catalog, scope_tree: &ScopeTree) -> Resolution {
    let mut errors = ErrorReport::new();

    let expanded = expand(catalog);
    debug!(
        target: "weft::resolve",
        parts = expanded.len(),
        catalog = catalog.len(),
        "expansion complete"
    );

    check_cardinality(&expanded, &mut errors);

    let adjacency = eager_adjacency(&expanded);

    for cycle in find_eager_cycles(&adjacency) {
        errors.push(CompositionError::IllegalEagerCycle { path: cycle });
    }

    let sharing = resolve_scopes(&expanded, &adjacency, scope_tree, &mut errors);

    check_scope_ordering(&adjacency, &sharing, scope_tree, &mut errors);
    check_prohibited(&expanded, &sharing, scope_tree, &mut errors);

    let nodes = expanded
        .into_iter()
        .map(|(id, (part, imports))| {
            let node = GraphNode {
                part,
                sharing: sharing.get(&id).cloned().unwrap_or(ResolvedSharing::NonShared),
                imports,
            };
            (id, node)
        })
        .collect();

    info!(
        target: "weft::resolve",
        errors = errors.len(),
        "resolution complete"
    );

    Resolution {
        graph: CompositionGraph::new(nodes, scope_tree.clone()),
        errors,
    }
}

type Expanded = BTreeMap<PartId, (Arc<PartDeclaration>, Vec<ResolvedImport>)>;

/// Rooting plus worklist expansion, memoized by part identity.
///
/// Roots are every part with at least one export, plus parts flagged as
/// always-available roots. Each part is expanded once regardless of fan-in.
fn expand(catalog: &Catalog) -> Expanded {
    let mut nodes: Expanded = BTreeMap::new();
    let mut visited: FxHashSet<PartId> = FxHashSet::default();
    let mut worklist: VecDeque<PartId> = catalog
        .iter()
        .filter(|p| !p.exports.is_empty() || p.root)
        .map(|p| p.id.clone())
        .collect();

    while let Some(id) = worklist.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let part = match catalog.get(&id) {
            Some(part) => Arc::clone(part),
            None => continue,
        };
        let imports: Vec<ResolvedImport> = part
            .imports()
            .map(|(site, requirement)| {
                let matches = match_import(catalog, requirement);
                for candidate in &matches {
                    worklist.push_back(candidate.part.clone());
                }
                ResolvedImport {
                    site,
                    requirement: requirement.clone(),
                    matches,
                }
            })
            .collect();
        nodes.insert(id, (part, imports));
    }
    nodes
}

fn check_cardinality(expanded: &Expanded, errors: &mut ErrorReport) {
    for (id, (_, imports)) in expanded {
        for import in imports {
            let found = import.matches.len();
            let violated = match import.requirement.cardinality {
                Cardinality::ExactlyOne => found != 1,
                Cardinality::ZeroOrOne => found > 1,
                Cardinality::Many => false,
            };
            if violated {
                errors.push(CompositionError::UnsatisfiableImport {
                    part: id.clone(),
                    site: import.site.clone(),
                    contract: import.requirement.contract.name().clone(),
                    expected: import.requirement.cardinality,
                    found,
                    candidates: import.matches.iter().map(|c| c.part.clone()).collect(),
                });
            }
        }
    }
}

/// Deduplicated consumer -> providers adjacency over eager imports only.
/// Every expanded part has an entry, possibly empty.
fn eager_adjacency(expanded: &Expanded) -> BTreeMap<PartId, BTreeSet<PartId>> {
    let mut adjacency: BTreeMap<PartId, BTreeSet<PartId>> = expanded
        .keys()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();
    for (id, (_, imports)) in expanded {
        let providers = adjacency.get_mut(id).unwrap();
        for import in imports {
            if import.is_eager() {
                // A self-match stays in; it is the degenerate one-part
                // cycle and must be reported as such.
                for candidate in &import.matches {
                    providers.insert(candidate.part.clone());
                }
            }
        }
    }
    adjacency
}

/// Depth-first cycle search over the eager subgraph.
///
/// Each distinct cycle is reported once, normalized to start at its
/// smallest part id so repeated resolution yields identical reports.
fn find_eager_cycles(adjacency: &BTreeMap<PartId, BTreeSet<PartId>>) -> Vec<CyclePath> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    let mut color: BTreeMap<&PartId, u8> = adjacency.keys().map(|id| (id, WHITE)).collect();
    let mut found: BTreeSet<Vec<PartId>> = BTreeSet::new();

    for start in adjacency.keys() {
        if color[start] != WHITE {
            continue;
        }
        let mut path: Vec<&PartId> = vec![start];
        let mut stack: Vec<std::collections::btree_set::Iter<'_, PartId>> =
            vec![adjacency[start].iter()];
        color.insert(start, GRAY);

        while !stack.is_empty() {
            let next = stack.last_mut().and_then(|it| it.next());
            match next {
                Some(provider) => match color.get(provider).copied().unwrap_or(BLACK) {
                    WHITE => {
                        color.insert(provider, GRAY);
                        path.push(provider);
                        stack.push(adjacency[provider].iter());
                    }
                    GRAY => {
                        if let Some(pos) = path.iter().position(|p| *p == provider) {
                            let cycle: Vec<PartId> =
                                path[pos..].iter().map(|p| (*p).clone()).collect();
                            found.insert(normalize_cycle(cycle));
                        }
                    }
                    _ => {}
                },
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        color.insert(done, BLACK);
                    }
                }
            }
        }
    }
    found.into_iter().map(CyclePath).collect()
}

/// Rotate the cycle so its smallest part id comes first
fn normalize_cycle(cycle: Vec<PartId>) -> Vec<PartId> {
    let min = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = cycle;
    rotated.rotate_left(min);
    rotated
}

/// Resolve every node's sharing, inferring scopes from eager dependents.
///
/// Nodes are processed consumers-before-providers over the acyclic eager
/// subgraph so a part's demand set is complete when it is reached. Scope
/// demands propagate through non-shared consumers. A part with no
/// scope-determining dependents defaults to the global scope; demand sets
/// with no dominating member are an ambiguity error (fallback: global).
fn resolve_scopes(
    expanded: &Expanded,
    adjacency: &BTreeMap<PartId, BTreeSet<PartId>>,
    tree: &ScopeTree,
    errors: &mut ErrorReport,
) -> BTreeMap<PartId, ResolvedSharing> {
    // Kahn order: a node is ready once all of its consumers are processed
    let mut pending: BTreeMap<&PartId, usize> =
        adjacency.keys().map(|id| (id, 0usize)).collect();
    for providers in adjacency.values() {
        for provider in providers {
            if let Some(count) = pending.get_mut(provider) {
                *count += 1;
            }
        }
    }
    let mut ready: BTreeSet<&PartId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order: Vec<&PartId> = Vec::with_capacity(adjacency.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for provider in &adjacency[id] {
            if let Some(count) = pending.get_mut(provider) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(provider);
                }
            }
        }
    }
    // Leftovers sit on eager cycles (already reported); order is moot
    for (id, count) in &pending {
        if *count > 0 {
            order.push(*id);
        }
    }

    let mut demands: BTreeMap<PartId, BTreeSet<ScopeName>> = BTreeMap::new();
    let mut resolved: BTreeMap<PartId, ResolvedSharing> = BTreeMap::new();

    for id in order {
        let (part, _) = &expanded[id];
        let sharing = match &part.sharing {
            SharingDeclaration::NonShared => ResolvedSharing::NonShared,
            SharingDeclaration::Scoped(scope) => {
                if tree.contains(scope) {
                    ResolvedSharing::Shared(scope.clone())
                } else {
                    errors.push(CompositionError::UnknownScope {
                        part: id.clone(),
                        scope: scope.clone(),
                    });
                    ResolvedSharing::Shared(ScopeName::global())
                }
            }
            SharingDeclaration::Inferred => {
                let demand = demands.get(id).cloned().unwrap_or_default();
                infer_scope(id, &demand, tree, errors)
            }
        };

        // Propagate scope demand to eager providers; a non-shared consumer
        // passes its own consumers' demands through unchanged.
        let contribution: BTreeSet<ScopeName> = match &sharing {
            ResolvedSharing::Shared(scope) => std::iter::once(scope.clone()).collect(),
            ResolvedSharing::NonShared => demands.get(id).cloned().unwrap_or_default(),
        };
        if !contribution.is_empty() {
            for provider in &adjacency[id] {
                demands
                    .entry(provider.clone())
                    .or_default()
                    .extend(contribution.iter().cloned());
            }
        }

        resolved.insert(id.clone(), sharing);
    }
    resolved
}

fn infer_scope(
    id: &PartId,
    demand: &BTreeSet<ScopeName>,
    tree: &ScopeTree,
    errors: &mut ErrorReport,
) -> ResolvedSharing {
    if demand.is_empty() {
        return ResolvedSharing::Shared(ScopeName::global());
    }
    // The demanded scope that outlives every other demand, if one exists
    let dominating = demand
        .iter()
        .find(|scope| demand.iter().all(|other| tree.is_ancestor_or_self(scope, other)));
    match dominating {
        Some(scope) => {
            debug!(target: "weft::resolve", part = %id, scope = %scope, "inferred scope");
            ResolvedSharing::Shared(scope.clone())
        }
        None => {
            errors.push(CompositionError::AmbiguousScope {
                part: id.clone(),
                scopes: demand.iter().cloned().collect(),
            });
            ResolvedSharing::Shared(ScopeName::global())
        }
    }
}

/// A provider must live at least as long as each eager consumer: its scope
/// must be ancestor-or-self of the consumer's.
fn check_scope_ordering(
    adjacency: &BTreeMap<PartId, BTreeSet<PartId>>,
    sharing: &BTreeMap<PartId, ResolvedSharing>,
    tree: &ScopeTree,
    errors: &mut ErrorReport,
) {
    for (consumer, providers) in adjacency {
        let consumer_scope = match sharing.get(consumer) {
            Some(ResolvedSharing::Shared(scope)) => scope,
            _ => continue,
        };
        for provider in providers {
            if let Some(ResolvedSharing::Shared(provider_scope)) = sharing.get(provider) {
                if !tree.is_ancestor_or_self(provider_scope, consumer_scope) {
                    errors.push(CompositionError::IncompatibleScope {
                        part: provider.clone(),
                        scope: provider_scope.clone(),
                        dependent: consumer.clone(),
                        dependent_scope: consumer_scope.clone(),
                    });
                }
            }
        }
    }
}

fn check_prohibited(
    expanded: &Expanded,
    sharing: &BTreeMap<PartId, ResolvedSharing>,
    tree: &ScopeTree,
    errors: &mut ErrorReport,
) {
    for (id, (part, _)) in expanded {
        let scope = match sharing.get(id) {
            Some(ResolvedSharing::Shared(scope)) => scope,
            _ => continue,
        };
        for prohibited in &part.prohibited_scopes {
            if tree.is_ancestor_or_self(prohibited, scope) {
                errors.push(CompositionError::ProhibitedScope {
                    part: id.clone(),
                    scope: prohibited.clone(),
                });
            }
        }
    }
}
