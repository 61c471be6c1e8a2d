//! The execution engine
//!
//! Binds a composition plan to a factory registry once (the indirect-call
//! table), then satisfies capability requests by walking node indices:
//! no name lookup and no graph search happens per request. Shared nodes
//! cache per scope instance; non-shared nodes construct fresh every time.

use crate::deferred::DeferredExport;
use crate::linker::{Backing, BoundNode, FactoryRegistry, ImportValue, Instance, LinkError};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::scope::{find_scope, ScopeId, ScopeInstance};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use weft_core::{
    Cardinality, Contract, ContractName, Error, Laziness, MemberName, PartId, ResolvedSharing,
    Result, ScopeName,
};
use weft_plan::{CompositionPlan, NodeIndex, PlanNode, SlotValue};

pub(crate) struct EngineCore {
    pub(crate) plan: CompositionPlan,
    pub(crate) bound: Vec<BoundNode>,
    pub(crate) root: Arc<ScopeInstance>,
    pub(crate) metrics: EngineMetrics,
    weak_self: Weak<EngineCore>,
}

fn corrupt(part: &PartId, what: &str) -> Error {
    Error::ConstructionFailed {
        part: part.clone(),
        source: format!("internal plan inconsistency: {}", what).into(),
    }
}

impl EngineCore {
    /// Resolve a node, honoring its sharing.
    pub(crate) fn instantiate(
        &self,
        index: NodeIndex,
        current: &Arc<ScopeInstance>,
    ) -> Result<Instance> {
        let node = &self.plan.nodes[index.as_usize()];
        match &node.sharing {
            ResolvedSharing::NonShared => {
                let _guard = current.begin_build()?;
                let instance = self.construct(index, current)?;
                self.post_construct(index, current, &instance)?;
                self.metrics.record_construction();
                Ok(instance)
            }
            ResolvedSharing::Shared(scope_name) => {
                let home = find_scope(current, scope_name).ok_or_else(|| Error::ScopeNotActive {
                    scope: scope_name.clone(),
                })?;
                let _guard = home.begin_build()?;
                let (instance, hit) = home.resolve_shared(
                    index.0,
                    &node.part,
                    || self.construct(index, &home),
                    |instance| self.post_construct(index, &home, instance),
                )?;
                if hit {
                    self.metrics.record_cache_hit();
                } else {
                    self.metrics.record_construction();
                }
                Ok(instance)
            }
        }
    }

    /// Resolve a node and, for member exports, extract the member value.
    pub(crate) fn resolve_reference(
        &self,
        index: NodeIndex,
        member: Option<&MemberName>,
        scope: &Arc<ScopeInstance>,
    ) -> Result<Instance> {
        let instance = self.instantiate(index, scope)?;
        let member = match member {
            None => return Ok(instance),
            Some(member) => member,
        };
        let node = &self.plan.nodes[index.as_usize()];
        let getter = self.bound[index.as_usize()]
            .getters
            .get(member)
            .ok_or_else(|| corrupt(&node.part, "member getter not bound"))?;
        getter(&instance).map_err(|source| Error::ConstructionFailed {
            part: node.part.clone(),
            source,
        })
    }

    /// Constructor phase only; member assignment and hooks run in
    /// [`Self::post_construct`] after the instance is published.
    fn construct(&self, index: NodeIndex, scope: &Arc<ScopeInstance>) -> Result<Instance> {
        let node = &self.plan.nodes[index.as_usize()];
        let bound = &self.bound[index.as_usize()];
        match &bound.backing {
            Backing::Prebuilt(instance) => Ok(instance.clone()),
            Backing::Constructor(ctor) => {
                let slots = node.constructor.as_deref().unwrap_or(&[]);
                let mut args: SmallVec<[ImportValue; 4]> = SmallVec::with_capacity(slots.len());
                for slot in slots {
                    args.push(self.slot_value(index, slot, scope)?);
                }
                let instance = ctor(&args).map_err(|source| Error::ConstructionFailed {
                    part: node.part.clone(),
                    source,
                })?;
                debug!(target: "weft::engine", part = %node.part, scope = %scope.name(), "constructed");
                Ok(instance)
            }
        }
    }

    /// Member assignment then the post-construction hook.
    fn post_construct(
        &self,
        index: NodeIndex,
        scope: &Arc<ScopeInstance>,
        instance: &Instance,
    ) -> Result<()> {
        let node = &self.plan.nodes[index.as_usize()];
        let bound = &self.bound[index.as_usize()];
        for ((member, slot), setter) in node.members.iter().zip(&bound.setters) {
            let value = self.slot_value(index, slot, scope)?;
            setter(instance, value).map_err(|source| Error::ConstructionFailed {
                part: node.part.clone(),
                source,
            })?;
            debug!(target: "weft::engine", part = %node.part, member = %member, "member assigned");
        }
        if let Some(hook) = &bound.hook {
            hook(instance).map_err(|source| Error::ConstructionFailed {
                part: node.part.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Materialize one slot into an import value.
    fn slot_value(
        &self,
        index: NodeIndex,
        slot: &weft_plan::PlanSlot,
        scope: &Arc<ScopeInstance>,
    ) -> Result<ImportValue> {
        let node = &self.plan.nodes[index.as_usize()];
        match slot.laziness {
            Laziness::Eager => {
                let mut instances: SmallVec<[Instance; 4]> = SmallVec::new();
                for value in &slot.values {
                    match value {
                        SlotValue::Eager {
                            node: target,
                            member,
                        } => instances.push(self.resolve_reference(
                            *target,
                            member.as_ref(),
                            scope,
                        )?),
                        SlotValue::Deferred { .. } => {
                            return Err(corrupt(&node.part, "deferred value in eager slot"))
                        }
                    }
                }
                Ok(match slot.cardinality {
                    Cardinality::ExactlyOne => match instances.into_iter().next() {
                        Some(instance) => ImportValue::One(instance),
                        None => return Err(corrupt(&node.part, "empty exactly-one slot")),
                    },
                    Cardinality::ZeroOrOne => {
                        ImportValue::Optional(instances.into_iter().next())
                    }
                    Cardinality::Many => ImportValue::Many(instances.into_vec()),
                })
            }
            Laziness::Deferred => {
                let mut handles = Vec::with_capacity(slot.values.len());
                for value in &slot.values {
                    match value {
                        SlotValue::Deferred { boundary } => {
                            handles.push(self.make_deferred(node, *boundary, scope)?)
                        }
                        SlotValue::Eager { .. } => {
                            return Err(corrupt(&node.part, "eager value in deferred slot"))
                        }
                    }
                }
                Ok(match slot.cardinality {
                    Cardinality::ExactlyOne => match handles.into_iter().next() {
                        Some(handle) => ImportValue::DeferredOne(handle),
                        None => return Err(corrupt(&node.part, "empty exactly-one slot")),
                    },
                    Cardinality::ZeroOrOne => {
                        ImportValue::DeferredOptional(handles.into_iter().next())
                    }
                    Cardinality::Many => ImportValue::DeferredMany(handles),
                })
            }
        }
    }

    fn make_deferred(
        &self,
        node: &PlanNode,
        boundary: u32,
        scope: &Arc<ScopeInstance>,
    ) -> Result<DeferredExport> {
        let boundary = node
            .boundaries
            .get(boundary as usize)
            .ok_or_else(|| corrupt(&node.part, "boundary out of range"))?;
        let target_part = &self.plan.nodes[boundary.target.as_usize()].part;
        Ok(DeferredExport {
            core: self.weak_self.clone(),
            origin: Arc::downgrade(scope),
            origin_name: scope.name().clone(),
            target: boundary.target,
            member: boundary.member.clone(),
            creates_scope: boundary.creates_scope.clone(),
            label: ContractName::new(target_part.as_str()),
            created: Arc::new(OnceCell::new()),
        })
    }

    /// Create the scope-instance chain from `origin` down to `target`.
    pub(crate) fn create_scope_chain(
        &self,
        origin: &Arc<ScopeInstance>,
        target: &ScopeName,
    ) -> Result<Arc<ScopeInstance>> {
        let path = self
            .plan
            .scope_tree
            .path(origin.name(), target)
            .ok_or_else(|| Error::UndeclaredScope {
                scope: target.clone(),
                under: origin.name().clone(),
            })?;
        let mut scope = Arc::clone(origin);
        for segment in path {
            scope = scope.child(segment)?;
            self.metrics.record_scope_created();
        }
        Ok(scope)
    }

    /// Export entries for a contract after constraint filtering.
    fn candidates(&self, contract: &Contract) -> Vec<(NodeIndex, Option<MemberName>)> {
        self.plan
            .exports_for(contract.name())
            .iter()
            .filter(|entry| contract.constraints_satisfied_by(&entry.metadata))
            .map(|entry| (entry.node, entry.member.clone()))
            .collect()
    }
}

/// Bind every plan node to its factory closures.
fn bind(
    plan: &CompositionPlan,
    registry: &FactoryRegistry,
) -> std::result::Result<Vec<BoundNode>, LinkError> {
    // Member getters each node must be able to supply
    let mut needed: Vec<BTreeSet<MemberName>> = vec![BTreeSet::new(); plan.len()];
    for node in &plan.nodes {
        let slots = node
            .constructor
            .iter()
            .flatten()
            .chain(node.members.iter().map(|(_, slot)| slot));
        for slot in slots {
            for value in &slot.values {
                if let SlotValue::Eager {
                    node: target,
                    member: Some(member),
                } = value
                {
                    needed[target.as_usize()].insert(member.clone());
                }
            }
        }
        for boundary in &node.boundaries {
            if let Some(member) = &boundary.member {
                needed[boundary.target.as_usize()].insert(member.clone());
            }
        }
    }
    for entries in plan.exports.values() {
        for entry in entries {
            if let Some(member) = &entry.member {
                needed[entry.node.as_usize()].insert(member.clone());
            }
        }
    }

    let mut bound = Vec::with_capacity(plan.len());
    for (position, node) in plan.nodes.iter().enumerate() {
        let factory = registry
            .get(&node.part)
            .ok_or_else(|| LinkError::MissingFactory {
                part: node.part.clone(),
            })?;

        let backing = match &node.constructor {
            Some(_) => Backing::Constructor(factory.constructor.clone().ok_or_else(|| {
                LinkError::MissingConstructor {
                    part: node.part.clone(),
                }
            })?),
            None => Backing::Prebuilt(factory.instance.clone().ok_or_else(|| {
                LinkError::MissingInstance {
                    part: node.part.clone(),
                }
            })?),
        };

        let setters = node
            .members
            .iter()
            .map(|(member, _)| {
                factory
                    .setters
                    .get(member)
                    .cloned()
                    .ok_or_else(|| LinkError::MissingSetter {
                        part: node.part.clone(),
                        member: member.clone(),
                    })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let getters = needed[position]
            .iter()
            .map(|member| {
                factory
                    .getters
                    .get(member)
                    .cloned()
                    .map(|getter| (member.clone(), getter))
                    .ok_or_else(|| LinkError::MissingGetter {
                        part: node.part.clone(),
                        member: member.clone(),
                    })
            })
            .collect::<std::result::Result<FxHashMap<_, _>, _>>()?;

        let hook = match &node.on_ready {
            Some(name) => {
                Some(
                    factory
                        .hooks
                        .get(name)
                        .cloned()
                        .ok_or_else(|| LinkError::MissingHook {
                            part: node.part.clone(),
                            hook: name.clone(),
                        })?,
                )
            }
            None => None,
        };

        bound.push(BoundNode {
            backing,
            setters,
            getters,
            hook,
        });
    }
    Ok(bound)
}

/// The execution engine: a bound plan plus the root scope instance.
///
/// Cheap to clone handles are produced by [`CompositionEngine::root_scope`]
/// and [`CompositionEngine::create_scope`]; requests on the engine itself
/// resolve against the global scope.
pub struct CompositionEngine {
    core: Arc<EngineCore>,
}

impl CompositionEngine {
    /// Bind a plan to a registry and stand up the root scope.
    ///
    /// Every construction, assignment, and hook step is resolved to a
    /// concrete closure here; missing pieces are link errors, raised
    /// before any instance exists.
    pub fn new(plan: CompositionPlan, registry: &FactoryRegistry) -> std::result::Result<Self, LinkError> {
        plan.validate()
            .map_err(|e| LinkError::InvalidPlan(e.to_string()))?;
        let bound = bind(&plan, registry)?;
        let core = Arc::new_cyclic(|weak| EngineCore {
            plan,
            bound,
            root: ScopeInstance::root(),
            metrics: EngineMetrics::new(),
            weak_self: weak.clone(),
        });
        info!(target: "weft::engine", nodes = core.plan.len(), "engine ready");
        Ok(Self { core })
    }

    /// Handle on the global scope
    pub fn root_scope(&self) -> CompositionScope {
        CompositionScope {
            core: Arc::clone(&self.core),
            scope: Arc::clone(&self.core.root),
        }
    }

    /// Resolve exactly one export of the contract in the global scope
    pub fn get<T: Any + Send + Sync>(&self, contract: &Contract) -> Result<Arc<T>> {
        self.root_scope().get(contract)
    }

    /// Resolve every export of the contract in the global scope
    pub fn get_all<T: Any + Send + Sync>(&self, contract: &Contract) -> Result<Vec<Arc<T>>> {
        self.root_scope().get_all(contract)
    }

    /// Lazy accessor for exactly one export of the contract
    pub fn get_deferred<T: Any + Send + Sync>(
        &self,
        contract: &Contract,
    ) -> Result<crate::deferred::Deferred<T>> {
        self.root_scope().get_deferred(contract)
    }

    /// Create a child scope instance under the global scope
    pub fn create_scope(&self, name: impl Into<ScopeName>) -> Result<CompositionScope> {
        self.root_scope().create_scope(name)
    }

    /// Counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// The bound plan
    pub fn plan(&self) -> &CompositionPlan {
        &self.core.plan
    }
}

/// Handle on one scope instance, carrying the request API.
#[derive(Clone)]
pub struct CompositionScope {
    core: Arc<EngineCore>,
    scope: Arc<ScopeInstance>,
}

impl CompositionScope {
    /// The scope's name
    pub fn name(&self) -> &ScopeName {
        self.scope.name()
    }

    /// The scope instance's unique identity
    pub fn id(&self) -> ScopeId {
        self.scope.id()
    }

    /// True once disposed
    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    fn single_candidate(&self, contract: &Contract) -> Result<(NodeIndex, Option<MemberName>)> {
        let mut candidates = self.core.candidates(contract);
        match candidates.len() {
            0 => Err(Error::ContractNotFound(contract.name().clone())),
            1 => Ok(candidates.remove(0)),
            found => Err(Error::CardinalityMismatch {
                contract: contract.name().clone(),
                found,
            }),
        }
    }

    /// Resolve exactly one export of the contract in this scope
    pub fn get<T: Any + Send + Sync>(&self, contract: &Contract) -> Result<Arc<T>> {
        let (node, member) = self.single_candidate(contract)?;
        let instance = self
            .core
            .resolve_reference(node, member.as_ref(), &self.scope)?;
        instance
            .downcast::<T>()
            .map_err(|_| Error::WrongInstanceType {
                contract: contract.name().clone(),
            })
    }

    /// Resolve every export of the contract in this scope, in plan order
    pub fn get_all<T: Any + Send + Sync>(&self, contract: &Contract) -> Result<Vec<Arc<T>>> {
        self.core
            .candidates(contract)
            .into_iter()
            .map(|(node, member)| {
                let instance = self
                    .core
                    .resolve_reference(node, member.as_ref(), &self.scope)?;
                instance
                    .downcast::<T>()
                    .map_err(|_| Error::WrongInstanceType {
                        contract: contract.name().clone(),
                    })
            })
            .collect()
    }

    /// Lazy accessor for exactly one export of the contract.
    ///
    /// The handle may be invoked at any later time; if the target lives in
    /// a scope not active on this chain, the handle creates that scope
    /// chain once and reuses it.
    pub fn get_deferred<T: Any + Send + Sync>(
        &self,
        contract: &Contract,
    ) -> Result<crate::deferred::Deferred<T>> {
        let (node, member) = self.single_candidate(contract)?;
        let target = &self.core.plan.nodes[node.as_usize()];
        let creates_scope = match &target.sharing {
            ResolvedSharing::NonShared => None,
            ResolvedSharing::Shared(scope) => {
                if self
                    .core
                    .plan
                    .scope_tree
                    .is_ancestor_or_self(scope, self.scope.name())
                {
                    None
                } else {
                    Some(scope.clone())
                }
            }
        };
        Ok(DeferredExport {
            core: Arc::downgrade(&self.core),
            origin: Arc::downgrade(&self.scope),
            origin_name: self.scope.name().clone(),
            target: node,
            member,
            creates_scope,
            label: contract.name().clone(),
            created: Arc::new(OnceCell::new()),
        }
        .into_typed())
    }

    /// Create a child scope instance.
    ///
    /// The requested scope must be a proper descendant of this scope in
    /// the scope tree; intermediate scopes on the path are created too.
    /// Independently created instances never share cached parts.
    pub fn create_scope(&self, name: impl Into<ScopeName>) -> Result<CompositionScope> {
        let name = name.into();
        if &name == self.scope.name() {
            return Err(Error::UndeclaredScope {
                scope: name,
                under: self.scope.name().clone(),
            });
        }
        let scope = self.core.create_scope_chain(&self.scope, &name)?;
        Ok(CompositionScope {
            core: Arc::clone(&self.core),
            scope,
        })
    }

    /// Dispose this scope instance and, transitively, its children.
    ///
    /// Waits for in-flight construction in this scope to complete.
    /// Requests after disposal fail with a scope-disposed error.
    pub fn dispose(&self) {
        let disposed = self.scope.dispose();
        if disposed > 0 {
            self.core.metrics.record_scopes_disposed(disposed);
        }
    }
}
