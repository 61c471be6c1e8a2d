//! One-stop composition builder
//!
//! Chains the full pipeline for the common case: collect declarations and
//! factories, resolve, lower, bind. Callers needing the intermediate
//! artifacts (the graph for inspection, the plan for caching) use the
//! layer crates directly.

use thiserror::Error;
use weft_core::{Catalog, ErrorReport, PartDeclaration, PartId, ScopeTree};
use weft_engine::{CompositionEngine, FactoryRegistry, LinkError, PartFactory};
use weft_plan::{lower, LowerError};
use weft_resolver::{resolve, TolerancePolicy};

/// Failure at any stage of [`Composer::compose`]
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Resolution errors (strict mode, or internal defects in degraded mode)
    #[error(transparent)]
    Resolution(#[from] ErrorReport),

    /// Lowering failed
    #[error(transparent)]
    Lower(#[from] LowerError),

    /// Binding the plan to the factories failed
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Fluent front door over catalog -> resolve -> lower -> bind.
///
/// ```ignore
/// let engine = Composer::new()
///     .part(config_declaration()?)
///     .factory("app::Config", PartFactory::constructing(|_| Ok(Arc::new(Config::load()?))))
///     .compose()?;
/// ```
pub struct Composer {
    catalog: Catalog,
    scope_tree: ScopeTree,
    registry: FactoryRegistry,
    policy: TolerancePolicy,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    /// Empty composer with a strict tolerance policy
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(),
            scope_tree: ScopeTree::new(),
            registry: FactoryRegistry::new(),
            policy: TolerancePolicy::Strict,
        }
    }

    /// Add one part declaration
    pub fn part(mut self, declaration: PartDeclaration) -> Self {
        self.catalog = self.catalog.with_part(declaration);
        self
    }

    /// Add declarations from another catalog (set union)
    pub fn catalog(mut self, other: &Catalog) -> Self {
        self.catalog = self.catalog.union(other);
        self
    }

    /// Use the given scope tree
    pub fn scope_tree(mut self, tree: ScopeTree) -> Self {
        self.scope_tree = tree;
        self
    }

    /// Register a part's factory
    pub fn factory(mut self, id: impl Into<PartId>, factory: PartFactory) -> Self {
        self.registry.register(id, factory);
        self
    }

    /// Choose how resolution errors are treated (strict by default)
    pub fn tolerance(mut self, policy: TolerancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the pipeline and return a ready engine
    pub fn compose(self) -> Result<CompositionEngine, ComposeError> {
        let graph = resolve(&self.catalog, &self.scope_tree).into_graph(self.policy)?;
        let plan = lower(&graph)?;
        Ok(CompositionEngine::new(plan, &self.registry)?)
    }
}
