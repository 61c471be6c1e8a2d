//! Execution engine for the Weft composition engine
//!
//! This crate executes lowered composition plans:
//! - linker: the factory registry (indirect-call table) and import values
//! - engine: plan binding and the typed request API
//! - scope: scope instances and per-scope instance caches
//! - deferred: lazy export handles, including child-scope creation
//! - metrics: observational counters
//!
//! The engine is the only component with shared mutable state (the
//! per-scope caches); everything upstream of it is pure.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deferred;
pub mod engine;
pub mod linker;
pub mod metrics;
pub mod scope;

pub use deferred::{Deferred, DeferredExport};
pub use engine::{CompositionEngine, CompositionScope};
pub use linker::{
    CtorFn, FactoryBuilder, FactoryRegistry, GetterFn, HookFn, ImportValue, Instance, LinkError,
    PartFactory, SetterFn, ValueError,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use scope::ScopeId;
