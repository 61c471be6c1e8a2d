//! Weft - runtime composition engine
//!
//! Weft composes independently declared parts (units that export the
//! capabilities they provide and import the capabilities they require)
//! into a validated object graph, lowers that graph into a flattened,
//! cacheable composition plan, and executes the plan on demand with
//! per-scope instance sharing.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use weft::{Composer, Contract, ImportRequirement, Instance, PartDeclaration, PartFactory};
//!
//! struct Config;
//! struct Server { config: Arc<Config> }
//!
//! let engine = Composer::new()
//!     .part(
//!         PartDeclaration::builder("app::Config")
//!             .export(Contract::new("config"))
//!             .constructor([])
//!             .shared()
//!             .build()?,
//!     )
//!     .part(
//!         PartDeclaration::builder("app::Server")
//!             .export(Contract::new("server"))
//!             .constructor([ImportRequirement::one(Contract::new("config"))])
//!             .shared()
//!             .build()?,
//!     )
//!     .factory("app::Config", PartFactory::constructing(|_| Ok(Arc::new(Config) as Instance)))
//!     .factory("app::Server", PartFactory::constructing(|args| {
//!         Ok(Arc::new(Server { config: args[0].one()? }) as Instance)
//!     }))
//!     .compose()?;
//!
//! let server: Arc<Server> = engine.get(&Contract::new("server"))?;
//! ```
//!
//! # Architecture
//!
//! The pipeline runs declarative registration -> [`Catalog`] ->
//! [`resolve`] -> [`CompositionGraph`] -> [`lower`] ->
//! [`CompositionPlan`] -> [`CompositionEngine`]. Plans can be persisted
//! through a [`PlanCodec`] and reloaded without re-resolving.

mod composer;

pub use composer::{ComposeError, Composer};

// Core vocabulary
pub use weft_core::{
    BoxError, Cardinality, Catalog, CompositionError, Contract, ContractName, CreationPolicy,
    CyclePath, DeclarationError, Error, ErrorReport, ExportDeclaration, HookName,
    ImportRequirement, ImportSite, Laziness, MemberImport, MemberName, Metadata, MetadataValue,
    PartBuilder, PartDeclaration, PartId, ResolvedSharing, Result, ScopeName, ScopeTree,
    ScopeTreeError, SharingDeclaration,
};

// Resolution
pub use weft_resolver::{
    match_import, resolve, CompositionGraph, ExportCandidate, GraphNode, Resolution,
    ResolvedImport, TolerancePolicy,
};

// Plan and codecs
pub use weft_plan::{
    decode_plan, encode_plan, lower, read_plan_file, write_plan_file, BincodeCodec, CodecError,
    CompositionPlan, LowerError, MsgpackCodec, NodeIndex, PlanBoundary, PlanCodec, PlanError,
    PlanExport, PlanNode, PlanSlot, SlotValue,
};

// Execution
pub use weft_engine::{
    CompositionEngine, CompositionScope, Deferred, DeferredExport, FactoryBuilder,
    FactoryRegistry, ImportValue, Instance, LinkError, MetricsSnapshot, PartFactory, ScopeId,
    ValueError,
};
