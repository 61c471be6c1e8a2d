//! Core types for the Weft composition engine
//!
//! This crate defines the foundational vocabulary shared by the resolver,
//! the plan, and the execution engine:
//! - Contract: named, optionally constrained capability identifier
//! - PartDeclaration: immutable description of one composable unit
//! - Catalog: deduplicated, order-independent set of declarations
//! - ScopeTree: static nesting of sharing scopes under the global root
//! - Error taxonomy: collected resolution errors and surfaced
//!   execution errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod contract;
pub mod error;
pub mod part;
pub mod scope;

// Re-export commonly used types at the crate root
pub use catalog::Catalog;
pub use contract::{Contract, ContractName, Metadata, MetadataValue};
pub use error::{BoxError, CompositionError, CyclePath, Error, ErrorReport, Result};
pub use part::{
    Cardinality, CreationPolicy, DeclarationError, ExportDeclaration, HookName,
    ImportRequirement, ImportSite, Laziness, MemberImport, MemberName, PartBuilder,
    PartDeclaration, PartId, SharingDeclaration,
};
pub use scope::{ResolvedSharing, ScopeName, ScopeTree, ScopeTreeError};
