//! Graph resolution for the Weft composition engine
//!
//! This crate turns a catalog of part declarations into a validated
//! composition graph:
//! - matcher: pure export/import candidate search
//! - graph: the resolved node/edge model
//! - resolve: expansion, cardinality checks, cycle classification,
//!   scope inference, prohibited-scope checks, error aggregation
//!
//! Resolution is synchronous and pure over its inputs; independent
//! catalogs may be resolved concurrently on separate threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod matcher;
pub mod resolve;

pub use graph::{CompositionGraph, GraphNode, ResolvedImport};
pub use matcher::{match_import, ExportCandidate};
pub use resolve::{resolve, Resolution, TolerancePolicy};
