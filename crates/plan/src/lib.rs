//! Runtime composition plan for the Weft composition engine
//!
//! This crate lowers a validated composition graph into its flattened,
//! index-addressed execution form and (de)serializes it:
//! - plan: the plan model and its structural validation
//! - lower: deterministic graph flattening
//! - codec: the serialization seam (MessagePack, bincode) behind a
//!   versioned header
//!
//! A cached plan reloaded through a codec is operationally identical to a
//! freshly lowered one: same indices, same edges, same scope tree.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod lower;
pub mod plan;

pub use codec::{
    decode_plan, encode_plan, read_plan_file, write_plan_file, BincodeCodec, CodecError,
    MsgpackCodec, PlanCodec, FORMAT_VERSION, PLAN_MAGIC,
};
pub use lower::{lower, LowerError};
pub use plan::{
    CompositionPlan, NodeIndex, PlanBoundary, PlanError, PlanExport, PlanNode, PlanSlot, SlotValue,
};
