//! Plan codecs
//!
//! The serialization seam for composition plans. Every encoded plan is
//! framed with a small header (magic, format version, codec id) so decode
//! fails loudly on the wrong file, the wrong version, or the wrong codec
//! instead of misparsing. Two codecs ship: MessagePack and bincode; the
//! byte-level payload format is otherwise an external concern, but
//! round-trip fidelity of the plan structure is part of the core's
//! contract and is re-checked after decode.

use crate::plan::CompositionPlan;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// File magic: identifies a serialized composition plan
pub const PLAN_MAGIC: [u8; 4] = *b"WEFT";

/// Current header format version
pub const FORMAT_VERSION: u16 = 1;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O failure reading or writing a plan file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input does not start with the plan magic
    #[error("not a composition plan: bad magic")]
    BadMagic,

    /// The header declares an unsupported format version
    #[error("unsupported plan format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the header
        found: u16,
        /// Version this build supports
        expected: u16,
    },

    /// The plan was encoded with a different codec
    #[error("codec mismatch: plan was encoded with `{actual}`, decoding with `{expected}`")]
    CodecMismatch {
        /// Codec attempting the decode
        expected: String,
        /// Codec named in the header
        actual: String,
    },

    /// Payload serialization failed
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload deserialization failed, or the decoded plan is structurally
    /// invalid
    #[error("decode error: {0}")]
    Decode(String),
}

/// A plan serialization codec.
///
/// Implementations handle the payload only; header framing and
/// verification are shared. Codecs must be `Send + Sync` so plans can be
/// encoded from any thread.
pub trait PlanCodec: Send + Sync {
    /// Unique codec identifier, stored in the header
    fn codec_id(&self) -> &str;

    /// Serialize a plan payload
    fn encode_payload(&self, plan: &CompositionPlan) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a plan payload
    fn decode_payload(&self, bytes: &[u8]) -> Result<CompositionPlan, CodecError>;
}

/// MessagePack codec (compact, self-describing)
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl PlanCodec for MsgpackCodec {
    fn codec_id(&self) -> &str {
        "msgpack"
    }

    fn encode_payload(&self, plan: &CompositionPlan) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(plan).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_payload(&self, bytes: &[u8]) -> Result<CompositionPlan, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Bincode codec (fastest, not self-describing)
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl PlanCodec for BincodeCodec {
    fn codec_id(&self) -> &str {
        "bincode"
    }

    fn encode_payload(&self, plan: &CompositionPlan) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(plan).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_payload(&self, bytes: &[u8]) -> Result<CompositionPlan, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Encode a plan with the framing header
pub fn encode_plan(codec: &dyn PlanCodec, plan: &CompositionPlan) -> Result<Vec<u8>, CodecError> {
    let payload = codec.encode_payload(plan)?;
    let id = codec.codec_id().as_bytes();

    let mut out = Vec::with_capacity(4 + 2 + 1 + id.len() + payload.len());
    out.extend_from_slice(&PLAN_MAGIC);
    out.write_u16::<BigEndian>(FORMAT_VERSION)?;
    out.write_u8(id.len() as u8)?;
    out.extend_from_slice(id);
    out.extend_from_slice(&payload);

    debug!(
        target: "weft::codec",
        codec = codec.codec_id(),
        bytes = out.len(),
        nodes = plan.len(),
        "plan encoded"
    );
    Ok(out)
}

/// Decode a framed plan, verifying magic, version, and codec identity,
/// then re-validating the plan's structural invariants.
pub fn decode_plan(codec: &dyn PlanCodec, bytes: &[u8]) -> Result<CompositionPlan, CodecError> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if magic != PLAN_MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = cursor.read_u16::<BigEndian>()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let id_len = cursor.read_u8()? as usize;
    let mut id = vec![0u8; id_len];
    cursor.read_exact(&mut id)?;
    let actual = String::from_utf8_lossy(&id).into_owned();
    if actual != codec.codec_id() {
        return Err(CodecError::CodecMismatch {
            expected: codec.codec_id().to_string(),
            actual,
        });
    }

    let payload_start = cursor.position() as usize;
    let plan = codec.decode_payload(&bytes[payload_start..])?;
    plan.validate().map_err(|e| CodecError::Decode(e.to_string()))?;

    debug!(
        target: "weft::codec",
        codec = codec.codec_id(),
        nodes = plan.len(),
        "plan decoded"
    );
    Ok(plan)
}

/// Encode a plan to a file
pub fn write_plan_file(
    codec: &dyn PlanCodec,
    plan: &CompositionPlan,
    path: impl AsRef<Path>,
) -> Result<(), CodecError> {
    let bytes = encode_plan(codec, plan)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Decode a plan from a file
pub fn read_plan_file(
    codec: &dyn PlanCodec,
    path: impl AsRef<Path>,
) -> Result<CompositionPlan, CodecError> {
    let bytes = std::fs::read(path)?;
    decode_plan(codec, &bytes)
}
