//! Contract and metadata types
//!
//! A contract is the capability identifier that matches imports to exports:
//! a name plus optional structural constraints. Constraints and export
//! metadata share one closed value model (MetadataValue).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata mapping attached to exports and used as contract constraints.
///
/// Keys are unique; the ordered map makes equality and serialization
/// independent of insertion order.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Closed value model for export metadata and contract constraints.
///
/// Four variants only. No implicit coercions: different variants are
/// never equal, so `Int(1) != Str("1")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// UTF-8 string
    Str(String),
    /// Ordered list of values
    List(Vec<MetadataValue>),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Str(s) => write!(f, "{:?}", s),
            MetadataValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

/// Name component of a contract.
///
/// A thin newtype so contract names cannot be confused with other
/// strings (member names, scope names) at API boundaries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractName(String);

impl ContractName {
    /// Create a contract name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContractName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContractName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A named, optionally constrained capability identifier.
///
/// Two contracts are equal iff name and constraints match exactly.
/// An import's constraints are satisfied by an export when every
/// constraint key/value appears in the export's metadata (subset check);
/// the export may carry additional metadata freely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Contract {
    name: ContractName,
    constraints: Metadata,
}

impl Contract {
    /// Create an unconstrained contract
    pub fn new(name: impl Into<ContractName>) -> Self {
        Self {
            name: name.into(),
            constraints: Metadata::new(),
        }
    }

    /// Add a structural constraint (chainable)
    pub fn constrain(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// The contract name
    pub fn name(&self) -> &ContractName {
        &self.name
    }

    /// The structural constraints (empty for an unconstrained contract)
    pub fn constraints(&self) -> &Metadata {
        &self.constraints
    }

    /// Subset check: every constraint key/value must appear in `metadata`.
    ///
    /// An unconstrained contract is satisfied by any metadata.
    pub fn constraints_satisfied_by(&self, metadata: &Metadata) -> bool {
        self.constraints
            .iter()
            .all(|(k, v)| metadata.get(k) == Some(v))
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.constraints.is_empty() {
            write!(f, " {{")?;
            for (i, (k, v)) in self.constraints.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", k, v)?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
