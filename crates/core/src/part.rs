//! Part declarations
//!
//! A part is the atom of composition: an immutable description of one type,
//! its exported contracts, its import requirements (constructor parameters
//! and settable members), its sharing declaration and creation policy.
//! Declarations are produced by the declarative registration API below and
//! never mutated afterwards.

use crate::contract::{Contract, Metadata};
use crate::scope::ScopeName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Part identity.
///
/// Equal to the underlying type identity; `PartId::of::<T>()` derives it
/// from the type name, `PartId::named` allows synthetic parts (test doubles,
/// composition services).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartId(String);

impl PartId {
    /// Identity of a Rust type
    pub fn of<T: 'static>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    /// Synthetic identity
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartId {
    fn from(s: &str) -> Self {
        Self::named(s)
    }
}

/// Name of a settable or exporting member of a part
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberName(String);

impl MemberName {
    /// Create a member name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a post-construction notification hook.
///
/// The declaration carries only the name; the matching closure is supplied
/// by the factory registry when the plan is bound to an engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HookName(String);

impl HookName {
    /// Create a hook name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HookName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How many matched exports an import accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Exactly one match; zero or several is a composition error
    ExactlyOne,
    /// At most one match; several is a composition error
    ZeroOrOne,
    /// Any number of matches, delivered as a collection
    Many,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::ExactlyOne => write!(f, "exactly one"),
            Cardinality::ZeroOrOne => write!(f, "zero or one"),
            Cardinality::Many => write!(f, "zero or more"),
        }
    }
}

/// When the imported dependency is materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Laziness {
    /// The dependency must exist before the importing part is constructed
    Eager,
    /// The dependency is delivered as a handle and constructed when the
    /// handle is invoked; deferred edges may legally close cycles
    Deferred,
}

/// One import requirement: a contract to satisfy, a cardinality, a laziness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequirement {
    /// Contract the matched exports must satisfy
    pub contract: Contract,
    /// Accepted match count
    pub cardinality: Cardinality,
    /// Eager or deferred materialization
    pub laziness: Laziness,
}

impl ImportRequirement {
    /// Eager import of exactly one export
    pub fn one(contract: Contract) -> Self {
        Self {
            contract,
            cardinality: Cardinality::ExactlyOne,
            laziness: Laziness::Eager,
        }
    }

    /// Eager import of zero or one export
    pub fn optional(contract: Contract) -> Self {
        Self {
            contract,
            cardinality: Cardinality::ZeroOrOne,
            laziness: Laziness::Eager,
        }
    }

    /// Eager import of every matching export
    pub fn many(contract: Contract) -> Self {
        Self {
            contract,
            cardinality: Cardinality::Many,
            laziness: Laziness::Eager,
        }
    }

    /// Make this import deferred (chainable)
    pub fn deferred(mut self) -> Self {
        self.laziness = Laziness::Deferred;
        self
    }

    /// True for eager imports
    pub fn is_eager(&self) -> bool {
        self.laziness == Laziness::Eager
    }
}

/// A member import: a settable member plus its requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberImport {
    /// The settable member
    pub member: MemberName,
    /// What it requires
    pub requirement: ImportRequirement,
}

/// One exported contract of a part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDeclaration {
    /// The contract this export satisfies
    pub contract: Contract,
    /// Arbitrary metadata, matched against import constraints
    pub metadata: Metadata,
    /// Declaring member; `None` exports the part instance itself
    pub member: Option<MemberName>,
}

/// Declared sharing of a part, prior to resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharingDeclaration {
    /// Fresh instance per request
    NonShared,
    /// Shared within the named scope (`ScopeName::global()` = everywhere)
    Scoped(ScopeName),
    /// Scope derived from the part's eager dependents during resolution
    Inferred,
}

/// Creation policy, constraining how instances may be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreationPolicy {
    /// Only the scope-cached instance may be handed out
    SharedInstanceOnly,
    /// Every request constructs a fresh instance; incompatible with a
    /// scoped or inferred sharing declaration
    AlwaysInstantiate,
}

/// Where an import requirement lives on its part; used in diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportSite {
    /// Positional constructor parameter
    Constructor(usize),
    /// Settable member
    Member(MemberName),
}

impl fmt::Display for ImportSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSite::Constructor(i) => write!(f, "constructor parameter {}", i),
            ImportSite::Member(m) => write!(f, "member `{}`", m),
        }
    }
}

/// Immutable description of one composable part.
///
/// Built through [`PartDeclaration::builder`], which validates the
/// declaration invariants. A part with `constructor: None` has no
/// importable constructor and is not directly instantiable; it must be
/// backed by a pre-built instance when the plan is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDeclaration {
    /// Identity (underlying type identity)
    pub id: PartId,
    /// Exported contracts
    pub exports: Vec<ExportDeclaration>,
    /// Ordered constructor imports; `None` = no importable constructor
    pub constructor: Option<Vec<ImportRequirement>>,
    /// Settable member imports
    pub member_imports: Vec<MemberImport>,
    /// Declared sharing
    pub sharing: SharingDeclaration,
    /// Creation policy
    pub creation: CreationPolicy,
    /// Scopes this part must never resolve into or under; a violation is a
    /// resolver defect, not a user error
    pub prohibited_scopes: BTreeSet<ScopeName>,
    /// Post-construction notification hook
    pub on_ready: Option<HookName>,
    /// Always-available root, seeded into the graph even without exports
    pub root: bool,
}

impl PartDeclaration {
    /// Start building a declaration
    pub fn builder(id: impl Into<PartId>) -> PartBuilder {
        PartBuilder::new(id.into())
    }

    /// All imports with their sites: constructor parameters in order, then
    /// member imports in declaration order.
    pub fn imports(&self) -> impl Iterator<Item = (ImportSite, &ImportRequirement)> {
        let ctor = self
            .constructor
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, r)| (ImportSite::Constructor(i), r));
        let members = self
            .member_imports
            .iter()
            .map(|m| (ImportSite::Member(m.member.clone()), &m.requirement));
        ctor.chain(members)
    }

    /// True when the part has an importable constructor
    pub fn is_instantiable(&self) -> bool {
        self.constructor.is_some()
    }
}

/// Errors from building a part declaration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// Two exports of one part are indistinguishable
    #[error("part `{part}` declares duplicate export for contract `{contract}` (member: {member:?})")]
    DuplicateExport {
        /// Declaring part
        part: PartId,
        /// Duplicated contract
        contract: Contract,
        /// Declaring member, if any
        member: Option<MemberName>,
    },

    /// Two member imports target the same member
    #[error("part `{part}` declares member `{member}` as an import twice")]
    DuplicateMemberImport {
        /// Declaring part
        part: PartId,
        /// Duplicated member
        member: MemberName,
    },

    /// `AlwaysInstantiate` combined with a scoped or inferred sharing
    #[error("part `{part}` declares always-instantiate creation with a shared scope")]
    ConflictingCreationPolicy {
        /// Declaring part
        part: PartId,
    },
}

/// Builder for [`PartDeclaration`]; the declarative registration surface.
#[derive(Debug)]
pub struct PartBuilder {
    id: PartId,
    exports: Vec<ExportDeclaration>,
    constructor: Option<Vec<ImportRequirement>>,
    member_imports: Vec<MemberImport>,
    sharing: SharingDeclaration,
    creation: Option<CreationPolicy>,
    prohibited_scopes: BTreeSet<ScopeName>,
    on_ready: Option<HookName>,
    root: bool,
}

impl PartBuilder {
    fn new(id: PartId) -> Self {
        Self {
            id,
            exports: Vec::new(),
            constructor: None,
            member_imports: Vec::new(),
            sharing: SharingDeclaration::NonShared,
            creation: None,
            prohibited_scopes: BTreeSet::new(),
            on_ready: None,
            root: false,
        }
    }

    /// Export the part instance under a contract
    pub fn export(mut self, contract: Contract) -> Self {
        self.exports.push(ExportDeclaration {
            contract,
            metadata: Metadata::new(),
            member: None,
        });
        self
    }

    /// Export the part instance under a contract, with metadata
    pub fn export_with(mut self, contract: Contract, metadata: Metadata) -> Self {
        self.exports.push(ExportDeclaration {
            contract,
            metadata,
            member: None,
        });
        self
    }

    /// Export a member's value under a contract
    pub fn member_export(mut self, member: impl Into<MemberName>, contract: Contract) -> Self {
        self.exports.push(ExportDeclaration {
            contract,
            metadata: Metadata::new(),
            member: Some(member.into()),
        });
        self
    }

    /// Export a member's value under a contract, with metadata
    pub fn member_export_with(
        mut self,
        member: impl Into<MemberName>,
        contract: Contract,
        metadata: Metadata,
    ) -> Self {
        self.exports.push(ExportDeclaration {
            contract,
            metadata,
            member: Some(member.into()),
        });
        self
    }

    /// Declare the importable constructor and its ordered parameters.
    ///
    /// An empty parameter list declares a parameterless importable
    /// constructor; not calling this at all leaves the part not directly
    /// instantiable.
    pub fn constructor(mut self, params: impl IntoIterator<Item = ImportRequirement>) -> Self {
        self.constructor = Some(params.into_iter().collect());
        self
    }

    /// Declare a settable member import
    pub fn member_import(
        mut self,
        member: impl Into<MemberName>,
        requirement: ImportRequirement,
    ) -> Self {
        self.member_imports.push(MemberImport {
            member: member.into(),
            requirement,
        });
        self
    }

    /// Share globally
    pub fn shared(mut self) -> Self {
        self.sharing = SharingDeclaration::Scoped(ScopeName::global());
        self
    }

    /// Share within the named scope
    pub fn shared_in(mut self, scope: impl Into<ScopeName>) -> Self {
        self.sharing = SharingDeclaration::Scoped(scope.into());
        self
    }

    /// Derive the sharing scope from eager dependents during resolution
    pub fn infer_scope(mut self) -> Self {
        self.sharing = SharingDeclaration::Inferred;
        self
    }

    /// Construct a fresh instance on every request
    pub fn always_instantiate(mut self) -> Self {
        self.creation = Some(CreationPolicy::AlwaysInstantiate);
        self
    }

    /// Forbid the part from resolving into (or under) the named scope
    pub fn prohibit_scope(mut self, scope: impl Into<ScopeName>) -> Self {
        self.prohibited_scopes.insert(scope.into());
        self
    }

    /// Run the named hook after construction and member assignment
    pub fn on_ready(mut self, hook: impl Into<HookName>) -> Self {
        self.on_ready = Some(hook.into());
        self
    }

    /// Seed this part into the graph even when nothing imports it
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Validate invariants and produce the immutable declaration
    pub fn build(self) -> Result<PartDeclaration, DeclarationError> {
        // (contract, member) pairs must be distinguishable
        let mut seen = BTreeSet::new();
        for export in &self.exports {
            let key = (export.contract.clone(), export.member.clone());
            if !seen.insert(key) {
                return Err(DeclarationError::DuplicateExport {
                    part: self.id,
                    contract: export.contract.clone(),
                    member: export.member.clone(),
                });
            }
        }

        let mut members = BTreeSet::new();
        for import in &self.member_imports {
            if !members.insert(import.member.clone()) {
                return Err(DeclarationError::DuplicateMemberImport {
                    part: self.id,
                    member: import.member.clone(),
                });
            }
        }

        let creation = match self.creation {
            Some(CreationPolicy::AlwaysInstantiate) => {
                if !matches!(self.sharing, SharingDeclaration::NonShared) {
                    return Err(DeclarationError::ConflictingCreationPolicy { part: self.id });
                }
                CreationPolicy::AlwaysInstantiate
            }
            Some(policy) => policy,
            // Default follows the sharing declaration
            None => match self.sharing {
                SharingDeclaration::NonShared => CreationPolicy::AlwaysInstantiate,
                _ => CreationPolicy::SharedInstanceOnly,
            },
        };

        Ok(PartDeclaration {
            id: self.id,
            exports: self.exports,
            constructor: self.constructor,
            member_imports: self.member_imports,
            sharing: self.sharing,
            creation,
            prohibited_scopes: self.prohibited_scopes,
            on_ready: self.on_ready,
            root: self.root,
        })
    }
}
