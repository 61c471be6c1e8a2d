//! Error types for the composition core
//!
//! Two families live here. Resolution-time errors (`CompositionError`) are
//! collected into an [`ErrorReport`] and never thrown mid-algorithm; the
//! resolver always completes and returns its best-effort graph alongside
//! the report. Execution-time errors (`Error`) are surfaced immediately to
//! the caller and never silently retried or defaulted.

use crate::contract::ContractName;
use crate::part::{Cardinality, ImportSite, PartId};
use crate::scope::ScopeName;
use std::fmt;
use thiserror::Error;

/// Result type alias for execution-time operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried out of part constructors, setters, and hooks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Execution-time error kinds.
///
/// All variants are distinct and recoverable by the caller; the engine
/// never substitutes defaults or retries on its own.
#[derive(Debug, Error)]
pub enum Error {
    /// No rooted export satisfies the requested contract
    #[error("no export satisfies contract `{0}`")]
    ContractNotFound(ContractName),

    /// A single-value request matched several exports
    #[error("contract `{contract}` matched {found} exports where a single value was requested")]
    CardinalityMismatch {
        /// Requested contract
        contract: ContractName,
        /// Number of candidate exports
        found: usize,
    },

    /// A constructor, member setter, or post-construction hook failed
    #[error("construction of part `{part}` failed")]
    ConstructionFailed {
        /// The failing part
        part: PartId,
        /// The underlying failure
        #[source]
        source: BoxError,
    },

    /// Instance requested from a scope instance that was already released
    #[error("scope instance `{scope}` has been disposed")]
    ScopeDisposed {
        /// Name of the disposed scope
        scope: ScopeName,
    },

    /// A part shared in `scope` was requested from a chain with no such
    /// active scope instance
    #[error("no active scope instance named `{scope}` on the current scope chain")]
    ScopeNotActive {
        /// The missing scope
        scope: ScopeName,
    },

    /// A scope was requested that the scope tree does not nest under the
    /// current scope
    #[error("scope `{scope}` is not declared as a descendant of `{under}`")]
    UndeclaredScope {
        /// The requested scope
        scope: ScopeName,
        /// The scope it was requested under
        under: ScopeName,
    },

    /// The export exists but is not of the requested Rust type
    #[error("export for contract `{contract}` is not of the requested type")]
    WrongInstanceType {
        /// Requested contract
        contract: ContractName,
    },
}

/// Cycle path rendered as `a -> b -> a`.
///
/// Stores the cycle participants in order; the first part is repeated at
/// the end when displayed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CyclePath(pub Vec<PartId>);

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", part)?;
        }
        if let Some(first) = self.0.first() {
            write!(f, " -> {}", first)?;
        }
        Ok(())
    }
}

/// Resolution-time composition errors.
///
/// Collected by the resolver, never thrown mid-algorithm. The
/// prohibited-scope variant marks an internal consistency defect of the
/// resolver itself and is distinguishable via [`CompositionError::is_internal`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    /// An import's match count violates its declared cardinality
    #[error("part `{part}`, {site}: contract `{contract}` matched {found} exports where {expected} was required")]
    UnsatisfiableImport {
        /// Importing part
        part: PartId,
        /// Where the import lives
        site: ImportSite,
        /// The unsatisfied contract
        contract: ContractName,
        /// Declared cardinality
        expected: Cardinality,
        /// Actual match count
        found: usize,
        /// Conflicting candidates (empty when nothing matched)
        candidates: Vec<PartId>,
    },

    /// Inferred scope cannot be reconciled across dependents
    #[error("part `{part}`: inferred scope is ambiguous, eager dependents demand incomparable scopes {scopes:?}")]
    AmbiguousScope {
        /// The part whose scope was to be inferred
        part: PartId,
        /// The demanded, irreconcilable scopes
        scopes: Vec<ScopeName>,
    },

    /// A declared scope name is absent from the scope tree
    #[error("part `{part}`: declared scope `{scope}` is not in the scope tree")]
    UnknownScope {
        /// Declaring part
        part: PartId,
        /// The undeclared scope
        scope: ScopeName,
    },

    /// An eager dependency on a shorter-lived scope
    #[error("part `{part}` in scope `{scope}` cannot be depended on eagerly by `{dependent}` in scope `{dependent_scope}`")]
    IncompatibleScope {
        /// Provider part
        part: PartId,
        /// Provider's resolved scope
        scope: ScopeName,
        /// Consuming part
        dependent: PartId,
        /// Consumer's resolved scope
        dependent_scope: ScopeName,
    },

    /// A dependency cycle with no deferred edge
    #[error("illegal eager dependency cycle: {path}")]
    IllegalEagerCycle {
        /// The full cycle path
        path: CyclePath,
    },

    /// A part resolved into a scope its declaration prohibits; this is a
    /// resolver defect, not a user misconfiguration
    #[error("internal: part `{part}` resolved into prohibited scope `{scope}`")]
    ProhibitedScope {
        /// The misplaced part
        part: PartId,
        /// The prohibited scope it landed in or under
        scope: ScopeName,
    },
}

impl CompositionError {
    /// True for internal-consistency defects (resolver bugs), which are
    /// never tolerable in degraded mode
    pub fn is_internal(&self) -> bool {
        matches!(self, CompositionError::ProhibitedScope { .. })
    }

    /// The part the error is primarily about
    pub fn part(&self) -> Option<&PartId> {
        match self {
            CompositionError::UnsatisfiableImport { part, .. }
            | CompositionError::AmbiguousScope { part, .. }
            | CompositionError::UnknownScope { part, .. }
            | CompositionError::ProhibitedScope { part, .. } => Some(part),
            CompositionError::IncompatibleScope { dependent, .. } => Some(dependent),
            CompositionError::IllegalEagerCycle { .. } => None,
        }
    }
}

/// Aggregated resolution errors.
///
/// The resolver appends to a report rather than failing fast, so tooling
/// can render every problem at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorReport {
    errors: Vec<CompositionError>,
}

impl ErrorReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error
    pub fn push(&mut self, error: CompositionError) {
        self.errors.push(error);
    }

    /// True when no errors were collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of collected errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterate the collected errors
    pub fn iter(&self) -> impl Iterator<Item = &CompositionError> {
        self.errors.iter()
    }

    /// True when the report contains an internal-consistency defect
    pub fn has_internal(&self) -> bool {
        self.errors.iter().any(CompositionError::is_internal)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "composition failed with {} error(s):", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorReport {}

impl IntoIterator for ErrorReport {
    type Item = CompositionError;
    type IntoIter = std::vec::IntoIter<CompositionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Contract;

    #[test]
    fn test_error_display_contract_not_found() {
        let err = Error::ContractNotFound(ContractName::new("logging"));
        assert!(err.to_string().contains("logging"));
    }

    #[test]
    fn test_error_display_cardinality_mismatch() {
        let err = Error::CardinalityMismatch {
            contract: ContractName::new("cache"),
            found: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("cache"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_error_construction_failed_preserves_source() {
        let source: BoxError = "disk quota exceeded".into();
        let err = Error::ConstructionFailed {
            part: PartId::named("app::Store"),
            source,
        };
        assert!(err.to_string().contains("app::Store"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("disk quota"));
    }

    #[test]
    fn test_composition_error_display_unsatisfiable() {
        let err = CompositionError::UnsatisfiableImport {
            part: PartId::named("app::Server"),
            site: ImportSite::Constructor(0),
            contract: Contract::new("transport").name().clone(),
            expected: Cardinality::ExactlyOne,
            found: 0,
            candidates: vec![],
        };
        let msg = err.to_string();
        assert!(msg.contains("app::Server"));
        assert!(msg.contains("transport"));
        assert!(msg.contains("exactly one"));
    }

    #[test]
    fn test_cycle_path_display() {
        let path = CyclePath(vec![PartId::named("a"), PartId::named("b")]);
        assert_eq!(path.to_string(), "a -> b -> a");
    }

    #[test]
    fn test_prohibited_scope_is_internal() {
        let internal = CompositionError::ProhibitedScope {
            part: PartId::named("a"),
            scope: ScopeName::new("request"),
        };
        let user = CompositionError::UnknownScope {
            part: PartId::named("a"),
            scope: ScopeName::new("request"),
        };
        assert!(internal.is_internal());
        assert!(!user.is_internal());
    }

    #[test]
    fn test_error_report_aggregation() {
        let mut report = ErrorReport::new();
        assert!(report.is_empty());

        report.push(CompositionError::UnknownScope {
            part: PartId::named("a"),
            scope: ScopeName::new("request"),
        });
        report.push(CompositionError::ProhibitedScope {
            part: PartId::named("b"),
            scope: ScopeName::new("request"),
        });

        assert_eq!(report.len(), 2);
        assert!(report.has_internal());
        let rendered = report.to_string();
        assert!(rendered.contains("2 error(s)"));
        assert!(rendered.contains("  1. "));
        assert!(rendered.contains("  2. "));
    }
}
