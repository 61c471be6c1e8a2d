//! Factory registry: the indirect-call table
//!
//! Declarations carry identifiers only; the closures that actually
//! construct instances, assign members, read member exports, and run
//! post-construction hooks live here. Binding a plan to a registry
//! resolves every step to a concrete closure once, so the engine never
//! performs name-based dispatch while executing.

use crate::deferred::{Deferred, DeferredExport};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use weft_core::{BoxError, HookName, MemberName, PartId};

/// A live part instance, type-erased.
///
/// Parts are handed around as `Arc<dyn Any>` and downcast at the typed
/// API boundary; cross-referencing parts therefore never form
/// language-level ownership cycles even when the logical graph is cyclic.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Constructor closure over resolved import values
pub type CtorFn = Arc<dyn Fn(&[ImportValue]) -> Result<Instance, BoxError> + Send + Sync>;

/// Member setter closure
pub type SetterFn = Arc<dyn Fn(&Instance, ImportValue) -> Result<(), BoxError> + Send + Sync>;

/// Member export getter closure
pub type GetterFn = Arc<dyn Fn(&Instance) -> Result<Instance, BoxError> + Send + Sync>;

/// Post-construction hook closure
pub type HookFn = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// A resolved import value delivered to a constructor or setter.
///
/// The variant mirrors the import's cardinality and laziness; the typed
/// accessors below downcast to the part's concrete types.
pub enum ImportValue {
    /// `exactly-one`, eager
    One(Instance),
    /// `zero-or-one`, eager
    Optional(Option<Instance>),
    /// `many`, eager
    Many(Vec<Instance>),
    /// `exactly-one`, deferred
    DeferredOne(DeferredExport),
    /// `zero-or-one`, deferred
    DeferredOptional(Option<DeferredExport>),
    /// `many`, deferred
    DeferredMany(Vec<DeferredExport>),
}

/// Mismatched use of an [`ImportValue`] accessor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Accessor does not match the value's cardinality/laziness
    #[error("import value is {found}, accessed as {expected}")]
    WrongKind {
        /// What the accessor expected
        expected: &'static str,
        /// What the value actually is
        found: &'static str,
    },

    /// The instance is not of the requested type
    #[error("import value is not of type `{expected}`")]
    WrongType {
        /// The requested type name
        expected: &'static str,
    },
}

fn downcast<T: Any + Send + Sync>(instance: &Instance) -> Result<Arc<T>, ValueError> {
    instance
        .clone()
        .downcast::<T>()
        .map_err(|_| ValueError::WrongType {
            expected: std::any::type_name::<T>(),
        })
}

impl ImportValue {
    fn kind(&self) -> &'static str {
        match self {
            ImportValue::One(_) => "one",
            ImportValue::Optional(_) => "optional",
            ImportValue::Many(_) => "many",
            ImportValue::DeferredOne(_) => "deferred one",
            ImportValue::DeferredOptional(_) => "deferred optional",
            ImportValue::DeferredMany(_) => "deferred many",
        }
    }

    /// The single eager instance
    pub fn one<T: Any + Send + Sync>(&self) -> Result<Arc<T>, BoxError> {
        match self {
            ImportValue::One(instance) => Ok(downcast(instance)?),
            other => Err(ValueError::WrongKind {
                expected: "one",
                found: other.kind(),
            }
            .into()),
        }
    }

    /// The optional eager instance
    pub fn optional<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>, BoxError> {
        match self {
            ImportValue::Optional(instance) => {
                instance.as_ref().map(downcast).transpose().map_err(Into::into)
            }
            other => Err(ValueError::WrongKind {
                expected: "optional",
                found: other.kind(),
            }
            .into()),
        }
    }

    /// Every eager instance, in stable match order
    pub fn many<T: Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>, BoxError> {
        match self {
            ImportValue::Many(instances) => instances
                .iter()
                .map(downcast)
                .collect::<Result<Vec<_>, _>>()
                .map_err(Into::into),
            other => Err(ValueError::WrongKind {
                expected: "many",
                found: other.kind(),
            }
            .into()),
        }
    }

    /// The single deferred handle
    pub fn deferred<T: Any + Send + Sync>(&self) -> Result<Deferred<T>, BoxError> {
        match self {
            ImportValue::DeferredOne(handle) => Ok(handle.clone().into_typed()),
            other => Err(ValueError::WrongKind {
                expected: "deferred one",
                found: other.kind(),
            }
            .into()),
        }
    }

    /// The optional deferred handle
    pub fn deferred_optional<T: Any + Send + Sync>(
        &self,
    ) -> Result<Option<Deferred<T>>, BoxError> {
        match self {
            ImportValue::DeferredOptional(handle) => {
                Ok(handle.as_ref().map(|h| h.clone().into_typed()))
            }
            other => Err(ValueError::WrongKind {
                expected: "deferred optional",
                found: other.kind(),
            }
            .into()),
        }
    }

    /// Every deferred handle, in stable match order
    pub fn deferred_many<T: Any + Send + Sync>(&self) -> Result<Vec<Deferred<T>>, BoxError> {
        match self {
            ImportValue::DeferredMany(handles) => {
                Ok(handles.iter().map(|h| h.clone().into_typed()).collect())
            }
            other => Err(ValueError::WrongKind {
                expected: "deferred many",
                found: other.kind(),
            }
            .into()),
        }
    }
}

/// The closures backing one part.
///
/// Parts with an importable constructor supply `constructor`; parts
/// without one must supply a pre-built `instance` instead. Setters,
/// getters, and hooks are keyed by the identifiers the declaration uses.
pub struct PartFactory {
    pub(crate) constructor: Option<CtorFn>,
    pub(crate) instance: Option<Instance>,
    pub(crate) setters: BTreeMap<MemberName, SetterFn>,
    pub(crate) getters: BTreeMap<MemberName, GetterFn>,
    pub(crate) hooks: BTreeMap<HookName, HookFn>,
}

impl PartFactory {
    /// Start building a factory
    pub fn builder() -> FactoryBuilder {
        FactoryBuilder {
            factory: PartFactory {
                constructor: None,
                instance: None,
                setters: BTreeMap::new(),
                getters: BTreeMap::new(),
                hooks: BTreeMap::new(),
            },
        }
    }

    /// Factory with just a constructor
    pub fn constructing(
        ctor: impl Fn(&[ImportValue]) -> Result<Instance, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::builder().constructor(ctor).build()
    }

    /// Factory backing a part with no importable constructor
    pub fn prebuilt<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::builder().instance(value).build()
    }
}

/// Builder for [`PartFactory`]
pub struct FactoryBuilder {
    factory: PartFactory,
}

impl FactoryBuilder {
    /// Supply the constructor closure
    pub fn constructor(
        mut self,
        ctor: impl Fn(&[ImportValue]) -> Result<Instance, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.factory.constructor = Some(Arc::new(ctor));
        self
    }

    /// Supply a pre-built instance
    pub fn instance<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        let erased: Instance = value;
        self.factory.instance = Some(erased);
        self
    }

    /// Supply a member setter
    pub fn setter(
        mut self,
        member: impl Into<MemberName>,
        setter: impl Fn(&Instance, ImportValue) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.factory.setters.insert(member.into(), Arc::new(setter));
        self
    }

    /// Supply a member export getter
    pub fn getter(
        mut self,
        member: impl Into<MemberName>,
        getter: impl Fn(&Instance) -> Result<Instance, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.factory.getters.insert(member.into(), Arc::new(getter));
        self
    }

    /// Supply a post-construction hook
    pub fn hook(
        mut self,
        name: impl Into<HookName>,
        hook: impl Fn(&Instance) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.factory.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    /// Finish the factory
    pub fn build(self) -> PartFactory {
        self.factory
    }
}

/// Registry of part factories, keyed by part identity
#[derive(Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<PartId, PartFactory>,
}

impl FactoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a part
    pub fn register(&mut self, id: impl Into<PartId>, factory: PartFactory) -> &mut Self {
        self.factories.insert(id.into(), factory);
        self
    }

    /// Register a factory (chainable)
    pub fn with(mut self, id: impl Into<PartId>, factory: PartFactory) -> Self {
        self.factories.insert(id.into(), factory);
        self
    }

    /// Look up a part's factory
    pub fn get(&self, id: &PartId) -> Option<&PartFactory> {
        self.factories.get(id)
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// How a bound node produces its base instance
pub(crate) enum Backing {
    /// Run the constructor closure over resolved imports
    Constructor(CtorFn),
    /// Hand out the pre-built instance (parts without an importable
    /// constructor)
    Prebuilt(Instance),
}

/// One plan node with every step resolved to a concrete closure
pub(crate) struct BoundNode {
    pub(crate) backing: Backing,
    /// Parallel to the plan node's member slots
    pub(crate) setters: Vec<SetterFn>,
    /// Getters for every member this node is referenced through
    pub(crate) getters: rustc_hash::FxHashMap<MemberName, GetterFn>,
    pub(crate) hook: Option<HookFn>,
}

/// Errors binding a plan to a registry.
///
/// All raised at engine build, before any instance exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The plan failed structural validation
    #[error("plan is invalid: {0}")]
    InvalidPlan(String),

    /// No factory registered for a plan node
    #[error("no factory registered for part `{part}`")]
    MissingFactory {
        /// The unbacked part
        part: PartId,
    },

    /// The plan expects a constructor the factory does not supply
    #[error("part `{part}` needs a constructor, but its factory supplies none")]
    MissingConstructor {
        /// The affected part
        part: PartId,
    },

    /// A part without an importable constructor has no pre-built instance
    #[error("part `{part}` has no importable constructor and its factory supplies no instance")]
    MissingInstance {
        /// The affected part
        part: PartId,
    },

    /// A member assignment has no setter
    #[error("part `{part}` has no setter for member `{member}`")]
    MissingSetter {
        /// The affected part
        part: PartId,
        /// The unbacked member
        member: MemberName,
    },

    /// A member export has no getter
    #[error("part `{part}` has no getter for member `{member}`")]
    MissingGetter {
        /// The affected part
        part: PartId,
        /// The unbacked member
        member: MemberName,
    },

    /// A declared hook has no closure
    #[error("part `{part}` has no hook named `{hook}`")]
    MissingHook {
        /// The affected part
        part: PartId,
        /// The unbacked hook
        hook: HookName,
    },
}
