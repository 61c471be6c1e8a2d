//! Deferred export handles
//!
//! A deferred import is satisfied with a handle instead of an instance.
//! Invoking the handle resolves the target node at that moment: on the
//! originating scope chain when possible, otherwise inside a child scope
//! chain the handle creates once and reuses. Handles hold weak
//! references to the engine and their originating scope, so an engine or
//! scope that has gone away surfaces as a disposal error rather than
//! being kept alive by stray handles.

use crate::engine::EngineCore;
use crate::linker::Instance;
use crate::scope::{find_scope, ScopeInstance};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use weft_core::{ContractName, Error, MemberName, Result, ScopeName};
use weft_plan::NodeIndex;

/// Untyped deferred handle.
///
/// Cloning shares the memoized child scope, so every clone of one handle
/// resolves into the same scope instance.
#[derive(Clone)]
pub struct DeferredExport {
    pub(crate) core: Weak<EngineCore>,
    pub(crate) origin: Weak<ScopeInstance>,
    pub(crate) origin_name: ScopeName,
    pub(crate) target: NodeIndex,
    pub(crate) member: Option<MemberName>,
    pub(crate) creates_scope: Option<ScopeName>,
    /// Diagnostic label for type errors: the requested contract when the
    /// handle came from a request, the target part otherwise
    pub(crate) label: ContractName,
    pub(crate) created: Arc<OnceCell<Arc<ScopeInstance>>>,
}

impl DeferredExport {
    /// Resolve the target, constructing it (and its scope chain) on first
    /// use as required.
    pub fn resolve(&self) -> Result<Instance> {
        let core = self.core.upgrade().ok_or_else(|| Error::ScopeDisposed {
            scope: self.origin_name.clone(),
        })?;
        let origin = self.origin.upgrade().ok_or_else(|| Error::ScopeDisposed {
            scope: self.origin_name.clone(),
        })?;

        let scope = match &self.creates_scope {
            None => origin,
            Some(target_scope) => match find_scope(&origin, target_scope) {
                // Already active on the chain: fetch
                Some(existing) => existing,
                // Otherwise create once and reuse across invocations
                None => self
                    .created
                    .get_or_try_init(|| core.create_scope_chain(&origin, target_scope))
                    .map(Arc::clone)?,
            },
        };

        core.resolve_reference(self.target, self.member.as_ref(), &scope)
    }

    /// Attach the expected instance type
    pub fn into_typed<T: Any + Send + Sync>(self) -> Deferred<T> {
        Deferred {
            inner: self,
            _marker: PhantomData,
        }
    }
}

impl std::fmt::Debug for DeferredExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExport")
            .field("target", &self.target)
            .field("member", &self.member)
            .field("creates_scope", &self.creates_scope)
            .finish()
    }
}

/// Typed deferred handle; the lazy accessor handed to importing parts.
pub struct Deferred<T> {
    inner: DeferredExport,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Deferred<T> {
    /// Resolve and downcast the target instance.
    ///
    /// Repeated calls against a shared target return the identical
    /// cached instance.
    pub fn get(&self) -> Result<Arc<T>> {
        let instance = self.inner.resolve()?;
        instance
            .downcast::<T>()
            .map_err(|_| Error::WrongInstanceType {
                contract: self.inner.label.clone(),
            })
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("inner", &self.inner).finish()
    }
}
