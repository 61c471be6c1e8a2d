//! Scope instances and per-scope instance caches
//!
//! A scope instance is one live incarnation of a sharing scope: it owns
//! the instance cache for every part resolved into that scope. The cache
//! is the engine's only shared mutable state; a per-node cell state
//! machine serializes concurrent first requests so construction happens
//! at most once per node per scope instance. Cell and scope locks are
//! held only for state transitions, never across nested construction, so
//! parent and child scope locks cannot deadlock.

use crate::linker::Instance;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;
use uuid::Uuid;
use weft_core::{Error, PartId, Result, ScopeName};

/// Unique identity of one scope instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Construction lifecycle of one cached node.
///
/// `Published` exposes the instance to its own builder thread before
/// member assignment runs; that is what lets a deferred back reference
/// invoked from a member setter or hook observe the identical instance.
enum CellState {
    Empty,
    Building(ThreadId),
    Published(Instance, ThreadId),
    Ready(Instance),
}

struct InstanceCell {
    state: Mutex<CellState>,
    ready: Condvar,
}

impl InstanceCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Empty),
            ready: Condvar::new(),
        }
    }
}

type CellMap = DashMap<u32, Arc<InstanceCell>, BuildHasherDefault<FxHasher>>;

struct ScopeState {
    disposed: bool,
    active: usize,
    children: Vec<Arc<ScopeInstance>>,
}

/// One live incarnation of a sharing scope.
///
/// Children hold weak parent references; parents own their children, so
/// disposal is transitive downward and the chain never forms an
/// ownership cycle.
pub(crate) struct ScopeInstance {
    id: ScopeId,
    name: ScopeName,
    parent: Option<Weak<ScopeInstance>>,
    weak_self: Weak<ScopeInstance>,
    cells: CellMap,
    state: Mutex<ScopeState>,
    idle: Condvar,
}

impl ScopeInstance {
    fn make(name: ScopeName, parent: Option<Weak<ScopeInstance>>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            id: ScopeId::new(),
            name,
            parent,
            weak_self: weak.clone(),
            cells: CellMap::default(),
            state: Mutex::new(ScopeState {
                disposed: false,
                active: 0,
                children: Vec::new(),
            }),
            idle: Condvar::new(),
        })
    }

    /// The root (global) scope instance
    pub(crate) fn root() -> Arc<Self> {
        Self::make(ScopeName::global(), None)
    }

    /// Create a child scope instance
    pub(crate) fn child(&self, name: ScopeName) -> Result<Arc<Self>> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::ScopeDisposed {
                scope: self.name.clone(),
            });
        }
        let child = Self::make(name, Some(self.weak_self.clone()));
        state.children.push(Arc::clone(&child));
        debug!(
            target: "weft::engine",
            scope = %child.name,
            id = %child.id,
            parent = %self.name,
            "scope instance created"
        );
        Ok(child)
    }

    pub(crate) fn id(&self) -> ScopeId {
        self.id
    }

    pub(crate) fn name(&self) -> &ScopeName {
        &self.name
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Register in-flight construction; disposal waits for the guard.
    pub(crate) fn begin_build(&self) -> Result<BuildGuard<'_>> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::ScopeDisposed {
                scope: self.name.clone(),
            });
        }
        state.active += 1;
        Ok(BuildGuard { scope: self })
    }

    /// At-most-once construction of a shared node in this scope instance.
    ///
    /// `ctor` runs outside every lock; the result is published to the
    /// cell before `post` (member assignment, hook) runs, and promoted to
    /// ready afterwards. Returns the instance plus whether it was a
    /// cache hit. A failure at either phase resets the cell so a later
    /// caller-driven request may try again; the engine itself never
    /// retries.
    pub(crate) fn resolve_shared(
        &self,
        index: u32,
        part: &PartId,
        ctor: impl FnOnce() -> Result<Instance>,
        post: impl FnOnce(&Instance) -> Result<()>,
    ) -> Result<(Instance, bool)> {
        let cell = self
            .cells
            .entry(index)
            .or_insert_with(|| Arc::new(InstanceCell::new()))
            .clone();
        let me = thread::current().id();

        loop {
            let mut state = cell.state.lock();
            match &*state {
                CellState::Ready(instance) => return Ok((instance.clone(), true)),
                CellState::Published(instance, owner) => {
                    if *owner == me {
                        // Re-entrant access from this node's own member
                        // assignment or hook; the instance is complete
                        // enough to hand out.
                        return Ok((instance.clone(), true));
                    }
                    cell.ready.wait(&mut state);
                }
                CellState::Building(owner) => {
                    if *owner == me {
                        return Err(Error::ConstructionFailed {
                            part: part.clone(),
                            source: "deferred access re-entered a constructor still in progress"
                                .into(),
                        });
                    }
                    cell.ready.wait(&mut state);
                }
                CellState::Empty => {
                    *state = CellState::Building(me);
                    break;
                }
            }
        }

        let instance = match ctor() {
            Ok(instance) => instance,
            Err(e) => {
                let mut state = cell.state.lock();
                *state = CellState::Empty;
                cell.ready.notify_all();
                return Err(e);
            }
        };

        {
            let mut state = cell.state.lock();
            *state = CellState::Published(instance.clone(), me);
            cell.ready.notify_all();
        }

        if let Err(e) = post(&instance) {
            let mut state = cell.state.lock();
            *state = CellState::Empty;
            cell.ready.notify_all();
            return Err(e);
        }

        {
            let mut state = cell.state.lock();
            *state = CellState::Ready(instance.clone());
            cell.ready.notify_all();
        }
        Ok((instance, false))
    }

    /// Dispose this scope instance and, transitively, every child it
    /// created. Waits until in-flight construction in this scope
    /// completes. Returns the number of scope instances disposed, zero
    /// when already disposed.
    pub(crate) fn dispose(&self) -> u64 {
        let children = {
            let mut state = self.state.lock();
            if state.disposed {
                return 0;
            }
            state.disposed = true;
            while state.active > 0 {
                self.idle.wait(&mut state);
            }
            std::mem::take(&mut state.children)
        };

        let mut disposed = 1;
        for child in children {
            disposed += child.dispose();
        }
        self.cells.clear();
        debug!(
            target: "weft::engine",
            scope = %self.name,
            id = %self.id,
            "scope instance disposed"
        );
        disposed
    }
}

/// Nearest instance named `name` on the chain from `start` to the root
pub(crate) fn find_scope(
    start: &Arc<ScopeInstance>,
    name: &ScopeName,
) -> Option<Arc<ScopeInstance>> {
    let mut current = Some(Arc::clone(start));
    while let Some(scope) = current {
        if scope.name() == name {
            return Some(scope);
        }
        current = scope.parent.as_ref().and_then(Weak::upgrade);
    }
    None
}

/// Active-construction guard; see [`ScopeInstance::begin_build`]
pub(crate) struct BuildGuard<'a> {
    scope: &'a ScopeInstance,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.scope.state.lock();
        state.active -= 1;
        if state.active == 0 {
            self.scope.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_instance(n: u32) -> Instance {
        Arc::new(n)
    }

    #[test]
    fn test_resolve_shared_caches() {
        let scope = ScopeInstance::root();
        let part = PartId::named("p");

        let (first, hit) = scope
            .resolve_shared(0, &part, || Ok(as_instance(7)), |_| Ok(()))
            .unwrap();
        assert!(!hit);

        let (second, hit) = scope
            .resolve_shared(0, &part, || panic!("must not rebuild"), |_| Ok(()))
            .unwrap();
        assert!(hit);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_distinct_indices_get_distinct_cells() {
        let scope = ScopeInstance::root();
        let part = PartId::named("p");
        scope
            .resolve_shared(0, &part, || Ok(as_instance(1)), |_| Ok(()))
            .unwrap();
        let (other, hit) = scope
            .resolve_shared(1, &part, || Ok(as_instance(2)), |_| Ok(()))
            .unwrap();
        assert!(!hit);
        assert_eq!(*other.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_failed_construction_resets_cell() {
        let scope = ScopeInstance::root();
        let part = PartId::named("p");

        let failed: Result<_> = scope.resolve_shared(
            0,
            &part,
            || {
                Err(Error::ConstructionFailed {
                    part: PartId::named("p"),
                    source: "boom".into(),
                })
            },
            |_| Ok(()),
        );
        assert!(failed.is_err());

        // A fresh request may try again
        let (instance, hit) = scope
            .resolve_shared(0, &part, || Ok(as_instance(9)), |_| Ok(()))
            .unwrap();
        assert!(!hit);
        assert_eq!(*instance.downcast::<u32>().unwrap(), 9);
    }

    #[test]
    fn test_disposed_scope_rejects_builds() {
        let scope = ScopeInstance::root();
        assert_eq!(scope.dispose(), 1);
        assert!(scope.is_disposed());
        assert!(matches!(
            scope.begin_build(),
            Err(Error::ScopeDisposed { .. })
        ));
    }

    #[test]
    fn test_dispose_is_idempotent_and_transitive() {
        let root = ScopeInstance::root();
        let session = root.child(ScopeName::new("session")).unwrap();
        let request = session.child(ScopeName::new("request")).unwrap();

        assert_eq!(root.dispose(), 3);
        assert!(session.is_disposed());
        assert!(request.is_disposed());
        assert_eq!(root.dispose(), 0);
    }

    #[test]
    fn test_find_scope_walks_the_chain() {
        let root = ScopeInstance::root();
        let session = root.child(ScopeName::new("session")).unwrap();
        let request = session.child(ScopeName::new("request")).unwrap();

        let found = find_scope(&request, &ScopeName::new("session")).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        let global = find_scope(&request, &ScopeName::global()).unwrap();
        assert!(Arc::ptr_eq(&global, &root));
        assert!(find_scope(&request, &ScopeName::new("batch")).is_none());
    }

    #[test]
    fn test_child_of_disposed_scope_fails() {
        let root = ScopeInstance::root();
        root.dispose();
        assert!(root.child(ScopeName::new("session")).is_err());
    }
}
