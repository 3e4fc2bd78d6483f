//! The live body collection
//!
//! Writers (fragment emission, the control plane, the post-integration
//! sweep) hold the lock only for a push or a `retain`. Force tasks never
//! iterate under the lock: the scheduler takes a copy of the `Arc` list at
//! dispatch and fans that copy out, so bodies inserted mid-cycle join at
//! the next dispatch.
//!
//! Lock order is collection, then body. Nobody takes the collection lock
//! while holding a body guard.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::body::{Body, BodyId};

#[derive(Debug, Default)]
pub struct BodySet {
    bodies: RwLock<Vec<Arc<Body>>>,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bodies(bodies: impl IntoIterator<Item = Body>) -> Self {
        Self {
            bodies: RwLock::new(bodies.into_iter().map(Arc::new).collect()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Body>>> {
        self.bodies.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Body>>> {
        self.bodies.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current membership, safe to iterate while others insert
    pub fn snapshot(&self) -> Vec<Arc<Body>> {
        self.read().clone()
    }

    pub fn insert(&self, body: Body) -> Arc<Body> {
        let body = Arc::new(body);
        self.write().push(Arc::clone(&body));
        body
    }

    pub fn insert_many(&self, bodies: Vec<Body>) {
        if bodies.is_empty() {
            return;
        }
        self.write().extend(bodies.into_iter().map(Arc::new));
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn find(&self, id: BodyId) -> Option<Arc<Body>> {
        self.read().iter().find(|b| b.id() == id).cloned()
    }

    /// All members matching `predicate`, in collection order
    pub fn select(&self, predicate: impl Fn(&Body) -> bool) -> Vec<Arc<Body>> {
        self.read().iter().filter(|b| predicate(b)).cloned().collect()
    }

    /// Drop the bodies whose absent record was just published, returning
    /// how many were removed. A body retired after its record was built
    /// stays until a later cycle reports it absent
    pub fn sweep_reported(&self, absent: &[BodyId]) -> usize {
        if absent.is_empty() {
            return 0;
        }
        let mut absent = absent.to_vec();
        absent.sort_unstable();
        let mut bodies = self.write();
        let before = bodies.len();
        bodies.retain(|b| absent.binary_search(&b.id()).is_err());
        before - bodies.len()
    }
}
