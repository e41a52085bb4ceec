//! # OperationGuard
//! Keeps at most one instance of a logical mutating operation (mark a notification read, delete it) in
//! flight. Rapid clicks and component re-mounts otherwise produce duplicate network calls.
//!
//! Liveness is explicit: a component takes a [`Scope`] when it mounts and drops it when it unmounts.
//! Guarded operations carry a [`ScopeToken`]. A call that settles after its scope died is reported as
//! [`GuardOutcome::Detached`], and the caller must not touch shared state with its result. Dropping a
//! scope never releases a guard; only the settling call does, so a remount cannot start a duplicate
//! while the original request is still running.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::future::Future;
use std::rc::Rc;

pub fn mark_read_op(notification_id: &str) -> String {
    format!("markRead:{notification_id}")
}

pub fn delete_op(notification_id: &str) -> String {
    format!("delete:{notification_id}")
}

/// Owned by a mounted component. Dropping it marks the component unmounted.
#[derive(Debug)]
pub struct Scope {
    alive: Rc<Cell<bool>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    pub fn token(&self) -> ScopeToken {
        ScopeToken {
            alive: Rc::clone(&self.alive),
        }
    }

    pub fn close(self) {}
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

#[derive(Clone, Debug)]
pub struct ScopeToken {
    alive: Rc<Cell<bool>>,
}

impl ScopeToken {
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome<T, E> {
    /// The same operation was already in flight; the closure was not called.
    Skipped,
    Completed(Result<T, E>),
    /// The closure ran to completion but the invoking scope was gone by then.
    Detached(Result<T, E>),
}

impl<T, E> GuardOutcome<T, E> {
    pub fn ran(&self) -> bool {
        !matches!(self, GuardOutcome::Skipped)
    }
}

#[derive(Clone, Default)]
pub struct OperationGuard {
    active: Rc<RefCell<HashSet<String>>>,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `op_id` is already in flight.
    pub fn try_acquire(&self, op_id: &str) -> bool {
        self.active.borrow_mut().insert(op_id.to_string())
    }

    pub fn release(&self, op_id: &str) {
        self.active.borrow_mut().remove(op_id);
    }

    pub fn is_held(&self, op_id: &str) -> bool {
        self.active.borrow().contains(op_id)
    }

    pub async fn run<T, E, F, Fut>(&self, op_id: &str, scope: &ScopeToken, op: F) -> GuardOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire(op_id) {
            log::debug!("Skipping {op_id}: already in flight");
            return GuardOutcome::Skipped;
        }
        let _lease = Lease { guard: self, op_id };

        let result = op().await;
        if scope.is_alive() {
            GuardOutcome::Completed(result)
        } else {
            log::debug!("{op_id} settled after its scope was dropped");
            GuardOutcome::Detached(result)
        }
    }
}

/// Releases the guard when the operation settles or its future is dropped.
struct Lease<'a> {
    guard: &'a OperationGuard,
    op_id: &'a str,
}

impl<'a> Drop for Lease<'a> {
    fn drop(&mut self) {
        self.guard.release(self.op_id);
    }
}
