//! Fixed-capacity pools.
//!
//! All engine memory is reserved at startup. Pools expose `acquire` returning
//! `Option` — exhaustion is a normal, handled condition the caller recovers
//! from by declining the unit of work. Nothing here blocks or grows.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::types::request::Request;

/// Recycling pool of [`Request`] objects.
///
/// Acquired requests move by value through the engine and come back through
/// [`release`](Self::release) once the ingress side drains the free-list.
pub struct RequestPool {
    free: ArrayQueue<Box<Request>>,
    capacity: usize,
}

impl RequestPool {
    /// Pre-allocate `capacity` request objects.
    pub fn new(capacity: usize) -> Arc<Self> {
        let free = ArrayQueue::new(capacity.max(1));
        for _ in 0..capacity.max(1) {
            // Cannot fail: the queue was sized for exactly this many.
            let _ = free.push(Box::new(Request::blank()));
        }
        Arc::new(Self {
            free,
            capacity: capacity.max(1),
        })
    }

    /// Take a blank request, or `None` when the pool is exhausted.
    pub fn acquire(&self) -> Option<Box<Request>> {
        self.free.pop()
    }

    /// Return a request for reuse. Buffers are dropped here.
    pub fn release(&self, mut req: Box<Request>) {
        req.reset();
        // A request can only be released after an acquire, so a slot is free.
        let _ = self.free.push(req);
    }

    /// Number of requests currently available.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Total pool capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Budget of live execution contexts.
///
/// A ticket is reserved when a request is admitted and released when its
/// context dies, so admission declines before any accounting is touched —
/// the same point the original allocated a context at.
pub struct ContextBudget {
    permits: ArrayQueue<()>,
}

impl ContextBudget {
    /// Create a budget of `capacity` live contexts.
    pub fn new(capacity: usize) -> Arc<Self> {
        let permits = ArrayQueue::new(capacity.max(1));
        for _ in 0..capacity.max(1) {
            let _ = permits.push(());
        }
        Arc::new(Self { permits })
    }

    /// Reserve one context, or `None` when the budget is spent.
    pub fn acquire(self: &Arc<Self>) -> Option<ContextTicket> {
        self.permits.pop().map(|()| ContextTicket {
            budget: Arc::clone(self),
        })
    }

    /// Contexts still available.
    pub fn available(&self) -> usize {
        self.permits.len()
    }
}

/// RAII reservation of one execution context.
#[derive(Debug)]
pub struct ContextTicket {
    budget: Arc<ContextBudget>,
}

impl std::fmt::Debug for ContextBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBudget")
            .field("available", &self.permits.len())
            .finish()
    }
}

impl Drop for ContextTicket {
    fn drop(&mut self) {
        let _ = self.budget.permits.push(());
    }
}
