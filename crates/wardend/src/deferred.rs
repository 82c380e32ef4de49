//! Deferred-execution scheduler for the single-threaded event loop.
//!
//! Request handlers never run from the inbound message-dispatch stack; they
//! are queued here and invoked by the loop once the current callback has
//! returned. This bounds stack depth across chained dispatches and keeps
//! registry mutation out of reentrant paths. The queue is bounded; a full
//! queue is a resource failure the inbound call must surface to its caller.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use thiserror::Error;

/// Default bound on queued callbacks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A queued loop callback receiving the owning context.
pub type Deferred<C> = Box<dyn FnOnce(&mut C)>;

/// Failure to queue a deferred callback.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The queue is at capacity.
    #[error("deferred queue exhausted ({capacity} callbacks pending)")]
    ResourceExhausted {
        /// Configured queue bound.
        capacity: usize,
    },
}

/// Bounded FIFO of deferred loop callbacks.
pub struct Scheduler<C> {
    queue: Rc<RefCell<VecDeque<Deferred<C>>>>,
    capacity: usize,
}

impl<C> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            capacity: self.capacity,
        }
    }
}

impl<C> Scheduler<C> {
    /// Creates a scheduler bounded to `capacity` pending callbacks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            capacity,
        }
    }

    /// Whether another callback can be queued right now.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.queue.borrow().len() < self.capacity
    }

    /// Number of callbacks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Queues a callback for the next loop turn.
    pub fn schedule(&self, callback: impl FnOnce(&mut C) + 'static) -> Result<(), ScheduleError> {
        let mut queue = self.queue.borrow_mut();
        if queue.len() >= self.capacity {
            return Err(ScheduleError::ResourceExhausted {
                capacity: self.capacity,
            });
        }
        queue.push_back(Box::new(callback));
        Ok(())
    }

    /// Removes and returns the oldest queued callback.
    ///
    /// The loop calls this after each dispatch turn and invokes the callback
    /// with the owning context; taking before invoking keeps the queue
    /// unborrowed while the callback runs.
    #[must_use]
    pub fn take_next(&self) -> Option<Deferred<C>> {
        self.queue.borrow_mut().pop_front()
    }
}

impl<C> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("capacity", &self.capacity)
            .finish()
    }
}
