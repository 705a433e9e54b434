//! Cooperative single-threaded scheduler
//!
//! All reflux execution is cooperative: there is no parallelism, only
//! interleaving at explicit suspension points. The [`Scheduler`] is a
//! single-threaded work queue: a task spawned while a future is
//! running executes as soon as that future next yields, which is how
//! "flush at the end of the current synchronous stretch" is realized
//! without relying on a host event loop's microtask semantics.
//!
//! [`Gate`] is a one-shot condition: a flush task opens it when a batch
//! has been committed, and readers `wait().await` it to observe the
//! committed state.

use crate::error::{GraphError, Result};
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Single-threaded cooperative work queue
pub struct Scheduler {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Scheduler {
    /// Create a new scheduler with an empty queue
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// Queue a task
    ///
    /// The task runs once the currently executing future yields, before
    /// any task queued after it.
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) -> Result<()> {
        self.spawner
            .spawn_local(task)
            .map_err(|_| GraphError::SchedulerStopped)
    }

    /// Drive a future to completion, servicing queued tasks whenever it
    /// is pending
    pub fn run_until<F: Future>(&self, future: F) -> F::Output {
        self.pool.borrow_mut().run_until(future)
    }

    /// Run queued tasks until none can make progress
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct GateState {
    open: bool,
    wakers: Vec<Waker>,
}

/// One-shot condition future
///
/// Starts closed; [`Gate::open`] releases every current and future
/// waiter. Clones share state.
#[derive(Clone, Default)]
pub struct Gate {
    state: Rc<RefCell<GateState>>,
}

impl Gate {
    /// Create a closed gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate, waking all waiters
    pub fn open(&self) {
        let wakers = {
            let mut state = self.state.borrow_mut();
            state.open = true;
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Check whether the gate has been opened
    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    /// Wait for the gate to open
    pub fn wait(&self) -> GateWait {
        GateWait {
            state: self.state.clone(),
        }
    }
}

/// Future returned by [`Gate::wait`]
pub struct GateWait {
    state: Rc<RefCell<GateState>>,
}

impl Future for GateWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.borrow_mut();
        if state.open {
            Poll::Ready(())
        } else {
            state.wakers.push(cx.waker().clone());
            Poll::Pending
        }
    }
}
