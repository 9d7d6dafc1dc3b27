// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The scheduler state and its tick loop.
//!
//! [`Scheduler`] owns everything: the queue node pool, the task and signal
//! arenas, the three system sets (`running`, `ready`, `error`), the main
//! task and the optional poll hook. One [`once`](Scheduler::once) call is
//! one *tick*: the current ready set is drained in FIFO order with the same
//! single-fire pass used for signal emission, then the poll hook gets a
//! chance to inject external readiness (I/O, timers) before the tick is
//! classified.
//!
//! Task-local errors never abort a tick. Errored tasks accumulate in the
//! error set, ticks report [`Tick::Errors`] while it is non-empty, and the
//! embedder drains it with [`collect`](Scheduler::collect).

use crate::queue::{NodeOwner, NodeRef, Pool};
use crate::signal::SignalSlot;
use crate::task::{Body, TaskId, TaskSlot};
use core::fmt;
use core::fmt::Write as _;
use slab::Slab;

/// Outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Nothing left to do: the ready set is empty, the poll hook (if any)
    /// reported quiescence, and no task is parked in the error set.
    Quiescent,
    /// More work is pending; tick again.
    More,
    /// One or more tasks errored; drain them with
    /// [`collect`](Scheduler::collect).
    Errors,
}

/// The poll hook: runs at the end of every tick, returns `true` while it
/// expects more work (pending I/O, armed timers).
pub type PollFn = Box<dyn FnMut(&mut Scheduler) -> bool>;

/// A cooperative scheduler multiplexing tasks onto the calling thread.
///
/// Not thread-safe by design: exactly one task has control at any time and
/// every suspension point is explicit.
pub struct Scheduler {
    pub(crate) pool: Pool,
    pub(crate) tasks: Slab<TaskSlot>,
    pub(crate) signals: Slab<SignalSlot>,
    pub(crate) running_root: NodeRef,
    pub(crate) ready_root: NodeRef,
    pub(crate) error_root: NodeRef,
    pub(crate) main: TaskId,
    /// Tasks currently being resumed, innermost last.
    pub(crate) stack: Vec<TaskId>,
    poll: Option<PollFn>,
    generation: u32,
}

// === impl Scheduler ===

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("signals", &self.signals.len())
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler. The host's own context is wrapped as the main
    /// task and pinned in the running set for the scheduler's lifetime.
    #[must_use]
    pub fn new() -> Self {
        let mut pool = Pool::new();
        let running_root = pool.alloc(NodeOwner::Root);
        let ready_root = pool.alloc(NodeOwner::Root);
        let error_root = pool.alloc(NodeOwner::Root);

        let mut tasks = Slab::new();
        let idx = tasks.vacant_key();
        let head = pool.alloc(NodeOwner::Task(idx));
        let joined = pool.alloc(NodeOwner::Root);
        pool.append(head, running_root);
        let main = TaskId { idx, generation: 0 };
        tasks.insert(TaskSlot {
            generation: 0,
            head,
            joined,
            waitat: Some(running_root),
            ctx: Vec::new(),
            body: Body::Main,
        });

        Self {
            pool,
            tasks,
            signals: Slab::new(),
            running_root,
            ready_root,
            error_root,
            main,
            stack: Vec::new(),
            poll: None,
            generation: 1,
        }
    }

    pub(crate) fn next_generation(&mut self) -> u32 {
        let g = self.generation;
        self.generation = self.generation.wrapping_add(1);
        g
    }

    /// Install the poll hook. It runs after the ready set of each tick has
    /// been drained and may create, ready or wake tasks; tasks it makes
    /// ready run on the *next* tick.
    pub fn set_poll<F>(&mut self, poll: F)
    where
        F: FnMut(&mut Scheduler) -> bool + 'static,
    {
        self.poll = Some(Box::new(poll));
    }

    /// Remove the poll hook.
    pub fn clear_poll(&mut self) {
        self.poll = None;
    }

    /// Drive one tick: resume every task that was ready when the tick
    /// started (each exactly once), then run the poll hook.
    ///
    /// Tasks that become ready during the tick, including ones re-readied
    /// from within it, run no earlier than the next tick.
    pub fn once(&mut self) -> Tick {
        let ready = self.ready_root;
        let scratch = self.pool.alloc(NodeOwner::Root);
        self.pool.replace(scratch, ready);
        self.pool.init(ready);
        let polled = self.emit_root(scratch, None);
        debug_assert!(!self.pool.is_linked(scratch));
        self.pool.free(scratch);

        let mut more = false;
        if let Some(mut poll) = self.poll.take() {
            more = poll(self);
            // the hook may have installed a replacement for itself
            if self.poll.is_none() {
                self.poll = Some(poll);
            }
        }

        let tick = if self.pool.is_linked(self.error_root) {
            Tick::Errors
        } else if more || self.pool.is_linked(self.ready_root) {
            Tick::More
        } else {
            Tick::Quiescent
        };
        tracing::debug!(polled, ?tick, "tick");
        tick
    }

    /// Tick until quiescent or until a task errors. `true` means clean
    /// quiescence; `false` means the error set is non-empty.
    pub fn run(&mut self) -> bool {
        loop {
            match self.once() {
                Tick::More => {}
                Tick::Quiescent => return true,
                Tick::Errors => return false,
            }
        }
    }

    /// Drain the error set, deleting each errored task and returning one
    /// `task(<id>): <message>` line per task. Empty when no task errored.
    pub fn collect(&mut self) -> String {
        self.collect_inner(None)
    }

    /// Drain the error set through a callback. Returning `Some(text)`
    /// consumes the task (it is deleted and `text` becomes its report
    /// line); returning `None` keeps the task parked in the error set and
    /// reports nothing for it.
    pub fn collect_with<F>(&mut self, mut f: F) -> String
    where
        F: FnMut(&mut Scheduler, TaskId) -> Option<String>,
    {
        self.collect_inner(Some(&mut f))
    }

    fn collect_inner(
        &mut self,
        mut f: Option<&mut dyn FnMut(&mut Scheduler, TaskId) -> Option<String>>,
    ) -> String {
        let mut out = String::new();
        if !self.pool.is_linked(self.error_root) {
            return out;
        }
        let error = self.error_root;
        let scratch = self.pool.alloc(NodeOwner::Root);
        self.pool.replace(scratch, error);
        self.pool.init(error);

        while let Some(node) = self.pool.first(scratch) {
            let Some(t) = self.node_task(node) else {
                self.pool.remove_self(node);
                self.pool.init(node);
                continue;
            };
            let text = match f.as_mut() {
                Some(f) => match f(self, t) {
                    Some(text) => Some(text),
                    None => {
                        // kept by the callback: back into the error set,
                        // unless the callback already moved or deleted it
                        if self.resolve(t).is_some() {
                            self.link_task(t.idx, error);
                        } else {
                            self.pool.remove_self(node);
                            self.pool.init(node);
                        }
                        continue;
                    }
                },
                None => self.tasks[t.idx].ctx.first().map(ToString::to_string),
            };
            let message = text.unwrap_or_default();
            let _ = writeln!(out, "task({t}): {message}");
            let _ = self.delete_task(t);
            // the callback may have re-parked the task instead of leaving
            // it for deletion; make sure the scratch queue shrinks
            if self.pool.first(scratch) == Some(node) {
                self.pool.remove_self(node);
                self.pool.init(node);
            }
        }
        debug_assert!(!self.pool.is_linked(scratch));
        self.pool.free(scratch);
        tracing::debug!(report = %out.trim_end(), "collected errored tasks");
        out
    }

    /// Iterate over the tasks currently parked in the error set.
    #[must_use]
    pub fn errors(&self) -> Errors<'_> {
        Errors {
            sched: self,
            curr: None,
        }
    }
}

/// Iterator over the error set, oldest first. See
/// [`Scheduler::errors`].
#[derive(Debug)]
pub struct Errors<'a> {
    sched: &'a Scheduler,
    curr: Option<NodeRef>,
}

impl Iterator for Errors<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.sched.pool.walk(self.sched.error_root, self.curr)?;
        self.curr = Some(node);
        self.sched.node_task(node)
    }
}
