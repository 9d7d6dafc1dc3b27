// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Signals: the wait-queues tasks block on.
//!
//! A signal is nothing but a queue root; its members are the heads of the
//! tasks waiting on it, in the order they arrived. Emitting wakes members in
//! FIFO order with a **single-fire** guarantee: a task that re-waits on the
//! signal it was just woken from is set aside in a scratch queue and spliced
//! back only after the pass, so one emit can never wake the same task twice
//! however the woken bodies re-arrange themselves.
//!
//! Deleting a signal first wakes every member with `(nil, "signal deleted")`
//! and then invalidates the root; waiting on it afterwards fails.

use crate::error::SchedError;
use crate::queue::{NodeOwner, NodeRef};
use crate::scheduler::Scheduler;
use crate::task::TaskId;
use crate::value::Value;
use core::fmt;

/// Identifies a signal relative to one [`Scheduler`].
///
/// Generational like [`TaskId`]: ids of deleted signals keep reporting
/// deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId {
    pub(crate) idx: usize,
    pub(crate) generation: u32,
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.idx, self.generation)
    }
}

#[derive(Debug)]
pub(crate) struct SignalSlot {
    pub(crate) generation: u32,
    pub(crate) root: NodeRef,
}

// === impl Scheduler: signal operations ===

impl Scheduler {
    /// Create a fresh, empty signal.
    pub fn new_signal(&mut self) -> SignalId {
        let generation = self.next_generation();
        let root = self.pool.alloc(NodeOwner::Root);
        let idx = self.signals.insert(SignalSlot { generation, root });
        let s = SignalId { idx, generation };
        tracing::trace!(signal = %s, "new signal");
        s
    }

    /// Whether `s` can still be waited on.
    #[must_use]
    pub fn signal_valid(&self, s: SignalId) -> bool {
        self.signal_root(s)
            .is_some_and(|root| self.pool.is_valid(root))
    }

    fn signal_root(&self, s: SignalId) -> Option<NodeRef> {
        self.signals
            .get(s.idx)
            .filter(|slot| slot.generation == s.generation)
            .map(|slot| slot.root)
    }

    /// Resolve `s`, failing with the deleted-signal misuse error when it is
    /// stale or has been deleted.
    pub(crate) fn check_signal(&self, s: SignalId) -> Result<NodeRef, SchedError> {
        self.signal_root(s)
            .filter(|&root| self.pool.is_valid(root))
            .ok_or(SchedError::DeletedSignal)
    }

    /// Delete `s`: wake every waiting task with `(nil, "signal deleted")`,
    /// then invalidate the signal. Idempotent.
    pub fn delete_signal(&mut self, s: SignalId) -> Result<(), SchedError> {
        let Some(root) = self.signal_root(s) else {
            return Ok(());
        };
        if !self.pool.is_valid(root) {
            return Ok(());
        }
        tracing::trace!(signal = %s, "delete signal");
        let scratch = self.pool.alloc(NodeOwner::Root);
        self.pool.replace(scratch, root);
        let args = [Value::Nil, Value::from("signal deleted")];
        self.emit_root(scratch, Some(&args));
        debug_assert!(!self.pool.is_linked(scratch));
        self.pool.free(scratch);
        Ok(())
    }

    /// Wake every task currently waiting on `s`, each exactly once, in FIFO
    /// order. With `args`, every woken task's context is replaced by a copy
    /// of them first; without, each task resumes with its own context.
    /// Returns the number of woken tasks.
    pub fn emit(&mut self, s: SignalId, args: Option<&[Value]>) -> Result<usize, SchedError> {
        let root = self.check_signal(s)?;
        let woken = self.emit_root(root, args);
        tracing::trace!(signal = %s, woken, "emit");
        Ok(woken)
    }

    /// Wake only the first (longest-waiting) task on `s`. Returns whether a
    /// task was woken.
    pub fn emit_one(&mut self, s: SignalId, args: Option<&[Value]>) -> Result<bool, SchedError> {
        let root = self.check_signal(s)?;
        let Some(node) = self.pool.first(root) else {
            return Ok(false);
        };
        let Some(t) = self.node_task(node) else {
            return Ok(false);
        };
        self.wakeup(t, args.map(<[Value]>::to_vec))?;
        Ok(true)
    }

    /// Move every task waiting on `s` to the ready set instead of resuming
    /// it; the tasks run on the next tick. Returns the number of tasks
    /// moved.
    pub fn ready_all(&mut self, s: SignalId, args: Option<&[Value]>) -> Result<usize, SchedError> {
        let root = self.check_signal(s)?;
        let mut moved = 0;
        while let Some(node) = self.pool.first(root) {
            let Some(t) = self.node_task(node) else {
                break;
            };
            self.ready(t, args.map(<[Value]>::to_vec))?;
            moved += 1;
            if self.pool.first(root) == Some(node) {
                // the member did not move; unlink it so the pass advances
                tracing::warn!(signal = %s, task = %t, "stuck waiter while readying; unlinking");
                self.pool.remove_self(node);
                self.pool.init(node);
            }
        }
        Ok(moved)
    }

    /// Call `f` for every task waiting on `s`. The successor of the current
    /// member is snapshotted before the call, so `f` may wake, re-park or
    /// delete the current member; it must leave the *next* member's links
    /// alone.
    pub fn filter<F>(&mut self, s: SignalId, mut f: F) -> Result<(), SchedError>
    where
        F: FnMut(&mut Scheduler, TaskId),
    {
        let root = self.check_signal(s)?;
        let mut curr = self.pool.first(root);
        while let Some(node) = curr {
            let next = self.pool.walk(root, Some(node));
            if let Some(t) = self.node_task(node) {
                f(self, t);
            }
            curr = next;
        }
        Ok(())
    }

    /// The task after `curr` in `s`'s wait queue, or the first task when
    /// `curr` is `None`; `None` when the walk is done.
    pub fn next_waiter(
        &self,
        s: SignalId,
        curr: Option<TaskId>,
    ) -> Result<Option<TaskId>, SchedError> {
        let root = self.check_signal(s)?;
        let curr = match curr {
            Some(t) => {
                let idx = self.check_task(t)?;
                Some(self.tasks[idx].head)
            }
            None => None,
        };
        Ok(self.pool.walk(root, curr).and_then(|n| self.node_task(n)))
    }

    /// The number of tasks waiting on `s`. Linear.
    pub fn waiter_count(&self, s: SignalId) -> Result<usize, SchedError> {
        let root = self.check_signal(s)?;
        Ok(self.pool.count(root))
    }

    /// The task at position `idx` of `s`'s wait queue, 0-based; negative
    /// positions count from the tail. Linear; prefer
    /// [`next_waiter`](Self::next_waiter) for traversal.
    pub fn waiter_at(&self, s: SignalId, idx: isize) -> Result<Option<TaskId>, SchedError> {
        let root = self.check_signal(s)?;
        Ok(self.pool.index(root, idx).and_then(|n| self.node_task(n)))
    }

    /// Wake all members of the queue rooted at `root`, each exactly once.
    ///
    /// This is the single-fire pass shared by signal emission, tick
    /// draining, joined-queue draining and signal deletion: members that
    /// re-wait on the same queue while being resumed are collected in a
    /// scratch queue and spliced back after the pass.
    pub(crate) fn emit_root(&mut self, root: NodeRef, args: Option<&[Value]>) -> usize {
        let wait_again = self.pool.alloc(NodeOwner::Root);
        let mut woken = 0;
        while let Some(node) = self.pool.first(root) {
            let Some(t) = self.node_task(node) else {
                tracing::warn!(?node, "non-task node in wait queue; unlinking");
                self.pool.remove_self(node);
                self.pool.init(node);
                continue;
            };
            let _ = self.wakeup(t, args.map(<[Value]>::to_vec));
            woken += 1;
            let rewaited = self
                .resolve(t)
                .is_some_and(|idx| self.tasks[idx].waitat == Some(root));
            if rewaited {
                let head = self.tasks[t.idx].head;
                self.pool.append(head, wait_again);
            } else if self.pool.first(root) == Some(node) {
                // the wake-up left the member in place; unlink it so the
                // pass advances
                tracing::warn!(task = %t, "stuck waiter in emit; unlinking");
                self.pool.remove_self(node);
                self.pool.init(node);
            }
        }
        self.pool.replace(root, wait_again);
        self.pool.free(wait_again);
        woken
    }

    /// Map a queue node to the id of the task owning it.
    pub(crate) fn node_task(&self, node: NodeRef) -> Option<TaskId> {
        let idx = self.pool.owner_task(node)?;
        let slot = self.tasks.get(idx)?;
        Some(TaskId {
            idx,
            generation: slot.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Status, Step};
    use crate::test_util::{returning, trace_init};

    #[test]
    fn emit_wakes_in_fifo_order() {
        trace_init();
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut mk = |name: &'static str| {
            let log = log.clone();
            let t = sched.new_task(Box::new(move |_, _, _| {
                log.borrow_mut().push(name);
                Ok(Step::Return(vec![]))
            }));
            let _ = sched.wait(t, Some(sig), None).expect("wait");
            t
        };
        mk("a");
        mk("b");
        mk("c");
        assert_eq!(sched.emit(sig, None).expect("emit"), 3);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(sched.waiter_count(sig).expect("count"), 0);
    }

    #[test]
    fn emit_broadcasts_arguments() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t1 = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        let t2 = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        let _ = sched.wait(t1, Some(sig), None).expect("wait");
        let _ = sched.wait(t2, Some(sig), None).expect("wait");
        let args = [Value::from("x"), Value::from(1)];
        sched.emit(sig, Some(&args)).expect("emit");
        assert_eq!(sched.context(t1), args.to_vec());
        assert_eq!(sched.context(t2), args.to_vec());
    }

    #[test]
    fn emit_is_single_fire() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let fired = std::rc::Rc::new(std::cell::Cell::new(0));
        let fired2 = fired.clone();
        let t = sched.new_task(Box::new(move |sched, me, _| {
            fired2.set(fired2.get() + 1);
            sched.wait(me, Some(sig), None)
        }));
        let _ = sched.wait(t, Some(sig), None).expect("wait");

        assert_eq!(sched.emit(sig, None).expect("emit"), 1);
        assert_eq!(fired.get(), 1);
        // the re-wait survived the pass
        assert_eq!(sched.status(t), Status::Waiting);
        assert_eq!(sched.waiter_count(sig).expect("count"), 1);

        assert_eq!(sched.emit(sig, None).expect("emit"), 1);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn emit_one_wakes_the_oldest() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t1 = sched.new_task(returning(vec![Value::from(1)]));
        let t2 = sched.new_task(returning(vec![Value::from(2)]));
        let _ = sched.wait(t1, Some(sig), None).expect("wait");
        let _ = sched.wait(t2, Some(sig), None).expect("wait");
        assert!(sched.emit_one(sig, None).expect("one"));
        assert_eq!(sched.status(t1), Status::Finished);
        assert_eq!(sched.status(t2), Status::Waiting);
        assert_eq!(sched.waiter_count(sig).expect("count"), 1);
    }

    #[test]
    fn ready_all_defers_to_next_tick() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t1 = sched.new_task(returning(vec![]));
        let t2 = sched.new_task(returning(vec![]));
        let _ = sched.wait(t1, Some(sig), None).expect("wait");
        let _ = sched.wait(t2, Some(sig), None).expect("wait");
        assert_eq!(sched.ready_all(sig, None).expect("ready_all"), 2);
        assert_eq!(sched.status(t1), Status::Ready);
        assert_eq!(sched.status(t2), Status::Ready);
        sched.once();
        assert_eq!(sched.status(t1), Status::Finished);
        assert_eq!(sched.status(t2), Status::Finished);
    }

    #[test]
    fn filter_visits_all_waiters() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t1 = sched.new_task(returning(vec![]));
        let t2 = sched.new_task(returning(vec![]));
        let _ = sched.wait(t1, Some(sig), None).expect("wait");
        let _ = sched.wait(t2, Some(sig), None).expect("wait");
        let mut seen = Vec::new();
        sched
            .filter(sig, |_, t| seen.push(t))
            .expect("filter");
        assert_eq!(seen, vec![t1, t2]);
    }

    #[test]
    fn filter_callback_may_wake_the_current_member() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t1 = sched.new_task(returning(vec![]));
        let t2 = sched.new_task(returning(vec![]));
        let _ = sched.wait(t1, Some(sig), None).expect("wait");
        let _ = sched.wait(t2, Some(sig), None).expect("wait");
        let mut seen = 0;
        sched
            .filter(sig, |sched, t| {
                seen += 1;
                let _ = sched.wakeup(t, None);
            })
            .expect("filter");
        assert_eq!(seen, 2);
        assert_eq!(sched.status(t1), Status::Finished);
        assert_eq!(sched.status(t2), Status::Finished);
    }

    #[test]
    fn delete_signal_wakes_with_deletion_payload() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        let _ = sched.wait(t, Some(sig), None).expect("wait");

        sched.delete_signal(sig).expect("delete");
        assert!(!sched.signal_valid(sig));
        assert_eq!(sched.status(t), Status::Finished);
        assert_eq!(
            sched.context(t),
            vec![Value::Nil, Value::from("signal deleted")]
        );
        // the signal is unusable from here on
        assert_eq!(sched.emit(sig, None), Err(SchedError::DeletedSignal));
        assert_eq!(sched.waiter_count(sig), Err(SchedError::DeletedSignal));
        // deleting again is fine
        sched.delete_signal(sig).expect("delete");
    }

    #[test]
    fn waiter_walks_and_indexing() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        let t1 = sched.new_task(returning(vec![]));
        let t2 = sched.new_task(returning(vec![]));
        let t3 = sched.new_task(returning(vec![]));
        for t in [t1, t2, t3] {
            let _ = sched.wait(t, Some(sig), None).expect("wait");
        }
        assert_eq!(sched.next_waiter(sig, None).expect("next"), Some(t1));
        assert_eq!(sched.next_waiter(sig, Some(t1)).expect("next"), Some(t2));
        assert_eq!(sched.next_waiter(sig, Some(t3)).expect("next"), None);
        assert_eq!(sched.waiter_at(sig, 1).expect("at"), Some(t2));
        assert_eq!(sched.waiter_at(sig, -1).expect("at"), Some(t3));
        assert_eq!(sched.waiter_at(sig, 3).expect("at"), None);
    }
}
