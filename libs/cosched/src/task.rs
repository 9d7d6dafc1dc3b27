// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Tasks: the schedulable units.
//!
//! A task owns a resumable *body* and a context (a vector of [`Value`]s that
//! carries wake-up arguments in and results out), plus two queue nodes: its
//! membership link `head` and its private `joined` queue, where other tasks
//! park while waiting for it to complete.
//!
//! # Status
//!
//! A task's [`Status`] is never stored; it is derived from which queue the
//! task is linked under and whether its joined queue is still valid. The
//! main invariant of the whole scheduler is that this derivation, the
//! membership links, and the body state always agree between public calls.
//!
//! # Bodies and yielding
//!
//! A body is a closure called once per resume with the task's context as
//! arguments; the [`Step`] it returns is the resume outcome. Parking
//! operations invoked on the *currently running* task
//! ([`Scheduler::wait`], [`Scheduler::join`], [`Scheduler::error`]) cannot
//! unwind the body's frame the way a stackful coroutine would, so they
//! return the `Step` the body must immediately return:
//!
//! ```
//! use cosched::{Scheduler, Step, Value};
//!
//! let mut sched = Scheduler::new();
//! let sig = sched.new_signal();
//! let task = sched.spawn(
//!     Box::new(move |sched, me, args| {
//!         if args.is_empty() {
//!             // park on the signal and give up control
//!             return sched.wait(me, Some(sig), None);
//!         }
//!         Ok(Step::Return(args))
//!     }),
//!     Vec::new(),
//! );
//! sched.once();
//! sched.emit(sig, Some(&[Value::from(42)]))?;
//! assert_eq!(sched.context(task), vec![Value::from(42)]);
//! # Ok::<(), cosched::SchedError>(())
//! ```

use crate::error::SchedError;
use crate::queue::{NodeOwner, NodeRef};
use crate::scheduler::Scheduler;
use crate::value::Value;
use core::fmt;
use core::mem;

/// Identifies a task relative to one [`Scheduler`].
///
/// Ids are generational: once the task is deleted, its id keeps reporting
/// [`Status::Dead`] even if the underlying slot is reused for a new task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    pub(crate) idx: usize,
    pub(crate) generation: u32,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.idx, self.generation)
    }
}

/// A task's lifecycle state, derived from its queue membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The body returned. Results stay readable through
    /// [`Scheduler::context`] until the task is deleted.
    Finished,
    /// The body raised; the task is parked in the error set with the message
    /// as its sole context value.
    Error,
    /// Deleted; only an id is left.
    Dead,
    /// Currently holding the thread (or the main task, which is always
    /// running).
    Running,
    /// Parked on a signal or on another task's joined queue.
    Waiting,
    /// Parked nowhere; will not run until re-targeted.
    Hold,
    /// Scheduled to run on the next tick.
    Ready,
}

// === impl Status ===

impl Status {
    /// The wire spelling of this status.
    ///
    /// The misspelling `"waitting"` and the short `"finish"` are load-bearing
    /// for existing consumers and are kept verbatim.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finish",
            Self::Error => "error",
            Self::Dead => "dead",
            Self::Running => "running",
            Self::Waiting => "waitting",
            Self::Hold => "hold",
            Self::Ready => "ready",
        }
    }

    /// Parse a status string. Accepts the canonical spellings from
    /// [`as_str`](Self::as_str) plus `"waiting"` and `"finished"`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "finish" | "finished" => Self::Finished,
            "error" => Self::Error,
            "dead" => Self::Dead,
            "running" => Self::Running,
            "waitting" | "waiting" => Self::Waiting,
            "hold" => Self::Hold,
            "ready" => Self::Ready,
            _ => return None,
        })
    }

    /// Whether the task is parked and schedulable: waiting, held or ready.
    #[must_use]
    pub fn can_wake(self) -> bool {
        matches!(self, Self::Waiting | Self::Hold | Self::Ready)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one resume of a task body.
///
/// Bodies must treat parking calls on themselves as tail calls: return the
/// `Step` such a call hands back without touching the scheduler afterwards.
#[derive(Debug, PartialEq)]
#[must_use = "a Step decides what happens to the task; return it from the body"]
pub enum Step {
    /// The body parked itself (wait, hold, join) and gives up control.
    Yield,
    /// The body completed with these results.
    Return(Vec<Value>),
    /// The body raised an error.
    Error(String),
}

/// A task body: called once per resume with the task's context as arguments.
///
/// Returning `Err` is equivalent to returning [`Step::Error`] with the
/// error's message, so bodies can use `?` on scheduler calls.
pub type TaskFn = Box<dyn FnMut(&mut Scheduler, TaskId, Vec<Value>) -> Result<Step, SchedError>>;

/// The body state of a task slot.
pub(crate) enum Body {
    /// Never resumed; the context holds the spawn arguments.
    Fresh(TaskFn),
    /// Yielded at least once.
    Suspended(TaskFn),
    /// Taken out of the slot for the duration of a resume.
    Active,
    /// Returned or errored; nothing left to run.
    Done,
    /// The host's own context, wrapped as the main task. Never resumable.
    Main,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fresh(_) => "Fresh",
            Self::Suspended(_) => "Suspended",
            Self::Active => "Active",
            Self::Done => "Done",
            Self::Main => "Main",
        })
    }
}

#[derive(Debug)]
pub(crate) struct TaskSlot {
    pub(crate) generation: u32,
    /// Membership link; linked under `waitat` or self-linked (hold).
    pub(crate) head: NodeRef,
    /// Root of the queue of tasks joined on this one. Invalidated when the
    /// task completes and the joiners have been woken.
    pub(crate) joined: NodeRef,
    /// The queue root `head` is currently linked under, if any.
    pub(crate) waitat: Option<NodeRef>,
    pub(crate) ctx: Vec<Value>,
    pub(crate) body: Body,
}

/// How a task came to its end, for waking its joiners.
pub(crate) enum Completion<'a> {
    Returned,
    Errored(&'a str),
    Deleted,
}

// === impl Scheduler: task operations ===

impl Scheduler {
    /// Create a task in [`Status::Hold`]. It will not run until it is made
    /// ready or woken explicitly.
    pub fn new_task(&mut self, body: TaskFn) -> TaskId {
        let idx = self.tasks.vacant_key();
        let head = self.pool.alloc(NodeOwner::Task(idx));
        let joined = self.pool.alloc(NodeOwner::Root);
        let generation = self.next_generation();
        self.tasks.insert(TaskSlot {
            generation,
            head,
            joined,
            waitat: None,
            ctx: Vec::new(),
            body: Body::Fresh(body),
        });
        let t = TaskId { idx, generation };
        tracing::trace!(task = %t, "new task");
        t
    }

    /// Create a task with `args` as its spawn arguments and schedule it for
    /// the next tick.
    pub fn spawn(&mut self, body: TaskFn, args: Vec<Value>) -> TaskId {
        let t = self.new_task(body);
        self.tasks[t.idx].ctx = args;
        let ready = self.ready_root;
        self.link_task(t.idx, ready);
        t
    }

    /// The task wrapping the host's own context. Always a member of the
    /// running set.
    #[must_use]
    pub fn main_task(&self) -> TaskId {
        self.main
    }

    /// The innermost task currently being resumed, or the main task when the
    /// scheduler itself has control.
    #[must_use]
    pub fn current(&self) -> TaskId {
        self.stack.last().copied().unwrap_or(self.main)
    }

    pub(crate) fn resolve(&self, t: TaskId) -> Option<usize> {
        self.tasks
            .get(t.idx)
            .filter(|slot| slot.generation == t.generation)
            .map(|_| t.idx)
    }

    pub(crate) fn check_task(&self, t: TaskId) -> Result<usize, SchedError> {
        self.resolve(t).ok_or(SchedError::DeadTask)
    }

    /// Whether the task still has a body that can run. False once the body
    /// returned or errored during a resume; an error set from outside leaves
    /// the body intact, and such a task can be parked or woken again.
    fn revivable(&self, idx: usize) -> bool {
        matches!(self.tasks[idx].body, Body::Fresh(_) | Body::Suspended(_))
    }

    /// Common guard for the parking operations: running tasks may only park
    /// themselves, completed tasks may not be parked at all.
    fn check_parkable(&self, t: TaskId, idx: usize) -> Result<(), SchedError> {
        match self.status(t) {
            Status::Running => {
                if t == self.main {
                    Err(SchedError::MainTask)
                } else if Some(t) != self.stack.last().copied() {
                    Err(SchedError::Running)
                } else {
                    Ok(())
                }
            }
            Status::Finished => Err(SchedError::Finished),
            Status::Error if !self.revivable(idx) => Err(SchedError::Finished),
            _ => Ok(()),
        }
    }

    /// The task's current status. See [`Status`] for the meaning of each
    /// state; a stale id reports [`Status::Dead`].
    #[must_use]
    pub fn status(&self, t: TaskId) -> Status {
        let Some(idx) = self.resolve(t) else {
            return Status::Dead;
        };
        let slot = &self.tasks[idx];
        if slot.waitat == Some(self.running_root) {
            Status::Running
        } else if slot.waitat == Some(self.ready_root) {
            Status::Ready
        } else if slot.waitat == Some(self.error_root) {
            Status::Error
        } else if !self.pool.is_valid(slot.joined) {
            Status::Finished
        } else if slot.waitat.is_none() {
            Status::Hold
        } else {
            Status::Waiting
        }
    }

    /// Replace the task's context. No-op (returning `false`) unless the task
    /// can be woken; a running task's context belongs to its body, and a
    /// completed task's context holds its results.
    pub fn set_context(&mut self, t: TaskId, values: Vec<Value>) -> Result<bool, SchedError> {
        let idx = self.check_task(t)?;
        if !self.status(t).can_wake() {
            return Ok(false);
        }
        self.tasks[idx].ctx = values;
        Ok(true)
    }

    /// Replace the context of any non-running task, including a completed
    /// one. Used by the embedder-facing context accessor.
    pub(crate) fn set_context_any(
        &mut self,
        t: TaskId,
        values: Vec<Value>,
    ) -> Result<bool, SchedError> {
        let idx = self.check_task(t)?;
        if self.status(t) == Status::Running {
            return Ok(false);
        }
        self.tasks[idx].ctx = values;
        Ok(true)
    }

    /// A copy of the task's context: its pending wake-up arguments, its
    /// results when finished, or its error message when errored. Empty for
    /// running and dead tasks.
    #[must_use]
    pub fn context(&self, t: TaskId) -> Vec<Value> {
        let Some(idx) = self.resolve(t) else {
            return Vec::new();
        };
        match self.status(t) {
            Status::Dead | Status::Running => Vec::new(),
            _ => self.tasks[idx].ctx.clone(),
        }
    }

    /// Park `t` on `signal`, or hold it when `signal` is `None`.
    ///
    /// Called on the currently running task this is the yield point: the
    /// body must return the resulting [`Step`]. Called on a parked task it
    /// just rewrites the membership, which is also how a waiting task is
    /// moved from one signal to another. `ctx`, when given, replaces the
    /// task's context.
    pub fn wait(
        &mut self,
        t: TaskId,
        signal: Option<crate::signal::SignalId>,
        ctx: Option<Vec<Value>>,
    ) -> Result<Step, SchedError> {
        let idx = self.check_task(t)?;
        self.check_parkable(t, idx)?;
        match signal {
            Some(s) => {
                let root = self.check_signal(s)?;
                self.link_task(idx, root);
            }
            None => self.unlink_task(idx),
        }
        if let Some(values) = ctx {
            self.tasks[idx].ctx = values;
        }
        Ok(Step::Yield)
    }

    /// Schedule `t` for the next tick. No-op (returning `false`) when `t` is
    /// running; a running task parks itself with [`wait`](Self::wait).
    pub fn ready(&mut self, t: TaskId, ctx: Option<Vec<Value>>) -> Result<bool, SchedError> {
        let idx = self.check_task(t)?;
        match self.status(t) {
            Status::Running => return Ok(false),
            Status::Finished => return Err(SchedError::Finished),
            Status::Error if !self.revivable(idx) => return Err(SchedError::Finished),
            _ => {}
        }
        if let Some(values) = ctx {
            self.tasks[idx].ctx = values;
        }
        let ready = self.ready_root;
        self.link_task(idx, ready);
        Ok(true)
    }

    /// Unlink `t` so it will not run until re-targeted. No-op (returning
    /// `false`) when `t` is running.
    pub fn hold(&mut self, t: TaskId, ctx: Option<Vec<Value>>) -> Result<bool, SchedError> {
        let idx = self.check_task(t)?;
        match self.status(t) {
            Status::Running => return Ok(false),
            Status::Finished => return Err(SchedError::Finished),
            Status::Error if !self.revivable(idx) => return Err(SchedError::Finished),
            _ => {}
        }
        if let Some(values) = ctx {
            self.tasks[idx].ctx = values;
        }
        self.unlink_task(idx);
        Ok(true)
    }

    /// Park `t` until `jointo` finishes or errors. The joiner is woken with
    /// `(true, results…)` on a normal return, `(nil, message)` on an error
    /// and `(nil, "task deleted", context…)` if `jointo` is force-deleted.
    ///
    /// `jointo` must be alive and not yet completed. Called on the currently
    /// running task this is a yield point like [`wait`](Self::wait).
    pub fn join(&mut self, t: TaskId, jointo: TaskId) -> Result<Step, SchedError> {
        let idx = self.check_task(t)?;
        let jidx = self.check_task(jointo)?;
        if !self.status(jointo).can_wake() {
            return Err(SchedError::NotJoinable);
        }
        self.check_parkable(t, idx)?;
        let joined = self.tasks[jidx].joined;
        debug_assert!(self.pool.is_valid(joined));
        let head = self.tasks[idx].head;
        self.pool.append(head, joined);
        self.tasks[idx].waitat = Some(joined);
        Ok(Step::Yield)
    }

    /// Mark `t` as errored with `message` as its sole context value.
    ///
    /// On the currently running task this is the raise point: the body must
    /// return the resulting [`Step`]. On a parked task it rewrites the
    /// membership into the error set without transferring control. An
    /// already errored task gets its message replaced.
    pub fn error(&mut self, t: TaskId, message: impl Into<String>) -> Result<Step, SchedError> {
        let idx = self.check_task(t)?;
        let message = message.into();
        match self.status(t) {
            Status::Finished => return Err(SchedError::Finished),
            Status::Running => {
                if Some(t) == self.stack.last().copied() {
                    return Ok(Step::Error(message));
                }
                return Err(if t == self.main {
                    SchedError::MainTask
                } else {
                    SchedError::Running
                });
            }
            _ => {}
        }
        self.tasks[idx].ctx = vec![Value::from(message)];
        let error = self.error_root;
        self.link_task(idx, error);
        Ok(Step::Yield)
    }

    /// Resume a parked task now, bypassing the tick.
    ///
    /// Acts on waiting, held and ready tasks, and on a task parked in the
    /// error set from outside whose body never died. With `args` the task's
    /// context is replaced first; without, the task resumes with its own
    /// context. Returns `Ok(false)` when there was nothing to do (the task
    /// is running or completed) or when the body errored during this
    /// resume, `Ok(true)` otherwise.
    pub fn wakeup(&mut self, t: TaskId, args: Option<Vec<Value>>) -> Result<bool, SchedError> {
        let idx = self.check_task(t)?;
        let status = self.status(t);
        if !status.can_wake() && status != Status::Error {
            return Ok(false);
        }
        if !self.revivable(idx) {
            return Ok(false);
        }
        if let Some(values) = args {
            self.tasks[idx].ctx = values;
        }

        let running = self.running_root;
        self.link_task(idx, running);

        let mut body = match mem::replace(&mut self.tasks[idx].body, Body::Active) {
            Body::Fresh(f) | Body::Suspended(f) => f,
            other => {
                // status and body state disagree; leave the slot untouched
                self.tasks[idx].body = other;
                self.unlink_task(idx);
                tracing::warn!(task = %t, "task has no resumable body");
                return Ok(false);
            }
        };

        let span = tracing::trace_span!("resume", task = %t);
        let _enter = span.enter();

        self.stack.push(t);
        let call_args = mem::take(&mut self.tasks[idx].ctx);
        let step = match body(self, t, call_args) {
            Ok(step) => step,
            Err(e) => Step::Error(e.to_string()),
        };
        self.stack.pop();

        match step {
            Step::Yield => {
                self.tasks[idx].body = Body::Suspended(body);
                if self.tasks[idx].waitat == Some(running) {
                    tracing::warn!(task = %t, "task yielded without parking itself; holding it");
                    self.unlink_task(idx);
                }
                Ok(true)
            }
            Step::Return(values) => {
                tracing::trace!(task = %t, "task finished");
                self.tasks[idx].body = Body::Done;
                self.tasks[idx].ctx = values;
                self.finish(idx, &Completion::Returned);
                Ok(true)
            }
            Step::Error(message) => {
                tracing::trace!(task = %t, error = %message, "task errored");
                self.tasks[idx].body = Body::Done;
                self.finish(idx, &Completion::Errored(&message));
                // a joiner may have deleted the task while being woken
                if self.resolve(t).is_some() {
                    self.tasks[idx].ctx = vec![Value::from(message)];
                    let error = self.error_root;
                    self.link_task(idx, error);
                }
                Ok(false)
            }
        }
    }

    /// Delete `t`, releasing its resources. Joiners of a task that never
    /// completed are woken with `(nil, "task deleted", context…)`. No-op
    /// (returning `false`) for dead and running tasks.
    pub fn delete_task(&mut self, t: TaskId) -> Result<bool, SchedError> {
        let Some(idx) = self.resolve(t) else {
            return Ok(false);
        };
        if self.status(t) == Status::Running {
            return Ok(false);
        }
        tracing::trace!(task = %t, "delete task");
        self.finish(idx, &Completion::Deleted);
        // a joiner woken just now may itself have deleted the task
        let Some(idx) = self.resolve(t) else {
            return Ok(true);
        };
        let slot = self.tasks.remove(idx);
        self.pool.free(slot.head);
        self.pool.free(slot.joined);
        Ok(true)
    }

    /// Detach the task from its queue and wake its joiners, invalidating the
    /// joined queue. Does nothing to joiners of a task whose joined queue
    /// was already drained by an earlier completion.
    pub(crate) fn finish(&mut self, idx: usize, completion: &Completion<'_>) {
        self.unlink_task(idx);
        let joined = self.tasks[idx].joined;
        if !self.pool.is_valid(joined) {
            return;
        }
        let scratch = self.pool.alloc(NodeOwner::Root);
        self.pool.replace(scratch, joined);
        let args = match completion {
            Completion::Returned => {
                let mut args = vec![Value::Bool(true)];
                args.extend(self.tasks[idx].ctx.iter().cloned());
                args
            }
            Completion::Errored(message) => vec![Value::Nil, Value::from(*message)],
            Completion::Deleted => {
                let mut args = vec![Value::Nil, Value::from("task deleted")];
                args.extend(self.tasks[idx].ctx.iter().cloned());
                args
            }
        };
        self.emit_root(scratch, Some(&args));
        debug_assert!(!self.pool.is_linked(scratch));
        self.pool.free(scratch);
    }

    /// Link the task's head under `root` and record the membership.
    pub(crate) fn link_task(&mut self, idx: usize, root: NodeRef) {
        let head = self.tasks[idx].head;
        self.pool.append(head, root);
        self.tasks[idx].waitat = Some(root);
    }

    /// Unlink the task's head and leave it self-linked (hold).
    pub(crate) fn unlink_task(&mut self, idx: usize) {
        let head = self.tasks[idx].head;
        self.pool.remove_self(head);
        self.pool.init(head);
        self.tasks[idx].waitat = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{returning, trace_init};

    #[test]
    fn fresh_task_is_held() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(returning(vec![]));
        assert_eq!(sched.status(t), Status::Hold);
        assert_eq!(sched.context(t), vec![]);
    }

    #[test]
    fn spawn_is_ready_with_args() {
        let mut sched = Scheduler::new();
        let t = sched.spawn(returning(vec![]), vec![Value::from(7)]);
        assert_eq!(sched.status(t), Status::Ready);
        assert_eq!(sched.context(t), vec![Value::from(7)]);
    }

    #[test]
    fn hold_and_ready_are_idempotent() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(returning(vec![]));
        assert!(sched.hold(t, None).expect("hold"));
        assert!(sched.hold(t, None).expect("hold"));
        assert_eq!(sched.status(t), Status::Hold);

        assert!(sched.ready(t, None).expect("ready"));
        assert!(sched.ready(t, None).expect("ready"));
        assert_eq!(sched.status(t), Status::Ready);
        // a second ready must not duplicate the membership
        let drained = sched.once();
        assert_eq!(sched.status(t), Status::Finished);
        assert_eq!(drained, crate::Tick::Quiescent);
    }

    #[test]
    fn wait_retargets_membership() {
        let mut sched = Scheduler::new();
        let s1 = sched.new_signal();
        let s2 = sched.new_signal();
        let t = sched.new_task(returning(vec![]));
        let _ = sched.wait(t, Some(s1), None).expect("wait");
        assert_eq!(sched.status(t), Status::Waiting);
        assert_eq!(sched.waiter_count(s1).expect("count"), 1);

        let _ = sched.wait(t, Some(s2), None).expect("wait");
        assert_eq!(sched.waiter_count(s1).expect("count"), 0);
        assert_eq!(sched.waiter_count(s2).expect("count"), 1);

        let _ = sched.wait(t, None, None).expect("wait");
        assert_eq!(sched.status(t), Status::Hold);
        assert_eq!(sched.waiter_count(s2).expect("count"), 0);
    }

    #[test]
    fn error_parks_with_message() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(returning(vec![]));
        let _ = sched.error(t, "boom").expect("error");
        assert_eq!(sched.status(t), Status::Error);
        assert_eq!(sched.context(t), vec![Value::from("boom")]);
        // the message can be replaced while parked
        let _ = sched.error(t, "worse").expect("error");
        assert_eq!(sched.context(t), vec![Value::from("worse")]);
        assert_eq!(sched.errors().count(), 1);
    }

    #[test]
    fn wakeup_runs_body_with_context() {
        trace_init();
        let mut sched = Scheduler::new();
        let t = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        sched
            .set_context(t, vec![Value::from("hello")])
            .expect("set_context");
        assert!(sched.wakeup(t, None).expect("wakeup"));
        assert_eq!(sched.status(t), Status::Finished);
        assert_eq!(sched.context(t), vec![Value::from("hello")]);
    }

    #[test]
    fn wakeup_args_replace_context() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        sched
            .set_context(t, vec![Value::from("stale")])
            .expect("set_context");
        sched
            .wakeup(t, Some(vec![Value::from("fresh")]))
            .expect("wakeup");
        assert_eq!(sched.context(t), vec![Value::from("fresh")]);
    }

    #[test]
    fn wakeup_error_outcome() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(Box::new(|_, _, _| Ok(Step::Error("bad".into()))));
        assert!(!sched.wakeup(t, None).expect("wakeup"));
        assert_eq!(sched.status(t), Status::Error);
        assert_eq!(sched.context(t), vec![Value::from("bad")]);
    }

    #[test]
    fn body_scheduler_error_becomes_task_error() {
        let mut sched = Scheduler::new();
        let sig = sched.new_signal();
        sched.delete_signal(sig).expect("delete");
        let t = sched.new_task(Box::new(move |sched, me, _| {
            // waiting on the deleted signal raises inside the body
            sched.wait(me, Some(sig), None)
        }));
        assert!(!sched.wakeup(t, None).expect("wakeup"));
        assert_eq!(sched.status(t), Status::Error);
        assert_eq!(sched.context(t), vec![Value::from("got deleted signal")]);
    }

    #[test]
    fn completed_task_is_not_wakeable() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(returning(vec![Value::from(1)]));
        assert!(sched.wakeup(t, None).expect("wakeup"));
        assert_eq!(sched.status(t), Status::Finished);
        // second wakeup is a no-op, results stay put
        assert!(!sched.wakeup(t, None).expect("wakeup"));
        assert_eq!(sched.context(t), vec![Value::from(1)]);
        // and the task cannot be re-parked
        assert_eq!(sched.ready(t, None), Err(SchedError::Finished));
        assert_eq!(sched.hold(t, None), Err(SchedError::Finished));
    }

    #[test]
    fn delete_task_wakes_joiners_with_deletion() {
        let mut sched = Scheduler::new();
        let target = sched.new_task(returning(vec![]));
        sched
            .set_context(target, vec![Value::from("ctx")])
            .expect("set_context");
        let j = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        let _ = sched.join(j, target).expect("join");
        assert_eq!(sched.status(j), Status::Waiting);

        assert!(sched.delete_task(target).expect("delete"));
        assert_eq!(sched.status(target), Status::Dead);
        assert_eq!(sched.status(j), Status::Finished);
        assert_eq!(
            sched.context(j),
            vec![
                Value::Nil,
                Value::from("task deleted"),
                Value::from("ctx"),
            ]
        );
    }

    #[test]
    fn dead_id_stays_dead_after_slot_reuse() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(returning(vec![]));
        sched.delete_task(t).expect("delete");
        let t2 = sched.new_task(returning(vec![]));
        assert_eq!(sched.status(t), Status::Dead);
        assert_ne!(t, t2);
        assert_eq!(sched.set_context(t, vec![]), Err(SchedError::DeadTask));
    }

    #[test]
    fn join_refuses_settled_targets() {
        let mut sched = Scheduler::new();
        let finished = sched.new_task(returning(vec![]));
        sched.wakeup(finished, None).expect("wakeup");
        let t = sched.new_task(returning(vec![]));
        assert_eq!(sched.join(t, finished), Err(SchedError::NotJoinable));
        let main = sched.main_task();
        assert_eq!(sched.join(t, main), Err(SchedError::NotJoinable));
    }

    #[test]
    fn externally_errored_task_can_be_revived() {
        let mut sched = Scheduler::new();
        let t = sched.new_task(Box::new(|_, _, args| Ok(Step::Return(args))));
        let _ = sched.error(t, "flagged").expect("error");
        assert_eq!(sched.status(t), Status::Error);
        // the body never died, so the task can be pulled back out
        assert!(sched.ready(t, None).expect("ready"));
        assert_eq!(sched.status(t), Status::Ready);
        assert_eq!(sched.errors().count(), 0);
        sched.once();
        assert_eq!(sched.status(t), Status::Finished);
        // but once the body is gone, the error state is final
        let t2 = sched.new_task(Box::new(|_, _, _| Ok(Step::Error("died".into()))));
        sched.wakeup(t2, None).expect("wakeup");
        assert_eq!(sched.status(t2), Status::Error);
        assert_eq!(sched.ready(t2, None), Err(SchedError::Finished));
        assert!(!sched.wakeup(t2, None).expect("wakeup"));
    }

    #[test]
    fn main_task_is_pinned_running() {
        let mut sched = Scheduler::new();
        let main = sched.main_task();
        assert_eq!(sched.status(main), Status::Running);
        assert_eq!(sched.current(), main);
        assert_eq!(sched.wait(main, None, None), Err(SchedError::MainTask));
        assert!(!sched.ready(main, None).expect("ready"));
        assert!(!sched.delete_task(main).expect("delete"));
        assert_eq!(sched.status(main), Status::Running);
    }
}
