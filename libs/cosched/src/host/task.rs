// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Task bindings.

use super::target;
use crate::error::SchedError;
use crate::scheduler::Scheduler;
use crate::signal::SignalId;
use crate::task::{Status, Step, TaskFn, TaskId};
use crate::value::Value;

/// `task.new(fn, args…)`: create a task running `body` with `args`,
/// scheduled for the next tick.
pub fn new(sched: &mut Scheduler, body: TaskFn, args: Vec<Value>) -> TaskId {
    sched.spawn(body, args)
}

/// `task.wait(t?, signal, ctx…)`: park `t` (default: the current task) on
/// `signal`. On the current task this is a yield point; return the `Step`.
pub fn wait(
    sched: &mut Scheduler,
    t: Option<TaskId>,
    signal: SignalId,
    ctx: Vec<Value>,
) -> Result<Step, SchedError> {
    let t = target(sched, t);
    sched.wait(t, Some(signal), ctx_arg(ctx))
}

/// `task.ready(t?, ctx…)`: schedule `t` for the next tick.
pub fn ready(
    sched: &mut Scheduler,
    t: Option<TaskId>,
    ctx: Vec<Value>,
) -> Result<bool, SchedError> {
    let t = target(sched, t);
    sched.ready(t, ctx_arg(ctx))
}

/// `task.hold(t?, ctx…)`: park `t` nowhere.
pub fn hold(sched: &mut Scheduler, t: Option<TaskId>, ctx: Vec<Value>) -> Result<bool, SchedError> {
    let t = target(sched, t);
    sched.hold(t, ctx_arg(ctx))
}

/// `task.wakeup(t, args…)`: force-resume `t` and report the outcome:
/// `(true, results…)` normally, `(false, message)` when the task is (or
/// ends up) errored. A task that finished during this call is reaped after
/// its results are extracted.
pub fn wakeup(
    sched: &mut Scheduler,
    t: TaskId,
    args: Vec<Value>,
) -> Result<(bool, Vec<Value>), SchedError> {
    sched.wakeup(t, ctx_arg(args))?;
    let status = sched.status(t);
    let ok = status != Status::Error;
    let results = sched.context(t);
    if status == Status::Finished {
        sched.delete_task(t)?;
    }
    Ok((ok, results))
}

/// `task.join(t, jointo?)`: `t` (with one argument: the current task) waits
/// for `jointo` (with one argument: `t`) to finish or error. On the current
/// task this is a yield point; return the `Step`.
pub fn join(sched: &mut Scheduler, t: TaskId, jointo: Option<TaskId>) -> Result<Step, SchedError> {
    match jointo {
        Some(jointo) => sched.join(t, jointo),
        None => {
            let current = sched.current();
            sched.join(current, t)
        }
    }
}

/// `task.delete(t)`.
pub fn delete(sched: &mut Scheduler, t: TaskId) -> Result<bool, SchedError> {
    sched.delete_task(t)
}

/// `task.status(t?)`: the wire status string, one of `"finish"`,
/// `"error"`, `"dead"`, `"running"`, `"waitting"`, `"hold"`, `"ready"`.
pub fn status(sched: &Scheduler, t: Option<TaskId>) -> &'static str {
    sched.status(target(sched, t)).as_str()
}

/// `task.context(t, ctx…)`: with values, replace `t`'s context and return
/// nothing; without, return a copy of it. Both directions are no-ops for a
/// running task.
pub fn context(
    sched: &mut Scheduler,
    t: TaskId,
    ctx: Option<Vec<Value>>,
) -> Result<Vec<Value>, SchedError> {
    sched.check_task(t)?;
    match ctx {
        Some(values) => {
            sched.set_context_any(t, values)?;
            Ok(Vec::new())
        }
        None => Ok(sched.context(t)),
    }
}

/// Empty binding argument lists mean "leave the context alone".
fn ctx_arg(ctx: Vec<Value>) -> Option<Vec<Value>> {
    if ctx.is_empty() { None } else { Some(ctx) }
}
