// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Signal bindings.

use crate::error::SchedError;
use crate::scheduler::Scheduler;
use crate::signal::SignalId;
use crate::task::TaskId;
use crate::value::Value;

/// `signal.new()`.
pub fn new(sched: &mut Scheduler) -> SignalId {
    sched.new_signal()
}

/// `signal.delete(s)`: wake all waiters with `(nil, "signal deleted")` and
/// invalidate `s`.
pub fn delete(sched: &mut Scheduler, s: SignalId) -> Result<(), SchedError> {
    sched.delete_signal(s)
}

/// `signal.emit(s, args…)`: wake every waiter once. Without arguments each
/// task resumes with its own context.
pub fn emit(sched: &mut Scheduler, s: SignalId, args: Vec<Value>) -> Result<usize, SchedError> {
    sched.emit(s, args_arg(&args))
}

/// `signal.ready(s, args…)`: move every waiter to the next tick.
pub fn ready(sched: &mut Scheduler, s: SignalId, args: Vec<Value>) -> Result<usize, SchedError> {
    sched.ready_all(s, args_arg(&args))
}

/// `signal.one(s, args…)`: wake the longest-waiting task only.
pub fn one(sched: &mut Scheduler, s: SignalId, args: Vec<Value>) -> Result<bool, SchedError> {
    sched.emit_one(s, args_arg(&args))
}

/// `signal.filter(s, fn)`: visit every waiter.
pub fn filter<F>(sched: &mut Scheduler, s: SignalId, f: F) -> Result<(), SchedError>
where
    F: FnMut(&mut Scheduler, TaskId),
{
    sched.filter(s, f)
}

/// `signal.next(s, t?)`: traversal step.
pub fn next(
    sched: &Scheduler,
    s: SignalId,
    curr: Option<TaskId>,
) -> Result<Option<TaskId>, SchedError> {
    sched.next_waiter(s, curr)
}

/// `signal.count(s)`.
pub fn count(sched: &Scheduler, s: SignalId) -> Result<usize, SchedError> {
    sched.waiter_count(s)
}

/// `signal.index(s, i)`: 1-based; negative positions count from the tail.
pub fn index(sched: &Scheduler, s: SignalId, i: isize) -> Result<Option<TaskId>, SchedError> {
    let i = if i > 0 { i - 1 } else { i };
    sched.waiter_at(s, i)
}

fn args_arg(args: &[Value]) -> Option<&[Value]> {
    if args.is_empty() { None } else { Some(args) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::returning;

    fn waiting_tasks(sched: &mut Scheduler, s: SignalId, n: usize) -> Vec<TaskId> {
        (0..n)
            .map(|_| {
                let t = sched.new_task(returning(vec![]));
                let _ = sched.wait(t, Some(s), None).expect("wait");
                t
            })
            .collect()
    }

    #[test]
    fn one_based_indexing() {
        let mut sched = Scheduler::new();
        let s = new(&mut sched);
        let tasks = waiting_tasks(&mut sched, s, 3);
        assert_eq!(index(&sched, s, 1).expect("index"), Some(tasks[0]));
        assert_eq!(index(&sched, s, 3).expect("index"), Some(tasks[2]));
        assert_eq!(index(&sched, s, 4).expect("index"), None);
        assert_eq!(index(&sched, s, -1).expect("index"), Some(tasks[2]));
        assert_eq!(index(&sched, s, -3).expect("index"), Some(tasks[0]));
        assert_eq!(index(&sched, s, -4).expect("index"), None);
        assert_eq!(count(&sched, s).expect("count"), 3);
    }

    #[test]
    fn deleted_signal_is_misuse() {
        let mut sched = Scheduler::new();
        let s = new(&mut sched);
        delete(&mut sched, s).expect("delete");
        assert_eq!(emit(&mut sched, s, vec![]), Err(SchedError::DeletedSignal));
        assert_eq!(
            SchedError::DeletedSignal.to_string(),
            "got deleted signal"
        );
    }
}
