// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

/// Misuse of the scheduler API, reported to the caller immediately.
///
/// Errors raised *inside* a task body are a different animal: they park the
/// task in the error set and are collected later through
/// [`Scheduler::collect`](crate::Scheduler::collect). A `SchedError` returned
/// from a body is converted into exactly such a task-local error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// The task id refers to a deleted task.
    DeadTask,
    /// The signal id refers to a deleted signal.
    DeletedSignal,
    /// The task already finished or errored; it can only be inspected or
    /// deleted.
    Finished,
    /// The operation would suspend or delete the main task, which stays
    /// pinned in the running set for the lifetime of the scheduler.
    MainTask,
    /// The task is being resumed further up the call stack and cannot be
    /// re-parked from here.
    Running,
    /// The join target is running, finished, errored or dead.
    NotJoinable,
}

// === impl SchedError ===

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadTask => f.write_str("got deleted task"),
            Self::DeletedSignal => f.write_str("got deleted signal"),
            Self::Finished => f.write_str("task already finished"),
            Self::MainTask => f.write_str("cannot suspend main task"),
            Self::Running => f.write_str("task is running"),
            Self::NotJoinable => f.write_str("task is not joinable"),
        }
    }
}

impl core::error::Error for SchedError {}
