// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::task::{Step, TaskFn};
use crate::value::Value;
use tracing_subscriber::EnvFilter;

/// A body that immediately returns `values`.
pub(crate) fn returning(values: Vec<Value>) -> TaskFn {
    Box::new(move |_, _, _| Ok(Step::Return(values.clone())))
}

pub(crate) fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
