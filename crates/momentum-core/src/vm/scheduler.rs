// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Cooperative task scheduling.
//!
//! Tasks run one at a time until they finish or suspend on an `await`.
//! Native async work (timers, module loads) is polled by a
//! [`FuturesUnordered`] on the current-thread runtime; a completion settles
//! its promise, which in turn wakes the tasks waiting on it.

use std::collections::VecDeque;
use std::rc::Rc;

use futures::StreamExt;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use tracing::warn;

use crate::error::NativeError;
use crate::runtime::{CallFrame, Function, Promise, TryBlock, Value};

/// Native work in flight, paired with the promise it settles.
type NativeTask = LocalBoxFuture<'static, (Rc<Promise>, Result<Value, NativeError>)>;

/// One cooperative flow of execution.
#[derive(Debug)]
pub(crate) struct Task {
    pub id: usize,
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    pub tries: Vec<TryBlock>,
    /// Settled with the task's result
    pub promise: Rc<Promise>,
    /// Suspended on the value on top of the stack
    pub awaiting: bool,
}

impl Task {
    /// A task that will call `function` with `args`. The function sits just
    /// below its arguments, as it would after a `Call`.
    fn new(id: usize, function: Rc<Function>, args: Vec<Value>) -> Self {
        let mut stack = Vec::with_capacity(args.len() + 16);
        stack.push(Value::Function(function.clone()));
        stack.extend(args);
        Self {
            id,
            stack,
            frames: vec![CallFrame::new(function, 1)],
            tries: Vec::new(),
            promise: Rc::new(Promise::new()),
            awaiting: false,
        }
    }

    /// True when nothing this task awaits is still pending.
    pub fn can_resume(&self) -> bool {
        !self.awaiting || self.stack.last().map_or(true, is_settled)
    }
}

/// Returns true if awaiting `value` would not block.
pub(crate) fn is_settled(value: &Value) -> bool {
    match value {
        Value::Future(promise) => promise.is_settled(),
        Value::Array(items) => items.borrow().iter().all(|item| match item {
            Value::Future(promise) => promise.is_settled(),
            _ => true,
        }),
        _ => true,
    }
}

/// Run queue plus the native futures being polled.
#[derive(Default)]
pub(crate) struct Scheduler {
    ready: VecDeque<Task>,
    waiting: Vec<Task>,
    natives: FuturesUnordered<NativeTask>,
    /// Promises of every spawned task, checked for unobserved failures
    spawned: Vec<Rc<Promise>>,
    next_id: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a new task and returns its promise.
    pub fn spawn(&mut self, function: Rc<Function>, args: Vec<Value>) -> Rc<Promise> {
        let task = Task::new(self.next_id, function, args);
        self.next_id += 1;
        let promise = task.promise.clone();
        self.ready.push_back(task);
        promise
    }

    /// Like [`spawn`](Self::spawn), for tasks created by `spawn` expressions.
    pub fn spawn_tracked(&mut self, function: Rc<Function>, args: Vec<Value>) -> Rc<Promise> {
        let promise = self.spawn(function, args);
        self.spawned.push(promise.clone());
        promise
    }

    /// Starts polling a native future; the returned promise settles with
    /// its result.
    pub fn register_native(
        &mut self,
        future: LocalBoxFuture<'static, Result<Value, NativeError>>,
    ) -> Rc<Promise> {
        let promise = Rc::new(Promise::new());
        let settles = promise.clone();
        self.natives
            .push(Box::pin(async move { (settles, future.await) }));
        promise
    }

    /// Records a promise created for a spawned builtin.
    pub fn track(&mut self, promise: Rc<Promise>) {
        self.spawned.push(promise);
    }

    pub fn next_ready(&mut self) -> Option<Task> {
        self.ready.pop_front()
    }

    /// Parks a suspended task, or requeues it if what it awaits has
    /// already settled.
    pub fn park(&mut self, task: Task) {
        if task.can_resume() {
            self.ready.push_back(task);
        } else {
            self.waiting.push(task);
        }
    }

    /// Moves every waiting task whose await can complete to the run queue,
    /// preserving their order.
    pub fn wake(&mut self) {
        if self.waiting.is_empty() {
            return;
        }
        let (ready, still_waiting): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.waiting).into_iter().partition(Task::can_resume);
        self.waiting = still_waiting;
        self.ready.extend(ready);
    }

    pub fn has_waiting(&self) -> bool {
        !self.waiting.is_empty()
    }

    pub fn has_natives(&self) -> bool {
        !self.natives.is_empty()
    }

    /// Waits for the next native completion. `None` when nothing is in flight.
    pub async fn next_native(&mut self) -> Option<(Rc<Promise>, Result<Value, NativeError>)> {
        self.natives.next().await
    }

    /// Logs spawned work that failed without anyone awaiting it.
    pub fn report_unobserved(&self) {
        for message in self.spawned.iter().filter_map(|p| p.unobserved_failure()) {
            warn!(error = %message, "spawned task failed and was never awaited");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Chunk;
    use futures::FutureExt;

    fn function() -> Rc<Function> {
        Rc::new(Function::new("f", 1, Chunk::new()))
    }

    #[test]
    fn test_spawn_lays_out_call() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(function(), vec![Value::Int(7)]);
        let task = scheduler.next_ready().unwrap();
        assert!(matches!(task.stack[0], Value::Function(_)));
        assert_eq!(task.stack[1], Value::Int(7));
        assert_eq!(task.frames[0].stack_base, 1);
    }

    #[test]
    fn test_waiting_task_wakes_on_settle() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(function(), vec![]);
        let mut task = scheduler.next_ready().unwrap();

        let promise = Rc::new(Promise::new());
        task.stack.push(Value::Future(promise.clone()));
        task.awaiting = true;
        scheduler.park(task);
        scheduler.wake();
        assert!(scheduler.next_ready().is_none());
        assert!(scheduler.has_waiting());

        promise.settle(Ok(Value::None));
        scheduler.wake();
        assert!(scheduler.next_ready().is_some());
        assert!(!scheduler.has_waiting());
    }

    #[test]
    fn test_batch_waits_for_every_future() {
        let first = Rc::new(Promise::new());
        let second = Rc::new(Promise::new());
        let batch = Value::array(vec![
            Value::Future(first.clone()),
            Value::Int(3),
            Value::Future(second.clone()),
        ]);
        first.settle(Ok(Value::None));
        assert!(!is_settled(&batch));
        second.settle(Err("boom".into()));
        assert!(is_settled(&batch));
    }

    #[tokio::test]
    async fn test_native_completion_settles_promise() {
        let mut scheduler = Scheduler::new();
        let promise = scheduler.register_native(async { Ok(Value::Int(5)) }.boxed_local());
        assert!(scheduler.has_natives());

        let (settled, result) = scheduler.next_native().await.unwrap();
        assert!(Rc::ptr_eq(&settled, &promise));
        assert_eq!(result, Ok(Value::Int(5)));
        assert!(scheduler.next_native().await.is_none());
    }
}
