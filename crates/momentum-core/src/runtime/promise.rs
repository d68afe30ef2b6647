// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Settable result slots behind `future` values.

use std::cell::{Cell, RefCell};

use tokio::sync::Notify;

use super::value::Value;

/// State of a promise.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// Still running
    Pending,
    /// Finished with a value
    Resolved(Value),
    /// Finished with an error message
    Rejected(String),
}

/// The shared result slot of a spawned task or async builtin.
#[derive(Debug)]
pub struct Promise {
    state: RefCell<PromiseState>,
    observed: Cell<bool>,
    settled: Notify,
}

impl Promise {
    /// Creates a pending promise.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(PromiseState::Pending),
            observed: Cell::new(false),
            settled: Notify::new(),
        }
    }

    /// Creates an already resolved promise.
    pub fn resolved(value: Value) -> Self {
        Self {
            state: RefCell::new(PromiseState::Resolved(value)),
            observed: Cell::new(false),
            settled: Notify::new(),
        }
    }

    /// Returns true once resolved or rejected.
    pub fn is_settled(&self) -> bool {
        !matches!(*self.state.borrow(), PromiseState::Pending)
    }

    /// Settles the promise. A second settlement is ignored.
    pub fn settle(&self, outcome: Result<Value, String>) {
        {
            let mut state = self.state.borrow_mut();
            if !matches!(*state, PromiseState::Pending) {
                return;
            }
            *state = match outcome {
                Ok(value) => PromiseState::Resolved(value),
                Err(message) => PromiseState::Rejected(message),
            };
        }
        self.settled.notify_waiters();
    }

    /// Waits until the promise is settled, from outside the scheduler that
    /// owns it, and returns the outcome.
    pub async fn wait(&self) -> Result<Value, String> {
        loop {
            // Registered before the check so a settlement in between is seen.
            let notified = self.settled.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Takes a look at the outcome and marks the promise as observed.
    /// Returns `None` while pending.
    pub fn outcome(&self) -> Option<Result<Value, String>> {
        let state = self.state.borrow();
        let outcome = match &*state {
            PromiseState::Pending => return None,
            PromiseState::Resolved(value) => Ok(value.clone()),
            PromiseState::Rejected(message) => Err(message.clone()),
        };
        self.observed.set(true);
        Some(outcome)
    }

    /// Rejection message of a promise nobody awaited.
    pub fn unobserved_failure(&self) -> Option<String> {
        if self.observed.get() {
            return None;
        }
        match &*self.state.borrow() {
            PromiseState::Rejected(message) => Some(message.clone()),
            _ => None,
        }
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_once() {
        let promise = Promise::new();
        assert!(promise.outcome().is_none());
        promise.settle(Ok(Value::Int(1)));
        promise.settle(Err("late".into()));
        assert_eq!(promise.outcome(), Some(Ok(Value::Int(1))));
    }

    #[tokio::test]
    async fn test_wait_for_settlement() {
        let promise = std::rc::Rc::new(Promise::new());
        let settler = promise.clone();
        let (outcome, ()) = tokio::join!(promise.wait(), async move {
            tokio::task::yield_now().await;
            settler.settle(Ok(Value::Int(7)));
        });
        assert_eq!(outcome, Ok(Value::Int(7)));
        // Already settled: returns at once.
        assert_eq!(promise.wait().await, Ok(Value::Int(7)));
    }

    #[test]
    fn test_unobserved_failure() {
        let promise = Promise::new();
        promise.settle(Err("boom".into()));
        assert_eq!(promise.unobserved_failure(), Some("boom".to_string()));
        let _ = promise.outcome();
        assert_eq!(promise.unobserved_failure(), None);
    }
}
