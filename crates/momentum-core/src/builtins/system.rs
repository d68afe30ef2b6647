// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Clock, timers and process exit.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::FutureExt;

use super::{Builtins, Native, check_arity};
use crate::error::NativeError;
use crate::runtime::Value;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("time", |args| {
        check_arity("time", &args, 0, 0)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Native::Ready(Value::Float(now)))
    });

    builtins.register("sleep", |args| {
        check_arity("sleep", &args, 1, 1)?;
        let delay = millis(&args[0])?;
        Ok(Native::Pending(
            async move {
                tokio::time::sleep(delay).await;
                Ok(Value::None)
            }
            .boxed_local(),
        ))
    });

    builtins.register("exit", |args| {
        check_arity("exit", &args, 0, 1)?;
        let code = match args.first() {
            None => 0,
            Some(Value::Int(code)) => i32::try_from(*code)
                .map_err(|_| NativeError::message(format!("Exit code {} out of range", code)))?,
            Some(other) => {
                return Err(NativeError::message(format!(
                    "exit() expects an int, found {}",
                    other.type_name()
                )));
            }
        };
        Err(NativeError::Exit(code))
    });
}

fn millis(value: &Value) -> Result<Duration, NativeError> {
    match value.as_f64() {
        Some(ms) if ms.is_finite() && ms >= 0.0 => Ok(Duration::from_secs_f64(ms / 1000.0)),
        _ => Err(NativeError::message(format!(
            "sleep() expects a non-negative number of milliseconds, found {}",
            value.repr()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(name: &str) -> super::super::NativeFn {
        Builtins::standard().get(name).expect("builtin")
    }

    #[test]
    fn test_time_is_positive() {
        match builtin("time")(vec![]) {
            Ok(Native::Ready(Value::Float(now))) => assert!(now > 0.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(builtin("exit")(vec![]).unwrap_err(), NativeError::Exit(0));
        assert_eq!(builtin("exit")(vec![Value::Int(3)]).unwrap_err(), NativeError::Exit(3));
        assert!(matches!(
            builtin("exit")(vec![Value::str("x")]),
            Err(NativeError::Message(_))
        ));
    }

    #[test]
    fn test_sleep_rejects_negative() {
        assert!(matches!(
            builtin("sleep")(vec![Value::Int(-1)]),
            Err(NativeError::Message(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_resolves_after_delay() {
        let start = tokio::time::Instant::now();
        let Ok(Native::Pending(future)) = builtin("sleep")(vec![Value::Int(250)]) else {
            panic!("sleep should be pending");
        };
        assert_eq!(future.await, Ok(Value::None));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
