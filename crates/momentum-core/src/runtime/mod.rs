// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Momentum runtime types: values, functions, promises and I/O.

pub mod console;
pub mod function;
pub mod promise;
pub mod value;

pub use console::{BufferConsole, Console, SharedConsole, StdConsole};
pub use function::{CallFrame, Function, MAIN_NAME, TryBlock};
pub use promise::{Promise, PromiseState};
pub use value::Value;
