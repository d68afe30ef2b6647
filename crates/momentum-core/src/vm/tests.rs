// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the virtual machine.

use std::cell::RefCell;
use std::rc::Rc;

use super::interpreter::{Flow, recover};
use super::*;
use crate::compiler::Compiler;
use crate::parser::Parser;
use crate::runtime::BufferConsole;

fn compile(src: &str) -> CompiledProgram {
    let program = Parser::new(src).parse_program().expect("Should parse");
    Compiler::new().compile(&program).expect("Should compile")
}

fn vm_with(config: Config) -> (Vm, Rc<RefCell<BufferConsole>>) {
    let console = Rc::new(RefCell::new(BufferConsole::new()));
    (Vm::new(config, console.clone()), console)
}

async fn run(src: &str) -> (Result<Value>, String) {
    let (mut vm, console) = vm_with(Config::default());
    let result = vm.run(&compile(src)).await;
    let output = console.borrow().text();
    (result, output)
}

async fn run_err(src: &str) -> RuntimeError {
    match run(src).await.0 {
        Err(Error::Runtime(err)) => err,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

/// Steps the main task one instruction at a time and returns the operand
/// stack depth when it reaches the implicit `None; Return` at the end.
fn depth_at_exit(src: &str) -> usize {
    let program = compile(src);
    let (mut vm, _) = vm_with(Config::default());
    vm.data = program.data.clone();

    let mut scheduler = Scheduler::new();
    scheduler.spawn(program.main.clone(), Vec::new());
    let mut task = scheduler.next_ready().expect("main task");
    let end = program.main.chunk.len() - 2;

    loop {
        if task.frames.len() == 1 && task.frames[0].ip == end {
            return task.stack.len();
        }
        match vm.step(&mut task, &mut scheduler) {
            Ok(Flow::Continue) => {}
            Ok(_) => panic!("main task stopped early"),
            Err(NativeError::Message(message)) => assert!(recover(&mut task, &message), "uncaught: {}", message),
            Err(err) => panic!("unexpected {:?}", err),
        }
    }
}

const CONTROL_FLOW: &str = "
function f(n)
  total = 0
  for i = 1 to n
    if i % 2 == 0 then
      continue
    end if
    try
      if i == 5 then raise \"five\"
      total = total + i
    catch e
      total = total + 100
    finally
      total = total + 1
    end try
  next
  return total
end function
x = f(7)
for each v in [1, 2, 3]
  while 1
    break
  wend
next
switch x
case 1, 2
  print \"small\"
default
  y = 0
end switch
";

#[test]
fn test_stack_balanced_after_statements() {
    // Only the main function's own slot remains.
    assert_eq!(depth_at_exit(CONTROL_FLOW), 1);
    assert_eq!(depth_at_exit("try\nraise \"x\"\ncatch e\nz = 1\nfinally\nz = 2\nend try"), 1);
}

#[tokio::test]
async fn test_control_flow_result() {
    let (mut vm, _) = vm_with(Config::default());
    vm.run(&compile(CONTROL_FLOW)).await.unwrap();
    assert_eq!(vm.global("x"), Some(&Value::Int(115)));
    assert_eq!(vm.global("y"), Some(&Value::Int(0)));
}

#[tokio::test]
async fn test_error_carries_line_and_trace() {
    let err = run_err("function inner()\nreturn 1 / 0\nend function\nfunction outer()\nreturn inner()\nend function\nprint outer()").await;
    assert_eq!(err.message, "Division by zero");
    assert_eq!(err.line, Some(2));
    let names: Vec<&str> = err.trace.iter().map(|e| e.function.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer", "<main>"]);
    assert_eq!(err.trace[2].line, 7);
}

#[tokio::test]
async fn test_trace_limit() {
    let config = Config {
        trace_limit: 2,
        ..Config::default()
    };
    let (mut vm, _) = vm_with(config);
    let program = compile("function down(n)\nif n == 0 then raise \"bottom\"\nreturn down(n - 1)\nend function\ndown(5)");
    let Err(Error::Runtime(err)) = vm.run(&program).await else {
        panic!("expected a runtime error");
    };
    assert_eq!(err.trace.len(), 2);
}

#[tokio::test]
async fn test_stack_overflow() {
    let config = Config {
        max_call_depth: 50,
        ..Config::default()
    };
    let (mut vm, _) = vm_with(config);
    let program = compile("function forever(n)\nreturn forever(n + 1)\nend function\nforever(0)");
    let Err(Error::Runtime(err)) = vm.run(&program).await else {
        panic!("expected a runtime error");
    };
    assert_eq!(err.message, "Stack overflow: maximum call depth of 50 exceeded");
}

#[tokio::test]
async fn test_stack_overflow_is_catchable() {
    let (result, output) = run("function forever()\nreturn forever()\nend function\ntry\nforever()\ncatch e\nprint \"recovered\"\nend try").await;
    assert!(result.is_ok());
    assert_eq!(output, "recovered");
}

#[tokio::test]
async fn test_undefined_variable() {
    let err = run_err("print missing").await;
    assert_eq!(err.message, "Variable 'missing' is not defined.");
    assert_eq!(err.line, Some(1));
}

#[tokio::test]
async fn test_error_in_catch_runs_finally() {
    let (result, output) = run("try\nraise \"first\"\ncatch e\nraise \"second\"\nfinally\nprint \"cleanup\"\nend try").await;
    assert_eq!(output, "cleanup");
    match result {
        Err(Error::Runtime(err)) => assert_eq!(err.message, "second"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_return_runs_finally() {
    let (result, output) = run("function f()\ntry\nreturn 1\nfinally\nprint \"finally\"\nend try\nreturn 2\nend function\nprint f()").await;
    assert!(result.is_ok());
    assert_eq!(output, "finally\n1");
}

#[tokio::test]
async fn test_try_depth_restored_after_call_unwinds() {
    // The handler belongs to main; the failing frame is discarded.
    let (result, output) = run("function f(a)\nlocal_value = a * 2\nraise \"bad \" + str(local_value)\nend function\ntry\nf(4)\ncatch e\nprint e\nend try\nprint \"done\"").await;
    assert!(result.is_ok());
    assert_eq!(output, "bad 8\ndone");
}

#[tokio::test]
async fn test_exit_bypasses_try() {
    let (result, output) = run("try\nexit(3)\ncatch e\nprint \"caught\"\nfinally\nprint \"finally\"\nend try").await;
    assert_eq!(result, Err(Error::Exit(3)));
    assert_eq!(output, "");
}

#[tokio::test]
async fn test_async_function_called_synchronously() {
    let err = run_err("async function job()\nreturn 1\nend function\njob()").await;
    assert_eq!(
        err.message,
        "Cannot call async function 'job' synchronously; use await or spawn"
    );
}

#[tokio::test]
async fn test_await_async_function() {
    let (result, output) = run("async function job(x)\nreturn x * 2\nend function\nprint await job(21)").await;
    assert!(result.is_ok());
    assert_eq!(output, "42");
}

#[tokio::test]
async fn test_call_dual_meaning() {
    let src = "
scores = [10, 20, 30]
print scores(1)
dims = {\"w\": 3}
print dims(\"w\")
function pick(items)
  return items(0)
end function
print pick(scores)
function add(a, b)
  return a + b
end function
print add[2, 3]
";
    let (result, output) = run(src).await;
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "20\n3\n10\n5");
}

#[tokio::test]
async fn test_not_a_function() {
    assert_eq!(run_err("nothing(1)").await.message, "'nothing' is not a function.");
    assert_eq!(run_err("x = 5\nx(1, 2)").await.message, "'x' is not a function.");
}

#[tokio::test]
async fn test_arity_mismatch() {
    let err = run_err("function f(a, b)\nreturn a\nend function\nf(1)").await;
    assert_eq!(err.message, "Function 'f' expected 2 arguments, but got 1");
    let err = run_err("function f(a)\nreturn a\nend function\nx = spawn f()").await;
    assert_eq!(err.message, "Function 'f' expected 1 arguments, but got 0");
}

#[tokio::test]
async fn test_spawned_failure_raises_at_await() {
    let src = "
async function boom()
  raise \"exploded\"
end function
task = spawn boom()
try
  await task
catch e
  print \"caught \" + e
end try
";
    let (result, output) = run(src).await;
    assert!(result.is_ok());
    assert_eq!(output, "caught exploded");
}

#[tokio::test]
async fn test_unawaited_failure_does_not_fail_run() {
    let (result, output) = run("async function boom()\nraise \"lost\"\nend function\nspawn boom()\nprint \"main done\"").await;
    assert_eq!(result, Ok(Value::None));
    assert_eq!(output, "main done");
}

#[tokio::test]
async fn test_spawned_tasks_drained_after_main() {
    let (result, output) = run("async function later()\nprint \"later\"\nend function\nspawn later()\nprint \"main\"").await;
    assert!(result.is_ok());
    assert_eq!(output, "main\nlater");
}

#[tokio::test]
async fn test_deadlock_detected() {
    let src = "
async function waiter()
  return await other
end function
async function second()
  return await one
end function
one = spawn waiter()
other = spawn second()
await one
";
    assert_eq!(run_err(src).await.message, "Deadlock: all tasks are waiting");
}

#[tokio::test]
async fn test_await_plain_value_passes_through() {
    let (_, output) = run("print await 5\nprint await [1, 2]").await;
    assert_eq!(output, "5\n[1, 2]");
}

#[tokio::test(start_paused = true)]
async fn test_sleep_suspends_only_the_caller() {
    let src = "
async function slow()
  sleep(100)
  print \"slow\"
end function
async function fast()
  print \"fast\"
end function
a = spawn slow()
b = spawn fast()
await [a, b]
print \"joined\"
";
    let (result, output) = run(src).await;
    assert!(result.is_ok());
    assert_eq!(output, "fast\nslow\njoined");
}

#[tokio::test]
async fn test_input_coercion() {
    let console = Rc::new(RefCell::new(BufferConsole::with_input(["12", "2.5", "abc"])));
    let mut vm = Vm::new(Config::default(), console.clone());
    vm.run(&compile("input a, \"a? \"\ninput b\ninput c\ninput d\nprint type(a), type(b), type(c), type(d)"))
        .await
        .unwrap();
    assert_eq!(console.borrow().text(), "int float string none");
}

#[tokio::test]
async fn test_out_of_data() {
    assert_eq!(run_err("data 1\nread a, b").await.message, "Out of DATA");
}

#[tokio::test]
async fn test_debug_statement() {
    let (_, output) = run("name = \"momentum\"\ndebug name + \"!\"").await;
    assert_eq!(output, "name + \"!\" = \"momentum!\"");
}

#[tokio::test]
async fn test_fstring_and_dicts() {
    let (_, output) = run("d = {\"b\": 2, \"a\": 1}\nfor each k in d\nprint f\"{k}={d[k]}\"\nnext").await;
    assert_eq!(output, "a=1\nb=2");
}

#[tokio::test]
async fn test_multi_dimensional_dim() {
    let (_, output) = run("dim grid[2, 3]\ngrid[1, 2] = 7\nprint grid[1, 2], len(grid), len(grid[0])").await;
    assert_eq!(output, "7 2 3");
}

#[tokio::test]
async fn test_global_statement() {
    let (mut vm, _) = vm_with(Config::default());
    vm.run(&compile("count = 0\nfunction bump()\nglobal count\ncount = count + 1\nend function\nbump()\nbump()"))
        .await
        .unwrap();
    assert_eq!(vm.global("count"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_function_locals_stay_local() {
    let (mut vm, _) = vm_with(Config::default());
    vm.run(&compile("x = 1\nfunction f()\nx = 99\nreturn x\nend function\ny = f()"))
        .await
        .unwrap();
    assert_eq!(vm.global("x"), Some(&Value::Int(1)));
    assert_eq!(vm.global("y"), Some(&Value::Int(99)));
}

#[tokio::test]
async fn test_circular_import() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.mn"), "import \"b\"").unwrap();
    std::fs::write(dir.path().join("b.mn"), "import \"a\"").unwrap();

    let (mut vm, _) = vm_with(Config::default());
    vm.set_base_dir(dir.path());
    let Err(Error::Runtime(err)) = vm.run(&compile("import \"a\"")).await else {
        panic!("expected a runtime error");
    };
    assert!(err.message.contains("Circular import of"), "{}", err.message);
    // Failed modules are dropped from the cache.
    assert!(vm.module_cache().borrow().is_empty());
}
