//! Language Integration Tests
//!
//! End-to-end programs run through the public engine API, checking the
//! printed output and the final state of the globals.

use std::cell::RefCell;
use std::rc::Rc;

use momentum_core::{AsyncEngine, BufferConsole, Config, Engine, Error, Value};

/// Run a program and capture the output
fn run(source: &str) -> (Result<Value, Error>, String) {
    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = Engine::with_console(Config::default(), console.clone()).expect("engine");
    let result = engine.eval(source);
    let output = console.borrow().text();
    (result, output)
}

fn output(source: &str) -> String {
    let (result, output) = run(source);
    if let Err(e) = result {
        panic!("program failed: {}\noutput so far:\n{}", e, output);
    }
    output
}

// Control flow

#[test]
fn test_for_loop_sum() {
    assert_eq!(output("total = 0\nfor i = 1 to 5\ntotal = total + i\nnext\nprint total"), "15");
}

#[test]
fn test_let_and_named_next() {
    assert_eq!(output("let x = 0\nfor i = 1 to 5\nlet x = x + i\nnext i\nprint(x)"), "15");
    assert_eq!(
        output("try\nlet y = 10 / 0\ncatch e\nprint(\"caught\")\nendtry\nprint(\"after\")"),
        "caught\nafter"
    );
}

#[test]
fn test_for_loop_step_and_bounds() {
    assert_eq!(output("for i = 10 to 1 step -3\nprint i\nnext"), "10\n7\n4\n1");
    assert_eq!(output("for i = 5 to 1\nprint i\nnext\nprint \"after\""), "after");
}

#[test]
fn test_break_leaves_only_inner_loop() {
    let src = "
for i = 1 to 3
  for j = 1 to 3
    if j == 2 then break
    print i, j
  next
next
";
    assert_eq!(output(src), "1 1\n2 1\n3 1");
}

#[test]
fn test_while_with_continue() {
    let src = "
n = 0
while n < 6
  n = n + 1
  if n % 2 == 1 then continue
  print n
wend
";
    assert_eq!(output(src), "2\n4\n6");
}

#[test]
fn test_for_each_over_collections() {
    assert_eq!(output("for each x in [3, 1, 2]\nprint x\nnext"), "3\n1\n2");
    assert_eq!(output("for each c in \"hey\"\nprint c\nnext"), "h\ne\ny");
    assert_eq!(output("for each k in {\"z\": 1, \"a\": 2}\nprint k\nnext"), "a\nz");
}

#[test]
fn test_if_elseif_chain() {
    let src = "
function grade(n)
  if n >= 90 then
    return \"A\"
  elseif n >= 80 then
    return \"B\"
  else if n >= 70 then
    return \"C\"
  else
    return \"F\"
  end if
end function
print grade(95), grade(85), grade(75), grade(10)
";
    assert_eq!(output(src), "A B C F");
}

#[test]
fn test_switch() {
    let src = "
for each n in [1, 2, 3, 7]
  switch n
  case 1
    print \"one\"
  case 2, 3
    print \"few\"
  default
    print \"many\"
  end switch
next
";
    assert_eq!(output(src), "one\nfew\nfew\nmany");
}

#[test]
fn test_logical_operators_short_circuit() {
    let src = "
function loud()
  print \"evaluated\"
  return 1
end function
print 0 and loud()
print 1 or loud()
print 2 and 3
";
    assert_eq!(output(src), "0\n1\n1");
}

// Errors

#[test]
fn test_try_catch_output() {
    assert_eq!(output("try\nraise \"bad\"\ncatch e\nprint \"caught \" + e\nend try"), "caught bad");
}

#[test]
fn test_runtime_errors_are_catchable() {
    let src = "
try
  x = 1 / 0
catch e
  print e
end try
try
  items = [1, 2]
  print items[5]
catch e
  print e
end try
";
    assert_eq!(output(src), "Division by zero\nIndex 5 out of range for length 2");
}

#[test]
fn test_finally_runs_before_reraise() {
    let (result, out) = run("try\nraise \"boom\"\nfinally\nprint \"cleanup\"\nend try\nprint \"unreachable\"");
    assert_eq!(out, "cleanup");
    let err = result.expect_err("should fail");
    assert_eq!(err.as_runtime().map(|e| e.message.as_str()), Some("boom"));
}

#[test]
fn test_break_through_finally() {
    let src = "
while 1
  try
    break
  finally
    print \"finally\"
  end try
wend
print \"out\"
";
    assert_eq!(output(src), "finally\nout");
}

#[test]
fn test_arity_errors_are_catchable() {
    let src = "
function pair(a, b)
  return a + b
end function
try
  pair(1)
catch e
  print e
end try
try
  len()
catch e
  print e
end try
";
    assert_eq!(
        output(src),
        "Function 'pair' expected 2 arguments, but got 1\nFunction 'len' expected 1 arguments, but got 0"
    );
}

#[test]
fn test_uncaught_error_reports_line() {
    let (result, _) = run("x = 1\ny = x + \"a\" - 2");
    match result {
        Err(Error::Runtime(err)) => {
            assert_eq!(err.line, Some(2));
            assert!(err.message.contains("Type mismatch"), "{}", err.message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_syntax_error() {
    let (result, _) = run("print (1 + ");
    assert!(matches!(result, Err(Error::Syntax { line: 1, .. })));
}

#[test]
fn test_exit_code() {
    let (result, out) = run("print \"before\"\nexit(7)\nprint \"after\"");
    assert_eq!(result, Err(Error::Exit(7)));
    assert_eq!(out, "before");
}

// Data

#[test]
fn test_data_read_restore() {
    let src = "
data 1, 2, 3
read a, b
restore
read c
print a, b, c
data \"tail\"
read d, e
print d, e
";
    assert_eq!(output(src), "1 2 1\n2 3");
}

#[test]
fn test_read_into_declared_globals() {
    let src = "data 1, 2, 3\nlet a\nlet b\nlet c\nread a, b, c\nprint(a + b + c)\nrestore\nread a\nprint(a)";
    assert_eq!(output(src), "6\n1");
}

#[test]
fn test_arrays_alias() {
    let src = "
a = [1]
b = a
append(b, 2)
print a, len(a)
";
    assert_eq!(output(src), "[1, 2] 2");
}

#[test]
fn test_dim_and_subscript_calls() {
    let src = "
dim squares[4]
for i = 0 to 3
  squares[i] = i * i
next
print squares(3), squares[-1]
";
    assert_eq!(output(src), "9 9");
}

#[test]
fn test_builtins() {
    let src = "
print str(12) + \"!\"
print int(\"42\") + 1, float(\"1.5\"), int(3.9)
print type(1), type(1.0), type(\"\"), type([]), type({}), type(none)
print keys({\"b\": 1, \"a\": 2})
";
    assert_eq!(output(src), "12!\n43 1.5 3\nint float string array dict none\n[\"a\", \"b\"]");
}

#[test]
fn test_debug_and_fstrings() {
    let src = "
x = 3
debug x * 2
print f\"x is {x}, doubled {x * 2}\"
";
    assert_eq!(output(src), "x * 2 = 6\nx is 3, doubled 6");
}

#[test]
fn test_interactive_returns_last_value() {
    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = Engine::with_console(Config::default(), console).expect("engine");
    engine.eval_interactive("x = 20").unwrap();
    assert_eq!(engine.eval_interactive("x + 1").unwrap(), Value::Int(21));
}

#[test]
fn test_integer_limits() {
    let src = "x = -9223372036854775808\nprint x, x + 1\ntry\nprint -x\ncatch e\nprint \"overflow\"\nend try";
    assert_eq!(output(src), "-9223372036854775808 -9223372036854775807\noverflow");
}

// Tasks

#[tokio::test(start_paused = true)]
async fn test_spawned_sleeps_update_global() {
    let src = "
counter = 0
async function work(ms)
  global counter
  sleep(ms)
  counter = counter + 1
  return ms
end function
a = spawn work(20)
b = spawn work(10)
results = await [a, b]
print counter, results
";
    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = AsyncEngine::with_console(Config::default(), console.clone());
    engine.eval(src).await.unwrap();
    assert_eq!(console.borrow().text(), "2 [20, 10]");
}

#[tokio::test(start_paused = true)]
async fn test_await_builtin_call() {
    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = AsyncEngine::with_console(Config::default(), console.clone());
    let start = tokio::time::Instant::now();
    engine.eval("await sleep(250)\nprint \"woke\"").await.unwrap();
    assert!(start.elapsed() >= std::time::Duration::from_millis(250));
    assert_eq!(console.borrow().text(), "woke");
}

#[test]
fn test_batch_await_reraises_first_failure() {
    let src = "
async function ok()
  return 1
end function
async function bad()
  raise \"task failed\"
end function
try
  await [spawn ok(), spawn bad()]
catch e
  print e
end try
";
    assert_eq!(output(src), "task failed");
}

// Modules

#[test]
fn test_import_executes_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lib.mn"),
        "print \"loading lib\"\nfunction double(x)\nreturn x * 2\nend function\nanswer = 21",
    )
    .unwrap();
    let main = dir.path().join("main.mn");
    std::fs::write(&main, "import \"lib\"\nimport \"lib.mn\"\nprint double(answer)").unwrap();

    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = Engine::with_console(Config::default(), console.clone()).expect("engine");
    engine.eval_file(&main).unwrap();
    assert_eq!(console.borrow().text(), "loading lib\n42");
}

#[test]
fn test_import_missing_module() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.mn");
    std::fs::write(&main, "try\nimport \"nowhere\"\ncatch e\nprint \"missing\"\nend try").unwrap();

    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = Engine::with_console(Config::default(), console.clone()).expect("engine");
    engine.eval_file(&main).unwrap();
    assert_eq!(console.borrow().text(), "missing");
}

#[test]
fn test_import_shared_through_different_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("lib.mn"), "print \"lib ran\"\nlibval = 7").unwrap();
    std::fs::write(dir.path().join("a.mn"), "import \"lib\"\nx = libval").unwrap();
    std::fs::write(dir.path().join("sub").join("b.mn"), "import \"../lib.mn\"\ny = libval + 1").unwrap();
    let main = dir.path().join("main.mn");
    std::fs::write(&main, "import \"a.mn\"\nimport \"sub/b.mn\"\nprint x, y").unwrap();

    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = Engine::with_console(Config::default(), console.clone()).expect("engine");
    engine.eval_file(&main).unwrap();
    assert_eq!(console.borrow().text(), "lib ran\n7 8");
}

#[tokio::test]
async fn test_tasks_share_module_while_loading() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.mn"), "print \"lib ran\"\nsleep(10)\nlibval = 7").unwrap();
    let main = dir.path().join("main.mn");
    let src = "
async function a()
  import \"lib\"
  return libval
end function
t1 = spawn a()
t2 = spawn a()
print await [t1, t2]
";
    std::fs::write(&main, src).unwrap();

    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = AsyncEngine::with_console(Config::default(), console.clone());
    engine.eval_file(&main).await.unwrap();
    assert_eq!(console.borrow().text(), "lib ran\n[7, 7]");
}

#[tokio::test]
async fn test_task_waiting_on_loading_module_sees_its_failure() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.mn"), "sleep(10)\nraise \"broken lib\"").unwrap();
    let main = dir.path().join("main.mn");
    let src = "
async function a()
  try
    import \"lib\"
  catch e
    return \"failed\"
  end try
  return \"loaded\"
end function
t1 = spawn a()
t2 = spawn a()
print await [t1, t2]
";
    std::fs::write(&main, src).unwrap();

    let console = Rc::new(RefCell::new(BufferConsole::new()));
    let mut engine = AsyncEngine::with_console(Config::default(), console.clone());
    engine.eval_file(&main).await.unwrap();
    assert_eq!(console.borrow().text(), "[\"failed\", \"failed\"]");
}
