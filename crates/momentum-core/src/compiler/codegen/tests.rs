// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the bytecode compiler.

use super::*;
use crate::parser::Parser;

fn compile_source(src: &str) -> Result<CompiledProgram> {
    let mut parser = Parser::new(src);
    let program = parser.parse_program()?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)
}

fn compile_ok(src: &str) -> CompiledProgram {
    compile_source(src).expect("Compilation should succeed")
}

fn compile_err(src: &str) -> String {
    compile_source(src).expect_err("Compilation should fail").to_string()
}

/// Decodes a chunk into its opcode sequence.
fn ops(chunk: &Chunk) -> Vec<OpCode> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < chunk.code.len() {
        let op = OpCode::from_byte(chunk.code[offset]).expect("valid opcode");
        out.push(op);
        offset += 1 + op.operand_width();
    }
    out
}

fn function<'a>(program: &'a CompiledProgram, name: &str) -> &'a Function {
    program
        .main
        .chunk
        .constants
        .iter()
        .find_map(|c| match c {
            Value::Function(f) if f.name == name => Some(f.as_ref()),
            _ => None,
        })
        .expect("function constant")
}

#[test]
fn test_compile_empty_program() {
    let program = compile_ok("");
    assert_eq!(ops(&program.main.chunk), vec![OpCode::None, OpCode::Return]);
    assert_eq!(program.main.name, MAIN_NAME);
}

#[test]
fn test_compile_top_level_assignment_is_global() {
    let program = compile_ok("x = 1");
    assert_eq!(
        ops(&program.main.chunk),
        vec![OpCode::Constant, OpCode::SetGlobal, OpCode::Pop, OpCode::None, OpCode::Return]
    );
}

#[test]
fn test_compile_constant_folding() {
    let program = compile_ok("print 2 * 3 + 1");
    assert_eq!(
        ops(&program.main.chunk),
        vec![OpCode::Constant, OpCode::Print, OpCode::None, OpCode::Return]
    );
    assert!(program.main.chunk.constants.contains(&Value::Int(7)));
}

#[test]
fn test_compile_division_by_zero_not_folded() {
    let program = compile_ok("print 1 / 0");
    assert!(ops(&program.main.chunk).contains(&OpCode::Div));
}

#[test]
fn test_compile_negative_literal_folded() {
    let program = compile_ok("print -5");
    assert!(!ops(&program.main.chunk).contains(&OpCode::Neg));
    assert!(program.main.chunk.constants.contains(&Value::Int(-5)));
}

#[test]
fn test_compile_constants_deduplicated() {
    let program = compile_ok("a = \"x\"\nb = \"x\"\nc = 2\nd = 2");
    let strings = program
        .main
        .chunk
        .constants
        .iter()
        .filter(|c| **c == Value::str("x"))
        .count();
    assert_eq!(strings, 1);
}

#[test]
fn test_compile_function_hoisted() {
    let program = compile_ok("print f(1)\nfunction f(a)\nreturn a\nend function");
    let code = ops(&program.main.chunk);
    // The binding comes before the print.
    assert_eq!(&code[..3], &[OpCode::Constant, OpCode::SetGlobal, OpCode::Pop]);
    assert!(code.contains(&OpCode::CallNamed));

    let f = function(&program, "f");
    assert_eq!(f.arity, 1);
    assert_eq!(ops(&f.chunk), vec![OpCode::GetLocal, OpCode::Return, OpCode::None, OpCode::Return]);
}

#[test]
fn test_compile_function_flags() {
    let program = compile_ok("async function a()\nend function\nnative function n()\nend function");
    assert!(function(&program, "a").is_async);
    assert!(function(&program, "n").is_native);
}

#[test]
fn test_compile_assignment_in_function_declares_local() {
    let program = compile_ok("function f()\nx = 1\nx = x + 1\nreturn x\nend function");
    let code = ops(&function(&program, "f").chunk);
    assert!(!code.contains(&OpCode::SetGlobal));
    assert!(code.contains(&OpCode::SetLocal));
}

#[test]
fn test_compile_global_statement() {
    let program = compile_ok("function f()\nglobal count\ncount = count + 1\nend function");
    let code = ops(&function(&program, "f").chunk);
    assert!(code.contains(&OpCode::GetGlobal));
    assert!(code.contains(&OpCode::SetGlobal));
    assert!(!code.contains(&OpCode::GetLocal));
}

#[test]
fn test_compile_local_call_uses_call() {
    let program = compile_ok("function f(g)\nreturn g(1)\nend function");
    let code = ops(&function(&program, "f").chunk);
    assert!(code.contains(&OpCode::Call));
    assert!(!code.contains(&OpCode::CallNamed));
}

#[test]
fn test_compile_await_call_spawns() {
    let program = compile_ok("x = await fetch(1)");
    let code = ops(&program.main.chunk);
    assert_eq!(&code[..3], &[OpCode::Constant, OpCode::SpawnNamed, OpCode::Await]);
}

#[test]
fn test_compile_import() {
    let program = compile_ok("import \"lib\"");
    assert_eq!(
        &ops(&program.main.chunk)[..3],
        &[OpCode::Import, OpCode::Await, OpCode::MergeGlobals]
    );
}

#[test]
fn test_compile_multi_index_builds_tuple() {
    let program = compile_ok("dim g[2, 2]\ng[1, 1] = 5\nprint g[1, 1]");
    let code = ops(&program.main.chunk);
    assert!(code.contains(&OpCode::NewArray));
    assert_eq!(code.iter().filter(|op| **op == OpCode::BuildTuple).count(), 2);
    assert!(code.contains(&OpCode::SetIndex));
}

#[test]
fn test_compile_data_pool_collected_everywhere() {
    let program = compile_ok("data 1, -2\nfunction f()\ndata \"three\"\nend function\nif 0 then\ndata 4.5\nend if");
    assert_eq!(
        program.data,
        vec![Value::Int(1), Value::Int(-2), Value::str("three"), Value::Float(4.5)]
    );
}

#[test]
fn test_compile_data_rejects_expressions() {
    assert!(compile_err("data 1 + x").contains("DATA values must be literals"));
}

#[test]
fn test_compile_loops_balance_stack() {
    // Hidden loop locals are popped when the loop ends.
    let program = compile_ok("for i = 1 to 3\nprint i\nnext");
    let code = ops(&program.main.chunk);
    let tail = &code[code.len() - 4..];
    assert_eq!(tail, &[OpCode::Pop, OpCode::Pop, OpCode::None, OpCode::Return]);
}

#[test]
fn test_compile_try_layout() {
    let program = compile_ok("try\nraise \"x\"\ncatch e\nprint e\nend try");
    let code = ops(&program.main.chunk);
    assert_eq!(code[0], OpCode::TryBegin);
    assert!(code.contains(&OpCode::TryEnd));
    assert!(code.contains(&OpCode::Raise));
}

#[test]
fn test_compile_try_finally_without_catch_reraises() {
    let program = compile_ok("try\nx = 1\nfinally\nprint 1\nend try");
    let code = ops(&program.main.chunk);
    assert_eq!(code.iter().filter(|op| **op == OpCode::Print).count(), 2);
    assert!(code.contains(&OpCode::Raise));
}

#[test]
fn test_compile_break_inlines_finally() {
    let program = compile_ok("while 1\ntry\nbreak\nfinally\nprint 1\nend try\nwend");
    let code = ops(&program.main.chunk);
    // Once on the break path, once on the handler path, once on the normal path.
    assert_eq!(code.iter().filter(|op| **op == OpCode::Print).count(), 3);
}

#[test]
fn test_compile_return_inside_try_uses_hidden_slot() {
    let program = compile_ok("function f()\ntry\nreturn 1\nfinally\nprint 2\nend try\nend function");
    let code = ops(&function(&program, "f").chunk);
    assert_eq!(code[0], OpCode::None);
    assert!(code.contains(&OpCode::SetLocal));
}

#[test]
fn test_compile_interactive_keeps_last_value() {
    let mut parser = Parser::new("x = 2\nx * 3");
    let program = parser.parse_program().unwrap();
    let compiled = Compiler::new().compile_interactive(&program).unwrap();
    let code = ops(&compiled.main.chunk);
    assert_eq!(code.last(), Some(&OpCode::Return));
    assert_ne!(code[code.len() - 2], OpCode::None);
}

#[test]
fn test_compile_line_table() {
    let program = compile_ok("x = 1\n\ny = 2");
    let chunk = &program.main.chunk;
    assert_eq!(chunk.line_at(0), 1);
    assert_eq!(chunk.line_at(chunk.len() - 3), 3);
}

#[test]
fn test_compile_error_duplicate_local() {
    let err = compile_err("function f()\nlet a\nlet a\nend function");
    assert!(err.contains("Variable 'a' already declared in this scope"));
    assert!(err.contains("line 3"));
}

#[test]
fn test_compile_error_duplicate_parameter() {
    let err = compile_err("function f(a, a)\nend function");
    assert!(err.contains("already declared"));
}

#[test]
fn test_compile_error_break_outside_loop() {
    assert!(compile_err("break").contains("'break' outside of a loop"));
    assert!(compile_err("continue").contains("'continue' outside of a loop"));
}

#[test]
fn test_compile_error_return_at_top_level() {
    assert!(compile_err("return 1").contains("'return' outside of a function"));
}

#[test]
fn test_compile_error_global_at_top_level() {
    assert!(compile_err("global x").contains("'global' declaration outside of a function"));
}

#[test]
fn test_compile_disassemble_lists_functions() {
    let program = compile_ok("function f()\nprint 1\nend function\nf()");
    let listing = program.main.chunk.disassemble(MAIN_NAME);
    assert!(listing.contains("== <main> =="));
    assert!(listing.contains("== f =="));
    assert!(listing.contains("CallNamed"));
}
