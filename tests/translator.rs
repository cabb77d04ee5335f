mod util;

use hacktools::vm::{self, Translator};
use util::Machine;

// ============================================================================
// Helpers
// ============================================================================

/// Translate a VM fragment, wrap it with a stack-pointer preamble (and
/// optionally extra setup), run it and hand back the machine.
fn run_fragment(setup: &str, text: &str, cycles: usize) -> Machine {
    let instructions = vm::parse(text).unwrap();
    let mut translator = Translator::new(false);
    translator.set_file("Test");
    translator.translate_all(&instructions);
    let asm = format!("@256\nD=A\n@SP\nM=D\n{}{}", setup, translator.to_asm());
    let mut machine = Machine::from_asm(&asm);
    machine.run(cycles);
    machine
}

fn run_vm(text: &str, cycles: usize) -> Machine {
    run_fragment("", text, cycles)
}

/// Translate a whole directory-style unit, bootstrap included.
fn run_unit(files: &[(&str, &str)], cycles: usize) -> Machine {
    let mut translator = Translator::new(false);
    translator.bootstrap();
    for (stem, text) in files {
        let instructions = vm::parse(text).unwrap();
        translator.set_file(stem);
        translator.translate_all(&instructions);
    }
    let mut machine = Machine::from_asm(&translator.to_asm());
    machine.run(cycles);
    machine
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_add_sub() {
    let m = run_vm("push constant 7\npush constant 5\nadd", 100);
    assert_eq!(m.sp(), 257);
    assert_eq!(m.top(), 12);
    let m = run_vm("push constant 7\npush constant 5\nsub", 100);
    assert_eq!(m.top(), 2);
}

#[test]
fn test_neg_not() {
    let m = run_vm("push constant 3\nneg", 100);
    assert_eq!(m.top(), 0xfffd);
    let m = run_vm("push constant 0\nnot", 100);
    assert_eq!(m.top(), 0xffff);
}

#[test]
fn test_and_or() {
    let m = run_vm("push constant 12\npush constant 10\nand", 100);
    assert_eq!(m.top(), 8);
    let m = run_vm("push constant 12\npush constant 10\nor", 100);
    assert_eq!(m.top(), 14);
}

#[test]
fn test_comparisons() {
    let m = run_vm("push constant 2\npush constant 3\nlt", 100);
    assert_eq!(m.top(), 0xffff);
    let m = run_vm("push constant 2\npush constant 3\ngt", 100);
    assert_eq!(m.top(), 0);
    let m = run_vm("push constant 3\npush constant 3\neq", 100);
    assert_eq!(m.top(), 0xffff);
}

#[test]
fn test_comparison_is_signed() {
    // -1 < 0
    let m = run_vm("push constant 0\npush constant 1\nsub\npush constant 0\nlt", 100);
    assert_eq!(m.top(), 0xffff);
}

// ============================================================================
// Memory access
// ============================================================================

#[test]
fn test_pop_absolute_segments() {
    let m = run_vm(
        "push constant 42\npop temp 3\npush constant 5\npop pointer 1\npush constant 9\npop pointer 0",
        200,
    );
    assert_eq!(m.ram[8], 42); // temp 3 = R8
    assert_eq!(m.that(), 5);
    assert_eq!(m.this(), 9);
}

#[test]
fn test_static_allocates_per_file_symbol() {
    // Test.2 is the only variable, so the assembler places it at 16.
    let m = run_vm("push constant 77\npop static 2\npush static 2", 200);
    assert_eq!(m.ram[16], 77);
    assert_eq!(m.top(), 77);
}

#[test]
fn test_local_and_argument_indirect() {
    let setup = "@300\nD=A\n@LCL\nM=D\n@310\nD=A\n@ARG\nM=D\n";
    let m = run_fragment(
        setup,
        "push constant 7\npop local 2\npush constant 8\npop argument 0\npush local 2",
        200,
    );
    assert_eq!(m.ram[302], 7);
    assert_eq!(m.ram[310], 8);
    assert_eq!(m.top(), 7);
}

// ============================================================================
// Program flow
// ============================================================================

#[test]
fn test_if_goto_skips_when_taken() {
    let m = run_vm(
        "push constant 1\npush constant 1\neq\nif-goto END\npush constant 9\npop temp 0\nlabel END",
        200,
    );
    // The branch was taken, so temp 0 was never written.
    assert_eq!(m.ram[5], 0);
    assert_eq!(m.sp(), 256);
}

#[test]
fn test_if_goto_falls_through_when_false() {
    let m = run_vm(
        "push constant 0\nif-goto END\npush constant 9\npop temp 0\nlabel END",
        200,
    );
    assert_eq!(m.ram[5], 9);
}

#[test]
fn test_labels_scoped_by_function() {
    // Identically named labels in different functions do not collide.
    let instructions = vm::parse(
        "function A.f 0\nlabel LOOP\ngoto LOOP\nfunction B.g 0\nlabel LOOP\ngoto LOOP",
    )
    .unwrap();
    let mut translator = Translator::new(false);
    translator.set_file("Test");
    translator.translate_all(&instructions);
    let asm = translator.to_asm();
    assert!(asm.contains("(A.f.LOOP)"));
    assert!(asm.contains("(B.g.LOOP)"));
}

// ============================================================================
// Calling convention
// ============================================================================

#[test]
fn test_call_and_return_round_trip() {
    // A function that immediately returns must leave the caller's
    // frame registers exactly as they were, with the return value on
    // top of the stack.
    let sys = "function Sys.init 0\ncall F.g 0\nlabel HALT\ngoto HALT";
    let f = "function F.g 0\npush constant 0\nreturn";
    let m = run_unit(&[("F", f), ("Sys", sys)], 2000);
    // Inside Sys.init the call pushed 5 frame words above SP=261;
    // after the return only the result slot remains.
    assert_eq!(m.sp(), 262);
    assert_eq!(m.lcl(), 261);
    assert_eq!(m.arg(), 256);
    assert_eq!(m.top(), 0);
}

#[test]
fn test_arguments_and_return_value() {
    let sys = "function Sys.init 0\n\
               push constant 30\n\
               push constant 12\n\
               call F.add 2\n\
               pop static 0\n\
               label HALT\ngoto HALT";
    let f = "function F.add 0\npush argument 0\npush argument 1\nadd\nreturn";
    let m = run_unit(&[("F", f), ("Sys", sys)], 2000);
    // Sys.0 is the only variable the assembler allocates.
    assert_eq!(m.ram[16], 42);
    // The two arguments were consumed.
    assert_eq!(m.sp(), 261);
}

#[test]
fn test_function_zeroes_its_locals() {
    let sys = "function Sys.init 0\n\
               push constant 1\n\
               pop local 0\n\
               call F.probe 0\n\
               pop static 0\n\
               label HALT\ngoto HALT";
    // The callee's locals read as zero even though the stack slots
    // held junk beforehand.
    let f = "function F.probe 3\npush local 0\npush local 1\nadd\npush local 2\nadd\nreturn";
    let m = run_unit(&[("F", f), ("Sys", sys)], 3000);
    assert_eq!(m.ram[16], 0);
}

#[test]
fn test_nested_calls() {
    let sys = "function Sys.init 0\n\
               push constant 5\n\
               call F.outer 1\n\
               pop static 0\n\
               label HALT\ngoto HALT";
    let f = "function F.outer 0\n\
             push argument 0\n\
             push constant 1\n\
             call F.inner 2\n\
             return\n\
             function F.inner 0\n\
             push argument 0\n\
             push argument 1\n\
             add\n\
             return";
    let m = run_unit(&[("F", f), ("Sys", sys)], 3000);
    assert_eq!(m.ram[16], 6);
}

#[test]
fn test_recursion() {
    // result = 1 + 2 + ... + 5, computed recursively.
    let sys = "function Sys.init 0\n\
               push constant 5\n\
               call F.sum 1\n\
               pop static 0\n\
               label HALT\ngoto HALT";
    let f = "function F.sum 0\n\
             push argument 0\n\
             push constant 0\n\
             eq\n\
             if-goto BASE\n\
             push argument 0\n\
             push argument 0\n\
             push constant 1\n\
             sub\n\
             call F.sum 1\n\
             add\n\
             return\n\
             label BASE\n\
             push constant 0\n\
             return";
    let m = run_unit(&[("F", f), ("Sys", sys)], 20000);
    assert_eq!(m.ram[16], 15);
}

#[test]
fn test_bootstrap_sets_stack_base() {
    let sys = "function Sys.init 0\nlabel HALT\ngoto HALT";
    let m = run_unit(&[("Sys", sys)], 200);
    // SP = 256 plus the five frame words of the Sys.init call.
    assert_eq!(m.sp(), 261);
}
