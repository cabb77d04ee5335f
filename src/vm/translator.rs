// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use crate::vm::{Instruction, Segment};

// ============================================================================
// Translator
// ============================================================================

/// Lowers VM instructions into Hack assembly text.  All state the
/// lowering depends on is carried here: the output buffer, the
/// current input file (which scopes `static` storage), the current
/// function (which scopes branch labels) and the counter that keeps
/// generated assembly labels unique across the whole translation
/// unit.
pub struct Translator {
    /// Assembly lines produced so far.
    out: Vec<String>,
    /// Draws unique assembly labels for comparisons and call sites.
    labels: usize,
    /// Name of the function being translated.
    function: String,
    /// Stem of the file being translated.
    file: String,
    /// Whether to annotate output with the source VM instruction.
    annotate: bool,
}

impl Translator {
    pub fn new(annotate: bool) -> Self {
        Self {
            out: Vec::new(),
            labels: 0,
            function: String::new(),
            file: String::new(),
            annotate,
        }
    }

    /// Record the stem of the file whose instructions follow.
    /// Separately translated files share static storage by file
    /// identity, via assembler symbols of the form `stem.i`.
    pub fn set_file(&mut self, stem: &str) {
        self.file = stem.to_string();
        log::info!("translating {}.vm", stem);
    }

    /// Emit the bootstrap preamble for a directory unit: point `SP`
    /// at the base of the stack, then transfer control to `Sys.init`.
    pub fn bootstrap(&mut self) {
        if self.annotate {
            self.out.push("// bootstrap".to_string());
        }
        self.emit("@256");
        self.emit("D=A");
        self.emit("@SP");
        self.emit("M=D");
        self.translate_call("Sys.init", 0);
    }

    /// Extract the generated assembly, one instruction per line.
    pub fn to_asm(self) -> String {
        let mut text = self.out.join("\n");
        text.push('\n');
        text
    }

    pub fn translate_all(&mut self, instructions: &[Instruction]) {
        for insn in instructions {
            self.translate(insn);
        }
    }

    /// Lower a single VM instruction onto the output buffer.
    pub fn translate(&mut self, insn: &Instruction) {
        if self.annotate {
            self.out.push(format!("// {}", insn));
        }
        match insn {
            Instruction::Add => self.translate_binary("M=M+D"),
            Instruction::Sub => self.translate_binary("M=M-D"),
            Instruction::And => self.translate_binary("M=M&D"),
            Instruction::Or => self.translate_binary("M=M|D"),
            Instruction::Neg => self.translate_unary("M=-M"),
            Instruction::Not => self.translate_unary("M=!M"),
            Instruction::Eq => self.translate_comparison("JEQ"),
            Instruction::Gt => self.translate_comparison("JGT"),
            Instruction::Lt => self.translate_comparison("JLT"),
            Instruction::Push(segment, index) => self.translate_push(*segment, *index),
            Instruction::Pop(segment, index) => self.translate_pop(*segment, *index),
            Instruction::Label(l) => {
                let scoped = self.scoped(l);
                self.emit(&format!("({})", scoped));
            }
            Instruction::Goto(l) => {
                let scoped = self.scoped(l);
                self.emit(&format!("@{}", scoped));
                self.emit("0;JMP");
            }
            Instruction::IfGoto(l) => {
                let scoped = self.scoped(l);
                self.emit("@SP");
                self.emit("AM=M-1");
                self.emit("D=M");
                self.emit(&format!("@{}", scoped));
                self.emit("D;JNE");
            }
            Instruction::Function(name, locals) => self.translate_function(name, *locals),
            Instruction::Call(name, args) => self.translate_call(name, *args),
            Instruction::Return => self.translate_return(),
        }
    }

    // ========================================================================
    // Memory access
    // ========================================================================

    fn translate_push(&mut self, segment: Segment, index: u16) {
        match segment {
            Segment::Constant => {
                self.emit(&format!("@{}", index));
                self.emit("D=A");
            }
            Segment::Argument | Segment::Local | Segment::This | Segment::That => {
                self.emit(&format!("@{}", index));
                self.emit("D=A");
                self.emit(&format!("@{}", base_pointer(segment)));
                self.emit("A=M+D");
                self.emit("D=M");
            }
            Segment::Pointer | Segment::Temp | Segment::Static => {
                let target = self.absolute(segment, index);
                self.emit(&format!("@{}", target));
                self.emit("D=M");
            }
        }
        self.emit_push_d();
    }

    fn translate_pop(&mut self, segment: Segment, index: u16) {
        match segment {
            Segment::Argument | Segment::Local | Segment::This | Segment::That => {
                // Stash the target address, since popping needs both
                // A and D.
                self.emit(&format!("@{}", index));
                self.emit("D=A");
                self.emit(&format!("@{}", base_pointer(segment)));
                self.emit("D=M+D");
                self.emit("@R13");
                self.emit("M=D");
                self.emit("@SP");
                self.emit("AM=M-1");
                self.emit("D=M");
                self.emit("@R13");
                self.emit("A=M");
                self.emit("M=D");
            }
            Segment::Pointer | Segment::Temp | Segment::Static => {
                let target = self.absolute(segment, index);
                self.emit("@SP");
                self.emit("AM=M-1");
                self.emit("D=M");
                self.emit(&format!("@{}", target));
                self.emit("M=D");
            }
            Segment::Constant => {
                // The decoder rejects this form.
                unreachable!();
            }
        }
    }

    /// The assembler-level target of an absolute segment reference.
    fn absolute(&self, segment: Segment, index: u16) -> String {
        match segment {
            Segment::Pointer if index == 0 => "THIS".to_string(),
            Segment::Pointer => "THAT".to_string(),
            Segment::Temp => format!("R{}", 5 + index),
            Segment::Static => {
                assert!(!self.file.is_empty());
                format!("{}.{}", self.file, index)
            }
            _ => unreachable!(),
        }
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    fn translate_binary(&mut self, op: &str) {
        self.emit("@SP");
        self.emit("AM=M-1");
        self.emit("D=M");
        self.emit("A=A-1");
        self.emit(op);
    }

    fn translate_unary(&mut self, op: &str) {
        self.emit("@SP");
        self.emit("A=M-1");
        self.emit(op);
    }

    /// Comparisons compute `x - y`, optimistically write true, and
    /// jump out on the condition; the fall-through path turns the
    /// true (-1) into false (0) by incrementing.
    fn translate_comparison(&mut self, jump: &str) {
        let label = self.fresh_label("CMP");
        self.emit("@SP");
        self.emit("AM=M-1");
        self.emit("D=M");
        self.emit("A=A-1");
        self.emit("D=M-D");
        self.emit("M=-1");
        self.emit(&format!("@{}", label));
        self.emit(&format!("D;{}", jump));
        self.emit("@SP");
        self.emit("A=M-1");
        self.emit("M=M+1");
        self.emit(&format!("({})", label));
    }

    // ========================================================================
    // Calling convention
    // ========================================================================

    fn translate_function(&mut self, name: &str, locals: u16) {
        self.function = name.to_string();
        self.emit(&format!("({})", name));
        for _ in 0..locals {
            self.emit("@SP");
            self.emit("A=M");
            self.emit("M=0");
            self.emit("@SP");
            self.emit("M=M+1");
        }
    }

    fn translate_call(&mut self, name: &str, args: u16) {
        let ret = self.fresh_label("RET");
        // Push the return address, then the caller's frame.
        self.emit(&format!("@{}", ret));
        self.emit("D=A");
        self.emit_push_d();
        for register in ["LCL", "ARG", "THIS", "THAT"] {
            self.emit(&format!("@{}", register));
            self.emit("D=M");
            self.emit_push_d();
        }
        // ARG = SP - args - 5
        self.emit("@SP");
        self.emit("D=M");
        self.emit(&format!("@{}", args + 5));
        self.emit("D=D-A");
        self.emit("@ARG");
        self.emit("M=D");
        // LCL = SP
        self.emit("@SP");
        self.emit("D=M");
        self.emit("@LCL");
        self.emit("M=D");
        self.emit(&format!("@{}", name));
        self.emit("0;JMP");
        self.emit(&format!("({})", ret));
    }

    fn translate_return(&mut self) {
        // The return address must be saved first: for a zero-argument
        // call it occupies the very slot the return value is about to
        // overwrite.
        self.emit("@LCL");
        self.emit("D=M");
        self.emit("@5");
        self.emit("A=D-A");
        self.emit("D=M");
        self.emit("@R13");
        self.emit("M=D");
        // *ARG = pop()
        self.emit("@SP");
        self.emit("A=M-1");
        self.emit("D=M");
        self.emit("@ARG");
        self.emit("A=M");
        self.emit("M=D");
        // SP = ARG + 1
        self.emit("@ARG");
        self.emit("D=M+1");
        self.emit("@SP");
        self.emit("M=D");
        // Restore the caller's frame, LCL last.
        for (register, offset) in [("THAT", 1), ("THIS", 2), ("ARG", 3), ("LCL", 4)] {
            self.emit("@LCL");
            self.emit("D=M");
            self.emit(&format!("@{}", offset));
            self.emit("A=D-A");
            self.emit("D=M");
            self.emit(&format!("@{}", register));
            self.emit("M=D");
        }
        self.emit("@R13");
        self.emit("A=M");
        self.emit("0;JMP");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn emit(&mut self, line: &str) {
        self.out.push(line.to_string());
    }

    /// Push D onto the stack.
    fn emit_push_d(&mut self) {
        self.emit("@SP");
        self.emit("A=M");
        self.emit("M=D");
        self.emit("@SP");
        self.emit("M=M+1");
    }

    /// Draw a fresh assembly label from the unit-wide counter.
    fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.labels);
        self.labels += 1;
        label
    }

    /// Scope a VM branch label by the enclosing function, preventing
    /// collisions between identically named labels in different
    /// functions.
    fn scoped(&self, label: &str) -> String {
        if self.function.is_empty() {
            label.to_string()
        } else {
            format!("{}.{}", self.function, label)
        }
    }
}

/// The base-pointer register backing an indirect segment.
fn base_pointer(segment: Segment) -> &'static str {
    match segment {
        Segment::Argument => "ARG",
        Segment::Local => "LCL",
        Segment::This => "THIS",
        Segment::That => "THAT",
        _ => unreachable!(),
    }
}

// ============================================================================
// Tests
// ============================================================================
