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
use std::collections::HashMap;
use std::fmt;

use crate::asm::instruction::{encode, Instruction, Operand};

/// The first RAM address available to allocated variables.
const VARIABLES_BASE: u16 = 16;

// ===================================================================
// Error
// ===================================================================

/// Identifies possible errors arising while resolving symbols and
/// encoding instructions.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    DuplicateLabel(String, usize),
    UndeclaredLabel(String, usize),
    RamExhausted(String, usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateLabel(s, l) => {
                write!(f, "line {}: label '({})' declared twice", l, s)
            }
            Error::UndeclaredLabel(s, l) => {
                write!(f, "line {}: reference to undeclared label '{}'", l, s)
            }
            Error::RamExhausted(s, l) => {
                write!(f, "line {}: no RAM left to allocate '{}'", l, s)
            }
        }
    }
}

impl std::error::Error for Error {}

// ===================================================================
// Symbol Table
// ===================================================================

/// Maps names to 16-bit addresses.  Seeded with the predefined
/// symbols of the Hack memory map; extended by label declarations in
/// pass one and variable allocation in pass two.
pub struct SymbolTable {
    map: HashMap<String, u16>,
    /// Next free RAM address for variable allocation.
    next: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert("SP".to_string(), 0);
        map.insert("LCL".to_string(), 1);
        map.insert("ARG".to_string(), 2);
        map.insert("THIS".to_string(), 3);
        map.insert("THAT".to_string(), 4);
        for i in 0..16 {
            map.insert(format!("R{}", i), i);
        }
        map.insert("SCREEN".to_string(), 16384);
        map.insert("KBD".to_string(), 24576);
        Self {
            map,
            next: VARIABLES_BASE as u32,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.map.get(name).copied()
    }

    /// Record a label declaration.  Redefinition is an error.
    pub fn insert_label(&mut self, name: &str, address: u16, line: usize) -> Result<(), Error> {
        if self.map.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string(), line));
        }
        self.map.insert(name.to_string(), address);
        Ok(())
    }

    /// Allocate the next free RAM address for a variable, refusing to
    /// run past the end of the address space.
    pub fn allocate(&mut self, name: &str, line: usize) -> Result<u16, Error> {
        if self.next > u16::MAX as u32 {
            return Err(Error::RamExhausted(name.to_string(), line));
        }
        let address = self.next as u16;
        self.next += 1;
        self.map.insert(name.to_string(), address);
        Ok(address)
    }
}

// ===================================================================
// Assembler
// ===================================================================

/// Assemble parsed instructions into machine words.  Pass one records
/// each label against the address of the instruction that follows it;
/// pass two encodes one word per non-label instruction, allocating
/// RAM for variables on first reference.
pub fn assemble(instructions: &[(usize, Instruction)]) -> Result<Vec<u16>, Error> {
    let mut symbols = SymbolTable::new();
    // Pass one: record label addresses.  Emits nothing.
    let mut address: u16 = 0;
    for (line, insn) in instructions {
        match insn {
            Instruction::Label(name) => {
                symbols.insert_label(name, address, *line)?;
            }
            _ => {
                address += 1;
            }
        }
    }
    // Pass two: encode.
    let mut words = Vec::new();
    for (line, insn) in instructions {
        match insn {
            Instruction::Label(_) => {}
            Instruction::A(Operand::Literal(n)) => {
                words.push(*n);
            }
            Instruction::A(Operand::Symbol(name)) => {
                let address = match symbols.lookup(name) {
                    Some(a) => a,
                    None if is_label_shaped(name) => {
                        return Err(Error::UndeclaredLabel(name.clone(), *line));
                    }
                    None => symbols.allocate(name, *line)?,
                };
                words.push(address);
            }
            Instruction::C(dest, comp, jump) => {
                words.push(encode(*dest, *comp, *jump));
            }
        }
    }
    log::debug!("assembled {} words", words.len());
    Ok(words)
}

/// An undefined symbol with no lowercase letter in it is taken for a
/// misspelt label reference rather than a variable.
fn is_label_shaped(name: &str) -> bool {
    !name.chars().any(|c| c.is_ascii_lowercase())
}

/// Render machine words as `.hack` text: one 16-character ASCII
/// binary word per line, most significant bit first.
pub fn to_hack(words: &[u16]) -> String {
    let mut out = String::new();
    for w in words {
        out.push_str(&format!("{:016b}\n", w));
    }
    out
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::{assemble, to_hack, Error, SymbolTable};
    use crate::asm::parser;

    fn words(input: &str) -> Vec<u16> {
        assemble(&parser::parse(input).unwrap()).unwrap()
    }

    #[test]
    fn test_01() {
        let t = SymbolTable::new();
        assert_eq!(t.lookup("SP"), Some(0));
        assert_eq!(t.lookup("LCL"), Some(1));
        assert_eq!(t.lookup("ARG"), Some(2));
        assert_eq!(t.lookup("THIS"), Some(3));
        assert_eq!(t.lookup("THAT"), Some(4));
        assert_eq!(t.lookup("R0"), Some(0));
        assert_eq!(t.lookup("R15"), Some(15));
        assert_eq!(t.lookup("SCREEN"), Some(16384));
        assert_eq!(t.lookup("KBD"), Some(24576));
        assert_eq!(t.lookup("loop"), None);
    }

    #[test]
    fn test_02() {
        // Variables allocate upwards from 16.
        let mut t = SymbolTable::new();
        assert_eq!(t.allocate("i", 1), Ok(16));
        assert_eq!(t.allocate("sum", 2), Ok(17));
        assert_eq!(t.lookup("i"), Some(16));
    }

    #[test]
    fn test_03() {
        let mut t = SymbolTable::new();
        t.insert_label("LOOP", 4, 1).unwrap();
        assert_eq!(
            t.insert_label("LOOP", 9, 7),
            Err(Error::DuplicateLabel("LOOP".to_string(), 7))
        );
    }

    #[test]
    fn test_04() {
        // Labels take the address of the following instruction and
        // consume none themselves.
        let ws = words("@1\n(A_LOOP)\n@2\n(B_LOOP)\n@A_LOOP\n@B_LOOP\n");
        assert_eq!(ws, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_05() {
        // Pass two emits exactly one word per non-label line.
        let ws = words("// nothing\n(START)\n@3\nD=A\n@START\n0;JMP\n");
        assert_eq!(ws.len(), 4);
    }

    #[test]
    fn test_06() {
        // An undefined all-uppercase symbol is a misspelt label, not
        // a fresh variable.
        let result = assemble(&parser::parse("@TYPO\n").unwrap());
        assert_eq!(result, Err(Error::UndeclaredLabel("TYPO".to_string(), 1)));
        // Whereas a lowercased one allocates.
        assert_eq!(words("@typo\n"), vec![16]);
    }

    #[test]
    fn test_07() {
        assert_eq!(to_hack(&[2, 0b1110001100001000]),
                   "0000000000000010\n1110001100001000\n");
    }

    #[test]
    fn test_08() {
        // Assembling the same source twice is deterministic.
        let src = "@x\nM=M+1\n@y\nM=0\n@x\nD=M\n";
        assert_eq!(words(src), words(src));
    }
}
