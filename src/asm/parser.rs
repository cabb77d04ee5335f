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
use std::fmt;

use crate::asm::instruction::{Comp, Dest, Instruction, Jump, Operand};

// ===================================================================
// Error
// ===================================================================

/// Identifies possible errors arising from scanning an `.asm` file.
/// Every variant carries the (1-based) line it occurred on.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    UnexpectedCharacter(char, usize),
    InvalidAddress(String, usize),
    InvalidLabel(String, usize),
    UnknownComp(String, usize),
    UnknownDest(String, usize),
    UnknownJump(String, usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnexpectedCharacter(c, l) => {
                write!(f, "line {}: unexpected character {:?}", l, c)
            }
            Error::InvalidAddress(s, l) => {
                write!(f, "line {}: invalid address '@{}'", l, s)
            }
            Error::InvalidLabel(s, l) => {
                write!(f, "line {}: invalid label '({})'", l, s)
            }
            Error::UnknownComp(s, l) => {
                write!(f, "line {}: unknown computation '{}'", l, s)
            }
            Error::UnknownDest(s, l) => {
                write!(f, "line {}: unknown destination '{}'", l, s)
            }
            Error::UnknownJump(s, l) => {
                write!(f, "line {}: unknown jump '{}'", l, s)
            }
        }
    }
}

impl std::error::Error for Error {}

// ===================================================================
// Parser
// ===================================================================

/// Scan a whole `.asm` file into instructions, each paired with the
/// line it came from.  Comments and whitespace are stripped; blank
/// lines vanish.
pub fn parse(input: &str) -> Result<Vec<(usize, Instruction)>, Error> {
    let mut instructions = Vec::new();
    for (i, line) in input.lines().enumerate() {
        if let Some(insn) = parse_line(line, i + 1)? {
            instructions.push((i + 1, insn));
        }
    }
    Ok(instructions)
}

fn parse_line(line: &str, number: usize) -> Result<Option<Instruction>, Error> {
    // Strip any comment, then all whitespace.
    let line = match line.find("//") {
        Some(i) => &line[..i],
        None => line,
    };
    let chars: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return Ok(None);
    }
    let insn = match chars[0] {
        '@' => parse_address(&chars[1..], number)?,
        '(' => parse_label(&chars, number)?,
        _ => parse_compute(&chars, number)?,
    };
    Ok(Some(insn))
}

/// Parse the operand of an `@x` instruction: a decimal literal or a
/// symbol.
fn parse_address(chars: &[char], number: usize) -> Result<Instruction, Error> {
    let text: String = chars.iter().collect();
    if chars.is_empty() {
        Err(Error::InvalidAddress(text, number))
    } else if chars[0].is_ascii_digit() {
        match text.parse::<u16>() {
            Ok(n) => Ok(Instruction::A(Operand::Literal(n))),
            Err(_) => Err(Error::InvalidAddress(text, number)),
        }
    } else if chars.iter().all(|&c| is_symbol_char(c)) {
        Ok(Instruction::A(Operand::Symbol(text)))
    } else {
        Err(Error::InvalidAddress(text, number))
    }
}

/// Parse a `(NAME)` label declaration.
fn parse_label(chars: &[char], number: usize) -> Result<Instruction, Error> {
    let text: String = chars[1..].iter().take_while(|&&c| c != ')').collect();
    let well_formed = chars.last() == Some(&')')
        && text.len() == chars.len() - 2
        && !text.is_empty()
        && !text.chars().next().unwrap().is_ascii_digit()
        && text.chars().all(is_symbol_char);
    if well_formed {
        Ok(Instruction::Label(text))
    } else {
        Err(Error::InvalidLabel(text, number))
    }
}

/// Parse a `dest=comp;jmp` instruction, either optional part
/// defaulting to empty.
fn parse_compute(chars: &[char], number: usize) -> Result<Instruction, Error> {
    let text: String = chars.iter().collect();
    let (rest, jump) = match text.find(';') {
        Some(i) => (&text[..i], &text[i + 1..]),
        None => (&text[..], ""),
    };
    let (dest, comp) = match rest.find('=') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => ("", rest),
    };
    let dest = Dest::parse(dest).ok_or_else(|| Error::UnknownDest(dest.to_string(), number))?;
    let comp = Comp::parse(comp).ok_or_else(|| Error::UnknownComp(comp.to_string(), number))?;
    let jump = Jump::parse(jump).ok_or_else(|| Error::UnknownJump(jump.to_string(), number))?;
    Ok(Instruction::C(dest, comp, jump))
}

/// Symbols may contain letters, digits, underscores, dots, dollar
/// signs and colons.
fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$' || c == ':'
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::{parse, Error};
    use crate::asm::instruction::{Comp, Dest, Instruction, Jump, Operand};

    #[test]
    fn test_01() {
        let insns = parse("@2\nD=A\n").unwrap();
        assert_eq!(
            insns,
            vec![
                (1, Instruction::A(Operand::Literal(2))),
                (2, Instruction::C(Dest::D, Comp::A, Jump::Empty)),
            ]
        );
    }

    #[test]
    fn test_02() {
        let insns = parse("(LOOP)\n@LOOP\n0;JMP\n").unwrap();
        assert_eq!(
            insns,
            vec![
                (1, Instruction::Label("LOOP".to_string())),
                (2, Instruction::A(Operand::Symbol("LOOP".to_string()))),
                (3, Instruction::C(Dest::Empty, Comp::Zero, Jump::JMP)),
            ]
        );
    }

    #[test]
    fn test_03() {
        // Comments, blank lines and interior whitespace vanish.
        let insns = parse("// top\n\n  @ 3 // three\n M = M + 1 \n").unwrap();
        assert_eq!(
            insns,
            vec![
                (3, Instruction::A(Operand::Literal(3))),
                (4, Instruction::C(Dest::M, Comp::MPlusOne, Jump::Empty)),
            ]
        );
    }

    #[test]
    fn test_04() {
        // Both optional parts of a C-instruction.
        let insns = parse("MD=M-1\nD;JLE\n").unwrap();
        assert_eq!(
            insns,
            vec![
                (1, Instruction::C(Dest::MD, Comp::MMinusOne, Jump::Empty)),
                (2, Instruction::C(Dest::Empty, Comp::D, Jump::JLE)),
            ]
        );
    }

    #[test]
    fn test_05() {
        // Symbols may contain dots and dollar signs.
        let insns = parse("@Main.main.WHILE_EXP0\n@ball$pos\n").unwrap();
        assert!(matches!(insns[0].1, Instruction::A(Operand::Symbol(_))));
        assert!(matches!(insns[1].1, Instruction::A(Operand::Symbol(_))));
    }

    #[test]
    fn test_06() {
        assert_eq!(
            parse("D=M+2"),
            Err(Error::UnknownComp("M+2".to_string(), 1))
        );
        assert_eq!(
            parse("X=D"),
            Err(Error::UnknownDest("X".to_string(), 1))
        );
        assert_eq!(
            parse("D;JUMP"),
            Err(Error::UnknownJump("JUMP".to_string(), 1))
        );
        assert_eq!(
            parse("@"),
            Err(Error::InvalidAddress("".to_string(), 1))
        );
        assert_eq!(
            parse("@70000"),
            Err(Error::InvalidAddress("70000".to_string(), 1))
        );
        assert_eq!(
            parse("(BAD"),
            Err(Error::InvalidLabel("BAD".to_string(), 1))
        );
    }
}
