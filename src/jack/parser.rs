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

use crate::jack::lexer::{self, Lexer, Token};
use crate::jack::symbols::{Kind, Symbol, SymbolTable};
use crate::jack::xml::XmlWriter;
use crate::lex::Span;
use crate::vm::{self, Instruction, Segment};

/// Defines the set of tokens which act as binary operators inside an
/// expression.
pub const BINARY_OPERATORS: &[Token] = &[
    Token::Plus,
    Token::Minus,
    Token::Star,
    Token::Slash,
    Token::Ampersand,
    Token::Bar,
    Token::LeftAngle,
    Token::RightAngle,
    Token::Equals,
];

/// Defines the set of tokens which can begin a type.
pub const TYPE_TOKENS: &[Token] = &[Token::Int, Token::Char, Token::Boolean, Token::Identifier];

// =========================================================================
// Error
// =========================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorCode {
    Lex(lexer::Error),
    UnexpectedToken(Token),
    ExpectedToken(Token, Token),
    ExpectedTokenIn(Vec<Token>, Token),
    DuplicateSymbol(String),
    UndeclaredSymbol(String),
    FieldOutsideMethod(String),
    VoidReturnValue,
}

/// Identifies possible errors stemming from the parser.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub code: ErrorCode,
    /// The (1-based) source line the error occurred on.
    pub line: usize,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.code {
            // Lex errors already carry their own line prefix.
            ErrorCode::Lex(e) => write!(f, "{}", e),
            ErrorCode::UnexpectedToken(t) => {
                write!(f, "line {}: unexpected {}", self.line, t)
            }
            ErrorCode::ExpectedToken(want, found) => {
                write!(f, "line {}: expected {}, found {}", self.line, want, found)
            }
            ErrorCode::ExpectedTokenIn(wants, found) => {
                write!(f, "line {}: expected one of ", self.line)?;
                for (i, w) in wants.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", w)?;
                }
                write!(f, "; found {}", found)
            }
            ErrorCode::DuplicateSymbol(n) => {
                write!(f, "line {}: redefinition of '{}'", self.line, n)
            }
            ErrorCode::UndeclaredSymbol(n) => {
                write!(f, "line {}: use of undeclared identifier '{}'", self.line, n)
            }
            ErrorCode::FieldOutsideMethod(n) => {
                write!(
                    f,
                    "line {}: field '{}' accessed from within a function",
                    self.line, n
                )
            }
            ErrorCode::VoidReturnValue => {
                write!(f, "line {}: void subroutine returns a value", self.line)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<lexer::Error> for Error {
    fn from(e: lexer::Error) -> Error {
        let line = match &e {
            lexer::Error::UnexpectedCharacter(_, l)
            | lexer::Error::UnterminatedString(l)
            | lexer::Error::UnterminatedComment(l)
            | lexer::Error::IntegerOverflow(l) => *l,
        };
        Error {
            code: ErrorCode::Lex(e),
            line,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// =========================================================================
// Compiled class
// =========================================================================

/// The output of compiling one `.jack` source file: the class name,
/// its VM code and its parse-tree XML.
pub struct Class {
    pub name: String,
    pub code: Vec<Instruction>,
    pub xml: String,
}

impl Class {
    /// Render the class's VM code as `.vm` text.
    pub fn to_vm(&self) -> String {
        vm::to_text(&self.code)
    }
}

// =========================================================================
// Parser
// =========================================================================

/// A single-pass recursive-descent parser for one Jack class, with
/// integrated code generation.  VM instructions and the parse-tree
/// XML are both built during the descent; the caller picks which
/// artifact to keep.
pub struct Parser {
    /// Provides access to our token stream.
    lexer: Lexer,
    /// The two-level scoped symbol table.
    symbols: SymbolTable,
    /// Name of the class being compiled.
    class_name: String,
    /// VM instructions emitted so far.
    code: Vec<Instruction>,
    /// Parse tree recorder.
    xml: XmlWriter,
    /// Kind of the subroutine being compiled (constructor, function
    /// or method keyword).
    sub_kind: Token,
    /// Whether the current subroutine's return type is `void`.
    ret_void: bool,
    /// Per-subroutine counters for `if` / `while` label numbering.
    if_count: usize,
    while_count: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        Ok(Self {
            lexer: Lexer::new(input)?,
            symbols: SymbolTable::new(),
            class_name: String::new(),
            code: Vec::new(),
            xml: XmlWriter::new(),
            sub_kind: Token::Function,
            ret_void: true,
            if_count: 0,
            while_count: 0,
        })
    }

    /// Parse the whole input as a single class declaration.
    pub fn parse(mut self) -> Result<Class> {
        self.parse_class()?;
        // Sanity check nothing trails the class.
        let lookahead = self.lexer.peek();
        if lookahead.kind != Token::Eof {
            return Err(self.error_at(lookahead, ErrorCode::UnexpectedToken(lookahead.kind)));
        }
        Ok(Class {
            name: self.class_name,
            code: self.code,
            xml: self.xml.finish(),
        })
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_class(&mut self) -> Result<()> {
        self.xml.open("class");
        self.expect(Token::Class)?;
        let name = self.expect(Token::Identifier)?;
        self.class_name = self.lexer.get_str(name);
        self.expect(Token::LeftBrace)?;
        while matches!(self.lexer.peek().kind, Token::Static | Token::Field) {
            self.parse_class_var_dec()?;
        }
        while matches!(
            self.lexer.peek().kind,
            Token::Constructor | Token::Function | Token::Method
        ) {
            self.parse_subroutine()?;
        }
        self.expect(Token::RightBrace)?;
        self.xml.close("class");
        Ok(())
    }

    fn parse_class_var_dec(&mut self) -> Result<()> {
        self.xml.open("classVarDec");
        let kw = self.expect_any(&[Token::Static, Token::Field])?;
        let kind = match kw.kind {
            Token::Static => Kind::Static,
            _ => Kind::Field,
        };
        let typ = self.parse_type()?;
        self.parse_var_names(&typ, kind)?;
        self.expect(Token::SemiColon)?;
        self.xml.close("classVarDec");
        Ok(())
    }

    fn parse_subroutine(&mut self) -> Result<()> {
        self.xml.open("subroutineDec");
        let kw = self.expect_any(&[Token::Constructor, Token::Function, Token::Method])?;
        self.sub_kind = kw.kind;
        self.symbols.start_subroutine();
        self.if_count = 0;
        self.while_count = 0;
        // For a method, `this` occupies argument slot 0.
        if kw.kind == Token::Method {
            let class_name = self.class_name.clone();
            self.define(kw, "this", &class_name, Kind::Argument)?;
        }
        // Return type
        self.ret_void = self.lexer.peek().kind == Token::Void;
        if self.ret_void {
            self.expect(Token::Void)?;
        } else {
            self.parse_type()?;
        }
        let name = self.expect(Token::Identifier)?;
        let name = self.lexer.get_str(name);
        log::debug!("compiling subroutine {}.{}", self.class_name, name);
        self.expect(Token::LeftParen)?;
        self.parse_parameter_list()?;
        self.expect(Token::RightParen)?;
        // Body
        self.xml.open("subroutineBody");
        self.expect(Token::LeftBrace)?;
        while self.lexer.peek().kind == Token::Var {
            self.parse_var_dec()?;
        }
        // All locals are now known, so the entry sequence can be laid
        // down before any statement code.
        let locals = self.symbols.count(Kind::Local);
        self.emit(Instruction::Function(
            format!("{}.{}", self.class_name, name),
            locals,
        ));
        match kw.kind {
            Token::Constructor => {
                let fields = self.symbols.count(Kind::Field);
                self.emit(Instruction::Push(Segment::Constant, fields));
                self.emit(Instruction::Call("Memory.alloc".to_string(), 1));
                self.emit(Instruction::Pop(Segment::Pointer, 0));
            }
            Token::Method => {
                self.emit(Instruction::Push(Segment::Argument, 0));
                self.emit(Instruction::Pop(Segment::Pointer, 0));
            }
            _ => {}
        }
        self.parse_statements()?;
        self.expect(Token::RightBrace)?;
        self.xml.close("subroutineBody");
        self.xml.close("subroutineDec");
        Ok(())
    }

    fn parse_parameter_list(&mut self) -> Result<()> {
        self.xml.open("parameterList");
        if self.lexer.peek().kind != Token::RightParen {
            loop {
                let typ = self.parse_type()?;
                let name = self.expect(Token::Identifier)?;
                let text = self.lexer.get_str(name);
                self.define(name, &text, &typ, Kind::Argument)?;
                if self.lexer.peek().kind != Token::Comma {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        self.xml.close("parameterList");
        Ok(())
    }

    fn parse_var_dec(&mut self) -> Result<()> {
        self.xml.open("varDec");
        self.expect(Token::Var)?;
        let typ = self.parse_type()?;
        self.parse_var_names(&typ, Kind::Local)?;
        self.expect(Token::SemiColon)?;
        self.xml.close("varDec");
        Ok(())
    }

    /// Parse the `name (',' name)*` tail shared by class and local
    /// variable declarations, defining each name as it goes.
    fn parse_var_names(&mut self, typ: &str, kind: Kind) -> Result<()> {
        loop {
            let name = self.expect(Token::Identifier)?;
            let text = self.lexer.get_str(name);
            self.define(name, &text, typ, kind)?;
            if self.lexer.peek().kind != Token::Comma {
                return Ok(());
            }
            self.expect(Token::Comma)?;
        }
    }

    /// Parse a type, which is a primitive type name or a class name.
    fn parse_type(&mut self) -> Result<String> {
        let lookahead = self.lexer.peek();
        match lookahead.kind {
            Token::Int | Token::Char | Token::Boolean => {
                self.expect(lookahead.kind)?;
                Ok(lookahead.kind.text().unwrap().to_string())
            }
            Token::Identifier => {
                self.expect(Token::Identifier)?;
                Ok(self.lexer.get_str(lookahead))
            }
            t => Err(self.error_at(
                lookahead,
                ErrorCode::ExpectedTokenIn(TYPE_TOKENS.to_vec(), t),
            )),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statements(&mut self) -> Result<()> {
        self.xml.open("statements");
        loop {
            match self.lexer.peek().kind {
                Token::Let => self.parse_stmt_let()?,
                Token::If => self.parse_stmt_if()?,
                Token::While => self.parse_stmt_while()?,
                Token::Do => self.parse_stmt_do()?,
                Token::Return => self.parse_stmt_return()?,
                _ => {
                    break;
                }
            }
        }
        self.xml.close("statements");
        Ok(())
    }

    fn parse_stmt_let(&mut self) -> Result<()> {
        self.xml.open("letStatement");
        self.expect(Token::Let)?;
        let name = self.expect(Token::Identifier)?;
        if self.lexer.peek().kind == Token::LeftSquare {
            // let a[e1] = e2
            self.expect(Token::LeftSquare)?;
            self.parse_expr()?;
            self.expect(Token::RightSquare)?;
            self.push_symbol(name)?;
            self.emit(Instruction::Add);
            self.expect(Token::Equals)?;
            self.parse_expr()?;
            self.expect(Token::SemiColon)?;
            // e2 may itself subscript an array, so it cannot be
            // computed between setting `that` and storing through it.
            self.emit(Instruction::Pop(Segment::Temp, 0));
            self.emit(Instruction::Pop(Segment::Pointer, 1));
            self.emit(Instruction::Push(Segment::Temp, 0));
            self.emit(Instruction::Pop(Segment::That, 0));
        } else {
            self.expect(Token::Equals)?;
            self.parse_expr()?;
            self.expect(Token::SemiColon)?;
            self.pop_symbol(name)?;
        }
        self.xml.close("letStatement");
        Ok(())
    }

    fn parse_stmt_if(&mut self) -> Result<()> {
        self.xml.open("ifStatement");
        let k = self.if_count;
        self.if_count += 1;
        self.expect(Token::If)?;
        self.expect(Token::LeftParen)?;
        self.parse_expr()?;
        self.expect(Token::RightParen)?;
        self.emit(Instruction::IfGoto(format!("IF_TRUE{}", k)));
        self.emit(Instruction::Goto(format!("IF_FALSE{}", k)));
        self.emit(Instruction::Label(format!("IF_TRUE{}", k)));
        self.expect(Token::LeftBrace)?;
        self.parse_statements()?;
        self.expect(Token::RightBrace)?;
        if self.lexer.peek().kind == Token::Else {
            self.emit(Instruction::Goto(format!("IF_END{}", k)));
            self.emit(Instruction::Label(format!("IF_FALSE{}", k)));
            self.expect(Token::Else)?;
            self.expect(Token::LeftBrace)?;
            self.parse_statements()?;
            self.expect(Token::RightBrace)?;
            self.emit(Instruction::Label(format!("IF_END{}", k)));
        } else {
            // Without an else branch the false label doubles as the
            // end label.
            self.emit(Instruction::Label(format!("IF_FALSE{}", k)));
        }
        self.xml.close("ifStatement");
        Ok(())
    }

    fn parse_stmt_while(&mut self) -> Result<()> {
        self.xml.open("whileStatement");
        let k = self.while_count;
        self.while_count += 1;
        self.emit(Instruction::Label(format!("WHILE_EXP{}", k)));
        self.expect(Token::While)?;
        self.expect(Token::LeftParen)?;
        self.parse_expr()?;
        self.expect(Token::RightParen)?;
        self.emit(Instruction::Not);
        self.emit(Instruction::IfGoto(format!("WHILE_END{}", k)));
        self.expect(Token::LeftBrace)?;
        self.parse_statements()?;
        self.expect(Token::RightBrace)?;
        self.emit(Instruction::Goto(format!("WHILE_EXP{}", k)));
        self.emit(Instruction::Label(format!("WHILE_END{}", k)));
        self.xml.close("whileStatement");
        Ok(())
    }

    fn parse_stmt_do(&mut self) -> Result<()> {
        self.xml.open("doStatement");
        self.expect(Token::Do)?;
        self.parse_subroutine_call()?;
        self.expect(Token::SemiColon)?;
        // Discard the (possibly void) result.
        self.emit(Instruction::Pop(Segment::Temp, 0));
        self.xml.close("doStatement");
        Ok(())
    }

    fn parse_stmt_return(&mut self) -> Result<()> {
        self.xml.open("returnStatement");
        let kw = self.expect(Token::Return)?;
        if self.lexer.peek().kind != Token::SemiColon {
            if self.ret_void {
                return Err(self.error_at(kw, ErrorCode::VoidReturnValue));
            }
            self.parse_expr()?;
        } else {
            // A void subroutine still leaves a result slot.
            self.emit(Instruction::Push(Segment::Constant, 0));
        }
        self.expect(Token::SemiColon)?;
        self.emit(Instruction::Return);
        self.xml.close("returnStatement");
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> Result<()> {
        self.xml.open("expression");
        self.parse_expr_term()?;
        while BINARY_OPERATORS.contains(&self.lexer.peek().kind) {
            let op = self.lexer.peek().kind;
            self.expect(op)?;
            self.parse_expr_term()?;
            // Operands are on the stack; apply the operator postfix.
            match op {
                Token::Plus => self.emit(Instruction::Add),
                Token::Minus => self.emit(Instruction::Sub),
                Token::Star => self.emit(Instruction::Call("Math.multiply".to_string(), 2)),
                Token::Slash => self.emit(Instruction::Call("Math.divide".to_string(), 2)),
                Token::Ampersand => self.emit(Instruction::And),
                Token::Bar => self.emit(Instruction::Or),
                Token::LeftAngle => self.emit(Instruction::Lt),
                Token::RightAngle => self.emit(Instruction::Gt),
                Token::Equals => self.emit(Instruction::Eq),
                _ => unreachable!(),
            }
        }
        self.xml.close("expression");
        Ok(())
    }

    fn parse_expr_term(&mut self) -> Result<()> {
        self.xml.open("term");
        let lookahead = self.lexer.peek();
        match lookahead.kind {
            Token::IntConstant => {
                let t = self.expect(Token::IntConstant)?;
                let n = self.lexer.get_int(t);
                self.emit(Instruction::Push(Segment::Constant, n));
            }
            Token::StringConstant => {
                let t = self.expect(Token::StringConstant)?;
                self.emit_string(&self.lexer.get_str(t));
            }
            Token::True => {
                self.expect(Token::True)?;
                self.emit(Instruction::Push(Segment::Constant, 0));
                self.emit(Instruction::Not);
            }
            Token::False | Token::Null => {
                self.expect(lookahead.kind)?;
                self.emit(Instruction::Push(Segment::Constant, 0));
            }
            Token::This => {
                self.expect(Token::This)?;
                self.emit(Instruction::Push(Segment::Pointer, 0));
            }
            Token::LeftParen => {
                self.expect(Token::LeftParen)?;
                self.parse_expr()?;
                self.expect(Token::RightParen)?;
            }
            Token::Minus => {
                self.expect(Token::Minus)?;
                self.parse_expr_term()?;
                self.emit(Instruction::Neg);
            }
            Token::Tilde => {
                self.expect(Token::Tilde)?;
                self.parse_expr_term()?;
                self.emit(Instruction::Not);
            }
            Token::Identifier => {
                // Two-token lookahead distinguishes a subroutine call
                // from a variable or subscript.
                match self.lexer.peek2().kind {
                    Token::Dot | Token::LeftParen => {
                        self.parse_subroutine_call()?;
                    }
                    Token::LeftSquare => {
                        let name = self.expect(Token::Identifier)?;
                        self.expect(Token::LeftSquare)?;
                        self.parse_expr()?;
                        self.expect(Token::RightSquare)?;
                        self.push_symbol(name)?;
                        self.emit(Instruction::Add);
                        self.emit(Instruction::Pop(Segment::Pointer, 1));
                        self.emit(Instruction::Push(Segment::That, 0));
                    }
                    _ => {
                        let name = self.expect(Token::Identifier)?;
                        self.push_symbol(name)?;
                    }
                }
            }
            t => {
                return Err(self.error_at(lookahead, ErrorCode::UnexpectedToken(t)));
            }
        }
        self.xml.close("term");
        Ok(())
    }

    /// Parse a subroutine call, which is either `name(args)` (a
    /// method call on the current object), `var.name(args)` (a method
    /// call on that object) or `Class.name(args)` (a static call).
    fn parse_subroutine_call(&mut self) -> Result<()> {
        let first = self.expect(Token::Identifier)?;
        let first_text = self.lexer.get_str(first);
        let (target, implicit) = if self.lexer.peek().kind == Token::Dot {
            self.expect(Token::Dot)?;
            let second = self.expect(Token::Identifier)?;
            let second_text = self.lexer.get_str(second);
            if self.symbols.lookup(&first_text).is_some() {
                // Method call on a variable: the object becomes the
                // implicit first argument.
                let sym = self.resolve(first)?;
                self.emit(Instruction::Push(sym.kind.segment(), sym.index));
                (format!("{}.{}", sym.typ, second_text), 1)
            } else {
                // Unknown as a variable, so a class name.
                (format!("{}.{}", first_text, second_text), 0)
            }
        } else {
            // Bare call: a method of the current class on `this`.
            self.emit(Instruction::Push(Segment::Pointer, 0));
            (format!("{}.{}", self.class_name, first_text), 1)
        };
        self.expect(Token::LeftParen)?;
        let args = self.parse_expr_list()?;
        self.expect(Token::RightParen)?;
        self.emit(Instruction::Call(target, implicit + args));
        Ok(())
    }

    /// Parse a possibly-empty comma-separated expression list,
    /// returning how many expressions were seen.
    fn parse_expr_list(&mut self) -> Result<u16> {
        self.xml.open("expressionList");
        let mut n = 0;
        if self.lexer.peek().kind != Token::RightParen {
            loop {
                self.parse_expr()?;
                n += 1;
                if self.lexer.peek().kind != Token::Comma {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        self.xml.close("expressionList");
        Ok(n)
    }

    // =========================================================================
    // Code emission
    // =========================================================================

    fn emit(&mut self, insn: Instruction) {
        self.code.push(insn);
    }

    /// Lower a string constant: allocate it, then append each
    /// character in turn.
    fn emit_string(&mut self, s: &str) {
        self.emit(Instruction::Push(Segment::Constant, s.chars().count() as u16));
        self.emit(Instruction::Call("String.new".to_string(), 1));
        for c in s.chars() {
            self.emit(Instruction::Push(Segment::Constant, c as u16));
            self.emit(Instruction::Call("String.appendChar".to_string(), 2));
        }
    }

    fn push_symbol(&mut self, name: Span<Token>) -> Result<()> {
        let sym = self.resolve(name)?;
        self.emit(Instruction::Push(sym.kind.segment(), sym.index));
        Ok(())
    }

    fn pop_symbol(&mut self, name: Span<Token>) -> Result<()> {
        let sym = self.resolve(name)?;
        self.emit(Instruction::Pop(sym.kind.segment(), sym.index));
        Ok(())
    }

    /// Resolve an identifier token against the symbol table,
    /// enforcing that fields are unreachable from a static function.
    fn resolve(&self, name: Span<Token>) -> Result<Symbol> {
        let text = self.lexer.get_str(name);
        match self.symbols.lookup(&text) {
            None => Err(self.error_at(name, ErrorCode::UndeclaredSymbol(text))),
            Some(sym) if sym.kind == Kind::Field && self.sub_kind == Token::Function => {
                Err(self.error_at(name, ErrorCode::FieldOutsideMethod(text)))
            }
            Some(sym) => Ok(sym.clone()),
        }
    }

    fn define(&mut self, at: Span<Token>, name: &str, typ: &str, kind: Kind) -> Result<()> {
        match self.symbols.define(name, typ, kind) {
            Ok(_) => Ok(()),
            Err(name) => Err(self.error_at(at, ErrorCode::DuplicateSymbol(name))),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Match a given token kind, recording its leaf in the parse
    /// tree.  A mismatch is a fatal parse error.
    fn expect(&mut self, kind: Token) -> Result<Span<Token>> {
        match self.lexer.snap(kind) {
            Ok(span) => {
                self.xml_leaf(span);
                Ok(span)
            }
            Err((want, found)) => {
                Err(self.error_at(found, ErrorCode::ExpectedToken(want, found.kind)))
            }
        }
    }

    /// Match any of the given token kinds.
    fn expect_any(&mut self, kinds: &[Token]) -> Result<Span<Token>> {
        let lookahead = self.lexer.peek();
        if kinds.contains(&lookahead.kind) {
            self.expect(lookahead.kind)
        } else {
            Err(self.error_at(
                lookahead,
                ErrorCode::ExpectedTokenIn(kinds.to_vec(), lookahead.kind),
            ))
        }
    }

    fn xml_leaf(&mut self, span: Span<Token>) {
        let text = match span.kind.text() {
            Some(s) => s.to_string(),
            None => self.lexer.get_str(span),
        };
        self.xml.leaf(span.kind.xml_tag(), &text);
    }

    fn error_at(&self, span: Span<Token>, code: ErrorCode) -> Error {
        Error {
            code,
            line: self.lexer.line_of(span),
        }
    }
}
