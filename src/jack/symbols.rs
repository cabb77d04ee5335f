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

use crate::vm::Segment;

// ============================================================================
// Symbol
// ============================================================================

/// The four storage kinds a Jack variable can have.  `Static` and
/// `Field` live in class scope; `Argument` and `Local` live in
/// subroutine scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Static,
    Field,
    Argument,
    Local,
}

impl Kind {
    /// The VM segment this kind of variable is pushed from / popped
    /// to.
    pub fn segment(self) -> Segment {
        match self {
            Kind::Static => Segment::Static,
            Kind::Field => Segment::This,
            Kind::Argument => Segment::Argument,
            Kind::Local => Segment::Local,
        }
    }
}

/// A single symbol table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub typ: String,
    pub kind: Kind,
    pub index: u16,
}

// ============================================================================
// Symbol Table
// ============================================================================

/// The compiler's two-level scoped symbol table.  Exactly two scopes
/// exist at any time: the class scope and the (current) subroutine
/// scope.  Lookup tries the subroutine scope first.  Indices are
/// assigned sequentially per `(scope, kind)` pair, starting at zero.
pub struct SymbolTable {
    class_scope: HashMap<String, Symbol>,
    subroutine_scope: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            class_scope: HashMap::new(),
            subroutine_scope: HashMap::new(),
        }
    }

    /// Reset the subroutine scope.  Called at the start of each
    /// subroutine declaration; the class scope persists.
    pub fn start_subroutine(&mut self) {
        self.subroutine_scope.clear();
    }

    /// Define a new symbol, assigning it the next index for its kind.
    /// Redefinition within the owning scope is an error, reported by
    /// returning the existing entry's name.
    pub fn define(&mut self, name: &str, typ: &str, kind: Kind) -> Result<u16, String> {
        let index = self.count(kind);
        let scope = match kind {
            Kind::Static | Kind::Field => &mut self.class_scope,
            Kind::Argument | Kind::Local => &mut self.subroutine_scope,
        };
        if scope.contains_key(name) {
            return Err(name.to_string());
        }
        let symbol = Symbol {
            name: name.to_string(),
            typ: typ.to_string(),
            kind,
            index,
        };
        scope.insert(name.to_string(), symbol);
        Ok(index)
    }

    /// Look a name up, trying the subroutine scope before the class
    /// scope.  First defined name wins within a scope.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.subroutine_scope
            .get(name)
            .or_else(|| self.class_scope.get(name))
    }

    /// Count the symbols of a given kind in its owning scope.
    pub fn count(&self, kind: Kind) -> u16 {
        let scope = match kind {
            Kind::Static | Kind::Field => &self.class_scope,
            Kind::Argument | Kind::Local => &self.subroutine_scope,
        };
        scope.values().filter(|s| s.kind == kind).count() as u16
    }
}

// ============================================================================
// Tests
// ============================================================================
