//! The directive language.
//!
//! Directive code is compiled from a lowered source unit (see
//! [`crate::transform`]) into a small AST and run by a tree-walking
//! interpreter:
//!
//! - expressions over JSON values with PHP-flavoured operators
//! - `if`/`elseif`/`else`, `for`, `foreach` and `while` blocks, in colon
//!   (`if $x: ... endif`) or brace (`if ($x) { ... }`) form
//! - a handful of built-in functions (`count`, `escape`, `range`, ...)
//!
//! Variables are looked up by name in an explicit [`Scope`]; the `$` sigil is
//! optional.
//!
//! ```rust
//! use brace_template::script::{compile, run, Scope};
//!
//! let program = compile("<?tpl for (i=0;i<3;i++): ?><?tpl= i ?>,<?tpl end ?>").unwrap();
//! assert_eq!(run(&program, Scope::new()).unwrap(), "0,1,2,");
//! ```

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

use thiserror::Error;

pub use ast::Program;
pub use interp::{run, Scope};

/// A compile or runtime fault in directive code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} on line {line}")]
pub struct Fault {
    pub message: String,
    /// 1-based line in the source unit
    pub line: usize,
}

impl Fault {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// Compile a lowered source unit.
pub fn compile(unit: &str) -> Result<Program, Fault> {
    parser::parse(lexer::tokenize(unit)?)
}
