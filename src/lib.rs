//! OakScript: a small imperative scripting language with a three-stage
//! pipeline — a source-to-bytecode compiler, a portable bytecode container,
//! and a stack-based virtual machine that executes it.
//!
//! # Example
//!
//! ```
//! let container = oakscript::compile("print 1 + 2 * 3\n").unwrap();
//! let mut vm = oakscript::OakVm::new(container).unwrap();
//! vm.run().unwrap();
//! ```
//!
//! # Pipeline
//!
//! - [`lexer`] turns source text into a token stream; [`include`] layers
//!   `#include` expansion on top of it.
//! - [`parser`] drives [`emitter`] directly in a single recursive-descent
//!   pass (no persisted syntax tree).
//! - [`container`] serializes/deserializes the compiled program: a 20-byte
//!   header, a code section, and a string-data section.
//! - [`vm`] interprets the code section: operand stack, variable table,
//!   built-in registry ([`builtins`]), call stack, and exception handlers.
//!
//! [`value::Value`] is the dynamically-typed value model shared by the
//! emitter's constant pool and the VM's operand stack. [`error`] collects
//! the `thiserror` types raised by each stage.

pub mod builtins;
pub mod container;
pub mod emitter;
pub mod error;
mod include;
mod lexer;
pub mod opcode;
pub mod parser;
pub mod token;
pub mod value;
pub mod vm;

pub use container::Container;
pub use error::{CompileError, RuntimeError};
pub use vm::OakVm;

/// Compile OakScript source straight into a loadable [`Container`]. This is
/// the in-memory path the `run` subcommand uses (no file round-trip); the
/// `compile` subcommand additionally serializes the result with
/// [`Container::to_bytes`].
pub fn compile(source: &str) -> Result<Container, CompileError> {
    let (code, data) = parser::compile(source)?;
    Ok(Container::new(code, data))
}
