//! Structured error types for each pipeline stage.
//!
//! `anyhow` stays at the binary edge (see `src/main.rs`); each pipeline
//! stage gets a precise `thiserror` type here instead, so callers can match
//! on the specific failure rather than format a string.

use crate::value::Value;
use thiserror::Error;

/// Errors raised while turning source text into tokens.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },
    #[error("line {line}: invalid escape sequence '\\{ch}'")]
    InvalidEscape { line: u32, ch: char },
    #[error("line {line}: unknown character '{ch}'")]
    UnknownChar { line: u32, ch: char },
    #[error("line {line}: numeric literal '{text}' does not fit its type")]
    NumberOverflow { line: u32, text: String },
    #[error("line {line}: #include cycle detected for '{path}'")]
    IncludeCycle { line: u32, path: String },
    #[error("line {line}: could not read included file '{path}': {reason}")]
    IncludeIo {
        line: u32,
        path: String,
        reason: String,
    },
}

/// Errors raised while parsing a token stream into a syntax-free emission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unexpected token: {found}")]
    UnexpectedToken { line: u32, found: String },
    #[error("line {line}: expected {expected}, found {found}")]
    Expected {
        line: u32,
        expected: String,
        found: String,
    },
}

/// Errors raised by the emitter while lowering statements to bytecode.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmitError {
    #[error("line {line}: 'break' used outside of a loop")]
    BreakOutsideLoop { line: u32 },
    #[error("line {line}: 'continue' used outside of a loop")]
    ContinueOutsideLoop { line: u32 },
    #[error("line {line}: 'return' used outside of a function")]
    ReturnOutsideFunction { line: u32 },
    #[error("line {line}: cannot reassign const '{name}'")]
    ConstReassign { line: u32, name: String },
    #[error("line {line}: function '{name}' is already defined")]
    DuplicateFunction { line: u32, name: String },
    #[error("line {line}: call to undefined function '{name}'")]
    UndefinedFunction { line: u32, name: String },
    #[error("internal: label {0} was never bound")]
    UnboundLabel(u32),
}

/// Errors raised while reading a bytecode container from bytes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContainerError {
    #[error("bad magic: expected 'OAKSCODE'")]
    BadMagic,
    #[error("unsupported format version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("truncated header: file is only {0} bytes")]
    TruncatedHeader(usize),
    #[error("declared code size {declared} does not fit remaining {remaining} bytes")]
    CodeSizeOverflow { declared: u32, remaining: usize },
    #[error("declared data size {declared} does not fit remaining {remaining} bytes")]
    DataSizeOverflow { declared: u32, remaining: usize },
    #[error("data record at offset {offset} overruns the data section")]
    DataRecordOverrun { offset: usize },
    #[error("data record is not valid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

/// The distinguishable kinds of runtime error, per the specification's
/// error-kind table. `StackOverflow`, `CallStackOverflow`, and `Abort` are
/// fatal: the VM never routes them into a `try`/`catch` handler.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("line {line}: type error: {message}")]
    Type { message: String, line: u32 },
    #[error("line {line}: division by zero")]
    DivisionByZero { line: u32 },
    #[error("line {line}: name error: {message}")]
    Name { message: String, line: u32 },
    #[error("line {line}: index error: {message}")]
    Index { message: String, line: u32 },
    #[error("line {line}: uncaught exception")]
    UserThrown { value: Value, line: u32 },
    #[error("operand stack overflow")]
    StackOverflow,
    #[error("call stack overflow")]
    CallStackOverflow,
    #[error("execution aborted by host")]
    Abort,
}

impl RuntimeError {
    /// Whether this error kind may be intercepted by a `try`/`catch` block.
    /// `StackOverflow`, `CallStackOverflow`, and `Abort` always propagate to
    /// the host.
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            RuntimeError::StackOverflow | RuntimeError::CallStackOverflow | RuntimeError::Abort
        )
    }

    /// The value a `catch` block sees for this error (its caught form).
    pub fn as_caught_value(&self) -> Value {
        match self {
            RuntimeError::UserThrown { value, .. } => value.clone(),
            other => Value::String(other.to_string().into()),
        }
    }
}

/// Top-level compilation failure, wrapping whichever stage raised it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error(transparent)]
    Container(#[from] ContainerError),
}
