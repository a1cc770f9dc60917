use std::fmt;

use crate::value::Value;

/// The classes of recoverable error a primitive or the evaluator can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NumExpected,
    SymExpected,
    PairExpected,
    AtomExpected,
    ListExpected,
    VarExpected,
    Protected,
    Undefined,
    Arg,
    Overflow,
    DivZero,
    Read,
    Io,
    StackOverflow,
    /// Raised by `(quit ...)`; carries its own message.
    Quit,
    TagNotFound,
    NotMaking,
}

impl ErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::NumExpected => "Number expected",
            ErrorKind::SymExpected => "Symbol expected",
            ErrorKind::PairExpected => "Cell expected",
            ErrorKind::AtomExpected => "Atom expected",
            ErrorKind::ListExpected => "List expected",
            ErrorKind::VarExpected => "Variable expected",
            ErrorKind::Protected => "Protected symbol",
            ErrorKind::Undefined => "Undefined",
            ErrorKind::Arg => "Bad argument",
            ErrorKind::Overflow => "Number overflow",
            ErrorKind::DivZero => "Div/0",
            ErrorKind::Read => "Bad input",
            ErrorKind::Io => "I/O error",
            ErrorKind::StackOverflow => "Stack overflow",
            ErrorKind::Quit => "Quit",
            ErrorKind::TagNotFound => "Tag not found",
            ErrorKind::NotMaking => "Not making",
        }
    }
}

/// Everything that can leave an evaluation early.
///
/// Only `Error` is an error in the Lisp sense and can be caught by a
/// message-matching `catch`. `Throw` is a non-local exit, `HeapExhausted`
/// is fatal and `Bye` asks the driver to terminate.
#[derive(Debug, Clone)]
pub enum LispError {
    Error {
        kind: ErrorKind,
        /// The offending expression, if known.
        ex: Option<Value>,
        /// The offending value, if any.
        x: Option<Value>,
        msg: String,
    },
    Throw {
        tag: Value,
        value: Value,
    },
    HeapExhausted {
        segments: usize,
    },
    Bye(i32),
}

impl LispError {
    /// An error of `kind` with its standard message.
    pub fn new(kind: ErrorKind, ex: Option<Value>, x: Option<Value>) -> Self {
        LispError::Error {
            kind,
            ex,
            x,
            msg: kind.message().to_string(),
        }
    }

    /// An error with a message of its own.
    pub fn with_msg(kind: ErrorKind, ex: Option<Value>, x: Option<Value>, msg: impl Into<String>) -> Self {
        LispError::Error {
            kind,
            ex,
            x,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LispError::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether no catch frame may ever intercept this.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LispError::HeapExhausted { .. } | LispError::Bye(_))
    }
}

impl fmt::Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LispError::Error { msg, .. } => write!(f, "{}", msg),
            LispError::Throw { .. } => write!(f, "{}", ErrorKind::TagNotFound.message()),
            LispError::HeapExhausted { segments } => {
                write!(f, "No memory ({} segments in use)", segments)
            }
            LispError::Bye(code) => write!(f, "bye {}", code),
        }
    }
}

impl std::error::Error for LispError {}

pub type Result<T> = std::result::Result<T, LispError>;
