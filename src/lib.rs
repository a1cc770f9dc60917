//! A small PicoLisp-style interpreter core.
//!
//! One [`Machine`] owns the whole interpreter state: a segmented cell heap,
//! the symbol table, the binding and catch stacks, the I/O frame chain and
//! the installed primitives. Values are single tagged words ([`Value`]).

pub mod bind;
pub mod catch;
pub mod config;
pub mod error;
pub mod eval;
pub mod heap;
pub mod io;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod symbol;
pub mod value;

pub use config::Config;
pub use error::{ErrorKind, LispError, Result};
pub use eval::Machine;
pub use heap::HeapStats;
pub use io::{InFrame, OutFrame};
pub use primitives::{Evaluation, NativeFn, PrimitiveTable};
pub use value::{Kind, Value};
