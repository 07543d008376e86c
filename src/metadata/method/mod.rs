//! Method bodies and method attribute flags.

mod body;
mod exceptions;
mod types;

pub use body::{MethodBody, TINY_MAX_STACK};
pub use exceptions::{ClauseKind, ExceptionClause, ExceptionHandlerFlags};
pub use types::*;
