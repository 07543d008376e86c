//! Lowering of CIL method bodies to three-address code.
//!
//! The encoder walks a method's [`crate::assembly::CilGraph`], tracking the type of every
//! evaluation stack entry, and emits [`Tac`] instructions over typed virtual variables. Stack
//! entries live in one variable per depth, so the code needs no phi nodes at control flow joins
//! as long as the joining stack states agree, which the encoder verifies.
//!
//! # Key Components
//!
//! - [`lower_method`] - lower one [`crate::metadata::typesystem::MethodToCompile`]
//! - [`Tac`] / [`LoweredMethod`] - the output IR
//! - [`EvalStack`] / [`StackType`] - the abstract evaluation stack
//!
//! `newobj` and `isinst` are rewritten into simpler steps before encoding, using the
//! compiler-internal opcodes of [`crate::assembly::INSTRUCTIONS_FD`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilfront::{lowering::lower_method, CompileOptions, Session};
//!
//! let session = Session::new(CompileOptions::default());
//! let app = session.load_file(std::path::Path::new("App.exe"))?;
//! if let Some(main) = session.entry_point(app)? {
//!     let lowered = lower_method(&session, &main)?;
//!     println!("{lowered}");
//! }
//! # Ok::<(), cilfront::Error>(())
//! ```

mod decompose;
mod encoder;
mod rules;
mod stack;
mod tac;

pub use encoder::lower_method;
pub use stack::EvalStack;
pub use tac::{
    BinaryOp, Callee, CompareOp, ConstValue, Label, LoweredInstruction, LoweredMethod,
    RuntimeHandle, StackType, Tac, UnaryOp, Var,
};
