//! CIL bytecode: opcode tables, instruction decoding and the per-method instruction graph.
//!
//! # Key Components
//!
//! - [`opcodes`] - opcode byte constants
//! - [`instructions`] - the single-byte, `0xFE` and internal `0xFD` opcode tables
//! - [`decode_instruction`] / [`decode_stream`] - the decoder
//! - [`CilGraph`] - linked instruction nodes of one method body
//!
//! # Examples
//!
//! ```rust
//! use cilfront::assembly::CilGraph;
//!
//! // ldarg.0; ldc.i4.1; add; ret
//! let graph = CilGraph::build(&[0x02, 0x17, 0x58, 0x2A], &[], false)?;
//! assert_eq!(graph.len(), 4);
//! assert_eq!(graph.roots(), [0]);
//! # Ok::<(), cilfront::Error>(())
//! ```

mod decoder;
mod graph;
mod instruction;
pub mod instructions;
pub mod opcodes;

pub use decoder::{decode_instruction, decode_stream};
pub use graph::{CilGraph, CilNode, NodeIndex};
pub use instruction::{
    FlowType, Immediate, Instruction, InstructionCategory, Operand, OperandType, Prefixes,
    StackBehavior,
};
pub use instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FD, INSTRUCTIONS_FE};
