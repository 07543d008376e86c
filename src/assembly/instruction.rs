//! Decoded CIL instructions, their operands and the static facts about each opcode.
//!
//! # Key Components
//!
//! - [`Instruction`] - one decoded instruction, prefixes folded in
//! - [`Operand`] / [`Immediate`] - the inline operand
//! - [`FlowType`] - how control leaves the instruction
//! - [`Prefixes`] - `constrained.`, `no.`, `readonly.`, `tail.`, `unaligned.` and `volatile.`
//! - [`StackBehavior`] - fixed stack effect of the opcode

use std::fmt::{self, UpperHex};

use bitflags::bitflags;

use crate::metadata::token::Token;

/// Shape of the inline operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer (short branches, `ldc.i4.s`)
    Int8,
    /// Unsigned 8-bit integer (short argument and local indices)
    UInt8,
    /// Unsigned 16-bit integer (long argument and local indices)
    UInt16,
    /// Signed 32-bit integer (long branches, `ldc.i4`)
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Metadata token
    Token,
    /// Jump table: a 4-byte count and that many 4-byte offsets
    Switch,
}

impl OperandType {
    /// Byte size of the operand, `None` for the variable-length jump table.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// An inline immediate value.
#[derive(Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit integer
    Int8(i8),
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
}

impl Immediate {
    /// The value as a sign-extended integer, `None` for floats
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Immediate::Int8(value) => Some(i64::from(value)),
            Immediate::UInt8(value) => Some(i64::from(value)),
            Immediate::UInt16(value) => Some(i64::from(value)),
            Immediate::Int32(value) => Some(i64::from(value)),
            Immediate::Int64(value) => Some(value),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }

    /// The value as a float, `None` for integers
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Immediate::Float32(value) => Some(f64::from(value)),
            Immediate::Float64(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::UInt16(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:X}"),
            Immediate::UInt8(value) => write!(f, "{value:X}"),
            Immediate::UInt16(value) => write!(f, "{value:X}"),
            Immediate::Int32(value) => write!(f, "{value:X}"),
            Immediate::Int64(value) => write!(f, "{value:X}"),
            Immediate::Float32(value) => write!(f, "{:X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:X}", value.to_bits()),
        }
    }
}

/// The decoded inline operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// An immediate, also used for branch offsets and argument/local indices
    Immediate(Immediate),
    /// A metadata token
    Token(Token),
    /// Jump table offsets, relative to the end of the instruction
    Switch(Vec<i32>),
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Falls through or jumps to the target
    ConditionalBranch,
    /// Always jumps to the target
    UnconditionalBranch,
    /// Calls a method and falls through
    Call,
    /// Leaves the method or filter
    Return,
    /// Falls through or jumps to one of the table targets
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a finally or fault handler
    EndFinally,
    /// Leaves a protected region towards the target
    Leave,
}

/// Functional grouping of opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCategory {
    /// Numeric operations
    Arithmetic,
    /// Bit operations and shifts
    BitwiseLogical,
    /// Comparisons producing a boolean
    Comparison,
    /// Branches, calls, returns and exception flow
    ControlFlow,
    /// Numeric conversions
    Conversion,
    /// Loads and stores of arguments, locals, fields, elements and constants
    LoadStore,
    /// Allocation, casts, boxing and tokens
    ObjectModel,
    /// Prefixes modifying the following instruction
    Prefix,
    /// Compiler-internal opcodes
    Internal,
    /// Everything else
    Misc,
}

/// The fixed stack effect of an opcode.
///
/// Calls, `newobj`, `ret` and the other variable-arity opcodes report their fixed part only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Items consumed
    pub pops: u8,
    /// Items produced
    pub pushes: u8,
    /// `pushes - pops`
    pub net_effect: i8,
}

bitflags! {
    /// Prefixes that applied to an instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Prefixes: u16 {
        /// `constrained.` with the token in [`Instruction::constrained`]
        const CONSTRAINED = 0x0001;
        /// `no. typecheck`
        const NO_TYPECHECK = 0x0002;
        /// `no. rangecheck`
        const NO_RANGECHECK = 0x0004;
        /// `no. nullcheck`
        const NO_NULLCHECK = 0x0008;
        /// `readonly.`
        const READONLY = 0x0010;
        /// `tail.`
        const TAIL = 0x0020;
        /// `unaligned.` with the alignment in [`Instruction::alignment`]
        const UNALIGNED = 0x0040;
        /// `volatile.`
        const VOLATILE = 0x0080;
    }
}

/// A decoded instruction.
///
/// `offset` and `size` cover the prefixes as well, so `offset + size` is always the offset of
/// the next instruction.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the first byte, prefixes included
    pub offset: u32,
    /// Size in bytes, prefixes and operand included
    pub size: u32,
    /// Escape byte, `0xFE`, `0xFD` or 0 for single-byte opcodes
    pub prefix: u8,
    /// The opcode byte after the escape
    pub opcode: u8,
    /// Mnemonic, e.g. `ldarg.0`
    pub mnemonic: &'static str,
    /// Functional group
    pub category: InstructionCategory,
    /// Control flow class
    pub flow_type: FlowType,
    /// Inline operand
    pub operand: Operand,
    /// Fixed stack effect
    pub stack_behavior: StackBehavior,
    /// Prefixes seen before the opcode
    pub prefixes: Prefixes,
    /// Type token of a `constrained.` prefix
    pub constrained: Option<Token>,
    /// Alignment of an `unaligned.` prefix
    pub alignment: Option<u8>,
    /// Absolute offsets of branch targets, switch entries in table order
    pub branch_targets: Vec<u32>,
}

impl Instruction {
    /// The full opcode, escape byte in the high byte
    #[must_use]
    pub fn code(&self) -> u16 {
        (u16::from(self.prefix) << 8) | u16::from(self.opcode)
    }

    /// Offset of the instruction that follows
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// True if the instruction transfers control somewhere other than the next instruction
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// True if control never falls through to the next instruction
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Offsets control may continue at, in successor order.
    ///
    /// Conditional branches list the fallthrough first and the target second. A switch lists
    /// the fallthrough (its default) first, then one entry per table slot in table order, so
    /// a table of `n` entries gives `n + 1` successors. The lowering patch pass reads labels
    /// back in this order: index 0 is the false target or default, the rest are taken targets.
    #[must_use]
    pub fn successors(&self) -> Vec<u32> {
        match self.flow_type {
            FlowType::Sequential | FlowType::Call => vec![self.next_offset()],
            FlowType::ConditionalBranch | FlowType::Switch => {
                let mut successors = Vec::with_capacity(self.branch_targets.len() + 1);
                successors.push(self.next_offset());
                successors.extend_from_slice(&self.branch_targets);
                successors
            }
            FlowType::UnconditionalBranch | FlowType::Leave => self.branch_targets.clone(),
            FlowType::Return | FlowType::Throw | FlowType::EndFinally => Vec::new(),
        }
    }

    /// The token operand
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// The integer immediate, sign-extended
    #[must_use]
    pub fn integer(&self) -> Option<i64> {
        match &self.operand {
            Operand::Immediate(value) => value.as_i64(),
            _ => None,
        }
    }

    /// The float immediate
    #[must_use]
    pub fn float(&self) -> Option<f64> {
        match &self.operand {
            Operand::Immediate(value) => value.as_f64(),
            _ => None,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X} - ", self.offset)?;
        if self.prefix != 0 {
            write!(f, "{:02X}:", self.prefix)?;
        }
        write!(f, "{:02X} - {:<12}", self.opcode, self.mnemonic)?;

        if !self.prefixes.is_empty() {
            write!(f, " [{:?}]", self.prefixes)?;
        }

        match &self.operand {
            Operand::None => {}
            Operand::Immediate(value) => write!(f, " {value:?}")?,
            Operand::Token(token) => write!(f, " token:0x{:08X}", token.value())?,
            Operand::Switch(items) => write!(f, " switch[{}]", items.len())?,
        }

        if !self.branch_targets.is_empty() {
            write!(f, " ->")?;
            for target in &self.branch_targets {
                write!(f, " IL_{target:04X}")?;
            }
        }

        Ok(())
    }
}
