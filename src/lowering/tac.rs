//! The three-address-code instructions produced by lowering.
//!
//! All operations use the following naming conventions for their fields:
//! - `dest`: the variable being written
//! - `left`, `right`: operands of binary operations
//! - `operand`: the operand of unary operations and conversions
//! - `value`: a value being stored, returned or thrown
//! - `object`: an object reference (field access, casts)
//! - `array`, `index`: array element access
//! - `addr`: a managed or unmanaged address
//! - `target`, `true_target`, `false_target`: branch labels
//! - `unsigned`: the unsigned form of the operation
//! - `overflow_check`: the operation throws on overflow
//!
//! Operands are [`Var`]s. Constants are first materialised into a variable with [`Tac::Const`].
//! Evaluation stack entries become one variable per stack depth ([`Var::Stack`]), so control flow
//! joins always agree on where a value lives.

#![allow(missing_docs)]

use std::fmt;

use widestring::U16String;

use crate::metadata::{
    signatures::{ElementType, TypeSig},
    typesystem::{FieldToCompile, MethodToCompile},
};

/// Type of an evaluation stack entry, as the CLI verifier tracks it (ECMA-335 III.1.1).
///
/// Small integers widen to `Int32`, `float32` and `float64` share `F`. Object references of any
/// class are `O`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StackType {
    /// int32, and every integer type narrower than 32 bits
    Int32,
    /// int64
    Int64,
    /// native int, unmanaged pointers and function pointers
    NativeInt,
    /// floating point
    F,
    /// object reference
    O,
    /// managed reference (`&`)
    Ref,
    /// a value type instance
    ValueType(TypeSig),
}

impl StackType {
    /// True for `Int32`, `Int64` and `NativeInt`
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, StackType::Int32 | StackType::Int64 | StackType::NativeInt)
    }
}

impl fmt::Display for StackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackType::Int32 => write!(f, "int32"),
            StackType::Int64 => write!(f, "int64"),
            StackType::NativeInt => write!(f, "native int"),
            StackType::F => write!(f, "F"),
            StackType::O => write!(f, "O"),
            StackType::Ref => write!(f, "&"),
            StackType::ValueType(ty) => write!(f, "valuetype {ty}"),
        }
    }
}

/// A virtual variable of the lowered method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Var {
    /// Argument slot, `this` is slot 0 of instance methods
    Arg(u16),
    /// Local variable slot
    Local(u16),
    /// Evaluation stack entry at the given depth
    Stack(u16),
    /// Compiler temporary
    Temp(u32),
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Arg(index) => write!(f, "arg{index}"),
            Var::Local(index) => write!(f, "loc{index}"),
            Var::Stack(depth) => write!(f, "st{depth}"),
            Var::Temp(index) => write!(f, "t{index}"),
        }
    }
}

/// A block label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

impl Label {
    /// Branch target not yet patched
    pub const PENDING: Label = Label(u32::MAX);
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Label::PENDING {
            write!(f, "L?")
        } else {
            write!(f, "L{}", self.0)
        }
    }
}

/// Constant values materialised by [`Tac::Const`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    F64(f64),
    Null,
    /// A `ldstr` literal
    String(U16String),
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Comparison operators of `ceq`/`cgt`/`clt` and the conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Target of `ldtoken`.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeHandle {
    Type(TypeSig),
    Method(MethodToCompile),
    Field(FieldToCompile),
}

/// A method referenced by a call or function pointer load.
#[derive(Debug, Clone, PartialEq)]
pub struct Callee {
    /// The resolved method
    pub method: MethodToCompile,
    /// Symbol name of its code
    pub symbol: String,
}

/// One three-address-code instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Tac {
    // ========================================================================
    // Pseudo Instructions
    // ========================================================================
    /// Start of a block that is a branch target or a graph root
    Label(Label),

    /// Incoming argument at method entry
    ArgIn { index: u16, ty: TypeSig },

    /// Local variable slot at method entry
    LocalIn { index: u16, ty: TypeSig },

    /// Exception object at the start of a catch handler or filter: `dest = exception`
    ExceptionIn { dest: Var, ty: TypeSig },

    /// Zero initialisation: `dest = default(ty)`
    Zero { dest: Var, ty: TypeSig },

    // ========================================================================
    // Data Movement
    // ========================================================================
    /// `dest = value`
    Const { dest: Var, value: ConstValue },

    /// `dest = src`
    Move { dest: Var, src: Var, ty: StackType },

    /// `dest = &source`
    AddressOf { dest: Var, source: Var },

    /// Value discarded from the stack
    Pop { value: Var },

    // ========================================================================
    // Arithmetic
    // ========================================================================
    /// `dest = left op right`
    Binary {
        dest: Var,
        op: BinaryOp,
        left: Var,
        right: Var,
        ty: StackType,
        unsigned: bool,
        overflow_check: bool,
    },

    /// `dest = op operand`
    Unary {
        dest: Var,
        op: UnaryOp,
        operand: Var,
        ty: StackType,
    },

    /// `dest = left op right ? 1 : 0`
    Compare {
        dest: Var,
        op: CompareOp,
        left: Var,
        right: Var,
        ty: StackType,
        unsigned: bool,
    },

    /// `dest = (target)operand`
    Conv {
        dest: Var,
        operand: Var,
        from: StackType,
        target: ElementType,
        unsigned: bool,
        overflow_check: bool,
    },

    // ========================================================================
    // Control Flow
    // ========================================================================
    /// Unconditional jump
    Branch { target: Label },

    /// Jump to `true_target` if `left op right` holds, to `false_target` otherwise.
    ///
    /// Without `right` the operand is compared against zero or null.
    BranchIf {
        op: CompareOp,
        left: Var,
        right: Option<Var>,
        ty: StackType,
        unsigned: bool,
        true_target: Label,
        false_target: Label,
    },

    /// Jump to `targets[value]`, or to `default` if out of range
    Switch {
        value: Var,
        targets: Vec<Label>,
        default: Label,
    },

    /// Return from the method
    Return { value: Option<Var> },

    // ========================================================================
    // Calls
    // ========================================================================
    /// `dest = callee(args...)`, `args[0]` is the receiver of instance methods
    Call {
        dest: Option<Var>,
        callee: Callee,
        args: Vec<Var>,
        virtual_call: bool,
        constrained: Option<TypeSig>,
        tail: bool,
    },

    /// `dest = &callee`, through the vtable of `object` when present
    LoadFunction {
        dest: Var,
        callee: Callee,
        object: Option<Var>,
    },

    // ========================================================================
    // Fields
    // ========================================================================
    /// `dest = object.field`
    LoadField {
        dest: Var,
        object: Var,
        field: FieldToCompile,
    },

    /// `object.field = value`
    StoreField {
        object: Var,
        field: FieldToCompile,
        value: Var,
    },

    /// `dest = &object.field`
    LoadFieldAddr {
        dest: Var,
        object: Var,
        field: FieldToCompile,
    },

    /// `dest = Owner.field`
    LoadStaticField { dest: Var, field: FieldToCompile },

    /// `Owner.field = value`
    StoreStaticField { field: FieldToCompile, value: Var },

    /// `dest = &Owner.field`
    LoadStaticFieldAddr { dest: Var, field: FieldToCompile },

    // ========================================================================
    // Indirect Memory Access
    // ========================================================================
    /// `dest = *addr`
    LoadIndirect { dest: Var, addr: Var, ty: TypeSig },

    /// `*addr = value`
    StoreIndirect { addr: Var, value: Var, ty: TypeSig },

    /// `*addr = default(ty)`
    InitObj { addr: Var, ty: TypeSig },

    /// `dest = stackalloc(size)`
    LocalAlloc { dest: Var, size: Var },

    // ========================================================================
    // Object Model
    // ========================================================================
    /// `dest = new ty` without running a constructor
    Alloc { dest: Var, ty: TypeSig },

    /// `dest = (object)value`
    Box { dest: Var, value: Var, ty: TypeSig },

    /// `dest = (ty)object`, copying the value out
    UnboxAny { dest: Var, object: Var, ty: TypeSig },

    /// `dest = (ty)object`; throws on failure if `throws`, yields null otherwise
    Cast {
        dest: Var,
        object: Var,
        ty: TypeSig,
        throws: bool,
    },

    /// `dest = sizeof(ty)`
    SizeOf { dest: Var, ty: TypeSig },

    /// `dest = handle`
    LoadToken { dest: Var, handle: RuntimeHandle },

    // ========================================================================
    // Arrays
    // ========================================================================
    /// `dest = new elem[length]`
    NewArray { dest: Var, elem: TypeSig, length: Var },

    /// `dest = array.Length`
    ArrayLength { dest: Var, array: Var },

    /// `dest = array[index]`
    LoadElement {
        dest: Var,
        array: Var,
        index: Var,
        elem: TypeSig,
    },

    /// `array[index] = value`
    StoreElement {
        array: Var,
        index: Var,
        value: Var,
        elem: TypeSig,
    },

    /// `dest = &array[index]`
    LoadElementAddr {
        dest: Var,
        array: Var,
        index: Var,
        elem: TypeSig,
    },

    // ========================================================================
    // Exceptions
    // ========================================================================
    /// `throw value`
    Throw { value: Var },

    /// Rethrow the exception of the enclosing catch handler
    Rethrow,

    /// Leave a protected region, running finally handlers on the way
    Leave { target: Label },

    /// End of a finally or fault handler
    EndFinally,

    /// End of a filter, `value` nonzero selects the handler
    EndFilter { value: Var },

    // ========================================================================
    // Miscellaneous
    // ========================================================================
    Nop,

    /// Debugger breakpoint
    Break,
}

impl Tac {
    /// True for the instructions whose targets the label pass patches
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Tac::Branch { .. } | Tac::BranchIf { .. } | Tac::Switch { .. } | Tac::Leave { .. }
        )
    }

    /// The variable written, if any
    #[must_use]
    pub fn dest(&self) -> Option<Var> {
        match self {
            Tac::ExceptionIn { dest, .. }
            | Tac::Zero { dest, .. }
            | Tac::Const { dest, .. }
            | Tac::Move { dest, .. }
            | Tac::AddressOf { dest, .. }
            | Tac::Binary { dest, .. }
            | Tac::Unary { dest, .. }
            | Tac::Compare { dest, .. }
            | Tac::Conv { dest, .. }
            | Tac::LoadFunction { dest, .. }
            | Tac::LoadField { dest, .. }
            | Tac::LoadFieldAddr { dest, .. }
            | Tac::LoadStaticField { dest, .. }
            | Tac::LoadStaticFieldAddr { dest, .. }
            | Tac::LoadIndirect { dest, .. }
            | Tac::LocalAlloc { dest, .. }
            | Tac::Alloc { dest, .. }
            | Tac::Box { dest, .. }
            | Tac::UnboxAny { dest, .. }
            | Tac::Cast { dest, .. }
            | Tac::SizeOf { dest, .. }
            | Tac::LoadToken { dest, .. }
            | Tac::NewArray { dest, .. }
            | Tac::ArrayLength { dest, .. }
            | Tac::LoadElement { dest, .. }
            | Tac::LoadElementAddr { dest, .. } => Some(*dest),
            Tac::Call { dest, .. } => *dest,
            _ => None,
        }
    }
}

impl fmt::Display for Tac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tac::Label(label) => write!(f, "{label}:"),
            Tac::ArgIn { index, ty } => write!(f, "arg{index} : {ty}"),
            Tac::LocalIn { index, ty } => write!(f, "loc{index} : {ty}"),
            Tac::ExceptionIn { dest, ty } => write!(f, "{dest} = catch {ty}"),
            Tac::Zero { dest, ty } => write!(f, "{dest} = default({ty})"),
            Tac::Const { dest, value } => match value {
                ConstValue::I32(v) => write!(f, "{dest} = {v}"),
                ConstValue::I64(v) => write!(f, "{dest} = {v}L"),
                ConstValue::F64(v) => write!(f, "{dest} = {v:?}"),
                ConstValue::Null => write!(f, "{dest} = null"),
                ConstValue::String(s) => write!(f, "{dest} = \"{}\"", s.to_string_lossy()),
            },
            Tac::Move { dest, src, .. } => write!(f, "{dest} = {src}"),
            Tac::AddressOf { dest, source } => write!(f, "{dest} = &{source}"),
            Tac::Pop { value } => write!(f, "pop {value}"),
            Tac::Binary {
                dest,
                op,
                left,
                right,
                ..
            } => write!(f, "{dest} = {left} {op:?} {right}"),
            Tac::Unary { dest, op, operand, .. } => write!(f, "{dest} = {op:?} {operand}"),
            Tac::Compare {
                dest,
                op,
                left,
                right,
                ..
            } => write!(f, "{dest} = {left} {op:?} {right}"),
            Tac::Conv {
                dest,
                operand,
                target,
                ..
            } => write!(f, "{dest} = ({target:?}){operand}"),
            Tac::Branch { target } => write!(f, "br {target}"),
            Tac::BranchIf {
                op,
                left,
                right,
                true_target,
                false_target,
                ..
            } => match right {
                Some(right) => write!(
                    f,
                    "if {left} {op:?} {right} goto {true_target} else {false_target}"
                ),
                None => write!(f, "if {left} {op:?} 0 goto {true_target} else {false_target}"),
            },
            Tac::Switch {
                value,
                targets,
                default,
            } => {
                write!(f, "switch {value} [")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target}")?;
                }
                write!(f, "] else {default}")
            }
            Tac::Return { value: Some(value) } => write!(f, "ret {value}"),
            Tac::Return { value: None } => write!(f, "ret"),
            Tac::Call {
                dest, callee, args, ..
            } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {}(", callee.symbol)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Tac::LoadFunction { dest, callee, .. } => write!(f, "{dest} = &{}", callee.symbol),
            Tac::LoadField {
                dest,
                object,
                field,
            } => write!(f, "{dest} = {object}.{}", field.name),
            Tac::StoreField {
                object,
                field,
                value,
            } => write!(f, "{object}.{} = {value}", field.name),
            Tac::LoadFieldAddr {
                dest,
                object,
                field,
            } => write!(f, "{dest} = &{object}.{}", field.name),
            Tac::LoadStaticField { dest, field } => {
                write!(f, "{dest} = {}::{}", field.owner, field.name)
            }
            Tac::StoreStaticField { field, value } => {
                write!(f, "{}::{} = {value}", field.owner, field.name)
            }
            Tac::LoadStaticFieldAddr { dest, field } => {
                write!(f, "{dest} = &{}::{}", field.owner, field.name)
            }
            Tac::LoadIndirect { dest, addr, .. } => write!(f, "{dest} = *{addr}"),
            Tac::StoreIndirect { addr, value, .. } => write!(f, "*{addr} = {value}"),
            Tac::InitObj { addr, ty } => write!(f, "*{addr} = default({ty})"),
            Tac::LocalAlloc { dest, size } => write!(f, "{dest} = localloc {size}"),
            Tac::Alloc { dest, ty } => write!(f, "{dest} = alloc {ty}"),
            Tac::Box { dest, value, ty } => write!(f, "{dest} = box {ty} {value}"),
            Tac::UnboxAny { dest, object, ty } => write!(f, "{dest} = unbox {ty} {object}"),
            Tac::Cast {
                dest, object, ty, ..
            } => write!(f, "{dest} = ({ty}){object}"),
            Tac::SizeOf { dest, ty } => write!(f, "{dest} = sizeof({ty})"),
            Tac::LoadToken { dest, handle } => match handle {
                RuntimeHandle::Type(ty) => write!(f, "{dest} = token {ty}"),
                RuntimeHandle::Method(method) => write!(f, "{dest} = token {}", method.name),
                RuntimeHandle::Field(field) => write!(f, "{dest} = token {}", field.name),
            },
            Tac::NewArray { dest, elem, length } => write!(f, "{dest} = new {elem}[{length}]"),
            Tac::ArrayLength { dest, array } => write!(f, "{dest} = {array}.Length"),
            Tac::LoadElement {
                dest, array, index, ..
            } => write!(f, "{dest} = {array}[{index}]"),
            Tac::StoreElement {
                array,
                index,
                value,
                ..
            } => write!(f, "{array}[{index}] = {value}"),
            Tac::LoadElementAddr {
                dest, array, index, ..
            } => write!(f, "{dest} = &{array}[{index}]"),
            Tac::Throw { value } => write!(f, "throw {value}"),
            Tac::Rethrow => write!(f, "rethrow"),
            Tac::Leave { target } => write!(f, "leave {target}"),
            Tac::EndFinally => write!(f, "endfinally"),
            Tac::EndFilter { value } => write!(f, "endfilter {value}"),
            Tac::Nop => write!(f, "nop"),
            Tac::Break => write!(f, "break"),
        }
    }
}

/// One lowered instruction and the graph node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredInstruction {
    /// Offset of the originating CIL instruction
    pub offset: u32,
    /// Index of the originating node in its graph
    pub node: usize,
    /// The instruction
    pub tac: Tac,
}

/// The lowered body of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredMethod {
    /// Symbol name of the method's code
    pub name: String,
    /// The compiled method
    pub method: MethodToCompile,
    /// Argument slot types, `this` first for instance methods
    pub args: Vec<TypeSig>,
    /// Local slot types
    pub locals: Vec<TypeSig>,
    /// Temporary types, indexed by [`Var::Temp`]
    pub temps: Vec<TypeSig>,
    /// Instructions in CIL offset order
    pub code: Vec<LoweredInstruction>,
}

impl LoweredMethod {
    /// Number of labels in the code
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.code
            .iter()
            .filter(|instr| matches!(instr.tac, Tac::Label(_)))
            .count()
    }
}

impl fmt::Display for LoweredMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for instr in &self.code {
            if matches!(instr.tac, Tac::Label(_)) {
                writeln!(f, "{}", instr.tac)?;
            } else {
                writeln!(f, "  IL_{:04X}  {}", instr.offset, instr.tac)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let tac = Tac::Binary {
            dest: Var::Stack(0),
            op: BinaryOp::Add,
            left: Var::Stack(0),
            right: Var::Stack(1),
            ty: StackType::Int32,
            unsigned: false,
            overflow_check: false,
        };
        assert_eq!(tac.to_string(), "st0 = st0 Add st1");
        assert_eq!(tac.dest(), Some(Var::Stack(0)));
        assert!(!tac.is_branch());

        let branch = Tac::BranchIf {
            op: CompareOp::Ne,
            left: Var::Stack(0),
            right: None,
            ty: StackType::Int32,
            unsigned: false,
            true_target: Label(2),
            false_target: Label::PENDING,
        };
        assert_eq!(branch.to_string(), "if st0 Ne 0 goto L2 else L?");
        assert!(branch.is_branch());
        assert!(!StackType::ValueType(TypeSig::Primitive(ElementType::I4)).is_integer());
        assert!(StackType::NativeInt.is_integer());
    }
}
