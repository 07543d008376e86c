//! Opcode tables.
//!
//! Each table has one entry per opcode byte. [`INSTRUCTIONS`] covers the single-byte opcodes,
//! [`INSTRUCTIONS_FE`] the second byte after `0xFE` and [`INSTRUCTIONS_FD`] the compiler-internal
//! opcodes after `0xFD`. Unassigned bytes hold [`CilInstruction::RESERVED`], whose mnemonic is
//! empty.

use crate::assembly::{
    opcodes::*,
    instruction::{FlowType, InstructionCategory, OperandType},
};

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction {
    /// Mnemonic, empty for unassigned opcodes
    pub instr: &'static str,
    /// Inline operand shape
    pub op_type: OperandType,
    /// Functional group
    pub category: InstructionCategory,
    /// Control flow class
    pub flow: FlowType,
    /// Fixed number of stack items consumed
    pub stack_pops: u8,
    /// Fixed number of stack items produced
    pub stack_pushes: u8,
}

impl CilInstruction {
    /// Placeholder for unassigned opcodes
    pub const RESERVED: CilInstruction = CilInstruction {
        instr: "",
        op_type: OperandType::None,
        category: InstructionCategory::Misc,
        flow: FlowType::Sequential,
        stack_pops: 0,
        stack_pushes: 0,
    };

    /// False for unassigned opcodes
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        !self.instr.is_empty()
    }
}

macro_rules! opcode_table {
    ($($code:expr => $name:literal, $op:ident, $category:ident, $flow:ident, $pops:literal, $pushes:literal;)*) => {{
        let mut table = [CilInstruction::RESERVED; 256];
        $(
            table[$code as usize] = CilInstruction {
                instr: $name,
                op_type: OperandType::$op,
                category: InstructionCategory::$category,
                flow: FlowType::$flow,
                stack_pops: $pops,
                stack_pushes: $pushes,
            };
        )*
        table
    }};
}

/// Single-byte opcodes
#[rustfmt::skip]
pub static INSTRUCTIONS: [CilInstruction; 256] = opcode_table! {
    NOP            => "nop",            None,    Misc,           Sequential,          0, 0;
    BREAK          => "break",          None,    Misc,           Sequential,          0, 0;
    LDARG_0        => "ldarg.0",        None,    LoadStore,      Sequential,          0, 1;
    LDARG_1        => "ldarg.1",        None,    LoadStore,      Sequential,          0, 1;
    LDARG_2        => "ldarg.2",        None,    LoadStore,      Sequential,          0, 1;
    LDARG_3        => "ldarg.3",        None,    LoadStore,      Sequential,          0, 1;
    LDLOC_0        => "ldloc.0",        None,    LoadStore,      Sequential,          0, 1;
    LDLOC_1        => "ldloc.1",        None,    LoadStore,      Sequential,          0, 1;
    LDLOC_2        => "ldloc.2",        None,    LoadStore,      Sequential,          0, 1;
    LDLOC_3        => "ldloc.3",        None,    LoadStore,      Sequential,          0, 1;
    STLOC_0        => "stloc.0",        None,    LoadStore,      Sequential,          1, 0;
    STLOC_1        => "stloc.1",        None,    LoadStore,      Sequential,          1, 0;
    STLOC_2        => "stloc.2",        None,    LoadStore,      Sequential,          1, 0;
    STLOC_3        => "stloc.3",        None,    LoadStore,      Sequential,          1, 0;
    LDARG_S        => "ldarg.s",        UInt8,   LoadStore,      Sequential,          0, 1;
    LDARGA_S       => "ldarga.s",       UInt8,   LoadStore,      Sequential,          0, 1;
    STARG_S        => "starg.s",        UInt8,   LoadStore,      Sequential,          1, 0;
    LDLOC_S        => "ldloc.s",        UInt8,   LoadStore,      Sequential,          0, 1;
    LDLOCA_S       => "ldloca.s",       UInt8,   LoadStore,      Sequential,          0, 1;
    STLOC_S        => "stloc.s",        UInt8,   LoadStore,      Sequential,          1, 0;
    LDNULL         => "ldnull",         None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_M1      => "ldc.i4.m1",      None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_0       => "ldc.i4.0",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_1       => "ldc.i4.1",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_2       => "ldc.i4.2",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_3       => "ldc.i4.3",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_4       => "ldc.i4.4",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_5       => "ldc.i4.5",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_6       => "ldc.i4.6",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_7       => "ldc.i4.7",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_8       => "ldc.i4.8",       None,    LoadStore,      Sequential,          0, 1;
    LDC_I4_S       => "ldc.i4.s",       Int8,    LoadStore,      Sequential,          0, 1;
    LDC_I4         => "ldc.i4",         Int32,   LoadStore,      Sequential,          0, 1;
    LDC_I8         => "ldc.i8",         Int64,   LoadStore,      Sequential,          0, 1;
    LDC_R4         => "ldc.r4",         Float32, LoadStore,      Sequential,          0, 1;
    LDC_R8         => "ldc.r8",         Float64, LoadStore,      Sequential,          0, 1;
    DUP            => "dup",            None,    Misc,           Sequential,          1, 2;
    POP            => "pop",            None,    Misc,           Sequential,          1, 0;
    JMP            => "jmp",            Token,   ControlFlow,    Return,              0, 0;
    CALL           => "call",           Token,   ControlFlow,    Call,                0, 0;
    CALLI          => "calli",          Token,   ControlFlow,    Call,                1, 0;
    RET            => "ret",            None,    ControlFlow,    Return,              0, 0;
    BR_S           => "br.s",           Int8,    ControlFlow,    UnconditionalBranch, 0, 0;
    BRFALSE_S      => "brfalse.s",      Int8,    ControlFlow,    ConditionalBranch,   1, 0;
    BRTRUE_S       => "brtrue.s",       Int8,    ControlFlow,    ConditionalBranch,   1, 0;
    BEQ_S          => "beq.s",          Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BGE_S          => "bge.s",          Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BGT_S          => "bgt.s",          Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BLE_S          => "ble.s",          Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BLT_S          => "blt.s",          Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BNE_UN_S       => "bne.un.s",       Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BGE_UN_S       => "bge.un.s",       Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BGT_UN_S       => "bgt.un.s",       Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BLE_UN_S       => "ble.un.s",       Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BLT_UN_S       => "blt.un.s",       Int8,    ControlFlow,    ConditionalBranch,   2, 0;
    BR             => "br",             Int32,   ControlFlow,    UnconditionalBranch, 0, 0;
    BRFALSE        => "brfalse",        Int32,   ControlFlow,    ConditionalBranch,   1, 0;
    BRTRUE         => "brtrue",         Int32,   ControlFlow,    ConditionalBranch,   1, 0;
    BEQ            => "beq",            Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BGE            => "bge",            Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BGT            => "bgt",            Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BLE            => "ble",            Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BLT            => "blt",            Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BNE_UN         => "bne.un",         Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BGE_UN         => "bge.un",         Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BGT_UN         => "bgt.un",         Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BLE_UN         => "ble.un",         Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    BLT_UN         => "blt.un",         Int32,   ControlFlow,    ConditionalBranch,   2, 0;
    SWITCH         => "switch",         Switch,  ControlFlow,    Switch,              1, 0;
    LDIND_I1       => "ldind.i1",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_U1       => "ldind.u1",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_I2       => "ldind.i2",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_U2       => "ldind.u2",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_I4       => "ldind.i4",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_U4       => "ldind.u4",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_I8       => "ldind.i8",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_I        => "ldind.i",        None,    LoadStore,      Sequential,          1, 1;
    LDIND_R4       => "ldind.r4",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_R8       => "ldind.r8",       None,    LoadStore,      Sequential,          1, 1;
    LDIND_REF      => "ldind.ref",      None,    LoadStore,      Sequential,          1, 1;
    STIND_REF      => "stind.ref",      None,    LoadStore,      Sequential,          2, 0;
    STIND_I1       => "stind.i1",       None,    LoadStore,      Sequential,          2, 0;
    STIND_I2       => "stind.i2",       None,    LoadStore,      Sequential,          2, 0;
    STIND_I4       => "stind.i4",       None,    LoadStore,      Sequential,          2, 0;
    STIND_I8       => "stind.i8",       None,    LoadStore,      Sequential,          2, 0;
    STIND_R4       => "stind.r4",       None,    LoadStore,      Sequential,          2, 0;
    STIND_R8       => "stind.r8",       None,    LoadStore,      Sequential,          2, 0;
    ADD            => "add",            None,    Arithmetic,     Sequential,          2, 1;
    SUB            => "sub",            None,    Arithmetic,     Sequential,          2, 1;
    MUL            => "mul",            None,    Arithmetic,     Sequential,          2, 1;
    DIV            => "div",            None,    Arithmetic,     Sequential,          2, 1;
    DIV_UN         => "div.un",         None,    Arithmetic,     Sequential,          2, 1;
    REM            => "rem",            None,    Arithmetic,     Sequential,          2, 1;
    REM_UN         => "rem.un",         None,    Arithmetic,     Sequential,          2, 1;
    AND            => "and",            None,    BitwiseLogical, Sequential,          2, 1;
    OR             => "or",             None,    BitwiseLogical, Sequential,          2, 1;
    XOR            => "xor",            None,    BitwiseLogical, Sequential,          2, 1;
    SHL            => "shl",            None,    BitwiseLogical, Sequential,          2, 1;
    SHR            => "shr",            None,    BitwiseLogical, Sequential,          2, 1;
    SHR_UN         => "shr.un",         None,    BitwiseLogical, Sequential,          2, 1;
    NEG            => "neg",            None,    Arithmetic,     Sequential,          1, 1;
    NOT            => "not",            None,    BitwiseLogical, Sequential,          1, 1;
    CONV_I1        => "conv.i1",        None,    Conversion,     Sequential,          1, 1;
    CONV_I2        => "conv.i2",        None,    Conversion,     Sequential,          1, 1;
    CONV_I4        => "conv.i4",        None,    Conversion,     Sequential,          1, 1;
    CONV_I8        => "conv.i8",        None,    Conversion,     Sequential,          1, 1;
    CONV_R4        => "conv.r4",        None,    Conversion,     Sequential,          1, 1;
    CONV_R8        => "conv.r8",        None,    Conversion,     Sequential,          1, 1;
    CONV_U4        => "conv.u4",        None,    Conversion,     Sequential,          1, 1;
    CONV_U8        => "conv.u8",        None,    Conversion,     Sequential,          1, 1;
    CALLVIRT       => "callvirt",       Token,   ControlFlow,    Call,                0, 0;
    CPOBJ          => "cpobj",          Token,   ObjectModel,    Sequential,          2, 0;
    LDOBJ          => "ldobj",          Token,   ObjectModel,    Sequential,          1, 1;
    LDSTR          => "ldstr",          Token,   LoadStore,      Sequential,          0, 1;
    NEWOBJ         => "newobj",         Token,   ObjectModel,    Call,                0, 1;
    CASTCLASS      => "castclass",      Token,   ObjectModel,    Sequential,          1, 1;
    ISINST         => "isinst",         Token,   ObjectModel,    Sequential,          1, 1;
    CONV_R_UN      => "conv.r.un",      None,    Conversion,     Sequential,          1, 1;
    UNBOX          => "unbox",          Token,   ObjectModel,    Sequential,          1, 1;
    THROW          => "throw",          None,    ControlFlow,    Throw,               1, 0;
    LDFLD          => "ldfld",          Token,   LoadStore,      Sequential,          1, 1;
    LDFLDA         => "ldflda",         Token,   LoadStore,      Sequential,          1, 1;
    STFLD          => "stfld",          Token,   LoadStore,      Sequential,          2, 0;
    LDSFLD         => "ldsfld",         Token,   LoadStore,      Sequential,          0, 1;
    LDSFLDA        => "ldsflda",        Token,   LoadStore,      Sequential,          0, 1;
    STSFLD         => "stsfld",         Token,   LoadStore,      Sequential,          1, 0;
    STOBJ          => "stobj",          Token,   ObjectModel,    Sequential,          2, 0;
    CONV_OVF_I1_UN => "conv.ovf.i1.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I2_UN => "conv.ovf.i2.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I4_UN => "conv.ovf.i4.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I8_UN => "conv.ovf.i8.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U1_UN => "conv.ovf.u1.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U2_UN => "conv.ovf.u2.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U4_UN => "conv.ovf.u4.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U8_UN => "conv.ovf.u8.un", None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I_UN  => "conv.ovf.i.un",  None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U_UN  => "conv.ovf.u.un",  None,    Conversion,     Sequential,          1, 1;
    BOX            => "box",            Token,   ObjectModel,    Sequential,          1, 1;
    NEWARR         => "newarr",         Token,   ObjectModel,    Sequential,          1, 1;
    LDLEN          => "ldlen",          None,    ObjectModel,    Sequential,          1, 1;
    LDELEMA        => "ldelema",        Token,   LoadStore,      Sequential,          2, 1;
    LDELEM_I1      => "ldelem.i1",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_U1      => "ldelem.u1",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_I2      => "ldelem.i2",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_U2      => "ldelem.u2",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_I4      => "ldelem.i4",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_U4      => "ldelem.u4",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_I8      => "ldelem.i8",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_I       => "ldelem.i",       None,    LoadStore,      Sequential,          2, 1;
    LDELEM_R4      => "ldelem.r4",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_R8      => "ldelem.r8",      None,    LoadStore,      Sequential,          2, 1;
    LDELEM_REF     => "ldelem.ref",     None,    LoadStore,      Sequential,          2, 1;
    STELEM_I       => "stelem.i",       None,    LoadStore,      Sequential,          3, 0;
    STELEM_I1      => "stelem.i1",      None,    LoadStore,      Sequential,          3, 0;
    STELEM_I2      => "stelem.i2",      None,    LoadStore,      Sequential,          3, 0;
    STELEM_I4      => "stelem.i4",      None,    LoadStore,      Sequential,          3, 0;
    STELEM_I8      => "stelem.i8",      None,    LoadStore,      Sequential,          3, 0;
    STELEM_R4      => "stelem.r4",      None,    LoadStore,      Sequential,          3, 0;
    STELEM_R8      => "stelem.r8",      None,    LoadStore,      Sequential,          3, 0;
    STELEM_REF     => "stelem.ref",     None,    LoadStore,      Sequential,          3, 0;
    LDELEM         => "ldelem",         Token,   LoadStore,      Sequential,          2, 1;
    STELEM         => "stelem",         Token,   LoadStore,      Sequential,          3, 0;
    UNBOX_ANY      => "unbox.any",      Token,   ObjectModel,    Sequential,          1, 1;
    CONV_OVF_I1    => "conv.ovf.i1",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U1    => "conv.ovf.u1",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I2    => "conv.ovf.i2",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U2    => "conv.ovf.u2",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I4    => "conv.ovf.i4",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U4    => "conv.ovf.u4",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I8    => "conv.ovf.i8",    None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U8    => "conv.ovf.u8",    None,    Conversion,     Sequential,          1, 1;
    REFANYVAL      => "refanyval",      Token,   ObjectModel,    Sequential,          1, 1;
    CKFINITE       => "ckfinite",       None,    Arithmetic,     Sequential,          1, 1;
    MKREFANY       => "mkrefany",       Token,   ObjectModel,    Sequential,          1, 1;
    LDTOKEN        => "ldtoken",        Token,   ObjectModel,    Sequential,          0, 1;
    CONV_U2        => "conv.u2",        None,    Conversion,     Sequential,          1, 1;
    CONV_U1        => "conv.u1",        None,    Conversion,     Sequential,          1, 1;
    CONV_I         => "conv.i",         None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_I     => "conv.ovf.i",     None,    Conversion,     Sequential,          1, 1;
    CONV_OVF_U     => "conv.ovf.u",     None,    Conversion,     Sequential,          1, 1;
    ADD_OVF        => "add.ovf",        None,    Arithmetic,     Sequential,          2, 1;
    ADD_OVF_UN     => "add.ovf.un",     None,    Arithmetic,     Sequential,          2, 1;
    MUL_OVF        => "mul.ovf",        None,    Arithmetic,     Sequential,          2, 1;
    MUL_OVF_UN     => "mul.ovf.un",     None,    Arithmetic,     Sequential,          2, 1;
    SUB_OVF        => "sub.ovf",        None,    Arithmetic,     Sequential,          2, 1;
    SUB_OVF_UN     => "sub.ovf.un",     None,    Arithmetic,     Sequential,          2, 1;
    ENDFINALLY     => "endfinally",     None,    ControlFlow,    EndFinally,          0, 0;
    LEAVE          => "leave",          Int32,   ControlFlow,    Leave,               0, 0;
    LEAVE_S        => "leave.s",        Int8,    ControlFlow,    Leave,               0, 0;
    STIND_I        => "stind.i",        None,    LoadStore,      Sequential,          2, 0;
    CONV_U         => "conv.u",         None,    Conversion,     Sequential,          1, 1;
};

/// Opcodes after the `0xFE` escape
#[rustfmt::skip]
pub static INSTRUCTIONS_FE: [CilInstruction; 256] = opcode_table! {
    FE_ARGLIST     => "arglist",        None,    Misc,           Sequential,          0, 1;
    FE_CEQ         => "ceq",            None,    Comparison,     Sequential,          2, 1;
    FE_CGT         => "cgt",            None,    Comparison,     Sequential,          2, 1;
    FE_CGT_UN      => "cgt.un",         None,    Comparison,     Sequential,          2, 1;
    FE_CLT         => "clt",            None,    Comparison,     Sequential,          2, 1;
    FE_CLT_UN      => "clt.un",         None,    Comparison,     Sequential,          2, 1;
    FE_LDFTN       => "ldftn",          Token,   ObjectModel,    Sequential,          0, 1;
    FE_LDVIRTFTN   => "ldvirtftn",      Token,   ObjectModel,    Sequential,          1, 1;
    FE_LDARG       => "ldarg",          UInt16,  LoadStore,      Sequential,          0, 1;
    FE_LDARGA      => "ldarga",         UInt16,  LoadStore,      Sequential,          0, 1;
    FE_STARG       => "starg",          UInt16,  LoadStore,      Sequential,          1, 0;
    FE_LDLOC       => "ldloc",          UInt16,  LoadStore,      Sequential,          0, 1;
    FE_LDLOCA      => "ldloca",         UInt16,  LoadStore,      Sequential,          0, 1;
    FE_STLOC       => "stloc",          UInt16,  LoadStore,      Sequential,          1, 0;
    FE_LOCALLOC    => "localloc",       None,    Misc,           Sequential,          1, 1;
    FE_ENDFILTER   => "endfilter",      None,    ControlFlow,    Return,              1, 0;
    FE_UNALIGNED   => "unaligned.",     UInt8,   Prefix,         Sequential,          0, 0;
    FE_VOLATILE    => "volatile.",      None,    Prefix,         Sequential,          0, 0;
    FE_TAIL        => "tail.",          None,    Prefix,         Sequential,          0, 0;
    FE_INITOBJ     => "initobj",        Token,   ObjectModel,    Sequential,          1, 0;
    FE_CONSTRAINED => "constrained.",   Token,   Prefix,         Sequential,          0, 0;
    FE_CPBLK       => "cpblk",          None,    Misc,           Sequential,          3, 0;
    FE_INITBLK     => "initblk",        None,    Misc,           Sequential,          3, 0;
    FE_NO          => "no.",            UInt8,   Prefix,         Sequential,          0, 0;
    FE_RETHROW     => "rethrow",        None,    ControlFlow,    Throw,               0, 0;
    FE_SIZEOF      => "sizeof",         Token,   ObjectModel,    Sequential,          0, 1;
    FE_REFANYTYPE  => "refanytype",     None,    ObjectModel,    Sequential,          1, 1;
    FE_READONLY    => "readonly.",      None,    Prefix,         Sequential,          0, 0;
};

/// Compiler-internal opcodes after the `0xFD` escape
#[rustfmt::skip]
pub static INSTRUCTIONS_FD: [CilInstruction; 256] = opcode_table! {
    FD_FLIP              => "flip",              None,  Internal, Sequential, 0, 0;
    FD_FLIP3             => "flip3",             None,  Internal, Sequential, 0, 0;
    FD_INIT_RTH          => "init_rth",          Token, Internal, Sequential, 0, 0;
    FD_CASTCLASSEX       => "castclassex",       Token, Internal, Sequential, 1, 1;
    FD_THROWFALSE        => "throwfalse",        None,  Internal, Sequential, 1, 0;
    FD_LDELEM_VT         => "ldelem_vt",         Token, Internal, Sequential, 2, 1;
    FD_INIT_RMH          => "init_rmh",          Token, Internal, Sequential, 0, 0;
    FD_INIT_RFH          => "init_rfh",          Token, Internal, Sequential, 0, 0;
    FD_STELEM_VT         => "stelem_vt",         Token, Internal, Sequential, 3, 0;
    FD_PROFILE           => "profile",           None,  Internal, Sequential, 1, 0;
    FD_GCMALLOC          => "gcmalloc",          Token, Internal, Sequential, 0, 1;
    FD_LDOBJ_ADDR        => "ldobj_addr",        Token, Internal, Sequential, 0, 1;
    FD_MBSTRLEN          => "mbstrlen",          None,  Internal, Sequential, 1, 1;
    FD_LOADCATCHOBJ      => "loadcatchobj",      None,  Internal, Sequential, 0, 1;
    FD_INSTRUCTION_LABEL => "instruction_label", None,  Internal, Sequential, 0, 0;
    FD_PUSHBACK          => "pushback",          Int32, Internal, Sequential, 0, 0;
    FD_THROWTRUE         => "throwtrue",         None,  Internal, Sequential, 1, 0;
    FD_BRINGFORWARD      => "bringforward",      Int32, Internal, Sequential, 0, 0;
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_population() {
        let defined = |table: &[CilInstruction; 256]| table.iter().filter(|i| i.is_defined()).count();
        assert_eq!(defined(&INSTRUCTIONS), 191);
        assert_eq!(defined(&INSTRUCTIONS_FE), 28);
        assert_eq!(defined(&INSTRUCTIONS_FD), 18);

        assert!(!INSTRUCTIONS[0x24].is_defined());
        assert!(!INSTRUCTIONS[0xFF].is_defined());
        assert!(!INSTRUCTIONS_FE[0x08].is_defined());
    }

    #[test]
    fn operand_shapes() {
        assert_eq!(INSTRUCTIONS[BR_S as usize].op_type, OperandType::Int8);
        assert_eq!(INSTRUCTIONS[BR as usize].op_type, OperandType::Int32);
        assert_eq!(INSTRUCTIONS[LDARG_S as usize].op_type, OperandType::UInt8);
        assert_eq!(INSTRUCTIONS_FE[FE_LDARG as usize].op_type, OperandType::UInt16);
        assert_eq!(INSTRUCTIONS[LDC_R4 as usize].op_type, OperandType::Float32);
        assert_eq!(INSTRUCTIONS[SWITCH as usize].flow, FlowType::Switch);
        assert_eq!(
            INSTRUCTIONS_FE[FE_CONSTRAINED as usize].category,
            InstructionCategory::Prefix
        );
    }
}
