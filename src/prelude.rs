//! # cilfront Prelude
//!
//! The types most compilations touch: the session and its options, handles and compilation
//! requests, the signature algebra and the lowered output. Import with
//! `use cilfront::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

pub use crate::{CompileOptions, Error, Result, Session};

/// Low-level file access
pub use crate::file::{parser::Parser, File};

// ================================================================================================
// Metadata
// ================================================================================================

pub use crate::metadata::{
    method::{ClauseKind, ExceptionClause, MethodBody},
    module::Module,
    signatures::{
        ClassRef, ElementType, FieldSig, GenericContext, Mangler, MethodSig, MethodSignature,
        ObjectKind, ObjectToMangle, Param, TypeSig,
    },
    token::Token,
    typesystem::{
        FieldId, FieldToCompile, MethodDefId, MethodToCompile, ModuleId, TypeDefId, TypeToCompile,
    },
};

// ================================================================================================
// Bytecode and Lowering
// ================================================================================================

pub use crate::assembly::{CilGraph, CilNode, Instruction, NodeIndex, Operand};

pub use crate::lowering::{
    lower_method, EvalStack, LoweredInstruction, LoweredMethod, StackType, Tac, Var,
};

/// Signature rewriting hooks
pub use crate::session::hooks::{ExtraArgumentHook, SignatureHook};

/// In-memory image construction
pub use crate::builder::{il_body, ImageBuilder};
