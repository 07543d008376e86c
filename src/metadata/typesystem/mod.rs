//! The resolved type system of loaded modules.
//!
//! Raw table rows are turned into definition records ([`TypeDefinition`],
//! [`MethodDefinition`], [`FieldDefinition`], ...) when a module loads. Records refer to each
//! other by row number inside their module; across modules they are addressed with the handles
//! [`ModuleId`], [`TypeDefId`], [`MethodDefId`] and [`FieldId`], which index the module arena of
//! a [`crate::Session`].
//!
//! Requests to compile a concrete unit are expressed as [`TypeToCompile`], [`MethodToCompile`]
//! and [`FieldToCompile`].
//!
//! # Examples
//!
//! ```rust
//! use cilfront::metadata::typesystem::{MethodDefId, ModuleId};
//!
//! let method = MethodDefId::new(ModuleId(0), 7);
//! assert_eq!(method.token().value(), 0x0600_0007);
//! ```

mod attributes;
mod constant;
mod definitions;
mod handles;
mod tocompile;

pub use attributes::{FieldAttributes, TypeAttributes};
pub use constant::ConstantValue;
pub use definitions::{
    ClassLayout, CustomAttributeDefinition, EventDefinition, FieldDefinition,
    GenericParamDefinition, InstanceField, MethodDefinition, MethodImplDefinition, ParamDefinition,
    PropertyDefinition, TypeDefinition,
};
pub use handles::{FieldId, MethodDefId, ModuleId, TypeDefId};
pub use tocompile::{FieldToCompile, MethodToCompile, TypeToCompile};
