//! The signature algebra.
//!
//! Signatures are decoded from `#Blob` entries into the closed [`TypeSig`] sum type and the
//! slot records built on it ([`Param`], [`MethodSig`], [`FieldSig`], ...). Four operations are
//! defined over the algebra:
//!
//! - **structural comparison** ([`compare_types`], [`compare_method_signatures`]), which sees
//!   through type references with a [`TypeResolver`]
//! - **generic substitution** ([`GenericContext`])
//! - **rendering** ([`render_type`], and `Display` on [`TypeSig`])
//! - **name mangling** ([`Mangler`]), the symbol names handed to code generation
//!
//! Blobs are parsed with [`SignatureParser`] and written back with the `encode_*` functions.
//!
//! # Examples
//!
//! ```rust
//! use cilfront::metadata::signatures::{parse_method_signature, ElementType, TypeSig};
//! use cilfront::metadata::typesystem::ModuleId;
//!
//! // instance void (int32, string[])
//! let sig = parse_method_signature(&[0x20, 0x02, 0x01, 0x08, 0x1d, 0x0e], ModuleId(0))?;
//! assert!(sig.has_this);
//! assert_eq!(sig.params[0].ty, TypeSig::Primitive(ElementType::I4));
//! assert_eq!(sig.to_string(), "void method(int, string[])");
//! # Ok::<(), cilfront::Error>(())
//! ```

mod compare;
mod display;
mod encoders;
mod generics;
mod mangle;
mod parser;
#[cfg(test)]
mod testing;
mod types;

pub use compare::*;
pub use display::{render_method, render_type};
pub use encoders::*;
pub use generics::GenericContext;
pub use mangle::{escape, unescape, Mangler, ObjectKind, ObjectToMangle};
pub use parser::SignatureParser;
#[cfg(test)]
pub(crate) use testing::TestResolver;
pub use types::*;

use crate::{metadata::typesystem::ModuleId, Result};

/// Parse a method signature blob of `module`.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`], [`crate::Error::UnknownElementType`] or
/// [`crate::Error::OutOfBounds`] for a malformed blob.
pub fn parse_method_signature(data: &[u8], module: ModuleId) -> Result<MethodSig> {
    SignatureParser::new(data, module).parse_method_signature()
}

/// Parse a field signature blob of `module`.
///
/// # Errors
/// See [`parse_method_signature`].
pub fn parse_field_signature(data: &[u8], module: ModuleId) -> Result<FieldSig> {
    SignatureParser::new(data, module).parse_field_signature()
}

/// Parse a property signature blob of `module`.
///
/// # Errors
/// See [`parse_method_signature`].
pub fn parse_property_signature(data: &[u8], module: ModuleId) -> Result<PropertySig> {
    SignatureParser::new(data, module).parse_property_signature()
}

/// Parse a local variable signature blob of `module`.
///
/// # Errors
/// See [`parse_method_signature`].
pub fn parse_local_var_signature(data: &[u8], module: ModuleId) -> Result<LocalVarSig> {
    SignatureParser::new(data, module).parse_local_var_signature()
}

/// Parse a `TypeSpec` blob of `module`.
///
/// # Errors
/// See [`parse_method_signature`].
pub fn parse_type_spec_signature(data: &[u8], module: ModuleId) -> Result<TypeSig> {
    SignatureParser::new(data, module).parse_type_spec_signature()
}

/// Parse a `MethodSpec` instantiation blob of `module`.
///
/// # Errors
/// See [`parse_method_signature`].
pub fn parse_method_spec_signature(data: &[u8], module: ModuleId) -> Result<MethodSpecSig> {
    SignatureParser::new(data, module).parse_method_spec_signature()
}
