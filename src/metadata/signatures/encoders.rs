//! Signature blob encoders, the inverse of [`super::SignatureParser`].
//!
//! Used by the image builder to emit `#Blob` entries. Class references are written with the
//! `CLASS` tag since the parser treats `CLASS` and `VALUETYPE` alike.

use crate::{
    file::parser::{write_compressed_int, write_compressed_token, write_compressed_uint},
    metadata::signatures::{
        CallConv, ElementType, FieldSig, LocalVarSig, MethodSig, MethodSpecSig, Param,
        PropertySig, TypeSig, ELEMENT_TYPE,
    },
    Error, Result,
};

/// Append the encoding of `ty` to `buffer`.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_type(ty: &TypeSig, buffer: &mut Vec<u8>) -> Result<()> {
    match ty {
        TypeSig::Uninstantiated { .. } => {
            return Err(Error::InvalidSignature(format!(
                "{ty:?} has no signature encoding"
            )))
        }
        TypeSig::Primitive(kind) if !kind.is_signature_primitive() => {
            return Err(Error::InvalidSignature(format!(
                "{ty:?} has no signature encoding"
            )))
        }
        TypeSig::Primitive(kind) => buffer.push(*kind as u8),
        TypeSig::Class(class) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            write_compressed_token(class.token, buffer)?;
        }
        TypeSig::Boxed(inner) => {
            buffer.push(ELEMENT_TYPE::BOXED);
            encode_type(inner, buffer)?;
        }
        TypeSig::GenericInst { base, args } => {
            buffer.push(ELEMENT_TYPE::GENERICINST);
            encode_type(base, buffer)?;
            write_count(args.len(), buffer)?;
            for arg in args {
                encode_type(arg, buffer)?;
            }
        }
        TypeSig::SzArray(elem) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_type(elem, buffer)?;
        }
        TypeSig::Array(shape) => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type(&shape.elem, buffer)?;
            write_compressed_uint(shape.rank, buffer)?;
            write_count(shape.sizes.len(), buffer)?;
            for size in &shape.sizes {
                write_compressed_uint(*size, buffer)?;
            }
            write_count(shape.lo_bounds.len(), buffer)?;
            for bound in &shape.lo_bounds {
                write_compressed_int(*bound, buffer)?;
            }
        }
        TypeSig::ByRef(inner) => {
            buffer.push(ELEMENT_TYPE::BYREF);
            encode_type(inner, buffer)?;
        }
        TypeSig::Ptr(inner) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_type(inner, buffer)?;
        }
        TypeSig::Var(index) => {
            buffer.push(ELEMENT_TYPE::VAR);
            write_compressed_uint(*index, buffer)?;
        }
        TypeSig::MVar(index) => {
            buffer.push(ELEMENT_TYPE::MVAR);
            write_compressed_uint(*index, buffer)?;
        }
    }

    Ok(())
}

fn write_count(count: usize, buffer: &mut Vec<u8>) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| Error::InvalidSignature(format!("count {count} too large")))?;
    write_compressed_uint(count, buffer)
}

fn encode_param(param: &Param, buffer: &mut Vec<u8>) -> Result<()> {
    for modifier in &param.custom_mods {
        buffer.push(if modifier.required {
            ELEMENT_TYPE::CMOD_REQD
        } else {
            ELEMENT_TYPE::CMOD_OPT
        });
        write_compressed_token(modifier.class.token, buffer)?;
    }
    if param.pinned {
        buffer.push(ELEMENT_TYPE::PINNED);
    }

    encode_type(&param.ty, buffer)
}

/// Encode a method signature.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_method_signature(sig: &MethodSig) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let mut convention = match sig.call_conv {
        CallConv::Default => 0x00,
        CallConv::VarArg => 0x05,
        CallConv::Generic => 0x10,
    };
    if sig.has_this {
        convention |= 0x20;
    }
    if sig.explicit_this {
        convention |= 0x40;
    }
    buffer.push(convention);

    if sig.call_conv == CallConv::Generic {
        write_compressed_uint(sig.gen_param_count, &mut buffer)?;
    }
    write_count(sig.params.len(), &mut buffer)?;
    encode_param(&sig.ret, &mut buffer)?;
    for (index, param) in sig.params.iter().enumerate() {
        if sig.sentinel == Some(index) {
            buffer.push(ELEMENT_TYPE::SENTINEL);
        }
        encode_param(param, &mut buffer)?;
    }

    Ok(buffer)
}

/// Encode a field signature.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_field_signature(sig: &FieldSig) -> Result<Vec<u8>> {
    let mut buffer = vec![0x06];
    encode_param(&sig.ty, &mut buffer)?;
    Ok(buffer)
}

/// Encode a property signature.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_property_signature(sig: &PropertySig) -> Result<Vec<u8>> {
    let mut buffer = vec![if sig.has_this { 0x28 } else { 0x08 }];
    write_count(sig.params.len(), &mut buffer)?;
    encode_param(&sig.ty, &mut buffer)?;
    for param in &sig.params {
        encode_param(param, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encode a local variable signature.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_local_var_signature(sig: &LocalVarSig) -> Result<Vec<u8>> {
    let mut buffer = vec![0x07];
    write_count(sig.locals.len(), &mut buffer)?;
    for local in &sig.locals {
        encode_param(local, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encode a method instantiation.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_method_spec_signature(sig: &MethodSpecSig) -> Result<Vec<u8>> {
    let mut buffer = vec![0x0a];
    write_count(sig.args.len(), &mut buffer)?;
    for arg in &sig.args {
        encode_type(arg, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encode a bare type, the `TypeSpec` blob form.
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for kinds that have no blob form.
pub fn encode_typespec_signature(ty: &TypeSig) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_type(ty, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{ArrayShape, CustomMod, SignatureParser},
        token::Token,
        typesystem::ModuleId,
    };

    const M: ModuleId = ModuleId(0);

    #[test]
    fn method_blob() {
        let mut sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![
                TypeSig::Primitive(ElementType::I4),
                TypeSig::SzArray(Box::new(TypeSig::class(M, Token(0x0100_0003)))),
            ],
        )
        .with_this();
        sig.params[0].custom_mods.push(CustomMod {
            required: false,
            class: crate::metadata::signatures::ClassRef::new(M, Token(0x0100_0001)),
        });

        let blob = encode_method_signature(&sig).unwrap();
        assert_eq!(blob, [0x20, 0x02, 0x01, 0x20, 0x05, 0x08, 0x1d, 0x12, 0x0d]);

        let parsed = SignatureParser::new(&blob, M).parse_method_signature().unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn array_blob() {
        let ty = TypeSig::Array(Box::new(ArrayShape {
            elem: TypeSig::Primitive(ElementType::R8),
            rank: 2,
            sizes: vec![4],
            lo_bounds: vec![-1, 0],
        }));

        let blob = encode_typespec_signature(&ty).unwrap();
        assert_eq!(blob, [0x14, 0x0d, 0x02, 0x01, 0x04, 0x02, 0x7f, 0x00]);
    }

    #[test]
    fn unencodable() {
        let ty = TypeSig::Uninstantiated {
            index: 0,
            name: None,
            origin: crate::metadata::signatures::GenericOrigin::Method,
        };
        assert!(encode_typespec_signature(&ty).is_err());

        for kind in [ElementType::End, ElementType::VirtFtnPtr, ElementType::RefGenericParam] {
            let pointer = TypeSig::Ptr(Box::new(TypeSig::Primitive(kind)));
            assert!(encode_typespec_signature(&pointer).is_err());
        }
    }
}
