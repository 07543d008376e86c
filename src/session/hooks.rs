//! Custom attributes that rewrite a method's signature.
//!
//! A [`SignatureHook`] is registered on a [`Session`] under the mangled name of an attribute
//! constructor. Whenever a method definition carrying that attribute is looked up or
//! instantiated, the hook is handed the method, the attribute and the current signature and
//! may return a replacement.
//!
//! The session registers [`ExtraArgumentHook`] by default. It serves
//! `ExtraArgumentAttribute(int32 arg_no, int32 element_type)` of the support library, which
//! declares a parameter the method receives without its metadata signature naming it.

use std::sync::Arc;

use crate::{
    metadata::{
        signatures::{ElementType, MethodSignature, Param, TypeSig},
        typesystem::{CustomAttributeDefinition, MethodDefId, MethodDefinition},
    },
    session::Session,
    Error, Result,
};

/// Mangled name of `ExtraArgumentAttribute::.ctor(int32, int32)` in the support library
pub const EXTRA_ARGUMENT_ATTRIBUTE: &str = "_ZX22ExtraArgumentAttributeM_0_7#2Ector_Rv_P3u1tii";

/// Rewrites the signature of methods carrying one particular custom attribute.
pub trait SignatureHook: Send + Sync {
    /// The rewritten signature, or `None` to leave `sig` as it is.
    ///
    /// # Errors
    /// Returns an error if the attribute is malformed or not allowed on `method`.
    fn apply(
        &self,
        method: &MethodDefinition,
        attribute: &CustomAttributeDefinition,
        sig: &MethodSignature,
    ) -> Result<Option<MethodSignature>>;
}

/// Places a primitive parameter at a fixed position.
///
/// The attribute blob is the prolog `01 00` followed by the parameter position and the
/// element type, both little-endian `int32`. The parameter list is padded with empty slots up
/// to the position and ends with the new parameter, named `extra_<position>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtraArgumentHook;

impl SignatureHook for ExtraArgumentHook {
    fn apply(
        &self,
        method: &MethodDefinition,
        attribute: &CustomAttributeDefinition,
        sig: &MethodSignature,
    ) -> Result<Option<MethodSignature>> {
        let MethodSignature::Method(declared) = sig else {
            return Err(Error::Error(format!(
                "ExtraArgumentAttribute is not allowed on generic method {}",
                method.name
            )));
        };
        if declared.gen_param_count > 0 {
            return Err(Error::Error(format!(
                "ExtraArgumentAttribute is not allowed on generic method {}",
                method.name
            )));
        }

        let value = attribute.value.as_slice();
        let (position, element_type) = match value {
            [0x01, 0x00, a0, a1, a2, a3, t0, t1, t2, t3, ..] => (
                i32::from_le_bytes([*a0, *a1, *a2, *a3]),
                i32::from_le_bytes([*t0, *t1, *t2, *t3]),
            ),
            [0x01, 0x00, ..] => return Err(out_of_bounds_error!()),
            _ => {
                return Err(malformed_error!(
                    "Custom attribute {} has no 0x0001 prolog",
                    attribute.row
                ))
            }
        };

        let position = usize::try_from(position).map_err(|_| {
            malformed_error!("ExtraArgumentAttribute position {} is negative", position)
        })?;
        let kind = u8::try_from(element_type)
            .ok()
            .and_then(ElementType::from_u8)
            .filter(|kind| kind.is_signature_primitive())
            .ok_or(Error::UnknownElementType(element_type as u8))?;

        let mut rewritten = declared.clone();
        rewritten.params.resize_with(position + 1, Param::empty);
        rewritten.params[position] =
            Param::named(TypeSig::Primitive(kind), format!("extra_{position}"));

        Ok(Some(MethodSignature::Method(rewritten)))
    }
}

impl Session {
    /// Run the registered hooks for every custom attribute of `method`, in attribute order,
    /// each seeing the result of the previous one. `None` if no hook applied.
    ///
    /// # Errors
    /// Returns resolution errors for attribute constructors and hook errors.
    pub fn apply_signature_hooks(
        &self,
        method: MethodDefId,
        sig: &MethodSignature,
    ) -> Result<Option<MethodSignature>> {
        if self.hooks.is_empty() {
            return Ok(None);
        }

        let module = self.module(method.module)?;
        let attributes = module.custom_attributes(method.token());
        if attributes.is_empty() {
            return Ok(None);
        }

        let definition = module.method_def(method.row)?;
        let mut current: Option<MethodSignature> = None;

        for attribute in attributes {
            let constructor = self.attribute_constructor(method.module, attribute.constructor)?;
            let name = self.mangle(&constructor.to_mangle())?;

            let Some(hook) = self.hooks.get(&name).map(|entry| Arc::clone(entry.value())) else {
                continue;
            };

            let input = current.as_ref().unwrap_or(sig);
            if let Some(rewritten) = hook.apply(definition, attribute, input)? {
                log::debug!(
                    "{}::{} rewritten by {}: {}",
                    module.name(),
                    definition.name,
                    name,
                    rewritten.method()
                );
                current = Some(rewritten);
            }
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        method::MethodImplFlags,
        signatures::{GenericMethodSig, MethodSig},
        tables::CustomAttributeType,
    };

    fn method(sig: MethodSig) -> MethodDefinition {
        MethodDefinition {
            row: 1,
            owner: 1,
            name: "Invoke".to_string(),
            rva: 0,
            flags: 0,
            impl_flags: MethodImplFlags::empty(),
            signature: sig,
            params: 1..1,
            generic_params: Vec::new(),
            overrides: Vec::new(),
            body: None,
        }
    }

    fn attribute(value: Vec<u8>) -> CustomAttributeDefinition {
        CustomAttributeDefinition {
            row: 1,
            constructor: CustomAttributeType::MemberRef(1),
            value,
        }
    }

    fn blob(position: i32, kind: u8) -> Vec<u8> {
        let mut value = vec![0x01, 0x00];
        value.extend_from_slice(&position.to_le_bytes());
        value.extend_from_slice(&i32::from(kind).to_le_bytes());
        value.extend_from_slice(&[0x00, 0x00]);
        value
    }

    #[test]
    fn pads_and_places() {
        let sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![TypeSig::Primitive(ElementType::Object)],
        );
        let definition = method(sig.clone());

        let rewritten = ExtraArgumentHook
            .apply(&definition, &attribute(blob(3, 0x18)), &sig.into())
            .unwrap()
            .unwrap();

        let params = &rewritten.method().params;
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].ty, TypeSig::Primitive(ElementType::Object));
        assert!(params[1].is_empty());
        assert!(params[2].is_empty());
        assert_eq!(params[3].ty, TypeSig::Primitive(ElementType::I));
        assert_eq!(params[3].name.as_deref(), Some("extra_3"));
    }

    #[test]
    fn replaces_existing_slot() {
        let sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![
                TypeSig::Primitive(ElementType::Object),
                TypeSig::Primitive(ElementType::Object),
            ],
        );
        let definition = method(sig.clone());

        let rewritten = ExtraArgumentHook
            .apply(&definition, &attribute(blob(0, 0x08)), &sig.into())
            .unwrap()
            .unwrap();

        assert_eq!(rewritten.method().params.len(), 1);
        assert_eq!(
            rewritten.method().params[0].ty,
            TypeSig::Primitive(ElementType::I4)
        );
    }

    #[test]
    fn rejected_on_generic_methods() {
        let mut sig = MethodSig::new(TypeSig::Primitive(ElementType::Void), vec![]);
        sig.gen_param_count = 1;
        let definition = method(sig.clone());
        let value = attribute(blob(0, 0x08));

        assert!(ExtraArgumentHook
            .apply(&definition, &value, &sig.clone().into())
            .is_err());

        let instantiated = MethodSignature::Generic(GenericMethodSig {
            method: sig,
            args: vec![TypeSig::Primitive(ElementType::I4)],
        });
        assert!(ExtraArgumentHook
            .apply(&definition, &value, &instantiated)
            .is_err());
    }

    #[test]
    fn malformed_blobs() {
        let sig = MethodSig::new(TypeSig::Primitive(ElementType::Void), vec![]);
        let definition = method(sig.clone());
        let sig: MethodSignature = sig.into();

        assert!(ExtraArgumentHook
            .apply(&definition, &attribute(vec![0x02, 0x00]), &sig)
            .is_err());
        assert!(matches!(
            ExtraArgumentHook.apply(&definition, &attribute(vec![0x01, 0x00, 0x01]), &sig),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(ExtraArgumentHook
            .apply(&definition, &attribute(blob(-1, 0x08)), &sig)
            .is_err());
        assert!(matches!(
            ExtraArgumentHook.apply(&definition, &attribute(blob(0, 0x11)), &sig),
            Err(Error::UnknownElementType(0x11))
        ));
    }
}
