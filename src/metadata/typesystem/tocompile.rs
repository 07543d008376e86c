//! Keys for requesting compilation of concrete types, methods and fields.
//!
//! Two requests for the same unit may reach it through different reference paths (a local
//! definition, a `TypeRef` from another module, a `TypeSpec` instantiation). They are the same
//! unit if they compare equal under [`compare_types`] and [`compare_method_signatures`], which
//! is what the `same_unit` methods check. The derived `PartialEq` is syntactic only.

use crate::{
    metadata::{
        signatures::{
            compare_method_signatures, compare_types, GenericContext, MethodSignature,
            ObjectToMangle, TypeResolver, TypeSig,
        },
        typesystem::{FieldId, MethodDefId},
    },
    Result,
};

/// A type with all generic parameters substituted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeToCompile {
    /// The type
    pub ty: TypeSig,
}

impl TypeToCompile {
    /// Request for `ty`
    #[must_use]
    pub fn new(ty: TypeSig) -> Self {
        TypeToCompile { ty }
    }

    /// True if both name the same type.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn same_unit(&self, other: &TypeToCompile, resolver: &dyn TypeResolver) -> Result<bool> {
        compare_types(&self.ty, &other.ty, resolver)
    }
}

/// A method in the generic context it is called in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodToCompile {
    /// The method definition
    pub method: MethodDefId,
    /// Method name
    pub name: String,
    /// The declaring type, instantiated
    pub owner: TypeSig,
    /// The signature, with the owner's type arguments substituted
    pub signature: MethodSignature,
}

impl MethodToCompile {
    /// Context for substituting inside the method's body
    #[must_use]
    pub fn generic_context(&self) -> GenericContext<'_> {
        GenericContext::new(Some(&self.owner), Some(&self.signature))
    }

    /// True if both name the same compilation unit.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn same_unit(&self, other: &MethodToCompile, resolver: &dyn TypeResolver) -> Result<bool> {
        Ok(self.name == other.name
            && compare_types(&self.owner, &other.owner, resolver)?
            && compare_method_signatures(&self.signature, &other.signature, resolver)?)
    }

    /// The object to mangle for the method's code
    #[must_use]
    pub fn to_mangle(&self) -> ObjectToMangle {
        ObjectToMangle::Method {
            owner: self.owner.clone(),
            name: self.name.clone(),
            sig: self.signature.clone(),
        }
    }
}

/// A field of an instantiated type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldToCompile {
    /// The field definition
    pub field: FieldId,
    /// Field name
    pub name: String,
    /// The declaring type, instantiated
    pub owner: TypeSig,
    /// The field type, substituted
    pub ty: TypeSig,
}

impl FieldToCompile {
    /// True if both name the same field.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn same_unit(&self, other: &FieldToCompile, resolver: &dyn TypeResolver) -> Result<bool> {
        Ok(self.name == other.name
            && compare_types(&self.owner, &other.owner, resolver)?
            && compare_types(&self.ty, &other.ty, resolver)?)
    }

    /// The object to mangle for the field's runtime info
    #[must_use]
    pub fn to_mangle(&self) -> ObjectToMangle {
        ObjectToMangle::FieldInfo {
            owner: self.owner.clone(),
            name: self.name.clone(),
            ty: self.ty.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{ElementType, MethodSig, TestResolver},
        typesystem::ModuleId,
    };

    #[test]
    fn units_compare_structurally() {
        let mut resolver = TestResolver::default();
        let widget = resolver.define("app", "Demo", "Widget");
        let widget_ref = crate::metadata::signatures::ClassRef::new(
            ModuleId(5),
            crate::metadata::token::Token(0x0100_0001),
        );
        resolver.alias(widget_ref, widget);

        let sig: MethodSignature =
            MethodSig::new(TypeSig::Primitive(ElementType::Void), vec![TypeSig::Primitive(ElementType::I4)])
                .with_this()
                .into();
        let local = MethodToCompile {
            method: MethodDefId::new(ModuleId(0), 3),
            name: "Run".to_string(),
            owner: TypeSig::Class(widget),
            signature: sig.clone(),
        };
        let remote = MethodToCompile {
            owner: TypeSig::Class(widget_ref),
            ..local.clone()
        };
        assert_ne!(local, remote);
        assert!(local.same_unit(&remote, &resolver).unwrap());

        let other = MethodToCompile {
            signature: MethodSig::new(
                TypeSig::Primitive(ElementType::Void),
                vec![TypeSig::Primitive(ElementType::I8)],
            )
            .with_this()
            .into(),
            ..local.clone()
        };
        assert!(!local.same_unit(&other, &resolver).unwrap());
    }
}
