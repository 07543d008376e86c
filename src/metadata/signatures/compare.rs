//! Structural equality over the signature algebra.
//!
//! Two signatures are equal when their variants match and their children are equal. Class
//! references are first brought into canonical form through a [`TypeResolver`]: a `TypeRef`
//! becomes the `TypeDef` it names, a `TypeSpec` becomes the signature it encodes, and core
//! library types such as `System.Int32` become their primitive. Two classes are then equal only
//! if they name the same `TypeDef` row of the same module.

use std::borrow::Cow;

use crate::{
    metadata::signatures::{
        ArrayShape, ClassRef, CustomMod, ElementType, MethodSig, MethodSignature, Param,
        TypeSig,
    },
    Result,
};

/// Fully qualified name of a type definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Name of the defining module
    pub module: String,
    /// Namespace, empty for the global namespace and nested types
    pub namespace: String,
    /// Type name, `Outer+Inner` for nested types
    pub name: String,
}

impl TypeName {
    /// Build a name from its parts
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeName {
            module: module.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "[{}]{}", self.module, self.name)
        } else {
            write!(f, "[{}]{}.{}", self.module, self.namespace, self.name)
        }
    }
}

/// Access to the loaded type definitions, as needed by the signature algebra.
///
/// Implemented by [`crate::Session`].
pub trait TypeResolver {
    /// The canonical form of `class`.
    ///
    /// # Errors
    /// Returns a resolution error if a referenced assembly or type is not loaded.
    fn resolve_class(&self, class: ClassRef) -> Result<TypeSig>;

    /// The qualified name of the type definition behind `class`.
    ///
    /// # Errors
    /// Returns a resolution error if `class` cannot be resolved to a definition.
    fn type_name(&self, class: ClassRef) -> Result<TypeName>;

    /// Find a type definition by qualified name.
    ///
    /// # Errors
    /// Returns [`crate::Error::AssemblyNotFound`] or [`crate::Error::TypeNotFound`].
    fn find_type(&self, name: &TypeName) -> Result<ClassRef>;
}

impl<T: TypeResolver + ?Sized> TypeResolver for &T {
    fn resolve_class(&self, class: ClassRef) -> Result<TypeSig> {
        (**self).resolve_class(class)
    }

    fn type_name(&self, class: ClassRef) -> Result<TypeName> {
        (**self).type_name(class)
    }

    fn find_type(&self, name: &TypeName) -> Result<ClassRef> {
        (**self).find_type(name)
    }
}

fn canonical<'a>(ty: &'a TypeSig, resolver: &dyn TypeResolver) -> Result<Cow<'a, TypeSig>> {
    match ty {
        TypeSig::Class(class) => Ok(Cow::Owned(resolver.resolve_class(*class)?)),
        other => Ok(Cow::Borrowed(other)),
    }
}

/// Structural type equality.
///
/// Class references compare by their resolved definition. Uninstantiated parameters compare
/// by kind only, so a demangled placeholder equals the one it was mangled from.
///
/// # Errors
/// Propagates resolution errors for class references.
pub fn compare_types(a: &TypeSig, b: &TypeSig, resolver: &dyn TypeResolver) -> Result<bool> {
    let a = canonical(a, resolver)?;
    let b = canonical(b, resolver)?;

    Ok(match (a.as_ref(), b.as_ref()) {
        (TypeSig::Primitive(x), TypeSig::Primitive(y)) => x == y,
        (TypeSig::Class(x), TypeSig::Class(y)) => x == y,
        (
            TypeSig::GenericInst { base: xb, args: xa },
            TypeSig::GenericInst { base: yb, args: ya },
        ) => compare_types(xb, yb, resolver)? && compare_type_lists(xa, ya, resolver)?,
        (TypeSig::SzArray(x), TypeSig::SzArray(y))
        | (TypeSig::Boxed(x), TypeSig::Boxed(y))
        | (TypeSig::ByRef(x), TypeSig::ByRef(y))
        | (TypeSig::Ptr(x), TypeSig::Ptr(y)) => compare_types(x, y, resolver)?,
        (TypeSig::Array(x), TypeSig::Array(y)) => compare_arrays(x, y, resolver)?,
        (TypeSig::Var(x), TypeSig::Var(y)) | (TypeSig::MVar(x), TypeSig::MVar(y)) => x == y,
        // Any two uninstantiated parameters are the same kind of placeholder; neither the
        // position nor the originating list takes part in the comparison
        (x, y) if is_uninstantiated(x) && is_uninstantiated(y) => true,
        _ => false,
    })
}

fn is_uninstantiated(ty: &TypeSig) -> bool {
    matches!(
        ty,
        TypeSig::Uninstantiated { .. } | TypeSig::Primitive(ElementType::UninstantiatedGenericParam)
    )
}

fn compare_arrays(a: &ArrayShape, b: &ArrayShape, resolver: &dyn TypeResolver) -> Result<bool> {
    Ok(a.rank == b.rank
        && a.sizes == b.sizes
        && a.lo_bounds == b.lo_bounds
        && compare_types(&a.elem, &b.elem, resolver)?)
}

/// Pairwise equality of two type lists of the same length.
///
/// # Errors
/// Propagates resolution errors for class references.
pub fn compare_type_lists(
    a: &[TypeSig],
    b: &[TypeSig],
    resolver: &dyn TypeResolver,
) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }

    for (x, y) in a.iter().zip(b) {
        if !compare_types(x, y, resolver)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn compare_mods(a: &[CustomMod], b: &[CustomMod], resolver: &dyn TypeResolver) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }

    for (x, y) in a.iter().zip(b) {
        if x.required != y.required
            || !compare_types(&TypeSig::Class(x.class), &TypeSig::Class(y.class), resolver)?
        {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality of two parameter slots: the type and the custom modifiers.
///
/// Names do not take part.
///
/// # Errors
/// Propagates resolution errors for class references.
pub fn compare_params(a: &Param, b: &Param, resolver: &dyn TypeResolver) -> Result<bool> {
    Ok(compare_types(&a.ty, &b.ty, resolver)? && compare_mods(&a.custom_mods, &b.custom_mods, resolver)?)
}

/// Equality of two method signatures.
///
/// # Errors
/// Propagates resolution errors for class references.
pub fn compare_method_sigs(a: &MethodSig, b: &MethodSig, resolver: &dyn TypeResolver) -> Result<bool> {
    if a.has_this != b.has_this
        || a.explicit_this != b.explicit_this
        || a.call_conv != b.call_conv
        || a.params.len() != b.params.len()
    {
        return Ok(false);
    }

    if !compare_params(&a.ret, &b.ret, resolver)? {
        return Ok(false);
    }

    for (x, y) in a.params.iter().zip(&b.params) {
        if !compare_params(x, y, resolver)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality of two possibly instantiated method signatures.
///
/// # Errors
/// Propagates resolution errors for class references.
pub fn compare_method_signatures(
    a: &MethodSignature,
    b: &MethodSignature,
    resolver: &dyn TypeResolver,
) -> Result<bool> {
    match (a, b) {
        (MethodSignature::Method(x), MethodSignature::Method(y)) => {
            compare_method_sigs(x, y, resolver)
        }
        (MethodSignature::Generic(x), MethodSignature::Generic(y)) => Ok(compare_method_sigs(
            &x.method, &y.method, resolver,
        )? && compare_type_lists(&x.args, &y.args, resolver)?),
        _ => Ok(false),
    }
}
