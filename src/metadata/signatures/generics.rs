//! Generic parameter substitution.
//!
//! `!n` is replaced by argument `n` of the containing type's instantiation and `!!n` by
//! argument `n` of the containing method's instantiation. Arguments are taken as they are:
//! they already belong to the caller's frame and are not substituted a second time.
//!
//! A parameter without an instantiation to draw from becomes [`TypeSig::Uninstantiated`]. That
//! is not an error: later stages can still see which position it stood for.

use crate::{
    config::DEFAULT_MAX_SIGNATURE_DEPTH,
    metadata::signatures::{
        ArrayShape, GenericMethodSig, GenericOrigin, MethodSig, MethodSignature, Param,
        TypeSig,
    },
    Error, Result,
};

/// What generic parameters are substituted with.
#[derive(Debug, Clone, Copy)]
pub struct GenericContext<'a> {
    type_args: Option<&'a [TypeSig]>,
    method_args: Option<&'a [TypeSig]>,
    type_param_names: &'a [String],
    method_param_names: &'a [String],
    max_depth: usize,
}

impl Default for GenericContext<'_> {
    fn default() -> Self {
        GenericContext {
            type_args: None,
            method_args: None,
            type_param_names: &[],
            method_param_names: &[],
            max_depth: DEFAULT_MAX_SIGNATURE_DEPTH,
        }
    }
}

impl<'a> GenericContext<'a> {
    /// Context of a member of `containing_type` called as `containing_method`.
    ///
    /// The type may be a generic instantiation, also behind one boxed, by-ref or pointer
    /// wrapper. Either side may be absent.
    #[must_use]
    pub fn new(
        containing_type: Option<&'a TypeSig>,
        containing_method: Option<&'a MethodSignature>,
    ) -> Self {
        GenericContext {
            type_args: containing_type
                .and_then(TypeSig::generic_instance)
                .map(|(_, args)| args),
            method_args: containing_method.and_then(MethodSignature::generic_args),
            ..GenericContext::default()
        }
    }

    /// Context with explicit argument lists
    #[must_use]
    pub fn from_args(type_args: Option<&'a [TypeSig]>, method_args: Option<&'a [TypeSig]>) -> Self {
        GenericContext {
            type_args,
            method_args,
            ..GenericContext::default()
        }
    }

    /// Names recorded on uninstantiated parameters
    #[must_use]
    pub fn with_param_names(mut self, type_params: &'a [String], method_params: &'a [String]) -> Self {
        self.type_param_names = type_params;
        self.method_param_names = method_params;
        self
    }

    /// Nesting limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// True if neither a type nor a method instantiation is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_none() && self.method_args.is_none()
    }

    /// Substitute inside a type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a parameter index past the argument list
    /// and [`crate::Error::RecursionLimit`] for over-deep nesting.
    pub fn substitute_type(&self, ty: &TypeSig) -> Result<TypeSig> {
        self.substitute(ty, 0)
    }

    fn substitute(&self, ty: &TypeSig, depth: usize) -> Result<TypeSig> {
        if depth > self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        let next = depth + 1;

        Ok(match ty {
            TypeSig::Var(index) => {
                self.lookup(*index, self.type_args, self.type_param_names, GenericOrigin::Type)?
            }
            TypeSig::MVar(index) => self.lookup(
                *index,
                self.method_args,
                self.method_param_names,
                GenericOrigin::Method,
            )?,
            TypeSig::Primitive(_) | TypeSig::Class(_) | TypeSig::Uninstantiated { .. } => {
                ty.clone()
            }
            TypeSig::Boxed(inner) => TypeSig::Boxed(Box::new(self.substitute(inner, next)?)),
            TypeSig::SzArray(inner) => TypeSig::SzArray(Box::new(self.substitute(inner, next)?)),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(self.substitute(inner, next)?)),
            TypeSig::Ptr(inner) => TypeSig::Ptr(Box::new(self.substitute(inner, next)?)),
            TypeSig::Array(shape) => TypeSig::Array(Box::new(ArrayShape {
                elem: self.substitute(&shape.elem, next)?,
                rank: shape.rank,
                sizes: shape.sizes.clone(),
                lo_bounds: shape.lo_bounds.clone(),
            })),
            TypeSig::GenericInst { base, args } => TypeSig::GenericInst {
                base: Box::new(self.substitute(base, next)?),
                args: args
                    .iter()
                    .map(|arg| self.substitute(arg, next))
                    .collect::<Result<Vec<_>>>()?,
            },
        })
    }

    fn lookup(
        &self,
        index: u32,
        args: Option<&[TypeSig]>,
        names: &[String],
        origin: GenericOrigin,
    ) -> Result<TypeSig> {
        match args {
            Some(args) => args.get(index as usize).cloned().ok_or_else(|| {
                Error::InvalidSignature(format!(
                    "generic parameter {index} out of range, {} arguments",
                    args.len()
                ))
            }),
            None => {
                log::trace!("no instantiation for {origin:?} parameter {index}");
                Ok(TypeSig::Uninstantiated {
                    index,
                    name: names.get(index as usize).cloned(),
                    origin,
                })
            }
        }
    }

    /// Substitute inside a parameter slot, keeping its name and modifiers.
    ///
    /// # Errors
    /// See [`GenericContext::substitute_type`].
    pub fn substitute_param(&self, param: &Param) -> Result<Param> {
        Ok(Param {
            ty: self.substitute_type(&param.ty)?,
            custom_mods: param.custom_mods.clone(),
            pinned: param.pinned,
            name: param.name.clone(),
        })
    }

    /// Substitute inside every slot of a method signature.
    ///
    /// # Errors
    /// See [`GenericContext::substitute_type`].
    pub fn substitute_method_sig(&self, sig: &MethodSig) -> Result<MethodSig> {
        Ok(MethodSig {
            ret: self.substitute_param(&sig.ret)?,
            params: sig
                .params
                .iter()
                .map(|param| self.substitute_param(param))
                .collect::<Result<Vec<_>>>()?,
            ..sig.clone()
        })
    }

    /// Substitute inside a possibly instantiated method signature, arguments included.
    ///
    /// # Errors
    /// See [`GenericContext::substitute_type`].
    pub fn substitute_method_signature(&self, sig: &MethodSignature) -> Result<MethodSignature> {
        Ok(match sig {
            MethodSignature::Method(method) => {
                MethodSignature::Method(self.substitute_method_sig(method)?)
            }
            MethodSignature::Generic(generic) => MethodSignature::Generic(GenericMethodSig {
                method: self.substitute_method_sig(&generic.method)?,
                args: generic
                    .args
                    .iter()
                    .map(|arg| self.substitute_type(arg))
                    .collect::<Result<Vec<_>>>()?,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{compare_types, ElementType, TestResolver},
        token::Token,
        typesystem::ModuleId,
    };

    fn list_of(arg: TypeSig) -> TypeSig {
        TypeSig::GenericInst {
            base: Box::new(TypeSig::class(ModuleId(0), Token(0x0200_0002))),
            args: vec![arg],
        }
    }

    #[test]
    fn type_parameters() {
        let owner = list_of(TypeSig::Primitive(ElementType::I4));
        let ctx = GenericContext::new(Some(&owner), None);

        let ty = TypeSig::SzArray(Box::new(TypeSig::Var(0)));
        assert_eq!(
            ctx.substitute_type(&ty).unwrap(),
            TypeSig::SzArray(Box::new(TypeSig::Primitive(ElementType::I4)))
        );

        assert!(matches!(
            ctx.substitute_type(&TypeSig::Var(1)),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn through_wrappers() {
        let owner = TypeSig::ByRef(Box::new(list_of(TypeSig::Primitive(ElementType::String))));
        let ctx = GenericContext::new(Some(&owner), None);
        assert_eq!(
            ctx.substitute_type(&TypeSig::Var(0)).unwrap(),
            TypeSig::Primitive(ElementType::String)
        );
    }

    #[test]
    fn method_parameters() {
        let call: MethodSignature = MethodSignature::Generic(GenericMethodSig {
            method: MethodSig::default(),
            args: vec![TypeSig::Primitive(ElementType::R8)],
        });
        let ctx = GenericContext::new(None, Some(&call));

        let sig = MethodSig::new(TypeSig::MVar(0), vec![TypeSig::Ptr(Box::new(TypeSig::MVar(0)))]);
        let resolved = ctx.substitute_method_sig(&sig).unwrap();
        assert_eq!(resolved.ret.ty, TypeSig::Primitive(ElementType::R8));
        assert_eq!(
            resolved.params[0].ty,
            TypeSig::Ptr(Box::new(TypeSig::Primitive(ElementType::R8)))
        );
    }

    #[test]
    fn uninstantiated_fallback() {
        let names = vec!["T".to_string()];
        let ctx = GenericContext::default().with_param_names(&names, &[]);

        assert_eq!(
            ctx.substitute_type(&TypeSig::Var(0)).unwrap(),
            TypeSig::Uninstantiated {
                index: 0,
                name: Some("T".to_string()),
                origin: GenericOrigin::Type,
            }
        );
        assert!(matches!(
            ctx.substitute_type(&TypeSig::MVar(2)).unwrap(),
            TypeSig::Uninstantiated { index: 2, name: None, origin: GenericOrigin::Method }
        ));
    }

    #[test]
    fn closed_types_unchanged() {
        let resolver = TestResolver::default();
        let closed = TypeSig::Array(Box::new(ArrayShape {
            elem: list_of(TypeSig::Primitive(ElementType::U1)),
            rank: 3,
            sizes: vec![2, 2],
            lo_bounds: vec![],
        }));
        let plain_owner = TypeSig::class(ModuleId(0), Token(0x0200_0005));
        let ctx = GenericContext::new(Some(&plain_owner), None);

        let resolved = ctx.substitute_type(&closed).unwrap();
        assert!(compare_types(&resolved, &closed, &resolver).unwrap());
    }

    #[test]
    fn depth_guard() {
        let mut ty = TypeSig::Primitive(ElementType::I4);
        for _ in 0..10 {
            ty = TypeSig::Ptr(Box::new(ty));
        }
        let ctx = GenericContext::default().with_max_depth(4);
        assert!(matches!(ctx.substitute_type(&ty), Err(Error::RecursionLimit(4))));
    }
}
