//! Binding of tokens to definitions across modules.
//!
//! References are resolved by name: a `TypeRef` through its resolution scope, a `MemberRef`
//! by name and signature inside the resolved parent type. Signatures are compared in their
//! declared form, before any generic substitution, and the result is then instantiated in the
//! caller's generic context.

use crate::{
    metadata::{
        signatures::{
            compare_method_sigs, compare_types, ClassRef, ElementType, GenericContext,
            GenericMethodSig, MethodSig, MethodSignature, TypeSig,
        },
        tables::{CustomAttributeType, MemberRefParent, MethodDefOrRef, ResolutionScope, TableId},
        token::Token,
        typesystem::{
            FieldId, FieldToCompile, MethodDefId, MethodToCompile, ModuleId, TypeDefId,
            TypeToCompile,
        },
    },
    session::{Session, WellKnownType},
    Error, Result,
};

/// Row of the `<Module>` type holding global members
const GLOBAL_TYPE_ROW: u32 = 1;

impl Session {
    /// Resolve `TypeRef` row `row` of `module` to the definition it names.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] if the scope names a module that is not loaded,
    /// [`Error::TypeNotFound`] if the type is missing or the scope is null, and
    /// [`Error::RecursionLimit`] for cyclic enclosing references.
    pub fn resolve_type_ref(&self, module: ModuleId, row: u32) -> Result<TypeDefId> {
        self.resolve_type_ref_at(module, row, 0)
    }

    fn resolve_type_ref_at(&self, module: ModuleId, row: u32, depth: usize) -> Result<TypeDefId> {
        if depth > self.options.max_signature_depth {
            return Err(Error::RecursionLimit(self.options.max_signature_depth));
        }

        let source = self.module(module)?;
        let (type_ref, namespace, name) = source.type_ref(row)?;
        let not_found = || {
            Error::TypeNotFound(format!(
                "{}: TypeRef {} ({}.{})",
                source.name(),
                row,
                namespace,
                name
            ))
        };

        match type_ref.resolution_scope {
            None => Err(not_found()),
            Some(ResolutionScope::TypeRef(parent)) => {
                let enclosing = self.resolve_type_ref_at(module, parent, depth + 1)?;
                self.module(enclosing.module)?
                    .find_nested(enclosing.row, name)
                    .map(|nested| TypeDefId::new(enclosing.module, nested))
                    .ok_or_else(not_found)
            }
            Some(ResolutionScope::Module(_)) => source
                .find_type(namespace, name)
                .map(|found| TypeDefId::new(module, found))
                .ok_or_else(not_found),
            Some(scope) => {
                let scope_name = source.scope_name(scope)?.ok_or_else(not_found)?;
                let target = self.module_by_name(scope_name)?;
                target
                    .find_type(namespace, name)
                    .map(|found| TypeDefId::new(target.id(), found))
                    .ok_or_else(not_found)
            }
        }
    }

    /// The type definition behind a `TypeDef`, `TypeRef` or `TypeSpec` reference.
    ///
    /// # Errors
    /// Propagates resolution failures. A `TypeSpec` without a single definition behind it
    /// (a pointer, a generic parameter) is [`Error::TypeNotFound`].
    pub fn class_def(&self, class: ClassRef) -> Result<TypeDefId> {
        self.class_def_at(class, 0)
    }

    fn class_def_at(&self, class: ClassRef, depth: usize) -> Result<TypeDefId> {
        match class.token.table_id() {
            Some(TableId::TypeDef) => Ok(TypeDefId::new(class.module, class.token.row())),
            Some(TableId::TypeRef) => self.resolve_type_ref(class.module, class.token.row()),
            Some(TableId::TypeSpec) => {
                let spec = self.module(class.module)?.type_spec(class.token.row())?;
                self.type_def_of_sig_at(&spec, depth + 1)
            }
            _ => Err(Error::IncompatibleIndex(format!(
                "{} is not a TypeDefOrRef token",
                class.token
            ))),
        }
    }

    /// The definition whose layout and members a value of type `ty` uses: the core library
    /// type for primitives, `System.Array` for arrays and the generic definition for
    /// instantiations.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] for by-refs, pointers and generic parameters.
    pub fn type_def_of_sig(&self, ty: &TypeSig) -> Result<TypeDefId> {
        self.type_def_of_sig_at(ty, 0)
    }

    fn type_def_of_sig_at(&self, ty: &TypeSig, depth: usize) -> Result<TypeDefId> {
        if depth > self.options.max_signature_depth {
            return Err(Error::RecursionLimit(self.options.max_signature_depth));
        }

        match ty {
            TypeSig::Primitive(kind) => self.primitive_def(*kind),
            TypeSig::Class(class) => self.class_def_at(*class, depth),
            TypeSig::GenericInst { base, .. } => self.type_def_of_sig_at(base, depth + 1),
            TypeSig::Boxed(inner) => self.type_def_of_sig_at(inner, depth + 1),
            TypeSig::SzArray(_) | TypeSig::Array(_) => self.well_known(WellKnownType::Array),
            TypeSig::ByRef(_)
            | TypeSig::Ptr(_)
            | TypeSig::Var(_)
            | TypeSig::MVar(_)
            | TypeSig::Uninstantiated { .. } => Err(Error::TypeNotFound(format!(
                "{ty} has no type definition"
            ))),
        }
    }

    /// The type a `TypeDef`, `TypeRef` or `TypeSpec` token names, instantiated in the given
    /// generic context.
    ///
    /// # Errors
    /// Propagates resolution and substitution failures.
    pub fn resolve_type(
        &self,
        module: ModuleId,
        token: Token,
        containing_type: Option<&TypeSig>,
        containing_method: Option<&MethodSignature>,
    ) -> Result<TypeToCompile> {
        let class = ClassRef::new(module, token);
        let ty = match token.table_id() {
            Some(TableId::TypeSpec) => {
                let spec = self.module(module)?.type_spec(token.row())?;
                self.context(containing_type, containing_method)
                    .substitute_type(&spec)?
            }
            Some(TableId::TypeDef | TableId::TypeRef) => {
                let id = self.class_def(class)?;
                match self.corlib_primitive(id)? {
                    Some(kind) => TypeSig::Primitive(kind),
                    None => self.type_sig(id),
                }
            }
            _ => {
                return Err(Error::IncompatibleIndex(format!(
                    "{token} is not a type token"
                )))
            }
        };

        Ok(TypeToCompile::new(ty))
    }

    /// Find the method `name` of `owner` with signature `sig`.
    ///
    /// Signatures are compared as declared. A candidate carrying a signature hook attribute is
    /// compared a second time with the rewritten signature. Vararg call sites match on the
    /// parameters before their sentinel. A delegate's `.ctor(object, native int)` matches a
    /// definition declared with a method pointer as second parameter.
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if no method matches, and hook and resolution errors.
    pub fn get_method_def(&self, name: &str, owner: TypeDefId, sig: &MethodSig) -> Result<MethodDefId> {
        let module = self.module(owner.module)?;
        let ty = module.type_def(owner.row)?;

        let wanted = fixed_part(sig);
        let delegate_ctor = name == ".ctor" && self.is_delegate(owner)?;

        for candidate in module.methods_of(ty) {
            if candidate.name != name
                || candidate.signature.gen_param_count != sig.gen_param_count
            {
                continue;
            }

            let id = MethodDefId::new(owner.module, candidate.row);
            let mut declared = candidate.signature.clone();
            if delegate_ctor {
                rewrite_delegate_ctor(&mut declared);
            }
            if compare_method_sigs(&declared, &wanted, self)? {
                return Ok(id);
            }

            if let Some(hooked) = self.apply_signature_hooks(id, &declared.clone().into())? {
                if compare_method_sigs(hooked.method(), &wanted, self)? {
                    return Ok(id);
                }
            }
        }

        let (namespace, type_name) = module.full_name(owner.row)?;
        Err(Error::MemberNotFound(format!(
            "[{}]{}.{}::{} {}",
            module.name(),
            namespace,
            type_name,
            name,
            sig
        )))
    }

    /// Find the field `name` of `owner` with type `ty`.
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if no field matches.
    pub fn get_field_def(&self, name: &str, owner: TypeDefId, ty: &TypeSig) -> Result<FieldId> {
        let module = self.module(owner.module)?;
        let definition = module.type_def(owner.row)?;

        for candidate in module.fields_of(definition) {
            if candidate.name == name && compare_types(&candidate.signature.ty.ty, ty, self)? {
                return Ok(FieldId::new(owner.module, candidate.row));
            }
        }

        let (namespace, type_name) = module.full_name(owner.row)?;
        Err(Error::MemberNotFound(format!(
            "[{}]{}.{}::{} : {}",
            module.name(),
            namespace,
            type_name,
            name,
            ty
        )))
    }

    /// Resolve a `MethodDef`, `MemberRef` or `MethodSpec` token used inside the generic
    /// context (`containing_type`, `containing_method`).
    ///
    /// # Errors
    /// Propagates resolution, signature and hook errors.
    pub fn resolve_method(
        &self,
        module: ModuleId,
        token: Token,
        containing_type: Option<&TypeSig>,
        containing_method: Option<&MethodSignature>,
    ) -> Result<MethodToCompile> {
        match token.table_id() {
            Some(TableId::MethodDef) => {
                let id = MethodDefId::new(module, token.row());
                let owner = self.owner_sig(id, containing_type)?;
                self.instantiate_method(
                    id,
                    owner,
                    containing_method.and_then(MethodSignature::generic_args),
                    true,
                )
            }
            Some(TableId::MemberRef) => {
                let (id, owner) = self.member_ref_method(
                    module,
                    token.row(),
                    containing_type,
                    containing_method,
                )?;
                self.instantiate_method(
                    id,
                    owner,
                    containing_method.and_then(MethodSignature::generic_args),
                    true,
                )
            }
            Some(TableId::MethodSpec) => {
                let source = self.module(module)?;
                let spec = source.tables().method_spec.get(token.row()).ok_or_else(|| {
                    Error::MemberNotFound(format!("{}: MethodSpec {}", source.name(), token))
                })?;
                let Some(method) = spec.method else {
                    return Err(malformed_error!("MethodSpec {} has a null method", token));
                };

                let context = self.context(containing_type, containing_method);
                let args = source
                    .method_spec_args(token.row())?
                    .args
                    .iter()
                    .map(|arg| context.substitute_type(arg))
                    .collect::<Result<Vec<_>>>()?;

                let (id, owner) = match method {
                    MethodDefOrRef::MethodDef(row) => {
                        let id = MethodDefId::new(module, row);
                        (id, self.owner_sig(id, containing_type)?)
                    }
                    MethodDefOrRef::MemberRef(row) => {
                        self.member_ref_method(module, row, containing_type, containing_method)?
                    }
                };

                let base = self.instantiate_method(id, owner, Some(&args), true)?;
                Ok(MethodToCompile {
                    signature: MethodSignature::Generic(GenericMethodSig {
                        method: base.signature.method().clone(),
                        args,
                    }),
                    ..base
                })
            }
            _ => Err(Error::IncompatibleIndex(format!(
                "{token} is not a method token"
            ))),
        }
    }

    /// Resolve a `Field` or `MemberRef` token used inside the given generic context.
    ///
    /// # Errors
    /// Propagates resolution and signature errors.
    pub fn resolve_field(
        &self,
        module: ModuleId,
        token: Token,
        containing_type: Option<&TypeSig>,
        containing_method: Option<&MethodSignature>,
    ) -> Result<FieldToCompile> {
        let (id, owner) = match token.table_id() {
            Some(TableId::Field) => {
                let field = self.module(module)?.field(token.row())?;
                let owner_id = TypeDefId::new(module, field.owner);
                (
                    FieldId::new(module, field.row),
                    self.instantiated_owner(owner_id, containing_type)?,
                )
            }
            Some(TableId::MemberRef) => {
                let source = self.module(module)?;
                let member = source.tables().member_ref.get(token.row()).ok_or_else(|| {
                    Error::MemberNotFound(format!("{}: MemberRef {}", source.name(), token))
                })?;
                let name = source.string(member.name)?;
                let declared = source.signature_parser(member.signature)?.parse_field_signature()?;

                let (owner_id, owner) =
                    self.member_parent(module, member.class, containing_type, containing_method)?;
                (self.get_field_def(name, owner_id, &declared.ty.ty)?, owner)
            }
            _ => {
                return Err(Error::IncompatibleIndex(format!(
                    "{token} is not a field token"
                )))
            }
        };

        let field = self.field_def(id)?;
        let ty = self
            .context(Some(&owner), None)
            .substitute_type(&field.signature.ty.ty)?;

        Ok(FieldToCompile {
            field: id,
            name: field.name.clone(),
            owner,
            ty,
        })
    }

    /// The uninstantiated compilation request for a method definition.
    ///
    /// # Errors
    /// Propagates lookup and hook errors.
    pub fn method_to_compile(&self, id: MethodDefId) -> Result<MethodToCompile> {
        let owner = self.owner_sig(id, None)?;
        self.instantiate_method(id, owner, None, true)
    }

    /// The constructor of a custom attribute, as declared. Signature hooks are not applied to
    /// attribute constructors.
    pub(crate) fn attribute_constructor(
        &self,
        module: ModuleId,
        constructor: CustomAttributeType,
    ) -> Result<MethodToCompile> {
        let (id, owner) = match constructor {
            CustomAttributeType::MethodDef(row) => {
                let id = MethodDefId::new(module, row);
                (id, self.owner_sig(id, None)?)
            }
            CustomAttributeType::MemberRef(row) => self.member_ref_method(module, row, None, None)?,
        };

        self.instantiate_method(id, owner, None, false)
    }

    /// The entry point of `module`, `None` for libraries and native entry points.
    ///
    /// # Errors
    /// Propagates lookup and hook errors.
    pub fn entry_point(&self, module: ModuleId) -> Result<Option<MethodToCompile>> {
        match self.module(module)?.entry_point() {
            Some(token) => self.resolve_method(module, token, None, None).map(Some),
            None => Ok(None),
        }
    }

    fn context<'a>(
        &self,
        containing_type: Option<&'a TypeSig>,
        containing_method: Option<&'a MethodSignature>,
    ) -> GenericContext<'a> {
        GenericContext::new(containing_type, containing_method)
            .with_max_depth(self.options.max_signature_depth)
    }

    fn owner_sig(&self, id: MethodDefId, containing_type: Option<&TypeSig>) -> Result<TypeSig> {
        let method = self.method_def(id)?;
        self.instantiated_owner(TypeDefId::new(id.module, method.owner), containing_type)
    }

    /// `containing_type` if it is an instantiation of `owner`, else the plain definition
    fn instantiated_owner(&self, owner: TypeDefId, containing_type: Option<&TypeSig>) -> Result<TypeSig> {
        if let Some(containing) = containing_type {
            if containing.generic_instance().is_some() && self.type_def_of_sig(containing)? == owner {
                return Ok(containing.clone());
            }
        }

        Ok(self.type_sig(owner))
    }

    /// Definition and instantiated parent of a method `MemberRef`
    fn member_ref_method(
        &self,
        module: ModuleId,
        row: u32,
        containing_type: Option<&TypeSig>,
        containing_method: Option<&MethodSignature>,
    ) -> Result<(MethodDefId, TypeSig)> {
        let source = self.module(module)?;
        let member = source.tables().member_ref.get(row).ok_or_else(|| {
            Error::MemberNotFound(format!("{}: MemberRef row {}", source.name(), row))
        })?;
        let name = source.string(member.name)?;

        if let Some(MemberRefParent::MethodDef(def)) = member.class {
            let id = MethodDefId::new(module, def);
            return Ok((id, self.owner_sig(id, containing_type)?));
        }

        let mut declared = source.signature_parser(member.signature)?.parse_method_signature()?;
        let (owner_id, owner) =
            self.member_parent(module, member.class, containing_type, containing_method)?;

        if name == ".ctor" && self.is_delegate(owner_id)? {
            rewrite_delegate_ctor(&mut declared);
        }

        Ok((self.get_method_def(name, owner_id, &declared)?, owner))
    }

    /// Definition and instantiated signature of a `MemberRef` parent
    fn member_parent(
        &self,
        module: ModuleId,
        parent: Option<MemberRefParent>,
        containing_type: Option<&TypeSig>,
        containing_method: Option<&MethodSignature>,
    ) -> Result<(TypeDefId, TypeSig)> {
        match parent {
            Some(MemberRefParent::TypeDef(row)) => {
                let id = TypeDefId::new(module, row);
                Ok((id, self.instantiated_owner(id, containing_type)?))
            }
            Some(MemberRefParent::TypeRef(row)) => {
                let id = self.resolve_type_ref(module, row)?;
                Ok((id, self.type_sig(id)))
            }
            Some(MemberRefParent::TypeSpec(row)) => {
                let spec = self.module(module)?.type_spec(row)?;
                let spec = self
                    .context(containing_type, containing_method)
                    .substitute_type(&spec)?;
                Ok((self.type_def_of_sig(&spec)?, spec))
            }
            Some(MemberRefParent::ModuleRef(row)) => {
                let source = self.module(module)?;
                let scope = ResolutionScope::ModuleRef(row);
                let target = match source.scope_name(scope)? {
                    Some(name) => self.module_by_name(name)?.id(),
                    None => module,
                };
                let id = TypeDefId::new(target, GLOBAL_TYPE_ROW);
                Ok((id, self.type_sig(id)))
            }
            Some(MemberRefParent::MethodDef(row)) => {
                let method = self.module(module)?.method_def(row)?;
                let id = TypeDefId::new(module, method.owner);
                Ok((id, self.type_sig(id)))
            }
            None => Err(malformed_error!("MemberRef with a null parent")),
        }
    }

    /// The request for `id` with hooks applied and the owner's and method's arguments
    /// substituted
    fn instantiate_method(
        &self,
        id: MethodDefId,
        owner: TypeSig,
        method_args: Option<&[TypeSig]>,
        hooks: bool,
    ) -> Result<MethodToCompile> {
        let method = self.method_def(id)?;

        let declared: MethodSignature = method.signature.clone().into();
        let declared = if hooks {
            self.apply_signature_hooks(id, &declared)?.unwrap_or(declared)
        } else {
            declared
        };

        let type_args = owner.generic_instance().map(|(_, args)| args);
        let owner_def = self.type_def(TypeDefId::new(id.module, method.owner))?;
        let type_names = owner_def.generic_param_names();
        let method_names = method.generic_param_names();
        let signature = GenericContext::from_args(type_args, method_args)
            .with_param_names(&type_names, &method_names)
            .with_max_depth(self.options.max_signature_depth)
            .substitute_method_signature(&declared)?;

        Ok(MethodToCompile {
            method: id,
            name: method.name.clone(),
            owner,
            signature,
        })
    }
}

/// Parameters before a vararg sentinel
fn fixed_part(sig: &MethodSig) -> MethodSig {
    match sig.sentinel {
        Some(sentinel) => MethodSig {
            params: sig.params[..sentinel.min(sig.params.len())].to_vec(),
            sentinel: None,
            ..sig.clone()
        },
        None => sig.clone(),
    }
}

/// Delegates take the target method as a method pointer rather than a native int.
fn rewrite_delegate_ctor(sig: &mut MethodSig) {
    if sig.params.len() == 2 && sig.params[1].ty == TypeSig::Primitive(ElementType::I) {
        sig.params[1].ty = TypeSig::Primitive(ElementType::VirtFtnPtr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{CallConv, Param};

    #[test]
    fn delegate_ctor_rewrite() {
        let mut sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![
                TypeSig::Primitive(ElementType::Object),
                TypeSig::Primitive(ElementType::I),
            ],
        )
        .with_this();
        rewrite_delegate_ctor(&mut sig);
        assert_eq!(sig.params[1].ty, TypeSig::Primitive(ElementType::VirtFtnPtr));

        let mut other = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![TypeSig::Primitive(ElementType::I)],
        );
        rewrite_delegate_ctor(&mut other);
        assert_eq!(other.params[0].ty, TypeSig::Primitive(ElementType::I));
    }

    #[test]
    fn vararg_fixed_part() {
        let sig = MethodSig {
            call_conv: CallConv::VarArg,
            params: vec![
                Param::new(TypeSig::Primitive(ElementType::I4)),
                Param::new(TypeSig::Primitive(ElementType::R8)),
            ],
            sentinel: Some(1),
            ..MethodSig::default()
        };

        let fixed = fixed_part(&sig);
        assert_eq!(fixed.params.len(), 1);
        assert_eq!(fixed.sentinel, None);
        assert_eq!(fixed.call_conv, CallConv::VarArg);
    }
}
