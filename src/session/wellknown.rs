use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::{
    metadata::{
        signatures::{ElementType, TypeSig},
        tables::TypeDefOrRef,
        typesystem::{ModuleId, TypeDefId},
    },
    session::Session,
    Error, Result,
};

/// Core library types the front end needs to recognise by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
pub enum WellKnownType {
    /// `System.Object`
    Object,
    /// `System.ValueType`
    ValueType,
    /// `System.Enum`
    Enum,
    /// `System.Delegate`
    Delegate,
    /// `System.MulticastDelegate`
    MulticastDelegate,
    /// ``System.Nullable`1``
    #[strum(serialize = "Nullable`1")]
    Nullable,
    /// `System.Array`
    Array,
}

impl WellKnownType {
    /// Simple name inside the `System` namespace
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl Session {
    /// Find a well-known type in the core library. Successful lookups are cached; a failed one
    /// is retried on the next call, so the core library may be loaded late.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] if the core library is not loaded and
    /// [`Error::TypeNotFound`] if it does not define the type.
    pub fn well_known(&self, which: WellKnownType) -> Result<TypeDefId> {
        let slot = &self.well_known[which as usize];
        if let Some(id) = slot.get() {
            return Ok(*id);
        }

        let corlib = self.module_by_name(&self.options.corlib_name)?;
        let row = corlib.find_type("System", which.name()).ok_or_else(|| {
            Error::TypeNotFound(format!("[{}]System.{}", corlib.name(), which.name()))
        })?;

        Ok(*slot.get_or_init(|| TypeDefId::new(corlib.id(), row)))
    }

    /// The definition `System.<name>` of the core library
    pub(crate) fn corlib_type(&self, name: &str) -> Result<TypeDefId> {
        let corlib = self.module_by_name(&self.options.corlib_name)?;
        let row = corlib.find_type("System", name).ok_or_else(|| {
            Error::TypeNotFound(format!("[{}]System.{}", corlib.name(), name))
        })?;

        Ok(TypeDefId::new(corlib.id(), row))
    }

    /// The resolved base type of `id`, `None` at the root of the hierarchy.
    ///
    /// # Errors
    /// Propagates resolution failures of the `extends` reference.
    pub fn base_type(&self, id: TypeDefId) -> Result<Option<TypeDefId>> {
        let Some(extends) = self.type_def(id)?.extends else {
            return Ok(None);
        };

        self.type_def_or_ref(id.module, extends).map(Some)
    }

    pub(crate) fn type_def_or_ref(&self, module: ModuleId, index: TypeDefOrRef) -> Result<TypeDefId> {
        match index {
            TypeDefOrRef::TypeDef(row) => Ok(TypeDefId::new(module, row)),
            TypeDefOrRef::TypeRef(row) => self.resolve_type_ref(module, row),
            TypeDefOrRef::TypeSpec(row) => {
                let spec = self.module(module)?.type_spec(row)?;
                self.type_def_of_sig(&spec)
            }
        }
    }

    /// True for value types: a type is a value type if it derives from `System.ValueType` or
    /// `System.Enum`, other than `System.Enum` itself.
    ///
    /// # Errors
    /// Propagates resolution failures and [`Error::RecursionLimit`] for cyclic inheritance.
    pub fn is_value_type(&self, id: TypeDefId) -> Result<bool> {
        if let Some(cached) = self.type_def(id)?.value_type.get() {
            return Ok(*cached);
        }

        let value_type = self.well_known(WellKnownType::ValueType)?;
        let enum_type = self.well_known(WellKnownType::Enum)?;

        let mut result = false;
        if id != enum_type {
            let mut current = id;
            let mut depth = 0;
            while let Some(base) = self.base_type(current)? {
                if base == value_type || base == enum_type {
                    result = true;
                    break;
                }
                if let Some(cached) = self.type_def(base)?.value_type.get() {
                    result = *cached;
                    break;
                }

                depth += 1;
                if depth > self.options.max_signature_depth {
                    return Err(Error::RecursionLimit(self.options.max_signature_depth));
                }
                current = base;
            }
        }

        Ok(*self.type_def(id)?.value_type.get_or_init(|| result))
    }

    /// True for types deriving from `System.Enum`, excluding `System.Enum` itself.
    ///
    /// # Errors
    /// See [`Session::is_value_type`].
    pub fn is_enum(&self, id: TypeDefId) -> Result<bool> {
        if let Some(cached) = self.type_def(id)?.enum_type.get() {
            return Ok(*cached);
        }

        let enum_type = self.well_known(WellKnownType::Enum)?;
        let result = id != enum_type && self.derives_from(id, enum_type)?;

        Ok(*self.type_def(id)?.enum_type.get_or_init(|| result))
    }

    /// True for `System.Delegate` and everything deriving from it.
    ///
    /// # Errors
    /// See [`Session::is_value_type`].
    pub fn is_delegate(&self, id: TypeDefId) -> Result<bool> {
        if let Some(cached) = self.type_def(id)?.delegate_type.get() {
            return Ok(*cached);
        }

        let delegate = self.well_known(WellKnownType::Delegate)?;
        let result = id == delegate || self.derives_from(id, delegate)?;

        Ok(*self.type_def(id)?.delegate_type.get_or_init(|| result))
    }

    /// True if `ancestor` is a proper base of `id`.
    ///
    /// # Errors
    /// See [`Session::is_value_type`].
    pub fn derives_from(&self, id: TypeDefId, ancestor: TypeDefId) -> Result<bool> {
        let mut current = id;
        let mut depth = 0;

        while let Some(base) = self.base_type(current)? {
            if base == ancestor {
                return Ok(true);
            }

            depth += 1;
            if depth > self.options.max_signature_depth {
                return Err(Error::RecursionLimit(self.options.max_signature_depth));
            }
            current = base;
        }

        Ok(false)
    }

    /// True if values of `ty` are stored inline.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn sig_is_value_type(&self, ty: &TypeSig) -> Result<bool> {
        match ty {
            TypeSig::Primitive(kind) => Ok(kind.is_value_type()),
            TypeSig::Class(_) | TypeSig::GenericInst { .. } => {
                let id = self.type_def_of_sig(ty)?;
                self.is_value_type(id)
            }
            TypeSig::Boxed(_)
            | TypeSig::SzArray(_)
            | TypeSig::Array(_)
            | TypeSig::ByRef(_)
            | TypeSig::Ptr(_)
            | TypeSig::Var(_)
            | TypeSig::MVar(_)
            | TypeSig::Uninstantiated { .. } => Ok(false),
        }
    }

    /// The core library definition backing a primitive
    pub(crate) fn primitive_def(&self, kind: ElementType) -> Result<TypeDefId> {
        let name = kind
            .system_name()
            .ok_or_else(|| Error::TypeNotFound(format!("{kind:?} has no core library type")))?;
        self.corlib_type(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names() {
        let names: Vec<_> = WellKnownType::iter().map(WellKnownType::name).collect();
        assert_eq!(
            names,
            [
                "Object",
                "ValueType",
                "Enum",
                "Delegate",
                "MulticastDelegate",
                "Nullable`1",
                "Array"
            ]
        );
        assert_eq!(WellKnownType::COUNT, 7);
    }
}
