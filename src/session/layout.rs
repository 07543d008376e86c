use crate::{
    metadata::{
        signatures::{compare_method_sigs, ElementType, TypeSig},
        typesystem::{FieldId, InstanceField, MethodDefId, TypeDefId},
    },
    session::{Session, WellKnownType},
    Error, Result,
};

/// Slots the runtime adds to every object header, after the fields of `System.Object`
const OBJECT_HEADER_FIELDS: [(&str, ElementType); 2] = [
    ("__object_id", ElementType::I4),
    ("__mutex_lock", ElementType::I8),
];

impl Session {
    /// The virtual method table of `id`, base slots first.
    ///
    /// A `newslot` virtual method always takes a new slot. Any other virtual method replaces
    /// the first inherited slot with the same name and signature, and takes a new slot if
    /// there is none. The result is cached on the type.
    ///
    /// # Errors
    /// Propagates resolution failures and [`Error::RecursionLimit`] for cyclic inheritance.
    pub fn get_all_virtual_methods(&self, id: TypeDefId) -> Result<&[MethodDefId]> {
        self.virtual_methods_at(id, 0)
    }

    fn virtual_methods_at(&self, id: TypeDefId, depth: usize) -> Result<&[MethodDefId]> {
        let module = self.module(id.module)?;
        let ty = module.type_def(id.row)?;
        if let Some(cached) = ty.virtual_methods.get() {
            return Ok(cached);
        }
        if depth > self.options.max_signature_depth {
            return Err(Error::RecursionLimit(self.options.max_signature_depth));
        }

        let mut slots = match self.base_type(id)? {
            Some(base) => self.virtual_methods_at(base, depth + 1)?.to_vec(),
            None => Vec::new(),
        };
        let inherited = slots.len();

        for method in module.methods_of(ty).filter(|method| method.is_virtual()) {
            let method_id = MethodDefId::new(id.module, method.row);
            if method.is_new_slot() {
                slots.push(method_id);
                continue;
            }

            let mut overridden = None;
            for (index, slot) in slots[..inherited].iter().enumerate() {
                let base = self.method_def(*slot)?;
                if base.name == method.name
                    && compare_method_sigs(&base.signature, &method.signature, self)?
                {
                    overridden = Some(index);
                    break;
                }
            }

            match overridden {
                Some(index) => slots[index] = method_id,
                None => slots.push(method_id),
            }
        }

        log::trace!(
            "{}: {} virtual slots, {} inherited",
            ty.name,
            slots.len(),
            inherited
        );
        Ok(ty.virtual_methods.get_or_init(|| slots))
    }

    /// Every instance field an object of type `id` holds, base fields first.
    ///
    /// Value types do not include the fields of their base. `System.Object` ends with the
    /// object header slots `__object_id` (int32) and `__mutex_lock` (int64), which have no
    /// field row. The result is cached on the type.
    ///
    /// # Errors
    /// Propagates resolution failures and [`Error::RecursionLimit`] for cyclic inheritance.
    pub fn get_all_instance_fields(&self, id: TypeDefId) -> Result<&[InstanceField]> {
        self.instance_fields_at(id, 0)
    }

    fn instance_fields_at(&self, id: TypeDefId, depth: usize) -> Result<&[InstanceField]> {
        let module = self.module(id.module)?;
        let ty = module.type_def(id.row)?;
        if let Some(cached) = ty.instance_fields.get() {
            return Ok(cached);
        }
        if depth > self.options.max_signature_depth {
            return Err(Error::RecursionLimit(self.options.max_signature_depth));
        }

        let mut fields = Vec::new();
        if !self.is_value_type(id)? {
            if let Some(base) = self.base_type(id)? {
                fields.extend_from_slice(self.instance_fields_at(base, depth + 1)?);
            }
        }

        fields.extend(
            module
                .fields_of(ty)
                .filter(|field| !field.is_static())
                .map(|field| InstanceField {
                    owner: id,
                    field: Some(FieldId::new(id.module, field.row)),
                    name: field.name.clone(),
                    ty: field.signature.ty.ty.clone(),
                }),
        );

        if self.well_known(WellKnownType::Object)? == id {
            fields.extend(OBJECT_HEADER_FIELDS.iter().map(|(name, kind)| InstanceField {
                owner: id,
                field: None,
                name: (*name).to_string(),
                ty: TypeSig::Primitive(*kind),
            }));
        }

        Ok(ty.instance_fields.get_or_init(|| fields))
    }
}
