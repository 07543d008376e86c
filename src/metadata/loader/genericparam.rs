use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::{TableId, TypeOrMethodDef},
        typesystem::GenericParamDefinition,
    },
    Result,
};

/// Attaches generic parameters to their owning type or method
pub(crate) struct GenericParamPass;

impl LoadPass for GenericParamPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let strings = context.strings;

        for row in tables.generic_param.iter() {
            let param = GenericParamDefinition {
                number: row.number,
                flags: row.flags,
                name: strings.get(row.name as usize)?.to_string(),
                constraints: Vec::new(),
            };

            let list = match row.owner {
                Some(TypeOrMethodDef::TypeDef(owner)) => &mut context.type_mut(owner)?.generic_params,
                Some(TypeOrMethodDef::MethodDef(owner)) => {
                    &mut context.method_mut(owner)?.generic_params
                }
                None => return Err(malformed_error!("GenericParam {} has no owner", row.rid)),
            };
            list.push(param);
        }

        for ty in &mut context.types {
            ty.generic_params.sort_by_key(|p| p.number);
        }
        for method in &mut context.methods {
            method.generic_params.sort_by_key(|p| p.number);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::GenericParam
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::TypeDef]
    }
}

/// Attaches constraints to the generic parameters they restrict
pub(crate) struct GenericParamConstraintPass;

impl LoadPass for GenericParamConstraintPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;

        for row in tables.generic_param_constraint.iter() {
            let Some(constraint) = row.constraint else {
                continue;
            };
            let param = tables
                .generic_param
                .get(row.owner)
                .ok_or_else(|| malformed_error!("GenericParam index {} out of range", row.owner))?;

            let list = match param.owner {
                Some(TypeOrMethodDef::TypeDef(owner)) => &mut context.type_mut(owner)?.generic_params,
                Some(TypeOrMethodDef::MethodDef(owner)) => {
                    &mut context.method_mut(owner)?.generic_params
                }
                None => continue,
            };
            if let Some(target) = list.iter_mut().find(|p| p.number == param.number) {
                target.constraints.push(constraint);
            }
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::GenericParamConstraint
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::GenericParam]
    }
}
