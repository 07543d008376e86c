use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::{HasConstant, TableId},
        typesystem::ConstantValue,
    },
    Error, Result,
};

/// Attaches default values to fields, parameters and properties
pub(crate) struct ConstantPass;

impl LoadPass for ConstantPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let blobs = context.blobs;

        for row in tables.constant.iter() {
            let value = ConstantValue::parse(row.element_type, blobs.get(row.value as usize)?)?;

            let slot = match row.parent {
                Some(HasConstant::Field(field)) => &mut context.field_mut(field)?.constant,
                Some(HasConstant::Param(param)) => {
                    &mut context
                        .params
                        .get_mut(param as usize - 1)
                        .ok_or_else(|| malformed_error!("Param index {} out of range", param))?
                        .constant
                }
                Some(HasConstant::Property(property)) => {
                    &mut context
                        .properties
                        .get_mut(property as usize - 1)
                        .ok_or_else(|| {
                            malformed_error!("Property index {} out of range", property)
                        })?
                        .constant
                }
                None => return Err(malformed_error!("Constant {} has no parent", row.rid)),
            };

            if slot.is_some() {
                return Err(Error::DuplicateOwnership(format!(
                    "Two constants for {:?}",
                    row.parent
                )));
            }
            *slot = Some(value);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::Constant
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::TypeDef, TableId::Param, TableId::PropertyMap]
    }
}
