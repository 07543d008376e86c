use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::TableId,
    },
    Error, Result,
};

/// Attaches initial data locations to static fields
pub(crate) struct FieldRvaPass;

impl LoadPass for FieldRvaPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;

        for row in tables.field_rva.iter() {
            let field = context.field_mut(row.field)?;
            if let Some(existing) = field.rva {
                return Err(Error::DuplicateOwnership(format!(
                    "Field {} has two RVAs, 0x{:08x} and 0x{:08x}",
                    row.field, existing, row.rva
                )));
            }
            field.rva = Some(row.rva);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::FieldRVA
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::MethodImpl]
    }
}
