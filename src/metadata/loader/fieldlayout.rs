use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::TableId,
    },
    Error, Result,
};

/// Attaches explicit offsets to fields
pub(crate) struct FieldLayoutPass;

impl LoadPass for FieldLayoutPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;

        for row in tables.field_layout.iter() {
            let field = context.field_mut(row.field)?;
            if field.offset.is_some() {
                return Err(Error::DuplicateOwnership(format!(
                    "Field {} has two offsets",
                    row.field
                )));
            }
            field.offset = Some(row.field_offset);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::FieldLayout
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::ClassLayout]
    }
}
