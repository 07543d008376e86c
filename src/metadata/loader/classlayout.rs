use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::TableId,
        typesystem::ClassLayout,
    },
    Error, Result,
};

/// Attaches explicit packing and size to sequential and explicit layout types
pub(crate) struct ClassLayoutPass;

impl LoadPass for ClassLayoutPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;

        for row in tables.class_layout.iter() {
            let ty = context.type_mut(row.parent)?;
            if ty.layout.is_some() {
                return Err(Error::DuplicateOwnership(format!(
                    "TypeDef {} has two ClassLayout records",
                    row.parent
                )));
            }
            if ty.is_auto_layout() {
                return Err(malformed_error!(
                    "ClassLayout {} on auto layout type {}",
                    row.rid,
                    ty.name
                ));
            }

            ty.layout = Some(ClassLayout {
                packing_size: row.packing_size,
                class_size: row.class_size,
            });
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::ClassLayout
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::FieldRVA]
    }
}
