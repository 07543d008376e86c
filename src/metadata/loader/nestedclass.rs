use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::TableId,
    },
    Error, Result,
};

/// Links nested types to their enclosing type
pub(crate) struct NestedClassPass;

impl LoadPass for NestedClassPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        for row in tables.nested_class.iter() {
            let nested = context.type_mut(row.nested_class)?;
            if let Some(existing) = nested.enclosing {
                return Err(Error::DuplicateOwnership(format!(
                    "TypeDef {} is nested in both {} and {}",
                    row.nested_class, existing, row.enclosing_class
                )));
            }
            nested.enclosing = Some(row.enclosing_class);

            context
                .type_mut(row.enclosing_class)?
                .nested
                .push(row.nested_class);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::NestedClass
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[]
    }
}
