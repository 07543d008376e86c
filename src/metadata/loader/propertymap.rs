use crate::{
    metadata::{
        loader::{context::owned_range, LoadPass, LoaderContext},
        tables::TableId,
    },
    Error, Result,
};

/// Derives the property ranges of types from the `PropertyMap` table
pub(crate) struct PropertyMapPass;

impl LoadPass for PropertyMapPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let rows = &tables.property_map;
        let property_count = tables.property.row_count();

        for (index, row) in rows.iter().enumerate() {
            let next = rows.get(index as u32 + 2).map(|n| n.property_list);
            let range = owned_range(row.property_list, next, property_count)?;

            for property in range.clone() {
                let owned = context
                    .properties
                    .get_mut(property as usize - 1)
                    .ok_or_else(|| malformed_error!("Property index {} out of range", property))?;
                if owned.owner != 0 {
                    return Err(Error::DuplicateOwnership(format!(
                        "Property {} claimed by TypeDef {} and {}",
                        property, owned.owner, row.parent
                    )));
                }
                owned.owner = row.parent;
            }
            context.type_mut(row.parent)?.properties = range;
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::PropertyMap
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::TypeDef]
    }
}
