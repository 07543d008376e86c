use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::{CodedIndex, TableId},
        typesystem::CustomAttributeDefinition,
    },
    Result,
};

/// Groups custom attributes by the token of the row they decorate
pub(crate) struct CustomAttributePass;

impl LoadPass for CustomAttributePass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let blobs = context.blobs;

        for row in tables.custom_attribute.iter() {
            let (Some(parent), Some(constructor)) = (row.parent, row.constructor) else {
                return Err(malformed_error!(
                    "CustomAttribute {} has a null parent or constructor",
                    row.rid
                ));
            };

            context
                .attributes
                .entry(parent.token())
                .or_default()
                .push(CustomAttributeDefinition {
                    row: row.rid,
                    constructor,
                    value: blobs.get(row.value as usize)?.to_vec(),
                });
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::CustomAttribute
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[
            TableId::ClassLayout,
            TableId::GenericParam,
            TableId::EventMap,
        ]
    }
}
