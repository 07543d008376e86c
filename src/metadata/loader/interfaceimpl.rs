use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::TableId,
    },
    Result,
};

/// Lists the interfaces each class declares
pub(crate) struct InterfaceImplPass;

impl LoadPass for InterfaceImplPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;

        for row in tables.interface_impl.iter() {
            let Some(interface) = row.interface else {
                return Err(malformed_error!("InterfaceImpl {} has a null interface", row.rid));
            };

            context.type_mut(row.class)?.interfaces.push(interface);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::InterfaceImpl
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::CustomAttribute]
    }
}
