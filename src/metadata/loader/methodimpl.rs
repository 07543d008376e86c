use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        tables::{MethodDefOrRef, TableId},
        typesystem::MethodImplDefinition,
    },
    Result,
};

/// Attaches explicit overrides to the class and to the implementing method
pub(crate) struct MethodImplPass;

impl LoadPass for MethodImplPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;

        for row in tables.method_impl.iter() {
            let (Some(body), Some(declaration)) = (row.method_body, row.method_declaration) else {
                return Err(malformed_error!("MethodImpl {} has a null method", row.rid));
            };

            context
                .type_mut(row.class)?
                .method_impls
                .push(MethodImplDefinition { body, declaration });

            if let MethodDefOrRef::MethodDef(method) = body {
                context.method_mut(method)?.overrides.push(declaration);
            }
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::MethodImpl
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::Constant]
    }
}
