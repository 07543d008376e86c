//! Decodes the IL bodies of all methods that have one.
//!
//! Abstract methods, methods without an RVA and methods implemented in native code or by the
//! runtime keep `body == None`.

use crate::{
    metadata::{
        loader::{LoadPass, LoaderContext},
        method::MethodBody,
        tables::TableId,
    },
    Result,
};

pub(crate) struct MethodDefPass;

impl LoadPass for MethodDefPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let file = context.file;

        for method in &mut context.methods {
            if method.is_abstract() || method.rva == 0 {
                log::trace!("{} (0x06{:06x}) has no body", method.name, method.row);
                continue;
            }
            if !method.impl_flags.is_il() {
                log::trace!(
                    "{} (0x06{:06x}) is not implemented in IL, skipping body",
                    method.name,
                    method.row
                );
                continue;
            }

            method.body = Some(MethodBody::read(file.rva_tail(method.rva)?)?);
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::MethodDef
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::InterfaceImpl]
    }
}
