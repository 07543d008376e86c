use crate::{
    metadata::{
        loader::{context::owned_range, LoadPass, LoaderContext},
        tables::TableId,
    },
    Result,
};

/// Derives parameter ranges and names the parameter slots of method signatures
pub(crate) struct ParamPass;

impl LoadPass for ParamPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let rows = &tables.method_def;
        let param_count = tables.param.row_count();

        for (index, row) in rows.iter().enumerate() {
            let next = rows.get(index as u32 + 2).map(|n| n.param_list);
            let range = owned_range(row.param_list, next, param_count)?;

            let names = range
                .clone()
                .filter_map(|param| context.params.get(param as usize - 1))
                .filter(|param| param.sequence > 0)
                .map(|param| (usize::from(param.sequence) - 1, param.name.clone()))
                .collect::<Vec<_>>();

            let method = context.method_mut(row.rid)?;
            method.params = range;
            for (slot, name) in names {
                match method.signature.params.get_mut(slot) {
                    Some(param) => param.name = Some(name),
                    None => log::trace!(
                        "MethodDef {}: Param sequence {} beyond {} parameters",
                        row.rid,
                        slot + 1,
                        method.signature.params.len()
                    ),
                }
            }
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::Param
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::TypeDef]
    }
}
