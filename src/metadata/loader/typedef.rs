use crate::{
    metadata::{
        loader::{context::owned_range, LoadPass, LoaderContext},
        tables::TableId,
    },
    Error, Result,
};

/// Derives the field and method ranges of every type and marks the owners
pub(crate) struct TypeDefPass;

impl LoadPass for TypeDefPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let rows = &tables.type_def;
        let field_count = tables.field.row_count();
        let method_count = tables.method_def.row_count();

        for (index, row) in rows.iter().enumerate() {
            let next = rows.get(index as u32 + 2);
            let fields = owned_range(row.field_list, next.map(|n| n.field_list), field_count)?;
            let methods = owned_range(row.method_list, next.map(|n| n.method_list), method_count)?;

            for field in fields.clone() {
                let owned = context.field_mut(field)?;
                if owned.owner != 0 {
                    return Err(Error::DuplicateOwnership(format!(
                        "Field {} claimed by TypeDef {} and {}",
                        field, owned.owner, row.rid
                    )));
                }
                owned.owner = row.rid;
            }
            for method in methods.clone() {
                let owned = context.method_mut(method)?;
                if owned.owner != 0 {
                    return Err(Error::DuplicateOwnership(format!(
                        "MethodDef {} claimed by TypeDef {} and {}",
                        method, owned.owner, row.rid
                    )));
                }
                owned.owner = row.rid;
            }

            let ty = context.type_mut(row.rid)?;
            ty.fields = fields;
            ty.methods = methods;
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::TypeDef
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::NestedClass]
    }
}
