//! Post-processing passes that turn decoded tables into a linked module.
//!
//! Decoding the `#~` stream yields flat rows. The passes in this module derive the relations
//! the rows only describe implicitly: nesting, ownership ranges, constants, overrides, field
//! data, layouts, attributes, interfaces and finally the method bodies. Each pass handles one
//! table and declares the tables whose passes it relies on; [`graph::PassGraph`] turns that
//! into a fixed execution order:
//!
//! 1. nested classes (`NestedClass`)
//! 2. field, method, parameter, event and property ranges, generic parameters
//! 3. constants
//! 4. method overrides (`MethodImpl`)
//! 5. field data (`FieldRVA`)
//! 6. class layouts and field offsets
//! 7. custom attributes
//! 8. interface implementations
//! 9. method bodies

mod classlayout;
mod constant;
pub(crate) mod context;
mod customattribute;
mod eventmap;
mod fieldlayout;
mod fieldrva;
mod genericparam;
mod graph;
mod interfaceimpl;
mod methoddef;
mod methodimpl;
mod nestedclass;
mod param;
mod propertymap;
mod typedef;

pub(crate) use context::LoaderContext;

use crate::{metadata::tables::TableId, Result};

static PASSES: [&'static dyn LoadPass; 15] = [
    &nestedclass::NestedClassPass,
    &typedef::TypeDefPass,
    &param::ParamPass,
    &eventmap::EventMapPass,
    &propertymap::PropertyMapPass,
    &genericparam::GenericParamPass,
    &constant::ConstantPass,
    &methodimpl::MethodImplPass,
    &fieldrva::FieldRvaPass,
    &classlayout::ClassLayoutPass,
    &fieldlayout::FieldLayoutPass,
    &customattribute::CustomAttributePass,
    &interfaceimpl::InterfaceImplPass,
    &methoddef::MethodDefPass,
    &genericparam::GenericParamConstraintPass,
];

/// One post-processing step, driven by the rows of one table.
pub(crate) trait LoadPass: Send + Sync {
    /// Apply the table's rows to the module under construction
    fn load(&self, context: &mut LoaderContext) -> Result<()>;

    /// The table this pass processes
    fn table_id(&self) -> TableId;

    /// Tables whose passes must run first
    fn dependencies(&self) -> &'static [TableId];
}

/// Run every pass in dependency order. The first failing pass aborts the load.
pub(crate) fn execute_passes(context: &mut LoaderContext) -> Result<()> {
    let graph = graph::PassGraph::new(&PASSES)?;
    for pass in graph.schedule()? {
        log::trace!("{}: running {:?} pass", context.module, pass.table_id());
        pass.load(context)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_order() {
        let graph = graph::PassGraph::new(&PASSES).unwrap();
        let order = graph
            .schedule()
            .unwrap()
            .iter()
            .map(|pass| pass.table_id())
            .collect::<Vec<_>>();

        let position = |id: TableId| order.iter().position(|t| *t == id).unwrap();
        let numbered = [
            TableId::NestedClass,
            TableId::TypeDef,
            TableId::Constant,
            TableId::MethodImpl,
            TableId::FieldRVA,
            TableId::ClassLayout,
            TableId::CustomAttribute,
            TableId::InterfaceImpl,
            TableId::MethodDef,
        ];
        for pair in numbered.windows(2) {
            assert!(position(pair[0]) < position(pair[1]), "{:?} before {:?}", pair[0], pair[1]);
        }
        assert!(position(TableId::Param) < position(TableId::Constant));
        assert!(position(TableId::GenericParam) < position(TableId::GenericParamConstraint));
    }
}
