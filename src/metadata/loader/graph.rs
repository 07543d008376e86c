//! Ordering of the loader passes.
//!
//! Every pass names the tables whose passes must have completed before it runs. The schedule
//! is a topological order of that graph; among passes that are ready at the same time the one
//! declared first runs first, so the order is deterministic.

use std::collections::HashSet;
use std::fmt::Write;

use crate::{
    metadata::{loader::LoadPass, tables::TableId},
    Error, Result,
};

pub(crate) struct PassGraph<'a> {
    passes: Vec<&'a dyn LoadPass>,
}

impl<'a> PassGraph<'a> {
    /// Graph over `passes`, checking that every dependency has a pass and that no table has
    /// two.
    pub fn new(passes: &[&'a dyn LoadPass]) -> Result<Self> {
        let mut tables = HashSet::new();
        for pass in passes {
            if !tables.insert(pass.table_id()) {
                return Err(Error::Error(format!(
                    "Two loader passes for table {:?}",
                    pass.table_id()
                )));
            }
        }

        for pass in passes {
            if let Some(missing) = pass.dependencies().iter().find(|dep| !tables.contains(*dep)) {
                return Err(Error::Error(format!(
                    "Pass {:?} depends on {:?}, which has no pass",
                    pass.table_id(),
                    missing
                )));
            }
        }

        Ok(PassGraph {
            passes: passes.to_vec(),
        })
    }

    /// The execution order.
    pub fn schedule(&self) -> Result<Vec<&'a dyn LoadPass>> {
        let mut done: HashSet<TableId> = HashSet::new();
        let mut order = Vec::with_capacity(self.passes.len());

        while order.len() < self.passes.len() {
            let ready = self.passes.iter().find(|pass| {
                !done.contains(&pass.table_id())
                    && pass.dependencies().iter().all(|dep| done.contains(dep))
            });

            match ready {
                Some(pass) => {
                    done.insert(pass.table_id());
                    order.push(*pass);
                }
                None => {
                    return Err(Error::Error(
                        "Circular dependency between loader passes".to_string(),
                    ))
                }
            }
        }

        Ok(order)
    }

    /// Human readable execution plan
    pub fn dump_execution_plan(&self) -> Result<String> {
        let mut result = String::new();
        for (index, pass) in self.schedule()?.iter().enumerate() {
            let deps = pass
                .dependencies()
                .iter()
                .map(|id| format!("{id:?}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(result, "{index}: {:?} (after: {deps})", pass.table_id());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::loader::context::LoaderContext;

    struct Dummy(TableId, &'static [TableId]);

    impl LoadPass for Dummy {
        fn load(&self, _context: &mut LoaderContext) -> Result<()> {
            Ok(())
        }

        fn table_id(&self) -> TableId {
            self.0
        }

        fn dependencies(&self) -> &'static [TableId] {
            self.1
        }
    }

    #[test]
    fn dependency_order() {
        let a = Dummy(TableId::Constant, &[TableId::TypeDef]);
        let b = Dummy(TableId::TypeDef, &[TableId::NestedClass]);
        let c = Dummy(TableId::NestedClass, &[]);
        let graph = PassGraph::new(&[&a, &b, &c]).unwrap();

        let order = graph
            .schedule()
            .unwrap()
            .iter()
            .map(|pass| pass.table_id())
            .collect::<Vec<_>>();
        assert_eq!(order, vec![TableId::NestedClass, TableId::TypeDef, TableId::Constant]);
        assert!(graph.dump_execution_plan().unwrap().contains("0: NestedClass"));
    }

    #[test]
    fn broken_graphs() {
        let a = Dummy(TableId::Constant, &[TableId::TypeDef]);
        assert!(PassGraph::new(&[&a]).is_err());

        let b = Dummy(TableId::TypeDef, &[TableId::Constant]);
        let graph = PassGraph::new(&[&a, &b]).unwrap();
        assert!(graph.schedule().is_err());
    }
}
