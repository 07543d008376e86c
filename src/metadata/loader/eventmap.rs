use crate::{
    metadata::{
        loader::{context::owned_range, LoadPass, LoaderContext},
        tables::TableId,
    },
    Error, Result,
};

/// Derives the event ranges of types from the `EventMap` table
pub(crate) struct EventMapPass;

impl LoadPass for EventMapPass {
    fn load(&self, context: &mut LoaderContext) -> Result<()> {
        let tables = context.tables;
        let rows = &tables.event_map;
        let event_count = tables.event.row_count();

        for (index, row) in rows.iter().enumerate() {
            let next = rows.get(index as u32 + 2).map(|n| n.event_list);
            let range = owned_range(row.event_list, next, event_count)?;

            for event in range.clone() {
                let owned = context
                    .events
                    .get_mut(event as usize - 1)
                    .ok_or_else(|| malformed_error!("Event index {} out of range", event))?;
                if owned.owner != 0 {
                    return Err(Error::DuplicateOwnership(format!(
                        "Event {} claimed by TypeDef {} and {}",
                        event, owned.owner, row.parent
                    )));
                }
                owned.owner = row.parent;
            }
            context.type_mut(row.parent)?.events = range;
        }

        Ok(())
    }

    fn table_id(&self) -> TableId {
        TableId::EventMap
    }

    fn dependencies(&self) -> &'static [TableId] {
        &[TableId::TypeDef]
    }
}
