//! `LoaderContext` - the module under construction while the passes run.
//!
//! The context is created from the decoded tables and heaps with one definition record per
//! row, signatures already parsed. Each pass then fills in the relations its table describes.
//! After the last pass the records are moved into the [`crate::metadata::module::Module`].

use std::{collections::HashMap, ops::Range};

use crate::{
    file::File,
    metadata::{
        method::MethodImplFlags,
        signatures::SignatureParser,
        streams::{Blob, Strings},
        tables::Tables,
        token::Token,
        typesystem::{
            CustomAttributeDefinition, EventDefinition, FieldDefinition, MethodDefinition,
            ModuleId, ParamDefinition, PropertyDefinition, TypeDefinition,
        },
    },
    Result,
};

pub(crate) struct LoaderContext<'a> {
    pub file: &'a File,
    pub module: ModuleId,
    pub tables: &'a Tables,
    pub strings: &'a Strings,
    pub blobs: &'a Blob,

    pub types: Vec<TypeDefinition>,
    pub methods: Vec<MethodDefinition>,
    pub fields: Vec<FieldDefinition>,
    pub params: Vec<ParamDefinition>,
    pub properties: Vec<PropertyDefinition>,
    pub events: Vec<EventDefinition>,
    pub attributes: HashMap<Token, Vec<CustomAttributeDefinition>>,
}

impl<'a> LoaderContext<'a> {
    pub fn new(
        file: &'a File,
        module: ModuleId,
        tables: &'a Tables,
        strings: &'a Strings,
        blobs: &'a Blob,
        max_depth: usize,
    ) -> Result<Self> {
        let string = move |index: u32| -> Result<String> { Ok(strings.get(index as usize)?.to_string()) };
        let parser = move |index: u32| -> Result<SignatureParser<'a>> {
            Ok(SignatureParser::new(blobs.get(index as usize)?, module).with_max_depth(max_depth))
        };

        let types = tables
            .type_def
            .iter()
            .map(|row| {
                Ok(TypeDefinition::new(
                    row.rid,
                    row.flags,
                    string(row.name)?,
                    string(row.namespace)?,
                    row.extends,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let methods = tables
            .method_def
            .iter()
            .map(|row| {
                Ok(MethodDefinition {
                    row: row.rid,
                    owner: 0,
                    name: string(row.name)?,
                    rva: row.rva,
                    flags: row.flags,
                    impl_flags: MethodImplFlags::from_bits_retain(row.impl_flags),
                    signature: parser(row.signature)?.parse_method_signature()?,
                    params: 1..1,
                    generic_params: Vec::new(),
                    overrides: Vec::new(),
                    body: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fields = tables
            .field
            .iter()
            .map(|row| {
                Ok(FieldDefinition {
                    row: row.rid,
                    owner: 0,
                    name: string(row.name)?,
                    flags: row.flags,
                    signature: parser(row.signature)?.parse_field_signature()?,
                    constant: None,
                    rva: None,
                    offset: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let params = tables
            .param
            .iter()
            .map(|row| {
                Ok(ParamDefinition {
                    row: row.rid,
                    flags: row.flags,
                    sequence: row.sequence,
                    name: string(row.name)?,
                    constant: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let properties = tables
            .property
            .iter()
            .map(|row| {
                Ok(PropertyDefinition {
                    row: row.rid,
                    owner: 0,
                    flags: row.flags,
                    name: string(row.name)?,
                    signature: parser(row.signature)?.parse_property_signature()?,
                    constant: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let events = tables
            .event
            .iter()
            .map(|row| {
                Ok(EventDefinition {
                    row: row.rid,
                    owner: 0,
                    flags: row.flags,
                    name: string(row.name)?,
                    event_type: row.event_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LoaderContext {
            file,
            module,
            tables,
            strings,
            blobs,
            types,
            methods,
            fields,
            params,
            properties,
            events,
            attributes: HashMap::new(),
        })
    }

    pub fn type_mut(&mut self, row: u32) -> Result<&mut TypeDefinition> {
        row_mut(&mut self.types, row, "TypeDef")
    }

    pub fn method_mut(&mut self, row: u32) -> Result<&mut MethodDefinition> {
        row_mut(&mut self.methods, row, "MethodDef")
    }

    pub fn field_mut(&mut self, row: u32) -> Result<&mut FieldDefinition> {
        row_mut(&mut self.fields, row, "Field")
    }
}

fn row_mut<'t, T>(rows: &'t mut [T], row: u32, table: &str) -> Result<&'t mut T> {
    if row == 0 {
        return Err(malformed_error!("Null {} index", table));
    }

    rows.get_mut(row as usize - 1)
        .ok_or_else(|| malformed_error!("{} index {} out of range", table, row))
}

/// The rows a list column owns: from `start` up to the next owner's `start`, or to the end of
/// the table for the last owner.
///
/// A null list index is read as row 1, which some writers emit for empty tables.
pub(crate) fn owned_range(start: u32, next: Option<u32>, count: u32) -> Result<Range<u32>> {
    let limit = count + 1;
    let start = start.max(1);
    let end = next.unwrap_or(limit).max(1);

    if start > end || end > limit {
        return Err(malformed_error!(
            "List range {}..{} invalid for a table of {} rows",
            start,
            end,
            count
        ));
    }

    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert_eq!(owned_range(1, Some(3), 5).unwrap(), 1..3);
        assert_eq!(owned_range(3, None, 5).unwrap(), 3..6);
        assert_eq!(owned_range(6, None, 5).unwrap(), 6..6);
        assert_eq!(owned_range(0, None, 0).unwrap(), 1..1);
        assert!(owned_range(4, Some(2), 5).is_err());
        assert!(owned_range(1, Some(8), 5).is_err());
    }
}
