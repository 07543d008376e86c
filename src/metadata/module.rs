//! A loaded and linked metadata module.
//!
//! [`Module::load`] takes an image through the whole front half of the pipeline: CLI header,
//! metadata root, heaps, table decode and the post-processing passes of
//! [`crate::metadata::loader`]. The result owns copies of everything it needs, so it does not
//! borrow the [`File`] it came from and can be shared across threads.

use std::collections::HashMap;

use dashmap::DashMap;
use widestring::U16String;

use crate::{
    config::CompileOptions,
    file::File,
    metadata::{
        cor20header::Cor20Header,
        loader::{execute_passes, LoaderContext},
        root::Root,
        signatures::{
            ClassRef, LocalVarSig, MethodSpecSig, SignatureParser, TypeSig,
        },
        streams::{Blob, Guid, Strings, UserStrings},
        tables::{ResolutionScope, TableId, Tables, TypeRefRaw},
        token::Token,
        typesystem::{
            CustomAttributeDefinition, EventDefinition, FieldDefinition, MethodDefinition,
            ModuleId, ParamDefinition, PropertyDefinition, TypeDefinition,
        },
    },
    Error, Result,
};

/// One loaded module.
pub struct Module {
    id: ModuleId,
    name: String,
    header: Cor20Header,
    version: String,
    mvid: Option<uguid::Guid>,
    max_depth: usize,

    strings: Strings,
    blobs: Blob,
    guids: Guid,
    user_strings: UserStrings,
    tables: Tables,

    types: Vec<TypeDefinition>,
    methods: Vec<MethodDefinition>,
    fields: Vec<FieldDefinition>,
    params: Vec<ParamDefinition>,
    properties: Vec<PropertyDefinition>,
    events: Vec<EventDefinition>,
    attributes: HashMap<Token, Vec<CustomAttributeDefinition>>,

    type_cache: DashMap<(String, String), u32>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("types", &self.types.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

fn heap(root: &Root, data: &[u8], name: &str) -> Vec<u8> {
    root.stream(data, name)
        .map_or_else(|| vec![0], <[u8]>::to_vec)
}

impl Module {
    /// Load the module contained in `file` as `id`.
    ///
    /// # Errors
    /// Any format error of the image, its metadata or a method body, and the ownership errors
    /// of the post-processing passes.
    pub fn load(id: ModuleId, file: &File, options: &CompileOptions) -> Result<Module> {
        let (clr_rva, clr_size) = file.clr()?;
        let header = Cor20Header::read(file.rva_slice(clr_rva, clr_size as usize)?)?;

        let metadata = file.rva_slice(header.meta_data_rva, header.meta_data_size as usize)?;
        let root = Root::read(metadata)?;

        let strings = Strings::from(heap(&root, metadata, "#Strings"));
        let blobs = Blob::from(heap(&root, metadata, "#Blob"));
        let guids = Guid::from(heap(&root, metadata, "#GUID"));
        let user_strings = UserStrings::from(heap(&root, metadata, "#US"));

        let table_data = root
            .stream(metadata, "#~")
            .ok_or_else(|| malformed_error!("Metadata has no #~ stream"))?;
        let (tables, _) = Tables::read(table_data)?;

        let mut context = LoaderContext::new(
            file,
            id,
            &tables,
            &strings,
            &blobs,
            options.max_signature_depth,
        )?;
        execute_passes(&mut context)?;

        let LoaderContext {
            types,
            methods,
            fields,
            params,
            properties,
            events,
            attributes,
            ..
        } = context;

        let name = module_name(&tables, &strings)?;
        let mvid = match tables.module.get(1) {
            Some(row) if row.mvid != 0 => Some(guids.get(row.mvid as usize)?),
            _ => None,
        };

        log::debug!(
            "{} loaded as {}: {} types, {} methods, {} fields, {} member refs",
            name,
            id,
            types.len(),
            methods.len(),
            fields.len(),
            tables.member_ref.row_count()
        );

        Ok(Module {
            id,
            name,
            header,
            version: root.version,
            mvid,
            max_depth: options.max_signature_depth,
            strings,
            blobs,
            guids,
            user_strings,
            tables,
            types,
            methods,
            fields,
            params,
            properties,
            events,
            attributes,
            type_cache: DashMap::new(),
        })
    }

    /// Id inside the session
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Assembly name, or the module name without extension for netmodules
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime version string of the metadata root
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Module version id
    #[must_use]
    pub fn mvid(&self) -> Option<uguid::Guid> {
        self.mvid
    }

    /// The CLI header
    #[must_use]
    pub fn header(&self) -> &Cor20Header {
        &self.header
    }

    /// The entry point method, if the module is an executable with a managed entry point
    #[must_use]
    pub fn entry_point(&self) -> Option<Token> {
        let token = self.header.entry_point_token;
        (token.table_id() == Some(TableId::MethodDef) && !token.is_null()).then_some(token)
    }

    /// The decoded tables
    #[must_use]
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// The `#Strings` heap
    #[must_use]
    pub fn strings(&self) -> &Strings {
        &self.strings
    }

    /// The `#Blob` heap
    #[must_use]
    pub fn blobs(&self) -> &Blob {
        &self.blobs
    }

    /// The `#GUID` heap
    #[must_use]
    pub fn guids(&self) -> &Guid {
        &self.guids
    }

    /// All type definitions in row order
    #[must_use]
    pub fn types(&self) -> &[TypeDefinition] {
        &self.types
    }

    /// All method definitions in row order
    #[must_use]
    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }

    /// All field definitions in row order
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// All parameter rows in row order
    #[must_use]
    pub fn params(&self) -> &[ParamDefinition] {
        &self.params
    }

    /// All property rows in row order
    #[must_use]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// All event rows in row order
    #[must_use]
    pub fn events(&self) -> &[EventDefinition] {
        &self.events
    }

    /// `TypeDef` row `row`.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] for a null or out of range row.
    pub fn type_def(&self, row: u32) -> Result<&TypeDefinition> {
        by_row(&self.types, row).ok_or_else(|| {
            Error::TypeNotFound(format!("{}: TypeDef row {}", self.name, row))
        })
    }

    /// `MethodDef` row `row`.
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] for a null or out of range row.
    pub fn method_def(&self, row: u32) -> Result<&MethodDefinition> {
        by_row(&self.methods, row).ok_or_else(|| {
            Error::MemberNotFound(format!("{}: MethodDef row {}", self.name, row))
        })
    }

    /// `Field` row `row`.
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] for a null or out of range row.
    pub fn field(&self, row: u32) -> Result<&FieldDefinition> {
        by_row(&self.fields, row).ok_or_else(|| {
            Error::MemberNotFound(format!("{}: Field row {}", self.name, row))
        })
    }

    /// Methods owned by `ty`, in row order
    pub fn methods_of<'a>(&'a self, ty: &TypeDefinition) -> impl Iterator<Item = &'a MethodDefinition> {
        ty.methods.clone().filter_map(|row| by_row(&self.methods, row))
    }

    /// Fields owned by `ty`, in row order
    pub fn fields_of<'a>(&'a self, ty: &TypeDefinition) -> impl Iterator<Item = &'a FieldDefinition> {
        ty.fields.clone().filter_map(|row| by_row(&self.fields, row))
    }

    /// Signature of the type definition in row `row`
    #[must_use]
    pub fn type_sig(&self, row: u32) -> TypeSig {
        TypeSig::Class(self.class_ref(Token::from_parts(TableId::TypeDef, row)))
    }

    /// `token` qualified with this module
    #[must_use]
    pub fn class_ref(&self, token: Token) -> ClassRef {
        ClassRef::new(self.id, token)
    }

    /// Namespace and name of a type definition. Nested types are named `Outer+Inner` and
    /// carry the namespace of their outermost enclosing type.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] for a bad row and [`Error::RecursionLimit`] for cyclic
    /// nesting.
    pub fn full_name(&self, row: u32) -> Result<(String, String)> {
        let mut ty = self.type_def(row)?;
        let mut name = ty.name.clone();

        let mut depth = 0;
        while let Some(enclosing) = ty.enclosing {
            depth += 1;
            if depth > self.max_depth {
                return Err(Error::RecursionLimit(self.max_depth));
            }

            ty = self.type_def(enclosing)?;
            name = format!("{}+{}", ty.name, name);
        }

        Ok((ty.namespace.clone(), name))
    }

    /// Find a type definition by namespace and name, `Outer+Inner` for nested types. Lookups
    /// are cached.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<u32> {
        let key = (namespace.to_string(), name.to_string());
        if let Some(row) = self.type_cache.get(&key) {
            return Some(*row);
        }

        let mut parts = name.split('+');
        let outer = parts.next()?;
        let mut current = self
            .types
            .iter()
            .find(|ty| !ty.is_nested() && ty.namespace == namespace && ty.name == outer)?;

        for part in parts {
            current = current
                .nested
                .iter()
                .filter_map(|row| by_row(&self.types, *row))
                .find(|ty| ty.name == part)?;
        }

        self.type_cache.insert(key, current.row);
        Some(current.row)
    }

    /// A nested type of `enclosing` by simple name
    #[must_use]
    pub fn find_nested(&self, enclosing: u32, name: &str) -> Option<u32> {
        by_row(&self.types, enclosing)?
            .nested
            .iter()
            .copied()
            .find(|row| by_row(&self.types, *row).is_some_and(|ty| ty.name == name))
    }

    /// Custom attributes attached to the row `token`
    #[must_use]
    pub fn custom_attributes(&self, token: Token) -> &[CustomAttributeDefinition] {
        self.attributes.get(&token).map_or(&[], Vec::as_slice)
    }

    /// Name of a `#Strings` entry.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] for an index past the heap.
    pub fn string(&self, index: u32) -> Result<&str> {
        self.strings.get(index as usize)
    }

    /// The literal a `ldstr` token refers to.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the token is not a user string token.
    pub fn user_string(&self, token: Token) -> Result<U16String> {
        if token.table() != 0x70 {
            return Err(malformed_error!("{} is not a user string token", token));
        }

        self.user_strings.get(token.row() as usize)
    }

    /// A parser positioned at the start of blob `index`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] for an index past the heap.
    pub fn signature_parser(&self, index: u32) -> Result<SignatureParser<'_>> {
        Ok(SignatureParser::new(self.blobs.get(index as usize)?, self.id)
            .with_max_depth(self.max_depth))
    }

    /// Locals of a method body, empty for a null token.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a token that is not a `StandAloneSig` and signature
    /// errors for its blob.
    pub fn local_var_signature(&self, token: Token) -> Result<LocalVarSig> {
        if token.is_null() {
            return Ok(LocalVarSig::default());
        }
        if token.table_id() != Some(TableId::StandAloneSig) {
            return Err(malformed_error!("{} is not a StandAloneSig token", token));
        }

        let row = self
            .tables
            .stand_alone_sig
            .get(token.row())
            .ok_or_else(|| malformed_error!("StandAloneSig {} out of range", token))?;
        self.signature_parser(row.signature)?.parse_local_var_signature()
    }

    /// The type a `TypeSpec` row encodes.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] for a bad row and signature errors for its blob.
    pub fn type_spec(&self, row: u32) -> Result<TypeSig> {
        let spec = self.tables.type_spec.get(row).ok_or_else(|| {
            Error::TypeNotFound(format!("{}: TypeSpec row {}", self.name, row))
        })?;
        self.signature_parser(spec.signature)?.parse_type_spec_signature()
    }

    /// The instantiation of a `MethodSpec` row.
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] for a bad row and signature errors for its blob.
    pub fn method_spec_args(&self, row: u32) -> Result<MethodSpecSig> {
        let spec = self.tables.method_spec.get(row).ok_or_else(|| {
            Error::MemberNotFound(format!("{}: MethodSpec row {}", self.name, row))
        })?;
        self.signature_parser(spec.instantiation)?
            .parse_method_spec_signature()
    }

    /// `TypeRef` row `row` with its scope, namespace and name
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] for a bad row.
    pub fn type_ref(&self, row: u32) -> Result<(&TypeRefRaw, &str, &str)> {
        let type_ref = self.tables.type_ref.get(row).ok_or_else(|| {
            Error::TypeNotFound(format!("{}: TypeRef row {}", self.name, row))
        })?;

        Ok((
            type_ref,
            self.string(type_ref.namespace)?,
            self.string(type_ref.name)?,
        ))
    }

    /// Name of the assembly or module a `TypeRef` scope points to, `None` for this module and
    /// for enclosing `TypeRef`s.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a scope row out of range.
    pub fn scope_name(&self, scope: ResolutionScope) -> Result<Option<&str>> {
        match scope {
            ResolutionScope::AssemblyRef(row) => {
                let assembly_ref = self
                    .tables
                    .assembly_ref
                    .get(row)
                    .ok_or_else(|| malformed_error!("AssemblyRef {} out of range", row))?;
                Ok(Some(self.string(assembly_ref.name)?))
            }
            ResolutionScope::ModuleRef(row) => {
                let module_ref = self
                    .tables
                    .module_ref
                    .get(row)
                    .ok_or_else(|| malformed_error!("ModuleRef {} out of range", row))?;
                Ok(Some(strip_extension(self.string(module_ref.name)?)))
            }
            ResolutionScope::Module(_) | ResolutionScope::TypeRef(_) => Ok(None),
        }
    }
}

fn by_row<T>(rows: &[T], row: u32) -> Option<&T> {
    if row == 0 {
        return None;
    }

    rows.get(row as usize - 1)
}

fn strip_extension(name: &str) -> &str {
    for extension in [".dll", ".exe", ".netmodule"] {
        if let Some(stem) = name.strip_suffix(extension) {
            return stem;
        }
    }

    name
}

fn module_name(tables: &Tables, strings: &Strings) -> Result<String> {
    if let Some(assembly) = tables.assembly.get(1) {
        return Ok(strings.get(assembly.name as usize)?.to_string());
    }

    match tables.module.get(1) {
        Some(module) => Ok(strip_extension(strings.get(module.name as usize)?).to_string()),
        None => Err(malformed_error!("Metadata has no Module row")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(strip_extension("mscorlib.dll"), "mscorlib");
        assert_eq!(strip_extension("part.netmodule"), "part");
        assert_eq!(strip_extension("plain"), "plain");
    }

    #[test]
    fn rows() {
        let rows = [10, 20, 30];
        assert_eq!(by_row(&rows, 0), None);
        assert_eq!(by_row(&rows, 1), Some(&10));
        assert_eq!(by_row(&rows, 3), Some(&30));
        assert_eq!(by_row(&rows, 4), None);
    }
}
