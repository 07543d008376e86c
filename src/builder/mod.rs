//! Construction of small CLI images in memory.
//!
//! [`ImageBuilder`] assembles the metadata tables, the four heaps and the method bodies of a
//! single-module assembly and wraps them in a PE32 image that [`crate::file::File`] and
//! [`crate::Session`] load like any compiler output. It exists to produce targeted inputs for
//! tests and benchmarks without checking binaries into the repository.
//!
//! Rows are appended in call order. Fields and methods belong to the most recently defined type,
//! exactly as the `field_list` / `method_list` ranges of the `TypeDef` table express ownership;
//! anything added before the first [`ImageBuilder::type_def`] belongs to `<Module>`.
//!
//! # Examples
//!
//! ```rust
//! use cilfront::{
//!     assembly::opcodes,
//!     builder::{il_body, ImageBuilder},
//!     metadata::signatures::{ElementType, MethodSig, TypeSig},
//!     Session, CompileOptions,
//! };
//!
//! let mut image = ImageBuilder::new("Hello");
//! image.type_def("Demo", "Program", 0x0010_0001, None)?;
//! let main = image.method(
//!     "Main",
//!     0x0016,
//!     &MethodSig::new(TypeSig::Primitive(ElementType::I4), vec![]),
//!     Some(il_body(1, vec![opcodes::LDC_I4_7, opcodes::RET])),
//! )?;
//! image.entry_point(main);
//!
//! let session = Session::new(CompileOptions::default());
//! let module = session.load_bytes(image.build()?)?;
//! let entry = session.entry_point(module)?.expect("entry point");
//! assert_eq!(session.lower_method(&entry)?.code.len(), 3);
//! # Ok::<(), cilfront::Error>(())
//! ```

mod heaps;
mod pe;

use heaps::{BlobHeap, GuidHeap, HeapBuilder, StringHeap, UserStringHeap};

use crate::{
    metadata::{
        cor20header::COR20_HEADER_SIZE,
        method::MethodBody,
        root::CIL_HEADER_MAGIC,
        signatures::{
            encode_field_signature, encode_local_var_signature, encode_method_signature,
            encode_method_spec_signature, encode_typespec_signature, FieldSig, LocalVarSig,
            MethodSig, MethodSpecSig, Param, TypeSig,
        },
        tables::{
            AssemblyRaw, AssemblyRefRaw, CodedIndex, CustomAttributeRaw, CustomAttributeType,
            FieldRaw, GenericParamRaw, HasCustomAttribute, MemberRefParent, MemberRefRaw,
            MetadataTable, MethodDefOrRef, MethodDefRaw, MethodSpecRaw, ModuleRaw,
            NestedClassRaw, ParamRaw, ResolutionScope, StandAloneSigRaw, TableId, Tables,
            TypeDefOrRef, TypeDefRaw, TypeOrMethodDef, TypeRefRaw, TypeSpecRaw,
        },
        token::Token,
    },
    Error, Result,
};

/// Runtime version string written to the metadata root
const RUNTIME_VERSION: &str = "v4.0.30319";

/// `COMIMAGE_FLAGS_ILONLY`
const COMIMAGE_FLAGS_ILONLY: u32 = 0x1;

/// A method body with the given evaluation stack limit and code, no locals and no clauses.
#[must_use]
pub fn il_body(max_stack: u16, code: Vec<u8>) -> MethodBody {
    MethodBody {
        max_stack,
        init_locals: false,
        local_var_sig_token: Token::new(0),
        code,
        exception_clauses: Vec::new(),
        is_fat: false,
    }
}

/// In-memory builder for a single-module CLI image.
#[derive(Debug)]
pub struct ImageBuilder {
    tables: Tables,
    strings: StringHeap,
    blobs: BlobHeap,
    guids: GuidHeap,
    user_strings: UserStringHeap,
    bodies: Vec<(u32, MethodBody)>,
    entry_point: Token,
}

impl ImageBuilder {
    /// Start an assembly called `name` with its `Module` row and the `<Module>` type.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut builder = ImageBuilder {
            tables: Tables::default(),
            strings: StringHeap::new(),
            blobs: BlobHeap::new(),
            guids: GuidHeap::default(),
            user_strings: UserStringHeap::new(),
            bodies: Vec::new(),
            entry_point: Token::new(0),
        };

        let module_name = builder.strings.add(&format!("{name}.dll"));
        let mvid = builder.guids.add(mvid_for(name));
        builder.tables.module.push(ModuleRaw {
            rid: 1,
            generation: 0,
            name: module_name,
            mvid,
            enc_id: 0,
            enc_base_id: 0,
        });

        let assembly_name = builder.strings.add(name);
        builder.tables.assembly.push(AssemblyRaw {
            rid: 1,
            hash_alg_id: 0x8004,
            major_version: 1,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: 0,
            public_key: 0,
            name: assembly_name,
            culture: 0,
        });

        let module_type = builder.strings.add("<Module>");
        builder.tables.type_def.push(TypeDefRaw {
            rid: 1,
            flags: 0,
            name: module_type,
            namespace: 0,
            extends: None,
            field_list: 1,
            method_list: 1,
        });

        builder
    }

    /// Reference the assembly `name`, version 4.0.0.0.
    pub fn assembly_ref(&mut self, name: &str) -> Token {
        let rid = self.tables.assembly_ref.row_count() + 1;
        let name = self.strings.add(name);
        self.tables.assembly_ref.push(AssemblyRefRaw {
            rid,
            major_version: 4,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: 0,
            public_key_or_token: 0,
            name,
            culture: 0,
            hash_value: 0,
        });
        Token::from_parts(TableId::AssemblyRef, rid)
    }

    /// Reference the type `namespace.name` in `scope`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] if `scope` is not a resolution scope.
    pub fn type_ref(&mut self, scope: Token, namespace: &str, name: &str) -> Result<Token> {
        let resolution_scope = ResolutionScope::from_token(scope)?;
        let rid = self.tables.type_ref.row_count() + 1;
        let name = self.strings.add(name);
        let namespace = self.strings.add(namespace);
        self.tables.type_ref.push(TypeRefRaw {
            rid,
            resolution_scope: Some(resolution_scope),
            name,
            namespace,
        });
        Ok(Token::from_parts(TableId::TypeRef, rid))
    }

    /// Define a type. Fields and methods added afterwards belong to it.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] if `extends` is not a type token.
    pub fn type_def(
        &mut self,
        namespace: &str,
        name: &str,
        flags: u32,
        extends: Option<Token>,
    ) -> Result<Token> {
        let extends = extends.map(TypeDefOrRef::from_token).transpose()?;
        let rid = self.tables.type_def.row_count() + 1;
        let name = self.strings.add(name);
        let namespace = self.strings.add(namespace);
        self.tables.type_def.push(TypeDefRaw {
            rid,
            flags,
            name,
            namespace,
            extends,
            field_list: self.tables.field.row_count() + 1,
            method_list: self.tables.method_def.row_count() + 1,
        });
        Ok(Token::from_parts(TableId::TypeDef, rid))
    }

    /// Record `nested` as declared inside `enclosing`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] unless both tokens are `TypeDef` tokens.
    pub fn nested(&mut self, nested: Token, enclosing: Token) -> Result<()> {
        for token in [nested, enclosing] {
            if token.table_id() != Some(TableId::TypeDef) {
                return Err(Error::IncompatibleIndex(format!(
                    "{token} is not a TypeDef token"
                )));
            }
        }

        let rid = self.tables.nested_class.row_count() + 1;
        self.tables.nested_class.push(NestedClassRaw {
            rid,
            nested_class: nested.row(),
            enclosing_class: enclosing.row(),
        });
        Ok(())
    }

    /// Add a field of type `ty` to the current type.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSignature`] if `ty` has no blob encoding.
    pub fn field(&mut self, name: &str, flags: u16, ty: TypeSig) -> Result<Token> {
        let blob = encode_field_signature(&FieldSig { ty: Param::new(ty) })?;
        let signature = self.blobs.add(&blob)?;
        let rid = self.tables.field.row_count() + 1;
        let name = self.strings.add(name);
        self.tables.field.push(FieldRaw {
            rid,
            flags,
            name,
            signature,
        });
        Ok(Token::from_parts(TableId::Field, rid))
    }

    /// Add a method to the current type. Named parameters of `sig` get `Param` rows.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSignature`] if `sig` has no blob encoding.
    pub fn method(
        &mut self,
        name: &str,
        flags: u16,
        sig: &MethodSig,
        body: Option<MethodBody>,
    ) -> Result<Token> {
        let blob = encode_method_signature(sig)?;
        let signature = self.blobs.add(&blob)?;
        let rid = self.tables.method_def.row_count() + 1;
        let param_list = self.tables.param.row_count() + 1;

        for (sequence, param) in sig.params.iter().enumerate() {
            let Some(param_name) = &param.name else {
                continue;
            };
            let sequence = u16::try_from(sequence + 1)
                .map_err(|_| malformed_error!("Method {} has too many parameters", name))?;
            let param_rid = self.tables.param.row_count() + 1;
            let param_name = self.strings.add(param_name);
            self.tables.param.push(ParamRaw {
                rid: param_rid,
                flags: 0,
                sequence,
                name: param_name,
            });
        }

        let name = self.strings.add(name);
        self.tables.method_def.push(MethodDefRaw {
            rid,
            rva: 0,
            impl_flags: 0,
            flags,
            name,
            signature,
            param_list,
        });
        if let Some(body) = body {
            self.bodies.push((rid, body));
        }

        Ok(Token::from_parts(TableId::MethodDef, rid))
    }

    /// Reference a member of `parent` by name and raw signature blob.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] if `parent` cannot own a member reference.
    pub fn member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token> {
        let class = MemberRefParent::from_token(parent)?;
        let signature = self.blobs.add(signature)?;
        let rid = self.tables.member_ref.row_count() + 1;
        let name = self.strings.add(name);
        self.tables.member_ref.push(MemberRefRaw {
            rid,
            class: Some(class),
            name,
            signature,
        });
        Ok(Token::from_parts(TableId::MemberRef, rid))
    }

    /// Reference the method `name` of `parent`.
    ///
    /// # Errors
    /// See [`ImageBuilder::member_ref`].
    pub fn method_ref(&mut self, parent: Token, name: &str, sig: &MethodSig) -> Result<Token> {
        let blob = encode_method_signature(sig)?;
        self.member_ref(parent, name, &blob)
    }

    /// Reference the field `name` of `parent`.
    ///
    /// # Errors
    /// See [`ImageBuilder::member_ref`].
    pub fn field_ref(&mut self, parent: Token, name: &str, ty: TypeSig) -> Result<Token> {
        let blob = encode_field_signature(&FieldSig { ty: Param::new(ty) })?;
        self.member_ref(parent, name, &blob)
    }

    /// Add a `StandAloneSig` declaring `locals`, for [`MethodBody::local_var_sig_token`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidSignature`] if a local has no blob encoding.
    pub fn local_signature(&mut self, locals: &[TypeSig]) -> Result<Token> {
        let blob = encode_local_var_signature(&LocalVarSig {
            locals: locals.iter().cloned().map(Param::new).collect(),
        })?;
        let signature = self.blobs.add(&blob)?;
        let rid = self.tables.stand_alone_sig.row_count() + 1;
        self.tables
            .stand_alone_sig
            .push(StandAloneSigRaw { rid, signature });
        Ok(Token::from_parts(TableId::StandAloneSig, rid))
    }

    /// Add a `TypeSpec` for `ty`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSignature`] if `ty` has no blob encoding.
    pub fn type_spec(&mut self, ty: &TypeSig) -> Result<Token> {
        let blob = encode_typespec_signature(ty)?;
        let signature = self.blobs.add(&blob)?;
        let rid = self.tables.type_spec.row_count() + 1;
        self.tables.type_spec.push(TypeSpecRaw { rid, signature });
        Ok(Token::from_parts(TableId::TypeSpec, rid))
    }

    /// Instantiate the generic method `method` with `args`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] if `method` is neither a `MethodDef` nor a
    /// `MemberRef`, or [`Error::InvalidSignature`] for an argument without blob encoding.
    pub fn method_spec(&mut self, method: Token, args: &[TypeSig]) -> Result<Token> {
        let method = MethodDefOrRef::from_token(method)?;
        let blob = encode_method_spec_signature(&MethodSpecSig {
            args: args.to_vec(),
        })?;
        let instantiation = self.blobs.add(&blob)?;
        let rid = self.tables.method_spec.row_count() + 1;
        self.tables.method_spec.push(MethodSpecRaw {
            rid,
            method: Some(method),
            instantiation,
        });
        Ok(Token::from_parts(TableId::MethodSpec, rid))
    }

    /// Declare generic parameter `number` of the type or method `owner`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] if `owner` is neither a `TypeDef` nor a `MethodDef`.
    pub fn generic_param(&mut self, owner: Token, number: u16, name: &str) -> Result<Token> {
        let owner = TypeOrMethodDef::from_token(owner)?;
        let rid = self.tables.generic_param.row_count() + 1;
        let name = self.strings.add(name);
        self.tables.generic_param.push(GenericParamRaw {
            rid,
            number,
            flags: 0,
            owner: Some(owner),
            name,
        });
        Ok(Token::from_parts(TableId::GenericParam, rid))
    }

    /// Attach a custom attribute built by `constructor` with the raw argument blob `value`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleIndex`] if `parent` cannot carry attributes or
    /// `constructor` is not a method token.
    pub fn custom_attribute(
        &mut self,
        parent: Token,
        constructor: Token,
        value: &[u8],
    ) -> Result<Token> {
        let parent = HasCustomAttribute::from_token(parent)?;
        let constructor = CustomAttributeType::from_token(constructor)?;
        let value = self.blobs.add(value)?;
        let rid = self.tables.custom_attribute.row_count() + 1;
        self.tables.custom_attribute.push(CustomAttributeRaw {
            rid,
            parent: Some(parent),
            constructor: Some(constructor),
            value,
        });
        Ok(Token::from_parts(TableId::CustomAttribute, rid))
    }

    /// Intern a string literal for `ldstr`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] once the `#US` heap outgrows the token range.
    pub fn user_string(&mut self, value: &str) -> Result<Token> {
        let offset = self.user_strings.add(value)?;
        Ok(Token::new(0x7000_0000 | offset))
    }

    /// Make `method` the entry point.
    pub fn entry_point(&mut self, method: Token) {
        self.entry_point = method;
    }

    /// Lay out the image.
    ///
    /// The `.text` section holds the CLI header, the method bodies at 4 byte aligned offsets
    /// and the metadata root with its streams.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if a table index outgrows its column.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut text = vec![0u8; COR20_HEADER_SIZE];

        let mut rvas = vec![0u32; self.tables.method_def.row_count() as usize];
        for (rid, body) in &self.bodies {
            text.resize((text.len() + 3) & !3, 0);
            rvas[*rid as usize - 1] = section_rva(text.len())?;
            text.extend_from_slice(&body.write());
        }

        let mut tables = self.tables.clone();
        tables.method_def = MetadataTable::default();
        for row in &self.tables.method_def {
            tables.method_def.push(MethodDefRaw {
                rva: rvas[row.rid as usize - 1],
                ..row.clone()
            });
        }

        let mut heap_flags = 0u8;
        if self.strings.is_large() {
            heap_flags |= 0x01;
        }
        if self.guids.is_large() {
            heap_flags |= 0x02;
        }
        if self.blobs.is_large() {
            heap_flags |= 0x04;
        }

        let streams = [
            ("#~", tables.write(heap_flags)?),
            ("#Strings", self.strings.finish()),
            ("#US", self.user_strings.finish()),
            ("#GUID", self.guids.finish()),
            ("#Blob", self.blobs.finish()),
        ];
        let metadata = metadata_root(&streams)?;

        text.resize((text.len() + 3) & !3, 0);
        let metadata_rva = section_rva(text.len())?;
        let metadata_size = u32::try_from(metadata.len())
            .map_err(|_| malformed_error!("Metadata of {} bytes is too large", metadata.len()))?;
        text.extend_from_slice(&metadata);

        let mut header = Vec::with_capacity(COR20_HEADER_SIZE);
        header.extend_from_slice(&(COR20_HEADER_SIZE as u32).to_le_bytes());
        header.extend_from_slice(&2u16.to_le_bytes());
        header.extend_from_slice(&5u16.to_le_bytes());
        header.extend_from_slice(&metadata_rva.to_le_bytes());
        header.extend_from_slice(&metadata_size.to_le_bytes());
        header.extend_from_slice(&COMIMAGE_FLAGS_ILONLY.to_le_bytes());
        header.extend_from_slice(&self.entry_point.value().to_le_bytes());
        header.resize(COR20_HEADER_SIZE, 0);
        text[..COR20_HEADER_SIZE].copy_from_slice(&header);

        log::debug!(
            "built image: {} types, {} methods, {} bytes of metadata",
            tables.type_def.row_count(),
            tables.method_def.row_count(),
            metadata.len()
        );

        pe::write_image(&text, pe::TEXT_RVA, COR20_HEADER_SIZE as u32)
    }
}

fn section_rva(offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| offset.checked_add(pe::TEXT_RVA))
        .ok_or_else(|| malformed_error!("Section offset {} is out of range", offset))
}

/// The metadata root followed by the stream data, each stream 4 byte aligned.
fn metadata_root(streams: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut version = RUNTIME_VERSION.as_bytes().to_vec();
    version.push(0);
    version.resize((version.len() + 3) & !3, 0);

    let directory: usize = streams
        .iter()
        .map(|(name, _)| 8 + ((name.len() + 1 + 3) & !3))
        .sum();
    let header_size = 16 + version.len() + 4 + directory;

    let mut out = Vec::with_capacity(header_size);
    out.extend_from_slice(&CIL_HEADER_MAGIC.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(version.len() as u32).to_le_bytes());
    out.extend_from_slice(&version);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    let mut offset = header_size;
    for (name, data) in streams {
        let stream_offset = u32::try_from(offset)
            .map_err(|_| malformed_error!("Stream {} starts out of range", name))?;
        let stream_size = u32::try_from(data.len())
            .map_err(|_| malformed_error!("Stream {} is too large", name))?;
        out.extend_from_slice(&stream_offset.to_le_bytes());
        out.extend_from_slice(&stream_size.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.resize((out.len() + 3) & !3, 0);
        offset += data.len();
    }
    debug_assert_eq!(out.len(), header_size);

    for (_, data) in streams {
        out.extend_from_slice(data);
    }

    Ok(out)
}

/// A stable module version id derived from the assembly name.
fn mvid_for(name: &str) -> uguid::Guid {
    let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
    let mut bytes = [0u8; 16];
    for (round, chunk) in bytes.chunks_exact_mut(8).enumerate() {
        for byte in name.bytes().chain(std::iter::once(round as u8)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01B3);
        }
        chunk.copy_from_slice(&hash.to_le_bytes());
    }
    uguid::Guid::from_bytes(bytes)
}
