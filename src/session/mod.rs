//! A compilation session: the loaded modules and everything resolved across them.
//!
//! [`Session`] owns every [`Module`] that takes part in a compilation and is the single place
//! where references between modules are bound. It provides:
//!
//! - **Loading** - [`Session::load_file`], [`Session::load_bytes`] and [`Session::load`], each
//!   giving the module a stable [`ModuleId`]
//! - **Type resolution** - `TypeRef` scopes, `TypeSpec`s and the well-known core library types,
//!   see [`Session::resolve_type_ref`] and [`Session::well_known`]
//! - **Member resolution** - `MemberRef`, `MethodSpec` and definition tokens to
//!   [`MethodToCompile`] / [`FieldToCompile`]
//! - **Inheritance** - value type, enum and delegate predicates, virtual method tables and
//!   instance field layouts
//! - **Signature hooks** - custom attributes that rewrite a method's signature, see [`hooks`]
//! - **Lowering** - [`Session::lower_method`] and the parallel [`Session::lower_all`]
//!
//! Modules are only ever appended, so handles stay valid for the life of the session and all
//! queries take `&self`. Cached results (type lookups, predicates, vtables) are computed on first
//! use; racing threads may compute the same value twice, but never observe a partial one.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilfront::{CompileOptions, Session};
//!
//! let session = Session::new(CompileOptions::default());
//! session.load_file("mscorlib.dll".as_ref())?;
//! let app = session.load_file("app.exe".as_ref())?;
//!
//! for lowered in session.lower_all(app)? {
//!     let lowered = lowered?;
//!     println!("{}: {} instructions", lowered.name, lowered.code.len());
//! }
//! # Ok::<(), cilfront::Error>(())
//! ```

pub mod hooks;
mod layout;
mod lower;
mod resolve;
mod wellknown;

pub use wellknown::WellKnownType;

use std::{
    path::Path,
    sync::{Arc, Mutex, OnceLock},
};

use dashmap::DashMap;
use strum::EnumCount;

use crate::{
    config::CompileOptions,
    file::File,
    metadata::{
        module::Module,
        signatures::{
            ClassRef, ElementType, Mangler, ObjectToMangle, TypeName, TypeResolver, TypeSig,
        },
        tables::TableId,
        typesystem::{
            FieldDefinition, FieldId, MethodDefId, MethodDefinition, ModuleId, TypeDefId,
            TypeDefinition,
        },
    },
    Error, Result,
};

use hooks::{ExtraArgumentHook, SignatureHook, EXTRA_ARGUMENT_ATTRIBUTE};

/// All modules of one compilation and the state shared between them.
pub struct Session {
    options: CompileOptions,
    modules: boxcar::Vec<Arc<Module>>,
    by_name: DashMap<String, ModuleId>,
    load_lock: Mutex<()>,
    well_known: [OnceLock<TypeDefId>; WellKnownType::COUNT],
    hooks: DashMap<String, Arc<dyn SignatureHook>>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(CompileOptions::default())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("modules", &self.modules.count())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// An empty session with the `ExtraArgumentAttribute` hook registered.
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        let session = Session {
            options,
            modules: boxcar::Vec::new(),
            by_name: DashMap::new(),
            load_lock: Mutex::new(()),
            well_known: std::array::from_fn(|_| OnceLock::new()),
            hooks: DashMap::new(),
        };
        session.register_hook(EXTRA_ARGUMENT_ATTRIBUTE, Arc::new(ExtraArgumentHook));
        session
    }

    /// The options of this session
    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Register `hook` for methods carrying the attribute whose constructor mangles to
    /// `constructor`. A previous hook for the same constructor is replaced.
    pub fn register_hook(&self, constructor: &str, hook: Arc<dyn SignatureHook>) {
        self.hooks.insert(constructor.to_string(), hook);
    }

    /// Memory-map and load the image at `path`.
    ///
    /// # Errors
    /// Returns I/O errors, every format error of [`Module::load`], and [`Error::Error`] if a
    /// module of the same name is already loaded.
    pub fn load_file(&self, path: &Path) -> Result<ModuleId> {
        let file = File::from_file(path)?;
        self.load(&file)
    }

    /// Load an image held in memory.
    ///
    /// # Errors
    /// See [`Session::load_file`].
    pub fn load_bytes(&self, data: Vec<u8>) -> Result<ModuleId> {
        let file = File::from_mem(data)?;
        self.load(&file)
    }

    /// Load the module of an opened image.
    ///
    /// # Errors
    /// See [`Session::load_file`].
    pub fn load(&self, file: &File) -> Result<ModuleId> {
        let _guard = lock!(self.load_lock);

        let id = ModuleId(self.modules.count() as u32);
        let module = Module::load(id, file, &self.options)?;
        if self.by_name.contains_key(module.name()) {
            return Err(Error::Error(format!(
                "A module named {} is already loaded",
                module.name()
            )));
        }

        self.by_name.insert(module.name().to_string(), id);
        let index = self.modules.push(Arc::new(module));
        debug_assert_eq!(index, id.index());

        Ok(id)
    }

    /// Number of loaded modules
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.count()
    }

    /// The module with id `id`.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] for an id this session did not hand out.
    pub fn module(&self, id: ModuleId) -> Result<&Arc<Module>> {
        self.modules
            .get(id.index())
            .ok_or_else(|| Error::AssemblyNotFound(id.to_string()))
    }

    /// The module called `name`.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] if no such module is loaded.
    pub fn module_by_name(&self, name: &str) -> Result<&Arc<Module>> {
        let id = self
            .by_name
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| Error::AssemblyNotFound(name.to_string()))?;
        self.module(id)
    }

    /// All loaded modules in load order
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.iter().map(|(_, module)| module)
    }

    /// The type definition `id`.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] or [`Error::TypeNotFound`].
    pub fn type_def(&self, id: TypeDefId) -> Result<&TypeDefinition> {
        self.module(id.module)?.type_def(id.row)
    }

    /// The method definition `id`.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] or [`Error::MemberNotFound`].
    pub fn method_def(&self, id: MethodDefId) -> Result<&MethodDefinition> {
        self.module(id.module)?.method_def(id.row)
    }

    /// The field definition `id`.
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] or [`Error::MemberNotFound`].
    pub fn field_def(&self, id: FieldId) -> Result<&FieldDefinition> {
        self.module(id.module)?.field(id.row)
    }

    /// Signature of the type definition `id`
    #[must_use]
    pub fn type_sig(&self, id: TypeDefId) -> TypeSig {
        TypeSig::Class(ClassRef::new(id.module, id.token()))
    }

    /// A mangler resolving through this session
    #[must_use]
    pub fn mangler(&self) -> Mangler<'_> {
        Mangler::new(self, &self.options.corlib_name, &self.options.support_module)
    }

    /// The symbol name of `object`.
    ///
    /// # Errors
    /// See [`Mangler::mangle`].
    pub fn mangle(&self, object: &ObjectToMangle) -> Result<String> {
        self.mangler().mangle(object)
    }

    fn corlib_primitive(&self, id: TypeDefId) -> Result<Option<ElementType>> {
        let module = self.module(id.module)?;
        if module.name() != self.options.corlib_name {
            return Ok(None);
        }

        let ty = module.type_def(id.row)?;
        if ty.namespace != "System" || ty.is_nested() {
            return Ok(None);
        }

        Ok(ElementType::from_system_name(&ty.name))
    }
}

impl TypeResolver for Session {
    fn resolve_class(&self, class: ClassRef) -> Result<TypeSig> {
        if class.token.table_id() == Some(TableId::TypeSpec) {
            let spec = self.module(class.module)?.type_spec(class.token.row())?;
            return match spec {
                TypeSig::Class(inner) if inner.token.table_id() != Some(TableId::TypeSpec) => {
                    self.resolve_class(inner)
                }
                other => Ok(other),
            };
        }

        let id = self.class_def(class)?;
        Ok(match self.corlib_primitive(id)? {
            Some(kind) => TypeSig::Primitive(kind),
            None => self.type_sig(id),
        })
    }

    fn type_name(&self, class: ClassRef) -> Result<TypeName> {
        let id = self.class_def(class)?;
        let module = self.module(id.module)?;
        let (namespace, name) = module.full_name(id.row)?;

        Ok(TypeName::new(module.name(), namespace, name))
    }

    fn find_type(&self, name: &TypeName) -> Result<ClassRef> {
        let module = self.module_by_name(&name.module)?;
        let row = module
            .find_type(&name.namespace, &name.name)
            .ok_or_else(|| Error::TypeNotFound(name.to_string()))?;

        Ok(module.class_ref(crate::metadata::token::Token::from_parts(
            TableId::TypeDef,
            row,
        )))
    }
}
