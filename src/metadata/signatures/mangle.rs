//! Linker symbol names for compiled objects.
//!
//! The grammar follows the shape of the Itanium C++ ABI:
//!
//! ```text
//! <name>        ::= _Z <type> <object> | _M <len> <module> | _A <len> <assembly>
//! <type>        ::= { P | R | B } <nested> [ _G <count> <type>* ]
//! <nested>      ::= N <len> <module> <len> <namespace> <len> <name>
//!                 | U <len> <namespace> <len> <name>       (last module)
//!                 | V <len> <name>                         (last module and namespace)
//!                 | W <len> <namespace> <len> <name>       (core library)
//!                 | X <len> <name>                         (support module and namespace)
//!                 | <primitive> | u1Z <type> | u1A <type> <rank> _ {<lo> _} {<size> _}
//!                 | u1G <n> | u1g <n> | u1P | u1p
//! <object>      ::= TI | TV | S | FI <len> <name> _R <type>
//!                 | M_ <method> | MI <method>
//! <method>      ::= <cc> _ <len> <name> _R <type> _P <count> [u1t] <type>* [ _g <count> <type>* ]
//! ```
//!
//! `P`, `R` and `B` are unmanaged pointer, managed reference and boxed wrappers. The characters
//! `+ - . # : / \` are written as `#` and two uppercase hex digits; lengths count the escaped
//! text. Array lower bounds may be negative and are then written with a leading `-`.
//!
//! `u1P` and `u1p` stand for a type or method parameter left without an instantiation. The
//! position is not part of the name, so demangling yields index 0.

use crate::{
    metadata::signatures::{
        ArrayShape, CallConv, ElementType, GenericMethodSig, GenericOrigin, MethodSig,
        MethodSignature, Param, TypeName, TypeResolver, TypeSig,
    },
    Error, Result,
};

/// Kinds of objects that carry a symbol name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Runtime type information of a type
    TypeInfo,
    /// Virtual method table of a type
    VTable,
    /// Reflection information of a method
    MethodInfo,
    /// Reflection information of a field
    FieldInfo,
    /// Executable code of a method
    Method,
    /// Static fields of a type
    StaticData,
    /// Module information
    Module,
    /// Assembly information
    Assembly,
}

/// An object to name, with everything its symbol encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ObjectToMangle {
    TypeInfo(TypeSig),
    VTable(TypeSig),
    StaticData(TypeSig),
    Method {
        owner: TypeSig,
        name: String,
        sig: MethodSignature,
    },
    MethodInfo {
        owner: TypeSig,
        name: String,
        sig: MethodSignature,
    },
    FieldInfo {
        owner: TypeSig,
        name: String,
        ty: TypeSig,
    },
    Module(String),
    Assembly(String),
}

impl ObjectToMangle {
    /// The kind of object
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectToMangle::TypeInfo(_) => ObjectKind::TypeInfo,
            ObjectToMangle::VTable(_) => ObjectKind::VTable,
            ObjectToMangle::StaticData(_) => ObjectKind::StaticData,
            ObjectToMangle::Method { .. } => ObjectKind::Method,
            ObjectToMangle::MethodInfo { .. } => ObjectKind::MethodInfo,
            ObjectToMangle::FieldInfo { .. } => ObjectKind::FieldInfo,
            ObjectToMangle::Module(_) => ObjectKind::Module,
            ObjectToMangle::Assembly(_) => ObjectKind::Assembly,
        }
    }

    /// The type the object belongs to, if it belongs to one
    #[must_use]
    pub fn owner(&self) -> Option<&TypeSig> {
        match self {
            ObjectToMangle::TypeInfo(owner)
            | ObjectToMangle::VTable(owner)
            | ObjectToMangle::StaticData(owner)
            | ObjectToMangle::Method { owner, .. }
            | ObjectToMangle::MethodInfo { owner, .. }
            | ObjectToMangle::FieldInfo { owner, .. } => Some(owner),
            ObjectToMangle::Module(_) | ObjectToMangle::Assembly(_) => None,
        }
    }
}

const ESCAPED: [char; 7] = ['+', '-', '.', '#', ':', '/', '\\'];

/// Escape the characters that are not valid in symbol names
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ESCAPED.contains(&c) {
            out.push_str(&format!("#{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse of [`escape`].
///
/// # Errors
/// Returns [`crate::Error::InvalidSignature`] for a truncated or non-hex escape.
pub fn unescape(text: &str) -> Result<String> {
    let chars: Vec<char> = text.chars().collect();
    decode_escaped(&chars)
}

fn decode_escaped(chars: &[char]) -> Result<String> {
    let mut out = String::with_capacity(chars.len());
    let mut index = 0;
    while index < chars.len() {
        if chars[index] == '#' {
            let digits: String = chars
                .get(index + 1..index + 3)
                .ok_or_else(|| mangle_error("truncated escape"))?
                .iter()
                .collect();
            let value = u8::from_str_radix(&digits, 16)
                .map_err(|_| mangle_error(&format!("invalid escape #{digits}")))?;
            out.push(char::from(value));
            index += 3;
        } else {
            out.push(chars[index]);
            index += 1;
        }
    }
    Ok(out)
}

fn uninstantiated(origin: GenericOrigin) -> TypeSig {
    TypeSig::Uninstantiated {
        index: 0,
        name: None,
        origin,
    }
}

fn mangle_error(message: &str) -> Error {
    Error::InvalidSignature(format!("mangled name - {message}"))
}

/// Most recently used module and namespace, escaped.
#[derive(Debug, Default)]
struct ManglerState {
    cur_module: Option<String>,
    cur_nspace: Option<String>,
}

fn primitive_code(kind: ElementType) -> Option<&'static str> {
    Some(match kind {
        ElementType::Void => "v",
        ElementType::Char => "c",
        ElementType::Boolean => "b",
        ElementType::I1 => "a",
        ElementType::U1 => "h",
        ElementType::I2 => "s",
        ElementType::U2 => "t",
        ElementType::I4 => "i",
        ElementType::U4 => "j",
        ElementType::I8 => "x",
        ElementType::U8 => "y",
        ElementType::R4 => "f",
        ElementType::R8 => "d",
        ElementType::I => "u1I",
        ElementType::U => "u1U",
        ElementType::String => "u1S",
        ElementType::TypedByRef => "u1T",
        ElementType::Object => "u1O",
        ElementType::VirtFtnPtr => "u1V",
        ElementType::UninstantiatedGenericParam => "u1P",
        ElementType::RefGenericParam => "u1R",
        ElementType::End => return None,
    })
}

/// Mangles and demangles symbol names against the loaded types.
pub struct Mangler<'r> {
    resolver: &'r dyn TypeResolver,
    corlib: &'r str,
    support: &'r str,
}

impl<'r> Mangler<'r> {
    /// A mangler resolving names through `resolver`, with the given core library and support
    /// module names for the `W` and `X` shortcuts
    #[must_use]
    pub fn new(resolver: &'r dyn TypeResolver, corlib: &'r str, support: &'r str) -> Self {
        Mangler {
            resolver,
            corlib,
            support,
        }
    }

    /// The symbol name of `object`.
    ///
    /// # Errors
    /// Returns a resolution error if a class has no name, or
    /// [`crate::Error::InvalidSignature`] for a placeholder slot in a signature.
    pub fn mangle(&self, object: &ObjectToMangle) -> Result<String> {
        let mut out = String::new();
        let mut state = ManglerState::default();

        match object {
            ObjectToMangle::Module(name) => {
                out.push_str("_M");
                push_with_length(&mut out, &escape(name));
            }
            ObjectToMangle::Assembly(name) => {
                out.push_str("_A");
                push_with_length(&mut out, &escape(name));
            }
            ObjectToMangle::TypeInfo(owner) => {
                self.mangle_prefixed(&mut out, owner, &mut state)?;
                out.push_str("TI");
            }
            ObjectToMangle::VTable(owner) => {
                self.mangle_prefixed(&mut out, owner, &mut state)?;
                out.push_str("TV");
            }
            ObjectToMangle::StaticData(owner) => {
                self.mangle_prefixed(&mut out, owner, &mut state)?;
                out.push('S');
            }
            ObjectToMangle::FieldInfo { owner, name, ty } => {
                self.mangle_prefixed(&mut out, owner, &mut state)?;
                out.push_str("FI");
                push_with_length(&mut out, &escape(name));
                out.push_str("_R");
                self.mangle_type(&mut out, ty, &mut state)?;
            }
            ObjectToMangle::Method { owner, name, sig } => {
                self.mangle_prefixed(&mut out, owner, &mut state)?;
                out.push_str("M_");
                self.mangle_method(&mut out, name, sig, &mut state)?;
            }
            ObjectToMangle::MethodInfo { owner, name, sig } => {
                self.mangle_prefixed(&mut out, owner, &mut state)?;
                out.push_str("MI");
                self.mangle_method(&mut out, name, sig, &mut state)?;
            }
        }

        Ok(out)
    }

    /// The mangled form of a type on its own, without the `_Z` prefix.
    ///
    /// # Errors
    /// See [`Mangler::mangle`].
    pub fn mangle_type_name(&self, ty: &TypeSig) -> Result<String> {
        let mut out = String::new();
        self.mangle_type(&mut out, ty, &mut ManglerState::default())?;
        Ok(out)
    }

    fn mangle_prefixed(&self, out: &mut String, owner: &TypeSig, state: &mut ManglerState) -> Result<()> {
        out.push_str("_Z");
        self.mangle_type(out, owner, state)
    }

    fn mangle_method(
        &self,
        out: &mut String,
        name: &str,
        sig: &MethodSignature,
        state: &mut ManglerState,
    ) -> Result<()> {
        let method = sig.method();

        out.push_str(&(method.call_conv as u32).to_string());
        out.push('_');
        push_with_length(out, &escape(name));
        out.push_str("_R");
        self.mangle_type(out, &method.ret.ty, state)?;

        out.push_str("_P");
        out.push_str(&method.arg_count().to_string());
        if method.has_implicit_this() {
            out.push_str("u1t");
        }
        for param in &method.params {
            self.mangle_type(out, &param.ty, state)?;
        }

        if let Some(args) = sig.generic_args() {
            out.push_str("_g");
            out.push_str(&args.len().to_string());
            for arg in args {
                self.mangle_type(out, arg, state)?;
            }
        }

        Ok(())
    }

    fn mangle_type(&self, out: &mut String, ty: &TypeSig, state: &mut ManglerState) -> Result<()> {
        match ty {
            TypeSig::Boxed(inner) => {
                out.push('B');
                self.mangle_type(out, inner, state)?;
            }
            TypeSig::ByRef(inner) => {
                out.push('R');
                self.mangle_type(out, inner, state)?;
            }
            TypeSig::Ptr(inner) => {
                out.push('P');
                self.mangle_type(out, inner, state)?;
            }
            TypeSig::SzArray(elem) => {
                out.push_str("u1Z");
                self.mangle_type(out, elem, state)?;
            }
            TypeSig::Array(shape) => {
                out.push_str("u1A");
                self.mangle_type(out, &shape.elem, state)?;
                out.push_str(&shape.rank.to_string());
                out.push('_');
                for dim in 0..shape.rank as usize {
                    if let Some(bound) = shape.lo_bounds.get(dim) {
                        out.push_str(&bound.to_string());
                    }
                    out.push('_');
                }
                for dim in 0..shape.rank as usize {
                    if let Some(size) = shape.sizes.get(dim) {
                        out.push_str(&size.to_string());
                    }
                    out.push('_');
                }
            }
            TypeSig::Primitive(kind) => {
                let code = primitive_code(*kind).ok_or_else(|| {
                    Error::InvalidSignature(format!("{kind:?} has no mangled form"))
                })?;
                out.push_str(code);
            }
            TypeSig::Class(class) => match self.resolver.resolve_class(*class)? {
                TypeSig::Class(definition) => {
                    let name = self.resolver.type_name(definition)?;
                    self.mangle_nested(out, &name, state);
                }
                canonical => self.mangle_type(out, &canonical, state)?,
            },
            TypeSig::GenericInst { base, args } => {
                self.mangle_type(out, base, state)?;
                out.push_str("_G");
                out.push_str(&args.len().to_string());
                for arg in args {
                    self.mangle_type(out, arg, state)?;
                }
            }
            TypeSig::Var(index) => {
                out.push_str("u1G");
                out.push_str(&index.to_string());
            }
            TypeSig::MVar(index) => {
                out.push_str("u1g");
                out.push_str(&index.to_string());
            }
            // The grammar keeps the originating list but not the position
            TypeSig::Uninstantiated { origin, .. } => out.push_str(match origin {
                GenericOrigin::Type => "u1P",
                GenericOrigin::Method => "u1p",
            }),
        }

        Ok(())
    }

    fn mangle_nested(&self, out: &mut String, name: &TypeName, state: &mut ManglerState) {
        let module = escape(&name.module);
        let nspace = escape(&name.namespace);
        let type_name = escape(&name.name);

        if state.cur_module.as_deref() == Some(module.as_str()) {
            if state.cur_nspace.as_deref() == Some(nspace.as_str()) {
                out.push('V');
                push_with_length(out, &type_name);
            } else {
                out.push('U');
                push_with_length(out, &nspace);
                push_with_length(out, &type_name);
                state.cur_nspace = Some(nspace);
            }
            return;
        }

        if module == escape(self.corlib) {
            out.push('W');
            push_with_length(out, &nspace);
            push_with_length(out, &type_name);
        } else if module == escape(self.support) && nspace == module {
            out.push('X');
            push_with_length(out, &type_name);
        } else {
            out.push('N');
            push_with_length(out, &module);
            push_with_length(out, &nspace);
            push_with_length(out, &type_name);
        }
        state.cur_module = Some(module);
        state.cur_nspace = Some(nspace);
    }

    /// Recover the object a symbol names, resolving type names through the resolver.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a name that does not follow the grammar and
    /// a resolution error for a type that is not loaded.
    pub fn demangle(&self, name: &str) -> Result<ObjectToMangle> {
        let mut reader = Demangler {
            mangler: self,
            chars: name.chars().collect(),
            pos: 0,
            state: ManglerState::default(),
        };

        let object = if reader.eat("_M") {
            ObjectToMangle::Module(reader.string_with_length()?)
        } else if reader.eat("_A") {
            ObjectToMangle::Assembly(reader.string_with_length()?)
        } else if reader.eat("_Z") {
            let owner = reader.type_name()?;
            reader.object(owner)?
        } else {
            return Err(mangle_error(&format!("{name} is not a mangled name")));
        };

        if reader.pos != reader.chars.len() {
            return Err(mangle_error(&format!(
                "trailing characters at {} in {name}",
                reader.pos
            )));
        }

        Ok(object)
    }

    /// Recover a type from [`Mangler::mangle_type_name`] output.
    ///
    /// # Errors
    /// See [`Mangler::demangle`].
    pub fn demangle_type_name(&self, name: &str) -> Result<TypeSig> {
        let mut reader = Demangler {
            mangler: self,
            chars: name.chars().collect(),
            pos: 0,
            state: ManglerState::default(),
        };
        let ty = reader.type_name()?;
        if reader.pos != reader.chars.len() {
            return Err(mangle_error(&format!("trailing characters in {name}")));
        }
        Ok(ty)
    }
}

fn push_with_length(out: &mut String, text: &str) {
    out.push_str(&text.chars().count().to_string());
    out.push_str(text);
}

struct Demangler<'m, 'r> {
    mangler: &'m Mangler<'r>,
    chars: Vec<char>,
    pos: usize,
    state: ManglerState,
}

impl Demangler<'_, '_> {
    fn eat(&mut self, text: &str) -> bool {
        let len = text.chars().count();
        match self.chars.get(self.pos..self.pos + len) {
            Some(window) if window.iter().copied().eq(text.chars()) => {
                self.pos += len;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, text: &str) -> Result<()> {
        if self.eat(text) {
            Ok(())
        } else {
            Err(mangle_error(&format!("'{text}' expected at {}", self.pos)))
        }
    }

    /// A decimal integer, a lone leading `0` ends the number
    fn integer(&mut self) -> Option<i64> {
        if self.chars.get(self.pos) == Some(&'0') {
            self.pos += 1;
            return Some(0);
        }

        let start = self.pos;
        if self.chars.get(self.pos) == Some(&'-') {
            self.pos += 1;
        }
        let digits = self.pos;
        while self.chars.get(self.pos).is_some_and(char::is_ascii_digit) {
            self.pos += 1;
        }
        if self.pos == digits {
            self.pos = start;
            return None;
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().ok()
    }

    fn count(&mut self) -> Result<u32> {
        self.integer()
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| mangle_error(&format!("count expected at {}", self.pos)))
    }

    fn string_with_length(&mut self) -> Result<String> {
        let len = self.count()? as usize;
        let raw = self
            .chars
            .get(self.pos..self.pos + len)
            .ok_or_else(|| mangle_error("string runs past the end"))?;
        let text = decode_escaped(raw)?;
        self.pos += len;
        Ok(text)
    }

    fn class(&mut self, module: String, namespace: String, name: String) -> Result<TypeSig> {
        let class = self
            .mangler
            .resolver
            .find_type(&TypeName::new(module, namespace, name))?;
        Ok(TypeSig::Class(class))
    }

    fn type_name(&mut self) -> Result<TypeSig> {
        let mut prefixes = Vec::new();
        loop {
            if self.eat("P") {
                prefixes.push('P');
            } else if self.eat("R") {
                prefixes.push('R');
            } else if self.eat("B") {
                prefixes.push('B');
            } else {
                break;
            }
        }

        let mut ty = self.base_type()?;

        if self.eat("_G") {
            let count = self.count()?;
            let mut args = Vec::with_capacity(count as usize);
            for _ in 0..count {
                args.push(self.type_name()?);
            }
            ty = TypeSig::GenericInst {
                base: Box::new(ty),
                args,
            };
        }

        for prefix in prefixes.into_iter().rev() {
            ty = match prefix {
                'P' => TypeSig::Ptr(Box::new(ty)),
                'R' => TypeSig::ByRef(Box::new(ty)),
                _ => TypeSig::Boxed(Box::new(ty)),
            };
        }

        Ok(ty)
    }

    fn base_type(&mut self) -> Result<TypeSig> {
        const SINGLE: [(char, ElementType); 13] = [
            ('v', ElementType::Void),
            ('c', ElementType::Char),
            ('b', ElementType::Boolean),
            ('a', ElementType::I1),
            ('h', ElementType::U1),
            ('s', ElementType::I2),
            ('t', ElementType::U2),
            ('i', ElementType::I4),
            ('j', ElementType::U4),
            ('x', ElementType::I8),
            ('y', ElementType::U8),
            ('f', ElementType::R4),
            ('d', ElementType::R8),
        ];
        const EXTENDED: [(char, ElementType); 7] = [
            ('I', ElementType::I),
            ('U', ElementType::U),
            ('S', ElementType::String),
            ('T', ElementType::TypedByRef),
            ('O', ElementType::Object),
            ('V', ElementType::VirtFtnPtr),
            ('R', ElementType::RefGenericParam),
        ];

        let Some(&lead) = self.chars.get(self.pos) else {
            return Err(mangle_error("type expected at end of name"));
        };

        if let Some((_, kind)) = SINGLE.iter().find(|(code, _)| *code == lead) {
            self.pos += 1;
            return Ok(TypeSig::Primitive(*kind));
        }

        if self.eat("u1") {
            let Some(&code) = self.chars.get(self.pos) else {
                return Err(mangle_error("truncated u1 code"));
            };
            self.pos += 1;

            if let Some((_, kind)) = EXTENDED.iter().find(|(c, _)| *c == code) {
                return Ok(TypeSig::Primitive(*kind));
            }

            return match code {
                'P' => Ok(uninstantiated(GenericOrigin::Type)),
                'p' => Ok(uninstantiated(GenericOrigin::Method)),
                'G' => Ok(TypeSig::Var(self.count()?)),
                'g' => Ok(TypeSig::MVar(self.count()?)),
                'Z' => Ok(TypeSig::SzArray(Box::new(self.type_name()?))),
                'A' => self.array(),
                other => Err(mangle_error(&format!("unknown code u1{other}"))),
            };
        }

        self.pos += 1;
        match lead {
            'N' => {
                let module = self.string_with_length()?;
                let namespace = self.string_with_length()?;
                let name = self.string_with_length()?;
                self.state.cur_module = Some(module.clone());
                self.state.cur_nspace = Some(namespace.clone());
                self.class(module, namespace, name)
            }
            'U' => {
                let module = self
                    .state
                    .cur_module
                    .clone()
                    .ok_or_else(|| mangle_error("'U' without a current module"))?;
                let namespace = self.string_with_length()?;
                let name = self.string_with_length()?;
                self.state.cur_nspace = Some(namespace.clone());
                self.class(module, namespace, name)
            }
            'V' => {
                let (Some(module), Some(namespace)) =
                    (self.state.cur_module.clone(), self.state.cur_nspace.clone())
                else {
                    return Err(mangle_error("'V' without a current namespace"));
                };
                let name = self.string_with_length()?;
                self.class(module, namespace, name)
            }
            'W' => {
                let module = self.mangler.corlib.to_string();
                let namespace = self.string_with_length()?;
                let name = self.string_with_length()?;
                self.state.cur_module = Some(module.clone());
                self.state.cur_nspace = Some(namespace.clone());
                self.class(module, namespace, name)
            }
            'X' => {
                let module = self.mangler.support.to_string();
                let name = self.string_with_length()?;
                self.state.cur_module = Some(module.clone());
                self.state.cur_nspace = Some(module.clone());
                self.class(module.clone(), module, name)
            }
            other => {
                self.pos -= 1;
                Err(mangle_error(&format!("unknown type code '{other}' at {}", self.pos)))
            }
        }
    }

    fn array(&mut self) -> Result<TypeSig> {
        let elem = self.type_name()?;
        let rank = self.count()?;
        self.expect("_")?;

        let mut lo_bounds = Vec::new();
        for _ in 0..rank {
            if let Some(bound) = self.integer() {
                lo_bounds.push(
                    i32::try_from(bound).map_err(|_| mangle_error("lower bound out of range"))?,
                );
            }
            self.expect("_")?;
        }

        let mut sizes = Vec::new();
        for _ in 0..rank {
            if let Some(size) = self.integer() {
                sizes.push(u32::try_from(size).map_err(|_| mangle_error("size out of range"))?);
            }
            self.expect("_")?;
        }

        Ok(TypeSig::Array(Box::new(ArrayShape {
            elem,
            rank,
            sizes,
            lo_bounds,
        })))
    }

    fn object(&mut self, owner: TypeSig) -> Result<ObjectToMangle> {
        if self.eat("TI") {
            Ok(ObjectToMangle::TypeInfo(owner))
        } else if self.eat("TV") {
            Ok(ObjectToMangle::VTable(owner))
        } else if self.eat("S") {
            Ok(ObjectToMangle::StaticData(owner))
        } else if self.eat("MI") {
            let (name, sig) = self.method()?;
            Ok(ObjectToMangle::MethodInfo { owner, name, sig })
        } else if self.eat("M_") {
            let (name, sig) = self.method()?;
            Ok(ObjectToMangle::Method { owner, name, sig })
        } else if self.eat("FI") {
            let name = self.string_with_length()?;
            self.expect("_R")?;
            let ty = self.type_name()?;
            Ok(ObjectToMangle::FieldInfo { owner, name, ty })
        } else {
            Err(mangle_error(&format!("unknown object kind at {}", self.pos)))
        }
    }

    fn method(&mut self) -> Result<(String, MethodSignature)> {
        let call_conv = self
            .integer()
            .and_then(|value| u32::try_from(value).ok())
            .and_then(CallConv::from_u32)
            .ok_or_else(|| mangle_error("calling convention expected"))?;
        self.expect("_")?;
        let name = self.string_with_length()?;

        self.expect("_R")?;
        let ret = Param::new(self.type_name()?);

        self.expect("_P")?;
        let count = self.count()?;
        let mut sig = MethodSig {
            call_conv,
            ret,
            ..MethodSig::default()
        };
        for index in 0..count {
            if self.eat("u1t") {
                if index != 0 {
                    return Err(mangle_error("out of order this pointer"));
                }
                sig.has_this = true;
            } else {
                sig.params.push(Param::new(self.type_name()?));
            }
        }

        if self.eat("_g") {
            let count = self.count()?;
            let mut args = Vec::with_capacity(count as usize);
            for _ in 0..count {
                args.push(self.type_name()?);
            }
            sig.gen_param_count = count;
            return Ok((name, MethodSignature::Generic(GenericMethodSig { method: sig, args })));
        }

        Ok((name, MethodSignature::Method(sig)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{compare_method_signatures, compare_types, TestResolver};

    fn resolver() -> TestResolver {
        let mut resolver = TestResolver::default();
        resolver.define("mscorlib", "System", "Object");
        resolver.define("mscorlib", "System.Collections.Generic", "List`1");
        resolver.define("libsupcs", "libsupcs", "ExtraArgumentAttribute");
        resolver.define("app", "Demo", "Widget");
        resolver.define("app", "Demo", "Widget+Part");
        resolver.define("app", "Demo.Inner", "Gadget");
        resolver
    }

    fn class(resolver: &TestResolver, module: &str, ns: &str, name: &str) -> TypeSig {
        TypeSig::Class(resolver.find_type(&TypeName::new(module, ns, name)).unwrap())
    }

    #[test]
    fn escaping() {
        assert_eq!(escape(".ctor"), "#2Ector");
        assert_eq!(escape("a+b-c#d:e/f\\g"), "a#2Bb#2Dc#23d#3Ae#2Ff#5Cg");
        assert_eq!(unescape("#2Ector").unwrap(), ".ctor");
        assert!(unescape("#2").is_err());
    }

    #[test]
    fn extra_argument_constructor() {
        let resolver = resolver();
        let mangler = Mangler::new(&resolver, "mscorlib", "libsupcs");

        let owner = class(&resolver, "libsupcs", "libsupcs", "ExtraArgumentAttribute");
        let sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![TypeSig::Primitive(ElementType::I4), TypeSig::Primitive(ElementType::I4)],
        )
        .with_this();
        let object = ObjectToMangle::Method {
            owner,
            name: ".ctor".to_string(),
            sig: sig.into(),
        };

        let name = mangler.mangle(&object).unwrap();
        assert_eq!(name, "_ZX22ExtraArgumentAttributeM_0_7#2Ector_Rv_P3u1tii");
        assert_eq!(mangler.demangle(&name).unwrap(), object);
    }

    #[test]
    fn back_references() {
        let resolver = resolver();
        let mangler = Mangler::new(&resolver, "mscorlib", "libsupcs");

        let owner = class(&resolver, "app", "Demo", "Widget");
        let part = class(&resolver, "app", "Demo", "Widget+Part");
        let gadget = class(&resolver, "app", "Demo.Inner", "Gadget");
        let sig = MethodSig::new(part.clone(), vec![gadget.clone(), owner.clone()]);
        let object = ObjectToMangle::MethodInfo {
            owner,
            name: "Make".to_string(),
            sig: sig.into(),
        };

        let name = mangler.mangle(&object).unwrap();
        assert_eq!(
            name,
            "_ZN3app4Demo6WidgetMI0_4Make_RV13Widget#2BPart_P2U12Demo#2EInner6GadgetU4Demo6Widget"
        );
        assert_eq!(mangler.demangle(&name).unwrap(), object);
    }

    #[test]
    fn type_round_trips() {
        let resolver = resolver();
        let mangler = Mangler::new(&resolver, "mscorlib", "libsupcs");
        let list = class(&resolver, "mscorlib", "System.Collections.Generic", "List`1");
        let widget = class(&resolver, "app", "Demo", "Widget");

        let mut samples = vec![
            TypeSig::Primitive(ElementType::U8),
            TypeSig::Primitive(ElementType::TypedByRef),
            widget.clone(),
            TypeSig::GenericInst {
                base: Box::new(list.clone()),
                args: vec![widget.clone()],
            },
            TypeSig::Boxed(Box::new(TypeSig::Primitive(ElementType::I4))),
            TypeSig::ByRef(Box::new(TypeSig::Ptr(Box::new(widget.clone())))),
            TypeSig::SzArray(Box::new(TypeSig::Var(3))),
            TypeSig::Ptr(Box::new(TypeSig::SzArray(Box::new(TypeSig::MVar(0))))),
        ];
        for rank in 1..=4u32 {
            samples.push(TypeSig::Array(Box::new(ArrayShape {
                elem: widget.clone(),
                rank,
                sizes: (0..rank - 1).map(|d| d + 2).collect(),
                lo_bounds: (0..rank).map(|d| d as i32 - 1).collect(),
            })));
        }

        for sample in samples {
            let name = mangler.mangle_type_name(&sample).unwrap();
            let back = mangler.demangle_type_name(&name).unwrap();
            assert!(
                compare_types(&sample, &back, &resolver).unwrap(),
                "{name} did not round trip"
            );
        }
    }

    #[test]
    fn field_and_generic_method() {
        let resolver = resolver();
        let mangler = Mangler::new(&resolver, "mscorlib", "libsupcs");
        let object_ty = class(&resolver, "mscorlib", "System", "Object");

        let field = ObjectToMangle::FieldInfo {
            owner: object_ty.clone(),
            name: "m_value".to_string(),
            ty: TypeSig::Primitive(ElementType::I),
        };
        let name = mangler.mangle(&field).unwrap();
        assert_eq!(name, "_ZW6System6ObjectFI7m_value_Ru1I");
        assert_eq!(mangler.demangle(&name).unwrap(), field);

        let mut method = MethodSig::new(TypeSig::MVar(0), vec![TypeSig::MVar(0)]);
        method.call_conv = CallConv::Generic;
        method.gen_param_count = 1;
        let sig = MethodSignature::Generic(GenericMethodSig {
            method,
            args: vec![object_ty.clone()],
        });
        let object = ObjectToMangle::Method {
            owner: object_ty,
            name: "Id".to_string(),
            sig: sig.clone(),
        };
        let name = mangler.mangle(&object).unwrap();
        assert_eq!(name, "_ZW6System6ObjectM_2_2Id_Ru1g0_P1u1g0_g1V6Object");

        let ObjectToMangle::Method { sig: back, .. } = mangler.demangle(&name).unwrap() else {
            panic!("expected a method");
        };
        assert!(compare_method_signatures(&sig, &back, &resolver).unwrap());
    }

    #[test]
    fn module_and_assembly() {
        let resolver = resolver();
        let mangler = Mangler::new(&resolver, "mscorlib", "libsupcs");

        let module = ObjectToMangle::Module("app.exe".to_string());
        assert_eq!(mangler.mangle(&module).unwrap(), "_M9app#2Eexe");
        assert_eq!(mangler.demangle("_M9app#2Eexe").unwrap(), module);
        assert_eq!(
            mangler.demangle("_A8mscorlib").unwrap(),
            ObjectToMangle::Assembly("mscorlib".to_string())
        );
    }

    #[test]
    fn malformed_names() {
        let resolver = resolver();
        let mangler = Mangler::new(&resolver, "mscorlib", "libsupcs");

        assert!(mangler.demangle("main").is_err());
        assert!(mangler.demangle("_ZV3FooTI").is_err());
        assert!(mangler.demangle("_ZiTIx").is_err());
        assert!(matches!(
            mangler.demangle("_ZN3app4Demo7MissingTI"),
            Err(Error::TypeNotFound(_))
        ));
        assert!(matches!(
            mangler.demangle("_ZN5other01ATI"),
            Err(Error::AssemblyNotFound(_))
        ));
    }
}
