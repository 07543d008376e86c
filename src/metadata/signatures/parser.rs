use crate::{
    config::DEFAULT_MAX_SIGNATURE_DEPTH,
    file::parser::Parser,
    metadata::{
        signatures::{
            ArrayShape, CallConv, ClassRef, CustomMod, ElementType, FieldSig, GenericMethodSig,
            LocalVarSig, MethodSig, MethodSignature, MethodSpecSig, Param, PropertySig, TypeSig,
            ELEMENT_TYPE,
        },
        typesystem::ModuleId,
    },
    Error::{RecursionLimit, UnknownElementType},
    Result,
};

const SIG_FIELD: u8 = 0x06;
const SIG_LOCAL_VAR: u8 = 0x07;
const SIG_PROPERTY: u8 = 0x08;
const SIG_GENERIC_INST: u8 = 0x0a;
const SIG_HAS_THIS: u8 = 0x20;
const SIG_EXPLICIT_THIS: u8 = 0x40;
const SIG_GENERIC: u8 = 0x10;
const SIG_VARARG: u8 = 0x05;

/// Decoder for every signature blob kind.
///
/// Class references are qualified with the module the blob belongs to. Nesting is bounded by a
/// depth guard so hostile blobs fail with [`crate::Error::RecursionLimit`] instead of
/// overflowing the stack.
///
/// ```rust
/// use cilfront::metadata::{signatures::SignatureParser, typesystem::ModuleId};
///
/// // instance void (int32)
/// let mut parser = SignatureParser::new(&[0x20, 0x01, 0x01, 0x08], ModuleId(0));
/// let sig = parser.parse_method_signature()?;
/// assert!(sig.has_this);
/// assert_eq!(sig.params.len(), 1);
/// # Ok::<(), cilfront::Error>(())
/// ```
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    module: ModuleId,
    depth: usize,
    max_depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Parse `data`, qualifying class references with `module`
    #[must_use]
    pub fn new(data: &'a [u8], module: ModuleId) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            module,
            depth: 0,
            max_depth: DEFAULT_MAX_SIGNATURE_DEPTH,
        }
    }

    /// Replace the nesting limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Current offset inside the blob
    #[must_use]
    pub fn pos(&self) -> usize {
        self.parser.pos()
    }

    /// Parse one type.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownElementType`] for a leading byte outside the algebra and
    /// [`crate::Error::RecursionLimit`] when nesting exceeds the limit.
    pub fn parse_type(&mut self) -> Result<TypeSig> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(RecursionLimit(self.max_depth));
        }

        let result = self.parse_type_inner();
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSig> {
        let current_byte = self.parser.read_le::<u8>()?;
        match current_byte {
            ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => Ok(TypeSig::Class(ClassRef::new(
                self.module,
                self.parser.read_compressed_token()?,
            ))),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSig::SzArray(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::VAR => Ok(TypeSig::Var(self.parser.read_compressed_uint()?)),
            ELEMENT_TYPE::MVAR => Ok(TypeSig::MVar(self.parser.read_compressed_uint()?)),
            ELEMENT_TYPE::GENERICINST => {
                let base = self.parse_type()?;
                let arg_count = self.parser.read_compressed_uint()?;

                let mut args = Vec::with_capacity(arg_count.min(64) as usize);
                for _ in 0..arg_count {
                    args.push(self.parse_type()?);
                }

                Ok(TypeSig::GenericInst {
                    base: Box::new(base),
                    args,
                })
            }
            ELEMENT_TYPE::PTR => Ok(TypeSig::Ptr(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::BYREF => Ok(TypeSig::ByRef(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::ARRAY => {
                let elem = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;

                let num_sizes = self.parser.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(num_sizes.min(32) as usize);
                for _ in 0..num_sizes {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let num_lo_bounds = self.parser.read_compressed_uint()?;
                let mut lo_bounds = Vec::with_capacity(num_lo_bounds.min(32) as usize);
                for _ in 0..num_lo_bounds {
                    lo_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(TypeSig::Array(Box::new(ArrayShape {
                    elem,
                    rank,
                    sizes,
                    lo_bounds,
                })))
            }
            ELEMENT_TYPE::BOXED => Ok(TypeSig::Boxed(Box::new(self.parse_type()?))),
            other => match ElementType::from_u8(other) {
                Some(kind) if kind.is_signature_primitive() => Ok(TypeSig::Primitive(kind)),
                _ => Err(UnknownElementType(other)),
            },
        }
    }

    fn parse_custom_mods(&mut self) -> Result<Vec<CustomMod>> {
        let mut mods = Vec::new();

        while self.parser.has_more_data() {
            let next_byte = self.parser.peek_byte()?;
            if next_byte != ELEMENT_TYPE::CMOD_REQD && next_byte != ELEMENT_TYPE::CMOD_OPT {
                break;
            }

            self.parser.advance_by(1)?;
            mods.push(CustomMod {
                required: next_byte == ELEMENT_TYPE::CMOD_REQD,
                class: ClassRef::new(self.module, self.parser.read_compressed_token()?),
            });
        }

        Ok(mods)
    }

    /// Parse a parameter, return or local slot.
    ///
    /// # Errors
    /// See [`SignatureParser::parse_type`].
    pub fn parse_param(&mut self) -> Result<Param> {
        let custom_mods = self.parse_custom_mods()?;

        let mut pinned = false;
        if self.parser.peek_byte()? == ELEMENT_TYPE::PINNED {
            self.parser.advance_by(1)?;
            pinned = true;
        }

        Ok(Param {
            ty: self.parse_type()?,
            custom_mods,
            pinned,
            name: None,
        })
    }

    /// Parse a `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`.
    ///
    /// A vararg sentinel is consumed; its position is recorded in [`MethodSig::sentinel`].
    ///
    /// # Errors
    /// See [`SignatureParser::parse_type`].
    pub fn parse_method_signature(&mut self) -> Result<MethodSig> {
        let convention_byte = self.parser.read_le::<u8>()?;

        let call_conv = if convention_byte & SIG_GENERIC != 0 {
            CallConv::Generic
        } else if convention_byte & SIG_VARARG == SIG_VARARG {
            CallConv::VarArg
        } else {
            CallConv::Default
        };

        let gen_param_count = if call_conv == CallConv::Generic {
            self.parser.read_compressed_uint()?
        } else {
            0
        };
        let param_count = self.parser.read_compressed_uint()?;
        let ret = self.parse_param()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        let mut sentinel = None;
        for index in 0..param_count as usize {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.parser.advance_by(1)?;
                sentinel = Some(index);
            }
            params.push(self.parse_param()?);
        }

        Ok(MethodSig {
            has_this: convention_byte & SIG_HAS_THIS != 0,
            explicit_this: convention_byte & SIG_EXPLICIT_THIS != 0,
            call_conv,
            gen_param_count,
            ret,
            params,
            sentinel,
        })
    }

    /// Parse a method signature optionally followed by its instantiation, the form used by
    /// compiler generated signature blobs.
    ///
    /// # Errors
    /// See [`SignatureParser::parse_type`].
    pub fn parse_instantiated_method_signature(&mut self) -> Result<MethodSignature> {
        let method = self.parse_method_signature()?;
        if method.call_conv != CallConv::Generic || !self.parser.has_more_data() {
            return Ok(MethodSignature::Method(method));
        }

        let spec = self.parse_method_spec_signature()?;
        Ok(MethodSignature::Generic(GenericMethodSig {
            method,
            args: spec.args,
        }))
    }

    /// Parse a field signature (leading `0x06`).
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a wrong leading byte.
    pub fn parse_field_signature(&mut self) -> Result<FieldSig> {
        self.expect_head(SIG_FIELD, "field")?;
        Ok(FieldSig {
            ty: self.parse_param()?,
        })
    }

    /// Parse a property signature (leading `0x08` or `0x28`).
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a wrong leading byte.
    pub fn parse_property_signature(&mut self) -> Result<PropertySig> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte & !SIG_HAS_THIS != SIG_PROPERTY {
            return Err(crate::Error::InvalidSignature(format!(
                "property signature starts with 0x{head_byte:02x}"
            )));
        }

        let param_count = self.parser.read_compressed_uint()?;
        let ty = self.parse_param()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        for _ in 0..param_count {
            params.push(self.parse_param()?);
        }

        Ok(PropertySig {
            has_this: head_byte & SIG_HAS_THIS != 0,
            ty,
            params,
        })
    }

    /// Parse a local variable signature (leading `0x07`).
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a wrong leading byte.
    pub fn parse_local_var_signature(&mut self) -> Result<LocalVarSig> {
        self.expect_head(SIG_LOCAL_VAR, "local variable")?;

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            locals.push(self.parse_param()?);
        }

        Ok(LocalVarSig { locals })
    }

    /// Parse a method instantiation (leading `0x0a`).
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a wrong leading byte.
    pub fn parse_method_spec_signature(&mut self) -> Result<MethodSpecSig> {
        self.expect_head(SIG_GENERIC_INST, "method instantiation")?;

        let count = self.parser.read_compressed_uint()?;
        let mut args = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            args.push(self.parse_type()?);
        }

        Ok(MethodSpecSig { args })
    }

    /// Parse a `TypeSpec` blob, which is a bare type.
    ///
    /// # Errors
    /// See [`SignatureParser::parse_type`].
    pub fn parse_type_spec_signature(&mut self) -> Result<TypeSig> {
        self.parse_type()
    }

    fn expect_head(&mut self, expected: u8, what: &str) -> Result<()> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != expected {
            return Err(crate::Error::InvalidSignature(format!(
                "{what} signature starts with 0x{head_byte:02x}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::token::Token, Error};

    const M: ModuleId = ModuleId(0);

    fn parse_type(data: &[u8]) -> Result<TypeSig> {
        SignatureParser::new(data, M).parse_type()
    }

    #[test]
    fn primitives() {
        assert_eq!(parse_type(&[0x08]).unwrap(), TypeSig::Primitive(ElementType::I4));
        assert_eq!(parse_type(&[0x1c]).unwrap(), TypeSig::Primitive(ElementType::Object));
        assert_eq!(
            parse_type(&[0x16]).unwrap(),
            TypeSig::Primitive(ElementType::TypedByRef)
        );
        assert!(matches!(parse_type(&[0x00]), Err(UnknownElementType(0x00))));
        assert!(matches!(parse_type(&[0xfd]), Err(UnknownElementType(0xfd))));
        assert!(matches!(parse_type(&[0xfe]), Err(UnknownElementType(0xfe))));
        assert!(matches!(parse_type(&[0x17]), Err(UnknownElementType(0x17))));
        assert!(matches!(parse_type(&[0x1b]), Err(UnknownElementType(0x1b))));
        assert!(matches!(parse_type(&[0xfc]), Err(UnknownElementType(0xfc))));
    }

    #[test]
    fn composites() {
        // class [TypeRef 1]
        assert_eq!(
            parse_type(&[0x12, 0x05]).unwrap(),
            TypeSig::class(M, Token(0x0100_0001))
        );

        // List<!0>[]
        let sig = parse_type(&[0x1d, 0x15, 0x12, 0x08, 0x01, 0x13, 0x00]).unwrap();
        assert_eq!(
            sig,
            TypeSig::SzArray(Box::new(TypeSig::GenericInst {
                base: Box::new(TypeSig::class(M, Token(0x0200_0002))),
                args: vec![TypeSig::Var(0)],
            }))
        );

        // int32[0...,0...] with one size and two lower bounds
        let sig = parse_type(&[0x14, 0x08, 0x02, 0x01, 0x03, 0x02, 0x00, 0x7F]).unwrap();
        let TypeSig::Array(shape) = sig else {
            panic!("expected array");
        };
        assert_eq!(shape.rank, 2);
        assert_eq!(shape.sizes, [3]);
        assert_eq!(shape.lo_bounds, [0, -1]);

        assert_eq!(
            parse_type(&[0x51, 0x10, 0x0f, 0x1e, 0x01]).unwrap(),
            TypeSig::Boxed(Box::new(TypeSig::ByRef(Box::new(TypeSig::Ptr(Box::new(
                TypeSig::MVar(1)
            ))))))
        );
    }

    #[test]
    fn recursion_guard() {
        let data = vec![0x1d; 100];
        assert!(matches!(parse_type(&data), Err(Error::RecursionLimit(64))));

        let mut parser = SignatureParser::new(&[0x0f, 0x0f, 0x0f, 0x08], M).with_max_depth(3);
        assert!(matches!(parser.parse_type(), Err(Error::RecursionLimit(3))));

        let mut parser = SignatureParser::new(&[0x0f, 0x0f, 0x08], M).with_max_depth(3);
        assert!(parser.parse_type().is_ok());
    }

    #[test]
    fn method() {
        // instance int64 (int32, modreq([TypeRef 2]) string&)
        #[rustfmt::skip]
        let data = [0x20, 0x02, 0x0a, 0x08, 0x1f, 0x09, 0x10, 0x0e];

        let sig = SignatureParser::new(&data, M).parse_method_signature().unwrap();
        assert!(sig.has_this);
        assert!(!sig.explicit_this);
        assert_eq!(sig.call_conv, CallConv::Default);
        assert_eq!(sig.ret.ty, TypeSig::Primitive(ElementType::I8));
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.params[1].custom_mods.len(), 1);
        assert!(sig.params[1].custom_mods[0].required);
        assert_eq!(sig.params[1].custom_mods[0].class.token, Token(0x0100_0002));
        assert_eq!(
            sig.params[1].ty,
            TypeSig::ByRef(Box::new(TypeSig::Primitive(ElementType::String)))
        );
    }

    #[test]
    fn generic_and_vararg_method() {
        // generic<1> !!0 (!!0)
        let sig = SignatureParser::new(&[0x10, 0x01, 0x01, 0x1e, 0x00, 0x1e, 0x00], M)
            .parse_method_signature()
            .unwrap();
        assert_eq!(sig.call_conv, CallConv::Generic);
        assert_eq!(sig.gen_param_count, 1);

        // vararg void (int32, ..., float64)
        let sig = SignatureParser::new(&[0x05, 0x02, 0x01, 0x08, 0x41, 0x0d], M)
            .parse_method_signature()
            .unwrap();
        assert_eq!(sig.call_conv, CallConv::VarArg);
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.sentinel, Some(1));
        assert_eq!(sig.params[1].ty, TypeSig::Primitive(ElementType::R8));
    }

    #[test]
    fn other_blobs() {
        let field = SignatureParser::new(&[0x06, 0x20, 0x05, 0x08], M)
            .parse_field_signature()
            .unwrap();
        assert!(!field.ty.custom_mods[0].required);
        assert_eq!(field.ty.ty, TypeSig::Primitive(ElementType::I4));

        let property = SignatureParser::new(&[0x28, 0x01, 0x0e, 0x08], M)
            .parse_property_signature()
            .unwrap();
        assert!(property.has_this);
        assert_eq!(property.params.len(), 1);

        let locals = SignatureParser::new(&[0x07, 0x02, 0x45, 0x10, 0x08, 0x16], M)
            .parse_local_var_signature()
            .unwrap();
        assert!(locals.locals[0].pinned);
        assert_eq!(
            locals.locals[1].ty,
            TypeSig::Primitive(ElementType::TypedByRef)
        );

        let spec = SignatureParser::new(&[0x0a, 0x02, 0x08, 0x0e], M)
            .parse_method_spec_signature()
            .unwrap();
        assert_eq!(spec.args.len(), 2);

        assert!(matches!(
            SignatureParser::new(&[0x07, 0x00], M).parse_field_signature(),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn instantiated_method() {
        let sig = SignatureParser::new(&[0x10, 0x01, 0x00, 0x01, 0x0a, 0x01, 0x08], M)
            .parse_instantiated_method_signature()
            .unwrap();
        assert_eq!(sig.generic_args().unwrap(), [TypeSig::Primitive(ElementType::I4)]);
        assert_eq!(sig.method().gen_param_count, 1);
    }
}
