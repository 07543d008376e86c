#![allow(dead_code)]

use cilfront::{
    assembly::opcodes,
    builder::{il_body, ImageBuilder},
    metadata::{
        signatures::{ElementType, MethodSig, TypeSig},
        token::Token,
        typesystem::{MethodDefId, ModuleId},
    },
    lowering::LoweredMethod,
    CompileOptions, Result, Session,
};

pub const PUBLIC: u32 = 0x0000_0001;
pub const ABSTRACT: u32 = 0x0000_0080;
pub const SEALED: u32 = 0x0000_0100;

/// public hidebysig specialname rtspecialname
pub const CTOR: u16 = 0x1886;
/// public static hidebysig
pub const STATIC: u16 = 0x0096;
/// public hidebysig
pub const INSTANCE: u16 = 0x0086;
/// public virtual hidebysig newslot
pub const VIRTUAL: u16 = 0x01C6;

pub fn void() -> TypeSig {
    TypeSig::Primitive(ElementType::Void)
}

pub fn int32() -> TypeSig {
    TypeSig::Primitive(ElementType::I4)
}

pub fn int64() -> TypeSig {
    TypeSig::Primitive(ElementType::I8)
}

pub fn object() -> TypeSig {
    TypeSig::Primitive(ElementType::Object)
}

pub fn ctor_sig(params: Vec<TypeSig>) -> MethodSig {
    MethodSig::new(void(), params).with_this()
}

/// A core library with the types the session and the encoder look up by name.
pub fn corlib() -> Vec<u8> {
    let mut image = ImageBuilder::new("mscorlib");

    let object = image.type_def("System", "Object", PUBLIC, None).unwrap();
    let object_ctor = image
        .method(".ctor", CTOR, &ctor_sig(vec![]), Some(il_body(0, vec![opcodes::RET])))
        .unwrap();
    image
        .method(
            "ToString",
            VIRTUAL,
            &MethodSig::new(TypeSig::Primitive(ElementType::String), vec![]).with_this(),
            Some(il_body(1, vec![opcodes::LDNULL, opcodes::RET])),
        )
        .unwrap();

    let value_type = image
        .type_def("System", "ValueType", PUBLIC | ABSTRACT, Some(object))
        .unwrap();
    image
        .type_def("System", "Enum", PUBLIC | ABSTRACT, Some(value_type))
        .unwrap();

    image.type_def("System", "Exception", PUBLIC, Some(object)).unwrap();
    let mut code = vec![opcodes::LDARG_0, opcodes::CALL];
    code.extend_from_slice(&object_ctor.value().to_le_bytes());
    code.push(opcodes::RET);
    image
        .method(".ctor", CTOR, &ctor_sig(vec![]), Some(il_body(1, code)))
        .unwrap();

    image.type_def("System", "String", PUBLIC | SEALED, Some(object)).unwrap();
    image.type_def("System", "Array", PUBLIC | ABSTRACT, Some(object)).unwrap();
    let delegate = image
        .type_def("System", "Delegate", PUBLIC | ABSTRACT, Some(object))
        .unwrap();
    image
        .type_def("System", "MulticastDelegate", PUBLIC | ABSTRACT, Some(delegate))
        .unwrap();

    image
        .type_def("System", "Int32", PUBLIC | SEALED, Some(value_type))
        .unwrap();
    image.field("m_value", 0x0001, int32()).unwrap();

    for handle in ["RuntimeTypeHandle", "RuntimeMethodHandle", "RuntimeFieldHandle"] {
        image
            .type_def("System", handle, PUBLIC | SEALED, Some(value_type))
            .unwrap();
        image
            .field("m_value", 0x0001, TypeSig::Primitive(ElementType::I))
            .unwrap();
    }

    let nullable = image
        .type_def("System", "Nullable`1", PUBLIC | SEALED, Some(value_type))
        .unwrap();
    image.generic_param(nullable, 0, "T").unwrap();

    image.build().unwrap()
}

/// References into the core library every application image starts with.
pub struct App {
    pub image: ImageBuilder,
    pub mscorlib: Token,
    pub object: Token,
    pub value_type: Token,
    pub exception: Token,
    pub object_ctor: Token,
}

impl App {
    pub fn new(name: &str) -> App {
        let mut image = ImageBuilder::new(name);
        let mscorlib = image.assembly_ref("mscorlib");
        let object = image.type_ref(mscorlib, "System", "Object").unwrap();
        let value_type = image.type_ref(mscorlib, "System", "ValueType").unwrap();
        let exception = image.type_ref(mscorlib, "System", "Exception").unwrap();
        let object_ctor = image.method_ref(object, ".ctor", &ctor_sig(vec![])).unwrap();

        App {
            image,
            mscorlib,
            object,
            value_type,
            exception,
            object_ctor,
        }
    }

    /// A session with the core library and this image loaded
    pub fn load(&self) -> (Session, ModuleId) {
        let session = Session::new(CompileOptions::default());
        session.load_bytes(corlib()).unwrap();
        let module = session.load_bytes(self.image.build().unwrap()).unwrap();
        (session, module)
    }
}

/// CIL code buffer.
#[derive(Default)]
pub struct Il {
    code: Vec<u8>,
}

impl Il {
    pub fn new() -> Il {
        Il::default()
    }

    pub fn op(mut self, opcode: u8) -> Il {
        self.code.push(opcode);
        self
    }

    pub fn op_i8(mut self, opcode: u8, operand: i8) -> Il {
        self.code.push(opcode);
        self.code.push(operand as u8);
        self
    }

    pub fn op_i32(mut self, opcode: u8, operand: i32) -> Il {
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_le_bytes());
        self
    }

    pub fn op_i64(mut self, opcode: u8, operand: i64) -> Il {
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_le_bytes());
        self
    }

    pub fn op_token(mut self, opcode: u8, token: Token) -> Il {
        self.code.push(opcode);
        self.code.extend_from_slice(&token.value().to_le_bytes());
        self
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn build(self) -> Vec<u8> {
        self.code
    }
}

pub fn lower(session: &Session, module: ModuleId, method: Token) -> Result<LoweredMethod> {
    let request = session.method_to_compile(MethodDefId::new(module, method.row()))?;
    session.lower_method(&request)
}
