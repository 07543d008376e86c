//! Binary reader and metadata table properties, on images produced by the builder.

mod common;

use cilfront::{
    file::{
        parser::{compressed_uint_size, write_compressed_uint, Parser},
        File,
    },
    metadata::{module::Module, typesystem::ModuleId},
    CompileOptions, Error,
};

use common::{corlib, App, Il, CTOR, STATIC};

#[test]
fn compressed_integers_round_trip() {
    let boundaries = [
        (0x00, 1),
        (0x7F, 1),
        (0x80, 2),
        (0x3FFF, 2),
        (0x4000, 4),
        (0x1FFF_FFFF, 4),
    ];
    for (value, width) in boundaries {
        let mut out = Vec::new();
        write_compressed_uint(value, &mut out).unwrap();
        assert_eq!(out.len(), width, "width of {value:#x}");
        assert_eq!(compressed_uint_size(value).unwrap(), width);
        assert_eq!(Parser::new(&out).read_compressed_uint().unwrap(), value);
    }

    // A stride through the whole range, prime so that every width and many bit patterns show up
    let mut buffer = Vec::new();
    let mut value = 0u32;
    while value <= 0x1FFF_FFFF {
        buffer.clear();
        write_compressed_uint(value, &mut buffer).unwrap();
        let expected = match value {
            0..=0x7F => 1,
            0x80..=0x3FFF => 2,
            _ => 4,
        };
        assert_eq!(buffer.len(), expected);

        let mut parser = Parser::new(&buffer);
        assert_eq!(parser.read_compressed_uint().unwrap(), value);
        assert!(!parser.has_more_data());

        value += if value < 0x4000 { 1 } else { 7919 };
    }

    let mut out = Vec::new();
    assert!(write_compressed_uint(0x2000_0000, &mut out).is_err());
}

#[test]
fn type_ranges_partition_fields_and_methods() {
    let file = File::from_mem(corlib()).unwrap();
    let module = Module::load(ModuleId(0), &file, &CompileOptions::default()).unwrap();
    let types = module.types();
    assert!(types.len() > 10);

    for pair in types.windows(2) {
        assert_eq!(pair[0].fields.end, pair[1].fields.start);
        assert_eq!(pair[0].methods.end, pair[1].methods.start);
    }
    let last = types.last().unwrap();
    assert_eq!(last.fields.end, module.fields().len() as u32 + 1);
    assert_eq!(last.methods.end, module.methods().len() as u32 + 1);

    for ty in types {
        for field in module.fields_of(ty) {
            assert!(ty.fields.contains(&field.row));
            assert_eq!(field.owner, ty.row);
        }
        for method in module.methods_of(ty) {
            assert!(ty.methods.contains(&method.row));
            assert_eq!(method.owner, ty.row);
        }
    }
    for field in module.fields() {
        let owner = module.type_def(field.owner).unwrap();
        assert!(owner.fields.contains(&field.row));
    }

    let exception = module.type_def(module.find_type("System", "Exception").unwrap()).unwrap();
    let ctor = module.methods_of(exception).next().unwrap();
    assert_eq!(ctor.name, ".ctor");
    assert!(ctor.signature.has_this);
}

#[test]
fn entry_point_and_literals() {
    let mut app = App::new("Hello");
    app.image
        .type_def("Demo", "Program", common::PUBLIC, Some(app.object))
        .unwrap();
    let hello = app.image.user_string("Hello, world").unwrap();
    let code = Il::new()
        .op_token(cilfront::assembly::opcodes::LDSTR, hello)
        .op(cilfront::assembly::opcodes::POP)
        .op(cilfront::assembly::opcodes::RET)
        .build();
    let main = app
        .image
        .method(
            "Main",
            STATIC,
            &cilfront::metadata::signatures::MethodSig::new(common::void(), vec![]),
            Some(cilfront::builder::il_body(1, code)),
        )
        .unwrap();
    app.image.entry_point(main);

    let (session, module) = app.load();
    let loaded = session.module(module).unwrap();
    assert_eq!(loaded.name(), "Hello");
    assert_eq!(loaded.entry_point(), Some(main));
    assert_eq!(
        loaded.user_string(hello).unwrap().to_string_lossy(),
        "Hello, world"
    );

    let entry = session.entry_point(module).unwrap().unwrap();
    assert_eq!(entry.name, "Main");
    assert!(session.module_by_name("mscorlib").is_ok());
    assert!(matches!(
        session.module_by_name("System.Core"),
        Err(Error::AssemblyNotFound(_))
    ));
}

#[test]
fn unknown_stream_is_fatal() {
    let mut image = corlib();
    let position = image
        .windows(6)
        .position(|window| window == b"#GUID\0")
        .unwrap();
    image[position + 4] = b'X';

    let file = File::from_mem(image).unwrap();
    assert!(matches!(
        Module::load(ModuleId(0), &file, &CompileOptions::default()),
        Err(Error::UnknownStream(name)) if name == "#GUIX"
    ));
}

#[test]
fn duplicate_module_names_are_rejected() {
    let session = cilfront::Session::new(CompileOptions::default());
    session.load_bytes(corlib()).unwrap();
    assert!(session.load_bytes(corlib()).is_err());
    assert_eq!(session.module_count(), 1);
}

#[test]
fn cross_module_type_references() {
    let mut app = App::new("Refs");
    let widget = app
        .image
        .type_def("Demo", "Widget", common::PUBLIC, Some(app.object))
        .unwrap();
    app.image
        .method(".ctor", CTOR, &common::ctor_sig(vec![]), None)
        .unwrap();

    let (session, module) = app.load();
    let object = session.resolve_type_ref(module, app.object.row()).unwrap();
    assert_eq!(session.type_def(object).unwrap().name, "Object");

    let widget = cilfront::metadata::typesystem::TypeDefId::new(module, widget.row());
    assert_eq!(session.base_type(widget).unwrap(), Some(object));
    assert!(!session.is_value_type(widget).unwrap());
    assert!(session.derives_from(widget, object).unwrap());
}
