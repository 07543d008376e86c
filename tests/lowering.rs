//! Lowering of method bodies built with the image builder.

mod common;

use cilfront::{
    assembly::opcodes::*,
    builder::il_body,
    lowering::{ConstValue, LoweredMethod, StackType, Tac, Var},
    metadata::{
        method::{ExceptionClause, ExceptionHandlerFlags, MethodBody},
        signatures::{MethodSig, TypeSig},
    },
    Error,
};

use common::{ctor_sig, int32, int64, lower, void, App, Il, CTOR, PUBLIC, SEALED, STATIC};

fn tacs_at(lowered: &LoweredMethod, offset: u32) -> Vec<&Tac> {
    lowered
        .code
        .iter()
        .filter(|instr| instr.offset == offset)
        .map(|instr| &instr.tac)
        .collect()
}

#[test]
fn every_reachable_instruction_emits_code_in_order() {
    let mut app = App::new("Arith");
    app.image
        .type_def("Demo", "Math", PUBLIC, Some(app.object))
        .unwrap();
    let increment = app
        .image
        .method(
            "Increment",
            STATIC,
            &MethodSig::new(int32(), vec![int32()]),
            Some(il_body(2, vec![LDARG_0, LDC_I4_1, ADD, RET])),
        )
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, increment).unwrap();

    assert_eq!(lowered.args, vec![int32()]);
    assert!(matches!(lowered.code[0].tac, Tac::Label(_)));
    assert_eq!(lowered.label_count(), 1);

    let mut offsets = Vec::new();
    for instr in &lowered.code {
        if !matches!(instr.tac, Tac::Label(_)) && offsets.last() != Some(&instr.offset) {
            offsets.push(instr.offset);
        }
    }
    assert_eq!(offsets, vec![0, 1, 2, 3]);

    assert!(tacs_at(&lowered, 1).iter().any(|tac| matches!(
        tac,
        Tac::Const {
            value: ConstValue::I32(1),
            ..
        }
    )));
    assert!(matches!(
        tacs_at(&lowered, 2)[..],
        [Tac::Binary {
            dest: Var::Stack(0),
            left: Var::Stack(0),
            right: Var::Stack(1),
            ty: StackType::Int32,
            ..
        }]
    ));
    assert!(matches!(
        tacs_at(&lowered, 3)[..],
        [Tac::Return {
            value: Some(Var::Stack(0))
        }]
    ));

    let text = lowered.to_string();
    assert!(text.starts_with(&format!("{}:", lowered.name)));
    assert!(text.contains("IL_0003"));
}

#[test]
fn reference_newobj_allocates_then_calls() {
    let mut app = App::new("Objects");
    let widget = app
        .image
        .type_def("Demo", "Widget", PUBLIC, Some(app.object))
        .unwrap();
    let ctor_code = Il::new()
        .op(LDARG_0)
        .op_token(CALL, app.object_ctor)
        .op(RET)
        .build();
    let ctor = app
        .image
        .method(".ctor", CTOR, &ctor_sig(vec![int32()]), Some(il_body(1, ctor_code)))
        .unwrap();

    let code = Il::new()
        .op_i8(LDC_I4_S, 42)
        .op_token(NEWOBJ, ctor)
        .op(POP)
        .op(RET)
        .build();
    let make = app
        .image
        .method("Make", STATIC, &MethodSig::new(void(), vec![]), Some(il_body(3, code)))
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, make).unwrap();

    let newobj = tacs_at(&lowered, 2);
    let alloc = newobj
        .iter()
        .position(|tac| matches!(tac, Tac::Alloc { .. }))
        .unwrap();
    let call = newobj
        .iter()
        .position(|tac| matches!(tac, Tac::Call { .. }))
        .unwrap();
    assert!(alloc < call);
    match newobj[call] {
        Tac::Call {
            dest, args, callee, ..
        } => {
            assert_eq!(*dest, None);
            assert_eq!(args.len(), 2);
            assert_eq!(callee.method.name, ".ctor");
            assert_eq!(
                callee.method.owner,
                TypeSig::class(module, widget),
            );
        }
        _ => unreachable!(),
    }

    // The constructor itself lowers too, calling into the core library
    let ctor = lower(&session, module, ctor).unwrap();
    assert_eq!(ctor.args.len(), 2);
    assert!(ctor.code.iter().any(|instr| matches!(
        &instr.tac,
        Tac::Call { callee, .. } if callee.method.name == ".ctor"
    )));
}

#[test]
fn value_type_newobj_initialises_a_temporary() {
    let mut app = App::new("Values");
    app.image
        .type_def("Demo", "Point", PUBLIC | SEALED, Some(app.value_type))
        .unwrap();
    app.image.field("x", 0x0001, int32()).unwrap();
    let ctor_code = Il::new().op(LDARG_0).op(LDARG_1).op(STIND_I4).op(RET).build();
    let ctor = app
        .image
        .method(".ctor", CTOR, &ctor_sig(vec![int32()]), Some(il_body(2, ctor_code)))
        .unwrap();

    let code = Il::new()
        .op(LDC_I4_1)
        .op_token(NEWOBJ, ctor)
        .op(POP)
        .op(RET)
        .build();
    let make = app
        .image
        .method("Make", STATIC, &MethodSig::new(void(), vec![]), Some(il_body(3, code)))
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, make).unwrap();

    let newobj = tacs_at(&lowered, 1);
    let kinds: Vec<&str> = newobj
        .iter()
        .filter_map(|tac| match tac {
            Tac::Zero { dest: Var::Temp(_), .. } => Some("zero"),
            Tac::AddressOf { source: Var::Temp(_), .. } => Some("address"),
            Tac::Call { .. } => Some("call"),
            Tac::LoadIndirect { .. } => Some("load"),
            Tac::Alloc { .. } => Some("alloc"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["zero", "address", "call", "load"]);
    assert_eq!(lowered.temps.len(), 1);

    // The receiver of a value type constructor is a managed reference
    let ctor = lower(&session, module, ctor).unwrap();
    assert!(matches!(ctor.args[0], TypeSig::ByRef(_)));
}

#[test]
fn catch_handler_starts_with_the_exception() {
    let mut app = App::new("Handlers");
    app.image
        .type_def("Demo", "Guarded", PUBLIC, Some(app.object))
        .unwrap();
    let code = vec![
        NOP, // 0
        LEAVE_S, 0x03, // 1 -> 6
        POP, // 3
        LEAVE_S, 0x00, // 4 -> 6
        RET, // 6
    ];
    let body = MethodBody {
        exception_clauses: vec![ExceptionClause {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 3,
            class_token_or_filter: app.exception.value(),
        }],
        is_fat: true,
        ..il_body(1, code)
    };
    let run = app
        .image
        .method("Run", STATIC, &MethodSig::new(void(), vec![]), Some(body))
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, run).unwrap();

    let handler = tacs_at(&lowered, 3);
    assert!(matches!(handler[0], Tac::Label(_)));
    assert!(matches!(
        handler[1],
        Tac::ExceptionIn {
            dest: Var::Stack(0),
            ..
        }
    ));
    assert!(matches!(handler[2], Tac::Pop { value: Var::Stack(0) }));

    // Both leaves target the label in front of the return
    let ret = tacs_at(&lowered, 6);
    let Tac::Label(target) = ret[0] else {
        panic!("return is not labelled: {ret:?}");
    };
    for offset in [1, 4] {
        assert!(matches!(
            tacs_at(&lowered, offset).last(),
            Some(Tac::Leave { target: t }) if t == target
        ));
    }
}

#[test]
fn disagreeing_stacks_at_a_join_are_rejected() {
    let mut app = App::new("Joins");
    app.image
        .type_def("Demo", "Broken", PUBLIC, Some(app.object))
        .unwrap();
    let code = Il::new()
        .op(LDARG_0) // 0x00
        .op_i8(BRTRUE_S, 3) // 0x01 -> 0x06
        .op(LDC_I4_1) // 0x03
        .op_i8(BR_S, 9) // 0x04 -> 0x0F
        .op_i64(LDC_I8, 1) // 0x06
        .op(RET) // 0x0F
        .build();
    let broken = app
        .image
        .method(
            "Pick",
            STATIC,
            &MethodSig::new(int64(), vec![int32()]),
            Some(il_body(1, code)),
        )
        .unwrap();

    let (session, module) = app.load();
    assert!(matches!(
        lower(&session, module, broken),
        Err(Error::StackMismatch(_))
    ));
}

#[test]
fn locals_are_declared_and_zeroed() {
    let mut app = App::new("Locals");
    app.image
        .type_def("Demo", "Counter", PUBLIC, Some(app.object))
        .unwrap();
    let locals = app.image.local_signature(&[int32(), int64()]).unwrap();
    let body = MethodBody {
        init_locals: true,
        local_var_sig_token: locals,
        is_fat: true,
        ..il_body(1, vec![LDLOC_1, RET])
    };
    let count = app
        .image
        .method("Count", STATIC, &MethodSig::new(int64(), vec![]), Some(body))
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, count).unwrap();
    assert_eq!(lowered.locals, vec![int32(), int64()]);

    let entry = tacs_at(&lowered, 0);
    let declared = entry
        .iter()
        .filter(|tac| matches!(tac, Tac::LocalIn { .. }))
        .count();
    let zeroed: Vec<&Var> = entry
        .iter()
        .filter_map(|tac| match tac {
            Tac::Zero { dest, .. } => Some(dest),
            _ => None,
        })
        .collect();
    assert_eq!(declared, 2);
    assert_eq!(zeroed, vec![&Var::Local(0), &Var::Local(1)]);
}

#[test]
fn isinst_is_a_non_throwing_cast() {
    let mut app = App::new("Casts");
    app.image
        .type_def("Demo", "Checker", PUBLIC, Some(app.object))
        .unwrap();
    let code = Il::new()
        .op(LDARG_0)
        .op_token(ISINST, app.exception)
        .op(RET)
        .build();
    let check = app
        .image
        .method(
            "AsException",
            STATIC,
            &MethodSig::new(common::object(), vec![common::object()]),
            Some(il_body(1, code)),
        )
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, check).unwrap();
    assert!(matches!(
        tacs_at(&lowered, 1)[..],
        [Tac::Cast { throws: false, .. }]
    ));
}

#[test]
fn lower_all_covers_every_body() {
    let mut app = App::new("Bulk");
    app.image
        .type_def("Demo", "Many", PUBLIC, Some(app.object))
        .unwrap();
    for index in 0..16 {
        let code = Il::new().op_i8(LDC_I4_S, index).op(RET).build();
        app.image
            .method(
                &format!("Value{index}"),
                STATIC,
                &MethodSig::new(int32(), vec![]),
                Some(il_body(1, code)),
            )
            .unwrap();
    }
    app.image
        .method("Abstract", 0x05C6, &MethodSig::new(void(), vec![]).with_this(), None)
        .unwrap();

    let (session, module) = app.load();
    let lowered = session.lower_all(module).unwrap();
    assert_eq!(lowered.len(), 16);
    assert!(lowered.iter().all(Result::is_ok));

    let names: Vec<String> = lowered
        .into_iter()
        .map(|method| method.unwrap().method.name)
        .collect();
    assert!(names.contains(&"Value15".to_string()));
}

#[test]
fn loop_back_to_entry_skips_the_setup() {
    let mut app = App::new("Loops");
    app.image
        .type_def("Demo", "Spinner", PUBLIC, Some(app.object))
        .unwrap();
    let locals = app.image.local_signature(&[int32()]).unwrap();
    let body = MethodBody {
        init_locals: true,
        local_var_sig_token: locals,
        is_fat: true,
        // ldloc.0; ldc.i4.1; add; stloc.0; br.s -> 0
        ..il_body(2, vec![LDLOC_0, LDC_I4_1, ADD, STLOC_0, BR_S, 0xFA])
    };
    let spin = app
        .image
        .method("Spin", STATIC, &MethodSig::new(void(), vec![int32()]), Some(body))
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, spin).unwrap();

    let Some(Tac::Branch { target }) = tacs_at(&lowered, 4).last().copied() else {
        panic!("loop does not end in a branch");
    };
    let entry = tacs_at(&lowered, 0);
    let position = |wanted: fn(&Tac) -> bool| entry.iter().position(|tac| wanted(tac)).unwrap();

    let loop_head = entry
        .iter()
        .position(|tac| matches!(tac, Tac::Label(label) if label == target))
        .unwrap();
    assert!(matches!(entry[0], Tac::Label(label) if label != target));
    assert!(position(|tac| matches!(tac, Tac::ArgIn { .. })) < loop_head);
    assert!(position(|tac| matches!(tac, Tac::LocalIn { .. })) < loop_head);
    assert!(position(|tac| matches!(tac, Tac::Zero { .. })) < loop_head);
    assert!(matches!(
        entry[loop_head + 1],
        Tac::Move {
            src: Var::Local(0),
            ..
        }
    ));
    assert_eq!(lowered.label_count(), 2);
}

#[test]
fn loop_back_to_a_handler_keeps_the_exception_load_first() {
    let mut app = App::new("Retry");
    app.image
        .type_def("Demo", "Retrier", PUBLIC, Some(app.object))
        .unwrap();
    let code = vec![
        NOP, // 0
        LEAVE_S, 0x04, // 1 -> 7
        POP,    // 3
        LDNULL, // 4
        BR_S, 0xFC, // 5 -> 3
        RET, // 7
    ];
    let body = MethodBody {
        exception_clauses: vec![ExceptionClause {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 4,
            class_token_or_filter: app.exception.value(),
        }],
        is_fat: true,
        ..il_body(1, code)
    };
    let run = app
        .image
        .method("Run", STATIC, &MethodSig::new(void(), vec![]), Some(body))
        .unwrap();

    let (session, module) = app.load();
    let lowered = lower(&session, module, run).unwrap();

    let Some(Tac::Branch { target }) = tacs_at(&lowered, 5).last().copied() else {
        panic!("handler does not end in a branch");
    };
    let handler = tacs_at(&lowered, 3);
    assert!(matches!(handler[0], Tac::Label(label) if label != target));
    assert!(matches!(handler[1], Tac::ExceptionIn { .. }));
    assert!(matches!(handler[2], Tac::Label(label) if label == target));
    assert!(matches!(handler[3], Tac::Pop { .. }));
}
