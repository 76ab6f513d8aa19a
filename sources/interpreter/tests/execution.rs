mod common;

use common::{make_vm, run, static_flags};
use dex::build::ContainerBuilder;
use dex::MethodFlags;
use interpreter::error::{EmuError, ErrorKind};
use interpreter::object::Value;

#[test]
fn integer_return() {
    let mut b = ContainerBuilder::new();
    // add-int v0, p0, p1; return v0
    b.method(
        "LT;",
        "add",
        &["I", "I"],
        "I",
        static_flags(),
        3,
        2,
        vec![0x0090, 0x0201, 0x000f],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->add(II)I", vec![Value::Int(2), Value::Int(3)])
        .unwrap()
        .unwrap();

    assert_eq!(result.int().unwrap(), 5);
}

#[test]
fn const_string_round_trip() {
    let mut b = ContainerBuilder::new();
    let hello = b.string("hello");
    // const-string v0, "hello"; return-object v0
    b.method(
        "LT;",
        "s",
        &[],
        "Ljava/lang/String;",
        static_flags(),
        1,
        0,
        vec![0x001a, hello as u16, 0x0011],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->s()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();

    assert_eq!(result.host_string().unwrap(), "hello");
}

fn packed_switch_container() -> ContainerBuilder {
    let mut b = ContainerBuilder::new();
    // packed-switch p0, {0 -> 10, 1 -> 20, 2 -> 30, default -> 99}
    b.method(
        "LT;",
        "sel",
        &["I"],
        "I",
        static_flags(),
        2,
        1,
        vec![
            // pc 0: packed-switch v1, +16
            0x012b, 0x0010, 0x0000,
            // pc 3: const/16 v0, 99; return v0 (default)
            0x0013, 0x0063, 0x000f,
            // pc 6: const/16 v0, 10; return v0
            0x0013, 0x000a, 0x000f,
            // pc 9: const/16 v0, 20; return v0
            0x0013, 0x0014, 0x000f,
            // pc 12: const/16 v0, 30; return v0
            0x0013, 0x001e, 0x000f,
            // pc 15: pad so the payload sits at an even pc
            0x0000,
            // pc 16: payload, first_key 0, targets +6 +9 +12
            0x0100, 0x0003, 0x0000, 0x0000, 0x0006, 0x0000, 0x0009, 0x0000, 0x000c, 0x0000,
        ],
    );
    b
}

#[test]
fn packed_switch_hits_and_default() {
    let mut vm = make_vm(packed_switch_container());

    for (key, expected) in [(0, 10), (1, 20), (2, 30), (5, 99), (-1, 99)] {
        let result = run(&mut vm, "LT;->sel(I)I", vec![Value::Int(key)])
            .unwrap()
            .unwrap();
        assert_eq!(result.int().unwrap(), expected, "key {key}");
    }
}

#[test]
fn filled_array_sum() {
    let mut b = ContainerBuilder::new();
    let int_array = b.type_id("[I");

    let mut units = vec![
        // const/4 v1..v5 = 1..5
        0x1112, 0x2212, 0x3312, 0x4412, 0x5512,
        // filled-new-array {v1, v2, v3, v4, v5}, [I
        0x5524, int_array, 0x4321,
        // move-result-object v0
        0x000c,
        // const/4 v1, #0 (accumulator)
        0x0112,
    ];
    for i in 0..5u16 {
        // const/4 v2, #i; aget v3, v0, v2; add-int/2addr v1, v3
        units.push(0x0012 | ((i << 4 | 0x2) << 8));
        units.push(0x0344);
        units.push(0x0200);
        units.push(0x31b0);
    }
    // return v1
    units.push(0x010f);

    b.method("LT;", "sumFive", &[], "I", static_flags(), 6, 0, units);

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->sumFive()I", vec![]).unwrap().unwrap();

    assert_eq!(result.int().unwrap(), 15);
}

#[test]
fn static_init_consumed() {
    let mut b = ContainerBuilder::new();
    let key = b.field("LT;", "sKey", "I");

    // <clinit>: const/16 v0, 7; sput v0, LT;->sKey:I; return-void
    b.method(
        "LT;",
        "<clinit>",
        &[],
        "V",
        MethodFlags::STATIC | MethodFlags::CONSTRUCTOR,
        1,
        0,
        vec![0x0013, 0x0007, 0x0067, key, 0x000e],
    );
    // k: sget v0, LT;->sKey:I; return v0
    b.method(
        "LT;",
        "k",
        &[],
        "I",
        static_flags(),
        1,
        0,
        vec![0x0060, key, 0x000f],
    );

    let mut vm = make_vm(b);
    vm.reset();
    let result = run(&mut vm, "LT;->k()I", vec![]).unwrap().unwrap();

    assert_eq!(result.int().unwrap(), 7);
}

#[test]
fn base64_mock_decodes() {
    let mut b = ContainerBuilder::new();
    let decode = b.method_ref(
        "Landroid/util/Base64;",
        "decode",
        &["Ljava/lang/String;", "I"],
        "[B",
    );
    // const/4 v0, #0; invoke-static {v2, v0}, Base64.decode; move-result-object v1;
    // return-object v1
    b.method(
        "LT;",
        "dec",
        &["Ljava/lang/String;"],
        "[B",
        static_flags(),
        3,
        1,
        vec![0x0012, 0x2071, decode, 0x0002, 0x010c, 0x0111],
    );

    let mut vm = make_vm(b);
    let result = run(
        &mut vm,
        "LT;->dec(Ljava/lang/String;)[B",
        vec![Value::string("aGk=")],
    )
    .unwrap()
    .unwrap();

    let array = result.as_array().unwrap().read();
    assert_eq!(array.to_bytes().unwrap(), vec![0x68, 0x69]);
}

#[test]
fn wide_arguments_and_long_arithmetic() {
    let mut b = ContainerBuilder::new();
    // add-long v0, v0, v2; return-wide v0  (p0 = v0/v1, p1 = v2/v3)
    b.method(
        "LT;",
        "ladd",
        &["J", "J"],
        "J",
        static_flags(),
        4,
        4,
        vec![0x009b, 0x0200, 0x0010],
    );

    let mut vm = make_vm(b);
    let result = run(
        &mut vm,
        "LT;->ladd(JJ)J",
        vec![Value::Long(1 << 32), Value::Long(10)],
    )
    .unwrap()
    .unwrap();

    assert_eq!(result.long().unwrap(), (1i64 << 32) + 10);
}

#[test]
fn branching_loop_accumulates() {
    let mut b = ContainerBuilder::new();
    // acc = 0; for (i = 0; i < p0; i++) acc += i; return acc
    b.method(
        "LT;",
        "sum",
        &["I"],
        "I",
        static_flags(),
        3,
        1,
        vec![
            // const/4 v0, #0; const/4 v1, #0
            0x0012, 0x0112,
            // pc 2: if-ge v1, v2, +6
            0x2135, 0x0006,
            // pc 4: add-int/2addr v0, v1
            0x10b0,
            // pc 5: add-int/lit8 v1, v1, #1
            0x01d8, 0x0101,
            // pc 7: goto -5
            0xfb28,
            // pc 8: return v0
            0x000f,
        ],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->sum(I)I", vec![Value::Int(5)])
        .unwrap()
        .unwrap();

    assert_eq!(result.int().unwrap(), 10);
}

#[test]
fn string_builder_round_trip() {
    let mut b = ContainerBuilder::new();
    let sb = b.type_id("Ljava/lang/StringBuilder;");
    let init = b.method_ref("Ljava/lang/StringBuilder;", "<init>", &[], "V");
    let append = b.method_ref(
        "Ljava/lang/StringBuilder;",
        "append",
        &["Ljava/lang/String;"],
        "Ljava/lang/StringBuilder;",
    );
    let to_string = b.method_ref(
        "Ljava/lang/StringBuilder;",
        "toString",
        &[],
        "Ljava/lang/String;",
    );
    let ab = b.string("ab");
    let cd = b.string("cd");

    b.method(
        "LT;",
        "sb",
        &[],
        "Ljava/lang/String;",
        static_flags(),
        2,
        0,
        vec![
            // new-instance v0, StringBuilder; invoke-direct {v0}, <init>
            0x0022, sb, 0x1070, init, 0x0000,
            // const-string v1, "ab"; invoke-virtual {v0, v1}, append
            0x011a, ab as u16, 0x206e, append, 0x0010,
            // move-result-object v0
            0x000c,
            // const-string v1, "cd"; invoke-virtual {v0, v1}, append
            0x011a, cd as u16, 0x206e, append, 0x0010,
            0x000c,
            // invoke-virtual {v0}, toString; move-result-object v0; return-object v0
            0x106e, to_string, 0x0000, 0x000c, 0x0011,
        ],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->sb()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();

    assert_eq!(result.host_string().unwrap(), "abcd");
}

#[test]
fn int_to_char_produces_a_tagged_char() {
    let mut b = ContainerBuilder::new();
    // int-to-char v0, p0; return v0
    b.method(
        "LT;",
        "c",
        &["I"],
        "C",
        static_flags(),
        2,
        1,
        vec![0x108e, 0x000f],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->c(I)C", vec![Value::Int(0x41)])
        .unwrap()
        .unwrap();

    assert!(matches!(result, Value::Char(0x41)));
}

#[test]
fn xor_decoded_chars_append_as_text() {
    let mut b = ContainerBuilder::new();
    let sb = b.type_id("Ljava/lang/StringBuilder;");
    let init = b.method_ref("Ljava/lang/StringBuilder;", "<init>", &[], "V");
    let append = b.method_ref(
        "Ljava/lang/StringBuilder;",
        "append",
        &["C"],
        "Ljava/lang/StringBuilder;",
    );
    let to_string = b.method_ref(
        "Ljava/lang/StringBuilder;",
        "toString",
        &[],
        "Ljava/lang/String;",
    );

    // The classic decryption loop body, unrolled for two characters:
    // (char)(encoded ^ key) appended one by one ('h' and 'i' under key 0x21)
    b.method(
        "LT;",
        "xs",
        &[],
        "Ljava/lang/String;",
        static_flags(),
        3,
        0,
        vec![
            // new-instance v0, StringBuilder; invoke-direct {v0}, <init>
            0x0022, sb, 0x1070, init, 0x0000,
            // const/16 v1, 0x49; const/16 v2, 0x21; xor-int/2addr v1, v2;
            // int-to-char v1, v1; invoke-virtual {v0, v1}, append(C)
            0x0113, 0x0049, 0x0213, 0x0021, 0x21b7, 0x118e, 0x206e, append, 0x0010,
            0x000c,
            // const/16 v1, 0x48; same dance
            0x0113, 0x0048, 0x0213, 0x0021, 0x21b7, 0x118e, 0x206e, append, 0x0010,
            0x000c,
            // invoke-virtual {v0}, toString; move-result-object v0; return-object v0
            0x106e, to_string, 0x0000, 0x000c, 0x0011,
        ],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->xs()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();

    assert_eq!(result.host_string().unwrap(), "hi");
}

#[test]
fn instance_fields_through_bare_constructor() {
    let mut b = ContainerBuilder::new();
    let holder = b.type_id("LHolder;");
    let init = b.method_ref("LHolder;", "<init>", &[], "V");
    let field = b.field("LHolder;", "x", "I");

    // new-instance v0, LHolder;; invoke-direct {v0}, <init> (no-op);
    // const/16 v1, 41; iput v1, v0, LHolder;->x:I;
    // iget v1, v0, x; add-int/lit8 v1, v1, #1; return v1
    b.method(
        "LT;",
        "mk",
        &[],
        "I",
        static_flags(),
        2,
        0,
        vec![
            0x0022, holder, 0x1070, init, 0x0000,
            0x0113, 0x0029,
            0x0159, field,
            0x0152, field,
            0x01d8, 0x0101,
            0x010f,
        ],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->mk()I", vec![]).unwrap().unwrap();

    assert_eq!(result.int().unwrap(), 42);
}

#[test]
fn unmocked_call_yields_null_and_continues() {
    let mut b = ContainerBuilder::new();
    let missing = b.method_ref("Lcom/missing/Api;", "fetch", &[], "Ljava/lang/String;");

    // invoke-static {}, missing; move-result-object v0; return-object v0
    b.method(
        "LT;",
        "gap",
        &[],
        "Ljava/lang/String;",
        static_flags(),
        1,
        0,
        vec![0x0071, missing, 0x0000, 0x000c, 0x0011],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->gap()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();

    assert!(result.is_null());
}

#[test]
fn division_by_zero_is_fatal_with_context() {
    let mut b = ContainerBuilder::new();
    // div-int v0, v1, v2; return v0
    b.method(
        "LT;",
        "div",
        &["I", "I"],
        "I",
        static_flags(),
        3,
        2,
        vec![0x0093, 0x0201, 0x000f],
    );

    let mut vm = make_vm(b);
    let err = run(&mut vm, "LT;->div(II)I", vec![Value::Int(1), Value::Int(0)]).unwrap_err();

    let emu = err.downcast_ref::<EmuError>().expect("typed error");
    assert_eq!(emu.kind, ErrorKind::Runtime);
    assert_eq!(emu.pc, 0);
    assert_eq!(emu.method, "LT;->div(II)I");
    assert!(emu.disassembly.contains("div-int"));
}

#[test]
fn falling_off_the_end_is_fatal() {
    let mut b = ContainerBuilder::new();
    // const/4 v0, #0 and nothing else
    b.method("LT;", "fall", &[], "V", static_flags(), 1, 0, vec![0x0012]);

    let mut vm = make_vm(b);
    let err = run(&mut vm, "LT;->fall()V", vec![]).unwrap_err();

    let emu = err.downcast_ref::<EmuError>().expect("typed error");
    assert_eq!(emu.kind, ErrorKind::Decode);
}

#[test]
fn throw_traps_the_frame_but_not_the_caller() {
    let mut b = ContainerBuilder::new();
    let exc = b.type_id("Ljava/lang/RuntimeException;");
    let init = b.method_ref("Ljava/lang/RuntimeException;", "<init>", &[], "V");

    // Callee: new-instance v0, RuntimeException; <init>; throw v0
    b.method(
        "LT;",
        "boom",
        &[],
        "Ljava/lang/String;",
        static_flags(),
        1,
        0,
        vec![0x0022, exc, 0x1070, init, 0x0000, 0x0027],
    );
    let boom = b.method_ref("LT;", "boom", &[], "Ljava/lang/String;");

    // Caller observes null and keeps going
    b.method(
        "LT;",
        "trap",
        &[],
        "Ljava/lang/String;",
        static_flags(),
        1,
        0,
        vec![0x0071, boom, 0x0000, 0x000c, 0x0011],
    );

    let mut vm = make_vm(b);

    // Direct execution is fatal
    assert!(run(&mut vm, "LT;->boom()Ljava/lang/String;", vec![]).is_err());

    // Through a call site it degrades to null
    let result = run(&mut vm, "LT;->trap()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert!(result.is_null());
}

#[test]
fn sdk_int_override_is_visible_to_sget() {
    let mut b = ContainerBuilder::new();
    let field = b.field("Landroid/os/Build$VERSION;", "SDK_INT", "I");
    // sget v0, Build$VERSION.SDK_INT; return v0
    b.method(
        "LT;",
        "sdk",
        &[],
        "I",
        static_flags(),
        1,
        0,
        vec![0x0060, field, 0x000f],
    );

    let mut vm = make_vm(b);
    let result = run(&mut vm, "LT;->sdk()I", vec![]).unwrap().unwrap();

    assert_eq!(result.int().unwrap(), vm.config.sdk_int);
}
