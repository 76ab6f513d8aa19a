use std::rc::Rc;

use analysis::{analyze_method, recover_call_args, trace_register, ArgSource};
use dex::build::ContainerBuilder;
use dex::{DexIndex, MethodFlags};
use interpreter::object::statics::StaticFieldRef;
use interpreter::object::Value;
use interpreter::Vm;
use lazy_static::lazy_static;

lazy_static! {
    static ref TRACING: () = {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    };
}

fn make_vm(builder: ContainerBuilder) -> Vm {
    lazy_static::initialize(&TRACING);
    Vm::new(Rc::new(DexIndex::new(vec![builder.finish()])))
}

fn flags() -> MethodFlags {
    MethodFlags::PUBLIC | MethodFlags::STATIC
}

#[test]
fn const_before_invoke_resolves() {
    let mut b = ContainerBuilder::new();
    let target = b.method_ref("LT;", "use", &["I"], "V");
    // const/16 v0, 1234; invoke-static {v0}, use(I)V; return-void
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        1,
        0,
        vec![0x0013, 0x04d2, 0x1071, target, 0x0000, 0x000e],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 2).unwrap();
    assert_eq!(args.len(), 1);
    assert!(args[0].resolved);
    assert_eq!(args[0].source, ArgSource::Const);
    assert_eq!(args[0].value.as_ref().unwrap().int().unwrap(), 1234);
}

#[test]
fn moves_chain_to_their_producer() {
    let mut b = ContainerBuilder::new();
    let target = b.method_ref("LT;", "use", &["I"], "V");
    // const/4 v1, #7; move v0, v1; invoke-static {v0}, use(I)V; return-void
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        2,
        0,
        vec![0x7112, 0x1001, 0x1071, target, 0x0000, 0x000e],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 2).unwrap();
    assert!(args[0].resolved);
    assert_eq!(args[0].source, ArgSource::MoveChain);
    assert_eq!(args[0].value.as_ref().unwrap().int().unwrap(), 7);
}

#[test]
fn untouched_parameters_report_their_index() {
    let mut b = ContainerBuilder::new();
    let target = b.method_ref("LT;", "use", &["I"], "V");
    // invoke-static {v1}, use(I)V; return-void   (v1 = p1)
    b.method(
        "LT;",
        "caller",
        &["I", "I"],
        "V",
        flags(),
        2,
        2,
        vec![0x1071, target, 0x0001, 0x000e],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller(II)V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 0).unwrap();
    assert!(!args[0].resolved);
    assert_eq!(args[0].source, ArgSource::Parameter);
    assert_eq!(args[0].detail, "parameter 1");
}

#[test]
fn const_strings_resolve_to_boxed_strings() {
    let mut b = ContainerBuilder::new();
    let secret = b.string("secret");
    let target = b.method_ref("LT;", "use", &["Ljava/lang/String;"], "V");
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        1,
        0,
        vec![0x001a, secret as u16, 0x1071, target, 0x0000, 0x000e],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 2).unwrap();
    assert!(args[0].resolved);
    assert_eq!(args[0].source, ArgSource::ConstString);
    assert_eq!(args[0].value.as_ref().unwrap().host_string().unwrap(), "secret");
}

#[test]
fn static_fields_resolve_only_when_the_store_has_them() {
    let mut b = ContainerBuilder::new();
    let field = b.field("LT;", "sKey", "I");
    let target = b.method_ref("LT;", "use", &["I"], "V");
    // sget v0, LT;->sKey:I; invoke-static {v0}, use(I)V; return-void
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        1,
        0,
        vec![0x0060, field, 0x1071, target, 0x0000, 0x000e],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let before = trace_register(&mut vm, &caller, 2, 0, 0).unwrap();
    assert!(!before.resolved);
    assert_eq!(before.source, ArgSource::StaticField);

    vm.statics
        .set_field(StaticFieldRef::new("LT;", "sKey"), Value::Int(99));
    let after = trace_register(&mut vm, &caller, 2, 0, 0).unwrap();
    assert!(after.resolved);
    assert_eq!(after.value.unwrap().int().unwrap(), 99);
}

#[test]
fn invoke_results_fold_through_pure_callees() {
    let mut b = ContainerBuilder::new();
    // id(I)I: return p0
    b.method("LT;", "id", &["I"], "I", flags(), 1, 1, vec![0x000f]);
    let id = b.method_ref("LT;", "id", &["I"], "I");
    let target = b.method_ref("LT;", "use", &["I"], "V");

    // const/4 v0, #5; invoke-static {v0}, id(I)I; move-result v1;
    // invoke-static {v1}, use(I)V; return-void
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        2,
        0,
        vec![
            0x5012, 0x1071, id, 0x0000, 0x010a, 0x1071, target, 0x0001, 0x000e,
        ],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 5).unwrap();
    assert!(args[0].resolved);
    assert_eq!(args[0].source, ArgSource::InvokeResult);
    assert_eq!(args[0].value.as_ref().unwrap().int().unwrap(), 5);
}

#[test]
fn new_array_enriched_from_packed_payload() {
    let mut b = ContainerBuilder::new();
    let byte_array = b.type_id("[B");
    let target = b.method_ref("LT;", "use", &["[B"], "V");

    // const/4 v1, #4; new-array v0, v1, [B; fill-array-data v0, +payload;
    // invoke-static {v0}, use([B)V; return-void; payload
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        2,
        0,
        vec![
            // pc 0: const/4 v1, #4
            0x4112,
            // pc 1: new-array v0, v1, [B
            0x1023, byte_array,
            // pc 3: fill-array-data v0, +7
            0x0026, 0x0007, 0x0000,
            // pc 6: invoke-static {v0}, use([B)V
            0x1071, target, 0x0000,
            // pc 9: return-void
            0x000e,
            // pc 10: payload, width 1, 4 bytes
            0x0300, 0x0001, 0x0004, 0x0000, 0x2211, 0x4433,
        ],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 6).unwrap();
    assert!(args[0].resolved);
    assert_eq!(args[0].source, ArgSource::Allocation);

    let array = args[0].value.as_ref().unwrap().as_array().unwrap().read();
    assert_eq!(array.to_bytes().unwrap(), vec![0x11, 0x22, 0x33, 0x44]);
}

#[test]
fn new_instance_replays_its_constructor() {
    let mut b = ContainerBuilder::new();
    let sb = b.type_id("Ljava/lang/StringBuilder;");
    let init = b.method_ref(
        "Ljava/lang/StringBuilder;",
        "<init>",
        &["Ljava/lang/String;"],
        "V",
    );
    let seed = b.string("seed");
    let target = b.method_ref("LT;", "use", &["Ljava/lang/StringBuilder;"], "V");

    // const-string v1, "seed"; new-instance v0, StringBuilder;
    // invoke-direct {v0, v1}, <init>(String); invoke-static {v0}, use; return-void
    b.method(
        "LT;",
        "caller",
        &[],
        "V",
        flags(),
        2,
        0,
        vec![
            0x011a, seed as u16,
            0x0022, sb,
            0x2070, init, 0x0010,
            0x1071, target, 0x0000,
            0x000e,
        ],
    );

    let mut vm = make_vm(b);
    let caller = vm.index.method_by_signature("LT;->caller()V").unwrap();

    let args = recover_call_args(&mut vm, &caller, 7).unwrap();
    assert!(args[0].resolved);
    assert_eq!(args[0].source, ArgSource::Allocation);
    assert_eq!(
        args[0].value.as_ref().unwrap().host_string().unwrap(),
        "seed"
    );
}

#[test]
fn dependency_walk_lists_fields_classes_and_callees() {
    let mut b = ContainerBuilder::new();
    let field = b.field("LCfg;", "KEY", "I");
    let helper_ref = b.method_ref("LT;", "helper", &[], "V");
    let external = b.method_ref("Lcom/api/Svc;", "go", &[], "V");

    // helper: sget v0, LCfg;->KEY:I; return-void
    b.method(
        "LT;",
        "helper",
        &[],
        "V",
        flags(),
        1,
        0,
        vec![0x0060, field, 0x000e],
    );
    // entry: invoke-static {}, helper; invoke-static {}, Svc.go; return-void
    b.method(
        "LT;",
        "entry",
        &[],
        "V",
        flags(),
        1,
        0,
        vec![0x0071, helper_ref, 0x0000, 0x0071, external, 0x0000, 0x000e],
    );

    let vm = make_vm(b);
    let entry = vm.index.method_by_signature("LT;->entry()V").unwrap();

    let shallow = analyze_method(&vm.index, &entry, false);
    assert_eq!(
        shallow.methods_called,
        vec!["LT;->helper()V".to_string(), "Lcom/api/Svc;->go()V".to_string()]
    );
    assert!(shallow.static_fields.is_empty());

    let deep = analyze_method(&vm.index, &entry, true);
    assert_eq!(
        deep.static_fields,
        vec![("LCfg;".to_string(), "KEY".to_string())]
    );
    assert_eq!(deep.classes_needing_init, vec!["LCfg;".to_string()]);
}
