use std::rc::Rc;

use dex::build::ContainerBuilder;
use dex::{DexIndex, MethodFlags};
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

pub fn make_vm(builder: ContainerBuilder) -> Vm {
    lazy_static::initialize(&TRACING);
    Vm::new(Rc::new(DexIndex::new(vec![builder.finish()])))
}

pub fn static_flags() -> MethodFlags {
    MethodFlags::PUBLIC | MethodFlags::STATIC
}

/// Run a static method defined in the builder and hand back its result.
pub fn run(
    vm: &mut Vm,
    signature: &str,
    args: Vec<interpreter::object::Value>,
) -> anyhow::Result<Option<interpreter::object::Value>> {
    let method = vm
        .index
        .method_by_signature(signature)
        .unwrap_or_else(|| panic!("no method {signature}"));
    vm.execute(&method, args)
}
