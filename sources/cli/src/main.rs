mod args;

use std::fs;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use analysis::{analyze_method, recover_call_args};
use dex::{Container, DexIndex, MethodDef};
use interpreter::native::MockConfig;
use interpreter::Vm;

use crate::args::Cli;

fn main() -> Result<()> {
    let args = Cli::parse();

    // RUST_LOG wins when set; --trace otherwise raises the floor to the
    // per-instruction debug lines the run loop emits
    let default_filter = if args.trace { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut containers = Vec::new();
    for path in &args.dex {
        let bytes = fs::read(path).with_context(|| format!("reading {path}"))?;
        containers.push(Container::parse(&bytes).with_context(|| format!("parsing {path}"))?);
    }
    let index = Rc::new(DexIndex::new(containers));
    info!("indexed {} container(s)", index.containers());

    let mut config = MockConfig::default();
    if let Some(package_name) = args.package_name {
        config.package_name = package_name;
    }
    if let Some(hex) = &args.signature_hex {
        config.signature_bytes =
            const_hex::decode(hex).context("--signature-hex is not valid hex")?;
    }
    if let Some(sdk_int) = args.sdk_int {
        config.sdk_int = sdk_int;
    }

    let mut vm = Vm::with_config(Rc::clone(&index), config);
    vm.fuel = args.max_instructions;

    let target = resolve_target(&vm, &args.target)?;
    println!("{}", target.signature);

    let sites = index.find_all_call_sites(&target.signature);
    if sites.is_empty() {
        warn!("no call sites of {} found", target.signature);
        return Ok(());
    }

    for (caller_sig, pc) in sites {
        let Some(caller) = index.method_by_signature(&caller_sig) else {
            continue;
        };
        println!("  caller {caller_sig} @ {pc:#06x}");

        if args.list_sites {
            continue;
        }

        // Independent emulation per site
        vm.reset();
        if let Some(budget) = args.max_instructions {
            vm.fuel = Some(budget);
        }

        match emulate_site(&mut vm, &target, &caller, pc) {
            Ok(Some(value)) => println!("    -> {value}"),
            Ok(None) => println!("    -> void"),
            Err(e) => println!("    !! {e:#}"),
        }
    }

    Ok(())
}

fn resolve_target(vm: &Vm, target: &str) -> Result<Rc<MethodDef>> {
    // Full-signature lookup first, the trace form as the authoritative
    // fallback, then class + name
    if let Some(def) = vm.index.method_by_signature(target) {
        return Ok(def);
    }
    if let Some(def) = vm.find_method_by_trace(target) {
        return Ok(def);
    }

    let (class, name) = support::descriptor::MethodSignature::parse_loose(target)
        .map_err(|_| anyhow!("cannot parse target {target}"))?;
    vm.find_method(&class, &name)
        .ok_or_else(|| anyhow!("method {target} not found in the index"))
}

fn emulate_site(
    vm: &mut Vm,
    target: &Rc<MethodDef>,
    caller: &Rc<MethodDef>,
    pc: usize,
) -> Result<Option<interpreter::object::Value>> {
    let infos = recover_call_args(vm, caller, pc)?;

    for (i, info) in infos.iter().enumerate() {
        match (&info.resolved, &info.value) {
            (true, Some(value)) => println!("    arg{i} ({}): {value}", info.source),
            _ => println!("    arg{i} ({}): unresolved [{}]", info.source, info.detail),
        }
    }

    // Run the initialisers the target depends on, then execute with
    // best-effort defaults for whatever stayed unresolved
    let deps = analyze_method(&vm.index, target, true);
    for class in &deps.classes_needing_init {
        vm.initialise_class(class)?;
    }

    let args = infos.iter().map(|info| info.value_or_default()).collect();
    vm.execute(target, args)
}
