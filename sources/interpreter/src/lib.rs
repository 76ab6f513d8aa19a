//! The Dalvik interpreter core: frame contexts, the fetch-dispatch loop,
//! class initialisation and invoke dispatch against the mock layer.

use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use dex::{decode, CodeItem, DexError, DexIndex, InvokeKind, MethodDef, MethodFlags, MethodSig};
use tracing::{debug, info, warn};

use crate::bytecode::Progression;
use crate::error::{EmuError, ErrorKind};
use crate::native::{MockConfig, MockRegistry};
use crate::object::registers::RegisterFile;
use crate::object::statics::StaticFields;
use crate::object::Value;

pub mod bytecode;
pub mod error;
pub mod native;
pub mod object;

/// Stack-depth guard against runaway mutual recursion.
pub const MAX_FRAMES: usize = 256;

/// One interpreter frame: a method, its register file, the pc, and the
/// last-result slot an `invoke*` fills for the following `move-result*`.
pub struct Context {
    pub method: Rc<MethodDef>,
    pub code: CodeItem,
    pub pc: usize,
    pub registers: RegisterFile,
    pub last_result: Option<Value>,
}

impl Context {
    pub fn new(method: Rc<MethodDef>) -> Result<Context> {
        let code = method
            .code
            .clone()
            .ok_or_else(|| anyhow!("{} has no body", method.signature))?;

        Ok(Context {
            registers: RegisterFile::new(code.registers as usize),
            method,
            code,
            pc: 0,
            last_result: None,
        })
    }
}

/// One emulation session. Owns everything frames share: the static-field
/// store, the initialised-classes set, the mock registries and their
/// configuration. There are no process-wide singletons; dropping the `Vm`
/// drops the session, and [`Vm::reset`] starts the next one in place.
pub struct Vm {
    pub index: Rc<DexIndex>,
    pub statics: StaticFields,
    pub initialised: HashSet<String>,
    pub mocks: MockRegistry,
    pub config: MockConfig,
    /// Optional instruction budget for one emulation; `None` is unbounded.
    pub fuel: Option<u64>,
    depth: usize,
}

impl Vm {
    pub fn new(index: Rc<DexIndex>) -> Vm {
        Vm::with_config(index, MockConfig::default())
    }

    pub fn with_config(index: Rc<DexIndex>, config: MockConfig) -> Vm {
        let mut mocks = MockRegistry::default();
        native::register_defaults(&mut mocks, &config);

        Vm {
            index,
            statics: StaticFields::new(),
            initialised: HashSet::new(),
            mocks,
            config,
            fuel: None,
            depth: 0,
        }
    }

    /// Start the next independent emulation: clear the static-field store
    /// and the initialised-classes set in the same moment.
    pub fn reset(&mut self) {
        self.statics.reset();
        self.initialised.clear();
    }

    /// The fetch-dispatch loop. Returns the frame's return value, `None`
    /// for void, or the fatal error annotated with pc and disassembly.
    pub fn run(&mut self, ctx: &mut Context) -> Result<Option<Value>> {
        while ctx.pc < ctx.code.units.len() {
            if let Some(fuel) = self.fuel.as_mut() {
                if *fuel == 0 {
                    return Err(self.fatal(
                        ctx,
                        ErrorKind::Runtime,
                        "<budget>",
                        "instruction budget exhausted".to_string(),
                    ));
                }
                *fuel -= 1;
            }

            let ins = match decode(&ctx.code.units, ctx.pc) {
                Ok(ins) => ins,
                Err(e) => {
                    return Err(self.fatal(ctx, ErrorKind::Decode, "<undecodable>", e.to_string()))
                }
            };

            debug!("{}@{:#06x}: {:?}", ctx.method.name, ctx.pc, ins.op);

            match bytecode::execute(self, ctx, &ins) {
                Ok(Progression::Next) => ctx.pc += ins.len,
                Ok(Progression::JumpRel(off)) => {
                    let target = ctx.pc as i64 + off as i64;
                    if target < 0 {
                        return Err(self.fatal(
                            ctx,
                            ErrorKind::Decode,
                            self.index.container(ctx.method.container).disassemble(&ins),
                            format!("branch to negative pc {target}"),
                        ));
                    }
                    ctx.pc = target as usize;
                }
                Ok(Progression::Return(value)) => {
                    debug!("{} returns {:?}", ctx.method.name, value.as_ref().map(|v| v.to_string()));
                    return Ok(value);
                }
                Err(e) => {
                    // Already annotated further down the frame tree
                    if e.is::<EmuError>() {
                        return Err(e);
                    }

                    let kind = if e.downcast_ref::<DexError>().is_some() {
                        ErrorKind::Decode
                    } else {
                        ErrorKind::Runtime
                    };
                    let disassembly =
                        self.index.container(ctx.method.container).disassemble(&ins);
                    return Err(self.fatal(ctx, kind, disassembly, format!("{e:#}")));
                }
            }
        }

        Err(self.fatal(
            ctx,
            ErrorKind::Decode,
            "<end of method>",
            "pc fell off the end of the method".to_string(),
        ))
    }

    fn fatal(
        &self,
        ctx: &Context,
        kind: ErrorKind,
        disassembly: impl Into<String>,
        message: String,
    ) -> anyhow::Error {
        anyhow::Error::new(EmuError::new(
            kind,
            ctx.pc,
            &ctx.method.signature,
            disassembly,
            message,
        ))
    }

    /// Execute a method body in a child frame. `args` are placed into the
    /// trailing `ins_size` registers, wides consuming two slots; for
    /// non-static methods the receiver is the first argument.
    pub fn execute(&mut self, method: &Rc<MethodDef>, args: Vec<Value>) -> Result<Option<Value>> {
        if method.flags.contains(MethodFlags::NATIVE)
            || method.flags.contains(MethodFlags::ABSTRACT)
        {
            return Err(anyhow::Error::new(EmuError::new(
                ErrorKind::Resolution,
                0,
                &method.signature,
                "<no body>",
                "cannot execute a native or abstract method without a mock",
            )));
        }

        if self.depth >= MAX_FRAMES {
            return Err(anyhow!(
                "frame depth limit ({MAX_FRAMES}) reached invoking {}",
                method.signature
            ));
        }

        let mut ctx = Context::new(Rc::clone(method))?;

        let regs = ctx.code.registers as usize;
        let ins = ctx.code.ins as usize;
        if ins > regs {
            return Err(anyhow!(
                "{}: ins_size {ins} exceeds registers_size {regs}",
                method.signature
            ));
        }

        let mut reg = (regs - ins) as u16;
        for arg in args {
            reg += ctx.registers.set_value(reg, arg)? as u16;
        }
        if reg as usize != regs {
            warn!(
                "{}: arguments filled {} of {} parameter slots",
                method.signature,
                reg as usize - (regs - ins),
                ins
            );
        }

        self.depth += 1;
        let result = self.run(&mut ctx);
        self.depth -= 1;

        result
    }

    /// Run a class's `<clinit>` if it has not run in this session. The class
    /// is marked initialised *before* execution so that initialiser cycles
    /// terminate; re-entry observes the partially initialised state.
    pub fn initialise_class(&mut self, descriptor: &str) -> Result<()> {
        if self.initialised.contains(descriptor) {
            return Ok(());
        }
        self.initialised.insert(descriptor.to_string());

        let sig = format!("{descriptor}-><clinit>()V");
        let clinit = match self.index.method_by_signature(&sig) {
            Some(clinit) if clinit.code.is_some() => clinit,
            _ => {
                debug!("no <clinit> in {descriptor}");
                return Ok(());
            }
        };

        info!("initialising {descriptor}");
        if let Err(e) = self.execute(&clinit, vec![]) {
            // Partial initialisation is still useful state; keep going
            warn!("<clinit> of {descriptor} failed: {e:#}");
        }

        Ok(())
    }

    /// First method of `class` named `name`, by signature order when
    /// overloaded. Prefer [`Vm::find_method_by_trace`] when ambiguity bites.
    pub fn find_method(&self, class: &str, name: &str) -> Option<Rc<MethodDef>> {
        self.index.find_methods(class, name).into_iter().next()
    }

    pub fn find_method_by_trace(&self, text: &str) -> Option<Rc<MethodDef>> {
        self.index.method_by_trace(text)
    }

    /// Invoke dispatch, shared by the `invoke-*` handlers and the backward
    /// analyzer's invoke-result resolution. Resolution order: mock hook,
    /// indexed body, constructor no-op, warn-and-null.
    pub fn dispatch_invoke(
        &mut self,
        kind: InvokeKind,
        sig: &MethodSig,
        args: Vec<Value>,
        trace: &str,
    ) -> Result<Option<Value>> {
        let key = sig.key();

        let hook = match kind {
            InvokeKind::Static => self.mocks.static_hook(&key),
            // Super and interface calls collapse onto the virtual registry
            _ => self.mocks.virtual_hook(&key),
        };

        if let Some(hook) = hook {
            debug!("mock hook {key}");
            return hook(self, args, trace);
        }

        if let Some(def) = self.index.method_by_signature(&sig.signature) {
            if def.code.is_some() {
                self.initialise_class(&def.class)?;
                return match self.execute(&def, args) {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        // No cross-method unwinding: the callee's failure
                        // becomes a null result at this call site.
                        warn!("{} failed: {e:#}", sig.signature);
                        Ok(Some(Value::Null))
                    }
                };
            }
        }

        if sig.name == "<init>" {
            // Unmocked constructor on a bare instance
            return Ok(None);
        }

        warn!("unmocked method {}", sig.signature);
        Ok(Some(Value::Null))
    }
}
