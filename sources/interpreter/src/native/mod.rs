//! The mock layer standing in for the Android framework and parts of the
//! Java standard library.
//!
//! Four registries, all keyed by `Lcls;->name` (fields by `(class, name)`):
//! static-method hooks, virtual-method hooks (which also serve direct,
//! interface and super calls), static-field overrides consulted by `sget*`
//! before the store, and factories that pre-shape instances of well-known
//! framework classes at `new-instance`.
//!
//! Hooks are looked up by name only, so one hook covers every overload and
//! sorts out the arguments itself. Unknown inputs return neutral defaults;
//! a half-mocked API that keeps execution progressing beats a precise one
//! that kills it.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::object::statics::StaticFieldRef;
use crate::object::{HostValue, Value};
use crate::Vm;

pub mod android;
pub mod lang;
pub mod reflect;
pub mod util;

/// A host-side method replacement. Receives the interpreter, the concrete
/// arguments (receiver first for instance methods) and the call's trace
/// text; returns the call's result, `None` for void.
pub type MockFn = fn(&mut Vm, Vec<Value>, &str) -> Result<Option<Value>>;

/// Creates a pre-shaped instance at `new-instance` time.
pub type FactoryFn = fn(&MockConfig) -> Value;

/// Host-supplied identity of the application under emulation. Set before an
/// emulation, read during.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Returned by `Context.getPackageName` and `PackageInfo.packageName`.
    pub package_name: String,
    /// Returned by `Signature.toByteArray`; hex of it by `toCharsString`.
    pub signature_bytes: Vec<u8>,
    /// Value of `Build.VERSION.SDK_INT`.
    pub sdk_int: i32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            package_name: "com.example.mock".to_string(),
            signature_bytes: Vec::new(),
            sdk_int: 29,
        }
    }
}

#[derive(Default)]
pub struct MockRegistry {
    static_methods: HashMap<String, MockFn>,
    virtual_methods: HashMap<String, MockFn>,
    static_fields: HashMap<StaticFieldRef, Value>,
    factories: HashMap<String, FactoryFn>,
}

impl MockRegistry {
    pub fn static_hook(&self, key: &str) -> Option<MockFn> {
        self.static_methods.get(key).copied()
    }

    pub fn virtual_hook(&self, key: &str) -> Option<MockFn> {
        self.virtual_methods.get(key).copied()
    }

    pub fn static_field(&self, key: &StaticFieldRef) -> Option<Value> {
        self.static_fields.get(key).cloned()
    }

    pub fn factory(&self, class: &str) -> Option<FactoryFn> {
        self.factories.get(class).copied()
    }

    pub fn register_static(&mut self, class: &str, name: &str, hook: MockFn) {
        self.static_methods.insert(format!("{class}->{name}"), hook);
    }

    pub fn register_virtual(&mut self, class: &str, name: &str, hook: MockFn) {
        self.virtual_methods.insert(format!("{class}->{name}"), hook);
    }

    pub fn register_static_field(&mut self, class: &str, name: &str, value: Value) {
        self.static_fields
            .insert(StaticFieldRef::new(class, name), value);
    }

    pub fn register_factory(&mut self, class: &str, factory: FactoryFn) {
        self.factories.insert(class.to_string(), factory);
    }
}

/// One mocked class. Modules register themselves against the registry;
/// the `classname` is the Dalvik descriptor the hooks key under.
pub trait MockModule {
    fn classname() -> &'static str;

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![]
    }

    fn static_fields(_config: &MockConfig) -> Vec<(&'static str, Value)> {
        vec![]
    }

    fn factory() -> Option<FactoryFn> {
        None
    }

    fn register(registry: &mut MockRegistry, config: &MockConfig) {
        for (name, hook) in Self::static_methods() {
            registry.register_static(Self::classname(), name, hook);
        }
        for (name, hook) in Self::virtual_methods() {
            registry.register_virtual(Self::classname(), name, hook);
        }
        for (name, value) in Self::static_fields(config) {
            registry.register_static_field(Self::classname(), name, value);
        }
        if let Some(factory) = Self::factory() {
            registry.register_factory(Self::classname(), factory);
        }
    }
}

#[macro_export]
macro_rules! static_method {
    (name: $name:expr => $hook:expr) => {
        ($name, $hook as $crate::native::MockFn)
    };
}

#[macro_export]
macro_rules! instance_method {
    (name: $name:expr => $hook:expr) => {
        ($name, $hook as $crate::native::MockFn)
    };
}

/// Install the bundled mock surface into a fresh registry.
pub fn register_defaults(registry: &mut MockRegistry, config: &MockConfig) {
    lang::JavaString::register(registry, config);
    lang::StringBuilder::register(registry, config);
    lang::StringBuffer::register(registry, config);
    lang::Integer::register(registry, config);
    lang::JavaLong::register(registry, config);
    lang::JavaBoolean::register(registry, config);
    lang::Character::register(registry, config);
    lang::JavaByte::register(registry, config);
    lang::JavaShort::register(registry, config);
    lang::Math::register(registry, config);
    lang::System::register(registry, config);
    lang::JavaObject::register(registry, config);

    util::Arrays::register(registry, config);
    util::ArrayList::register(registry, config);
    util::ListInterface::register(registry, config);
    util::Iterator::register(registry, config);

    android::AndroidContext::register(registry, config);
    android::ContextWrapper::register(registry, config);
    android::PackageManager::register(registry, config);
    android::Signature::register(registry, config);
    android::BuildVersion::register(registry, config);
    android::Base64::register(registry, config);

    reflect::JavaClass::register(registry, config);
    reflect::ReflectMethod::register(registry, config);
}

// Shared argument plumbing for hooks

/// The receiver of an instance hook.
pub fn receiver<'a>(args: &'a [Value], what: &str) -> Result<&'a Value> {
    args.first().ok_or_else(|| anyhow!("{what}: missing receiver"))
}

/// The host string carried by a boxed `java/lang/String` argument.
pub fn host_str(value: &Value, what: &str) -> Result<String> {
    value
        .host_string()
        .ok_or_else(|| anyhow!("{what}: expected a string, got {value}"))
}

/// A 32-bit integer argument, unboxing `Integer`/`Boolean`/`Character`.
pub fn unbox_int(value: &Value) -> Result<i32> {
    match value {
        Value::Object(obj) => match &obj.read().payload {
            Some(HostValue::Int(v)) => Ok(*v),
            Some(HostValue::Long(v)) => Ok(*v as i32),
            Some(HostValue::Bool(v)) => Ok(*v as i32),
            _ => Err(anyhow!("not a boxed number")),
        },
        v => v.int(),
    }
}

/// A 64-bit integer argument, unboxing `Long`.
pub fn unbox_long(value: &Value) -> Result<i64> {
    match value {
        Value::Long(v) => Ok(*v),
        Value::Object(obj) => match &obj.read().payload {
            Some(HostValue::Long(v)) => Ok(*v),
            Some(HostValue::Int(v)) => Ok(*v as i64),
            _ => Err(anyhow!("not a boxed number")),
        },
        v => v.int().map(|v| v as i64),
    }
}

/// Render a value the way `StringBuilder.append` and `String.valueOf` do.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Char(c) => String::from_utf16_lossy(&[*c]),
        Value::Null => "null".to_string(),
        Value::Object(obj) => {
            let obj = obj.read();
            match &obj.payload {
                Some(HostValue::Str(s)) => s.clone(),
                Some(HostValue::Int(v)) => v.to_string(),
                Some(HostValue::Long(v)) => v.to_string(),
                Some(HostValue::Bool(v)) => v.to_string(),
                _ => format!("{}@{:x}", obj.class, value.identity_hash()),
            }
        }
        Value::Array(_) => format!("array@{:x}", value.identity_hash()),
        Value::Class(desc) => format!("class {desc}"),
        Value::Exception(msg) => format!("exception: {msg}"),
    }
}
