//! Reflection surfaces. Nothing reflective actually runs; lookups hand back
//! opaque placeholders so that reflection-guarded code paths keep moving.

use anyhow::Result;
use tracing::warn;

use super::{receiver, MockFn};
use crate::object::{Instance, Value};
use crate::{instance_method, static_method};

pub struct JavaClass;
pub struct ReflectMethod;

/// `com.example.Foo` -> `Lcom/example/Foo;`
fn dotted_to_descriptor(name: &str) -> String {
    if name.starts_with('L') && name.ends_with(';') {
        return name.to_string();
    }
    format!("L{};", name.replace('.', "/"))
}

fn descriptor_to_dotted(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .map(|inner| inner.replace('/', "."))
        .unwrap_or_else(|| descriptor.to_string())
}

impl super::MockModule for JavaClass {
    fn classname() -> &'static str {
        "Ljava/lang/Class;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![static_method!(name: "forName" => |_, args, _| {
            let name = args
                .first()
                .and_then(|v| v.host_string())
                .unwrap_or_default();
            Ok(Some(Value::Class(dotted_to_descriptor(&name))))
        })]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "getName" => |_, args, _| {
                let this = receiver(&args, "Class.getName")?;
                let descriptor = match this {
                    Value::Class(descriptor) => descriptor.clone(),
                    _ => "java.lang.Object".to_string(),
                };
                Ok(Some(Value::string(descriptor_to_dotted(&descriptor))))
            }),
            instance_method!(name: "getMethod" => |_, _, _| {
                Ok(Some(Value::Object(Instance::new(
                    "Ljava/lang/reflect/Method;",
                ))))
            }),
            instance_method!(name: "getDeclaredMethod" => |_, _, _| {
                Ok(Some(Value::Object(Instance::new(
                    "Ljava/lang/reflect/Method;",
                ))))
            }),
            instance_method!(name: "newInstance" => |_, args, _| {
                let this = receiver(&args, "Class.newInstance")?;
                Ok(Some(match this {
                    Value::Class(descriptor) => {
                        Value::Object(Instance::new(descriptor.clone()))
                    }
                    _ => Value::Null,
                }))
            }),
        ]
    }
}

impl super::MockModule for ReflectMethod {
    fn classname() -> &'static str {
        "Ljava/lang/reflect/Method;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "setAccessible" => |_, _, _| Ok(None)),
            instance_method!(name: "invoke" => |_, _, trace| {
                // Reflective invocation is out of scope; a placeholder keeps
                // the caller alive
                warn!("reflective invoke not executed: {trace}");
                Ok(Some(Value::Null))
            }),
        ]
    }
}
