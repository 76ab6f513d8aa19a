//! Android framework mocks: package identity, signature bytes, the SDK
//! version constant and `android/util/Base64`.

use anyhow::{anyhow, Result};
use tracing::warn;

use super::{receiver, unbox_int, MockConfig, MockFn};
use crate::object::{Array, HostValue, Instance, Value};
use crate::{instance_method, static_method};

pub struct AndroidContext;
pub struct ContextWrapper;
pub struct PackageManager;
pub struct Signature;
pub struct BuildVersion;
pub struct Base64;

fn package_name(vm: &mut crate::Vm, _args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    Ok(Some(Value::string(vm.config.package_name.clone())))
}

fn package_manager(_vm: &mut crate::Vm, _args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    Ok(Some(Value::Object(Instance::new(
        "Landroid/content/pm/PackageManager;",
    ))))
}

fn application_context(
    _vm: &mut crate::Vm,
    args: Vec<Value>,
    _trace: &str,
) -> Result<Option<Value>> {
    Ok(Some(receiver(&args, "Context.getApplicationContext")?.clone()))
}

fn context_methods() -> Vec<(&'static str, MockFn)> {
    vec![
        instance_method!(name: "getPackageName" => package_name),
        instance_method!(name: "getPackageManager" => package_manager),
        instance_method!(name: "getApplicationContext" => application_context),
    ]
}

impl super::MockModule for AndroidContext {
    fn classname() -> &'static str {
        "Landroid/content/Context;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        context_methods()
    }
}

impl super::MockModule for ContextWrapper {
    fn classname() -> &'static str {
        "Landroid/content/ContextWrapper;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        context_methods()
    }
}

/// Build the `PackageInfo` the application would see for itself: its package
/// name and its (configured) signing certificate.
fn make_package_info(config: &MockConfig) -> Value {
    let info = Instance::new("Landroid/content/pm/PackageInfo;");
    {
        let mut info = info.write();
        info.fields.insert(
            "packageName".to_string(),
            Value::string(config.package_name.clone()),
        );

        let signature = Instance::with_payload(
            "Landroid/content/pm/Signature;",
            HostValue::Bytes(config.signature_bytes.clone()),
        );
        info.fields.insert(
            "signatures".to_string(),
            Value::Array(Array::with_values(
                "Landroid/content/pm/Signature;",
                vec![Value::Object(signature)],
            )),
        );
    }
    Value::Object(info)
}

impl super::MockModule for PackageManager {
    fn classname() -> &'static str {
        "Landroid/content/pm/PackageManager;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![instance_method!(name: "getPackageInfo" => |vm, _args, _| {
            Ok(Some(make_package_info(&vm.config)))
        })]
    }
}

impl super::MockModule for Signature {
    fn classname() -> &'static str {
        "Landroid/content/pm/Signature;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "toByteArray" => |_, args, _| {
                let this = receiver(&args, "Signature.toByteArray")?;
                let bytes = match this.as_object().map(|obj| obj.read()) {
                    Some(obj) => match &obj.payload {
                        Some(HostValue::Bytes(bytes)) => bytes.clone(),
                        _ => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Some(Array::from_bytes(&bytes)))
            }),
            instance_method!(name: "toCharsString" => |_, args, _| {
                let this = receiver(&args, "Signature.toCharsString")?;
                let bytes = match this.as_object().map(|obj| obj.read()) {
                    Some(obj) => match &obj.payload {
                        Some(HostValue::Bytes(bytes)) => bytes.clone(),
                        _ => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Some(Value::string(const_hex::encode(bytes))))
            }),
            instance_method!(name: "hashCode" => |_, args, _| {
                Ok(Some(Value::Int(
                    args.first().map(|v| v.identity_hash()).unwrap_or(0),
                )))
            }),
        ]
    }
}

impl super::MockModule for BuildVersion {
    fn classname() -> &'static str {
        "Landroid/os/Build$VERSION;"
    }

    fn static_fields(config: &MockConfig) -> Vec<(&'static str, Value)> {
        vec![("SDK_INT", Value::Int(config.sdk_int))]
    }
}

// android.util.Base64 flag bits
const NO_PADDING: i32 = 1;
const URL_SAFE: i32 = 8;

impl super::MockModule for Base64 {
    fn classname() -> &'static str {
        "Landroid/util/Base64;"
    }

    fn static_fields(_config: &MockConfig) -> Vec<(&'static str, Value)> {
        vec![
            ("DEFAULT", Value::Int(0)),
            ("NO_PADDING", Value::Int(NO_PADDING)),
            ("NO_WRAP", Value::Int(2)),
            ("CRLF", Value::Int(4)),
            ("URL_SAFE", Value::Int(URL_SAFE)),
        ]
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "decode" => |_, args, _| {
                let input = match args.first() {
                    Some(v) if v.host_string().is_some() => v.host_string().unwrap(),
                    Some(Value::Array(arr)) => {
                        String::from_utf8_lossy(&arr.read().to_bytes()?).into_owned()
                    }
                    _ => return Err(anyhow!("Base64.decode without input")),
                };
                let flags = args.get(1).map(unbox_int).transpose()?.unwrap_or(0);

                // Encoders in the wild wrap and pad inconsistently; strip
                // both and decode padding-free
                let cleaned: String = input
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '=')
                    .collect();
                let config = if flags & URL_SAFE != 0 {
                    base64::URL_SAFE_NO_PAD
                } else {
                    base64::STANDARD_NO_PAD
                };

                match base64::decode_config(&cleaned, config) {
                    Ok(bytes) => Ok(Some(Array::from_bytes(&bytes))),
                    Err(e) => {
                        warn!("Base64.decode failed: {e}");
                        Ok(Some(Value::Null))
                    }
                }
            }),
            static_method!(name: "encodeToString" => |_, args, _| {
                let bytes = args
                    .first()
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.read().to_bytes())
                    .transpose()?
                    .ok_or_else(|| anyhow!("Base64.encodeToString without input"))?;
                let flags = args.get(1).map(unbox_int).transpose()?.unwrap_or(0);

                let config = match (flags & URL_SAFE != 0, flags & NO_PADDING != 0) {
                    (true, true) => base64::URL_SAFE_NO_PAD,
                    (true, false) => base64::URL_SAFE,
                    (false, true) => base64::STANDARD_NO_PAD,
                    (false, false) => base64::STANDARD,
                };

                Ok(Some(Value::string(base64::encode_config(bytes, config))))
            }),
        ]
    }
}
