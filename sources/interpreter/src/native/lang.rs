//! `java/lang` mocks: the box-aware String surface, StringBuilder backed by
//! a host string, the numeric boxes, Math, System and Object.

use anyhow::{anyhow, Result};
use support::encoding::{from_utf16_units, utf16_units, utf16le_bytes};
use tracing::warn;

use super::{host_str, receiver, stringify, unbox_int, unbox_long, MockFn};
use crate::object::{Array, HostValue, Instance, Value};
use crate::{instance_method, static_method};

pub struct JavaString;
pub struct StringBuilder;
pub struct StringBuffer;
pub struct Integer;
pub struct JavaLong;
pub struct JavaBoolean;
pub struct Character;
pub struct JavaByte;
pub struct JavaShort;
pub struct Math;
pub struct System;
pub struct JavaObject;

fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.to_ascii_uppercase().as_str() {
        "UTF-16LE" => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            from_utf16_units(&units)
        }
        "UTF-16BE" | "UTF-16" => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            from_utf16_units(&units)
        }
        "ISO-8859-1" | "LATIN-1" => bytes.iter().map(|b| *b as char).collect(),
        // UTF-8, US-ASCII and anything unrecognised
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn encode_charset(s: &str, charset: &str) -> Vec<u8> {
    match charset.to_ascii_uppercase().as_str() {
        "UTF-8" | "US-ASCII" => s.as_bytes().to_vec(),
        "ISO-8859-1" | "LATIN-1" => s.chars().map(|c| c as u8).collect(),
        "UTF-16BE" | "UTF-16" => s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect(),
        // UTF-16LE and the unconfigured default
        _ => utf16le_bytes(s),
    }
}

/// Rebuild a host string from a constructor-style argument: another string,
/// a `[C`, or a `[B` with an optional charset name.
fn string_from_args(args: &[Value]) -> Result<String> {
    let Some(source) = args.first() else {
        return Ok(String::new());
    };

    if let Some(s) = source.host_string() {
        return Ok(s);
    }

    match source {
        Value::Array(arr) => {
            let arr = arr.read();
            if arr.ty == "C" {
                let units = arr
                    .values
                    .iter()
                    .map(|v| v.int().map(|i| i as u16))
                    .collect::<Result<Vec<_>>>()?;
                Ok(from_utf16_units(&units))
            } else {
                let bytes = arr.to_bytes()?;
                let charset = args
                    .get(1)
                    .and_then(|v| v.host_string())
                    .unwrap_or_else(|| "UTF-8".to_string());
                Ok(decode_charset(&bytes, &charset))
            }
        }
        v => Ok(stringify(v)),
    }
}

impl super::MockModule for JavaString {
    fn classname() -> &'static str {
        "Ljava/lang/String;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![static_method!(name: "valueOf" => |_, args, _| {
            let value = args.first().ok_or_else(|| anyhow!("valueOf without a value"))?;
            if let Value::Array(arr) = value {
                // valueOf(char[])
                let arr = arr.read();
                if arr.ty == "C" {
                    let units = arr
                        .values
                        .iter()
                        .map(|v| v.int().map(|i| i as u16))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Some(Value::string(from_utf16_units(&units))));
                }
            }
            Ok(Some(Value::string(stringify(value))))
        })]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "<init>" => |_, args, _| {
                let this = receiver(&args, "String.<init>")?.clone();
                let text = string_from_args(&args[1..])?;
                let obj = this
                    .as_object()
                    .ok_or_else(|| anyhow!("String.<init> on a non-object"))?;
                obj.write().payload = Some(HostValue::Str(text));
                Ok(None)
            }),
            instance_method!(name: "length" => |_, args, _| {
                let s = host_str(receiver(&args, "String.length")?, "String.length")?;
                Ok(Some(Value::Int(utf16_units(&s).len() as i32)))
            }),
            instance_method!(name: "isEmpty" => |_, args, _| {
                let s = host_str(receiver(&args, "String.isEmpty")?, "String.isEmpty")?;
                Ok(Some(Value::Boolean(s.is_empty())))
            }),
            instance_method!(name: "charAt" => |_, args, _| {
                let s = host_str(receiver(&args, "String.charAt")?, "String.charAt")?;
                let idx = args.get(1).map(unbox_int).transpose()?.unwrap_or(0);
                let units = utf16_units(&s);
                let unit = units
                    .get(idx.max(0) as usize)
                    .copied()
                    .ok_or_else(|| anyhow!("charAt index {idx} out of bounds"))?;
                Ok(Some(Value::Char(unit)))
            }),
            instance_method!(name: "toCharArray" => |_, args, _| {
                let s = host_str(receiver(&args, "String.toCharArray")?, "String.toCharArray")?;
                let values = utf16_units(&s).into_iter().map(Value::Char).collect();
                Ok(Some(Value::Array(Array::with_values("C", values))))
            }),
            instance_method!(name: "getBytes" => |_, args, _| {
                let s = host_str(receiver(&args, "String.getBytes")?, "String.getBytes")?;
                let charset = args
                    .get(1)
                    .and_then(|v| v.host_string())
                    .unwrap_or_else(|| "UTF-16LE".to_string());
                Ok(Some(Array::from_bytes(&encode_charset(&s, &charset))))
            }),
            instance_method!(name: "intern" => |_, args, _| {
                Ok(Some(receiver(&args, "String.intern")?.clone()))
            }),
            instance_method!(name: "toString" => |_, args, _| {
                Ok(Some(receiver(&args, "String.toString")?.clone()))
            }),
            instance_method!(name: "equals" => |_, args, _| {
                let lhs = receiver(&args, "String.equals")?.host_string();
                let rhs = args.get(1).and_then(|v| v.host_string());
                Ok(Some(Value::Boolean(match (lhs, rhs) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                })))
            }),
            instance_method!(name: "hashCode" => |_, args, _| {
                let s = host_str(receiver(&args, "String.hashCode")?, "String.hashCode")?;
                let hash = utf16_units(&s)
                    .into_iter()
                    .fold(0i32, |h, u| h.wrapping_mul(31).wrapping_add(u as i32));
                Ok(Some(Value::Int(hash)))
            }),
            instance_method!(name: "substring" => |_, args, _| {
                let s = host_str(receiver(&args, "String.substring")?, "String.substring")?;
                let units = utf16_units(&s);
                let from = args.get(1).map(unbox_int).transpose()?.unwrap_or(0).max(0) as usize;
                let to = match args.get(2) {
                    Some(v) => unbox_int(v)?.max(0) as usize,
                    None => units.len(),
                };
                if from > to || to > units.len() {
                    return Err(anyhow!("substring({from}, {to}) out of bounds"));
                }
                Ok(Some(Value::string(from_utf16_units(&units[from..to]))))
            }),
            instance_method!(name: "concat" => |_, args, _| {
                let lhs = host_str(receiver(&args, "String.concat")?, "String.concat")?;
                let rhs = args.get(1).and_then(|v| v.host_string()).unwrap_or_default();
                Ok(Some(Value::string(format!("{lhs}{rhs}"))))
            }),
        ]
    }

    fn factory() -> Option<super::FactoryFn> {
        Some(|_| Value::Object(Instance::with_payload(
            "Ljava/lang/String;",
            HostValue::Str(String::new()),
        )))
    }
}

// StringBuilder and StringBuffer share one implementation; the backing
// store is a host string in the payload.

fn builder_init(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "StringBuilder.<init>")?.clone();
    let obj = this
        .as_object()
        .ok_or_else(|| anyhow!("StringBuilder.<init> on a non-object"))?;

    let initial = match args.get(1) {
        Some(v) => v.host_string().unwrap_or_default(), // int capacity arg: ignored
        None => String::new(),
    };
    obj.write().payload = Some(HostValue::Str(initial));
    Ok(None)
}

fn builder_append(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "StringBuilder.append")?.clone();
    let obj = this
        .as_object()
        .ok_or_else(|| anyhow!("StringBuilder.append on a non-object"))?;

    let piece = match args.get(1) {
        Some(Value::Array(arr)) if arr.read().ty == "C" => {
            let arr = arr.read();
            let units = arr
                .values
                .iter()
                .map(|v| v.int().map(|i| i as u16))
                .collect::<Result<Vec<_>>>()?;
            from_utf16_units(&units)
        }
        Some(v) => stringify(v),
        None => return Err(anyhow!("StringBuilder.append without a value")),
    };

    let mut obj = obj.write();
    match &mut obj.payload {
        Some(HostValue::Str(s)) => s.push_str(&piece),
        other => *other = Some(HostValue::Str(piece)),
    }
    drop(obj);

    Ok(Some(this))
}

fn builder_to_string(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "StringBuilder.toString")?;
    Ok(Some(Value::string(this.host_string().unwrap_or_default())))
}

fn builder_length(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "StringBuilder.length")?;
    let s = this.host_string().unwrap_or_default();
    Ok(Some(Value::Int(utf16_units(&s).len() as i32)))
}

fn builder_reverse(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "StringBuilder.reverse")?.clone();
    let obj = this
        .as_object()
        .ok_or_else(|| anyhow!("StringBuilder.reverse on a non-object"))?;

    let mut obj = obj.write();
    if let Some(HostValue::Str(s)) = &mut obj.payload {
        let mut units = utf16_units(s);
        units.reverse();
        *s = from_utf16_units(&units);
    }
    drop(obj);

    Ok(Some(this))
}

fn builder_methods() -> Vec<(&'static str, MockFn)> {
    vec![
        instance_method!(name: "<init>" => builder_init),
        instance_method!(name: "append" => builder_append),
        instance_method!(name: "toString" => builder_to_string),
        instance_method!(name: "length" => builder_length),
        instance_method!(name: "reverse" => builder_reverse),
    ]
}

impl super::MockModule for StringBuilder {
    fn classname() -> &'static str {
        "Ljava/lang/StringBuilder;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        builder_methods()
    }

    fn factory() -> Option<super::FactoryFn> {
        Some(|_| {
            Value::Object(Instance::with_payload(
                "Ljava/lang/StringBuilder;",
                HostValue::Str(String::new()),
            ))
        })
    }
}

impl super::MockModule for StringBuffer {
    fn classname() -> &'static str {
        "Ljava/lang/StringBuffer;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        builder_methods()
    }

    fn factory() -> Option<super::FactoryFn> {
        Some(|_| {
            Value::Object(Instance::with_payload(
                "Ljava/lang/StringBuffer;",
                HostValue::Str(String::new()),
            ))
        })
    }
}

// Numeric boxes. The boxed form is an instance whose payload holds the
// primitive; valueOf wraps, xxxValue unwraps.

fn parse_radix(args: &[Value], what: &str) -> Result<(String, u32)> {
    let text = host_str(
        args.first().ok_or_else(|| anyhow!("{what} without input"))?,
        what,
    )?;
    let radix = match args.get(1) {
        Some(v) => unbox_int(v)? as u32,
        None => 10,
    };
    Ok((text.trim().to_string(), radix))
}

impl super::MockModule for Integer {
    fn classname() -> &'static str {
        "Ljava/lang/Integer;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "valueOf" => |_, args, _| {
                let value = match args.first() {
                    Some(v) if v.host_string().is_some() => {
                        i32::from_str_radix(&v.host_string().unwrap(), 10)?
                    }
                    Some(v) => unbox_int(v)?,
                    None => return Err(anyhow!("Integer.valueOf without a value")),
                };
                Ok(Some(Value::Object(Instance::with_payload(
                    "Ljava/lang/Integer;",
                    HostValue::Int(value),
                ))))
            }),
            static_method!(name: "parseInt" => |_, args, _| {
                let (text, radix) = parse_radix(&args, "Integer.parseInt")?;
                Ok(Some(Value::Int(i32::from_str_radix(&text, radix)?)))
            }),
            static_method!(name: "toString" => |_, args, _| {
                let value = args.first().map(unbox_int).transpose()?.unwrap_or(0);
                Ok(Some(Value::string(value.to_string())))
            }),
            static_method!(name: "toHexString" => |_, args, _| {
                let value = args.first().map(unbox_int).transpose()?.unwrap_or(0);
                Ok(Some(Value::string(format!("{:x}", value as u32))))
            }),
        ]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "intValue" => |_, args, _| {
                Ok(Some(Value::Int(unbox_int(receiver(&args, "Integer.intValue")?)?)))
            }),
            instance_method!(name: "longValue" => |_, args, _| {
                Ok(Some(Value::Long(unbox_long(receiver(&args, "Integer.longValue")?)?)))
            }),
            instance_method!(name: "toString" => |_, args, _| {
                let value = unbox_int(receiver(&args, "Integer.toString")?)?;
                Ok(Some(Value::string(value.to_string())))
            }),
        ]
    }
}

impl super::MockModule for JavaLong {
    fn classname() -> &'static str {
        "Ljava/lang/Long;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "valueOf" => |_, args, _| {
                let value = match args.first() {
                    Some(v) if v.host_string().is_some() => {
                        v.host_string().unwrap().trim().parse::<i64>()?
                    }
                    Some(v) => unbox_long(v)?,
                    None => return Err(anyhow!("Long.valueOf without a value")),
                };
                Ok(Some(Value::Object(Instance::with_payload(
                    "Ljava/lang/Long;",
                    HostValue::Long(value),
                ))))
            }),
            static_method!(name: "parseLong" => |_, args, _| {
                let (text, radix) = parse_radix(&args, "Long.parseLong")?;
                Ok(Some(Value::Long(i64::from_str_radix(&text, radix)?)))
            }),
        ]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "longValue" => |_, args, _| {
                Ok(Some(Value::Long(unbox_long(receiver(&args, "Long.longValue")?)?)))
            }),
            instance_method!(name: "intValue" => |_, args, _| {
                Ok(Some(Value::Int(unbox_long(receiver(&args, "Long.intValue")?)? as i32)))
            }),
        ]
    }
}

impl super::MockModule for JavaBoolean {
    fn classname() -> &'static str {
        "Ljava/lang/Boolean;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "valueOf" => |_, args, _| {
                let value = match args.first() {
                    Some(v) if v.host_string().is_some() => {
                        v.host_string().unwrap().eq_ignore_ascii_case("true")
                    }
                    Some(v) => unbox_int(v)? != 0,
                    None => false,
                };
                Ok(Some(Value::Object(Instance::with_payload(
                    "Ljava/lang/Boolean;",
                    HostValue::Bool(value),
                ))))
            }),
            static_method!(name: "parseBoolean" => |_, args, _| {
                let text = args.first().and_then(|v| v.host_string()).unwrap_or_default();
                Ok(Some(Value::Boolean(text.eq_ignore_ascii_case("true"))))
            }),
        ]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![instance_method!(name: "booleanValue" => |_, args, _| {
            Ok(Some(Value::Boolean(
                unbox_int(receiver(&args, "Boolean.booleanValue")?)? != 0,
            )))
        })]
    }
}

impl super::MockModule for Character {
    fn classname() -> &'static str {
        "Ljava/lang/Character;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![static_method!(name: "valueOf" => |_, args, _| {
            let value = args.first().map(unbox_int).transpose()?.unwrap_or(0);
            Ok(Some(Value::Object(Instance::with_payload(
                "Ljava/lang/Character;",
                HostValue::Int(value),
            ))))
        })]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![instance_method!(name: "charValue" => |_, args, _| {
            let value = unbox_int(receiver(&args, "Character.charValue")?)?;
            Ok(Some(Value::Char(value as u16)))
        })]
    }
}

impl super::MockModule for JavaByte {
    fn classname() -> &'static str {
        "Ljava/lang/Byte;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![static_method!(name: "valueOf" => |_, args, _| {
            let value = args.first().map(unbox_int).transpose()?.unwrap_or(0);
            Ok(Some(Value::Object(Instance::with_payload(
                "Ljava/lang/Byte;",
                HostValue::Int(value as i8 as i32),
            ))))
        })]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![instance_method!(name: "byteValue" => |_, args, _| {
            let value = unbox_int(receiver(&args, "Byte.byteValue")?)?;
            Ok(Some(Value::Int(value as i8 as i32)))
        })]
    }
}

impl super::MockModule for JavaShort {
    fn classname() -> &'static str {
        "Ljava/lang/Short;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![static_method!(name: "valueOf" => |_, args, _| {
            let value = args.first().map(unbox_int).transpose()?.unwrap_or(0);
            Ok(Some(Value::Object(Instance::with_payload(
                "Ljava/lang/Short;",
                HostValue::Int(value as i16 as i32),
            ))))
        })]
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![instance_method!(name: "shortValue" => |_, args, _| {
            let value = unbox_int(receiver(&args, "Short.shortValue")?)?;
            Ok(Some(Value::Int(value as i16 as i32)))
        })]
    }
}

impl super::MockModule for Math {
    fn classname() -> &'static str {
        "Ljava/lang/Math;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "abs" => |_, args, _| {
                Ok(Some(match args.first() {
                    Some(Value::Long(v)) => Value::Long(v.wrapping_abs()),
                    Some(Value::Float(v)) => Value::Float(v.abs()),
                    Some(Value::Double(v)) => Value::Double(v.abs()),
                    Some(v) => Value::Int(unbox_int(v)?.wrapping_abs()),
                    None => return Err(anyhow!("Math.abs without a value")),
                }))
            }),
            static_method!(name: "max" => |_, args, _| {
                math_pair(&args, |a, b| a.max(b), |a, b| a.max(b))
            }),
            static_method!(name: "min" => |_, args, _| {
                math_pair(&args, |a, b| a.min(b), |a, b| a.min(b))
            }),
        ]
    }
}

fn math_pair(
    args: &[Value],
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Option<Value>> {
    let (a, b) = match (args.first(), args.get(1)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(anyhow!("Math.min/max needs two values")),
    };

    Ok(Some(match (a, b) {
        (Value::Double(_), _) | (_, Value::Double(_)) | (Value::Float(_), _) | (_, Value::Float(_)) => {
            let lhs = a.as_double().copied().unwrap_or_else(|| a.float().map(|f| f as f64).unwrap_or(0.0));
            let rhs = b.as_double().copied().unwrap_or_else(|| b.float().map(|f| f as f64).unwrap_or(0.0));
            let result = float_op(lhs, rhs);
            if a.as_double().is_some() || b.as_double().is_some() {
                Value::Double(result)
            } else {
                Value::Float(result as f32)
            }
        }
        (Value::Long(_), _) | (_, Value::Long(_)) => {
            Value::Long(int_op(unbox_long(a)?, unbox_long(b)?))
        }
        _ => Value::Int(int_op(unbox_int(a)? as i64, unbox_int(b)? as i64) as i32),
    }))
}

impl super::MockModule for System {
    fn classname() -> &'static str {
        "Ljava/lang/System;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "arraycopy" => |_, args, _| {
                let src = args
                    .first()
                    .and_then(|v| v.as_array().cloned())
                    .ok_or_else(|| anyhow!("arraycopy: src is not an array"))?;
                let src_pos = args.get(1).map(unbox_int).transpose()?.unwrap_or(0) as usize;
                let dst = args
                    .get(2)
                    .and_then(|v| v.as_array().cloned())
                    .ok_or_else(|| anyhow!("arraycopy: dst is not an array"))?;
                let dst_pos = args.get(3).map(unbox_int).transpose()?.unwrap_or(0) as usize;
                let len = args.get(4).map(unbox_int).transpose()?.unwrap_or(0) as usize;

                // src and dst may alias; stage the copy
                let staged: Vec<Value> = {
                    let src = src.read();
                    if src_pos + len > src.values.len() {
                        return Err(anyhow!("arraycopy: source range out of bounds"));
                    }
                    src.values[src_pos..src_pos + len].to_vec()
                };

                let mut dst = dst.write();
                if dst_pos + len > dst.values.len() {
                    return Err(anyhow!("arraycopy: destination range out of bounds"));
                }
                dst.values[dst_pos..dst_pos + len].clone_from_slice(&staged);

                Ok(None)
            }),
            static_method!(name: "currentTimeMillis" => |_, _, _| {
                // Deterministic emulation beats wall-clock fidelity
                Ok(Some(Value::Long(0)))
            }),
            static_method!(name: "identityHashCode" => |_, args, _| {
                Ok(Some(Value::Int(
                    args.first().map(|v| v.identity_hash()).unwrap_or(0),
                )))
            }),
        ]
    }
}

impl super::MockModule for JavaObject {
    fn classname() -> &'static str {
        "Ljava/lang/Object;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "<init>" => |_, _, _| Ok(None)),
            instance_method!(name: "hashCode" => |_, args, _| {
                Ok(Some(Value::Int(
                    args.first().map(|v| v.identity_hash()).unwrap_or(0),
                )))
            }),
            instance_method!(name: "equals" => |_, args, _| {
                let lhs = receiver(&args, "Object.equals")?;
                let rhs = args.get(1).cloned().unwrap_or(Value::Null);
                Ok(Some(Value::Boolean(lhs.ref_eq(&rhs))))
            }),
            instance_method!(name: "getClass" => |_, args, _| {
                let this = receiver(&args, "Object.getClass")?;
                let descriptor = match this {
                    Value::Object(obj) => obj.read().class.clone(),
                    Value::Array(arr) => format!("[{}", arr.read().ty),
                    Value::Class(_) => "Ljava/lang/Class;".to_string(),
                    v => {
                        warn!("Object.getClass on {v}");
                        "Ljava/lang/Object;".to_string()
                    }
                };
                Ok(Some(Value::Class(descriptor)))
            }),
            instance_method!(name: "toString" => |_, args, _| {
                Ok(Some(Value::string(stringify(
                    receiver(&args, "Object.toString")?,
                ))))
            }),
        ]
    }
}
