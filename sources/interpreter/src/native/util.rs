//! `java/util` mocks: Arrays, ArrayList behind the List interface, and the
//! Iterator surface.

use anyhow::{anyhow, Result};

use super::{receiver, unbox_int, MockFn};
use crate::object::{Array, HostValue, Instance, Value};
use crate::{instance_method, static_method};

pub struct Arrays;
pub struct ArrayList;
pub struct ListInterface;
pub struct Iterator;

impl super::MockModule for Arrays {
    fn classname() -> &'static str {
        "Ljava/util/Arrays;"
    }

    fn static_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            static_method!(name: "copyOf" => |_, args, _| {
                let src = args
                    .first()
                    .and_then(|v| v.as_array().cloned())
                    .ok_or_else(|| anyhow!("Arrays.copyOf: not an array"))?;
                let len = args.get(1).map(unbox_int).transpose()?.unwrap_or(0);
                if len < 0 {
                    return Err(anyhow!("Arrays.copyOf: negative length {len}"));
                }

                let src = src.read();
                let default = Array::element_default(&src.ty);
                let mut values = src.values.clone();
                values.resize(len as usize, default);

                Ok(Some(Value::Array(Array::with_values(src.ty.clone(), values))))
            }),
            static_method!(name: "copyOfRange" => |_, args, _| {
                let src = args
                    .first()
                    .and_then(|v| v.as_array().cloned())
                    .ok_or_else(|| anyhow!("Arrays.copyOfRange: not an array"))?;
                let from = args.get(1).map(unbox_int).transpose()?.unwrap_or(0);
                let to = args.get(2).map(unbox_int).transpose()?.unwrap_or(0);
                if from < 0 || to < from {
                    return Err(anyhow!("Arrays.copyOfRange({from}, {to}) out of bounds"));
                }

                let src = src.read();
                let default = Array::element_default(&src.ty);
                let values = (from..to)
                    .map(|i| {
                        src.values
                            .get(i as usize)
                            .cloned()
                            .unwrap_or_else(|| default.clone())
                    })
                    .collect();

                Ok(Some(Value::Array(Array::with_values(src.ty.clone(), values))))
            }),
            static_method!(name: "fill" => |_, args, _| {
                let arr = args
                    .first()
                    .and_then(|v| v.as_array().cloned())
                    .ok_or_else(|| anyhow!("Arrays.fill: not an array"))?;

                let mut arr = arr.write();
                let len = arr.values.len();
                let (from, to, value) = match args.len() {
                    // fill(array, value)
                    2 => (0usize, len, args[1].clone()),
                    // fill(array, from, to, value)
                    4 => (
                        unbox_int(&args[1])?.max(0) as usize,
                        (unbox_int(&args[2])?.max(0) as usize).min(len),
                        args[3].clone(),
                    ),
                    n => return Err(anyhow!("Arrays.fill with {n} arguments")),
                };

                for slot in arr.values[from..to].iter_mut() {
                    *slot = value.clone();
                }

                Ok(None)
            }),
        ]
    }
}

// ArrayList and the List interface route to the same hooks: invoke-virtual
// names the concrete class, invoke-interface the interface.

fn list_init(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "List.<init>")?;
    if let Some(obj) = this.as_object() {
        let mut obj = obj.write();
        if !matches!(obj.payload, Some(HostValue::List(_))) {
            obj.payload = Some(HostValue::List(Vec::new()));
        }
    }
    Ok(None)
}

fn list_add(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "List.add")?;
    let obj = this
        .as_object()
        .ok_or_else(|| anyhow!("List.add on a non-object"))?;

    let mut obj = obj.write();
    let items = match &mut obj.payload {
        Some(HostValue::List(items)) => items,
        other => {
            *other = Some(HostValue::List(Vec::new()));
            match other {
                Some(HostValue::List(items)) => items,
                _ => unreachable!(),
            }
        }
    };

    match args.len() {
        // add(value)
        2 => items.push(args[1].clone()),
        // add(index, value)
        3 => {
            let idx = (unbox_int(&args[1])?.max(0) as usize).min(items.len());
            items.insert(idx, args[2].clone());
        }
        n => return Err(anyhow!("List.add with {n} arguments")),
    }

    Ok(Some(Value::Boolean(true)))
}

fn list_get(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "List.get")?;
    let obj = this
        .as_object()
        .ok_or_else(|| anyhow!("List.get on a non-object"))?;
    let idx = args.get(1).map(unbox_int).transpose()?.unwrap_or(0);

    let obj = obj.read();
    match &obj.payload {
        Some(HostValue::List(items)) => items
            .get(idx.max(0) as usize)
            .filter(|_| idx >= 0)
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow!("List.get({idx}) out of bounds ({})", items.len())),
        _ => Err(anyhow!("List.get on a non-list object")),
    }
}

fn list_size(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "List.size")?;
    let size = match this.as_object().map(|obj| obj.read()) {
        Some(obj) => match &obj.payload {
            Some(HostValue::List(items)) => items.len(),
            _ => 0,
        },
        None => 0,
    };
    Ok(Some(Value::Int(size as i32)))
}

fn list_is_empty(vm: &mut crate::Vm, args: Vec<Value>, trace: &str) -> Result<Option<Value>> {
    let size = list_size(vm, args, trace)?;
    let size = size.map(|v| v.int()).transpose()?.unwrap_or(0);
    Ok(Some(Value::Boolean(size == 0)))
}

fn list_iterator(_vm: &mut crate::Vm, args: Vec<Value>, _trace: &str) -> Result<Option<Value>> {
    let this = receiver(&args, "List.iterator")?;
    let items = match this.as_object().map(|obj| obj.read()) {
        Some(obj) => match &obj.payload {
            Some(HostValue::List(items)) => items.clone(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    };

    Ok(Some(Value::Object(Instance::with_payload(
        "Ljava/util/Iterator;",
        HostValue::Iter { items, pos: 0 },
    ))))
}

fn list_methods() -> Vec<(&'static str, MockFn)> {
    vec![
        instance_method!(name: "<init>" => list_init),
        instance_method!(name: "add" => list_add),
        instance_method!(name: "get" => list_get),
        instance_method!(name: "size" => list_size),
        instance_method!(name: "isEmpty" => list_is_empty),
        instance_method!(name: "iterator" => list_iterator),
    ]
}

impl super::MockModule for ArrayList {
    fn classname() -> &'static str {
        "Ljava/util/ArrayList;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        list_methods()
    }

    fn factory() -> Option<super::FactoryFn> {
        Some(|_| {
            Value::Object(Instance::with_payload(
                "Ljava/util/ArrayList;",
                HostValue::List(Vec::new()),
            ))
        })
    }
}

impl super::MockModule for ListInterface {
    fn classname() -> &'static str {
        "Ljava/util/List;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        list_methods()
    }
}

impl super::MockModule for Iterator {
    fn classname() -> &'static str {
        "Ljava/util/Iterator;"
    }

    fn virtual_methods() -> Vec<(&'static str, MockFn)> {
        vec![
            instance_method!(name: "hasNext" => |_, args, _| {
                let this = receiver(&args, "Iterator.hasNext")?;
                let has = match this.as_object().map(|obj| obj.read()) {
                    Some(obj) => match &obj.payload {
                        Some(HostValue::Iter { items, pos }) => *pos < items.len(),
                        _ => false,
                    },
                    None => false,
                };
                Ok(Some(Value::Boolean(has)))
            }),
            instance_method!(name: "next" => |_, args, _| {
                let this = receiver(&args, "Iterator.next")?;
                let obj = this
                    .as_object()
                    .ok_or_else(|| anyhow!("Iterator.next on a non-object"))?;

                let mut obj = obj.write();
                match &mut obj.payload {
                    Some(HostValue::Iter { items, pos }) => {
                        let item = items
                            .get(*pos)
                            .cloned()
                            .ok_or_else(|| anyhow!("Iterator.next past the end"))?;
                        *pos += 1;
                        Ok(Some(item))
                    }
                    _ => Err(anyhow!("Iterator.next on a non-iterator object")),
                }
            }),
        ]
    }
}
