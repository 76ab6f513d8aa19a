use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;
use parking_lot::RwLock;

pub mod registers;
pub mod statics;

pub type WrappedInstance = Rc<RwLock<Instance>>;
pub type WrappedArray = Rc<RwLock<Array>>;

/// Host-side state a mock attaches to an instance. The interpreter proper
/// never looks inside; hooks do.
#[derive(Debug, Clone, EnumAsInner)]
pub enum HostValue {
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Iter { items: Vec<Value>, pos: usize },
    Bool(bool),
    Int(i32),
    Long(i64),
}

/// An object instance. Fields appear on first assignment; `payload` carries
/// whatever host representation a mock wants to hang off the object (the
/// concrete string of a `java/lang/String`, the backing buffer of a
/// `StringBuilder`, ...).
#[derive(Debug)]
pub struct Instance {
    pub class: String,
    pub fields: HashMap<String, Value>,
    pub payload: Option<HostValue>,
}

impl Instance {
    pub fn new(class: impl Into<String>) -> WrappedInstance {
        Rc::new(RwLock::new(Instance {
            class: class.into(),
            fields: HashMap::new(),
            payload: None,
        }))
    }

    pub fn with_payload(class: impl Into<String>, payload: HostValue) -> WrappedInstance {
        Rc::new(RwLock::new(Instance {
            class: class.into(),
            fields: HashMap::new(),
            payload: Some(payload),
        }))
    }

    /// A boxed `java/lang/String` carrying `s` as its host value.
    pub fn string(s: impl Into<String>) -> Value {
        Value::Object(Instance::with_payload(
            "Ljava/lang/String;",
            HostValue::Str(s.into()),
        ))
    }
}

/// A typed array. `ty` is the element descriptor (`I`, `B`, `Ljava/...;`).
#[derive(Debug)]
pub struct Array {
    pub ty: String,
    pub values: Vec<Value>,
}

impl Array {
    pub fn new(ty: impl Into<String>, len: usize) -> WrappedArray {
        let ty = ty.into();
        let default = Array::element_default(&ty);
        Rc::new(RwLock::new(Array {
            ty,
            values: vec![default; len],
        }))
    }

    pub fn with_values(ty: impl Into<String>, values: Vec<Value>) -> WrappedArray {
        Rc::new(RwLock::new(Array {
            ty: ty.into(),
            values,
        }))
    }

    /// Arrays come back zeroed, with the zero shaped by the element type.
    pub fn element_default(ty: &str) -> Value {
        match ty.chars().next() {
            Some('J') => Value::Long(0),
            Some('F') => Value::Float(0.0),
            Some('D') => Value::Double(0.0),
            Some('Z') => Value::Boolean(false),
            Some('C') => Value::Char(0),
            Some('L') | Some('[') => Value::Null,
            _ => Value::Int(0),
        }
    }

    /// Convenience for mocks: a `[B` from host bytes.
    pub fn from_bytes(bytes: &[u8]) -> Value {
        Value::Array(Array::with_values(
            "B",
            bytes.iter().map(|b| Value::Int(*b as i8 as i32)).collect(),
        ))
    }

    /// The reverse direction: collect a `[B` back into host bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.values
            .iter()
            .map(|v| v.int().map(|i| i as u8))
            .collect()
    }
}

/// Everything a register or field can hold.
///
/// Registers are untyped in Dalvik; the opcode decides how bits are read.
/// The accessors below implement exactly that: `float()` accepts an `Int`
/// register and reinterprets the bits, because `const/high16` followed by
/// `add-float` is how compilers load float literals.
#[derive(Debug, Clone, EnumAsInner)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Char(u16),
    Null,
    Object(WrappedInstance),
    Array(WrappedArray),
    Class(String),
    /// A trapped exception, surfaced by `move-exception`.
    Exception(String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Instance::string(s)
    }

    /// Read as a 32-bit integer register.
    pub fn int(&self) -> Result<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Boolean(b) => Ok(*b as i32),
            Value::Char(c) => Ok(*c as i32),
            Value::Float(f) => Ok(f.to_bits() as i32),
            v => Err(anyhow!("expected an int register, got {v}")),
        }
    }

    /// Read as a 64-bit integer register pair.
    pub fn long(&self) -> Result<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            Value::Double(d) => Ok(d.to_bits() as i64),
            v => Err(anyhow!("expected a long register, got {v}")),
        }
    }

    pub fn float(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(bits) => Ok(f32::from_bits(*bits as u32)),
            v => Err(anyhow!("expected a float register, got {v}")),
        }
    }

    pub fn double(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            Value::Long(bits) => Ok(f64::from_bits(*bits as u64)),
            v => Err(anyhow!("expected a double register, got {v}")),
        }
    }

    /// The comparison view `if-*z` takes: numeric value for numbers, zero
    /// for null, nonzero for any live reference.
    pub fn test_int(&self) -> Result<i32> {
        match self {
            Value::Null => Ok(0),
            Value::Object(_) | Value::Array(_) | Value::Class(_) | Value::Exception(_) => Ok(1),
            v => v.int(),
        }
    }

    /// Equality as `if-eq`/`if-ne` see it: numeric for numbers, identity
    /// for references.
    pub fn ref_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => match (a.int(), b.int()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }

    /// The host string inside a boxed `java/lang/String`, if this is one.
    pub fn host_string(&self) -> Option<String> {
        match self {
            Value::Object(obj) => match &obj.read().payload {
                Some(HostValue::Str(s)) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Is this a long or double, occupying a register pair.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// Identity hash in the `Object.hashCode` sense.
    pub fn identity_hash(&self) -> i32 {
        match self {
            Value::Object(data) => Rc::as_ptr(data) as *const () as i32,
            Value::Array(data) => Rc::as_ptr(data) as *const () as i32,
            Value::Int(v) => *v,
            Value::Long(v) => (*v ^ (*v >> 32)) as i32,
            _ => 0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Char(c) => match char::from_u32(*c as u32) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{c:04x}'"),
            },
            Value::Null => write!(f, "null"),
            Value::Object(obj) => {
                let obj = obj.read();
                match &obj.payload {
                    Some(HostValue::Str(s)) => write!(f, "\"{s}\""),
                    _ => write!(f, "{}@{:x}", obj.class, self.identity_hash()),
                }
            }
            Value::Array(arr) => {
                let arr = arr.read();
                write!(
                    f,
                    "[{}]",
                    arr.values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Class(desc) => write!(f, "class {desc}"),
            Value::Exception(msg) => write!(f, "exception: {msg}"),
        }
    }
}
