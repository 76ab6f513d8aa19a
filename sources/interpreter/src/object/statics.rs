use std::collections::HashMap;

use super::Value;

/// Key of one static field, `(class descriptor, field name)`.
#[derive(Hash, PartialEq, Eq, Debug, Clone)]
pub struct StaticFieldRef {
    pub class: String,
    pub field: String,
}

impl StaticFieldRef {
    pub fn new(class: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            field: field.into(),
        }
    }
}

/// The static-field store of one emulation session. Shared by every frame
/// within the session so that `<clinit>` side effects are observed by later
/// invocations; reset between independent emulations is the caller's
/// contract.
#[derive(Debug, Default)]
pub struct StaticFields {
    fields: HashMap<StaticFieldRef, Value>,
}

impl StaticFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_field(&self, field: &StaticFieldRef) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    pub fn set_field(&mut self, field: StaticFieldRef, value: Value) -> Option<Value> {
        self.fields.insert(field, value)
    }

    pub fn has_field(&self, field: &StaticFieldRef) -> bool {
        self.fields.contains_key(field)
    }

    pub fn reset(&mut self) {
        self.fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_values_round_trip() {
        let mut statics = StaticFields::new();
        let key = StaticFieldRef::new("LT;", "sKey");

        statics.set_field(key.clone(), Value::Int(7));
        assert_eq!(statics.get_field(&key).unwrap().int().unwrap(), 7);
        assert!(statics.has_field(&key));
    }

    #[test]
    fn reset_clears_every_entry() {
        let mut statics = StaticFields::new();
        let a = StaticFieldRef::new("LT;", "a");
        let b = StaticFieldRef::new("LU;", "b");

        statics.set_field(a.clone(), Value::Int(1));
        statics.set_field(b.clone(), Value::Null);
        statics.reset();

        assert!(!statics.has_field(&a));
        assert!(!statics.has_field(&b));
    }
}
