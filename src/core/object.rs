use crate::core::{Function, Value};
use crate::error::PromiseError;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

pub type JSObjectPtr = Rc<RefCell<JSObject>>;

#[derive(Clone, Debug)]
pub enum Property {
    Data(Value),
    /// Getter invoked on every read; it may fail.
    Accessor { getter: Function },
}

/// A property bag. Records handed to the resolution procedure are plain
/// objects unless they carry a callable `then`.
#[derive(Clone, Debug, Default)]
pub struct JSObject {
    properties: IndexMap<String, Property>,
}

impl JSObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_ptr(self) -> JSObjectPtr {
        Rc::new(RefCell::new(self))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), Property::Data(value.into()));
    }

    pub fn define_getter(&mut self, key: impl Into<String>, getter: Function) {
        self.properties.insert(key.into(), Property::Accessor { getter });
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Data properties in insertion order; accessors are skipped.
    pub fn data_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().filter_map(|(key, prop)| match prop {
            Property::Data(v) => Some((key.as_str(), v)),
            Property::Accessor { .. } => None,
        })
    }
}

/// Read a property, running its getter if it is an accessor. The object is
/// not borrowed while the getter runs, so getters may touch the object.
pub fn get_property(obj: &JSObjectPtr, key: &str) -> Result<Value, PromiseError> {
    let prop = obj.borrow().property(key).cloned();
    match prop {
        None => Ok(Value::Undefined),
        Some(Property::Data(v)) => Ok(v),
        Some(Property::Accessor { getter }) => getter.call(&[Value::Object(obj.clone())]),
    }
}

/// Build an object from `(key, value)` pairs.
pub fn new_object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> JSObjectPtr
where
    K: Into<String>,
    V: Into<Value>,
{
    let mut obj = JSObject::new();
    for (k, v) in entries {
        obj.set(k, v);
    }
    obj.into_ptr()
}
