use crate::core::Value;
use crate::error::PromiseError;
use std::fmt;
use std::rc::Rc;

type NativeFn = dyn Fn(&[Value]) -> Result<Value, PromiseError>;

/// A callable value. Handlers passed to `then`, resolving functions handed
/// to executors, and `then` members of foreign thenables are all
/// `Function`s. Two functions are the same value only if they share the
/// same closure allocation.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, PromiseError> + 'static,
    {
        Function {
            name: Rc::from(name),
            call: Rc::new(f),
        }
    }

    /// A function of one argument; missing arguments read as `Undefined`.
    pub fn unary<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, PromiseError> + 'static,
    {
        Function::new("", move |args| f(first_arg(args)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, PromiseError> {
        (self.call)(args)
    }

    pub fn call1(&self, arg: Value) -> Result<Value, PromiseError> {
        (self.call)(std::slice::from_ref(&arg))
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

pub fn first_arg(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Undefined)
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}
