mod function;
mod object;
mod value;

pub use function::{Function, first_arg};
pub use object::{JSObject, JSObjectPtr, Property, get_property, new_object};
pub use value::{ErrorObject, Value, value_to_string};
