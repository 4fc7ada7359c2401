mod byte_string;
mod coroutine;
mod function;
mod metatable;
mod number;
#[allow(clippy::module_inception)]
mod runtime;
mod string_cache;
mod table;
mod table_ref;
mod userdata;
mod value;
mod varargs;

pub use byte_string::ByteString;
pub use coroutine::{ThreadRef, ThreadStatus};
pub use function::FunctionRef;
pub use number::{ddiv, dmod, dpow, parse_number, Number};
pub use runtime::Runtime;
pub use table_ref::TableRef;
pub use userdata::{HostData, UserdataRef};
pub use value::{FromValue, IntoValue, Value};
pub use varargs::{IntoMulti, Varargs};

pub(crate) use metatable::{default_policy, ArrayCell, MetatablePolicy, Slot, WeakPolicy};
pub(crate) use value::get_metavalue;
