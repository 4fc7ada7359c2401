use super::{IntoMulti, Runtime, Varargs};
use crate::errors::RuntimeError;
use std::sync::Arc;

pub(crate) type NativeFn =
    dyn Fn(Varargs, &Arc<Runtime>) -> Result<Varargs, RuntimeError> + Send + Sync;

pub(crate) struct FunctionObj {
    pub(crate) body: Box<NativeFn>,
}

/// Shared handle to a callable host function.
#[derive(Clone)]
pub struct FunctionRef(pub(crate) Arc<FunctionObj>);

impl FunctionRef {
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn call<A: IntoMulti>(
        &self,
        args: A,
        rt: &Arc<Runtime>,
    ) -> Result<Varargs, RuntimeError> {
        let args = args.into_multi(rt)?;
        (self.0.body)(args, rt)
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FunctionRef {}

impl std::fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "function: {:#x}", self.id())
    }
}
