use super::{IntoValue, Runtime, Value};
use crate::errors::RuntimeError;
use std::sync::Arc;

/// Multiple value carrier used for call arguments, call results and the
/// resume/yield handshake. Positions are 1-based; reading past the end
/// yields nil.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Varargs {
    values: Vec<Value>,
}

impl Varargs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn pack<T: IntoMulti>(values: T, rt: &Arc<Runtime>) -> Result<Varargs, RuntimeError> {
        values.into_multi(rt)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn arg1(&self) -> Value {
        self.values.first().cloned().unwrap_or_default()
    }

    pub fn arg(&self, position: usize) -> Value {
        position
            .checked_sub(1)
            .and_then(|index| self.values.get(index))
            .cloned()
            .unwrap_or_default()
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<Value> {
        self.values.iter()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

impl From<Value> for Varargs {
    fn from(value: Value) -> Self {
        Self {
            values: vec![value],
        }
    }
}

impl From<Vec<Value>> for Varargs {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl FromIterator<Value> for Varargs {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

pub trait IntoMulti {
    fn into_multi(self, rt: &Arc<Runtime>) -> Result<Varargs, RuntimeError>;
}

impl IntoMulti for Varargs {
    fn into_multi(self, _rt: &Arc<Runtime>) -> Result<Varargs, RuntimeError> {
        Ok(self)
    }
}

impl IntoMulti for () {
    fn into_multi(self, _rt: &Arc<Runtime>) -> Result<Varargs, RuntimeError> {
        Ok(Varargs::none())
    }
}

macro_rules! impl_into_multi_tuple {
    ($($name:ident),+) => {
        impl<$($name: IntoValue),+> IntoMulti for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_multi(self, rt: &Arc<Runtime>) -> Result<Varargs, RuntimeError> {
                let ($($name,)+) = self;
                Ok(Varargs {
                    values: vec![$($name.into_value(rt)?),+],
                })
            }
        }
    };
}

impl_into_multi_tuple!(A);
impl_into_multi_tuple!(A, B);
impl_into_multi_tuple!(A, B, C);
impl_into_multi_tuple!(A, B, C, D);
