use super::{
    parse_number, ByteString, FunctionRef, Number, Runtime, TableRef, ThreadRef, UserdataRef,
};
use crate::errors::RuntimeError;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i32),
    Double(f64),
    String(ByteString),
    Table(TableRef),
    Function(FunctionRef),
    Userdata(UserdataRef),
    Thread(ThreadRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
            Value::Thread(_) => "thread",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Double(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Numeric view without string coercion.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Integer(i) => Some(Number::Integer(*i)),
            Value::Double(d) => Some(Number::Double(*d)),
            _ => None,
        }
    }

    /// Numeric view with string coercion, as used by the arithmetic
    /// operations.
    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::String(s) => parse_number(&s.to_string_lossy()),
            _ => self.as_number(),
        }
    }

    pub fn to_integer(&self) -> Option<i32> {
        self.to_number().map(Number::to_i32)
    }

    pub fn to_double(&self) -> Option<f64> {
        self.to_number().map(Number::to_f64)
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Primitive equality: numeric comparison across the tower, strings by
    /// bytes, reference types by identity. No metamethods.
    pub fn raw_equals(&self, other: &Value) -> bool {
        self == other
    }

    pub fn add(&self, rhs: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        self.arith(rhs, ArithOp::Add, rt)
    }

    pub fn sub(&self, rhs: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        self.arith(rhs, ArithOp::Sub, rt)
    }

    pub fn mul(&self, rhs: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        self.arith(rhs, ArithOp::Mul, rt)
    }

    pub fn div(&self, rhs: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        self.arith(rhs, ArithOp::Div, rt)
    }

    pub fn modulo(&self, rhs: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        self.arith(rhs, ArithOp::Mod, rt)
    }

    pub fn pow(&self, rhs: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        self.arith(rhs, ArithOp::Pow, rt)
    }

    pub fn neg(&self, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        if let Some(number) = self.to_number() {
            return Ok(number.neg().into());
        }

        let tag = rt.tags().unm.clone();

        if let Some(Value::Function(function)) = get_metavalue(self, &tag) {
            let result = function.call((self.clone(), self.clone()), rt)?;
            return Ok(result.arg1());
        }

        Err(RuntimeError::InvalidArithmetic(self.type_name()))
    }

    fn arith(&self, rhs: &Value, op: ArithOp, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        if let (Some(l), Some(r)) = (self.to_number(), rhs.to_number()) {
            return Ok(op.apply(l, r).into());
        }

        let tags = rt.tags();
        let tag = match op {
            ArithOp::Add => tags.add.clone(),
            ArithOp::Sub => tags.sub.clone(),
            ArithOp::Mul => tags.mul.clone(),
            ArithOp::Div => tags.div.clone(),
            ArithOp::Mod => tags.modulo.clone(),
            ArithOp::Pow => tags.pow.clone(),
        };

        if let Some(result) = self.binary_metamethod(rhs, &tag, rt)? {
            return Ok(result);
        }

        let offender = if self.to_number().is_none() { self } else { rhs };
        Err(RuntimeError::InvalidArithmetic(offender.type_name()))
    }

    fn binary_metamethod(
        &self,
        rhs: &Value,
        tag: &ByteString,
        rt: &Arc<Runtime>,
    ) -> Result<Option<Value>, RuntimeError> {
        for operand in [self, rhs] {
            let Some(Value::Function(function)) = get_metavalue(operand, tag) else {
                continue;
            };

            let result = function.call((self.clone(), rhs.clone()), rt)?;
            return Ok(Some(result.arg1()));
        }

        Ok(None)
    }

    pub fn lt(&self, other: &Value, rt: &Arc<Runtime>) -> Result<bool, RuntimeError> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Ok(a.as_bytes() < b.as_bytes()),
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    return Ok(a.lt(b));
                }

                self.compare_metamethod(other, rt.tags().lt.clone(), rt)
            }
        }
    }

    pub fn lteq(&self, other: &Value, rt: &Arc<Runtime>) -> Result<bool, RuntimeError> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Ok(a.as_bytes() <= b.as_bytes()),
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    return Ok(a.lteq(b));
                }

                self.compare_metamethod(other, rt.tags().le.clone(), rt)
            }
        }
    }

    // Relational metamethods only apply when both operands resolve the tag to
    // the same handler; mismatched handlers make the pair incomparable.
    fn compare_metamethod(
        &self,
        other: &Value,
        tag: ByteString,
        rt: &Arc<Runtime>,
    ) -> Result<bool, RuntimeError> {
        let lhs_handler = get_metavalue(self, &tag);
        let rhs_handler = get_metavalue(other, &tag);

        if let (Some(Value::Function(function)), Some(rhs_handler)) = (&lhs_handler, &rhs_handler)
        {
            if rhs_handler.raw_equals(&Value::Function(function.clone())) {
                let result = function.call((self.clone(), other.clone()), rt)?;
                return Ok(result.arg1().is_truthy());
            }
        }

        Err(RuntimeError::InvalidCompare(
            self.type_name(),
            other.type_name(),
        ))
    }

    /// Equality with `__eq` dispatch. The metamethod only fires for two
    /// tables or two userdata that are not already raw-equal, and only when
    /// both sides agree on the handler.
    pub fn eq(&self, other: &Value, rt: &Arc<Runtime>) -> Result<bool, RuntimeError> {
        if self.raw_equals(other) {
            return Ok(true);
        }

        let same_category = matches!(
            (self, other),
            (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
        );

        if !same_category {
            return Ok(false);
        }

        let tag = rt.tags().eq.clone();
        let lhs_handler = get_metavalue(self, &tag);
        let rhs_handler = get_metavalue(other, &tag);

        if let (Some(Value::Function(function)), Some(rhs_handler)) = (&lhs_handler, &rhs_handler)
        {
            if rhs_handler.raw_equals(&Value::Function(function.clone())) {
                let result = function.call((self.clone(), other.clone()), rt)?;
                return Ok(result.arg1().is_truthy());
            }
        }

        Ok(false)
    }

    pub fn concat(&self, other: &Value, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        let concatable = |value: &Value| value.is_string() || value.is_number();

        if concatable(self) && concatable(other) {
            let mut bytes = Vec::new();

            for operand in [self, other] {
                match operand {
                    Value::String(s) => bytes.extend_from_slice(s.as_bytes()),
                    number => bytes.extend_from_slice(number.to_string().as_bytes()),
                }
            }

            return Ok(Value::String(rt.intern_string(&bytes)));
        }

        let tag = rt.tags().concat.clone();

        if let Some(result) = self.binary_metamethod(other, &tag, rt)? {
            return Ok(result);
        }

        let offender = if concatable(self) { other } else { self };
        Err(RuntimeError::InvalidConcat(offender.type_name()))
    }
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    fn apply(self, lhs: Number, rhs: Number) -> Number {
        match self {
            ArithOp::Add => lhs.add(rhs),
            ArithOp::Sub => lhs.sub(rhs),
            ArithOp::Mul => lhs.mul(rhs),
            ArithOp::Div => lhs.div(rhs),
            ArithOp::Mod => lhs.modulo(rhs),
            ArithOp::Pow => lhs.pow(rhs),
        }
    }
}

/// Raw metatable lookup for a tag method. Only tables and userdata carry
/// metatables here.
pub(crate) fn get_metavalue(value: &Value, tag: &ByteString) -> Option<Value> {
    let metatable = match value {
        Value::Table(table) => table.get_metatable()?,
        Value::Userdata(userdata) => userdata.get_metatable()?,
        _ => return None,
    };

    let result = metatable
        .raw_table_get(&Value::String(tag.clone()))
        .ok()?;

    (!result.is_nil()).then_some(result)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Integer(a), Value::Double(b)) | (Value::Double(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Userdata(a), Value::Userdata(b)) => a == b,
            (Value::Thread(a), Value::Thread(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{}", Number::Integer(*i)),
            Value::Double(d) => write!(f, "{}", Number::Double(*d)),
            Value::String(s) => write!(f, "{s}"),
            Value::Table(t) => write!(f, "table: {:#x}", t.id()),
            Value::Function(function) => write!(f, "function: {:#x}", function.id()),
            Value::Userdata(u) => write!(f, "userdata: {:#x}", u.id()),
            Value::Thread(t) => write!(f, "thread: {:#x}", t.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Number::from_i64(value).into()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Number::from_f64(value).into()
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        match value {
            Number::Integer(i) => Value::Integer(i),
            Number::Double(d) => Value::Double(d),
        }
    }
}

impl From<ByteString> for Value {
    fn from(value: ByteString) -> Self {
        Value::String(value)
    }
}

impl From<TableRef> for Value {
    fn from(value: TableRef) -> Self {
        Value::Table(value)
    }
}

impl From<FunctionRef> for Value {
    fn from(value: FunctionRef) -> Self {
        Value::Function(value)
    }
}

impl From<UserdataRef> for Value {
    fn from(value: UserdataRef) -> Self {
        Value::Userdata(value)
    }
}

impl From<ThreadRef> for Value {
    fn from(value: ThreadRef) -> Self {
        Value::Thread(value)
    }
}

pub trait IntoValue {
    fn into_value(self, rt: &Arc<Runtime>) -> Result<Value, RuntimeError>;
}

macro_rules! impl_into_value_from {
    ($($ty:ty),+) => {
        $(impl IntoValue for $ty {
            fn into_value(self, _rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
                Ok(self.into())
            }
        })+
    };
}

impl_into_value_from!(
    bool, i32, i64, f64, Number, ByteString, TableRef, FunctionRef, UserdataRef, ThreadRef
);

impl IntoValue for Value {
    fn into_value(self, _rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        Ok(self)
    }
}

impl IntoValue for &Value {
    fn into_value(self, _rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        Ok(self.clone())
    }
}

impl IntoValue for &TableRef {
    fn into_value(self, _rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        Ok(Value::Table(self.clone()))
    }
}

impl IntoValue for &str {
    fn into_value(self, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        Ok(Value::String(rt.intern_string(self.as_bytes())))
    }
}

impl IntoValue for String {
    fn into_value(self, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        Ok(Value::String(rt.intern_string(self.as_bytes())))
    }
}

impl IntoValue for &[u8] {
    fn into_value(self, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        Ok(Value::String(rt.intern_string(self)))
    }
}

pub trait FromValue: Sized {
    fn from_value(value: Value, rt: &Arc<Runtime>) -> Result<Self, RuntimeError>;
}

impl FromValue for Value {
    fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value, rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_value(value, rt).map(Some)
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        Ok(value.is_truthy())
    }
}

impl FromValue for i32 {
    fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        value.to_integer().ok_or(RuntimeError::ConversionFailed {
            from: value.type_name(),
            to: "integer",
        })
    }
}

impl FromValue for i64 {
    fn from_value(value: Value, rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        i32::from_value(value, rt).map(i64::from)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        value.to_double().ok_or(RuntimeError::ConversionFailed {
            from: value.type_name(),
            to: "number",
        })
    }
}

impl FromValue for String {
    fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        match &value {
            Value::String(s) => Ok(s.to_string_lossy().into_owned()),
            Value::Integer(_) | Value::Double(_) => Ok(value.to_string()),
            _ => Err(RuntimeError::ConversionFailed {
                from: value.type_name(),
                to: "string",
            }),
        }
    }
}

impl FromValue for ByteString {
    fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(RuntimeError::ConversionFailed {
                from: other.type_name(),
                to: "string",
            }),
        }
    }
}

macro_rules! impl_from_value_ref {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromValue for $ty {
            fn from_value(value: Value, _rt: &Arc<Runtime>) -> Result<Self, RuntimeError> {
                match value {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(RuntimeError::ConversionFailed {
                        from: other.type_name(),
                        to: $name,
                    }),
                }
            }
        }
    };
}

impl_from_value_ref!(TableRef, Table, "table");
impl_from_value_ref!(FunctionRef, Function, "function");
impl_from_value_ref!(UserdataRef, Userdata, "userdata");
impl_from_value_ref!(ThreadRef, Thread, "thread");
