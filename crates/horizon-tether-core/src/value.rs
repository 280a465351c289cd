//! Type-erased property values.
//!
//! Properties are read and written by name through [`PropertyHost`], so their
//! values travel as [`Value`]. Scalars compare by value; objects compare by
//! identity, which is what binding resolution relies on when it checks whether
//! a chain segment still points at the same host.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{PropertyError, PropertyResult};
use crate::host::PropertyHost;

/// Shared reference to a property host.
pub type ObjectRef = Arc<dyn PropertyHost>;

/// Returns `true` if both references point at the same host object.
pub fn same_host(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Stable address of a host, usable as a map key while the host is alive.
pub fn host_addr(host: &dyn PropertyHost) -> usize {
    (host as *const dyn PropertyHost).cast::<()>() as usize
}

/// A dynamically typed property value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value. Also what an absent object reference reads as.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    String(String),
    /// A reference to another property host.
    Object(ObjectRef),
}

impl Value {
    /// Wrap a concrete host.
    pub fn object<T: PropertyHost>(host: Arc<T>) -> Self {
        Self::Object(host)
    }

    /// Short name of the variant, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Object(_) => "object",
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric payload as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The object payload, if any.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Downcast the object payload to a concrete host type.
    pub fn downcast_object<T: PropertyHost>(&self) -> Option<Arc<T>> {
        let host = self.as_object()?.clone();
        host.into_any().downcast::<T>().ok()
    }

    /// Convert into a concrete type.
    pub fn into_typed<T: FromValue>(self) -> PropertyResult<T> {
        T::from_value(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_host(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::Object(o) => write!(f, "Object({}@{:#x})", o.type_name(), host_addr(o.as_ref())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Object(o) => write!(f, "<{}>", o.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_into_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::Int(i64::from(value))
            }
        })*
    };
}

int_into_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl<T: PropertyHost> From<Arc<T>> for Value {
    fn from(value: Arc<T>) -> Self {
        Self::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Conversion into an [`ObjectRef`], so APIs can accept `Arc<MyHost>` and
/// `ObjectRef` alike.
pub trait IntoObjectRef {
    /// Upcast to a shared host reference.
    fn into_object_ref(self) -> ObjectRef;
}

impl IntoObjectRef for ObjectRef {
    fn into_object_ref(self) -> ObjectRef {
        self
    }
}

impl<T: PropertyHost> IntoObjectRef for Arc<T> {
    fn into_object_ref(self) -> ObjectRef {
        self
    }
}

impl<T: PropertyHost> IntoObjectRef for &Arc<T> {
    fn into_object_ref(self) -> ObjectRef {
        self.clone()
    }
}

impl IntoObjectRef for &ObjectRef {
    fn into_object_ref(self) -> ObjectRef {
        self.clone()
    }
}

/// Conversion out of a [`Value`], used by generated property setters.
pub trait FromValue: Sized {
    /// Convert `value`, failing with [`PropertyError::TypeMismatch`].
    fn from_value(value: Value) -> PropertyResult<Self>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> PropertyResult<T> {
    Err(PropertyError::TypeMismatch {
        expected,
        got: value.type_name(),
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> PropertyResult<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> PropertyResult<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
}

macro_rules! int_from_value {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            fn from_value(value: Value) -> PropertyResult<Self> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).or_else(|_| mismatch(stringify!($ty), &Value::Int(i))),
                    other => mismatch(stringify!($ty), &other),
                }
            }
        })*
    };
}

int_from_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> PropertyResult<Self> {
        match value.as_float() {
            Some(f) => Ok(f),
            None => mismatch("f64", &value),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> PropertyResult<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> PropertyResult<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: Value) -> PropertyResult<Self> {
        match value {
            Value::Object(o) => Ok(o),
            other => mismatch("object", &other),
        }
    }
}

impl<T: PropertyHost> FromValue for Arc<T> {
    fn from_value(value: Value) -> PropertyResult<Self> {
        match value.downcast_object::<T>() {
            Some(host) => Ok(host),
            None => mismatch(std::any::type_name::<T>(), &value),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> PropertyResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Upcast an `Arc` to `Arc<dyn Any>` so hosts can be downcast.
///
/// Implemented for every `Send + Sync + 'static` type; hosts get it for free.
pub trait HostAny: Any + Send + Sync {
    /// Convert into a type-erased `Arc`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> HostAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
