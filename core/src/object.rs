use crate::schema::Schema;
use std::{
    any::{type_name, Any},
    fmt::Debug,
};

/// Boxed value travelling between parse functions, the pre-set hook and field setters.
pub type FieldValue = Box<dyn Any + Send>;

/// Runtime instance produced by deserialization.
///
/// Implemented for every [`Schema`] type, so a payload carrying a type hint can hand back a more
/// derived type than the one requested, to be recovered with [`downcast`](#method.downcast).
pub trait Object: Any + Send + Debug {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    fn type_name(&self) -> &'static str;
}

impl<T> Object for T
where
    T: Schema,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl dyn Object {
    pub fn is<T>(&self) -> bool
    where
        T: Any,
    {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Any,
    {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn downcast<T>(self: Box<Self>) -> Result<Box<T>, Box<dyn Object>>
    where
        T: Any,
    {
        if self.is::<T>() {
            let raw: *mut dyn Object = Box::into_raw(self);
            // SAFETY: concrete type was checked above.
            Ok(unsafe { Box::from_raw(raw as *mut T) })
        } else {
            Err(self)
        }
    }
}

/// Takes a concrete `T` out of a field value, looking through a boxed [`Object`] when the value
/// came from a type-hinted parse.
pub fn take_value<T>(value: FieldValue) -> Result<T, FieldValue>
where
    T: Any,
{
    let value = match value.downcast::<T>() {
        Ok(value) => return Ok(*value),
        Err(value) => value,
    };
    match value.downcast::<Box<dyn Object>>() {
        Ok(object) => match (*object).downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(object) => Err(Box::new(object) as FieldValue),
        },
        Err(value) => Err(value),
    }
}
