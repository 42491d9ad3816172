pub mod de;
pub mod error;
pub mod object;
pub mod options;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod value;

#[cfg(test)]
mod tests;

pub use crate::{
    de::{
        typeref::JsvDeserializer,
        value::{from_text, from_text_bounded, from_value},
    },
    error::{Error, Result},
    object::{take_value, FieldValue, Object},
    options::{ErrorContext, Options, PropertyConvention, DEFAULT_MAX_DEPTH},
    registry::{TypeFinder, TypeRegistry},
    schema::{AccessorTable, FieldAccessor, Schema, SchemaBuilder, SchemaDescriptor, SchemaKind},
    value::Value,
};
#[cfg(feature = "derive")]
pub use jsv_typeref_derive::JsvSchema;

use std::any::type_name;

/// Deserializes `T` using the global registry and default options.
///
/// Fails with [`Error::UnexpectedType`] when a type hint produced a type other than `T`; use
/// [`from_str_dyn`] to accept derived types.
///
/// # Example
/// ```rust
/// use jsv_typeref::JsvSchema;
///
/// #[derive(Debug, Default, PartialEq, JsvSchema)]
/// #[jsv(name = "Shop.Item", rename_all = "PascalCase")]
/// struct Item {
///     title: String,
///     price: f32,
///     tags: Vec<String>,
/// }
///
/// let item = jsv_typeref::from_str::<Item>(r#"{Title:"Tea, green",Price:4.5,Tags:[hot,leaf]}"#)
///     .unwrap()
///     .unwrap();
/// assert_eq!(item.title, "Tea, green");
/// assert_eq!(item.price, 4.5);
/// assert_eq!(item.tags, vec!["hot".to_owned(), "leaf".to_owned()]);
/// ```
pub fn from_str<T>(text: &str) -> Result<Option<T>>
where
    T: Schema,
{
    from_str_with(text, TypeRegistry::global(), &Options::default())
}

pub fn from_str_with<T>(text: &str, registry: &TypeRegistry, options: &Options) -> Result<Option<T>>
where
    T: Schema,
{
    match from_str_dyn::<T>(text, registry, options)? {
        Some(object) => match object.downcast::<T>() {
            Ok(result) => Ok(Some(*result)),
            Err(object) => Err(Error::UnexpectedType(
                type_name::<T>().to_owned(),
                object.type_name().to_owned(),
            )),
        },
        None => Ok(None),
    }
}

/// Deserializes `T` or any registered type derived from it.
pub fn from_str_dyn<T>(
    text: &str,
    registry: &TypeRegistry,
    options: &Options,
) -> Result<Option<Box<dyn Object>>>
where
    T: Schema,
{
    let descriptor = registry.descriptor_of::<T>();
    JsvDeserializer::new(registry, options).deserialize(text, &descriptor)
}
