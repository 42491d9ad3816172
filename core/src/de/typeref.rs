//! Rebuilds objects out of JSV maps, following `__type` hints to more derived types.
//!
//! A map is walked entry by entry. The type hint entry may swap the instance under construction
//! for one of a registered, assignable and allowed type, after which the derived type's accessor
//! table governs every later entry. Every other entry is applied to the instance through its field
//! accessor, under the error policy carried by [`Options`].

use crate::{
    error::*,
    object::{FieldValue, Object},
    options::{ErrorContext, Options},
    reader::{self, MAP_START},
    registry::{TypeFinder, TypeRegistry},
    schema::{AccessorTable, SchemaDescriptor},
};
use std::{any::TypeId, sync::Arc};
use tracing::{debug, trace, warn};

/// Deserialization session: a registry to resolve types against and the options governing the
/// walk. Cheap to create and safe to share between threads.
#[derive(Debug, Clone, Copy)]
pub struct JsvDeserializer<'a> {
    registry: &'a TypeRegistry,
    options: &'a Options,
    depth: usize,
}

/// State of one map walk.
struct MapWalk<'s> {
    target: &'s SchemaDescriptor,
    derived: Option<Arc<SchemaDescriptor>>,
    table: Option<Arc<AccessorTable>>,
    instance: Option<Box<dyn Object>>,
}

impl<'s> MapWalk<'s> {
    fn governing(&self) -> &SchemaDescriptor {
        self.derived.as_deref().unwrap_or(self.target)
    }
}

impl<'a> JsvDeserializer<'a> {
    pub fn new(registry: &'a TypeRegistry, options: &'a Options) -> Self {
        Self {
            registry,
            options,
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn options(&self) -> &'a Options {
        self.options
    }

    /// Nesting levels still available to values parsed in this session.
    pub fn remaining_depth(&self) -> usize {
        self.options.max_depth.saturating_sub(self.depth)
    }

    fn descend(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..*self
        }
    }

    fn find_type(&self, name: &str) -> Option<Arc<SchemaDescriptor>> {
        match &self.options.type_finder {
            Some(finder) => finder.find(name),
            None => self.registry.find(name),
        }
    }

    /// Builds an instance of `schema` (or of a type derived from it) out of a JSV map.
    ///
    /// Returns `None` for empty text.
    pub fn deserialize(
        &self,
        text: &str,
        schema: &SchemaDescriptor,
    ) -> Result<Option<Box<dyn Object>>> {
        let text = text.trim_end();
        if text.is_empty() {
            return Ok(None);
        }
        if text.as_bytes()[0] != MAP_START {
            return Err(Error::MalformedPayload(
                schema.name().to_owned(),
                text.to_owned(),
            ));
        }
        if self.depth >= self.options.max_depth {
            return Err(Error::DepthLimitExceeded(self.options.max_depth));
        }
        if reader::is_empty_map(text) {
            return schema.create().map(Some);
        }

        let mut walk = MapWalk {
            target: schema,
            derived: None,
            table: self.registry.accessors(schema),
            instance: None,
        };
        let mut index = 1;
        while index < text.len() {
            let key = reader::eat_map_key(text, &mut index);
            reader::eat_map_key_separator(text, &mut index);
            let raw = reader::eat_value(text, &mut index);
            trace!(key, raw, "map entry");

            let possible_type_info = raw.len() > 1;
            let name = reader::parse_string(key);
            if possible_type_info && name.eq_ignore_ascii_case(&self.options.type_attr) {
                self.resolve_type_hint(&mut walk, raw)?;
            } else {
                self.apply_field(&mut walk, &name, raw)?;
            }

            reader::eat_item_separator_or_map_end(text, &mut index);
        }

        match walk.instance {
            Some(instance) => Ok(Some(instance)),
            None => walk.governing().create().map(Some),
        }
    }

    fn resolve_type_hint(&self, walk: &mut MapWalk, raw: &str) -> Result<()> {
        let type_name = reader::parse_string(raw);
        let candidate = match self.find_type(&type_name) {
            Some(candidate) if candidate.is_instantiable() => candidate,
            _ => {
                let error = Error::UnresolvableTypeHint(type_name.into_owned());
                warn!(%error, "ignoring type hint");
                return Ok(());
            }
        };
        if !self.registry.is_assignable(walk.target, &candidate) {
            let error = Error::IncompatibleTypeHint(
                candidate.name().to_owned(),
                walk.target.name().to_owned(),
            );
            warn!(%error, "ignoring type hint");
            return Ok(());
        }
        if !self.options.is_runtime_type_allowed(&candidate) {
            return Err(Error::ForbiddenType(candidate.name().to_owned()));
        }

        // a custom factory may produce some other type; it only has to fit the target
        let instance = candidate.create()?;
        let produced = instance.as_any().type_id();
        let derived = if produced == candidate.type_id() {
            candidate
        } else {
            match self.registry.get_by_id(produced) {
                Some(descriptor) if self.registry.is_assignable(walk.target, &descriptor) => {
                    descriptor
                }
                _ => {
                    debug!(
                        hint = candidate.name(),
                        produced = instance.type_name(),
                        "discarding instance not assignable to target"
                    );
                    return Ok(());
                }
            }
        };
        if derived.type_id() != walk.target.type_id() {
            if let Some(table) = self.registry.accessors(&derived) {
                debug!(
                    from = walk.target.name(),
                    to = derived.name(),
                    "switching accessor table"
                );
                walk.table = Some(table);
            }
        }
        walk.instance = Some(instance);
        walk.derived = Some(derived);
        Ok(())
    }

    /// Type carried inside a nested map value, e.g. `{__type:Zoo.Dog,Name:Rex}`, checked the same
    /// way as a type hint against the field's declared schema.
    fn embedded_type(
        &self,
        raw: &str,
        declared: TypeId,
        declared_type: &str,
    ) -> Result<Option<Arc<SchemaDescriptor>>> {
        let type_name = match reader::embedded_type_name(raw, &self.options.type_attr) {
            Some(type_name) => type_name,
            None => return Ok(None),
        };
        let descriptor = match self.find_type(&type_name) {
            Some(descriptor) if descriptor.is_instantiable() => descriptor,
            _ => {
                let error = Error::UnresolvableTypeHint(type_name.into_owned());
                warn!(%error, "ignoring embedded type");
                return Ok(None);
            }
        };
        if !descriptor.is_assignable_to_id(declared) {
            let error = Error::IncompatibleTypeHint(
                descriptor.name().to_owned(),
                declared_type.to_owned(),
            );
            warn!(%error, "ignoring embedded type");
            return Ok(None);
        }
        if !self.options.is_runtime_type_allowed(&descriptor) {
            return Err(Error::ForbiddenType(descriptor.name().to_owned()));
        }
        Ok(Some(descriptor))
    }

    fn apply_field(&self, walk: &mut MapWalk, name: &str, raw: &str) -> Result<()> {
        if walk.instance.is_none() {
            walk.instance = Some(walk.governing().create()?);
        }
        let hook = walk.governing().on_before_set().cloned();
        let table = walk.table.clone();
        let instance = match walk.instance.as_deref_mut() {
            Some(instance) => instance,
            None => return Ok(()),
        };
        let accessor = table
            .as_deref()
            .and_then(|table| table.get(name, self.options.property_convention));

        let accessor = match accessor {
            Some(accessor) => accessor,
            None => {
                match hook {
                    Some(hook) => {
                        hook(instance, name, Box::new(raw.to_owned()) as FieldValue);
                    }
                    None => trace!(field = name, "dropping unknown field"),
                }
                return Ok(());
            }
        };

        let commit = |instance: &mut dyn Object, value: FieldValue| -> Result<()> {
            let value = match &hook {
                Some(hook) => hook(instance, name, value),
                None => value,
            };
            (accessor.set())(instance, value)
        };

        let inner = self.descend();
        if let Some(declared) = accessor.declared_schema_id() {
            if let Some(embedded) = self.embedded_type(raw, declared, accessor.declared_type())? {
                let result = inner
                    .deserialize(raw, &embedded)
                    .and_then(|object| {
                        object.ok_or_else(|| Error::CannotParse(raw.to_owned()))
                    })
                    .and_then(|object| commit(instance, Box::new(object) as FieldValue));
                match result {
                    Ok(()) => return Ok(()),
                    Err(error) => self.field_failure(instance, embedded.name(), name, raw, error)?,
                }
            }
        }

        if let Some(parse) = accessor.parse() {
            let result = parse(&inner, raw).and_then(|value| commit(instance, value));
            if let Err(error) = result {
                self.field_failure(instance, accessor.declared_type(), name, raw, error)?;
            }
        } else if let Some(raw_get) = accessor.raw_get() {
            let result = raw_get(&inner, raw).and_then(|value| commit(instance, value));
            if let Err(error) = result {
                self.field_failure(instance, accessor.declared_type(), name, raw, error)?;
            }
        }
        Ok(())
    }

    fn field_failure(
        &self,
        instance: &dyn Object,
        declared_type: &str,
        field: &str,
        raw: &str,
        error: Error,
    ) -> Result<()> {
        if error.is_fatal() {
            return Err(error);
        }
        if let Some(on_error) = &self.options.on_error {
            on_error(&ErrorContext {
                instance,
                declared_type,
                field,
                raw,
                error: &error,
            });
        }
        if self.options.throw_on_error {
            return Err(Error::FieldApply(
                field.to_owned(),
                raw.to_owned(),
                declared_type.to_owned(),
                Box::new(error),
            ));
        }
        warn!(field, raw, declared_type, %error, "failed to set property");
        Ok(())
    }
}
