use crate::{
    de::{typeref::JsvDeserializer, value::from_text_bounded},
    error::*,
    object::{take_value, FieldValue, Object},
    options::PropertyConvention,
    registry::TypeRegistry,
    value::Value,
};
use serde::de::DeserializeOwned;
use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt::Debug,
    marker::PhantomData,
    sync::Arc,
};

pub type ParseFn = Arc<dyn Fn(&JsvDeserializer<'_>, &str) -> Result<FieldValue> + Send + Sync>;
pub type RawGetFn = Arc<dyn Fn(&JsvDeserializer<'_>, &str) -> Result<FieldValue> + Send + Sync>;
pub type SetFn = Arc<dyn Fn(&mut dyn Object, FieldValue) -> Result<()> + Send + Sync>;
pub type BeforeSetFn = Arc<dyn Fn(&mut dyn Object, &str, FieldValue) -> FieldValue + Send + Sync>;

/// Type that can be rebuilt from a JSV map.
/// Prefer to implement using `JsvSchema` derive macro.
///
/// # Example
/// ```rust
/// use jsv_typeref::{Schema, SchemaBuilder};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Person {
///     name: String,
///     age: u32,
/// }
///
/// impl Schema for Person {
///     fn schema() -> SchemaBuilder<Self> {
///         SchemaBuilder::new("People.Person")
///             .field("Name", |this: &mut Self| &mut this.name)
///             .field("Age", |this: &mut Self| &mut this.age)
///     }
/// }
///
/// let person = jsv_typeref::from_str::<Person>("{Name:Alice,Age:42}").unwrap().unwrap();
/// assert_eq!(person, Person { name: "Alice".to_owned(), age: 42 });
/// ```
pub trait Schema: Any + Send + Debug + Default {
    fn schema() -> SchemaBuilder<Self>;
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    #[default]
    Concrete,
    Abstract,
    Interface,
}

impl SchemaKind {
    pub fn is_instantiable(self) -> bool {
        self == Self::Concrete
    }
}

/// Strips case and separator characters, so `first_name`, `FirstName` and `first-name` all meet.
pub fn lenient_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Capabilities needed to parse and assign one field.
#[derive(Clone)]
pub struct FieldAccessor {
    name: String,
    declared_type: &'static str,
    declared_schema: Option<TypeId>,
    parse: Option<ParseFn>,
    raw_get: Option<RawGetFn>,
    set: SetFn,
}

impl FieldAccessor {
    pub fn new(name: impl ToString, declared_type: &'static str, set: SetFn) -> Self {
        Self {
            name: name.to_string(),
            declared_type,
            declared_schema: None,
            parse: None,
            raw_get: None,
            set,
        }
    }

    pub fn parse_with(mut self, parse: ParseFn) -> Self {
        self.parse = Some(parse);
        self
    }

    pub fn raw_get_with(mut self, raw_get: RawGetFn) -> Self {
        self.raw_get = Some(raw_get);
        self
    }

    pub fn declared_schema(mut self, type_id: TypeId) -> Self {
        self.declared_schema = Some(type_id);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &'static str {
        self.declared_type
    }

    pub fn declared_schema_id(&self) -> Option<TypeId> {
        self.declared_schema
    }

    pub fn parse(&self) -> Option<&ParseFn> {
        self.parse.as_ref()
    }

    pub fn raw_get(&self) -> Option<&RawGetFn> {
        self.raw_get.as_ref()
    }

    pub fn set(&self) -> &SetFn {
        &self.set
    }
}

impl Debug for FieldAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("parse", &self.parse.is_some())
            .field("raw_get", &self.raw_get.is_some())
            .finish()
    }
}

/// Name to accessor mapping of one schema, in declaration order.
#[derive(Debug, Default, Clone)]
pub struct AccessorTable {
    entries: Vec<FieldAccessor>,
    strict: HashMap<String, usize>,
    lenient: HashMap<String, usize>,
}

impl AccessorTable {
    /// Adds an accessor; an accessor with the same name is replaced in place.
    pub fn insert(&mut self, accessor: FieldAccessor) {
        if let Some(index) = self.strict.get(accessor.name()) {
            self.entries[*index] = accessor;
            return;
        }
        let index = self.entries.len();
        self.strict.insert(accessor.name().to_owned(), index);
        self.lenient
            .entry(lenient_name(accessor.name()))
            .or_insert(index);
        self.entries.push(accessor);
    }

    pub fn with(mut self, accessor: FieldAccessor) -> Self {
        self.insert(accessor);
        self
    }

    pub fn get(&self, name: &str, convention: PropertyConvention) -> Option<&FieldAccessor> {
        if let Some(index) = self.strict.get(name) {
            return self.entries.get(*index);
        }
        match convention {
            PropertyConvention::Strict => None,
            PropertyConvention::Lenient => self
                .lenient
                .get(&lenient_name(name))
                .and_then(|index| self.entries.get(*index)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldAccessor> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|accessor| accessor.name())
    }
}

/// Static description of a target type.
pub struct SchemaDescriptor {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    kind: SchemaKind,
    ancestors: Vec<TypeId>,
    allow_runtime: bool,
    factory: Option<fn() -> Box<dyn Object>>,
    introspect: fn() -> AccessorTable,
    on_before_set: Option<BeforeSetFn>,
    dependencies: Vec<fn(&TypeRegistry)>,
}

fn create<T>() -> Box<dyn Object>
where
    T: Schema,
{
    Box::new(T::default())
}

fn introspect<T>() -> AccessorTable
where
    T: Schema,
{
    T::schema().table
}

fn ancestors<T>() -> Vec<TypeId>
where
    T: Schema,
{
    T::schema().ancestors()
}

fn register_dependency<T>(registry: &TypeRegistry)
where
    T: Schema,
{
    registry.register::<T>();
}

impl SchemaDescriptor {
    pub fn of<T>() -> Self
    where
        T: Schema,
    {
        let builder = T::schema();
        let ancestors = builder.ancestors();
        let SchemaBuilder {
            name,
            kind,
            allow_runtime,
            on_before_set,
            dependencies,
            ..
        } = builder;
        Self {
            name,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind,
            ancestors,
            allow_runtime,
            factory: kind.is_instantiable().then_some(create::<T> as fn() -> Box<dyn Object>),
            introspect: introspect::<T>,
            on_before_set,
            dependencies,
        }
    }

    /// Replaces the zero-argument factory.
    pub fn with_factory(mut self, factory: fn() -> Box<dyn Object>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn allows_runtime(&self) -> bool {
        self.allow_runtime
    }

    pub fn on_before_set(&self) -> Option<&BeforeSetFn> {
        self.on_before_set.as_ref()
    }

    pub fn dependencies(&self) -> &[fn(&TypeRegistry)] {
        &self.dependencies
    }

    pub fn is_instantiable(&self) -> bool {
        self.kind.is_instantiable() && self.factory.is_some()
    }

    /// `true` when instances of `self` may stand where `target` is expected.
    pub fn is_assignable_to(&self, target: &SchemaDescriptor) -> bool {
        self.is_assignable_to_id(target.type_id)
    }

    pub fn is_assignable_to_id(&self, target: TypeId) -> bool {
        self.type_id == target || self.ancestors.contains(&target)
    }

    pub fn create(&self) -> Result<Box<dyn Object>> {
        match self.factory {
            Some(factory) => Ok(factory()),
            None => Err(Error::NotInstantiable(self.name.to_owned())),
        }
    }

    /// Builds the accessor table anew; `None` when the type has no fields.
    pub fn introspect(&self) -> Option<AccessorTable> {
        let table = (self.introspect)();
        if table.is_empty() {
            None
        } else {
            Some(table)
        }
    }
}

impl Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("allow_runtime", &self.allow_runtime)
            .finish()
    }
}

/// Declarative description of a [`Schema`] type.
pub struct SchemaBuilder<T> {
    name: String,
    kind: SchemaKind,
    bases: Vec<(TypeId, fn() -> Vec<TypeId>)>,
    allow_runtime: bool,
    table: AccessorTable,
    on_before_set: Option<BeforeSetFn>,
    dependencies: Vec<fn(&TypeRegistry)>,
    _phantom: PhantomData<fn() -> T>,
}

fn instance_mut<T>(object: &mut dyn Object) -> Result<&mut T>
where
    T: Schema,
{
    object
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| Error::Message(format!("expected instance of {}", type_name::<T>())))
}

fn wrong_value<T>() -> Error {
    Error::Message(format!("value is not of type {}", type_name::<T>()))
}

impl<T> SchemaBuilder<T>
where
    T: Schema,
{
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            kind: SchemaKind::Concrete,
            bases: vec![],
            allow_runtime: false,
            table: Default::default(),
            on_before_set: None,
            dependencies: vec![],
            _phantom: PhantomData,
        }
    }

    pub fn kind(mut self, kind: SchemaKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares that `T` may stand where `B` is expected.
    pub fn base<B>(mut self) -> Self
    where
        B: Schema,
    {
        self.bases.push((TypeId::of::<B>(), ancestors::<B>));
        self.dependencies.push(register_dependency::<B>);
        self
    }

    /// Lets a type hint instantiate `T` under the default runtime type policy.
    pub fn allow_runtime(mut self) -> Self {
        self.allow_runtime = true;
        self
    }

    pub fn accessor(mut self, accessor: FieldAccessor) -> Self {
        self.table.insert(accessor);
        self
    }

    /// Field parsed through its `serde::Deserialize` implementation.
    pub fn field<F>(self, name: impl ToString, project: fn(&mut T) -> &mut F) -> Self
    where
        F: DeserializeOwned + Send + 'static,
    {
        let parse: ParseFn = Arc::new(|de: &JsvDeserializer, text: &str| {
            Ok(Box::new(from_text_bounded::<F>(text, de.remaining_depth())?) as FieldValue)
        });
        let set: SetFn = Arc::new(move |object: &mut dyn Object, value: FieldValue| {
            let this = instance_mut::<T>(object)?;
            *project(this) = take_value::<F>(value).map_err(|_| wrong_value::<F>())?;
            Ok(())
        });
        self.accessor(FieldAccessor::new(name, type_name::<F>(), set).parse_with(parse))
    }

    /// Field holding another schema type, parsed as a nested map.
    pub fn nested<F>(mut self, name: impl ToString, project: fn(&mut T) -> &mut F) -> Self
    where
        F: Schema,
    {
        let parse: ParseFn = Arc::new(|de: &JsvDeserializer, text: &str| {
            let descriptor = de.registry().descriptor_of::<F>();
            Ok(match de.deserialize(text, &descriptor)? {
                Some(object) => Box::new(object) as FieldValue,
                None => Box::new(F::default()) as FieldValue,
            })
        });
        let set: SetFn = Arc::new(move |object: &mut dyn Object, value: FieldValue| {
            let this = instance_mut::<T>(object)?;
            *project(this) = take_value::<F>(value).map_err(|_| wrong_value::<F>())?;
            Ok(())
        });
        self.dependencies.push(register_dependency::<F>);
        self.accessor(
            FieldAccessor::new(name, type_name::<F>(), set)
                .parse_with(parse)
                .declared_schema(TypeId::of::<F>()),
        )
    }

    /// Field declared as base schema `B` that holds whichever assignable type the payload names.
    pub fn polymorphic<B>(
        mut self,
        name: impl ToString,
        project: fn(&mut T) -> &mut Option<Box<dyn Object>>,
    ) -> Self
    where
        B: Schema,
    {
        let parse: ParseFn = Arc::new(|de: &JsvDeserializer, text: &str| {
            let descriptor = de.registry().descriptor_of::<B>();
            Ok(Box::new(de.deserialize(text, &descriptor)?) as FieldValue)
        });
        let set: SetFn = Arc::new(move |object: &mut dyn Object, value: FieldValue| {
            let this = instance_mut::<T>(object)?;
            let value = match value.downcast::<Option<Box<dyn Object>>>() {
                Ok(value) => *value,
                Err(value) => Some(
                    *value
                        .downcast::<Box<dyn Object>>()
                        .map_err(|_| wrong_value::<Box<dyn Object>>())?,
                ),
            };
            *project(this) = value;
            Ok(())
        });
        self.dependencies.push(register_dependency::<B>);
        self.accessor(
            FieldAccessor::new(name, type_name::<B>(), set)
                .parse_with(parse)
                .declared_schema(TypeId::of::<B>()),
        )
    }

    /// Field kept as an untyped [`Value`] tree.
    pub fn dynamic(self, name: impl ToString, project: fn(&mut T) -> &mut Value) -> Self {
        let raw_get: RawGetFn = Arc::new(|de: &JsvDeserializer, text: &str| {
            Ok(Box::new(Value::parse_bounded(text, de.remaining_depth())?) as FieldValue)
        });
        let set: SetFn = Arc::new(move |object: &mut dyn Object, value: FieldValue| {
            let this = instance_mut::<T>(object)?;
            *project(this) = take_value::<Value>(value).map_err(|_| wrong_value::<Value>())?;
            Ok(())
        });
        self.accessor(FieldAccessor::new(name, type_name::<Value>(), set).raw_get_with(raw_get))
    }

    /// Computed member: known by name, but any attempt to assign it is refused.
    pub fn read_only(self, name: impl ToString) -> Self {
        let name = name.to_string();
        let field = name.to_owned();
        let raw_get: RawGetFn =
            Arc::new(|_: &JsvDeserializer, text: &str| Ok(Box::new(text.to_owned()) as FieldValue));
        let set: SetFn = Arc::new(move |_: &mut dyn Object, _: FieldValue| {
            Err(Error::UnsupportedOperation(
                field.to_owned(),
                type_name::<T>().to_owned(),
            ))
        });
        self.accessor(FieldAccessor::new(name, "read-only", set).raw_get_with(raw_get))
    }

    /// Pulls every field of an embedded schema `B` into this table.
    pub fn flatten<B>(mut self, project: fn(&mut T) -> &mut B) -> Self
    where
        B: Schema,
    {
        let inner = B::schema();
        self.dependencies.extend(inner.dependencies.iter().copied());
        for accessor in inner.table.entries {
            let inner_set = accessor.set.clone();
            let set: SetFn = Arc::new(move |object: &mut dyn Object, value: FieldValue| {
                let this = instance_mut::<T>(object)?;
                inner_set(project(this) as &mut dyn Object, value)
            });
            self.table.insert(FieldAccessor { set, ..accessor });
        }
        self
    }

    /// Hook invoked with every parsed value (and every unknown field's raw text) before it is
    /// assigned; whatever it returns is what gets assigned.
    pub fn on_before_set<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T, &str, FieldValue) -> FieldValue + Send + Sync + 'static,
    {
        self.on_before_set = Some(Arc::new(
            move |object: &mut dyn Object, name: &str, value: FieldValue| match object
                .as_any_mut()
                .downcast_mut::<T>()
            {
                Some(this) => hook(this, name, value),
                None => value,
            },
        ));
        self
    }

    pub fn table(&self) -> &AccessorTable {
        &self.table
    }

    fn ancestors(&self) -> Vec<TypeId> {
        let mut result = vec![];
        for (type_id, ancestors) in &self.bases {
            result.push(*type_id);
            result.extend(ancestors());
        }
        result
    }

    pub fn build(self) -> AccessorTable {
        self.table
    }
}
