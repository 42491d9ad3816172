use crate::schema::{AccessorTable, Schema, SchemaDescriptor};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, RwLock},
};

lazy_static::lazy_static! {
    static ref GLOBAL: TypeRegistry = Default::default();
}

/// Name to type lookup used to resolve type hints.
pub trait TypeFinder: Send + Sync {
    fn find(&self, name: &str) -> Option<Arc<SchemaDescriptor>>;
}

impl<F> TypeFinder for F
where
    F: Fn(&str) -> Option<Arc<SchemaDescriptor>> + Send + Sync,
{
    fn find(&self, name: &str) -> Option<Arc<SchemaDescriptor>> {
        self(name)
    }
}

#[derive(Default)]
struct Types {
    by_id: HashMap<TypeId, Arc<SchemaDescriptor>>,
    by_name: HashMap<String, TypeId>,
    by_lowercase_name: HashMap<String, TypeId>,
    /// `None` marks a short name shared by more than one type.
    by_short_name: HashMap<String, Option<TypeId>>,
}

fn short_name(name: &str) -> &str {
    let name = name.rsplit("::").next().unwrap_or(name);
    name.rsplit('.').next().unwrap_or(name)
}

impl Types {
    fn insert(&mut self, descriptor: Arc<SchemaDescriptor>) {
        let type_id = descriptor.type_id();
        let name = descriptor.name().to_owned();
        self.by_lowercase_name
            .entry(name.to_lowercase())
            .or_insert(type_id);
        self.by_short_name
            .entry(short_name(&name).to_lowercase())
            .and_modify(|found| {
                if *found != Some(type_id) {
                    *found = None;
                }
            })
            .or_insert(Some(type_id));
        self.by_name.insert(name, type_id);
        self.by_id.insert(type_id, descriptor);
    }

    fn rebuild_names(&mut self) {
        let descriptors = self.by_id.drain().map(|(_, d)| d).collect::<Vec<_>>();
        *self = Default::default();
        for descriptor in descriptors {
            self.insert(descriptor);
        }
    }

    fn find(&self, name: &str) -> Option<Arc<SchemaDescriptor>> {
        let type_id = self
            .by_name
            .get(name)
            .or_else(|| self.by_lowercase_name.get(&name.to_lowercase()))
            .copied()
            .or_else(|| {
                self.by_short_name
                    .get(&short_name(name).to_lowercase())
                    .copied()
                    .flatten()
            })?;
        self.by_id.get(&type_id).cloned()
    }
}

/// Closed table of types that type hints may name, plus the accessor table cache.
///
/// Registration is expected to happen up front; lookups and table building are safe from any
/// number of threads.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<Types>,
    accessors: RwLock<HashMap<TypeId, Option<Arc<AccessorTable>>>>,
}

impl TypeRegistry {
    /// Process-wide registry used by [`from_str`](crate::from_str).
    pub fn global() -> &'static Self {
        &*GLOBAL
    }

    /// Registers `T` along with every schema it depends on. Registering twice is a no-op.
    pub fn register<T>(&self) -> Arc<SchemaDescriptor>
    where
        T: Schema,
    {
        if let Some(descriptor) = self.get::<T>() {
            return descriptor;
        }
        self.register_descriptor(SchemaDescriptor::of::<T>())
    }

    pub fn register_descriptor(&self, descriptor: SchemaDescriptor) -> Arc<SchemaDescriptor> {
        let descriptor = Arc::new(descriptor);
        let published = match self.types.write() {
            Ok(mut types) => match types.by_id.get(&descriptor.type_id()) {
                Some(found) => return found.clone(),
                None => {
                    types.insert(descriptor.clone());
                    descriptor
                }
            },
            Err(_) => return descriptor,
        };
        // lock released; dependencies may register further types
        for dependency in published.dependencies() {
            dependency(self);
        }
        published
    }

    pub fn unregister<T>(&self)
    where
        T: Schema,
    {
        let type_id = TypeId::of::<T>();
        if let Ok(mut types) = self.types.write() {
            if types.by_id.remove(&type_id).is_some() {
                types.rebuild_names();
            }
        }
        if let Ok(mut accessors) = self.accessors.write() {
            accessors.remove(&type_id);
        }
    }

    pub fn unregister_all(&self) {
        if let Ok(mut types) = self.types.write() {
            *types = Default::default();
        }
        if let Ok(mut accessors) = self.accessors.write() {
            accessors.clear();
        }
    }

    pub fn is_registered<T>(&self) -> bool
    where
        T: Schema,
    {
        self.get_by_id(TypeId::of::<T>()).is_some()
    }

    pub fn get<T>(&self) -> Option<Arc<SchemaDescriptor>>
    where
        T: Schema,
    {
        self.get_by_id(TypeId::of::<T>())
    }

    pub fn get_by_id(&self, type_id: TypeId) -> Option<Arc<SchemaDescriptor>> {
        self.types.read().ok()?.by_id.get(&type_id).cloned()
    }

    /// Registered descriptor of `T`, or a fresh unpublished one.
    pub fn descriptor_of<T>(&self) -> Arc<SchemaDescriptor>
    where
        T: Schema,
    {
        self.get::<T>()
            .unwrap_or_else(|| Arc::new(SchemaDescriptor::of::<T>()))
    }

    pub fn len(&self) -> usize {
        self.types.read().map(|types| types.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_assignable(&self, target: &SchemaDescriptor, candidate: &SchemaDescriptor) -> bool {
        candidate.is_assignable_to(target)
    }

    /// Accessor table of `descriptor`, built on first use and shared afterwards.
    pub fn accessors(&self, descriptor: &SchemaDescriptor) -> Option<Arc<AccessorTable>> {
        let type_id = descriptor.type_id();
        if let Ok(accessors) = self.accessors.read() {
            if let Some(table) = accessors.get(&type_id) {
                return table.clone();
            }
        }
        let table = descriptor.introspect().map(Arc::new);
        match self.accessors.write() {
            Ok(mut accessors) => accessors.entry(type_id).or_insert(table).clone(),
            Err(_) => table,
        }
    }
}

impl TypeFinder for TypeRegistry {
    fn find(&self, name: &str) -> Option<Arc<SchemaDescriptor>> {
        self.types.read().ok()?.find(name)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .types
            .read()
            .map(|types| types.by_name.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
