use crate::{error::Error, object::Object, registry::TypeFinder, schema::SchemaDescriptor};
use std::{collections::HashSet, sync::Arc};

pub const DEFAULT_TYPE_ATTR: &str = "__type";
/// Nested maps and lists allowed inside one payload.
pub const DEFAULT_MAX_DEPTH: usize = 128;

pub type RuntimeTypePolicy = Arc<dyn Fn(&SchemaDescriptor) -> bool + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&ErrorContext) + Send + Sync>;

/// How map keys are matched against accessor names.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PropertyConvention {
    /// Exact, case-sensitive match.
    #[default]
    Strict,
    /// Case-insensitive match ignoring `_` and `-`.
    Lenient,
}

/// Everything known about a field that failed to apply.
pub struct ErrorContext<'a> {
    pub instance: &'a dyn Object,
    pub declared_type: &'a str,
    pub field: &'a str,
    pub raw: &'a str,
    pub error: &'a Error,
}

/// Per-call configuration.
///
/// # Example
/// ```rust
/// use jsv_typeref::{Options, PropertyConvention};
///
/// let options = Options::default()
///     .with_property_convention(PropertyConvention::Lenient)
///     .with_throw_on_error(true)
///     .with_allowed_runtime_type("Zoo.Dog");
/// assert!(options.allowed_runtime_types.contains("Zoo.Dog"));
/// ```
#[derive(Clone)]
pub struct Options {
    pub type_attr: String,
    pub property_convention: PropertyConvention,
    pub throw_on_error: bool,
    pub allowed_runtime_types: HashSet<String>,
    pub allow_runtime_type: Option<RuntimeTypePolicy>,
    pub on_error: Option<ErrorHook>,
    pub type_finder: Option<Arc<dyn TypeFinder>>,
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            type_attr: DEFAULT_TYPE_ATTR.to_owned(),
            property_convention: Default::default(),
            throw_on_error: false,
            allowed_runtime_types: Default::default(),
            allow_runtime_type: None,
            on_error: None,
            type_finder: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("type_attr", &self.type_attr)
            .field("property_convention", &self.property_convention)
            .field("throw_on_error", &self.throw_on_error)
            .field("allowed_runtime_types", &self.allowed_runtime_types)
            .field("allow_runtime_type", &self.allow_runtime_type.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("type_finder", &self.type_finder.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Options {
    pub fn with_type_attr(mut self, type_attr: impl ToString) -> Self {
        self.type_attr = type_attr.to_string();
        self
    }

    pub fn with_property_convention(mut self, convention: PropertyConvention) -> Self {
        self.property_convention = convention;
        self
    }

    pub fn with_throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = throw_on_error;
        self
    }

    pub fn with_allowed_runtime_type(mut self, name: impl ToString) -> Self {
        self.allowed_runtime_types.insert(name.to_string());
        self
    }

    /// Replaces the default allow-list check.
    pub fn with_allow_runtime_type<F>(mut self, policy: F) -> Self
    where
        F: Fn(&SchemaDescriptor) -> bool + Send + Sync + 'static,
    {
        self.allow_runtime_type = Some(Arc::new(policy));
        self
    }

    pub fn with_on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ErrorContext) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn with_type_finder<F>(mut self, finder: F) -> Self
    where
        F: TypeFinder + 'static,
    {
        self.type_finder = Some(Arc::new(finder));
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn is_runtime_type_allowed(&self, descriptor: &SchemaDescriptor) -> bool {
        match &self.allow_runtime_type {
            Some(policy) => policy(descriptor),
            None => {
                descriptor.allows_runtime()
                    || self.allowed_runtime_types.contains(descriptor.name())
            }
        }
    }
}
