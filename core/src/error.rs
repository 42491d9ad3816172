use std::fmt::Display;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub enum Error {
    Message(String),
    CannotParse(String),
    ExpectedMapEntry,
    ExpectedUnitVariant,
    ExpectedNewTypeVariant,
    ExpectedTupleVariant,
    ExpectedStructVariant,
    /// (expected type, offending text)
    MalformedPayload(String, String),
    /// (type hint text)
    UnresolvableTypeHint(String),
    /// (type hint text, target type)
    IncompatibleTypeHint(String, String),
    /// (resolved type name)
    ForbiddenType(String),
    /// (type name)
    NotInstantiable(String),
    /// (field name, declared type)
    UnsupportedOperation(String, String),
    /// (field name, raw text, expected type, cause)
    FieldApply(String, String, String, Box<Error>),
    /// (requested type, produced type)
    UnexpectedType(String, String),
    /// (maximum nesting depth)
    DepthLimitExceeded(usize),
}

impl Error {
    /// Field errors that escape a deserialization call whatever the error policy says. Anything
    /// else raised while applying a field goes through the policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::ForbiddenType(_) | Error::UnsupportedOperation(..) => true,
            Error::FieldApply(_, _, _, cause) => cause.is_fatal(),
            _ => false,
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Message(msg) => formatter.write_str(msg),
            Error::CannotParse(text) => write!(formatter, "cannot parse: {:?}", text),
            Error::ExpectedMapEntry => formatter.write_str("expected map entry"),
            Error::ExpectedUnitVariant => formatter.write_str("expected unit variant"),
            Error::ExpectedNewTypeVariant => formatter.write_str("expected newtype variant"),
            Error::ExpectedTupleVariant => formatter.write_str("expected tuple variant"),
            Error::ExpectedStructVariant => formatter.write_str("expected struct variant"),
            Error::MalformedPayload(expected, text) => write!(
                formatter,
                "type definitions should start with a '{{', expecting serialized type '{}', got string starting with: {}",
                expected,
                text.chars().take(50).collect::<String>()
            ),
            Error::UnresolvableTypeHint(hint) => write!(formatter, "could not find type: {}", hint),
            Error::IncompatibleTypeHint(hint, target) => {
                write!(formatter, "could not assign type: {} to: {}", hint, target)
            }
            Error::ForbiddenType(name) => write!(
                formatter,
                "{} is not an allowed runtime type; register it with `allow_runtime()` or add it to the allowed runtime types",
                name
            ),
            Error::NotInstantiable(name) => {
                write!(formatter, "type {} has no factory and cannot be instantiated", name)
            }
            Error::UnsupportedOperation(field, declared) => write!(
                formatter,
                "field {} of type {} does not support assignment",
                field, declared
            ),
            Error::FieldApply(field, raw, expected, cause) => write!(
                formatter,
                "failed to set property '{}' with '{}' as {}: {}",
                field, raw, expected, cause
            ),
            Error::UnexpectedType(requested, produced) => write!(
                formatter,
                "expected instance of {} but payload produced {}",
                requested, produced
            ),
            Error::DepthLimitExceeded(limit) => {
                write!(formatter, "nesting deeper than {} levels", limit)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FieldApply(_, _, _, cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}
