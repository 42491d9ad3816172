use crate::{
    de::value::ValueVisitor,
    error::*,
    options::DEFAULT_MAX_DEPTH,
    reader::{self, LIST_START, MAP_START},
};
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::collections::HashMap;

/// Untyped JSV data.
///
/// JSV carries no scalar types on the wire, so every scalar is kept as text and interpreted only
/// when deserialized into a concrete type.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd)]
pub enum Value {
    #[default]
    Null,
    String(String),
    /// (values: [value])
    Seq(Vec<Self>),
    /// (values: [(key, value)])
    Map(Vec<(String, Self)>),
}

impl Value {
    pub fn seq() -> Self {
        Self::Seq(vec![])
    }

    pub fn map() -> Self {
        Self::Map(vec![])
    }

    pub fn item<T>(mut self, value: T) -> Self
    where
        T: Into<Self>,
    {
        if let Self::Seq(v) = &mut self {
            v.push(value.into());
        }
        self
    }

    pub fn property<K, T>(mut self, key: K, value: T) -> Self
    where
        K: ToString,
        T: Into<Self>,
    {
        if let Self::Map(v) = &mut self {
            v.push((key.to_string(), value.into()));
        }
        self
    }

    /// Builds a value tree out of raw JSV text.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_bounded(text, DEFAULT_MAX_DEPTH)
    }

    /// Like [`Value::parse`], failing with [`Error::DepthLimitExceeded`] once maps and lists nest
    /// deeper than `max_depth`.
    pub fn parse_bounded(text: &str, max_depth: usize) -> Result<Self> {
        Self::parse_nested(text, max_depth, 0)
    }

    fn parse_nested(text: &str, max_depth: usize, depth: usize) -> Result<Self> {
        let bytes = text.as_bytes();
        match bytes.first() {
            None => Ok(Self::Null),
            Some(&MAP_START | &LIST_START) if depth >= max_depth => {
                Err(Error::DepthLimitExceeded(max_depth))
            }
            Some(&MAP_START) => Self::parse_map(text, max_depth, depth + 1),
            Some(&LIST_START) => Self::parse_seq(text, max_depth, depth + 1),
            Some(_) => Ok(Self::String(reader::parse_string(text).into_owned())),
        }
    }

    fn parse_map(text: &str, max_depth: usize, depth: usize) -> Result<Self> {
        if reader::is_empty_map(text) {
            return Ok(Self::map());
        }
        let mut result = vec![];
        let mut index = 1;
        while index < text.len() {
            let key = reader::eat_map_key(text, &mut index);
            reader::eat_map_key_separator(text, &mut index);
            let value = reader::eat_value(text, &mut index);
            reader::eat_item_separator_or_map_end(text, &mut index);
            if key.is_empty() && value.is_empty() {
                continue;
            }
            result.push((
                reader::parse_string(key).into_owned(),
                Self::parse_nested(value, max_depth, depth)?,
            ));
        }
        Ok(Self::Map(result))
    }

    fn parse_seq(text: &str, max_depth: usize, depth: usize) -> Result<Self> {
        let mut result = vec![];
        let mut index = 1;
        reader::eat_whitespace(text, &mut index);
        if text.as_bytes().get(index) == Some(&reader::LIST_END) {
            return Ok(Self::seq());
        }
        while index < text.len() {
            let item = reader::eat_list_item(text, &mut index);
            reader::eat_item_separator_or_map_end(text, &mut index);
            result.push(Self::parse_nested(item, max_depth, depth)?);
        }
        Ok(Self::Seq(result))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

macro_rules! impl_as_ref_value {
    ($method:ident, $type:ty, $variant:ident) => {
        pub fn $method(&self) -> Option<$type> {
            match self {
                Self::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

impl Value {
    impl_as_ref_value! {as_str, &str, String}
    impl_as_ref_value! {as_seq, &[Self], Seq}
    impl_as_ref_value! {as_map, &[(String, Self)], Map}
}

macro_rules! impl_from_display {
    ($( $type:ty ),+) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::String(v.to_string())
                }
            }
        )+
    };
}

impl_from_display!(bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Self>) -> Self {
        Self::Seq(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Self>) -> Self {
        Self::Map(v.into_iter().collect())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::String(v) => serializer.serialize_str(v),
            Self::Seq(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for item in v {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(v) => {
                let mut map = serializer.serialize_map(Some(v.len()))?;
                for (k, v) in v {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}
