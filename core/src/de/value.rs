use crate::{error::*, options::DEFAULT_MAX_DEPTH, value::Value};
use serde::{
    de::{
        DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
        VariantAccess, Visitor,
    },
    forward_to_deserialize_any, Deserialize,
};
use std::str::FromStr;

pub fn from_value<'a, T>(value: &'a Value) -> Result<T>
where
    T: Deserialize<'a>,
{
    T::deserialize(Deserializer::from_value(value))
}

/// Parses raw JSV text straight into any serde-deserializable type.
pub fn from_text<T>(text: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    from_text_bounded(text, DEFAULT_MAX_DEPTH)
}

/// Like [`from_text`] with an explicit nesting limit.
pub fn from_text_bounded<T>(text: &str, max_depth: usize) -> Result<T>
where
    T: DeserializeOwned,
{
    let value = Value::parse_bounded(text, max_depth)?;
    from_value(&value)
}

#[derive(Debug)]
pub struct Deserializer<'de> {
    input: &'de Value,
}

impl<'de> Deserializer<'de> {
    pub fn from_value(input: &'de Value) -> Self {
        Self { input }
    }

    fn text(&self) -> Option<&'de str> {
        match self.input {
            Value::String(v) => Some(v.as_str()),
            Value::Null => Some(""),
            _ => None,
        }
    }

    fn parse_text<T>(&self) -> Result<T>
    where
        T: FromStr,
    {
        match self.text() {
            Some(text) => text
                .trim()
                .parse()
                .map_err(|_| Error::CannotParse(text.to_owned())),
            None => Err(Error::Message(format!(
                "expected scalar text, got: {:?}",
                self.input
            ))),
        }
    }
}

macro_rules! impl_deserialize_parsed {
    ($method:ident, $visit:ident, $type:ty) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value>
        where
            V: Visitor<'de>,
        {
            visitor.$visit(self.parse_text::<$type>()?)
        }
    };
}

impl<'de> serde::de::Deserializer<'de> for Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Value::Null => visitor.visit_unit(),
            Value::String(v) => visitor.visit_borrowed_str(v),
            Value::Seq(v) => visitor.visit_seq(SeqDeserializer {
                values: v.as_slice(),
                index: 0,
            }),
            Value::Map(v) => visitor.visit_map(MapDeserializer {
                values: v.as_slice(),
                index: 0,
            }),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.text().map(str::trim) {
            Some(text) if text.eq_ignore_ascii_case("true") => visitor.visit_bool(true),
            Some(text) if text.eq_ignore_ascii_case("false") => visitor.visit_bool(false),
            Some(text) => Err(Error::CannotParse(text.to_owned())),
            None => self.deserialize_any(visitor),
        }
    }

    impl_deserialize_parsed!(deserialize_i8, visit_i8, i8);
    impl_deserialize_parsed!(deserialize_i16, visit_i16, i16);
    impl_deserialize_parsed!(deserialize_i32, visit_i32, i32);
    impl_deserialize_parsed!(deserialize_i64, visit_i64, i64);
    impl_deserialize_parsed!(deserialize_i128, visit_i128, i128);
    impl_deserialize_parsed!(deserialize_u8, visit_u8, u8);
    impl_deserialize_parsed!(deserialize_u16, visit_u16, u16);
    impl_deserialize_parsed!(deserialize_u32, visit_u32, u32);
    impl_deserialize_parsed!(deserialize_u64, visit_u64, u64);
    impl_deserialize_parsed!(deserialize_u128, visit_u128, u128);
    impl_deserialize_parsed!(deserialize_f32, visit_f32, f32);
    impl_deserialize_parsed!(deserialize_f64, visit_f64, f64);

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let text = self.text().unwrap_or_default();
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(Error::CannotParse(text.to_owned())),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.text() {
            Some(text) => visitor.visit_borrowed_str(text),
            None => self.deserialize_any(visitor),
        }
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Value::Null => visitor.visit_none(),
            Value::String(v) if v.is_empty() => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.text() {
            Some("") => visitor.visit_unit(),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_unit_struct<V>(self, _: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(self, _: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Value::String(v) => visitor.visit_enum(EnumDeserializer::Unit { name: v }),
            Value::Map(v) if v.len() == 1 => {
                let (k, v) = &v[0];
                if !variants.contains(&k.as_str()) {
                    return Err(Error::Message(format!("unknown variant: {}", k)));
                }
                match v {
                    Value::Seq(v) => visitor.visit_enum(EnumDeserializer::Tuple {
                        name: k,
                        content: v,
                    }),
                    Value::Map(v) => visitor.visit_enum(EnumDeserializer::Struct {
                        name: k,
                        content: v,
                    }),
                    _ => visitor.visit_enum(EnumDeserializer::NewType {
                        name: k,
                        content: v,
                    }),
                }
            }
            _ => Err(Error::Message(format!(
                "expected enum, got: {:?}",
                self.input
            ))),
        }
    }

    forward_to_deserialize_any! {
        bytes byte_buf seq tuple tuple_struct map struct identifier ignored_any
    }
}

#[derive(Debug)]
pub struct SeqDeserializer<'de> {
    values: &'de [Value],
    index: usize,
}

impl<'de> SeqAccess<'de> for SeqDeserializer<'de> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        if let Some(value) = self.values.get(self.index) {
            self.index += 1;
            return seed.deserialize(Deserializer::from_value(value)).map(Some);
        }
        Ok(None)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len() - self.index)
    }
}

#[derive(Debug)]
pub struct MapDeserializer<'de> {
    values: &'de [(String, Value)],
    index: usize,
}

impl<'de> MapAccess<'de> for MapDeserializer<'de> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        if let Some((key, _)) = self.values.get(self.index) {
            return seed.deserialize(KeyDeserializer { key }).map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        if let Some((_, value)) = self.values.get(self.index) {
            self.index += 1;
            return seed.deserialize(Deserializer::from_value(value));
        }
        Err(Error::ExpectedMapEntry)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len() - self.index)
    }
}

macro_rules! impl_deserialize_key {
    ($method:ident, $visit:ident, $type:ty) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value>
        where
            V: Visitor<'de>,
        {
            match self.key.trim().parse::<$type>() {
                Ok(value) => visitor.$visit(value),
                Err(_) => Err(Error::CannotParse(self.key.to_owned())),
            }
        }
    };
}

/// Map keys are text too, so integer-keyed maps parse them on demand.
struct KeyDeserializer<'de> {
    key: &'de str,
}

impl<'de> serde::de::Deserializer<'de> for KeyDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_str(self.key)
    }

    fn deserialize_newtype_struct<V>(self, _: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(EnumDeserializer::Unit { name: self.key })
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let key = self.key.trim();
        if key.eq_ignore_ascii_case("true") {
            visitor.visit_bool(true)
        } else if key.eq_ignore_ascii_case("false") {
            visitor.visit_bool(false)
        } else {
            Err(Error::CannotParse(self.key.to_owned()))
        }
    }

    impl_deserialize_key!(deserialize_i8, visit_i8, i8);
    impl_deserialize_key!(deserialize_i16, visit_i16, i16);
    impl_deserialize_key!(deserialize_i32, visit_i32, i32);
    impl_deserialize_key!(deserialize_i64, visit_i64, i64);
    impl_deserialize_key!(deserialize_u8, visit_u8, u8);
    impl_deserialize_key!(deserialize_u16, visit_u16, u16);
    impl_deserialize_key!(deserialize_u32, visit_u32, u32);
    impl_deserialize_key!(deserialize_u64, visit_u64, u64);
    impl_deserialize_key!(deserialize_f32, visit_f32, f32);
    impl_deserialize_key!(deserialize_f64, visit_f64, f64);

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf option unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}

#[derive(Debug)]
enum EnumDeserializer<'de> {
    Unit {
        name: &'de str,
    },
    NewType {
        name: &'de str,
        content: &'de Value,
    },
    Tuple {
        name: &'de str,
        content: &'de [Value],
    },
    Struct {
        name: &'de str,
        content: &'de [(String, Value)],
    },
}

impl<'de> EnumDeserializer<'de> {
    fn name(&self) -> &'de str {
        match self {
            Self::Unit { name }
            | Self::NewType { name, .. }
            | Self::Tuple { name, .. }
            | Self::Struct { name, .. } => name,
        }
    }
}

impl<'de> EnumAccess<'de> for EnumDeserializer<'de> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self::Variant)>
    where
        V: DeserializeSeed<'de>,
    {
        let name = <&str as IntoDeserializer<'de, Error>>::into_deserializer(self.name());
        let name = seed.deserialize(name)?;
        Ok((name, self))
    }
}

impl<'de> VariantAccess<'de> for EnumDeserializer<'de> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        if let EnumDeserializer::Unit { .. } = self {
            return Ok(());
        }
        Err(Error::ExpectedUnitVariant)
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: DeserializeSeed<'de>,
    {
        if let EnumDeserializer::NewType { content, .. } = self {
            return seed.deserialize(Deserializer::from_value(content));
        }
        Err(Error::ExpectedNewTypeVariant)
    }

    fn tuple_variant<V>(self, _: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if let EnumDeserializer::Tuple { content, .. } = self {
            return visitor.visit_seq(SeqDeserializer {
                values: content,
                index: 0,
            });
        }
        Err(Error::ExpectedTupleVariant)
    }

    fn struct_variant<V>(self, _: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if let EnumDeserializer::Struct { content, .. } = self {
            return visitor.visit_map(MapDeserializer {
                values: content,
                index: 0,
            });
        }
        Err(Error::ExpectedStructVariant)
    }
}

#[derive(Copy, Clone)]
pub struct ValueVisitor;

macro_rules! impl_visit_display {
    ($name:ident, $type:ty) => {
        fn $name<E>(self, value: $type) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Value::String(value.to_string()))
        }
    };
}

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("JSV value")
    }

    impl_visit_display!(visit_bool, bool);
    impl_visit_display!(visit_i64, i64);
    impl_visit_display!(visit_i128, i128);
    impl_visit_display!(visit_u64, u64);
    impl_visit_display!(visit_u128, u128);
    impl_visit_display!(visit_f64, f64);
    impl_visit_display!(visit_char, char);

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(value.to_owned()))
    }

    fn visit_string<E>(self, value: String) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(value))
    }

    fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_newtype_struct<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }

    fn visit_seq<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut result = Vec::with_capacity(access.size_hint().unwrap_or_default());
        while let Some(v) = access.next_element()? {
            result.push(v);
        }
        Ok(Value::Seq(result))
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut result = Vec::with_capacity(access.size_hint().unwrap_or_default());
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            result.push((k, v));
        }
        Ok(Value::Map(result))
    }
}
