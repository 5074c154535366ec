//! 编码 trait 与内置类型的编码规则
//!
//! `Encode` 把一个值写成带键的 BSON 元素,`Marshal` 写出顶层文档。
//! 结构体按描述符的字段顺序遍历,inline 结构体的字段写在父文档层级,
//! inline 映射的条目写在显式字段之后。

use crate::codec::Encoder;
use crate::describe::{field_at, BsonStruct, InlineKind, InlineRef};
use crate::document::Document;
use crate::spec::{ElementType, BINARY_GENERIC};
use crate::value::{Binary, UtcDateTime, Value};
use crate::{BsonError, BsonResult};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use mongo_common::ObjectId;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tracing::debug;

/// 可编码为 BSON 元素的值
pub trait Encode {
    /// 以 `key` 写出一个元素;`min_size` 来自字段的 `minsize` 标志
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()>;

    /// 是否为类型的零值,用于 omitempty
    fn is_zero(&self) -> bool;

    fn as_inline(&self) -> Option<InlineRef<'_>> {
        None
    }

    fn as_byte(&self) -> Option<u8> {
        None
    }

    fn inline_kind() -> InlineKind
    where
        Self: Sized,
    {
        InlineKind::None
    }

    /// 元素类型为 `u8` 时,序列整体编码为 Binary
    fn is_byte() -> bool
    where
        Self: Sized,
    {
        false
    }
}

/// 字符串键映射的条目遍历
pub trait EncodeMap {
    fn for_each_entry(&self, f: &mut dyn FnMut(&str, &dyn Encode) -> BsonResult<()>) -> BsonResult<()>;
}

/// 可作为顶层文档编码的值
pub trait Marshal {
    fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()>;
}

/// 映射键
pub trait MapKey: Sized {
    fn as_key(&self) -> &str;
    fn from_key(key: &str) -> Self;
}

impl MapKey for String {
    fn as_key(&self) -> &str {
        self
    }

    fn from_key(key: &str) -> Self {
        key.to_string()
    }
}

impl MapKey for CompactString {
    fn as_key(&self) -> &str {
        self
    }

    fn from_key(key: &str) -> Self {
        CompactString::new(key)
    }
}

/// 写出结构体的全部字段(不含文档头)
///
/// # Brief
/// 按描述符顺序写出字段,`omitempty` 或默认省略开启时跳过零值;
/// 之后写出 inline 映射中与显式字段不冲突的条目
pub fn encode_struct_fields(enc: &mut Encoder<'_>, value: &dyn BsonStruct) -> BsonResult<()> {
    let descriptor = value.descriptor()?;
    let default_omit = enc.options().is_default_omit_empty();

    for field in descriptor.fields() {
        let Some(item) = field_at(value, &field.path) else {
            continue;
        };
        if (field.omit_empty || default_omit) && item.is_zero() {
            continue;
        }
        item.encode_element(enc, &field.key, field.min_size)?;
    }

    let inline_map = descriptor
        .inline_map()
        .and_then(|path| field_at(value, path))
        .and_then(|item| item.as_inline());
    if let Some(InlineRef::Map(map)) = inline_map {
        map.for_each_entry(&mut |key, item| {
            if descriptor.field_by_key(key).is_some() {
                debug!(
                    type_name = descriptor.type_name(),
                    key, "inline map entry shadowed by struct field, dropped"
                );
                return Ok(());
            }
            item.encode_element(enc, key, false)
        })?;
    }
    Ok(())
}

/// 把结构体写成嵌套文档元素
pub fn encode_struct_element(enc: &mut Encoder<'_>, key: &str, value: &dyn BsonStruct) -> BsonResult<()> {
    enc.write_embedded(ElementType::Document, key, |enc| encode_struct_fields(enc, value))
}

/// 把结构体写成顶层文档
pub fn marshal_struct(enc: &mut Encoder<'_>, value: &dyn BsonStruct) -> BsonResult<()> {
    enc.write_document(|enc| encode_struct_fields(enc, value))
}

fn encode_entries(enc: &mut Encoder<'_>, map: &dyn EncodeMap) -> BsonResult<()> {
    map.for_each_entry(&mut |key, item| item.encode_element(enc, key, false))
}

fn encode_seq<'a, T, I>(enc: &mut Encoder<'_>, key: &str, items: I) -> BsonResult<()>
where
    T: Encode + 'a,
    I: IntoIterator<Item = &'a T>,
{
    enc.write_embedded(ElementType::Array, key, |enc| {
        for (i, item) in items.into_iter().enumerate() {
            item.encode_element(enc, &i.to_string(), false)?;
        }
        Ok(())
    })
}

macro_rules! impl_encode_int32 {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
                enc.write_i32(key, i32::from(*self))
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

impl_encode_int32!(i8, i16, i32, u16);

impl Encode for u8 {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_i32(key, i32::from(*self))
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }

    fn as_byte(&self) -> Option<u8> {
        Some(*self)
    }

    fn is_byte() -> bool {
        true
    }
}

impl Encode for u32 {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        match i32::try_from(*self) {
            Ok(v) => enc.write_i32(key, v),
            Err(_) => enc.write_i64(key, i64::from(*self)),
        }
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl Encode for i64 {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()> {
        if min_size {
            if let Ok(v) = i32::try_from(*self) {
                return enc.write_i32(key, v);
            }
        }
        enc.write_i64(key, *self)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl Encode for isize {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()> {
        (*self as i64).encode_element(enc, key, min_size)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl Encode for u64 {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()> {
        if min_size {
            if let Ok(v) = i32::try_from(*self) {
                return enc.write_i32(key, v);
            }
        }
        match i64::try_from(*self) {
            Ok(v) => enc.write_i64(key, v),
            Err(_) => Err(BsonError::UnsupportedValue {
                type_name: "u64",
                key: key.to_string(),
                reason: format!("{} overflows int64", self),
            }),
        }
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl Encode for usize {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()> {
        (*self as u64).encode_element(enc, key, min_size)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl Encode for f64 {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_double(key, *self)
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl Encode for f32 {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_double(key, f64::from(*self))
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl Encode for bool {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_bool(key, *self)
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

impl Encode for str {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_string(key, self)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for String {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_string(key, self)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for CompactString {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_string(key, self)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for ObjectId {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_object_id(key, self)
    }

    fn is_zero(&self) -> bool {
        ObjectId::is_zero(self)
    }
}

impl Encode for DateTime<Utc> {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_datetime(key, self.timestamp_millis())
    }

    fn is_zero(&self) -> bool {
        self.timestamp_millis() == 0
    }
}

impl Encode for UtcDateTime {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_datetime(key, self.timestamp_millis())
    }

    fn is_zero(&self) -> bool {
        self.timestamp_millis() == 0
    }
}

impl Encode for Binary {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_binary(key, self.subtype, &self.bytes)
    }

    fn is_zero(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Encode for Value {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_value(key, self)
    }

    fn is_zero(&self) -> bool {
        match self {
            Value::Double(n) => *n == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Document(doc) => doc.is_empty(),
            Value::Array(arr) => arr.is_empty(),
            Value::Binary(b) => b.bytes.is_empty(),
            Value::ObjectId(id) => id.is_zero(),
            Value::Boolean(b) => !*b,
            Value::DateTime(dt) => dt.timestamp_millis() == 0,
            Value::Null => true,
            Value::Int32(n) => *n == 0,
            Value::Int64(n) => *n == 0,
        }
    }
}

impl Encode for Document {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        enc.write_embedded(ElementType::Document, key, |enc| enc.write_fields(self))
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn as_inline(&self) -> Option<InlineRef<'_>> {
        Some(InlineRef::Map(self))
    }

    fn inline_kind() -> InlineKind {
        InlineKind::Map
    }
}

impl EncodeMap for Document {
    fn for_each_entry(&self, f: &mut dyn FnMut(&str, &dyn Encode) -> BsonResult<()>) -> BsonResult<()> {
        for (key, value) in self.iter() {
            f(key, value)?;
        }
        Ok(())
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()> {
        match self {
            Some(value) => value.encode_element(enc, key, min_size),
            None => enc.write_null(key),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn as_inline(&self) -> Option<InlineRef<'_>> {
        self.as_ref()?.as_inline()
    }

    fn inline_kind() -> InlineKind {
        pointer_inline(T::inline_kind())
    }
}

impl<T: Encode> Encode for Box<T> {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, min_size: bool) -> BsonResult<()> {
        (**self).encode_element(enc, key, min_size)
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }

    fn as_inline(&self) -> Option<InlineRef<'_>> {
        (**self).as_inline()
    }

    fn inline_kind() -> InlineKind {
        pointer_inline(T::inline_kind())
    }
}

/// 指针只能 inline 结构体
fn pointer_inline(kind: InlineKind) -> InlineKind {
    match kind {
        InlineKind::Map => InlineKind::None,
        other => other,
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        if T::is_byte() {
            let bytes: Vec<u8> = self.iter().filter_map(|b| b.as_byte()).collect();
            return enc.write_binary(key, BINARY_GENERIC, &bytes);
        }
        encode_seq(enc, key, self)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        if T::is_byte() {
            let bytes: Vec<u8> = self.iter().filter_map(|b| b.as_byte()).collect();
            return enc.write_binary(key, BINARY_GENERIC, &bytes);
        }
        encode_seq(enc, key, self)
    }

    fn is_zero(&self) -> bool {
        self.iter().all(Encode::is_zero)
    }
}

macro_rules! impl_encode_map {
    ($map:ident, $($bound:path),+) => {
        impl<K, V> Encode for $map<K, V>
        where
            K: MapKey $(+ $bound)+,
            V: Encode,
        {
            fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
                enc.write_embedded(ElementType::Document, key, |enc| encode_entries(enc, self))
            }

            fn is_zero(&self) -> bool {
                self.is_empty()
            }

            fn as_inline(&self) -> Option<InlineRef<'_>> {
                Some(InlineRef::Map(self))
            }

            fn inline_kind() -> InlineKind {
                InlineKind::Map
            }
        }

        impl<K, V> EncodeMap for $map<K, V>
        where
            K: MapKey $(+ $bound)+,
            V: Encode,
        {
            fn for_each_entry(&self, f: &mut dyn FnMut(&str, &dyn Encode) -> BsonResult<()>) -> BsonResult<()> {
                for (key, value) in self.iter() {
                    f(key.as_key(), value)?;
                }
                Ok(())
            }
        }

        impl<K, V> Marshal for $map<K, V>
        where
            K: MapKey $(+ $bound)+,
            V: Encode,
        {
            fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()> {
                enc.write_document(|enc| encode_entries(enc, self))
            }
        }
    };
}

impl_encode_map!(HashMap, Eq, Hash);
impl_encode_map!(BTreeMap, Ord);
impl_encode_map!(IndexMap, Eq, Hash);

impl Marshal for Document {
    fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()> {
        enc.write_document(|enc| enc.write_fields(self))
    }
}

impl Marshal for Value {
    fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()> {
        match self {
            Value::Document(doc) => doc.marshal_document(enc),
            other => Err(BsonError::UnsupportedValue {
                type_name: other.type_name(),
                key: String::new(),
                reason: "only documents can be marshalled at the top level".to_string(),
            }),
        }
    }
}

impl<T: Marshal + ?Sized> Marshal for Box<T> {
    fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()> {
        (**self).marshal_document(enc)
    }
}

impl<T: Marshal + ?Sized> Marshal for &T {
    fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()> {
        (**self).marshal_document(enc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DEFAULT_MAX_DEPTH;
    use crate::{document, marshal, parse_document, BsonStruct, Codec, CodecOptions};
    use chrono::TimeZone;

    fn encode_doc<T: Marshal + ?Sized>(value: &T) -> Document {
        let bytes = marshal(value).unwrap();
        parse_document(&bytes, DEFAULT_MAX_DEPTH).unwrap()
    }

    #[derive(BsonStruct, Default)]
    struct Scalars {
        small: i8,
        short: u16,
        word: u32,
        big: u64,
        #[bson("big_min,minsize")]
        big_min: u64,
        size: usize,
        ratio: f32,
        flag: bool,
        label: String,
        data: Vec<u8>,
        digest: [u8; 4],
        scores: Vec<i32>,
        pair: [String; 2],
        when: DateTime<Utc>,
        id: ObjectId,
        note: Option<String>,
    }

    #[derive(BsonStruct, Default)]
    struct Audit {
        created_on: i64,
        updated_on: i64,
    }

    #[derive(BsonStruct, Default)]
    struct Inner {
        #[bson("x")]
        x: i32,
    }

    #[derive(BsonStruct, Default)]
    struct Outer {
        #[bson("_id")]
        id: String,
        #[bson(",inline")]
        audit: Audit,
        nested: Inner,
        #[bson(",inline")]
        extra: IndexMap<String, Value>,
    }

    #[derive(BsonStruct, Default)]
    struct MaybeAudit {
        name: String,
        #[bson(",inline")]
        audit: Option<Box<Audit>>,
    }

    #[derive(BsonStruct, Default)]
    struct Node {
        name: String,
        child: Option<Box<Node>>,
    }

    #[test]
    fn test_scalar_element_kinds() {
        let when = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let value = Scalars {
            small: -3,
            short: 7,
            word: u32::MAX,
            big: 5,
            big_min: 5,
            size: 9,
            ratio: 0.5,
            flag: true,
            label: "x".to_string(),
            data: vec![1, 2],
            digest: [9, 8, 7, 6],
            scores: vec![1, 2],
            pair: ["a".to_string(), "b".to_string()],
            when,
            id: ObjectId::from_bytes([1; 12]),
            note: None,
        };
        let doc = encode_doc(&value);
        assert_eq!(doc.get("small"), Some(&Value::Int32(-3)));
        assert_eq!(doc.get("short"), Some(&Value::Int32(7)));
        assert_eq!(doc.get("word"), Some(&Value::Int64(u32::MAX as i64)));
        assert_eq!(doc.get("big"), Some(&Value::Int64(5)));
        assert_eq!(doc.get("big_min"), Some(&Value::Int32(5)));
        assert_eq!(doc.get("size"), Some(&Value::Int64(9)));
        assert_eq!(doc.get("ratio"), Some(&Value::Double(0.5)));
        assert_eq!(doc.get("flag"), Some(&Value::Boolean(true)));
        assert_eq!(doc.get("data"), Some(&Value::from(vec![1u8, 2])));
        assert_eq!(doc.get("digest"), Some(&Value::from(vec![9u8, 8, 7, 6])));
        assert_eq!(
            doc.get("scores"),
            Some(&Value::Array(vec![Value::Int32(1), Value::Int32(2)]))
        );
        assert_eq!(
            doc.get("pair"),
            Some(&Value::Array(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(doc.get("when"), Some(&Value::from(when)));
        assert_eq!(doc.get("id"), Some(&Value::ObjectId(ObjectId::from_bytes([1; 12]))));
        assert_eq!(doc.get("note"), Some(&Value::Null));
    }

    #[test]
    fn test_u64_overflow() {
        let value = Scalars {
            big: u64::MAX,
            ..Scalars::default()
        };
        let err = marshal(&value).unwrap_err();
        match err {
            BsonError::UnsupportedValue { type_name, key, .. } => {
                assert_eq!(type_name, "u64");
                assert_eq!(key, "big");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inline_flattening() {
        let mut extra = IndexMap::new();
        extra.insert("color".to_string(), Value::from("red"));
        extra.insert("_id".to_string(), Value::from("shadowed"));
        let value = Outer {
            id: "p1".to_string(),
            audit: Audit {
                created_on: 10,
                updated_on: 20,
            },
            nested: Inner { x: 1 },
            extra,
        };
        let doc = encode_doc(&value);
        assert_eq!(
            doc,
            document! {
                "_id" => "p1",
                "created_on" => 10i64,
                "updated_on" => 20i64,
                "nested" => document! { "x" => 1 },
                "color" => "red",
            }
        );
    }

    #[test]
    fn test_nil_pointer_inline_skipped() {
        let doc = encode_doc(&MaybeAudit {
            name: "n".to_string(),
            audit: None,
        });
        assert_eq!(doc, document! { "name" => "n" });

        let doc = encode_doc(&MaybeAudit {
            name: "n".to_string(),
            audit: Some(Box::new(Audit {
                created_on: 1,
                updated_on: 0,
            })),
        });
        assert_eq!(doc.get("created_on"), Some(&Value::Int64(1)));
        assert_eq!(doc.get("updated_on"), Some(&Value::Int64(0)));
    }

    #[test]
    fn test_omit_empty_keeps_non_zero() {
        let options = CodecOptions::default().with_default_omit_empty(true);
        let value = Outer {
            id: "p1".to_string(),
            ..Outer::default()
        };
        let bytes = Codec::new(options).marshal(&value).unwrap();
        let doc = parse_document(&bytes, DEFAULT_MAX_DEPTH).unwrap();
        // nested 的所有字段为零值,整体视为零值
        assert_eq!(doc, document! { "_id" => "p1" });
    }

    #[test]
    fn test_depth_limit_on_self_referencing_chain() {
        let mut node = Node::default();
        for i in 0..20 {
            node = Node {
                name: i.to_string(),
                child: Some(Box::new(node)),
            };
        }
        let options = CodecOptions::default().with_max_depth(8);
        let err = Codec::new(options).marshal(&node).unwrap_err();
        assert!(matches!(err, BsonError::DepthExceeded { max: 8, .. }));
        assert!(marshal(&node).is_ok());
    }

    #[test]
    fn test_map_input() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 2i32);
        map.insert("a".to_string(), 1i32);
        let doc = encode_doc(&map);
        assert_eq!(doc, document! { "a" => 1, "b" => 2 });
    }
}
