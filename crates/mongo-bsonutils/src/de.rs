//! 解码 trait 与宽松类型转换规则
//!
//! 字节先由 `codec::parse_document` 解析为 `Document`,再绑定到目标。
//! 叶子值无法转换时不报错:字段保持原值,并在 trace 级别记录。
//!
//! 转换规则:
//! - 整数 <- Int32/Int64 (在范围内)、有限 Double 的整数部分、Boolean (1/0)
//! - 浮点 <- Double、可精确表示的整数、Boolean
//! - bool <- Boolean、数值 (非零为 true)
//! - 字符串 <- String、UTF-8 合法的 Binary
//! - 字节序列 <- Binary、String
//! - 任意目标 <- Null: 重置为零值

use crate::codec::parse_document;
use crate::describe::{decode_at_path, BsonStruct, InlineMut};
use crate::document::Document;
use crate::options::CodecOptions;
use crate::ser::MapKey;
use crate::value::{Binary, UtcDateTime, Value};
use crate::{BsonError, BsonResult};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use mongo_common::ObjectId;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tracing::trace;

/// 可从 BSON 值解码的目标
pub trait Decode {
    /// 写入解码结果;值无法转换时返回 `Ok(false)` 且不修改目标
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool>;

    fn as_inline_mut(&mut self) -> Option<InlineMut<'_>> {
        None
    }

    /// 沿 inline 路径继续解码,`path` 相对于本字段
    fn decode_inline(
        &mut self,
        path: &[usize],
        value: &Value,
        apply: &mut dyn FnMut(&mut dyn Decode) -> BsonResult<bool>,
    ) -> BsonResult<bool> {
        match self.as_inline_mut() {
            Some(InlineMut::Struct(inner)) => decode_at_path(inner, path, value, apply),
            _ => Ok(false),
        }
    }

    fn zero() -> Self
    where
        Self: Sized;

    fn from_byte(byte: u8) -> Option<Self>
    where
        Self: Sized,
    {
        let _ = byte;
        None
    }

    fn is_byte() -> bool
    where
        Self: Sized,
    {
        false
    }
}

/// inline 映射的写入端
pub trait DecodeMap {
    fn insert_value(&mut self, key: &str, value: &Value) -> BsonResult<bool>;
}

/// 可作为顶层解码目标的类型
pub trait Unmarshal {
    fn unmarshal_document(&mut self, doc: &Document) -> BsonResult<()>;

    fn unmarshal_bytes(&mut self, data: &[u8], options: &CodecOptions) -> BsonResult<()> {
        let doc = parse_document(data, options.max_depth())?;
        self.unmarshal_document(&doc)
    }
}

fn skipped(target: &'static str, value: &Value) -> bool {
    trace!(target_type = target, source = value.type_name(), "value not convertible, left unset");
    false
}

/// 把文档绑定到结构体
///
/// # Brief
/// 先重置为零值;键命中显式字段时写入该字段,否则写入 inline 映射,
/// 两者都没有时丢弃
pub fn decode_struct(target: &mut dyn BsonStruct, doc: &Document) -> BsonResult<()> {
    let descriptor = target.descriptor()?;
    target.reset();

    for (key, value) in doc.iter() {
        if let Some(field) = descriptor.field_by_key(key) {
            decode_at_path(&mut *target, &field.path, value, &mut |slot| slot.decode_value(value))?;
            continue;
        }
        let Some(path) = descriptor.inline_map() else {
            continue;
        };
        decode_at_path(&mut *target, path, value, &mut |slot| match slot.as_inline_mut() {
            Some(InlineMut::Map(map)) => map.insert_value(key, value),
            _ => Ok(false),
        })?;
    }
    Ok(())
}

/// 结构体字段的解码入口
pub fn decode_struct_value<T: BsonStruct>(target: &mut T, value: &Value) -> BsonResult<bool> {
    match value {
        Value::Null => {
            target.reset();
            Ok(true)
        }
        Value::Document(doc) => {
            decode_struct(target, doc)?;
            Ok(true)
        }
        other => Ok(skipped(std::any::type_name::<T>(), other)),
    }
}

fn integral(value: &Value) -> Option<i128> {
    match value {
        Value::Int32(n) => Some(i128::from(*n)),
        Value::Int64(n) => Some(i128::from(*n)),
        Value::Double(f) if f.is_finite() => Some(f.trunc() as i128),
        Value::Boolean(b) => Some(i128::from(*b)),
        _ => None,
    }
}

macro_rules! impl_decode_int {
    ($($t:ty),*) => {$(
        impl Decode for $t {
            fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
                if value.is_null() {
                    *self = 0;
                    return Ok(true);
                }
                match integral(value).and_then(|n| <$t>::try_from(n).ok()) {
                    Some(n) => {
                        *self = n;
                        Ok(true)
                    }
                    None => Ok(skipped(stringify!($t), value)),
                }
            }

            fn zero() -> Self {
                0
            }
        }
    )*};
}

impl_decode_int!(i8, i16, i32, i64, isize, u16, u32, u64, usize);

impl Decode for u8 {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        if value.is_null() {
            *self = 0;
            return Ok(true);
        }
        match integral(value).and_then(|n| u8::try_from(n).ok()) {
            Some(n) => {
                *self = n;
                Ok(true)
            }
            None => Ok(skipped("u8", value)),
        }
    }

    fn zero() -> Self {
        0
    }

    fn from_byte(byte: u8) -> Option<Self> {
        Some(byte)
    }

    fn is_byte() -> bool {
        true
    }
}

/// 整数只有在 f64 中可精确表示时才转换
fn exact_f64(n: i64) -> Option<f64> {
    let f = n as f64;
    (f as i128 == i128::from(n)).then_some(f)
}

impl Decode for f64 {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        let converted = match value {
            Value::Null => Some(0.0),
            Value::Double(f) => Some(*f),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => exact_f64(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        match converted {
            Some(f) => {
                *self = f;
                Ok(true)
            }
            None => Ok(skipped("f64", value)),
        }
    }

    fn zero() -> Self {
        0.0
    }
}

impl Decode for f32 {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        let converted = match value {
            Value::Null => Some(0.0),
            Value::Double(f) if !f.is_finite() || f.abs() <= f64::from(f32::MAX) => Some(*f as f32),
            Value::Int32(n) => Some(*n as f32).filter(|f| *f as i128 == i128::from(*n)),
            Value::Int64(n) => Some(*n as f32).filter(|f| *f as i128 == i128::from(*n)),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        match converted {
            Some(f) => {
                *self = f;
                Ok(true)
            }
            None => Ok(skipped("f32", value)),
        }
    }

    fn zero() -> Self {
        0.0
    }
}

impl Decode for bool {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        let converted = match value {
            Value::Null => Some(false),
            Value::Boolean(b) => Some(*b),
            Value::Int32(n) => Some(*n != 0),
            Value::Int64(n) => Some(*n != 0),
            Value::Double(f) => Some(*f != 0.0),
            _ => None,
        };
        match converted {
            Some(b) => {
                *self = b;
                Ok(true)
            }
            None => Ok(skipped("bool", value)),
        }
    }

    fn zero() -> Self {
        false
    }
}

fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Binary(b) => std::str::from_utf8(&b.bytes).ok(),
        _ => None,
    }
}

impl Decode for String {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        if value.is_null() {
            self.clear();
            return Ok(true);
        }
        match text_of(value) {
            Some(s) => {
                *self = s.to_string();
                Ok(true)
            }
            None => Ok(skipped("String", value)),
        }
    }

    fn zero() -> Self {
        String::new()
    }
}

impl Decode for CompactString {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        if value.is_null() {
            self.clear();
            return Ok(true);
        }
        match text_of(value) {
            Some(s) => {
                *self = CompactString::new(s);
                Ok(true)
            }
            None => Ok(skipped("CompactString", value)),
        }
    }

    fn zero() -> Self {
        CompactString::default()
    }
}

fn bytes_of(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Binary(b) => Some(&b.bytes),
        Value::String(s) => Some(s.as_bytes()),
        _ => None,
    }
}

impl Decode for Binary {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        match value {
            Value::Null => *self = Binary::default(),
            Value::Binary(b) => *self = b.clone(),
            Value::String(s) => *self = Binary::new(s.as_bytes()),
            other => return Ok(skipped("Binary", other)),
        }
        Ok(true)
    }

    fn zero() -> Self {
        Binary::default()
    }
}

impl Decode for ObjectId {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        match value {
            Value::Null => *self = ObjectId::zero(),
            Value::ObjectId(id) => *self = *id,
            other => return Ok(skipped("ObjectId", other)),
        }
        Ok(true)
    }

    fn zero() -> Self {
        ObjectId::zero()
    }
}

impl Decode for DateTime<Utc> {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        match value {
            Value::Null => *self = DateTime::<Utc>::default(),
            Value::DateTime(dt) => match dt.to_chrono() {
                Some(converted) => *self = converted,
                None => return Ok(skipped("DateTime", value)),
            },
            other => return Ok(skipped("DateTime", other)),
        }
        Ok(true)
    }

    fn zero() -> Self {
        DateTime::<Utc>::default()
    }
}

impl Decode for UtcDateTime {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        match value {
            Value::Null => *self = UtcDateTime::default(),
            Value::DateTime(dt) => *self = *dt,
            other => return Ok(skipped("UtcDateTime", other)),
        }
        Ok(true)
    }

    fn zero() -> Self {
        UtcDateTime::default()
    }
}

impl Decode for Value {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        *self = value.clone();
        Ok(true)
    }

    fn zero() -> Self {
        Value::Null
    }
}

impl Decode for Document {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        match value {
            Value::Null => self.clear(),
            Value::Document(doc) => self.extend(doc.clone()),
            other => return Ok(skipped("Document", other)),
        }
        Ok(true)
    }

    fn as_inline_mut(&mut self) -> Option<InlineMut<'_>> {
        Some(InlineMut::Map(self))
    }

    fn zero() -> Self {
        Document::new()
    }
}

impl DecodeMap for Document {
    fn insert_value(&mut self, key: &str, value: &Value) -> BsonResult<bool> {
        self.insert(key, value.clone());
        Ok(true)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        if value.is_null() {
            *self = None;
            return Ok(true);
        }
        if let Some(inner) = self {
            return inner.decode_value(value);
        }
        let mut fresh = T::zero();
        if !fresh.decode_value(value)? {
            return Ok(false);
        }
        *self = Some(fresh);
        Ok(true)
    }

    fn as_inline_mut(&mut self) -> Option<InlineMut<'_>> {
        self.as_mut()?.as_inline_mut()
    }

    /// `None` 时在临时值上解码,成功后才分配
    fn decode_inline(
        &mut self,
        path: &[usize],
        value: &Value,
        apply: &mut dyn FnMut(&mut dyn Decode) -> BsonResult<bool>,
    ) -> BsonResult<bool> {
        if let Some(inner) = self {
            return inner.decode_inline(path, value, apply);
        }
        if value.is_null() {
            return Ok(true);
        }
        let mut fresh = T::zero();
        if !fresh.decode_inline(path, value, apply)? {
            return Ok(false);
        }
        *self = Some(fresh);
        Ok(true)
    }

    fn zero() -> Self {
        None
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        (**self).decode_value(value)
    }

    fn as_inline_mut(&mut self) -> Option<InlineMut<'_>> {
        (**self).as_inline_mut()
    }

    fn decode_inline(
        &mut self,
        path: &[usize],
        value: &Value,
        apply: &mut dyn FnMut(&mut dyn Decode) -> BsonResult<bool>,
    ) -> BsonResult<bool> {
        (**self).decode_inline(path, value, apply)
    }

    fn zero() -> Self {
        Box::new(T::zero())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        if value.is_null() {
            self.clear();
            return Ok(true);
        }
        if T::is_byte() {
            return match bytes_of(value) {
                Some(bytes) => {
                    *self = bytes.iter().filter_map(|b| T::from_byte(*b)).collect();
                    Ok(true)
                }
                None => Ok(skipped("byte vector", value)),
            };
        }
        let Value::Array(items) = value else {
            return Ok(skipped("Vec", value));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let mut slot = T::zero();
            if slot.decode_value(item)? {
                out.push(slot);
            }
        }
        *self = out;
        Ok(true)
    }

    fn zero() -> Self {
        Vec::new()
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        if value.is_null() {
            *self = Self::zero();
            return Ok(true);
        }
        if T::is_byte() {
            return match bytes_of(value).filter(|bytes| bytes.len() == N) {
                Some(bytes) => {
                    for (slot, byte) in self.iter_mut().zip(bytes) {
                        if let Some(b) = T::from_byte(*byte) {
                            *slot = b;
                        }
                    }
                    Ok(true)
                }
                None => Ok(skipped("byte array", value)),
            };
        }
        let items = match value {
            Value::Array(items) if items.len() == N => items,
            other => return Ok(skipped("array", other)),
        };
        let mut out = Self::zero();
        for (slot, item) in out.iter_mut().zip(items) {
            slot.decode_value(item)?;
        }
        *self = out;
        Ok(true)
    }

    fn zero() -> Self {
        std::array::from_fn(|_| T::zero())
    }
}

macro_rules! impl_decode_map {
    ($map:ident, $($bound:path),+) => {
        impl<K, V> Decode for $map<K, V>
        where
            K: MapKey $(+ $bound)+,
            V: Decode,
        {
            fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
                match value {
                    Value::Null => self.clear(),
                    Value::Document(doc) => {
                        for (key, item) in doc.iter() {
                            self.insert_value(key, item)?;
                        }
                    }
                    other => return Ok(skipped("map", other)),
                }
                Ok(true)
            }

            fn as_inline_mut(&mut self) -> Option<InlineMut<'_>> {
                Some(InlineMut::Map(self))
            }

            fn zero() -> Self {
                $map::default()
            }
        }

        impl<K, V> DecodeMap for $map<K, V>
        where
            K: MapKey $(+ $bound)+,
            V: Decode,
        {
            fn insert_value(&mut self, key: &str, value: &Value) -> BsonResult<bool> {
                let mut item = V::zero();
                if !item.decode_value(value)? {
                    return Ok(false);
                }
                self.insert(K::from_key(key), item);
                Ok(true)
            }
        }

        impl<K, V> Unmarshal for $map<K, V>
        where
            K: MapKey $(+ $bound)+,
            V: Decode,
        {
            fn unmarshal_document(&mut self, doc: &Document) -> BsonResult<()> {
                for (key, item) in doc.iter() {
                    self.insert_value(key, item)?;
                }
                Ok(())
            }
        }
    };
}

impl_decode_map!(HashMap, Eq, Hash);
impl_decode_map!(BTreeMap, Ord);
impl_decode_map!(IndexMap, Eq, Hash);

impl Unmarshal for Document {
    fn unmarshal_document(&mut self, doc: &Document) -> BsonResult<()> {
        self.extend(doc.clone());
        Ok(())
    }
}

impl Value {
    fn check_unmarshal_target(&self) -> BsonResult<()> {
        match self {
            Value::Null | Value::Document(_) => Ok(()),
            other => Err(BsonError::InvalidTarget {
                target: format!("Value::{:?}", other.element_type()),
                reason: "unmarshal needs a map, a document, a struct or a Value holding null or a document"
                    .to_string(),
            }),
        }
    }
}

impl Unmarshal for Value {
    fn unmarshal_document(&mut self, doc: &Document) -> BsonResult<()> {
        self.check_unmarshal_target()?;
        match self {
            Value::Document(existing) => existing.extend(doc.clone()),
            _ => *self = Value::Document(doc.clone()),
        }
        Ok(())
    }

    fn unmarshal_bytes(&mut self, data: &[u8], options: &CodecOptions) -> BsonResult<()> {
        self.check_unmarshal_target()?;
        let doc = parse_document(data, options.max_depth())?;
        self.unmarshal_document(&doc)
    }
}

impl<T: Unmarshal + ?Sized> Unmarshal for Box<T> {
    fn unmarshal_document(&mut self, doc: &Document) -> BsonResult<()> {
        (**self).unmarshal_document(doc)
    }

    fn unmarshal_bytes(&mut self, data: &[u8], options: &CodecOptions) -> BsonResult<()> {
        (**self).unmarshal_bytes(data, options)
    }
}
