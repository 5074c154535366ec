//! BSON 值类型定义模块
//!
//! 定义编解码层支持的 BSON 值:字符串、布尔、32/64 位整数、浮点、
//! 二进制、数组、嵌套文档、日期时间、ObjectId 与 Null。

use crate::document::Document;
use crate::spec::{ElementType, BINARY_GENERIC};
use chrono::{DateTime, TimeZone, Utc};
use mongo_common::ObjectId;
use std::fmt;

/// BSON 值
///
/// 数组在线上格式中是以 "0","1",... 为键的文档,内存中直接用 `Vec<Value>` 表示。
///
/// # 示例
///
/// ```rust,ignore
/// use mongo_bsonutils::Value;
///
/// let value = Value::from("hello");
/// assert_eq!(value.type_name(), "string");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64 位浮点数
    Double(f64),
    /// UTF-8 字符串
    String(String),
    /// 嵌套文档
    Document(Document),
    /// 值数组
    Array(Vec<Value>),
    /// 二进制数据
    Binary(Binary),
    /// 12 字节对象标识符
    ObjectId(ObjectId),
    /// 布尔值
    Boolean(bool),
    /// UTC 日期时间(毫秒精度)
    DateTime(UtcDateTime),
    /// 空值
    Null,
    /// 32 位有符号整数
    Int32(i32),
    /// 64 位有符号整数
    Int64(i64),
}

/// BSON 日期时间:自 Unix 纪元起的毫秒数
///
/// 覆盖完整的 i64 范围;超出 chrono 表示范围的值只在绑定到
/// `chrono::DateTime<Utc>` 时才被跳过。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UtcDateTime(i64);

impl UtcDateTime {
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn timestamp_millis(&self) -> i64 {
        self.0
    }

    /// chrono 无法表示时返回 `None`
    pub fn to_chrono(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<DateTime<Utc>> for UtcDateTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl fmt::Display for UtcDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// 二进制值
///
/// 子类型 0x02 (旧二进制) 的内层长度在解码时已剥离。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype: BINARY_GENERIC,
            bytes: bytes.into(),
        }
    }

    pub fn with_subtype(subtype: u8, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype,
            bytes: bytes.into(),
        }
    }
}

impl Value {
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Double(_) => ElementType::Double,
            Value::String(_) => ElementType::String,
            Value::Document(_) => ElementType::Document,
            Value::Array(_) => ElementType::Array,
            Value::Binary(_) => ElementType::Binary,
            Value::ObjectId(_) => ElementType::ObjectId,
            Value::Boolean(_) => ElementType::Boolean,
            Value::DateTime(_) => ElementType::DateTime,
            Value::Null => ElementType::Null,
            Value::Int32(_) => ElementType::Int32,
            Value::Int64(_) => ElementType::Int64,
        }
    }

    /// 类型名称,用于日志与错误信息
    pub fn type_name(&self) -> &'static str {
        self.element_type().name()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// 整数类型(Int32 或 Int64)统一取为 i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(*n as i64),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Int32(n) => Some(*n as f64),
            Value::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Value::ObjectId(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// 按点分隔路径访问嵌套值,如 "user.address.city" 或 "tags.0"
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for part in path.split('.') {
            current = match current {
                Value::Document(doc) => doc.get(part)?,
                Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Document(doc) => write!(f, "{}", doc),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Binary(b) => write!(f, "Binary({:#04x}, {} bytes)", b.subtype, b.bytes.len()),
            Value::ObjectId(id) => write!(f, "ObjectId(\"{}\")", id),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "ISODate(\"{}\")", dt),
            Value::Null => write!(f, "null"),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "NumberLong({})", n),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(Binary::new(v))
    }
}

impl From<Binary> for Value {
    fn from(v: Binary) -> Self {
        Value::Binary(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<UtcDateTime> for Value {
    fn from(v: UtcDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.into())
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::from(1).type_name(), "int");
        assert_eq!(Value::from(1i64).type_name(), "long");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(vec![1u8, 2]).type_name(), "binary");
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int32(7).as_i64(), Some(7));
        assert_eq!(Value::Int64(7).as_i32(), None);
        assert_eq!(Value::Int64(7).as_f64(), Some(7.0));
        assert_eq!(Value::from("7").as_f64(), None);
    }

    #[test]
    fn test_get_path() {
        let value = Value::Document(document! {
            "user" => document! {
                "tags" => vec![Value::from("a"), Value::from("b")],
            },
        });
        assert_eq!(value.get_path("user.tags.1"), Some(&Value::from("b")));
        assert_eq!(value.get_path("user.missing"), None);
        assert_eq!(value.get_path("user.tags.x"), None);
    }

    #[test]
    fn test_datetime_beyond_chrono_range() {
        let max = UtcDateTime::MAX;
        assert_eq!(max.to_chrono(), None);
        assert_eq!(Value::from(max).to_string(), "ISODate(\"9223372036854775807ms\")");

        let epoch = UtcDateTime::from_millis(0);
        assert_eq!(epoch.to_chrono().map(|dt| dt.timestamp_millis()), Some(0));
        assert_eq!(UtcDateTime::from(epoch.to_chrono().unwrap()), epoch);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
