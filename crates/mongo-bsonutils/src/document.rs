//! BSON 文档结构模块
//!
//! 有序键值对集合,编码单元。使用 `IndexMap` 保持字段插入顺序,
//! 键使用 `CompactString` 减少短键的堆分配。

use crate::value::Value;
use compact_str::CompactString;
use indexmap::IndexMap;
use std::fmt;

/// BSON 文档
///
/// 同一文档内键唯一;线上出现重复键时保留首次出现的位置与最后一次的值。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: IndexMap<CompactString, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// 插入或更新字段,返回旧值
    pub fn insert(&mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// 删除字段,保持其余字段的顺序
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    /// 将另一个文档的字段合并进来,同名字段以 `other` 为准
    pub fn extend(&mut self, other: Document) {
        self.fields.extend(other.fields);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}: {}", k.as_str(), v)?;
        }
        write!(f, "}}")
    }
}

impl From<IndexMap<CompactString, Value>> for Document {
    fn from(fields: IndexMap<CompactString, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<CompactString>> FromIterator<(K, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (CompactString, Value);
    type IntoIter = indexmap::map::IntoIter<CompactString, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a CompactString, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, CompactString, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// 构造 Document 的便捷宏
///
/// ```rust,ignore
/// use mongo_bsonutils::document;
///
/// let doc = document! { "name" => "widget", "price" => 9.5 };
/// ```
#[macro_export]
macro_rules! document {
    () => {
        $crate::Document::new()
    };
    ( $($key:expr => $value:expr),+ $(,)? ) => {{
        let mut doc = $crate::Document::new();
        $(
            doc.insert($key, $crate::Value::from($value));
        )+
        doc
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let doc = document! { "b" => 1, "a" => 2, "c" => 3 };
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut doc = document! { "x" => 1, "y" => 2 };
        assert_eq!(doc.insert("x", 10), Some(Value::Int32(1)));
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["x", "y"]);
        assert_eq!(doc.get_i64("x"), Some(10));
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut doc = document! { "a" => 1, "b" => 2, "c" => 3 };
        doc.remove("b");
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_display() {
        let doc = document! { "name" => "widget", "n" => 1 };
        assert_eq!(doc.to_string(), r#"{"name": "widget", "n": 1}"#);
    }
}
