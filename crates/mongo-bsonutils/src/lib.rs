//! # mongo-bsonutils - 带默认字段省略策略的 BSON 编解码器
//!
//! 将带 `#[derive(BsonStruct)]` 的结构体、字符串键映射与 `Document`
//! 编码为标准 BSON 字节,并按宽松的类型转换规则解码回来。
//!
//! - **类型描述缓存**:每个类型的字段表只解析一次,进程内共享
//! - **字段标签**:`#[bson("key,omitempty,minsize,inline")]`
//! - **可配置省略**:`CodecOptions::set_default_omit_empty` 随调用传递,不使用全局状态
//! - **bson 互操作**:与 `bson` crate 的 `Document` 双向转换
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use mongo_bsonutils::{marshal, unmarshal, BsonStruct};
//!
//! #[derive(BsonStruct, Debug, PartialEq)]
//! struct Product {
//!     #[bson("_id,omitempty")]
//!     id: String,
//!     #[bson("name")]
//!     name: String,
//! }
//!
//! let product = Product { id: String::new(), name: "widget".into() };
//! let bytes = marshal(&product).unwrap();
//!
//! let mut decoded = Product { id: String::new(), name: String::new() };
//! unmarshal(&bytes, &mut decoded).unwrap();
//! assert_eq!(decoded, product);
//! ```

extern crate self as mongo_bsonutils;

pub mod bson;
pub mod codec;
pub mod de;
pub mod describe;
pub mod document;
pub mod helpers;
pub mod options;
pub mod raw;
pub mod ser;
pub mod spec;
pub mod tag;
pub mod value;

pub use codec::{parse_document, Encoder};
pub use de::{Decode, DecodeMap, Unmarshal};
pub use describe::{describe, BsonStruct, FieldDescriptor, InlineKind, RawField, StructType, TypeDescriptor};
pub use document::Document;
pub use helpers::{init_document, map_document, marshal_m, unmarshal_to_m, M};
pub use mongo_bsonutils_derive::BsonStruct;
pub use mongo_common::ObjectId;
pub use options::CodecOptions;
pub use raw::Raw;
pub use ser::{Encode, EncodeMap, MapKey, Marshal};
pub use value::{Binary, UtcDateTime, Value};

use bytes::BytesMut;
use std::fmt;
use thiserror::Error;

/// 描述符构造失败的具体原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// 标签中出现未知标志
    UnsupportedFlag { flag: String, tag: String },
    /// 同一类型声明了多个 inline 映射
    MultipleInlineMaps,
    /// inline 用在了既不是结构体也不是字符串键映射的字段上
    InlineNotSupported,
    /// 展开后出现重复的输出键
    DuplicateKey { key: String },
    /// 结构体直接或间接 inline 自身
    RecursiveInline,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFlag { flag, tag } => {
                write!(f, "unsupported flag {:?} in tag {:?}", flag, tag)
            }
            Self::MultipleInlineMaps => write!(f, "multiple inline maps"),
            Self::InlineNotSupported => {
                write!(f, "inline needs a struct, a pointer to a struct or a string-keyed map")
            }
            Self::DuplicateKey { key } => write!(f, "duplicated key {:?}", key),
            Self::RecursiveInline => write!(f, "struct inlines itself"),
        }
    }
}

/// 编解码错误类型
///
/// 每个变体都携带出错的类型、字段或键,便于定位。
#[derive(Error, Debug)]
pub enum BsonError {
    /// 类型描述构造失败(标签或 inline 配置错误)
    #[error("invalid bson configuration for field `{field}` of {type_name}: {kind}")]
    Configuration {
        type_name: &'static str,
        field: &'static str,
        kind: ConfigErrorKind,
    },

    /// 解码目标形态不受支持
    #[error("invalid unmarshal target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// 文档结构损坏(长度不符、截断、缺少结束符、未知类型)
    #[error("document is corrupted: {0}")]
    CorruptDocument(String),

    /// 无法编码的值
    #[error("cannot encode {type_name} under key {key:?}: {reason}")]
    UnsupportedValue {
        type_name: &'static str,
        key: String,
        reason: String,
    },

    /// 嵌套层级超过限制
    #[error("nesting deeper than {max} levels at key {key:?}")]
    DepthExceeded { max: usize, key: String },

    /// 键或字符串不是有效的 UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    /// 与 bson crate 之间的转换失败
    #[error("bson interop error: {0}")]
    Interop(String),
}

pub type BsonResult<T> = Result<T, BsonError>;

/// 持有调用方选项的编解码入口
///
/// 选项随 `Codec` 传递,不同线程可以各自使用不同的省略策略。
#[derive(Debug, Clone, Default)]
pub struct Codec {
    options: CodecOptions,
}

impl Codec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// 编码为新分配的字节数组
    pub fn marshal<T: Marshal + ?Sized>(&self, value: &T) -> BsonResult<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.options.initial_buffer_size());
        self.marshal_into(value, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// 追加编码到调用方缓冲区
    ///
    /// # Brief
    /// 缓冲区按 `BytesMut` 的倍增策略扩容;出错时截断回调用前的长度
    ///
    /// # Arguments
    /// * `value` - 结构体、字符串键映射或文档
    /// * `buf` - 调用方持有的缓冲区
    pub fn marshal_into<T: Marshal + ?Sized>(&self, value: &T, buf: &mut BytesMut) -> BsonResult<()> {
        let start = buf.len();
        let result = value.marshal_document(&mut Encoder::new(buf, &self.options));
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    /// 解码到可变引用目标
    pub fn unmarshal<T: Unmarshal + ?Sized>(&self, data: &[u8], target: &mut T) -> BsonResult<()> {
        target.unmarshal_bytes(data, &self.options)
    }
}

/// 使用默认选项编码
pub fn marshal<T: Marshal + ?Sized>(value: &T) -> BsonResult<Vec<u8>> {
    Codec::default().marshal(value)
}

/// 使用默认选项追加编码到缓冲区
pub fn marshal_into<T: Marshal + ?Sized>(value: &T, buf: &mut BytesMut) -> BsonResult<()> {
    Codec::default().marshal_into(value, buf)
}

/// 使用默认选项解码
pub fn unmarshal<T: Unmarshal + ?Sized>(data: &[u8], target: &mut T) -> BsonResult<()> {
    Codec::default().unmarshal(data, target)
}

/// 将类型化对象转换为驱动使用的 `bson::Document`
pub fn encode_document<T: Marshal + ?Sized>(value: &T) -> BsonResult<::bson::Document> {
    Codec::default().encode_document(value)
}

/// 将驱动返回的 `bson::Document` 绑定到类型化对象
pub fn decode_document<T: Unmarshal + ?Sized>(doc: &::bson::Document, target: &mut T) -> BsonResult<()> {
    Codec::default().decode_document(doc, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(BsonStruct, Debug, Clone, PartialEq, Default)]
    struct Product {
        #[bson("_id,omitempty")]
        id: String,
        #[bson("name")]
        name: String,
    }

    #[derive(BsonStruct, Debug, Clone, PartialEq, Default)]
    struct Stamped {
        #[bson("_id")]
        id: ObjectId,
        name: String,
        #[bson(",inline")]
        extra: HashMap<String, Value>,
    }

    #[derive(BsonStruct, Debug, Default)]
    struct Counter {
        #[bson(",minsize")]
        hits: i64,
        total: i64,
    }

    #[derive(BsonStruct, Debug, Default)]
    struct Sparse {
        name: String,
        count: i32,
        tags: Vec<String>,
        parent: Option<Box<Sparse>>,
    }

    #[test]
    fn test_empty_id_omitted() {
        let product = Product {
            id: String::new(),
            name: "widget".to_string(),
        };
        let bytes = marshal(&product).unwrap();
        let parsed = parse_document(&bytes, spec::DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(parsed, document! { "name" => "widget" });

        let mut decoded = Product::default();
        unmarshal(&bytes, &mut decoded).unwrap();
        assert_eq!(decoded, product);
    }

    #[test]
    fn test_unknown_key_into_inline_map() {
        let id = ObjectId::new();
        let bytes = marshal(&document! { "_id" => id, "created_on" => 100 }).unwrap();

        let mut decoded = Stamped::default();
        unmarshal(&bytes, &mut decoded).unwrap();
        assert_eq!(decoded.id, id);
        assert_eq!(decoded.extra.get("created_on"), Some(&Value::Int32(100)));
        assert!(!decoded.extra.contains_key("_id"));
    }

    #[test]
    fn test_invalid_dynamic_target() {
        let bytes = marshal(&document! { "a" => 1 }).unwrap();
        let mut target = Value::from("not a document");
        let err = unmarshal(&bytes, &mut target).unwrap_err();
        assert!(matches!(err, BsonError::InvalidTarget { .. }));
        assert!(err.to_string().contains("document"));
    }

    #[test]
    fn test_minsize() {
        let bytes = marshal(&Counter { hits: 42, total: 42 }).unwrap();
        let doc = parse_document(&bytes, spec::DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(doc.get("hits"), Some(&Value::Int32(42)));
        assert_eq!(doc.get("total"), Some(&Value::Int64(42)));

        let bytes = marshal(&Counter { hits: i64::MAX, total: 0 }).unwrap();
        let doc = parse_document(&bytes, spec::DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(doc.get("hits"), Some(&Value::Int64(i64::MAX)));
    }

    #[test]
    fn test_default_omit_empty_switch() {
        let value = Sparse::default();

        let keep = Codec::default().marshal(&value).unwrap();
        let doc = parse_document(&keep, spec::DEFAULT_MAX_DEPTH).unwrap();
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["name", "count", "tags", "parent"]);
        assert_eq!(doc.get("parent"), Some(&Value::Null));

        let mut options = CodecOptions::default();
        options.set_default_omit_empty(true);
        assert!(options.is_default_omit_empty());
        let omit = Codec::new(options).marshal(&value).unwrap();
        assert_eq!(omit, vec![5, 0, 0, 0, 0]);
    }

    #[test]
    fn test_marshal_into_appends_and_rolls_back() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        marshal_into(&document! { "a" => 1 }, &mut buf).unwrap();
        assert_eq!(&buf[..6], b"prefix");
        assert_eq!(buf.len(), 6 + 12);

        let before = buf.len();
        let err = marshal_into(&document! { "bad\0key" => 1 }, &mut buf).unwrap_err();
        assert!(matches!(err, BsonError::UnsupportedValue { .. }));
        assert_eq!(buf.len(), before);
    }

    #[test]
    fn test_top_level_value_must_be_document() {
        let err = marshal(&Value::from(3)).unwrap_err();
        assert!(matches!(err, BsonError::UnsupportedValue { .. }));
        assert!(marshal(&Value::Document(document! { "a" => 1 })).is_ok());
    }

    #[test]
    fn test_error_messages_name_type_and_field() {
        let err = BsonError::Configuration {
            type_name: "Product",
            field: "id",
            kind: ConfigErrorKind::UnsupportedFlag {
                flag: "bogus".to_string(),
                tag: "_id,bogus".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Product"));
        assert!(msg.contains("`id`"));
        assert!(msg.contains("bogus"));
    }
}
