//! 与 `bson` crate 的互转模块
//!
//! 网络驱动层收发 `bson::Document`,本模块负责类型化对象与它之间的转换,
//! 以及 `Value` 树与 `Bson` 树的直接映射。

use crate::de::Unmarshal;
use crate::document::Document;
use crate::ser::Marshal;
use crate::value::{Binary, UtcDateTime, Value};
use crate::{BsonError, BsonResult, Codec};
use ::bson::spec::BinarySubtype;
use ::bson::{Bson, Document as BsonDocument};
use mongo_common::ObjectId;

impl Codec {
    /// 编码为驱动使用的 `bson::Document`
    ///
    /// # Brief
    /// 先按当前选项编码为字节,再由 `bson` crate 读取,保证省略规则与 marshal 一致
    ///
    /// # Arguments
    /// * `value` - 类型化对象或映射
    ///
    /// # Returns
    /// 成功返回 bson::Document
    pub fn encode_document<T: Marshal + ?Sized>(&self, value: &T) -> BsonResult<BsonDocument> {
        let bytes = self.marshal(value)?;
        BsonDocument::from_reader(&mut &bytes[..])
            .map_err(|e| BsonError::Interop(format!("reading encoded document failed: {}", e)))
    }

    /// 把驱动返回的 `bson::Document` 绑定到目标
    pub fn decode_document<T: Unmarshal + ?Sized>(&self, doc: &BsonDocument, target: &mut T) -> BsonResult<()> {
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes)
            .map_err(|e| BsonError::Interop(format!("writing driver document failed: {}", e)))?;
        self.unmarshal(&bytes, target)
    }
}

/// 将 Value 转换为 Bson
pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Double(f) => Bson::Double(*f),
        Value::String(s) => Bson::String(s.clone()),
        Value::Document(doc) => Bson::Document(to_bson_document(doc)),
        Value::Array(arr) => Bson::Array(arr.iter().map(to_bson).collect()),
        Value::Binary(b) => Bson::Binary(::bson::Binary {
            subtype: BinarySubtype::from(b.subtype),
            bytes: b.bytes.clone(),
        }),
        Value::ObjectId(id) => Bson::ObjectId(::bson::oid::ObjectId::from_bytes(id.bytes())),
        Value::Boolean(b) => Bson::Boolean(*b),
        Value::DateTime(dt) => Bson::DateTime(::bson::DateTime::from_millis(dt.timestamp_millis())),
        Value::Null => Bson::Null,
        Value::Int32(n) => Bson::Int32(*n),
        Value::Int64(n) => Bson::Int64(*n),
    }
}

pub fn to_bson_document(doc: &Document) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (key, value) in doc.iter() {
        out.insert(key, to_bson(value));
    }
    out
}

/// 从 Bson 转换为 Value
///
/// # Brief
/// 只支持领域文档用到的类型,其余类型返回 `BsonError::Interop`
///
/// # Arguments
/// * `bson` - BSON 值
///
/// # Returns
/// 成功返回 Value
pub fn from_bson(bson: &Bson) -> BsonResult<Value> {
    match bson {
        Bson::Double(f) => Ok(Value::Double(*f)),
        Bson::String(s) => Ok(Value::String(s.clone())),
        Bson::Document(doc) => Ok(Value::Document(from_bson_document(doc)?)),
        Bson::Array(arr) => {
            let values: BsonResult<Vec<_>> = arr.iter().map(from_bson).collect();
            Ok(Value::Array(values?))
        }
        Bson::Binary(b) => Ok(Value::Binary(Binary::with_subtype(u8::from(b.subtype), b.bytes.clone()))),
        Bson::ObjectId(oid) => Ok(Value::ObjectId(ObjectId::from_bytes(oid.bytes()))),
        Bson::Boolean(b) => Ok(Value::Boolean(*b)),
        Bson::DateTime(dt) => Ok(Value::DateTime(UtcDateTime::from_millis(dt.timestamp_millis()))),
        Bson::Null => Ok(Value::Null),
        Bson::Int32(n) => Ok(Value::Int32(*n)),
        Bson::Int64(n) => Ok(Value::Int64(*n)),
        other => Err(BsonError::Interop(format!(
            "unsupported bson element type {:?}",
            other.element_type()
        ))),
    }
}

pub fn from_bson_document(doc: &BsonDocument) -> BsonResult<Document> {
    let mut out = Document::with_capacity(doc.len());
    for (key, value) in doc {
        out.insert(key.as_str(), from_bson(value)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::BINARY_OLD;
    use crate::{decode_document, document, encode_document, marshal, BsonStruct, CodecOptions};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    #[derive(BsonStruct, Debug, Clone, Default, PartialEq)]
    struct Product {
        #[bson("_id,omitempty")]
        id: ObjectId,
        name: String,
        price: f64,
        #[bson("stock,minsize")]
        stock: i64,
        tags: Vec<String>,
        #[bson(",inline")]
        extra: HashMap<String, Value>,
    }

    #[test]
    fn test_encode_document_for_driver() {
        let product = Product {
            name: "widget".to_string(),
            price: 9.5,
            stock: 3,
            tags: vec!["a".to_string()],
            ..Product::default()
        };
        let doc = encode_document(&product).unwrap();
        assert_eq!(
            doc,
            ::bson::doc! {
                "name": "widget",
                "price": 9.5,
                "stock": 3i32,
                "tags": ["a"],
            }
        );
    }

    #[test]
    fn test_decode_document_from_driver() {
        let oid = ::bson::oid::ObjectId::new();
        let doc = ::bson::doc! {
            "_id": oid,
            "name": "gadget",
            "price": 3i32,
            "stock": 7i64,
            "created_on": 100i64,
        };
        let mut product = Product::default();
        decode_document(&doc, &mut product).unwrap();
        assert_eq!(product.id, ObjectId::from_bytes(oid.bytes()));
        assert_eq!(product.price, 3.0);
        assert_eq!(product.stock, 7);
        assert_eq!(product.extra.get("created_on"), Some(&Value::Int64(100)));
    }

    #[test]
    fn test_codec_options_apply() {
        let codec = Codec::new(CodecOptions::default().with_default_omit_empty(true));
        let doc = codec.encode_document(&Product::default()).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_bytes_match_bson_crate() {
        let product = Product {
            id: ObjectId::from_bytes([7; 12]),
            name: "n".to_string(),
            price: 1.25,
            stock: 1 << 40,
            tags: vec![],
            extra: HashMap::new(),
        };
        let ours = marshal(&product).unwrap();
        let mut theirs = Vec::new();
        encode_document(&product).unwrap().to_writer(&mut theirs).unwrap();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_value_tree_conversion() {
        let value = Value::Document(document! {
            "s" => "x",
            "n" => 1,
            "l" => 2i64,
            "arr" => vec![Value::Null, Value::from(true)],
            "old" => Binary::with_subtype(BINARY_OLD, vec![1u8, 2]),
            "when" => Utc.timestamp_millis_opt(1_000).unwrap(),
        });
        let restored = from_bson(&to_bson(&value)).unwrap();
        assert_eq!(restored, value);
    }

    #[derive(BsonStruct, Debug, Default, PartialEq)]
    struct Named {
        name: String,
    }

    #[derive(BsonStruct, Debug, Default, PartialEq)]
    struct Stamped {
        name: String,
        when: DateTime<Utc>,
    }

    #[test]
    fn test_datetime_beyond_chrono_range_is_not_fatal() {
        let doc = ::bson::doc! { "name": "x", "when": ::bson::DateTime::MAX };

        let mut named = Named::default();
        decode_document(&doc, &mut named).unwrap();
        assert_eq!(named.name, "x");

        let mut map: HashMap<String, Value> = HashMap::new();
        decode_document(&doc, &mut map).unwrap();
        assert_eq!(map.get("when"), Some(&Value::DateTime(UtcDateTime::MAX)));

        // chrono 字段无法表示该值,保持零值
        let mut stamped = Stamped::default();
        decode_document(&doc, &mut stamped).unwrap();
        assert_eq!(stamped.name, "x");
        assert_eq!(stamped.when.timestamp_millis(), 0);

        assert_eq!(
            from_bson(&Bson::DateTime(::bson::DateTime::MIN)).unwrap(),
            Value::DateTime(UtcDateTime::MIN)
        );
    }

    #[test]
    fn test_unsupported_bson_type() {
        let err = from_bson(&Bson::Symbol("s".to_string())).unwrap_err();
        assert!(matches!(err, BsonError::Interop(_)));
    }
}
