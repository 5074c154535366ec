//! CRUD 层使用的文档辅助函数
//!
//! `M` 是驱动查询/更新时使用的无序通用映射。

use crate::de::Unmarshal;
use crate::ser::Marshal;
use crate::value::Value;
use crate::{BsonResult, Codec, CodecOptions};
use std::collections::HashMap;

pub type M = HashMap<String, Value>;

fn omit_empty_codec() -> Codec {
    Codec::new(CodecOptions::default().with_default_omit_empty(true))
}

/// 把任意结构的文档转换为 `M`,零值字段被省略
///
/// # Brief
/// 以默认省略开启的选项编码,再解码为映射
///
/// # Arguments
/// * `value` - 类型化文档
///
/// # Returns
/// 只含非零值字段的映射
pub fn map_document<T: Marshal + ?Sized>(value: &T) -> BsonResult<M> {
    let codec = omit_empty_codec();
    let bytes = codec.marshal(value)?;
    let mut out = M::new();
    codec.unmarshal(&bytes, &mut out)?;
    Ok(out)
}

/// 用 `M` 中的键值填充目标结构
pub fn init_document<T: Unmarshal + ?Sized>(source: &M, target: &mut T) -> BsonResult<()> {
    let codec = omit_empty_codec();
    let bytes = codec.marshal(source)?;
    codec.unmarshal(&bytes, target)
}

pub fn marshal_m(m: &M) -> BsonResult<Vec<u8>> {
    crate::marshal(m)
}

pub fn unmarshal_to_m(data: &[u8]) -> BsonResult<M> {
    let mut out = M::new();
    crate::unmarshal(data, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BsonStruct, ObjectId};

    #[derive(BsonStruct, Debug, Default, PartialEq)]
    struct Product {
        #[bson("_id")]
        id: ObjectId,
        name: String,
        created_on: i64,
        updated_on: i64,
    }

    #[test]
    fn test_map_document_skips_zero_fields() {
        let product = Product {
            id: ObjectId::new(),
            name: "widget".to_string(),
            created_on: 1_700_000_000_000,
            updated_on: 0,
        };
        let m = map_document(&product).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.get("_id"), Some(&Value::ObjectId(product.id)));
        assert_eq!(m.get("name"), Some(&Value::from("widget")));
        assert_eq!(m.get("created_on"), Some(&Value::Int64(1_700_000_000_000)));
        assert!(!m.contains_key("updated_on"));
    }

    #[test]
    fn test_init_document() {
        let mut m = M::new();
        m.insert("name".to_string(), Value::from("gadget"));
        m.insert("created_on".to_string(), Value::Int32(5));
        m.insert("unknown".to_string(), Value::from(true));

        let mut product = Product::default();
        init_document(&m, &mut product).unwrap();
        assert_eq!(product.name, "gadget");
        assert_eq!(product.created_on, 5);
        assert!(product.id.is_zero());
    }

    #[test]
    fn test_m_roundtrip() {
        let mut m = M::new();
        m.insert("a".to_string(), Value::Int32(1));
        m.insert("b".to_string(), Value::Array(vec![Value::from("x")]));
        let bytes = marshal_m(&m).unwrap();
        assert_eq!(unmarshal_to_m(&bytes).unwrap(), m);
    }
}
