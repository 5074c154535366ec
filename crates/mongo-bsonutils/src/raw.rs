//! 原始捕获值
//!
//! 作为解码目标时原样保存字节,不做字段级解析,需要时再调用
//! [`Raw::unmarshal`] 延迟解码。作为字段时保存单个元素的负载。

use crate::codec::{parse_document, Encoder};
use crate::de::{Decode, Unmarshal};
use crate::document::Document;
use crate::options::CodecOptions;
use crate::ser::{Encode, Marshal};
use crate::spec::ElementType;
use crate::value::Value;
use crate::{BsonError, BsonResult, Codec};
use bytes::{BufMut, BytesMut};

/// 元素类型字节 + 未解析的负载
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Raw {
    pub kind: u8,
    pub data: Vec<u8>,
}

impl Raw {
    pub fn new(kind: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// 捕获整个文档
    pub fn from_document_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ElementType::Document as u8, data)
    }

    pub fn element_type(&self) -> Option<ElementType> {
        ElementType::from_u8(self.kind)
    }

    /// 延迟解码到目标
    pub fn unmarshal<T: Unmarshal + ?Sized>(&self, target: &mut T) -> BsonResult<()> {
        self.unmarshal_with(target, &CodecOptions::default())
    }

    pub fn unmarshal_with<T: Unmarshal + ?Sized>(&self, target: &mut T, options: &CodecOptions) -> BsonResult<()> {
        match self.element_type() {
            Some(ElementType::Document) | Some(ElementType::Array) => {
                Codec::new(options.clone()).unmarshal(&self.data, target)
            }
            _ => Err(BsonError::InvalidTarget {
                target: "Raw".to_string(),
                reason: format!("raw value of kind {:#04x} is not a document", self.kind),
            }),
        }
    }

    /// 解析负载为 `Value`
    ///
    /// 负载被包装成 `{"": <元素>}` 后复用文档解析器。
    pub fn to_value(&self) -> BsonResult<Value> {
        let element = self.element_type().ok_or_else(|| {
            BsonError::CorruptDocument(format!("unsupported raw element kind {:#04x}", self.kind))
        })?;
        let len = 4 + 1 + 1 + self.data.len() + 1;
        let mut buf = BytesMut::with_capacity(len);
        buf.put_i32_le(i32::try_from(len).map_err(|_| {
            BsonError::CorruptDocument(format!("raw value of {} bytes is too large", self.data.len()))
        })?);
        buf.put_u8(element as u8);
        buf.put_u8(0);
        buf.put_slice(&self.data);
        buf.put_u8(0);

        let mut doc = parse_document(&buf, CodecOptions::default().max_depth())?;
        Ok(doc.remove("").unwrap_or_default())
    }

    /// 把单个值编码为原始负载
    pub fn from_value(value: &Value) -> BsonResult<Self> {
        let options = CodecOptions::default();
        let mut buf = BytesMut::new();
        Encoder::new(&mut buf, &options).write_document(|enc| enc.write_value("", value))?;
        // 长度头(4) + 类型(1) + 空键结束符(1) ... 文档结束符(1)
        let payload = &buf[6..buf.len() - 1];
        Ok(Self::new(value.element_type() as u8, payload))
    }
}

impl Unmarshal for Raw {
    fn unmarshal_document(&mut self, doc: &Document) -> BsonResult<()> {
        *self = Raw::from_document_bytes(crate::marshal(doc)?);
        Ok(())
    }

    fn unmarshal_bytes(&mut self, data: &[u8], _options: &CodecOptions) -> BsonResult<()> {
        *self = Raw::from_document_bytes(data);
        Ok(())
    }
}

impl Marshal for Raw {
    fn marshal_document(&self, enc: &mut Encoder<'_>) -> BsonResult<()> {
        match self.element_type() {
            Some(ElementType::Document) => enc.write_document(|enc| enc.splice_document(&self.data)),
            _ => Err(BsonError::UnsupportedValue {
                type_name: "Raw",
                key: String::new(),
                reason: format!("raw value of kind {:#04x} is not a document", self.kind),
            }),
        }
    }
}

impl Encode for Raw {
    fn encode_element(&self, enc: &mut Encoder<'_>, key: &str, _min_size: bool) -> BsonResult<()> {
        if self.is_zero() {
            return enc.write_null(key);
        }
        let element = self.element_type().ok_or_else(|| BsonError::UnsupportedValue {
            type_name: "Raw",
            key: key.to_string(),
            reason: format!("unsupported raw element kind {:#04x}", self.kind),
        })?;
        enc.write_raw(element, key, &self.data)
    }

    fn is_zero(&self) -> bool {
        self.kind == 0 && self.data.is_empty()
    }
}

impl Decode for Raw {
    fn decode_value(&mut self, value: &Value) -> BsonResult<bool> {
        *self = Raw::from_value(value)?;
        Ok(true)
    }

    fn zero() -> Self {
        Raw::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document, marshal, unmarshal, BsonStruct};

    #[derive(BsonStruct, Debug, Default, PartialEq)]
    struct Envelope {
        kind: String,
        payload: Raw,
    }

    #[derive(BsonStruct, Debug, Default, PartialEq)]
    struct Payload {
        size: i32,
    }

    #[test]
    fn test_capture_is_verbatim() {
        let bytes = marshal(&document! { "a" => 1, "b" => "two" }).unwrap();
        let mut raw = Raw::default();
        unmarshal(&bytes, &mut raw).unwrap();
        assert_eq!(raw.kind, 0x03);
        assert_eq!(raw.data, bytes);

        let mut doc = Document::new();
        raw.unmarshal(&mut doc).unwrap();
        assert_eq!(doc, document! { "a" => 1, "b" => "two" });
    }

    #[test]
    fn test_capture_skips_parsing() {
        // 损坏的字节在延迟解码时才报错
        let mut raw = Raw::default();
        unmarshal(&[1, 2, 3], &mut raw).unwrap();
        let mut doc = Document::new();
        assert!(raw.unmarshal(&mut doc).is_err());
    }

    #[test]
    fn test_raw_field_roundtrip() {
        let inner = marshal(&Payload { size: 3 }).unwrap();
        let envelope = Envelope {
            kind: "payload".to_string(),
            payload: Raw::from_document_bytes(inner.clone()),
        };
        let bytes = marshal(&envelope).unwrap();

        let mut decoded = Envelope::default();
        unmarshal(&bytes, &mut decoded).unwrap();
        assert_eq!(decoded.payload.kind, 0x03);
        assert_eq!(decoded.payload.data, inner);

        let mut payload = Payload::default();
        decoded.payload.unmarshal(&mut payload).unwrap();
        assert_eq!(payload.size, 3);
    }

    #[test]
    fn test_scalar_raw_value() {
        let raw = Raw::from_value(&Value::from("hi")).unwrap();
        assert_eq!(raw.kind, 0x02);
        assert_eq!(raw.to_value().unwrap(), Value::from("hi"));

        let mut doc = Document::new();
        assert!(matches!(
            raw.unmarshal(&mut doc),
            Err(BsonError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_marshal_captured_document() {
        let bytes = marshal(&document! { "x" => 1i64 }).unwrap();
        let raw = Raw::from_document_bytes(bytes.clone());
        assert_eq!(marshal(&raw).unwrap(), bytes);
    }
}
