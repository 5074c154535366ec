//! BSON 线上格式编解码模块
//!
//! `Encoder` 负责把元素写入 `BytesMut` 缓冲区(文档长度回填),
//! `parse_document` 把字节解析为 `Document` 并校验长度、结束符与尾随字节。
//! 结构体与映射的遍历逻辑分别位于 `ser` 与 `de` 模块。

use crate::document::Document;
use crate::options::CodecOptions;
use crate::spec::*;
use crate::value::{Binary, UtcDateTime, Value};
use crate::{BsonError, BsonResult};
use bytes::{BufMut, BytesMut};
use mongo_common::ObjectId;

/// BSON 元素写入器
///
/// 每个 `write_*` 方法写出一个完整元素:类型字节 + cstring 键 + 负载。
pub struct Encoder<'a> {
    buf: &'a mut BytesMut,
    options: &'a CodecOptions,
    depth: usize,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut BytesMut, options: &'a CodecOptions) -> Self {
        Self {
            buf,
            options,
            depth: 0,
        }
    }

    pub fn options(&self) -> &CodecOptions {
        self.options
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 写出顶层文档
    pub fn write_document<F>(&mut self, body: F) -> BsonResult<()>
    where
        F: FnOnce(&mut Self) -> BsonResult<()>,
    {
        self.write_body("", body)
    }

    /// 写出嵌套文档或数组元素
    pub fn write_embedded<F>(&mut self, element: ElementType, key: &str, body: F) -> BsonResult<()>
    where
        F: FnOnce(&mut Self) -> BsonResult<()>,
    {
        self.write_header(element, key)?;
        self.write_body(key, body)
    }

    pub fn write_double(&mut self, key: &str, v: f64) -> BsonResult<()> {
        self.write_header(ElementType::Double, key)?;
        self.buf.put_f64_le(v);
        Ok(())
    }

    pub fn write_string(&mut self, key: &str, v: &str) -> BsonResult<()> {
        self.write_header(ElementType::String, key)?;
        let len = checked_len(key, v.len() + 1)?;
        self.buf.put_i32_le(len);
        self.buf.put_slice(v.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    pub fn write_binary(&mut self, key: &str, subtype: u8, bytes: &[u8]) -> BsonResult<()> {
        self.write_header(ElementType::Binary, key)?;
        if subtype == BINARY_OLD {
            let len = checked_len(key, bytes.len() + 4)?;
            self.buf.put_i32_le(len);
            self.buf.put_u8(subtype);
            self.buf.put_i32_le(len - 4);
        } else {
            let len = checked_len(key, bytes.len())?;
            self.buf.put_i32_le(len);
            self.buf.put_u8(subtype);
        }
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn write_object_id(&mut self, key: &str, id: &ObjectId) -> BsonResult<()> {
        self.write_header(ElementType::ObjectId, key)?;
        self.buf.put_slice(id.as_bytes());
        Ok(())
    }

    pub fn write_bool(&mut self, key: &str, v: bool) -> BsonResult<()> {
        self.write_header(ElementType::Boolean, key)?;
        self.buf.put_u8(v as u8);
        Ok(())
    }

    /// 写出 UTC 日期时间(自 Unix 纪元起的毫秒数)
    pub fn write_datetime(&mut self, key: &str, millis: i64) -> BsonResult<()> {
        self.write_header(ElementType::DateTime, key)?;
        self.buf.put_i64_le(millis);
        Ok(())
    }

    pub fn write_null(&mut self, key: &str) -> BsonResult<()> {
        self.write_header(ElementType::Null, key)
    }

    pub fn write_i32(&mut self, key: &str, v: i32) -> BsonResult<()> {
        self.write_header(ElementType::Int32, key)?;
        self.buf.put_i32_le(v);
        Ok(())
    }

    pub fn write_i64(&mut self, key: &str, v: i64) -> BsonResult<()> {
        self.write_header(ElementType::Int64, key)?;
        self.buf.put_i64_le(v);
        Ok(())
    }

    /// 原样写出已编码的文档或数组负载
    pub fn write_raw(&mut self, element: ElementType, key: &str, payload: &[u8]) -> BsonResult<()> {
        self.write_header(element, key)?;
        self.buf.put_slice(payload);
        Ok(())
    }

    /// 把已编码的文档字节拼接为当前文档的元素序列(去掉长度头与结束符)
    pub(crate) fn splice_document(&mut self, data: &[u8]) -> BsonResult<()> {
        if data.len() < MIN_DOCUMENT_SIZE {
            return Err(BsonError::CorruptDocument(format!(
                "raw document of {} bytes is too short",
                data.len()
            )));
        }
        self.buf.put_slice(&data[4..data.len() - 1]);
        Ok(())
    }

    pub fn write_value(&mut self, key: &str, value: &Value) -> BsonResult<()> {
        match value {
            Value::Double(n) => self.write_double(key, *n),
            Value::String(s) => self.write_string(key, s),
            Value::Document(doc) => {
                self.write_embedded(ElementType::Document, key, |enc| enc.write_fields(doc))
            }
            Value::Array(arr) => self.write_embedded(ElementType::Array, key, |enc| {
                for (i, item) in arr.iter().enumerate() {
                    enc.write_value(&i.to_string(), item)?;
                }
                Ok(())
            }),
            Value::Binary(b) => self.write_binary(key, b.subtype, &b.bytes),
            Value::ObjectId(id) => self.write_object_id(key, id),
            Value::Boolean(b) => self.write_bool(key, *b),
            Value::DateTime(dt) => self.write_datetime(key, dt.timestamp_millis()),
            Value::Null => self.write_null(key),
            Value::Int32(n) => self.write_i32(key, *n),
            Value::Int64(n) => self.write_i64(key, *n),
        }
    }

    pub fn write_fields(&mut self, doc: &Document) -> BsonResult<()> {
        for (key, value) in doc.iter() {
            self.write_value(key, value)?;
        }
        Ok(())
    }

    fn write_header(&mut self, element: ElementType, key: &str) -> BsonResult<()> {
        if key.as_bytes().contains(&0) {
            return Err(BsonError::UnsupportedValue {
                type_name: "key",
                key: key.to_string(),
                reason: "document keys cannot contain NUL bytes".to_string(),
            });
        }
        self.buf.put_u8(element as u8);
        self.buf.put_slice(key.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    fn write_body<F>(&mut self, key: &str, body: F) -> BsonResult<()>
    where
        F: FnOnce(&mut Self) -> BsonResult<()>,
    {
        if self.depth >= self.options.max_depth() {
            return Err(BsonError::DepthExceeded {
                max: self.options.max_depth(),
                key: key.to_string(),
            });
        }
        let start = self.buf.len();
        self.buf.put_i32_le(0);

        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result?;

        self.buf.put_u8(0);
        let len = checked_len(key, self.buf.len() - start)?;
        self.buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }
}

fn checked_len(key: &str, len: usize) -> BsonResult<i32> {
    i32::try_from(len).map_err(|_| BsonError::UnsupportedValue {
        type_name: "document",
        key: key.to_string(),
        reason: format!("{} bytes exceed the BSON int32 length limit", len),
    })
}

/// 解析一个完整的 BSON 文档
///
/// # Brief
/// 按声明长度读取文档,拒绝长度不符、缺少结束符与尾随字节的输入
///
/// # Arguments
/// * `data` - 文档字节
/// * `max_depth` - 允许的最大嵌套层数
///
/// # Returns
/// 成功返回 Document, 结构错误返回 CorruptDocument 或 DepthExceeded
pub fn parse_document(data: &[u8], max_depth: usize) -> BsonResult<Document> {
    let mut decoder = Decoder::new(data, max_depth);
    let doc = decoder.read_document("")?;
    if decoder.pos < data.len() {
        return Err(BsonError::CorruptDocument(format!(
            "{} trailing bytes after document end",
            data.len() - decoder.pos
        )));
    }
    Ok(doc)
}

/// BSON 解码器
///
/// 内部结构,嵌套文档使用按声明长度截取的子切片解析,
/// 元素越界即视为文档损坏。
struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
    /// 正在读取的文档,用于错误信息
    scope: String,
    last_key: String,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8], max_depth: usize) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            max_depth,
            scope: "input".to_string(),
            last_key: String::new(),
        }
    }

    fn read_document(&mut self, key: &str) -> BsonResult<Document> {
        let body = self.read_document_bytes(key)?;
        let mut inner = Decoder {
            data: body,
            pos: 4,
            depth: self.depth + 1,
            max_depth: self.max_depth,
            scope: if key.is_empty() {
                "root document".to_string()
            } else {
                format!("document {:?}", key)
            },
            last_key: String::new(),
        };
        let mut doc = Document::new();
        loop {
            let tag = inner.read_u8()?;
            if tag == 0 {
                if inner.pos != body.len() {
                    return Err(BsonError::CorruptDocument(format!(
                        "terminator found {} bytes before the declared end of {:?}",
                        body.len() - inner.pos,
                        key
                    )));
                }
                break;
            }
            let name = inner.read_cstring(key)?;
            inner.last_key.clone_from(&name);
            let value = inner.read_value(tag, &name)?;
            doc.insert(name, value);
        }
        Ok(doc)
    }

    fn read_array(&mut self, key: &str) -> BsonResult<Vec<Value>> {
        let doc = self.read_document(key)?;
        Ok(doc.into_iter().map(|(_, v)| v).collect())
    }

    /// 读取长度头并返回整个文档(含长度头与结束符)的切片
    fn read_document_bytes(&mut self, key: &str) -> BsonResult<&'a [u8]> {
        if self.depth >= self.max_depth {
            return Err(BsonError::DepthExceeded {
                max: self.max_depth,
                key: key.to_string(),
            });
        }
        let start = self.pos;
        let len = self.read_i32()?;
        if len < MIN_DOCUMENT_SIZE as i32 {
            return Err(BsonError::CorruptDocument(format!(
                "invalid document length {} at {:?}",
                len, key
            )));
        }
        let end = start + len as usize;
        if end > self.data.len() {
            return Err(BsonError::CorruptDocument(format!(
                "document length {} at {:?} exceeds the {} available bytes",
                len,
                key,
                self.data.len() - start
            )));
        }
        if self.data[end - 1] != 0 {
            return Err(BsonError::CorruptDocument(format!(
                "document at {:?} is not terminated",
                key
            )));
        }
        self.pos = end;
        Ok(&self.data[start..end])
    }

    fn read_value(&mut self, tag: u8, key: &str) -> BsonResult<Value> {
        let element = ElementType::from_u8(tag).ok_or_else(|| {
            BsonError::CorruptDocument(format!(
                "unsupported element type {:#04x} for key {:?}",
                tag, key
            ))
        })?;
        match element {
            ElementType::Double => Ok(Value::Double(f64::from_le_bytes(self.read_array_of()?))),
            ElementType::String => Ok(Value::String(self.read_string(key)?)),
            ElementType::Document => Ok(Value::Document(self.read_document(key)?)),
            ElementType::Array => Ok(Value::Array(self.read_array(key)?)),
            ElementType::Binary => Ok(Value::Binary(self.read_binary(key)?)),
            ElementType::ObjectId => Ok(Value::ObjectId(ObjectId::from_bytes(self.read_array_of()?))),
            ElementType::Boolean => match self.read_u8()? {
                0 => Ok(Value::Boolean(false)),
                1 => Ok(Value::Boolean(true)),
                b => Err(BsonError::CorruptDocument(format!(
                    "invalid boolean byte {:#04x} for key {:?}",
                    b, key
                ))),
            },
            ElementType::DateTime => Ok(Value::DateTime(UtcDateTime::from_millis(self.read_i64()?))),
            ElementType::Null => Ok(Value::Null),
            ElementType::Int32 => Ok(Value::Int32(self.read_i32()?)),
            ElementType::Int64 => Ok(Value::Int64(self.read_i64()?)),
        }
    }

    fn read_binary(&mut self, key: &str) -> BsonResult<Binary> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(BsonError::CorruptDocument(format!(
                "negative binary length for key {:?}",
                key
            )));
        }
        let subtype = self.read_u8()?;
        let mut bytes = self.read_bytes(len as usize)?;
        if subtype == BINARY_OLD {
            if bytes.len() < 4 {
                return Err(BsonError::CorruptDocument(format!(
                    "old binary without inner length for key {:?}",
                    key
                )));
            }
            let inner = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if inner < 0 || inner as usize != bytes.len() - 4 {
                return Err(BsonError::CorruptDocument(format!(
                    "old binary inner length mismatch for key {:?}",
                    key
                )));
            }
            bytes = &bytes[4..];
        }
        Ok(Binary::with_subtype(subtype, bytes))
    }

    fn read_string(&mut self, key: &str) -> BsonResult<String> {
        let len = self.read_i32()?;
        if len < 1 {
            return Err(BsonError::CorruptDocument(format!(
                "invalid string length {} for key {:?}",
                len, key
            )));
        }
        let bytes = self.read_bytes(len as usize)?;
        let (text, terminator) = bytes.split_at(bytes.len() - 1);
        if terminator[0] != 0 {
            return Err(BsonError::CorruptDocument(format!(
                "string for key {:?} is not terminated",
                key
            )));
        }
        String::from_utf8(text.to_vec()).map_err(|_| BsonError::InvalidUtf8(format!("value of {:?}", key)))
    }

    fn read_cstring(&mut self, parent: &str) -> BsonResult<String> {
        let rest = &self.data[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            BsonError::CorruptDocument(format!("unterminated key inside {:?}", parent))
        })?;
        let key = std::str::from_utf8(&rest[..nul])
            .map_err(|_| BsonError::InvalidUtf8(format!("key inside {:?}", parent)))?
            .to_string();
        self.pos += nul + 1;
        Ok(key)
    }

    fn read_bytes(&mut self, len: usize) -> BsonResult<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(self.overrun(len, available));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn overrun(&self, needed: usize, available: usize) -> BsonError {
        let place = if self.last_key.is_empty() {
            "before the first element".to_string()
        } else {
            format!("after key {:?}", self.last_key)
        };
        BsonError::CorruptDocument(format!(
            "{} is shorter than declared: {} bytes needed {}, {} left",
            self.scope, needed, place, available
        ))
    }

    fn read_array_of<const N: usize>(&mut self) -> BsonResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_u8(&mut self) -> BsonResult<u8> {
        Ok(self.read_array_of::<1>()?[0])
    }

    fn read_i32(&mut self) -> BsonResult<i32> {
        Ok(i32::from_le_bytes(self.read_array_of()?))
    }

    fn read_i64(&mut self) -> BsonResult<i64> {
        Ok(i64::from_le_bytes(self.read_array_of()?))
    }
}
