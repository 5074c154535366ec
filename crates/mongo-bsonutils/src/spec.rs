//! BSON 规范常量
//!
//! 元素类型标记与二进制子类型取自 <http://bsonspec.org>,
//! 只保留领域文档实际用到的类型。

pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const INITIAL_BUFFER_SIZE: usize = 64;

/// 最小文档: 4 字节长度 + 1 字节结束符
pub const MIN_DOCUMENT_SIZE: usize = 5;

pub const BINARY_GENERIC: u8 = 0x00;
pub const BINARY_OLD: u8 = 0x02;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Double = 0x01,
    String = 0x02,
    Document = 0x03,
    Array = 0x04,
    Binary = 0x05,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    Int32 = 0x10,
    Int64 = 0x12,
}

impl ElementType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Double),
            0x02 => Some(Self::String),
            0x03 => Some(Self::Document),
            0x04 => Some(Self::Array),
            0x05 => Some(Self::Binary),
            0x07 => Some(Self::ObjectId),
            0x08 => Some(Self::Boolean),
            0x09 => Some(Self::DateTime),
            0x0A => Some(Self::Null),
            0x10 => Some(Self::Int32),
            0x12 => Some(Self::Int64),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::String => "string",
            Self::Document => "document",
            Self::Array => "array",
            Self::Binary => "binary",
            Self::ObjectId => "objectId",
            Self::Boolean => "bool",
            Self::DateTime => "date",
            Self::Null => "null",
            Self::Int32 => "int",
            Self::Int64 => "long",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_roundtrip() {
        for byte in 0u8..=0x20 {
            if let Some(kind) = ElementType::from_u8(byte) {
                assert_eq!(kind as u8, byte);
            }
        }
        assert_eq!(ElementType::from_u8(0x06), None);
        assert_eq!(ElementType::from_u8(0x13), None);
    }
}
