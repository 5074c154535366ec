//! 公共类型定义模块
//!
//! 定义驱动层与编解码层共享的核心类型:
//! - ObjectId: 12 字节唯一标识符(MongoDB 默认主键类型)
//! - now_in_milli: created_on / updated_on 使用的毫秒时间戳

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// ObjectId - 12 字节唯一标识符
///
/// 格式(与 MongoDB 一致):
/// - 前 4 字节: 时间戳(秒,大端)
/// - 中间 5 字节: 进程级随机数
/// - 后 3 字节: 自增计数器(大端)
///
/// 全零的 ObjectId 视为零值,编码时受 omitempty 规则约束。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    /// 生成新的 ObjectId
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let timestamp = chrono::Utc::now().timestamp() as u32;
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(PROCESS_UNIQUE.get_or_init(rand_bytes::<5>));

        let counter = COUNTER
            .get_or_init(|| {
                let seed: [u8; 4] = rand_bytes();
                AtomicU32::new(u32::from_le_bytes(seed))
            })
            .fetch_add(1, Ordering::SeqCst);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 12])
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 12]
    }

    /// 创建时间(秒级 Unix 时间戳)
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 从 24 位十六进制字符串解析
    pub fn from_hex(s: &str) -> CommonResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CommonError::InvalidObjectId(format!("Invalid hex {:?}: {}", s, e)))?;
        let arr: [u8; 12] = bytes.try_into().map_err(|_| {
            CommonError::InvalidObjectId(format!("ObjectId must be 12 bytes: {:?}", s))
        })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 12]> for ObjectId {
    fn from(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }
}

/// 当前时间的毫秒时间戳
///
/// 文档的 created_on / updated_on 字段统一使用该精度。
pub fn now_in_milli() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn rand_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    #[cfg(target_os = "linux")]
    {
        use std::fs::File;
        use std::io::Read;
        if let Ok(mut f) = File::open("/dev/urandom") {
            if f.read_exact(&mut bytes).is_ok() {
                return bytes;
            }
        }
    }
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let state = RandomState::new();
    for chunk in bytes.chunks_mut(8) {
        let mut hasher = state.build_hasher();
        hasher.write_u128(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u128);
        let hash = hasher.finish().to_le_bytes();
        let len = chunk.len();
        chunk.copy_from_slice(&hash[..len]);
    }
    bytes
}
