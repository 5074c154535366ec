//! 配置模块
//!
//! 定义编解码层与日志的配置选项,支持从 TOML 文件加载:
//!
//! ```toml
//! [codec]
//! default_omit_empty = true
//! max_depth = 64
//!
//! [log]
//! level = "debug"
//! ```

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MongoConfig {
    /// BSON 编解码配置
    #[serde(default)]
    pub codec: CodecConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl MongoConfig {
    /// 从 TOML 文本解析配置
    pub fn from_toml_str(text: &str) -> CommonResult<Self> {
        let config: MongoConfig =
            toml::from_str(text).map_err(|e| CommonError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> CommonResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> CommonResult<()> {
        if self.codec.max_depth == 0 {
            return Err(CommonError::Config("codec.max_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// BSON 编解码配置
///
/// 编码层据此构造 `CodecOptions`,由调用方持有并逐次传入,
/// 不存在进程级可变开关。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// 未显式声明 omitempty 的字段是否也按 omitempty 处理 (默认: false)
    #[serde(default)]
    pub default_omit_empty: bool,

    /// 文档/数组最大嵌套层数 (默认: 100)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// marshal 新建缓冲区的初始容量 (默认: 64)
    #[serde(default = "default_initial_buffer_size")]
    pub initial_buffer_size: usize,
}

fn default_max_depth() -> usize { 100 }
fn default_initial_buffer_size() -> usize { 64 }

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            default_omit_empty: false,
            max_depth: default_max_depth(),
            initial_buffer_size: default_initial_buffer_size(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别 (默认: info),环境变量 RUST_LOG 优先
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式 (默认: false)
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
