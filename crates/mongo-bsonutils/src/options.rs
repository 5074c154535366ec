//! 编解码选项
//!
//! 选项由调用方持有并随每次调用传递,编码器只读取不修改。

use crate::spec::{DEFAULT_MAX_DEPTH, INITIAL_BUFFER_SIZE};
use mongo_common::CodecConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    default_omit_empty: bool,
    max_depth: usize,
    initial_buffer_size: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            default_omit_empty: false,
            max_depth: DEFAULT_MAX_DEPTH,
            initial_buffer_size: INITIAL_BUFFER_SIZE,
        }
    }
}

impl CodecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对所有未显式声明 omitempty 的字段启用或关闭零值省略
    pub fn set_default_omit_empty(&mut self, state: bool) {
        self.default_omit_empty = state;
    }

    pub fn is_default_omit_empty(&self) -> bool {
        self.default_omit_empty
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn initial_buffer_size(&self) -> usize {
        self.initial_buffer_size
    }

    pub fn with_default_omit_empty(mut self, state: bool) -> Self {
        self.default_omit_empty = state;
        self
    }

    /// 最小为 1 (顶层文档本身占一层)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }
}

impl From<&CodecConfig> for CodecOptions {
    fn from(config: &CodecConfig) -> Self {
        Self::default()
            .with_default_omit_empty(config.default_omit_empty)
            .with_max_depth(config.max_depth)
            .with_initial_buffer_size(config.initial_buffer_size)
    }
}
