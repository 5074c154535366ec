pub mod error;
pub mod types;
pub mod config;
pub mod logging;

pub use config::{CodecConfig, LogConfig, MongoConfig};
pub use error::{CommonError, CommonResult};
pub use logging::init_logging;
pub use types::*;
