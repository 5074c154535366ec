use crate::config::LogConfig;

/// 初始化全局 tracing 订阅者
///
/// RUST_LOG 环境变量优先于配置中的级别。重复调用时保留第一次安装的订阅者。
pub fn init_logging(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry
            .with(fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_keeps_first_subscriber() {
        let config = LogConfig::default();
        init_logging(&config);
        init_logging(&LogConfig {
            json: true,
            ..config
        });
        tracing::info!("logging initialized");
    }
}
