use config::{Config, Environment, File};
use std::error::Error;
use std::path::{Path, PathBuf};
use tickstore_core::config::AppConfig;

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "TICKSTORE_CONFIG";
/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/tickstore.toml";

/// # Summary
/// 解析配置文件路径：优先环境变量，否则取默认路径。
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// # Summary
/// 加载并校验应用配置。
///
/// # Logic
/// 1. 读取配置文件（可选，不存在时全部取默认值）。
/// 2. 叠加 `TICKSTORE__SECTION__KEY` 形式的环境变量覆盖。
/// 3. 反序列化为 `AppConfig` 并校验。
///
/// # Arguments
/// * `path`: 配置文件路径。
///
/// # Returns
/// 校验通过的配置。
pub fn load_from(path: &Path) -> Result<AppConfig, Box<dyn Error>> {
    let config: AppConfig = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("TICKSTORE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("kline.periods")
                .with_list_parse_key("storage.extra_columns"),
        )
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}
