use anyhow::{Context, Result};
use restock_checkout::utils::logging;
use restock_checkout::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 配置文件路径：第一个参数，默认 config.toml
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path).with_context(|| format!("无法加载配置: {}", config_path))?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
