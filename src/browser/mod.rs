pub mod connection;
pub mod launcher;

pub use connection::ConnectedLauncher;
pub use launcher::{BrowserLauncher, BrowserResource, ChromeLauncher, LaunchSettings};

use std::sync::Arc;

use crate::config::Config;

/// 按配置选择浏览器获取方式：设置了调试端口时连接已有浏览器，否则为每个任务启动新浏览器
pub fn launcher_from_config(config: &Config) -> Arc<dyn BrowserLauncher> {
    match config.browser_debug_port {
        Some(port) => Arc::new(ConnectedLauncher::new(port, config.user_agent.clone())),
        None => Arc::new(ChromeLauncher::new(LaunchSettings::from_config(config))),
    }
}
