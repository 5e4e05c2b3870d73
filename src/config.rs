use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppResult;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时运行的任务数量
    pub max_concurrent_tasks: usize,
    /// 浏览器可执行文件路径（为空时由 chromiumoxide 自动查找）
    pub browser_executable: Option<String>,
    /// 是否以无头模式启动浏览器
    pub headless: bool,
    /// 已运行浏览器的调试端口（设置后改为连接模式，不再为每个任务启动浏览器）
    pub browser_debug_port: Option<u16>,
    /// 页面 User-Agent
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    /// 页面导航与元素等待超时（毫秒）
    pub navigation_timeout_ms: u64,
    // --- 代理健康检查 ---
    pub probe_url: String,
    pub probe_timeout_ms: u64,
    /// 是否在任务未指定代理时自动选择最优代理
    pub auto_select_proxy: bool,
    // --- 会话 ---
    /// 停止会话时等待当前操作结束的最长时间（毫秒）
    pub stop_timeout_ms: u64,
    /// 监控间隔下限（毫秒）
    pub min_monitor_delay_ms: u64,
    // --- 文件 ---
    pub tasks_file: String,
    pub proxies_file: Option<String>,
    pub events_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            browser_executable: None,
            headless: true,
            browser_debug_port: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_ms: 30_000,
            probe_url: "https://www.google.com".to_string(),
            probe_timeout_ms: 10_000,
            auto_select_proxy: false,
            stop_timeout_ms: 30_000,
            min_monitor_delay_ms: 500,
            tasks_file: "tasks.toml".to_string(),
            proxies_file: None,
            events_file: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 加载配置：文件存在时读取文件，随后应用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let base = if path.exists() {
            info!("📄 读取配置文件: {}", path.display());
            Self::from_toml_file(path)?
        } else {
            debug!("配置文件 {} 不存在，使用默认配置", path.display());
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            max_concurrent_tasks: env_parse("MAX_CONCURRENT_TASKS").unwrap_or(default.max_concurrent_tasks),
            browser_executable: std::env::var("BROWSER_EXECUTABLE").ok().or(default.browser_executable),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").or(default.browser_debug_port),
            user_agent: std::env::var("USER_AGENT").unwrap_or(default.user_agent),
            window_width: env_parse("WINDOW_WIDTH").unwrap_or(default.window_width),
            window_height: env_parse("WINDOW_HEIGHT").unwrap_or(default.window_height),
            navigation_timeout_ms: env_parse("NAVIGATION_TIMEOUT_MS").unwrap_or(default.navigation_timeout_ms),
            probe_url: std::env::var("PROBE_URL").unwrap_or(default.probe_url),
            probe_timeout_ms: env_parse("PROBE_TIMEOUT_MS").unwrap_or(default.probe_timeout_ms),
            auto_select_proxy: env_parse("AUTO_SELECT_PROXY").unwrap_or(default.auto_select_proxy),
            stop_timeout_ms: env_parse("STOP_TIMEOUT_MS").unwrap_or(default.stop_timeout_ms),
            min_monitor_delay_ms: env_parse("MIN_MONITOR_DELAY_MS").unwrap_or(default.min_monitor_delay_ms),
            tasks_file: std::env::var("TASKS_FILE").unwrap_or(default.tasks_file),
            proxies_file: std::env::var("PROXIES_FILE").ok().or(default.proxies_file),
            events_file: std::env::var("EVENTS_FILE").ok().or(default.events_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn min_monitor_delay(&self) -> Duration {
        Duration::from_millis(self.min_monitor_delay_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            max_concurrent_tasks = 3
            auto_select_proxy = true
            proxies_file = "proxies.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_tasks, 3);
        assert!(config.auto_select_proxy);
        assert_eq!(config.proxies_file.as_deref(), Some("proxies.txt"));
        assert_eq!(config.probe_timeout_ms, Config::default().probe_timeout_ms);
        assert!(config.headless);
    }

    #[test]
    fn test_durations() {
        let config = Config {
            stop_timeout_ms: 1500,
            ..Config::default()
        };
        assert_eq!(config.stop_timeout(), Duration::from_millis(1500));
    }
}
