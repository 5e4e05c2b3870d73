use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::auth::Credentials;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CdpPage, PageDriver};
use crate::models::Proxy;

/// 会话独占的浏览器资源
///
/// 释放只能通过 [`BrowserResource::close`]，由会话的统一释放流程调用一次
#[async_trait]
pub trait BrowserResource: Send {
    /// 会话使用的页面
    fn page(&self) -> Arc<dyn PageDriver>;

    /// 关闭页面与浏览器，释放资源
    async fn close(&mut self) -> AppResult<()>;
}

/// 浏览器资源的获取方式
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// 为任务获取浏览器与页面，并完成代理配置与认证
    async fn launch(&self, task_id: &str, proxy: Option<&Proxy>) -> AppResult<Box<dyn BrowserResource>>;
}

/// 浏览器启动参数
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub executable: Option<String>,
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub request_timeout: std::time::Duration,
}

impl LaunchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executable: config.browser_executable.clone(),
            headless: config.headless,
            user_agent: config.user_agent.clone(),
            window_width: config.window_width,
            window_height: config.window_height,
            request_timeout: config.navigation_timeout(),
        }
    }
}

/// 为每个任务启动独立的 Chromium 进程
pub struct ChromeLauncher {
    settings: LaunchSettings,
}

impl ChromeLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }

    fn build_config(&self, profile_dir: &Path, proxy: Option<&Proxy>) -> AppResult<BrowserConfig> {
        let mut args = vec![
            "--no-sandbox".to_string(),             // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-setuid-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),  // 防止共享内存不足
            "--disable-gpu".to_string(),
            "--ignore-certificate-errors".to_string(),
        ];
        if let Some(proxy) = proxy {
            args.push(format!("--proxy-server={}", proxy.server_arg()));
        }

        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.window_width, self.settings.window_height)
            .user_data_dir(profile_dir)
            .request_timeout(self.settings.request_timeout)
            .args(args);

        builder = if self.settings.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };

        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(|e| {
            error!("配置浏览器失败: {}", e);
            AppError::Browser(format!("配置浏览器失败: {}", e))
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, task_id: &str, proxy: Option<&Proxy>) -> AppResult<Box<dyn BrowserResource>> {
        info!("[任务 {}] 🚀 启动浏览器...", task_id);

        // 每个会话使用独立的用户目录，避免多个浏览器争用同一个 profile
        let profile_dir = std::env::temp_dir()
            .join("restock-checkout")
            .join(format!("{}-{}", task_id, uuid::Uuid::new_v4()));
        let config = self.build_config(&profile_dir, proxy)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("[任务 {}] 启动浏览器失败: {}", task_id, e);
            AppError::Browser(format!("启动浏览器失败: {}", e))
        })?;
        debug!("[任务 {}] 浏览器启动成功", task_id);

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 添加短暂延迟以等待浏览器状态同步
        sleep(tokio::time::Duration::from_millis(300)).await;

        let mut session = ChromeSession {
            browser,
            page: None,
            handler_task,
            profile_dir,
        };

        // 页面准备失败时也要关闭已启动的浏览器
        match prepare_page(&session.browser, proxy, &self.settings.user_agent).await {
            Ok(page) => {
                session.page = Some(Arc::new(page));
                info!("[任务 {}] ✅ 浏览器与页面已就绪", task_id);
                Ok(Box::new(session))
            }
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!("[任务 {}] 关闭启动失败的浏览器出错: {}", task_id, close_err);
                }
                Err(e)
            }
        }
    }
}

/// 创建空白页并配置代理认证与 User-Agent
pub(crate) async fn prepare_page(
    browser: &Browser,
    proxy: Option<&Proxy>,
    user_agent: &str,
) -> AppResult<CdpPage> {
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        AppError::Browser(format!("创建页面失败: {}", e))
    })?;

    if let Some(proxy) = proxy.filter(|p| p.has_credentials()) {
        debug!("配置代理认证: {}", proxy.server_arg());
        page.authenticate(Credentials {
            username: proxy.username.clone().unwrap_or_default(),
            password: proxy.password.clone().unwrap_or_default(),
        })
        .await
        .map_err(|e| AppError::Proxy(format!("代理认证配置失败: {}", e)))?;
    }

    page.set_user_agent(SetUserAgentOverrideParams::new(user_agent))
        .await?;

    Ok(CdpPage::new(page))
}

/// 独立启动的浏览器会话
pub struct ChromeSession {
    browser: Browser,
    page: Option<Arc<CdpPage>>,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
}

#[async_trait]
impl BrowserResource for ChromeSession {
    fn page(&self) -> Arc<dyn PageDriver> {
        match &self.page {
            Some(page) => page.clone() as Arc<dyn PageDriver>,
            None => Arc::new(ClosedPage),
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        self.page = None;
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            debug!("等待浏览器进程退出失败: {}", e);
        }
        self.handler_task.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!("清理浏览器用户目录 {} 失败: {}", self.profile_dir.display(), e);
        }
        closed
            .map(|_| ())
            .map_err(|e| AppError::Browser(format!("关闭浏览器失败: {}", e)))
    }
}

/// 资源关闭后返回的页面，所有操作都报错
pub(crate) struct ClosedPage;

#[async_trait]
impl PageDriver for ClosedPage {
    async fn goto(&self, url: &str) -> AppResult<()> {
        Err(AppError::navigation(url, "页面已关闭"))
    }

    async fn reload(&self) -> AppResult<()> {
        Err(AppError::Browser("页面已关闭".to_string()))
    }

    async fn eval(&self, _js_code: &str) -> AppResult<serde_json::Value> {
        Err(AppError::Browser("页面已关闭".to_string()))
    }

    async fn current_url(&self) -> AppResult<Option<String>> {
        Ok(None)
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        Err(AppError::selector_not_found(selector))
    }

    async fn type_into(&self, selector: &str, _text: &str) -> AppResult<()> {
        Err(AppError::selector_not_found(selector))
    }
}
