use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::browser::launcher::{prepare_page, BrowserLauncher, BrowserResource, ClosedPage};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CdpPage, PageDriver};
use crate::models::Proxy;

/// 连接到已运行的调试浏览器
///
/// 每个会话在该浏览器中打开自己的页面，释放时只关闭这个页面。
/// 浏览器进程的代理在启动时已经确定，无法按任务切换。
pub struct ConnectedLauncher {
    port: u16,
    user_agent: String,
}

impl ConnectedLauncher {
    pub fn new(port: u16, user_agent: impl Into<String>) -> Self {
        Self {
            port,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ConnectedLauncher {
    async fn launch(&self, task_id: &str, proxy: Option<&Proxy>) -> AppResult<Box<dyn BrowserResource>> {
        // 共享浏览器的代理在启动时已固定，不能带着任务代理继续运行
        if let Some(proxy) = proxy {
            error!(
                "[任务 {}] ❌ 连接模式下无法为单个任务设置代理 {}",
                task_id,
                proxy.server_arg()
            );
            return Err(AppError::configuration(format!(
                "连接模式 (端口 {}) 不支持任务代理 {}，请取消代理或改用独立启动模式",
                self.port,
                proxy.server_arg()
            )));
        }

        let browser_url = format!("http://localhost:{}", self.port);
        info!("[任务 {}] 正在连接到浏览器: {}", task_id, browser_url);

        let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
            error!("[任务 {}] 连接浏览器失败: {}", task_id, e);
            AppError::Browser(format!("无法连接到浏览器 (端口: {}): {}", self.port, e))
        })?;
        debug!("[任务 {}] 浏览器连接成功", task_id);

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

        match prepare_page(&browser, None, &self.user_agent).await {
            Ok(page) => Ok(Box::new(AttachedPage {
                _browser: browser,
                page: Some(Arc::new(page)),
                handler_task,
            })),
            Err(e) => {
                handler_task.abort();
                Err(e)
            }
        }
    }
}

/// 在共享浏览器中打开的会话页面
pub struct AttachedPage {
    _browser: Browser,
    page: Option<Arc<CdpPage>>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserResource for AttachedPage {
    fn page(&self) -> Arc<dyn PageDriver> {
        match &self.page {
            Some(page) => page.clone() as Arc<dyn PageDriver>,
            None => Arc::new(ClosedPage),
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        let result = match self.page.take() {
            Some(page) => page
                .page()
                .clone()
                .close()
                .await
                .map_err(|e| AppError::Browser(format!("关闭页面失败: {}", e))),
            None => Ok(()),
        };
        self.handler_task.abort();
        result
    }
}
