use std::sync::Arc;

use restock_checkout::browser::{BrowserLauncher, ChromeLauncher, ConnectedLauncher, LaunchSettings};
use restock_checkout::config::Config;
use restock_checkout::infrastructure::{MemoryStore, PassthroughVault, TaskStore};
use restock_checkout::models::{Task, TaskStatus};
use restock_checkout::proxy::{ProbeSettings, ProxyPool};
use restock_checkout::strategy::StrategyRegistry;
use restock_checkout::utils::logging;
use restock_checkout::{OrchestratorDeps, TaskOrchestrator};
use tokio::sync::mpsc;

#[tokio::test]
#[ignore] // 默认忽略，需要本机安装 Chromium：cargo test -- --ignored
async fn test_launch_and_close_browser() {
    logging::init(true);

    let config = Config::from_env();
    let launcher = ChromeLauncher::new(LaunchSettings::from_config(&config));

    let mut resource = launcher.launch("integration", None).await.expect("启动浏览器失败");
    let page = resource.page();
    page.goto("https://example.com").await.expect("打开页面失败");

    let url = page.current_url().await.expect("读取地址失败");
    assert!(url.unwrap_or_default().contains("example.com"));

    resource.close().await.expect("关闭浏览器失败");
}

#[tokio::test]
#[ignore]
async fn test_connect_to_running_browser() {
    logging::init(true);

    // 需要先以 --remote-debugging-port 启动浏览器
    let config = Config::from_env();
    let port = config.browser_debug_port.unwrap_or(2001);
    let launcher = ConnectedLauncher::new(port, config.user_agent.clone());

    let mut resource = launcher.launch("attached", None).await.expect("连接浏览器失败");
    resource.close().await.expect("关闭页面失败");
}

#[tokio::test]
#[ignore]
async fn test_monitor_real_product_page() {
    logging::init(true);

    // 通过环境变量指定真实商品页，例如 PRODUCT_URL=https://shop.example.com/products/x
    let Ok(product_url) = std::env::var("PRODUCT_URL") else {
        return;
    };
    let config = Config::from_env();
    let store = Arc::new(MemoryStore::new());
    let (tx, mut events) = mpsc::unbounded_channel();
    let orchestrator = TaskOrchestrator::new(OrchestratorDeps {
        store: store.clone(),
        sink: Arc::new(tx),
        launcher: Arc::new(ChromeLauncher::new(LaunchSettings::from_config(&config))),
        registry: Arc::new(StrategyRegistry::with_builtin()),
        proxy_pool: Arc::new(ProxyPool::new(
            store.clone(),
            Arc::new(PassthroughVault),
            ProbeSettings::from_config(&config),
        )),
        vault: Arc::new(PassthroughVault),
        config,
    });

    let task = Task::new("真实页面监控", "generic").with_product_url(product_url);
    let task_id = task.id.clone();
    store.upsert_task(task.clone()).await.expect("写入任务失败");

    orchestrator.start(task).await.expect("启动任务失败");
    while let Some(event) = events.recv().await {
        if event.status == TaskStatus::Monitoring {
            break;
        }
    }
    orchestrator.stop(&task_id).await.expect("停止任务失败");

    let stored = store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Idle);
}
