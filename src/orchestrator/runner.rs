//! 命令行运行器 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：创建存储、代理池、浏览器启动器、策略注册表和编排器
//! 2. **加载任务**：读取任务文件，导入代理列表
//! 3. **并发控制**：同时最多运行 `max_concurrent_tasks` 个任务，其余排队
//! 4. **事件驱动**：任务结束后启动下一个排队任务
//! 5. **退出处理**：Ctrl-C 停止全部任务，输出统计

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::{
    CredentialVault, EventSink, FanoutSink, JsonLinesSink, LogSink, MemoryStore, PassthroughVault, TaskStore,
};
use crate::models::{load_task_file, Task, TaskEvent, TaskId, TaskStatus};
use crate::orchestrator::{OrchestratorDeps, TaskOrchestrator};
use crate::proxy::{ProbeSettings, ProxyPool};
use crate::strategy::StrategyRegistry;
use crate::utils::logging::{log_startup, log_tasks_loaded, print_final_stats};
use crate::utils::truncate_text;

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<MemoryStore>,
    vault: Arc<dyn CredentialVault>,
    proxy_pool: Arc<ProxyPool>,
    orchestrator: Arc<TaskOrchestrator>,
    events: mpsc::UnboundedReceiver<TaskEvent>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(config.max_concurrent_tasks);

        let store = Arc::new(MemoryStore::new());
        let vault: Arc<dyn CredentialVault> = Arc::new(PassthroughVault);
        let proxy_pool = Arc::new(ProxyPool::new(
            store.clone(),
            vault.clone(),
            ProbeSettings::from_config(&config),
        ));

        let (events_tx, events) = mpsc::unbounded_channel();
        let mut sink = FanoutSink::new()
            .with(Arc::new(events_tx))
            .with(Arc::new(LogSink));
        if let Some(path) = &config.events_file {
            info!("📝 事件将写入 {}", path);
            sink = sink.with(Arc::new(JsonLinesSink::new(path.clone())));
        }
        let sink: Arc<dyn EventSink> = Arc::new(sink);

        let orchestrator = TaskOrchestrator::new(OrchestratorDeps {
            store: store.clone(),
            sink,
            launcher: browser::launcher_from_config(&config),
            registry: Arc::new(StrategyRegistry::with_builtin()),
            proxy_pool: proxy_pool.clone(),
            vault: vault.clone(),
            config: config.clone(),
        });

        Ok(Self {
            config,
            store,
            vault,
            proxy_pool,
            orchestrator,
            events,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<()> {
        self.import_proxies().await;

        let tasks = self.load_tasks().await?;
        if tasks.is_empty() {
            warn!("⚠️ 任务文件中没有任务，程序结束");
            self.orchestrator.shutdown().await;
            return Ok(());
        }

        let total = tasks.len();
        let max_concurrent = self.config.max_concurrent_tasks.max(1);
        log_tasks_loaded(total, max_concurrent);

        let mut queue: VecDeque<Task> = tasks.into();
        let mut running: HashSet<TaskId> = HashSet::new();
        let mut stats = RunStats::default();

        fill_slots(&self.orchestrator, &mut queue, &mut running, &mut stats, max_concurrent).await;

        while !running.is_empty() {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("\n⚠️ 收到中断信号，正在停止全部任务...");
                    self.orchestrator.shutdown().await;
                    stats.stopped += running.len() + queue.len();
                    running.clear();
                    queue.clear();
                    break;
                }
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    if !running.contains(&event.task_id) {
                        continue;
                    }
                    match event.status {
                        TaskStatus::Success => stats.success += 1,
                        TaskStatus::Failed => {
                            if let Some(error) = &event.error {
                                error!("[任务 {}] 失败原因: {}", event.task_id, truncate_text(error, 200));
                            }
                            stats.failed += 1;
                        }
                        _ => continue,
                    }
                    running.remove(&event.task_id);
                    fill_slots(&self.orchestrator, &mut queue, &mut running, &mut stats, max_concurrent).await;
                }
            }
        }

        if !self.orchestrator.running_tasks().await.is_empty() {
            self.orchestrator.shutdown().await;
        }

        print_final_stats(stats.success, stats.failed, stats.stopped, total);
        Ok(())
    }

    /// 导入代理列表文件（可选）
    async fn import_proxies(&self) {
        let Some(path) = &self.config.proxies_file else {
            return;
        };
        match self.proxy_pool.import_from_file(path).await {
            Ok(report) => {
                for err in &report.errors {
                    warn!("代理导入失败: {}", err);
                }
                if self.config.auto_select_proxy && report.imported > 0 {
                    self.proxy_pool.test_all(None).await;
                }
            }
            Err(e) => error!("❌ 读取代理文件 {} 失败: {}", path, e),
        }
    }

    /// 加载任务文件，把任务和结账身份写入存储
    async fn load_tasks(&self) -> Result<Vec<Task>> {
        info!("\n📁 正在加载任务文件: {}", self.config.tasks_file);
        let loaded = load_task_file(Path::new(&self.config.tasks_file)).await?;

        for profile in loaded.profiles {
            let profile_id = profile.id.clone();
            let sealed = profile
                .encrypted(self.vault.as_ref())
                .with_context(|| format!("无法加密结账身份 {}", profile_id))?;
            self.store.upsert_identity(sealed).await?;
        }
        for task in &loaded.tasks {
            self.store.upsert_task(task.clone()).await?;
        }
        Ok(loaded.tasks)
    }
}

/// 在并发上限内启动排队任务
async fn fill_slots(
    orchestrator: &TaskOrchestrator,
    queue: &mut VecDeque<Task>,
    running: &mut HashSet<TaskId>,
    stats: &mut RunStats,
    max_concurrent: usize,
) {
    while running.len() < max_concurrent {
        let Some(task) = queue.pop_front() else {
            break;
        };
        let task_id = task.id.clone();
        info!("[任务 {}] 📦 启动任务: {} ({})", task_id, task.name, task.retailer);
        match orchestrator.start(task).await {
            Ok(()) => {
                running.insert(task_id);
            }
            Err(e) => {
                error!("[任务 {}] ❌ 无法启动: {}", task_id, e);
                stats.failed += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    success: usize,
    failed: usize,
    stopped: usize,
}
