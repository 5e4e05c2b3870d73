//! 任务编排器
//!
//! ## 职责
//!
//! - 维护 `task_id → SessionHandle` 注册表，保证同一任务最多一个会话
//! - 启动前解析代理与结账身份
//! - 通过事件泵把会话状态写入存储并推送到界面
//!
//! 写入存储失败不会回滚浏览器里已经发生的操作（例如已提交的订单），
//! 只记录日志并在事件中带上错误。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CredentialVault, EventSink, TaskStore};
use crate::models::{CheckoutIdentity, Proxy, Task, TaskEvent, TaskId, TaskStatus};
use crate::proxy::ProxyPool;
use crate::session::{AutomationSession, SessionEvent, SessionHandle, SessionParams, SessionReport, SessionState};
use crate::strategy::StrategyRegistry;

/// 编排器依赖
pub struct OrchestratorDeps {
    pub store: Arc<dyn TaskStore>,
    pub sink: Arc<dyn EventSink>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub registry: Arc<StrategyRegistry>,
    pub proxy_pool: Arc<ProxyPool>,
    pub vault: Arc<dyn CredentialVault>,
    pub config: Config,
}

pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn EventSink>,
    launcher: Arc<dyn BrowserLauncher>,
    registry: Arc<StrategyRegistry>,
    proxy_pool: Arc<ProxyPool>,
    vault: Arc<dyn CredentialVault>,
    config: Config,

    sessions: Mutex<HashMap<TaskId, SessionHandle>>,
    /// 同一任务的 start / stop 按任务串行，不同任务互不等待
    task_locks: StdMutex<HashMap<TaskId, Arc<Mutex<()>>>>,
    /// start / stop 持读锁，shutdown 持写锁
    lifecycle: RwLock<()>,
    generation: AtomicU64,
    events_tx: StdMutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl TaskOrchestrator {
    /// 创建编排器并启动事件泵
    pub fn new(deps: OrchestratorDeps) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(Self {
            store: deps.store,
            sink: deps.sink,
            launcher: deps.launcher,
            registry: deps.registry,
            proxy_pool: deps.proxy_pool,
            vault: deps.vault,
            config: deps.config,
            sessions: Mutex::new(HashMap::new()),
            task_locks: StdMutex::new(HashMap::new()),
            lifecycle: RwLock::new(()),
            generation: AtomicU64::new(0),
            events_tx: StdMutex::new(Some(events_tx)),
            pump: StdMutex::new(None),
        });

        let pump = tokio::spawn(run_event_pump(Arc::downgrade(&orchestrator), events_rx));
        *lock(&orchestrator.pump) = Some(pump);
        orchestrator
    }

    /// 启动任务
    ///
    /// 同一任务已有会话时，先完整停止旧会话再创建新会话
    pub async fn start(&self, task: Task) -> AppResult<()> {
        let _lifecycle = self.lifecycle.read().await;
        let task_lock = self.task_lock(&task.id);
        let _op = task_lock.lock().await;

        let previous = self.sessions.lock().await.remove(&task.id);
        if let Some(previous) = previous {
            info!("[任务 {}] 🔁 任务已在运行，先停止旧会话", task.id);
            match previous.stop(self.config.stop_timeout()).await {
                Ok(report) => log_report(&report),
                Err(e) => warn!("[任务 {}] 停止旧会话出错: {}", task.id, e),
            }
        }

        match self.prepare(&task).await {
            Ok((proxy, identity)) => self.spawn_session(task, proxy, identity).await,
            Err(e) => {
                error!("[任务 {}] ❌ 启动失败: {}", task.id, e);
                let persist_error = self.persist_status(&task.id, TaskStatus::Idle).await;
                let message = match persist_error {
                    Some(p) => format!("{}; {}", e, p),
                    None => e.to_string(),
                };
                self.sink
                    .emit(TaskEvent::status(&task.id, TaskStatus::Idle).with_error(message));
                Err(e)
            }
        }
    }

    fn task_lock(&self, task_id: &str) -> Arc<Mutex<()>> {
        lock(&self.task_locks)
            .entry(task_id.to_string())
            .or_default()
            .clone()
    }

    async fn prepare(&self, task: &Task) -> AppResult<(Option<Proxy>, Option<CheckoutIdentity>)> {
        if task.retailer.trim().is_empty() {
            return Err(AppError::configuration(format!("任务 {} 未指定零售商", task.id)));
        }
        if !task.has_product_reference() {
            return Err(AppError::configuration(format!(
                "任务 {} 缺少商品链接或商品编号",
                task.id
            )));
        }

        let proxy = self.resolve_proxy(task).await?;
        let identity = self.load_identity(task).await?;
        Ok((proxy, identity))
    }

    async fn resolve_proxy(&self, task: &Task) -> AppResult<Option<Proxy>> {
        if let Some(proxy_id) = task.proxy_id.as_deref().filter(|id| !id.is_empty()) {
            return match self.proxy_pool.get_proxy(proxy_id).await? {
                Some(proxy) => Ok(Some(proxy)),
                None => Err(AppError::configuration(format!("代理不存在: {}", proxy_id))),
            };
        }

        if !self.config.auto_select_proxy {
            return Ok(None);
        }

        match self
            .proxy_pool
            .select_best_proxy(&task.retailer, task.proxy_location.as_deref())
            .await
        {
            Some(proxy_id) => self.proxy_pool.get_proxy(&proxy_id).await,
            None => {
                warn!("[任务 {}] ⚠️ 没有可用代理，将不使用代理运行", task.id);
                Ok(None)
            }
        }
    }

    async fn load_identity(&self, task: &Task) -> AppResult<Option<CheckoutIdentity>> {
        let Some(profile_id) = task.profile_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let identity = self
            .store
            .get_identity(profile_id)
            .await?
            .ok_or_else(|| AppError::configuration(format!("结账身份不存在: {}", profile_id)))?;
        Ok(Some(identity.decrypted(self.vault.as_ref())?))
    }

    async fn spawn_session(
        &self,
        task: Task,
        proxy: Option<Proxy>,
        identity: Option<CheckoutIdentity>,
    ) -> AppResult<()> {
        let events = lock(&self.events_tx)
            .clone()
            .ok_or_else(|| AppError::Session("编排器已关闭".to_string()))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = task.id.clone();

        if let Some(proxy) = &proxy {
            info!("[任务 {}] 🌐 使用代理 {}", task_id, proxy.server_arg());
        }

        // 持有注册表锁直到句柄插入，事件泵才能识别新会话的事件
        let mut sessions = self.sessions.lock().await;
        let handle = AutomationSession::spawn(SessionParams {
            task,
            generation,
            proxy,
            identity,
            launcher: self.launcher.clone(),
            registry: self.registry.clone(),
            events,
            navigation_timeout: self.config.navigation_timeout(),
            min_monitor_delay: self.config.min_monitor_delay(),
        });
        sessions.insert(task_id.clone(), handle);
        info!("[任务 {}] ▶️ 会话已启动 (第 {} 代)", task_id, generation);
        Ok(())
    }

    /// 停止任务
    ///
    /// 任务未运行时只记录警告。无论停止过程是否出错，返回时注册表中都已没有该任务。
    pub async fn stop(&self, task_id: &str) -> AppResult<()> {
        let _lifecycle = self.lifecycle.read().await;
        let task_lock = self.task_lock(task_id);
        let _op = task_lock.lock().await;

        let removed = self.sessions.lock().await.remove(task_id);
        let Some(handle) = removed else {
            warn!("[任务 {}] ⚠️ 任务未在运行，忽略停止请求", task_id);
            return Ok(());
        };

        info!("[任务 {}] ⏹️ 正在停止任务", task_id);
        let outcome = handle.stop(self.config.stop_timeout()).await;
        self.finish_stop(task_id, outcome).await
    }

    async fn finish_stop(&self, task_id: &str, outcome: AppResult<SessionReport>) -> AppResult<()> {
        match outcome {
            Ok(report) => {
                log_report(&report);
                // 停止前已经结束的会话由事件泵记录结果
                if report.final_state == SessionState::Stopped {
                    let persist_error = self.persist_status(task_id, TaskStatus::Idle).await;
                    let mut event = TaskEvent::status(task_id, TaskStatus::Idle);
                    if let Some(message) = join_errors([persist_error, report.release_error.clone()]) {
                        event = event.with_error(message);
                    }
                    self.sink.emit(event);
                }
                match report.release_error {
                    Some(e) => Err(AppError::Browser(e)),
                    None => Ok(()),
                }
            }
            Err(e) => {
                error!("[任务 {}] ❌ 停止任务出错: {}", task_id, e);
                let persist_error = self.persist_status(task_id, TaskStatus::Idle).await;
                let message = join_errors([Some(e.to_string()), persist_error]).unwrap_or_default();
                self.sink
                    .emit(TaskEvent::status(task_id, TaskStatus::Idle).with_error(message));
                Err(e)
            }
        }
    }

    pub async fn is_running(&self, task_id: &str) -> bool {
        self.sessions.lock().await.contains_key(task_id)
    }

    pub async fn running_tasks(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 停止所有会话并关闭事件泵
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.write().await;

        let handles: Vec<SessionHandle> = self.sessions.lock().await.drain().map(|(_, h)| h).collect();
        if !handles.is_empty() {
            info!("🛑 正在停止 {} 个运行中的任务", handles.len());
        }
        let timeout = self.config.stop_timeout();
        let stops = handles.into_iter().map(|handle| async move {
            let task_id = handle.task_id.clone();
            (task_id, handle.stop(timeout).await)
        });
        for (task_id, outcome) in join_all(stops).await {
            if let Err(e) = self.finish_stop(&task_id, outcome).await {
                warn!("[任务 {}] 停止时出错: {}", task_id, e);
            }
        }

        // 丢弃发送端后事件泵处理完剩余事件自行退出
        lock(&self.events_tx).take();
        let pump = lock(&self.pump).take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!("事件泵异常退出: {}", e);
            }
        }
        info!("✅ 编排器已关闭");
    }

    async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged {
                task_id,
                generation,
                state,
            } => {
                if !self.is_current(&task_id, generation).await {
                    debug!("[任务 {}] 忽略过期会话 (第 {} 代) 的状态 {}", task_id, generation, state);
                    return;
                }
                let status = state.task_status();
                let mut event = TaskEvent::status(&task_id, status);
                if let Some(e) = self.persist_status(&task_id, status).await {
                    event = event.with_error(e);
                }
                self.sink.emit(event);
            }
            SessionEvent::Finished(report) => self.handle_finished(report).await,
        }
    }

    async fn handle_finished(&self, report: SessionReport) {
        if report.final_state == SessionState::Stopped {
            // 停止由 stop() 负责写入 idle
            debug!("[任务 {}] 会话停止事件", report.task_id);
            return;
        }

        // 结果即使来自已被替换的会话也要记录：订单可能已经真实提交
        let task_id = report.task_id.clone();
        let status = report.final_state.task_status();
        let status_error = self.persist_status(&task_id, status).await;

        let mut event = TaskEvent::status(&task_id, status);
        let mut result_error = None;
        if let Some(result) = report.result.clone() {
            if let Err(e) = self.store.insert_result(result.clone()).await {
                error!("[任务 {}] ❌ 写入结账结果失败: {}", task_id, e);
                result_error = Some(format!("结账结果持久化失败: {}", e));
            }
            event = event.with_result(result);
        }
        if let Some(message) = join_errors([report.error.clone(), status_error, result_error]) {
            event = event.with_error(message);
        }

        // 先移出注册表再通知界面，收到结束事件时 is_running 已为 false
        {
            let mut sessions = self.sessions.lock().await;
            if sessions
                .get(&task_id)
                .is_some_and(|handle| handle.generation == report.generation)
            {
                sessions.remove(&task_id);
            }
        }
        self.sink.emit(event);
        log_report(&report);
    }

    async fn is_current(&self, task_id: &str, generation: u64) -> bool {
        self.sessions
            .lock()
            .await
            .get(task_id)
            .is_some_and(|handle| handle.generation == generation)
    }

    async fn persist_status(&self, task_id: &str, status: TaskStatus) -> Option<String> {
        match self.store.update_task_status(task_id, status, Utc::now()).await {
            Ok(()) => None,
            Err(e) => {
                error!("[任务 {}] ❌ 写入任务状态 {} 失败: {}", task_id, status, e);
                Some(format!("状态持久化失败: {}", e))
            }
        }
    }
}

async fn run_event_pump(orchestrator: Weak<TaskOrchestrator>, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        orchestrator.handle_event(event).await;
    }
    debug!("事件泵已退出");
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn join_errors<const N: usize>(errors: [Option<String>; N]) -> Option<String> {
    let parts: Vec<String> = errors.into_iter().flatten().collect();
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn log_report(report: &SessionReport) {
    debug!(
        "[任务 {}] 会话结束: {} (第 {} 代, 检查 {} 次, 迁移 {} 次)",
        report.task_id,
        report.final_state,
        report.generation,
        report.availability_checks,
        report.transitions.len()
    );
}
