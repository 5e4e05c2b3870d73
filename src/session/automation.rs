//! 单个任务的自动化会话
//!
//! 一个会话独占一个浏览器资源，在自己的 tokio 任务上运行状态机：
//! 轮询库存 → 加入购物车 → 结账。停止请求是协作式的，
//! 正在执行的步骤不会被打断，只在步骤之间检查。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::state::{SessionState, Transition};
use crate::browser::{BrowserLauncher, BrowserResource};
use crate::error::{AppError, AppResult};
use crate::infrastructure::PageDriver;
use crate::models::{CheckoutIdentity, CheckoutResult, Proxy, Task, TaskId};
use crate::strategy::{CheckoutOutcome, SiteStrategy, StrategyContext, StrategyRegistry};

/// 会话发给编排器的事件
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 进入新的非终止状态
    StatusChanged {
        task_id: TaskId,
        generation: u64,
        state: SessionState,
    },
    /// 会话结束（资源已释放）
    Finished(SessionReport),
}

/// 会话结束时的汇总
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub task_id: TaskId,
    pub generation: u64,
    pub final_state: SessionState,
    pub transitions: Vec<Transition>,
    pub availability_checks: u32,
    /// 实际使用的策略键
    pub strategy_key: Option<String>,
    /// 零售商未识别，使用了默认策略
    pub fallback: bool,
    /// 仅在 Succeeded / Failed 时存在
    pub result: Option<CheckoutResult>,
    pub error: Option<String>,
    pub release_error: Option<String>,
}

/// 启动会话所需的全部输入
pub struct SessionParams {
    pub task: Task,
    pub generation: u64,
    pub proxy: Option<Proxy>,
    pub identity: Option<CheckoutIdentity>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub registry: Arc<StrategyRegistry>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub navigation_timeout: Duration,
    pub min_monitor_delay: Duration,
}

/// 运行中会话的句柄
pub struct SessionHandle {
    pub task_id: TaskId,
    pub generation: u64,
    cancel: watch::Sender<bool>,
    join: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// 发出停止信号，不等待
    pub fn request_stop(&self) {
        // 会话已结束时接收端已关闭
        let _ = self.cancel.send(true);
    }

    /// 停止会话并等待资源释放
    ///
    /// 超时后直接中止会话任务并返回错误
    pub async fn stop(self, timeout: Duration) -> AppResult<SessionReport> {
        self.request_stop();
        let mut join = self.join;
        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(AppError::Session(format!(
                "任务 {} 的会话异常退出: {}",
                self.task_id, e
            ))),
            Err(_) => {
                join.abort();
                Err(AppError::Session(format!(
                    "任务 {} 的会话未能在 {:?} 内停止，已强制中止",
                    self.task_id, timeout
                )))
            }
        }
    }
}

/// 会话的退出方式
enum Exit {
    Stopped,
    Succeeded(CheckoutOutcome),
    Failed(String),
}

impl From<AppError> for Exit {
    fn from(e: AppError) -> Self {
        Exit::Failed(e.to_string())
    }
}

pub struct AutomationSession {
    task: Task,
    generation: u64,
    proxy: Option<Proxy>,
    identity: Option<CheckoutIdentity>,
    launcher: Arc<dyn BrowserLauncher>,
    registry: Arc<StrategyRegistry>,
    events: mpsc::UnboundedSender<SessionEvent>,
    navigation_timeout: Duration,
    min_monitor_delay: Duration,
    cancel: watch::Receiver<bool>,

    state: SessionState,
    transitions: Vec<Transition>,
    resource: Option<Box<dyn BrowserResource>>,
    availability_checks: u32,
    strategy_key: Option<String>,
    fallback: bool,
}

impl AutomationSession {
    /// 在新的 tokio 任务上启动会话
    pub fn spawn(params: SessionParams) -> SessionHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task_id = params.task.id.clone();
        let generation = params.generation;

        let session = AutomationSession {
            task: params.task,
            generation,
            proxy: params.proxy,
            identity: params.identity,
            launcher: params.launcher,
            registry: params.registry,
            events: params.events,
            navigation_timeout: params.navigation_timeout,
            min_monitor_delay: params.min_monitor_delay,
            cancel: cancel_rx,
            state: SessionState::Initializing,
            transitions: Vec::new(),
            resource: None,
            availability_checks: 0,
            strategy_key: None,
            fallback: false,
        };

        SessionHandle {
            task_id,
            generation,
            cancel: cancel_tx,
            join: tokio::spawn(session.run()),
        }
    }

    async fn run(mut self) -> SessionReport {
        let exit = self.drive().await;

        // 三种退出路径都只在这里释放一次资源，之后才进入终止状态
        let release_error = self.release().await;

        let (final_state, result, error) = match exit {
            Exit::Stopped => {
                info!("[任务 {}] ⏹️ 会话已停止", self.task.id);
                (SessionState::Stopped, None, None)
            }
            Exit::Succeeded(outcome) => {
                info!(
                    "[任务 {}] 🎉 下单成功 (订单: {:?}, 价格: {:?})",
                    self.task.id, outcome.order_reference, outcome.price
                );
                let result = CheckoutResult::success(&self.task.id, outcome.order_reference, outcome.price);
                (SessionState::Succeeded, Some(result), None)
            }
            Exit::Failed(message) => {
                error!("[任务 {}] ❌ 会话失败: {}", self.task.id, message);
                let result = CheckoutResult::failure(&self.task.id, message.clone());
                (SessionState::Failed, Some(result), Some(message))
            }
        };
        self.transition(final_state, false);

        let report = SessionReport {
            task_id: self.task.id.clone(),
            generation: self.generation,
            final_state,
            transitions: std::mem::take(&mut self.transitions),
            availability_checks: self.availability_checks,
            strategy_key: self.strategy_key.take(),
            fallback: self.fallback,
            result,
            error,
            release_error,
        };
        if self.events.send(SessionEvent::Finished(report.clone())).is_err() {
            debug!("[任务 {}] 编排器已关闭，结束事件未送达", self.task.id);
        }
        report
    }

    async fn drive(&mut self) -> Exit {
        if self.cancelled() {
            return Exit::Stopped;
        }

        // Initializing
        let resource = match self.launcher.launch(&self.task.id, self.proxy.as_ref()).await {
            Ok(resource) => resource,
            Err(e) => return e.into(),
        };
        let page = resource.page();
        self.resource = Some(resource);
        if self.cancelled() {
            return Exit::Stopped;
        }

        let ctx = StrategyContext {
            task: self.task.clone(),
            page: page.clone(),
            identity: self.identity.clone(),
            navigation_timeout: self.navigation_timeout,
        };
        let Some(resolved) = self.registry.resolve(&self.task.retailer, ctx) else {
            return Exit::Failed(
                AppError::configuration(format!("没有可用于零售商 '{}' 的策略", self.task.retailer)).to_string(),
            );
        };
        self.strategy_key = Some(resolved.key.clone());
        self.fallback = resolved.fallback;
        let strategy = resolved.strategy;
        info!("[任务 {}] 使用策略 {} ({})", self.task.id, strategy.name(), resolved.key);

        self.transition(SessionState::Monitoring, true);
        if !self.monitor(strategy.as_ref(), page.as_ref()).await {
            return Exit::Stopped;
        }

        // 一旦进入 Carting 就不会再回到轮询
        self.transition(SessionState::Carting, true);
        if let Err(exit) = self.cart(strategy.as_ref()).await {
            return exit;
        }
        if self.cancelled() {
            return Exit::Stopped;
        }

        self.transition(SessionState::CheckingOut, true);
        self.checkout(strategy.as_ref()).await
    }

    /// 轮询库存直到有货，被停止时返回 `false`
    async fn monitor(&mut self, strategy: &dyn SiteStrategy, page: &dyn PageDriver) -> bool {
        let delay = self.task.monitor_delay().max(self.min_monitor_delay);
        let mut consecutive_failures: u32 = 0;
        info!("[任务 {}] 👀 开始监控库存 (间隔 {:?})", self.task.id, delay);

        loop {
            // 固定间隔：上一次检查结束后再等待完整的间隔
            if !self.wait_or_cancel(delay).await {
                return false;
            }

            self.availability_checks += 1;
            match strategy.check_availability().await {
                Ok(true) => {
                    // 检查期间收到停止请求时不再进入加购
                    if self.cancelled() {
                        info!("[任务 {}] 检测到有货，但任务已被停止", self.task.id);
                        return false;
                    }
                    info!("[任务 {}] 🟢 检测到有货，开始加入购物车", self.task.id);
                    return true;
                }
                Ok(false) => {
                    consecutive_failures = 0;
                    debug!("[任务 {}] 第 {} 次检查：暂无库存", self.task.id, self.availability_checks);
                    self.transition(SessionState::Monitoring, false);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "[任务 {}] ⚠️ 库存检查失败 (连续 {} 次): {}",
                        self.task.id, consecutive_failures, e
                    );
                    if let Err(reload_err) = page.reload().await {
                        warn!("[任务 {}] 刷新页面失败: {}", self.task.id, reload_err);
                    }
                }
            }

            if self.cancelled() {
                return false;
            }
        }
    }

    async fn cart(&mut self, strategy: &dyn SiteStrategy) -> Result<(), Exit> {
        if strategy.capabilities().select_options {
            strategy.select_options().await?;
            if self.cancelled() {
                return Err(Exit::Stopped);
            }
        }
        strategy.add_to_cart().await?;
        Ok(())
    }

    async fn checkout(&mut self, strategy: &dyn SiteStrategy) -> Exit {
        let capabilities = strategy.capabilities();

        if capabilities.login {
            match strategy.login().await {
                Ok(true) => debug!("[任务 {}] 登录成功", self.task.id),
                Ok(false) => return AppError::checkout("站点账号登录失败").into(),
                Err(e) => return e.into(),
            }
            if self.cancelled() {
                return Exit::Stopped;
            }
        }

        if capabilities.captcha {
            match strategy.submit_captcha().await {
                Ok(true) => {}
                // 验证码未解除视为不可恢复的拦截，不在会话内重试
                Ok(false) => return AppError::blocked("验证码未能解除").into(),
                Err(e) => return e.into(),
            }
            if self.cancelled() {
                return Exit::Stopped;
            }
        }

        // 下单一旦返回，结果就成立，即使此时收到了停止请求
        match strategy.checkout().await {
            Ok(outcome) if outcome.success => Exit::Succeeded(outcome),
            Ok(_) => AppError::checkout("站点未确认订单").into(),
            Err(e) => e.into(),
        }
    }

    fn cancelled(&self) -> bool {
        // 发送端被丢弃同样视为停止
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    /// 等待指定时间，期间收到停止信号返回 `false`
    async fn wait_or_cancel(&mut self, delay: Duration) -> bool {
        if self.cancelled() {
            return false;
        }
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = sleep(delay) => !self.cancelled(),
            _ = cancel.wait_for(|stop| *stop) => false,
        }
    }

    fn transition(&mut self, to: SessionState, notify: bool) {
        let from = self.state;
        if !from.can_transition_to(to) {
            warn!("[任务 {}] 忽略非法状态迁移 {} → {}", self.task.id, from, to);
            return;
        }
        self.transitions.push(Transition::new(from, to));
        self.state = to;

        if notify && from != to {
            debug!("[任务 {}] 状态 {} → {}", self.task.id, from, to);
            let event = SessionEvent::StatusChanged {
                task_id: self.task.id.clone(),
                generation: self.generation,
                state: to,
            };
            if self.events.send(event).is_err() {
                debug!("[任务 {}] 编排器已关闭，状态事件未送达", self.task.id);
            }
        }
    }

    /// 关闭浏览器资源，最多执行一次
    async fn release(&mut self) -> Option<String> {
        let mut resource = self.resource.take()?;
        match resource.close().await {
            Ok(()) => {
                debug!("[任务 {}] 浏览器资源已释放", self.task.id);
                None
            }
            Err(e) => {
                warn!("[任务 {}] 释放浏览器资源失败: {}", self.task.id, e);
                Some(e.to_string())
            }
        }
    }
}
