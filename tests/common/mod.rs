//! 集成测试共用的替身：页面、浏览器启动器、按脚本运行的站点策略

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use restock_checkout::browser::{BrowserLauncher, BrowserResource};
use restock_checkout::error::{AppError, AppResult};
use restock_checkout::infrastructure::PageDriver;
use restock_checkout::models::{Proxy, Task};
use restock_checkout::strategy::{
    Capabilities, CheckoutOutcome, SiteStrategy, StrategyContext, StrategyFactory, StrategyRegistry,
};
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};

pub const MOCK_RETAILER: &str = "mockshop";

/// 什么都不做的页面，只记录刷新次数
#[derive(Default)]
pub struct MockPage {
    pub reloads: AtomicUsize,
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, _url: &str) -> AppResult<()> {
        Ok(())
    }

    async fn reload(&self) -> AppResult<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn eval(&self, _js_code: &str) -> AppResult<JsonValue> {
        Ok(JsonValue::Bool(false))
    }

    async fn current_url(&self) -> AppResult<Option<String>> {
        Ok(Some("about:blank".to_string()))
    }

    async fn click(&self, _selector: &str) -> AppResult<()> {
        Ok(())
    }

    async fn type_into(&self, _selector: &str, _text: &str) -> AppResult<()> {
        Ok(())
    }
}

pub struct MockResource {
    page: Arc<MockPage>,
    closes: Arc<AtomicUsize>,
    close_fails: bool,
}

#[async_trait]
impl BrowserResource for MockResource {
    fn page(&self) -> Arc<dyn PageDriver> {
        self.page.clone()
    }

    async fn close(&mut self) -> AppResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(AppError::Browser("浏览器进程无响应".to_string()));
        }
        Ok(())
    }
}

/// 统计启动与释放次数的浏览器启动器
#[derive(Default)]
pub struct MockLauncher {
    pub page: Arc<MockPage>,
    pub launches: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    /// 每次启动收到的代理（`server_arg`）
    pub proxies: Mutex<Vec<Option<String>>>,
    pub fail: bool,
    /// 释放资源时报错（仍计入 closes）
    pub close_fails: bool,
}

impl MockLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn failing_close() -> Arc<Self> {
        Arc::new(Self {
            close_fails: true,
            ..Default::default()
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, _task_id: &str, proxy: Option<&Proxy>) -> AppResult<Box<dyn BrowserResource>> {
        self.proxies
            .lock()
            .unwrap()
            .push(proxy.map(|p| p.server_arg()));
        if self.fail {
            return Err(AppError::Browser("浏览器无法启动".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockResource {
            page: self.page.clone(),
            closes: self.closes.clone(),
            close_fails: self.close_fails,
        }))
    }
}

/// 库存检查的单步脚本
#[derive(Debug, Clone, Copy)]
pub enum Poll {
    Available,
    SoldOut,
    Error,
}

/// 脚本化策略的行为与调用记录
pub struct Script {
    polls: Mutex<VecDeque<Poll>>,
    pub capabilities: Capabilities,
    pub login_delay: Duration,
    /// 每次库存检查耗时
    pub check_delay: Duration,
    pub select_delay: Duration,
    pub captcha_cleared: bool,
    pub checkout_success: bool,
    pub checks: Mutex<Vec<Instant>>,
    pub add_to_cart_calls: AtomicUsize,
    pub checkout_calls: AtomicUsize,
}

impl Script {
    pub fn new(polls: impl IntoIterator<Item = Poll>) -> Self {
        Self {
            polls: Mutex::new(polls.into_iter().collect()),
            capabilities: Capabilities::default(),
            login_delay: Duration::ZERO,
            check_delay: Duration::ZERO,
            select_delay: Duration::ZERO,
            captcha_cleared: true,
            checkout_success: true,
            checks: Mutex::new(Vec::new()),
            add_to_cart_calls: AtomicUsize::new(0),
            checkout_calls: AtomicUsize::new(0),
        }
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().unwrap().len()
    }

    pub fn check_intervals(&self) -> Vec<Duration> {
        let checks = self.checks.lock().unwrap();
        checks.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

pub struct ScriptedStrategy {
    script: Arc<Script>,
}

#[async_trait]
impl SiteStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> Capabilities {
        self.script.capabilities
    }

    async fn check_availability(&self) -> AppResult<bool> {
        self.script.checks.lock().unwrap().push(Instant::now());
        sleep(self.script.check_delay).await;
        // 脚本用完后一直缺货
        let next = self.script.polls.lock().unwrap().pop_front();
        match next.unwrap_or(Poll::SoldOut) {
            Poll::Available => Ok(true),
            Poll::SoldOut => Ok(false),
            Poll::Error => Err(AppError::navigation("https://mock.shop/item", "连接被重置")),
        }
    }

    async fn select_options(&self) -> AppResult<()> {
        sleep(self.script.select_delay).await;
        Ok(())
    }

    async fn add_to_cart(&self) -> AppResult<()> {
        self.script.add_to_cart_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn login(&self) -> AppResult<bool> {
        sleep(self.script.login_delay).await;
        Ok(true)
    }

    async fn submit_captcha(&self) -> AppResult<bool> {
        Ok(self.script.captcha_cleared)
    }

    async fn checkout(&self) -> AppResult<CheckoutOutcome> {
        self.script.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.checkout_success {
            Ok(CheckoutOutcome::succeeded(Some("ORDER-1".to_string()), Some(499.99)))
        } else {
            Ok(CheckoutOutcome::rejected())
        }
    }
}

pub fn scripted_factory(script: Arc<Script>) -> StrategyFactory {
    Arc::new(move |_ctx: StrategyContext| {
        Box::new(ScriptedStrategy {
            script: script.clone(),
        }) as Box<dyn SiteStrategy>
    })
}

/// 只认识 mockshop 的注册表，未知零售商也回退到它
pub fn scripted_registry(script: Arc<Script>) -> Arc<StrategyRegistry> {
    let mut registry = StrategyRegistry::new(MOCK_RETAILER);
    registry.register(MOCK_RETAILER, scripted_factory(script));
    Arc::new(registry)
}

pub fn mock_task(id: &str, monitor_delay_ms: u64) -> Task {
    let mut task = Task::new(format!("测试任务 {}", id), MOCK_RETAILER)
        .with_product_url("https://mock.shop/item")
        .with_monitor_delay_ms(monitor_delay_ms);
    task.id = id.to_string();
    task
}
