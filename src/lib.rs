//! # Restock Checkout
//!
//! 多任务并发的商品库存监控与自动下单引擎
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 页面能力、存储、凭据保险库、界面事件出口
//! - `browser/` - 浏览器资源的获取与释放（独立启动或连接已有浏览器）
//! - `CdpPage` - 唯一的 page owner，实现 `PageDriver`
//!
//! ### ② 业务能力层（Capabilities）
//! - `strategy/` - 每个零售商一个站点策略，由注册表按零售商键解析
//! - `proxy/` - 代理池：记录管理、健康检查、选择策略
//!
//! ### ③ 流程层（Session）
//! - `session/` - 单个任务的状态机：监控 → 加购 → 结账
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/task_orchestrator` - 会话注册表与事件泵
//! - `orchestrator/runner` - 命令行运行器，控制并发与排队
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod proxy;
pub mod session;
pub mod strategy;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Task, TaskEvent, TaskStatus};
pub use orchestrator::{App, OrchestratorDeps, TaskOrchestrator};
pub use session::{SessionEvent, SessionReport, SessionState};
pub use strategy::{SiteStrategy, StrategyRegistry};
