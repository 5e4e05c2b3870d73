//! 站点策略能力契约
//!
//! 会话按固定顺序调用：
//! `check_availability` → (`select_options`) → `add_to_cart` → (`login`) → (`submit_captcha`) → `checkout`
//! 括号内为可选能力，由 [`Capabilities`] 声明，未声明的能力不会被调用。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::infrastructure::PageDriver;
use crate::models::{CheckoutIdentity, Task};

/// 策略声明的可选能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub select_options: bool,
    pub login: bool,
    pub captcha: bool,
}

/// 下单结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutOutcome {
    pub success: bool,
    pub order_reference: Option<String>,
    pub price: Option<f64>,
}

impl CheckoutOutcome {
    pub fn succeeded(order_reference: Option<String>, price: Option<f64>) -> Self {
        Self {
            success: true,
            order_reference,
            price,
        }
    }

    pub fn rejected() -> Self {
        Self::default()
    }
}

/// 构造策略所需的上下文
#[derive(Clone)]
pub struct StrategyContext {
    pub task: Task,
    pub page: Arc<dyn PageDriver>,
    pub identity: Option<CheckoutIdentity>,
    pub navigation_timeout: Duration,
}

/// 站点策略
///
/// 每个零售商一个实现；`add_to_cart` 每个会话只会被调用一次
#[async_trait]
pub trait SiteStrategy: Send + Sync {
    /// 策略名称（用于日志）
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// 商品是否可购买
    async fn check_availability(&self) -> AppResult<bool>;

    /// 选择尺码、颜色等选项
    async fn select_options(&self) -> AppResult<()> {
        Ok(())
    }

    /// 加入购物车
    async fn add_to_cart(&self) -> AppResult<()>;

    /// 登录站点账号，返回是否登录成功
    async fn login(&self) -> AppResult<bool> {
        Ok(true)
    }

    /// 处理验证码，返回 `false` 表示拦截未解除
    async fn submit_captcha(&self) -> AppResult<bool> {
        Ok(true)
    }

    /// 提交订单
    async fn checkout(&self) -> AppResult<CheckoutOutcome>;
}
