use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub type TaskId = String;

/// 任务持久化状态
///
/// `idle → monitoring → carting → checkout → {success | failed}`，手动停止回到 `idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Idle,
    Monitoring,
    Carting,
    Checkout,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Monitoring => "monitoring",
            TaskStatus::Carting => "carting",
            TaskStatus::Checkout => "checkout",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 监控下单任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// 零售商标识（大小写不敏感）
    pub retailer: String,
    pub product_url: Option<String>,
    /// 商品编号（例如 ASIN），没有 URL 时按零售商模板拼出商品页
    pub product_id: Option<String>,
    pub keywords: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    /// 结账身份（收货地址、支付信息）
    pub profile_id: Option<String>,
    pub proxy_id: Option<String>,
    /// 自动选择代理时要求的地区
    pub proxy_location: Option<String>,
    pub status: TaskStatus,
    pub monitor_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 创建新任务（默认 3 秒监控间隔）
    pub fn new(name: impl Into<String>, retailer: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            retailer: retailer.into(),
            product_url: None,
            product_id: None,
            keywords: None,
            size: None,
            color: None,
            profile_id: None,
            proxy_id: None,
            proxy_location: None,
            status: TaskStatus::Idle,
            monitor_delay_ms: 3000,
            retry_delay_ms: 3000,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_product_url(mut self, url: impl Into<String>) -> Self {
        self.product_url = Some(url.into());
        self
    }

    pub fn with_monitor_delay_ms(mut self, delay_ms: u64) -> Self {
        self.monitor_delay_ms = delay_ms;
        self
    }

    pub fn monitor_delay(&self) -> Duration {
        Duration::from_millis(self.monitor_delay_ms)
    }

    /// 是否配置了商品引用
    pub fn has_product_reference(&self) -> bool {
        non_empty(self.product_url.as_deref()).is_some()
            || non_empty(self.product_id.as_deref()).is_some()
    }

    /// 解析商品页地址
    ///
    /// URL 优先；只有商品编号时用 `url_template` 中的 `{id}` 替换。
    pub fn product_target(&self, url_template: Option<&str>) -> AppResult<String> {
        if let Some(url) = non_empty(self.product_url.as_deref()) {
            return Ok(url.to_string());
        }

        match (non_empty(self.product_id.as_deref()), url_template) {
            (Some(id), Some(template)) => Ok(template.replace("{id}", id)),
            (Some(id), None) => Err(AppError::configuration(format!(
                "零售商 {} 不支持仅凭商品编号 {} 定位商品",
                self.retailer, id
            ))),
            (None, _) => Err(AppError::configuration(format!(
                "任务 {} 缺少商品链接或商品编号",
                self.id
            ))),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
