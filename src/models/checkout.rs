use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::infrastructure::vault::CredentialVault;
use crate::models::task::{TaskId, TaskStatus};

/// 结账身份：收货信息、支付信息和可选的站点账号
///
/// 存储中的敏感字段为密文，使用前需 [`CheckoutIdentity::decrypted`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub card_number: String,
    pub card_expiry: String,
    pub card_cvv: String,
    pub account_email: Option<String>,
    pub account_password: Option<String>,
}

impl CheckoutIdentity {
    /// 是否配置了站点登录账号
    pub fn has_account(&self) -> bool {
        self.account_email.as_deref().is_some_and(|e| !e.is_empty())
            && self.account_password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// 加密敏感字段（写入存储前）
    pub fn encrypted(mut self, vault: &dyn CredentialVault) -> AppResult<Self> {
        self.card_number = vault.encrypt(&self.card_number)?;
        self.card_expiry = vault.encrypt(&self.card_expiry)?;
        self.card_cvv = vault.encrypt(&self.card_cvv)?;
        if let Some(password) = self.account_password.take() {
            self.account_password = Some(vault.encrypt(&password)?);
        }
        Ok(self)
    }

    /// 解密敏感字段（从存储读出后）
    pub fn decrypted(mut self, vault: &dyn CredentialVault) -> AppResult<Self> {
        self.card_number = vault.decrypt(&self.card_number)?;
        self.card_expiry = vault.decrypt(&self.card_expiry)?;
        self.card_cvv = vault.decrypt(&self.card_cvv)?;
        if let Some(password) = self.account_password.take() {
            self.account_password = Some(vault.decrypt(&password)?);
        }
        Ok(self)
    }
}

/// 结账结果类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutOutcomeKind {
    Success,
    Failed,
}

/// 一次会话终止时写入的结账记录，写入后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub id: String,
    pub task_id: TaskId,
    pub outcome: CheckoutOutcomeKind,
    pub order_reference: Option<String>,
    pub price: Option<f64>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CheckoutResult {
    pub fn success(task_id: &str, order_reference: Option<String>, price: Option<f64>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            outcome: CheckoutOutcomeKind::Success,
            order_reference,
            price,
            error_message: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(task_id: &str, error_message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            outcome: CheckoutOutcomeKind::Failed,
            order_reference: None,
            price: None,
            error_message: Some(error_message.into()),
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CheckoutOutcomeKind::Success
    }
}

/// 推送给界面层的任务事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckoutResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskEvent {
    pub fn status(task_id: &str, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            timestamp: Utc::now(),
            result: None,
            error: None,
        }
    }

    pub fn with_result(mut self, result: CheckoutResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
