use crate::models::checkout::CheckoutIdentity;
use crate::models::task::{Task, TaskStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 任务文件中的单个任务条目
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub id: Option<String>,
    pub name: String,
    pub retailer: String,
    pub product_url: Option<String>,
    pub product_id: Option<String>,
    pub keywords: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub profile_id: Option<String>,
    pub proxy_id: Option<String>,
    pub proxy_location: Option<String>,
    #[serde(default = "default_delay_ms")]
    pub monitor_delay_ms: u64,
    #[serde(default = "default_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    3000
}

impl TaskSpec {
    /// 转换为任务；未指定 id 时生成新的 uuid
    pub fn into_task(self) -> Task {
        let now = Utc::now();
        Task {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: self.name,
            retailer: self.retailer,
            product_url: self.product_url,
            product_id: self.product_id,
            keywords: self.keywords,
            size: self.size,
            color: self.color,
            profile_id: self.profile_id,
            proxy_id: self.proxy_id,
            proxy_location: self.proxy_location,
            status: TaskStatus::Idle,
            monitor_delay_ms: self.monitor_delay_ms,
            retry_delay_ms: self.retry_delay_ms,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 任务文件：`[[tasks]]` 与 `[[profiles]]`
#[derive(Debug, Default, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub profiles: Vec<CheckoutIdentity>,
}

/// 已加载的任务与结账身份
#[derive(Debug, Default)]
pub struct LoadedTasks {
    pub tasks: Vec<Task>,
    pub profiles: Vec<CheckoutIdentity>,
}

/// 解析任务文件内容
pub fn parse_task_file(content: &str) -> Result<LoadedTasks> {
    let file: TaskFile = toml::from_str(content).context("无法解析任务文件")?;
    Ok(LoadedTasks {
        tasks: file.tasks.into_iter().map(TaskSpec::into_task).collect(),
        profiles: file.profiles,
    })
}

/// 从 TOML 文件加载任务和结账身份
pub async fn load_task_file(path: &Path) -> Result<LoadedTasks> {
    if !path.exists() {
        anyhow::bail!("任务文件不存在: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取任务文件: {}", path.display()))?;

    let loaded = parse_task_file(&content)
        .with_context(|| format!("任务文件格式错误: {}", path.display()))?;

    tracing::info!(
        "成功加载 {} 个任务, {} 个结账身份",
        loaded.tasks.len(),
        loaded.profiles.len()
    );

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_file() {
        let loaded = parse_task_file(
            r#"
            [[tasks]]
            id = "ps5"
            name = "PS5 光驱版"
            retailer = "Best Buy"
            product_url = "https://www.bestbuy.com/site/6523167.p"
            size = "Standard"
            monitor_delay_ms = 5000
            profile_id = "main"

            [[tasks]]
            name = "Jordan 1"
            retailer = "nike"
            product_id = "DZ5485-612"

            [[profiles]]
            id = "main"
            name = "Zhang San"
            email = "zs@example.com"
            card_number = "4111111111111111"
            "#,
        )
        .unwrap();

        assert_eq!(loaded.tasks.len(), 2);
        assert_eq!(loaded.tasks[0].id, "ps5");
        assert_eq!(loaded.tasks[0].monitor_delay_ms, 5000);
        assert_eq!(loaded.tasks[0].status, TaskStatus::Idle);
        assert_eq!(loaded.tasks[1].monitor_delay_ms, 3000);
        assert!(!loaded.tasks[1].id.is_empty());
        assert_eq!(loaded.profiles[0].card_number, "4111111111111111");
        assert!(loaded.profiles[0].account_email.is_none());
    }

    #[test]
    fn test_parse_task_file_rejects_missing_retailer() {
        let result = parse_task_file(
            r#"
            [[tasks]]
            name = "broken"
            "#,
        );
        assert!(result.is_err());
    }
}
