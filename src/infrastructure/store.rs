//! 持久化存储接口 - 基础设施层
//!
//! 真实存储是外部协作方，这里定义核心需要的读写能力，
//! 并提供进程内实现 [`MemoryStore`]（命令行运行与测试使用）。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{CheckoutIdentity, CheckoutResult, Proxy, Task, TaskStatus};

/// 任务、结账身份和结账结果的存储
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: &str) -> AppResult<Option<Task>>;
    async fn list_tasks(&self) -> AppResult<Vec<Task>>;
    async fn upsert_task(&self, task: Task) -> AppResult<()>;
    /// 更新任务状态与更新时间；任务不存在时返回错误
    async fn update_task_status(&self, id: &str, status: TaskStatus, at: DateTime<Utc>) -> AppResult<()>;
    /// 删除任务，同时级联删除其结账结果
    async fn delete_task(&self, id: &str) -> AppResult<bool>;

    async fn insert_result(&self, result: CheckoutResult) -> AppResult<()>;
    async fn results_for_task(&self, task_id: &str) -> AppResult<Vec<CheckoutResult>>;

    async fn get_identity(&self, id: &str) -> AppResult<Option<CheckoutIdentity>>;
    async fn upsert_identity(&self, identity: CheckoutIdentity) -> AppResult<()>;
}

/// 代理记录的存储
#[async_trait]
pub trait ProxyStore: Send + Sync {
    async fn insert_proxy(&self, proxy: Proxy) -> AppResult<()>;
    async fn get_proxy(&self, id: &str) -> AppResult<Option<Proxy>>;
    async fn list_proxies(&self) -> AppResult<Vec<Proxy>>;
    /// 覆盖已有记录，返回记录是否存在
    async fn save_proxy(&self, proxy: Proxy) -> AppResult<bool>;
    async fn delete_proxy(&self, id: &str) -> AppResult<bool>;
}

#[derive(Default)]
struct MemoryTables {
    tasks: HashMap<String, Task>,
    results: Vec<CheckoutResult>,
    identities: HashMap<String, CheckoutIdentity>,
    proxies: HashMap<String, Proxy>,
}

/// 进程内存储
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, id: &str) -> AppResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> AppResult<Vec<Task>> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    async fn upsert_task(&self, task: Task) -> AppResult<()> {
        self.tables.write().await.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| AppError::store(format!("任务不存在: {}", id)))?;
        task.status = status;
        task.updated_at = at;
        debug!("任务 {} 状态已写入: {}", id, status);
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let existed = tables.tasks.remove(id).is_some();
        tables.results.retain(|r| r.task_id != id);
        Ok(existed)
    }

    async fn insert_result(&self, result: CheckoutResult) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.results.iter().any(|r| r.id == result.id) {
            return Err(AppError::store(format!("结账结果已存在: {}", result.id)));
        }
        tables.results.push(result);
        Ok(())
    }

    async fn results_for_task(&self, task_id: &str) -> AppResult<Vec<CheckoutResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn get_identity(&self, id: &str) -> AppResult<Option<CheckoutIdentity>> {
        Ok(self.tables.read().await.identities.get(id).cloned())
    }

    async fn upsert_identity(&self, identity: CheckoutIdentity) -> AppResult<()> {
        self.tables
            .write()
            .await
            .identities
            .insert(identity.id.clone(), identity);
        Ok(())
    }
}

#[async_trait]
impl ProxyStore for MemoryStore {
    async fn insert_proxy(&self, proxy: Proxy) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.proxies.contains_key(&proxy.id) {
            return Err(AppError::store(format!("代理已存在: {}", proxy.id)));
        }
        tables.proxies.insert(proxy.id.clone(), proxy);
        Ok(())
    }

    async fn get_proxy(&self, id: &str) -> AppResult<Option<Proxy>> {
        Ok(self.tables.read().await.proxies.get(id).cloned())
    }

    async fn list_proxies(&self) -> AppResult<Vec<Proxy>> {
        let tables = self.tables.read().await;
        let mut proxies: Vec<Proxy> = tables.proxies.values().cloned().collect();
        // 与外部存储一致：新建的在前
        proxies.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(proxies)
    }

    async fn save_proxy(&self, proxy: Proxy) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.proxies.get_mut(&proxy.id) {
            Some(existing) => {
                *existing = proxy;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_proxy(&self, id: &str) -> AppResult<bool> {
        Ok(self.tables.write().await.proxies.remove(id).is_some())
    }
}
