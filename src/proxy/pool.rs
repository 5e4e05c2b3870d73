use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::health::{probe, ProbeResult, ProbeSettings};
use super::interchange::{format_proxy_list, parse_proxy_list};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CredentialVault, ProxyStore};
use crate::models::{Proxy, ProxyDraft, ProxyId, ProxyPatch, ProxyStatus};

/// 批量导入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// 代理池
///
/// 负责代理记录的增删改查、健康检查和选择策略。
/// 密码在存储中以密文保存，对外返回的记录均已解密。
pub struct ProxyPool {
    store: Arc<dyn ProxyStore>,
    vault: Arc<dyn CredentialVault>,
    probe: ProbeSettings,
}

impl ProxyPool {
    pub fn new(store: Arc<dyn ProxyStore>, vault: Arc<dyn CredentialVault>, probe: ProbeSettings) -> Self {
        Self { store, vault, probe }
    }

    fn reveal(&self, mut proxy: Proxy) -> AppResult<Proxy> {
        if let Some(password) = proxy.password.take() {
            proxy.password = Some(self.vault.decrypt(&password)?);
        }
        Ok(proxy)
    }

    fn seal(&self, password: Option<String>) -> AppResult<Option<String>> {
        password
            .filter(|p| !p.is_empty())
            .map(|p| self.vault.encrypt(&p))
            .transpose()
    }

    /// 新增代理，状态默认为 active
    pub async fn add_proxy(&self, draft: ProxyDraft) -> AppResult<Proxy> {
        if draft.host.trim().is_empty() || draft.port == 0 {
            return Err(AppError::Proxy(format!("代理地址无效: {}:{}", draft.host, draft.port)));
        }

        let proxy = Proxy {
            id: uuid::Uuid::new_v4().to_string(),
            host: draft.host.trim().to_string(),
            port: draft.port,
            username: draft.username.filter(|u| !u.is_empty()),
            password: self.seal(draft.password)?,
            protocol: draft.protocol,
            location: draft.location.filter(|l| !l.is_empty()),
            last_checked_at: None,
            latency_ms: None,
            status: ProxyStatus::Active,
            created_at: Utc::now(),
        };
        self.store.insert_proxy(proxy.clone()).await?;
        info!("➕ 已添加代理 {} ({})", proxy.id, proxy.server_arg());
        self.reveal(proxy)
    }

    pub async fn get_proxy(&self, id: &str) -> AppResult<Option<Proxy>> {
        self.store
            .get_proxy(id)
            .await?
            .map(|proxy| self.reveal(proxy))
            .transpose()
    }

    /// 全部代理，新建的在前
    pub async fn list_proxies(&self) -> AppResult<Vec<Proxy>> {
        self.store
            .list_proxies()
            .await?
            .into_iter()
            .map(|proxy| self.reveal(proxy))
            .collect()
    }

    /// 部分更新，返回代理是否存在
    pub async fn update_proxy(&self, id: &str, patch: ProxyPatch) -> AppResult<bool> {
        let Some(mut proxy) = self.store.get_proxy(id).await? else {
            return Ok(false);
        };

        if let Some(host) = patch.host {
            proxy.host = host;
        }
        if let Some(port) = patch.port {
            proxy.port = port;
        }
        if let Some(username) = patch.username {
            proxy.username = username;
        }
        if let Some(password) = patch.password {
            proxy.password = self.seal(password)?;
        }
        if let Some(protocol) = patch.protocol {
            proxy.protocol = protocol;
        }
        if let Some(location) = patch.location {
            proxy.location = location;
        }
        if let Some(status) = patch.status {
            proxy.status = status;
        }
        if let Some(latency_ms) = patch.latency_ms {
            proxy.latency_ms = latency_ms;
        }
        if let Some(at) = patch.last_checked_at {
            proxy.last_checked_at = Some(at);
        }

        self.store.save_proxy(proxy).await
    }

    pub async fn delete_proxy(&self, id: &str) -> AppResult<bool> {
        let deleted = self.store.delete_proxy(id).await?;
        if deleted {
            info!("🗑️ 已删除代理 {}", id);
        }
        Ok(deleted)
    }

    /// 健康检查并记录结果
    ///
    /// 不会返回错误：代理不存在、配置错误、网络失败、超时都得到 `{false, 0}`
    pub async fn test_proxy(&self, id: &str, probe_url: Option<&str>) -> ProbeResult {
        let probe_url = probe_url.unwrap_or(&self.probe.probe_url);
        let proxy = match self.get_proxy(id).await {
            Ok(Some(proxy)) => proxy,
            Ok(None) => {
                warn!("代理不存在: {}", id);
                return ProbeResult::failed();
            }
            Err(e) => {
                error!("读取代理 {} 失败: {}", id, e);
                self.record_probe(id, ProbeResult::failed()).await;
                return ProbeResult::failed();
            }
        };

        debug!("🔍 测试代理 {} ({}) -> {}", id, proxy.server_arg(), probe_url);
        let result = tokio::time::timeout(self.probe.timeout, probe(&proxy, probe_url, self.probe.timeout))
            .await
            .unwrap_or_else(|_| ProbeResult::failed());

        if result.success {
            info!("✅ 代理 {} 可用，延迟 {}ms", id, result.response_time_ms);
        } else {
            warn!("❌ 代理 {} 不可用", id);
        }
        self.record_probe(id, result).await;
        result
    }

    async fn record_probe(&self, id: &str, result: ProbeResult) {
        let patch = ProxyPatch {
            status: Some(if result.success {
                ProxyStatus::Active
            } else {
                ProxyStatus::Inactive
            }),
            // 成功时如实记录（包括 0ms）；连接失败没有测得延迟
            latency_ms: Some((result.success || result.response_time_ms > 0).then_some(result.response_time_ms)),
            last_checked_at: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self.update_proxy(id, patch).await {
            error!("记录代理 {} 检查结果失败: {}", id, e);
        }
    }

    /// 并发检查全部代理
    pub async fn test_all(&self, probe_url: Option<&str>) -> Vec<(ProxyId, ProbeResult)> {
        let proxies = match self.store.list_proxies().await {
            Ok(proxies) => proxies,
            Err(e) => {
                error!("读取代理列表失败: {}", e);
                return Vec::new();
            }
        };

        let checks = proxies.iter().map(|proxy| async move {
            let result = self.test_proxy(&proxy.id, probe_url).await;
            (proxy.id.clone(), result)
        });
        let results = join_all(checks).await;

        let healthy = results.iter().filter(|(_, r)| r.success).count();
        info!("📊 代理检查完成: {}/{} 可用", healthy, results.len());
        results
    }

    /// 选择最佳代理
    ///
    /// 只考虑 active 状态，给定地区时要求完全匹配；
    /// 延迟最低者优先，未测过延迟的排在最后，延迟相同按 id 排序。
    /// 没有可用代理时返回 `None`，由调用方决定是否无代理运行。
    pub async fn select_best_proxy(&self, retailer: &str, location: Option<&str>) -> Option<ProxyId> {
        let proxies = match self.store.list_proxies().await {
            Ok(proxies) => proxies,
            Err(e) => {
                error!("读取代理列表失败: {}", e);
                return None;
            }
        };

        let best = proxies
            .into_iter()
            .filter(|p| p.status == ProxyStatus::Active)
            .filter(|p| match location {
                Some(location) => p.location.as_deref() == Some(location),
                None => true,
            })
            .min_by(|a, b| {
                let key = |p: &Proxy| (p.latency_ms.is_none(), p.latency_ms.unwrap_or(0));
                key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id))
            });

        match &best {
            Some(proxy) => debug!(
                "为 {} 选择代理 {} (延迟: {:?})",
                retailer, proxy.id, proxy.latency_ms
            ),
            None => warn!("⚠️ 没有可用于 {} 的代理 (地区: {:?})", retailer, location),
        }
        best.map(|p| p.id)
    }

    /// 从文本文件导入代理
    pub async fn import_from_file(&self, path: impl AsRef<Path>) -> AppResult<ImportReport> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let mut report = ImportReport::default();

        for (line, parsed) in parse_proxy_list(&content) {
            report.total += 1;
            let added = match parsed {
                Ok(draft) => self.add_proxy(draft).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match added {
                Ok(()) => report.imported += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", line, e));
                }
            }
        }

        info!(
            "📥 从 {} 导入代理: {} 成功, {} 失败",
            path.display(),
            report.imported,
            report.failed
        );
        Ok(report)
    }

    /// 导出全部代理到文本文件，返回导出数量
    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> AppResult<usize> {
        let path = path.as_ref();
        let proxies = self.list_proxies().await?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, format_proxy_list(&proxies)).await?;
        info!("📤 已导出 {} 个代理到 {}", proxies.len(), path.display());
        Ok(proxies.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryStore, PassthroughVault};
    use std::time::Duration;

    fn pool() -> ProxyPool {
        ProxyPool::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PassthroughVault),
            ProbeSettings {
                probe_url: "http://example.invalid/".to_string(),
                timeout: Duration::from_millis(500),
            },
        )
    }

    async fn add(pool: &ProxyPool, host: &str, location: Option<&str>, latency: Option<u64>, status: ProxyStatus) -> ProxyId {
        let mut draft = ProxyDraft::new(host, 8080);
        draft.location = location.map(str::to_string);
        let proxy = pool.add_proxy(draft).await.unwrap();
        pool.update_proxy(
            &proxy.id,
            ProxyPatch {
                latency_ms: Some(latency),
                status: Some(status),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        proxy.id
    }

    #[tokio::test]
    async fn test_select_lowest_latency_active() {
        let pool = pool();
        add(&pool, "a", None, Some(300), ProxyStatus::Active).await;
        let fast = add(&pool, "b", None, Some(80), ProxyStatus::Active).await;
        add(&pool, "c", None, Some(10), ProxyStatus::Inactive).await;
        add(&pool, "d", None, None, ProxyStatus::Active).await;

        assert_eq!(pool.select_best_proxy("amazon", None).await, Some(fast));
    }

    #[tokio::test]
    async fn test_select_filters_by_location() {
        let pool = pool();
        add(&pool, "a", Some("US"), Some(200), ProxyStatus::Active).await;
        let eu = add(&pool, "b", Some("EU"), Some(500), ProxyStatus::Active).await;

        assert_eq!(pool.select_best_proxy("nike", Some("EU")).await, Some(eu));
        assert_eq!(pool.select_best_proxy("nike", Some("JP")).await, None);
    }

    #[tokio::test]
    async fn test_select_unknown_latency_last() {
        let pool = pool();
        let untested = add(&pool, "a", None, None, ProxyStatus::Active).await;
        assert_eq!(pool.select_best_proxy("target", None).await, Some(untested.clone()));

        let tested = add(&pool, "b", None, Some(900), ProxyStatus::Active).await;
        assert_eq!(pool.select_best_proxy("target", None).await, Some(tested));
    }

    #[tokio::test]
    async fn test_select_empty_pool() {
        assert_eq!(pool().select_best_proxy("amazon", None).await, None);
    }

    #[tokio::test]
    async fn test_missing_proxy_probe_fails_quietly() {
        let result = pool().test_proxy("missing", None).await;
        assert_eq!(result, ProbeResult::failed());
    }

    #[tokio::test]
    async fn test_zero_latency_success_ranks_first() {
        let pool = pool();
        add(&pool, "a", None, Some(50), ProxyStatus::Active).await;
        let local = add(&pool, "b", None, None, ProxyStatus::Inactive).await;

        pool.record_probe(
            &local,
            ProbeResult {
                success: true,
                response_time_ms: 0,
            },
        )
        .await;

        let stored = pool.get_proxy(&local).await.unwrap().unwrap();
        assert_eq!(stored.latency_ms, Some(0));
        assert_eq!(stored.status, ProxyStatus::Active);
        assert_eq!(pool.select_best_proxy("amazon", None).await, Some(local));
    }

    #[tokio::test]
    async fn test_failed_probe_clears_latency() {
        let pool = pool();
        let id = add(&pool, "a", None, Some(50), ProxyStatus::Active).await;

        pool.record_probe(&id, ProbeResult::failed()).await;

        let stored = pool.get_proxy(&id).await.unwrap().unwrap();
        assert_eq!(stored.latency_ms, None);
        assert_eq!(stored.status, ProxyStatus::Inactive);
        assert!(stored.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_proxy() {
        assert!(!pool().update_proxy("missing", ProxyPatch::default()).await.unwrap());
    }
}
