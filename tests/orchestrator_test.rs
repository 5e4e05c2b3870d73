mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{mock_task, scripted_registry, MockLauncher, Poll, Script};
use restock_checkout::error::AppError;
use restock_checkout::infrastructure::{MemoryStore, PassthroughVault, TaskStore};
use restock_checkout::models::{CheckoutIdentity, TaskEvent, TaskStatus};
use restock_checkout::proxy::{ProbeSettings, ProxyPool};
use restock_checkout::strategy::Capabilities;
use restock_checkout::{Config, OrchestratorDeps, TaskOrchestrator};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    orchestrator: Arc<TaskOrchestrator>,
    store: Arc<MemoryStore>,
    launcher: Arc<MockLauncher>,
    proxy_pool: Arc<ProxyPool>,
    events: mpsc::UnboundedReceiver<TaskEvent>,
}

fn harness(script: Arc<Script>, config: Config) -> Harness {
    harness_with(script, config, MockLauncher::new())
}

fn harness_with(script: Arc<Script>, config: Config, launcher: Arc<MockLauncher>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let proxy_pool = Arc::new(ProxyPool::new(
        store.clone(),
        Arc::new(PassthroughVault),
        ProbeSettings::from_config(&config),
    ));
    let (tx, events) = mpsc::unbounded_channel();
    let orchestrator = TaskOrchestrator::new(OrchestratorDeps {
        store: store.clone(),
        sink: Arc::new(tx),
        launcher: launcher.clone(),
        registry: scripted_registry(script),
        proxy_pool: proxy_pool.clone(),
        vault: Arc::new(PassthroughVault),
        config,
    });
    Harness {
        orchestrator,
        store,
        launcher,
        proxy_pool,
        events,
    }
}

fn test_config() -> Config {
    Config {
        stop_timeout_ms: 30_000,
        min_monitor_delay_ms: 100,
        ..Config::default()
    }
}

/// 等待指定任务进入指定状态
async fn wait_for(events: &mut mpsc::UnboundedReceiver<TaskEvent>, task_id: &str, status: TaskStatus) -> TaskEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("等待事件超时")
            .expect("事件通道已关闭");
        if event.task_id == task_id && event.status == status {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_is_persisted_once_and_leaves_registry() {
    let script = Arc::new(Script::new([Poll::SoldOut, Poll::Available]));
    let mut h = harness(script, test_config());
    let task = mock_task("ok", 1000);
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    assert!(h.orchestrator.is_running("ok").await);

    wait_for(&mut h.events, "ok", TaskStatus::Monitoring).await;
    wait_for(&mut h.events, "ok", TaskStatus::Checkout).await;
    let done = wait_for(&mut h.events, "ok", TaskStatus::Success).await;

    assert!(done.result.as_ref().is_some_and(|r| r.is_success()));
    assert!(done.error.is_none());
    assert!(!h.orchestrator.is_running("ok").await);
    assert_eq!(h.store.get_task("ok").await.unwrap().unwrap().status, TaskStatus::Success);
    assert_eq!(h.store.results_for_task("ok").await.unwrap().len(), 1);
    assert_eq!(h.launcher.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_keeps_single_session() {
    let script = Arc::new(Script::new([]));
    let mut h = harness(script, test_config());
    let task = mock_task("dup", 5000);
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task.clone()).await.unwrap();
    wait_for(&mut h.events, "dup", TaskStatus::Monitoring).await;
    h.orchestrator.start(task).await.unwrap();

    assert_eq!(h.orchestrator.running_tasks().await, vec!["dup".to_string()]);
    // 旧会话在新会话创建前已释放
    assert_eq!(h.launcher.closes(), 1);

    h.orchestrator.stop("dup").await.unwrap();
    assert!(h.orchestrator.running_tasks().await.is_empty());
    assert_eq!(h.launcher.closes(), h.launcher.launches());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_checkout_removes_entry_and_persists_idle() {
    let mut script = Script::new([Poll::Available]);
    script.capabilities = Capabilities {
        login: true,
        ..Default::default()
    };
    script.login_delay = Duration::from_secs(5);
    let script = Arc::new(script);
    let mut h = harness(script.clone(), test_config());
    let task = mock_task("stop", 1000);
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    wait_for(&mut h.events, "stop", TaskStatus::Checkout).await;

    assert_ok!(h.orchestrator.stop("stop").await);

    assert!(!h.orchestrator.is_running("stop").await);
    assert_eq!(h.launcher.closes(), 1);
    assert_eq!(script.checkout_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.get_task("stop").await.unwrap().unwrap().status, TaskStatus::Idle);
    assert!(h.store.results_for_task("stop").await.unwrap().is_empty());
    wait_for(&mut h.events, "stop", TaskStatus::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_with_failing_release_still_clears_entry() {
    let mut h = harness_with(Arc::new(Script::new([])), test_config(), MockLauncher::failing_close());
    let task = mock_task("rel", 5000);
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    wait_for(&mut h.events, "rel", TaskStatus::Monitoring).await;

    let result = h.orchestrator.stop("rel").await;

    assert!(matches!(result, Err(AppError::Browser(_))));
    assert!(!h.orchestrator.is_running("rel").await);
    assert_eq!(h.launcher.closes(), 1);
    assert_eq!(h.store.get_task("rel").await.unwrap().unwrap().status, TaskStatus::Idle);
    let idle = wait_for(&mut h.events, "rel", TaskStatus::Idle).await;
    assert!(idle.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_aborts_and_clears_entry() {
    let mut script = Script::new([Poll::Available]);
    script.capabilities = Capabilities {
        login: true,
        ..Default::default()
    };
    // 登录不响应停止信号，只能靠超时中止
    script.login_delay = Duration::from_secs(120);
    let script = Arc::new(script);
    let config = Config {
        stop_timeout_ms: 1000,
        ..test_config()
    };
    let mut h = harness(script.clone(), config);
    let task = mock_task("hang", 1000);
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    wait_for(&mut h.events, "hang", TaskStatus::Checkout).await;

    let result = h.orchestrator.stop("hang").await;

    assert!(matches!(result, Err(AppError::Session(_))));
    assert!(!h.orchestrator.is_running("hang").await);
    assert_eq!(h.store.get_task("hang").await.unwrap().unwrap().status, TaskStatus::Idle);
    assert_eq!(script.checkout_calls.load(Ordering::SeqCst), 0);
    // 被中止的会话没有机会关闭浏览器
    assert_eq!(h.launcher.closes(), 0);
    let idle = wait_for(&mut h.events, "hang", TaskStatus::Idle).await;
    assert!(idle.error.is_some());

    // 同一任务可以重新启动
    h.orchestrator.start(mock_task("hang", 1000)).await.unwrap();
    assert!(h.orchestrator.is_running("hang").await);
}

#[tokio::test(start_paused = true)]
async fn test_slow_stop_does_not_block_other_tasks() {
    let mut script = Script::new([Poll::Available]);
    script.capabilities = Capabilities {
        login: true,
        ..Default::default()
    };
    script.login_delay = Duration::from_secs(5);
    let mut h = harness(Arc::new(script), test_config());
    let slow = mock_task("slow", 1000);
    let other = mock_task("other", 10_000);
    h.store.upsert_task(slow.clone()).await.unwrap();
    h.store.upsert_task(other.clone()).await.unwrap();

    h.orchestrator.start(slow).await.unwrap();
    wait_for(&mut h.events, "slow", TaskStatus::Checkout).await;

    let orchestrator = h.orchestrator.clone();
    let stopping = tokio::spawn(async move { orchestrator.stop("slow").await });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!h.orchestrator.is_running("slow").await);

    let started_at = tokio::time::Instant::now();
    h.orchestrator.start(other).await.unwrap();

    // 另一个任务的停止仍在等待登录结束
    assert!(!stopping.is_finished());
    assert!(started_at.elapsed() < Duration::from_secs(1));
    assert!(h.orchestrator.is_running("other").await);

    assert_ok!(stopping.await.unwrap());
    assert!(h.orchestrator.is_running("other").await);
    h.orchestrator.stop("other").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_unknown_task_is_noop() {
    let h = harness(Arc::new(Script::new([])), test_config());
    assert_ok!(h.orchestrator.stop("nobody").await);
}

#[tokio::test(start_paused = true)]
async fn test_missing_explicit_proxy_rejects_start() {
    let mut h = harness(Arc::new(Script::new([])), test_config());
    let mut task = mock_task("px", 1000);
    task.proxy_id = Some("no-such-proxy".to_string());
    h.store.upsert_task(task.clone()).await.unwrap();

    let result = h.orchestrator.start(task).await;

    assert!(matches!(result, Err(AppError::Configuration(_))));
    assert!(!h.orchestrator.is_running("px").await);
    assert_eq!(h.launcher.launches(), 0);
    let event = wait_for(&mut h.events, "px", TaskStatus::Idle).await;
    assert!(event.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_missing_product_reference_rejects_start() {
    let h = harness(Arc::new(Script::new([])), test_config());
    let mut task = mock_task("np", 1000);
    task.product_url = None;

    let result = h.orchestrator.start(task).await;
    assert!(matches!(result, Err(AppError::Configuration(_))));
    assert!(!h.orchestrator.is_running("np").await);
}

#[tokio::test(start_paused = true)]
async fn test_empty_pool_runs_without_proxy() {
    let config = Config {
        auto_select_proxy: true,
        ..test_config()
    };
    let mut h = harness(Arc::new(Script::new([Poll::Available])), config);
    let task = mock_task("np", 500);
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    wait_for(&mut h.events, "np", TaskStatus::Success).await;

    assert!(h.proxy_pool.list_proxies().await.unwrap().is_empty());
    assert_eq!(h.launcher.proxies.lock().unwrap().clone(), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_proxy_is_passed_to_launcher() {
    let mut h = harness(Arc::new(Script::new([Poll::Available])), test_config());
    let mut draft = restock_checkout::models::ProxyDraft::new("10.1.1.1", 3128);
    draft.username = Some("u".to_string());
    draft.password = Some("p".to_string());
    let proxy = h.proxy_pool.add_proxy(draft).await.unwrap();

    let mut task = mock_task("wp", 500);
    task.proxy_id = Some(proxy.id.clone());
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    wait_for(&mut h.events, "wp", TaskStatus::Success).await;

    assert_eq!(
        h.launcher.proxies.lock().unwrap().clone(),
        vec![Some("10.1.1.1:3128".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_identity_rejects_start() {
    let h = harness(Arc::new(Script::new([])), test_config());
    let mut task = mock_task("id", 500);
    task.profile_id = Some("ghost".to_string());

    let result = h.orchestrator.start(task).await;
    assert!(matches!(result, Err(AppError::Configuration(_))));
}

#[tokio::test(start_paused = true)]
async fn test_stored_identity_is_loaded() {
    let mut h = harness(Arc::new(Script::new([Poll::Available])), test_config());
    h.store
        .upsert_identity(CheckoutIdentity {
            id: "main".to_string(),
            name: "Ada".to_string(),
            card_number: "4111111111111111".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut task = mock_task("idok", 500);
    task.profile_id = Some("main".to_string());
    h.store.upsert_task(task.clone()).await.unwrap();

    h.orchestrator.start(task).await.unwrap();
    wait_for(&mut h.events, "idok", TaskStatus::Success).await;
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_does_not_undo_purchase() {
    let mut h = harness(Arc::new(Script::new([Poll::Available])), test_config());
    // 任务未写入存储，状态更新会失败
    let task = mock_task("ghost", 500);

    h.orchestrator.start(task).await.unwrap();
    let done = wait_for(&mut h.events, "ghost", TaskStatus::Success).await;

    assert!(done.result.as_ref().is_some_and(|r| r.is_success()));
    assert!(done.error.as_deref().unwrap_or_default().contains("状态持久化失败"));
    assert_eq!(h.store.results_for_task("ghost").await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_everything() {
    let mut h = harness(Arc::new(Script::new([])), test_config());
    for id in ["s1", "s2", "s3"] {
        let task = mock_task(id, 10_000);
        h.store.upsert_task(task.clone()).await.unwrap();
        h.orchestrator.start(task).await.unwrap();
    }
    for id in ["s1", "s2", "s3"] {
        wait_for(&mut h.events, id, TaskStatus::Monitoring).await;
    }

    h.orchestrator.shutdown().await;

    assert!(h.orchestrator.running_tasks().await.is_empty());
    assert_eq!(h.launcher.closes(), 3);
    for id in ["s1", "s2", "s3"] {
        assert_eq!(h.store.get_task(id).await.unwrap().unwrap().status, TaskStatus::Idle);
    }
    assert_err!(h.orchestrator.start(mock_task("late", 1000)).await);
}
