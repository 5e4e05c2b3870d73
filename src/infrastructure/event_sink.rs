//! 界面事件出口
//!
//! 编排层把每次状态变化推送到这里，由外部界面层消费

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::TaskEvent;

/// 事件出口
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

impl EventSink for mpsc::UnboundedSender<TaskEvent> {
    fn emit(&self, event: TaskEvent) {
        if self.send(event).is_err() {
            debug!("事件接收端已关闭，丢弃事件");
        }
    }
}

/// 只写日志的事件出口
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: TaskEvent) {
        match (&event.error, &event.result) {
            (Some(error), _) => warn!("[任务 {}] 📣 {} (错误: {})", event.task_id, event.status, error),
            (None, Some(result)) => info!(
                "[任务 {}] 📣 {} (订单: {:?}, 价格: {:?})",
                event.task_id, event.status, result.order_reference, result.price
            ),
            (None, None) => info!("[任务 {}] 📣 {}", event.task_id, event.status),
        }
    }
}

/// 以 JSON Lines 追加写入文件的事件出口
pub struct JsonLinesSink {
    path: String,
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, event: &TaskEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: TaskEvent) {
        if let Err(e) = self.append(&event) {
            warn!("写入事件文件 {} 失败: {}", self.path, e);
        }
    }
}

/// 同时推送到多个出口
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: TaskEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
