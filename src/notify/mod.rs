//! Fire-and-forget notification dispatch.
//!
//! Domain events are queued in memory and flushed to the configured webhook
//! every 30 seconds or when 16 events accumulate, whichever comes first.
//! Flush failures are logged and dropped — dispatch never blocks the engine,
//! and no request outcome ever depends on delivery.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

const FLUSH_INTERVAL_SECS: u64 = 30;
const FLUSH_BATCH_SIZE: usize = 16;

// ─── Event types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyEvent {
    pub event: String,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NotifyEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ts: Utc::now().to_rfc3339(),
            task_id: None,
            user_id: None,
            link: None,
            detail: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ─── Sender handle ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotifyEvent>,
}

impl Notifier {
    /// Queue an event for the next flush. Never blocks — drops silently if
    /// the queue is full.
    pub fn send(&self, event: NotifyEvent) {
        let _ = self.tx.try_send(event);
    }
}

// ─── Background flush task ───────────────────────────────────────────────────

/// Spawns the background flush task and returns a `Notifier`.
///
/// With no webhook configured, events are accepted and discarded on flush —
/// callers never need to know whether dispatch is enabled.
pub fn spawn(config: NotifyConfig) -> Notifier {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(256);

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut buffer: Vec<NotifyEvent> = Vec::new();
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(FLUSH_INTERVAL_SECS));
        interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(event) => {
                            buffer.push(event);
                            if buffer.len() >= FLUSH_BATCH_SIZE {
                                flush(&client, &config, &mut buffer).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        flush(&client, &config, &mut buffer).await;
                    }
                }
            }
        }
    });

    Notifier { tx }
}

async fn flush(client: &reqwest::Client, config: &NotifyConfig, buffer: &mut Vec<NotifyEvent>) {
    let events = std::mem::take(buffer);
    let count = events.len();
    let Some(url) = config.webhook_url.as_deref() else {
        debug!(count, "notification dispatch disabled — dropping events");
        return;
    };

    let payload = serde_json::json!({ "events": events });
    match client.post(url).json(&payload).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(count, "notifications dispatched");
        }
        Ok(resp) => {
            warn!(status = %resp.status(), count, "notification webhook rejected batch");
        }
        Err(e) => {
            warn!(err = %e, count, "notification dispatch failed");
        }
    }
}
