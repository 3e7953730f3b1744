//! Security event log.
//!
//! Every recognition attempt produces exactly one [`SecurityEvent`], whatever
//! its outcome. Sinks are write-only; a failing sink logs and carries on, it
//! never fails the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vigil_core::{IdentityId, MatchOutcome, MatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FaceRecognition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub outcome: MatchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<IdentityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SecurityEvent {
    pub fn recognition(result: &MatchResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: EventType::FaceRecognition,
            timestamp: Utc::now(),
            outcome: result.outcome(),
            identity_id: result.identity().cloned(),
            distance: result.distance(),
            reason: None,
        }
    }

    pub fn recognition_failed(reason: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: EventType::FaceRecognition,
            timestamp: Utc::now(),
            outcome: MatchOutcome::Error,
            identity_id: None,
            distance: None,
            reason: Some(reason.to_string()),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &SecurityEvent);
}

/// Emits events on the `vigil::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: &SecurityEvent) {
        tracing::info!(
            target: "vigil::audit",
            event_id = %event.id,
            outcome = event.outcome.as_str(),
            identity_id = event.identity_id.as_ref().map(IdentityId::as_str),
            distance = event.distance,
            reason = event.reason.as_deref(),
            "face_recognition"
        );
    }
}

/// Append-only JSON-lines file, one event per line.
pub struct JsonlAudit {
    file: Mutex<File>,
}

impl JsonlAudit {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl AuditSink for JsonlAudit {
    fn record(&self, event: &SecurityEvent) {
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, event_id = %event.id, "failed to encode audit event");
                return;
            }
        };
        line.push(b'\n');

        let Ok(mut file) = self.file.lock() else {
            tracing::error!(event_id = %event.id, "audit log lock poisoned");
            return;
        };
        if let Err(e) = file.write_all(&line).and_then(|_| file.flush()) {
            tracing::error!(error = %e, event_id = %event.id, "failed to append audit event");
        }
    }
}

/// Forwards each event to every inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutAudit {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAudit {
    fn record(&self, event: &SecurityEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
