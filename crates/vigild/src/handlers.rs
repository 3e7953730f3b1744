//! JSON request handlers behind the D-Bus methods.
//!
//! Each handler takes the raw request body, runs one workflow and returns a
//! serializable response. Request errors become `{"status":"error","reason":..}`
//! bodies rather than D-Bus errors, so clients always get a machine-readable
//! reason.

use crate::directory::{deserialize_identity, Role};
use crate::engine::EngineHandle;
use crate::enrollment::EnrollmentWorkflow;
use crate::error::{blocking, WorkflowError};
use crate::recognition::{Recognition, RecognitionWorkflow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_core::{decode_base64, IdentityId, MatchResult};
use vigil_store::{EncodingStore, StoreError};

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    #[serde(deserialize_with = "deserialize_identity")]
    pub identity_id: IdentityId,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollResponse {
    Success {
        identity_id: IdentityId,
        created_at: DateTime<Utc>,
    },
    Error {
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognizeResponse {
    Matched {
        identity_id: IdentityId,
        distance: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },
    Unknown {
        distance: Option<f32>,
    },
    Error {
        reason: &'static str,
    },
}

impl From<Recognition> for RecognizeResponse {
    fn from(r: Recognition) -> Self {
        match r.result {
            MatchResult::Matched { identity, distance } => {
                let (display_name, unit, role) = match r.resident {
                    Some(res) => (Some(res.name), res.unit, Some(res.role)),
                    None => (None, None, None),
                };
                RecognizeResponse::Matched { identity_id: identity, distance, display_name, unit, role }
            }
            MatchResult::Unknown { best_distance } => {
                RecognizeResponse::Unknown { distance: best_distance }
            }
        }
    }
}

/// Summary row of `ListEncodings`. Vectors never leave the daemon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingSummary {
    pub identity_id: IdentityId,
    pub created_at: DateTime<Utc>,
    pub dim: usize,
    pub model_version: Option<String>,
}

pub async fn handle_enroll(workflow: &EnrollmentWorkflow, body: &str) -> EnrollResponse {
    let outcome = async {
        let req: EnrollRequest = parse(body)?;
        let image = decode_base64(req.image.as_deref().unwrap_or_default())?;
        workflow.enroll(&req.identity_id, image).await
    }
    .await;

    match outcome {
        Ok(encoding) => EnrollResponse::Success {
            identity_id: encoding.identity,
            created_at: encoding.created_at,
        },
        Err(e) => {
            if e.is_internal() {
                tracing::error!(error = %e, "enrollment failed");
            } else {
                tracing::info!(reason = e.reason(), error = %e, "enrollment rejected");
            }
            EnrollResponse::Error { reason: e.reason() }
        }
    }
}

pub async fn handle_recognize(workflow: &RecognitionWorkflow, body: &str) -> RecognizeResponse {
    let image = match parse::<RecognizeRequest>(body)
        .and_then(|req| Ok(decode_base64(req.image.as_deref().unwrap_or_default())?))
    {
        Ok(image) => image,
        Err(e) => {
            return RecognizeResponse::Error { reason: workflow.reject(e).reason() };
        }
    };

    match workflow.recognize(image).await {
        Ok(recognition) => recognition.into(),
        Err(e) => RecognizeResponse::Error { reason: e.reason() },
    }
}

pub async fn handle_remove(
    store: Arc<dyn EncodingStore>,
    identity: &str,
) -> Result<bool, WorkflowError> {
    let identity = IdentityId::from(identity.trim());
    let id = identity.clone();
    let removed = blocking(move || store.remove(&id)).await?;
    tracing::info!(identity = %identity, removed, "encoding removal requested");
    Ok(removed)
}

pub fn list_encodings(store: &dyn EncodingStore) -> Result<Vec<EncodingSummary>, StoreError> {
    Ok(store
        .snapshot()?
        .iter()
        .map(|enc| EncodingSummary {
            identity_id: enc.identity.clone(),
            created_at: enc.created_at,
            dim: enc.embedding.dim(),
            model_version: enc.embedding.model_version.clone(),
        })
        .collect())
}

pub fn status(
    store: &dyn EncodingStore,
    recognition: &RecognitionWorkflow,
    engine: &EngineHandle,
) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "encodings": store.len()?,
        "dim": store.dim(),
        "threshold": recognition.threshold(),
        "margin": recognition.margin(),
        "workers": engine.workers(),
        "extractor": engine.backend(),
    }))
}

/// Serialize a response body, falling back to a fixed internal error.
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode response");
        r#"{"status":"error","reason":"internal_error"}"#.to_string()
    })
}

fn parse<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, WorkflowError> {
    serde_json::from_str(body).map_err(|e| WorkflowError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{IdentityDirectory, OpenDirectory, ResidentDirectory};
    use crate::testing::{axis, b64, engine, png_with_key, MemoryAudit, ScriptedExtractor};
    use std::time::Duration;
    use vigil_core::EuclideanMatcher;
    use vigil_store::MemoryStore;

    struct Harness {
        engine: EngineHandle,
        store: Arc<dyn EncodingStore>,
        enroll: EnrollmentWorkflow,
        recognize: RecognitionWorkflow,
        audit: Arc<MemoryAudit>,
    }

    fn harness(directory: Arc<dyn IdentityDirectory>) -> Harness {
        let extractor = ScriptedExtractor::new()
            .face(1, axis(4, 0, 1.0))
            .face(2, axis(4, 1, 1.0));
        let engine = engine(extractor, Duration::from_secs(5));
        let store: Arc<dyn EncodingStore> = Arc::new(MemoryStore::new(4));
        let audit = Arc::new(MemoryAudit::default());
        Harness {
            enroll: EnrollmentWorkflow::new(engine.clone(), store.clone(), directory.clone()),
            recognize: RecognitionWorkflow::new(
                engine.clone(),
                store.clone(),
                directory,
                audit.clone(),
                EuclideanMatcher::default(),
                0.6,
            ),
            engine,
            store,
            audit,
        }
    }

    fn enroll_body(id: serde_json::Value, key: u8) -> String {
        serde_json::json!({ "identity_id": id, "image": b64(&png_with_key(key)) }).to_string()
    }

    fn recognize_body(key: u8) -> String {
        serde_json::json!({ "image": b64(&png_with_key(key)) }).to_string()
    }

    #[tokio::test]
    async fn test_enroll_then_recognize_round_trip() {
        let h = harness(Arc::new(OpenDirectory));
        let resp = handle_enroll(&h.enroll, &enroll_body(42.into(), 1)).await;
        assert!(matches!(resp, EnrollResponse::Success { ref identity_id, .. } if identity_id.as_str() == "42"));

        let resp = handle_recognize(&h.recognize, &recognize_body(1)).await;
        assert_eq!(
            resp,
            RecognizeResponse::Matched {
                identity_id: IdentityId::from(42),
                distance: 0.0,
                display_name: None,
                unit: None,
                role: None,
            }
        );

        let json: serde_json::Value = serde_json::from_str(&to_json(&resp)).unwrap();
        assert_eq!(json["status"], "matched");
        assert_eq!(json["identity_id"], "42");
        assert!(json.get("display_name").is_none());
        assert!(json.get("role").is_none());
    }

    #[tokio::test]
    async fn test_matched_response_includes_roster_metadata() {
        let roster = "[[resident]]\nid = 42\nname = \"Ada Moreau\"\nunit = \"4B\"\nrole = \"security\"\n";
        let h = harness(Arc::new(ResidentDirectory::from_toml(roster).unwrap()));
        handle_enroll(&h.enroll, &enroll_body(42.into(), 1)).await;

        let resp = handle_recognize(&h.recognize, &recognize_body(1)).await;
        let json: serde_json::Value = serde_json::from_str(&to_json(&resp)).unwrap();
        assert_eq!(json["status"], "matched");
        assert_eq!(json["display_name"], "Ada Moreau");
        assert_eq!(json["unit"], "4B");
        assert_eq!(json["role"], "security");
    }

    #[tokio::test]
    async fn test_unknown_response_shape() {
        let h = harness(Arc::new(OpenDirectory));
        handle_enroll(&h.enroll, &enroll_body("a".into(), 1)).await;
        let resp = handle_recognize(&h.recognize, &recognize_body(2)).await;
        let json: serde_json::Value = serde_json::from_str(&to_json(&resp)).unwrap();
        assert_eq!(json["status"], "unknown");
        assert!((json["distance"].as_f64().unwrap() - 2f64.sqrt()).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_enroll_error_reasons() {
        let directory = ResidentDirectory::from_toml("[[resident]]\nid = 42\nname = \"Ada\"\n").unwrap();
        let h = harness(Arc::new(directory));

        let cases = [
            ("not json".to_string(), "invalid_request"),
            (r#"{"image":"aGVsbG8="}"#.to_string(), "invalid_request"),
            (r#"{"identity_id":42}"#.to_string(), "missing_image"),
            (r#"{"identity_id":42,"image":"***"}"#.to_string(), "decode_failed"),
            (enroll_body(7.into(), 1), "unknown_identity"),
            (enroll_body(42.into(), 9), "no_face_detected"),
        ];
        for (body, reason) in cases {
            assert_eq!(
                handle_enroll(&h.enroll, &body).await,
                EnrollResponse::Error { reason },
                "{body}"
            );
        }
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_recognize_request_errors_are_audited() {
        let h = harness(Arc::new(OpenDirectory));
        let resp = handle_recognize(&h.recognize, "{").await;
        assert_eq!(resp, RecognizeResponse::Error { reason: "invalid_request" });
        let resp = handle_recognize(&h.recognize, "{}").await;
        assert_eq!(resp, RecognizeResponse::Error { reason: "missing_image" });
        let resp = handle_recognize(&h.recognize, &recognize_body(9)).await;
        assert_eq!(resp, RecognizeResponse::Error { reason: "no_face_detected" });

        let reasons: Vec<_> = h.audit.events().into_iter().filter_map(|e| e.reason).collect();
        assert_eq!(reasons, vec!["invalid_request", "missing_image", "no_face_detected"]);
    }

    #[tokio::test]
    async fn test_list_remove_and_status() {
        let h = harness(Arc::new(OpenDirectory));
        handle_enroll(&h.enroll, &enroll_body("b".into(), 2)).await;
        handle_enroll(&h.enroll, &enroll_body("a".into(), 1)).await;

        let listed = list_encodings(h.store.as_ref()).unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(listed.iter().all(|s| s.dim == 4));
        let json = serde_json::to_value(&listed).unwrap();
        assert!(json[0].get("values").is_none());

        let status = status(h.store.as_ref(), &h.recognize, &h.engine).unwrap();
        assert_eq!(status["encodings"], 2);
        assert_eq!(status["dim"], 4);
        assert_eq!(status["workers"], 2);
        assert_eq!(status["extractor"], "scripted");

        assert!(handle_remove(h.store.clone(), "a").await.unwrap());
        assert!(!handle_remove(h.store.clone(), " a ").await.unwrap());
        assert_eq!(list_encodings(h.store.as_ref()).unwrap().len(), 1);
    }
}
