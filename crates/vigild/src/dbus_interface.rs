use crate::engine::EngineHandle;
use crate::enrollment::EnrollmentWorkflow;
use crate::handlers;
use crate::recognition::RecognitionWorkflow;
use std::sync::Arc;
use vigil_store::EncodingStore;
use zbus::interface;

/// D-Bus interface for the Vigil access-point daemon.
///
/// Bus name: org.vigil.Gate1
/// Object path: /org/vigil/Gate1
pub struct VigilService {
    pub enrollment: EnrollmentWorkflow,
    pub recognition: RecognitionWorkflow,
    pub store: Arc<dyn EncodingStore>,
    pub engine: EngineHandle,
}

#[interface(name = "org.vigil.Gate1")]
impl VigilService {
    /// Enroll the single face in a base64 image for an identity.
    async fn enroll(&self, request: &str) -> String {
        tracing::debug!(bytes = request.len(), "enroll requested");
        handlers::to_json(&handlers::handle_enroll(&self.enrollment, request).await)
    }

    /// Identify the single face in a base64 image.
    async fn recognize(&self, request: &str) -> String {
        tracing::debug!(bytes = request.len(), "recognize requested");
        handlers::to_json(&handlers::handle_recognize(&self.recognition, request).await)
    }

    /// Remove the encoding of an identity. Returns whether one existed.
    async fn remove_encoding(&self, identity_id: &str) -> zbus::fdo::Result<bool> {
        handlers::handle_remove(Arc::clone(&self.store), identity_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, identity_id, "remove_encoding failed");
                zbus::fdo::Error::Failed(e.to_string())
            })
    }

    /// List enrolled identities without their vectors.
    async fn list_encodings(&self) -> zbus::fdo::Result<String> {
        let summaries = handlers::list_encodings(self.store.as_ref()).map_err(|e| {
            tracing::error!(error = %e, "list_encodings failed");
            zbus::fdo::Error::Failed(format!("store failure: {e}"))
        })?;
        Ok(handlers::to_json(&summaries))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = handlers::status(self.store.as_ref(), &self.recognition, &self.engine)
            .map_err(|e| zbus::fdo::Error::Failed(format!("store failure: {e}")))?;
        Ok(status.to_string())
    }
}
