use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::{decode_image, DecodeError, Embedding, EmbeddingExtractor, ExtractorError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("extractor: {0}")]
    Extractor(#[from] ExtractorError),
    #[error("extraction exceeded {0:?}")]
    Timeout(Duration),
    #[error("engine workers exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the worker threads.
struct ExtractRequest {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<Embedding>, EngineError>>,
}

/// Clone-safe handle to the extractor workers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<ExtractRequest>,
    timeout: Duration,
    workers: usize,
    backend: Arc<str>,
}

impl EngineHandle {
    /// Decode `image` and extract one embedding per detected face.
    ///
    /// Queueing, decoding and inference together are bounded by the engine
    /// timeout. A late result from the worker is discarded, never retried.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Vec<Embedding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = async {
            self.tx
                .send(ExtractRequest { image, reply: reply_tx })
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "face extraction timed out");
                Err(EngineError::Timeout(self.timeout))
            }
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

/// Spawn one dedicated OS thread per extractor.
///
/// Extractors are loaded by the caller beforehand so model failures surface at
/// startup. Workers share a single request queue.
pub fn spawn_engine(
    extractors: Vec<Box<dyn EmbeddingExtractor>>,
    timeout: Duration,
) -> std::io::Result<EngineHandle> {
    let workers = extractors.len();
    let backend: Arc<str> = extractors
        .first()
        .map(|e| e.name())
        .unwrap_or("none")
        .into();

    let (tx, rx) = mpsc::channel::<ExtractRequest>(workers.max(1) * 4);
    let rx = Arc::new(Mutex::new(rx));

    for (n, mut extractor) in extractors.into_iter().enumerate() {
        let rx = Arc::clone(&rx);
        std::thread::Builder::new()
            .name(format!("vigil-extract-{n}"))
            .spawn(move || {
                tracing::info!(worker = n, backend = extractor.name(), "extractor worker started");
                loop {
                    let next = match rx.lock() {
                        Ok(mut rx) => rx.blocking_recv(),
                        Err(_) => None,
                    };
                    let Some(req) = next else { break };

                    // Caller timed out or went away while queued.
                    if req.reply.is_closed() {
                        tracing::debug!(worker = n, "dropping abandoned request");
                        continue;
                    }
                    let result = run_extract(extractor.as_mut(), &req.image);
                    let _ = req.reply.send(result);
                }
                tracing::info!(worker = n, "extractor worker exiting");
            })?;
    }

    Ok(EngineHandle { tx, timeout, workers, backend })
}

/// Received → Decoded → {FaceDetectionFailed | EmbeddingComputed}
fn run_extract(
    extractor: &mut dyn EmbeddingExtractor,
    image: &[u8],
) -> Result<Vec<Embedding>, EngineError> {
    let started = Instant::now();
    let frame = decode_image(image)?;
    let result = extractor.extract(&frame);
    tracing::debug!(
        width = frame.width,
        height = frame.height,
        faces = result.as_ref().map(Vec::len).unwrap_or(0),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "extraction finished"
    );
    Ok(result?)
}
