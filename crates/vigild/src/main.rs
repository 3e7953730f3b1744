use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vigil_core::{EmbeddingExtractor, EuclideanMatcher};
use vigil_store::{EncodingStore, SqliteStore};

mod audit;
mod config;
mod dbus_interface;
mod directory;
mod engine;
mod enrollment;
mod error;
mod handlers;
mod recognition;
#[cfg(test)]
mod testing;

use audit::{AuditSink, FanoutAudit, JsonlAudit, TracingAudit};
use config::Config;
use directory::{IdentityDirectory, OpenDirectory, ResidentDirectory};

const BUS_NAME: &str = "org.vigil.Gate1";
const OBJECT_PATH: &str = "/org/vigil/Gate1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigild starting");

    let config = Config::from_env();
    config.validate()?;
    tracing::info!(
        db = %config.db_path.display(),
        models = %config.model_dir.display(),
        threshold = config.match_threshold,
        margin = config.ambiguity_margin,
        dim = config.embedding_dim,
        workers = config.workers,
        "configuration loaded"
    );

    let store: Arc<dyn EncodingStore> = Arc::new(
        SqliteStore::open(&config.db_path, config.embedding_dim)
            .with_context(|| format!("opening encoding store {}", config.db_path.display()))?,
    );

    let directory: Arc<dyn IdentityDirectory> = match &config.directory_path {
        Some(path) => Arc::new(ResidentDirectory::load(path)?),
        None => {
            tracing::warn!("VIGIL_DIRECTORY_PATH not set, accepting every identity");
            Arc::new(OpenDirectory)
        }
    };

    let mut audit = FanoutAudit::new().with(Arc::new(TracingAudit));
    if let Some(path) = &config.audit_log_path {
        let sink = JsonlAudit::open(path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        audit = audit.with(Arc::new(sink));
    }
    let audit: Arc<dyn AuditSink> = Arc::new(audit);

    let extractors = load_extractors(&config)?;
    let engine = engine::spawn_engine(extractors, config.extract_timeout)?;
    tracing::info!(workers = engine.workers(), backend = engine.backend(), "extractor pool ready");

    let service = dbus_interface::VigilService {
        enrollment: enrollment::EnrollmentWorkflow::new(
            engine.clone(),
            store.clone(),
            directory.clone(),
        ),
        recognition: recognition::RecognitionWorkflow::new(
            engine.clone(),
            store.clone(),
            directory,
            audit,
            EuclideanMatcher::new(config.ambiguity_margin),
            config.match_threshold,
        ),
        store,
        engine,
    };

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, session = config.session_bus, "vigild ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("vigild shutting down");

    Ok(())
}

#[cfg(feature = "onnx")]
fn load_extractors(config: &Config) -> Result<Vec<Box<dyn EmbeddingExtractor>>> {
    if config.embedding_dim != vigil_core::recognizer::ARCFACE_EMBEDDING_DIM {
        bail!(
            "VIGIL_EMBEDDING_DIM={} does not match the ArcFace model ({})",
            config.embedding_dim,
            vigil_core::recognizer::ARCFACE_EMBEDDING_DIM
        );
    }
    (0..config.workers)
        .map(|_| {
            let extractor = vigil_core::OnnxExtractor::load(&config.model_dir)
                .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
            Ok(Box::new(extractor) as Box<dyn EmbeddingExtractor>)
        })
        .collect()
}

#[cfg(not(feature = "onnx"))]
fn load_extractors(_config: &Config) -> Result<Vec<Box<dyn EmbeddingExtractor>>> {
    bail!("vigild was built without the `onnx` feature; no embedding extractor is available")
}
