use anyhow::{ensure, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match (inclusive).
    ///
    /// 1.10 on unit-norm ArcFace embeddings is roughly cosine similarity 0.40.
    /// 128-d dlib-style extractors are usually tuned around 0.6.
    pub match_threshold: f32,
    /// Minimum best/second-best distance gap for a confident match.
    pub ambiguity_margin: f32,
    /// Embedding dimension D produced by the extractor.
    pub embedding_dim: usize,
    /// Upper bound on decode + extraction per request.
    pub extract_timeout: Duration,
    /// Extractor worker threads, each with its own model sessions.
    pub workers: usize,
    /// Resident roster (TOML). Without it every identity is accepted.
    pub directory_path: Option<PathBuf>,
    /// Append-only JSON-lines audit log, in addition to the tracing audit stream.
    pub audit_log_path: Option<PathBuf>,
    /// Register on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            model_dir: vigil_core::default_model_dir(),
            db_path: data_dir.join("faces.db"),
            match_threshold: 1.10,
            ambiguity_margin: vigil_core::DEFAULT_AMBIGUITY_MARGIN,
            embedding_dim: 512,
            extract_timeout: Duration::from_secs(10),
            workers: 2,
            directory_path: None,
            audit_log_path: None,
            session_bus: false,
        }
    }
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_dir: env_path("VIGIL_MODEL_DIR").unwrap_or(defaults.model_dir),
            db_path: env_path("VIGIL_DB_PATH").unwrap_or(defaults.db_path),
            match_threshold: env_parse("VIGIL_MATCH_THRESHOLD", defaults.match_threshold),
            ambiguity_margin: env_parse("VIGIL_AMBIGUITY_MARGIN", defaults.ambiguity_margin),
            embedding_dim: env_parse("VIGIL_EMBEDDING_DIM", defaults.embedding_dim),
            extract_timeout: Duration::from_secs(env_parse(
                "VIGIL_EXTRACT_TIMEOUT_SECS",
                defaults.extract_timeout.as_secs(),
            )),
            workers: env_parse("VIGIL_WORKERS", defaults.workers),
            directory_path: env_path("VIGIL_DIRECTORY_PATH"),
            audit_log_path: env_path("VIGIL_AUDIT_LOG"),
            session_bus: std::env::var("VIGIL_SESSION_BUS")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }

    /// Reject settings the matching policy cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.match_threshold.is_finite() && self.match_threshold > 0.0,
            "VIGIL_MATCH_THRESHOLD must be a positive number, got {}",
            self.match_threshold
        );
        ensure!(
            self.ambiguity_margin.is_finite() && self.ambiguity_margin >= 0.0,
            "VIGIL_AMBIGUITY_MARGIN must be >= 0, got {}",
            self.ambiguity_margin
        );
        ensure!(self.embedding_dim > 0, "VIGIL_EMBEDDING_DIM must be > 0");
        ensure!(self.workers > 0, "VIGIL_WORKERS must be > 0");
        ensure!(
            !self.extract_timeout.is_zero(),
            "VIGIL_EXTRACT_TIMEOUT_SECS must be > 0"
        );
        Ok(())
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vigil")
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or_default(key, std::env::var(key).ok(), default)
}

/// A set but unparseable value falls back to `default` loudly, so a typo such
/// as `VIGIL_MATCH_THRESHOLD=0,6` is visible in the logs.
fn parse_or_default<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting, using default");
            default
        }
    }
}
