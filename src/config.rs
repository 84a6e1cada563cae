use std::path::PathBuf;

pub const DB_FILE_NAME: &str = "students.sqlite3";
pub const IMAGES_DIR: &str = "images";

const ENV_WORKSPACE: &str = "STUDENTD_WORKSPACE";
const ENV_LOG: &str = "STUDENTD_LOG";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            workspace: non_empty_env(ENV_WORKSPACE).map(PathBuf::from),
            log_filter: non_empty_env(ENV_LOG),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Logs go to stderr; stdout is reserved for protocol responses.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = config
        .log_filter
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
