use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once at startup from the environment
/// (with `.env` support via dotenvy in `main`).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory the process-by-path endpoint resolves relative paths against.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Credential for the LLM extraction endpoint. Optional at startup;
    /// the AI adapter refuses to run without it.
    pub ai_api_key: Option<String>,
    pub ai_base_url: String,
    pub ai_model: String,
    pub ai_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            ai_api_key: None,
            ai_base_url: "https://open.bigmodel.cn/api/paas/v4/chat/completions".to_string(),
            ai_model: "glm-4-flash".to_string(),
            ai_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            port: env_parse("APP_PORT", defaults.port),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            ai_api_key: env::var("AI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            ai_base_url: env::var("AI_BASE_URL").unwrap_or(defaults.ai_base_url),
            ai_model: env::var("AI_MODEL").unwrap_or(defaults.ai_model),
            ai_timeout: Duration::from_secs(env_parse("AI_TIMEOUT_SECS", 30)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
