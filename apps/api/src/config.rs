use anyhow::{anyhow, Context, Result};

use crate::llm_client::LlmProvider;

/// Application configuration loaded from environment variables.
/// Startup fails if a variable required by the selected mode is missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// In-memory hot store and archive, no Redis or S3 needed.
    pub local_dev: bool,
    pub redis_url: Option<String>,
    pub snapshot_bucket: String,
    /// Custom endpoint for MinIO or other S3-compatible stores.
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub llm_provider: LlmProvider,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub chat_history_limit: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let local_dev = var("LOCAL_DEV").as_deref() == Some("1");
        let redis_url = var("REDIS_URL");
        if !local_dev && redis_url.is_none() {
            return Err(anyhow!(
                "Required environment variable 'REDIS_URL' is not set (or set LOCAL_DEV=1)"
            ));
        }

        let llm_provider: LlmProvider = var("LLM_PROVIDER")
            .unwrap_or_else(|| "mock".to_string())
            .parse()
            .map_err(|e: String| anyhow!(e))
            .context("LLM_PROVIDER is invalid")?;
        let (llm_api_key, llm_model) = match llm_provider {
            LlmProvider::Mock => (None, None),
            LlmProvider::Anthropic => (var("ANTHROPIC_API_KEY"), var("ANTHROPIC_MODEL")),
            LlmProvider::OpenAi => (var("OPENAI_API_KEY"), var("OPENAI_MODEL")),
            LlmProvider::Groq => (var("GROQ_API_KEY"), var("GROQ_MODEL")),
        };

        Ok(Config {
            local_dev,
            redis_url,
            snapshot_bucket: var("SNAPSHOT_BUCKET").unwrap_or_else(|| "resume-snapshots".to_string()),
            s3_endpoint: var("S3_ENDPOINT"),
            s3_region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            aws_access_key_id: var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            llm_provider,
            llm_api_key,
            llm_model,
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            chat_history_limit: var("CHAT_HISTORY_LIMIT")
                .unwrap_or_else(|| "50".to_string())
                .parse::<usize>()
                .context("CHAT_HISTORY_LIMIT must be a non-negative integer")?,
            port: var("PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}
