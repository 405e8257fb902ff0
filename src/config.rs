//! Environment-driven configuration.
//!
//! All external collaborators (database path, text-generation provider,
//! listen address) are consumed as opaque configuration. Missing provider
//! credentials do not prevent startup: the binary falls back to the
//! deterministic stub provider and says so loudly in the log.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed-size chunking parameters for knowledge ingestion, plus the
/// retrieval fan-in for generation.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Window size in characters.
    pub window_chars: usize,
    /// Overlap between consecutive windows, in characters.
    pub overlap_chars: usize,
    /// Number of ranked chunks quoted into a generation prompt.
    pub rag_top_k: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: 500,
            overlap_chars: 100,
            rag_top_k: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer credential. Empty selects the stub provider.
    pub api_key: String,
    pub chat_model: String,
    pub embed_model: String,
    pub transcribe_model: String,
    /// Hard deadline on every outbound provider call.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Explicit database file. `None` resolves to `~/.copydesk/copydesk.db`.
    pub db_path: Option<PathBuf>,
    pub provider: ProviderConfig,
    pub chunking: ChunkingConfig,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,
}

const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TRANSCRIBE_MODEL: &str = "whisper-1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Assemble configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env_or("COPYDESK_BIND", "127.0.0.1:8080")
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid COPYDESK_BIND: {e}"))?;

        let db_path = std::env::var("COPYDESK_DB")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let timeout_secs = std::env::var("COPYDESK_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let provider = ProviderConfig {
            base_url: env_or("COPYDESK_PROVIDER_URL", DEFAULT_PROVIDER_URL),
            api_key: std::env::var("COPYDESK_PROVIDER_API_KEY").unwrap_or_default(),
            chat_model: env_or("COPYDESK_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            embed_model: env_or("COPYDESK_EMBED_MODEL", DEFAULT_EMBED_MODEL),
            transcribe_model: env_or("COPYDESK_TRANSCRIBE_MODEL", DEFAULT_TRANSCRIBE_MODEL),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        };

        Ok(Self {
            bind_addr,
            db_path,
            provider,
            chunking: ChunkingConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: None,
            provider: ProviderConfig {
                base_url: DEFAULT_PROVIDER_URL.to_string(),
                api_key: String::new(),
                chat_model: DEFAULT_CHAT_MODEL.to_string(),
                embed_model: DEFAULT_EMBED_MODEL.to_string(),
                transcribe_model: DEFAULT_TRANSCRIBE_MODEL.to_string(),
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            },
            chunking: ChunkingConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
