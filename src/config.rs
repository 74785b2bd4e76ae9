use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Clone, Deserialize)]
pub struct CsrfConfig {
    pub max_age_seconds: i64,
    /// Signing secret shared by every instance, used as raw bytes. A random
    /// secret is generated at startup when unset.
    pub secret: Option<String>,
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for CsrfConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfConfig")
            .field("max_age_seconds", &self.max_age_seconds)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    pub iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub csrf: CsrfConfig,
    pub hashing: HashingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self { max_requests: 10, window_seconds: 60, cleanup_interval_seconds: 300 }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self { max_age_seconds: 86_400, secret: None }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: signup_guard.toml (in CWD)
        .add_source(::config::File::with_name("signup_guard").required(false));

    if let Ok(custom_path) = std::env::var("SIGNUP_GUARD_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("SIGNUP_GUARD").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub(crate) fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }
    if cfg.server.max_body_bytes < 1024 {
        return Err(anyhow::anyhow!("server.max_body_bytes must be >= 1024"));
    }

    // Rate limiting
    if cfg.rate_limit.max_requests == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests must be > 0"));
    }
    if cfg.rate_limit.window_seconds == 0 {
        return Err(anyhow::anyhow!("rate_limit.window_seconds must be > 0"));
    }
    if !(10..=3600).contains(&cfg.rate_limit.cleanup_interval_seconds) {
        return Err(anyhow::anyhow!("rate_limit.cleanup_interval_seconds must be in 10..=3600"));
    }

    // CSRF
    if cfg.csrf.max_age_seconds <= 0 {
        return Err(anyhow::anyhow!("csrf.max_age_seconds must be > 0"));
    }
    if let Some(secret) = cfg.csrf.secret.as_deref() {
        if secret.len() < 32 {
            return Err(anyhow::anyhow!("csrf.secret must be at least 32 bytes when set"));
        }
    }

    // Hashing
    if cfg.hashing.iterations == 0 {
        return Err(anyhow::anyhow!("hashing.iterations must be > 0"));
    }
    if cfg.hashing.iterations < 100_000 {
        tracing::warn!(
            "hashing.iterations = {} is below the recommended 100000",
            cfg.hashing.iterations
        );
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
