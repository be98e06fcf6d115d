//! Process configuration (spec §6 Config), loaded once at startup from
//! environment variables and passed down as a plain record — never a
//! global singleton — mirroring the original's `Config` object.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub server_name: String,
    pub software_version: String,

    pub jobs_dir: PathBuf,
    pub results_dir: PathBuf,

    pub database_url: String,

    pub admin_key: String,
    pub hmac_secret: String,
    pub key_prefix: String,

    /// How long a PROCESSING job may go without a heartbeat (seconds).
    pub job_timeout_seconds: i64,
    /// Grace period added on top of `job_timeout_seconds` before the
    /// sweeper acts.
    pub job_timeout_grace_seconds: i64,
    /// Attempts (including the first) before a job is dead-lettered.
    pub job_max_attempts: i32,

    pub alto_schema_validation: bool,
    pub result_zip_validation: bool,

    /// If set, `main` spawns a periodic background sweep on this interval in
    /// addition to the lazy per-claim sweep (spec §5's optional addition).
    pub sweeper_interval_seconds: Option<u64>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Reads every setting from the process environment (spec §6 Config).
    /// Call once at startup; `dotenvy::dotenv()` should be invoked by the
    /// caller before this so a local `.env` file is picked up.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse_or("APP_PORT", 8888),
            server_name: env_or("SERVER_NAME", "document-broker"),
            software_version: env_or("SOFTWARE_VERSION", env!("CARGO_PKG_VERSION")),

            jobs_dir: PathBuf::from(env_or("JOBS_DIR", "./data/jobs")),
            results_dir: PathBuf::from(env_or("RESULTS_DIR", "./data/results")),

            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,

            admin_key: std::env::var("ADMIN_KEY").map_err(|_| anyhow::anyhow!("ADMIN_KEY must be set"))?,
            hmac_secret: std::env::var("HMAC_SECRET").map_err(|_| anyhow::anyhow!("HMAC_SECRET must be set"))?,
            key_prefix: env_or("KEY_PREFIX", "da_"),

            job_timeout_seconds: env_parse_or("JOB_TIMEOUT_SECONDS", 300),
            job_timeout_grace_seconds: env_parse_or("JOB_TIMEOUT_GRACE_SECONDS", 10),
            job_max_attempts: env_parse_or("JOB_MAX_ATTEMPTS", 5),

            alto_schema_validation: env_parse_or("ALTO_SCHEMA_VALIDATION", true),
            result_zip_validation: env_parse_or("RESULT_ZIP_VALIDATION", true),

            sweeper_interval_seconds: std::env::var("SWEEPER_INTERVAL_SECONDS").ok().and_then(|v| v.parse().ok()),
        })
    }

    pub fn sweeper_policy(&self) -> broker_core::SweeperPolicy {
        broker_core::SweeperPolicy::new(
            chrono::Duration::seconds(self.job_timeout_seconds),
            chrono::Duration::seconds(self.job_timeout_grace_seconds),
            self.job_max_attempts,
        )
    }

    /// Ensures the job and result blob directories exist (mirrors the
    /// original's `create_dirs()`).
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.jobs_dir)?;
        std::fs::create_dir_all(&self.results_dir)?;
        Ok(())
    }

    pub fn job_dir(&self, job_id: uuid::Uuid) -> PathBuf {
        self.jobs_dir.join(job_id.to_string())
    }

    pub fn result_path(&self, job_id: uuid::Uuid) -> PathBuf {
        self.results_dir.join(format!("{job_id}.zip"))
    }
}
