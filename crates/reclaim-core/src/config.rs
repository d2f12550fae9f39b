//! Configuration module
//!
//! Configuration for the receipt pipeline: server, database, blob storage,
//! extraction worker handoff, reaper cadence and warranty lookup settings.

use std::env;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_RECEIPT_SIZE_MB: usize = 10;
const DEFAULT_ALLOWED_CONTENT_TYPES: &str =
    "image/jpeg,image/png,image/webp,image/heic,application/pdf";
const EXTRACTION_TIMEOUT_SECS: u64 = 15;
const REAPER_THRESHOLD_MINUTES: i64 = 15;
const REAPER_BATCH_LIMIT: i64 = 10;
const WARRANTY_AI_MODEL: &str = "claude-sonnet-4-20250514";
const WARRANTY_AI_TIMEOUT_SECS: u64 = 30;
const WARRANTY_AI_RATE_LIMIT_PER_HOUR: u32 = 60;
const SIGNED_URL_TTL_SECS: u64 = 900;
const MIN_SECRET_LEN: usize = 32;

/// Base configuration shared by every entry point
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub log_json: bool,
}

/// Rate limit counter backing store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Postgres,
}

/// Pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Storage configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // MinIO and other S3-compatible providers
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub signed_url_ttl_secs: u64,
    // Ingest
    pub max_receipt_size_bytes: usize,
    pub allowed_content_types: Vec<String>,
    pub plan_receipt_limit: i64,
    // Extraction worker handoff
    pub extraction_worker_url: String,
    pub extraction_worker_secret: String,
    pub extraction_timeout_secs: u64,
    // Reaper
    /// Interval in seconds between in-process reaper runs. 0 = disabled.
    pub reaper_schedule_secs: u64,
    pub reaper_threshold_minutes: i64,
    pub reaper_batch_limit: i64,
    // Warranty lookup
    pub warranty_ai_enabled: bool,
    pub anthropic_api_key: Option<String>,
    pub warranty_ai_model: String,
    pub warranty_ai_timeout_secs: u64,
    pub warranty_ai_rate_limit_per_hour: u32,
    pub rate_limit_backend: RateLimitBackend,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<PipelineConfig>);

impl Config {
    fn as_pipeline(&self) -> &PipelineConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_env(&self.as_pipeline().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = PipelineConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_pipeline().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_pipeline().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_pipeline().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_pipeline().base.environment
    }

    pub fn log_json(&self) -> bool {
        self.as_pipeline().base.log_json
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_pipeline().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_pipeline().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.as_pipeline().database_url
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.as_pipeline().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_pipeline().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_pipeline().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_pipeline().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_pipeline().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_pipeline().local_storage_base_url.as_deref()
    }

    pub fn signed_url_ttl_secs(&self) -> u64 {
        self.as_pipeline().signed_url_ttl_secs
    }

    pub fn max_receipt_size_bytes(&self) -> usize {
        self.as_pipeline().max_receipt_size_bytes
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.as_pipeline().allowed_content_types
    }

    pub fn plan_receipt_limit(&self) -> i64 {
        self.as_pipeline().plan_receipt_limit
    }

    pub fn extraction_worker_url(&self) -> &str {
        &self.as_pipeline().extraction_worker_url
    }

    pub fn extraction_worker_secret(&self) -> &str {
        &self.as_pipeline().extraction_worker_secret
    }

    pub fn extraction_timeout_secs(&self) -> u64 {
        self.as_pipeline().extraction_timeout_secs
    }

    pub fn reaper_schedule_secs(&self) -> u64 {
        self.as_pipeline().reaper_schedule_secs
    }

    pub fn reaper_threshold_minutes(&self) -> i64 {
        self.as_pipeline().reaper_threshold_minutes
    }

    pub fn reaper_batch_limit(&self) -> i64 {
        self.as_pipeline().reaper_batch_limit
    }

    pub fn warranty_ai_enabled(&self) -> bool {
        self.as_pipeline().warranty_ai_enabled
    }

    pub fn anthropic_api_key(&self) -> Option<&str> {
        self.as_pipeline().anthropic_api_key.as_deref()
    }

    pub fn warranty_ai_model(&self) -> &str {
        &self.as_pipeline().warranty_ai_model
    }

    pub fn warranty_ai_timeout_secs(&self) -> u64 {
        self.as_pipeline().warranty_ai_timeout_secs
    }

    pub fn warranty_ai_rate_limit_per_hour(&self) -> u32 {
        self.as_pipeline().warranty_ai_rate_limit_per_hour
    }

    pub fn rate_limit_backend(&self) -> RateLimitBackend {
        self.as_pipeline().rate_limit_backend
    }
}

fn is_production_env(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            log_json: env::var("LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .and_then(|s| s.parse::<StorageBackend>().ok());

        let max_receipt_size_mb = env::var("MAX_RECEIPT_SIZE_MB")
            .unwrap_or_else(|_| MAX_RECEIPT_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_RECEIPT_SIZE_MB);

        let allowed_content_types = env::var("ALLOWED_RECEIPT_CONTENT_TYPES")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let anthropic_api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let rate_limit_backend = match env::var("RATE_LIMIT_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "pg" => RateLimitBackend::Postgres,
            "memory" => RateLimitBackend::Memory,
            other => {
                return Err(anyhow::anyhow!(
                    "RATE_LIMIT_BACKEND must be 'memory' or 'postgres', got '{}'",
                    other
                ))
            }
        };

        let config = PipelineConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            signed_url_ttl_secs: env::var("SIGNED_URL_TTL_SECS")
                .unwrap_or_else(|_| SIGNED_URL_TTL_SECS.to_string())
                .parse()
                .unwrap_or(SIGNED_URL_TTL_SECS),
            max_receipt_size_bytes: max_receipt_size_mb * 1024 * 1024,
            allowed_content_types,
            plan_receipt_limit: env::var("PLAN_RECEIPT_LIMIT")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            extraction_worker_url: env::var("EXTRACTION_WORKER_URL")
                .map_err(|_| anyhow::anyhow!("EXTRACTION_WORKER_URL must be set"))?,
            extraction_worker_secret: env::var("EXTRACTION_WORKER_SECRET")
                .map_err(|_| anyhow::anyhow!("EXTRACTION_WORKER_SECRET must be set"))?,
            extraction_timeout_secs: env::var("EXTRACTION_TIMEOUT_SECS")
                .unwrap_or_else(|_| EXTRACTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(EXTRACTION_TIMEOUT_SECS),
            reaper_schedule_secs: env::var("REAPER_SCHEDULE_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            reaper_threshold_minutes: env::var("REAPER_THRESHOLD_MINUTES")
                .unwrap_or_else(|_| REAPER_THRESHOLD_MINUTES.to_string())
                .parse()
                .unwrap_or(REAPER_THRESHOLD_MINUTES),
            reaper_batch_limit: env::var("REAPER_BATCH_LIMIT")
                .unwrap_or_else(|_| REAPER_BATCH_LIMIT.to_string())
                .parse()
                .unwrap_or(REAPER_BATCH_LIMIT),
            warranty_ai_enabled: env::var("WARRANTY_AI_ENABLED")
                .ok()
                .and_then(|s| s.to_lowercase().parse().ok())
                .unwrap_or(anthropic_api_key.is_some()),
            anthropic_api_key,
            warranty_ai_model: env::var("WARRANTY_AI_MODEL")
                .unwrap_or_else(|_| WARRANTY_AI_MODEL.to_string()),
            warranty_ai_timeout_secs: env::var("WARRANTY_AI_TIMEOUT_SECS")
                .unwrap_or_else(|_| WARRANTY_AI_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(WARRANTY_AI_TIMEOUT_SECS),
            warranty_ai_rate_limit_per_hour: env::var("WARRANTY_AI_RATE_LIMIT_PER_HOUR")
                .unwrap_or_else(|_| WARRANTY_AI_RATE_LIMIT_PER_HOUR.to_string())
                .parse()
                .unwrap_or(WARRANTY_AI_RATE_LIMIT_PER_HOUR),
            rate_limit_backend,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if is_production_env(&self.base.environment)
            && self.base.cors_origins.iter().any(|o| o == "*")
        {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if !self.extraction_worker_url.starts_with("http://")
            && !self.extraction_worker_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "EXTRACTION_WORKER_URL must be an http(s) URL"
            ));
        }

        if self.extraction_worker_secret.len() < MIN_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "EXTRACTION_WORKER_SECRET must be at least {} characters long",
                MIN_SECRET_LEN
            ));
        }

        if self.max_receipt_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_RECEIPT_SIZE_MB must be greater than 0"));
        }

        if self.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_RECEIPT_CONTENT_TYPES must list at least one content type"
            ));
        }

        if self.warranty_ai_enabled && self.anthropic_api_key.is_none() {
            return Err(anyhow::anyhow!(
                "WARRANTY_AI_ENABLED=true requires ANTHROPIC_API_KEY to be set"
            ));
        }

        // Validate storage backend configuration
        let backend = self.storage_backend.unwrap_or(StorageBackend::Local);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
