//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use apalis_cron::Schedule;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::jobs::{DEFAULT_FLUSH_COUNTERS_CRON, DEFAULT_SYNC_TAGS_CRON};
use crate::cache::CacheBackend;

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, ServeArgs, ServeOverrides, SyncTagsArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pulse";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 16;
const DEFAULT_KEY_PREFIX: &str = "pulse";
const DEFAULT_COUNTER_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_FOLLOWER_TTL_SECS: u64 = 60;
const DEFAULT_CAS_RETRY_LIMIT: u64 = 16;
const DEFAULT_MEMORY_CAPACITY: u64 = 100_000;
const DEFAULT_TAG_LIMIT: u64 = 10;
const DEFAULT_TAG_MAX_LIMIT: u64 = 50;
const DEFAULT_TRENDING_WINDOW_HOURS: u64 = 24;
const DEFAULT_TRENDING_REVALIDATE_SECS: u64 = 300;
const DEFAULT_TRENDING_LIMIT: u64 = 10;
const DEFAULT_TRENDING_MAX_LIMIT: u64 = 50;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub tags: TagsSettings,
    pub trending: TrendingSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub counter_ttl: Duration,
    pub follower_ttl: Duration,
    pub cas_retry_limit: NonZeroU32,
    pub memory_capacity: NonZeroUsize,
}

/// Result-size bounds shared by list endpoints.
#[derive(Debug, Clone, Copy)]
pub struct LimitSettings {
    pub default: NonZeroU32,
    pub max: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct TagsSettings {
    pub sync_schedule: Schedule,
    pub limits: LimitSettings,
}

#[derive(Debug, Clone)]
pub struct TrendingSettings {
    pub window_hours: NonZeroU32,
    pub revalidate: Duration,
    pub limits: LimitSettings,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub counter_flush_schedule: Schedule,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PULSE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::SyncTags(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    tags: RawTagsSettings,
    trending: RawTrendingSettings,
    jobs: RawJobsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(cron) = overrides.jobs_counter_flush_cron.as_ref() {
            self.jobs.counter_flush_cron = Some(cron.clone());
        }
        if let Some(cron) = overrides.tags_sync_cron.as_ref() {
            self.tags.sync_cron = Some(cron.clone());
        }

        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            tags,
            trending,
            jobs,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            tags: build_tags_settings(tags)?,
            trending: build_trending_settings(trending)?,
            jobs: build_jobs_settings(jobs)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = positive_seconds(graceful_secs, "server.graceful_shutdown_seconds")?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .map(u64::from)
            .unwrap_or(u64::from(DEFAULT_DB_MAX_CONNECTIONS)),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("memory") => CacheBackend::Memory,
        Some("redis") => CacheBackend::Redis,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}`; expected `redis` or `memory`"),
            ));
        }
    };

    let redis_url = non_blank(cache.redis_url);
    if backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend = \"redis\"",
        ));
    }

    let key_prefix = cache
        .key_prefix
        .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());
    let key_prefix = key_prefix.trim().trim_end_matches(':').to_string();
    if key_prefix.is_empty() || key_prefix.chars().any(char::is_whitespace) {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "must be non-empty and contain no whitespace",
        ));
    }

    let counter_ttl = positive_seconds(
        cache.counter_ttl_seconds.unwrap_or(DEFAULT_COUNTER_TTL_SECS),
        "cache.counter_ttl_seconds",
    )?;
    let follower_ttl = positive_seconds(
        cache
            .follower_ttl_seconds
            .unwrap_or(DEFAULT_FOLLOWER_TTL_SECS),
        "cache.follower_ttl_seconds",
    )?;
    let cas_retry_limit = non_zero_u32(
        cache.cas_retry_limit.unwrap_or(DEFAULT_CAS_RETRY_LIMIT),
        "cache.cas_retry_limit",
    )?;

    let capacity = cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY);
    let memory_capacity = usize::try_from(capacity)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.memory_capacity",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(CacheSettings {
        backend,
        redis_url,
        key_prefix,
        counter_ttl,
        follower_ttl,
        cas_retry_limit,
        memory_capacity,
    })
}

fn build_tags_settings(tags: RawTagsSettings) -> Result<TagsSettings, LoadError> {
    let sync_schedule = parse_schedule(
        tags.sync_cron.as_deref().unwrap_or(DEFAULT_SYNC_TAGS_CRON),
        "tags.sync_cron",
    )?;
    let limits = build_limits(
        tags.default_limit.unwrap_or(DEFAULT_TAG_LIMIT),
        tags.max_limit.unwrap_or(DEFAULT_TAG_MAX_LIMIT),
        "tags.default_limit",
        "tags.max_limit",
    )?;

    Ok(TagsSettings {
        sync_schedule,
        limits,
    })
}

fn build_trending_settings(trending: RawTrendingSettings) -> Result<TrendingSettings, LoadError> {
    let window_hours = non_zero_u32(
        trending
            .window_hours
            .unwrap_or(DEFAULT_TRENDING_WINDOW_HOURS),
        "trending.window_hours",
    )?;
    let revalidate = positive_seconds(
        trending
            .revalidate_seconds
            .unwrap_or(DEFAULT_TRENDING_REVALIDATE_SECS),
        "trending.revalidate_seconds",
    )?;
    let limits = build_limits(
        trending.default_limit.unwrap_or(DEFAULT_TRENDING_LIMIT),
        trending.max_limit.unwrap_or(DEFAULT_TRENDING_MAX_LIMIT),
        "trending.default_limit",
        "trending.max_limit",
    )?;

    Ok(TrendingSettings {
        window_hours,
        revalidate,
        limits,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let counter_flush_schedule = parse_schedule(
        jobs.counter_flush_cron
            .as_deref()
            .unwrap_or(DEFAULT_FLUSH_COUNTERS_CRON),
        "jobs.counter_flush_cron",
    )?;

    Ok(JobsSettings {
        counter_flush_schedule,
    })
}

fn build_limits(
    default: u64,
    max: u64,
    default_key: &'static str,
    max_key: &'static str,
) -> Result<LimitSettings, LoadError> {
    let default = non_zero_u32(default, default_key)?;
    let max = non_zero_u32(max, max_key)?;
    if default > max {
        return Err(LoadError::invalid(
            default_key,
            format!("must not exceed {max_key} ({max})"),
        ));
    }
    Ok(LimitSettings { default, max })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    redis_url: Option<String>,
    key_prefix: Option<String>,
    counter_ttl_seconds: Option<u64>,
    follower_ttl_seconds: Option<u64>,
    cas_retry_limit: Option<u64>,
    memory_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTagsSettings {
    sync_cron: Option<String>,
    default_limit: Option<u64>,
    max_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTrendingSettings {
    window_hours: Option<u64>,
    revalidate_seconds: Option<u64>,
    default_limit: Option<u64>,
    max_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    counter_flush_cron: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_schedule(expression: &str, key: &'static str) -> Result<Schedule, LoadError> {
    Schedule::from_str(expression.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid cron expression: {err}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
