use std::{process, sync::Arc, time::Duration};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use pulse::{
    application::{
        counters::CounterCache,
        error::AppError,
        followers::{FollowService, FollowerInfoCache},
        jobs::{
            FlushCountersContext, SyncTagsContext, process_flush_counters_job,
            process_sync_tags_job,
        },
        repos::{CountersRepo, FollowsRepo, HealthCheck, TagsRepo},
        tags::TagCache,
        trending::TrendingHashtags,
    },
    cache::{CacheBackend, CacheConfig, KeySpace, KvStore, MemoryKvStore, RedisKvStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiLimits, ApiState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::SyncTags(_) => run_sync_tags(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let kv = build_kv(&cache_config).await?;
    let app = build_application_context(repositories, kv, &cache_config, &settings);

    let jobs = spawn_job_monitor(&app, &settings);

    let result = serve_http(&settings, app.api_state.clone()).await;

    jobs.stop(settings.server.graceful_shutdown).await;

    // Increments since the last scheduled flush would otherwise only live in the KV store.
    match app.api_state.counters.flush().await {
        Ok(report) => info!(
            target = "pulse::shutdown",
            flushed = report.flushed,
            failed = report.failed,
            "Final counter flush completed"
        ),
        Err(err) => warn!(
            target = "pulse::shutdown",
            error = %err,
            pending = app.api_state.counters.pending(),
            "Final counter flush failed"
        ),
    }

    result
}

async fn run_sync_tags(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let tags_repo: Arc<dyn TagsRepo> = repositories;
    let tags = TagCache::new(tags_repo);

    info!(target = "pulse::sync_tags", "Starting tag sync");
    let synced = tags.sync_tag_counts().await?;
    info!(target = "pulse::sync_tags", tags = synced, "Tag sync completed");
    Ok(())
}

struct ApplicationContext {
    api_state: ApiState,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_kv(cache: &CacheConfig) -> Result<Arc<dyn KvStore>, AppError> {
    let kv: Arc<dyn KvStore> = match cache.backend {
        CacheBackend::Memory => Arc::new(MemoryKvStore::new(cache)),
        CacheBackend::Redis => {
            let url = cache
                .redis_url
                .as_deref()
                .ok_or_else(|| InfraError::configuration("cache.redis_url is not configured"))?;
            let store = RedisKvStore::connect(url)
                .await
                .map_err(|err| InfraError::cache(err.to_string()))?;
            Arc::new(store)
        }
    };

    info!(
        target = "pulse::bootstrap",
        backend = kv.backend_name(),
        atomic_incr = kv.supports_atomic_incr(),
        "KV store ready"
    );
    Ok(kv)
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    kv: Arc<dyn KvStore>,
    cache_config: &CacheConfig,
    settings: &config::Settings,
) -> ApplicationContext {
    let counters_repo: Arc<dyn CountersRepo> = repositories.clone();
    let tags_repo: Arc<dyn TagsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let health: Arc<dyn HealthCheck> = repositories;

    let counters = CounterCache::new(kv.clone(), counters_repo, cache_config);
    let tags = Arc::new(TagCache::new(tags_repo.clone()));
    let trending = TrendingHashtags::new(
        kv.clone(),
        tags_repo,
        KeySpace::new(cache_config.key_prefix.clone()),
        settings.trending.window_hours.get(),
        settings.trending.revalidate,
    );
    let follower_cache = FollowerInfoCache::new(kv.clone(), follows_repo.clone(), cache_config);
    let follows = FollowService::new(follows_repo, follower_cache);

    let api_state = ApiState {
        counters,
        tags,
        trending,
        follows,
        store: health,
        kv,
        limits: ApiLimits {
            tags: settings.tags.limits,
            trending: settings.trending.limits,
        },
    };

    ApplicationContext { api_state }
}

struct JobMonitor {
    handle: tokio::task::JoinHandle<()>,
    stop: tokio::sync::oneshot::Sender<()>,
}

impl JobMonitor {
    /// Ask the workers to finish their current run, then wait up to `grace`.
    async fn stop(self, grace: Duration) {
        let Self { mut handle, stop } = self;
        let _ = stop.send(());
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!(
                target = "pulse::shutdown",
                grace_seconds = grace.as_secs(),
                "Job monitor did not stop in time; aborting"
            );
            handle.abort();
        }
    }
}

fn spawn_job_monitor(app: &ApplicationContext, settings: &config::Settings) -> JobMonitor {
    let sync_tags_ctx = SyncTagsContext {
        tags: app.api_state.tags.clone(),
    };
    let sync_tags_worker = WorkerBuilder::new("sync-tags-worker")
        .data(sync_tags_ctx)
        .backend(CronStream::new(settings.tags.sync_schedule.clone()))
        .build_fn(process_sync_tags_job);

    let flush_counters_ctx = FlushCountersContext {
        counters: app.api_state.counters.clone(),
    };
    let flush_counters_worker = WorkerBuilder::new("flush-counters-worker")
        .data(flush_counters_ctx)
        .backend(CronStream::new(settings.jobs.counter_flush_schedule.clone()))
        .build_fn(process_flush_counters_job);

    let monitor = Monitor::new()
        .register(sync_tags_worker)
        .register(flush_counters_worker)
        .shutdown_timeout(settings.server.graceful_shutdown);

    let (stop, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let signal = async move {
            let _ = stop_rx.await;
            Ok(())
        };
        if let Err(err) = monitor.run_with_signal(signal).await {
            error!(error = %err, "job monitor stopped");
        }
    });

    JobMonitor { handle, stop }
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(api_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "pulse::bootstrap",
        addr = %settings.server.addr,
        "HTTP server listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(target = "pulse::shutdown", "Shutdown signal received; draining");
    let _ = stop_tx.send(());
    drain(server, settings.server.graceful_shutdown).await
}

async fn drain(
    mut server: tokio::task::JoinHandle<std::io::Result<()>>,
    grace: Duration,
) -> Result<(), AppError> {
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "pulse::shutdown",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "pulse::shutdown", error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "pulse::shutdown", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
