use std::env;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::logging::{format_error_report, init_logging};
use crate::outbox::OutboxStore;
use crate::remote::{HttpPingProbe, WarehouseApiClient};
use crate::sync_service::{
    production_adapters, BackoffPolicy, OrchestratorConfig, SyncService, TriggerOutcome,
};

/// Flags shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    #[arg(long = "db-path")]
    pub db_path: Option<String>,
    #[arg(long = "api-url")]
    pub api_url: Option<String>,

    #[arg(long = "request-timeout-secs", default_value_t = 20)]
    pub request_timeout_secs: u64,
    #[arg(long = "submit-timeout-secs", default_value_t = 30)]
    pub submit_timeout_secs: u64,

    #[arg(long = "backoff-initial-ms", default_value_t = 2_000)]
    pub backoff_initial_ms: u64,
    #[arg(long = "backoff-max-ms", default_value_t = 300_000)]
    pub backoff_max_ms: u64,
    #[arg(long = "backoff-jitter-ms", default_value_t = 500)]
    pub backoff_jitter_ms: u64,

    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Args, Clone)]
pub struct CompactArgs {
    /// Synced records older than this many hours are deleted.
    #[arg(long = "retention-hours", default_value_t = 168)]
    pub retention_hours: u64,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[arg(long = "probe-interval-secs", default_value_t = 15)]
    pub probe_interval_secs: u64,
}

pub fn validate_common_args(args: &CommonArgs) -> Result<(), String> {
    if args.request_timeout_secs == 0 {
        return Err("--request-timeout-secs must be > 0".to_string());
    }
    if args.submit_timeout_secs == 0 {
        return Err("--submit-timeout-secs must be > 0".to_string());
    }
    if args.backoff_max_ms < args.backoff_initial_ms {
        return Err(format!(
            "--backoff-max-ms ({}) must be >= --backoff-initial-ms ({})",
            args.backoff_max_ms, args.backoff_initial_ms
        ));
    }
    Ok(())
}

pub fn validate_watch_args(args: &WatchArgs) -> Result<(), String> {
    if args.probe_interval_secs == 0 {
        return Err("--probe-interval-secs must be > 0".to_string());
    }
    Ok(())
}

pub fn resolve_db_path(args: &CommonArgs) -> String {
    args.db_path
        .clone()
        .unwrap_or_else(|| Config::from_env().db_path)
}

pub fn resolve_api_url(args: &CommonArgs) -> Result<String, String> {
    if let Some(value) = &args.api_url {
        return Ok(value.clone());
    }

    Config::from_env()
        .api_base_url
        .ok_or_else(|| "WAREHOUSE_API_URL is required (env var or --api-url)".to_string())
}

pub fn build_orchestrator_config(args: &CommonArgs) -> OrchestratorConfig {
    OrchestratorConfig {
        submit_timeout: Duration::from_secs(args.submit_timeout_secs),
        backoff: BackoffPolicy {
            initial: Duration::from_millis(args.backoff_initial_ms),
            max: Duration::from_millis(args.backoff_max_ms),
            jitter: Duration::from_millis(args.backoff_jitter_ms),
        },
    }
}

fn open_store_or_report(db_path: &str) -> Result<OutboxStore, i32> {
    match OutboxStore::open(db_path) {
        Ok(store) => Ok(store),
        Err(err) => {
            let error_report = format_error_report(&err);
            error!(
                event = "outbox_open_failed",
                db_path,
                error = %err,
                "failed to open outbox database"
            );
            eprintln!("failed to open outbox database at {db_path}: {err}");
            eprintln!("{error_report}");
            Err(1)
        }
    }
}

fn build_service(
    args: &CommonArgs,
    store: OutboxStore,
    monitor: ConnectivityMonitor,
) -> Result<(SyncService, Arc<WarehouseApiClient>), i32> {
    let api_url = match resolve_api_url(args) {
        Ok(value) => value,
        Err(message) => {
            eprintln!("{message}");
            return Err(2);
        }
    };

    let client = match WarehouseApiClient::new(
        api_url,
        Duration::from_secs(args.request_timeout_secs),
    ) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("failed to build backend client: {err}");
            return Err(1);
        }
    };

    let service = match SyncService::new(
        store,
        production_adapters(Arc::clone(&client)),
        monitor,
        build_orchestrator_config(args),
    ) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("failed to assemble sync service: {err}");
            return Err(1);
        }
    };

    Ok((service, client))
}

/// Prints per-state counts and dead-lettered records. Local-only; never
/// contacts the backend.
pub async fn run_status(common: CommonArgs) -> i32 {
    dotenv().ok();
    init_logging("mde_outbox", "status", &common.log_level);

    if let Err(message) = validate_common_args(&common) {
        eprintln!("{message}");
        return 2;
    }

    let db_path = resolve_db_path(&common);
    let store = match open_store_or_report(&db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let counts = match store.counts().await {
        Ok(counts) => counts,
        Err(err) => {
            eprintln!("failed to read outbox counts: {err}");
            return 1;
        }
    };

    println!("outbox: {}", db_path);
    println!("  pending: {}", counts.pending);
    println!("  synced:  {}", counts.synced);
    println!("  failed:  {}", counts.failed);

    match store.list_failed().await {
        Ok(failed) if !failed.is_empty() => {
            println!("dead-lettered records:");
            for record in failed {
                println!(
                    "  {} [{}] retries={} error={}",
                    record.id,
                    record.kind().as_db_str(),
                    record.retry_count,
                    record.last_error.as_deref().unwrap_or("-")
                );
            }
        }
        Ok(_) => {}
        Err(err) => {
            eprintln!("failed to list dead-lettered records: {err}");
            return 1;
        }
    }

    0
}

/// Runs one manual sync pass and exits.
///
/// Exit code 0 means the run completed with nothing left behind by failures;
/// records still waiting out their backoff window do not fail the command.
pub async fn run_sync_once(common: CommonArgs) -> i32 {
    dotenv().ok();
    init_logging("mde_outbox", "sync", &common.log_level);

    if let Err(message) = validate_common_args(&common) {
        eprintln!("{message}");
        return 2;
    }

    let db_path = resolve_db_path(&common);
    let store = match open_store_or_report(&db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    // A manual sync asserts "try now"; the monitor starts online and the run
    // itself discovers whether the backend is actually reachable.
    let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
    let (service, _client) = match build_service(&common, store, monitor) {
        Ok(value) => value,
        Err(code) => return code,
    };

    match service.trigger_sync().await {
        Ok(TriggerOutcome::Completed(report)) => {
            println!(
                "sync run finished: {} synced, {} failed, {} skipped, {} dead-lettered",
                report.succeeded, report.failed, report.skipped, report.dead_lettered
            );
            if report.failed > 0 {
                1
            } else {
                0
            }
        }
        Ok(TriggerOutcome::Coalesced) => {
            // Unreachable with a fresh service; kept for completeness.
            println!("sync already in progress");
            0
        }
        Err(err) => {
            let error_report = format_error_report(&err);
            error!(
                event = "manual_sync_failed",
                error = %err,
                "manual sync run failed"
            );
            eprintln!("sync failed: {err}");
            eprintln!("{error_report}");
            1
        }
    }
}

/// Deletes synced records past the retention window. Local-only.
pub async fn run_compact(common: CommonArgs, compact: CompactArgs) -> i32 {
    dotenv().ok();
    init_logging("mde_outbox", "compact", &common.log_level);

    if let Err(message) = validate_common_args(&common) {
        eprintln!("{message}");
        return 2;
    }

    let db_path = resolve_db_path(&common);
    let store = match open_store_or_report(&db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let retention = Duration::from_secs(compact.retention_hours.saturating_mul(3_600));
    match store.prune_synced(retention).await {
        Ok(deleted) => {
            info!(
                event = "outbox_compacted",
                deleted,
                retention_hours = compact.retention_hours,
                "removed synced records past retention"
            );
            println!("removed {deleted} synced records older than {}h", compact.retention_hours);
            0
        }
        Err(err) => {
            eprintln!("compaction failed: {err}");
            1
        }
    }
}

/// Watches backend reachability and drains the outbox on every reconnect,
/// until SIGINT/SIGTERM.
pub async fn run_watch(common: CommonArgs, watch: WatchArgs) -> i32 {
    dotenv().ok();
    init_logging("mde_outbox", "watch", &common.log_level);

    if let Err(message) = validate_common_args(&common).and_then(|()| validate_watch_args(&watch)) {
        eprintln!("{message}");
        return 2;
    }

    let db_path = resolve_db_path(&common);
    let store = match open_store_or_report(&db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    // Start offline; the first probe tick decides the real state and fires
    // the online edge that kicks off the initial drain.
    let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
    let (service, client) = match build_service(&common, store, monitor) {
        Ok(value) => value,
        Err(code) => return code,
    };

    let cancel_token = CancellationToken::new();

    let probe_monitor = service.monitor().clone();
    let probe_cancel = cancel_token.clone();
    let probe_interval = Duration::from_secs(watch.probe_interval_secs);
    let probe_handle = tokio::spawn(async move {
        probe_monitor
            .run_probe_loop(HttpPingProbe::new(client), probe_interval, probe_cancel)
            .await;
    });

    let supervisor_service = service.clone();
    let supervisor_cancel = cancel_token.clone();
    let supervisor_handle =
        tokio::spawn(async move { supervisor_service.run_supervised(supervisor_cancel).await });

    wait_for_shutdown_signal().await;
    info!(event = "watch_shutdown", "shutdown signal received");
    cancel_token.cancel();

    let _ = probe_handle.await;
    match supervisor_handle.await {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            eprintln!("sync supervisor failed: {err}");
            1
        }
        Err(err) => {
            eprintln!("sync supervisor panicked: {err}");
            1
        }
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("Failed to register SIGTERM signal handler");
    let mut sigint =
        signal(SignalKind::interrupt()).expect("Failed to register SIGINT signal handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}
