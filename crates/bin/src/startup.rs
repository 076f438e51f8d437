//! Startup module - wires the containment stack from configuration.

use std::sync::Arc;

use anyhow::Context;
use logshield_application::dedup::ErrorStatsReporter;
use logshield_application::health::HealthReporter;
use logshield_application::lifecycle::{
    ExitProcess, FatalErrorTracker, GlobalExceptionHandlers, HandlerOptions, ProcessTerminator,
    ShutdownCoordinator,
};
use logshield_application::logger::{LoggerSettings, ResilientLogger};
use logshield_application::resilience::DiskSpaceGuard;
use logshield_domain::LogSink;
use logshield_infrastructure::{
    ConsoleSink, FileLogSink, PostgresLogSink, SysinfoDiskProbe, SysinfoHostMetrics,
};
use logshield_shared::config::LogShieldConfig;
use tracing::{info, warn};

/// Everything a host process holds on to after startup
pub struct Stack {
    pub config: LogShieldConfig,
    pub logger: Arc<ResilientLogger>,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub tracker: Arc<FatalErrorTracker>,
    pub remote: Option<Arc<PostgresLogSink>>,
}

impl Stack {
    pub async fn build(config: LogShieldConfig) -> anyhow::Result<Self> {
        Self::build_with_terminator(config, Arc::new(ExitProcess)).await
    }

    pub async fn build_with_terminator(
        config: LogShieldConfig,
        terminator: Arc<dyn ProcessTerminator>,
    ) -> anyhow::Result<Self> {
        let console: Arc<dyn LogSink> = Arc::new(ConsoleSink::new());
        let guard = Arc::new(DiskSpaceGuard::new(
            Arc::new(SysinfoDiskProbe::new()),
            config.disk.poll_interval(),
        ));

        let mut logger = ResilientLogger::new(LoggerSettings::from_config(&config), console.clone())
            .with_file_sink(Arc::new(FileLogSink::from_config(&config.sinks)))
            .with_disk_guard(guard);

        let remote = match &config.sinks.database_url {
            Some(url) => match connect_remote(url).await {
                Ok(sink) => {
                    logger = logger.with_remote_sink(sink.clone());
                    Some(sink)
                }
                // The logger still works locally; the breaker never sees this sink
                Err(e) => {
                    warn!(error = %e, "Remote log sink unavailable; continuing without it");
                    None
                }
            },
            None => None,
        };

        let logger = Arc::new(logger);
        let coordinator = Arc::new(ShutdownCoordinator::new(console, terminator));
        let tracker = Arc::new(FatalErrorTracker::new(
            config.fatal.threshold,
            coordinator.clone(),
        ));

        let flush_target = logger.clone();
        coordinator.register_shutdown_hook("flush-logger", config.fatal.hook_timeout(), move || async move {
            flush_target.flush().await;
            Ok(())
        })?;

        if let Some(sink) = &remote {
            let sink = sink.clone();
            coordinator.register_shutdown_hook("close-database", config.fatal.hook_timeout(), move || async move {
                sink.close().await;
                Ok(())
            })?;
        }

        info!(
            log_dir = %config.sinks.log_dir.display(),
            remote = remote.is_some(),
            fatal_threshold = config.fatal.threshold,
            "Containment stack ready"
        );

        Ok(Self {
            config,
            logger,
            coordinator,
            tracker,
            remote,
        })
    }

    pub fn install_handlers(&self) -> GlobalExceptionHandlers {
        GlobalExceptionHandlers::install(
            self.logger.clone(),
            self.tracker.clone(),
            HandlerOptions::from_config(&self.config.fatal),
        )
    }

    pub fn spawn_stats_reporter(&self) -> tokio::task::JoinHandle<()> {
        let reporter = ErrorStatsReporter::new(
            self.logger.rate_limiter(),
            self.config.logging.stats_interval(),
            self.coordinator.subscribe(),
        );
        tokio::spawn(reporter.run())
    }

    pub fn health_reporter(&self) -> HealthReporter {
        HealthReporter::new(self.logger.clone())
            .with_fatal_tracker(self.tracker.clone())
            .with_host_metrics(Arc::new(SysinfoHostMetrics::new()))
    }
}

async fn connect_remote(url: &str) -> anyhow::Result<Arc<PostgresLogSink>> {
    let sink = PostgresLogSink::connect(url)
        .await
        .context("connecting remote log sink")?;
    sink.run_migrations()
        .await
        .context("preparing remote log table")?;
    Ok(Arc::new(sink))
}
