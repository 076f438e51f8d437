use anyhow::{bail, Context};
use logshield_infrastructure::PostgresLogSink;
use logshield_shared::config::LogShieldConfig;

/// Report, and unless `dry_run` delete, remote entries older than `days`
pub async fn run(config: &LogShieldConfig, days: u32, dry_run: bool) -> anyhow::Result<()> {
    let Some(url) = &config.sinks.database_url else {
        bail!("LOGSHIELD_DATABASE_URL is not set; there is no remote log table to clean");
    };

    let sink = PostgresLogSink::connect(url)
        .await
        .context("connecting remote log sink")?;
    let report = sink.cleanup_older_than(days, dry_run).await?;
    sink.close().await;

    println!("Cutoff:   {}", report.cutoff.to_rfc3339());
    println!("Matched:  {}", report.matched);
    if report.dry_run {
        println!("Dry run; nothing deleted");
    } else {
        println!("Deleted:  {}", report.deleted);
    }
    Ok(())
}
