//! ias-threadfix - InsightAppSec to ThreadFix scan synchronisation
//!
//! CLI/Service tool that exports Rapid7 InsightAppSec DAST scans into ThreadFix
use clap::Parser;
use ias_threadfix::cli::{self, Commands, ConfigAction};
use ias_threadfix::threadfix::ThreadFixClient;
use ias_threadfix::{
    Result, ScanPersister, Settings, SeverityMapper, SyncEngine, logging, metrics, service,
};
use insightappsec_api::InsightAppSecClient;
use log::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    // Load settings (file, then IAS_THREADFIX__* environment overrides)
    let settings = Settings::load(&args.config)?;

    // Initialize logging
    logging::init(&settings.logging, args.log_level.as_deref())?;

    info!("ias-threadfix - InsightAppSec to ThreadFix scan synchronisation");
    info!("Settings loaded from {}", args.config.display());

    if let Commands::Config { action } = &args.command {
        return run_config_command(&settings, *action);
    }

    if let Err(e) = settings.validate() {
        error!("{e}");
        return Err(e);
    }

    // Create ThreadFix client
    let threadfix = ThreadFixClient::new(settings.threadfix_config())?;

    if matches!(args.command, Commands::Severities) {
        return list_severities(&threadfix).await;
    }

    // Create InsightAppSec client
    let insightappsec = InsightAppSecClient::new(settings.insightappsec_config())?;

    let sink = metrics::sink_from_settings(&settings.metrics)?;
    let severities = SeverityMapper::new(settings.effective_severity_mappings());
    let engine = SyncEngine::new(&insightappsec, &threadfix, severities, &*sink);

    // Execute command
    match args.command {
        Commands::Run { persist } => {
            let engine = with_persistence(engine, persist);
            run_cli_mode(&engine, &settings).await?;
        }
        Commands::Service {
            interval_minutes,
            persist,
        } => {
            let engine = with_persistence(engine, persist);
            let interval_minutes = interval_minutes.unwrap_or(settings.scheduler.interval_minutes);
            service::run_service(&engine, &settings.export_configurations, interval_minutes).await;
        }
        Commands::ImportScan {
            scan,
            app,
            team,
            persist,
        } => {
            let engine = with_persistence(engine, persist);
            if engine.import_scan_by_id(&scan, &app, &team).await? {
                info!("Scan {scan} imported into ThreadFix application {app}");
            } else {
                error!("Scan {scan} was not accepted by ThreadFix application {app}");
            }
        }
        Commands::Severities | Commands::Config { .. } => {}
    }

    Ok(())
}

fn with_persistence<'a>(
    engine: SyncEngine<'a, InsightAppSecClient, ThreadFixClient>,
    persist: bool,
) -> SyncEngine<'a, InsightAppSecClient, ThreadFixClient> {
    if persist {
        engine.with_persister(ScanPersister::new("."))
    } else {
        engine
    }
}

/// Run in CLI mode (one pass over every enabled export configuration)
async fn run_cli_mode(
    engine: &SyncEngine<'_, InsightAppSecClient, ThreadFixClient>,
    settings: &Settings,
) -> Result<()> {
    info!("Running in CLI mode");
    info!(
        "  Enabled export configurations: {}",
        settings.enabled_export_configurations().count()
    );

    let summary = engine.run(settings.enabled_export_configurations()).await;
    info!(
        "Sync complete: {} configurations processed, {} failed, {} scans uploaded, {} scans failed",
        summary.configurations_processed,
        summary.configurations_failed,
        summary.scans_uploaded,
        summary.scans_failed
    );

    if summary.configurations_failed > 0 {
        error!(
            "{} export configuration(s) failed; see log for details",
            summary.configurations_failed
        );
    }
    Ok(())
}

fn run_config_command(settings: &Settings, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Print => {
            println!("{}", settings.to_redacted_json()?);
            Ok(())
        }
        ConfigAction::Validate => {
            settings.validate()?;
            info!(
                "Settings are valid ({} enabled export configurations)",
                settings.enabled_export_configurations().count()
            );
            println!("Settings are valid");
            Ok(())
        }
    }
}

async fn list_severities(threadfix: &ThreadFixClient) -> Result<()> {
    let severities = threadfix.list_severities().await?;
    info!("ThreadFix reports {} severities", severities.len());
    for severity in &severities {
        let display = if severity.display_name.is_empty() {
            &severity.name
        } else {
            &severity.display_name
        };
        println!("{:>3}  {:<12} {}", severity.int_value, severity.name, display);
    }
    Ok(())
}
