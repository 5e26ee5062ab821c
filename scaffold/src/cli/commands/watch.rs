//! Continuous polling until Ctrl-C

use super::{format_event, load_config, resolve_requests};
use crate::cli::app::WatchArgs;
use anyhow::{Context, Result};
use scaffold_core::monitor::{MonitorDriver, NotifyHintSource};
use scaffold_core::{FileEvent, PollingFileMonitorService};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Execute the watch command
pub async fn execute(args: WatchArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let requests = resolve_requests(&args.requests, &config)?;

    let service = Arc::new(PollingFileMonitorService::new());
    for request in requests {
        info!("Monitoring {}", request);
        if !service.add(request.clone()) {
            warn!("Skipping request already covered: {}", request);
        }
    }

    let json = args.json;
    service.add_listener(Arc::new(move |event: &FileEvent| {
        println!("{}", format_event(event, json));
    }));

    // Kept alive for the duration of the watch
    let _hints = if args.native_hints || config.monitor.native_hints {
        Some(NotifyHintSource::for_requests(service.clone()).context("Failed to start native watcher")?)
    } else {
        None
    };

    let mut monitor_config = config.monitor.clone();
    if let Some(interval) = args.interval_ms {
        monitor_config.poll_interval_ms = interval;
    }

    println!("Watching {} request(s), press Ctrl-C to stop", service.requests().len());
    let driver = MonitorDriver::new(service.clone(), &monitor_config);
    let stats = driver
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
            }
        })
        .await;

    info!(
        "Stopped after {} passes ({} full scans, {} events)",
        stats.passes, stats.full_scans, stats.events_published
    );
    Ok(())
}
