//! One-shot full scan

use super::{format_event, load_config, resolve_requests};
use crate::cli::app::ScanArgs;
use anyhow::Result;
use scaffold_core::{FileEvent, PollingFileMonitorService};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Execute the scan command
pub fn execute(args: ScanArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let requests = resolve_requests(&args.requests, &config)?;

    let service = PollingFileMonitorService::new();
    for request in requests {
        if !service.add(request.clone()) {
            warn!("Skipping request already covered: {}", request);
        }
    }

    let collected = Arc::new(Mutex::new(Vec::<FileEvent>::new()));
    let sink = collected.clone();
    service.add_listener(Arc::new(move |event: &FileEvent| {
        if let Ok(mut events) = sink.lock() {
            events.push(event.clone());
        }
    }));

    let passes = if args.twice { 2 } else { 1 };
    for pass in 1..=passes {
        let published = service.scan_all();
        debug!("Pass {} published {} events", pass, published);

        let events = collected.lock().map(|mut events| std::mem::take(&mut *events)).unwrap_or_default();
        if !args.json {
            println!("Pass {}: {} events", pass, events.len());
        }
        for event in &events {
            println!("{}", format_event(event, args.json));
        }
    }

    Ok(())
}
