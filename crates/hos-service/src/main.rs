// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `hos-replay`: run a JSON-lines duty-status log through the compliance
//! service and print one JSON report per driver.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use hos_config_fs::FsConfigStore;
use hos_core::config::{ConfigService, CycleRule, HosConfig, HOS_CONFIG_KEY};
use hos_core::memory::{MemoryAssignments, MemoryTimelineStore};
use hos_core::ComplianceEngine;
use hos_service::{ComplianceService, ManualClock, Replayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a duty-status event log through the HOS engine")]
struct Args {
    /// Event log (JSON lines). Reads stdin when omitted or `-`.
    input: Option<PathBuf>,
    /// Abort on the first malformed or rejected event
    #[arg(long)]
    strict: bool,
    /// Report instant (RFC 3339). Defaults to the last status timestamp in the log.
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
    /// Cycle rule: 60/7 or 70/8 (overrides stored config)
    #[arg(long)]
    cycle: Option<CycleRule>,
    /// Home-terminal offset from UTC in minutes (overrides stored config)
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,
    /// Bound on waiting for a driver's write slot, in milliseconds (overrides stored config)
    #[arg(long)]
    commit_timeout_ms: Option<u64>,
    /// Config directory (defaults to the platform config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,
    /// Pretty-print one combined report instead of JSON lines
    #[arg(long)]
    pretty: bool,
}

/// Best-effort config load: stored values when readable, defaults otherwise.
/// Defaults are written back when nothing was stored yet.
fn load_config(dir: Option<&PathBuf>) -> HosConfig {
    let store = match dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    };
    let svc = match store {
        Ok(store) => ConfigService::new(store),
        Err(err) => {
            warn!(error = %err, "config store unavailable; using defaults");
            return HosConfig::default();
        }
    };
    match svc.load::<HosConfig>(HOS_CONFIG_KEY) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let cfg = HosConfig::default();
            if let Err(err) = svc.save(HOS_CONFIG_KEY, &cfg) {
                warn!(error = %err, "could not persist default config");
            }
            cfg
        }
        Err(err) => {
            warn!(error = %err, "config unreadable; using defaults");
            HosConfig::default()
        }
    }
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    let mut buf = String::new();
    match path.filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            buf = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
        }
        None => {
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
        }
    }
    Ok(buf)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let mut config = load_config(args.config_dir.as_ref());
    if let Some(cycle) = args.cycle {
        config.rules.cycle = cycle;
    }
    if let Some(offset) = args.utc_offset_minutes {
        config.rules.utc_offset_minutes = offset;
    }
    if let Some(ms) = args.commit_timeout_ms {
        config.service.commit_timeout_ms = ms;
    }
    info!(cycle = ?config.rules.cycle, offset = config.rules.utc_offset_minutes, "replay starting");

    let input = read_input(args.input.as_ref())?;

    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(0, 0).single().unwrap_or_default()));
    let engine = ComplianceEngine::new(
        Arc::new(MemoryTimelineStore::new()),
        Arc::new(MemoryAssignments::new()),
        config.rules,
    );
    let service = ComplianceService::with_clock(engine, config.service, clock.clone());
    let mut replayer = Replayer::new(service, clock, args.strict);

    for (idx, line) in input.lines().enumerate() {
        replayer
            .apply_line(idx + 1, line)
            .await
            .context("replay aborted (--strict)")?;
    }
    let report = replayer.finish(args.as_of).await.context("building report")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.pretty {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        for driver in &report.drivers {
            writeln!(out, "{}", serde_json::to_string(driver)?)?;
        }
    }
    out.flush()?;
    Ok(())
}
