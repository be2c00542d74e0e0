//! `msk run`: registry + dispatcher from config, then the poll loop.
//!
//! With `--until` the loop runs on a simulated clock (`--now` .. `--until`
//! in `--step-secs` steps) and exits; output is deterministic. Otherwise it
//! polls on the wall clock every `dispatcher.poll_interval_ms` until Ctrl-C.
//!
//! Each triggered transition is printed as one JSON line.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use msk_calendar::{codec, CalendarId, CalendarRegistry};
use msk_config::ConfigMode;
use msk_dispatch::Dispatcher;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::store;

pub struct RunArgs {
    pub config_paths: Vec<String>,
    pub now: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub step_secs: u64,
    pub strict_keys: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let (loaded, cfg) =
        super::load_driver_config(&args.config_paths, ConfigMode::Run, args.strict_keys)?;

    let registry = CalendarRegistry::new();
    let dir = cfg.calendars_dir(&super::config_base(&args.config_paths));
    store::load_dir(&registry, &dir)?;

    let known: BTreeSet<i64> = registry.ids().into_iter().map(|id| id.0).collect();
    cfg.check_bindings(&known)?;

    let dispatcher = Dispatcher::new(cfg.dispatcher.name.clone());
    let start = args.now.unwrap_or_else(Utc::now);

    for (id, targets) in cfg.targets_by_calendar() {
        let id = CalendarId(id);
        let master = registry
            .master(id)
            .with_context(|| format!("calendar id {id} vanished from the registry"))?;
        dispatcher.follow(&master);
        for target in targets {
            let inst = registry
                .targeted_copy(id, &target)
                .with_context(|| format!("targeted copy of calendar {id} for {target:?}"))?;
            if !dispatcher.register(Arc::new(inst), start) {
                bail!("could not register target {target:?} on calendar {id}");
            }
        }
    }

    info!(
        dispatcher = %dispatcher.name(),
        config_hash = %loaded.config_hash,
        registered = dispatcher.registered_len(),
        pending = dispatcher.pending_len(),
        start = %start,
        "dispatcher ready"
    );

    match args.until {
        Some(until) => simulate(&dispatcher, start, until, args.step_secs),
        None => poll_wall_clock(&dispatcher, cfg.dispatcher.poll_interval_ms).await,
    }
}

/// Hand out every transition due at `now`.
fn drain(dispatcher: &Dispatcher, now: DateTime<Utc>, out: &mut impl Write) -> Result<usize> {
    let mut n = 0usize;
    while let Some(tr) = dispatcher.get_triggered(now) {
        writeln!(out, "{}", codec::encode_transition(&tr)).context("write transition")?;
        n += 1;
    }
    out.flush().context("flush output")?;
    Ok(n)
}

fn simulate(
    dispatcher: &Dispatcher,
    start: DateTime<Utc>,
    until: DateTime<Utc>,
    step_secs: u64,
) -> Result<()> {
    if step_secs == 0 {
        bail!("--step-secs must be > 0");
    }
    if until < start {
        bail!("--until ({until}) is before the start instant ({start})");
    }
    let step = Duration::seconds(i64::try_from(step_secs).context("--step-secs too large")?);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut clock = start;
    let mut total = 0usize;
    loop {
        total += drain(dispatcher, clock, &mut out)?;
        if clock >= until {
            break;
        }
        clock = (clock + step).min(until);
    }
    info!(dispatcher = %dispatcher.name(), until = %until, dispatched = total, "simulation finished");
    Ok(())
}

async fn poll_wall_clock(dispatcher: &Dispatcher, poll_interval_ms: u64) -> Result<()> {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(poll_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let n = drain(dispatcher, Utc::now(), &mut io::stdout().lock())?;
                if n > 0 {
                    info!(dispatcher = %dispatcher.name(), dispatched = n, "poll");
                }
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "ctrl-c handler failed; stopping");
                }
                info!(dispatcher = %dispatcher.name(), "stopping");
                return Ok(());
            }
        }
    }
}
