//! `watch`: run the engine until Ctrl-C, printing every cycle and
//! reloading the config file when it changes.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use quotamon_core::{FetchResult, QuotaEngine};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::commands::status;
use crate::config;
use crate::error::CliError;
use crate::output;

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Cycles without records only produce the stderr failure notice, whatever
/// the output format.
fn has_output(result: &FetchResult) -> bool {
    !result.records.is_empty()
}

fn print_cycle(engine: &QuotaEngine, result: &FetchResult, flat: bool, global: &GlobalOpts) {
    status::report_failure(result, global);
    if !has_output(result) {
        return;
    }
    let rendered = status::render(engine, result, flat, global);
    output::print_output(&rendered, global.quiet);
}

pub async fn handle(
    args: WatchArgs,
    engine: &QuotaEngine,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let path = config::config_path(global);
    let mut results = engine.subscribe();

    engine.start();
    info!(
        interval_secs = engine.current_interval().as_secs(),
        config = %path.display(),
        "watching quotas"
    );

    let mut reload = tokio::time::interval(Duration::from_secs(args.reload_every.max(1)));
    reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_modified = modified(&path);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("interrupt received");
                break;
            }
            received = results.recv() => match received {
                Ok(result) => print_cycle(engine, &result, args.flat, global),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind, results dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = reload.tick() => {
                let current = modified(&path);
                if current == last_modified {
                    continue;
                }
                last_modified = current;
                match config::resolve_settings(global) {
                    Ok(settings) => {
                        info!("config file changed, settings reloaded");
                        engine.update_settings(settings);
                    }
                    Err(e) => warn!(error = %e, "ignoring invalid config change"),
                }
            }
        }
    }

    engine.stop();
    Ok(())
}
