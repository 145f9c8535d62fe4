use chrono::Utc;
use tracing::{debug, info};

use crate::state::AppState;

/// Revert abandoned PENDING attempts on a fixed interval.
pub async fn run_cron(app_state: AppState) -> color_eyre::Result<()> {
    let period = app_state.settings.sweep_interval;
    info!(?period, "Starting pending authorization sweeper");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        sweep_pending(&app_state);
    }
}

fn sweep_pending(app_state: &AppState) -> usize {
    let swept = app_state.authorizer.sweep_expired_pending(Utc::now());

    if swept > 0 {
        info!(swept, "Expired abandoned authorization attempts");
    } else {
        debug!(
            sessions = app_state.authorizer.store().len(),
            "No expired authorization attempts"
        );
    }

    swept
}
