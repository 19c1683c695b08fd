//! Background cleanup of finalised episodes.

use std::sync::Arc;
use std::time::Duration;

use parcelflow_broker::EpisodeFinalisationTracker;

use crate::metrics;

/// Start the periodic sweep. Abort the returned handle to stop it.
pub fn start_episode_sweeper(
    tracker: Arc<EpisodeFinalisationTracker>,
    interval_duration: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval_duration);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            sweep_once(&tracker);
        }
    })
}

/// Remove every finalised episode now. Returns how many were removed.
pub fn sweep_once(tracker: &EpisodeFinalisationTracker) -> usize {
    let removed = tracker.remove_finalised_episodes();
    if !removed.is_empty() {
        tracing::debug!(
            removed = removed.len(),
            remaining = tracker.episode_count(),
            "Episode sweep completed"
        );
        metrics::record_episodes_swept(removed.len());
    }
    removed.len()
}
