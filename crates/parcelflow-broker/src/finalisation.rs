//! Episode finalisation tracking.
//!
//! For every upstream episode the tracker records which downstream functions
//! were handed its output, and which of them have since started their own
//! episode. An episode is finalised once every expected function has reported
//! a downstream episode id.

use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use parcelflow_core::{CoreError, EpisodeId, FunctionToken, Result};

use crate::metrics;

/// Downstream functions of one episode; `None` means still pending.
pub type EpisodeFinalisationStatusSet = BTreeMap<FunctionToken, Option<EpisodeId>>;

/// Point-in-time view of one episode's status set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeFinalisationStatus {
    pub episode_id: EpisodeId,
    pub downstream: EpisodeFinalisationStatusSet,
    pub finalised: bool,
}

#[derive(Debug, Default)]
pub struct EpisodeFinalisationTracker {
    episodes: DashMap<EpisodeId, EpisodeFinalisationStatusSet>,
    /// Guards create-or-update of status sets
    write_lock: Mutex<()>,
}

impl EpisodeFinalisationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `function` to act on the output of `episode_id`.
    ///
    /// Re-registering a function keeps whatever it already reported.
    pub fn register_downstream_wup_interest(
        &self,
        episode_id: &EpisodeId,
        function: &FunctionToken,
    ) -> Result<()> {
        check_ids(episode_id, function)?;

        {
            let _guard = self.write_lock.lock();
            self.episodes
                .entry(episode_id.clone())
                .or_default()
                .entry(function.clone())
                .or_insert(None);
        }

        debug!(episode = %episode_id, function = %function, "Registered downstream interest");
        metrics::set_open_episode_count(self.episodes.len());
        Ok(())
    }

    /// Undo a pending interest that will never be reported on.
    ///
    /// Only an entry still pending is removed; an episode left with nothing
    /// expected is dropped.
    pub fn withdraw_downstream_wup_interest(
        &self,
        episode_id: &EpisodeId,
        function: &FunctionToken,
    ) -> bool {
        let withdrawn = {
            let _guard = self.write_lock.lock();
            let withdrawn = match self.episodes.get_mut(episode_id) {
                Some(mut set) if matches!(set.get(function), Some(None)) => {
                    set.remove(function);
                    true
                }
                _ => false,
            };
            if withdrawn {
                self.episodes.remove_if(episode_id, |_, set| set.is_empty());
            }
            withdrawn
        };

        if withdrawn {
            debug!(episode = %episode_id, function = %function, "Withdrew downstream interest");
            metrics::set_open_episode_count(self.episodes.len());
        }
        withdrawn
    }

    /// Record that `function` started `downstream_episode_id` from `episode_id`'s output.
    ///
    /// A function that was never registered is registered on the spot; the
    /// two calls may arrive in either order.
    pub fn register_downstream_episode_id(
        &self,
        episode_id: &EpisodeId,
        function: &FunctionToken,
        downstream_episode_id: &EpisodeId,
    ) -> Result<()> {
        check_ids(episode_id, function)?;
        if downstream_episode_id.is_empty() {
            return Err(CoreError::invalid_argument("downstream episode id is empty"));
        }

        let was_registered = {
            let _guard = self.write_lock.lock();
            let mut set = self.episodes.entry(episode_id.clone()).or_default();
            let was_registered = set.contains_key(function);
            set.insert(function.clone(), Some(downstream_episode_id.clone()));
            was_registered
        };

        if !was_registered {
            warn!(
                episode = %episode_id,
                function = %function,
                "Downstream episode reported before interest was registered"
            );
        }
        debug!(
            episode = %episode_id,
            function = %function,
            downstream = %downstream_episode_id,
            "Recorded downstream episode"
        );
        metrics::set_open_episode_count(self.episodes.len());
        Ok(())
    }

    /// Whether every expected downstream function has reported.
    ///
    /// Unknown episodes and episodes with nothing expected are finalised.
    pub fn check_for_episode_finalisation(&self, episode_id: &EpisodeId) -> bool {
        self.episodes
            .get(episode_id)
            .is_none_or(|set| is_finalised(&set))
    }

    pub fn get_episode_list(&self) -> Vec<EpisodeId> {
        self.episodes.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop an episode regardless of its state.
    pub fn remove_episode(&self, episode_id: &EpisodeId) -> bool {
        let removed = self.episodes.remove(episode_id).is_some();
        if removed {
            debug!(episode = %episode_id, "Removed episode");
            metrics::set_open_episode_count(self.episodes.len());
        }
        removed
    }

    pub fn episode_status(&self, episode_id: &EpisodeId) -> Option<EpisodeFinalisationStatus> {
        self.episodes
            .get(episode_id)
            .map(|set| EpisodeFinalisationStatus {
                episode_id: episode_id.clone(),
                finalised: is_finalised(&set),
                downstream: set.clone(),
            })
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    /// Remove every finalised episode, returning the removed ids.
    ///
    /// An episode that picks up new interest between the check and the
    /// removal is kept.
    pub fn remove_finalised_episodes(&self) -> Vec<EpisodeId> {
        let candidates: Vec<EpisodeId> = self
            .episodes
            .iter()
            .filter(|e| is_finalised(e.value()))
            .map(|e| e.key().clone())
            .collect();

        let removed: Vec<EpisodeId> = {
            let _guard = self.write_lock.lock();
            candidates
                .into_iter()
                .filter(|id| self.episodes.remove_if(id, |_, set| is_finalised(set)).is_some())
                .collect()
        };

        if !removed.is_empty() {
            metrics::set_open_episode_count(self.episodes.len());
        }
        removed
    }
}

fn is_finalised(set: &EpisodeFinalisationStatusSet) -> bool {
    set.values().all(Option::is_some)
}

fn check_ids(episode_id: &EpisodeId, function: &FunctionToken) -> Result<()> {
    if episode_id.is_empty() {
        return Err(CoreError::invalid_argument("episode id is empty"));
    }
    if function.is_empty() {
        return Err(CoreError::invalid_argument("downstream function is empty"));
    }
    Ok(())
}
