//! One-shot bootstrap flows built on [`Initializer`].

use super::simulation::SimulationApi;
use super::types::{ClaimedInvite, CurrentTask};
use crate::initializer::Initializer;
use std::sync::Arc;
use tracing::info;

/// Claims each invite token at most once, forwarding the claim to `on_claimed`.
pub fn invite_claimer<F>(api: SimulationApi, on_claimed: F) -> Initializer<String>
where
    F: Fn(ClaimedInvite) + Send + Sync + 'static,
{
    let on_claimed = Arc::new(on_claimed);
    Initializer::new(move |token: String| {
        let api = api.clone();
        let on_claimed = on_claimed.clone();
        async move {
            let invite = api.claim_invite(&token).await?;
            info!(simulation_id = invite.simulation_id.as_str(), "invite claimed");
            on_claimed(invite);
            Ok(())
        }
    })
}

/// Loads the current task of each simulation once. Each execution bypasses the
/// short-lived cache, so `run(id, true)` always refetches from the backend.
pub fn current_task_loader<F>(api: SimulationApi, on_loaded: F) -> Initializer<String>
where
    F: Fn(String, CurrentTask) + Send + Sync + 'static,
{
    let on_loaded = Arc::new(on_loaded);
    Initializer::new(move |simulation_id: String| {
        let api = api.clone();
        let on_loaded = on_loaded.clone();
        async move {
            let task = api.refresh_current_task(&simulation_id).await?;
            on_loaded(simulation_id, task);
            Ok(())
        }
    })
}
