use thiserror::Error;

/// Failure taxonomy for user-triggered actions and sweep-side lookups.
///
/// None of these are fatal: sweep paths log and continue, user paths turn
/// into informational notices.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PursuitError {
    /// The ability/item/point is switched off in configuration.
    #[error("action is disabled")]
    Disabled,

    /// Transient, retryable once the cooldown has elapsed.
    #[error("on cooldown for {remaining_secs}s")]
    OnCooldown { remaining_secs: u64 },

    /// Recoverable; re-evaluated on the next tick or action.
    #[error("no valid target")]
    NoValidTarget,

    /// The effect hook declined; no cooldown or use was consumed.
    #[error("effect precondition failed")]
    HookFailure,

    /// A stored player reference no longer names a live participant.
    #[error("stale participant reference")]
    StaleReference,
}
