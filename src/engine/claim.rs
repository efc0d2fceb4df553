use super::control::{stopped, Control};
use crate::config::ConfigHandle;
use crate::ecox::{ApiError, GrowthApi};
use crate::store::Account;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Seconds past the minute boundary before firing, so the platform-side
/// day rollover has definitely happened.
const FIRE_BUFFER_SECS: u32 = 5;

/// Outcome of one daily claim attempt. "Already claimed" is a
/// semantically-successful no-op, distinguished from a true failure.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(String),
    AlreadyClaimed(String),
    Failed(ApiError),
}

/// Classify a claim result. The platform has no structured error code for
/// a repeat claim, so this matches the failure detail text; an upstream
/// wording change would reclassify repeats as failures.
pub fn classify(result: Result<String, ApiError>) -> ClaimOutcome {
    match result {
        Ok(message) => ClaimOutcome::Claimed(message),
        Err(err) => match err {
            ApiError::Remote { ref detail, .. } if is_already_claimed(detail) => {
                ClaimOutcome::AlreadyClaimed(detail.clone())
            }
            other => ClaimOutcome::Failed(other),
        },
    }
}

fn is_already_claimed(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    detail.contains("already") || detail.contains("claimed")
}

/// Next fire time: the coming occurrence of `hour:minute` UTC plus the
/// fire buffer, always computed from `now` rather than chained off the
/// previous fire time.
pub fn next_claim_time(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    // Clamped inputs are always a valid time of day.
    let target = now
        .date_naive()
        .and_hms_opt(hour.min(23), minute.min(59), FIRE_BUFFER_SECS)
        .map(|t| t.and_utc())
        .unwrap_or(now);
    if target > now {
        target
    } else {
        target + ChronoDuration::days(1)
    }
}

pub fn next_claim_delay(now: DateTime<Utc>, hour: u32, minute: u32) -> Duration {
    (next_claim_time(now, hour, minute) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Per-account claim timer. Pauses the account's loops for the duration
/// of the claim call, then reschedules. Exits when the account stops.
pub async fn run_scheduler(
    api: Arc<dyn GrowthApi>,
    account: Account,
    config: ConfigHandle,
    control: Control,
) {
    let mut state_rx = control.subscribe();
    loop {
        if control.is_stopped() {
            break;
        }
        let cfg = config.current();
        let hour = account.claim_hour_utc.unwrap_or(cfg.claim_hour_utc);
        let minute = account.claim_minute_utc.unwrap_or(cfg.claim_minute_utc);

        let fire_at = next_claim_time(Utc::now(), hour, minute);
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::info!(
            account = %account.name,
            at = %fire_at.to_rfc3339(),
            "next claim scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                control.pause();
                tracing::warn!(account = %account.name, "pausing processes to claim");

                match classify(api.claim_daily(&account).await) {
                    ClaimOutcome::Claimed(message) => {
                        tracing::info!(account = %account.name, %message, "claim successful");
                    }
                    ClaimOutcome::AlreadyClaimed(detail) => {
                        tracing::warn!(account = %account.name, %detail, "claim already processed");
                    }
                    ClaimOutcome::Failed(err) => {
                        tracing::error!(account = %account.name, error = %err, "claim failed");
                    }
                }

                control.resume();
                tracing::info!(account = %account.name, "resuming processes");
            }
            _ = stopped(&mut state_rx) => break,
        }
    }
}
