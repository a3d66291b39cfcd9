//! Cron-driven trigger for harvest cycles.
//!
//! Cycles run inline, so a slow cycle delays the next fire time instead of
//! overlapping it; the orchestrator's in-progress guard covers any other caller.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::HarvestError;
use crate::orchestrator::{CycleOutcome, Orchestrator};

pub struct Scheduler {
    schedule: Schedule,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Parse a seconds-first cron expression, e.g. `0 0 */3 * * *`.
    pub fn new(expression: &str, cancel: CancellationToken) -> Result<Self, HarvestError> {
        let schedule = Schedule::from_str(expression)?;
        Ok(Self { schedule, cancel })
    }

    /// First fire time strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Fire cycles until cancelled or until a cycle fails.
    pub async fn run(&self, orchestrator: &Orchestrator) -> Result<(), HarvestError> {
        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire(now) else {
                warn!("Schedule has no upcoming fire times, stopping");
                return Ok(());
            };
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "Next harvest cycle scheduled");

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Scheduler stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }

            info!("Starting scheduled job");
            match orchestrator.run_cycle().await? {
                CycleOutcome::Completed(stats) => info!(%stats, "Scheduled job finished"),
                CycleOutcome::Cancelled => return Ok(()),
                CycleOutcome::Skipped => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_three_hours_on_the_hour() {
        let scheduler =
            Scheduler::new(roost_common::config::DEFAULT_SCHEDULE, CancellationToken::new())
                .unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 4, 15, 0).unwrap();

        let next = scheduler.next_fire(at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap());

        let after = scheduler.next_fire(next).unwrap();
        assert_eq!(after, Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = Scheduler::new("every three hours", CancellationToken::new());
        assert!(matches!(err, Err(HarvestError::Schedule(_))));
    }

    #[tokio::test]
    async fn cancelled_scheduler_returns_without_running_a_cycle() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new("0 0 */3 * * *", cancel.clone()).unwrap();
        let (orchestrator, log) = crate::testing::orchestrator_with_accounts(&["alice"], cancel.clone());
        cancel.cancel();

        scheduler.run(&orchestrator).await.unwrap();

        assert!(log.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_cycle_error_ends_the_scheduler() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new("* * * * * *", cancel.clone()).unwrap();
        let (orchestrator, log) = crate::testing::orchestrator_with_accounts(&[], cancel);

        let err = scheduler.run(&orchestrator).await.unwrap_err();

        assert!(matches!(err, HarvestError::NoAccounts));
        assert_eq!(log.events(), vec!["initialize", "list_accounts"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_cycle_ends_the_scheduler_cleanly() {
        use crate::testing::{account, post, EventLog, MockStore, ScriptedCollector, TEST_PACING};
        use std::sync::Arc;
        use std::time::Duration;

        let cancel = CancellationToken::new();
        let log = EventLog::new();
        let collector = ScriptedCollector::new(log.clone())
            .on_posts("alice", vec![post(1, "alice", 0)])
            .slow_collect("alice", Duration::from_secs(60));
        let orchestrator = Orchestrator::new(
            Arc::new(MockStore::new(vec![account(1, "alice")], log.clone())),
            Arc::new(collector),
            TEST_PACING,
            cancel.clone(),
        );
        let scheduler = Scheduler::new("* * * * * *", cancel.clone()).unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        scheduler.run(&orchestrator).await.unwrap();

        let events = log.events();
        assert_eq!(events.iter().filter(|e| *e == "initialize").count(), 1);
        assert!(events.contains(&"logout:alice".to_string()));
        assert!(!events.iter().any(|e| e.starts_with("save_start")));
    }
}
