use crate::error::EngineError;
use crate::runner::ReportEngine;
use alerter::EmailSender;
use api_client::MarketDataApi;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use configuration::ScheduleConfig;
use std::future::Future;
use tokio::time::MissedTickBehavior;

/// Fires at most once per calendar day, on the first poll at or after `at`.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    at: NaiveTime,
    last_fired: Option<NaiveDate>,
}

impl DailySchedule {
    /// Starting after today's slot has passed waits for tomorrow's.
    pub fn starting_at(at: NaiveTime, now: NaiveDateTime) -> Self {
        Self {
            at,
            last_fired: (now.time() >= at).then(|| now.date()),
        }
    }

    pub fn run_time(&self) -> NaiveTime {
        self.at
    }

    /// Returns true, and marks today as done, when a run is due at `now`.
    pub fn poll(&mut self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if now.time() < self.at || self.last_fired == Some(today) {
            return false;
        }
        self.last_fired = Some(today);
        true
    }
}

/// Polls the local clock every `poll_interval` and runs `job` when the daily slot is due.
///
/// Returns when ctrl-c is received.
pub async fn run_scheduler<F, Fut>(config: &ScheduleConfig, mut job: F) -> Result<(), EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut schedule = DailySchedule::starting_at(config.run_time()?, Local::now().naive_local());
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        at = %schedule.run_time(),
        poll = ?config.poll_interval,
        "Scheduler started. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if schedule.poll(Local::now().naive_local()) {
                    tracing::info!("Scheduled run is due.");
                    job().await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received; scheduler stopped.");
                return Ok(());
            }
        }
    }
}

impl<P: MarketDataApi> ReportEngine<P> {
    /// Runs the daily report on the configured schedule until ctrl-c.
    pub async fn run_scheduled(&self, sender: Option<&EmailSender>) -> Result<(), EngineError> {
        run_scheduler(&self.config().schedule, move || self.run_and_notify(sender)).await
    }
}
