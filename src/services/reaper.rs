//! Daily sweep that physically removes soft-deleted todos once their
//! retention window has passed, and clears out dead session state.

use std::sync::Arc;

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveTime, Utc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

use crate::{
    clock::Clock,
    error::AppError,
    services::{rate_limit::RateLimiter, sessions::SessionStore, todos::TodoService},
    state::AppState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub todos_removed: u64,
    pub sessions_expired: u64,
    pub access_pruned: u64,
}

#[derive(Clone)]
pub struct Reaper {
    todos: TodoService,
    sessions: SessionStore,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    retention: Duration,
    offset: FixedOffset,
}

impl Reaper {
    pub fn new(
        todos: TodoService,
        sessions: SessionStore,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        retention: Duration,
        offset: FixedOffset,
    ) -> Self {
        Self {
            todos,
            sessions,
            limiter,
            clock,
            retention,
            offset,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.todos.clone(),
            state.sessions.clone(),
            state.limiter.clone(),
            state.clock.clone(),
            state.config.todo_retention,
            state.config.reaper_offset,
        )
    }

    /// One pass: todos deleted more than `retention` ago go away for good.
    /// Access records are kept no longer than a session could live.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<ReapReport, AppError> {
        let expired: Vec<String> = self
            .todos
            .list_soft_deleted()
            .await?
            .into_iter()
            .filter(|todo| {
                todo.deletion_timestamp
                    .is_some_and(|deleted_at| now - deleted_at > self.retention)
            })
            .map(|todo| todo.id)
            .collect();

        let todos_removed = if expired.is_empty() {
            0
        } else {
            self.todos.purge(&expired).await?
        };
        let sessions_expired = self.sessions.purge_expired(now).await?;
        let access_pruned = self.limiter.prune_before(now - self.sessions.ttl()).await?;

        Ok(ReapReport {
            todos_removed,
            sessions_expired,
            access_pruned,
        })
    }

    /// Starts the daily schedule on the current runtime.
    pub fn spawn(self) -> ReaperHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                let now = self.clock.now();
                let next = next_run_after(now, self.offset);
                let wait = (next - now).to_std().unwrap_or_default();
                info!(next_run = %next, "reaper scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop_rx.changed() => break,
                }

                match self.sweep(self.clock.now()).await {
                    Ok(report) => info!(
                        todos_removed = report.todos_removed,
                        sessions_expired = report.sessions_expired,
                        access_pruned = report.access_pruned,
                        "reaper sweep finished"
                    ),
                    Err(err) => error!("reaper sweep failed, retrying next tick: {err}"),
                }
            }
            info!("reaper stopped");
        });

        ReaperHandle { stop_tx, task }
    }
}

pub struct ReaperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stops the schedule. A sweep already in progress runs to completion.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            error!("reaper task ended abnormally: {err}");
        }
    }
}

/// The next local midnight (at `offset`) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset).date_naive();
    let tomorrow = local
        .checked_add_days(Days::new(1))
        .unwrap_or(local)
        .and_time(NaiveTime::MIN);
    let next = tomorrow - offset_duration(offset);
    next.and_utc()
}

fn offset_duration(offset: FixedOffset) -> Duration {
    Duration::seconds(i64::from(offset.local_minus_utc()))
}
