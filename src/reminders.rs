//! Daily quiz reminders, swept once a minute against the local clock.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::db::{models::User, queries};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn notify(&self, user: &User, quiz_page_url: &str) -> Result<()>;
}

/// Records reminders in the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl ReminderNotifier for LogNotifier {
    async fn notify(&self, user: &User, quiz_page_url: &str) -> Result<()> {
        tracing::info!(
            user = %user.id,
            email = %user.email,
            url = quiz_page_url,
            "Quiz reminder due"
        );
        Ok(())
    }
}

pub fn current_hhmm() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

/// Notifies every user whose reminder time is `hhmm`. Returns how many
/// notifications succeeded; one failure does not stop the rest.
pub async fn run_sweep(
    pool: &SqlitePool,
    notifier: &dyn ReminderNotifier,
    quiz_page_url: &str,
    hhmm: &str,
) -> Result<usize> {
    let users = queries::users_with_reminder_at(pool, hhmm).await?;
    let mut sent = 0;
    for user in &users {
        match notifier.notify(user, quiz_page_url).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::warn!("Reminder for user {} failed: {:#}", user.id, e),
        }
    }
    Ok(sent)
}

pub fn spawn_scheduler(
    pool: SqlitePool,
    notifier: Arc<dyn ReminderNotifier>,
    quiz_page_url: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        let mut last_sweep: Option<String> = None;
        loop {
            interval.tick().await;
            let now = current_hhmm();
            // The interval can drift onto the same minute twice.
            if last_sweep.as_deref() == Some(now.as_str()) {
                continue;
            }
            match run_sweep(&pool, notifier.as_ref(), &quiz_page_url, &now).await {
                Ok(0) => {}
                Ok(sent) => tracing::info!("Sent {} quiz reminders for {}", sent, now),
                Err(e) => tracing::error!("Reminder sweep failed: {:#}", e),
            }
            last_sweep = Some(now);
        }
    })
}
