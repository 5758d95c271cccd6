//! Notification decisions derived from the current status.
//!
//! The exposure alert fires exactly once per `Exposed` episode; the upload
//! reminder is throttled to one per [`UPLOAD_REMINDER_INTERVAL`] while a
//! submission is due. Both are idempotent across repeated background
//! invocations because the sent-markers are persisted before the next check
//! can run.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::bridge::{LocalNotification, NotificationPresenter};
use crate::machine::StatusMachine;
use crate::status::ExposureStatus;
use crate::utils::from_timestamp_ms;

/// Minimum gap between two upload reminders.
pub const UPLOAD_REMINDER_INTERVAL: time::Duration = time::Duration::minutes(180);

const EXPOSURE_ALERT_TITLE: &str = "Possible exposure";
const EXPOSURE_ALERT_BODY: &str =
    "You may have been exposed to COVID-19. Open the app for next steps.";
const UPLOAD_REMINDER_TITLE: &str = "Daily upload reminder";
const UPLOAD_REMINDER_BODY: &str =
    "Please upload your random IDs for today to help others stay safe.";

pub struct NotificationDispatcher {
    presenter: Arc<dyn NotificationPresenter>,
}

impl NotificationDispatcher {
    pub fn new(presenter: Arc<dyn NotificationPresenter>) -> Self {
        Self { presenter }
    }

    #[tracing::instrument(skip_all)]
    pub async fn dispatch(&self, machine: &StatusMachine, now: OffsetDateTime) {
        match machine.current().await {
            ExposureStatus::Exposed {
                notification_sent: false,
                ..
            } => {
                self.presenter
                    .present_local_notification(LocalNotification {
                        title: EXPOSURE_ALERT_TITLE.into(),
                        body: EXPOSURE_ALERT_BODY.into(),
                    })
                    .await;
                machine.mark_exposure_notified(now).await;
                tracing::info!(
                    name = "notify.exposure_alert_sent",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Exposure alert presented"
                );
            }
            ExposureStatus::Diagnosed {
                needs_submission: true,
                upload_reminder_last_sent_at,
                ..
            } if reminder_due(upload_reminder_last_sent_at, now) => {
                self.presenter
                    .present_local_notification(LocalNotification {
                        title: UPLOAD_REMINDER_TITLE.into(),
                        body: UPLOAD_REMINDER_BODY.into(),
                    })
                    .await;
                machine.mark_reminder_sent(now).await;
                tracing::info!(
                    name = "notify.upload_reminder_sent",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Upload reminder presented"
                );
            }
            _ => {}
        }
    }
}

fn reminder_due(last_sent_at: Option<i64>, now: OffsetDateTime) -> bool {
    match last_sent_at {
        None => true,
        Some(last) => now - from_timestamp_ms(last) > UPLOAD_REMINDER_INTERVAL,
    }
}
