//! User-facing notification feed.
//!
//! Every non-lifecycle [`Event`] becomes a [`Notification`] with a rendered
//! message. The [`NotificationFeed`] keeps the most recent ones, newest
//! first, capped at [`NOTIFICATION_CAPACITY`].
//!
//! Rendering never fails: each template has a fallback for every field it
//! reads, and anything unrecognized renders as "Update received".

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use rand::Rng;
use serde::Serialize;

use crate::constants::NOTIFICATION_CAPACITY;
use crate::events::{Event, EventKind, EventPayload};

/// Message for events without a specific template.
pub const FALLBACK_MESSAGE: &str = "Update received";

/// A rendered, dismissible representation of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Unique id (receipt time in ms plus random suffix).
    pub id: String,
    /// Kind of the originating event.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable message.
    pub message: String,
    /// Local clock time of receipt.
    pub timestamp: DateTime<Local>,
}

impl Notification {
    /// Render a notification for `event`, stamped with the current time.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        let now = Local::now();
        Self {
            id: notification_id(&now),
            kind: event.kind().clone(),
            message: render_message(event),
            timestamp: now,
        }
    }
}

fn notification_id(now: &DateTime<Local>) -> String {
    let suffix: u32 = rand::rng().random();
    format!("{}-{:08x}", now.timestamp_millis(), suffix)
}

/// Render the human-readable message for `event`.
#[must_use]
pub fn render_message(event: &Event) -> String {
    match event.payload() {
        EventPayload::ResumeUploaded(p) => {
            let who = p
                .candidate_name
                .as_deref()
                .or(p.file_name.as_deref())
                .unwrap_or("a candidate");
            if p.batch_upload == Some(true) {
                format!("Resume uploaded in batch: {who}")
            } else {
                format!("New resume uploaded: {who}")
            }
        }
        EventPayload::ResumeParsed(p) => {
            let who = p
                .candidate_name
                .as_deref()
                .or(p.file_name.as_deref())
                .unwrap_or("a candidate");
            format!("Resume parsed: {who}")
        }
        EventPayload::CandidateScored(p) => match p.score {
            Some(score) => format!(
                "{} scored {}% for {}",
                p.candidate_name.as_deref().unwrap_or("A candidate"),
                format_score(score),
                p.job_title.as_deref().unwrap_or("a job"),
            ),
            None => format!(
                "{} was scored for {}",
                p.candidate_name.as_deref().unwrap_or("A candidate"),
                p.job_title.as_deref().unwrap_or("a job"),
            ),
        },
        EventPayload::PipelineStatusChanged(p) => {
            let who = p.candidate_name.as_deref().unwrap_or("A candidate");
            match (p.status.as_deref(), p.job_title.as_deref()) {
                (Some(status), Some(job)) => format!("{who} moved to {status} for {job}"),
                (Some(status), None) => format!("{who} moved to {status}"),
                _ => format!("Pipeline status updated for {who}"),
            }
        }
        EventPayload::InterviewAnalyzed(p) => match p.sentiment_score {
            Some(sentiment) => format!(
                "Interview analysis completed (sentiment {})",
                format_score(sentiment)
            ),
            None => "Interview analysis completed".to_string(),
        },
        EventPayload::ReportGenerated(p) => match p.title.as_deref().or(p.report_type.as_deref()) {
            Some(title) => format!("Report generated: {title}"),
            None => "Report generated".to_string(),
        },
        EventPayload::JobCreated(p) => format!(
            "New job created: {}",
            p.title.as_deref().unwrap_or("Untitled job")
        ),
        EventPayload::JobDeleted(p) => format!(
            "Job deleted: {}",
            p.title.as_deref().unwrap_or("Untitled job")
        ),
        EventPayload::NewApplication(p) => format!(
            "{} applied for {}",
            p.candidate_name.as_deref().unwrap_or("A candidate"),
            p.job_title.as_deref().unwrap_or("a job"),
        ),
        EventPayload::ConnectionEstablished(p) => p
            .message
            .clone()
            .unwrap_or_else(|| "Connected to real-time updates".to_string()),
        EventPayload::Unknown => FALLBACK_MESSAGE.to_string(),
    }
}

/// Whole numbers print without decimals, others with one.
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        format!("{score:.1}")
    }
}

/// Bounded, newest-first list of notifications.
///
/// All access goes through the internal mutex; callers only get snapshots.
#[derive(Debug)]
pub struct NotificationFeed {
    entries: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY)
    }
}

impl NotificationFeed {
    /// Empty feed with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty feed holding at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepend `notification`, evicting the oldest beyond capacity.
    pub fn push(&self, notification: Notification) {
        let mut entries = self.lock();
        entries.push_front(notification);
        entries.truncate(self.capacity);
    }

    /// Snapshot, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    /// Most recent notification.
    #[must_use]
    pub fn latest(&self) -> Option<Notification> {
        self.lock().front().cloned()
    }

    /// Remove the entry with `id`. Returns whether one was removed.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|n| n.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the feed is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of entries retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
