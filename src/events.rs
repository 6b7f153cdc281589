//! Server-pushed events.
//!
//! Inbound text frames are JSON objects `{ "type", "data", "timestamp" }`.
//! [`Event::parse`] turns one into an immutable [`Event`] whose `data` is
//! available both raw and as a typed [`EventPayload`].
//!
//! Unrecognized `type` values are tolerated ([`EventKind::Other`]), and a
//! payload whose fields have unexpected shapes degrades to
//! [`EventPayload::Unknown`] instead of failing the frame. Only frames that
//! are not JSON objects with a string `type` are rejected.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Kind of server event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A resume file was uploaded.
    ResumeUploaded,
    /// Resume parsing finished.
    ResumeParsed,
    /// A candidate was scored against a job.
    CandidateScored,
    /// A candidate moved through the hiring pipeline.
    PipelineStatusChanged,
    /// Interview analysis finished.
    InterviewAnalyzed,
    /// A report was generated.
    ReportGenerated,
    /// A job description was created.
    JobCreated,
    /// A job description was deleted.
    JobDeleted,
    /// A candidate applied to a job.
    NewApplication,
    /// Server greeting sent right after the socket opens.
    ConnectionEstablished,
    /// Any kind this client does not know about.
    Other(String),
}

impl EventKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ResumeUploaded => "resume_uploaded",
            Self::ResumeParsed => "resume_parsed",
            Self::CandidateScored => "candidate_scored",
            Self::PipelineStatusChanged => "pipeline_status_changed",
            Self::InterviewAnalyzed => "interview_analyzed",
            Self::ReportGenerated => "report_generated",
            Self::JobCreated => "job_created",
            Self::JobDeleted => "job_deleted",
            Self::NewApplication => "new_application",
            Self::ConnectionEstablished => "connection_established",
            Self::Other(name) => name,
        }
    }

    /// Connection plumbing rather than user-facing news.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::ConnectionEstablished)
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "resume_uploaded" => Self::ResumeUploaded,
            "resume_parsed" => Self::ResumeParsed,
            "candidate_scored" => Self::CandidateScored,
            "pipeline_status_changed" => Self::PipelineStatusChanged,
            "interview_analyzed" => Self::InterviewAnalyzed,
            "report_generated" => Self::ReportGenerated,
            "job_created" => Self::JobCreated,
            "job_deleted" => Self::JobDeleted,
            "new_application" => Self::NewApplication,
            "connection_established" => Self::ConnectionEstablished,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `resume_uploaded` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResumeUploaded {
    pub id: Option<String>,
    pub file_name: Option<String>,
    pub is_parsed: Option<bool>,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub skills_count: Option<u64>,
    pub batch_upload: Option<bool>,
}

/// `resume_parsed` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResumeParsed {
    pub id: Option<String>,
    pub file_name: Option<String>,
    pub candidate_name: Option<String>,
}

/// `candidate_scored` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CandidateScored {
    pub job_id: Option<String>,
    pub job_title: Option<String>,
    pub resume_id: Option<String>,
    pub candidate_name: Option<String>,
    pub score: Option<f64>,
    pub recommendation: Option<String>,
}

/// `pipeline_status_changed` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipelineStatusChanged {
    pub candidate_name: Option<String>,
    pub job_title: Option<String>,
    pub status: Option<String>,
}

/// `interview_analyzed` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InterviewAnalyzed {
    pub id: Option<String>,
    pub resume_id: Option<String>,
    pub sentiment_score: Option<f64>,
    pub confidence_score: Option<f64>,
    pub is_analyzed: Option<bool>,
}

/// `report_generated` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportGenerated {
    pub id: Option<String>,
    pub title: Option<String>,
    pub report_type: Option<String>,
}

/// `job_created` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobCreated {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub location: Option<String>,
}

/// `job_deleted` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobDeleted {
    pub id: Option<String>,
    pub title: Option<String>,
}

/// `new_application` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewApplication {
    pub notification_id: Option<String>,
    pub candidate_name: Option<String>,
    pub job_title: Option<String>,
    pub job_id: Option<String>,
    pub application_id: Option<String>,
}

/// `connection_established` fields.
#[allow(missing_docs, reason = "field names mirror the wire payload")]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConnectionEstablished {
    pub message: Option<String>,
    pub connected_at: Option<String>,
    pub total_connections: Option<u64>,
}

/// Typed view of an event's `data`, keyed by [`EventKind`].
#[allow(missing_docs, reason = "variants are named after their EventKind")]
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    ResumeUploaded(ResumeUploaded),
    ResumeParsed(ResumeParsed),
    CandidateScored(CandidateScored),
    PipelineStatusChanged(PipelineStatusChanged),
    InterviewAnalyzed(InterviewAnalyzed),
    ReportGenerated(ReportGenerated),
    JobCreated(JobCreated),
    JobDeleted(JobDeleted),
    NewApplication(NewApplication),
    ConnectionEstablished(ConnectionEstablished),
    /// Unknown kind, or a known kind whose data did not fit its shape.
    Unknown,
}

impl EventPayload {
    /// Build the typed payload for `kind` from raw `data`.
    ///
    /// Never fails: mismatched shapes become [`EventPayload::Unknown`].
    #[must_use]
    pub fn from_data(kind: &EventKind, data: &serde_json::Value) -> Self {
        match kind {
            EventKind::ResumeUploaded => typed(data, Self::ResumeUploaded),
            EventKind::ResumeParsed => typed(data, Self::ResumeParsed),
            EventKind::CandidateScored => typed(data, Self::CandidateScored),
            EventKind::PipelineStatusChanged => typed(data, Self::PipelineStatusChanged),
            EventKind::InterviewAnalyzed => typed(data, Self::InterviewAnalyzed),
            EventKind::ReportGenerated => typed(data, Self::ReportGenerated),
            EventKind::JobCreated => typed(data, Self::JobCreated),
            EventKind::JobDeleted => typed(data, Self::JobDeleted),
            EventKind::NewApplication => typed(data, Self::NewApplication),
            EventKind::ConnectionEstablished => typed(data, Self::ConnectionEstablished),
            EventKind::Other(_) => Self::Unknown,
        }
    }
}

fn typed<T, F>(data: &serde_json::Value, wrap: F) -> EventPayload
where
    T: DeserializeOwned + Default,
    F: FnOnce(T) -> EventPayload,
{
    // A missing `data` object is an empty payload, not a mismatch
    if data.is_null() {
        return wrap(T::default());
    }
    match T::deserialize(data) {
        Ok(fields) => wrap(fields),
        Err(e) => {
            log::debug!("[Realtime] Event data did not match expected shape: {}", e);
            EventPayload::Unknown
        }
    }
}

/// Errors that can occur while parsing an inbound frame.
#[derive(Debug)]
pub enum FrameError {
    /// Frame is not valid JSON or lacks a string `type`.
    Malformed(serde_json::Error),
    /// `data` is present but is not a JSON object.
    DataNotObject,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed event frame: {e}"),
            Self::DataNotObject => write!(f, "Event data is not an object"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            Self::DataNotObject => None,
        }
    }
}

/// Wire shape of an inbound event frame.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    timestamp: Option<String>,
}

/// A typed, timestamped fact pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    data: serde_json::Value,
    payload: EventPayload,
    timestamp: Option<String>,
}

impl Event {
    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawEvent = serde_json::from_str(text).map_err(FrameError::Malformed)?;
        if !(raw.data.is_object() || raw.data.is_null()) {
            return Err(FrameError::DataNotObject);
        }
        Ok(Self::new(EventKind::from(raw.kind), raw.data, raw.timestamp))
    }

    /// Build an event from parts.
    #[must_use]
    pub fn new(kind: EventKind, data: serde_json::Value, timestamp: Option<String>) -> Self {
        let payload = EventPayload::from_data(&kind, &data);
        Self {
            kind,
            data,
            payload,
            timestamp,
        }
    }

    /// Event kind.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Raw `data` object as received.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Typed view of `data`.
    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Server timestamp string, if the frame carried one.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Server timestamp as UTC.
    ///
    /// Accepts RFC 3339 and naive ISO-8601 (which the server emits from
    /// `utcnow().isoformat()`), treating the latter as UTC.
    #[must_use]
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_event_kind_round_trips_wire_names() {
        for name in [
            "resume_uploaded",
            "resume_parsed",
            "candidate_scored",
            "pipeline_status_changed",
            "interview_analyzed",
            "report_generated",
            "job_created",
            "job_deleted",
            "new_application",
            "connection_established",
        ] {
            let kind = EventKind::from(name);
            assert!(!matches!(kind, EventKind::Other(_)), "{name} should be known");
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let event = Event::parse(r#"{"type":"offer_extended","data":{"x":1}}"#).expect("parse");
        assert_eq!(event.kind(), &EventKind::Other("offer_extended".to_string()));
        assert_eq!(event.payload(), &EventPayload::Unknown);
        assert_eq!(event.data()["x"], 1);
    }

    #[test]
    fn test_parse_job_created() {
        let event = Event::parse(
            r#"{"type":"job_created","data":{"title":"Backend Engineer","required_skills":["rust"]},"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .expect("parse");

        assert_eq!(event.kind(), &EventKind::JobCreated);
        match event.payload() {
            EventPayload::JobCreated(job) => {
                assert_eq!(job.title.as_deref(), Some("Backend Engineer"));
                assert_eq!(job.required_skills, vec!["rust".to_string()]);
                assert_eq!(job.location, None);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(event.timestamp(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_connection_established_without_timestamp() {
        let event = Event::parse(
            r#"{"type":"connection_established","data":{"message":"Connected to HireQ real-time updates","total_connections":3}}"#,
        )
        .expect("parse");
        assert!(event.kind().is_lifecycle());
        assert_eq!(event.timestamp(), None);
        assert_eq!(event.timestamp_utc(), None);
        match event.payload() {
            EventPayload::ConnectionEstablished(c) => assert_eq!(c.total_connections, Some(3)),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_missing_data_is_empty_payload() {
        let event = Event::parse(r#"{"type":"job_deleted"}"#).expect("parse");
        assert_eq!(event.payload(), &EventPayload::JobDeleted(JobDeleted::default()));
    }

    #[test]
    fn test_mismatched_field_type_degrades_to_unknown() {
        let event =
            Event::parse(r#"{"type":"candidate_scored","data":{"score":"high"}}"#).expect("parse");
        assert_eq!(event.kind(), &EventKind::CandidateScored);
        assert_eq!(event.payload(), &EventPayload::Unknown);
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        assert!(matches!(
            Event::parse("not json"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            Event::parse(r#"{"data":{}}"#),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            Event::parse(r#"{"type":"job_created","data":[1,2]}"#),
            Err(FrameError::DataNotObject)
        ));
    }

    #[test]
    fn test_timestamp_utc_accepts_naive_iso() {
        let event = Event::new(
            EventKind::JobCreated,
            serde_json::json!({}),
            Some("2024-03-05T14:30:15.123456".to_string()),
        );
        let ts = event.timestamp_utc().expect("naive timestamp parses");
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 5));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (14, 30, 15));
    }

    #[test]
    fn test_timestamp_utc_rfc3339_offset() {
        let event = Event::new(
            EventKind::JobCreated,
            serde_json::json!({}),
            Some("2024-01-01T02:00:00+02:00".to_string()),
        );
        let ts = event.timestamp_utc().expect("rfc3339 parses");
        assert_eq!(ts.hour(), 0);
    }

    #[test]
    fn test_event_kind_serde_uses_wire_name() {
        let json = serde_json::to_string(&EventKind::NewApplication).expect("serialize");
        assert_eq!(json, "\"new_application\"");
        let kind: EventKind = serde_json::from_str("\"mystery\"").expect("deserialize");
        assert_eq!(kind, EventKind::Other("mystery".to_string()));
    }
}
