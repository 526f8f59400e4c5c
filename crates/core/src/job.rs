//! Job identity, lifecycle status, and the status record persisted per job.
//!
//! A job is tracked by exactly one [`JobStatusRecord`] keyed by
//! `(partition, job_id)`. This service only ever writes records in the
//! `pending` state; the external worker moves them forward.

use std::fmt;

use chrono::SubsecRound;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Partition key shared by every job status record.
pub const JOB_PARTITION: &str = "jobs";

/// Name of the queue the external worker consumes.
pub const PROCESSING_QUEUE: &str = "processing-queue";

/// Maximum length of a caller-supplied job ID.
pub const MAX_JOB_ID_LEN: usize = 255;

/// Characters the key-value table refuses in a row key.
const FORBIDDEN_ID_CHARS: &[char] = &['/', '\\', '#', '?'];

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Validated job identifier, used as the row key in the status table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random identifier (UUID v4, hyphenated).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied identifier.
    ///
    /// Leading and trailing whitespace is stripped. The remainder must be
    /// non-empty, at most [`MAX_JOB_ID_LEN`] characters, and free of
    /// `/ \ # ?` and control characters.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(CoreError::Validation("job_id must not be empty".into()));
        }
        if trimmed.chars().count() > MAX_JOB_ID_LEN {
            return Err(CoreError::Validation(format!(
                "job_id must be at most {MAX_JOB_ID_LEN} characters"
            )));
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| FORBIDDEN_ID_CHARS.contains(c) || c.is_control())
        {
            return Err(CoreError::Validation(format!(
                "job_id contains forbidden character {c:?}"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// Intended flow is `pending -> queued -> processing -> done | error`, but
/// nothing here enforces it. `Unknown` is synthesized for lookups that find
/// no record and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Done,
    Error,
    Unknown,
}

impl JobStatus {
    /// Wire and storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Parse from the stored `status` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "unknown" => Ok(Self::Unknown),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }

    /// Whether a record may be written with this status.
    pub fn is_persistable(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatusRecord
// ---------------------------------------------------------------------------

/// Fixed field names of a [`JobStatusRecord`]; `extra` must not repeat them.
pub const RECORD_FIELDS: [&str; 5] = ["partition", "job_id", "status", "created", "image_url"];

/// One row of the status table.
///
/// `created` and `image_url` are fixed at creation. `extra` carries fields
/// written by the worker (result location, error detail, ...) and is
/// flattened into the JSON representation, so its keys must stay clear of
/// [`RECORD_FIELDS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub partition: String,
    pub job_id: JobId,
    pub status: JobStatus,
    pub created: Timestamp,
    pub image_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobStatusRecord {
    /// Build the initial `pending` record for a newly submitted job.
    ///
    /// `created` is truncated to microseconds so the value survives a round
    /// trip through a `TIMESTAMPTZ` column unchanged.
    pub fn pending(job_id: JobId, image_url: impl Into<String>) -> Self {
        Self {
            partition: JOB_PARTITION.to_string(),
            job_id,
            status: JobStatus::Pending,
            created: chrono::Utc::now().trunc_subsecs(6),
            image_url: image_url.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// First key of `extra` that would shadow a fixed field when flattened.
    pub fn shadowed_field(&self) -> Option<&str> {
        shadowed_field(&self.extra)
    }
}

/// First key of `extra` named in [`RECORD_FIELDS`], if any.
pub fn shadowed_field(extra: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    extra
        .keys()
        .map(String::as_str)
        .find(|key| RECORD_FIELDS.contains(key))
}

// ---------------------------------------------------------------------------
// WorkMessage
// ---------------------------------------------------------------------------

/// Payload placed on the processing queue for the external worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMessage {
    pub job_id: JobId,
    pub image_url: String,
}

impl From<&JobStatusRecord> for WorkMessage {
    fn from(record: &JobStatusRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            image_url: record.image_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission request
// ---------------------------------------------------------------------------

/// Body of a job submission, as received.
///
/// Both fields are optional at the wire level so a missing `image_url`
/// produces a validation error instead of a deserialization failure.
/// Only a JSON object is accepted; unrecognised fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct SubmitJobRequest {
    pub job_id: Option<String>,
    pub image_url: Option<String>,
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for SubmitJobRequest {
    type Error = CoreError;

    fn try_from(mut body: serde_json::Map<String, serde_json::Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            job_id: optional_string(&mut body, "job_id")?,
            image_url: optional_string(&mut body, "image_url")?,
        })
    }
}

/// Take `field` out of `body`; `null` counts as absent.
fn optional_string(
    body: &mut serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<Option<String>, CoreError> {
    match body.remove(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(CoreError::Validation(format!(
            "{field} must be a string, got {other}"
        ))),
    }
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub job_id: JobId,
    pub image_url: String,
}

impl SubmitJobRequest {
    /// Validate the request, generating a job ID when none was supplied.
    ///
    /// A blank `job_id` counts as absent.
    pub fn validate(self) -> Result<NewJob, CoreError> {
        let image_url = match self.image_url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => return Err(CoreError::Validation("image_url is required".into())),
        };
        validate_image_url(&image_url)?;

        let job_id = match self.job_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => JobId::parse(raw)?,
            _ => JobId::generate(),
        };

        Ok(NewJob { job_id, image_url })
    }
}

/// Validate that `image_url` is an absolute `http`/`https` URL with a host.
pub fn validate_image_url(image_url: &str) -> Result<(), CoreError> {
    let parsed = url::Url::parse(image_url)
        .map_err(|e| CoreError::Validation(format!("image_url is not a valid URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::Validation(format!(
            "image_url must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Validation("image_url must include a host".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- JobId --

    #[test]
    fn generated_ids_are_unique_uuids() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = JobId::parse("  job-42 ").unwrap();
        assert_eq!(id.as_str(), "job-42");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_matches!(JobId::parse("   "), Err(CoreError::Validation(_)));
    }

    #[test]
    fn parse_rejects_forbidden_characters() {
        for raw in ["a/b", "a\\b", "a#b", "a?b", "a\tb"] {
            assert_matches!(JobId::parse(raw), Err(CoreError::Validation(_)), "{raw:?}");
        }
    }

    #[test]
    fn parse_enforces_length_limit() {
        let ok = "x".repeat(MAX_JOB_ID_LEN);
        let too_long = "x".repeat(MAX_JOB_ID_LEN + 1);
        assert!(JobId::parse(&ok).is_ok());
        assert_matches!(JobId::parse(&too_long), Err(CoreError::Validation(_)));
    }

    #[test]
    fn job_id_deserialization_validates() {
        let ok: Result<JobId, _> = serde_json::from_str("\"abc\"");
        assert!(ok.is_ok());
        let bad: Result<JobId, _> = serde_json::from_str("\"a/b\"");
        assert!(bad.is_err());
    }

    // -- JobStatus --

    #[test]
    fn status_names_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Error,
            JobStatus::Unknown,
        ] {
            assert_eq!(JobStatus::from_name(status.as_str()).unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.as_str().into())
            );
        }
    }

    #[test]
    fn status_from_unrecognised_name_fails() {
        assert_matches!(JobStatus::from_name("finished"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn unknown_is_not_persistable() {
        assert!(!JobStatus::Unknown.is_persistable());
        assert!(JobStatus::Pending.is_persistable());
    }

    // -- JobStatusRecord --

    #[test]
    fn pending_record_defaults() {
        let record = JobStatusRecord::pending(JobId::parse("j1").unwrap(), "https://x/img.png");
        assert_eq!(record.partition, JOB_PARTITION);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.image_url, "https://x/img.png");
        assert!(record.extra.is_empty());
        assert_eq!(record.created.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn record_json_flattens_extra_fields() {
        let mut record = JobStatusRecord::pending(JobId::parse("j1").unwrap(), "https://x/img.png");
        record
            .extra
            .insert("result_url".into(), serde_json::json!("https://x/out.png"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["job_id"], "j1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["result_url"], "https://x/out.png");

        let back: JobStatusRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn extra_keys_shadowing_fixed_fields_are_detected() {
        let mut record = JobStatusRecord::pending(JobId::parse("j1").unwrap(), "https://x/img.png");
        record
            .extra
            .insert("result_url".into(), serde_json::json!("https://x/out.png"));
        assert_eq!(record.shadowed_field(), None);

        record.extra.insert("status".into(), serde_json::json!("done"));
        assert_eq!(record.shadowed_field(), Some("status"));
    }

    #[test]
    fn work_message_from_record() {
        let record = JobStatusRecord::pending(JobId::parse("j1").unwrap(), "https://x/img.png");
        let message = WorkMessage::from(&record);
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({"job_id": "j1", "image_url": "https://x/img.png"})
        );
    }

    // -- SubmitJobRequest --

    #[test]
    fn request_must_be_a_json_object() {
        let from_array: Result<SubmitJobRequest, _> =
            serde_json::from_str(r#"["arr-id","https://x/a.png"]"#);
        assert!(from_array.is_err());

        let from_object: SubmitJobRequest =
            serde_json::from_str(r#"{"job_id":null,"image_url":"https://x/a.png","note":1}"#)
                .unwrap();
        assert_eq!(from_object.job_id, None);
        assert_eq!(from_object.image_url.as_deref(), Some("https://x/a.png"));
    }

    #[test]
    fn request_fields_must_be_strings() {
        let wrong_type: Result<SubmitJobRequest, _> =
            serde_json::from_str(r#"{"image_url":42}"#);
        assert!(wrong_type.is_err());
    }

    #[test]
    fn missing_image_url_is_rejected() {
        let req = SubmitJobRequest {
            job_id: Some("j1".into()),
            image_url: None,
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(msg)) if msg.contains("image_url"));
    }

    #[test]
    fn blank_image_url_is_rejected() {
        let req = SubmitJobRequest {
            job_id: None,
            image_url: Some("  ".into()),
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn non_http_image_url_is_rejected() {
        let req = SubmitJobRequest {
            job_id: None,
            image_url: Some("ftp://host/img.png".into()),
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn supplied_job_id_is_kept() {
        let req = SubmitJobRequest {
            job_id: Some("my-job".into()),
            image_url: Some("https://x/img.png".into()),
        };
        let job = req.validate().unwrap();
        assert_eq!(job.job_id.as_str(), "my-job");
        assert_eq!(job.image_url, "https://x/img.png");
    }

    #[test]
    fn absent_or_blank_job_id_is_generated() {
        for job_id in [None, Some(String::new()), Some("  ".into())] {
            let req = SubmitJobRequest {
                job_id,
                image_url: Some("https://x/img.png".into()),
            };
            let job = req.validate().unwrap();
            assert!(uuid::Uuid::parse_str(job.job_id.as_str()).is_ok());
        }
    }

    #[test]
    fn invalid_supplied_job_id_is_rejected() {
        let req = SubmitJobRequest {
            job_id: Some("a/b".into()),
            image_url: Some("https://x/img.png".into()),
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }
}
