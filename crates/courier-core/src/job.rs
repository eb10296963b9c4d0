//! Job records as seen through the job directory
//!
//! The directory reports jobs as positional tuples. [`Job::from_ledger_tuple`]
//! is the one place those tuples are turned into named, validated fields;
//! nothing else in the workspace indexes into raw ledger values.

use crate::{ActorAddress, ContentDigest, CourierError, JobId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ledger-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Accepting applications
    Open,
    /// Assigned to a worker, no result yet
    Taken,
    /// Result submitted, awaiting approval
    Delivered,
    /// Approved and paid out
    Completed,
    /// Under dispute
    Disputed,
    /// Withdrawn by the creator
    Cancelled,
}

impl JobState {
    /// Decode the ledger's numeric state code
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(JobState::Open),
            1 => Ok(JobState::Taken),
            2 => Ok(JobState::Delivered),
            3 => Ok(JobState::Completed),
            4 => Ok(JobState::Disputed),
            5 => Ok(JobState::Cancelled),
            other => Err(CourierError::invalid(format!("Unknown job state code {other}"))),
        }
    }

    /// Numeric code used on the ledger
    pub fn code(&self) -> u64 {
        match self {
            JobState::Open => 0,
            JobState::Taken => 1,
            JobState::Delivered => 2,
            JobState::Completed => 3,
            JobState::Disputed => 4,
            JobState::Cancelled => 5,
        }
    }

    /// States in which an assigned worker still has something to do or watch
    pub fn is_actionable(&self) -> bool {
        matches!(self, JobState::Taken | JobState::Delivered)
    }

    /// States from which a job never returns
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Disputed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Open => "open",
            JobState::Taken => "taken",
            JobState::Delivered => "delivered",
            JobState::Completed => "completed",
            JobState::Disputed => "disputed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Read-only view of a ledger job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Ledger identifier
    pub id: JobId,
    /// Current ledger state
    pub state: JobState,
    /// Address that posted the job
    pub creator: ActorAddress,
    /// Assigned worker, if any
    pub worker: Option<ActorAddress>,
    /// Whether the creator picks among several applicants
    pub multiple_applicants: bool,
    /// Free-form tags declared by the creator
    pub tags: Vec<String>,
    /// Digest of the public job listing
    pub content_digest: ContentDigest,
    /// Short title recorded with the job
    pub title: String,
    /// Length of the job's event log; binds take-actions to a fresh view
    pub revision: u64,
    /// Digest of the delivered result, once one exists
    pub result_digest: Option<ContentDigest>,
}

/// Number of positional fields in a ledger job tuple
pub const JOB_TUPLE_LEN: usize = 9;

impl Job {
    /// Decode the directory's positional job tuple.
    ///
    /// Field order: `[state, creator, worker, multipleApplicants, tags,
    /// contentDigest, title, revision, resultDigest]`. Numbers may arrive as
    /// JSON numbers or decimal strings. A zero worker address or zero result
    /// digest decodes to `None`.
    pub fn from_ledger_tuple(id: JobId, fields: &[Value]) -> Result<Self> {
        if fields.len() < JOB_TUPLE_LEN {
            return Err(CourierError::serialization(format!(
                "Job {id} tuple has {} fields, expected {JOB_TUPLE_LEN}",
                fields.len()
            )));
        }

        let state = JobState::from_code(field_u64(&fields[0], "state")?)?;
        let creator = ActorAddress::parse(field_str(&fields[1], "creator")?)?;
        let worker = ActorAddress::parse(field_str(&fields[2], "worker")?)?;
        let multiple_applicants = fields[3].as_bool().ok_or_else(|| {
            CourierError::serialization("Job field multipleApplicants is not a bool")
        })?;
        let tags = fields[4]
            .as_array()
            .ok_or_else(|| CourierError::serialization("Job field tags is not an array"))?
            .iter()
            .map(|tag| field_str(tag, "tags[]").map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let content_digest = ContentDigest::from_hex(field_str(&fields[5], "contentDigest")?)?;
        let title = field_str(&fields[6], "title")?.to_string();
        let revision = field_u64(&fields[7], "revision")?;
        let result_digest = match &fields[8] {
            Value::Null => None,
            value => {
                let digest = ContentDigest::from_hex(field_str(value, "resultDigest")?)?;
                (!digest.is_zero()).then_some(digest)
            }
        };

        Ok(Self {
            id,
            state,
            creator,
            worker: (!worker.is_zero()).then_some(worker),
            multiple_applicants,
            tags,
            content_digest,
            title,
            revision,
            result_digest,
        })
    }

    /// Encode back into the positional tuple form
    pub fn to_ledger_tuple(&self) -> Vec<Value> {
        let worker = self.worker.clone().unwrap_or_else(ActorAddress::zero);
        let result = self
            .result_digest
            .unwrap_or_else(|| ContentDigest::from_bytes([0u8; 32]));
        vec![
            Value::from(self.state.code()),
            Value::from(self.creator.to_string()),
            Value::from(worker.to_string()),
            Value::from(self.multiple_applicants),
            Value::from(self.tags.clone()),
            Value::from(self.content_digest.to_hex()),
            Value::from(self.title.clone()),
            Value::from(self.revision),
            Value::from(result.to_hex()),
        ]
    }

    /// Whether `address` is the assigned worker
    pub fn is_assigned_to(&self, address: &ActorAddress) -> bool {
        self.worker.as_ref() == Some(address)
    }
}

/// Domain label of the signed take-action message
pub const TAKE_ACTION_LABEL: &str = "courier/take/v1";

/// Message a worker signs to take a single-applicant job.
///
/// Binding the job's current revision means a signature captured earlier
/// stops verifying as soon as the job's event log grows.
pub fn take_action_message(id: JobId, revision: u64) -> Vec<u8> {
    format!("{TAKE_ACTION_LABEL}:{id}:{revision}").into_bytes()
}

fn field_str<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| CourierError::serialization(format!("Job field {name} is not a string")))
}

fn field_u64(value: &Value, name: &str) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| CourierError::serialization(format!("Job field {name} is not an unsigned integer")))
}

/// Public listing stored at a job's content digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    /// Listing title
    #[serde(default)]
    pub title: String,
    /// Body describing the requested work
    #[serde(default)]
    pub description: String,
    /// Extra tags carried in the listing
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JobListing {
    /// Parse listing bytes; non-JSON text becomes the description
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<JobListing>(bytes) {
            Ok(listing) => listing,
            Err(_) => JobListing {
                description: String::from_utf8_lossy(bytes).into_owned(),
                ..Default::default()
            },
        }
    }

    /// All listing text joined for keyword matching
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.description.len() + self.tags.len() * 8,
        );
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.description);
        for tag in &self.tags {
            text.push('\n');
            text.push_str(tag);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tuple() -> Vec<Value> {
        vec![
            json!(0),
            json!("0x1111111111111111111111111111111111111111"),
            json!("0x0000000000000000000000000000000000000000"),
            json!(false),
            json!(["discord", "bot"]),
            json!(format!("0x{}", "22".repeat(32))),
            json!("Need a Discord bot"),
            json!("7"),
            json!(format!("0x{}", "00".repeat(32))),
        ]
    }

    #[test]
    fn test_decode_open_job() {
        let job = Job::from_ledger_tuple(JobId(3), &sample_tuple()).unwrap();
        assert_eq!(job.state, JobState::Open);
        assert_eq!(job.worker, None);
        assert_eq!(job.result_digest, None);
        assert_eq!(job.revision, 7);
        assert_eq!(job.tags, vec!["discord", "bot"]);
        assert!(!job.multiple_applicants);
    }

    #[test]
    fn test_tuple_roundtrip() {
        let job = Job::from_ledger_tuple(JobId(3), &sample_tuple()).unwrap();
        let again = Job::from_ledger_tuple(JobId(3), &job.to_ledger_tuple()).unwrap();
        assert_eq!(job, again);
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let mut tuple = sample_tuple();
        tuple[0] = json!(9);
        assert!(Job::from_ledger_tuple(JobId(1), &tuple).is_err());
    }

    #[test]
    fn test_short_tuple_is_rejected() {
        let tuple = sample_tuple();
        let err = Job::from_ledger_tuple(JobId(1), &tuple[..5]).unwrap_err();
        assert!(matches!(err, CourierError::Serialization { .. }));
    }

    #[test]
    fn test_state_ranges() {
        assert!(JobState::Taken.is_actionable());
        assert!(JobState::Delivered.is_actionable());
        assert!(!JobState::Open.is_actionable());
        assert!(JobState::Disputed.is_closed());
        assert_eq!(JobState::from_code(JobState::Cancelled.code()).unwrap(), JobState::Cancelled);
    }

    #[test]
    fn test_take_message_binds_revision() {
        assert_eq!(take_action_message(JobId(5), 2), b"courier/take/v1:5:2".to_vec());
        assert_ne!(take_action_message(JobId(5), 2), take_action_message(JobId(5), 3));
    }

    #[test]
    fn test_listing_falls_back_to_plain_text() {
        let listing = JobListing::parse(b"just build me a bot");
        assert_eq!(listing.description, "just build me a bot");
        assert!(listing.title.is_empty());

        let listing = JobListing::parse(br#"{"title":"Scraper","tags":["python"]}"#);
        assert_eq!(listing.title, "Scraper");
        assert!(listing.searchable_text().contains("python"));
    }
}
