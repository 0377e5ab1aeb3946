//! Deal graph entities
//!
//! Persisted layout:
//!
//! ```text
//! deals/{dealId}
//! deals/{dealId}/stages/{stageKey}
//! deals/{dealId}/participants/{participantId}
//! deals/{dealId}/documents/{documentId}
//! ```
//!
//! Field names are camelCase on the wire and in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::db::{CollectionPath, DocPath};
use crate::types::{DealError, StoreError};

pub const DEALS_COLLECTION: &str = "deals";
pub const STAGES_COLLECTION: &str = "stages";
pub const PARTICIPANTS_COLLECTION: &str = "participants";
pub const DOCUMENTS_COLLECTION: &str = "documents";

/// Opaque key/value payload owned by an external collaborator
/// (micro-flip snapshot, search profile, lead metadata, document refs).
/// Stored and returned verbatim, never inspected.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Checklist item status that counts towards stage completion
pub const ITEM_DONE: &str = "done";
/// Initial checklist item status
pub const ITEM_TODO: &str = "todo";
/// Default status for newly attached documents
pub const DOCUMENT_DRAFT: &str = "draft";

/// Workflow path through which a deal was created
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    #[default]
    Property,
    Client,
    Seller,
    Other,
}

impl EntrySource {
    pub const ALL: [EntrySource; 4] = [
        EntrySource::Property,
        EntrySource::Client,
        EntrySource::Seller,
        EntrySource::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::Property => "property",
            EntrySource::Client => "client",
            EntrySource::Seller => "seller",
            EntrySource::Other => "other",
        }
    }

    /// Normalise raw caller input: trimmed, case-insensitive, and an empty
    /// value means `property`.
    pub fn from_input(raw: Option<&str>) -> Result<Self, DealError> {
        let normalized = raw.unwrap_or_default().trim().to_lowercase();
        if normalized.is_empty() {
            return Ok(EntrySource::Property);
        }
        normalized.parse()
    }
}

impl FromStr for EntrySource {
    type Err = DealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntrySource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| DealError::InvalidArgument(format!("invalid entrySource: {}", s)))
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage status. Values other than the three canonical ones may have been
/// written by other callers; they are kept verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Other(String),
}

impl StageStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Other(raw) => raw,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}

impl From<String> for StageStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "not_started" => StageStatus::NotStarted,
            "in_progress" => StageStatus::InProgress,
            "completed" => StageStatus::Completed,
            _ => StageStatus::Other(raw),
        }
    }
}

impl From<StageStatus> for String {
    fn from(status: StageStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One real-estate transaction: the root of the deal graph
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    /// Store-assigned id; back-filled from the document key when missing
    #[serde(default)]
    pub id: String,

    pub entry_source: EntrySource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uid: Option<String>,

    /// Authenticated creator, immutable after creation
    pub creator_uid: String,

    /// Active stage as tracked on the header
    pub stage_key: String,

    /// Mirror of the active stage's status
    pub stage_status: StageStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microflip_snapshot: Option<Payload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_profile: Option<Payload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_metadata: Option<Payload>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new deal
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateDealInput {
    #[serde(default)]
    pub entry_source: Option<String>,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default)]
    pub client_uid: Option<String>,
    #[serde(default)]
    pub microflip_snapshot: Option<Payload>,
    #[serde(default)]
    pub search_profile: Option<Payload>,
    #[serde(default)]
    pub lead_metadata: Option<Payload>,
}

/// One actionable task within a stage, embedded in the stage document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Free text; `todo` and `done` are the canonical values
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

impl ChecklistItem {
    pub fn todo(id: &str, label: &str, required: bool, owner_role: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: None,
            required,
            status: ITEM_TODO.to_string(),
            owner_role: Some(owner_role.to_string()),
            document_ref: None,
            due_at: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ITEM_DONE
    }
}

/// One step of the deal lifecycle, keyed by its canonical stage key
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default)]
    pub assignee: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A party attached to a deal (buyer, seller, agent, lender, ...)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied participant fields. An empty `id` creates a participant,
/// a known `id` updates it.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub user_uid: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A reference to an external artifact attached to a deal
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealDocument {
    #[serde(default)]
    pub id: String,
    /// e.g. `opensign`, `lob_letter`, `upload`
    pub kind: String,
    pub status: String,
    /// Pointer to the external record, e.g. `{envelopeId, docType}`
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied document fields
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<Payload>,
    #[serde(default)]
    pub required_by: Option<String>,
}

/// Checklist update request: target stage and `itemId -> status`
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageUpdate {
    #[serde(default)]
    pub stage_key: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

/// A deal together with its three child collections
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DealGraph {
    pub deal: Deal,
    pub stages: Vec<Stage>,
    pub participants: Vec<Participant>,
    pub documents: Vec<DealDocument>,
}

/// Path of a deal header. Malformed ids are the caller's fault.
pub(crate) fn deal_path(deal_id: &str) -> Result<DocPath, DealError> {
    let deal_id = deal_id.trim();
    if deal_id.is_empty() {
        return Err(DealError::InvalidArgument("dealId is required".to_string()));
    }
    DocPath::root(DEALS_COLLECTION, deal_id).map_err(invalid_path)
}

/// One of the deal's child collections
pub(crate) fn deal_collection(deal_id: &str, name: &str) -> Result<CollectionPath, DealError> {
    deal_path(deal_id)?.collection(name).map_err(invalid_path)
}

fn invalid_path(err: StoreError) -> DealError {
    match err {
        StoreError::InvalidPath(path) => {
            DealError::InvalidArgument(format!("invalid id in {}", path))
        }
        other => other.into(),
    }
}

/// Trim and drop empty optional strings
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
