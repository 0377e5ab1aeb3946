//! Deal repository
//!
//! Translates deal workflow operations into document store primitives and
//! enforces required fields. Authorisation is the caller's job.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::checklist::ChecklistEngine;
use super::models::{
    deal_collection, deal_path, non_empty, CreateDealInput, Deal, DealDocument, DocumentInput,
    EntrySource, Participant, ParticipantInput, Stage, StageStatus, DEALS_COLLECTION,
    DOCUMENTS_COLLECTION, DOCUMENT_DRAFT, PARTICIPANTS_COLLECTION, STAGES_COLLECTION,
};
use super::outcome::Outcome;
use super::seeder::{SeedResult, StageSeeder, INITIAL_STAGE};
use crate::db::{to_fields, CollectionPath, DocumentStore, FieldFilter, SetMode, StoredDoc};
use crate::types::{DealError, Result, StoreError};

/// Entities that carry their own id as a field
trait HasId {
    fn id_mut(&mut self) -> &mut String;
}

impl HasId for Deal {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

impl HasId for Stage {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

impl HasId for Participant {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

impl HasId for DealDocument {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

/// Decode a stored document, back-filling the id from its key
fn decode_with_id<T>(doc: &StoredDoc) -> std::result::Result<T, StoreError>
where
    T: DeserializeOwned + HasId,
{
    let mut entity: T = doc.decode()?;
    if entity.id_mut().is_empty() {
        *entity.id_mut() = doc.id().to_string();
    }
    Ok(entity)
}

/// Decode every document of a scan, skipping the ones that do not decode
fn decode_all<T: DeserializeOwned + HasId>(docs: &[StoredDoc]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode_with_id(doc) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("Skipping undecodable document {}: {}", doc.path, e);
                None
            }
        })
        .collect()
}

/// Deals in first-seen order, without duplicates
#[derive(Default)]
struct DealSet {
    seen: HashSet<String>,
    deals: Vec<Deal>,
}

impl DealSet {
    fn insert(&mut self, deal: Deal) {
        if self.seen.insert(deal.id.clone()) {
            self.deals.push(deal);
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn into_vec(self) -> Vec<Deal> {
        self.deals
    }
}

pub struct DealRepository {
    store: Arc<dyn DocumentStore>,
    seeder: StageSeeder,
    checklist: ChecklistEngine,
}

impl DealRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            seeder: StageSeeder::new(store.clone()),
            checklist: ChecklistEngine::new(store.clone()),
            store,
        }
    }

    /// Backend name of the underlying store
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Create a deal header and seed its stages.
    ///
    /// Nothing is written when validation fails. Seeding failures do not
    /// fail the call; they are reported as a warning on the outcome.
    pub async fn create_deal(
        &self,
        creator_uid: &str,
        input: CreateDealInput,
    ) -> Result<Outcome<Deal>> {
        let creator_uid = creator_uid.trim();
        if creator_uid.is_empty() {
            return Err(DealError::InvalidArgument(
                "creatorUid is required".to_string(),
            ));
        }
        let entry_source = EntrySource::from_input(input.entry_source.as_deref())?;

        let now = Utc::now();
        let deal = Deal {
            id: self.store.new_id(),
            entry_source,
            property_id: non_empty(input.property_id),
            client_uid: non_empty(input.client_uid),
            creator_uid: creator_uid.to_string(),
            stage_key: INITIAL_STAGE.to_string(),
            stage_status: StageStatus::InProgress,
            microflip_snapshot: input.microflip_snapshot,
            search_profile: input.search_profile,
            lead_metadata: input.lead_metadata,
            created_at: now,
            updated_at: now,
        };

        let path = deal_path(&deal.id)?;
        self.store
            .set(&path, to_fields(&deal)?, SetMode::Overwrite)
            .await?;
        info!(
            "Created deal {} ({}) for {}",
            deal.id, deal.entry_source, deal.creator_uid
        );

        let mut outcome = Outcome::complete(deal);
        match self.seeder.seed(&outcome.value.id, now).await {
            Ok(SeedResult::Seeded { .. }) => {}
            Ok(SeedResult::AlreadySeeded) => {
                debug!("Deal {} was already seeded", outcome.value.id);
            }
            Err(e) => outcome.warn("seed_stages", e),
        }
        Ok(outcome)
    }

    pub async fn get_deal(&self, deal_id: &str) -> Result<Deal> {
        let path = deal_path(deal_id)?;
        let doc = self.store.get(&path).await.map_err(|e| match e {
            StoreError::NotFound(_) => DealError::NotFound(format!("deal {}", deal_id.trim())),
            other => other.into(),
        })?;
        Ok(decode_with_id(&doc)?)
    }

    /// Deals the user created, is the client of, or participates in.
    ///
    /// The creator query is authoritative and its failure is an error. The
    /// client and participant lookups are best-effort.
    pub async fn list_deals_for_user(&self, uid: &str) -> Result<Outcome<Vec<Deal>>> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(DealError::InvalidArgument("uid is required".to_string()));
        }
        let deals = CollectionPath::root(DEALS_COLLECTION)?;
        let mut found = DealSet::default();
        let mut outcome = Outcome::complete(());

        let created = self
            .store
            .query(&deals, Some(FieldFilter::eq("creatorUid", uid)), None)
            .await?;
        decode_all::<Deal>(&created)
            .into_iter()
            .for_each(|d| found.insert(d));

        match self
            .store
            .query(&deals, Some(FieldFilter::eq("clientUid", uid)), None)
            .await
        {
            Ok(docs) => decode_all::<Deal>(&docs)
                .into_iter()
                .for_each(|d| found.insert(d)),
            Err(e) => outcome.warn("list_client_deals", e),
        }

        match self
            .store
            .collection_group(PARTICIPANTS_COLLECTION, FieldFilter::eq("userUid", uid))
            .await
        {
            Ok(participants) => {
                for participant in participants {
                    let Some(parent) = participant.path.parent().parent_doc() else {
                        continue;
                    };
                    if parent.group() != DEALS_COLLECTION || found.contains(parent.id()) {
                        continue;
                    }
                    match self.store.get(&parent).await.and_then(|d| decode_with_id(&d)) {
                        Ok(deal) => found.insert(deal),
                        Err(e) => outcome.warn("fetch_participant_deal", e),
                    }
                }
            }
            Err(e) => outcome.warn("list_participant_deals", e),
        }

        Ok(outcome.map(|_| found.into_vec()))
    }

    /// Every deal. Callers must restrict this to admins.
    pub async fn list_all_deals(&self) -> Result<Vec<Deal>> {
        let deals = CollectionPath::root(DEALS_COLLECTION)?;
        let docs = self.store.query(&deals, None, None).await?;
        Ok(decode_all(&docs))
    }

    /// Whether `uid` is linked to one of the deal's participants
    pub async fn is_participant(&self, deal_id: &str, uid: &str) -> Result<bool> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Ok(false);
        }
        let participants = deal_collection(deal_id, PARTICIPANTS_COLLECTION)?;
        let docs = self
            .store
            .query(&participants, Some(FieldFilter::eq("userUid", uid)), Some(1))
            .await?;
        Ok(!docs.is_empty())
    }

    /// Stages of a deal in lifecycle order
    pub async fn list_stages(&self, deal_id: &str) -> Result<Vec<Stage>> {
        let mut stages: Vec<Stage> = self.scan(deal_id, STAGES_COLLECTION).await?;
        stages.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(stages)
    }

    pub async fn list_participants(&self, deal_id: &str) -> Result<Vec<Participant>> {
        self.scan(deal_id, PARTICIPANTS_COLLECTION).await
    }

    pub async fn list_documents(&self, deal_id: &str) -> Result<Vec<DealDocument>> {
        self.scan(deal_id, DOCUMENTS_COLLECTION).await
    }

    async fn scan<T>(&self, deal_id: &str, name: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned + HasId,
    {
        let collection = deal_collection(deal_id, name)?;
        let docs = self.store.query(&collection, None, None).await?;
        Ok(decode_all(&docs))
    }

    /// Create a participant, or update it when `input.id` names an existing
    /// one. Updates keep the stored `createdAt`; `updatedAt` always moves
    /// forward.
    pub async fn upsert_participant(
        &self,
        deal_id: &str,
        input: ParticipantInput,
    ) -> Result<Participant> {
        let role = input.role.trim();
        let name = input.name.trim();
        if role.is_empty() || name.is_empty() {
            return Err(DealError::InvalidArgument(
                "participant role and name are required".to_string(),
            ));
        }

        let participants = deal_collection(deal_id, PARTICIPANTS_COLLECTION)?;
        let id = non_empty(input.id).unwrap_or_else(|| self.store.new_id());
        let path = participants
            .doc(&id)
            .map_err(|_| DealError::InvalidArgument(format!("invalid participant id: {}", id)))?;

        let existing: Option<Participant> = match self.store.get(&path).await {
            Ok(doc) => Some(decode_with_id(&doc)?),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let (created_at, updated_at) = match &existing {
            Some(previous) => (previous.created_at, next_update(previous.updated_at, now)),
            None => (now, now),
        };

        let participant = Participant {
            id,
            role: role.to_string(),
            user_uid: non_empty(input.user_uid),
            contact_id: non_empty(input.contact_id),
            name: name.to_string(),
            email: non_empty(input.email),
            phone: non_empty(input.phone),
            created_at,
            updated_at,
        };
        self.store
            .set(&path, to_fields(&participant)?, SetMode::Overwrite)
            .await?;

        info!(
            "{} participant {} ({}) on deal {}",
            if existing.is_some() { "Updated" } else { "Added" },
            participant.id,
            participant.role,
            deal_id
        );
        Ok(participant)
    }

    /// Attach a document reference. The id is always generated.
    pub async fn add_document(&self, deal_id: &str, input: DocumentInput) -> Result<DealDocument> {
        let kind = input.kind.trim();
        if kind.is_empty() {
            return Err(DealError::InvalidArgument(
                "document kind is required".to_string(),
            ));
        }

        let documents = deal_collection(deal_id, DOCUMENTS_COLLECTION)?;
        let now = Utc::now();
        let document = DealDocument {
            id: self.store.new_id(),
            kind: kind.to_string(),
            status: non_empty(input.status).unwrap_or_else(|| DOCUMENT_DRAFT.to_string()),
            reference: input.reference,
            required_by: non_empty(input.required_by),
            created_at: now,
            updated_at: now,
        };
        self.store
            .set(
                &documents.doc(&document.id)?,
                to_fields(&document)?,
                SetMode::Overwrite,
            )
            .await?;

        info!(
            "Attached {} document {} to deal {}",
            document.kind, document.id, deal_id
        );
        Ok(document)
    }

    /// Apply checklist item updates to one stage
    pub async fn update_stage_checklist(
        &self,
        deal_id: &str,
        stage_key: &str,
        updates: &BTreeMap<String, String>,
    ) -> Result<Outcome<Stage>> {
        self.checklist
            .update_stage(deal_id, stage_key, updates)
            .await
    }
}

/// Next `updatedAt` for a record last touched at `previous`, strictly later
/// than it even if the clock has not moved.
fn next_update(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn repo() -> (Arc<MemoryStore>, DealRepository) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), DealRepository::new(store))
    }

    fn input(entry_source: &str) -> CreateDealInput {
        CreateDealInput {
            entry_source: Some(entry_source.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_deal_seeds_stages() {
        let (_, repo) = repo();
        for source in ["property", "client", "seller", "other", ""] {
            let outcome = repo.create_deal("u1", input(source)).await.unwrap();
            assert!(!outcome.is_degraded());

            let deal = outcome.value;
            assert_eq!(deal.stage_key, "intake");
            assert_eq!(deal.stage_status, StageStatus::InProgress);
            assert_eq!(deal.created_at, deal.updated_at);

            let stages = repo.list_stages(&deal.id).await.unwrap();
            let orders: Vec<u32> = stages.iter().map(|s| s.order).collect();
            assert_eq!(orders, vec![0, 1, 2, 3, 4, 5, 6]);
        }
    }

    #[tokio::test]
    async fn test_create_deal_rejects_bad_input_without_writing() {
        let (store, repo) = repo();

        let err = repo.create_deal("u1", input("auction")).await.unwrap_err();
        assert!(matches!(err, DealError::InvalidArgument(_)));

        let err = repo.create_deal("  ", input("client")).await.unwrap_err();
        assert!(matches!(err, DealError::InvalidArgument(_)));

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_deal_not_found() {
        let (_, repo) = repo();
        let err = repo.get_deal("missing").await.unwrap_err();
        assert!(matches!(err, DealError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_deal_backfills_id() {
        let (store, repo) = repo();
        let deal = repo.create_deal("u1", input("seller")).await.unwrap().value;

        let path = deal_path(&deal.id).unwrap();
        let mut fields = to_fields(&deal).unwrap();
        fields.remove("id");
        store.set(&path, fields, SetMode::Overwrite).await.unwrap();

        assert_eq!(repo.get_deal(&deal.id).await.unwrap().id, deal.id);
    }

    #[tokio::test]
    async fn test_participant_upsert_preserves_created_at() {
        let (_, repo) = repo();
        let deal = repo.create_deal("u1", input("client")).await.unwrap().value;

        let first = repo
            .upsert_participant(
                &deal.id,
                ParticipantInput {
                    role: "buyer".into(),
                    name: "Ada".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!first.id.is_empty());
        assert_eq!(first.created_at, first.updated_at);

        let second = repo
            .upsert_participant(
                &deal.id,
                ParticipantInput {
                    id: Some(first.id.clone()),
                    role: "buyer".into(),
                    name: "Ada Lovelace".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let stored = repo.list_participants(&deal.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_participant_requires_role_and_name() {
        let (_, repo) = repo();
        let err = repo
            .upsert_participant(
                "d1",
                ParticipantInput {
                    role: " ".into(),
                    name: "Ada".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_add_document_defaults_to_draft() {
        let (_, repo) = repo();
        let deal = repo.create_deal("u1", input("property")).await.unwrap().value;

        let doc = repo
            .add_document(
                &deal.id,
                DocumentInput {
                    kind: "opensign".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.status, "draft");
        assert_eq!(repo.list_documents(&deal.id).await.unwrap(), vec![doc]);

        let err = repo
            .add_document(&deal.id, DocumentInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_list_deals_for_user_unions_without_duplicates() {
        let (_, repo) = repo();

        // Created and client of the same deal
        let own = repo
            .create_deal(
                "u1",
                CreateDealInput {
                    entry_source: Some("client".into()),
                    client_uid: Some("u1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;
        repo.upsert_participant(
            &own.id,
            ParticipantInput {
                role: "buyer".into(),
                name: "Self".into(),
                user_uid: Some("u1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Participant only
        let other = repo.create_deal("u2", input("seller")).await.unwrap().value;
        repo.upsert_participant(
            &other.id,
            ParticipantInput {
                role: "agent".into(),
                name: "U1".into(),
                user_uid: Some("u1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Unrelated
        repo.create_deal("u3", input("property")).await.unwrap();

        let outcome = repo.list_deals_for_user("u1").await.unwrap();
        assert!(!outcome.is_degraded());
        let ids: Vec<_> = outcome.value.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![own.id.as_str(), other.id.as_str()]);

        assert_eq!(repo.list_all_deals().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_is_participant() {
        let (_, repo) = repo();
        let deal = repo.create_deal("u1", input("client")).await.unwrap().value;
        repo.upsert_participant(
            &deal.id,
            ParticipantInput {
                role: "lender".into(),
                name: "Bank".into(),
                user_uid: Some("u7".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(repo.is_participant(&deal.id, "u7").await.unwrap());
        assert!(!repo.is_participant(&deal.id, "u8").await.unwrap());
        assert!(!repo.is_participant(&deal.id, "").await.unwrap());
    }

    #[test]
    fn test_next_update_is_strictly_increasing() {
        let t = Utc::now();
        assert!(next_update(t, t) > t);
        assert!(next_update(t, t - Duration::seconds(5)) > t);
        let later = t + Duration::seconds(1);
        assert_eq!(next_update(t, later), later);
    }
}
