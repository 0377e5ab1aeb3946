//! Deal lifecycle facade
//!
//! Entry point for the HTTP layer. Every operation resolves the deal,
//! checks the access policy and only then touches the store.

use std::sync::Arc;
use tracing::debug;

use super::access::{AccessPolicy, DealAction, UserContext};
use super::checklist::normalize_stage_key;
use super::models::{
    non_empty, CreateDealInput, Deal, DealDocument, DealGraph, DocumentInput, EntrySource,
    Participant, ParticipantInput, Stage, StageUpdate,
};
use super::outcome::Outcome;
use super::repository::DealRepository;
use crate::db::DocumentStore;
use crate::types::{DealError, Result};

pub struct DealService {
    repo: Arc<DealRepository>,
    policy: AccessPolicy,
}

impl DealService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let repo = Arc::new(DealRepository::new(store));
        Self {
            policy: AccessPolicy::new(repo.clone()),
            repo,
        }
    }

    pub fn repository(&self) -> &DealRepository {
        &self.repo
    }

    /// Create a deal owned by `user`. Client-led deals without a client
    /// default to the caller as client.
    pub async fn create_deal(
        &self,
        user: &UserContext,
        mut input: CreateDealInput,
    ) -> Result<Outcome<Deal>> {
        let entry_source = EntrySource::from_input(input.entry_source.as_deref())?;
        input.entry_source = Some(entry_source.as_str().to_string());

        input.client_uid = non_empty(input.client_uid.take());
        if entry_source == EntrySource::Client && input.client_uid.is_none() {
            input.client_uid = non_empty(Some(user.uid.clone()));
        }

        self.repo.create_deal(&user.uid, input).await
    }

    /// All deals for admins, otherwise the deals the user is linked to
    pub async fn list_deals(&self, user: &UserContext) -> Result<Outcome<Vec<Deal>>> {
        if user.is_admin() {
            return Ok(Outcome::complete(self.repo.list_all_deals().await?));
        }
        self.repo.list_deals_for_user(&user.uid).await
    }

    async fn resolve(
        &self,
        user: &UserContext,
        deal_id: &str,
        action: DealAction,
    ) -> Result<Deal> {
        let deal = self.repo.get_deal(deal_id).await?;
        self.policy.authorize(&deal, user, action).await?;
        debug!("{} authorised to {} deal {}", user.uid, action, deal.id);
        Ok(deal)
    }

    /// The deal with its stages, participants and documents.
    ///
    /// A failing child fetch yields an empty list and a warning.
    pub async fn get_deal_graph(
        &self,
        user: &UserContext,
        deal_id: &str,
    ) -> Result<Outcome<DealGraph>> {
        let deal = self.resolve(user, deal_id, DealAction::View).await?;

        let (stages, participants, documents) = tokio::join!(
            self.repo.list_stages(&deal.id),
            self.repo.list_participants(&deal.id),
            self.repo.list_documents(&deal.id),
        );

        let mut outcome = Outcome::complete(());
        let stages = stages.unwrap_or_else(|e| {
            outcome.warn("list_stages", e);
            Vec::new()
        });
        let participants = participants.unwrap_or_else(|e| {
            outcome.warn("list_participants", e);
            Vec::new()
        });
        let documents = documents.unwrap_or_else(|e| {
            outcome.warn("list_documents", e);
            Vec::new()
        });

        Ok(outcome.map(|_| DealGraph {
            deal,
            stages,
            participants,
            documents,
        }))
    }

    pub async fn upsert_participant(
        &self,
        user: &UserContext,
        deal_id: &str,
        input: ParticipantInput,
    ) -> Result<Participant> {
        let deal = self
            .resolve(user, deal_id, DealAction::ManageParticipants)
            .await?;
        self.repo.upsert_participant(&deal.id, input).await
    }

    pub async fn attach_document(
        &self,
        user: &UserContext,
        deal_id: &str,
        input: DocumentInput,
    ) -> Result<DealDocument> {
        let deal = self
            .resolve(user, deal_id, DealAction::AttachDocument)
            .await?;
        self.repo.add_document(&deal.id, input).await
    }

    /// Update checklist items of `update.stage_key`, or of the deal's
    /// current stage when no key is given.
    pub async fn update_stage_checklist(
        &self,
        user: &UserContext,
        deal_id: &str,
        update: StageUpdate,
    ) -> Result<Outcome<Stage>> {
        let deal = self
            .resolve(user, deal_id, DealAction::UpdateStages)
            .await?;

        let stage_key = update
            .stage_key
            .as_deref()
            .and_then(normalize_stage_key)
            .or_else(|| normalize_stage_key(&deal.stage_key))
            .ok_or_else(|| DealError::InvalidArgument("stageKey is required".to_string()))?;

        self.repo
            .update_stage_checklist(&deal.id, &stage_key, &update.items)
            .await
    }
}
