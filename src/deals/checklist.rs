//! Checklist transition engine
//!
//! Applies item status updates to one stage and decides whether the stage
//! is completed. A stage is completed once it has at least one item and all
//! of its required items are `done`. Completion is a one-way ratchet: later
//! updates never move a completed stage back.

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{deal_collection, deal_path, Stage, StageStatus, STAGES_COLLECTION};
use super::outcome::Outcome;
use crate::db::{to_fields, DocumentStore, SetMode};
use crate::types::{DealError, Result, StoreError};

/// Trimmed, lower-cased stage key; `None` when blank
pub fn normalize_stage_key(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Overwrite the status of every item named in `updates`. Unknown ids are
/// ignored. Returns the number of items touched.
pub fn apply_updates(stage: &mut Stage, updates: &BTreeMap<String, String>) -> usize {
    let mut touched = 0;
    for item in stage.checklist.iter_mut().filter(|i| !i.id.is_empty()) {
        if let Some(status) = updates.get(&item.id) {
            item.status = status.clone();
            touched += 1;
        }
    }
    touched
}

/// Whether the checklist satisfies the completion rule
pub fn is_satisfied(stage: &Stage) -> bool {
    !stage.checklist.is_empty()
        && stage
            .checklist
            .iter()
            .filter(|item| item.required)
            .all(|item| item.is_done())
}

/// Promote the stage to completed when its checklist is satisfied.
/// Returns true when the status changed.
pub fn promote(stage: &mut Stage) -> bool {
    if stage.status.is_completed() || !is_satisfied(stage) {
        return false;
    }
    stage.status = StageStatus::Completed;
    true
}

pub struct ChecklistEngine {
    store: Arc<dyn DocumentStore>,
}

impl ChecklistEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Apply `updates` to the stage `stage_key` of `deal_id`, write it back
    /// and mirror the stage status onto the deal header.
    ///
    /// The header sync is best-effort and reported as a warning.
    pub async fn update_stage(
        &self,
        deal_id: &str,
        stage_key: &str,
        updates: &BTreeMap<String, String>,
    ) -> Result<Outcome<Stage>> {
        let stage_key = normalize_stage_key(stage_key)
            .ok_or_else(|| DealError::InvalidArgument("stageKey is required".to_string()))?;
        let stage_path = deal_collection(deal_id, STAGES_COLLECTION)?
            .doc(&stage_key)
            .map_err(|_| DealError::InvalidArgument(format!("invalid stageKey: {}", stage_key)))?;

        let stored = self.store.get(&stage_path).await.map_err(|e| match e {
            StoreError::NotFound(_) => {
                DealError::NotFound(format!("stage {} of deal {}", stage_key, deal_id))
            }
            other => other.into(),
        })?;
        let mut stage: Stage = stored.decode()?;
        if stage.id.is_empty() {
            stage.id = stored.id().to_string();
        }

        let touched = apply_updates(&mut stage, updates);
        if promote(&mut stage) {
            info!("Stage {} of deal {} completed", stage.id, deal_id);
        }
        stage.updated_at = Utc::now();
        debug!(
            "Updated {} checklist items on stage {} of deal {}",
            touched, stage.id, deal_id
        );

        self.store
            .set(&stage_path, to_fields(&stage)?, SetMode::Overwrite)
            .await?;

        let mut outcome = Outcome::complete(stage);
        let header = json!({
            "stageStatus": outcome.value.status,
            "updatedAt": outcome.value.updated_at,
        });
        let sync = async {
            let path = deal_path(deal_id)?;
            self.store
                .set(&path, to_fields(&header)?, SetMode::Merge)
                .await?;
            Ok::<_, DealError>(())
        };
        if let Err(e) = sync.await {
            outcome.warn("sync_deal_status", e);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::deals::models::{ChecklistItem, ITEM_DONE};

    fn stage_with(items: Vec<ChecklistItem>) -> Stage {
        let now = Utc::now();
        Stage {
            id: "intake".into(),
            order: 0,
            status: StageStatus::InProgress,
            assignee: "client".into(),
            checklist: items,
            created_at: now,
            updated_at: now,
        }
    }

    fn updates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_stage_key() {
        assert_eq!(normalize_stage_key(" Intake "), Some("intake".into()));
        assert_eq!(normalize_stage_key("   "), None);
    }

    #[test]
    fn test_required_item_done_completes_stage() {
        let mut stage = stage_with(vec![
            ChecklistItem::todo("a", "A", true, "client"),
            ChecklistItem::todo("b", "B", false, "client"),
        ]);
        assert_eq!(apply_updates(&mut stage, &updates(&[("a", ITEM_DONE)])), 1);
        assert!(promote(&mut stage));
        assert_eq!(stage.status, StageStatus::Completed);
        assert_eq!(stage.checklist[1].status, "todo");
    }

    #[test]
    fn test_optional_item_alone_does_not_complete() {
        let mut stage = stage_with(vec![
            ChecklistItem::todo("a", "A", true, "client"),
            ChecklistItem::todo("b", "B", false, "client"),
        ]);
        apply_updates(&mut stage, &updates(&[("b", ITEM_DONE)]));
        assert!(!promote(&mut stage));
        assert_eq!(stage.status, StageStatus::InProgress);
    }

    #[test]
    fn test_empty_checklist_never_completes() {
        let mut stage = stage_with(Vec::new());
        assert!(!promote(&mut stage));
        assert_eq!(stage.status, StageStatus::InProgress);
    }

    #[test]
    fn test_all_optional_checklist_completes() {
        let mut stage = stage_with(vec![ChecklistItem::todo("b", "B", false, "client")]);
        assert!(promote(&mut stage));
    }

    #[test]
    fn test_unknown_ids_ignored() {
        let mut stage = stage_with(vec![ChecklistItem::todo("a", "A", true, "client")]);
        assert_eq!(apply_updates(&mut stage, &updates(&[("zzz", ITEM_DONE)])), 0);
        assert_eq!(stage.checklist[0].status, "todo");
    }

    #[test]
    fn test_completed_is_not_demoted() {
        let mut stage = stage_with(vec![ChecklistItem::todo("a", "A", true, "client")]);
        apply_updates(&mut stage, &updates(&[("a", ITEM_DONE)]));
        promote(&mut stage);

        apply_updates(&mut stage, &updates(&[("a", "todo")]));
        assert!(!promote(&mut stage));
        assert_eq!(stage.status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_missing_stage_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let engine = ChecklistEngine::new(store);
        let err = engine
            .update_stage("d1", "intake", &updates(&[("a", ITEM_DONE)]))
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blank_stage_key_rejected() {
        let engine = ChecklistEngine::new(Arc::new(MemoryStore::new()));
        let err = engine
            .update_stage("d1", "  ", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::InvalidArgument(_)));
    }
}
