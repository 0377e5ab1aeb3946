//! Initial stage pipeline for a new deal

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{ChecklistItem, Stage, StageStatus, DEALS_COLLECTION, STAGES_COLLECTION};
use crate::db::{to_fields, DocPath, DocumentStore, SetMode, WriteBatch};
use crate::types::StoreError;

/// Canonical stage keys in lifecycle order. A stage's `order` is its index.
pub const STAGE_ORDER: [&str; 7] = [
    "intake",
    "underwriting",
    "offer",
    "contract",
    "preclose",
    "close",
    "postclose",
];

/// Stage every new deal starts in
pub const INITIAL_STAGE: &str = "intake";

/// Position of a canonical stage key, `None` for ad hoc keys
pub fn stage_order(key: &str) -> Option<u32> {
    STAGE_ORDER.iter().position(|k| *k == key).map(|i| i as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedResult {
    /// Stages were written
    Seeded { stages: usize },
    /// The deal already had stages; nothing was written
    AlreadySeeded,
}

/// Writes the canonical stage set for a deal in one atomic batch
pub struct StageSeeder {
    store: Arc<dyn DocumentStore>,
}

impl StageSeeder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The seven canonical stages. Only intake is in progress and carries
    /// a checklist.
    pub fn default_stages(now: DateTime<Utc>) -> Vec<Stage> {
        STAGE_ORDER
            .iter()
            .enumerate()
            .map(|(order, key)| {
                let mut stage = Stage {
                    id: key.to_string(),
                    order: order as u32,
                    status: StageStatus::NotStarted,
                    assignee: "agent".to_string(),
                    checklist: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                if *key == INITIAL_STAGE {
                    stage.status = StageStatus::InProgress;
                    stage.assignee = "client".to_string();
                    stage.checklist = vec![
                        ChecklistItem::todo(
                            "confirm-intent",
                            "Confirm your investing intent and timeline",
                            true,
                            "client",
                        ),
                        ChecklistItem::todo(
                            "confirm-participants",
                            "Confirm who is involved (agents, partners)",
                            true,
                            "client",
                        ),
                        ChecklistItem::todo(
                            "review-microflip",
                            "Review micro-flip analysis and risk profile",
                            false,
                            "client",
                        ),
                    ];
                }
                stage
            })
            .collect()
    }

    /// Seed the stages of `deal_id` unless it already has some
    pub async fn seed(&self, deal_id: &str, now: DateTime<Utc>) -> Result<SeedResult, StoreError> {
        let stages = DocPath::root(DEALS_COLLECTION, deal_id)?
            .collection(STAGES_COLLECTION)?;

        if !self.store.query(&stages, None, Some(1)).await?.is_empty() {
            debug!("Deal {} already has stages, skipping seed", deal_id);
            return Ok(SeedResult::AlreadySeeded);
        }

        let mut batch = WriteBatch::new();
        for stage in Self::default_stages(now) {
            batch.set(stages.doc(&stage.id)?, to_fields(&stage)?, SetMode::Overwrite);
        }
        let count = batch.len();
        self.store.commit(batch).await?;

        info!("Seeded {} stages for deal {}", count, deal_id);
        Ok(SeedResult::Seeded { stages: count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CollectionPath, MemoryStore};
    use crate::deals::models::ITEM_DONE;

    fn stages_of(deal_id: &str) -> CollectionPath {
        DocPath::root("deals", deal_id)
            .unwrap()
            .collection("stages")
            .unwrap()
    }

    #[test]
    fn test_default_stages_shape() {
        let stages = StageSeeder::default_stages(Utc::now());
        assert_eq!(stages.len(), 7);

        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.order, i as u32);
            assert_eq!(stage.id, STAGE_ORDER[i]);
        }

        let intake = &stages[0];
        assert_eq!(intake.status, StageStatus::InProgress);
        assert_eq!(intake.assignee, "client");
        let ids: Vec<_> = intake.checklist.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            ["confirm-intent", "confirm-participants", "review-microflip"]
        );
        assert!(intake.checklist[0].required);
        assert!(!intake.checklist[2].required);
        assert!(intake.checklist.iter().all(|i| i.status == "todo"));

        for stage in &stages[1..] {
            assert_eq!(stage.status, StageStatus::NotStarted);
            assert_eq!(stage.assignee, "agent");
            assert!(stage.checklist.is_empty());
        }
    }

    #[test]
    fn test_stage_order_lookup() {
        assert_eq!(stage_order("intake"), Some(0));
        assert_eq!(stage_order("postclose"), Some(6));
        assert_eq!(stage_order("inspection"), None);
    }

    #[tokio::test]
    async fn test_seed_writes_seven_stages() {
        let store = Arc::new(MemoryStore::new());
        let seeder = StageSeeder::new(store.clone());

        let result = seeder.seed("d1", Utc::now()).await.unwrap();
        assert_eq!(result, SeedResult::Seeded { stages: 7 });

        let docs = store.query(&stages_of("d1"), None, None).await.unwrap();
        assert_eq!(docs.len(), 7);
    }

    #[tokio::test]
    async fn test_reseed_keeps_progress() {
        let store = Arc::new(MemoryStore::new());
        let seeder = StageSeeder::new(store.clone());
        seeder.seed("d1", Utc::now()).await.unwrap();

        let intake_path = stages_of("d1").doc("intake").unwrap();
        let mut intake: Stage = store.get(&intake_path).await.unwrap().decode().unwrap();
        intake.checklist[0].status = ITEM_DONE.to_string();
        store
            .set(&intake_path, to_fields(&intake).unwrap(), SetMode::Overwrite)
            .await
            .unwrap();

        let result = seeder.seed("d1", Utc::now()).await.unwrap();
        assert_eq!(result, SeedResult::AlreadySeeded);

        let reread: Stage = store.get(&intake_path).await.unwrap().decode().unwrap();
        assert_eq!(reread.checklist[0].status, ITEM_DONE);
    }
}
