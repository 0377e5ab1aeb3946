//! Deal access policy
//!
//! Admins, the creator and the client have direct access to a deal.
//! Participants linked by uid may view it, manage participants and attach
//! documents, but may not update stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::models::Deal;
use super::repository::DealRepository;
use crate::types::{DealError, Result};

pub const ADMIN_ROLE: &str = "admin";

/// Verified caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub uid: String,
    #[serde(default)]
    pub role: String,
}

impl UserContext {
    pub fn new(uid: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealAction {
    View,
    ManageParticipants,
    AttachDocument,
    UpdateStages,
}

impl DealAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealAction::View => "view",
            DealAction::ManageParticipants => "manage participants of",
            DealAction::AttachDocument => "attach documents to",
            DealAction::UpdateStages => "update stages of",
        }
    }

    /// Whether a participant who is not creator or client may do this
    fn allows_participants(&self) -> bool {
        !matches!(self, DealAction::UpdateStages)
    }
}

impl fmt::Display for DealAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin, creator or client
pub fn has_direct_access(deal: &Deal, user: &UserContext) -> bool {
    if user.is_admin() {
        return true;
    }
    let uid = user.uid.trim();
    !uid.is_empty() && (deal.creator_uid == uid || deal.client_uid.as_deref() == Some(uid))
}

pub struct AccessPolicy {
    repo: Arc<DealRepository>,
}

impl AccessPolicy {
    pub fn new(repo: Arc<DealRepository>) -> Self {
        Self { repo }
    }

    /// Live participant lookup. A failed lookup counts as "not a participant".
    async fn is_participant(&self, deal: &Deal, user: &UserContext) -> bool {
        match self.repo.is_participant(&deal.id, &user.uid).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "Participant check for {} on deal {} failed: {}",
                    user.uid, deal.id, e
                );
                false
            }
        }
    }

    pub async fn can(&self, deal: &Deal, user: &UserContext, action: DealAction) -> bool {
        if has_direct_access(deal, user) {
            return true;
        }
        action.allows_participants() && self.is_participant(deal, user).await
    }

    pub async fn can_view(&self, deal: &Deal, user: &UserContext) -> bool {
        self.can(deal, user, DealAction::View).await
    }

    pub async fn can_manage_participants(&self, deal: &Deal, user: &UserContext) -> bool {
        self.can(deal, user, DealAction::ManageParticipants).await
    }

    pub async fn can_attach_document(&self, deal: &Deal, user: &UserContext) -> bool {
        self.can(deal, user, DealAction::AttachDocument).await
    }

    pub fn can_update_stages(&self, deal: &Deal, user: &UserContext) -> bool {
        has_direct_access(deal, user)
    }

    /// `PermissionDenied` unless `user` may perform `action` on `deal`
    pub async fn authorize(
        &self,
        deal: &Deal,
        user: &UserContext,
        action: DealAction,
    ) -> Result<()> {
        if self.can(deal, user, action).await {
            return Ok(());
        }
        Err(DealError::PermissionDenied(format!(
            "not allowed to {} deal {}",
            action, deal.id
        )))
    }
}
