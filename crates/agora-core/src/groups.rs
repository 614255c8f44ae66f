use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use agora_db::Database;
use agora_types::models::{Conversation, ConversationKind};
use agora_types::time;

use crate::convert;
use crate::error::{CoreError, CoreResult};

/// Membership and privilege management for multi-party conversations.
///
/// Invariant: a group never drops to zero admins while it still has
/// participants — when the last admin departs, the next-oldest remaining
/// participant is auto-promoted.
#[derive(Clone)]
pub struct GroupAdministration {
    db: Arc<Database>,
}

impl GroupAdministration {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Adding someone else requires admin status; adding yourself (joining)
    /// does not.
    pub fn add_member(&self, conversation_id: Uuid, caller: Uuid, user_id: Uuid) -> CoreResult<()> {
        self.require_group(conversation_id)?;
        if caller != user_id {
            self.require_admin(conversation_id, caller)?;
        }
        if self.db.get_user_by_id(&user_id.to_string())?.is_none() {
            return Err(CoreError::BadRequest(format!("unknown user {}", user_id)));
        }

        let now = time::to_storage(Utc::now());
        self.db
            .add_participant(&conversation_id.to_string(), &user_id.to_string(), &now)?;
        Ok(())
    }

    pub fn remove_member(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        user_id: Uuid,
    ) -> CoreResult<()> {
        self.require_group(conversation_id)?;
        self.require_admin(conversation_id, caller)?;

        let removed = self
            .db
            .remove_participant(&conversation_id.to_string(), &user_id.to_string())?;
        if removed == 0 {
            return Err(CoreError::BadRequest("user is not a member".into()));
        }
        self.db
            .remove_admin(&conversation_id.to_string(), &user_id.to_string())?;

        self.restore_admin_continuity(conversation_id)?;
        Ok(())
    }

    /// Any participant may leave; no privilege required.
    pub fn leave_group(&self, conversation_id: Uuid, caller: Uuid) -> CoreResult<()> {
        self.require_group(conversation_id)?;

        let removed = self
            .db
            .remove_participant(&conversation_id.to_string(), &caller.to_string())?;
        if removed == 0 {
            return Err(CoreError::NotAParticipant);
        }
        self.db
            .remove_admin(&conversation_id.to_string(), &caller.to_string())?;

        self.restore_admin_continuity(conversation_id)?;
        Ok(())
    }

    pub fn promote_admin(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        user_id: Uuid,
    ) -> CoreResult<()> {
        self.require_group(conversation_id)?;
        self.require_admin(conversation_id, caller)?;

        if !self
            .db
            .is_participant(&conversation_id.to_string(), &user_id.to_string())?
        {
            return Err(CoreError::BadRequest("user is not a member".into()));
        }
        self.db
            .add_admin(&conversation_id.to_string(), &user_id.to_string())?;
        Ok(())
    }

    pub fn demote_admin(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        user_id: Uuid,
    ) -> CoreResult<()> {
        self.require_group(conversation_id)?;
        self.require_admin(conversation_id, caller)?;

        let admins = self.db.admins_of(&conversation_id.to_string())?;
        if !admins.contains(&user_id.to_string()) {
            return Err(CoreError::BadRequest("user is not an admin".into()));
        }

        if admins.len() == 1 {
            // Demoting the only admin: hand the role to the next-oldest
            // other participant, or reject when nobody can take over.
            match self.next_admin_candidate(conversation_id, Some(user_id))? {
                Some(successor) => {
                    self.db
                        .add_admin(&conversation_id.to_string(), &successor.to_string())?;
                    info!(
                        "Auto-promoted {} to admin of {} after demotion of {}",
                        successor, conversation_id, user_id
                    );
                }
                None => {
                    return Err(CoreError::BadRequest(
                        "cannot demote the only admin of a conversation with no other members"
                            .into(),
                    ));
                }
            }
        }

        self.db
            .remove_admin(&conversation_id.to_string(), &user_id.to_string())?;
        Ok(())
    }

    pub fn update_group_metadata(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        name: Option<&str>,
        image_url: Option<&str>,
    ) -> CoreResult<()> {
        self.require_group(conversation_id)?;
        self.require_admin(conversation_id, caller)?;

        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::BadRequest("group name cannot be empty".into()));
            }
            if name.len() > 255 {
                return Err(CoreError::BadRequest("group name too long (max 255)".into()));
            }
        }

        self.db
            .update_group_metadata(&conversation_id.to_string(), name, image_url)?;
        Ok(())
    }

    pub fn admins_of(&self, conversation_id: Uuid) -> CoreResult<Vec<Uuid>> {
        let admins = self.db.admins_of(&conversation_id.to_string())?;
        admins
            .iter()
            .map(|id| convert::parse_uuid(id, "admin user id"))
            .collect()
    }

    fn require_group(&self, conversation_id: Uuid) -> CoreResult<Conversation> {
        let row = self
            .db
            .get_conversation(&conversation_id.to_string())?
            .ok_or(CoreError::ConversationNotFound)?;
        let conversation = convert::conversation_from_row(&row)?;
        if conversation.kind == ConversationKind::Direct {
            return Err(CoreError::BadRequest(
                "not a group or channel conversation".into(),
            ));
        }
        Ok(conversation)
    }

    fn require_admin(&self, conversation_id: Uuid, caller: Uuid) -> CoreResult<()> {
        if self
            .db
            .is_admin(&conversation_id.to_string(), &caller.to_string())?
        {
            Ok(())
        } else {
            Err(CoreError::NotAuthorized)
        }
    }

    /// Next-oldest participant by (joined_at, user_id), optionally skipping
    /// one user.
    fn next_admin_candidate(
        &self,
        conversation_id: Uuid,
        exclude: Option<Uuid>,
    ) -> CoreResult<Option<Uuid>> {
        let participants = self.db.participants_of(&conversation_id.to_string())?;
        for participant in &participants {
            let user_id = convert::parse_uuid(&participant.user_id, "participant user")?;
            if Some(user_id) == exclude {
                continue;
            }
            return Ok(Some(user_id));
        }
        Ok(None)
    }

    /// After a departure: if no admins remain but participants do, promote
    /// exactly one — the next-oldest remaining participant. An emptied
    /// conversation needs no promotion.
    fn restore_admin_continuity(&self, conversation_id: Uuid) -> CoreResult<()> {
        if !self.db.admins_of(&conversation_id.to_string())?.is_empty() {
            return Ok(());
        }
        if let Some(successor) = self.next_admin_candidate(conversation_id, None)? {
            self.db
                .add_admin(&conversation_id.to_string(), &successor.to_string())?;
            info!(
                "Auto-promoted {} to admin of {}",
                successor, conversation_id
            );
        }
        Ok(())
    }
}
