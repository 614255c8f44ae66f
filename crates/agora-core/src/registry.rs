use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use agora_db::Database;
use agora_types::models::{Conversation, ConversationKind, Participant, Profile};
use agora_types::time;

use crate::convert;
use crate::error::{CoreError, CoreResult};

/// Canonical conversation/participant state: get-or-create semantics for
/// direct conversations and the message-request gate.
#[derive(Clone)]
pub struct ConversationRegistry {
    db: Arc<Database>,
}

impl ConversationRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns the existing direct conversation for the unordered pair or
    /// creates one. Atomic with respect to concurrent calls for the same
    /// pair: the UNIQUE(direct_key) constraint makes the earliest row win
    /// and the loser's insert is absorbed, never surfaced.
    pub fn get_or_create_direct(&self, caller: Uuid, peer: Uuid) -> CoreResult<Conversation> {
        if caller == peer {
            return Err(CoreError::BadRequest(
                "cannot open a direct conversation with yourself".into(),
            ));
        }
        if self.db.get_user_by_id(&peer.to_string())?.is_none() {
            return Err(CoreError::BadRequest(format!("unknown user {}", peer)));
        }

        // Initiation from a non-contact lands in the recipient's requests
        // view instead of the main inbox.
        let established = self
            .db
            .are_contacts(&peer.to_string(), &caller.to_string())?;

        let id = Uuid::new_v4();
        let now = time::to_storage(Utc::now());
        let (winner, created) = self.db.create_direct_conversation(
            &id.to_string(),
            &caller.to_string(),
            &peer.to_string(),
            &direct_key(caller, peer),
            !established,
            &now,
        )?;

        if created {
            info!("Created direct conversation {} for ({}, {})", winner, caller, peer);
        }

        self.conversation(convert::parse_uuid(&winner, "conversation id")?)
    }

    /// Conversation + members + creator-as-sole-admin, atomically. Covers
    /// both `group` and `channel` kinds.
    pub fn create_group(
        &self,
        creator: Uuid,
        name: &str,
        member_ids: &[Uuid],
        image_url: Option<&str>,
        kind: ConversationKind,
    ) -> CoreResult<Conversation> {
        if kind == ConversationKind::Direct {
            return Err(CoreError::BadRequest(
                "direct conversations are created via get_or_create_direct".into(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::BadRequest("group name cannot be empty".into()));
        }
        if name.len() > 255 {
            return Err(CoreError::BadRequest("group name too long (max 255)".into()));
        }

        let id = Uuid::new_v4();
        let now = time::to_storage(Utc::now());
        let members: Vec<String> = member_ids.iter().map(|m| m.to_string()).collect();
        self.db.create_group_conversation(
            &id.to_string(),
            kind.as_str(),
            &creator.to_string(),
            name,
            image_url,
            &members,
            &now,
        )?;

        info!("Created {} conversation {} ({})", kind.as_str(), id, name);
        self.conversation(id)
    }

    pub fn conversation(&self, id: Uuid) -> CoreResult<Conversation> {
        let row = self
            .db
            .get_conversation(&id.to_string())?
            .ok_or(CoreError::ConversationNotFound)?;
        convert::conversation_from_row(&row)
    }

    pub fn ensure_participant(&self, conversation_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        if self
            .db
            .is_participant(&conversation_id.to_string(), &user_id.to_string())?
        {
            Ok(())
        } else {
            Err(CoreError::NotAParticipant)
        }
    }

    pub fn participants_of(&self, conversation_id: Uuid) -> CoreResult<Vec<Participant>> {
        let rows = self.db.participants_of(&conversation_id.to_string())?;
        rows.iter().map(convert::participant_from_row).collect()
    }

    /// Main inbox: excludes conversations still gated as message requests.
    pub fn conversations_for(&self, user_id: Uuid) -> CoreResult<Vec<Conversation>> {
        let rows = self.db.conversations_for(&user_id.to_string())?;
        rows.iter().map(convert::conversation_from_row).collect()
    }

    /// Requests view: pending direct conversations awaiting a decision.
    pub fn requests_for(&self, user_id: Uuid) -> CoreResult<Vec<Conversation>> {
        let rows = self.db.requests_for(&user_id.to_string())?;
        rows.iter().map(convert::conversation_from_row).collect()
    }

    /// Accepting moves the conversation into the inbox and establishes the
    /// contact relation in both directions, so the next conversation
    /// between the pair skips the request gate.
    pub fn accept_request(&self, conversation_id: Uuid, caller: Uuid) -> CoreResult<()> {
        self.conversation(conversation_id)?;
        let updated = self
            .db
            .accept_request(&conversation_id.to_string(), &caller.to_string())?;
        if updated == 0 {
            return Err(CoreError::BadRequest(
                "no pending message request for this user".into(),
            ));
        }

        if let Some(peer) = self.peer_of(conversation_id, caller)? {
            self.db
                .add_mutual_contacts(&caller.to_string(), &peer.to_string())?;
        }
        Ok(())
    }

    /// Declining marks the request but preserves history so a UI can show
    /// a transient declined state before the purge.
    pub fn decline_request(&self, conversation_id: Uuid, caller: Uuid) -> CoreResult<()> {
        self.conversation(conversation_id)?;
        let now = time::to_storage(Utc::now());
        let updated =
            self.db
                .decline_request(&conversation_id.to_string(), &caller.to_string(), &now)?;
        if updated == 0 {
            return Err(CoreError::BadRequest(
                "no pending message request for this user".into(),
            ));
        }
        Ok(())
    }

    /// Removes the conversation and its messages entirely. Irrevocable.
    pub fn delete_request(&self, conversation_id: Uuid, caller: Uuid) -> CoreResult<()> {
        self.conversation(conversation_id)?;
        let participant = self
            .db
            .participant(&conversation_id.to_string(), &caller.to_string())?
            .ok_or(CoreError::NotAParticipant)?;
        if !participant.is_message_request {
            return Err(CoreError::BadRequest(
                "conversation is not a message request for this user".into(),
            ));
        }

        self.db.purge_conversation(&conversation_id.to_string())?;
        info!("Purged message request conversation {}", conversation_id);
        Ok(())
    }

    /// Read-only profile projection for rendering.
    pub fn profile_of(&self, user_id: Uuid) -> CoreResult<Option<Profile>> {
        let Some(user) = self.db.get_user_by_id(&user_id.to_string())? else {
            return Ok(None);
        };
        Ok(Some(Profile {
            user_id,
            display_name: user.display_name.unwrap_or(user.username),
            avatar_url: user.avatar_url,
        }))
    }

    fn peer_of(&self, conversation_id: Uuid, user_id: Uuid) -> CoreResult<Option<Uuid>> {
        let participants = self.participants_of(conversation_id)?;
        Ok(participants
            .into_iter()
            .map(|p| p.user_id)
            .find(|id| *id != user_id))
    }
}

/// Canonical storage key for the unordered user pair of a direct
/// conversation.
fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}
