use crate::Database;
use crate::models::{
    ConversationRow, KeyPairRow, MessageRow, ParticipantRow, ReactionChange, ReactionRow, UserRow,
};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name) VALUES (?1, ?2, ?3, ?4)",
                params![id, username, password_hash, display_name],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Contacts --

    pub fn are_contacts(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT 1 FROM contacts WHERE user_id = ?1 AND contact_id = ?2",
                    params![user_id, other_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    /// Establish the contact relation in both directions.
    pub fn add_mutual_contacts(&self, a: &str, b: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO contacts (user_id, contact_id) VALUES (?1, ?2), (?2, ?1)",
                params![a, b],
            )?;
            Ok(())
        })
    }

    // -- Key pairs --

    /// Returns true when the pair was inserted, false when the owner
    /// already had one (generation is idempotent; first writer wins).
    pub fn insert_key_pair_if_absent(
        &self,
        owner_id: &str,
        public_key_pem: &str,
        private_key_pem: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO key_pairs (owner_id, public_key_pem, private_key_pem)
                 VALUES (?1, ?2, ?3)",
                params![owner_id, public_key_pem, private_key_pem],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_key_pair(&self, owner_id: &str) -> Result<Option<KeyPairRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT owner_id, public_key_pem, private_key_pem FROM key_pairs WHERE owner_id = ?1",
                    [owner_id],
                    |row| {
                        Ok(KeyPairRow {
                            owner_id: row.get(0)?,
                            public_key_pem: row.get(1)?,
                            private_key_pem: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Conversations --

    /// Insert a direct conversation guarded by the UNIQUE(direct_key)
    /// constraint. A concurrent insert for the same pair is absorbed: the
    /// earliest row wins and its id is returned; the loser's participant
    /// rows are never written. Returns (winning id, created).
    pub fn create_direct_conversation(
        &self,
        id: &str,
        creator_id: &str,
        peer_id: &str,
        direct_key: &str,
        peer_is_request: bool,
        now: &str,
    ) -> Result<(String, bool)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations (id, kind, created_by, direct_key, created_at)
                 VALUES (?1, 'direct', ?2, ?3, ?4)",
                params![id, creator_id, direct_key, now],
            )?;

            let winner: String = tx.query_row(
                "SELECT id FROM conversations WHERE direct_key = ?1",
                [direct_key],
                |row| row.get(0),
            )?;

            let created = inserted == 1 && winner == id;
            if created {
                tx.execute(
                    "INSERT INTO participants (conversation_id, user_id, joined_at, is_message_request)
                     VALUES (?1, ?2, ?3, 0), (?1, ?4, ?3, ?5)",
                    params![id, creator_id, now, peer_id, peer_is_request],
                )?;
            }

            tx.commit()?;
            Ok((winner, created))
        })
    }

    /// Conversation + participants + creator-as-sole-admin, atomically.
    pub fn create_group_conversation(
        &self,
        id: &str,
        kind: &str,
        creator_id: &str,
        name: &str,
        image_url: Option<&str>,
        member_ids: &[String],
        now: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO conversations (id, kind, created_by, group_name, group_image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, kind, creator_id, name, image_url, now],
            )?;

            tx.execute(
                "INSERT INTO participants (conversation_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![id, creator_id, now],
            )?;
            for member_id in member_ids {
                if member_id == creator_id {
                    continue;
                }
                tx.execute(
                    "INSERT OR IGNORE INTO participants (conversation_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, member_id, now],
                )?;
            }

            tx.execute(
                "INSERT INTO group_admins (conversation_id, user_id) VALUES (?1, ?2)",
                params![id, creator_id],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, kind, created_by, direct_key, group_name, group_image_url, created_at
                     FROM conversations WHERE id = ?1",
                    [id],
                    map_conversation,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Inbox listing: conversations where the user participates and is not
    /// gated behind a pending message request.
    pub fn conversations_for(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.created_by, c.direct_key, c.group_name, c.group_image_url, c.created_at
                 FROM conversations c
                 JOIN participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1 AND p.is_message_request = 0
                 ORDER BY c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Requests view: pending (and transiently declined) direct
    /// conversations awaiting this user's decision.
    pub fn requests_for(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.created_by, c.direct_key, c.group_name, c.group_image_url, c.created_at
                 FROM conversations c
                 JOIN participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1 AND p.is_message_request = 1
                 ORDER BY c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Irrevocably remove a conversation with its messages, reactions,
    /// participants and admin rows.
    pub fn purge_conversation(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM reactions WHERE message_id IN
                   (SELECT id FROM messages WHERE conversation_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
            tx.execute("DELETE FROM participants WHERE conversation_id = ?1", [id])?;
            tx.execute("DELETE FROM group_admins WHERE conversation_id = ?1", [id])?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Participants --

    pub fn participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT conversation_id, user_id, joined_at, is_message_request,
                            request_declined_at, last_read_at
                     FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
                    params![conversation_id, user_id],
                    map_participant,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Ordered by join time (user id as tie-break) — the auto-promotion
    /// order for admin continuity.
    pub fn participants_of(&self, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, user_id, joined_at, is_message_request,
                        request_declined_at, last_read_at
                 FROM participants WHERE conversation_id = ?1
                 ORDER BY joined_at ASC, user_id ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], map_participant)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.participant(conversation_id, user_id)?.is_some())
    }

    pub fn add_participant(&self, conversation_id: &str, user_id: &str, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO participants (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![conversation_id, user_id, now],
            )?;
            Ok(())
        })
    }

    pub fn remove_participant(&self, conversation_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;
            Ok(removed)
        })
    }

    pub fn accept_request(&self, conversation_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE participants SET is_message_request = 0, request_declined_at = NULL
                 WHERE conversation_id = ?1 AND user_id = ?2 AND is_message_request = 1",
                params![conversation_id, user_id],
            )?;
            Ok(updated)
        })
    }

    pub fn decline_request(&self, conversation_id: &str, user_id: &str, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE participants SET request_declined_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2 AND is_message_request = 1",
                params![conversation_id, user_id, now],
            )?;
            Ok(updated)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, scheme, ciphertext, nonce,
                                       wrapped_keys, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.id,
                    row.conversation_id,
                    row.sender_id,
                    row.scheme,
                    row.ciphertext,
                    row.nonce,
                    row.wrapped_keys,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, conversation_id, sender_id, scheme, ciphertext, nonce,
                            wrapped_keys, created_at, edited_at, deleted_at
                     FROM messages WHERE id = ?1",
                    [id],
                    map_message,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Keyset page over the total (created_at, id) order. Tombstoned rows
    /// are retained in the table but hidden from normal display.
    pub fn messages_page(
        &self,
        conversation_id: &str,
        after: Option<(&str, &str)>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, scheme, ciphertext, nonce,
                        wrapped_keys, created_at, edited_at, deleted_at
                 FROM messages
                 WHERE conversation_id = ?1
                   AND deleted_at IS NULL
                   AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?4",
            )?;
            let (cursor_created, cursor_id) = after.unwrap_or(("", ""));
            let rows = stmt
                .query_map(
                    params![conversation_id, cursor_created, cursor_id, limit],
                    map_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn soft_delete_message(&self, id: &str, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now],
            )?;
            Ok(updated)
        })
    }

    // -- Reactions --

    /// Toggle against the one-row-per-(message, user) constraint: the same
    /// emoji removes the row, a different emoji replaces it.
    pub fn toggle_reaction(
        &self,
        id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        now: &str,
    ) -> Result<ReactionChange> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT id, emoji FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                    params![message_id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let change = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, message_id, user_id, emoji, now],
                    )?;
                    ReactionChange::Added
                }
                Some((existing_id, existing_emoji)) if existing_emoji == emoji => {
                    tx.execute("DELETE FROM reactions WHERE id = ?1", [&existing_id])?;
                    ReactionChange::Removed
                }
                Some((existing_id, existing_emoji)) => {
                    tx.execute(
                        "UPDATE reactions SET emoji = ?2, created_at = ?3 WHERE id = ?1",
                        params![existing_id, emoji, now],
                    )?;
                    ReactionChange::Replaced {
                        previous: existing_emoji,
                    }
                }
            };

            tx.commit()?;
            Ok(change)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, user_id, emoji, created_at FROM reactions
                 WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bindings: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(bindings.as_slice(), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        user_id: row.get(2)?,
                        emoji: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Read cursors --

    /// Monotonic: a later read position never regresses the stored cursor.
    pub fn mark_read(&self, conversation_id: &str, user_id: &str, up_to: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE participants SET last_read_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2
                   AND (last_read_at IS NULL OR last_read_at < ?3)",
                params![conversation_id, user_id, up_to],
            )?;
            Ok(updated)
        })
    }

    pub fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = ?1
                   AND m.sender_id != ?2
                   AND m.deleted_at IS NULL
                   AND m.created_at > COALESCE(
                        (SELECT p.last_read_at FROM participants p
                         WHERE p.conversation_id = ?1 AND p.user_id = ?2), '')",
                params![conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Group admins --

    pub fn admins_of(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT user_id FROM group_admins WHERE conversation_id = ?1 ORDER BY user_id")?;
            let rows = stmt
                .query_map([conversation_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_admin(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT 1 FROM group_admins WHERE conversation_id = ?1 AND user_id = ?2",
                    params![conversation_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    pub fn add_admin(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO group_admins (conversation_id, user_id) VALUES (?1, ?2)",
                params![conversation_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn remove_admin(&self, conversation_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM group_admins WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;
            Ok(removed)
        })
    }

    pub fn update_group_metadata(
        &self,
        conversation_id: &str,
        name: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE conversations
                 SET group_name = COALESCE(?2, group_name),
                     group_image_url = COALESCE(?3, group_image_url)
                 WHERE id = ?1",
                params![conversation_id, name, image_url],
            )?;
            Ok(updated)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a compile-time constant ("id" / "username"), never user input.
    let sql = format!(
        "SELECT id, username, password, display_name, avatar_url, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                avatar_url: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        created_by: row.get(2)?,
        direct_key: row.get(3)?,
        group_name: row.get(4)?,
        group_image_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        conversation_id: row.get(0)?,
        user_id: row.get(1)?,
        joined_at: row.get(2)?,
        is_message_request: row.get(3)?,
        request_declined_at: row.get(4)?,
        last_read_at: row.get(5)?,
    })
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        scheme: row.get(3)?,
        ciphertext: row.get(4)?,
        nonce: row.get(5)?,
        wrapped_keys: row.get(6)?,
        created_at: row.get(7)?,
        edited_at: row.get(8)?,
        deleted_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(users: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for (i, id) in users.iter().enumerate() {
            db.create_user(id, &format!("user{}", i), "hash", None).unwrap();
        }
        db
    }

    #[test]
    fn direct_conversation_race_is_absorbed() {
        let db = db_with_users(&["a", "b"]);

        let (winner, created) = db
            .create_direct_conversation("conv-1", "a", "b", "a:b", false, "2026-01-01 00:00:00.000001")
            .unwrap();
        assert!(created);
        assert_eq!(winner, "conv-1");

        // Second insert for the same unordered pair loses and is absorbed.
        let (winner2, created2) = db
            .create_direct_conversation("conv-2", "b", "a", "a:b", false, "2026-01-01 00:00:00.000002")
            .unwrap();
        assert!(!created2);
        assert_eq!(winner2, "conv-1");

        // The loser's participant rows were never written.
        assert!(db.get_conversation("conv-2").unwrap().is_none());
        assert_eq!(db.participants_of("conv-1").unwrap().len(), 2);
    }

    #[test]
    fn reaction_toggle_transitions() {
        let db = db_with_users(&["a", "b"]);
        db.create_direct_conversation("c", "a", "b", "a:b", false, "2026-01-01 00:00:00.000001")
            .unwrap();
        db.insert_message(&MessageRow {
            id: "m".into(),
            conversation_id: "c".into(),
            sender_id: "a".into(),
            scheme: "direct".into(),
            ciphertext: vec![1],
            nonce: vec![],
            wrapped_keys: "{}".into(),
            created_at: "2026-01-01 00:00:01.000000".into(),
            edited_at: None,
            deleted_at: None,
        })
        .unwrap();

        let t = |n: &str| format!("2026-01-01 00:00:02.00000{}", n);
        assert_eq!(
            db.toggle_reaction("r1", "m", "b", "👍", &t("1")).unwrap(),
            ReactionChange::Added
        );
        assert_eq!(
            db.toggle_reaction("r2", "m", "b", "👍", &t("2")).unwrap(),
            ReactionChange::Removed
        );
        assert_eq!(
            db.toggle_reaction("r3", "m", "b", "👍", &t("3")).unwrap(),
            ReactionChange::Added
        );
        assert_eq!(
            db.toggle_reaction("r4", "m", "b", "❤️", &t("4")).unwrap(),
            ReactionChange::Replaced {
                previous: "👍".into()
            }
        );

        let rows = db.reactions_for_messages(&["m".into()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].emoji, "❤️");
    }

    #[test]
    fn read_cursor_is_monotonic() {
        let db = db_with_users(&["a", "b"]);
        db.create_direct_conversation("c", "a", "b", "a:b", false, "2026-01-01 00:00:00.000001")
            .unwrap();

        assert_eq!(db.mark_read("c", "b", "2026-01-01 00:10:00.000000").unwrap(), 1);
        // Regressing position is a no-op
        assert_eq!(db.mark_read("c", "b", "2026-01-01 00:05:00.000000").unwrap(), 0);
        // Advancing works
        assert_eq!(db.mark_read("c", "b", "2026-01-01 00:20:00.000000").unwrap(), 1);
    }

    #[test]
    fn messages_page_is_keyset_ordered() {
        let db = db_with_users(&["a", "b"]);
        db.create_direct_conversation("c", "a", "b", "a:b", false, "2026-01-01 00:00:00.000001")
            .unwrap();

        for (id, ts) in [
            ("m2", "2026-01-01 00:00:02.000000"),
            ("m1", "2026-01-01 00:00:01.000000"),
            ("m3", "2026-01-01 00:00:03.000000"),
        ] {
            db.insert_message(&MessageRow {
                id: id.into(),
                conversation_id: "c".into(),
                sender_id: "a".into(),
                scheme: "direct".into(),
                ciphertext: vec![1],
                nonce: vec![],
                wrapped_keys: "{}".into(),
                created_at: ts.into(),
                edited_at: None,
                deleted_at: None,
            })
            .unwrap();
        }

        let page = db.messages_page("c", None, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "m1");
        assert_eq!(page[1].id, "m2");

        let rest = db
            .messages_page("c", Some((&page[1].created_at, &page[1].id)), 10)
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "m3");
    }
}
