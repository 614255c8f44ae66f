use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            display_name    TEXT,
            avatar_url      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS contacts (
            user_id     TEXT NOT NULL REFERENCES users(id),
            contact_id  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, contact_id)
        );

        CREATE TABLE IF NOT EXISTS key_pairs (
            owner_id         TEXT PRIMARY KEY REFERENCES users(id),
            public_key_pem   TEXT NOT NULL,
            private_key_pem  TEXT NOT NULL,
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id               TEXT PRIMARY KEY,
            kind             TEXT NOT NULL CHECK (kind IN ('direct','group','channel')),
            created_by       TEXT NOT NULL REFERENCES users(id),
            -- Sorted 'min:max' user-id pair for direct conversations; the
            -- UNIQUE constraint is the duplicate-direct race guard.
            direct_key       TEXT UNIQUE,
            group_name       TEXT,
            group_image_url  TEXT,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS participants (
            conversation_id      TEXT NOT NULL REFERENCES conversations(id),
            user_id              TEXT NOT NULL REFERENCES users(id),
            joined_at            TEXT NOT NULL,
            is_message_request   INTEGER NOT NULL DEFAULT 0,
            request_declined_at  TEXT,
            last_read_at         TEXT,
            UNIQUE(conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES conversations(id),
            sender_id        TEXT NOT NULL REFERENCES users(id),
            scheme           TEXT NOT NULL CHECK (scheme IN ('direct','group')),
            ciphertext       BLOB NOT NULL,
            nonce            BLOB NOT NULL,
            -- JSON object: user_id -> base64 OAEP-wrapped message key
            wrapped_keys     TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL,
            edited_at        TEXT,
            deleted_at       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at, id);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS group_admins (
            conversation_id  TEXT NOT NULL REFERENCES conversations(id),
            user_id          TEXT NOT NULL REFERENCES users(id),
            UNIQUE(conversation_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
