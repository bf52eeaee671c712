// Repository pattern - all conversation/message persistence lives here
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::domain::{ChatError, Conversation, Participants};
use crate::db::models::{ConversationSummary, Message};
use crate::listings;
use crate::state::DbPool;
use crate::users;

/// Result of opening a conversation.
#[derive(Debug, Clone)]
pub struct Opened {
    pub conversation: Conversation,
    pub created: bool,
    /// True the first time this conversation is about the listing; counts
    /// as an inquiry on it.
    pub new_inquiry: bool,
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Find the conversation for a pair of users, creating it on first contact.
    async fn open(
        &self,
        participants: &Participants,
        listing_id: Option<&str>,
    ) -> Result<Opened, ChatError>;

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, ChatError>;

    /// Conversations involving `user_id`, most recent activity first.
    async fn summaries(&self, user_id: &str) -> Result<Vec<ConversationSummary>, ChatError>;

    async fn summary(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<Option<ConversationSummary>, ChatError>;

    /// Messages oldest first.
    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, ChatError>;

    async fn append(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Message, ChatError>;

    /// Mark messages from the other participant read. Returns rows changed.
    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize, ChatError>;

    /// Total unread messages addressed to `user_id` across all conversations.
    async fn unread_count(&self, user_id: &str) -> Result<i64, ChatError>;

    async fn user_exists(&self, user_id: &str) -> Result<bool, ChatError>;
}

/// SQLite implementation
pub struct SqliteChatRepository {
    pool: DbPool,
}

impl SqliteChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, is_read, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let low: String = row.get(1)?;
    let high: String = row.get(2)?;
    let participants = Participants::new(&low, &high).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Conversation {
        id: row.get(0)?,
        participants,
        listing_id: row.get(3)?,
    })
}

fn find_by_pair(conn: &Connection, p: &Participants) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, user_a, user_b, listing_id FROM conversations WHERE user_a = ?1 AND user_b = ?2",
        params![p.low(), p.high()],
        conversation_from_row,
    )
    .optional()
}

fn build_summaries(
    conn: &Connection,
    viewer_id: &str,
    only: Option<&str>,
) -> Result<Vec<ConversationSummary>, ChatError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.listing_id, c.updated_at,
                CASE WHEN c.user_a = ?1 THEN c.user_b ELSE c.user_a END,
                (SELECT COUNT(*) FROM messages m
                  WHERE m.conversation_id = c.id AND m.sender_id != ?1 AND m.is_read = 0)
         FROM conversations c
         WHERE (c.user_a = ?1 OR c.user_b = ?1) AND (?2 IS NULL OR c.id = ?2)
         ORDER BY c.updated_at DESC, c.rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![viewer_id, only], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut summaries = Vec::with_capacity(rows.len());
    for (id, listing_id, updated_at, other_id, unread_count) in rows {
        let participant = users::find_by_id(conn, &other_id)?
            .ok_or(ChatError::NotFound("User"))?
            .public();
        let last_message = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![id],
                message_from_row,
            )
            .optional()?;
        summaries.push(ConversationSummary {
            id,
            participant,
            listing_id,
            last_message,
            unread_count,
            updated_at,
        });
    }
    Ok(summaries)
}

#[async_trait]
impl ChatRepository for SqliteChatRepository {
    async fn open(
        &self,
        participants: &Participants,
        listing_id: Option<&str>,
    ) -> Result<Opened, ChatError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        if let Some(listing_id) = listing_id {
            let exists: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM listings WHERE id = ?1",
                params![listing_id],
                |r| r.get(0),
            )?;
            if !exists {
                return Err(ChatError::NotFound("Listing"));
            }
        }

        let created = tx.execute(
            "INSERT OR IGNORE INTO conversations (id, user_a, user_b, listing_id) VALUES (?1, ?2, ?3, ?4)",
            params![crate::db::new_id(), participants.low(), participants.high(), listing_id],
        )? == 1;

        let mut conversation =
            find_by_pair(&tx, participants)?.ok_or(ChatError::NotFound("Conversation"))?;

        let mut new_inquiry = false;
        if let Some(listing_id) = listing_id {
            if conversation.listing_id.as_deref() != Some(listing_id) {
                tx.execute(
                    "UPDATE conversations SET listing_id = ?2 WHERE id = ?1",
                    params![conversation.id, listing_id],
                )?;
                conversation.listing_id = Some(listing_id.to_string());
            }
            new_inquiry = tx.execute(
                "INSERT OR IGNORE INTO conversation_inquiries (conversation_id, listing_id) VALUES (?1, ?2)",
                params![conversation.id, listing_id],
            )? == 1;
            if new_inquiry {
                listings::record_inquiry(&tx, listing_id)?;
            }
        }

        tx.commit()?;
        Ok(Opened {
            conversation,
            created,
            new_inquiry,
        })
    }

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, ChatError> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row(
                "SELECT id, user_a, user_b, listing_id FROM conversations WHERE id = ?1",
                params![conversation_id],
                conversation_from_row,
            )
            .optional()?)
    }

    async fn summaries(&self, user_id: &str) -> Result<Vec<ConversationSummary>, ChatError> {
        let conn = self.pool.get()?;
        build_summaries(&conn, user_id, None)
    }

    async fn summary(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<Option<ConversationSummary>, ChatError> {
        let conn = self.pool.get()?;
        Ok(build_summaries(&conn, viewer_id, Some(conversation_id))?
            .into_iter()
            .next())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, ChatError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let messages = stmt
            .query_map(params![conversation_id], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    async fn append(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Message, ChatError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let id = crate::db::new_id();
        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, body) VALUES (?1, ?2, ?3, ?4)",
            params![id, conversation_id, sender_id, text],
        )?;
        let message = tx.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![id],
            message_from_row,
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, message.created_at],
        )?;
        tx.commit()?;
        Ok(message)
    }

    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize, ChatError> {
        let conn = self.pool.get()?;
        Ok(conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
            params![conversation_id, reader_id],
        )?)
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, ChatError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE (c.user_a = ?1 OR c.user_b = ?1) AND m.sender_id != ?1 AND m.is_read = 0",
            params![user_id],
            |r| r.get(0),
        )?)
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, ChatError> {
        let conn = self.pool.get()?;
        Ok(users::find_by_id(&conn, user_id)?.is_some())
    }
}
