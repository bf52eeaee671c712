//! Two-party conversations with database-backed unread counts.
//!
//! The database is authoritative for unread state. Socket events are
//! pushed only after the corresponding write has committed, and always
//! carry counts read back from the database rather than client deltas.

pub mod domain;
pub mod repository;

use std::sync::Arc;

use crate::db::models::{ConversationSummary, Message};
use crate::realtime::{Hub, ServerEvent};

pub use domain::{ChatError, Conversation, Participants};
pub use repository::{ChatRepository, Opened, SqliteChatRepository};

/// Coordinates the chat repository with realtime delivery.
pub struct ChatService {
    repo: Arc<dyn ChatRepository>,
    hub: Arc<Hub>,
}

/// Outcome of marking a conversation read.
#[derive(Debug, Clone, Copy)]
pub struct ReadReceipt {
    pub marked: usize,
    pub unread_total: i64,
}

impl ChatService {
    pub fn new(repo: Arc<dyn ChatRepository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    pub async fn open_conversation(
        &self,
        actor_id: &str,
        other_id: &str,
        listing_id: Option<&str>,
    ) -> Result<ConversationSummary, ChatError> {
        let opened = self.open(actor_id, other_id, listing_id).await?;
        self.repo
            .summary(&opened.conversation.id, actor_id)
            .await?
            .ok_or(ChatError::NotFound("Conversation"))
    }

    async fn open(
        &self,
        actor_id: &str,
        other_id: &str,
        listing_id: Option<&str>,
    ) -> Result<Opened, ChatError> {
        let participants = Participants::new(actor_id, other_id)?;
        if !self.repo.user_exists(other_id).await? {
            return Err(ChatError::NotFound("User"));
        }
        let opened = self.repo.open(&participants, listing_id).await?;
        if opened.created {
            tracing::info!(
                conversation_id = %opened.conversation.id,
                listing_id = ?listing_id,
                "Conversation started"
            );
        }
        Ok(opened)
    }

    pub async fn conversations(&self, actor_id: &str) -> Result<Vec<ConversationSummary>, ChatError> {
        self.repo.summaries(actor_id).await
    }

    /// Load a conversation, enforcing that the actor takes part in it.
    pub async fn conversation_for(
        &self,
        conversation_id: &str,
        actor_id: &str,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .repo
            .find(conversation_id)
            .await?
            .ok_or(ChatError::NotFound("Conversation"))?;
        if !conversation.participants.contains(actor_id) {
            return Err(ChatError::NotParticipant);
        }
        Ok(conversation)
    }

    pub async fn messages(
        &self,
        conversation_id: &str,
        actor_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        self.conversation_for(conversation_id, actor_id).await?;
        self.repo.messages(conversation_id).await
    }

    /// Send a message, creating the conversation on first contact, then push
    /// `newMessage` and the recipient's fresh unread count to their sockets.
    pub async fn send(
        &self,
        sender_id: &str,
        recipient_id: &str,
        text: &str,
        listing_id: Option<&str>,
    ) -> Result<Message, ChatError> {
        let text = domain::normalize_text(text)?;
        let opened = self.open(sender_id, recipient_id, listing_id).await?;
        let message = self
            .repo
            .append(&opened.conversation.id, sender_id, &text)
            .await?;

        let delivered = self
            .hub
            .send_to(recipient_id, ServerEvent::NewMessage(message.clone()))
            .await;
        if delivered > 0 {
            let count = self.repo.unread_count(recipient_id).await?;
            self.hub
                .send_to(recipient_id, ServerEvent::UnreadCount { count })
                .await;
        }
        tracing::debug!(conversation_id = %message.conversation_id, delivered, "Message sent");

        Ok(message)
    }

    /// Mark the other participant's messages read and push the reader's new
    /// total to their other sockets. The sender learns via `messagesRead`.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<ReadReceipt, ChatError> {
        let conversation = self.conversation_for(conversation_id, reader_id).await?;
        let marked = self.repo.mark_read(conversation_id, reader_id).await?;
        let unread_total = self.repo.unread_count(reader_id).await?;

        self.hub
            .send_to(reader_id, ServerEvent::UnreadCount { count: unread_total })
            .await;
        if marked > 0 {
            if let Some(other) = conversation.participants.other(reader_id) {
                self.hub
                    .send_to(
                        other,
                        ServerEvent::MessagesRead {
                            conversation_id: conversation_id.to_string(),
                            reader_id: reader_id.to_string(),
                        },
                    )
                    .await;
            }
        }

        Ok(ReadReceipt {
            marked,
            unread_total,
        })
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, ChatError> {
        self.repo.unread_count(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn service() -> (tempfile::TempDir, ChatService, Arc<Hub>) {
        let (tmp, pool) = crate::db::test_pool();
        {
            let conn = pool.get().unwrap();
            for (id, code) in [("landlord", "LANDLRD2"), ("tenant", "TENANT23"), ("other", "OTHER234")] {
                conn.execute(
                    "INSERT INTO users (id, name, email, password_hash, referral_code) VALUES (?1, ?1, ?2, 'x', ?3)",
                    params![id, format!("{id}@nyumba.test"), code],
                )
                .unwrap();
            }
        }
        let hub = Arc::new(Hub::new());
        let repo: Arc<dyn ChatRepository> = Arc::new(SqliteChatRepository::new(pool));
        (tmp, ChatService::new(repo, hub.clone()), hub)
    }

    #[tokio::test]
    async fn send_pushes_message_and_authoritative_count() {
        let (_tmp, chat, hub) = service();
        let (_, mut landlord_rx) = hub.connect("landlord").await;
        landlord_rx.recv().await.unwrap();

        chat.send("tenant", "landlord", "Hi", None).await.unwrap();
        chat.send("tenant", "landlord", "Still available?", None)
            .await
            .unwrap();

        let mut counts = Vec::new();
        while let Ok(event) = landlord_rx.try_recv() {
            if let ServerEvent::UnreadCount { count } = event {
                counts.push(count);
            }
        }
        assert_eq!(counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn mark_read_zeroes_count_and_notifies_sender() {
        let (_tmp, chat, hub) = service();
        let message = chat.send("tenant", "landlord", "Hi", None).await.unwrap();
        let (_, mut tenant_rx) = hub.connect("tenant").await;
        tenant_rx.recv().await.unwrap();

        let receipt = chat
            .mark_read(&message.conversation_id, "landlord")
            .await
            .unwrap();
        assert_eq!(receipt.marked, 1);
        assert_eq!(receipt.unread_total, 0);
        assert_eq!(chat.unread_count("landlord").await.unwrap(), 0);
        assert!(matches!(
            tenant_rx.recv().await.unwrap(),
            ServerEvent::MessagesRead { .. }
        ));
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_mark() {
        let (_tmp, chat, _hub) = service();
        let message = chat.send("tenant", "landlord", "Hi", None).await.unwrap();

        assert!(matches!(
            chat.messages(&message.conversation_id, "other").await,
            Err(ChatError::NotParticipant)
        ));
        assert!(matches!(
            chat.mark_read(&message.conversation_id, "other").await,
            Err(ChatError::NotParticipant)
        ));
    }

    #[tokio::test]
    async fn unknown_recipient_and_self_are_rejected() {
        let (_tmp, chat, _hub) = service();
        assert!(matches!(
            chat.send("tenant", "nobody", "Hi", None).await,
            Err(ChatError::NotFound("User"))
        ));
        assert!(matches!(
            chat.send("tenant", "tenant", "Hi", None).await,
            Err(ChatError::SelfConversation)
        ));
    }
}
