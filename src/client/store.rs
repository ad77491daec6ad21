use crate::models::chat::{Conversation, Message};
use log::{debug, info};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("conversation store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no conversation with id {0}")]
    UnknownConversation(String),
    #[error("no message with id {0}")]
    UnknownMessage(String),
}

/// Durable slot holding the whole conversation list.
pub trait ConversationStore: Send {
    fn load(&self) -> Result<Vec<Conversation>, StoreError>;
    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Conversation>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No saved chats at {}, starting fresh", self.path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(conversations)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Saved {} conversation(s) to {}", conversations.len(), self.path.display());
        Ok(())
    }
}

/// In-memory conversation list mirrored to a [`ConversationStore`] after every
/// mutation.
pub struct ChatSession<S: ConversationStore> {
    store: S,
    conversations: Vec<Conversation>,
    current_id: Option<String>,
    typing: bool,
}

impl<S: ConversationStore> ChatSession<S> {
    /// Restores saved conversations and makes the first one active.
    pub fn open(store: S) -> Result<Self, StoreError> {
        let conversations = store.load()?;
        let current_id = conversations.first().map(|c| c.id.clone());
        Ok(Self { store, conversations, current_id, typing: false })
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn set_typing(&mut self, typing: bool) {
        self.typing = typing;
    }

    /// New conversations go to the front of the list and become active.
    pub fn create_conversation(&mut self) -> Result<String, StoreError> {
        let conversation = Conversation::new(format!("New Chat {}", self.conversations.len() + 1));
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.current_id = Some(id.clone());
        self.persist()?;
        Ok(id)
    }

    pub fn select(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.conversations.iter().any(|c| c.id == id) {
            return Err(StoreError::UnknownConversation(id.to_string()));
        }
        self.current_id = Some(id.to_string());
        Ok(())
    }

    pub fn push_message(&mut self, conversation_id: &str, message: Message) -> Result<(), StoreError> {
        self.conversation_mut(conversation_id)?.messages.push(message);
        self.persist()
    }

    /// Adds an empty assistant message and returns its id.
    pub fn begin_assistant_message(&mut self, conversation_id: &str) -> Result<String, StoreError> {
        let message = Message::assistant_placeholder();
        let id = message.id.clone();
        self.push_message(conversation_id, message)?;
        Ok(id)
    }

    pub fn append_fragment(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        fragment: &str,
    ) -> Result<(), StoreError> {
        let message = self
            .conversation_mut(conversation_id)?
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::UnknownMessage(message_id.to_string()))?;
        message.content.push_str(fragment);
        self.persist()
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.store.save(&self.conversations)
    }
}
