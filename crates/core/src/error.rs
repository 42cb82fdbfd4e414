#[allow(clippy::single_component_path_imports)]
use serde_yaml;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("failed to create storage directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to write chat file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read chat file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize message: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("chat store is corrupt: {0}")]
    CorruptStore(String),
    #[error("thread lock poisoned")]
    LockPoisoned,

    #[error("collaborator unavailable: {0}")]
    Collaborator(String),

    #[error("invalid value: {0}")]
    Types(#[from] chat_types::TypesError),
    #[error("invalid identifier: {0}")]
    Uuid(#[from] chat_uuid::UuidError),
}

impl ChatError {
    /// Storage and collaborator failures may succeed if the caller tries again.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::DirCreation(_)
                | ChatError::FileWrite(_)
                | ChatError::FileRead(_)
                | ChatError::Collaborator(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for ChatError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ChatError::LockPoisoned
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
