use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

pub mod local;

pub use local::LocalTransport;

use crate::extractors::TransferSample;
use crate::Result;

pub type ChatId = i64;
pub type UserId = u64;

/// Handle to a message the bot sent and may edit or delete later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// Extra document attributes sent along with a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAttributes {
    Video {
        duration_seconds: u64,
        width: u32,
        height: u32,
        supports_streaming: bool,
    },
    Audio {
        title: String,
        performer: String,
    },
}

/// A finished artifact ready to hand to the chat
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_path: PathBuf,
    pub title: String,
    pub caption: String,
    pub attributes: Option<UploadAttributes>,
    pub thumbnail_path: Option<PathBuf>,
    /// Receives byte counters while the upload runs
    pub progress: Option<mpsc::UnboundedSender<TransferSample>>,
}

/// Chat connection used to talk back to the requesting user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a new text message to the chat
    async fn reply(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Replace the text of a previously sent message
    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<()>;

    async fn delete_message(&self, message: &MessageRef) -> Result<()>;

    /// Upload a file with caption, attributes and optional thumbnail
    async fn send_file(&self, chat_id: ChatId, upload: &Upload) -> Result<()>;
}
