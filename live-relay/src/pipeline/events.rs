//! Events carried by the pipeline.

use bili_live::LiveChat;

use crate::accounts::TrackedAccount;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Account went from unknown/offline to live.
    LiveStarted(TrackedAccount),
    /// Account went from live to offline.
    LiveStopped(TrackedAccount),
    /// Chat message observed in an account's live room.
    ChatMessage {
        account_id: u64,
        speaker: String,
        text: String,
    },
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LiveStarted(_) => "live_started",
            Self::LiveStopped(_) => "live_stopped",
            Self::ChatMessage { .. } => "chat_message",
        }
    }

    pub fn account_id(&self) -> u64 {
        match self {
            Self::LiveStarted(account) | Self::LiveStopped(account) => account.id,
            Self::ChatMessage { account_id, .. } => *account_id,
        }
    }
}

impl From<LiveChat> for PipelineEvent {
    fn from(chat: LiveChat) -> Self {
        Self::ChatMessage {
            account_id: chat.account_id,
            speaker: chat.speaker,
            text: chat.text,
        }
    }
}
