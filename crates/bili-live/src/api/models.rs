//! User info API response models.

use serde::{Deserialize, Serialize};

/// `live_room.liveStatus` value while broadcasting.
pub const LIVE_STATUS_STREAMING: i32 = 1;

/// Envelope returned by the user info endpoint.
#[derive(Debug, Deserialize)]
pub struct UserInfoResponse {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<AccountProfile>,
}

/// Public profile of a tracked account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    #[serde(default)]
    pub mid: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub face: String,
    #[serde(default)]
    pub sign: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub top_photo: String,
    #[serde(default)]
    pub live_room: Option<LiveRoom>,
}

impl AccountProfile {
    /// Whether the account is currently broadcasting.
    pub fn is_live(&self) -> bool {
        self.live_room
            .as_ref()
            .is_some_and(|room| room.live_status == LIVE_STATUS_STREAMING)
    }

    /// Live room id, 0 when the account has no room.
    pub fn room_id(&self) -> u64 {
        self.live_room.as_ref().map_or(0, |room| room.room_id)
    }
}

/// Live room block of the profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveRoom {
    #[serde(default, rename = "roomStatus")]
    pub room_status: i32,
    #[serde(default, rename = "liveStatus")]
    pub live_status: i32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default, rename = "roomid")]
    pub room_id: u64,
    #[serde(default, rename = "roundStatus")]
    pub round_status: i32,
}
