use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ParticipantRole, Timestamp};

/// A conversation between one patient and one doctor, as shown in the inbox list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    /// Subject, or `"Conversation"` when the thread has none.
    pub title: String,
    #[serde(default)]
    pub counterpart_name: String,
    #[serde(default)]
    pub counterpart_role: String,
    #[serde(default)]
    pub counterpart_initials: String,
    #[serde(default)]
    pub last_message_snippet: String,
    #[serde(default)]
    pub last_message_at: Option<Timestamp>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Thread {
    /// Name to show for the thread: the resolved counterpart, else the title.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.counterpart_name.is_empty() {
            &self.title
        } else {
            &self.counterpart_name
        }
    }
}

/// Local delivery state of a message bubble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Appended locally; the send request has not resolved yet.
    Pending,
    #[default]
    Confirmed,
}

/// A single timestamped entry within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub sent_at: Option<Timestamp>,
    pub sender_name: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_role: Option<ParticipantRole>,
    #[serde(default)]
    pub is_mine: bool,
    /// Temporary id assigned to an optimistic send.
    #[serde(skip)]
    pub client_id: Option<Uuid>,
    #[serde(skip)]
    pub delivery: Delivery,
}

impl Message {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }
}

/// Entry in the compose-recipient picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: String,
    /// Portal user id; this is what `CreateThreadRequest::doctor_user_id` expects.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub display_name: String,
    #[serde(default)]
    pub specialization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    pub doctor_user_id: String,
    pub subject: String,
    pub body: String,
}

/// Query string for `GET /messages/threads`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ThreadQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

/// Query string for paginated message reads.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PageQuery {
    /// The most recent `limit` entries.
    #[must_use]
    pub fn latest(limit: u32) -> Self {
        Self {
            cursor: None,
            limit: Some(limit),
        }
    }

    /// `limit` entries before `cursor`.
    #[must_use]
    pub fn before(cursor: Option<String>, limit: u32) -> Self {
        Self {
            cursor,
            limit: Some(limit),
        }
    }
}
