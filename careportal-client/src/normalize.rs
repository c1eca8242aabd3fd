//! Payload normalization.
//!
//! The portal backend answers with several envelope shapes (a bare array,
//! `{data: [...]}`, `{items: [...]}`, `{threads: [...]}`, `{data: {doctors: [...]}}`)
//! and several field spellings. Everything here is total: malformed input
//! yields `None`, an empty list, or neutral defaults, never a panic.

use serde_json::Value;
use shared::models::{Delivery, Doctor, Message, ParticipantRole, Thread, Timestamp};

use crate::session::SessionIdentity;

pub(crate) static NULL: Value = Value::Null;

/// Display identity of the other participant in a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counterpart {
    pub name: String,
    pub role: String,
    pub initials: String,
}

/// `GET /messages/threads/:id` after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadDetail {
    pub thread: Option<Thread>,
    /// `None` when the payload carried no message page at all.
    pub messages: Option<Vec<Message>>,
    pub counterpart: Option<Counterpart>,
    pub next_cursor: Option<String>,
}

/// `{data: x}` yields `x`; anything else is returned unchanged.
#[must_use]
pub fn unwrap_data(raw: &Value) -> &Value {
    match raw.get("data") {
        Some(data) if !data.is_null() => data,
        _ => raw,
    }
}

/// Find the list inside any supported envelope.
///
/// `keys` names the collection-specific wrappers to try (`threads`,
/// `messages`, `doctors`) in addition to `data` and `items`.
#[must_use]
pub fn extract_list<'a>(raw: &'a Value, keys: &[&str]) -> &'a [Value] {
    if let Some(items) = raw.as_array() {
        return items;
    }
    if let Some(data) = raw.get("data") {
        if let Some(items) = data.as_array() {
            return items;
        }
        if let Some(items) = keyed_list(data, keys) {
            return items;
        }
    }
    keyed_list(raw, keys).unwrap_or_default()
}

fn keyed_list<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a [Value]> {
    std::iter::once(&"items")
        .chain(keys)
        .find_map(|key| raw.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
}

/// Pagination cursor for the next (older) page, if the envelope has one.
#[must_use]
pub fn next_cursor(raw: &Value) -> Option<String> {
    let keys = ["nextCursor", "next_cursor"];
    str_field(raw, &keys)
        .or_else(|| raw.get("data").and_then(|data| str_field(data, &keys)))
        .map(str::to_string)
}

/// First non-empty string among `keys`.
#[must_use]
pub fn str_field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// First identifier among `keys`; numeric ids are rendered as strings.
#[must_use]
pub fn id_field(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match raw.get(*key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

fn count_field(raw: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| {
        let value = raw.get(*key)?;
        let count = match value {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f.trunc() as i64))?,
            Value::String(text) => text.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        Some(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
    })
}

fn timestamp_field(raw: &Value, keys: &[&str]) -> Option<Timestamp> {
    keys.iter().find_map(|key| match raw.get(*key)? {
        Value::String(text) => Timestamp::parse(text),
        Value::Number(millis) => millis.as_i64().and_then(Timestamp::from_millis),
        _ => None,
    })
}

fn object_field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| raw.get(*key).filter(|value| value.is_object()))
}

#[must_use]
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case("dr.") && !word.eq_ignore_ascii_case("dr"))
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}

/// Normalize one thread summary. Returns `None` for non-objects and for
/// objects without a usable id.
#[must_use]
pub fn normalize_thread(raw: &Value) -> Option<Thread> {
    if !raw.is_object() {
        return None;
    }
    let id = id_field(raw, &["id", "threadId"])?;
    let subject = str_field(raw, &["subject"]).unwrap_or_default().to_string();
    let last_message = object_field(raw, &["lastMessage", "last_message"]);

    let last_message_snippet = last_message
        .and_then(|message| str_field(message, &["body", "text"]))
        .or_else(|| str_field(raw, &["lastMessageSnippet"]))
        .unwrap_or_default()
        .to_string();
    let last_message_at = last_message
        .and_then(|message| timestamp_field(message, &["createdAt", "sentAt"]))
        .or_else(|| timestamp_field(raw, &["lastMessageAt", "lastActivity", "updatedAt"]));

    let mut counterpart_name = str_field(raw, &["counterpartName", "otherPartyName"])
        .unwrap_or_default()
        .to_string();
    let mut counterpart_role = str_field(raw, &["counterpartRole", "otherPartyRole"])
        .unwrap_or_default()
        .to_string();
    if counterpart_name.is_empty()
        && let Some(participants) = raw.get("participants").and_then(Value::as_array)
        && let Some(other) = pick_counterpart(participants, None, None)
    {
        counterpart_name = participant_name(other).unwrap_or_default();
        if counterpart_role.is_empty() {
            counterpart_role = participant_role(other);
        }
    }
    let counterpart_initials = str_field(raw, &["counterpartInitials"])
        .map_or_else(|| initials(&counterpart_name), str::to_string);

    Some(Thread {
        id,
        title: if subject.is_empty() {
            "Conversation".to_string()
        } else {
            subject.clone()
        },
        subject,
        counterpart_name,
        counterpart_role,
        counterpart_initials,
        last_message_snippet,
        last_message_at,
        unread_count: count_field(raw, &["unreadCount", "unread"]).unwrap_or(0),
    })
}

/// Normalize one message. `is_mine` compares the sender id with the session
/// user id when both are known; otherwise an explicit `isMine` flag is used;
/// otherwise `false`.
#[must_use]
pub fn normalize_message(raw: &Value, session: &dyn SessionIdentity) -> Option<Message> {
    if !raw.is_object() {
        return None;
    }
    let id = id_field(raw, &["id", "messageId"])?;
    let sender = object_field(raw, &["sender", "user"]).unwrap_or(&NULL);
    let sender_id =
        id_field(sender, &["id", "userId"]).or_else(|| id_field(raw, &["senderUserId", "senderId"]));
    let sender_role = str_field(sender, &["role"])
        .or_else(|| str_field(raw, &["senderRole"]))
        .map(ParticipantRole::from);

    let is_mine = match (session.user_id(), sender_id.as_deref()) {
        (Some(me), Some(sender)) => me == sender,
        _ => raw.get("isMine").and_then(Value::as_bool).unwrap_or(false),
    };

    let sender_name = str_field(sender, &["username", "name", "displayName"])
        .or_else(|| str_field(raw, &["senderName"]))
        .map(str::to_string)
        .or_else(|| sender_role.as_ref().map(|role| role.label().to_string()))
        .unwrap_or_else(|| "User".to_string());

    Some(Message {
        id,
        body: str_field(raw, &["body", "text", "content"])
            .unwrap_or_default()
            .to_string(),
        sent_at: timestamp_field(raw, &["createdAt", "sentAt", "timestamp"]),
        sender_name,
        sender_id,
        sender_role,
        is_mine,
        client_id: None,
        delivery: Delivery::Confirmed,
    })
}

#[must_use]
pub fn normalize_threads(raw: &Value) -> Vec<Thread> {
    extract_list(raw, &["threads"])
        .iter()
        .filter_map(normalize_thread)
        .collect()
}

/// Normalize a message page, sorted oldest first.
#[must_use]
pub fn normalize_messages(raw: &Value, session: &dyn SessionIdentity) -> Vec<Message> {
    let mut messages: Vec<Message> = extract_list(raw, &["messages"])
        .iter()
        .filter_map(|item| normalize_message(item, session))
        .collect();
    sort_chronologically(&mut messages);
    messages
}

/// Stable sort by `sent_at`; messages without a timestamp keep their
/// relative order and go last.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by(|a, b| match (&a.sent_at, &b.sent_at) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Normalize a thread detail payload, resolving the counterpart from its
/// participants.
#[must_use]
pub fn normalize_thread_detail(raw: &Value, session: &dyn SessionIdentity) -> ThreadDetail {
    let detail = unwrap_data(raw);
    if !detail.is_object() {
        return ThreadDetail::default();
    }

    let messages = detail.get("messages").map(|page| {
        let mut messages: Vec<Message> = extract_list(page, &["messages"])
            .iter()
            .filter_map(|item| normalize_message(item, session))
            .collect();
        sort_chronologically(&mut messages);
        messages
    });

    let me = session.user_id();
    let my_role = session.role();
    let counterpart = detail
        .get("participants")
        .and_then(Value::as_array)
        .and_then(|participants| pick_counterpart(participants, me.as_deref(), my_role.as_ref()))
        .and_then(|other| {
            let name = participant_name(other)?;
            Some(Counterpart {
                initials: initials(&name),
                role: participant_role(other),
                name,
            })
        });

    ThreadDetail {
        thread: normalize_thread(detail),
        messages,
        counterpart,
        next_cursor: next_cursor(detail)
            .or_else(|| detail.get("messages").and_then(next_cursor)),
    }
}

/// Choose the participant that is not the signed-in user: a different user
/// id first, then a different role, then the doctor, then the first entry.
#[must_use]
pub fn pick_counterpart<'a>(
    participants: &'a [Value],
    me: Option<&str>,
    my_role: Option<&ParticipantRole>,
) -> Option<&'a Value> {
    let objects = || participants.iter().filter(|&p| p.is_object());
    let role_of = |p: &Value| str_field(p, &["role"]).map(ParticipantRole::from);

    if let Some(me) = me
        && let Some(other) = objects().find(|&p| {
            id_field(p, &["userId"])
                .or_else(|| p.get("user").and_then(|user| id_field(user, &["id"])))
                .is_some_and(|id| id != me)
        })
    {
        return Some(other);
    }
    if let Some(mine) = my_role
        && let Some(other) = objects().find(|&p| role_of(p).is_some_and(|role| &role != mine))
    {
        return Some(other);
    }
    objects()
        .find(|&p| role_of(p) == Some(ParticipantRole::Doctor))
        .or_else(|| objects().next())
}

/// Display name for a participant: `"Dr. First Last"` for doctors, then the
/// patient's name, then the user's display name or username.
#[must_use]
pub fn participant_name(participant: &Value) -> Option<String> {
    let user = participant.get("user").unwrap_or(&NULL);
    let full_name = |profile: &Value| {
        let parts: Vec<&str> = [
            str_field(profile, &["firstName", "first_name"]),
            str_field(profile, &["lastName", "last_name"]),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    };

    if let Some(doctor) = object_field(participant, &["doctor"]).or_else(|| object_field(user, &["doctor"]))
        && let Some(name) = full_name(doctor)
    {
        return Some(format!("Dr. {name}"));
    }
    if let Some(patient) =
        object_field(participant, &["patient"]).or_else(|| object_field(user, &["patient"]))
        && let Some(name) = full_name(patient)
    {
        return Some(name);
    }
    str_field(user, &["displayName", "username"])
        .or_else(|| str_field(participant, &["name", "displayName"]))
        .map(str::to_string)
}

/// Role line for a participant: a doctor's specialization (or `"Doctor"`),
/// otherwise the raw role label.
#[must_use]
pub fn participant_role(participant: &Value) -> String {
    let role = str_field(participant, &["role"]).map(ParticipantRole::from);
    match role {
        Some(ParticipantRole::Doctor) => {
            let user = participant.get("user").unwrap_or(&NULL);
            object_field(participant, &["doctor"])
                .or_else(|| object_field(user, &["doctor"]))
                .and_then(|doctor| str_field(doctor, &["specialization"]))
                .unwrap_or("Doctor")
                .to_string()
        }
        Some(role) => role.label().to_string(),
        None => String::new(),
    }
}

#[must_use]
pub fn normalize_doctor(raw: &Value) -> Option<Doctor> {
    if !raw.is_object() {
        return None;
    }
    let id = id_field(raw, &["id"])?;
    let user = raw.get("user").unwrap_or(&NULL);
    let first_name = str_field(raw, &["firstName", "first_name"])
        .unwrap_or_default()
        .to_string();
    let last_name = str_field(raw, &["lastName", "last_name"])
        .unwrap_or_default()
        .to_string();
    let display_name = str_field(raw, &["name"]).map_or_else(
        || {
            let full = [first_name.as_str(), last_name.as_str()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            format!("Dr. {full}").trim().to_string()
        },
        str::to_string,
    );

    Some(Doctor {
        id,
        user_id: id_field(raw, &["userId", "user_id"]).or_else(|| id_field(user, &["id"])),
        first_name,
        last_name,
        display_name,
        specialization: str_field(raw, &["specialization"])
            .unwrap_or_default()
            .to_string(),
    })
}

#[must_use]
pub fn normalize_doctors(raw: &Value) -> Vec<Doctor> {
    extract_list(raw, &["doctors"])
        .iter()
        .filter_map(normalize_doctor)
        .collect()
}

/// Global unread counter from `{data: {unread}}`, `{count}`, `{total}` or a bare number.
#[must_use]
pub fn normalize_unread(raw: &Value) -> u32 {
    let payload = unwrap_data(raw);
    if let Some(count) = payload.as_i64() {
        return u32::try_from(count.max(0)).unwrap_or(u32::MAX);
    }
    count_field(payload, &["unread", "count", "total"]).unwrap_or(0)
}

/// Id of a freshly created thread (`{data: {id}}` or `{id}`).
#[must_use]
pub fn created_thread_id(raw: &Value) -> Option<String> {
    id_field(unwrap_data(raw), &["id", "threadId"])
}
