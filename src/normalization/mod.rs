//! Payload normalization for inbound webhook deliveries.
//!
//! The platform delivers message events in two wire shapes that both have to
//! be supported indefinitely: a legacy flat `messaging` list per entry, and
//! the current `changes` list whose elements carry a `field` discriminator.
//! This module collapses both into one internal [`MessageEvent`] before any
//! business logic runs, so the rest of the pipeline never branches on wire
//! shape. Structures it does not understand are skipped, never errored.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

/// Account id the platform uses for synthetic test deliveries sent from its
/// developer dashboard. Events tagged with it get a different resolution
/// policy.
pub const TEST_ACCOUNT_SENTINEL: &str = "0";

/// Envelope discriminator for deliveries this service processes.
pub const OBJECT_INSTAGRAM: &str = "instagram";

/// Top-level webhook delivery envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// Platform object discriminator (`"instagram"` for processed deliveries)
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One entry inside a delivery; carries events for a single platform account.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// Platform account id the entry belongs to
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Entry-level epoch timestamp in milliseconds
    #[serde(default)]
    pub time: Option<i64>,
    /// Legacy shape: flat list of raw message events
    #[serde(default)]
    pub messaging: Option<Vec<JsonValue>>,
    /// Current shape: discriminated change records
    #[serde(default)]
    pub changes: Option<Vec<Change>>,
}

/// A discriminated change record; only `field == "messages"` elements carry
/// a message payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

/// Normalized inbound message event. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub platform_account_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub platform_message_id: Option<String>,
    pub text: Option<String>,
    pub attachments: Option<JsonValue>,
    pub occurred_at: DateTime<Utc>,
    /// Original raw event, retained verbatim for audit and replay
    pub raw: JsonValue,
    /// Set when the entry's account id is the platform's test sentinel
    pub is_test: bool,
}

/// Flatten a parsed delivery envelope into zero or more normalized events.
///
/// Entries with neither a `messaging` nor a `changes` list, change records
/// whose `field` is not `"messages"`, and message payloads missing sender or
/// recipient ids are all skipped silently.
pub fn normalize_envelope(envelope: &WebhookEnvelope, received_at: DateTime<Utc>) -> Vec<MessageEvent> {
    let mut events = Vec::new();

    for entry in &envelope.entry {
        let is_test = entry.id == TEST_ACCOUNT_SENTINEL;

        if let Some(messaging) = &entry.messaging {
            for raw in messaging {
                if let Some(event) = normalize_raw_message(entry, raw, is_test, received_at) {
                    events.push(event);
                }
            }
        }

        if let Some(changes) = &entry.changes {
            for change in changes {
                if change.field != "messages" {
                    debug!(field = %change.field, "Skipping non-message change record");
                    continue;
                }
                let Some(raw) = &change.value else {
                    continue;
                };
                if let Some(event) = normalize_raw_message(entry, raw, is_test, received_at) {
                    events.push(event);
                }
            }
        }
    }

    events
}

fn normalize_raw_message(
    entry: &Entry,
    raw: &JsonValue,
    is_test: bool,
    received_at: DateTime<Utc>,
) -> Option<MessageEvent> {
    let sender_id = id_at(raw, "sender")?;
    let recipient_id = id_at(raw, "recipient")?;

    let message = raw.get("message");
    let platform_message_id = message
        .and_then(|m| m.get("mid"))
        .and_then(json_string);
    let text = message
        .and_then(|m| m.get("text"))
        .and_then(json_string);
    let attachments = message.and_then(|m| m.get("attachments")).cloned();

    let occurred_at = raw
        .get("timestamp")
        .and_then(JsonValue::as_i64)
        .or(entry.time)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(received_at);

    Some(MessageEvent {
        platform_account_id: entry.id.clone(),
        sender_id,
        recipient_id,
        platform_message_id,
        text,
        attachments,
        occurred_at,
        raw: raw.clone(),
        is_test,
    })
}

fn id_at(raw: &JsonValue, key: &str) -> Option<String> {
    let id = raw.get(key)?.get("id")?;
    let id = json_string(id);
    if id.is_none() {
        debug!(key, "Skipping message payload without participant id");
    }
    id
}

/// Platform ids arrive as JSON strings but are numeric in some older
/// payloads; accept both.
fn json_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    json_string(&value).ok_or_else(|| serde::de::Error::custom("expected string or number id"))
}
