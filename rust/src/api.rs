//! REST client for the messaging backend.
//!
//! Wire payloads are camelCase JSON with ISO-8601 timestamps; they are
//! converted to state types (epoch-ms) here, at the boundary, so the rest of
//! the core never touches wire formats.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::state::{ChatMessage, ConversationSummary, MessageDeliveryState};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http status {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDto {
    id: String,
    sender_id: String,
    recipient_id: String,
    content: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    read_at: Option<DateTime<Utc>>,
}

impl MessageDto {
    fn into_message(self, user_id: &str) -> ChatMessage {
        let is_mine = self.sender_id == user_id;
        let read_at = self.read_at.map(|t| t.timestamp_millis());
        let delivery = if read_at.is_some() {
            MessageDeliveryState::Read
        } else {
            MessageDeliveryState::Sent
        };
        ChatMessage {
            id: self.id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            created_at: self.created_at.timestamp_millis(),
            read_at,
            delivery,
            is_mine,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDto {
    other_user_id: String,
    other_user_name: String,
    #[serde(default)]
    other_user_avatar: Option<String>,
    #[serde(default)]
    last_message: Option<String>,
    #[serde(default)]
    last_sender_id: Option<String>,
    #[serde(default)]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    unread_count: u32,
}

impl From<ConversationDto> for ConversationSummary {
    fn from(dto: ConversationDto) -> Self {
        ConversationSummary {
            other_user_id: dto.other_user_id,
            other_user_name: dto.other_user_name,
            other_user_avatar: dto.other_user_avatar,
            last_message: dto.last_message,
            last_sender_id: dto.last_sender_id,
            last_message_at: dto.last_message_at.map(|t| t.timestamp_millis()),
            unread_count: dto.unread_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnreadCountDto {
    count: u32,
}

fn to_iso(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

/// Thin typed wrapper over the messaging endpoints, scoped to one
/// authenticated user. Cheap to clone (reqwest clients share their pool).
#[derive(Clone)]
pub(crate) struct MessagingApi {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl MessagingApi {
    pub(crate) fn new(base_url: String, user_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let resp = self.http.get(&url).query(query).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<T>().await?)
    }

    pub(crate) async fn fetch_history(
        &self,
        other_user_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let url = format!("{}/messaging/messages/{}", self.base_url, other_user_id);
        let dtos: Vec<MessageDto> = self
            .get_json(
                url,
                &[
                    ("userId", self.user_id.clone()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(dtos
            .into_iter()
            .map(|d| d.into_message(&self.user_id))
            .collect())
    }

    pub(crate) async fn fetch_new_since(
        &self,
        other_user_id: &str,
        since_ms: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let url = format!("{}/messaging/messages/{}/new", self.base_url, other_user_id);
        let dtos: Vec<MessageDto> = self
            .get_json(
                url,
                &[("userId", self.user_id.clone()), ("since", to_iso(since_ms))],
            )
            .await?;
        Ok(dtos
            .into_iter()
            .map(|d| d.into_message(&self.user_id))
            .collect())
    }

    pub(crate) async fn send_message(
        &self,
        recipient_id: &str,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        let url = format!("{}/messaging/send", self.base_url);
        let body = serde_json::json!({
            "senderId": self.user_id,
            "recipientId": recipient_id,
            "content": content,
        });
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        let dto = resp.json::<MessageDto>().await?;
        Ok(dto.into_message(&self.user_id))
    }

    pub(crate) async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let url = format!("{}/messaging/conversations", self.base_url);
        let dtos: Vec<ConversationDto> = self
            .get_json(url, &[("userId", self.user_id.clone())])
            .await?;
        Ok(dtos.into_iter().map(ConversationSummary::from).collect())
    }

    pub(crate) async fn fetch_unread_count(&self) -> Result<u32, ApiError> {
        let url = format!("{}/messaging/unread-count", self.base_url);
        let dto: UnreadCountDto = self
            .get_json(url, &[("userId", self.user_id.clone())])
            .await?;
        Ok(dto.count)
    }

    pub(crate) async fn mark_conversation_read(
        &self,
        other_user_id: &str,
    ) -> Result<(), ApiError> {
        let url = format!(
            "{}/messaging/conversations/{}/read",
            self.base_url, other_user_id
        );
        let resp = self
            .http
            .post(&url)
            .query(&[("userId", self.user_id.clone())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_dto_maps_read_state_and_epoch_millis() {
        let json = r#"{
            "id": "m1",
            "senderId": "alice",
            "recipientId": "bob",
            "content": "hi",
            "createdAt": "2025-06-01T12:00:00Z",
            "readAt": "2025-06-01T12:01:00Z"
        }"#;
        let dto: MessageDto = serde_json::from_str(json).unwrap();
        let msg = dto.into_message("alice");
        assert!(msg.is_mine);
        assert_eq!(msg.delivery, MessageDeliveryState::Read);
        assert_eq!(msg.created_at, 1748779200000);
        assert_eq!(msg.read_at, Some(1748779260000));
    }

    #[test]
    fn conversation_dto_tolerates_missing_optionals() {
        let json = r#"{"otherUserId": "bob", "otherUserName": "Bob"}"#;
        let dto: ConversationDto = serde_json::from_str(json).unwrap();
        let summary = ConversationSummary::from(dto);
        assert_eq!(summary.unread_count, 0);
        assert!(summary.last_message_at.is_none());
    }
}
