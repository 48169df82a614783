//! Wire shape of board webhook deliveries.
//!
//! ```json
//! { "action": { "type": "updateCard",
//!               "data": { "card":  { "id", "name", "due", "shortLink", "closed" },
//!                         "board": { "id", "name" } } } }
//! ```
//!
//! Every field is optional on the wire. Card updates only carry the fields
//! that changed, so a missing `due` decodes the same as an empty one.

use serde::Deserialize;

use crate::model::Notification;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub action: Action,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Action {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: ActionData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub card: CardData,
    #[serde(default)]
    pub board: BoardData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `null` when the due date was removed.
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub short_link: String,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<WebhookPayload> for Notification {
    fn from(payload: WebhookPayload) -> Self {
        let Action { kind, data } = payload.action;
        Self {
            action_type: kind,
            card_id: data.card.id,
            card_name: data.card.name,
            due: data.card.due.unwrap_or_default(),
            short_link: data.card.short_link,
            closed: data.card.closed,
            board_id: data.board.id,
            board_name: data.board.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattens_card_update() {
        let body = r#"{
            "model": {"id": "board_1"},
            "action": {
                "id": "act_1",
                "type": "updateCard",
                "data": {
                    "card": {"id": "card_1", "name": "Ship release", "due": "2025-03-10T00:00:00.000Z",
                             "shortLink": "AbC123", "idShort": 42},
                    "board": {"id": "board_1", "name": "Eng", "shortLink": "xyz"},
                    "old": {"due": null}
                }
            }
        }"#;

        let payload: WebhookPayload = serde_json::from_str(body).unwrap();
        let n = Notification::from(payload);

        assert_eq!(n.action_type, "updateCard");
        assert_eq!(n.card_id, "card_1");
        assert_eq!(n.due, "2025-03-10T00:00:00.000Z");
        assert_eq!(n.short_link, "AbC123");
        assert_eq!(n.board_name, "Eng");
        assert!(!n.closed);
    }

    #[test]
    fn test_null_and_missing_due_are_empty() {
        let null_due: WebhookPayload = serde_json::from_str(
            r#"{"action":{"type":"updateCard","data":{"card":{"id":"c1","due":null}}}}"#,
        )
        .unwrap();
        let missing_due: WebhookPayload = serde_json::from_str(
            r#"{"action":{"type":"updateCard","data":{"card":{"id":"c1","closed":true}}}}"#,
        )
        .unwrap();

        assert_eq!(Notification::from(null_due).due, "");
        let closed = Notification::from(missing_due);
        assert_eq!(closed.due, "");
        assert!(closed.closed);
        assert!(closed.board_id.is_empty());
    }

    #[test]
    fn test_empty_object_decodes() {
        let payload: WebhookPayload = serde_json::from_str("{}").unwrap();
        let n = Notification::from(payload);
        assert!(n.action_type.is_empty());
        assert!(!n.is_card_update());
    }
}
