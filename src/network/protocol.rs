//! Protocol Messages
//!
//! JSON request and response bodies for the HTTP surface.
//! Request field names are camelCase; the snake_case names used by the
//! first game clients are accepted as aliases.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::game::claim::ClaimRequest;
use crate::game::state::{PlayerId, ProvinceId};

/// `type` value that marks a `/submit` body as a claim.
pub const CLAIM_SUBMIT_TYPE: &str = "claim_start_provinces";

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Body of `POST /claim`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBody {
    /// Claiming player.
    #[serde(alias = "player_id", deserialize_with = "player_id_field")]
    pub player_id: PlayerId,
    /// Requested capital. Absent is reported as an invalid selection.
    #[serde(default)]
    pub capital: ProvinceId,
    /// Requested starting provinces.
    #[serde(default)]
    pub others: Vec<ProvinceId>,
}

impl From<ClaimBody> for ClaimRequest {
    fn from(body: ClaimBody) -> Self {
        ClaimRequest {
            player_id: body.player_id,
            capital: body.capital,
            others: body.others,
        }
    }
}

/// Body of `POST /action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBody {
    /// Acting player.
    #[serde(alias = "player_id", deserialize_with = "player_id_field")]
    pub player_id: PlayerId,
    /// Raw action object, decoded by [`crate::game::Action::from_json`].
    #[serde(default)]
    pub action: Option<Value>,
}

/// Body of `POST /submit`, which carries either a claim or an action.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    /// Submitting player.
    #[serde(alias = "player_id", deserialize_with = "player_id_field")]
    pub player_id: PlayerId,
    /// Everything else in the body.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// What a `/submit` body turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// First-time province selection.
    Claim(ClaimRequest),
    /// Daily action; `None` is idle.
    Action {
        /// Acting player.
        player_id: PlayerId,
        /// Raw action object.
        action: Option<Value>,
    },
}

#[derive(Deserialize)]
struct ClaimSelection {
    #[serde(default)]
    capital: ProvinceId,
    #[serde(default)]
    others: Vec<ProvinceId>,
}

impl SubmitBody {
    /// Route the body.
    ///
    /// `type == "claim_start_provinces"` is a claim. Otherwise a nested
    /// `action` object is used if present, else a top-level `type` makes
    /// the body itself the action, else the submission is idle.
    pub fn into_submission(self) -> Result<Submission, serde_json::Error> {
        let SubmitBody { player_id, mut fields } = self;

        let kind = fields.get("type").and_then(Value::as_str);
        if kind == Some(CLAIM_SUBMIT_TYPE) {
            let selection: ClaimSelection = serde_json::from_value(Value::Object(fields))?;
            return Ok(Submission::Claim(ClaimRequest {
                player_id,
                capital: selection.capital,
                others: selection.others,
            }));
        }

        let action = match fields.remove("action") {
            Some(action) => Some(action),
            None if fields.contains_key("type") => Some(Value::Object(fields)),
            None => None,
        };
        Ok(Submission::Action { player_id, action })
    }
}

/// Accept player ids as strings or integers.
fn player_id_field<'de, D: Deserializer<'de>>(d: D) -> Result<PlayerId, D::Error> {
    use serde::de::Error;

    match Value::deserialize(d)? {
        Value::String(s) => Ok(PlayerId::new(s)),
        Value::Number(n) => Ok(PlayerId::new(n.to_string())),
        other => Err(D::Error::custom(format!(
            "player id must be a string or number, got {other}"
        ))),
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// `{"status": "..."}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    /// Outcome tag.
    pub status: &'static str,
}

impl StatusBody {
    /// Successful claim or action.
    pub const OK: StatusBody = StatusBody { status: "ok" };
    /// Successful reset.
    pub const CLEARED: StatusBody = StatusBody { status: "cleared" };
}

/// Error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    pub code: &'static str,
    /// Conflicting provinces, for `province_conflict`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ProvinceId>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claim_body_aliases() {
        let body: ClaimBody = serde_json::from_value(json!({
            "player_id": 7, "capital": "P1", "others": ["P2", "P3"]
        }))
        .unwrap();
        let request = ClaimRequest::from(body);
        assert_eq!(request.player_id, PlayerId::new("7"));
        assert_eq!(request.others.len(), 2);
    }

    #[test]
    fn test_claim_body_missing_capital_is_empty() {
        let body: ClaimBody = serde_json::from_value(json!({"playerId": "1"})).unwrap();
        assert!(body.capital.is_empty());
        assert!(body.others.is_empty());
    }

    #[test]
    fn test_missing_player_id_rejected() {
        assert!(serde_json::from_value::<ActionBody>(json!({"action": null})).is_err());
        assert!(serde_json::from_value::<ActionBody>(json!({"playerId": [1]})).is_err());
    }

    #[test]
    fn test_submit_routes_claim() {
        let body: SubmitBody = serde_json::from_value(json!({
            "playerId": "1", "type": "claim_start_provinces",
            "capital": "P1", "others": ["P2", "P3"]
        }))
        .unwrap();
        match body.into_submission().unwrap() {
            Submission::Claim(req) => assert_eq!(req.capital, ProvinceId::new("P1")),
            other => panic!("expected claim, got {other:?}"),
        }
    }

    #[test]
    fn test_submit_routes_actions() {
        let nested: SubmitBody = serde_json::from_value(json!({
            "playerId": "1", "action": {"type": "idle"}
        }))
        .unwrap();
        assert_eq!(
            nested.into_submission().unwrap(),
            Submission::Action { player_id: PlayerId::new("1"), action: Some(json!({"type": "idle"})) }
        );

        let flat: SubmitBody = serde_json::from_value(json!({
            "player_id": "1", "type": "moveArmy", "toProvince": "P4"
        }))
        .unwrap();
        assert_eq!(
            flat.into_submission().unwrap(),
            Submission::Action {
                player_id: PlayerId::new("1"),
                action: Some(json!({"type": "moveArmy", "toProvince": "P4"})),
            }
        );

        let bare: SubmitBody = serde_json::from_value(json!({"player_id": "1"})).unwrap();
        assert_eq!(
            bare.into_submission().unwrap(),
            Submission::Action { player_id: PlayerId::new("1"), action: None }
        );
    }

    #[test]
    fn test_status_and_error_bodies() {
        assert_eq!(serde_json::to_value(StatusBody::OK).unwrap(), json!({"status": "ok"}));
        let body = ErrorBody {
            error: "occupied".into(),
            code: "province_conflict",
            conflicts: Some(vec![ProvinceId::new("P2")]),
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"error": "occupied", "code": "province_conflict", "conflicts": ["P2"]})
        );
    }
}
