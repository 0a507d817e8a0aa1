//! Broadcast message contracts
//!
//! Every frame on the channel is an envelope `{"event": ..., "payload": ...}`.
//! Decoding is two-stage so that a bad envelope, an unknown tag, and a bad
//! payload each produce their own error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::directory::UserId;
use crate::error::CanvassError;

/// Query identifier
pub type QueryId = String;

/// What is being asked. Unknown fields are carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QueryId>,

    /// Prompt title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub inputs: Vec<InputField>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryRequest {
    /// New request with a generated id
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Some(uuid::Uuid::now_v7().to_string()),
            question: Some(question.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, input: InputField) -> Self {
        self.inputs.push(input);
        self
    }

    /// The id, if present and non-empty
    pub fn query_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Kind of a single prompt input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputKind {
    Checkbox,
    Details,
    Divider,
    Error,
    Input,
    Select,
    Other(String),
}

impl From<String> for InputKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "checkbox" => Self::Checkbox,
            "details" => Self::Details,
            "divider" => Self::Divider,
            "error" => Self::Error,
            "input" => Self::Input,
            "select" => Self::Select,
            _ => Self::Other(value),
        }
    }
}

impl From<InputKind> for String {
    fn from(value: InputKind) -> Self {
        value.to_string()
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkbox => write!(f, "checkbox"),
            Self::Details => write!(f, "details"),
            Self::Divider => write!(f, "divider"),
            Self::Error => write!(f, "error"),
            Self::Input => write!(f, "input"),
            Self::Select => write!(f, "select"),
            Self::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// One field of a prompt form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputField {
    #[serde(rename = "type")]
    pub kind: InputKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Answer key; defaults to the label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(rename = "inputType", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,

    /// Element attribute the answer is read from
    #[serde(rename = "valueAttribute", default, skip_serializing_if = "Option::is_none")]
    pub value_attribute: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub autofocus: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InputField {
    pub fn new(kind: InputKind) -> Self {
        Self {
            kind,
            id: None,
            key: None,
            label: None,
            input_type: None,
            value_attribute: None,
            autofocus: false,
            details: None,
            value: None,
            extra: Map::new(),
        }
    }

    /// Text-like input of the given HTML input type
    pub fn input(input_type: impl Into<String>, label: impl Into<String>) -> Self {
        let mut field = Self::new(InputKind::Input);
        field.input_type = Some(input_type.into());
        field.label = Some(label.into());
        field
    }

    pub fn checkbox(label: impl Into<String>) -> Self {
        let mut field = Self::new(InputKind::Checkbox);
        field.label = Some(label.into());
        field
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_autofocus(mut self) -> Self {
        self.autofocus = true;
        self
    }
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-query options sent along with a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    /// Re-prompting a live dialog only fronts it instead of waiting on it
    #[serde(default = "default_true")]
    pub only_one_waiting: bool,

    /// Keep single-answer forms wrapped in an object
    #[serde(default)]
    pub always_use_answer_object: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            only_one_waiting: true,
            always_use_answer_object: false,
            extra: Map::new(),
        }
    }
}

/// `prompt`: ask `users` (or everyone but the sender) to answer `request`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptPayload {
    pub id: QueryId,
    pub users: Option<Vec<UserId>>,
    pub request: QueryRequest,
    #[serde(default)]
    pub config: PromptConfig,
}

/// `submit`: the sender's answer; `None` means dismissed without answering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitPayload {
    pub id: QueryId,
    #[serde(default)]
    pub answers: Option<Value>,
}

/// `cancel`: dismiss any live prompt for `id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelPayload {
    pub id: QueryId,
    #[serde(default)]
    pub users: Option<Vec<UserId>>,
}

/// `notify`: deliver an acknowledgement to `user_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyPayload {
    pub id: QueryId,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub content: String,
    #[serde(rename = "includeGM", default)]
    pub include_privileged: bool,
}

/// Every message kind carried on the broadcast channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum Message {
    Prompt(PromptPayload),
    Submit(SubmitPayload),
    Cancel(CancelPayload),
    Notify(NotifyPayload),
}

/// Event tags accepted on the wire
pub const EVENTS: [&str; 4] = ["prompt", "submit", "cancel", "notify"];

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::Prompt(p) => &p.id,
            Message::Submit(p) => &p.id,
            Message::Cancel(p) => &p.id,
            Message::Notify(p) => &p.id,
        }
    }

    pub fn event(&self) -> &'static str {
        match self {
            Message::Prompt(_) => "prompt",
            Message::Submit(_) => "submit",
            Message::Cancel(_) => "cancel",
            Message::Notify(_) => "notify",
        }
    }

    /// Encode into the wire envelope
    pub fn encode(&self) -> Result<Value, CanvassError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode and validate a wire envelope
    pub fn decode(body: &Value) -> Result<Self, CanvassError> {
        let envelope = body
            .as_object()
            .ok_or_else(|| CanvassError::MalformedEnvelope("envelope must be an object".to_string()))?;

        let event = envelope
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| CanvassError::MalformedEnvelope("missing event tag".to_string()))?;

        let payload = match envelope.get("payload") {
            Some(Value::Object(payload)) => payload,
            Some(_) => return Err(CanvassError::MalformedEnvelope("payload must be an object".to_string())),
            None => return Err(CanvassError::MalformedEnvelope("missing payload".to_string())),
        };

        if !EVENTS.contains(&event) {
            return Err(CanvassError::UnknownEvent(event.to_string()));
        }

        match payload.get("id") {
            Some(Value::String(id)) if !id.is_empty() => {}
            _ => return Err(CanvassError::malformed(event, "A request ID must be provided")),
        }

        match payload.get("users") {
            None | Some(Value::Null) => {}
            Some(Value::Array(users)) if users.iter().all(Value::is_string) => {}
            Some(_) => return Err(CanvassError::malformed(event, "users must be null or a list of user ids")),
        }

        serde_json::from_value(body.clone()).map_err(|e| CanvassError::malformed(event, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_envelope_shape() {
        let msg = Message::Prompt(PromptPayload {
            id: "q-1".to_string(),
            users: None,
            request: QueryRequest::default().with_id("q-1"),
            config: PromptConfig::default(),
        });

        let value = msg.encode().unwrap();
        assert_eq!(value["event"], "prompt");
        assert_eq!(value["payload"]["id"], "q-1");
        assert!(value["payload"]["users"].is_null());
        assert_eq!(value["payload"]["config"]["onlyOneWaiting"], true);
    }

    #[test]
    fn test_notify_wire_names() {
        let msg = Message::Notify(NotifyPayload {
            id: "q-1".to_string(),
            user_id: "alice".to_string(),
            content: "Rolls: 4".to_string(),
            include_privileged: true,
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("userID"));
        assert!(json.contains("includeGM"));
    }

    #[test]
    fn test_decode_roundtrip_submit() {
        let body = json!({"event": "submit", "payload": {"id": "q-1", "answers": {"v": 1}}});
        let msg = Message::decode(&body).unwrap();
        match msg {
            Message::Submit(SubmitPayload { id, answers }) => {
                assert_eq!(id, "q-1");
                assert_eq!(answers, Some(json!({"v": 1})));
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_decode_null_answers() {
        let body = json!({"event": "submit", "payload": {"id": "q-1", "answers": null}});
        let msg = Message::decode(&body).unwrap();
        assert!(matches!(msg, Message::Submit(SubmitPayload { answers: None, .. })));
    }

    #[test]
    fn test_decode_missing_event() {
        let err = Message::decode(&json!({"payload": {"id": "q"}})).unwrap_err();
        assert!(matches!(err, CanvassError::MalformedEnvelope(_)));

        let err = Message::decode(&json!("prompt")).unwrap_err();
        assert!(matches!(err, CanvassError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_decode_unknown_event() {
        let err = Message::decode(&json!({"event": "dataRequest", "payload": {"id": "q"}})).unwrap_err();
        assert!(matches!(err, CanvassError::UnknownEvent(ref e) if e == "dataRequest"));
    }

    #[test]
    fn test_decode_missing_id() {
        let err = Message::decode(&json!({"event": "cancel", "payload": {}})).unwrap_err();
        assert!(matches!(err, CanvassError::Validation(_)));

        let err = Message::decode(&json!({"event": "cancel", "payload": {"id": ""}})).unwrap_err();
        assert!(matches!(err, CanvassError::Validation(_)));
    }

    #[test]
    fn test_decode_users_must_be_list() {
        let body = json!({
            "event": "prompt",
            "payload": {"id": "q", "users": "alice", "request": {}}
        });
        let err = Message::decode(&body).unwrap_err();
        assert!(err.to_string().contains("users"));

        let body = json!({
            "event": "prompt",
            "payload": {"id": "q", "users": ["alice", 7], "request": {}}
        });
        assert!(Message::decode(&body).is_err());
    }

    #[test]
    fn test_decode_prompt_defaults_config() {
        let body = json!({
            "event": "prompt",
            "payload": {"id": "q", "users": ["alice"], "request": {"inputs": []}}
        });
        match Message::decode(&body).unwrap() {
            Message::Prompt(p) => {
                assert_eq!(p.users, Some(vec!["alice".to_string()]));
                assert!(p.config.only_one_waiting);
                assert!(!p.config.always_use_answer_object);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_request_extra_fields_pass_through() {
        let raw = json!({
            "id": "q",
            "question": "Test Data",
            "inputs": [{"type": "input", "inputType": "number", "key": "statBase", "label": "Stat Base", "step": 1}],
            "theme": "dark"
        });
        let request: QueryRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(request.extra["theme"], "dark");
        assert_eq!(request.inputs[0].extra["step"], 1);
        assert_eq!(request.inputs[0].kind, InputKind::Input);
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_unknown_input_kind_preserved() {
        let field: InputField = serde_json::from_value(json!({"type": "slider"})).unwrap();
        assert_eq!(field.kind, InputKind::Other("slider".to_string()));
        assert_eq!(serde_json::to_value(&field).unwrap()["type"], "slider");
    }
}
