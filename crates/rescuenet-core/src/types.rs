//! Wire-level message envelope shared by every agent and transport binding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{ParseError, ParseResult};

/// Structured message payload. Its meaning is defined by the ontology tag.
pub type Content = Map<String, Value>;

/// Content language tag, constant on the wire
pub const LANGUAGE: &str = "json";

/// Interaction protocol tag, constant on the wire
pub const PROTOCOL: &str = "fipa-request";

/// Well-known ontology tags
pub mod ontology {
    pub const DEFAULT: &str = "rescue_ontology";
    pub const DISASTER_DETECTION: &str = "disaster_detection";
    pub const RESCUE_ASSIGNMENT: &str = "rescue_assignment";
    pub const SUPPLY_ASSIGNMENT: &str = "supply_assignment";
    pub const TASK_COMPLETE: &str = "task_complete";
    pub const AGENT_STATUS: &str = "agent_status";
}

/// Speech-act tag defining a message's role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    Request,
    Agree,
    Refuse,
    Inform,
    Failure,
}

impl Performative {
    pub const ALL: [Performative; 5] = [
        Self::Request,
        Self::Agree,
        Self::Refuse,
        Self::Inform,
        Self::Failure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Agree => "agree",
            Self::Refuse => "refuse",
            Self::Inform => "inform",
            Self::Failure => "failure",
        }
    }
}

impl FromStr for Performative {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "request" => Ok(Self::Request),
            "agree" => Ok(Self::Agree),
            "refuse" => Ok(Self::Refuse),
            "inform" => Ok(Self::Inform),
            "failure" => Ok(Self::Failure),
            other => Err(ParseError::UnknownPerformative(other.to_string())),
        }
    }
}

impl std::fmt::Display for Performative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent communication message.
///
/// Built by the originator, stamped with the sender by the sending runtime
/// and never mutated after transmission. Receivers always work on their own
/// deserialized copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclMessage {
    pub performative: Performative,
    pub sender: String,
    pub receivers: Vec<String>,
    #[serde(default, deserialize_with = "content_or_empty")]
    pub content: Content,
    pub conversation_id: String,
    pub reply_with: String,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    pub language: String,
    pub ontology: String,
    pub protocol: String,
    pub timestamp: DateTime<Utc>,
}

fn content_or_empty<'de, D>(deserializer: D) -> Result<Content, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Content>::deserialize(deserializer)?.unwrap_or_default())
}

impl AclMessage {
    /// Start a new conversation. The sender is left empty until the sending
    /// runtime stamps it.
    pub fn new(performative: Performative, receivers: Vec<String>, content: Content) -> Self {
        Self {
            performative,
            sender: String::new(),
            receivers,
            content,
            conversation_id: new_token(),
            reply_with: new_token(),
            in_reply_to: None,
            language: LANGUAGE.to_string(),
            ontology: ontology::DEFAULT.to_string(),
            protocol: PROTOCOL.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_ontology(mut self, ontology: impl Into<String>) -> Self {
        self.ontology = ontology.into();
        self
    }

    /// Set the authoritative sender. Only sending runtimes call this.
    pub fn stamped(mut self, sender: &str) -> Self {
        self.sender = sender.to_string();
        self
    }

    /// Build a reply addressed to this message's sender, correlated through
    /// `in_reply_to` and kept inside the same conversation.
    pub fn reply(&self, performative: Performative, content: Content) -> Self {
        Self {
            performative,
            sender: String::new(),
            receivers: vec![self.sender.clone()],
            content,
            conversation_id: self.conversation_id.clone(),
            reply_with: new_token(),
            in_reply_to: Some(self.reply_with.clone()),
            language: LANGUAGE.to_string(),
            ontology: self.ontology.clone(),
            protocol: PROTOCOL.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// The action being requested: `content.action` when present, else the ontology
    pub fn action(&self) -> &str {
        self.content
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or(&self.ontology)
    }

    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a framed payload. Unknown performatives are rejected before
    /// the rest of the envelope is looked at.
    pub fn from_wire(bytes: &[u8]) -> ParseResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let performative = value
            .get("performative")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("performative"))?;
        performative.parse::<Performative>()?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Turn a JSON value into message content. Non-object values are wrapped
/// under a `value` key.
pub fn into_content(value: Value) -> Content {
    match value {
        Value::Object(map) => map,
        Value::Null => Content::new(),
        other => {
            let mut map = Content::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
