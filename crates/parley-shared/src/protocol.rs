use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;
use crate::types::{ConnectionId, FileId, Recipient, SessionId};

/// The nine envelope types understood by relay and clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// New client connected (relay-generated)
    Connect,
    /// Client disconnected (relay-generated)
    Disconnect,
    /// Chat text
    Message,
    /// Client left the chat; file transfers remain possible
    Leave,
    /// Client entered the chat, carries its display name
    Enter,
    /// Greeting to a newcomer, carries the greeter's display name
    Hello,
    /// File publication
    File,
    /// Download request carrying the offer
    Search,
    /// Publisher's reply carrying the answer
    Find,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Connect => "connect",
            EnvelopeKind::Disconnect => "disconnect",
            EnvelopeKind::Message => "message",
            EnvelopeKind::Leave => "leave",
            EnvelopeKind::Enter => "enter",
            EnvelopeKind::Hello => "hello",
            EnvelopeKind::File => "file",
            EnvelopeKind::Search => "search",
            EnvelopeKind::Find => "find",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "connect" => EnvelopeKind::Connect,
            "disconnect" => EnvelopeKind::Disconnect,
            "message" => EnvelopeKind::Message,
            "leave" => EnvelopeKind::Leave,
            "enter" => EnvelopeKind::Enter,
            "hello" => EnvelopeKind::Hello,
            "file" => EnvelopeKind::File,
            "search" => EnvelopeKind::Search,
            "find" => EnvelopeKind::Find,
            _ => return None,
        })
    }
}

/// Metadata of a published file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnnounce {
    pub uuid: FileId,
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description in the JSON shape browsers produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.kind == SdpKind::Offer
    }
}

/// ICE candidate in the JSON shape browsers produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Payload of `search` (offer side) and `find` (answer side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub uuid: FileId,
    pub session: SessionId,
    pub sdp: SessionDescription,
    pub ice: IceCandidate,
}

/// Typed envelope payload, one variant per [`EnvelopeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Connect,
    Disconnect,
    Message(String),
    Leave,
    Enter(String),
    Hello(String),
    File(FileAnnounce),
    Search(SignalPayload),
    Find(SignalPayload),
}

impl Body {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Body::Connect => EnvelopeKind::Connect,
            Body::Disconnect => EnvelopeKind::Disconnect,
            Body::Message(_) => EnvelopeKind::Message,
            Body::Leave => EnvelopeKind::Leave,
            Body::Enter(_) => EnvelopeKind::Enter,
            Body::Hello(_) => EnvelopeKind::Hello,
            Body::File(_) => EnvelopeKind::File,
            Body::Search(_) => EnvelopeKind::Search,
            Body::Find(_) => EnvelopeKind::Find,
        }
    }

    /// Wire `content` of this body. Empty types carry `""`.
    pub fn content(&self) -> Result<Value, EnvelopeError> {
        Ok(match self {
            Body::Connect | Body::Disconnect | Body::Leave => Value::String(String::new()),
            Body::Message(text) | Body::Enter(text) | Body::Hello(text) => {
                Value::String(text.clone())
            }
            Body::File(announce) => serde_json::to_value(announce)?,
            Body::Search(payload) | Body::Find(payload) => serde_json::to_value(payload)?,
        })
    }

    /// Rebuild a typed body from its wire parts.
    ///
    /// Text types accept any JSON value and stringify non-strings; empty
    /// types ignore their content.
    pub fn from_parts(kind: EnvelopeKind, content: Value) -> Result<Self, EnvelopeError> {
        Ok(match kind {
            EnvelopeKind::Connect => Body::Connect,
            EnvelopeKind::Disconnect => Body::Disconnect,
            EnvelopeKind::Leave => Body::Leave,
            EnvelopeKind::Message => Body::Message(text_content(content)),
            EnvelopeKind::Enter => Body::Enter(text_content(content)),
            EnvelopeKind::Hello => Body::Hello(text_content(content)),
            EnvelopeKind::File => Body::File(structured(kind, content)?),
            EnvelopeKind::Search => Body::Search(structured(kind, content)?),
            EnvelopeKind::Find => Body::Find(structured(kind, content)?),
        })
    }
}

fn text_content(content: Value) -> String {
    match content {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn structured<T: serde::de::DeserializeOwned>(
    kind: EnvelopeKind,
    content: Value,
) -> Result<T, EnvelopeError> {
    serde_json::from_value(content).map_err(|source| EnvelopeError::InvalidContent {
        kind: kind.as_str(),
        source,
    })
}

/// Untrusted envelope as sent by a client. Every field is optional; the
/// relay fills the gaps in [`RelayEnvelope::stamp`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Ignored by the relay, kept only so it can be discarded explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Ignored by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl WireEnvelope {
    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// An envelope in transit through the relay.
///
/// The relay owns `from` and `time`; `type` and `content` pass through
/// untouched, so payloads the relay does not understand are still forwarded.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEnvelope {
    pub from: ConnectionId,
    pub to: Recipient,
    pub time: DateTime<Utc>,
    pub kind: String,
    pub content: Value,
}

/// JSON frame of a stamped envelope.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeFrame {
    from: ConnectionId,
    to: Recipient,
    time: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Value,
}

impl RelayEnvelope {
    /// Stamp an inbound client envelope: the sender and time are overwritten,
    /// a missing (or empty) `to` becomes `"all"`, `type` becomes `"message"`
    /// and `content` becomes `""`.
    pub fn stamp(from: ConnectionId, inbound: WireEnvelope, time: DateTime<Utc>) -> Self {
        let to = match inbound.to.as_deref() {
            None | Some("") => Recipient::All,
            Some(raw) => Recipient::parse(raw),
        };

        let kind = match inbound.kind {
            None => EnvelopeKind::Message.as_str().to_string(),
            Some(raw) if raw.is_empty() => EnvelopeKind::Message.as_str().to_string(),
            Some(raw) => raw,
        };

        let content = match inbound.content {
            None | Some(Value::Null) => Value::String(String::new()),
            Some(value) => value,
        };

        Self {
            from,
            to,
            time,
            kind,
            content,
        }
    }

    /// Relay-generated lifecycle envelope addressed to everybody.
    pub fn synthetic(from: ConnectionId, kind: EnvelopeKind, time: DateTime<Utc>) -> Self {
        Self {
            from,
            to: Recipient::All,
            time,
            kind: kind.as_str().to_string(),
            content: Value::String(String::new()),
        }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        let frame = EnvelopeFrame {
            from: self.from.clone(),
            to: self.to.clone(),
            time: self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind: self.kind.clone(),
            content: self.content.clone(),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        let frame: EnvelopeFrame = serde_json::from_str(raw)?;
        let time = DateTime::parse_from_rfc3339(&frame.time)?.with_timezone(&Utc);
        Ok(Self {
            from: frame.from,
            to: frame.to,
            time,
            kind: frame.kind,
            content: frame.content,
        })
    }

    /// Type the payload. Fails on an unknown `type` or a `content` that does
    /// not fit it.
    pub fn decode(self) -> Result<Envelope, EnvelopeError> {
        let kind = EnvelopeKind::parse(&self.kind)
            .ok_or_else(|| EnvelopeError::UnknownType(self.kind.clone()))?;
        Ok(Envelope {
            from: self.from,
            to: self.to,
            time: self.time,
            body: Body::from_parts(kind, self.content)?,
        })
    }
}

/// A relay-stamped envelope with a typed payload, as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Authoritative sender, always assigned by the relay
    pub from: ConnectionId,
    pub to: Recipient,
    /// Transit time assigned by the relay
    pub time: DateTime<Utc>,
    pub body: Body,
}

impl Envelope {
    pub fn synthetic(from: ConnectionId, body: Body, time: DateTime<Utc>) -> Self {
        Self {
            from,
            to: Recipient::All,
            time,
            body,
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.body.kind()
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        RelayEnvelope {
            from: self.from.clone(),
            to: self.to.clone(),
            time: self.time,
            kind: self.body.kind().as_str().to_string(),
            content: self.body.content()?,
        }
        .to_json()
    }

    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        RelayEnvelope::from_json(raw)?.decode()
    }
}

/// Envelope as emitted by a client: only addressee and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    pub to: Recipient,
    pub body: Body,
}

impl OutboundEnvelope {
    pub fn broadcast(body: Body) -> Self {
        Self {
            to: Recipient::All,
            body,
        }
    }

    pub fn unicast(to: ConnectionId, body: Body) -> Self {
        Self {
            to: Recipient::Client(to),
            body,
        }
    }

    pub fn to_wire(&self) -> Result<WireEnvelope, EnvelopeError> {
        Ok(WireEnvelope {
            from: None,
            to: Some(self.to.to_string()),
            time: None,
            kind: Some(self.body.kind().as_str().to_string()),
            content: Some(self.body.content()?),
        })
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&self.to_wire()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signal() -> SignalPayload {
        SignalPayload {
            uuid: FileId::new(),
            session: SessionId::new(),
            sdp: SessionDescription::offer("v=0"),
            ice: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            },
        }
    }

    fn stamp(json: &str) -> RelayEnvelope {
        RelayEnvelope::stamp(
            ConnectionId::from("a"),
            WireEnvelope::from_json(json).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_stamp_applies_defaults() {
        let inbound = WireEnvelope::from_json("{}").unwrap();
        let now = Utc::now();
        let env = RelayEnvelope::stamp(ConnectionId::from("a"), inbound, now);

        assert_eq!(env.to, Recipient::All);
        assert_eq!(env.kind, "message");
        assert_eq!(env.content, json!(""));
        assert_eq!(env.time, now);
        assert_eq!(env.decode().unwrap().body, Body::Message(String::new()));
    }

    #[test]
    fn test_stamp_overwrites_client_from_and_time() {
        let env = stamp(
            r#"{"from":"Mallory","time":"1999-01-01T00:00:00Z","to":"b","type":"enter","content":"Alice"}"#,
        );

        assert_eq!(env.from, ConnectionId::from("a"));
        assert_eq!(env.to, Recipient::Client(ConnectionId::from("b")));

        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["from"], "a");
        assert_ne!(json["time"], "1999-01-01T00:00:00Z");
        assert_eq!(env.decode().unwrap().body, Body::Enter("Alice".into()));
    }

    #[test]
    fn test_stamp_keeps_payload_opaque() {
        let content = json!({"uuid": "u1", "session": "s1", "sdp": "sdp1", "ice": "ice1"});
        let env = stamp(&format!(r#"{{"to":"b","type":"search","content":{content}}}"#));
        assert_eq!(env.kind, "search");
        assert_eq!(env.content, content);

        let forwarded: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(forwarded["content"], content);

        let unknown = stamp(r#"{"type":"shout","content":{"x":1}}"#);
        assert_eq!(unknown.kind, "shout");
        assert_eq!(unknown.content, json!({"x": 1}));
    }

    #[test]
    fn test_decode_rejects_unknown_type_and_bad_payload() {
        assert!(matches!(
            stamp(r#"{"type":"shout"}"#).decode(),
            Err(EnvelopeError::UnknownType(_))
        ));
        assert!(matches!(
            stamp(r#"{"type":"file"}"#).decode(),
            Err(EnvelopeError::InvalidContent { kind: "file", .. })
        ));
    }

    #[test]
    fn test_synthetic_envelope_wire_shape() {
        let env = RelayEnvelope::synthetic(ConnectionId::from("b"), EnvelopeKind::Connect, Utc::now());
        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "connect");
        assert_eq!(json["to"], "all");
        assert_eq!(json["content"], "");
        assert!(json["time"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_signal_payload_uses_browser_field_names() {
        let payload = signal();
        let value = Body::Search(payload.clone()).content().unwrap();

        assert_eq!(value["sdp"]["type"], "offer");
        assert_eq!(value["ice"]["sdpMLineIndex"], 0);
        assert_eq!(value["ice"]["sdpMid"], "0");
        assert_eq!(value["session"], json!(payload.session.0.to_string()));
    }

    #[test]
    fn test_stamped_envelope_decodes_on_client() {
        let payload = signal();
        let outbound =
            OutboundEnvelope::unicast(ConnectionId::from("b"), Body::Find(payload.clone()));
        let stamped = stamp(&outbound.to_json().unwrap());

        let decoded = Envelope::from_json(&stamped.to_json().unwrap()).unwrap();
        assert_eq!(decoded.from, ConnectionId::from("a"));
        assert_eq!(decoded.body, Body::Find(payload));
    }

    #[test]
    fn test_text_content_is_best_effort() {
        let body = Body::from_parts(EnvelopeKind::Message, json!(42)).unwrap();
        assert_eq!(body, Body::Message("42".into()));
    }
}
