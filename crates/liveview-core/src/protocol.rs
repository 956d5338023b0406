//! Wire protocol between the server runtime and the browser client.
//!
//! One JSON object per WebSocket frame. The client sends two shapes:
//!
//! ```json
//! {"type":"data","id":"btn","event":"Click","data":null}
//! {"type":"get","id_ret":"<request id>","data":"current text"}
//! ```
//!
//! The server sends fragment updates (`fill`, `text`, `propertie`, `style`,
//! `remove`, `script`) and query requests (`get`). The misspelled
//! `propertie` tag is what the client script matches on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{ComponentId, RequestId};

/// Message received from the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// A DOM event on a mounted component.
    #[serde(rename = "data")]
    Invoke {
        /// Target component.
        id: ComponentId,
        /// Event name (`Click`, `KeyUp`, ...).
        event: String,
        /// Event payload; `null` when absent.
        #[serde(default)]
        data: Value,
    },
    /// The answer to a server-initiated query.
    #[serde(rename = "get")]
    QueryResponse {
        /// Request being answered.
        id_ret: RequestId,
        /// Value read from the client's view.
        #[serde(default)]
        data: Value,
    },
}

impl ClientFrame {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invoke { .. } => "invoke",
            Self::QueryResponse { .. } => "query_response",
        }
    }
}

/// Decode one text frame from the client.
///
/// The `type` field is inspected first so unknown message kinds are reported
/// separately from frames that are not JSON at all.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("type").and_then(Value::as_str) {
        Some("data" | "get") => Ok(serde_json::from_value(value)?),
        Some(other) => Err(ProtocolError::UnsupportedType(other.to_owned())),
        None => Err(ProtocolError::MissingType),
    }
}

/// What a query reads from the client's element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryKind {
    /// `element.value` (inputs, selects).
    Value,
    /// `element.innerHTML`.
    Html,
    /// `element.innerText`.
    Text,
    /// `element.style.cssText`.
    Style,
    /// An arbitrary DOM property.
    Property(String),
}

impl QueryKind {
    /// Value of the `sub_type` field on the wire.
    pub fn sub_type(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Html => "html",
            Self::Text => "text",
            Self::Style => "style",
            Self::Property(_) => "propertie",
        }
    }

    fn argument(&self) -> Option<String> {
        match self {
            Self::Property(name) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Message sent to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Replace the inner markup of an element.
    Fill {
        /// Target element.
        id: ComponentId,
        /// New inner HTML.
        value: String,
    },
    /// Replace the text content of an element.
    Text {
        /// Target element.
        id: ComponentId,
        /// New text.
        value: String,
    },
    /// Set a DOM property.
    #[serde(rename = "propertie")]
    Property {
        /// Target element.
        id: ComponentId,
        /// Property name.
        propertie: String,
        /// Property value.
        value: Value,
    },
    /// Replace the inline style of an element.
    Style {
        /// Target element.
        id: ComponentId,
        /// CSS text.
        value: String,
    },
    /// Remove an element from the document.
    Remove {
        /// Target element.
        id: ComponentId,
    },
    /// Evaluate a script in the page.
    Script {
        /// Script source.
        value: String,
    },
    /// Ask the client for a value; answered by [`ClientFrame::QueryResponse`].
    #[serde(rename = "get")]
    Query {
        /// Element to read.
        id: ComponentId,
        /// Request to answer with.
        id_ret: RequestId,
        /// What to read (`value`, `html`, ...).
        sub_type: String,
        /// Property name for `propertie` queries.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl ServerFrame {
    /// Build a query request frame.
    pub fn query(id: ComponentId, id_ret: RequestId, kind: &QueryKind) -> Self {
        Self::Query {
            id,
            id_ret,
            sub_type: kind.sub_type().to_owned(),
            value: kind.argument(),
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_invoke() {
        let frame = decode(r#"{"type":"data","id":"btn","event":"Click","data":null}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Invoke {
                id: "btn".into(),
                event: "Click".into(),
                data: Value::Null,
            }
        );
        assert_eq!(frame.kind(), "invoke");
    }

    #[test]
    fn decode_invoke_without_data_defaults_to_null() {
        let frame = decode(r#"{"type":"data","id":"btn","event":"Click"}"#).unwrap();
        assert_matches!(frame, ClientFrame::Invoke { data: Value::Null, .. });
    }

    #[test]
    fn decode_query_response() {
        let frame = decode(r#"{"type":"get","id_ret":"r-9","data":"hello"}"#).unwrap();
        assert_matches!(frame, ClientFrame::QueryResponse { ref id_ret, ref data }
            if id_ret.as_str() == "r-9" && data == "hello");
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(decode("not json"), Err(ProtocolError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_missing_type() {
        assert_matches!(decode(r#"{"id":"btn"}"#), Err(ProtocolError::MissingType));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert_matches!(
            decode(r#"{"type":"ping"}"#),
            Err(ProtocolError::UnsupportedType(t)) if t == "ping"
        );
    }

    #[test]
    fn decode_rejects_invoke_missing_fields() {
        assert_matches!(
            decode(r#"{"type":"data","id":"btn"}"#),
            Err(ProtocolError::Malformed(_))
        );
        assert_matches!(
            decode(r#"{"type":"data","id":7,"event":"Click"}"#),
            Err(ProtocolError::Malformed(_))
        );
    }

    #[test]
    fn decode_rejects_response_missing_request_id() {
        assert_matches!(
            decode(r#"{"type":"get","data":"x"}"#),
            Err(ProtocolError::Malformed(_))
        );
    }

    #[test]
    fn fill_frame_shape() {
        let frame = ServerFrame::Fill {
            id: "content".into(),
            value: "<p>hi</p>".into(),
        };
        let parsed: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(parsed, json!({"type": "fill", "id": "content", "value": "<p>hi</p>"}));
    }

    #[test]
    fn property_frame_uses_client_tag() {
        let frame = ServerFrame::Property {
            id: "text_msg".into(),
            propertie: "value".into(),
            value: json!(""),
        };
        let parsed: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(parsed["type"], "propertie");
        assert_eq!(parsed["propertie"], "value");
    }

    #[test]
    fn value_query_frame_omits_argument() {
        let frame = ServerFrame::query("input1".into(), "r-1".into(), &QueryKind::Value);
        let parsed: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            parsed,
            json!({"type": "get", "id": "input1", "id_ret": "r-1", "sub_type": "value"})
        );
    }

    #[test]
    fn property_query_frame_carries_name() {
        let frame = ServerFrame::query(
            "chk".into(),
            "r-2".into(),
            &QueryKind::Property("checked".into()),
        );
        let parsed: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(parsed["sub_type"], "propertie");
        assert_eq!(parsed["value"], "checked");
    }
}
