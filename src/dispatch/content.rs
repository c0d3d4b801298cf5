//! Handler return values.

use serde_json::Value;

/// What a route handler produced.
///
/// Text is written as-is, data goes through the serializer engine (JSON when
/// none is configured), `Empty` leaves whatever the handler put on the response.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Data(Value),
    Bytes(Vec<u8>),
}

impl From<()> for Content {
    fn from(_: ()) -> Self {
        Content::Empty
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Value> for Content {
    fn from(data: Value) -> Self {
        Content::Data(data)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}
