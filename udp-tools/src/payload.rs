use crate::message::{self, Envelope};
use anyhow::Context;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
    Binary(Vec<u8>),
}

impl Payload {
    /// Wire bytes: UTF-8 text, single-line JSON, or raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.as_bytes().to_vec(),
            Payload::Json(value) => {
                message::to_wire(value).unwrap_or_else(|_| value.to_string().into_bytes())
            }
            Payload::Binary(data) => data.clone(),
        }
    }

    /// Human readable form for console output.
    pub fn describe(&self) -> String {
        match self {
            Payload::Text(text) => format!("text message: {}", text),
            Payload::Json(value) => format!(
                "JSON message: {}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            ),
            Payload::Binary(data) => format!("binary message: {}", hex::encode(data)),
        }
    }

    /// Classifies a line typed at the `send` prompt.
    ///
    /// Input that looks like a JSON object is sent verbatim, whether or not it
    /// parses. Anything else is wrapped in a test message envelope.
    pub fn from_prompt(line: &str) -> Payload {
        if line.trim().starts_with('{') {
            // Valid or not, the bytes go out exactly as typed.
            Payload::Text(line.to_string())
        } else {
            match serde_json::to_value(Envelope::test_message(line)) {
                Ok(value) => Payload::Json(value),
                Err(_) => Payload::Text(line.to_string()),
            }
        }
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Payload> {
        let value = serde_json::from_str(s).context("Invalid JSON")?;
        Ok(Payload::Json(value))
    }

    pub fn from_hex(s: &str) -> anyhow::Result<Payload> {
        Ok(Payload::Binary(parse_hex(s)?))
    }
}

/// Decodes a hex string. Whitespace may separate bytes but never splits one.
pub fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    for group in s.split_ascii_whitespace() {
        let bytes = hex::decode(group).with_context(|| format!("Invalid hex string: {}", s))?;
        data.extend(bytes);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_json_is_sent_verbatim() {
        let line = r#"{"action": "pan", "direction": "left"}"#;
        assert_eq!(Payload::from_prompt(line).to_bytes(), line.as_bytes());
    }

    #[test]
    fn prompt_broken_json_is_plain_text() {
        let line = "{not json";
        assert_eq!(Payload::from_prompt(line), Payload::Text(line.to_string()));
    }

    #[test]
    fn prompt_text_is_wrapped() {
        let payload = Payload::from_prompt("hello bridge");
        let value: Value = serde_json::from_slice(&payload.to_bytes()).unwrap();
        assert_eq!(value["type"], "test_message");
        assert_eq!(value["content"], "hello bridge");
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn json_is_sent_on_one_line_and_shown_pretty() {
        let payload = Payload::from_json_str(r#"{ "action" : "stop" }"#).unwrap();
        assert_eq!(payload.to_bytes(), br#"{"action": "stop"}"#.to_vec());
        assert_eq!(
            payload.describe(),
            "JSON message: {\n  \"action\": \"stop\"\n}"
        );
        assert!(Payload::from_json_str("{oops").is_err());
    }

    #[test]
    fn json_keeps_key_order_and_ascii() {
        let payload = Payload::from_json_str(r#"{"zoom":"in","action":"zoom","note":"ñ"}"#).unwrap();
        assert_eq!(
            payload.to_bytes(),
            br#"{"zoom": "in", "action": "zoom", "note": "\u00f1"}"#.to_vec()
        );
    }

    #[test]
    fn hex_decoding() {
        assert_eq!(parse_hex("010032").unwrap(), vec![0x01, 0x00, 0x32]);
        assert_eq!(parse_hex("de ad BE EF").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("0 1").is_err());
        assert!(parse_hex("dea d").is_err());
        assert_eq!(parse_hex("dead beef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(
            Payload::from_hex("ff00").unwrap().describe(),
            "binary message: ff00"
        );
    }

    #[test]
    fn text_payload() {
        let payload = Payload::Text("Hello".to_string());
        assert_eq!(payload.to_bytes(), b"Hello".to_vec());
        assert_eq!(payload.describe(), "text message: Hello");
    }
}
