use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, Serializer};
use std::fmt;
use std::io;

pub fn timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The bridge's peers write `", "` and `": "` separators and escape non-ASCII
/// as `\uXXXX`; this formatter produces the same bytes.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serializes a message the way it goes out on the wire.
pub fn to_wire<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

pub fn to_wire_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    // Only ASCII is ever written.
    Ok(String::from_utf8_lossy(&to_wire(value)?).into_owned())
}

/// Sent by a listener so the bridge learns where to forward datagrams.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Registration {
    pub action: String,
    pub client_id: String,
    pub timestamp: i64,
}

impl Registration {
    pub fn new(listen_port: u16) -> Self {
        Registration {
            action: "register".to_string(),
            client_id: format!("listener_{}", listen_port),
            timestamp: timestamp_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    TestMessage {
        content: String,
        timestamp: i64,
    },
    Response {
        original_action: serde_json::Value,
        status: String,
        timestamp: i64,
    },
}

impl Envelope {
    pub fn test_message(content: impl Into<String>) -> Self {
        Envelope::TestMessage {
            content: content.into(),
            timestamp: timestamp_millis(),
        }
    }

    pub fn received(original_action: serde_json::Value) -> Self {
        Envelope::Response {
            original_action,
            status: "received".to_string(),
            timestamp: timestamp_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::In => "in",
            Direction::Out => "out",
        };
        write!(f, "{}", s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PtzCommand {
    Pan { direction: Direction, speed: u32 },
    Tilt { direction: Direction, speed: u32 },
    Zoom { direction: Direction, value: u32 },
    Stop,
    Preset { number: u32 },
    Custom { value: i64, message: String },
}

impl PtzCommand {
    pub fn to_json(&self) -> serde_json::Value {
        // Plain data, serialization cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// The fixed sequence sent by the `test` mode.
    pub fn test_sequence() -> Vec<PtzCommand> {
        vec![
            PtzCommand::Pan {
                direction: Direction::Left,
                speed: 50,
            },
            PtzCommand::Pan {
                direction: Direction::Right,
                speed: 50,
            },
            PtzCommand::Tilt {
                direction: Direction::Up,
                speed: 30,
            },
            PtzCommand::Tilt {
                direction: Direction::Down,
                speed: 30,
            },
            PtzCommand::Zoom {
                direction: Direction::In,
                value: 1,
            },
            PtzCommand::Zoom {
                direction: Direction::Out,
                value: 1,
            },
            PtzCommand::Stop,
            PtzCommand::Preset { number: 1 },
            PtzCommand::Custom {
                value: 123,
                message: "test".to_string(),
            },
        ]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StressMessage {
    pub seq: usize,
    /// Seconds since the epoch, fractional.
    pub timestamp: f64,
}

impl StressMessage {
    pub fn new(seq: usize) -> Self {
        StressMessage {
            seq,
            timestamp: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}
