use crate::message::{self, Envelope, Registration};
use anyhow::Context;
use log::{debug, error, info};
use serde_json::Value;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

const RECV_BUF_SIZE: usize = 1024;

#[derive(Debug, PartialEq)]
pub enum Received {
    Json {
        value: Value,
        /// Acknowledgement to send back when the message carried an action.
        reply: Option<Envelope>,
    },
    Raw(String),
}

impl Received {
    pub fn classify(text: &str) -> Received {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return Received::Raw(text.to_string()),
        };
        let reply = value
            .get("action")
            .filter(|action| is_truthy(action))
            .map(|action| Envelope::received(action.clone()));
        Received::Json { value, reply }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub struct Listener {
    socket: UdpSocket,
}

impl Listener {
    pub fn bind(addr: impl ToSocketAddrs) -> anyhow::Result<Self> {
        let addr = crate::resolve(addr)?;
        let socket = UdpSocket::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
        Ok(Listener { socket })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Announces this listener to the bridge so it forwards traffic here.
    pub fn register(&self, bridge: SocketAddr) -> anyhow::Result<Registration> {
        let registration = Registration::new(self.local_addr()?.port());
        let data = message::to_wire(&registration)?;
        self.socket
            .send_to(&data, bridge)
            .with_context(|| format!("Failed to register with {}", bridge))?;
        Ok(registration)
    }

    /// Receives and handles a single datagram.
    pub fn recv_once(&self) -> anyhow::Result<Received> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        let (size, src) = self
            .socket
            .recv_from(&mut buf)
            .context("A datagram could not be received")?;
        debug!("receive data from {}, size: {}", src, size);
        self.handle_datagram(&buf[..size], src)
    }

    pub fn handle_datagram(&self, data: &[u8], src: SocketAddr) -> anyhow::Result<Received> {
        let message = String::from_utf8_lossy(data);
        println!("[UDP Received] from {}: {}", src, message);

        let received = Received::classify(&message);
        match &received {
            Received::Json { value, reply } => {
                println!("[Parsed] {}", value);
                if let Some(reply) = reply {
                    let data = message::to_wire(reply)?;
                    self.socket
                        .send_to(&data, src)
                        .with_context(|| format!("Failed to respond to {}", src))?;
                    println!(
                        "[UDP Sent] response to {}: {}",
                        src,
                        String::from_utf8_lossy(&data)
                    );
                }
            }
            Received::Raw(text) => println!("[Raw] {}", text),
        }
        Ok(received)
    }

    pub fn run(&self) -> anyhow::Result<()> {
        info!("UDP listener started on {}", self.local_addr()?);
        loop {
            if let Err(e) = self.recv_once() {
                error!("{:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn classifies_datagrams() {
        assert_eq!(
            Received::classify("plain words"),
            Received::Raw("plain words".to_string())
        );

        match Received::classify(r#"{"action":"pan","direction":"left"}"#) {
            Received::Json { value, reply } => {
                assert_eq!(value["direction"], "left");
                match reply {
                    Some(Envelope::Response {
                        original_action,
                        status,
                        ..
                    }) => {
                        assert_eq!(original_action, json!("pan"));
                        assert_eq!(status, "received");
                    }
                    other => panic!("unexpected reply {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn falsy_or_missing_action_gets_no_reply() {
        for text in &[r#"{"seq":1}"#, r#"{"action":""}"#, r#"{"action":null}"#, "[1,2]", "42"] {
            match Received::classify(text) {
                Received::Json { reply, .. } => assert!(reply.is_none(), "{}", text),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn registers_and_acknowledges_over_loopback() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let listen_addr = listener.local_addr().unwrap();

        let bridge = UdpSocket::bind("127.0.0.1:0").unwrap();
        bridge
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let bridge_addr = bridge.local_addr().unwrap();

        let registration = listener.register(bridge_addr).unwrap();
        assert_eq!(registration.client_id, format!("listener_{}", listen_addr.port()));

        let mut buf = [0u8; 1024];
        let (size, src) = bridge.recv_from(&mut buf).unwrap();
        assert_eq!(src, listen_addr);
        let value: Value = serde_json::from_slice(&buf[..size]).unwrap();
        assert_eq!(value["action"], "register");

        bridge.send_to(br#"{"action":"zoom"}"#, listen_addr).unwrap();
        let received = listener.recv_once().unwrap();
        assert!(matches!(received, Received::Json { reply: Some(_), .. }));

        let (size, _) = bridge.recv_from(&mut buf).unwrap();
        let value: Value = serde_json::from_slice(&buf[..size]).unwrap();
        assert_eq!(value["type"], "response");
        assert_eq!(value["original_action"], "zoom");
        assert_eq!(value["status"], "received");
    }

    #[test]
    fn invalid_utf8_is_shown_lossily() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let src = listener.local_addr().unwrap();
        let received = listener.handle_datagram(&[0x66, 0xff, 0x6f], src).unwrap();
        assert_eq!(received, Received::Raw("f\u{fffd}o".to_string()));
    }
}
