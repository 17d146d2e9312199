use crate::message::PtzCommand;
use crate::payload::Payload;
use anyhow::Context;
use log::debug;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

pub struct Sender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Sender {
    pub fn new(target: impl ToSocketAddrs) -> anyhow::Result<Self> {
        let target = crate::resolve(target)?;
        let local: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(local).context("Failed to bind socket")?;
        Ok(Sender { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn send_bytes(&self, data: &[u8]) -> anyhow::Result<usize> {
        let nbytes = self
            .socket
            .send_to(data, self.target)
            .with_context(|| format!("Failed to send to {}", self.target))?;
        debug!("sent {} bytes to {}", nbytes, self.target);
        Ok(nbytes)
    }

    pub fn send_payload(&self, payload: &Payload) -> anyhow::Result<usize> {
        self.send_bytes(&payload.to_bytes())
    }

    pub fn send_text(&self, message: &str) -> anyhow::Result<usize> {
        self.send_payload(&Payload::Text(message.to_string()))
    }

    pub fn send_json(&self, value: &serde_json::Value) -> anyhow::Result<usize> {
        self.send_payload(&Payload::Json(value.clone()))
    }

    pub fn send_binary(&self, data: &[u8]) -> anyhow::Result<usize> {
        self.send_bytes(data)
    }

    pub fn send_ptz(&self, command: &PtzCommand) -> anyhow::Result<usize> {
        self.send_json(&command.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;
    use std::time::Duration;

    fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 1024];
        let (size, _) = socket.recv_from(&mut buf).unwrap();
        buf[..size].to_vec()
    }

    #[test]
    fn sends_each_payload_kind() {
        let (socket, addr) = receiver();
        let sender = Sender::new(addr).unwrap();
        assert_eq!(sender.target(), addr);

        assert_eq!(sender.send_text("Hello").unwrap(), 5);
        assert_eq!(recv(&socket), b"Hello");

        sender.send_binary(&[0x01, 0x00, 0x32]).unwrap();
        assert_eq!(recv(&socket), vec![0x01, 0x00, 0x32]);

        let nbytes = sender
            .send_ptz(&PtzCommand::Tilt {
                direction: Direction::Up,
                speed: 50,
            })
            .unwrap();
        let wire = br#"{"action": "tilt", "direction": "up", "speed": 50}"#;
        assert_eq!(recv(&socket), wire.to_vec());
        assert_eq!(nbytes, wire.len());
    }

    #[test]
    fn localhost_prefers_ipv4() {
        let (socket, addr) = receiver();
        let sender = Sender::new(("localhost", addr.port())).unwrap();
        assert!(sender.target().is_ipv4());
        sender.send_text("ping").unwrap();
        assert_eq!(recv(&socket), b"ping");
    }
}
