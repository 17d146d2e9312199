use crate::handler::RequestHandler;
use crate::http::{self, Status};
use anyhow::{anyhow, Context};
use log::{debug, error};
use mio::net::{TcpListener, TcpStream};
use mio::{
    event::{Event, Events},
    Interest, Poll, Token,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;

const SERVER: Token = Token(0);
const MAX_HEAD_SIZE: usize = 8 * 1024;
const FILE_CHUNK_SIZE: usize = 64 * 1024;

enum ReadState {
    Pending,
    Complete,
    TooLarge,
    Closed,
}

struct Connection {
    stream: TcpStream,
    request: Vec<u8>,
    response: Vec<u8>,
    written: usize,
    // Remainder of the body, read one chunk at a time as the socket drains.
    file: Option<File>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Connection {
            stream,
            request: Vec::new(),
            response: Vec::new(),
            written: 0,
            file: None,
        }
    }

    // Edge triggered: drain the socket until it would block.
    fn read_request(&mut self) -> anyhow::Result<ReadState> {
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) if self.request.is_empty() => return Ok(ReadState::Closed),
                Ok(0) => return Ok(ReadState::Complete),
                Ok(nbytes) => {
                    self.request.extend_from_slice(&buf[..nbytes]);
                    match http::head_end(&self.request) {
                        Some(end) if end > MAX_HEAD_SIZE => return Ok(ReadState::TooLarge),
                        Some(_) => return Ok(ReadState::Complete),
                        None if self.request.len() > MAX_HEAD_SIZE => {
                            return Ok(ReadState::TooLarge)
                        }
                        None => {}
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(ReadState::Pending),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns true once the whole response has been written.
    fn write_response(&mut self) -> anyhow::Result<bool> {
        loop {
            if self.written == self.response.len() && !self.next_chunk()? {
                return Ok(true);
            }
            match self.stream.write(&self.response[self.written..]) {
                Ok(0) => return Err(anyhow!("Connection closed while writing")),
                Ok(nbytes) => self.written += nbytes,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Refills the write buffer from the file; false when nothing is left.
    fn next_chunk(&mut self) -> anyhow::Result<bool> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Ok(false),
        };
        self.response.resize(FILE_CHUNK_SIZE, 0);
        let nbytes = file.read(&mut self.response)?;
        self.response.truncate(nbytes);
        self.written = 0;
        if nbytes == 0 {
            self.file = None;
            return Ok(false);
        }
        Ok(true)
    }
}

pub struct WebServer {
    listening_soc: TcpListener,
    conns: HashMap<usize, Connection>,
    next_conn_id: usize,
    handler: RequestHandler,
}

impl WebServer {
    pub fn new(addr: SocketAddr, handler: RequestHandler) -> anyhow::Result<Self> {
        let listening_soc =
            TcpListener::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
        Ok(WebServer {
            listening_soc,
            conns: HashMap::new(),
            next_conn_id: 1,
            handler,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listening_soc.local_addr()?)
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut poll = Poll::new()?;
        poll.registry()
            .register(&mut self.listening_soc, SERVER, Interest::READABLE)?;

        let mut events = Events::with_capacity(1024);

        loop {
            match poll.poll(&mut events, None) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("{}", e);
                    continue;
                }
            }

            for event in &events {
                match event.token() {
                    SERVER => loop {
                        let (stream, remote_addr) = match self.listening_soc.accept() {
                            Ok(t) => t,
                            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                            Err(e) => {
                                error!("{}", e);
                                break;
                            }
                        };
                        debug!("Connection from {}", &remote_addr);

                        if let Err(e) = self.register_conn(&poll, stream) {
                            error!("{:?}", e);
                        }
                    },
                    Token(conn_id) => {
                        if let Err(e) = self.handle_http(conn_id, event, &poll) {
                            error!("conn_id {}: {:?}", conn_id, e);
                            self.conns.remove(&conn_id);
                        }
                    }
                }
            }
        }
    }

    fn register_conn(&mut self, poll: &Poll, mut stream: TcpStream) -> anyhow::Result<()> {
        let token = Token(self.next_conn_id);
        poll.registry()
            .register(&mut stream, token, Interest::READABLE)?;

        if self
            .conns
            .insert(self.next_conn_id, Connection::new(stream))
            .is_some()
        {
            error!("Connection ID is already exist.");
        }

        self.next_conn_id += 1;

        Ok(())
    }

    fn handle_http(&mut self, conn_id: usize, event: &Event, poll: &Poll) -> anyhow::Result<()> {
        let conn = match self.conns.get_mut(&conn_id) {
            Some(conn) => conn,
            // Already dropped by an earlier event in this batch.
            None => return Ok(()),
        };

        if event.is_readable() {
            debug!("readable conn_id: {}", conn_id);
            let state = conn.read_request()?;
            match state {
                ReadState::Pending => {}
                ReadState::Closed => {
                    self.conns.remove(&conn_id);
                }
                ReadState::Complete | ReadState::TooLarge => {
                    let response = match state {
                        ReadState::TooLarge => {
                            self.handler
                                .reject(Status::BAD_REQUEST, "Request header too large")
                        }
                        _ => self.handler.respond(&conn.request),
                    };
                    let (head, file) = response.into_parts();
                    conn.response = head;
                    conn.file = file;
                    poll.registry()
                        .reregister(&mut conn.stream, Token(conn_id), Interest::WRITABLE)?;
                }
            }
            Ok(())
        } else if event.is_writable() {
            debug!("writable conn_id: {}", conn_id);
            if conn.write_response()? {
                self.conns.remove(&conn_id);
            }
            Ok(())
        } else {
            Err(anyhow!("Undefined event: {:?}", event))
        }
    }
}
