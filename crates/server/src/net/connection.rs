//! Per-connection state and the request/reply cycle.
//!
//! Each connection owns a growing read buffer and a pending write buffer.
//! After every socket read, complete frames are decoded from position 0 and
//! dispatched one by one, so pipelined requests produce replies in request
//! order. A protocol error terminates the connection without a reply.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use anyhow::Result;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, info_span, Instrument};

use kestrel_core::resp::{parser, Encoder, Frame, FrameError};
use kestrel_core::store::aol::AolWriter;
use kestrel_core::store::Db;

use crate::command::{self, Command};

const READ_BUFFER_CAPACITY: usize = 4096;

pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    db: Rc<RefCell<Db>>,
    aol: Rc<RefCell<Option<AolWriter>>>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    encoder: Encoder,
    aol_encoder: Encoder,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        db: Rc<RefCell<Db>>,
        aol: Rc<RefCell<Option<AolWriter>>>,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            db,
            aol,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            encoder: Encoder::with_capacity(READ_BUFFER_CAPACITY),
            aol_encoder: Encoder::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    pub async fn handle(&mut self) -> Result<()> {
        let conn_span = info_span!("connection", peer = %self.peer_addr);

        async {
            info!("connection established");

            loop {
                let n = self.stream.read_buf(&mut self.read_buf).await?;
                if n == 0 {
                    debug!("client disconnected");
                    break;
                }

                // Drain every complete frame before waiting for more bytes;
                // this is what makes pipelining work.
                loop {
                    let mut pos = 0;
                    let frame = match parser::parse(&self.read_buf, &mut pos) {
                        Ok(frame) => frame,
                        Err(FrameError::Incomplete) => break,
                        Err(FrameError::Protocol(msg)) => {
                            // Malformed input: close without attempting a reply.
                            error!(error = %msg, "protocol error, closing connection");
                            return Ok(());
                        }
                    };
                    self.read_buf.advance(pos);
                    self.process(frame);
                }

                if !self.write_buf.is_empty() {
                    self.stream.write_all(&self.write_buf).await?;
                    self.write_buf.clear();
                }
            }

            info!("connection closed");
            Ok(())
        }
        .instrument(conn_span)
        .await
    }

    /// Dispatch one request frame, queue its reply and log it if it is a
    /// successfully executed write command.
    fn process(&mut self, request: Frame) {
        // The request frame is consumed by parsing, so capture its canonical
        // encoding up front when it may have to be logged.
        let mut aol_payload = None;
        if self.aol.borrow().is_some() && command::is_write(&request) {
            self.aol_encoder.clear();
            self.aol_encoder.encode(&request);
            aol_payload = Some(self.aol_encoder.as_bytes().to_vec());
        }

        let reply = match Command::from_frame(request) {
            Ok(Command::BgRewriteAof) => self.bgrewriteaof(),
            Ok(cmd) => {
                let reply = match cmd.execute(&mut self.db.borrow_mut()) {
                    Ok(reply) => reply,
                    Err(e) => Frame::Error(e.to_string()),
                };
                debug!(command = cmd.name(), "command executed");
                reply
            }
            Err(e) => Frame::Error(e.to_string()),
        };

        // Failed commands were never applied to the store and must not
        // enter the log.
        if !matches!(reply, Frame::Error(_)) {
            if let Some(payload) = aol_payload {
                if let Some(aol) = self.aol.borrow_mut().as_mut() {
                    if let Err(e) = aol.append(&payload) {
                        error!(error = %e, "failed to append to log");
                    }
                }
            }
        }

        self.encoder.clear();
        self.encoder.encode(&reply);
        self.write_buf.extend_from_slice(self.encoder.as_bytes());
    }

    /// BGREWRITEAOF runs against the append log rather than the store, so it
    /// is handled here: snapshot the map on the loop, hand it to the rewrite
    /// worker, fail fast if one is already running.
    fn bgrewriteaof(&self) -> Frame {
        let mut aol = self.aol.borrow_mut();
        match aol.as_mut() {
            Some(aol) => {
                let snapshot = self.db.borrow().snapshot();
                match aol.start_rewrite(snapshot) {
                    Ok(()) => {
                        Frame::SimpleString("Background AOF rewrite started".to_string())
                    }
                    Err(_) => Frame::Error("ERR rewrite already in progress".to_string()),
                }
            }
            None => Frame::Error("ERR append log is disabled".to_string()),
        }
    }
}
