use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::codec::{decode_header, FrameConfig, Message, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::message::MessageType;

/// Incremental message decoder.
///
/// Holds the partial header or payload of the message currently being
/// received, so bytes can arrive in arbitrary fragments. The decoder never
/// reads ahead of the current message: leftover input stays with the caller.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    max_payload: usize,
}

#[derive(Debug)]
enum State {
    AwaitingHeader {
        buf: [u8; HEADER_SIZE],
        filled: usize,
    },
    AwaitingPayload {
        kind: MessageType,
        buf: Vec<u8>,
        filled: usize,
    },
}

impl State {
    fn idle() -> Self {
        State::AwaitingHeader {
            buf: [0u8; HEADER_SIZE],
            filled: 0,
        }
    }
}

/// Outcome of one readiness-driven read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// More bytes are needed; wait for the next readable event.
    Pending,
    /// The peer closed the stream.
    Closed,
    /// A message completed.
    Message(Message),
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            state: State::idle(),
            max_payload: config.max_payload_size,
        }
    }

    /// True when no part of a message has been received.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitingHeader { filled: 0, .. })
    }

    /// True while the header of the current message is incomplete.
    pub fn awaiting_header(&self) -> bool {
        matches!(self.state, State::AwaitingHeader { .. })
    }

    /// Bytes of the current part (header or payload) received so far.
    pub fn filled(&self) -> usize {
        match &self.state {
            State::AwaitingHeader { filled, .. } | State::AwaitingPayload { filled, .. } => *filled,
        }
    }

    /// Consume bytes from `input`, stopping at the end of the current message.
    ///
    /// `input` is advanced past the consumed bytes. Returns the message once
    /// its last byte has been consumed.
    pub fn feed<'a>(&mut self, input: &mut &'a [u8]) -> Result<Option<Message>> {
        loop {
            let rest: &'a [u8] = *input;
            let target = self.remaining_mut();
            let n = target.len().min(rest.len());
            target[..n].copy_from_slice(&rest[..n]);
            *input = &rest[n..];
            self.advance(n);

            if !self.is_full() {
                return Ok(None);
            }
            if let Some(message) = self.complete()? {
                return Ok(Some(message));
            }
        }
    }

    /// Handle one readable event on a non-blocking source.
    ///
    /// Performs a single read of at most the bytes missing from the current
    /// header or payload. When the header completes the payload read is
    /// attempted right away, since it is often already buffered by the OS.
    pub fn read_from<R: Read>(&mut self, src: &mut R) -> Result<ReadStatus> {
        loop {
            let read = match src.read(self.remaining_mut()) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(ReadStatus::Pending),
                Err(err) => return Err(FrameError::Io(err)),
            };
            self.advance(read);

            if !self.is_full() {
                return Ok(ReadStatus::Pending);
            }
            if let Some(message) = self.complete()? {
                return Ok(ReadStatus::Message(message));
            }
        }
    }

    /// Drop any partially received message.
    pub fn reset(&mut self) {
        self.state = State::idle();
    }

    fn remaining_mut(&mut self) -> &mut [u8] {
        match &mut self.state {
            State::AwaitingHeader { buf, filled } => &mut buf[*filled..],
            State::AwaitingPayload { buf, filled, .. } => &mut buf[*filled..],
        }
    }

    fn advance(&mut self, n: usize) {
        match &mut self.state {
            State::AwaitingHeader { filled, .. } | State::AwaitingPayload { filled, .. } => {
                *filled += n
            }
        }
    }

    fn is_full(&self) -> bool {
        match &self.state {
            State::AwaitingHeader { filled, .. } => *filled == HEADER_SIZE,
            State::AwaitingPayload { buf, filled, .. } => *filled == buf.len(),
        }
    }

    /// Advance past a full header or payload. The decoder is idle again
    /// afterwards unless a non-empty payload is still expected.
    fn complete(&mut self) -> Result<Option<Message>> {
        match std::mem::replace(&mut self.state, State::idle()) {
            State::AwaitingHeader { buf, .. } => {
                let header = decode_header(&buf);
                let kind = header.kind().ok_or(FrameError::UnknownType(header.tag))?;
                let length = header.length as usize;
                if length > self.max_payload {
                    return Err(FrameError::PayloadTooLarge {
                        size: length,
                        max: self.max_payload,
                    });
                }
                if length == 0 {
                    return Ok(Some(Message::empty(kind)));
                }
                self.state = State::AwaitingPayload {
                    kind,
                    buf: vec![0u8; length],
                    filled: 0,
                };
                Ok(None)
            }
            State::AwaitingPayload { kind, buf, .. } => Ok(Some(Message {
                kind,
                payload: Some(Bytes::from(buf)),
            })),
        }
    }
}
