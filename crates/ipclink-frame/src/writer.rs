use std::io::{ErrorKind, Write};

use ipclink_transport::WaitWritable;

use crate::codec::{Header, Message};
use crate::error::{FrameError, Result};

/// Writes complete messages to a stream that may be non-blocking.
///
/// `WouldBlock` is answered by waiting for writability, so a call returns
/// only once the whole message has been handed to the stream.
pub struct MessageWriter<T> {
    inner: T,
}

impl<T: Write + WaitWritable> MessageWriter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Write a complete message.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        let length = u32::try_from(message.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: message.len(),
            max: u32::MAX as usize,
        })?;
        let header = Header::new(message.kind, length);
        self.write_parts(&header, message.payload.as_deref())
    }

    /// Write a header followed by its payload.
    ///
    /// # Panics
    ///
    /// If the header length does not match the payload.
    pub fn write_parts(&mut self, header: &Header, payload: Option<&[u8]>) -> Result<()> {
        let payload = payload.unwrap_or_default();
        assert_eq!(
            header.length as usize,
            payload.len(),
            "header length does not match payload"
        );

        self.write_all(&header.to_bytes())?;
        self.write_all(payload)?;
        self.flush()
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.inner.write(buf) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => buf = &buf[n..],
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => self.inner.wait_writable()?,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => self.inner.wait_writable()?,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_message, HEADER_SIZE};
    use crate::decoder::FrameDecoder;
    use crate::message::MessageType;

    /// In-memory sink that refuses every other write with `WouldBlock`.
    #[derive(Default)]
    struct FlakySink {
        data: Vec<u8>,
        refuse_next: bool,
        waits: usize,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if std::mem::replace(&mut self.refuse_next, false) {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.refuse_next = true;
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl WaitWritable for FlakySink {
        fn wait_writable(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroSink;

    impl Write for ZeroSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl WaitWritable for ZeroSink {
        fn wait_writable(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_and_blocked_writes_produce_exact_wire_bytes() {
        let message = Message::new(MessageType::Ipc, &b"fragmented write"[..]);
        let mut writer = MessageWriter::new(FlakySink::default());
        writer.write_message(&message).unwrap();

        let mut expected = BytesMut::new();
        encode_message(&message, &mut expected).unwrap();
        assert_eq!(writer.into_inner().data, expected.to_vec());
    }

    #[test]
    fn header_only_message() {
        let mut writer = MessageWriter::new(FlakySink::default());
        writer
            .write_parts(&Header::new(MessageType::Crash, 0), None)
            .unwrap();
        assert_eq!(writer.get_ref().data.len(), HEADER_SIZE);
    }

    #[test]
    #[should_panic(expected = "header length does not match payload")]
    fn mismatched_length_panics() {
        let mut writer = MessageWriter::new(FlakySink::default());
        let _ = writer.write_parts(&Header::new(MessageType::Log, 4), Some(&b"xy"[..]));
    }

    #[test]
    fn zero_write_means_closed() {
        let mut writer = MessageWriter::new(ZeroSink);
        let err = writer
            .write_message(&Message::new(MessageType::Log, &b"x"[..]))
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn writes_over_nonblocking_socket_larger_than_buffer() {
        let (left, mut right) = UnixStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        let payload = vec![0xC3u8; 1024 * 1024];
        let message = Message::new(MessageType::EvalJs, payload);

        let expected = message.clone();
        let reader = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            right.read_to_end(&mut bytes).unwrap();
            let mut input = &bytes[..];
            let mut decoder = FrameDecoder::new();
            let received = decoder.feed(&mut input).unwrap();
            assert_eq!(received, Some(expected));
        });

        let mut writer = MessageWriter::new(&left);
        writer.write_message(&message).unwrap();
        drop(writer);
        left.shutdown(std::net::Shutdown::Write).unwrap();
        reader.join().unwrap();
    }
}
