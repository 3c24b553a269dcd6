//! Send worker: a dedicated thread draining one FIFO of outgoing messages.
//!
//! Producers never block on the socket. Each queued item owns a handle to
//! its endpoint, released once the item has been written or dropped.

use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

use ipclink_frame::{Message, MessageWriter};
use tracing::{debug, error, warn};

use crate::endpoint::Endpoint;

/// One queued write.
pub(crate) struct Outgoing {
    pub(crate) endpoint: Endpoint,
    pub(crate) message: Message,
}

enum Job {
    Write(Outgoing),
    Shutdown,
}

#[derive(Default)]
pub(crate) struct SendWorker {
    queue: OnceLock<mpsc::Sender<Job>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SendWorker {
    /// Queue a write, starting the worker thread on first use.
    pub(crate) fn enqueue(&self, outgoing: Outgoing) {
        if self.stopped.load(Ordering::Acquire) {
            debug!(
                endpoint = outgoing.endpoint.name(),
                kind = %outgoing.message.kind,
                "send worker stopped, dropping message"
            );
            return;
        }
        let queue = self.queue.get_or_init(|| self.start());
        if let Err(mpsc::SendError(_job)) = queue.send(Job::Write(outgoing)) {
            debug!("send worker gone, dropping message");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.queue.get().is_some() && !self.stopped.load(Ordering::Acquire)
    }

    /// Stop accepting writes, drain what is queued, and join the thread.
    pub(crate) fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(queue) = self.queue.get() {
            let _ = queue.send(Job::Shutdown);
        }
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("send worker panicked");
            }
        }
    }

    fn start(&self) -> mpsc::Sender<Job> {
        let (tx, rx) = mpsc::channel();
        match thread::Builder::new()
            .name("ipclink-send".to_string())
            .spawn(move || run(rx))
        {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            // rx went down with the closure; every send now fails and drops
            Err(err) => error!(error = %err, "failed to start send worker"),
        }
        tx
    }
}

fn run(rx: mpsc::Receiver<Job>) {
    debug!("send worker started");
    while let Ok(job) = rx.recv() {
        match job {
            Job::Write(outgoing) => outgoing.write(),
            Job::Shutdown => break,
        }
    }
    debug!("send worker stopped");
}

impl Outgoing {
    fn write(self) {
        let Some(stream) = self.endpoint.writer() else {
            debug!(
                endpoint = self.endpoint.name(),
                kind = %self.message.kind,
                "endpoint disconnected before write, dropping message"
            );
            return;
        };
        let mut writer = MessageWriter::new(&*stream);
        if let Err(err) = writer.write_message(&self.message) {
            warn!(
                endpoint = self.endpoint.name(),
                kind = %self.message.kind,
                error = %err,
                "write failed, closing connection"
            );
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(endpoint = self.endpoint.name(), error = %err, "socket shutdown failed");
            }
        }
    }
}
