use crate::volume::{CommandRequest, CommandResult};
use crate::wasm_processor::{ProcessorConfig, ProcessorError, WasmProcessor};

use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("worker thread is no longer running")]
    Disconnected,
}

/// The terminal reply for one request.
///
/// Every request produces exactly one reply, success or failure, so a
/// pending caller is never left waiting.
#[derive(Debug)]
pub struct WorkerReply {
    pub id: String,
    pub outcome: Result<CommandResult, WorkerError>,
}

/// Handle to the dedicated image-processing thread.
///
/// Requests are handled serially in arrival order and replies come back in
/// the same order; a request runs to completion once sent, there is no
/// cancellation. [`process`](Self::process) is the one-request-at-a-time
/// flow the viewer uses; [`send`](Self::send) and
/// [`next_reply`](Self::next_reply) expose the raw contract for callers that
/// pipeline requests and correlate replies through [`WorkerReply::id`].
pub struct ImageWorker {
    requests: Option<Sender<CommandRequest>>,
    replies: UnboundedReceiver<WorkerReply>,
    thread: Option<JoinHandle<()>>,
}

impl ImageWorker {
    /// Spawn the worker thread.
    ///
    /// The processing module is not touched until the first request arrives.
    pub fn spawn(config: ProcessorConfig) -> Self {
        let (request_tx, request_rx) = channel();
        let (reply_tx, reply_rx) = unbounded();
        let thread = thread::spawn(move || run(config, request_rx, reply_tx));
        Self {
            requests: Some(request_tx),
            replies: reply_rx,
            thread: Some(thread),
        }
    }

    /// Queue a request. Ownership of the voxel buffer moves to the worker.
    ///
    /// # Errors
    ///
    /// `Disconnected` when the worker thread has stopped.
    pub fn send(&self, request: CommandRequest) -> Result<(), WorkerError> {
        self.requests
            .as_ref()
            .ok_or(WorkerError::Disconnected)?
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Await the next reply, in request order.
    ///
    /// # Errors
    ///
    /// `Disconnected` when the worker thread has stopped.
    pub async fn next_reply(&mut self) -> Result<WorkerReply, WorkerError> {
        self.replies.next().await.ok_or(WorkerError::Disconnected)
    }

    /// Send one request and await its reply.
    ///
    /// Assumes no other request is in flight; with pipelined sends, use
    /// [`next_reply`](Self::next_reply) and correlate by id instead.
    pub async fn process(
        &mut self,
        request: CommandRequest,
    ) -> Result<CommandResult, WorkerError> {
        self.send(request)?;
        self.next_reply().await?.outcome
    }
}

impl Drop for ImageWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(
    config: ProcessorConfig,
    requests: Receiver<CommandRequest>,
    replies: UnboundedSender<WorkerReply>,
) {
    let mut processor = WasmProcessor::new(config);
    while let Ok(request) = requests.recv() {
        let id = request.metadata.id.clone();
        let outcome = processor.process(request).map_err(WorkerError::from);
        if replies
            .unbounded_send(WorkerReply { id, outcome })
            .is_err()
        {
            // Receiver gone; nobody is waiting for further replies.
            break;
        }
    }
    debug!("image worker stopped");
}
