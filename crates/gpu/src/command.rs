//! Command queues and command buffers.
//!
//! A [`CommandQueue`] executes committed [`CommandBuffer`]s strictly in
//! commit order on a dedicated thread. Work is encoded into a buffer as a
//! list of operations; when the buffer finishes (or its first operation
//! fails) every registered completion handler runs with the outcome.
//!
//! Callers choose how to observe completion:
//! - [`CommandBuffer::commit_and_wait`] blocks the calling thread,
//! - [`CommandBuffer::commit_and_await`] suspends on a one-shot channel,
//! - [`CommandBuffer::add_completed_handler`] + [`CommandBuffer::commit`]
//!   runs a callback on the queue thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tokio::sync::oneshot;

use crate::error::{GpuError, GpuResult};
use crate::texture::Texture;

type Operation = Box<dyn FnOnce() -> GpuResult<()> + Send>;
type CompletionHandler = Box<dyn FnOnce(GpuResult<()>) + Send>;

struct Committed {
    label: u64,
    operations: Vec<Operation>,
    handlers: Vec<CompletionHandler>,
}

/// Serial executor for command buffers.
#[derive(Clone)]
pub struct CommandQueue {
    label: Arc<str>,
    tx: mpsc::Sender<Committed>,
    open: Arc<AtomicBool>,
    next_buffer: Arc<AtomicU64>,
}

impl CommandQueue {
    /// Start a queue with its own executor thread.
    pub fn new(label: &str) -> GpuResult<Self> {
        let (tx, rx) = mpsc::channel::<Committed>();
        let thread_label = label.to_string();
        thread::Builder::new()
            .name(format!("gpu-queue-{label}"))
            .spawn(move || run_queue(&thread_label, rx))
            .map_err(|e| GpuError::AcceleratorUnavailable {
                message: format!("failed to start command queue thread: {e}"),
            })?;

        Ok(Self {
            label: Arc::from(label),
            tx,
            open: Arc::new(AtomicBool::new(true)),
            next_buffer: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn make_command_buffer(&self) -> GpuResult<CommandBuffer> {
        if !self.open.load(Ordering::Acquire) {
            return Err(GpuError::CouldNotMakeCommandBuffer);
        }
        Ok(CommandBuffer {
            label: self.next_buffer.fetch_add(1, Ordering::Relaxed),
            operations: Vec::new(),
            handlers: Vec::new(),
            queue: self.tx.clone(),
        })
    }

    /// Stop vending command buffers. Already committed work still runs.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

fn run_queue(label: &str, rx: mpsc::Receiver<Committed>) {
    tracing::trace!(queue = label, "Command queue started");
    while let Ok(committed) = rx.recv() {
        let mut outcome = Ok(());
        for operation in committed.operations {
            if let Err(e) = operation() {
                tracing::debug!(
                    queue = label,
                    buffer = committed.label,
                    error = %e,
                    "Command buffer failed"
                );
                outcome = Err(e);
                break;
            }
        }
        for handler in committed.handlers {
            handler(outcome.clone());
        }
    }
    tracing::trace!(queue = label, "Command queue stopped");
}

/// A batch of encoded work submitted to a queue as a unit.
pub struct CommandBuffer {
    label: u64,
    operations: Vec<Operation>,
    handlers: Vec<CompletionHandler>,
    queue: mpsc::Sender<Committed>,
}

impl CommandBuffer {
    pub fn label(&self) -> u64 {
        self.label
    }

    /// Append an operation. Operations run in encode order.
    pub fn encode(&mut self, operation: impl FnOnce() -> GpuResult<()> + Send + 'static) {
        self.operations.push(Box::new(operation));
    }

    /// Encode a full-texture copy.
    pub fn encode_blit(&mut self, from: &Texture, to: &Texture) -> GpuResult<()> {
        if from.size() != to.size() {
            return Err(GpuError::SizeMismatch {
                expected: to.size(),
                actual: from.size(),
            });
        }
        let (from, to) = (from.clone(), to.clone());
        self.encode(move || from.copy_to(&to));
        Ok(())
    }

    pub fn add_completed_handler(&mut self, handler: impl FnOnce(GpuResult<()>) + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn encoded_operations(&self) -> usize {
        self.operations.len()
    }

    /// Submit for execution.
    pub fn commit(self) -> GpuResult<()> {
        let committed = Committed {
            label: self.label,
            operations: self.operations,
            handlers: self.handlers,
        };
        self.queue.send(committed).map_err(|_| GpuError::QueueClosed)
    }

    /// Submit and block until the buffer has completed.
    pub fn commit_and_wait(mut self) -> GpuResult<()> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.add_completed_handler(move |outcome| {
            let _ = tx.send(outcome);
        });
        self.commit()?;
        rx.recv().map_err(|_| GpuError::QueueClosed)?
    }

    /// Submit and suspend until the buffer has completed.
    pub async fn commit_and_await(mut self) -> GpuResult<()> {
        let (tx, rx) = oneshot::channel();
        self.add_completed_handler(move |outcome| {
            let _ = tx.send(outcome);
        });
        self.commit()?;
        rx.await.map_err(|_| GpuError::QueueClosed)?
    }
}
