//! Non-blocking Diagnostic Buffer
//!
//! Timing loops (the hiccup probe and the task runner's busy-poll loop) must
//! never block on terminal or file I/O. They hand messages to this buffer
//! instead; a background consumer thread drains it and forwards every message
//! to the `log` facade.
//!
//! Uses crossbeam_channel for thread-safe, non-blocking message passing.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::Level;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A diagnostic message to be logged
#[derive(Clone, Debug)]
pub struct DiagnosticMessage {
    /// Level the consumer logs the message at
    pub level: Level,
    /// The log message content
    pub message: String,
    /// Timestamp when the message was created
    pub timestamp: Instant,
}

/// Non-blocking diagnostic buffer using crossbeam channels
pub struct DiagnosticBuffer {
    /// Sender side of the channel for non-blocking sends
    sender: Option<Sender<DiagnosticMessage>>,
    /// Receiver side (held until the consumer starts)
    receiver: Option<Receiver<DiagnosticMessage>>,
    /// Handle to the background consumer thread
    consumer_thread: Option<thread::JoinHandle<()>>,
    /// Stop flag for the consumer thread
    stop_flag: Arc<AtomicBool>,
    /// Messages rejected because the channel was full
    dropped: AtomicU64,
    /// Messages accepted but not yet handed to the logger
    pending: Arc<AtomicU64>,
    /// Channel capacity (max pending messages)
    capacity: usize,
}

impl DiagnosticBuffer {
    /// Creates a new diagnostic buffer with the specified capacity
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of pending messages before sends are
    ///   rejected (typically 1024-4096 for measurement loops)
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        DiagnosticBuffer {
            sender: Some(sender),
            receiver: Some(receiver),
            consumer_thread: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            dropped: AtomicU64::new(0),
            pending: Arc::new(AtomicU64::new(0)),
            capacity,
        }
    }

    /// Starts the background consumer thread
    ///
    /// The consumer reads messages from the channel and forwards them to the
    /// installed logger. Calling this twice is a no-op.
    pub fn start_consumer(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            let stop_flag = self.stop_flag.clone();
            let pending = self.pending.clone();
            let consumer_thread = thread::Builder::new()
                .name("diagnostic-consumer".to_string())
                .spawn(move || loop {
                    match receiver.recv_timeout(Duration::from_millis(100)) {
                        Ok(msg) => {
                            log::log!(target: "hiccup_bench::diagnostic", msg.level, "{}", msg.message);
                            pending.fetch_sub(1, Ordering::AcqRel);
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            if stop_flag.load(Ordering::Relaxed) {
                                break;
                            }
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                });

            match consumer_thread {
                Ok(handle) => self.consumer_thread = Some(handle),
                Err(e) => log::warn!("Failed to spawn diagnostic consumer: {}", e),
            }
        }
    }

    /// Non-blocking send of a diagnostic message
    ///
    /// Returns `Err` if the channel is full; the measurement thread continues
    /// without blocking and the drop is counted.
    pub fn send(&self, level: Level, message: &str) -> Result<(), TrySendError<DiagnosticMessage>> {
        let msg = DiagnosticMessage {
            level,
            message: message.to_string(),
            timestamp: Instant::now(),
        };
        let Some(ref sender) = self.sender else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(TrySendError::Disconnected(msg));
        };

        // Counted before the send so the consumer can never observe it negative
        self.pending.fetch_add(1, Ordering::AcqRel);
        let result = sender.try_send(msg);
        if result.is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Messages queued or being logged right now
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every accepted message has reached the logger, or until
    /// `timeout` passes. Returns whether the buffer was fully drained.
    ///
    /// Senders are not blocked; messages sent during the wait are waited for too.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Number of messages rejected so far
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the current capacity of the buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for DiagnosticBuffer {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);

        // Dropping the sender lets the consumer drain what is queued and exit
        self.sender.take();

        if let Some(thread) = self.consumer_thread.take() {
            let _ = thread.join();
        }
    }
}

lazy_static::lazy_static! {
    /// Global diagnostic buffer instance (singleton)
    static ref GLOBAL_DIAGNOSTIC_BUFFER: Mutex<Option<Arc<DiagnosticBuffer>>> = Mutex::new(None);
}

/// Initialize the global diagnostic buffer, or return the existing one.
pub fn init_global_buffer(capacity: usize) -> Arc<DiagnosticBuffer> {
    let mut buffer_ref = GLOBAL_DIAGNOSTIC_BUFFER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(existing) = buffer_ref.as_ref() {
        return existing.clone();
    }

    let mut buffer = DiagnosticBuffer::new(capacity);
    buffer.start_consumer();
    let arc = Arc::new(buffer);
    *buffer_ref = Some(arc.clone());
    arc
}

/// Get the global diagnostic buffer
/// Returns `None` if not initialized (caller should handle gracefully)
pub fn get_global_buffer() -> Option<Arc<DiagnosticBuffer>> {
    let buffer_ref = GLOBAL_DIAGNOSTIC_BUFFER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    buffer_ref.as_ref().cloned()
}

/// Drain the global buffer into the logger before exit.
///
/// Returns `true` when nothing was left behind (or no buffer exists).
pub fn flush_global_buffer(timeout: Duration) -> bool {
    match get_global_buffer() {
        Some(buffer) => {
            let drained = buffer.flush(timeout);
            if !drained {
                log::warn!(
                    "Diagnostic buffer not drained within {:?}: {} messages lost",
                    timeout,
                    buffer.pending_count()
                );
            }
            drained
        }
        None => true,
    }
}

/// Send a diagnostic message at `level`, silently ignoring it if the global
/// buffer is not initialized or full.
pub fn send_diagnostic_at(level: Level, message: &str) {
    if let Some(buffer) = get_global_buffer() {
        let _ = buffer.send(level, message);
    }
}

/// Send an informational diagnostic message
pub fn send_diagnostic(message: &str) {
    send_diagnostic_at(Level::Info, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_buffer_creation() {
        let buffer = DiagnosticBuffer::new(256);
        assert_eq!(buffer.capacity(), 256);
        assert_eq!(buffer.dropped_count(), 0);
    }

    #[test]
    fn test_diagnostic_buffer_send() {
        let mut buffer = DiagnosticBuffer::new(256);
        buffer.start_consumer();

        let result = buffer.send(Level::Info, "[TEST] Non-blocking send");
        assert!(result.is_ok());
    }

    #[test]
    fn test_flush_waits_for_consumer() {
        let mut buffer = DiagnosticBuffer::new(512);
        buffer.start_consumer();

        for i in 0..200 {
            buffer.send(Level::Debug, &format!("[TEST] message {}", i)).unwrap();
        }
        assert!(buffer.flush(Duration::from_secs(5)));
        assert_eq!(buffer.pending_count(), 0);
        assert_eq!(buffer.dropped_count(), 0);
    }

    #[test]
    fn test_flush_times_out_without_consumer() {
        let buffer = DiagnosticBuffer::new(8);
        buffer.send(Level::Info, "stuck").unwrap();

        let start = Instant::now();
        assert!(!buffer.flush(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(buffer.pending_count(), 1);
    }

    #[test]
    fn test_full_buffer_rejects_without_blocking() {
        // No consumer: the second message cannot be queued
        let buffer = DiagnosticBuffer::new(1);
        assert!(buffer.send(Level::Warn, "first").is_ok());
        assert!(matches!(
            buffer.send(Level::Warn, "second"),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(buffer.dropped_count(), 1);
        assert_eq!(buffer.pending_count(), 1);
    }

    #[test]
    fn test_global_buffer_is_singleton() {
        let a = init_global_buffer(64);
        let b = init_global_buffer(1024);
        assert!(Arc::ptr_eq(&a, &b));
        send_diagnostic("[TEST] global buffer message");
    }
}
