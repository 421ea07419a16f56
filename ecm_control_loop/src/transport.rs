//! Command/feedback transport boundary.
//!
//! The control loop depends only on two narrow capabilities:
//! - [`Subscriber::receive_latest`] - non-blocking, newest batch or nothing
//! - [`Publisher::publish`] - non-blocking, hand one batch to the transport
//!
//! Subscriptions and advertisements are created once, at construction,
//! through a [`TransportContext`] injected by the caller. The in-process
//! [`MailboxTransport`] backs every topic with a single-slot
//! [`Mailbox`], which gives the capacity-1, latest-wins semantics the
//! cycle relies on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ecm_common::messages::{DriveCommandBatch, DriveFeedbackBatch, IoCommandBatch, IoFeedbackBatch};
use parking_lot::Mutex;
use tracing::debug;

use crate::mailbox::Mailbox;

/// Inbound side of a topic.
pub trait Subscriber<T>: Send {
    /// Newest unread message, if any. Never blocks.
    fn receive_latest(&mut self) -> Option<T>;
}

/// Outbound side of a topic.
pub trait Publisher<T>: Send {
    /// Hand `message` over. Never blocks; may drop it if the transport is busy.
    fn publish(&mut self, message: &T);
}

/// Factory for the control loop's four topics.
pub trait TransportContext {
    fn subscribe_drive_commands(&mut self, topic: &str) -> Box<dyn Subscriber<DriveCommandBatch>>;
    fn subscribe_io_commands(&mut self, topic: &str) -> Box<dyn Subscriber<IoCommandBatch>>;
    fn advertise_drive_feedback(&mut self, topic: &str) -> Box<dyn Publisher<DriveFeedbackBatch>>;
    fn advertise_io_feedback(&mut self, topic: &str) -> Box<dyn Publisher<IoFeedbackBatch>>;
}

// ─── Mailbox-backed topics ──────────────────────────────────────────

/// Shared state of one topic.
#[derive(Debug)]
struct Topic<T> {
    mailbox: Mailbox<T>,
    published: AtomicU64,
}

impl<T> Topic<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            mailbox: Mailbox::new(),
            published: AtomicU64::new(0),
        })
    }
}

struct MailboxSubscriber<T> {
    topic: Arc<Topic<T>>,
}

impl<T: Send> Subscriber<T> for MailboxSubscriber<T> {
    #[inline]
    fn receive_latest(&mut self) -> Option<T> {
        self.topic.mailbox.try_take()
    }
}

struct MailboxPublisher<T> {
    topic: Arc<Topic<T>>,
}

impl<T: Clone + Send> Publisher<T> for MailboxPublisher<T> {
    #[inline]
    fn publish(&mut self, message: &T) {
        if self.topic.mailbox.try_post(message.clone()).is_ok() {
            self.topic.published.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// In-process transport: one mailbox per topic.
///
/// The control loop takes the [`TransportContext`] side; the rest of the
/// process talks to the same topics through a [`TransportHandle`].
pub struct MailboxTransport {
    drive_commands: Arc<Topic<DriveCommandBatch>>,
    io_commands: Arc<Topic<IoCommandBatch>>,
    drive_feedback: Arc<Topic<DriveFeedbackBatch>>,
    io_feedback: Arc<Topic<IoFeedbackBatch>>,
    topics: Arc<Mutex<Vec<String>>>,
}

impl MailboxTransport {
    pub fn new() -> Self {
        Self {
            drive_commands: Topic::new(),
            io_commands: Topic::new(),
            drive_feedback: Topic::new(),
            io_feedback: Topic::new(),
            topics: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// External side of the transport.
    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            drive_commands: Arc::clone(&self.drive_commands),
            io_commands: Arc::clone(&self.io_commands),
            drive_feedback: Arc::clone(&self.drive_feedback),
            io_feedback: Arc::clone(&self.io_feedback),
            topics: Arc::clone(&self.topics),
        }
    }

    fn open(&self, topic: &str) {
        debug!("topic {topic} opened");
        self.topics.lock().push(topic.to_string());
    }
}

impl Default for MailboxTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportContext for MailboxTransport {
    fn subscribe_drive_commands(&mut self, topic: &str) -> Box<dyn Subscriber<DriveCommandBatch>> {
        self.open(topic);
        Box::new(MailboxSubscriber {
            topic: Arc::clone(&self.drive_commands),
        })
    }

    fn subscribe_io_commands(&mut self, topic: &str) -> Box<dyn Subscriber<IoCommandBatch>> {
        self.open(topic);
        Box::new(MailboxSubscriber {
            topic: Arc::clone(&self.io_commands),
        })
    }

    fn advertise_drive_feedback(&mut self, topic: &str) -> Box<dyn Publisher<DriveFeedbackBatch>> {
        self.open(topic);
        Box::new(MailboxPublisher {
            topic: Arc::clone(&self.drive_feedback),
        })
    }

    fn advertise_io_feedback(&mut self, topic: &str) -> Box<dyn Publisher<IoFeedbackBatch>> {
        self.open(topic);
        Box::new(MailboxPublisher {
            topic: Arc::clone(&self.io_feedback),
        })
    }
}

/// Client side of a [`MailboxTransport`]. Cheap to clone.
#[derive(Clone)]
pub struct TransportHandle {
    drive_commands: Arc<Topic<DriveCommandBatch>>,
    io_commands: Arc<Topic<IoCommandBatch>>,
    drive_feedback: Arc<Topic<DriveFeedbackBatch>>,
    io_feedback: Arc<Topic<IoFeedbackBatch>>,
    topics: Arc<Mutex<Vec<String>>>,
}

impl TransportHandle {
    /// Post a drive command batch on `/drive_control`; replaces an unread one.
    pub fn send_drive_commands(&self, batch: DriveCommandBatch) {
        self.drive_commands.mailbox.post(batch);
    }

    /// Post a digital output batch on `/digital_outputs`; replaces an unread one.
    pub fn send_io_commands(&self, batch: IoCommandBatch) {
        self.io_commands.mailbox.post(batch);
    }

    /// Take the newest feedback from `/drive_feedback`.
    pub fn take_drive_feedback(&self) -> Option<DriveFeedbackBatch> {
        self.drive_feedback.mailbox.take()
    }

    /// Take the newest feedback from `/digital_inputs`.
    pub fn take_io_feedback(&self) -> Option<IoFeedbackBatch> {
        self.io_feedback.mailbox.take()
    }

    /// Drive feedback batches published so far.
    pub fn drive_feedback_published(&self) -> u64 {
        self.drive_feedback.published.load(Ordering::Relaxed)
    }

    /// Drive feedback batches lost because a reader held the topic.
    pub fn drive_feedback_dropped(&self) -> u64 {
        self.drive_feedback.mailbox.dropped()
    }

    /// I/O feedback batches published so far.
    pub fn io_feedback_published(&self) -> u64 {
        self.io_feedback.published.load(Ordering::Relaxed)
    }

    /// True while a drive command batch waits to be consumed.
    pub fn drive_commands_pending(&self) -> bool {
        self.drive_commands.mailbox.is_pending()
    }

    /// Topics opened by subscribers and publishers, in opening order.
    pub fn open_topics(&self) -> Vec<String> {
        self.topics.lock().clone()
    }

    /// True if `topic` was subscribed or advertised.
    pub fn is_open(&self, topic: &str) -> bool {
        self.topics.lock().iter().any(|t| t == topic)
    }
}
