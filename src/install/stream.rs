//! Ordered progress stream for one installation.
//!
//! The background task is the only writer. Dropping the [`EventSink`] closes
//! the stream; if that happens before a terminal event was sent, the sink
//! pushes a final `error` so consumers never mistake an abort for success.
//! One channel slot is reserved up front for the terminal event, so it is
//! delivered even when the consumer has stopped reading.

use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::Utc;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::models::{InstallEvent, InstallEventKind};

/// Events buffered before the producer waits for the consumer, including the
/// slot held for the terminal event.
pub const CHANNEL_CAPACITY: usize = 64;

pub fn channel() -> (EventSink, InstallStream) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    // The channel is new and its receiver alive, so a slot is always free.
    let terminal = tx.clone().try_reserve_owned().ok();
    (
        EventSink {
            tx,
            terminal,
            seq: 0,
            consumer_gone: false,
        },
        InstallStream { rx },
    )
}

/// Writer half of an installation stream.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<InstallEvent>,
    /// Slot for the last event; taken once the stream is finished.
    terminal: Option<mpsc::OwnedPermit<InstallEvent>>,
    seq: u64,
    consumer_gone: bool,
}

impl EventSink {
    fn event(&mut self, kind: InstallEventKind, message: String, data: Option<Value>) -> InstallEvent {
        let event = InstallEvent {
            seq: self.seq,
            kind,
            message,
            data,
            timestamp: Utc::now(),
        };
        self.seq += 1;
        event
    }

    /// Append a non-terminal event.
    pub async fn emit(&mut self, kind: InstallEventKind, message: impl Into<String>, data: Option<Value>) {
        let event = self.event(kind, message.into(), data);
        if self.tx.send(event).await.is_err() && !self.consumer_gone {
            // The installation keeps going so the dev server still restarts.
            tracing::debug!("Install stream consumer disconnected");
            self.consumer_gone = true;
        }
    }

    /// Send the final `complete` event and close the stream.
    pub async fn complete(mut self, message: impl Into<String>, data: Option<Value>) {
        self.finish(InstallEventKind::Complete, message.into(), data);
    }

    /// Send a terminal `error` event and close the stream.
    pub async fn fail(mut self, message: impl Into<String>, data: Option<Value>) {
        self.finish(InstallEventKind::Error, message.into(), data);
    }

    fn finish(&mut self, kind: InstallEventKind, message: String, data: Option<Value>) {
        let event = self.event(kind, message, data);
        if let Some(permit) = self.terminal.take() {
            permit.send(event);
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        if self.terminal.is_none() {
            return;
        }
        tracing::warn!("Install stream closed without a terminal event");
        self.finish(
            InstallEventKind::Error,
            "Installation aborted unexpectedly".to_string(),
            Some(serde_json::json!({ "reason": "aborted" })),
        );
    }
}

/// Reader half of an installation stream.
#[derive(Debug)]
pub struct InstallStream {
    rx: mpsc::Receiver<InstallEvent>,
}

impl InstallStream {
    /// Drain the stream until the producer closes it.
    pub async fn collect_all(mut self) -> Vec<InstallEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for InstallStream {
    type Item = InstallEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
