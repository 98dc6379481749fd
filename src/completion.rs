// src/completion.rs
//
// One canonical completion future for an upload, whatever event name the
// backend finishes with. Local files finish with `end`, single-shot S3 puts
// with `success`, multipart uploads with `uploaded`; all of them fail with
// `error`. The first signal settles the future, later ones are ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use anyhow::anyhow;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{EtlError, Result};

pub const EVENT_END: &str = "end";
pub const EVENT_SUCCESS: &str = "success";
pub const EVENT_UPLOADED: &str = "uploaded";
pub const EVENT_ERROR: &str = "error";

/// Event names that count as "finished" and the one that counts as "failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventVocabulary {
    success: Vec<String>,
    error: String,
}

impl Default for EventVocabulary {
    fn default() -> Self {
        Self::new([EVENT_END, EVENT_SUCCESS, EVENT_UPLOADED], EVENT_ERROR)
    }
}

impl EventVocabulary {
    pub fn new<I, S>(success: I, error: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            success: success.into_iter().map(Into::into).collect(),
            error: error.into(),
        }
    }

    pub fn is_success(&self, event: &str) -> bool {
        self.success.iter().any(|e| e == event)
    }

    pub fn is_error(&self, event: &str) -> bool {
        self.error == event
    }

    pub fn error_event(&self) -> &str {
        &self.error
    }
}

type Slot = Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>;

/// Producer half, held by whatever performs the upload. Clones share the
/// same slot, so concurrent emitters still settle at most once.
#[derive(Clone)]
pub struct SignalEmitter {
    vocabulary: Arc<EventVocabulary>,
    slot: Slot,
}

impl SignalEmitter {
    /// Report a named event. Returns `true` only if this call settled the
    /// signal. Names outside the vocabulary are ignored; an error-class name
    /// without a cause settles with a generic transport error.
    pub fn emit(&self, event: &str) -> bool {
        if self.vocabulary.is_success(event) {
            self.send(Ok(event.to_string()), event)
        } else if self.vocabulary.is_error(event) {
            let err = EtlError::transport("upload", anyhow!("`{event}` event without a cause"));
            self.send(Err(err), event)
        } else {
            trace!(event, "ignoring event outside the completion vocabulary");
            false
        }
    }

    /// Report a failure under `event`. Ignored unless `event` is the error name.
    pub fn emit_error(&self, event: &str, err: EtlError) -> bool {
        if !self.vocabulary.is_error(event) {
            trace!(event, "ignoring error under a non-error event name");
            return false;
        }
        self.send(Err(err), event)
    }

    pub fn fail(&self, err: EtlError) -> bool {
        let event = self.vocabulary.error_event().to_string();
        self.emit_error(&event, err)
    }

    /// Settle from a finished operation: `Ok` emits `success_event`, `Err` the error event.
    pub fn settle(&self, result: Result<()>, success_event: &str) -> bool {
        match result {
            Ok(()) => self.emit(success_event),
            Err(err) => self.fail(err),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    fn send(&self, outcome: Result<String>, event: &str) -> bool {
        let sender = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => {
                debug!(event, "completion signal settled");
                // A dropped receiver means nobody is waiting any more.
                let _ = tx.send(outcome);
                true
            }
            None => {
                trace!(event, "completion signal already settled");
                false
            }
        }
    }
}

/// Consumer half. Resolves to the name of the success event that won.
pub struct CompletionSignal {
    rx: oneshot::Receiver<Result<String>>,
}

impl CompletionSignal {
    pub fn channel() -> (SignalEmitter, CompletionSignal) {
        Self::with_vocabulary(EventVocabulary::default())
    }

    pub fn with_vocabulary(vocabulary: EventVocabulary) -> (SignalEmitter, CompletionSignal) {
        let (tx, rx) = oneshot::channel();
        let emitter = SignalEmitter {
            vocabulary: Arc::new(vocabulary),
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (emitter, CompletionSignal { rx })
    }
}

impl Future for CompletionSignal {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(EtlError::transport(
                "upload",
                anyhow!("upload ended without a completion event"),
            )),
        })
    }
}
