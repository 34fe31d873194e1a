//! # ObserverSet: non-blocking fan-out over multiple observers
//!
//! [`ObserverSet`] distributes each [`Event`](crate::events::Event) to
//! multiple observers **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-observer FIFO (queue order).
//! - Panics inside observers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different observers.
//! - No retries on per-observer queue overflow (events are dropped for that
//!   observer).
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per observer)
//!        ├────────────────► [queue O1] ─► worker O1 ─► on_event()
//!        ├────────────────► [queue O2] ─► worker O2 ─► on_event()
//!        └────────────────► [queue ON] ─► worker ON ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::Event;

use super::Observe;

/// Per-observer channel with metadata
struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-observer bounded queues and worker tasks.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl ObserverSet {
    /// Creates a new set and spawns one worker per observer.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let o = Arc::clone(&obs);

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = o.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        eprintln!("[subvisor] observer '{}' panicked: {:?}", o.name(), panic_err);
                    }
                }
            });

            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }

        Self { channels, workers }
    }

    /// Fan-out one event to all observers (non-blocking).
    ///
    /// If an observer's queue is **full** or **closed**, the event is
    /// dropped for it and a warning is logged with the observer's name.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    eprintln!(
                        "[subvisor] observer '{}' dropped event: queue full",
                        channel.name
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    eprintln!(
                        "[subvisor] observer '{}' dropped event: worker closed",
                        channel.name
                    );
                }
            }
        }
    }

    /// Graceful shutdown: close all queues and await worker completion.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::events::EventKind;
    use crate::observers::Observe;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<EventKind>>,
    }

    impl Recording {
        fn seen(&self) -> Vec<EventKind> {
            self.seen.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Observe for Recording {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().expect("lock").push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Observe for Panicky {
        async fn on_event(&self, _event: &Event) {
            panic!("observer bug");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_observer_in_order() {
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        let set = ObserverSet::new(vec![
            Arc::clone(&a) as Arc<dyn Observe>,
            Arc::clone(&b) as Arc<dyn Observe>,
        ]);
        assert_eq!(set.len(), 2);

        set.emit(&Event::now(EventKind::Connecting));
        set.emit(&Event::now(EventKind::Connected));
        set.shutdown().await;

        assert_eq!(a.seen(), [EventKind::Connecting, EventKind::Connected]);
        assert_eq!(b.seen(), [EventKind::Connecting, EventKind::Connected]);
    }

    #[tokio::test]
    async fn panicking_observer_does_not_affect_the_others() {
        let recording = Arc::new(Recording::default());
        let set = ObserverSet::new(vec![
            Arc::new(Panicky) as Arc<dyn Observe>,
            Arc::clone(&recording) as Arc<dyn Observe>,
        ]);

        set.emit(&Event::now(EventKind::Connecting));
        set.emit(&Event::now(EventKind::Connected));
        set.shutdown().await;

        assert_eq!(
            recording.seen(),
            [EventKind::Connecting, EventKind::Connected]
        );
    }

    #[tokio::test]
    async fn empty_set_accepts_events() {
        let set = ObserverSet::new(Vec::new());
        assert!(set.is_empty());
        set.emit(&Event::now(EventKind::Connecting));
        set.shutdown().await;
    }
}
