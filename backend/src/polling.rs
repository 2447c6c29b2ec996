//! Interval-driven fetch loops.
//!
//! Every tick runs its fetch as its own task, so a slow response never holds
//! back the next tick. Results go into one unbounded channel and are merged
//! by its single consumer in arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_channel::mpsc::UnboundedSender;
use futures_util::future::BoxFuture;
use log::{debug, warn};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use livedesk_frontend::{ChangeCursor, PostId, QueryFilter};

use crate::error::{ClientError, ClientResult};

pub type FetchFuture = BoxFuture<'static, ClientResult<Vec<Value>>>;
pub type FetchFn = Arc<dyn Fn(Option<QueryFilter>) -> FetchFuture + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    Blog,
    Posts,
}

#[derive(Debug)]
pub enum SyncEvent {
    /// A fetch is about to go out.
    Updating(Stream),
    /// Records from one fetch, possibly empty.
    Batch(Stream, Vec<Value>),
    /// Follows a non-empty batch.
    Updated(Stream),
    /// A one-off fetch started outside the timer has delivered.
    Completed(Stream),
    /// Full record requested for a change-only post.
    Detail(PostId, ClientResult<Value>),
}

/// Told about every failed fetch. Failures never stop the loop.
pub trait SyncObserver: Send + Sync {
    fn fetch_failed(&self, stream: Stream, err: &ClientError);
}

#[derive(Debug, Default)]
pub struct FailureCount {
    failures: AtomicU64,
}

impl FailureCount {
    pub fn get(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl SyncObserver for FailureCount {
    fn fetch_failed(&self, _stream: Stream, _err: &ClientError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
struct Tick {
    stream: Stream,
    fetch: FetchFn,
    cursor: Arc<Mutex<ChangeCursor>>,
    use_cursor: bool,
    sink: UnboundedSender<SyncEvent>,
    observer: Option<Arc<dyn SyncObserver>>,
}

impl Tick {
    async fn run(self) -> bool {
        let filter = if self.use_cursor {
            self.cursor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_query_filter()
        } else {
            None
        };

        let _ = self.sink.unbounded_send(SyncEvent::Updating(self.stream));
        match (self.fetch)(filter).await {
            Ok(records) => {
                if self.use_cursor {
                    let latest = self
                        .cursor
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .observe(&records);
                    debug!("{:?}: {} records, cursor at {}", self.stream, records.len(), latest);
                }
                let changed = !records.is_empty();
                let _ = self
                    .sink
                    .unbounded_send(SyncEvent::Batch(self.stream, records));
                if changed {
                    let _ = self.sink.unbounded_send(SyncEvent::Updated(self.stream));
                }
                true
            }
            Err(err) => {
                warn!("{:?} fetch failed: {}", self.stream, err);
                if let Some(observer) = &self.observer {
                    observer.fetch_failed(self.stream, &err);
                }
                false
            }
        }
    }
}

pub struct PollingSync {
    tick: Tick,
    interval: Duration,
    timer: Option<JoinHandle<()>>,
}

impl PollingSync {
    pub fn new(
        stream: Stream,
        fetch: FetchFn,
        interval: Duration,
        sink: UnboundedSender<SyncEvent>,
    ) -> Self {
        PollingSync {
            tick: Tick {
                stream,
                fetch,
                cursor: Arc::new(Mutex::new(ChangeCursor::new())),
                use_cursor: true,
                sink,
                observer: None,
            },
            interval,
            timer: None,
        }
    }

    /// Every fetch asks for the whole resource.
    pub fn without_cursor(mut self) -> Self {
        self.tick.use_cursor = false;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.tick.observer = Some(observer);
        self
    }

    pub fn stream(&self) -> Stream {
        self.tick.stream
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn cursor(&self) -> u64 {
        self.tick
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value()
    }

    /// Feeds records fetched elsewhere into the cursor.
    pub fn observe(&self, records: &[Value]) -> u64 {
        self.tick
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(records)
    }

    /// One fetch-and-merge. Resolves to false when the fetch failed.
    pub async fn fetch_and_merge(&self) -> bool {
        self.tick.clone().run().await
    }

    /// A detached fetch-and-merge that can be spawned.
    pub fn fetch_task(&self) -> impl std::future::Future<Output = bool> + Send + 'static {
        self.tick.clone().run()
    }

    /// Fetches right away, then on every interval until paused.
    pub fn start(&mut self) {
        tokio::spawn(self.tick.clone().run());
        self.pause();

        let tick = self.tick.clone();
        let interval = self.interval;
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tick.sink.is_closed() {
                    debug!("{:?}: sink closed, timer stops", tick.stream);
                    break;
                }
                tokio::spawn(tick.clone().run());
            }
        }));
        debug!("{:?}: polling every {:?}", self.tick.stream, interval);
    }

    pub fn pause(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("{:?}: paused", self.tick.stream);
        }
    }
}

impl Drop for PollingSync {
    fn drop(&mut self) {
        self.pause();
    }
}
