//! A headless live-blog embed: two polling loops feeding one timeline.
//!
//! The blog loop watches the blog record (description, `ClosedOn`), the posts
//! loop pulls post deltas. Both start and pause together. All merging happens
//! on the task that owns the [`LiveBlogEmbed`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{FutureExt, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;

use livedesk_frontend::{
    Blog, PostDom, QueryFilter, Refetch, RetryPolicy, TimelineController, TimelineState,
    DEFAULT_INTERVAL_SECS,
};

use crate::client::LiveDeskApi;
use crate::error::EmbedError;
use crate::polling::{FailureCount, FetchFn, PollingSync, Stream, SyncEvent};

#[derive(Clone, Debug)]
pub struct EmbedOptions {
    pub interval: Duration,
    pub retry: RetryPolicy,
    /// Where the rendered page is written whenever it changes.
    pub snapshot: Option<PathBuf>,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        EmbedOptions {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            retry: RetryPolicy::default(),
            snapshot: None,
        }
    }
}

pub struct LiveBlogEmbed<A: LiveDeskApi, D: PostDom> {
    api: Arc<A>,
    timeline: TimelineController<D>,
    options: EmbedOptions,
    sink: UnboundedSender<SyncEvent>,
    events: UnboundedReceiver<SyncEvent>,
    blog_sync: Option<PollingSync>,
    posts_sync: Option<PollingSync>,
    failures: Arc<FailureCount>,
    /// Refetches and one-off fetches whose results have not arrived yet.
    outstanding: usize,
    active: bool,
    last_snapshot: Option<String>,
}

impl<A: LiveDeskApi, D: PostDom> LiveBlogEmbed<A, D> {
    pub fn new(api: Arc<A>, timeline: TimelineController<D>, options: EmbedOptions) -> Self {
        let (sink, events) = unbounded();
        LiveBlogEmbed {
            api,
            timeline,
            options,
            sink,
            events,
            blog_sync: None,
            posts_sync: None,
            failures: Arc::new(FailureCount::default()),
            outstanding: 0,
            active: false,
            last_snapshot: None,
        }
    }

    pub fn timeline(&self) -> &TimelineController<D> {
        &self.timeline
    }

    /// Fetch failures seen by either polling loop.
    pub fn fetch_failures(&self) -> u64 {
        self.failures.get()
    }

    pub fn is_running(&self) -> bool {
        self.blog_sync.as_ref().map_or(false, PollingSync::is_running)
            || self.posts_sync.as_ref().map_or(false, PollingSync::is_running)
    }

    /// Fetches the blog, retrying with backoff. Once the attempts run out the
    /// timeline shows its error banner and the embed stays inert.
    pub async fn load(&mut self) -> Result<(), EmbedError> {
        let mut attempt = 0;
        let record = loop {
            attempt += 1;
            match self.api.get_blog().await {
                Ok(record) => break record,
                Err(err) => match self.options.retry.delay(attempt) {
                    Some(delay) => {
                        warn!("blog fetch attempt {} failed: {}; retrying in {:?}", attempt, err, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.timeline.fail_initial_load(&err.to_string());
                        return Err(EmbedError::InitialLoad {
                            attempts: attempt,
                            source: err,
                        });
                    }
                },
            }
        };

        let blog = match Blog::hydrate(&record) {
            Ok(blog) => blog,
            Err(err) => {
                self.timeline.fail_initial_load(&err.to_string());
                return Err(err.into());
            }
        };
        let posts_url = self.api.posts_url(&blog);
        info!("loading posts from {}", posts_url);

        self.active = true;
        let inline = blog.inline_posts().to_vec();
        let refetches = self.timeline.load_blog(blog);
        self.spawn_refetches(refetches);
        self.build_syncs(posts_url);
        if let Some(sync) = &self.posts_sync {
            // inline posts are already merged; the first tick asks for deltas
            let since = sync.observe(&inline);
            debug!("posts cursor seeded at {}", since);
        }
        Ok(())
    }

    fn build_syncs(&mut self, posts_url: String) {
        let api = self.api.clone();
        let fetch_blog: FetchFn = Arc::new(move |_: Option<QueryFilter>| {
            let api = api.clone();
            async move { api.get_blog().await.map(|blog| vec![blog]) }.boxed()
        });

        let api = self.api.clone();
        let fetch_posts: FetchFn = Arc::new(move |filter| {
            let api = api.clone();
            let posts_url = posts_url.clone();
            async move { api.get_posts(posts_url, filter).await }.boxed()
        });

        self.blog_sync = Some(
            PollingSync::new(Stream::Blog, fetch_blog, self.options.interval, self.sink.clone())
                .without_cursor()
                .with_observer(self.failures.clone()),
        );
        self.posts_sync = Some(
            PollingSync::new(Stream::Posts, fetch_posts, self.options.interval, self.sink.clone())
                .with_observer(self.failures.clone()),
        );
    }

    pub fn start(&mut self) {
        for sync in [&mut self.blog_sync, &mut self.posts_sync].into_iter().flatten() {
            sync.start();
        }
    }

    pub fn pause(&mut self) {
        for sync in [&mut self.blog_sync, &mut self.posts_sync].into_iter().flatten() {
            sync.pause();
        }
    }

    fn spawn_refetches(&mut self, refetches: Vec<Refetch>) {
        for Refetch { id, href } in refetches {
            let url = self.api.post_url(&id, href.as_deref());
            debug!("post {}: fetching {}", id, url);
            let api = self.api.clone();
            let sink = self.sink.clone();
            self.outstanding += 1;
            tokio::spawn(async move {
                let result = api.get_post(url).await;
                let _ = sink.unbounded_send(SyncEvent::Detail(id, result));
            });
        }
    }

    /// One posts fetch outside the timer, tracked until it delivers.
    fn spawn_final_fetch(&mut self) {
        let task = match &self.posts_sync {
            Some(sync) => sync.fetch_task(),
            None => return,
        };
        let sink = self.sink.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            task.await;
            let _ = sink.unbounded_send(SyncEvent::Completed(Stream::Posts));
        });
    }

    pub fn handle_event(&mut self, event: SyncEvent) {
        if !self.active {
            debug!("embed inactive, dropping {:?}", event);
            return;
        }
        let was_closed = self.timeline.state() == TimelineState::Closed;

        match event {
            SyncEvent::Updating(Stream::Posts) => {
                self.timeline.begin_update();
                let retries = self.timeline.take_retries();
                self.spawn_refetches(retries);
            }
            SyncEvent::Updated(Stream::Posts) => self.timeline.finish_update(),
            SyncEvent::Updating(Stream::Blog) | SyncEvent::Updated(Stream::Blog) => {}
            SyncEvent::Batch(Stream::Blog, records) => self.merge_blog_records(&records),
            SyncEvent::Batch(Stream::Posts, records) => {
                let refetches = self.timeline.merge_posts(&records);
                self.spawn_refetches(refetches);
            }
            SyncEvent::Completed(_) => {
                self.outstanding = self.outstanding.saturating_sub(1);
            }
            SyncEvent::Detail(id, result) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                match result {
                    Ok(record) => self.timeline.merge_detail(&record),
                    Err(err) => {
                        warn!("post {}: detail fetch failed: {}", id, err);
                        self.timeline.abandon_refetch(&id);
                    }
                }
            }
        }

        if !was_closed && self.timeline.state() == TimelineState::Closed {
            info!("blog closed, polling stopped");
            self.pause();
            self.spawn_final_fetch();
            let retries = self.timeline.take_retries();
            self.spawn_refetches(retries);
        }
    }

    fn merge_blog_records(&mut self, records: &[Value]) {
        for record in records {
            match Blog::hydrate(record) {
                Ok(blog) => {
                    let refetches = self.timeline.load_blog(blog);
                    self.spawn_refetches(refetches);
                }
                Err(err) => warn!("skipping blog record: {}", err),
            }
        }
    }

    /// Closed with nothing left in flight.
    pub fn is_finished(&self) -> bool {
        self.timeline.state() == TimelineState::Closed && self.outstanding == 0 && !self.is_running()
    }

    /// Loads the blog if needed, then merges until the blog closes or
    /// `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), EmbedError>
    where
        F: Future<Output = ()>,
    {
        if self.timeline.state() == TimelineState::Loading {
            self.load().await?;
        }
        if self.timeline.state() == TimelineState::Closed {
            info!("blog already closed, fetching its posts once");
            self.spawn_final_fetch();
        } else {
            self.start();
        }
        self.write_snapshot().await?;

        tokio::pin!(shutdown);
        while !self.is_finished() {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
                event = self.events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
            self.write_snapshot().await?;
        }

        self.pause();
        self.active = false;
        self.write_snapshot().await
    }

    async fn write_snapshot(&mut self) -> Result<(), EmbedError> {
        let path = match &self.options.snapshot {
            Some(path) => path.clone(),
            None => return Ok(()),
        };
        let html = match self.timeline.dom().snapshot() {
            Some(html) => html,
            None => return Ok(()),
        };
        if self.last_snapshot.as_ref() == Some(&html) {
            return Ok(());
        }

        tokio::fs::write(&path, &html).await?;
        debug!("snapshot written to {}", path.display());
        self.last_snapshot = Some(html);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, ClientResult};
    use futures_util::future::BoxFuture;
    use livedesk_frontend::{MemoryDom, NoAvatars, PostId};
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted server. Blog responses are consumed in order and the last
    /// one repeats; post batches likewise fall back to an empty delta.
    #[derive(Default)]
    struct FakeApi {
        blogs: Mutex<VecDeque<Result<Value, u16>>>,
        posts: Mutex<VecDeque<Vec<Value>>>,
        details: Mutex<HashMap<String, Value>>,
        blog_calls: AtomicUsize,
        post_calls: AtomicUsize,
        detail_calls: AtomicUsize,
        /// Detail fetches that fail before the first one succeeds.
        detail_failures: AtomicUsize,
        filters: Mutex<Vec<Option<QueryFilter>>>,
    }

    impl FakeApi {
        fn new(blogs: Vec<Result<Value, u16>>, posts: Vec<Vec<Value>>) -> Arc<Self> {
            Arc::new(FakeApi {
                blogs: Mutex::new(blogs.into()),
                posts: Mutex::new(posts.into()),
                ..FakeApi::default()
            })
        }

        fn with_detail(self: Arc<Self>, url: &str, record: Value) -> Arc<Self> {
            self.details.lock().unwrap().insert(url.to_string(), record);
            self
        }
    }

    impl LiveDeskApi for FakeApi {
        fn get_blog(&self) -> BoxFuture<'_, ClientResult<Value>> {
            self.blog_calls.fetch_add(1, Ordering::SeqCst);
            let mut blogs = self.blogs.lock().unwrap();
            let next = if blogs.len() > 1 {
                blogs.pop_front()
            } else {
                blogs.front().cloned()
            };
            let result = match next {
                Some(Ok(blog)) => Ok(blog),
                Some(Err(status)) => Err(ClientError::Server {
                    status,
                    message: "unavailable".into(),
                }),
                None => Err(ClientError::InvalidResponse("no blog".into())),
            };
            async move { result }.boxed()
        }

        fn get_posts(
            &self,
            _posts_url: String,
            filter: Option<QueryFilter>,
        ) -> BoxFuture<'_, ClientResult<Vec<Value>>> {
            self.post_calls.fetch_add(1, Ordering::SeqCst);
            self.filters.lock().unwrap().push(filter);
            let batch = self.posts.lock().unwrap().pop_front().unwrap_or_default();
            async move { Ok(batch) }.boxed()
        }

        fn get_post(&self, url: String) -> BoxFuture<'_, ClientResult<Value>> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .detail_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                let result: ClientResult<Value> = Err(ClientError::Server {
                    status: 503,
                    message: "try again".into(),
                });
                return async move { result }.boxed();
            }
            let result = self
                .details
                .lock()
                .unwrap()
                .get(&url)
                .cloned()
                .ok_or(ClientError::Server {
                    status: 404,
                    message: url,
                });
            async move { result }.boxed()
        }

        fn posts_url(&self, _blog: &Blog) -> String {
            "/posts".into()
        }

        fn post_url(&self, id: &PostId, href: Option<&str>) -> String {
            href.map(String::from)
                .unwrap_or_else(|| format!("/posts/{}", id))
        }
    }

    fn post(id: u32, cid: u64, order: f64, content: &str) -> Value {
        json!({
            "Id": id.to_string(), "CId": cid, "Order": order,
            "Type": {"Key": "normal"}, "Content": content, "AuthorName": "Desk",
        })
    }

    fn open_blog() -> Value {
        json!({"Title": "Election night", "PostPublished": {"href": "/posts"}})
    }

    fn closed_blog() -> Value {
        json!({
            "Title": "Election night", "ClosedOn": "2013-05-01T20:00:00",
            "PostPublished": {"href": "/posts"},
        })
    }

    fn embed(api: Arc<FakeApi>) -> LiveBlogEmbed<FakeApi, MemoryDom> {
        let timeline = TimelineController::new(MemoryDom::new(), Box::new(NoAvatars));
        LiveBlogEmbed::new(api, timeline, EmbedOptions::default())
    }

    fn ids(embed: &LiveBlogEmbed<FakeApi, MemoryDom>) -> Vec<String> {
        embed
            .timeline()
            .dom()
            .ids()
            .into_iter()
            .map(|id| id.0)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_retries_then_fails() {
        let api = FakeApi::new(vec![Err(503)], Vec::new());
        let mut embed = embed(api.clone());

        let err = embed.load().await.unwrap_err();

        assert!(matches!(err, EmbedError::InitialLoad { attempts: 5, .. }));
        assert_eq!(api.blog_calls.load(Ordering::SeqCst), 5);
        assert_eq!(embed.timeline().state(), TimelineState::Failed);
        assert!(embed
            .timeline()
            .dom()
            .status()
            .starts_with("The live blog could not be loaded: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_recovers() {
        let api = FakeApi::new(vec![Err(502), Err(502), Ok(open_blog())], Vec::new());
        let mut embed = embed(api.clone());

        embed.load().await.unwrap();

        assert_eq!(api.blog_calls.load(Ordering::SeqCst), 3);
        assert_eq!(embed.timeline().state(), TimelineState::Live);
        assert_eq!(embed.timeline().dom().title(), "Election night");
    }

    #[tokio::test(start_paused = true)]
    async fn test_posts_stream_and_change_only_refetch() {
        let api = FakeApi::new(
            vec![Ok(open_blog())],
            vec![
                vec![post(1, 1, 2.0, "first"), post(2, 2, 1.0, "second")],
                vec![json!({"Id": "3", "CId": 3, "href": "/posts/3"})],
            ],
        )
        .with_detail("/posts/3", post(3, 3, 3.0, "third"));
        let mut embed = embed(api.clone());

        embed
            .run(tokio::time::sleep(Duration::from_secs(15)))
            .await
            .unwrap();

        assert_eq!(ids(&embed), vec!["3", "1", "2"]);
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            api.filters.lock().unwrap()[..2],
            [None, Some(QueryFilter { since: 2 })]
        );
        assert!(embed.timeline().is_load_finished());
        assert!(embed.timeline().dom().status().starts_with("updated on "));
        assert!(!embed.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_blog_stops_ticks() {
        let api = FakeApi::new(
            vec![Ok(open_blog()), Ok(open_blog()), Ok(closed_blog())],
            vec![
                vec![post(1, 1, 1.0, "kick off")],
                vec![post(2, 2, 2.0, "full time")],
                vec![post(2, 2, 2.0, "full time")],
            ],
        );
        let mut embed = embed(api.clone());

        embed
            .run(tokio::time::sleep(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert_eq!(embed.timeline().state(), TimelineState::Closed);
        assert_eq!(ids(&embed), vec!["2", "1"]);
        assert!(embed
            .timeline()
            .dom()
            .status()
            .starts_with("The liveblog coverage was stopped "));

        let blog_calls = api.blog_calls.load(Ordering::SeqCst);
        let post_calls = api.post_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(api.blog_calls.load(Ordering::SeqCst), blog_calls);
        assert_eq!(api.post_calls.load(Ordering::SeqCst), post_calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_blog_is_fetched_once() {
        let api = FakeApi::new(vec![Ok(closed_blog())], vec![vec![post(1, 1, 1.0, "summary")]]);
        let mut embed = embed(api.clone());

        embed
            .run(tokio::time::sleep(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert_eq!(ids(&embed), vec!["1"]);
        assert_eq!(api.blog_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.post_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_detail_does_not_block_load() {
        let api = FakeApi::new(
            vec![Ok(open_blog())],
            vec![vec![json!({"Id": "9", "CId": 9})]],
        );
        let mut embed = embed(api.clone());

        embed
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(ids(&embed).is_empty());
        assert!(embed.timeline().is_load_finished());
        assert!(embed.timeline().has_pending_refetches());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_detail_fetch_is_retried_on_next_tick() {
        let api = FakeApi::new(
            vec![Ok(open_blog())],
            vec![
                vec![post(1, 1, 1.0, "first")],
                vec![json!({"Id": "9", "CId": 9, "href": "/posts/9"})],
            ],
        )
        .with_detail("/posts/9", post(9, 9, 2.0, "ninth"));
        api.detail_failures.store(1, Ordering::SeqCst);
        let mut embed = embed(api.clone());

        embed
            .run(tokio::time::sleep(Duration::from_secs(25)))
            .await
            .unwrap();

        assert_eq!(ids(&embed), vec!["9", "1"]);
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 2);
        assert!(!embed.timeline().has_pending_refetches());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_posts_seed_the_cursor() {
        let blog = json!({
            "Title": "Election night",
            "PostPublished": [post(1, 4, 1.0, "inline")],
        });
        let api = FakeApi::new(vec![Ok(blog)], Vec::new());
        let mut embed = embed(api.clone());

        embed
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(ids(&embed), vec!["1"]);
        assert_eq!(
            api.filters.lock().unwrap().first(),
            Some(&Some(QueryFilter { since: 4 }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_embed_drops_events() {
        let api = FakeApi::new(vec![Ok(open_blog())], Vec::new());
        let mut embed = embed(api);

        embed.handle_event(SyncEvent::Batch(Stream::Posts, vec![post(1, 1, 1.0, "late")]));

        assert!(ids(&embed).is_empty());
    }
}
