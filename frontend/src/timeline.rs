//! The controller that owns a blog's timeline.
//!
//! It is fed from the outside: blog records, post batches and single post
//! details go in, refetch requests for change-only records come out. Every
//! visible effect goes through the [`PostDom`] it owns.

use std::collections::{HashMap, HashSet};

use chrono::Local;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::avatar::AvatarSource;
use crate::dom::PostDom;
use crate::ordered_list::OrderedPostList;
use crate::post::{Blog, Post, PostCollection, PostDelta, PostId};
use crate::render::{classify, parse_timestamp, render_post, PostClass};

pub const UPDATING_STATUS: &str = "updating...";
pub const CLOSED_STATUS_PREFIX: &str = "The liveblog coverage was stopped ";
pub const FAILED_STATUS_PREFIX: &str = "The live blog could not be loaded: ";

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum TimelineState {
    Loading,
    Live,
    Closed,
    /// The initial blog fetch gave up; the error banner stays up.
    Failed,
}

/// A post whose change-only record needs its full content fetched again.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Refetch {
    pub id: PostId,
    pub href: Option<String>,
}

/// A detail fetch that was asked for, or that failed and waits for the next
/// posts tick.
#[derive(Clone, Debug)]
struct PendingFetch {
    cid: u64,
    href: Option<String>,
}

#[derive(Clone, Debug)]
struct RenderedPost {
    post: Post,
    class: PostClass,
    markup: String,
    wrapup_open: bool,
}

pub struct TimelineController<D: PostDom> {
    dom: D,
    avatars: Box<dyn AvatarSource>,
    state: TimelineState,
    blog: Option<Blog>,
    list: OrderedPostList,
    posts: HashMap<PostId, RenderedPost>,
    /// Highest change id already asked for, per post.
    in_flight: HashMap<PostId, PendingFetch>,
    /// Failed detail fetches; the cursor has moved past them, so nothing
    /// else would ever ask again.
    retry: HashMap<PostId, PendingFetch>,
    initial_batch_seen: bool,
    /// Posts of the initial batch that have not rendered yet.
    pending_initial: HashSet<PostId>,
    load_finished: bool,
}

impl<D: PostDom> TimelineController<D> {
    pub fn new(dom: D, avatars: Box<dyn AvatarSource>) -> Self {
        TimelineController {
            dom,
            avatars,
            state: TimelineState::Loading,
            blog: None,
            list: OrderedPostList::new(),
            posts: HashMap::new(),
            in_flight: HashMap::new(),
            retry: HashMap::new(),
            initial_batch_seen: false,
            pending_initial: HashSet::new(),
            load_finished: false,
        }
    }

    pub fn state(&self) -> TimelineState {
        self.state
    }

    pub fn blog(&self) -> Option<&Blog> {
        self.blog.as_ref()
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn list(&self) -> &OrderedPostList {
        &self.list
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.get(id).map(|rendered| &rendered.post)
    }

    pub fn is_wrapup_open(&self, id: &PostId) -> Option<bool> {
        self.posts
            .get(id)
            .filter(|rendered| rendered.class == PostClass::Wrapup)
            .map(|rendered| rendered.wrapup_open)
    }

    pub fn is_accepting_merges(&self) -> bool {
        matches!(self.state, TimelineState::Live | TimelineState::Closed)
    }

    /// True once the initial batch has fully rendered.
    pub fn is_load_finished(&self) -> bool {
        self.load_finished
    }

    pub fn has_pending_refetches(&self) -> bool {
        !self.in_flight.is_empty() || !self.retry.is_empty()
    }

    /// Applies a blog record. The first one renders the header and, when the
    /// blog carries its posts inline, the initial batch.
    pub fn load_blog(&mut self, blog: Blog) -> Vec<Refetch> {
        let mut refetches = Vec::new();

        match self.state {
            TimelineState::Failed => {
                debug!("ignoring blog record after a failed load");
                return refetches;
            }
            TimelineState::Loading => {
                info!("blog loaded: {}", blog.title.as_deref().unwrap_or_default());
                self.dom.set_blog_header(
                    blog.title.as_deref().unwrap_or_default(),
                    blog.description.as_deref().unwrap_or_default(),
                );
                self.state = TimelineState::Live;

                let inline = match &blog.post_published {
                    Some(PostCollection::Inline(records)) => Some(records.clone()),
                    _ => None,
                };
                self.blog = Some(blog);
                if let Some(records) = inline {
                    refetches = self.merge_posts(&records);
                }
            }
            TimelineState::Live | TimelineState::Closed => {
                let title = self.blog.as_ref().and_then(|known| known.title.clone());
                let changed = self
                    .blog
                    .as_ref()
                    .map_or(true, |known| known.description != blog.description);
                if changed {
                    self.dom.set_blog_header(
                        title.as_deref().unwrap_or_default(),
                        blog.description.as_deref().unwrap_or_default(),
                    );
                }
                if let Some(known) = self.blog.as_mut() {
                    known.description = blog.description;
                    known.closed_on = blog.closed_on;
                }
            }
        }

        self.ensure_status();
        refetches
    }

    /// Moves to `Closed` the first time the blog reports a `ClosedOn`.
    fn ensure_status(&mut self) {
        if self.state != TimelineState::Live {
            return;
        }
        let closed_on = match self.blog.as_ref().filter(|blog| blog.is_closed()) {
            Some(blog) => blog.closed_on.clone().unwrap_or_default(),
            None => return,
        };

        info!("blog closed on {}", closed_on);
        self.state = TimelineState::Closed;
        let stamp = parse_timestamp(&closed_on)
            .map(|time| time.format("%m/%d/%Y %H:%M:%S").to_string())
            .unwrap_or(closed_on);
        self.dom
            .set_status(&format!("{}{}", CLOSED_STATUS_PREFIX, stamp));
    }

    pub fn begin_update(&mut self) {
        if self.state == TimelineState::Live {
            self.dom.set_status(UPDATING_STATUS);
        }
    }

    pub fn finish_update(&mut self) {
        if self.state == TimelineState::Live {
            self.dom
                .set_status(&format!("updated on {}", Local::now().format("%H:%M:%S")));
        }
    }

    pub fn fail_initial_load(&mut self, reason: &str) {
        error!("initial load failed: {}", reason);
        self.state = TimelineState::Failed;
        self.dom
            .set_status(&format!("{}{}", FAILED_STATUS_PREFIX, reason));
    }

    /// Merges a batch of post records. The first batch is the initial render
    /// batch; load completion waits for every post in it.
    pub fn merge_posts(&mut self, records: &[Value]) -> Vec<Refetch> {
        if !self.is_accepting_merges() {
            debug!("dropping {} post records in state {:?}", records.len(), self.state);
            return Vec::new();
        }

        let initial = !self.initial_batch_seen;
        self.initial_batch_seen = true;

        let mut deltas = Vec::with_capacity(records.len());
        for record in records {
            match PostDelta::hydrate(record) {
                Ok(delta) => deltas.push(delta),
                Err(err) => warn!("skipping post record: {}", err),
            }
        }
        if initial {
            self.pending_initial
                .extend(deltas.iter().map(|delta| delta.id().clone()));
        }

        let refetches = deltas
            .into_iter()
            .filter_map(|delta| self.apply(delta))
            .collect();
        self.check_load_complete();
        refetches
    }

    /// Merges the full record fetched for a [`Refetch`].
    pub fn merge_detail(&mut self, record: &Value) {
        if !self.is_accepting_merges() {
            debug!("dropping post detail in state {:?}", self.state);
            return;
        }

        match PostDelta::hydrate(record) {
            Ok(PostDelta::ChangeOnly { id, .. }) => {
                warn!("post {}: detail fetch returned no content", id);
                self.abandon_refetch(&id);
            }
            Ok(delta) => {
                self.apply(delta);
            }
            Err(err) => {
                // a malformed record will not get better by asking again
                warn!("skipping post detail: {}", err);
                if let Some(id) = err.post_id() {
                    self.in_flight.remove(id);
                    self.pending_initial.remove(id);
                }
            }
        }
        self.check_load_complete();
    }

    /// Parks a refetch that failed until [`TimelineController::take_retries`]
    /// hands it out again. It no longer holds back load completion.
    pub fn abandon_refetch(&mut self, id: &PostId) {
        if let Some(pending) = self.in_flight.remove(id) {
            self.retry.insert(id.clone(), pending);
        }
        self.pending_initial.remove(id);
        self.check_load_complete();
    }

    /// Failed refetches to issue again, called once per posts tick.
    pub fn take_retries(&mut self) -> Vec<Refetch> {
        if !self.is_accepting_merges() || self.retry.is_empty() {
            return Vec::new();
        }
        let mut refetches = Vec::with_capacity(self.retry.len());
        for (id, pending) in self.retry.drain() {
            debug!("post {}: retrying change {}", id, pending.cid);
            refetches.push(Refetch {
                id: id.clone(),
                href: pending.href.clone(),
            });
            self.in_flight.insert(id, pending);
        }
        refetches
    }

    fn apply(&mut self, delta: PostDelta) -> Option<Refetch> {
        match delta {
            PostDelta::ChangeOnly { id, cid, href } => {
                if self.posts.get(&id).map_or(false, |known| known.post.cid >= cid) {
                    debug!("post {}: change {} already rendered", id, cid);
                    self.pending_initial.remove(&id);
                    return None;
                }
                if self.in_flight.get(&id).map_or(false, |asked| asked.cid >= cid) {
                    debug!("post {}: change {} already requested", id, cid);
                    return None;
                }
                self.retry.remove(&id);
                self.in_flight.insert(
                    id.clone(),
                    PendingFetch {
                        cid,
                        href: href.clone(),
                    },
                );
                Some(Refetch { id, href })
            }
            PostDelta::Deleted { id } => {
                self.remove_post(&id);
                None
            }
            PostDelta::Full(post) => {
                self.upsert(post);
                None
            }
        }
    }

    fn remove_post(&mut self, id: &PostId) {
        self.in_flight.remove(id);
        self.retry.remove(id);
        self.pending_initial.remove(id);

        let next = self.list.next_of(id).cloned();
        if self.list.remove(id) {
            let removed = self.posts.remove(id);
            self.dom.remove(id);
            debug!("post {} removed", id);
            if removed.map_or(false, |post| post.class == PostClass::Wrapup) {
                // its posts now belong to the section above
                self.refresh_run(next);
            }
        }
    }

    fn upsert(&mut self, post: Post) {
        let id = post.id.clone();
        self.pending_initial.remove(&id);
        if self.in_flight.get(&id).map_or(false, |asked| post.cid >= asked.cid) {
            self.in_flight.remove(&id);
        }
        if self.retry.get(&id).map_or(false, |asked| post.cid >= asked.cid) {
            self.retry.remove(&id);
        }

        let existing = match self.posts.get_mut(&id) {
            Some(existing) => existing,
            None => {
                self.insert_new(post);
                return;
            }
        };

        if post.cid < existing.post.cid {
            debug!("post {}: ignoring change {} older than {}", id, post.cid, existing.post.cid);
            return;
        }
        if existing.post == post {
            return;
        }

        let old_class = existing.class;
        if old_class != PostClass::Wrapup && classify(&post) == PostClass::Wrapup {
            // a post that becomes a wrap-up starts open, like a new one
            existing.wrapup_open = true;
        }
        let rendered = render_post(&post, self.avatars.as_ref(), existing.wrapup_open);
        let old_next = self.list.next_of(&id).cloned();
        let moved = post.order != existing.post.order;
        if moved {
            if let Some(placement) = self.list.reposition(&id, post.order) {
                self.dom.relocate(&id, &placement);
            }
        }
        let replaced = rendered.markup != existing.markup;
        if replaced {
            self.dom.replace(&id, &rendered.markup);
        }
        let class = rendered.class;
        existing.post = post;
        existing.class = rendered.class;
        existing.markup = rendered.markup;

        if old_class == PostClass::Wrapup && (moved || class != old_class) {
            // the posts it headed now belong to the section above
            self.refresh_run(old_next);
        }
        if moved || replaced {
            self.refresh_visibility(&id, class);
        }
    }

    fn insert_new(&mut self, post: Post) {
        let id = post.id.clone();
        let rendered = render_post(&post, self.avatars.as_ref(), true);
        let placement = match self.list.insert(id.clone(), post.order) {
            Some(placement) => placement,
            None => {
                warn!("post {} is linked but was never rendered", id);
                return;
            }
        };

        self.dom.place(&id, &placement, &rendered.markup);
        let class = rendered.class;
        self.posts.insert(
            id.clone(),
            RenderedPost {
                post,
                class: rendered.class,
                markup: rendered.markup,
                wrapup_open: true,
            },
        );
        self.refresh_visibility(&id, class);
    }

    /// Keeps a post that landed under a collapsed wrap-up hidden, and a
    /// wrap-up's section in line with its state.
    fn refresh_visibility(&mut self, id: &PostId, class: PostClass) {
        if class == PostClass::Wrapup {
            self.dom.set_hidden(id, false);
            if let Some(open) = self.is_wrapup_open(id) {
                self.apply_section(id, open);
            }
            return;
        }
        let collapsed = self.section_collapsed(id);
        self.dom.set_hidden(id, collapsed);
    }

    /// Re-derives visibility for the posts from `start` up to the next
    /// wrap-up.
    fn refresh_run(&mut self, start: Option<PostId>) {
        let first = match start {
            Some(first) => first,
            None => return,
        };
        let collapsed = self.section_collapsed(&first);
        let mut cursor = Some(first);
        while let Some(current) = cursor {
            if self.is_wrapup_open(&current).is_some() {
                break;
            }
            self.dom.set_hidden(&current, collapsed);
            cursor = self.list.next_of(&current).cloned();
        }
    }

    fn section_collapsed(&self, id: &PostId) -> bool {
        let mut cursor = self.list.prev_of(id);
        while let Some(current) = cursor {
            if let Some(open) = self.is_wrapup_open(current) {
                return !open;
            }
            cursor = self.list.prev_of(current);
        }
        false
    }

    /// Hides or shows the posts below a wrap-up, up to the next wrap-up.
    fn apply_section(&mut self, wrapup: &PostId, open: bool) {
        let mut cursor = self.list.next_of(wrapup).cloned();
        while let Some(current) = cursor {
            if self.is_wrapup_open(&current).is_some() {
                break;
            }
            self.dom.set_hidden(&current, !open);
            cursor = self.list.next_of(&current).cloned();
        }
    }

    /// Opens or closes a wrap-up. Returns false if `id` is not a wrap-up.
    pub fn set_wrapup(&mut self, id: &PostId, open: bool) -> bool {
        let rendered = match self.posts.get_mut(id) {
            Some(rendered) if rendered.class == PostClass::Wrapup => rendered,
            _ => return false,
        };

        if rendered.wrapup_open != open {
            rendered.wrapup_open = open;
            rendered.markup = render_post(&rendered.post, self.avatars.as_ref(), open).markup;
            self.dom.set_wrapup_open(id, open);
        }
        self.apply_section(id, open);
        true
    }

    pub fn toggle_wrapup(&mut self, id: &PostId) -> bool {
        match self.is_wrapup_open(id) {
            Some(open) => self.set_wrapup(id, !open),
            None => false,
        }
    }

    fn check_load_complete(&mut self) {
        if self.load_finished || !self.initial_batch_seen || !self.pending_initial.is_empty() {
            return;
        }
        self.load_finished = true;

        let wrapups: Vec<PostId> = self
            .list
            .iter()
            .filter(|(id, _)| self.is_wrapup_open(id).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        for id in wrapups.iter().skip(1) {
            self.set_wrapup(id, false);
        }

        self.dom.reapply_location_hash();
        info!("initial render finished with {} posts", self.list.len());
    }
}
