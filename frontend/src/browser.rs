//! Browser side: a `web-sys` page and the `LiveBlogWidget` the embedding
//! script drives.
//!
//! The script owns the network. It hands blog and post JSON to the widget and
//! fetches whatever refetches the widget hands back.

use std::cell::RefCell;
use std::rc::Rc;

use log::{warn, LevelFilter, Log, Metadata, Record};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event};

use crate::avatar::{AvatarSource, Gravatar, NoAvatars};
use crate::dom::{page_shell, PostDom, POST_LIST_ID, STATUS_ID};
use crate::ordered_list::Placement;
use crate::post::{post_records, Blog, PostId};
use crate::timeline::TimelineController;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = log)]
    fn console_log(contents: &str);
}

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            console_log(&format!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

#[wasm_bindgen]
pub fn bootstrap() {
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

fn missing(what: &str) -> JsValue {
    JsValue::from_str(&format!("livedesk: missing {}", what))
}

fn to_js<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub struct BrowserDom {
    document: Document,
    root: Element,
    list: Element,
    status: Element,
    title: Element,
    description: Element,
}

impl BrowserDom {
    /// Renders the page shell into the element matching `root_selector`.
    pub fn mount(root_selector: &str) -> Result<BrowserDom, JsValue> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| missing("document"))?;
        let root = document
            .query_selector(root_selector)?
            .ok_or_else(|| missing(root_selector))?;
        root.set_inner_html(&page_shell("", "", "", ""));

        let find = |selector: &str| -> Result<Element, JsValue> {
            root.query_selector(selector)?
                .ok_or_else(|| missing(selector))
        };
        let list = find(&format!("#{}", POST_LIST_ID))?;
        let status = find(&format!("#{}", STATUS_ID))?;
        let title = find("article > h2")?;
        let description = find("article > p")?;

        Ok(BrowserDom {
            document,
            root,
            list,
            status,
            title,
            description,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn item(&self, id: &PostId) -> Option<Element> {
        let selector = format!("li[data-post-id=\"{}\"]", id);
        match self.list.query_selector(&selector) {
            Ok(item) => item,
            Err(err) => {
                warn!("post {}: lookup failed: {:?}", id, err);
                None
            }
        }
    }

    fn target(&self, placement: &Placement) -> (Element, &'static str) {
        let anchor = |id: &PostId, position: &'static str, fallback: &'static str| match self.item(id) {
            Some(element) => (element, position),
            None => (self.list.clone(), fallback),
        };
        match placement {
            Placement::First => (self.list.clone(), "afterbegin"),
            Placement::Before(id) => anchor(id, "beforebegin", "afterbegin"),
            Placement::After(id) => anchor(id, "afterend", "beforeend"),
        }
    }
}

impl PostDom for BrowserDom {
    fn place(&mut self, id: &PostId, placement: &Placement, markup: &str) {
        let (target, position) = self.target(placement);
        if let Err(err) = target.insert_adjacent_html(position, markup) {
            warn!("post {}: insert failed: {:?}", id, err);
        }
    }

    fn relocate(&mut self, id: &PostId, placement: &Placement) {
        let element = match self.item(id) {
            Some(element) => element,
            None => return,
        };
        let (target, position) = self.target(placement);
        if let Err(err) = target.insert_adjacent_element(position, &element) {
            warn!("post {}: move failed: {:?}", id, err);
        }
    }

    fn replace(&mut self, id: &PostId, markup: &str) {
        if let Some(element) = self.item(id) {
            element.set_outer_html(markup);
        }
    }

    fn remove(&mut self, id: &PostId) {
        if let Some(element) = self.item(id) {
            element.remove();
        }
    }

    fn set_wrapup_open(&mut self, id: &PostId, open: bool) {
        let element = match self.item(id) {
            Some(element) => element,
            None => return,
        };
        let classes = element.class_list();
        let (from, to) = if open { ("closed", "open") } else { ("open", "closed") };
        if let Err(err) = classes.remove_1(from).and_then(|_| classes.add_1(to)) {
            warn!("post {}: class toggle failed: {:?}", id, err);
        }
    }

    fn set_hidden(&mut self, id: &PostId, hidden: bool) {
        let element = match self.item(id) {
            Some(element) => element,
            None => return,
        };
        let result = if hidden {
            element.set_attribute("hidden", "")
        } else {
            element.remove_attribute("hidden")
        };
        if let Err(err) = result {
            warn!("post {}: visibility change failed: {:?}", id, err);
        }
    }

    fn set_status(&mut self, text: &str) {
        self.status.set_text_content(Some(text));
    }

    fn set_blog_header(&mut self, title: &str, description: &str) {
        self.title.set_text_content(Some(title));
        self.description.set_text_content(Some(description));
    }

    fn reapply_location_hash(&mut self) {
        let location = match web_sys::window() {
            Some(window) => window.location(),
            None => return,
        };
        if let Ok(hash) = location.hash() {
            if !hash.is_empty() {
                let _ = location.set_hash("").and_then(|_| location.set_hash(&hash));
            }
        }
    }

    fn snapshot(&self) -> Option<String> {
        Some(self.root.inner_html())
    }
}

/// A live blog rendered into the page.
#[wasm_bindgen]
pub struct LiveBlogWidget {
    timeline: Rc<RefCell<TimelineController<BrowserDom>>>,
}

#[wasm_bindgen]
impl LiveBlogWidget {
    #[wasm_bindgen(constructor)]
    pub fn new(root_selector: &str, gravatar: bool) -> Result<LiveBlogWidget, JsValue> {
        bootstrap();

        let dom = BrowserDom::mount(root_selector)?;
        let root = dom.root().clone();
        let avatars: Box<dyn AvatarSource> = if gravatar {
            Box::new(Gravatar::default())
        } else {
            Box::new(NoAvatars)
        };
        let timeline = Rc::new(RefCell::new(TimelineController::new(dom, avatars)));

        let weak = Rc::downgrade(&timeline);
        let on_click = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let item = event
                .target()
                .and_then(|target| target.dyn_into::<Element>().ok())
                .filter(|element| element.class_list().contains("big-toggle"))
                .and_then(|toggle| toggle.closest("li[data-post-id]").ok().flatten());
            let id = item.and_then(|item| item.get_attribute("data-post-id"));

            if let (Some(id), Some(timeline)) = (id, weak.upgrade()) {
                timeline.borrow_mut().toggle_wrapup(&PostId::new(id));
            }
        });
        root.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
        on_click.forget();

        Ok(LiveBlogWidget { timeline })
    }

    /// Applies a blog record; returns the refetches as a JSON array.
    #[wasm_bindgen(js_name = loadBlog)]
    pub fn load_blog(&self, blog_json: &str) -> Result<String, JsValue> {
        let record: Value = serde_json::from_str(blog_json).map_err(to_js)?;
        let blog = Blog::hydrate(&record).map_err(to_js)?;
        let refetches = self.timeline.borrow_mut().load_blog(blog);
        serde_json::to_string(&refetches).map_err(to_js)
    }

    #[wasm_bindgen(js_name = mergePosts)]
    pub fn merge_posts(&self, posts_json: &str) -> Result<String, JsValue> {
        let body: Value = serde_json::from_str(posts_json).map_err(to_js)?;
        let records = post_records(body).map_err(to_js)?;
        let refetches = self.timeline.borrow_mut().merge_posts(&records);
        serde_json::to_string(&refetches).map_err(to_js)
    }

    #[wasm_bindgen(js_name = mergePost)]
    pub fn merge_post(&self, post_json: &str) -> Result<(), JsValue> {
        let record: Value = serde_json::from_str(post_json).map_err(to_js)?;
        self.timeline.borrow_mut().merge_detail(&record);
        Ok(())
    }

    #[wasm_bindgen(js_name = abandonRefetch)]
    pub fn abandon_refetch(&self, id: &str) {
        self.timeline.borrow_mut().abandon_refetch(&PostId::new(id));
    }

    /// Marks a posts tick; returns the failed refetches to issue again as a
    /// JSON array.
    #[wasm_bindgen(js_name = beginUpdate)]
    pub fn begin_update(&self) -> Result<String, JsValue> {
        let mut timeline = self.timeline.borrow_mut();
        timeline.begin_update();
        serde_json::to_string(&timeline.take_retries()).map_err(to_js)
    }

    #[wasm_bindgen(js_name = finishUpdate)]
    pub fn finish_update(&self) {
        self.timeline.borrow_mut().finish_update();
    }

    #[wasm_bindgen(js_name = failInitialLoad)]
    pub fn fail_initial_load(&self, reason: &str) {
        self.timeline.borrow_mut().fail_initial_load(reason);
    }

    #[wasm_bindgen(js_name = toggleWrapup)]
    pub fn toggle_wrapup(&self, id: &str) -> bool {
        self.timeline.borrow_mut().toggle_wrapup(&PostId::new(id))
    }

    /// One of `Loading`, `Live`, `Closed` or `Failed`.
    pub fn state(&self) -> String {
        format!("{:?}", self.timeline.borrow().state())
    }

    pub fn snapshot(&self) -> Option<String> {
        self.timeline.borrow().dom().snapshot()
    }
}
