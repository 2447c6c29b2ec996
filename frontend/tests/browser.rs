#![cfg(target_arch = "wasm32")]

extern crate wasm_bindgen_test;

use livedesk_frontend::browser::{BrowserDom, LiveBlogWidget};
use livedesk_frontend::{Placement, PostDom, PostId};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn fresh_root() -> web_sys::Element {
    let document = web_sys::window().unwrap().document().unwrap();
    if let Some(old) = document.query_selector("#livedesk-root").unwrap() {
        old.remove();
    }
    let root = document.create_element("div").unwrap();
    root.set_id("livedesk-root");
    document.body().unwrap().append_child(&root).unwrap();
    root
}

fn item_ids(root: &web_sys::Element) -> Vec<String> {
    let items = root.query_selector_all("li[data-post-id]").unwrap();
    (0..items.length())
        .filter_map(|index| items.item(index))
        .filter_map(|node| {
            wasm_bindgen::JsCast::dyn_into::<web_sys::Element>(node)
                .ok()
                .and_then(|element| element.get_attribute("data-post-id"))
        })
        .collect()
}

#[wasm_bindgen_test]
fn browser_dom_places_and_moves_items() {
    let root = fresh_root();
    let mut dom = BrowserDom::mount("#livedesk-root").unwrap();
    let (a, b) = (PostId::new("a"), PostId::new("b"));

    dom.place(&a, &Placement::First, "<li class=\"tw\" data-post-id=\"a\">a</li>");
    dom.place(&b, &Placement::Before(a.clone()), "<li class=\"tw\" data-post-id=\"b\">b</li>");
    assert_eq!(item_ids(&root), vec!["b", "a"]);

    dom.relocate(&b, &Placement::After(a.clone()));
    assert_eq!(item_ids(&root), vec!["a", "b"]);

    dom.remove(&a);
    assert_eq!(item_ids(&root), vec!["b"]);
}

#[wasm_bindgen_test]
fn widget_renders_blog_and_toggles_wrapups() {
    let root = fresh_root();
    let widget = LiveBlogWidget::new("#livedesk-root", false).unwrap();

    let refetches = widget
        .load_blog(
            r#"{"Title": "Cup final", "Description": "Live", "PostPublished": [
                {"Id": "1", "CId": 1, "Order": 3, "Type": {"Key": "wrapup"}, "Content": "Half time"},
                {"Id": "2", "CId": 2, "Order": 2, "Type": {"Key": "normal"}, "Content": "Goal", "AuthorName": "Desk"},
                {"Id": "3", "CId": 3, "Order": 1, "Type": {"Key": "wrapup"}, "Content": "Kick off"},
                {"Id": "4", "CId": 4, "Order": 0, "Type": {"Key": "normal"}, "Content": "Teams out", "AuthorName": "Desk"}
            ]}"#,
        )
        .unwrap();

    assert_eq!(refetches, "[]");
    assert_eq!(widget.state(), "Live");
    assert_eq!(item_ids(&root), vec!["1", "2", "3", "4"]);

    let kickoff = root.query_selector("li[data-post-id=\"3\"]").unwrap().unwrap();
    assert!(kickoff.class_list().contains("closed"));
    let teams = root.query_selector("li[data-post-id=\"4\"]").unwrap().unwrap();
    assert!(teams.has_attribute("hidden"));

    assert!(widget.toggle_wrapup("3"));
    assert!(!teams.has_attribute("hidden"));

    let refetches = widget.merge_posts(r#"{"PostList": [{"Id": "2", "CId": 9}]}"#).unwrap();
    assert_eq!(refetches, r#"[{"id":"2","href":null}]"#);

    // a failed refetch comes back on the next tick
    widget.abandon_refetch("2");
    assert_eq!(widget.begin_update().unwrap(), r#"[{"id":"2","href":null}]"#);
    assert_eq!(widget.begin_update().unwrap(), "[]");
}
