//! Post markup: classification, the per-class item template and the list
//! item wrapper.
//!
//! Post content is trusted server HTML and is never escaped here.

pub mod services;

use chrono::{DateTime, NaiveDateTime};

use crate::avatar::AvatarSource;
use crate::post::Post;

const POST_TIME_FORMAT: &str = "%a %b %d %Y %H:%M:%S %p";

/// Naive layouts tried after RFC 3339 and RFC 2822, in order.
const NAIVE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
];

/// External services whose posts get content rewrites. Author names match
/// case-sensitively.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
pub enum Service {
    Flickr,
    Google,
    Twitter,
    Facebook,
    Youtube,
}

impl Service {
    pub fn from_author(author_name: &str) -> Option<Service> {
        match author_name {
            "flickr" => Some(Service::Flickr),
            "google" => Some(Service::Google),
            "twitter" => Some(Service::Twitter),
            "facebook" => Some(Service::Facebook),
            "youtube" => Some(Service::Youtube),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Service::Flickr => "flickr",
            Service::Google => "google",
            Service::Twitter => "twitter",
            Service::Facebook => "facebook",
            Service::Youtube => "youtube",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum PostClass {
    Wrapup,
    Quotation,
    Advertisement,
    Service(Service),
    Default,
}

impl PostClass {
    pub fn css_class(self) -> &'static str {
        match self {
            PostClass::Wrapup => "wrapup",
            PostClass::Quotation => "quotation",
            PostClass::Advertisement => "advertisement",
            PostClass::Service(_) => "service",
            PostClass::Default => "tw",
        }
    }
}

/// The post type wins over the author: a wrap-up written by the twitter
/// account is still a wrap-up.
pub fn classify(post: &Post) -> PostClass {
    match post.type_key.as_str() {
        "wrapup" => PostClass::Wrapup,
        "quote" => PostClass::Quotation,
        "advertisement" => PostClass::Advertisement,
        _ => Service::from_author(&post.author_name).map_or(PostClass::Default, PostClass::Service),
    }
}

/// Formats a `PublishedOn` value for the attribution line. Anything that
/// does not parse renders as an empty time.
pub fn format_timestamp(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|time| time.format(POST_TIME_FORMAT).to_string())
        .unwrap_or_default()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(time.naive_local());
    }
    if let Ok(time) = DateTime::parse_from_rfc2822(raw) {
        return Some(time.naive_local());
    }
    NAIVE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// The item template: everything that goes inside the list item.
pub fn render(class: PostClass, author: &str, content: &str, time: &str, avatar: Option<&str>) -> String {
    let mut markup = String::new();
    if let Some(avatar) = avatar.filter(|avatar| !avatar.is_empty()) {
        markup.push_str(&format!("<figure><img src=\"{}\" ></figure>", avatar));
    }

    match class {
        PostClass::Default | PostClass::Service(_) => markup.push_str(&format!(
            "<div class=\"result-content\"><div class=\"result-text\">{}</div>\
             <p class=\"attributes\"><i class=\"source-icon\"></i> by {}<time>{}</time></p></div>",
            content, author, time
        )),
        PostClass::Quotation => markup.push_str(&format!(
            "<div class=\"result-content\"><div class=\"result-text\">{}</div>\
             <p class=\"attributes\">by {}<time>{}</time></p></div>",
            content, author, time
        )),
        PostClass::Wrapup => {
            markup.push_str(&format!("<span class=\"big-toggle\"></span><h3>{}</h3>", content))
        }
        PostClass::Advertisement => markup.push_str(content),
    }

    markup
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedItem {
    pub class: PostClass,
    pub markup: String,
}

/// Full list item for a post.
pub fn render_post(post: &Post, avatars: &dyn AvatarSource, wrapup_open: bool) -> RenderedItem {
    let class = classify(post);
    let service = Service::from_author(&post.author_name);

    let mut avatar = post
        .author_person
        .as_ref()
        .and_then(|person| person.email.as_deref())
        .and_then(|email| avatars.avatar_url(email));

    let mut style = String::new();
    if class == PostClass::Wrapup {
        style.push_str(if wrapup_open { "open " } else { "closed " });
    }

    let content = match service {
        Some(service) => {
            style.push_str(service.name());
            style.push(' ');

            let transformed = match service {
                Service::Twitter => {
                    avatar = post.meta.profile_image_url.clone();
                    services::twitter(&post.content)
                }
                Service::Flickr => services::flickr(&post.content),
                Service::Google => services::google(&post.content, &post.meta),
                Service::Facebook | Service::Youtube => post.content.clone(),
            };
            services::annotate(&transformed, &post.meta)
        }
        None => post.content.clone(),
    };

    let time = post
        .published_on
        .as_deref()
        .map(format_timestamp)
        .unwrap_or_default();
    let item = render(class, &post.author_name, &content, &time, avatar.as_deref());

    RenderedItem {
        class,
        markup: format!(
            "<li class=\"{style}{class}\" data-post-id=\"{id}\"><a name=\"{id}\"></a>{item}&nbsp;\
             <a rel=\"bookmark\" href=\"#{id}\">#</a></li>",
            style = style,
            class = class.css_class(),
            id = post.id,
            item = item
        ),
    }
}
