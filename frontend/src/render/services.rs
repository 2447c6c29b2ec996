//! Content rewrites for posts pulled in from external services.
//!
//! All of these take and return HTML fragments and leave markup they do not
//! target exactly as it was.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::post::Meta;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z]+://[A-Za-z0-9_-]+\.[A-Za-z0-9_:%&?/.=-]+").expect("valid url regex")
});

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9_&])(@+[A-Za-z0-9_-]+)").expect("valid mention regex")
});

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9_&])(#+[A-Za-z0-9_-]+)").expect("valid hashtag regex")
});

static ANCHOR_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\shref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
});

static IMG_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img regex"));

static SRC_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)(\s)src\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid src regex")
});

static IMG_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^<img").expect("valid img open regex"));

/// Runs `replace` over the text of `html` that sits outside tags and outside
/// existing links.
fn replace_in_text<F>(html: &str, re: &Regex, replace: F) -> String
where
    F: Fn(&Captures) -> String,
{
    let mut out = String::with_capacity(html.len());
    let mut anchor_depth = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        let text_end = rest.find('<').unwrap_or(rest.len());
        let (text, tail) = rest.split_at(text_end);
        if anchor_depth == 0 {
            out.push_str(&re.replace_all(text, |caps: &Captures| replace(caps)));
        } else {
            out.push_str(text);
        }

        if tail.is_empty() {
            break;
        }
        let tag_end = match tail.find('>') {
            Some(index) => index + 1,
            None => {
                out.push_str(tail);
                break;
            }
        };
        let (tag, after) = tail.split_at(tag_end);
        let lower = tag.to_ascii_lowercase();
        if lower.starts_with("<a ") || lower.starts_with("<a>") || lower.starts_with("<a\n") {
            anchor_depth += 1;
        } else if lower.starts_with("</a") {
            anchor_depth = anchor_depth.saturating_sub(1);
        }
        out.push_str(tag);
        rest = after;
    }

    out
}

pub fn link_urls(html: &str) -> String {
    replace_in_text(html, &URL_RE, |caps| {
        format!("<a target=\"_blank\" href=\"{0}\">{0}</a>", &caps[0])
    })
}

pub fn link_mentions(html: &str) -> String {
    replace_in_text(html, &MENTION_RE, |caps| {
        let mention = &caps[2];
        let username = mention.trim_start_matches('@');
        format!(
            "{}<a target=\"_blank\" onclick=\"loadProfile('{1}');return(false);\"  href=\"http://twitter.com/{1}\">{2}</a>",
            &caps[1], username, mention
        )
    })
}

pub fn link_hashtags(html: &str) -> String {
    replace_in_text(html, &HASHTAG_RE, |caps| {
        let tag = &caps[2];
        let query = format!(
            "{}{}",
            "%23".repeat(tag.len() - tag.trim_start_matches('#').len()),
            tag.trim_start_matches('#')
        );
        format!(
            "{}<a target=\"_blank\" href=\"http://summize.com/search?q={}\">{}</a>",
            &caps[1], query, tag
        )
    })
}

/// Links URLs, then mentions, then hashtags.
pub fn twitter(html: &str) -> String {
    link_hashtags(&link_mentions(&link_urls(html)))
}

/// Points every image at the full-size picture its wrapping link targets.
pub fn flickr(html: &str) -> String {
    let href = match ANCHOR_HREF_RE.captures(html) {
        Some(caps) => match caps.get(1).or_else(|| caps.get(2)) {
            Some(href) => href.as_str().to_owned(),
            None => return html.to_owned(),
        },
        None => return html.to_owned(),
    };

    IMG_TAG_RE
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            if SRC_ATTR_RE.is_match(tag) {
                SRC_ATTR_RE
                    .replacen(tag, 1, |src: &Captures| format!("{}src=\"{}\"", &src[1], href))
                    .into_owned()
            } else {
                IMG_OPEN_RE
                    .replacen(tag, 1, |open: &Captures| format!("{} src=\"{}\"", &open[0], href))
                    .into_owned()
            }
        })
        .into_owned()
}

/// Appends the search result thumbnail when there is one.
pub fn google(html: &str, meta: &Meta) -> String {
    match &meta.tb_url {
        Some(thumbnail) => format!(
            "{}<p><a href=\"{}\"><img src=\"{}\" height=\"{}\" width=\"{}\"></a></p>",
            html,
            meta.url.as_deref().unwrap_or_default(),
            thumbnail,
            value_text(meta.tb_height.as_ref()),
            value_text(meta.tb_width.as_ref())
        ),
        None => html.to_owned(),
    }
}

pub fn annotate(html: &str, meta: &Meta) -> String {
    let annotation: String = meta.annotation.iter().flatten().map(String::as_str).collect();
    annotation + html
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
