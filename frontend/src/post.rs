use std::fmt;

use log::debug;
use serde_json::{Map, Value};

use crate::error::RecordError;

/// Fields that may accompany a change-only record without carrying content.
const CHANGE_ONLY_KEYS: [&str; 3] = ["Id", "CId", "href"];

#[derive(Hash, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        PostId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AuthorPerson {
    #[serde(rename = "EMail", default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Provider metadata, shipped by the server as a JSON-encoded string.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Meta {
    #[serde(default)]
    pub annotation: Vec<Option<String>>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(rename = "tbUrl", default)]
    pub tb_url: Option<String>,
    #[serde(rename = "tbHeight", default)]
    pub tb_height: Option<Value>,
    #[serde(rename = "tbWidth", default)]
    pub tb_width: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub cid: u64,
    pub order: f64,
    pub content: String,
    pub type_key: String,
    pub author_name: String,
    pub author_person: Option<AuthorPerson>,
    pub meta: Meta,
    pub published_on: Option<String>,
    pub is_modified: bool,
    pub href: Option<String>,
}

/// One hydrated entry of a post delta batch.
#[derive(Clone, Debug, PartialEq)]
pub enum PostDelta {
    /// Only `Id` and `CId` changed; the full record has to be fetched again.
    ChangeOnly {
        id: PostId,
        cid: u64,
        href: Option<String>,
    },
    Deleted {
        id: PostId,
    },
    Full(Post),
}

impl PostDelta {
    pub fn id(&self) -> &PostId {
        match self {
            PostDelta::ChangeOnly { id, .. } | PostDelta::Deleted { id } => id,
            PostDelta::Full(post) => &post.id,
        }
    }

    pub fn hydrate(record: &Value) -> Result<PostDelta, RecordError> {
        let fields = record.as_object().ok_or(RecordError::NotAnObject)?;
        let id = fields
            .get("Id")
            .and_then(parse_id)
            .ok_or(RecordError::MissingId)?;
        let href = fields.get("href").and_then(Value::as_str).map(str::to_owned);

        if fields.get("DeletedOn").map_or(false, |v| !v.is_null()) {
            return Ok(PostDelta::Deleted { id });
        }

        let cid = required(fields, &id, "CId", parse_cid)?;

        if fields
            .keys()
            .all(|key| CHANGE_ONLY_KEYS.contains(&key.as_str()))
        {
            return Ok(PostDelta::ChangeOnly { id, cid, href });
        }

        let order = required(fields, &id, "Order", parse_order)?;
        let type_key = required(fields, &id, "Type", parse_type_key)?;

        let author_person = match fields.get("AuthorPerson") {
            Some(Value::Null) | None => None,
            Some(person) => match serde_json::from_value::<AuthorPerson>(person.clone()) {
                Ok(person) => Some(person),
                Err(err) => {
                    debug!("post {}: ignoring AuthorPerson: {}", id, err);
                    None
                }
            },
        };

        Ok(PostDelta::Full(Post {
            cid,
            order,
            type_key,
            content: string_field(fields, "Content").unwrap_or_default(),
            author_name: string_field(fields, "AuthorName").unwrap_or_default(),
            author_person,
            meta: fields.get("Meta").map(|m| parse_meta(&id, m)).unwrap_or_default(),
            published_on: string_field(fields, "PublishedOn"),
            is_modified: fields
                .get("IsModified")
                .map_or(false, |v| v.as_bool().unwrap_or_else(|| v == "True")),
            href,
            id,
        }))
    }
}

/// Where the published posts of a blog live.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PostCollection {
    Inline(Vec<Value>),
    Resource { href: String },
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Blog {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub closed_on: Option<String>,
    #[serde(default)]
    pub post_published: Option<PostCollection>,
}

impl Blog {
    pub fn hydrate(record: &Value) -> Result<Blog, RecordError> {
        if !record.is_object() {
            return Err(RecordError::NotAnObject);
        }
        serde_json::from_value(record.clone()).map_err(|err| RecordError::Blog(err.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed_on.as_deref().map_or(false, |c| !c.is_empty())
    }

    pub fn inline_posts(&self) -> &[Value] {
        match &self.post_published {
            Some(PostCollection::Inline(records)) => records,
            _ => &[],
        }
    }
}

/// Post collections arrive either as a bare array or wrapped in an object
/// such as `{"PostList": [...]}`.
pub fn post_records(body: Value) -> Result<Vec<Value>, RecordError> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut fields) => {
            let key = fields
                .iter()
                .find(|(key, value)| key.ends_with("List") && value.is_array())
                .map(|(key, _)| key.clone());
            match key.and_then(|key| fields.remove(&key)) {
                Some(Value::Array(records)) => Ok(records),
                _ => Err(RecordError::NotAPostList),
            }
        }
        _ => Err(RecordError::NotAPostList),
    }
}

fn required<T>(
    fields: &Map<String, Value>,
    id: &PostId,
    field: &'static str,
    parse: fn(&Value) -> Option<T>,
) -> Result<T, RecordError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(RecordError::MissingField {
            id: id.clone(),
            field,
        }),
        Some(value) => parse(value).ok_or_else(|| RecordError::Unparseable {
            id: id.clone(),
            field,
            value: value.to_string(),
        }),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

pub fn parse_id(value: &Value) -> Option<PostId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(PostId::new(s.trim())),
        Value::Number(n) => Some(PostId::new(n.to_string())),
        _ => None,
    }
}

/// Change ids come as numbers or numeric strings; fractions are truncated
/// and anything negative or non-numeric is rejected.
pub fn parse_cid(value: &Value) -> Option<u64> {
    let whole = |f: f64| (f.is_finite() && f >= 0.0).then(|| f.trunc() as u64);
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

pub fn parse_order(value: &Value) -> Option<f64> {
    let order = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    order.is_finite().then_some(order)
}

fn parse_type_key(value: &Value) -> Option<String> {
    match value {
        Value::Object(type_fields) => type_fields
            .get("Key")
            .and_then(Value::as_str)
            .map(str::to_owned),
        Value::String(key) => Some(key.clone()),
        _ => None,
    }
}

fn parse_meta(id: &PostId, value: &Value) -> Meta {
    let decoded = match value {
        Value::String(encoded) if encoded.trim().is_empty() => return Meta::default(),
        Value::String(encoded) => serde_json::from_str::<Value>(encoded),
        Value::Null => return Meta::default(),
        other => Ok(other.clone()),
    };

    match decoded.and_then(serde_json::from_value::<Meta>) {
        Ok(meta) => meta,
        Err(err) => {
            debug!("post {}: ignoring Meta: {}", id, err);
            Meta::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_only_record() {
        let delta = PostDelta::hydrate(&json!({"Id": "12", "CId": "40", "href": "/Post/12"}));

        assert_eq!(
            delta,
            Ok(PostDelta::ChangeOnly {
                id: PostId::new("12"),
                cid: 40,
                href: Some("/Post/12".into()),
            })
        );
    }

    #[test]
    fn test_full_record_with_string_numbers() {
        let delta = PostDelta::hydrate(&json!({
            "Id": 7,
            "CId": 3,
            "Order": "2.5",
            "Type": {"Key": "normal"},
            "Content": "<b>hi</b>",
            "AuthorName": "twitter",
            "Meta": "{\"profile_image_url\": \"http://img/a.png\", \"annotation\": [\"x\", null]}",
            "IsModified": "True",
        }))
        .unwrap();

        let PostDelta::Full(post) = delta else {
            panic!("expected a full post");
        };
        assert_eq!(post.id, PostId::new("7"));
        assert_eq!(post.order, 2.5);
        assert_eq!(post.type_key, "normal");
        assert!(post.is_modified);
        assert_eq!(post.meta.profile_image_url.as_deref(), Some("http://img/a.png"));
        assert_eq!(post.meta.annotation, vec![Some("x".to_string()), None]);
    }

    #[test]
    fn test_deleted_record_needs_no_content() {
        let delta = PostDelta::hydrate(&json!({"Id": "9", "DeletedOn": "1/2/13 10:00 AM"}));
        assert_eq!(delta, Ok(PostDelta::Deleted { id: PostId::new("9") }));
    }

    #[test]
    fn test_malformed_records() {
        assert_eq!(
            PostDelta::hydrate(&json!({"CId": 3})),
            Err(RecordError::MissingId)
        );
        assert_eq!(
            PostDelta::hydrate(&json!({"Id": 1, "CId": 3, "Type": {"Key": "normal"}})),
            Err(RecordError::MissingField {
                id: PostId::new("1"),
                field: "Order",
            })
        );
        assert!(matches!(
            PostDelta::hydrate(&json!({"Id": 1, "CId": "x", "Order": 1})),
            Err(RecordError::Unparseable { field: "CId", .. })
        ));
        assert_eq!(PostDelta::hydrate(&json!([1])), Err(RecordError::NotAnObject));
    }

    #[test]
    fn test_broken_meta_is_ignored() {
        let delta = PostDelta::hydrate(&json!({
            "Id": 1, "CId": 1, "Order": 1, "Type": {"Key": "normal"}, "Meta": "{not json",
        }))
        .unwrap();

        let PostDelta::Full(post) = delta else {
            panic!("expected a full post");
        };
        assert_eq!(post.meta, Meta::default());
    }

    #[test]
    fn test_post_list_shapes() {
        assert_eq!(post_records(json!([{"Id": 1}])).unwrap().len(), 1);
        assert_eq!(
            post_records(json!({"total": 2, "PostList": [{"Id": 1}, {"Id": 2}]}))
                .unwrap()
                .len(),
            2
        );
        assert!(post_records(json!(null)).unwrap().is_empty());
        assert_eq!(
            post_records(json!({"total": 0})),
            Err(RecordError::NotAPostList)
        );
    }

    #[test]
    fn test_blog_published_posts() {
        let linked = Blog::hydrate(&json!({
            "Title": "Election night",
            "PostPublished": {"href": "http://host/Blog/1/Post/Published"},
        }))
        .unwrap();
        assert_eq!(
            linked.post_published,
            Some(PostCollection::Resource {
                href: "http://host/Blog/1/Post/Published".into()
            })
        );
        assert!(linked.inline_posts().is_empty());
        assert!(!linked.is_closed());

        let inline = Blog::hydrate(&json!({
            "Title": "Cup final",
            "ClosedOn": "2013-05-01T20:00:00",
            "PostPublished": [{"Id": 1, "CId": 1}],
        }))
        .unwrap();
        assert_eq!(inline.inline_posts().len(), 1);
        assert!(inline.is_closed());
    }
}
