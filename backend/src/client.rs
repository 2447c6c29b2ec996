//! REST client for the LiveDesk blog and post resources.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde_json::Value;

use livedesk_frontend::post::PostCollection;
use livedesk_frontend::{post_records, Blog, PostId, QueryFilter, POST_DETAIL_FIELDS};

use crate::error::{ClientError, ClientResult};

pub const X_FILTER: &str = "X-Filter";
pub const SINCE_PARAM: &str = "cId.since";

/// Supplies the session token sent as the raw `Authorization` header.
pub trait SessionAuth: Send + Sync {
    fn authorization(&self) -> Option<String>;
}

pub struct StaticSession {
    token: Option<String>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        StaticSession {
            token: token.filter(|token| !token.is_empty()),
        }
    }
}

impl SessionAuth for StaticSession {
    fn authorization(&self) -> Option<String> {
        self.token.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub blog_url: String,
    pub timeout: Duration,
}

/// The server operations the embed needs. Futures own their arguments so
/// they can be spawned.
pub trait LiveDeskApi: Send + Sync + 'static {
    fn get_blog(&self) -> BoxFuture<'_, ClientResult<Value>>;

    /// Published posts changed after `filter`, or all of them.
    fn get_posts(
        &self,
        posts_url: String,
        filter: Option<QueryFilter>,
    ) -> BoxFuture<'_, ClientResult<Vec<Value>>>;

    fn get_post(&self, url: String) -> BoxFuture<'_, ClientResult<Value>>;

    fn posts_url(&self, blog: &Blog) -> String;

    fn post_url(&self, id: &PostId, href: Option<&str>) -> String;
}

/// The public blog URL; the editor-side `my/` segment is dropped.
pub fn public_blog_url(url: &str) -> String {
    url.replacen("my/", "", 1)
}

pub struct LiveDeskClient {
    http: reqwest::Client,
    blog_url: Url,
    auth: Arc<dyn SessionAuth>,
}

impl LiveDeskClient {
    pub fn new(config: &ClientConfig, auth: Arc<dyn SessionAuth>) -> ClientResult<Self> {
        let blog_url = Url::parse(&public_blog_url(&config.blog_url))
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {}", config.blog_url, err)))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("livedesk-embed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(LiveDeskClient {
            http,
            blog_url,
            auth,
        })
    }

    pub fn blog_url(&self) -> &Url {
        &self.blog_url
    }

    fn resolve(&self, href: &str) -> String {
        self.blog_url
            .join(href)
            .map(String::from)
            .unwrap_or_else(|_| href.to_owned())
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        x_filter: Option<&str>,
    ) -> ClientResult<Value> {
        let mut request = self.http.get(url).header(ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(fields) = x_filter {
            request = request.header(X_FILTER, fields);
        }
        if let Some(token) = self.auth.authorization() {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        debug!("GET {} -> {} bytes", url, body.len());
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

impl LiveDeskApi for LiveDeskClient {
    fn get_blog(&self) -> BoxFuture<'_, ClientResult<Value>> {
        async move {
            let blog = self.get_json(self.blog_url.as_str(), &[], None).await?;
            if !blog.is_object() {
                return Err(ClientError::InvalidResponse(
                    "blog resource is not an object".into(),
                ));
            }
            Ok(blog)
        }
        .boxed()
    }

    fn get_posts(
        &self,
        posts_url: String,
        filter: Option<QueryFilter>,
    ) -> BoxFuture<'_, ClientResult<Vec<Value>>> {
        async move {
            // a delta only names what changed; full records come from
            // per-post detail fetches
            let body = match filter {
                Some(filter) => {
                    let query = [(SINCE_PARAM, filter.since.to_string())];
                    self.get_json(&posts_url, &query, Some("CId")).await?
                }
                None => {
                    self.get_json(&posts_url, &[], Some(POST_DETAIL_FIELDS))
                        .await?
                }
            };
            Ok(post_records(body)?)
        }
        .boxed()
    }

    fn get_post(&self, url: String) -> BoxFuture<'_, ClientResult<Value>> {
        async move { self.get_json(&url, &[], Some(POST_DETAIL_FIELDS)).await }.boxed()
    }

    fn posts_url(&self, blog: &Blog) -> String {
        match &blog.post_published {
            Some(PostCollection::Resource { href }) => self.resolve(href),
            _ => format!(
                "{}/Post/Published",
                self.blog_url.as_str().trim_end_matches('/')
            ),
        }
    }

    fn post_url(&self, id: &PostId, href: Option<&str>) -> String {
        match href {
            Some(href) => self.resolve(href),
            None => format!("{}/Post/{}", self.blog_url.as_str().trim_end_matches('/'), id),
        }
    }
}
