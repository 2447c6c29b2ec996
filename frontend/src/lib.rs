extern crate console_error_panic_hook;
extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod avatar;
pub mod cursor;
pub mod dom;
pub mod error;
pub mod ordered_list;
pub mod post;
pub mod render;
pub mod retry;
pub mod timeline;

#[cfg(target_arch = "wasm32")]
pub mod browser;

pub use avatar::{AvatarSource, Gravatar, NoAvatars};
pub use cursor::{ChangeCursor, QueryFilter};
pub use dom::{MemoryDom, PostDom};
pub use error::RecordError;
pub use ordered_list::{OrderedPostList, Placement};
pub use post::{post_records, Blog, Post, PostDelta, PostId};
pub use render::{classify, render_post, PostClass, Service};
pub use retry::RetryPolicy;
pub use timeline::{Refetch, TimelineController, TimelineState};

/// How often both polling loops tick, in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Fields a post detail fetch asks the server for.
pub const POST_DETAIL_FIELDS: &str = "DeletedOn, Order, Id, CId, Content, CreatedOn, Type, \
     AuthorName, Author.Source.Name, Author.Source.Id, IsModified, PublishedOn, Meta, \
     AuthorPerson.EMail, AuthorPerson.FirstName, AuthorPerson.LastName, AuthorPerson.Id";
