extern crate env_logger;
extern crate livedesk_frontend;
extern crate log;
extern crate serde;
extern crate serde_json;

pub mod client;
pub mod config;
pub mod embed;
pub mod error;
pub mod polling;

use std::io::Write;

pub use client::{ClientConfig, LiveDeskApi, LiveDeskClient, SessionAuth, StaticSession};
pub use config::Args;
pub use embed::{EmbedOptions, LiveBlogEmbed};
pub use error::{ClientError, ClientResult, EmbedError};
pub use polling::{PollingSync, Stream, SyncEvent, SyncObserver};

pub fn init_logger() {
    // tests and embedders may have installed a logger already
    let _ = env_logger::builder()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .try_init();
}
