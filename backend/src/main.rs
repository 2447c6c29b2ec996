extern crate livedesk_backend;
extern crate livedesk_frontend;
extern crate tokio;

use std::sync::Arc;

use clap::Parser;
use log::info;

use livedesk_backend::{Args, EmbedError, LiveBlogEmbed, LiveDeskClient, StaticSession};
use livedesk_frontend::{AvatarSource, Gravatar, MemoryDom, NoAvatars, TimelineController};

#[tokio::main]
async fn main() -> Result<(), EmbedError> {
    livedesk_backend::init_logger();
    let args = Args::parse();
    args.validate().map_err(EmbedError::Config)?;

    let client = LiveDeskClient::new(
        &args.client_config(),
        Arc::new(StaticSession::new(args.token.clone())),
    )?;
    info!("following {}", client.blog_url());

    let avatars: Box<dyn AvatarSource> = if args.gravatar {
        Box::new(Gravatar::default())
    } else {
        Box::new(NoAvatars)
    };
    let timeline = TimelineController::new(MemoryDom::new(), avatars);
    let mut embed = LiveBlogEmbed::new(Arc::new(client), timeline, args.embed_options());

    embed
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
