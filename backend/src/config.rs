//! Command line and environment configuration for the embed runner.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use livedesk_frontend::{RetryPolicy, DEFAULT_INTERVAL_SECS};

use crate::client::ClientConfig;
use crate::embed::EmbedOptions;

/// Follows a LiveDesk blog and keeps a rendered copy of it up to date
#[derive(Parser, Debug, Clone)]
#[command(name = "livedesk-embed")]
#[command(about = "Headless LiveDesk live blog embed")]
pub struct Args {
    /// Blog resource URL, e.g. http://host/resources/LiveDesk/Blog/1
    /// An editor URL containing "my/" is accepted and made public
    #[arg(long, env = "LIVEDESK_BLOG_URL")]
    pub blog_url: String,

    /// Session token sent as the Authorization header
    #[arg(long, env = "LIVEDESK_TOKEN")]
    pub token: Option<String>,

    /// Seconds between polls
    #[arg(long, env = "LIVEDESK_INTERVAL_SECS", default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// Request timeout in seconds
    #[arg(long, env = "LIVEDESK_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Attempts for the initial blog fetch before giving up
    #[arg(long, env = "LIVEDESK_RETRY_ATTEMPTS", default_value = "5")]
    pub retry_attempts: u32,

    /// File the rendered page is written to whenever it changes
    #[arg(long, env = "LIVEDESK_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Use Gravatar images for authors without an avatar
    #[arg(long, env = "LIVEDESK_GRAVATAR", default_value = "false")]
    pub gravatar: bool,
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            blog_url: self.blog_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn embed_options(&self) -> EmbedOptions {
        EmbedOptions {
            interval: Duration::from_secs(self.interval_secs),
            retry: RetryPolicy::default().with_attempts(self.retry_attempts),
            snapshot: self.output.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.blog_url.trim().is_empty() {
            return Err("LIVEDESK_BLOG_URL must not be empty".to_string());
        }
        if self.interval_secs == 0 {
            return Err("LIVEDESK_INTERVAL_SECS must be at least 1".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("LIVEDESK_TIMEOUT_SECS must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("livedesk-embed").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--blog-url", "http://host/resources/LiveDesk/Blog/1"]);

        assert_eq!(args.interval_secs, DEFAULT_INTERVAL_SECS);
        assert!(!args.gravatar);
        assert!(args.validate().is_ok());

        let options = args.embed_options();
        assert_eq!(options.interval, Duration::from_secs(10));
        assert_eq!(options.retry.max_attempts, 5);
        assert!(options.snapshot.is_none());
        assert_eq!(args.client_config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "--blog-url",
            "http://host/Blog/1",
            "--interval-secs",
            "3",
            "--retry-attempts",
            "2",
            "--output",
            "/tmp/blog.html",
            "--gravatar",
        ]);

        let options = args.embed_options();
        assert_eq!(options.interval, Duration::from_secs(3));
        assert_eq!(options.retry.max_attempts, 2);
        assert_eq!(options.snapshot, Some(PathBuf::from("/tmp/blog.html")));
        assert!(args.gravatar);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let args = parse(&["--blog-url", "http://host/Blog/1", "--interval-secs", "0"]);
        assert!(args.validate().is_err());
    }
}
