//! VOD submission input

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ClientError, Result};

/// A VOD URL that passed client-side validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VodSubmission {
    url: String,
}

impl VodSubmission {
    /// Trim the input and reject it when nothing is left.
    pub fn new(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ClientError::EmptyVodUrl);
        }
        Ok(Self {
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Numeric video id from `.../videos/<id>` or a bare id
    pub fn video_id(&self) -> Option<&str> {
        static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
        let re = VIDEO_ID.get_or_init(|| {
            Regex::new(r"(?:/videos/(\d+))|(?:^(\d+)$)").expect("static regex is valid")
        });

        let caps = re.captures(&self.url)?;
        caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_urls_are_rejected() {
        for input in ["", "   ", "\t\n", " \u{a0}"] {
            assert!(
                matches!(VodSubmission::new(input), Err(ClientError::EmptyVodUrl)),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_url_is_trimmed() {
        let vod = VodSubmission::new("  https://www.twitch.tv/videos/2213 \n").unwrap();
        assert_eq!(vod.url(), "https://www.twitch.tv/videos/2213");
    }

    #[test]
    fn test_video_id_extraction() {
        let vod = VodSubmission::new("https://www.twitch.tv/videos/2213456789?t=1h2m").unwrap();
        assert_eq!(vod.video_id(), Some("2213456789"));

        let bare = VodSubmission::new("2213456789").unwrap();
        assert_eq!(bare.video_id(), Some("2213456789"));

        let channel = VodSubmission::new("https://www.twitch.tv/somebody").unwrap();
        assert_eq!(channel.video_id(), None);
    }
}
