//! Tile records and editable tile content.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Coords, MAX_TITLE_LEN};

/// An owned cell as stored in the ledger.
///
/// Unowned cells have no record at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    /// Email of the owning user.
    pub owner: String,
    /// Empty until the owner edits the tile for the first time.
    pub title: String,
    pub subtitle: Option<String>,
    pub link: Option<String>,
    /// Object key of the tile image in the submitted bucket.
    pub image: Option<String>,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub updated_at: u64,
}

impl Tile {
    pub fn coords(&self) -> Coords {
        Coords::new(self.x, self.y)
    }
}

/// Owner-editable fields of a tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileContent {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub link: String,
}

/// Reasons a [`TileContent`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("title is required")]
    TitleRequired,

    #[error("title is too long ({len} > {MAX_TITLE_LEN})")]
    TitleTooLong { len: usize },

    #[error("subtitle is too long ({len} > {MAX_TITLE_LEN})")]
    SubtitleTooLong { len: usize },

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("unsupported image type: {0}")]
    UnsupportedImageType(String),
}

/// Image content types accepted for tile uploads.
pub const ACCEPTED_IMAGE_TYPES: [&str; 2] = ["image/png", "image/jpeg"];

/// Check an upload content type against [`ACCEPTED_IMAGE_TYPES`].
pub fn validate_image_type(content_type: &str) -> Result<(), ContentError> {
    if ACCEPTED_IMAGE_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(ContentError::UnsupportedImageType(content_type.to_string()))
    }
}

impl TileContent {
    /// Check length limits and link format.
    pub fn validate(&self) -> Result<(), ContentError> {
        let title_len = self.title.chars().count();
        if title_len == 0 {
            return Err(ContentError::TitleRequired);
        }
        if title_len > MAX_TITLE_LEN {
            return Err(ContentError::TitleTooLong { len: title_len });
        }

        if let Some(subtitle) = &self.subtitle {
            let len = subtitle.chars().count();
            if len > MAX_TITLE_LEN {
                return Err(ContentError::SubtitleTooLong { len });
            }
        }

        validate_link(&self.link)
    }
}

/// A link must be an absolute `https` URL or a `tel:` URI with an
/// international number.
pub fn validate_link(link: &str) -> Result<(), ContentError> {
    if is_https_link(link) || is_tel_link(link) {
        Ok(())
    } else {
        Err(ContentError::InvalidLink(link.to_string()))
    }
}

fn is_https_link(link: &str) -> bool {
    match url::Url::parse(link) {
        Ok(parsed) => parsed.scheme() == "https" && parsed.has_host(),
        Err(_) => false,
    }
}

fn is_tel_link(link: &str) -> bool {
    tel_pattern().is_match(link)
}

fn tel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^tel:\+[0-9]{5,16}$").expect("valid tel pattern"))
}
