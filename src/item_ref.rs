//! Item references submitted for expansion

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Reference to a catalog item, leaf or collection
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    /// A single track
    Track(String),
    /// A single podcast episode
    Episode(String),
    /// An album (expands to its tracks)
    Album(String),
    /// An artist (expands to every album's tracks)
    Artist(String),
    /// A playlist (expands to its tracks, optionally watched for m3u8 output)
    Playlist(String),
    /// A podcast show (expands to its episodes)
    Podcast(String),
}

impl ItemRef {
    /// Catalog id of the referenced item
    pub fn id(&self) -> &str {
        match self {
            ItemRef::Track(id)
            | ItemRef::Episode(id)
            | ItemRef::Album(id)
            | ItemRef::Artist(id)
            | ItemRef::Playlist(id)
            | ItemRef::Podcast(id) => id,
        }
    }

    fn from_kind(kind: &str, id: &str) -> Option<Self> {
        let id = id.to_string();
        match kind {
            "track" => Some(ItemRef::Track(id)),
            "episode" => Some(ItemRef::Episode(id)),
            "album" => Some(ItemRef::Album(id)),
            "artist" => Some(ItemRef::Artist(id)),
            "playlist" => Some(ItemRef::Playlist(id)),
            "show" | "podcast" => Some(ItemRef::Podcast(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ItemRef::Track(_) => "track",
            ItemRef::Episode(_) => "episode",
            ItemRef::Album(_) => "album",
            ItemRef::Artist(_) => "artist",
            ItemRef::Playlist(_) => "playlist",
            ItemRef::Podcast(_) => "show",
        };
        write!(f, "{kind}:{}", self.id())
    }
}

// Web links: https://open.<host>/[intl-xx/]<kind>/<id>?si=...
#[allow(clippy::unwrap_used)]
static WEB_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://[^/]+/(?:intl-[a-z]{2}/)?(track|episode|album|artist|playlist|show)/([A-Za-z0-9]+)(?:[/?#].*)?$",
    )
    .unwrap()
});

// URIs: <scheme>:<kind>:<id>, also the bare "<kind>:<id>" form produced by Display
#[allow(clippy::unwrap_used)]
static URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z]+:)?(track|episode|album|artist|playlist|show|podcast):([A-Za-z0-9]+)$")
        .unwrap()
});

impl std::str::FromStr for ItemRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let captures = WEB_LINK
            .captures(trimmed)
            .or_else(|| URI.captures(trimmed))
            .ok_or_else(|| Error::UnknownReference(s.to_string()))?;

        ItemRef::from_kind(&captures[1], &captures[2])
            .ok_or_else(|| Error::UnknownReference(s.to_string()))
    }
}
