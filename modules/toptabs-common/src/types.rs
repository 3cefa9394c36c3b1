use serde::{Deserialize, Deserializer, Serialize};

/// Host that serves individual tab pages. Canonical identifiers are built on it.
pub const TABS_BASE_URL: &str = "https://tabs.ultimate-guitar.com";

/// Host that serves the ranked top listings.
pub const DEFAULT_LISTING_BASE_URL: &str = "https://www.ultimate-guitar.com";

/// Build the canonical identifier for a tab from its numeric id.
pub fn tab_url(id: u64) -> String {
    format!("{TABS_BASE_URL}/tab/{id}")
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Chords,
    Tab,
    GuitarPro,
    Ukulele,
    Bass,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Chords,
        Category::Tab,
        Category::GuitarPro,
        Category::Ukulele,
        Category::Bass,
    ];

    /// Canonical key, as persisted in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Chords => "chords",
            Category::Tab => "tab",
            Category::GuitarPro => "guitar_pro",
            Category::Ukulele => "ukulele",
            Category::Bass => "bass",
        }
    }

    /// Value of the listing's `type` query parameter.
    pub fn query_param(&self) -> &'static str {
        match self {
            Category::Chords => "chords",
            Category::Tab => "tabs",
            Category::GuitarPro => "pro",
            Category::Ukulele => "ukulele_chords",
            Category::Bass => "bass_tabs",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("Unknown category: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Most-viewed first.
    Hits,
    /// Best-rated first.
    Rating,
}

impl SortOrder {
    pub const ALL: [SortOrder; 2] = [SortOrder::Hits, SortOrder::Rating];

    pub fn query_param(&self) -> &'static str {
        match self {
            SortOrder::Hits => "hitstotal_desc",
            SortOrder::Rating => "rating_desc",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Hits => write!(f, "hits"),
            SortOrder::Rating => write!(f, "rating"),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hits" => Ok(SortOrder::Hits),
            "rating" => Ok(SortOrder::Rating),
            other => anyhow::bail!("Unknown sort order: {other}"),
        }
    }
}

// --- Listing ---

/// One ranked page for a category and sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub category: Category,
    pub order: SortOrder,
    pub url: String,
}

impl Listing {
    pub fn new(base_url: &str, category: Category, order: SortOrder) -> Self {
        let url = format!(
            "{}/top/tabs?order={}&type={}",
            base_url.trim_end_matches('/'),
            order.query_param(),
            category.query_param()
        );
        Self {
            category,
            order,
            url,
        }
    }
}

impl std::fmt::Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.category, self.order)
    }
}

// --- Records ---

/// One merged catalog entry, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub song: String,
    /// Always set by a live merge. Rows imported from raw dumps may lack it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hits: u64,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub votes: Option<u64>,
}

/// A partial record seen in one listing. Any field but the key may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub url: String,
    pub category: Category,
    pub artist: Option<String>,
    pub song: Option<String>,
    pub hits: Option<u64>,
    pub rating: Option<f64>,
    pub votes: Option<u64>,
}

impl Observation {
    pub fn new(url: impl Into<String>, category: Category) -> Self {
        Self {
            url: url.into(),
            category,
            artist: None,
            song: None,
            hits: None,
            rating: None,
            votes: None,
        }
    }

    pub fn named(mut self, artist: &str, song: &str) -> Self {
        self.artist = Some(artist.to_string());
        self.song = Some(song.to_string());
        self
    }

    pub fn with_hits(mut self, hits: u64) -> Self {
        self.hits = Some(hits);
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_votes(mut self, votes: u64) -> Self {
        self.votes = Some(votes);
        self
    }

    /// Both identity fields present and non-blank, trimmed.
    pub fn identity(&self) -> Option<(&str, &str)> {
        let artist = self.artist.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let song = self.song.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((artist, song))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
