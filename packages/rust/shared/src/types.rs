//! Core domain types for the article pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Image used when a source offers none.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://via.placeholder.com/150";

/// Description used when a source offers no usable text.
pub const NO_DESCRIPTION: &str = "No description available.";

// ---------------------------------------------------------------------------
// ArticleId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for article identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub Uuid);

impl ArticleId {
    /// Generate a new time-sortable article identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ArticleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArticleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The closed set of editorial categories an enriched article belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Sustainability,
    Design,
    Origin,
    Culture,
    Market,
    Innovation,
    People,
    Competition,
}

impl Category {
    /// All categories, in prompt order.
    pub const ALL: [Category; 8] = [
        Category::Sustainability,
        Category::Design,
        Category::Origin,
        Category::Culture,
        Category::Market,
        Category::Innovation,
        Category::People,
        Category::Competition,
    ];

    /// Category assigned when enrichment falls back.
    pub const FALLBACK: Category = Category::Culture;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sustainability => "Sustainability",
            Self::Design => "Design",
            Self::Origin => "Origin",
            Self::Culture => "Culture",
            Self::Market => "Market",
            Self::Innovation => "Innovation",
            Self::People => "People",
            Self::Competition => "Competition",
        }
    }

    /// Guidance text given to the classifier for this category.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Sustainability => {
                "Ethical sourcing, environmental practices, regenerative farming, traceability, packaging and working conditions at origin."
            }
            Self::Design => {
                "Branding, cafe interiors, packaging, equipment design and the aesthetics of the coffee experience."
            }
            Self::Origin => {
                "Producing regions, terroir, farmer profiles, varieties and processing methods."
            }
            Self::Culture => {
                "Social, historical and everyday rituals of the coffee community, brewing traditions and cafe movements."
            }
            Self::Market => {
                "Business news, retail trends, brand launches, pricing, mergers and consumer behaviour."
            }
            Self::Innovation => {
                "New technology, experimental processes, gear, fermentation techniques and coffee science."
            }
            Self::People => {
                "Interviews and profiles of roasters, producers, baristas, researchers and community leaders."
            }
            Self::Competition => {
                "Barista championships, Cup of Excellence events, brewing contests, winners and judging trends."
            }
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Case-insensitive match against the eight category names.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown category '{needle}'"))
    }
}

// ---------------------------------------------------------------------------
// EnrichmentStatus
// ---------------------------------------------------------------------------

/// Lifecycle of the enrichment step for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Success,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown enrichment status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Article shapes
// ---------------------------------------------------------------------------

/// Image reference attached to an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ArticleImage {
    /// The 150x150 placeholder substituted when no image is found.
    pub fn placeholder() -> Self {
        Self {
            url: PLACEHOLDER_IMAGE_URL.into(),
            width: Some(150),
            height: Some(150),
        }
    }
}

/// An item as produced by a source adapter, before validation.
///
/// Fields are loose on purpose: the initial validation pass decides what is
/// acceptable, so adapters never drop items themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub link: String,
    pub title: String,
    pub source: String,
    pub domain: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// The source gave no usable date and `published_at` was set to the fetch time.
    #[serde(default)]
    pub published_at_estimated: bool,
    pub description: String,
    pub image: Option<ArticleImage>,
}

/// An item that passed initial validation and is ready for phase-1 persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub link: String,
    pub title: String,
    pub source: String,
    pub domain: String,
    pub published_at: DateTime<Utc>,
    /// Estimated dates never replace a stored date on re-fetch.
    #[serde(default)]
    pub published_at_estimated: bool,
    pub description: String,
    pub image: ArticleImage,
}

/// Fields owned by the enrichment step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichmentFields {
    pub category: Option<Category>,
    pub geotag: Option<String>,
    pub tags: Vec<String>,
    pub description_improved: Option<String>,
    pub seo_description: Option<String>,
}

/// A persisted article record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub link: String,
    pub title: String,
    pub source: String,
    pub domain: String,
    pub published_at: DateTime<Utc>,
    pub description: String,
    pub image: ArticleImage,
    #[serde(flatten)]
    pub enrichment: EnrichmentFields,
    pub enrichment_status: EnrichmentStatus,
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_object_id: Option<String>,
    /// Published but edited or re-enriched since the last sync.
    pub needs_sync: bool,
    /// Optimistic-concurrency counter for enrichment-owned state.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Best description available for display and publishing.
    pub fn best_description(&self) -> &str {
        self.enrichment
            .description_improved
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(Some(self.description.as_str()).filter(|d| !d.trim().is_empty()))
            .unwrap_or(NO_DESCRIPTION)
    }
}
