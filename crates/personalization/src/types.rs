//! Plain records exchanged between the scoring core and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constitution::Constitution;

/// Kind of content item served by the content store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Recipe,
    Herb,
    Exercise,
    Video,
    Product,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Recipe => "recipe",
            ContentType::Herb => "herb",
            ContentType::Exercise => "exercise",
            ContentType::Video => "video",
            ContentType::Product => "product",
        }
    }
}

/// Thermal nature of a food or herb in TCM terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TcmNature {
    Cold,
    Cool,
    Neutral,
    Warm,
    Hot,
}

impl TcmNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            TcmNature::Cold => "cold",
            TcmNature::Cool => "cool",
            TcmNature::Neutral => "neutral",
            TcmNature::Warm => "warm",
            TcmNature::Hot => "hot",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcmProperties {
    pub nature: Option<TcmNature>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub meridians: Vec<String>,
}

/// A recommendation candidate as supplied by the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
    /// View count used by the non-personalized fallback
    #[serde(default)]
    pub popularity: u64,
    #[serde(default)]
    pub tcm: TcmProperties,
}

impl Content {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content_type: ContentType,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content_type,
            tags: Vec::new(),
            published_at,
            popularity: 0,
            tcm: TcmProperties::default(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_popularity(mut self, popularity: u64) -> Self {
        self.popularity = popularity;
        self
    }

    pub fn with_nature(mut self, nature: TcmNature) -> Self {
        self.tcm.nature = Some(nature);
        self
    }

    pub fn with_effects(mut self, effects: &[&str]) -> Self {
        self.tcm.effects = effects.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_meridians(mut self, meridians: &[&str]) -> Self {
        self.tcm.meridians = meridians.iter().map(|m| m.to_string()).collect();
        self
    }
}

/// What the scoring core needs to know about a user beyond interests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub constitution: Option<Constitution>,
    /// Health goal tags, e.g. "sleep", "digestion"
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub segments: Vec<String>,
    pub region: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

/// Screen the recommendation was requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationContext {
    Home,
    Profile,
    Detail,
    Search,
    Category,
}

/// Algorithm label recorded with each recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    InterestBased,
    ProfileBased,
    Seasonal,
    Hybrid,
    Popular,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::InterestBased => "interest_based",
            Algorithm::ProfileBased => "profile_based",
            Algorithm::Seasonal => "seasonal",
            Algorithm::Hybrid => "hybrid",
            Algorithm::Popular => "popular",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "interest_based" => Ok(Self::InterestBased),
            "profile_based" => Ok(Self::ProfileBased),
            "seasonal" => Ok(Self::Seasonal),
            "hybrid" => Ok(Self::Hybrid),
            "popular" => Ok(Self::Popular),
            other => Err(format!("unknown algorithm '{other}'")),
        }
    }
}

/// Inbound recommendation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    pub context: Option<RecommendationContext>,
    pub limit: Option<usize>,
    /// Overrides the stored profile's constitution for this request
    pub constitution: Option<Constitution>,
    pub segments: Option<Vec<String>>,
    pub region: Option<String>,
}

impl RecommendationRequest {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: RecommendationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub content_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub items: Vec<RecommendedItem>,
    pub algorithm: Algorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ab_test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ab_test_variant: Option<String>,
}
