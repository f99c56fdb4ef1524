use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const DEFAULT_READ_TIME: &str = "2 min";
pub const DEFAULT_AUTHOR: &str = "Admin";

/// Fixed set of sections an article can be published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Mental,
    Sports,
    Politics,
    Finance,
    Life,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Mental,
        Category::Sports,
        Category::Politics,
        Category::Finance,
        Category::Life,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mental => "mental",
            Category::Sports => "sports",
            Category::Politics => "politics",
            Category::Finance => "finance",
            Category::Life => "life",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Mental => "Mental & Fitness",
            Category::Sports => "Sports",
            Category::Politics => "Politics",
            Category::Finance => "Finance & Economy",
            Category::Life => "Life Skills",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::Mental => "🧠",
            Category::Sports => "⚽",
            Category::Politics => "🏛️",
            Category::Finance => "💹",
            Category::Life => "🌟",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("Unknown category: {}", s)))
    }
}

/// A published news record, serialized with the camelCase keys of the stored collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub author: String,
    /// URL or `data:` payload; empty means no image.
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_read_time")]
    pub read_time: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
}

fn default_read_time() -> String {
    DEFAULT_READ_TIME.to_string()
}

impl Article {
    /// Builds a fresh record from a draft whose image has already been resolved.
    pub fn from_draft(draft: ArticleDraft, image: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: draft.title,
            content: draft.content,
            category: draft.category,
            author: draft.author,
            image,
            read_time: draft.read_time,
            created_at: Utc::now(),
            views: 0,
            likes: 0,
        }
    }

    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }

    /// Each non-blank line of the body is rendered as its own paragraph.
    pub fn paragraphs(&self) -> Vec<&str> {
        self.content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    pub fn excerpt(&self, max_chars: usize) -> String {
        excerpt(&self.content, max_chars)
    }

    pub fn display_date(&self) -> String {
        self.created_at.format("%b %-d, %Y").to_string()
    }

    pub fn share_text(&self, base_url: &str) -> String {
        format!(
            "{}\n\n{}\n\n{}/news/{}",
            self.title,
            excerpt(&self.content, 100),
            base_url.trim_end_matches('/'),
            self.id
        )
    }

    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_record(record: &Value) -> Result<Self> {
        Ok(serde_json::from_value(record.clone())?)
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();

        text.push_str(&format!("{} {}\n", self.category.icon(), self.title));
        text.push_str(&format!(
            "By {} · {} · {} read\n",
            self.author,
            self.display_date(),
            self.read_time
        ));
        text.push_str(&format!("👁️ {} views  ❤️ {} likes\n", self.views, self.likes));
        if self.has_image() && !self.image.starts_with("data:") {
            text.push_str(&format!("Image: {}\n", self.image));
        }
        text.push_str("\n---\n\n");
        text.push_str(&self.paragraphs().join("\n\n"));
        text.push('\n');

        text
    }
}

/// Truncates on a character boundary and appends `...` when anything was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// Where the image of a draft or update comes from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ImageSource {
    #[default]
    None,
    /// An already hosted URL (or a previously stored data URL).
    Url(String),
    /// Raw bytes that must go through the image upload provider.
    Upload { bytes: Vec<u8>, filename: String },
}

impl ImageSource {
    pub fn needs_upload(&self) -> bool {
        matches!(self, ImageSource::Upload { .. })
    }
}

/// Caller-populated fields for a new article. Non-emptiness is the caller's contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub category: Category,
    pub author: String,
    pub read_time: String,
    pub image: ImageSource,
}

impl ArticleDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, category: Category) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category,
            author: DEFAULT_AUTHOR.to_string(),
            read_time: DEFAULT_READ_TIME.to_string(),
            image: ImageSource::None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_read_time(mut self, read_time: impl Into<String>) -> Self {
        self.read_time = read_time.into();
        self
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.image = image;
        self
    }

    /// Form-level check performed by callers before `create`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("title", &self.title),
            ("content", &self.content),
            ("author", &self.author),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{} is required", name)));
            }
        }
        Ok(())
    }
}

/// A shallow partial update. Only the fields that are `Some` are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub author: Option<String>,
    pub read_time: Option<String>,
    pub image: Option<ImageSource>,
    pub views: Option<u64>,
    pub likes: Option<u64>,
}

const IMMUTABLE_FIELDS: [&str; 2] = ["id", "createdAt"];

impl ArticleUpdate {
    pub fn views(views: u64) -> Self {
        Self { views: Some(views), ..Default::default() }
    }

    pub fn likes(likes: u64) -> Self {
        Self { likes: Some(likes), ..Default::default() }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parses an untyped field map, rejecting the immutable `id` and `createdAt` keys.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        let mut update = Self::default();

        for (key, value) in fields {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                return Err(Error::ImmutableField(key.clone()));
            }
            match key.as_str() {
                "title" => update.title = Some(string_field(key, value)?),
                "content" => update.content = Some(string_field(key, value)?),
                "author" => update.author = Some(string_field(key, value)?),
                "readTime" => update.read_time = Some(string_field(key, value)?),
                "category" => update.category = Some(string_field(key, value)?.parse()?),
                "image" => update.image = Some(ImageSource::Url(string_field(key, value)?)),
                "views" => update.views = Some(count_field(key, value)?),
                "likes" => update.likes = Some(count_field(key, value)?),
                other => {
                    return Err(Error::Validation(format!("Unknown article field: {}", other)));
                }
            }
        }

        Ok(update)
    }

    /// JSON patch for every field except an image that still needs uploading.
    pub fn to_patch(&self, resolved_image: Option<String>) -> Map<String, Value> {
        let mut patch = Map::new();

        if let Some(title) = &self.title {
            patch.insert("title".into(), Value::String(title.clone()));
        }
        if let Some(content) = &self.content {
            patch.insert("content".into(), Value::String(content.clone()));
        }
        if let Some(category) = &self.category {
            patch.insert("category".into(), Value::String(category.as_str().into()));
        }
        if let Some(author) = &self.author {
            patch.insert("author".into(), Value::String(author.clone()));
        }
        if let Some(read_time) = &self.read_time {
            patch.insert("readTime".into(), Value::String(read_time.clone()));
        }
        if let Some(image) = resolved_image {
            patch.insert("image".into(), Value::String(image));
        }
        if let Some(views) = self.views {
            patch.insert("views".into(), Value::from(views));
        }
        if let Some(likes) = self.likes {
            patch.insert("likes".into(), Value::from(likes));
        }

        patch
    }
}

fn string_field(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("{} must be a string", key)))
}

fn count_field(key: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| Error::Validation(format!("{} must be a non-negative integer", key)))
}
