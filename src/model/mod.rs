//! Canonical document model shared by storage and the publishing pipeline.
//!
//! A [`Book`] exclusively owns an ordered list of [`Chapter`]s. Word counts are
//! always derived from content through [`word_count`] and aggregated per book.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod word_count;

pub use word_count::word_count;

/// Lifecycle status of a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookStatus {
    #[default]
    Draft,
    InProgress,
    Completed,
}

/// Structural role of a chapter within the book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    #[default]
    Chapter,
    Prologue,
    Epilogue,
    Part,
    Frontmatter,
    Backmatter,
}

/// Revision status of a chapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    #[default]
    Draft,
    Revised,
    Final,
}

/// Error returned when a stored enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(BookStatus {
    Draft => "draft",
    InProgress => "in-progress",
    Completed => "completed",
});

string_enum!(ChapterType {
    Chapter => "chapter",
    Prologue => "prologue",
    Epilogue => "epilogue",
    Part => "part",
    Frontmatter => "frontmatter",
    Backmatter => "backmatter",
});

impl ChapterType {
    /// Whether chapters of this type take part in "Chapter N" numbering.
    pub fn is_numbered(&self) -> bool {
        matches!(self, ChapterType::Chapter)
    }
}

string_enum!(ChapterStatus {
    Draft => "draft",
    Revised => "revised",
    Final => "final",
});

/// A book and its cached metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub author_name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub language: String,
    /// External cover reference (file path or URL)
    pub cover_path: Option<String>,
    /// Embedded cover image as a data URI
    pub cover_image: Option<String>,
    /// Sum of chapter word counts; never edited directly
    pub word_count: i64,
    pub target_word_count: Option<i64>,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_opened_at: Option<DateTime<Utc>>,
    /// Last viewed chapter, used to resume on open
    pub last_chapter_id: Option<String>,
}

impl Book {
    /// The cover source to export, preferring embedded image data.
    pub fn cover_source(&self) -> Option<&str> {
        self.cover_image
            .as_deref()
            .or(self.cover_path.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// A chapter owned by exactly one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub book_id: String,
    pub title: String,
    /// Rich-HTML body; `None` until first saved
    pub content: Option<String>,
    pub synopsis: Option<String>,
    /// Dense position within the book (0..N-1)
    pub order: i64,
    pub parent_id: Option<String>,
    pub chapter_type: ChapterType,
    pub word_count: i64,
    pub status: ChapterStatus,
    pub is_included_in_export: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewBook {
    pub title: String,
    pub subtitle: Option<String>,
    pub author_name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub language: Option<String>,
    pub target_word_count: Option<i64>,
}

impl NewBook {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_name = author.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Sparse update for a book. `None` leaves a field untouched; for nullable
/// columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub subtitle: Option<Option<String>>,
    pub author_name: Option<String>,
    pub description: Option<Option<String>>,
    pub genre: Option<Option<String>>,
    pub language: Option<String>,
    pub cover_path: Option<Option<String>>,
    pub cover_image: Option<Option<String>>,
    pub target_word_count: Option<Option<i64>>,
    pub status: Option<BookStatus>,
    pub last_chapter_id: Option<Option<String>>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        *self == BookPatch::default()
    }
}

/// Fields supplied when creating a chapter. Order, status, type and word count
/// are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewChapter {
    pub title: String,
    pub parent_id: Option<String>,
    pub chapter_type: Option<ChapterType>,
}

impl NewChapter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, chapter_type: ChapterType) -> Self {
        self.chapter_type = Some(chapter_type);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Sparse update for a chapter. Word count is not patchable; it follows content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterPatch {
    pub title: Option<String>,
    pub content: Option<Option<String>>,
    pub synopsis: Option<Option<String>>,
    pub parent_id: Option<Option<String>>,
    pub chapter_type: Option<ChapterType>,
    pub status: Option<ChapterStatus>,
    pub is_included_in_export: Option<bool>,
}

impl ChapterPatch {
    pub fn content(html: impl Into<String>) -> Self {
        Self {
            content: Some(Some(html.into())),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ChapterPatch::default()
    }
}
