//! Inputs to [`ContentStore::store`](crate::store::ContentStore::store).

use crate::error::{Error, Result};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Display names for text submissions keep this many characters of the text.
const TEXT_NAME_CHARS: usize = 50;

/// Extensions refused for user submissions.
const BLOCKED_EXTENSIONS: &[&str] = &["php"];

/// Optional descriptive record stored once per content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub user: String,
    pub title: String,
    pub description: String,
    pub url: String,
}

impl Metadata {
    /// Only fully populated records are persisted.
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty()
            && !self.title.is_empty()
            && !self.description.is_empty()
            && !self.url.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub content: Vec<u8>,
    /// Extension without the leading dot; may be empty.
    pub extension: String,
    pub display_name: String,
    pub category: String,
    pub owner: Option<String>,
    pub metadata: Option<Metadata>,
}

impl Submission {
    /// Unvalidated submission, as produced by peer transfers.
    pub fn new(
        content: Vec<u8>,
        extension: impl Into<String>,
        display_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            content,
            extension: extension.into(),
            display_name: display_name.into(),
            category: category.into(),
            owner: None,
            metadata: None,
        }
    }

    /// Build a submission from an uploaded file.
    pub fn from_file(file_name: &str, content: Vec<u8>, category: &str) -> Result<Self> {
        let submission = Self::new(content, extension_of(file_name), file_name, category);
        submission.validate()?;
        Ok(submission)
    }

    /// Build a submission from free text, stamped with the current local time.
    pub fn from_text(text: &str, category: &str) -> Result<Self> {
        Self::from_text_at(text, category, Local::now().naive_local())
    }

    pub fn from_text_at(text: &str, category: &str, at: NaiveDateTime) -> Result<Self> {
        if category == text {
            return Err(Error::Validation(
                "Category can't be the same as the text content".to_string(),
            ));
        }
        let head: String = text.chars().take(TEXT_NAME_CHARS).collect();
        let display_name = format!("{} ({})", head, at.format("%Y.%m.%d %H:%M:%S"));
        let submission = Self::new(text.as_bytes().to_vec(), "txt", display_name, category);
        submission.validate()?;
        Ok(submission)
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        self.owner = (!owner.is_empty()).then_some(owner);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Checks applied to user submissions before anything touches disk.
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(Error::Validation("A category is required".to_string()));
        }
        if self.content.is_empty() {
            return Err(Error::Validation("No content to process".to_string()));
        }
        let ext = self.extension.to_ascii_lowercase();
        if BLOCKED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::Validation(format!(
                "{} files are not allowed",
                ext.to_uppercase()
            )));
        }
        Ok(())
    }
}

/// Split a file name at its last dot into `(stem, extension)`.
///
/// Only the final path component is considered. A leading dot counts, so
/// `.hidden` has an empty stem and extension `hidden`, and `file.` has
/// stem `file` and an empty extension.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind(['.', '/']) {
        Some(i) if file_name[i..].starts_with('.') => (&file_name[..i], &file_name[i + 1..]),
        _ => (file_name, ""),
    }
}

/// Final extension of a file name without the dot, or "" if there is none.
pub fn extension_of(file_name: &str) -> String {
    split_extension(file_name).1.to_string()
}
