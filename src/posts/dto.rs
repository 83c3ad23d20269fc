use serde::Deserialize;

use crate::error::AppError;

pub const TITLE_MAX: usize = 100;
pub const CONTENT_MAX: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `version`, when present, must match the stored version.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub version: Option<i32>,
}

pub(crate) fn validate_title(title: &str) -> Result<(), AppError> {
    let len = title.chars().count();
    if len == 0 || len > TITLE_MAX {
        return Err(AppError::validation(format!(
            "title must be 1 to {TITLE_MAX} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_content(content: &str) -> Result<(), AppError> {
    let len = content.chars().count();
    if len == 0 || len > CONTENT_MAX {
        return Err(AppError::validation(format!(
            "content must be 1 to {CONTENT_MAX} characters"
        )));
    }
    Ok(())
}
