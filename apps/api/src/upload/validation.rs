use thiserror::Error;

pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const ACCEPTED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid file type. Please upload JPG, PNG, or WebP.")]
    UnsupportedType(String),

    #[error("File size too large. Max size is {}MB.", MAX_FILE_SIZE / 1024 / 1024)]
    TooLarge(usize),

    #[error("File is empty.")]
    Empty,
}

/// Checks a file before it is queued for processing.
pub fn validate(content_type: &str, size: usize) -> Result<(), ValidationError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ACCEPTED_TYPES.contains(&mime.as_str()) {
        return Err(ValidationError::UnsupportedType(content_type.to_string()));
    }
    if size == 0 {
        return Err(ValidationError::Empty);
    }
    if size > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge(size));
    }
    Ok(())
}
