use crate::models::NewEntryRequest;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_AUTHOR_LENGTH: usize = 80;
pub const MAX_LOCATION_LENGTH: usize = 160;
pub const MAX_URL_LENGTH: usize = 500;
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Title is required")]
    MissingTitle,
    #[error("Author is required")]
    MissingAuthor,
    #[error("Location is required")]
    MissingLocation,
    #[error("Video link is required")]
    MissingUrl,
    #[error("Title exceeds maximum length of {MAX_TITLE_LENGTH}")]
    TitleTooLong,
    #[error("Author exceeds maximum length of {MAX_AUTHOR_LENGTH}")]
    AuthorTooLong,
    #[error("Location exceeds maximum length of {MAX_LOCATION_LENGTH}")]
    LocationTooLong,
    #[error("Video link exceeds maximum length of {MAX_URL_LENGTH}")]
    UrlTooLong,
    #[error("Video link must be an http(s) URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,
    #[error("Display name is required")]
    MissingDisplayName,
    #[error("Phone number is required")]
    MissingPhone,
}

fn required(value: &str, max: usize, missing: ValidationError, too_long: ValidationError) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() { return Err(missing); }
    if value.chars().count() > max { return Err(too_long); }
    Ok(())
}

/// Checks a submission and returns it with surrounding whitespace trimmed.
pub fn validate_entry_request(request: &NewEntryRequest) -> Result<NewEntryRequest, ValidationError> {
    required(&request.title, MAX_TITLE_LENGTH, ValidationError::MissingTitle, ValidationError::TitleTooLong)?;
    required(&request.author, MAX_AUTHOR_LENGTH, ValidationError::MissingAuthor, ValidationError::AuthorTooLong)?;
    required(&request.location, MAX_LOCATION_LENGTH, ValidationError::MissingLocation, ValidationError::LocationTooLong)?;
    required(&request.url, MAX_URL_LENGTH, ValidationError::MissingUrl, ValidationError::UrlTooLong)?;

    let url = request.url.trim();
    let host = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"));
    if !host.is_some_and(|rest| !rest.is_empty() && !rest.contains(char::is_whitespace)) {
        return Err(ValidationError::InvalidUrl(url.to_string()));
    }

    Ok(NewEntryRequest {
        title: request.title.trim().to_string(),
        author: request.author.trim().to_string(),
        location: request.location.trim().to_string(),
        category: request.category,
        url: url.to_string(),
    })
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => {}
        _ => return Err(ValidationError::InvalidEmail),
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH { return Err(ValidationError::PasswordTooShort); }
    Ok(())
}
