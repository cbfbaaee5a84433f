use crate::error::ApiError;
use shared::CategoryFilter;
use uuid::Uuid;

pub fn parse_entry_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::InvalidId)
}

pub fn parse_category(category: Option<&str>) -> Result<CategoryFilter, ApiError> {
    category
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiError::InvalidCategory(category.unwrap_or_default().to_string()))
}
