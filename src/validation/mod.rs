use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::fmt;

pub const PRODUCT_NAME_MIN_LEN: usize = 3;
pub const PRODUCT_NAME_MAX_LEN: usize = 45;
pub const IMAGE_URL_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_len(field: &'static str, value: &str, min_len: usize, max_len: usize) -> ValidationResult {
    let len = value.chars().count();
    if len < min_len || len > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be between {} and {} characters", min_len, max_len),
        ));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_product_name(name: &str) -> ValidationResult {
    let name = sanitize_string(name);
    validate_required("name", &name)?;
    validate_len("name", &name, PRODUCT_NAME_MIN_LEN, PRODUCT_NAME_MAX_LEN)
}

pub fn validate_price(price: &BigDecimal) -> ValidationResult {
    if price < &BigDecimal::from(0) {
        return Err(ValidationError::new("price", "must not be negative"));
    }
    if &price.with_scale(0) != price {
        return Err(ValidationError::new("price", "must be a whole currency amount"));
    }

    Ok(())
}

pub fn validate_stock(field: &'static str, stock: i64) -> ValidationResult {
    if stock < 0 {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

pub fn validate_validity_window(
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> ValidationResult {
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end <= start {
            return Err(ValidationError::new("end_date", "must be after start_date"));
        }
    }

    Ok(())
}
