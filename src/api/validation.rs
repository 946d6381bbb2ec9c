//! Input validation for API requests.
//!
//! Each validator returns `Err(message)` for the caller to attach to a field;
//! collect them with `ValidationErrorBuilder` from the `error` module.

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{parse_time, MAX_SESSION_MINUTES, MIN_SESSION_MINUTES};

lazy_static! {
    /// Pragmatic email check: one `@`, a dot in the domain, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$"
    ).unwrap();

    /// E.164-ish phone numbers, separators allowed
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9][0-9 ()-]{6,19}$"
    ).unwrap();

    /// Row ids: identity-provider UUIDs or seeded slugs
    static ref ID_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$"
    ).unwrap();

    /// Two-letter language codes with an optional region (en, en-GB)
    static ref LANGUAGE_REGEX: Regex = Regex::new(
        r"^[a-z]{2}(-[A-Z]{2})?$"
    ).unwrap();

    /// Product keys in the pricing table
    static ref PRODUCT_KEY_REGEX: Regex = Regex::new(
        r"^[a-z][a-z0-9_]{1,63}$"
    ).unwrap();
}

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 1000;
pub const MAX_PACKAGE_SESSIONS: i64 = 100;

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Validate an optional phone number; blank counts as absent
pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    match phone.as_deref().map(str::trim) {
        None | Some("") => Ok(()),
        Some(p) => {
            let digits = p.chars().filter(char::is_ascii_digit).count();
            if !PHONE_REGEX.is_match(p) || !(8..=15).contains(&digits) {
                Err("Invalid phone number".to_string())
            } else {
                Ok(())
            }
        }
    }
}

pub fn validate_full_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name is too long (max {} characters)", MAX_NAME_LEN));
    }
    if name.chars().any(char::is_control) {
        return Err("Name contains invalid characters".to_string());
    }
    Ok(())
}

pub fn validate_language(language: &str) -> Result<(), String> {
    if LANGUAGE_REGEX.is_match(language) {
        Ok(())
    } else {
        Err("Language must be a code like 'en' or 'en-GB'".to_string())
    }
}

pub fn validate_id(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if !ID_REGEX.is_match(id) {
        return Err(format!("Invalid {} format", field_name));
    }
    Ok(())
}

pub fn validate_duration(minutes: i64) -> Result<(), String> {
    if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&minutes) {
        return Err(format!(
            "Duration must be between {} and {} minutes",
            MIN_SESSION_MINUTES, MAX_SESSION_MINUTES
        ));
    }
    Ok(())
}

pub fn validate_notes(notes: &Option<String>) -> Result<(), String> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => {
            Err(format!("Notes are too long (max {} characters)", MAX_NOTES_LEN))
        }
        _ => Ok(()),
    }
}

/// Validate an `HH:MM` time of day
pub fn validate_time(value: &str) -> Result<NaiveTime, String> {
    parse_time(value).ok_or_else(|| format!("Invalid time '{}', expected HH:MM", value))
}

/// Validate a `[start, end)` pair of `HH:MM` times
pub fn validate_time_range(start: &str, end: &str) -> Result<(), String> {
    let start = validate_time(start)?;
    let end = validate_time(end)?;
    if start >= end {
        return Err("End time must be after start time".to_string());
    }
    Ok(())
}

/// Weekday index, 0 = Monday through 6 = Sunday
pub fn validate_weekday(weekday: i64) -> Result<(), String> {
    if !(0..=6).contains(&weekday) {
        return Err("Weekday must be between 0 (Monday) and 6 (Sunday)".to_string());
    }
    Ok(())
}

pub fn validate_total_sessions(total: i64) -> Result<(), String> {
    if !(1..=MAX_PACKAGE_SESSIONS).contains(&total) {
        return Err(format!(
            "Session count must be between 1 and {}",
            MAX_PACKAGE_SESSIONS
        ));
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be a non-negative amount".to_string());
    }
    Ok(())
}

pub fn validate_currency(currency: &str) -> Result<(), String> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err("Currency must be a three-letter ISO code".to_string())
    }
}

pub fn validate_product_key(key: &str) -> Result<(), String> {
    if PRODUCT_KEY_REGEX.is_match(key) {
        Ok(())
    } else {
        Err("Product key must be lowercase letters, digits and underscores".to_string())
    }
}
