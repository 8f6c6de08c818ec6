//! Input shape rules for account fields.
//!
//! Usernames are 6–20 alphanumeric characters and must contain at least one
//! digit and one lowercase letter. Passwords are 8+ characters with upper,
//! lower, digit, and special classes all present.

use crate::error::EngineError;

pub fn username(value: &str) -> Result<(), EngineError> {
    let len = value.chars().count();
    if !(6..=20).contains(&len) {
        return Err(EngineError::validation(
            "username must be 6-20 characters",
        ));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EngineError::validation("username must be alphanumeric"));
    }
    if !value.chars().any(|c| c.is_ascii_digit())
        || !value.chars().any(|c| c.is_ascii_lowercase())
    {
        return Err(EngineError::validation(
            "username must contain a digit and a lowercase letter",
        ));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), EngineError> {
    let Some((local, domain)) = value.split_once('@') else {
        return Err(EngineError::validation("invalid email address"));
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.is_empty();
    if local.is_empty() || !domain_ok || value.chars().any(char::is_whitespace) {
        return Err(EngineError::validation("invalid email address"));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), EngineError> {
    if value.chars().count() < 8 {
        return Err(EngineError::validation(
            "password must be at least 8 characters",
        ));
    }
    let upper = value.chars().any(|c| c.is_ascii_uppercase());
    let lower = value.chars().any(|c| c.is_ascii_lowercase());
    let digit = value.chars().any(|c| c.is_ascii_digit());
    let special = value.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(upper && lower && digit && special) {
        return Err(EngineError::validation(
            "password needs upper, lower, digit, and special characters",
        ));
    }
    Ok(())
}

pub fn security_question(value: &str) -> Result<(), EngineError> {
    let len = value.chars().count();
    if !(3..=100).contains(&len) {
        return Err(EngineError::validation(
            "security question must be 3-100 characters",
        ));
    }
    Ok(())
}

pub fn answer(value: &str) -> Result<(), EngineError> {
    let len = value.chars().count();
    if !(2..=100).contains(&len) {
        return Err(EngineError::validation(
            "answer must be 2-100 characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(username("alice42").is_ok());
        assert!(username("abc1").is_err()); // too short
        assert!(username("alllowercase").is_err()); // no digit
        assert!(username("ALLUPPER99").is_err()); // no lowercase
        assert!(username("has space1").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(email("a@b.com").is_ok());
        assert!(email("nodomain@").is_err());
        assert!(email("@nolocal.com").is_err());
        assert!(email("no-at-sign").is_err());
        assert!(email("dot@tld.").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(password("Str0ng!pass").is_ok());
        assert!(password("Sh0rt!a").is_err());
        assert!(password("alllower0!").is_err());
        assert!(password("NoDigits!!").is_err());
        assert!(password("NoSpecial00").is_err());
    }
}
