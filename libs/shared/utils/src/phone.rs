//! Phone number normalization and masking.

use shared_models::AppError;

/// Normalizes an Australian phone number to its digits-only, country-coded
/// form: strips everything but digits, then replaces a leading national
/// trunk `0` with the `61` country code. Numbers already carrying `61` (or
/// any other country code) are left as-is once non-digits are stripped.
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 8 {
        return Err(AppError::InvalidPhoneNumber(raw.to_string()));
    }

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("61{rest}")
    } else {
        digits
    };

    if normalized.len() < 9 || normalized.len() > 15 {
        return Err(AppError::InvalidPhoneNumber(raw.to_string()));
    }

    Ok(normalized)
}

/// Masks a normalized phone number for logging: first three and last two
/// digits stay visible, everything between is replaced with `*`.
pub fn mask_phone(normalized: &str) -> String {
    let len = normalized.chars().count();
    if len <= 5 {
        return "*".repeat(len);
    }

    let chars: Vec<char> = normalized.chars().collect();
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[len - 2..].iter().collect();
    let masked_middle = "*".repeat(len - 5);
    format!("{head}{masked_middle}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting_and_replaces_leading_zero() {
        assert_eq!(normalize_phone("0412 345 678").unwrap(), "61412345678");
        assert_eq!(normalize_phone("(02) 9876-5432").unwrap(), "61298765432");
    }

    #[test]
    fn leaves_already_country_coded_numbers_alone() {
        assert_eq!(normalize_phone("+61412345678").unwrap(), "61412345678");
    }

    #[test]
    fn rejects_too_short_input() {
        assert!(normalize_phone("123").is_err());
    }

    #[test]
    fn masks_keeping_first_three_and_last_two() {
        assert_eq!(mask_phone("61412345678"), "614******78");
    }

    #[test]
    fn masks_short_numbers_entirely() {
        assert_eq!(mask_phone("1234"), "****");
    }
}
