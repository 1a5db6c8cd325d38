//! Input normalization for the Dispatch Service (spec §4.J step 1).

use crate::error::DispatchError;

/// Normalize a phone number to E.164: keep a leading `+`, strip everything
/// else that isn't a digit. Rejects numbers with too few digits to be a
/// real E.164 subscriber number.
pub fn normalize_phone(raw: &str) -> Result<String, DispatchError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 8 || digits.len() > 15 {
        return Err(DispatchError::InvalidPhone(raw.to_owned()));
    }
    Ok(format!("+{digits}"))
}

/// Validate the OTP code shape: 4-8 digits (spec §6).
pub fn validate_code(code: &str) -> Result<(), DispatchError> {
    if code.len() < 4 || code.len() > 8 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(DispatchError::InvalidCode(code.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").unwrap(), "+15551234567");
    }

    #[test]
    fn normalize_rejects_too_short() {
        assert!(normalize_phone("123").is_err());
    }

    #[test]
    fn validate_code_accepts_four_to_eight_digits() {
        assert!(validate_code("1234").is_ok());
        assert!(validate_code("12345678").is_ok());
        assert!(validate_code("123").is_err());
        assert!(validate_code("123456789").is_err());
        assert!(validate_code("12a4").is_err());
    }
}
