use validator::ValidateEmail;

/// Validate email format using the validator crate.
pub fn is_valid_email(email: &str) -> bool {
    email.validate_email()
}

/// Emails are matched case-insensitively everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Referral codes are shared uppercase; users paste them in any case.
pub fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_uppercase())
    }
}
