//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of the join code handed out with every session.
pub const JOIN_CODE_LEN: usize = 6;

/// Validates that a participant name is not blank.
pub fn validate_participant(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("participant_blank");
        err.message = Some("Participant name must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a join code is exactly six uppercase alphanumeric characters.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("K7QX2M") // Ok
/// validate_join_code("k7qx2m") // Err - lowercase
/// validate_join_code("K7QX2")  // Err - too short
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LEN {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {JOIN_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}
