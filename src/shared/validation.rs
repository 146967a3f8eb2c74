//! Validation Utilities

use validator::ValidationErrors;

use super::error::SignalingError;

/// Convert validation errors to a signaling error, keeping the first field message.
pub fn validation_error(errors: ValidationErrors) -> SignalingError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let detail = e.message.clone().map(|m| m.to_string()).unwrap_or_default();
                format!("{}: {}", field, detail)
            })
        })
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    SignalingError::Validation(message)
}
