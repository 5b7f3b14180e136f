use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown tier: {0}")]
    InvalidTier(String),

    #[error("Referral code is invalid or already used")]
    InvalidReferral,

    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No purchase found for this email")]
    NotPurchaser,

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),

    /// A server-side failure reported to clients with a fixed message.
    #[error("{message}: {source}")]
    Masked {
        message: &'static str,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Errors caused by the request itself; their details are safe to return.
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::InvalidTier(_)
            | AppError::InvalidReferral
            | AppError::SignatureInvalid(_)
            | AppError::InvalidInput(_)
            | AppError::NotPurchaser
            | AppError::NotFound => true,
            AppError::Masked { source, .. } => source.is_client_error(),
            AppError::Database(_) | AppError::UpstreamUnavailable(_) | AppError::Internal(_) => {
                false
            }
        }
    }

    /// Replaces the client-facing message of server errors with `message`.
    pub fn with_safe_message(self, message: &'static str) -> AppError {
        if self.is_client_error() {
            self
        } else {
            AppError::Masked {
                message,
                source: Box::new(self),
            }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidTier(_) => ErrorCode::InvalidTier,
            AppError::InvalidReferral => ErrorCode::InvalidOrUsedCode,
            AppError::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            AppError::UpstreamUnavailable(_) => ErrorCode::UpstreamUnavailable,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::NotPurchaser => ErrorCode::NotAPurchaser,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Masked { source, .. } => source.code(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    InvalidTier,
    InvalidOrUsedCode,
    SignatureInvalid,
    UpstreamUnavailable,
    InvalidInput,
    NotAPurchaser,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::InvalidTier => "invalid_tier",
            ErrorCode::InvalidOrUsedCode => "invalid_or_used_code",
            ErrorCode::SignatureInvalid => "signature_invalid",
            ErrorCode::UpstreamUnavailable => "upstream_unavailable",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NotAPurchaser => "not_a_purchaser",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_message_wraps_only_server_errors() {
        let masked = AppError::Database("connection reset".into()).with_safe_message("could not start checkout");
        assert!(matches!(masked, AppError::Masked { message: "could not start checkout", .. }));
        assert_eq!(masked.code(), ErrorCode::DatabaseError);

        let passthrough = AppError::InvalidTier("gold".into()).with_safe_message("could not start checkout");
        assert!(matches!(passthrough, AppError::InvalidTier(_)));
    }
}
