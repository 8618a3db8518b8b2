use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Provider error: provider={provider}, message={message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Validation { .. } => false,
            PaymentError::Provider { retryable, .. } => *retryable,
            PaymentError::Persistence { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Validation { .. } => 400,
            PaymentError::Provider { .. } => 502,
            PaymentError::Persistence { .. } => 500,
        }
    }

    /// Message safe to surface to the shopper.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::Provider { message, .. } => message.clone(),
            PaymentError::Persistence { .. } => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }
}

impl From<crate::database::error::DatabaseError> for PaymentError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        PaymentError::Persistence {
            message: err.to_string(),
        }
    }
}
