use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimumError {
    #[error("Token or username/password have not been provided")]
    MissingCredentials,

    #[error("No token available. Call get_token first")]
    NoToken,

    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected API response: {message}")]
    UnexpectedResponse { message: String },

    #[error("Model error: {message}")]
    ModelError { message: String },

    #[error("{message}")]
    PreconditionError { message: String },

    #[error("Could not calculate optimal frontier; constraints likely make the problem infeasible.")]
    InfeasibleFrontier,

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Network,
    Api,
    Data,
    Usage,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl OptimumError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionError {
            message: message.into(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCredentials | Self::NoToken => ErrorCategory::Authentication,
            Self::Http(_) => ErrorCategory::Network,
            Self::Api { .. } | Self::UnexpectedResponse { .. } | Self::InfeasibleFrontier => {
                ErrorCategory::Api
            }
            Self::Csv(_) | Self::Serialization(_) | Self::ModelError { .. } => ErrorCategory::Data,
            Self::PreconditionError { .. } | Self::ValidationError { .. } => ErrorCategory::Usage,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InfeasibleFrontier => ErrorSeverity::Low,
            Self::Http(_) | Self::Api { .. } | Self::UnexpectedResponse { .. } => {
                ErrorSeverity::Medium
            }
            Self::Io(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Authentication => {
                "Provide a token or a username and password (OPTIMUM_TOKEN, OPTIMUM_USERNAME, OPTIMUM_PASSWORD)"
            }
            ErrorCategory::Network => "Check the base URL and your network connection, then retry",
            ErrorCategory::Api => "Review the request parameters; relax constraints if the problem is infeasible",
            ErrorCategory::Data => "Check the portfolio file and the model data returned by the API",
            ErrorCategory::Usage => "Retrieve prices and models before computing frontiers or recommendations",
            ErrorCategory::Configuration => "Fix the configuration file or command line arguments",
            ErrorCategory::System => "Check file paths and permissions",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Api { detail, .. } => format!("The optimization API rejected the request: {}", detail),
            Self::Http(e) if e.is_timeout() => "The optimization API did not respond in time".to_string(),
            Self::Http(e) => match e.status() {
                Some(status) => format!("The optimization API returned HTTP {}", status),
                None => "Could not reach the optimization API".to_string(),
            },
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimumError>;
