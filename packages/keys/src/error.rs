#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Encryption error: {0}")]
    Encryption(String),
    #[error("Decryption error: {0}")]
    Decryption(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("unseal-key-{id} not available, available id range 0 to {}", .shares - 1)]
    IndexOutOfRange { id: i64, shares: i64 },
    #[error("Unsupported unsealing mode: {0}")]
    UnsupportedMode(String),
    #[error("Root token generation incomplete: submitted {submitted} of {required} required unseal keys")]
    GenerationIncomplete { submitted: usize, required: usize },
    #[error("Key name cannot be determined: {0}")]
    NameUndeterminable(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Vault API error ({status}): {}", .errors.join(", "))]
    VaultApi { status: u16, errors: Vec<String> },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Absence of a key, as opposed to a failure to reach or decrypt it
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }

    pub fn backend(provider: &str, err: impl std::fmt::Display) -> Self {
        VaultError::BackendUnavailable(format!("{provider}: {err}"))
    }

    /// Map an HTTP status returned by a provider REST API into the taxonomy
    pub(crate) fn from_status(provider: &str, what: &str, status: u16, body: &str) -> Self {
        match status {
            404 => VaultError::NotFound(what.to_string()),
            _ => VaultError::BackendUnavailable(format!(
                "{provider}: request for {what} failed with status {status}: {body}"
            )),
        }
    }
}

impl From<kube::Error> for VaultError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => VaultError::NotFound(resp.message),
            other => VaultError::backend("kubernetes", other),
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
