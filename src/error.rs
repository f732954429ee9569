use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Usage(String),

    #[error("profile '{0}' does not exist")]
    ProfileNotFound(String),

    #[error("'{0}' is a reserved name and cannot be used for a profile")]
    ReservedProfileName(String),

    #[error("{0}")]
    Redis(#[from] redis::RedisError),

    #[error("{0}")]
    Command(String),

    #[error("unexpected reply: {0}")]
    Protocol(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn usage(msg: impl Into<String>) -> Self {
        ClientError::Usage(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::Protocol(msg.into())
    }

    /// True for errors raised before anything was sent to the store.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ClientError::Usage(_)
                | ClientError::ProfileNotFound(_)
                | ClientError::ReservedProfileName(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
