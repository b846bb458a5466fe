use std::fmt;

#[derive(Debug)]
pub enum GroceriesSDKError {
    KvStore(String),
    Serialization(String),
    IO(String),
    InvalidArgument(String),
    NotFound(String),
    Transport(String),
    Api { status: u16, message: String },
    Config(String),
    NotInitialized(String),
    ShuttingDown(String),
    Runtime(String),
    Other(String),
}

impl fmt::Display for GroceriesSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroceriesSDKError::KvStore(e) => write!(f, "KV store error: {}", e),
            GroceriesSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            GroceriesSDKError::IO(e) => write!(f, "IO error: {}", e),
            GroceriesSDKError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            GroceriesSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            GroceriesSDKError::Transport(e) => write!(f, "Transport error: {}", e),
            GroceriesSDKError::Api { status, message } => {
                write!(f, "API error [{}]: {}", status, message)
            }
            GroceriesSDKError::Config(e) => write!(f, "Config error: {}", e),
            GroceriesSDKError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            GroceriesSDKError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
            GroceriesSDKError::Runtime(e) => write!(f, "Runtime error: {}", e),
            GroceriesSDKError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for GroceriesSDKError {}

impl From<serde_json::Error> for GroceriesSDKError {
    fn from(error: serde_json::Error) -> Self {
        GroceriesSDKError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for GroceriesSDKError {
    fn from(error: std::io::Error) -> Self {
        GroceriesSDKError::IO(error.to_string())
    }
}

impl From<sled::Error> for GroceriesSDKError {
    fn from(error: sled::Error) -> Self {
        GroceriesSDKError::KvStore(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GroceriesSDKError>;
