use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadIPFormatting(String),
    BadPort(String),
    EmptyValue(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::BadPort(e) => write!(f, "Port error: {}", e),
            ConfigError::EmptyValue(e) => write!(f, "Empty value: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlError(err.to_string())
    }
}

/// Failures of a single commit.
///
/// None of these stop the collector: the session that produced the record
/// logs the error and keeps reading.
#[derive(Debug)]
pub enum StorageError {
    /// The log directory could not be created.
    DirectoryFailed(PathBuf, std::io::Error),
    /// A new-file commit could not be written. Never retried.
    WriteFailed(PathBuf, std::io::Error),
    /// Append retries were exhausted and the backup file could not be written either.
    BackupFailed(PathBuf, std::io::Error),
    /// The record could not be encoded as a CSV row.
    EncodeFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DirectoryFailed(p, e) => {
                write!(f, "Could not create log directory {}: {}", p.display(), e)
            }
            StorageError::WriteFailed(p, e) => {
                write!(f, "Could not write {}: {}", p.display(), e)
            }
            StorageError::BackupFailed(p, e) => {
                write!(f, "Could not write backup file {}: {}", p.display(), e)
            }
            StorageError::EncodeFailed(e) => write!(f, "Could not encode record: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<csv::Error> for StorageError {
    fn from(err: csv::Error) -> Self {
        StorageError::EncodeFailed(err.to_string())
    }
}

#[derive(Debug)]
pub enum NetworkError {
    BindFail(std::io::Error),
    AcceptFailed(std::io::Error),
    ConnectFailed(std::io::Error),
    ConnectTimeout(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindFail(e) => write!(f, "Bind failed: {}", e),
            NetworkError::AcceptFailed(e) => write!(f, "Accept failed: {}", e),
            NetworkError::ConnectFailed(e) => write!(f, "Connection failed: {}", e),
            NetworkError::ConnectTimeout(target) => write!(f, "Connection to {} timed out", target),
        }
    }
}

impl std::error::Error for NetworkError {}

#[derive(Debug)]
pub enum SessionError {
    ReadFailed(std::io::Error),
    StorageError(StorageError),
    CommitAborted(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ReadFailed(e) => write!(f, "Socket read failed: {}", e),
            SessionError::StorageError(e) => write!(f, "Storage error: {}", e),
            SessionError::CommitAborted(e) => write!(f, "Commit task aborted: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    NetworkError(NetworkError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::NetworkError(e) => write!(f, "Network error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<NetworkError> for ControllerError {
    fn from(err: NetworkError) -> Self {
        ControllerError::NetworkError(err)
    }
}

#[derive(Debug)]
pub enum SimulatorError {
    FileNotFound(PathBuf),
    IoError(std::io::Error),
    ConnectionRefused(String),
    NothingToSend,
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::FileNotFound(p) => write!(f, "File '{}' not found", p.display()),
            SimulatorError::IoError(e) => write!(f, "IO error: {}", e),
            SimulatorError::ConnectionRefused(target) => write!(
                f,
                "Connection refused. Is the collector running on {}?",
                target
            ),
            SimulatorError::NothingToSend => {
                write!(f, "You must specify either a file or a part number")
            }
        }
    }
}

impl std::error::Error for SimulatorError {}

impl From<std::io::Error> for SimulatorError {
    fn from(err: std::io::Error) -> Self {
        SimulatorError::IoError(err)
    }
}
