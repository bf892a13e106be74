use std::fmt;

use ethers::types::{H256, U64};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Coarse classification of a [`HarnessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Dispatch,
    Connection,
    Authentication,
    Deployment,
    Rpc,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration error",
            Self::Dispatch => "dispatch error",
            Self::Connection => "connection error",
            Self::Authentication => "authentication error",
            Self::Deployment => "deployment error",
            Self::Rpc => "rpc error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("unknown network profile: {0}")]
    UnknownProfile(String),

    #[error("no default network profile configured")]
    NoDefaultProfile,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("chain id mismatch: profile expects {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("command already registered: {0}")]
    DuplicateCommand(String),

    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(String),

    #[error("unexpected parameter: {0}")]
    UnexpectedParameter(String),

    #[error("invalid value for parameter {name}: {value}")]
    InvalidParameterValue { name: String, value: String },

    #[error("cannot reach {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("bad account credential #{index}: {reason}")]
    Authentication { index: usize, reason: String },

    #[error("no account #{0} on the active network")]
    NoSuchAccount(usize),

    #[error("unknown contract interface: {0}")]
    UnknownInterface(String),

    #[error("invalid artifact {name}: {reason}")]
    InvalidArtifact { name: String, reason: String },

    #[error("interface {0} has no bytecode and can only be attached")]
    MissingBytecode(String),

    #[error("deployment transaction {tx_hash:?} reverted in block {block:?}")]
    DeploymentReverted { tx_hash: H256, block: Option<U64> },

    #[error("deployment transaction {tx_hash:?} not confirmed within {secs}s")]
    DeploymentTimeout { tx_hash: H256, secs: u64 },

    #[error("rpc call failed: {0}")]
    Rpc(String),

    #[error("contract call failed: {0}")]
    Contract(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownProfile(_)
            | Self::NoDefaultProfile
            | Self::InvalidConfig(_)
            | Self::MissingEnvVar(_)
            | Self::ChainIdMismatch { .. }
            | Self::UnknownInterface(_)
            | Self::InvalidArtifact { .. }
            | Self::Io(_) => ErrorKind::Configuration,
            Self::UnknownCommand(_)
            | Self::DuplicateCommand(_)
            | Self::MissingRequiredParameter(_)
            | Self::UnexpectedParameter(_)
            | Self::InvalidParameterValue { .. } => ErrorKind::Dispatch,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Authentication { .. } | Self::NoSuchAccount(_) => ErrorKind::Authentication,
            Self::MissingBytecode(_)
            | Self::DeploymentReverted { .. }
            | Self::DeploymentTimeout { .. } => ErrorKind::Deployment,
            Self::Rpc(_) | Self::Contract(_) => ErrorKind::Rpc,
        }
    }

    pub(crate) fn rpc(err: impl fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub(crate) fn invalid_value(name: &str, value: &str) -> Self {
        Self::InvalidParameterValue {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}
