use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid relation kind: {0}")]
    InvalidRelationKind(String),

    #[error("Self-referential relationship not allowed")]
    SelfReference,

    #[error("Document source error: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, Error>;
