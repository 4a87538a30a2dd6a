use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Memory allocation error")]
    Memory,

    #[error("Invalid allocation size: {0}")]
    InvalidSize(usize),

    #[error("Unsupported alignment {requested} (maximum {supported})")]
    Alignment { requested: usize, supported: usize },

    #[error("Block is not owned by any tracked slab")]
    UnknownBlock,

    #[error("Block at slab offset {offset} is not on a slot boundary")]
    MisalignedBlock { offset: usize },

    #[error("Double free of slab slot {slot}")]
    DoubleFree { slot: usize },

    #[error("Memory pool is not initialized")]
    NotInitialized,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Memory => -2,
            Error::InvalidSize(_) => -3,
            Error::Alignment { .. } => -4,
            Error::UnknownBlock => -5,
            Error::MisalignedBlock { .. } => -6,
            Error::DoubleFree { .. } => -7,
            Error::NotInitialized => -8,
            Error::InvariantViolation(_) => -9,
            Error::Config(_) => -10,
            Error::Serialization(_) => -11,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
