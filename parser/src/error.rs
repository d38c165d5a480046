use thiserror::Error;

/// Fatal classification failures. Anything past these is decoded lazily and
/// reported as an absent value, never as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeError {
    #[error("not a PE image: {0}")]
    NotPe(&'static str),

    #[error("corrupted PE image: {len} bytes, at least {required} required")]
    Corrupted { len: u64, required: u64 },
}

pub type PeResult<T> = Result<T, PeError>;
