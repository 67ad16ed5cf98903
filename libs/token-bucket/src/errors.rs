#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    #[error("cancelled while waiting for a token")]
    Cancelled,
    #[error("refill rate must be finite and greater than zero, got {0}")]
    InvalidRate(f64),
    #[error("burst capacity must be at least 1")]
    InvalidBurst,
}

pub type Result<T> = std::result::Result<T, Error>;
