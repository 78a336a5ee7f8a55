use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid nullifier hash: {0}")]
    InvalidNullifier(String),
}

pub type Result<T> = std::result::Result<T, Error>;
