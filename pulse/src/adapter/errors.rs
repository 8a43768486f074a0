use thiserror::Error;

use crate::feeds::AdapterId;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("circuit open for {0} and no cached body")]
    CircuitOpen(AdapterId),

    #[error("invalid request header: {0}")]
    InvalidHeader(String),
}
