use thiserror::Error;

use crate::outbox::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("orchestration error: {0}")]
    Orchestration(String),
}
