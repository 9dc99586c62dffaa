use std::result::Result as StdResult;

pub use crate::net::errors::NetworkError;

pub type Result<T> = StdResult<T, NetworkError>;
