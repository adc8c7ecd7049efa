//! Retry handling for the token payout engine
//!
//! - `ExponentialBackoff`: delay schedule doubling per attempt with a cap
//! - `RetryPolicy`: bounded executor that retries only errors classified as
//!   `Classification::Retryable`

pub mod backoff;
pub mod policy;

pub use backoff::ExponentialBackoff;
pub use policy::{Classification, Classify, RetryError, RetryPolicy};
