pub mod hashing;
pub mod retry;

pub use hashing::content_hash;
pub use retry::retry_linear;
