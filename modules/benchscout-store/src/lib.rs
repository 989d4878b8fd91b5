pub mod cache;
pub mod fallback;
pub mod grid;
pub mod history;
pub mod manager;
pub mod retry;

pub use cache::CacheClient;
pub use fallback::FallbackStore;
pub use grid::{GridError, GridSaveOutcome, GridStore};
pub use history::HistoryStore;
pub use manager::{GridBackend, SaveReport, StorageManager};
pub use retry::{retry_async, RetryPolicy};
