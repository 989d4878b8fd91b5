pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod urlnorm;

pub use config::{Config, SourcesConfig};
pub use error::ScoutError;
pub use types::*;
pub use urlnorm::{arxiv_id_from_url, canonicalize_url};
