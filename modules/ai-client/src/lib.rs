pub mod claude;
pub mod schema;
pub mod util;

pub use claude::{Claude, Exchange};
pub use schema::StructuredOutput;
