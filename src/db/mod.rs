pub mod models;
pub mod queries;
pub mod store;

pub use queries::{DateWindow, GameDetail, SearchKind, SearchResults};
pub use store::PropStore;
