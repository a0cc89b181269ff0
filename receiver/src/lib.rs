pub mod routes;
pub mod store;

pub use routes::{router, AppState};
pub use store::{ImageStore, StoreError};
