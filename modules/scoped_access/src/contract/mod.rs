pub mod client;
pub mod error;
pub mod model;

pub use client::ScopedCollectionApi;
pub use error::AccessError;
pub use model::{Entity, Record, ResultSet, Role, SubscriptionError, UserProfile};
