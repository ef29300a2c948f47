pub mod handlers;
pub mod referral_code;
pub mod store;

pub use store::{EarlyAdopterGrant, PgProfileStore, ProfileStore, StoreError, SubscriptionUpdate};
