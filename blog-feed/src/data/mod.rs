pub mod change_feed;
pub mod identity;
pub mod media_store;
pub mod membership_store;
pub mod memory;
pub mod post_store;
pub mod query;
pub mod taxonomy_store;
