pub mod error;
pub mod post;
pub mod slug;
pub mod taxonomy;
pub mod user;

pub(crate) mod serde_helpers;
