pub mod autosave;
pub mod markdown;
pub mod media_service;
pub mod memberships;
pub mod publishing_service;
pub mod reader_service;
pub mod session;
pub mod taxonomy_service;
