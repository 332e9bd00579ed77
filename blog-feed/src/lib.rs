//! Ядро блога: живые ленты ([`feed`]) и сценарии автора ([`application`])
//! поверх трейтов хранилища из [`data`].

pub mod application;
pub mod data;
pub mod domain;
pub mod feed;
pub mod infrastructure;

pub use domain::error::DomainError;
