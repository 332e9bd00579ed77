pub mod access_token;
pub mod logging;
pub mod settings;
