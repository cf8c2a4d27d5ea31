pub mod api;
pub mod auth;
pub mod domain;
pub mod invoice;
pub mod token;
pub mod tz;
