pub mod handlers;
pub mod signature;
pub mod webhook;
