pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod notify;
pub mod profiles;
pub mod referrals;
pub mod rewards;
pub mod routes;
pub mod state;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;
