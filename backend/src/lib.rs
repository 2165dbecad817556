pub mod ads;
pub mod auth;
pub mod buyers;
pub mod config;
pub mod error;
pub mod filter;
pub mod forms;
pub mod geocode;
pub mod i18n;
pub mod matching;
pub mod models;
pub mod notify;
pub mod registry;
pub mod routes;
pub mod saved_search;
pub mod search;
pub mod slug;
pub mod state;
pub mod store;
pub mod views;
