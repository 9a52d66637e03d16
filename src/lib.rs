pub mod api;
pub mod config;
pub mod elo;
pub mod enrich;
pub mod error;
pub mod fallback;
pub mod http_cache;
pub mod http_client;
pub mod odds;
pub mod provider;
pub mod refresh;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod store;
pub mod win_prob;
