//! Telegram front end for mediavault.
//!
//! Gates delivery of archived media behind a channel-membership check, lets
//! administrators catalog new items, and bulk-replicates id ranges between
//! channels. All Telegram API calls go through the [`transport::Transport`]
//! capability trait; only the polling loop and the trait implementation touch
//! teloxide directly.

pub mod access;
pub mod backup;
pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod payload;
pub mod retrieval;
pub mod state;
pub mod transport;

pub use {
    config::{BotConfig, IngestPolicy},
    error::{Error, Result},
    state::BotState,
    transport::Transport,
};
