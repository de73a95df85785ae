pub mod config;
pub mod database;
pub mod discord;
pub mod faucet;
pub mod frontend;
pub mod ledger;
pub mod telegram_bot;
pub mod utils;
