pub mod bot;
mod commands;

pub use bot::DiscordBot;
