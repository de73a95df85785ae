use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::frontend::FaucetFrontend;
use crate::telegram_bot::HandlerResult;

/// These commands are supported:
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "display this text.")]
    Help,
    #[command(description = "request coin to your EVM address: /faucet <address>")]
    Faucet(String),
}

pub fn requester_id(user_id: u64) -> String {
    format!("telegram:{}", user_id)
}

pub async fn answer(bot: Bot, msg: Message, cmd: Command, frontend: Arc<FaucetFrontend>) -> HandlerResult {
    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Faucet(address) => {
            // Channel posts carry no sender to rate-limit on.
            let Some(user) = msg.from() else {
                return Ok(());
            };

            let reply = frontend.handle(&requester_id(user.id.0), Some(&address)).await;
            bot.send_message(msg.chat.id, reply.text).reply_to_message_id(msg.id).await?;
        }
    }
    Ok(())
}
