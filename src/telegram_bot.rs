use std::error::Error;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::config::TelegramSettings;
use crate::frontend::FaucetFrontend;

mod commands;

pub use commands::Command;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

pub struct TelegramBot {
    bot: Bot,
    frontend: Arc<FaucetFrontend>,
}

impl TelegramBot {
    pub fn new(settings: &TelegramSettings, frontend: Arc<FaucetFrontend>) -> Self {
        TelegramBot {
            bot: Bot::new(&settings.token),
            frontend,
        }
    }

    pub async fn run(&self) {
        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            tracing::warn!("Could not publish Telegram command list: {}", e);
        }

        tracing::info!("Running telegram bot");
        let handler = Update::filter_message().filter_command::<Command>().endpoint(commands::answer);

        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![Arc::clone(&self.frontend)])
            .default_handler(|_update| async {})
            .error_handler(LoggingErrorHandler::with_custom_text("Error while handling a Telegram update"))
            .build()
            .dispatch()
            .await;
    }
}
