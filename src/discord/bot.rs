use std::sync::Arc;

use serenity::all::{Context, GatewayIntents, GuildId, RatelimitInfo, Ready};
use serenity::async_trait;
use serenity::prelude::*;

use crate::config::DiscordSettings;
use crate::discord::commands::{faucet, on_error, Data};
use crate::frontend::FaucetFrontend;

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!("Discord bot connected as {}", ready.user.name);
    }

    async fn ratelimit(&self, data: RatelimitInfo) {
        tracing::warn!("Rate limited: {:?}", data);
    }
}

pub struct DiscordBot {
    client: Client,
}

impl DiscordBot {
    pub async fn new(settings: &DiscordSettings, frontend: Arc<FaucetFrontend>) -> Result<Self, SerenityError> {
        let guild_id = settings.guild_id.map(GuildId::new);

        let framework = poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![faucet()],
                on_error: |error| Box::pin(on_error(error)),
                ..Default::default()
            })
            .setup(move |ctx, _ready, framework| {
                Box::pin(async move {
                    match guild_id {
                        Some(guild_id) => poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id).await?,
                        None => poise::builtins::register_globally(ctx, &framework.options().commands).await?,
                    }
                    tracing::info!("Slash commands synced");
                    Ok(Data { frontend })
                })
            })
            .build();

        // Slash commands need no privileged intents.
        let client = Client::builder(&settings.token, GatewayIntents::non_privileged()).event_handler(Handler).framework(framework).await?;

        Ok(DiscordBot { client })
    }

    pub async fn run(&mut self) -> Result<(), SerenityError> {
        tracing::info!("Running discord bot");
        self.client.start().await
    }
}
