use std::sync::Arc;

use poise::CreateReply;

use crate::frontend::FaucetFrontend;

pub struct Data {
    pub frontend: Arc<FaucetFrontend>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub fn requester_id(user_id: u64) -> String {
    format!("discord:{}", user_id)
}

/// Request coins to your EVM address.
///
/// The interaction is deferred ephemerally, so usage hints, denials and
/// failures are only seen by the requester. Discord keeps the visibility of
/// a deferred response, so an admission is acknowledged privately and then
/// announced in a separate public followup.
#[poise::command(slash_command)]
pub async fn faucet(ctx: Context<'_>, #[description = "The EVM address to send coin"] address: String) -> Result<(), Error> {
    // Submission can take longer than Discord's three second reply window.
    ctx.defer_ephemeral().await?;

    let requester = requester_id(ctx.author().id.get());
    let frontend = &ctx.data().frontend;
    let reply = frontend.handle(&requester, Some(&address)).await;

    if reply.ephemeral {
        ctx.send(CreateReply::default().content(reply.text).ephemeral(true)).await?;
    } else {
        ctx.send(CreateReply::default().content(frontend.admitted_notice()).ephemeral(true)).await?;
        ctx.send(CreateReply::default().content(reply.text).ephemeral(false)).await?;
    }
    Ok(())
}

pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!("Command /{} failed: {}", ctx.command().name, error);
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}
