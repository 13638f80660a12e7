use crate::{event::*, helper::MessageHelper, log_internal, plugin::*};
use anyhow::Result;

/// Edit mafia settings that persist across restarts
pub struct MafiaSettings;

#[serenity::async_trait]
impl Plugin for MafiaSettings {
    fn name(&self) -> &'static str {
        "mafiaset"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} lobbytimeout <seconds> - set time before a game starts (bot owner only)",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let is_owner = msg.is_from_owner(ctx).await;
        let response = match args.as_slice() {
            ["lobbytimeout", _] if !is_owner => {
                "Only bot owners can change mafia settings.".to_owned()
            }
            ["lobbytimeout", seconds] => match seconds.parse::<u64>() {
                Ok(seconds) => {
                    let mut pstate = ctx.pstate.write().await;
                    pstate.mafia.lobby_duration_seconds = Some(seconds);
                    pstate.save().await?;
                    log_internal!("Mafia lobby duration set to {} seconds", seconds);
                    "Lobby period updated.".to_owned()
                }
                Err(_) => format!("`{}` is not a number of seconds.", seconds),
            },
            _ => {
                let prefix = &ctx.cfg.read().await.general.command_prefix;
                format!(
                    "Usage: {}{} lobbytimeout <seconds>",
                    prefix,
                    self.name()
                )
            }
        };

        msg.reply(ctx.cache_http, response).await?;
        Ok(EventHandled::Yes)
    }
}
