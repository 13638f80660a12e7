use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    ctx.cache.current_user().color(),
                );
            }
            Event::Message(msg) => {
                let guild = msg.guild_id.color(ctx.http).await;
                let channel = msg.channel_id.color(ctx.http).await;
                log_event!(
                    "{}{}{}{}{}{} {}",
                    guild,
                    Glue {}.color(),
                    channel,
                    Glue {}.color(),
                    msg.author.color(),
                    Glue {}.color(),
                    msg.content,
                );
            }
        }

        Ok(EventHandled::No)
    }
}
