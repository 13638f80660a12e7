//! Serenity hands us events through per-kind callbacks.  Plugins instead see a single `Event`
//! enum and take turns trying to handle it.

use crate::{context::Context, log_internal};
use serenity::all::{Message, Ready};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
}

pub enum EventHandled {
    Yes,
    No,
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => log_internal!("Error in plugin {}: {}", plugin.name(), err),
            }
        }
    }

    /// Check if a message is the bot command `cmd`, e.g. `;mafia join` for `mafia` with the
    /// default prefix.  Returns the message and the words following the command.
    pub async fn is_bot_cmd<'a>(
        &'a self,
        ctx: &Context<'_>,
        cmd: &str,
    ) -> Option<(&'a Message, Vec<&'a str>)> {
        let Event::Message(msg) = self else {
            return None;
        };

        let mut words = msg.content.split_ascii_whitespace();
        let first = words.next()?;

        let cfg = ctx.cfg.read().await;
        let name = first.strip_prefix(cfg.general.command_prefix.as_str())?;
        if name != cmd {
            return None;
        }

        Some((msg, words.collect()))
    }
}
