//! Miscellaneous convenience methods

use crate::context::Context;
use serenity::all::{GuildId, UserId};

#[serenity::async_trait]
pub trait UserHelper {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String;
}

#[serenity::async_trait]
impl UserHelper for serenity::all::User {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String {
        let nick_in_guild = match guild_id {
            Some(guild_id) => self.nick_in(ctx.cache_http, guild_id).await,
            None => None,
        };

        // May not be in a guild, e.g. DM.  Fall back to display name.
        match nick_in_guild {
            Some(nick_in_guild) => nick_in_guild,
            None => self.display_name().to_owned(),
        }
    }
}

#[serenity::async_trait]
pub trait MessageHelper {
    async fn is_from_owner(&self, ctx: &Context) -> bool;
    fn first_mention(&self) -> Option<UserId>;
}

#[serenity::async_trait]
impl MessageHelper for serenity::all::Message {
    async fn is_from_owner(&self, ctx: &Context) -> bool {
        let owners = &ctx.cfg.read().await.general.bot_owners;
        let author_global_name = &self.author.name;

        owners.contains(author_global_name)
    }

    /// First user `@`-mentioned in the message, ignoring the bot itself
    fn first_mention(&self) -> Option<UserId> {
        self.mentions
            .iter()
            .find(|user| !user.bot)
            .map(|user| user.id)
    }
}
