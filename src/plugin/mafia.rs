use crate::{
    event::*,
    helper::{MessageHelper, UserHelper},
    log_game,
    logging::{AsyncPrintColor, PrintColor},
    mafia::{
        open_lobby, run_game, GameHost, GameSlot, MafiaError, NightAction, Outcome, Session,
    },
    plugin::*,
};
use anyhow::Result;
use serenity::all::{ChannelId, CreateMessage, Message, UserId};
use std::time::Duration;
use uuid::Uuid;

/// Hosts a game of mafia in the channel it was created in
pub struct Mafia;

/// Game output goes to the channel the game was created in, roles and results go by DM.
struct DiscordHost<'a> {
    ctx: &'a Context<'a>,
    channel_id: ChannelId,
}

#[serenity::async_trait]
impl GameHost<UserId> for DiscordHost<'_> {
    async fn broadcast(&self, text: &str) -> Result<()> {
        self.channel_id.say(self.ctx.http, text).await?;
        Ok(())
    }

    async fn whisper(&self, to: &UserId, text: &str) -> Result<()> {
        to.direct_message(self.ctx.cache_http, CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[serenity::async_trait]
impl Plugin for Mafia {
    fn name(&self) -> &'static str {
        "mafia"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        let cmd = format!("{}{}", prefix, self.name());
        Some(format!(
            "{cmd} create - open a game lobby in this channel\n\
             {cmd} join - join the open lobby\n\
             {cmd} list - list players\n\
             {cmd} roles - show the roles in play\n\
             {cmd} vote <player> - vote someone out during the day\n\
             {cmd} kill|investigate <player> - night action, DM the bot\n\
             {cmd} abort - end the current game (bot owner only)"
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let Some((&subcommand, args)) = args.split_first() else {
            let prefix = ctx.cfg.read().await.general.command_prefix.clone();
            msg.reply(
                ctx.cache_http,
                format!("Missing subcommand. Try `{}help` for usage.", prefix),
            )
            .await?;
            return Ok(EventHandled::Yes);
        };

        let response = match subcommand {
            // Runs until the game is over
            "create" => return create(ctx, msg).await,
            "join" => join(ctx, msg).await,
            "list" => list(ctx).await,
            "roles" => roles(ctx).await,
            "vote" => vote(ctx, msg, args).await,
            "abort" => abort(ctx, msg).await,
            word => match word.parse::<NightAction>() {
                Ok(action) => night_action(ctx, msg, action, args).await,
                Err(_) => format!("Unknown subcommand `{}`.", word),
            },
        };

        msg.reply(ctx.cache_http, response).await?;
        Ok(EventHandled::Yes)
    }
}

async fn create(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    if msg.guild_id.is_none() {
        msg.reply(ctx.cache_http, "Games are started in a server channel, not in DMs.")
            .await?;
        return Ok(EventHandled::Yes);
    }

    let (settings, prefix) = {
        let cfg = ctx.cfg.read().await;
        let pstate = ctx.pstate.read().await;
        let settings = cfg
            .mafia
            .session_settings(pstate.mafia.lobby_duration_seconds)?;
        (settings, cfg.general.command_prefix.clone())
    };
    let lobby_seconds = settings.lobby_duration.as_secs();

    let session_id = match open_lobby(&ctx.vstate.mafia, settings).await {
        Ok(session_id) => session_id,
        Err(e) => {
            msg.reply(ctx.cache_http, format!("Could not create a game: {}", e))
                .await?;
            return Ok(EventHandled::Yes);
        }
    };

    let channel = msg.channel_id.color(ctx.http).await;
    log_game!(
        "{} opened session {} in {}",
        msg.author.color(),
        session_id,
        channel
    );

    let announcement = format!(
        "@here Mafia game starting! Use `{}mafia join` to join the lobby. \
         The game begins in {} seconds.",
        prefix, lobby_seconds
    );
    if let Err(e) = msg.channel_id.say(ctx.http, announcement).await {
        // Nobody could hear about the lobby; don't leave it blocking the next one
        discard(&ctx.vstate.mafia, session_id).await;
        return Err(e.into());
    }

    let host = DiscordHost {
        ctx,
        channel_id: msg.channel_id,
    };
    run_game(&ctx.vstate.mafia, &host, session_id).await?;

    Ok(EventHandled::Yes)
}

async fn join(ctx: &Context<'_>, msg: &Message) -> String {
    let name = msg.author.nick_in_guild(ctx, msg.guild_id).await;

    let mut slot = ctx.vstate.mafia.lock().await;
    let Some(session) = slot.as_mut() else {
        return no_game(ctx).await;
    };

    match session.join(msg.author.id, name.as_str()) {
        Ok(joined) => format!("{} added to players ({} joined).", name, joined),
        Err(e) => format!("Could not join: {}", e),
    }
}

async fn list(ctx: &Context<'_>) -> String {
    let slot = ctx.vstate.mafia.lock().await;
    let Some(session) = slot.as_ref() else {
        return no_game(ctx).await;
    };

    let players = session
        .list_participants()
        .iter()
        .map(|p| {
            if p.alive {
                p.name.clone()
            } else {
                format!("~~{}~~", p.name)
            }
        })
        .collect::<Vec<_>>();

    if players.is_empty() {
        return "Nobody has joined yet.".to_owned();
    }

    let header = if session.is_running() {
        let time = if session.is_night() { "Night" } else { "Day" };
        format!("**Current Mafia Players ({} {}):**", time, session.round())
    } else {
        "**Current Mafia Players:**".to_owned()
    };
    format!("{}\n{}", header, players.join(", "))
}

async fn roles(ctx: &Context<'_>) -> String {
    let slot = ctx.vstate.mafia.lock().await;
    let Some(session) = slot.as_ref() else {
        return no_game(ctx).await;
    };

    let mut reply = String::from("**Roles:**");
    for summary in session.list_roles() {
        let share = if summary.filler {
            "everyone else".to_owned()
        } else {
            format!(
                "{:.0}% of players, at least {}",
                summary.percentage * 100.0,
                summary.minimum
            )
        };
        reply.push_str(&format!("\n{}: {}", summary.role, share));
        if !session.is_lobby_open() {
            reply.push_str(&format!(" ({} dealt)", summary.assigned));
        }
    }
    reply
}

async fn vote(ctx: &Context<'_>, msg: &Message, args: &[&str]) -> String {
    let mut slot = ctx.vstate.mafia.lock().await;
    let Some(session) = slot.as_mut() else {
        return no_game(ctx).await;
    };

    let Some(target) = resolve_target(session, msg, args) else {
        return MafiaError::UnknownTarget.to_string();
    };

    match session.submit_day_vote(&msg.author.id, &target) {
        Ok(()) => format!(
            "{} votes for {}.",
            name_of(session, &msg.author.id),
            name_of(session, &target)
        ),
        Err(e) => format!("Could not vote: {}", e),
    }
}

async fn night_action(
    ctx: &Context<'_>,
    msg: &Message,
    action: NightAction,
    args: &[&str],
) -> String {
    if msg.guild_id.is_some() {
        return "Night actions are secret. Send them to me in a direct message.".to_owned();
    }

    let mut slot = ctx.vstate.mafia.lock().await;
    let Some(session) = slot.as_mut() else {
        return no_game(ctx).await;
    };

    let Some(target) = resolve_target(session, msg, args) else {
        return MafiaError::UnknownTarget.to_string();
    };

    match session.submit_night_action(&msg.author.id, action, &target) {
        Ok(()) => format!(
            "Got it. You will {} {} tonight.",
            action,
            name_of(session, &target)
        ),
        Err(e) => format!("Could not {}: {}", action, e),
    }
}

async fn abort(ctx: &Context<'_>, msg: &Message) -> String {
    if !msg.is_from_owner(ctx).await {
        return "Only bot owners can abort a game.".to_owned();
    }

    let mut slot = ctx.vstate.mafia.lock().await;
    let Some(session) = slot.as_mut() else {
        return no_game(ctx).await;
    };

    match session.abort() {
        Ok(()) => {
            log_game!("{} aborted session {}", msg.author.color(), session.id());
            Outcome::Aborted.to_string()
        }
        Err(e) => format!("Could not abort: {}", e),
    }
}

/// Drop the session `session_id` if it still holds the slot
async fn discard(slot: &GameSlot<UserId>, session_id: Uuid) -> bool {
    let mut slot = slot.lock().await;
    if slot
        .as_ref()
        .is_some_and(|session| session.id() == session_id)
    {
        *slot = None;
        true
    } else {
        false
    }
}

/// Mentioned user if any, otherwise the rest of the command as a display name
fn resolve_target(session: &Session<UserId>, msg: &Message, args: &[&str]) -> Option<UserId> {
    msg.first_mention()
        .or_else(|| session.find_by_name(&args.join(" ")).map(|p| p.id))
}

fn name_of(session: &Session<UserId>, id: &UserId) -> String {
    session
        .participant(id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("<unknown-user-{}>", id))
}

async fn no_game(ctx: &Context<'_>) -> String {
    let prefix = &ctx.cfg.read().await.general.command_prefix;
    format!("No game is running. Start one with `{}mafia create`.", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mafia::SessionSettings;

    #[tokio::test]
    async fn discard_leaves_a_newer_session_alone() {
        let slot = GameSlot::<UserId>::default();
        let first = open_lobby(&slot, SessionSettings::default()).await.unwrap();
        slot.lock().await.as_mut().unwrap().abort().unwrap();
        let second = open_lobby(&slot, SessionSettings::default()).await.unwrap();

        assert!(!discard(&slot, first).await);
        assert_eq!(slot.lock().await.as_ref().map(|s| s.id()), Some(second));

        assert!(discard(&slot, second).await);
        assert!(slot.lock().await.is_none());
    }
}
