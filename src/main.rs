mod config;
mod context;
mod event;
mod handler;
mod helper;
mod logging;
mod mafia;
mod persistent_state;
mod plugin;
mod volatile_state;

use serenity::{all::GatewayIntents, Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();
    let pstate = crate::persistent_state::PersistentState::load().await?;
    let vstate = crate::volatile_state::VolatileState::default();
    let handler = handler::Handler::new(cfg, pstate, vstate);

    // Things we want discord to tell us about.  Night actions arrive as direct messages.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(&token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into)
}
