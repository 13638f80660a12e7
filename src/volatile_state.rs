use crate::mafia::GameSlot;
use serenity::all::UserId;

/// State which is lost across sessions
#[derive(Default)]
pub struct VolatileState {
    /// The one mafia game this bot can host at a time.  Every command that touches the game
    /// goes through this lock.
    pub mafia: GameSlot<UserId>,
}
