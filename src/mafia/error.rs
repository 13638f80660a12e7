use crate::mafia::session::Phase;

/// Reasons a game operation was refused.
///
/// Every failure leaves the session as it was, with one exception: closing a lobby that is short
/// of players ends the game.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MafiaError {
    #[error("you already joined this game")]
    DuplicateParticipant,

    #[error("not enough players: {joined} joined, at least {required} needed")]
    InsufficientPlayers { joined: usize, required: usize },

    #[error("the role table asks for {demanded} players but only {available} joined")]
    RoleOversubscription { demanded: usize, available: usize },

    #[error("that can't be done during the {phase} phase")]
    InvalidPhase { phase: Phase },

    #[error("you can't do that in this game")]
    InvalidActor,

    #[error("no living player by that name")]
    UnknownTarget,

    #[error("a game is already in progress")]
    GameInProgress,

    #[error("invalid role table: {0}")]
    InvalidRoleTable(String),
}
