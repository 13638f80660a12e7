//! The mafia party game: role dealing and the night/day round loop.
//!
//! [`session`] is a synchronous state machine with no knowledge of Discord.  [`driver`] runs it
//! on a timer against anything that implements [`driver::GameHost`].

pub mod driver;
pub mod error;
pub mod role;
pub mod session;

pub use driver::{open_lobby, run_game, GameHost, GameSlot};
pub use error::MafiaError;
pub use role::{NightAction, Role, RoleSpec, RoleTable};
pub use session::{Outcome, Phase, Session, SessionSettings};
