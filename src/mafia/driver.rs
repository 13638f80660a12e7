//! Runs one game from lobby to outcome on top of a [`GameHost`].
//!
//! The session lives in a [`GameSlot`], a single mutex shared with the command handlers that join
//! players and submit actions.  The driver only holds the lock while it mutates the session.
//! Messages are queued under the lock and sent after it is released, so commands never wait on
//! Discord's rate limits or on a timer.

use crate::{
    log_game, log_internal,
    logging::PrintColor,
    mafia::{
        error::MafiaError,
        session::{DayReport, NightReport, Outcome, Phase, Session, SessionSettings},
    },
};
use anyhow::Result;
use std::{fmt::Debug, hash::Hash, time::Duration};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Holder for the one game that may run at a time.
pub type GameSlot<Id> = Mutex<Option<Session<Id>>>;

/// What the game needs from the chat platform.
#[serenity::async_trait]
pub trait GameHost<Id: Send + Sync>: Send + Sync {
    /// Public message to the channel the game was started in.
    async fn broadcast(&self, text: &str) -> Result<()>;
    /// Private message to one participant.
    async fn whisper(&self, to: &Id, text: &str) -> Result<()>;
    /// Suspend the calling task.
    async fn delay(&self, duration: Duration);
}

/// Create a new session in the slot.  Fails if a game is still live.
pub async fn open_lobby<Id>(
    slot: &GameSlot<Id>,
    settings: SessionSettings,
) -> Result<Uuid, MafiaError>
where
    Id: Clone + Eq + Hash,
{
    let mut slot = slot.lock().await;
    if slot
        .as_ref()
        .is_some_and(|session| session.phase() != Phase::Ended)
    {
        return Err(MafiaError::GameInProgress);
    }

    let session = Session::new(settings);
    let id = session.id();
    *slot = Some(session);

    log_game!("Session {} opened its lobby", id);
    Ok(id)
}

/// Drive the session `session_id` until it ends, then discard it.
///
/// Returns early with [`Outcome::Aborted`] if the session is aborted or replaced while the driver
/// is waiting.
pub async fn run_game<Id, H>(slot: &GameSlot<Id>, host: &H, session_id: Uuid) -> Result<Outcome>
where
    Id: Clone + Eq + Hash + Debug + Send + Sync,
    H: GameHost<Id> + ?Sized,
{
    let result = drive(slot, host, session_id).await;

    let mut guard = slot.lock().await;
    if guard
        .as_ref()
        .is_some_and(|session| session.id() == session_id)
    {
        *guard = None;
    }

    match &result {
        Ok(outcome) => log_game!("Session {} ended: {:?}", session_id, outcome),
        Err(e) => log_internal!("Session {} failed: {}", session_id, e),
    }

    result
}

async fn drive<Id, H>(slot: &GameSlot<Id>, host: &H, session_id: Uuid) -> Result<Outcome>
where
    Id: Clone + Eq + Hash + Debug + Send + Sync,
    H: GameHost<Id> + ?Sized,
{
    let (lobby_duration, round_duration) = {
        let mut guard = slot.lock().await;
        let Some(session) = current(&mut *guard, session_id) else {
            return Ok(Outcome::Aborted);
        };
        let settings = session.settings();
        (settings.lobby_duration, settings.round_duration)
    };

    host.delay(lobby_duration).await;

    let (outbox, ended) = {
        let mut guard = slot.lock().await;
        let Some(session) = current(&mut *guard, session_id) else {
            return Ok(Outcome::Aborted);
        };
        if let Some(outcome) = session.outcome() {
            return Ok(outcome);
        }
        deal(session, session_id)?
    };
    deliver(host, outbox).await;
    if let Some(outcome) = ended {
        return Ok(outcome);
    }

    loop {
        host.delay(round_duration).await;

        let (mut outbox, outcome) = {
            let mut guard = slot.lock().await;
            let Some(session) = current(&mut *guard, session_id) else {
                return Ok(Outcome::Aborted);
            };

            let (outbox, outcome) = match session.phase() {
                Phase::Night => {
                    let report = session.end_night()?;
                    (dawn(&report, session.round()), report.outcome)
                }
                Phase::Day => {
                    let report = session.end_day()?;
                    (dusk(&report, session.round()), report.outcome)
                }
                // Aborted while we were waiting; whoever aborted it has told the channel
                _ => return Ok(session.outcome().unwrap_or(Outcome::Aborted)),
            };
            if outcome.is_none() {
                log_game!("Session {} entered {}", session_id, session.phase().color());
            }
            (outbox, outcome)
        };

        if let Some(outcome) = outcome {
            outbox.push(Dispatch::Broadcast(outcome.to_string()));
            deliver(host, outbox).await;
            return Ok(outcome);
        }
        deliver(host, outbox).await;
    }
}

/// A message produced while the slot is locked, sent once it is released.
enum Dispatch<Id> {
    Broadcast(String),
    Whisper(Id, String),
}

/// Send everything in order.  The session has already moved on, so a failed send is logged
/// and the game continues.
async fn deliver<Id, H>(host: &H, outbox: Vec<Dispatch<Id>>)
where
    Id: Debug + Send + Sync,
    H: GameHost<Id> + ?Sized,
{
    for dispatch in outbox {
        match dispatch {
            Dispatch::Broadcast(text) => {
                if let Err(e) = host.broadcast(&text).await {
                    log_internal!("Could not send game message to the channel: {}", e);
                }
            }
            Dispatch::Whisper(to, text) => {
                if let Err(e) = host.whisper(&to, &text).await {
                    log_internal!("Could not send private message to {:?}: {}", to, e);
                }
            }
        }
    }
}

fn current<Id>(slot: &mut Option<Session<Id>>, session_id: Uuid) -> Option<&mut Session<Id>>
where
    Id: Clone + Eq + Hash,
{
    slot.as_mut().filter(|session| session.id() == session_id)
}

/// Close the lobby, deal roles and start the first night.  Returns the messages to send and
/// the outcome if the game ended before it began.
fn deal<Id>(
    session: &mut Session<Id>,
    session_id: Uuid,
) -> Result<(Vec<Dispatch<Id>>, Option<Outcome>)>
where
    Id: Clone + Eq + Hash + Debug,
{
    let notices = match session.close_lobby_and_assign() {
        Ok(notices) => notices,
        Err(MafiaError::InsufficientPlayers { .. }) => {
            let outcome = Outcome::InsufficientPlayers;
            return Ok((vec![Dispatch::Broadcast(outcome.to_string())], Some(outcome)));
        }
        Err(e) => {
            session.abort()?;
            let text = format!("The game could not start: {}", e);
            return Ok((vec![Dispatch::Broadcast(text)], Some(Outcome::Aborted)));
        }
    };
    log_game!(
        "Session {} dealt roles to {} players",
        session_id,
        notices.len()
    );

    let mut outbox = Vec::with_capacity(notices.len() + 1);
    for notice in &notices {
        log_game!("{:?} is {}", notice.to, notice.role.color());
        outbox.push(Dispatch::Whisper(notice.to.clone(), notice.to_string()));
    }

    session.begin_night()?;
    log_game!("Session {} entered {}", session_id, session.phase().color());
    outbox.push(Dispatch::Broadcast(format!(
        "Roles have been sent out. Night {} falls...",
        session.round()
    )));

    Ok((outbox, None))
}

fn dawn<Id>(report: &NightReport<Id>, round: u32) -> Vec<Dispatch<Id>>
where
    Id: Clone + Debug,
{
    let headline = match &report.killed {
        Some(death) => {
            log_game!("{:?} was killed in the night", death.id);
            format!(
                "Dawn breaks. **{}** was found dead. They were {}.",
                death.name, death.role
            )
        }
        None => "Dawn breaks. Nobody died during the night.".to_string(),
    };

    let mut outbox = vec![Dispatch::Broadcast(if report.outcome.is_some() {
        headline
    } else {
        format!(
            "{}\nDay {} begins. Discuss, then vote someone out.",
            headline, round
        )
    })];

    for investigation in &report.investigations {
        outbox.push(Dispatch::Whisper(
            investigation.detective.clone(),
            format!(
                "Your investigation reveals that {} sides with the {}.",
                investigation.target_name, investigation.team
            ),
        ));
    }

    outbox
}

fn dusk<Id>(report: &DayReport<Id>, round: u32) -> Vec<Dispatch<Id>>
where
    Id: Debug,
{
    let headline = match &report.lynched {
        Some(death) => {
            log_game!("{:?} was voted out", death.id);
            format!(
                "The town has voted out **{}**. They were {}.",
                death.name, death.role
            )
        }
        None => "The town could not agree on anyone.".to_string(),
    };

    vec![Dispatch::Broadcast(if report.outcome.is_some() {
        headline
    } else {
        format!("{}\nNight {} falls...", headline, round)
    })]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mafia::role::{NightAction, Role, RoleSpec, RoleTable};
    use anyhow::anyhow;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    };

    #[derive(Default)]
    struct RecordingHost {
        broadcasts: StdMutex<Vec<String>>,
        whispers: StdMutex<Vec<(u64, String)>>,
        /// Zero-based index of a broadcast that fails instead of being recorded
        failing_broadcast: Option<usize>,
        attempts: AtomicUsize,
    }

    #[serenity::async_trait]
    impl GameHost<u64> for RecordingHost {
        async fn broadcast(&self, text: &str) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing_broadcast == Some(attempt) {
                return Err(anyhow!("channel unavailable"));
            }
            self.broadcasts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn whisper(&self, to: &u64, text: &str) -> Result<()> {
            self.whispers.lock().unwrap().push((*to, text.to_string()));
            Ok(())
        }

        async fn delay(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }
    }

    impl RecordingHost {
        fn broadcasts(&self) -> Vec<String> {
            self.broadcasts.lock().unwrap().clone()
        }

        fn whispers(&self) -> Vec<(u64, String)> {
            self.whispers.lock().unwrap().clone()
        }
    }

    fn settings(max_rounds: u32) -> SessionSettings {
        SessionSettings {
            minimum_players: 4,
            lobby_duration: Duration::from_secs(60),
            round_duration: Duration::from_secs(120),
            max_rounds,
            ..SessionSettings::default()
        }
    }

    async fn open_with_players(
        slot: &GameSlot<u64>,
        settings: SessionSettings,
        players: u64,
    ) -> Uuid {
        let id = open_lobby(slot, settings).await.unwrap();
        let mut guard = slot.lock().await;
        let session = guard.as_mut().unwrap();
        for player in 1..=players {
            session.join(player, format!("player{}", player)).unwrap();
        }
        id
    }

    #[tokio::test(start_paused = true)]
    async fn second_lobby_is_refused_while_first_is_live() {
        let slot = GameSlot::<u64>::default();
        open_lobby(&slot, settings(1)).await.unwrap();
        assert_eq!(
            open_lobby(&slot, settings(1)).await,
            Err(MafiaError::GameInProgress)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn short_lobby_is_cancelled_and_discarded() {
        let slot = GameSlot::<u64>::default();
        let host = RecordingHost::default();
        let id = open_with_players(&slot, settings(1), 2).await;

        let outcome = run_game(&slot, &host, id).await.unwrap();

        assert_eq!(outcome, Outcome::InsufficientPlayers);
        assert!(slot.lock().await.is_none());
        assert!(host.whispers().is_empty());
        assert_eq!(
            host.broadcasts(),
            vec![Outcome::InsufficientPlayers.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_game_runs_out_of_rounds() {
        let slot = GameSlot::<u64>::default();
        let host = RecordingHost::default();
        let id = open_with_players(&slot, settings(1), 5).await;

        let outcome = run_game(&slot, &host, id).await.unwrap();

        assert_eq!(outcome, Outcome::Stalemate);
        assert!(slot.lock().await.is_none());

        let mut told: Vec<u64> = host.whispers().iter().map(|(to, _)| *to).collect();
        told.sort();
        assert_eq!(told, vec![1, 2, 3, 4, 5]);

        let broadcasts = host.broadcasts();
        assert!(broadcasts[0].starts_with("Roles have been sent out"));
        assert!(broadcasts[1].starts_with("Dawn breaks. Nobody died"));
        assert_eq!(broadcasts.last(), Some(&Outcome::Stalemate.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn night_kill_is_announced_at_dawn() {
        let slot = GameSlot::<u64>::default();
        let host = RecordingHost::default();
        let id = open_with_players(&slot, settings(1), 5).await;

        let script = async {
            // Lobby closes at 60s; act during the first night
            tokio::time::sleep(Duration::from_secs(61)).await;
            let mut guard = slot.lock().await;
            let session = guard.as_mut().unwrap();
            let mafia = session
                .list_participants()
                .iter()
                .find(|p| p.role == Some(Role::Mafia))
                .map(|p| p.id)
                .unwrap();
            let victim = session
                .list_participants()
                .iter()
                .find(|p| p.role == Some(Role::Town))
                .map(|p| (p.id, p.name.clone()))
                .unwrap();
            session
                .submit_night_action(&mafia, NightAction::Kill, &victim.0)
                .unwrap();
            victim.1
        };

        let (outcome, victim) = tokio::join!(run_game(&slot, &host, id), script);

        assert_eq!(outcome.unwrap(), Outcome::Stalemate);
        let dawn = host
            .broadcasts()
            .into_iter()
            .find(|text| text.starts_with("Dawn breaks."))
            .unwrap();
        assert!(dawn.contains(&format!("**{}** was found dead", victim)));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_lobby_stops_the_driver() {
        let slot = GameSlot::<u64>::default();
        let host = RecordingHost::default();
        let id = open_with_players(&slot, settings(3), 5).await;

        let script = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            slot.lock().await.as_mut().unwrap().abort().unwrap();
        };

        let (outcome, ()) = tokio::join!(run_game(&slot, &host, id), script);

        assert_eq!(outcome.unwrap(), Outcome::Aborted);
        assert!(slot.lock().await.is_none());
        assert!(host.whispers().is_empty());
        assert!(host.broadcasts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_session_is_left_alone() {
        let slot = GameSlot::<u64>::default();
        let host = RecordingHost::default();
        let first = open_with_players(&slot, settings(3), 5).await;

        let script = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            slot.lock().await.as_mut().unwrap().abort().unwrap();
            open_lobby(&slot, settings(3)).await.unwrap()
        };

        let (outcome, second) = tokio::join!(run_game(&slot, &host, first), script);

        assert_eq!(outcome.unwrap(), Outcome::Aborted);
        let guard = slot.lock().await;
        let survivor = guard.as_ref().unwrap();
        assert_eq!(survivor.id(), second);
        assert_eq!(survivor.phase(), Phase::Lobby);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_broadcast_does_not_end_the_game() {
        let slot = GameSlot::<u64>::default();
        // Second broadcast is the first dawn
        let host = RecordingHost {
            failing_broadcast: Some(1),
            ..RecordingHost::default()
        };
        let id = open_with_players(&slot, settings(1), 5).await;

        let outcome = run_game(&slot, &host, id).await.unwrap();

        assert_eq!(outcome, Outcome::Stalemate);
        assert!(slot.lock().await.is_none());
        let broadcasts = host.broadcasts();
        assert!(broadcasts[0].starts_with("Roles have been sent out"));
        assert!(!broadcasts.iter().any(|text| text.starts_with("Dawn breaks.")));
        assert_eq!(broadcasts.last(), Some(&Outcome::Stalemate.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn oversubscribed_table_aborts_the_game() {
        let slot = GameSlot::<u64>::default();
        let host = RecordingHost::default();
        let oversubscribed = SessionSettings {
            roles: RoleTable::new(
                Role::Town,
                vec![
                    RoleSpec::new(Role::Town, 0.0, 0),
                    RoleSpec::new(Role::Mafia, 0.0, 3),
                    RoleSpec::new(Role::Detective, 0.0, 2),
                ],
            )
            .unwrap(),
            ..settings(3)
        };
        let id = open_with_players(&slot, oversubscribed, 4).await;

        let outcome = run_game(&slot, &host, id).await.unwrap();

        assert_eq!(outcome, Outcome::Aborted);
        assert!(slot.lock().await.is_none());
        assert!(host.whispers().is_empty());
        let broadcasts = host.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert!(broadcasts[0].starts_with("The game could not start"));
    }
}
