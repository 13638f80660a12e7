use crate::mafia::{
    error::MafiaError,
    role::{NightAction, Role, RoleTable, Team},
};
use rand::{seq::SliceRandom, Rng};
use std::{collections::HashMap, fmt, hash::Hash, time::Duration};
use uuid::Uuid;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Phase {
    Lobby,
    Assigning,
    Night,
    Day,
    Ended,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    InsufficientPlayers,
    TownWins,
    MafiaWins,
    Stalemate,
    Aborted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Outcome::InsufficientPlayers => "Not enough players joined. The game is cancelled.",
            Outcome::TownWins => "The last of the mafia is gone. The town wins!",
            Outcome::MafiaWins => "The mafia outnumber the town. The mafia wins!",
            Outcome::Stalemate => "The town grew tired of waiting. Nobody wins.",
            Outcome::Aborted => "The game was aborted.",
        })
    }
}

/// Per-game knobs, fixed when the session is created.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub minimum_players: usize,
    pub lobby_duration: Duration,
    pub round_duration: Duration,
    /// Number of night/day rounds played before the game ends in a stalemate.
    pub max_rounds: u32,
    pub roles: RoleTable,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            minimum_players: 4,
            lobby_duration: Duration::from_secs(60),
            round_duration: Duration::from_secs(120),
            max_rounds: 10,
            roles: RoleTable::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Participant<Id> {
    pub id: Id,
    pub name: String,
    pub role: Option<Role>,
    pub alive: bool,
}

/// Private message revealing a participant's role after assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleNotice<Id> {
    pub to: Id,
    pub role: Role,
    /// Display names of the other members of the same role, for roles that know their team.
    pub teammates: Vec<String>,
}

impl<Id> fmt::Display for RoleNotice<Id> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "You are **{}**. {}", self.role, self.role.briefing())?;
        if self.role.knows_teammates() {
            if self.teammates.is_empty() {
                write!(f, "\nYou work alone.")?;
            } else {
                write!(f, "\nYour teammates: {}", self.teammates.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Someone removed from play, with their role revealed.
#[derive(Clone, Debug, PartialEq)]
pub struct Death<Id> {
    pub id: Id,
    pub name: String,
    pub role: Role,
}

/// Result of a detective's investigation, delivered privately.
#[derive(Clone, Debug, PartialEq)]
pub struct Investigation<Id> {
    pub detective: Id,
    pub target_name: String,
    pub team: Team,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NightReport<Id> {
    pub killed: Option<Death<Id>>,
    pub investigations: Vec<Investigation<Id>>,
    pub outcome: Option<Outcome>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DayReport<Id> {
    pub lynched: Option<Death<Id>>,
    pub outcome: Option<Outcome>,
}

/// Display projection of one role in the table.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleSummary {
    pub role: Role,
    pub percentage: f64,
    pub minimum: usize,
    pub filler: bool,
    /// How many participants hold the role.  Zero until roles are assigned.
    pub assigned: usize,
}

/// One game of mafia: the lobby, the roster and the round loop.
///
/// All operations are synchronous checks against the current state.  Anything time based
/// (lobby expiry, round expiry) is driven from outside by calling the matching transition.
#[derive(Clone, Debug)]
pub struct Session<Id> {
    id: Uuid,
    settings: SessionSettings,
    participants: Vec<Participant<Id>>,
    phase: Phase,
    round: u32,
    night_actions: Vec<(Id, NightAction, Id)>,
    day_votes: Vec<(Id, Id)>,
    outcome: Option<Outcome>,
}

impl<Id> Session<Id>
where
    Id: Clone + Eq + Hash,
{
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            participants: Vec::new(),
            phase: Phase::Lobby,
            round: 0,
            night_actions: Vec::new(),
            day_votes: Vec::new(),
            outcome: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round, starting at 1 on the first night.  Zero before the game starts.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_lobby_open(&self) -> bool {
        self.phase == Phase::Lobby
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Assigning | Phase::Night | Phase::Day)
    }

    pub fn is_night(&self) -> bool {
        self.phase == Phase::Night
    }

    pub fn list_participants(&self) -> &[Participant<Id>] {
        &self.participants
    }

    pub fn participant(&self, id: &Id) -> Option<&Participant<Id>> {
        self.participants.iter().find(|p| p.id == *id)
    }

    /// Case-insensitive lookup by display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Participant<Id>> {
        let name = name.trim();
        self.participants
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn list_roles(&self) -> Vec<RoleSummary> {
        let filler = self.settings.roles.filler();
        self.settings
            .roles
            .specs()
            .iter()
            .map(|spec| RoleSummary {
                role: spec.role,
                percentage: spec.percentage,
                minimum: spec.minimum,
                filler: spec.role == filler,
                assigned: self
                    .participants
                    .iter()
                    .filter(|p| p.role == Some(spec.role))
                    .count(),
            })
            .collect()
    }

    /// Add a participant to the lobby.  Returns the new roster size.
    pub fn join(&mut self, id: Id, name: impl Into<String>) -> Result<usize, MafiaError> {
        self.expect_phase(Phase::Lobby)?;

        if self.participant(&id).is_some() {
            return Err(MafiaError::DuplicateParticipant);
        }

        self.participants.push(Participant {
            id,
            name: name.into(),
            role: None,
            alive: true,
        });

        Ok(self.participants.len())
    }

    /// Close the lobby and deal roles using the thread-local RNG.  See
    /// [`Session::close_lobby_and_assign_with`].
    pub fn close_lobby_and_assign(&mut self) -> Result<Vec<RoleNotice<Id>>, MafiaError> {
        self.close_lobby_and_assign_with(&mut rand::thread_rng())
    }

    /// Close the lobby and deal roles.
    ///
    /// On success the session is in [`Phase::Assigning`] and one notice per participant is
    /// returned, in join order.  The caller delivers them and then calls
    /// [`Session::begin_night`].  A roster below the minimum ends the session.
    pub fn close_lobby_and_assign_with<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<RoleNotice<Id>>, MafiaError> {
        self.expect_phase(Phase::Lobby)?;

        let joined = self.participants.len();
        let required = self.settings.minimum_players;
        if joined < required {
            self.finish(Outcome::InsufficientPlayers);
            return Err(MafiaError::InsufficientPlayers { joined, required });
        }

        let buckets = self.settings.roles.buckets(joined)?;

        let mut order: Vec<usize> = (0..joined).collect();
        order.shuffle(rng);

        let roles = buckets
            .iter()
            .flat_map(|&(role, count)| std::iter::repeat(role).take(count));
        for (index, role) in order.into_iter().zip(roles) {
            self.participants[index].role = Some(role);
        }

        self.phase = Phase::Assigning;

        Ok(self.role_notices())
    }

    fn role_notices(&self) -> Vec<RoleNotice<Id>> {
        self.participants
            .iter()
            .filter_map(|p| {
                let role = p.role?;
                let teammates = if role.knows_teammates() {
                    self.participants
                        .iter()
                        .filter(|other| other.role == Some(role) && other.id != p.id)
                        .map(|other| other.name.clone())
                        .collect()
                } else {
                    Vec::new()
                };
                Some(RoleNotice {
                    to: p.id.clone(),
                    role,
                    teammates,
                })
            })
            .collect()
    }

    /// Start the first night once role notices are out.
    pub fn begin_night(&mut self) -> Result<(), MafiaError> {
        self.expect_phase(Phase::Assigning)?;
        self.round = 1;
        self.phase = Phase::Night;
        Ok(())
    }

    pub fn submit_night_action(
        &mut self,
        actor: &Id,
        action: NightAction,
        target: &Id,
    ) -> Result<(), MafiaError> {
        self.expect_phase(Phase::Night)?;

        match self.living(actor).and_then(|p| p.role) {
            Some(role) if role.grants(action) => (),
            _ => return Err(MafiaError::InvalidActor),
        }

        if self.living(target).is_none() {
            return Err(MafiaError::UnknownTarget);
        }

        // One action per actor per night; the latest submission counts
        self.night_actions.retain(|(who, _, _)| who != actor);
        self.night_actions
            .push((actor.clone(), action, target.clone()));

        Ok(())
    }

    pub fn submit_day_vote(&mut self, voter: &Id, target: &Id) -> Result<(), MafiaError> {
        self.expect_phase(Phase::Day)?;

        if self.living(voter).is_none() {
            return Err(MafiaError::InvalidActor);
        }
        if self.living(target).is_none() {
            return Err(MafiaError::UnknownTarget);
        }

        self.day_votes.retain(|(who, _)| who != voter);
        self.day_votes.push((voter.clone(), target.clone()));

        Ok(())
    }

    /// Resolve the night: apply the kill, answer surviving detectives, then check for a winner.
    pub fn end_night(&mut self) -> Result<NightReport<Id>, MafiaError> {
        self.expect_phase(Phase::Night)?;

        let actions = std::mem::take(&mut self.night_actions);

        let victim = plurality(
            actions
                .iter()
                .filter(|(_, action, _)| *action == NightAction::Kill)
                .map(|(_, _, target)| target),
        );
        let killed = victim.and_then(|id| self.kill(&id));

        let investigations = actions
            .iter()
            .filter(|(_, action, _)| *action == NightAction::Investigate)
            .filter(|(detective, _, _)| self.living(detective).is_some())
            .filter_map(|(detective, _, target)| {
                let target = self.participant(target)?;
                Some(Investigation {
                    detective: detective.clone(),
                    target_name: target.name.clone(),
                    team: target.role?.team(),
                })
            })
            .collect();

        let outcome = self.check_winner();
        if outcome.is_none() {
            self.phase = Phase::Day;
        }

        Ok(NightReport {
            killed,
            investigations,
            outcome,
        })
    }

    /// Resolve the day vote, then either end the game or start the next night.
    pub fn end_day(&mut self) -> Result<DayReport<Id>, MafiaError> {
        self.expect_phase(Phase::Day)?;

        let votes = std::mem::take(&mut self.day_votes);
        let lynched = plurality(votes.iter().map(|(_, target)| target))
            .and_then(|id| self.kill(&id));

        let mut outcome = self.check_winner();
        if outcome.is_none() && self.round >= self.settings.max_rounds {
            self.finish(Outcome::Stalemate);
            outcome = Some(Outcome::Stalemate);
        }
        if outcome.is_none() {
            self.round += 1;
            self.phase = Phase::Night;
        }

        Ok(DayReport { lynched, outcome })
    }

    /// Force the session to end.
    pub fn abort(&mut self) -> Result<(), MafiaError> {
        if self.phase == Phase::Ended {
            return Err(MafiaError::InvalidPhase { phase: self.phase });
        }
        self.finish(Outcome::Aborted);
        Ok(())
    }

    fn expect_phase(&self, phase: Phase) -> Result<(), MafiaError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(MafiaError::InvalidPhase { phase: self.phase })
        }
    }

    fn living(&self, id: &Id) -> Option<&Participant<Id>> {
        self.participant(id).filter(|p| p.alive)
    }

    fn kill(&mut self, id: &Id) -> Option<Death<Id>> {
        let victim = self
            .participants
            .iter_mut()
            .find(|p| p.id == *id && p.alive)?;
        victim.alive = false;
        Some(Death {
            id: victim.id.clone(),
            name: victim.name.clone(),
            role: victim.role?,
        })
    }

    fn check_winner(&mut self) -> Option<Outcome> {
        let (mafia, town) = self
            .participants
            .iter()
            .filter(|p| p.alive)
            .filter_map(|p| p.role)
            .fold((0usize, 0usize), |(mafia, town), role| match role.team() {
                Team::Mafia => (mafia + 1, town),
                Team::Town => (mafia, town + 1),
            });

        let outcome = if mafia == 0 {
            Outcome::TownWins
        } else if mafia >= town {
            Outcome::MafiaWins
        } else {
            return None;
        };

        self.finish(outcome);
        Some(outcome)
    }

    fn finish(&mut self, outcome: Outcome) {
        self.phase = Phase::Ended;
        self.outcome = Some(outcome);
        self.night_actions.clear();
        self.day_votes.clear();
    }
}

/// The target with strictly the most votes.  Ties and empty ballots pick nobody.
fn plurality<'a, Id>(votes: impl Iterator<Item = &'a Id>) -> Option<Id>
where
    Id: Clone + Eq + Hash + 'a,
{
    let mut tally: HashMap<&Id, usize> = HashMap::new();
    for target in votes {
        *tally.entry(target).or_default() += 1;
    }

    let top = tally.values().copied().max()?;
    let mut leaders = tally.into_iter().filter(|(_, count)| *count == top);
    match (leaders.next(), leaders.next()) {
        (Some((target, _)), None) => Some(target.clone()),
        _ => None,
    }
}
