use crate::mafia::error::MafiaError;
use serde::{Deserialize, Serialize};

/// The side a role plays for.  Win conditions are evaluated per team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Team {
    Town,
    Mafia,
}

/// A role a participant can be dealt.
///
/// Declaration order is the assignment priority: buckets are filled top to bottom, with the
/// filler role always consumed last regardless of where it is declared.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Role {
    Mafia,
    Detective,
    Town,
}

/// Something a role may do at night.  Parsed from command words, e.g. `kill`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NightAction {
    Kill,
    Investigate,
}

impl Role {
    pub fn team(self) -> Team {
        match self {
            Role::Mafia => Team::Mafia,
            Role::Detective | Role::Town => Team::Town,
        }
    }

    /// Whether members of this role are told who their teammates are.
    pub fn knows_teammates(self) -> bool {
        match self {
            Role::Mafia => true,
            Role::Detective | Role::Town => false,
        }
    }

    pub fn grants(self, action: NightAction) -> bool {
        matches!(
            (self, action),
            (Role::Mafia, NightAction::Kill) | (Role::Detective, NightAction::Investigate)
        )
    }

    /// One-line description sent along with the role reveal.
    pub fn briefing(self) -> &'static str {
        match self {
            Role::Mafia => "Each night, DM me `mafia kill <player>` to pick a victim.",
            Role::Detective => {
                "Each night, DM me `mafia investigate <player>` to learn which side they are on."
            }
            Role::Town => "Find the mafia and vote them out during the day.",
        }
    }
}

/// How many players a role should get.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: Role,
    /// Fraction of the roster, in `[0, 1]`.  Ignored for the filler role.
    pub percentage: f64,
    /// Headcount floor, applied after rounding the percentage.
    #[serde(default)]
    pub minimum: usize,
}

impl RoleSpec {
    pub fn new(role: Role, percentage: f64, minimum: usize) -> Self {
        Self {
            role,
            percentage,
            minimum,
        }
    }
}

/// Validated set of role specs, sorted by assignment priority with the filler role last.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleTable {
    filler: Role,
    specs: Vec<RoleSpec>,
}

impl RoleTable {
    pub fn new(filler: Role, mut specs: Vec<RoleSpec>) -> Result<Self, MafiaError> {
        specs.sort_by_key(|spec| (spec.role == filler, spec.role));

        for pair in specs.windows(2) {
            if pair[0].role == pair[1].role {
                return Err(MafiaError::InvalidRoleTable(format!(
                    "{} is listed more than once",
                    pair[0].role
                )));
            }
        }

        if let Some(spec) = specs
            .iter()
            .find(|spec| !spec.percentage.is_finite() || !(0.0..=1.0).contains(&spec.percentage))
        {
            return Err(MafiaError::InvalidRoleTable(format!(
                "{} has percentage {}, expected a value between 0 and 1",
                spec.role, spec.percentage
            )));
        }

        if specs.last().map(|spec| spec.role) != Some(filler) {
            return Err(MafiaError::InvalidRoleTable(format!(
                "filler role {} is not in the table",
                filler
            )));
        }

        let deals_mafia = specs.iter().any(|spec| {
            spec.role != filler && spec.role.team() == Team::Mafia && spec.minimum >= 1
        });
        if !deals_mafia {
            return Err(MafiaError::InvalidRoleTable(
                "no mafia role with a minimum of at least 1".to_owned(),
            ));
        }

        Ok(Self { filler, specs })
    }

    pub fn filler(&self) -> Role {
        self.filler
    }

    /// Specs in assignment priority order, filler last.
    pub fn specs(&self) -> &[RoleSpec] {
        &self.specs
    }

    /// Headcount per role for a roster of `total` players, in assignment priority order.
    ///
    /// Every non-filler role gets `max(minimum, round(percentage * total))`; the filler role
    /// absorbs whatever is left.
    pub fn buckets(&self, total: usize) -> Result<Vec<(Role, usize)>, MafiaError> {
        let mut buckets = Vec::with_capacity(self.specs.len());
        let mut demanded = 0usize;

        for spec in self.specs.iter().filter(|spec| spec.role != self.filler) {
            let proportional = (spec.percentage * total as f64).round() as usize;
            let count = spec.minimum.max(proportional);
            demanded += count;
            buckets.push((spec.role, count));
        }

        let remainder = total
            .checked_sub(demanded)
            .ok_or(MafiaError::RoleOversubscription {
                demanded,
                available: total,
            })?;
        buckets.push((self.filler, remainder));

        Ok(buckets)
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self {
            filler: Role::Town,
            specs: vec![
                RoleSpec::new(Role::Mafia, 0.2, 1),
                RoleSpec::new(Role::Detective, 0.1, 0),
                RoleSpec::new(Role::Town, 0.8, 0),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn town_and_mafia() -> RoleTable {
        RoleTable::new(
            Role::Town,
            vec![
                RoleSpec::new(Role::Town, 0.8, 0),
                RoleSpec::new(Role::Mafia, 0.2, 1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn table_orders_filler_last() {
        let table = town_and_mafia();
        let roles: Vec<Role> = table.specs().iter().map(|spec| spec.role).collect();
        assert_eq!(roles, vec![Role::Mafia, Role::Town]);
    }

    #[test]
    fn default_table_is_valid() {
        let default = RoleTable::default();
        let rebuilt = RoleTable::new(default.filler(), default.specs().to_vec()).unwrap();
        assert_eq!(default, rebuilt);
    }

    #[test]
    fn buckets_for_five_players() {
        let buckets = town_and_mafia().buckets(5).unwrap();
        assert_eq!(buckets, vec![(Role::Mafia, 1), (Role::Town, 4)]);
    }

    #[test]
    fn minimum_wins_over_small_percentage() {
        let buckets = town_and_mafia().buckets(2).unwrap();
        // round(0.4) == 0, the minimum of one still applies
        assert_eq!(buckets, vec![(Role::Mafia, 1), (Role::Town, 1)]);
    }

    #[test]
    fn percentage_rounds_half_away_from_zero() {
        let table = RoleTable::default();
        let buckets = table.buckets(5).unwrap();
        assert_eq!(
            buckets,
            vec![(Role::Mafia, 1), (Role::Detective, 1), (Role::Town, 3)]
        );
    }

    #[test]
    fn oversubscription_is_rejected() {
        let table = RoleTable::new(
            Role::Town,
            vec![
                RoleSpec::new(Role::Town, 0.0, 0),
                RoleSpec::new(Role::Mafia, 0.0, 2),
                RoleSpec::new(Role::Detective, 0.0, 2),
            ],
        )
        .unwrap();

        assert_eq!(
            table.buckets(3),
            Err(MafiaError::RoleOversubscription {
                demanded: 4,
                available: 3
            })
        );
        assert!(table.buckets(4).is_ok());
    }

    #[test]
    fn duplicate_roles_are_rejected() {
        let result = RoleTable::new(
            Role::Town,
            vec![
                RoleSpec::new(Role::Town, 0.8, 0),
                RoleSpec::new(Role::Mafia, 0.1, 1),
                RoleSpec::new(Role::Mafia, 0.1, 1),
            ],
        );
        assert!(matches!(result, Err(MafiaError::InvalidRoleTable(_))));
    }

    #[test]
    fn missing_filler_is_rejected() {
        let result = RoleTable::new(Role::Town, vec![RoleSpec::new(Role::Mafia, 0.2, 1)]);
        assert!(matches!(result, Err(MafiaError::InvalidRoleTable(_))));
    }

    #[test]
    fn out_of_range_percentage_is_rejected() {
        let result = RoleTable::new(
            Role::Town,
            vec![
                RoleSpec::new(Role::Town, 0.8, 0),
                RoleSpec::new(Role::Mafia, 1.5, 1),
            ],
        );
        assert!(matches!(result, Err(MafiaError::InvalidRoleTable(_))));
    }

    #[test]
    fn table_that_can_deal_no_mafia_is_rejected() {
        let result = RoleTable::new(
            Role::Town,
            vec![
                RoleSpec::new(Role::Town, 0.8, 0),
                RoleSpec::new(Role::Mafia, 0.0, 0),
            ],
        );
        assert!(matches!(result, Err(MafiaError::InvalidRoleTable(_))));

        let result = RoleTable::new(Role::Town, vec![RoleSpec::new(Role::Town, 1.0, 0)]);
        assert!(matches!(result, Err(MafiaError::InvalidRoleTable(_))));
    }

    #[test]
    fn night_actions_parse_from_command_words() {
        assert_eq!("kill".parse::<NightAction>(), Ok(NightAction::Kill));
        assert_eq!(
            "Investigate".parse::<NightAction>(),
            Ok(NightAction::Investigate)
        );
        assert!("vote".parse::<NightAction>().is_err());
    }

    #[test]
    fn only_mafia_sees_teammates() {
        use strum::IntoEnumIterator;
        let visible: Vec<Role> = Role::iter().filter(|role| role.knows_teammates()).collect();
        assert_eq!(visible, vec![Role::Mafia]);
    }
}
