//! Relevance filtering
//!
//! Pure admission predicates for battles and kills. Every check is a function
//! of the item, the stream's current watermark and the configured rules; the
//! first failing check is reported as a `Rejection` for logging.

use crate::battle::Battle;
use crate::model::{Combatant, KillEvent};
use std::collections::HashSet;
use std::fmt;

/// Thresholds and tracked names driving admission
#[derive(Debug, Clone)]
pub struct AdmissionRules {
    tracked: HashSet<String>,
    pub min_battle_players: usize,
    pub min_relevant_players: usize,
    pub min_kill_fame: u64,
}

impl AdmissionRules {
    pub fn new<I, S>(
        tracked: I,
        min_battle_players: usize,
        min_relevant_players: usize,
        min_kill_fame: u64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked: tracked.into_iter().map(Into::into).collect(),
            min_battle_players,
            min_relevant_players,
            min_kill_fame,
        }
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.tracked.contains(name)
    }

    /// Guild or alliance of `combatant` is tracked
    pub fn tracks(&self, combatant: &Combatant) -> bool {
        [&combatant.guild_name, &combatant.alliance_name]
            .into_iter()
            .flatten()
            .any(|n| self.is_tracked(n))
    }
}

/// Why an item was not admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    AlreadySeen { id: u64, watermark: u64 },
    TooFewPlayers { players: usize, required: usize },
    TooFewRelevantPlayers { relevant: usize, required: usize },
    Untracked,
    LowFame { fame: u64, required: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::AlreadySeen { id, watermark } => {
                write!(f, "id {} not above watermark {}", id, watermark)
            }
            Rejection::TooFewPlayers { players, required } => {
                write!(f, "{} players (need {})", players, required)
            }
            Rejection::TooFewRelevantPlayers { relevant, required } => {
                write!(f, "{} tracked players (need {})", relevant, required)
            }
            Rejection::Untracked => write!(f, "neither side is tracked"),
            Rejection::LowFame { fame, required } => {
                write!(f, "fame {} below {}", fame, required)
            }
        }
    }
}

/// Players whose guild or alliance is tracked, each counted once
pub fn relevant_player_count(battle: &Battle, rules: &AdmissionRules) -> usize {
    battle
        .players
        .iter()
        .filter(|p| p.belongs_to_any(rules.tracked.iter().map(String::as_str)))
        .count()
}

pub fn admit_battle(
    battle: &Battle,
    watermark: u64,
    rules: &AdmissionRules,
) -> Result<(), Rejection> {
    if battle.id <= watermark {
        return Err(Rejection::AlreadySeen { id: battle.id, watermark });
    }

    if battle.players.len() < rules.min_battle_players {
        return Err(Rejection::TooFewPlayers {
            players: battle.players.len(),
            required: rules.min_battle_players,
        });
    }

    let relevant = relevant_player_count(battle, rules);
    if relevant < rules.min_relevant_players {
        return Err(Rejection::TooFewRelevantPlayers {
            relevant,
            required: rules.min_relevant_players,
        });
    }

    Ok(())
}

pub fn is_tracked_kill(event: &KillEvent, rules: &AdmissionRules) -> bool {
    rules.tracks(&event.killer) || rules.tracks(&event.victim)
}

pub fn admit_kill(
    event: &KillEvent,
    watermark: u64,
    rules: &AdmissionRules,
) -> Result<(), Rejection> {
    if event.event_id <= watermark {
        return Err(Rejection::AlreadySeen { id: event.event_id, watermark });
    }

    if !is_tracked_kill(event, rules) {
        return Err(Rejection::Untracked);
    }

    if event.total_fame < rules.min_kill_fame {
        return Err(Rejection::LowFame {
            fame: event.total_fame,
            required: rules.min_kill_fame,
        });
    }

    Ok(())
}
