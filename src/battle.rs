//! Battle aggregation
//!
//! Turns a flat `RawBattle` player list into a `Battle`: guild summaries,
//! factions at a single grouping granularity, and a fame ranking.
//!
//! ## Grouping
//!
//! ```text
//! any player with an alliance  → factions are alliances
//! else any player with a guild → factions are guilds
//! else                         → every player is a faction
//! ```
//!
//! Players lacking the battle's grouping key fall back to the next level
//! (guild, then their own name) so the faction partition stays total.
//!
//! ## Ranking
//!
//! Factions are ordered by aggregate kill fame, descending. Equal fame keeps
//! the order in which each faction's first player appeared in the payload.

use crate::model::{RawBattle, RawPlayerRecord};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Raised for a battle payload without players
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("battle {battle_id} has no players")]
pub struct EmptyBattleError {
    pub battle_id: u64,
}

/// Granularity that induced a faction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactionKind {
    Alliance,
    Guild,
    Player,
}

/// One side of a battle with its aggregate stats
#[derive(Debug, Clone, PartialEq)]
pub struct Faction {
    pub name: String,
    pub kind: FactionKind,
    pub players: Vec<RawPlayerRecord>,
    pub kills: u32,
    pub deaths: u32,
    pub kill_fame: u64,
    /// Input index of the faction's first player
    first_seen: usize,
}

impl Faction {
    fn new(name: String, kind: FactionKind, first_seen: usize) -> Self {
        Self {
            name,
            kind,
            players: Vec::new(),
            kills: 0,
            deaths: 0,
            kill_fame: 0,
            first_seen,
        }
    }

    fn add(&mut self, player: &RawPlayerRecord) {
        self.kills += player.kills;
        self.deaths += player.deaths;
        self.kill_fame += player.kill_fame;
        self.players.push(player.clone());
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

/// Fame descending, then first appearance ascending. Total over any set of
/// factions built from one battle since `first_seen` is unique per faction.
fn rank_order(a: &Faction, b: &Faction) -> Ordering {
    b.kill_fame
        .cmp(&a.kill_fame)
        .then_with(|| a.first_seen.cmp(&b.first_seen))
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildSummary {
    pub name: String,
    pub alliance: Option<String>,
    pub players: Vec<RawPlayerRecord>,
}

/// Aggregated battle, immutable once built
#[derive(Debug, Clone)]
pub struct Battle {
    pub id: u64,
    pub players: Vec<RawPlayerRecord>,
    pub guilds: BTreeMap<String, GuildSummary>,
    pub total_kills: u32,
    pub total_fame: u64,
    ranked_factions: Vec<Faction>,
    is_5v5: bool,
}

impl Battle {
    /// Aggregate a raw payload
    ///
    /// # Errors
    /// * `EmptyBattleError` - payload has no players
    pub fn from_raw(raw: RawBattle) -> Result<Self, EmptyBattleError> {
        if raw.players.is_empty() {
            return Err(EmptyBattleError { battle_id: raw.id });
        }

        let granularity = grouping_granularity(&raw.players);
        let mut ranked_factions = build_factions(&raw.players, granularity);
        ranked_factions.sort_by(rank_order);

        let guilds = build_guilds(&raw.players);

        let is_5v5 = ranked_factions.len() == 2
            && ranked_factions.iter().all(|f| f.player_count() == 5)
            && raw.players.len() == 10;

        let total_kills = raw
            .total_kills
            .unwrap_or_else(|| raw.players.iter().map(|p| p.kills).sum());
        let total_fame = raw
            .total_fame
            .unwrap_or_else(|| raw.players.iter().map(|p| p.kill_fame).sum());

        Ok(Self {
            id: raw.id,
            players: raw.players,
            guilds,
            total_kills,
            total_fame,
            ranked_factions,
            is_5v5,
        })
    }

    /// Factions in ranking order
    pub fn ranked_factions(&self) -> &[Faction] {
        &self.ranked_factions
    }

    /// Factions in order of first appearance
    pub fn factions(&self) -> Vec<&Faction> {
        let mut factions: Vec<&Faction> = self.ranked_factions.iter().collect();
        factions.sort_by_key(|f| f.first_seen);
        factions
    }

    pub fn is_5v5(&self) -> bool {
        self.is_5v5
    }

    pub fn guild(&self, name: &str) -> Option<&GuildSummary> {
        self.guilds.get(name)
    }

    /// Guilds fighting under `alliance`, largest first
    pub fn guilds_in_alliance(&self, alliance: &str) -> Vec<&GuildSummary> {
        let mut guilds: Vec<&GuildSummary> = self
            .guilds
            .values()
            .filter(|g| g.alliance.as_deref() == Some(alliance))
            .collect();
        guilds.sort_by(|a, b| b.players.len().cmp(&a.players.len()));
        guilds
    }
}

impl TryFrom<RawBattle> for Battle {
    type Error = EmptyBattleError;

    fn try_from(raw: RawBattle) -> Result<Self, Self::Error> {
        Battle::from_raw(raw)
    }
}

fn grouping_granularity(players: &[RawPlayerRecord]) -> FactionKind {
    if players.iter().any(|p| p.alliance_name.is_some()) {
        FactionKind::Alliance
    } else if players.iter().any(|p| p.guild_name.is_some()) {
        FactionKind::Guild
    } else {
        FactionKind::Player
    }
}

fn faction_key(player: &RawPlayerRecord, granularity: FactionKind) -> (FactionKind, String) {
    if granularity == FactionKind::Alliance {
        if let Some(alliance) = &player.alliance_name {
            return (FactionKind::Alliance, alliance.clone());
        }
    }
    if granularity != FactionKind::Player {
        if let Some(guild) = &player.guild_name {
            return (FactionKind::Guild, guild.clone());
        }
    }
    (FactionKind::Player, player.name.clone())
}

fn build_factions(players: &[RawPlayerRecord], granularity: FactionKind) -> Vec<Faction> {
    let mut index: HashMap<(FactionKind, String), usize> = HashMap::new();
    let mut factions: Vec<Faction> = Vec::new();

    for (position, player) in players.iter().enumerate() {
        let key = faction_key(player, granularity);
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                factions.push(Faction::new(key.1.clone(), key.0, position));
                index.insert(key, factions.len() - 1);
                factions.len() - 1
            }
        };
        factions[slot].add(player);
    }

    factions
}

fn build_guilds(players: &[RawPlayerRecord]) -> BTreeMap<String, GuildSummary> {
    let mut guilds: BTreeMap<String, GuildSummary> = BTreeMap::new();

    for player in players {
        let Some(guild_name) = &player.guild_name else {
            continue;
        };
        let summary = guilds
            .entry(guild_name.clone())
            .or_insert_with(|| GuildSummary {
                name: guild_name.clone(),
                alliance: player.alliance_name.clone(),
                players: Vec::new(),
            });
        if summary.alliance.is_none() {
            summary.alliance = player.alliance_name.clone();
        }
        summary.players.push(player.clone());
    }

    guilds
}
