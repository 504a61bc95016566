//! Upstream record types
//!
//! Wire shapes of the game info API. Battles arrive with their players keyed
//! by player id; events arrive with PascalCase fields and empty strings for
//! missing guilds/alliances. Both are normalised here so the rest of the crate
//! only sees `Option<String>` affiliations and an ordered player list.

use serde::de::{Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything carrying a monotonically increasing upstream identifier
pub trait Identified {
    fn id(&self) -> u64;
}

/// One player's participation in a battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPlayerRecord {
    pub name: String,
    #[serde(rename = "guildName", default, deserialize_with = "empty_as_none")]
    pub guild_name: Option<String>,
    #[serde(rename = "allianceName", default, deserialize_with = "empty_as_none")]
    pub alliance_name: Option<String>,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(rename = "killFame", default)]
    pub kill_fame: u64,
}

impl RawPlayerRecord {
    /// True if the player's guild or alliance is one of `names`
    pub fn belongs_to_any<'a, I>(&self, mut names: I) -> bool
    where
        I: Iterator<Item = &'a str>,
    {
        names.any(|n| {
            self.guild_name.as_deref() == Some(n) || self.alliance_name.as_deref() == Some(n)
        })
    }
}

/// Raw battle payload as returned by `/battles`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBattle {
    pub id: u64,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<String>,
    #[serde(rename = "totalFame", default)]
    pub total_fame: Option<u64>,
    #[serde(rename = "totalKills", default)]
    pub total_kills: Option<u32>,
    #[serde(default, deserialize_with = "players_in_order")]
    pub players: Vec<RawPlayerRecord>,
}

impl Identified for RawBattle {
    fn id(&self) -> u64 {
        self.id
    }
}

/// A single equipped item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "Type")]
    pub item_type: String,
    #[serde(rename = "Count", default = "one")]
    pub count: u32,
    #[serde(rename = "Quality", default)]
    pub quality: u8,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    #[serde(rename = "MainHand", default)]
    pub main_hand: Option<Item>,
    #[serde(rename = "OffHand", default)]
    pub off_hand: Option<Item>,
    #[serde(rename = "Head", default)]
    pub head: Option<Item>,
    #[serde(rename = "Armor", default)]
    pub armor: Option<Item>,
    #[serde(rename = "Shoes", default)]
    pub shoes: Option<Item>,
    #[serde(rename = "Mount", default)]
    pub mount: Option<Item>,
}

/// Killer, victim or group member of a kill event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "GuildName", default, deserialize_with = "empty_as_none")]
    pub guild_name: Option<String>,
    #[serde(rename = "AllianceName", default, deserialize_with = "empty_as_none")]
    pub alliance_name: Option<String>,
    #[serde(rename = "Equipment", default)]
    pub equipment: Equipment,
}

impl Combatant {
    /// `[Alliance] Guild`, or `N/A` for unguilded players
    pub fn guild_tag(&self) -> String {
        match &self.guild_name {
            Some(guild) => match &self.alliance_name {
                Some(alliance) => format!("[{}] {}", alliance, guild),
                None => guild.clone(),
            },
            None => "N/A".to_string(),
        }
    }

    /// `**<[Alliance]Guild>** Name` for log lines and message bodies
    pub fn display_name(&self) -> String {
        let alliance_tag = self
            .alliance_name
            .as_ref()
            .map(|a| format!("[{}]", a))
            .unwrap_or_default();
        format!(
            "**<{}{}>** {}",
            alliance_tag,
            self.guild_name.as_deref().unwrap_or("Unguilded"),
            self.name
        )
    }
}

/// A single kill as returned by `/events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillEvent {
    #[serde(rename = "EventId")]
    pub event_id: u64,
    #[serde(rename = "TimeStamp", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "TotalVictimKillFame", default)]
    pub total_fame: u64,
    #[serde(rename = "numberOfParticipants", default)]
    pub number_of_participants: Option<u32>,
    #[serde(rename = "GroupMembers", default)]
    pub group_members: Vec<Combatant>,
    #[serde(rename = "Killer")]
    pub killer: Combatant,
    #[serde(rename = "Victim")]
    pub victim: Combatant,
}

impl KillEvent {
    /// Players credited with the kill, including the killer
    pub fn participants(&self) -> u32 {
        let count = self
            .number_of_participants
            .unwrap_or(self.group_members.len() as u32);
        count.max(1)
    }

    pub fn assists(&self) -> u32 {
        self.participants() - 1
    }
}

impl Identified for KillEvent {
    fn id(&self) -> u64 {
        self.event_id
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Accepts players either as a list or as an id-keyed object, keeping
/// document order in both cases.
fn players_in_order<'de, D>(deserializer: D) -> Result<Vec<RawPlayerRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PlayersVisitor;

    impl<'de> Visitor<'de> for PlayersVisitor {
        type Value = Vec<RawPlayerRecord>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list or id-keyed map of players")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut players = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(player) = seq.next_element()? {
                players.push(player);
            }
            Ok(players)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut players = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((_id, player)) = map.next_entry::<String, RawPlayerRecord>()? {
                players.push(player);
            }
            Ok(players)
        }
    }

    deserializer.deserialize_any(PlayersVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battle_players_keep_document_order() {
        let json = r#"{
            "id": 42,
            "totalFame": 9000,
            "players": {
                "zz": {"name": "Zed", "guildName": "", "allianceName": "",
                       "kills": 1, "deaths": 0, "killFame": 100},
                "aa": {"name": "Amy", "guildName": "Wolves", "allianceName": "PACK",
                       "kills": 0, "deaths": 1, "killFame": 0}
            }
        }"#;

        let battle: RawBattle = serde_json::from_str(json).unwrap();
        assert_eq!(battle.id, 42);
        assert_eq!(battle.players.len(), 2);
        assert_eq!(battle.players[0].name, "Zed");
        assert_eq!(battle.players[0].guild_name, None);
        assert_eq!(battle.players[1].guild_name.as_deref(), Some("Wolves"));
        assert_eq!(battle.players[1].alliance_name.as_deref(), Some("PACK"));
    }

    #[test]
    fn test_kill_event_participants_fall_back_to_group() {
        let json = r#"{
            "EventId": 7,
            "TotalVictimKillFame": 12000,
            "Killer": {"Name": "A", "GuildName": "G", "AllianceName": "",
                       "Equipment": {"MainHand":
                           {"Type": "T8_MAIN_SWORD", "Count": 1, "Quality": 3}}},
            "Victim": {"Name": "B", "GuildName": "", "AllianceName": ""},
            "GroupMembers": [{"Name": "A"}, {"Name": "C"}, {"Name": "D"}]
        }"#;

        let event: KillEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.participants(), 3);
        assert_eq!(event.assists(), 2);
        assert_eq!(event.killer.equipment.main_hand.as_ref().unwrap().item_type, "T8_MAIN_SWORD");
        assert_eq!(event.victim.guild_tag(), "N/A");
    }

    #[test]
    fn test_display_name_and_guild_tag() {
        let c = Combatant {
            name: "Ana".to_string(),
            guild_name: Some("Wolves".to_string()),
            alliance_name: Some("PACK".to_string()),
            equipment: Equipment::default(),
        };
        assert_eq!(c.guild_tag(), "[PACK] Wolves");
        assert_eq!(c.display_name(), "**<[PACK]Wolves>** Ana");
    }
}
