//! Report renderers
//!
//! One renderer per `ReportKind`. Renderers are pure: the footer timestamp is
//! passed in so output is reproducible.

use super::{classify_battle, classify_kill, BattleReport, KillReport, ReportKind, ReportStyle};
use crate::battle::{Battle, FactionKind};
use crate::model::{Item, KillEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const COLOR_WIN: u32 = 65280;
pub const COLOR_LOSS: u32 = 16711680;

const FOOTER_ICON_URL: &str = "https://i.imgur.com/4F09qpA.png";
const SPACER_URL: &str = "https://storage.googleapis.com/albion-images/static/spacer.png";
const BATTLE_URL: &str = "https://albiononline.com/en/killboard/battles";
const KILL_URL: &str = "https://albiononline.com/en/killboard/kill";
const ITEM_RENDER_URL: &str = "https://render.albiononline.com/v1/item";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

/// Chat message embed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// `1234567` → `1,234,567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn footer(label: &str, at: DateTime<Utc>) -> EmbedFooter {
    EmbedFooter {
        text: format!("{} | {}", label, at.format("%A, %-d %B %Y %H:%M UTC")),
        icon_url: FOOTER_ICON_URL.to_string(),
    }
}

pub fn item_render_url(item: &Item) -> String {
    format!(
        "{}/{}.png?count={}&quality={}",
        ITEM_RENDER_URL, item.item_type, item.count, item.quality
    )
}

fn battle_thumbnail(battle: &Battle) -> &'static str {
    let players = battle.players.len();
    if players >= 100 {
        "https://storage.googleapis.com/albion-images/static/PvP-100.png"
    } else if players >= 40 {
        "https://storage.googleapis.com/albion-images/static/PvP-40.png"
    } else if battle.is_5v5() {
        "https://storage.googleapis.com/albion-images/static/5v5-3.png"
    } else {
        "https://storage.googleapis.com/albion-images/static/PvP-10.png"
    }
}

/// Top-ranked faction is the tracked alliance
fn did_win(battle: &Battle, style: &ReportStyle) -> bool {
    match (battle.ranked_factions().first(), &style.tracked_alliance) {
        (Some(top), Some(alliance)) => &top.name == alliance,
        _ => false,
    }
}

/// `Name(count) vs Name(count)`, largest side first
pub fn battle_title(battle: &Battle) -> String {
    let mut sides: Vec<_> = battle.ranked_factions().iter().collect();
    sides.sort_by(|a, b| b.player_count().cmp(&a.player_count()));
    sides
        .iter()
        .map(|f| format!("{}({})", f.name, f.player_count()))
        .collect::<Vec<_>>()
        .join(" vs ")
}

pub fn render_war_report(battle: &Battle, style: &ReportStyle, at: DateTime<Utc>) -> Embed {
    let fields = battle
        .ranked_factions()
        .iter()
        .enumerate()
        .map(|(i, faction)| {
            let mut lines = vec![
                format!("Kills: {}", faction.kills),
                format!("Deaths: {}", faction.deaths),
            ];
            if faction.kind == FactionKind::Alliance {
                lines.push("\n__**Guilds**__".to_string());
                lines.extend(
                    battle
                        .guilds_in_alliance(&faction.name)
                        .iter()
                        .map(|g| format!("{} ({})", g.name, g.players.len())),
                );
            }
            EmbedField {
                name: format!(
                    "{}. {} - {} Fame",
                    i + 1,
                    faction.name,
                    group_thousands(faction.kill_fame)
                ),
                value: lines.join("\n"),
                inline: true,
            }
        })
        .collect();

    Embed {
        title: battle_title(battle),
        description: format!(
            "Players: {}, Kills: {}, Fame: {}",
            battle.players.len(),
            battle.total_kills,
            group_thousands(battle.total_fame)
        ),
        url: format!("{}/{}", BATTLE_URL, battle.id),
        color: if did_win(battle, style) { COLOR_WIN } else { COLOR_LOSS },
        footer: footer("Battleboard", at),
        thumbnail: Some(EmbedImage {
            url: battle_thumbnail(battle).to_string(),
        }),
        image: Some(EmbedImage {
            url: SPACER_URL.to_string(),
        }),
        fields,
    }
}

pub fn render_5v5_report(battle: &Battle, style: &ReportStyle, at: DateTime<Utc>) -> Embed {
    let ranked = battle.ranked_factions();
    let won = did_win(battle, style);

    let fields = ranked
        .iter()
        .map(|faction| {
            let mut players: Vec<_> = faction.players.iter().collect();
            players.sort_by(|a, b| {
                b.kills
                    .cmp(&a.kills)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            });
            let value = players
                .iter()
                .map(|p| {
                    let strike = if p.deaths > 0 { "~~" } else { "" };
                    format!("{}{}{}: {} Kills", strike, p.name, strike, p.kills)
                })
                .collect::<Vec<_>>()
                .join("\n");
            EmbedField {
                name: format!("{} [Kills: {}]", faction.name, faction.kills),
                value,
                inline: true,
            }
        })
        .collect();

    let winner = ranked.first().map(|f| f.name.as_str()).unwrap_or_default();
    let loser = ranked.get(1).map(|f| f.name.as_str()).unwrap_or_default();
    let title = if won {
        format!("We wrecked {} in a 5v5!", loser)
    } else {
        format!("We lost to {} in a 5v5!", winner)
    };

    Embed {
        title,
        description: format!(
            "Winner's Fame: {}",
            group_thousands(ranked.first().map(|f| f.kill_fame).unwrap_or(0))
        ),
        url: format!("{}/{}", BATTLE_URL, battle.id),
        color: if won { COLOR_WIN } else { COLOR_LOSS },
        footer: footer("Battleboard", at),
        thumbnail: Some(EmbedImage {
            url: battle_thumbnail(battle).to_string(),
        }),
        image: Some(EmbedImage {
            url: SPACER_URL.to_string(),
        }),
        fields,
    }
}

pub fn render_minimal_kill(event: &KillEvent, style: &ReportStyle, at: DateTime<Utc>) -> Embed {
    let friendly = style.is_friendly(&event.killer);
    let assists = event.assists();
    let other = if friendly { &event.victim } else { &event.killer };
    let assist_tag = if assists > 0 {
        format!("+{}", assists)
    } else {
        "Solo!".to_string()
    };

    Embed {
        title: format!("{} ({}) just killed {}!", event.killer.name, assist_tag, event.victim.name),
        description: format!("From guild: {}", other.guild_tag()),
        url: format!("{}/{}", KILL_URL, event.event_id),
        color: if friendly { COLOR_WIN } else { COLOR_LOSS },
        footer: footer("Killboard", at),
        thumbnail: None,
        image: None,
        fields: Vec::new(),
    }
}

pub fn render_notable_kill(event: &KillEvent, style: &ReportStyle, at: DateTime<Utc>) -> Embed {
    let friendly = style.is_friendly(&event.killer);
    let assists = event.assists();
    let other = if friendly { &event.victim } else { &event.killer };

    let description = match assists {
        0 => "Solo kill!".to_string(),
        1 => "Assisted by 1 other player.".to_string(),
        n => format!("Assisted by {} other players.", n),
    };

    Embed {
        title: format!("{} just killed {}!", event.killer.name, event.victim.name),
        description,
        url: format!("{}/{}", KILL_URL, event.event_id),
        color: if friendly { COLOR_WIN } else { COLOR_LOSS },
        footer: footer("Killboard", at),
        thumbnail: event
            .killer
            .equipment
            .main_hand
            .as_ref()
            .map(|item| EmbedImage { url: item_render_url(item) }),
        image: None,
        fields: vec![EmbedField {
            name: if friendly { "Victim's Guild" } else { "Killer's Guild" }.to_string(),
            value: other.guild_tag(),
            inline: true,
        }],
    }
}

/// Classify and render a battle
pub fn render_battle(
    battle: &Battle,
    style: &ReportStyle,
    at: DateTime<Utc>,
) -> (ReportKind, Embed) {
    let report = classify_battle(battle);
    let embed = match report {
        BattleReport::Standard => render_war_report(battle, style, at),
        BattleReport::FiveVFive => render_5v5_report(battle, style, at),
    };
    (report.into(), embed)
}

/// Classify and render a kill
pub fn render_kill(
    event: &KillEvent,
    style: &ReportStyle,
    at: DateTime<Utc>,
) -> (ReportKind, Embed) {
    let report = classify_kill(event, style.notable_kill_fame);
    let embed = match report {
        KillReport::Minimal => render_minimal_kill(event, style, at),
        KillReport::Notable => render_notable_kill(event, style, at),
    };
    (report.into(), embed)
}
