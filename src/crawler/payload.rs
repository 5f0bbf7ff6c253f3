//! Upstream response bodies
//!
//! Raw payloads are deserialized with serde and converted exactly once into the
//! typed model. Anything the sync contract needs but the body lacks is rejected
//! here, so downstream code never sees a half-decoded profile.

use crate::model::{sort_runs, EntityData, EntityKey, GroupKey, RosterMember, RunData};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Why a body could not be turned into typed data
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("missing field '{0}'")]
    Missing(&'static str),

    #[error("invalid field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct ProfilePayload {
    pub name: String,
    pub realm: String,
    pub region: String,
    pub class: Option<String>,
    pub guild: Option<GuildPayload>,
    pub gear: Option<GearPayload>,
    #[serde(default)]
    pub mythic_plus_scores_by_season: Vec<SeasonScoresPayload>,
    pub mythic_plus_ranks: Option<RanksPayload>,
    #[serde(default)]
    pub mythic_plus_weekly_highest_level_runs: Vec<RunPayload>,
    #[serde(default)]
    pub mythic_plus_previous_weekly_highest_level_runs: Vec<RunPayload>,
}

#[derive(Debug, Deserialize)]
pub struct GuildPayload {
    pub name: String,
    pub realm: String,
}

#[derive(Debug, Deserialize)]
pub struct GearPayload {
    pub item_level_equipped: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SeasonScoresPayload {
    pub scores: ScoresPayload,
}

#[derive(Debug, Deserialize)]
pub struct ScoresPayload {
    pub all: f64,
}

#[derive(Debug, Deserialize)]
pub struct RanksPayload {
    pub overall: Option<RankPayload>,
    pub class: Option<RankPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RankPayload {
    pub realm: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RunPayload {
    pub dungeon: String,
    pub mythic_level: u32,
    pub url: String,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<RunPayload> for RunData {
    fn from(run: RunPayload) -> Self {
        RunData {
            dungeon: run.dungeon,
            level: run.mythic_level,
            url: run.url,
            completed_at: run.completed_at,
        }
    }
}

fn into_sorted_runs(runs: Vec<RunPayload>) -> Vec<RunData> {
    let mut runs: Vec<RunData> = runs.into_iter().map(RunData::from).collect();
    sort_runs(&mut runs);
    runs
}

impl TryFrom<ProfilePayload> for EntityData {
    type Error = PayloadError;

    fn try_from(payload: ProfilePayload) -> Result<Self, Self::Error> {
        if payload.name.trim().is_empty() {
            return Err(PayloadError::Missing("name"));
        }
        if payload.realm.trim().is_empty() {
            return Err(PayloadError::Missing("realm"));
        }

        let class = payload.class.ok_or(PayloadError::Missing("class"))?;
        let item_level = payload
            .gear
            .and_then(|g| g.item_level_equipped)
            .ok_or(PayloadError::Missing("gear.item_level_equipped"))?;
        let score = payload
            .mythic_plus_scores_by_season
            .first()
            .map(|season| season.scores.all)
            .ok_or(PayloadError::Missing("mythic_plus_scores_by_season"))?;

        if !item_level.is_finite() || !score.is_finite() {
            return Err(PayloadError::Invalid {
                field: "scores",
                reason: "not a finite number".to_string(),
            });
        }

        let (rank_overall, rank_class) = match payload.mythic_plus_ranks {
            Some(ranks) => (
                ranks.overall.and_then(|r| r.realm),
                ranks.class.and_then(|r| r.realm),
            ),
            None => (None, None),
        };

        let group = payload
            .guild
            .filter(|g| !g.name.trim().is_empty())
            .map(|g| GroupKey::new(&g.name, &g.realm, &payload.region));

        Ok(EntityData {
            key: EntityKey::new(&payload.name, &payload.realm, &payload.region),
            display_name: payload.name,
            group,
            class: class.to_lowercase(),
            item_level,
            score,
            rank_overall,
            rank_class,
            weekly_runs: into_sorted_runs(payload.mythic_plus_weekly_highest_level_runs),
            previous_weekly_runs: into_sorted_runs(
                payload.mythic_plus_previous_weekly_highest_level_runs,
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RosterPayload {
    #[serde(default)]
    pub members: Vec<RosterEntryPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RosterEntryPayload {
    pub character: RosterCharacterPayload,
    pub rank: u32,
}

#[derive(Debug, Deserialize)]
pub struct RosterCharacterPayload {
    pub name: String,
    pub level: u32,
    pub realm: Option<RealmPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RealmPayload {
    pub slug: Option<String>,
}

impl RosterPayload {
    /// Members within the level bounds that carry a realm
    pub fn into_members(self, min_level: u32, max_level: u32) -> Vec<RosterMember> {
        self.members
            .into_iter()
            .filter(|m| m.character.level >= min_level && m.character.level <= max_level)
            .filter_map(|m| {
                let realm = m.character.realm.and_then(|r| r.slug)?;
                if realm.is_empty() {
                    return None;
                }
                Some(RosterMember {
                    name: m.character.name,
                    realm,
                    rank: m.rank,
                })
            })
            .collect()
    }
}

/// Error body some endpoints send with a 400
#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    pub message: Option<String>,
}

impl ErrorPayload {
    /// True when the message says the requested record does not exist
    pub fn reports_not_found(&self) -> bool {
        self.message
            .as_deref()
            .map(|m| {
                let m = m.to_lowercase();
                m.contains("could not find") || m.contains("not found")
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "name": "Allikazam",
        "class": "Mage",
        "region": "us",
        "realm": "Wyrmrest Accord",
        "guild": { "name": "Felforged", "realm": "Wyrmrest Accord" },
        "gear": { "item_level_equipped": 483.4 },
        "mythic_plus_scores_by_season": [ { "season": "current", "scores": { "all": 2750.3 } } ],
        "mythic_plus_ranks": { "overall": { "realm": 12 }, "class": { "realm": 3 } },
        "mythic_plus_weekly_highest_level_runs": [
            { "dungeon": "Underrot", "mythic_level": 16, "url": "https://raider.io/runs/season-3/111-16-underrot", "completed_at": "2024-03-06T10:00:00.000Z" },
            { "dungeon": "Freehold", "mythic_level": 18, "url": "https://raider.io/runs/season-3/222-18-freehold", "completed_at": "2024-03-05T10:00:00.000Z" }
        ],
        "mythic_plus_previous_weekly_highest_level_runs": []
    }"#;

    fn decode(body: &str) -> Result<EntityData, PayloadError> {
        let payload: ProfilePayload = serde_json::from_str(body).unwrap();
        EntityData::try_from(payload)
    }

    #[test]
    fn test_profile_decodes() {
        let data = decode(PROFILE).unwrap();

        assert_eq!(data.key, EntityKey::new("allikazam", "wyrmrest-accord", "us"));
        assert_eq!(data.display_name, "Allikazam");
        assert_eq!(
            data.group,
            Some(GroupKey::new("felforged", "wyrmrest-accord", "us"))
        );
        assert_eq!(data.class, "mage");
        assert_eq!(data.rank_overall, Some(12));
        assert_eq!(data.rank_class, Some(3));
    }

    #[test]
    fn test_weekly_runs_are_sorted_before_taking_head() {
        let data = decode(PROFILE).unwrap();

        assert_eq!(data.weekly_runs[0].dungeon, "Freehold");
        assert_eq!(data.weekly_high(), 18);
        assert_eq!(data.previous_weekly_high(), 0);
    }

    #[test]
    fn test_missing_season_score_is_rejected() {
        let body = PROFILE.replace(
            r#"[ { "season": "current", "scores": { "all": 2750.3 } } ]"#,
            "[]",
        );
        assert_eq!(
            decode(&body),
            Err(PayloadError::Missing("mythic_plus_scores_by_season"))
        );
    }

    #[test]
    fn test_missing_gear_is_rejected() {
        let body = PROFILE.replace(r#""gear": { "item_level_equipped": 483.4 },"#, "");
        assert_eq!(
            decode(&body),
            Err(PayloadError::Missing("gear.item_level_equipped"))
        );
    }

    #[test]
    fn test_no_guild_means_no_group() {
        let body = PROFILE.replace(
            r#""guild": { "name": "Felforged", "realm": "Wyrmrest Accord" },"#,
            r#""guild": null,"#,
        );
        assert!(decode(&body).unwrap().group.is_none());
    }

    #[test]
    fn test_roster_filters_level_and_realm() {
        let body = r#"{ "members": [
            { "character": { "name": "Alpha", "level": 80, "realm": { "slug": "wyrmrest-accord" } }, "rank": 0 },
            { "character": { "name": "Lowbie", "level": 42, "realm": { "slug": "wyrmrest-accord" } }, "rank": 9 },
            { "character": { "name": "Ghost", "level": 80 }, "rank": 4 },
            { "character": { "name": "Beta", "level": 80, "realm": { "slug": "area-52" } }, "rank": 3 }
        ] }"#;
        let payload: RosterPayload = serde_json::from_str(body).unwrap();
        let members = payload.into_members(80, 80);

        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert_eq!(members[1].rank, 3);
    }

    #[test]
    fn test_error_payload_not_found() {
        let found: ErrorPayload =
            serde_json::from_str(r#"{ "message": "Could not find requested character" }"#)
                .unwrap();
        let other: ErrorPayload =
            serde_json::from_str(r#"{ "message": "Invalid region" }"#).unwrap();

        assert!(found.reports_not_found());
        assert!(!other.reports_not_found());
    }
}
