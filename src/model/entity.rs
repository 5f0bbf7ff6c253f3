//! Records held in storage and the typed data decoded from upstream

use crate::model::key::{normalize_component, EntityKey, GroupKey};
use crate::state::EntityState;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// A manually assigned key annotation, cleared by the weekly reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingKey {
    /// Full dungeon name
    pub dungeon: String,
    pub level: u32,
}

/// One completed run as reported upstream
#[derive(Debug, Clone, PartialEq)]
pub struct RunData {
    pub dungeon: String,
    pub level: u32,
    /// Upstream reference to the run; the run id is parsed out of it
    pub url: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Orders runs highest level first, most recent completion first on ties
pub fn sort_runs(runs: &mut [RunData]) {
    runs.sort_by(|a, b| {
        b.level
            .cmp(&a.level)
            .then_with(|| match (&a.completed_at, &b.completed_at) {
                (Some(x), Some(y)) => y.cmp(x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
}

/// A character profile decoded and validated at the fetch boundary
#[derive(Debug, Clone, PartialEq)]
pub struct EntityData {
    pub key: EntityKey,
    /// Name as spelled upstream
    pub display_name: String,
    /// Guild the character belongs to, if any
    pub group: Option<GroupKey>,
    pub class: String,
    pub item_level: f64,
    pub score: f64,
    pub rank_overall: Option<i64>,
    pub rank_class: Option<i64>,
    /// This week's runs, sorted with [`sort_runs`]
    pub weekly_runs: Vec<RunData>,
    /// Last week's runs, sorted with [`sort_runs`]
    pub previous_weekly_runs: Vec<RunData>,
}

impl EntityData {
    /// Highest level completed this week, 0 when nothing was run
    pub fn weekly_high(&self) -> u32 {
        self.weekly_runs.first().map(|r| r.level).unwrap_or(0)
    }

    /// Highest level completed last week, 0 when nothing was run
    pub fn previous_weekly_high(&self) -> u32 {
        self.previous_weekly_runs
            .first()
            .map(|r| r.level)
            .unwrap_or(0)
    }
}

/// A member entry of a fetched roster, already filtered for eligibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMember {
    pub name: String,
    /// Realm slug of the member
    pub realm: String,
    pub rank: u32,
}

/// A tracked entity as stored locally
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    pub key: EntityKey,
    pub display_name: String,
    /// Normalized group name, empty when the entity has no group
    pub group_name: String,
    /// Normalized realm of the group
    pub group_realm: String,
    pub group_rank: Option<u32>,
    pub class: String,
    pub item_level: f64,
    pub score: f64,
    pub rank_overall: Option<i64>,
    pub rank_class: Option<i64>,
    pub weekly_high: u32,
    pub previous_weekly_high: u32,
    pub pending_key: Option<PendingKey>,
    pub state: EntityState,
    pub last_synced: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrackedEntity {
    /// Creates a record from a first successful fetch
    pub fn from_data(data: &EntityData, rank: Option<u32>, now: DateTime<Utc>) -> Self {
        let mut entity = Self {
            key: data.key.clone(),
            display_name: data.display_name.clone(),
            group_name: String::new(),
            group_realm: String::new(),
            group_rank: None,
            class: String::new(),
            item_level: 0.0,
            score: 0.0,
            rank_overall: None,
            rank_class: None,
            weekly_high: 0,
            previous_weekly_high: 0,
            pending_key: None,
            state: EntityState::Tracked,
            last_synced: now,
            last_error: None,
            created_at: now,
        };
        entity.apply(data, rank, now);
        entity
    }

    /// Overwrites every mutable field from freshly fetched data
    ///
    /// An explicit `rank` always wins. Without one the stored rank is kept,
    /// unless the entity changed group, in which case it no longer applies.
    pub fn apply(&mut self, data: &EntityData, rank: Option<u32>, now: DateTime<Utc>) {
        let (group_name, group_realm) = match &data.group {
            Some(group) => (group.name.clone(), group.realm.clone()),
            None => (String::new(), String::new()),
        };
        let group_changed = group_name != self.group_name || group_realm != self.group_realm;

        self.group_rank = match rank {
            Some(rank) => Some(rank),
            None if group_changed => None,
            None => self.group_rank,
        };
        self.group_name = group_name;
        self.group_realm = group_realm;
        self.display_name = data.display_name.clone();
        self.class = data.class.clone();
        self.item_level = data.item_level;
        self.score = data.score;
        self.rank_overall = data.rank_overall;
        self.rank_class = data.rank_class;
        self.weekly_high = data.weekly_high();
        self.previous_weekly_high = data.previous_weekly_high();
        self.state = EntityState::Tracked;
        self.last_synced = now;
        self.last_error = None;
    }

    /// The group this entity belongs to, if any
    pub fn group(&self) -> Option<GroupKey> {
        if self.group_name.is_empty() {
            return None;
        }
        Some(GroupKey {
            name: self.group_name.clone(),
            realm: self.group_realm.clone(),
            region: self.key.region.clone(),
        })
    }
}

/// One observed unit of weekly activity, unique per (run id, entity name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyRun {
    pub run_id: String,
    pub entity_name: String,
    pub dungeon: String,
    pub level: u32,
    pub observed_at: DateTime<Utc>,
}

impl WeeklyRun {
    pub fn new(run_id: &str, entity_name: &str, dungeon: &str, level: u32) -> Self {
        Self {
            run_id: run_id.to_string(),
            entity_name: normalize_component(entity_name),
            dungeon: dungeon.to_string(),
            level,
            observed_at: Utc::now(),
        }
    }
}

/// Per chat room default group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDefaults {
    pub room_id: String,
    pub room_name: String,
    pub group: GroupKey,
    pub updated_at: DateTime<Utc>,
}
