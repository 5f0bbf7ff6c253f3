//! Integration tests for the sync engine
//!
//! These tests use wiremock to stand in for the credential, profile and
//! roster endpoints and drive the engine end-to-end against in-memory SQLite.

use chrono::{Duration, Utc};
use roster_sync::config::Config;
use roster_sync::crawler::Engine;
use roster_sync::model::{EntityData, TrackedEntity};
use roster_sync::storage::{lock_storage, SqliteStorage, Storage, ACCESS_TOKEN_SETTING};
use roster_sync::sync::{MissOutcome, RefreshOutcome, SyncOutcome};
use roster_sync::{EntityKey, EntityState, GroupKey};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROSTER_PATH: &str = "/data/wow/guild/wyrmrest-accord/felforged/roster";

/// Creates a configuration pointing every endpoint at the mock server
fn create_test_config(base_url: &str, groups: &str) -> Config {
    let content = format!(
        r#"
[auth]
client-id = "test-client"
client-secret = "test-secret"
token-url = "{base}/token"
validate-url = "{base}/validate"
retry-backoff-secs = 0
max-attempts = 1

[upstream]
profile-url = "{base}"
roster-url = "{base}"

[user-agent]
bot-name = "TestBot"
bot-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[storage]
database-path = ":memory:"

{groups}
"#,
        base = base_url,
        groups = groups
    );
    toml::from_str(&content).expect("test config should parse")
}

fn create_engine(server: &MockServer, groups: &str) -> Engine<SqliteStorage> {
    let config = create_test_config(&server.uri(), groups);
    let storage = SqliteStorage::new_in_memory().expect("in-memory storage");
    Engine::with_storage(config, "test-hash".to_string(), storage).expect("engine should build")
}

fn profile_json(name: &str, guild: Option<&str>, runs: &[(u64, &str, u32)]) -> Value {
    let runs: Vec<Value> = runs
        .iter()
        .map(|(id, dungeon, level)| {
            json!({
                "dungeon": dungeon,
                "mythic_level": level,
                "url": format!(
                    "https://raider.example.com/mythic-plus-runs/season-tww-1/{}-{}-{}",
                    id,
                    level,
                    dungeon.to_lowercase().replace(' ', "-")
                ),
                "completed_at": "2024-03-04T20:15:00Z"
            })
        })
        .collect();

    json!({
        "name": name,
        "realm": "Wyrmrest Accord",
        "region": "us",
        "class": "Mage",
        "guild": guild.map(|g| json!({ "name": g, "realm": "Wyrmrest Accord" })),
        "gear": { "item_level_equipped": 489.5 },
        "mythic_plus_scores_by_season": [{ "scores": { "all": 2875.4 } }],
        "mythic_plus_ranks": {
            "overall": { "realm": 42 },
            "class": { "realm": 7 }
        },
        "mythic_plus_weekly_highest_level_runs": runs,
        "mythic_plus_previous_weekly_highest_level_runs": []
    })
}

async fn mount_token(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 86399
        })))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_validate(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, name: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/characters/profile"))
        .and(query_param("name", name.to_lowercase()))
        .respond_with(response)
        .mount(server)
        .await;
}

fn seed_entity(engine: &Engine<SqliteStorage>, name: &str, last_synced_days_ago: i64) -> EntityKey {
    let data = EntityData {
        key: EntityKey::new(name, "Wyrmrest Accord", "us"),
        display_name: name.to_string(),
        group: None,
        class: "warrior".to_string(),
        item_level: 470.0,
        score: 1500.0,
        rank_overall: None,
        rank_class: None,
        weekly_runs: vec![],
        previous_weekly_runs: vec![],
    };
    let entity = TrackedEntity::from_data(
        &data,
        None,
        Utc::now() - Duration::days(last_synced_days_ago),
    );

    lock_storage(&engine.storage)
        .unwrap()
        .save_entity(&entity, &[])
        .unwrap();
    entity.key
}

#[tokio::test]
async fn test_token_is_requested_once_then_reused() {
    let server = MockServer::start().await;

    mount_token(&server, "tok-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/validate"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/characters/profile"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json("Allikazam", None, &[])))
        .expect(3)
        .mount(&server)
        .await;

    let engine = create_engine(&server, "");
    let key = EntityKey::new("Allikazam", "Wyrmrest Accord", "us");

    for _ in 0..3 {
        let outcome = engine.synchronizer.refresh_entity(&key, None).await;
        assert!(matches!(outcome, RefreshOutcome::Synced(_)));
    }

    let stored = lock_storage(&engine.storage)
        .unwrap()
        .get_setting(ACCESS_TOKEN_SETTING)
        .unwrap();
    assert_eq!(stored.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn test_stored_token_survives_restart() {
    let server = MockServer::start().await;

    mount_token(&server, "never-used", 0).await;
    mount_validate(&server, 200).await;
    mount_profile(
        &server,
        "Allikazam",
        ResponseTemplate::new(200).set_body_json(profile_json("Allikazam", None, &[])),
    )
    .await;

    let engine = create_engine(&server, "");
    lock_storage(&engine.storage)
        .unwrap()
        .put_setting(ACCESS_TOKEN_SETTING, "persisted-token")
        .unwrap();

    let key = EntityKey::new("Allikazam", "Wyrmrest Accord", "us");
    let outcome = engine.synchronizer.refresh_entity(&key, None).await;
    assert!(matches!(outcome, RefreshOutcome::Synced(SyncOutcome::Created { .. })));
}

#[tokio::test]
async fn test_crawl_group_syncs_eligible_members() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    mount_validate(&server, 200).await;

    Mock::given(method("GET"))
        .and(path(ROSTER_PATH))
        .and(query_param("namespace", "profile-us"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "members": [
                { "character": { "name": "Allikazam", "level": 80, "realm": { "slug": "wyrmrest-accord" } }, "rank": 0 },
                { "character": { "name": "Brightwing", "level": 80, "realm": { "slug": "wyrmrest-accord" } }, "rank": 3 },
                { "character": { "name": "Lowbie", "level": 70, "realm": { "slug": "wyrmrest-accord" } }, "rank": 5 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_profile(
        &server,
        "Allikazam",
        ResponseTemplate::new(200).set_body_json(profile_json(
            "Allikazam",
            Some("Felforged"),
            &[(1001, "Freehold", 18), (1002, "The Underrot", 20)],
        )),
    )
    .await;
    mount_profile(
        &server,
        "Brightwing",
        ResponseTemplate::new(200).set_body_json(profile_json(
            "Brightwing",
            Some("Felforged"),
            &[(1001, "Freehold", 18)],
        )),
    )
    .await;

    let engine = create_engine(&server, "");
    let group = GroupKey::new("Felforged", "Wyrmrest Accord", "us");

    let batch = engine
        .coordinator
        .crawl_group(&group)
        .await
        .expect("roster should be fetched");

    assert_eq!(batch.created, 2);
    assert_eq!(batch.failed, 0);
    assert_eq!(batch.runs_logged, 3);

    let storage = lock_storage(&engine.storage).unwrap();
    let leader = storage
        .get_entity(&EntityKey::new("Allikazam", "wyrmrest-accord", "us"))
        .unwrap()
        .expect("leader should be tracked");
    assert_eq!(leader.group_rank, Some(0));
    assert_eq!(leader.weekly_high, 20);
    assert_eq!(leader.group(), Some(group.clone()));

    assert!(storage
        .get_entity(&EntityKey::new("Lowbie", "wyrmrest-accord", "us"))
        .unwrap()
        .is_none());
    assert_eq!(storage.list_group_members(&group, None).unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_deletes_record_past_staleness_window() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    mount_validate(&server, 200).await;
    mount_profile(&server, "Oldtimer", ResponseTemplate::new(404)).await;
    mount_profile(&server, "Recent", ResponseTemplate::new(404)).await;

    let engine = create_engine(&server, "");
    let old = seed_entity(&engine, "Oldtimer", 31);
    let recent = seed_entity(&engine, "Recent", 29);

    assert_eq!(
        engine.synchronizer.refresh_entity(&old, None).await,
        RefreshOutcome::Missed(MissOutcome::Deleted)
    );
    assert_eq!(
        engine.synchronizer.refresh_entity(&recent, None).await,
        RefreshOutcome::Missed(MissOutcome::MarkedStale)
    );

    let storage = lock_storage(&engine.storage).unwrap();
    assert!(storage.get_entity(&old).unwrap().is_none());
    let recent = storage.get_entity(&recent).unwrap().expect("still tracked");
    assert_eq!(recent.state, EntityState::Stale);
}

#[tokio::test]
async fn test_transient_failure_never_deletes() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    mount_validate(&server, 200).await;
    mount_profile(&server, "Oldtimer", ResponseTemplate::new(503)).await;

    let engine = create_engine(&server, "");
    let key = seed_entity(&engine, "Oldtimer", 90);

    assert_eq!(
        engine.synchronizer.refresh_entity(&key, None).await,
        RefreshOutcome::Missed(MissOutcome::MarkedStale)
    );

    let entity = lock_storage(&engine.storage)
        .unwrap()
        .get_entity(&key)
        .unwrap()
        .expect("transient failures keep the record");
    assert_eq!(entity.state, EntityState::Stale);
    assert_eq!(entity.item_level, 470.0);
    assert!(entity.last_error.is_some());
}

#[tokio::test]
async fn test_run_cycle_covers_rosters_and_other_tracked_entities() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    mount_validate(&server, 200).await;

    Mock::given(method("GET"))
        .and(path(ROSTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "members": [
                { "character": { "name": "Allikazam", "level": 80, "realm": { "slug": "wyrmrest-accord" } }, "rank": 1 }
            ]
        })))
        .mount(&server)
        .await;

    // Configured in a room only; roster is unavailable
    Mock::given(method("GET"))
        .and(path("/data/wow/guild/area-52/gone/roster"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    mount_profile(
        &server,
        "Allikazam",
        ResponseTemplate::new(200).set_body_json(profile_json(
            "Allikazam",
            Some("Felforged"),
            &[(2001, "Freehold", 15)],
        )),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/characters/profile"))
        .and(query_param("name", "loner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json("Loner", None, &[])))
        .expect(1)
        .mount(&server)
        .await;

    let engine = create_engine(
        &server,
        r#"
[[groups]]
name = "Felforged"
realm = "Wyrmrest Accord"
region = "us"
"#,
    );
    seed_entity(&engine, "Loner", 1);
    assert!(engine
        .synchronizer
        .set_group_defaults("room-1", "general", GroupKey::new("Gone", "Area 52", "us"))
        .is_done());

    let report = engine.coordinator.run_cycle().await;

    assert_eq!(report.groups_crawled, 1);
    assert_eq!(report.groups_skipped, 1);
    assert_eq!(report.roster.created, 1);
    assert_eq!(report.tracked.updated, 1);
    assert_eq!(report.tracked.visited.len(), 1);

    let run_id = report.run_id.expect("run should be recorded");
    let storage = lock_storage(&engine.storage).unwrap();
    let run = storage.get_run(run_id).unwrap();
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.counts.synced, 2);
    assert_eq!(run.counts.runs_logged, 1);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_roster_member_with_respelled_realm_is_fetched_once_per_cycle() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    mount_validate(&server, 200).await;

    // Roster slug drops the apostrophe the profile keeps
    Mock::given(method("GET"))
        .and(path("/data/wow/guild/malganis/felforged/roster"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "members": [
                { "character": { "name": "Allikazam", "level": 80, "realm": { "slug": "malganis" } }, "rank": 2 }
            ]
        })))
        .mount(&server)
        .await;

    let mut profile = profile_json("Allikazam", Some("Felforged"), &[]);
    profile["realm"] = json!("Mal'Ganis");
    profile["guild"]["realm"] = json!("Mal'Ganis");
    Mock::given(method("GET"))
        .and(path("/characters/profile"))
        .and(query_param("name", "allikazam"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .expect(1)
        .mount(&server)
        .await;

    let engine = create_engine(
        &server,
        r#"
[[groups]]
name = "Felforged"
realm = "malganis"
region = "us"
"#,
    );

    let report = engine.coordinator.run_cycle().await;

    assert_eq!(report.roster.created, 1);
    assert_eq!(report.tracked.synced(), 0);
    assert!(report.tracked.visited.is_empty());

    let storage = lock_storage(&engine.storage).unwrap();
    assert_eq!(storage.count_entities().unwrap(), 1);
    let stored = storage
        .get_entity(&EntityKey::new("Allikazam", "Mal'Ganis", "us"))
        .unwrap()
        .expect("stored under the profile's realm");
    assert_eq!(stored.group_rank, Some(2));
}

#[tokio::test]
async fn test_second_cycle_logs_no_duplicate_runs() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    mount_validate(&server, 200).await;
    mount_profile(
        &server,
        "Allikazam",
        ResponseTemplate::new(200).set_body_json(profile_json(
            "Allikazam",
            None,
            &[(3001, "Freehold", 12), (3002, "Freehold", 13)],
        )),
    )
    .await;

    let engine = create_engine(&server, "");
    seed_entity(&engine, "Allikazam", 0);

    let first = engine.coordinator.run_cycle().await;
    let second = engine.coordinator.run_cycle().await;

    assert_eq!(first.tracked.runs_logged, 2);
    assert_eq!(second.tracked.runs_logged, 0);
    assert_eq!(
        lock_storage(&engine.storage)
            .unwrap()
            .count_weekly_runs()
            .unwrap(),
        2
    );
}
