//! Weekly activity derivation
//!
//! Every weekly run reported upstream carries a URL whose last path segment
//! starts with the run's numeric id, e.g. `.../season-3/12345-18-freehold`.

use crate::model::{EntityData, WeeklyRun};
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

/// Extracts the run id from a run URL
///
/// Takes the leading digits of the last non-empty path segment, falling back to
/// the whole segment when it does not start with a digit. Returns `None` when
/// there is no segment at all.
pub fn extract_run_id(reference: &str) -> Option<String> {
    let segment = match Url::parse(reference) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string),
        Err(_) => reference
            .split(['/', '?', '#'])
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_string),
    }?;

    let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        Some(segment)
    } else {
        Some(digits)
    }
}

/// Builds the activity records for this week's runs of an entity
///
/// Runs without an extractable id are skipped.
pub fn derive_weekly_runs(data: &EntityData, observed_at: DateTime<Utc>) -> Vec<WeeklyRun> {
    data.weekly_runs
        .iter()
        .filter_map(|run| {
            let Some(run_id) = extract_run_id(&run.url) else {
                debug!("No run id in '{}' for {}", run.url, data.key);
                return None;
            };
            Some(WeeklyRun {
                run_id,
                entity_name: data.key.name.clone(),
                dungeon: run.dungeon.clone(),
                level: run.level,
                observed_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKey, RunData};

    #[test]
    fn test_extract_run_id_leading_digits() {
        assert_eq!(
            extract_run_id("https://raider.io/mythic-plus-runs/season-df-3/12345-18-freehold"),
            Some("12345".to_string())
        );
    }

    #[test]
    fn test_extract_run_id_ignores_trailing_slash_and_query() {
        assert_eq!(
            extract_run_id("https://raider.io/runs/season-3/777-20-underrot/?ref=abc"),
            Some("777".to_string())
        );
    }

    #[test]
    fn test_extract_run_id_falls_back_to_segment() {
        assert_eq!(
            extract_run_id("https://raider.io/runs/abc-def"),
            Some("abc-def".to_string())
        );
        assert_eq!(extract_run_id("runs/42-freehold"), Some("42".to_string()));
        assert_eq!(extract_run_id(""), None);
    }

    #[test]
    fn test_derive_weekly_runs() {
        let data = EntityData {
            key: EntityKey::new("Allikazam", "Wyrmrest Accord", "us"),
            display_name: "Allikazam".to_string(),
            group: None,
            class: "mage".to_string(),
            item_level: 480.0,
            score: 2500.0,
            rank_overall: None,
            rank_class: None,
            weekly_runs: vec![
                RunData {
                    dungeon: "Freehold".to_string(),
                    level: 18,
                    url: "https://raider.io/runs/s3/100-18-freehold".to_string(),
                    completed_at: None,
                },
                RunData {
                    dungeon: "Underrot".to_string(),
                    level: 16,
                    url: "https://raider.io/".to_string(),
                    completed_at: None,
                },
            ],
            previous_weekly_runs: vec![],
        };

        let runs = derive_weekly_runs(&data, Utc::now());

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "100");
        assert_eq!(runs[0].entity_name, "allikazam");
        assert_eq!(runs[0].level, 18);
    }
}
