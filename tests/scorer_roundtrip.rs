//! Scorer training, persistence and reuse across runs.

mod common;

use hvac_sentinel::config::{FeatureConfig, ScorerConfig};
use hvac_sentinel::error::DetectionError;
use hvac_sentinel::features::FeatureEngineer;
use hvac_sentinel::scorer::artifact::{self, FORMAT_VERSION};
use hvac_sentinel::scorer::{UnsupervisedScorer, SCORER_FEATURES};
use hvac_sentinel::types::FeatureTable;

fn table() -> FeatureTable {
    FeatureEngineer::new(FeatureConfig::default())
        .compute(common::readings())
        .expect("features")
}

fn trained(normal_only: bool) -> UnsupervisedScorer {
    let mut scorer = UnsupervisedScorer::new(ScorerConfig::default());
    scorer
        .train(&table(), normal_only, 0.02, 42)
        .expect("training");
    scorer
}

#[test]
fn model_survives_disk_round_trip() {
    let scorer = trained(true);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scorer.json");

    artifact::save_to_disk(&scorer.persist().expect("persist"), &path).expect("save");
    let bytes = artifact::load_from_disk(&path).expect("load");
    let restored = UnsupervisedScorer::restore_with_config(&bytes, &SCORER_FEATURES, ScorerConfig::default())
        .expect("restore");

    let t = table();
    assert_eq!(restored.score(&t).expect("score"), scorer.score(&t).expect("score"));
    assert_eq!(restored.detect(&t).expect("detect"), scorer.detect(&t).expect("detect"));
}

#[test]
fn artifact_records_format_and_layout() {
    let bytes = trained(false).persist().expect("persist");
    let doc: serde_json::Value = serde_json::from_slice(&bytes).expect("json artifact");
    assert_eq!(doc["format_version"], FORMAT_VERSION);
    let names: Vec<&str> = doc["feature_names"]
        .as_array()
        .expect("feature list")
        .iter()
        .filter_map(serde_json::Value::as_str)
        .collect();
    assert_eq!(names, SCORER_FEATURES);
}

#[test]
fn future_artifact_version_is_refused() {
    let bytes = trained(false).persist().expect("persist");
    let mut doc: serde_json::Value = serde_json::from_slice(&bytes).expect("json artifact");
    doc["format_version"] = serde_json::Value::from(FORMAT_VERSION + 1);
    let bytes = serde_json::to_vec(&doc).expect("encode");

    let err = UnsupervisedScorer::restore(&bytes, &SCORER_FEATURES).expect_err("newer version");
    assert!(matches!(err, DetectionError::UnsupportedModelVersion { .. }));
}

#[test]
fn normal_only_model_scores_the_episode_as_stranger() {
    let scorer = trained(true);
    let t = table();
    let scored = scorer.score(&t).expect("score");

    let mean = |pick: &dyn Fn(&hvac_sentinel::types::FeatureRow) -> bool| {
        let picked: Vec<f64> = t
            .rows()
            .iter()
            .zip(&scored)
            .filter(|(row, _)| pick(row))
            .map(|(_, s)| s.raw_score)
            .collect();
        assert!(!picked.is_empty());
        picked.iter().sum::<f64>() / picked.len() as f64
    };

    // late in the ramp the fan sits far above anything seen in training
    let episode = mean(&|r| {
        common::in_episode(r.zone_id(), r.reading.timestamp) && r.reading.fan_speed_pct > 75.0
    });
    let normal = mean(&|r| {
        r.zone_id() == common::EPISODE_ZONE
            && !common::in_episode(r.zone_id(), r.reading.timestamp)
            && r.reading.mode == hvac_sentinel::types::Mode::Cooling
    });
    assert!(episode < normal, "episode {episode} vs normal {normal}");
}

#[test]
fn scores_do_not_depend_on_the_scored_batch() {
    let scorer = trained(false);
    let full = table();
    let z1_only = FeatureTable::new(
        full.rows()
            .iter()
            .filter(|r| r.zone_id() == "Z1")
            .cloned()
            .collect(),
    );

    let full_scores = scorer.score(&full).expect("score");
    let z1_scores = scorer.score(&z1_only).expect("score");
    assert_eq!(&full_scores[..z1_scores.len()], z1_scores.as_slice());
}
