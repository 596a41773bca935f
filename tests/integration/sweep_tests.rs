//! Integration tests for the sweep modes
//!
//! These tests drive `run_mode` against the in-memory auction site and
//! check what ends up in the database, the partition files and the reports.

use leilao_sweep::config::{parse_config, Config};
use leilao_sweep::crawler::{read_reports, run_mode, RunMode};
use leilao_sweep::driver::mock::{MockItem, MockRegion, MockSite, MockSubRegion};
use leilao_sweep::output::WorkerReport;
use leilao_sweep::storage::{RecordSink, SqliteSink};
use leilao_sweep::{SubRegionUnit, SweepError, UnitStatus};
use std::path::Path;
use tempfile::TempDir;

/// Creates a test configuration whose files all live in `dir`
fn create_test_config(dir: &Path, workers: usize) -> Config {
    let content = format!(
        r#"
[site]
base-url = "http://mock/"

[navigation]
selector-timeout-ms = 40
navigation-timeout-ms = 200
action-delay-ms = 0
page-settle-ms = 0
detail-marker-timeout-ms = 15
detail-fallback-settle-ms = 0
next-step-attempts = 1
poll-interval-ms = 5

[workers]
count = {workers}
partition-dir = '{dir}/parts'

[output]
database-path = '{dir}/imoveis.db'
report-dir = '{dir}/reports'
"#,
        workers = workers,
        dir = dir.display(),
    );
    parse_config(&content).expect("test config should be valid")
}

fn sub(id: &str, label: &str, items: usize) -> MockSubRegion {
    let page = (0..items)
        .map(|i| MockItem::new(&format!("Casa {label} {i}"), &format!("{id}0{i}")))
        .collect();
    MockSubRegion::new(id, label).with_page(page)
}

fn one_region_site() -> MockSite {
    MockSite::new(vec![MockRegion::new(
        "PR",
        "Paraná",
        vec![sub("1", "Curitiba", 2), sub("2", "Londrina", 2)],
    )])
}

fn two_region_site() -> MockSite {
    MockSite::new(vec![
        MockRegion::new(
            "PR",
            "Paraná",
            vec![sub("1", "Curitiba", 1), sub("2", "Londrina", 1)],
        ),
        MockRegion::new(
            "SC",
            "Santa Catarina",
            vec![sub("3", "Joinville", 1), sub("4", "Blumenau", 1)],
        ),
    ])
}

fn stored_records(config: &Config) -> u64 {
    SqliteSink::new(Path::new(&config.output.database_path))
        .unwrap()
        .count_records()
        .unwrap()
}

#[tokio::test]
async fn test_full_sweep_single_region() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    let report = run_mode(&config, "hash", one_region_site(), RunMode::All {
        start_region: None,
        start_unit: None,
    })
    .await
    .unwrap()
    .expect("a sweep produces a report");

    assert_eq!(report.config_hash, "hash");
    assert_eq!(report.regions.len(), 1);
    let region = &report.regions[0];
    assert_eq!(region.region_id, "PR");
    assert_eq!(region.units_processed, 2);
    assert_eq!(region.units_succeeded, 2);
    assert_eq!(region.records_found, 4);
    assert_eq!(region.records_saved, 4);
    assert_eq!(region.records_duplicate, 0);
    assert_eq!(report.summary.success_rate, 100.0);
    assert_eq!(stored_records(&config), 4);

    let saved = dir.path().join("reports").join("sweep-all-report.json");
    let reloaded = WorkerReport::load(&saved).unwrap();
    assert_eq!(reloaded.global.records_saved, 4);
}

#[tokio::test]
async fn test_second_sweep_finds_only_duplicates() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);
    let all = || RunMode::All {
        start_region: None,
        start_unit: None,
    };

    run_mode(&config, "hash", one_region_site(), all()).await.unwrap();
    let report = run_mode(&config, "hash", one_region_site(), all())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.global.records_found, 4);
    assert_eq!(report.global.records_saved, 0);
    assert_eq!(report.global.records_duplicate, 4);
    assert_eq!(stored_records(&config), 4);
}

#[tokio::test]
async fn test_start_position_skips_earlier_units() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    let report = run_mode(&config, "hash", two_region_site(), RunMode::All {
        start_region: Some("SC".to_string()),
        start_unit: Some("4".to_string()),
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.units.len(), 1);
    assert_eq!(report.units[0].unit.sub_region.id, "4");
    assert_eq!(stored_records(&config), 1);
}

#[tokio::test]
async fn test_region_and_unit_modes() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    let report = run_mode(&config, "hash", two_region_site(), RunMode::Region("SC".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.global.units_succeeded, 2);
    assert!(report.units.iter().all(|u| u.unit.region_id == "SC"));

    let report = run_mode(&config, "hash", two_region_site(), RunMode::Unit {
        region_id: "PR".to_string(),
        unit_id: "2".to_string(),
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.units.len(), 1);
    assert_eq!(report.units[0].unit.sub_region.label, "Londrina");
    assert!(dir
        .path()
        .join("reports")
        .join("sweep-unit-PR-2-report.json")
        .exists());
}

#[tokio::test]
async fn test_unknown_region_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    let result = run_mode(&config, "hash", two_region_site(), RunMode::Region("RS".to_string())).await;
    assert!(matches!(result, Err(SweepError::UnknownTarget(_))));
}

#[tokio::test]
async fn test_divide_worker_retry_flow() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    // divide writes one partition per worker
    let divided = run_mode(&config, "hash", two_region_site(), RunMode::Divide)
        .await
        .unwrap();
    assert!(divided.is_none());

    let parts = dir.path().join("parts");
    let first: Vec<SubRegionUnit> =
        serde_json::from_str(&std::fs::read_to_string(parts.join("worker-0.json")).unwrap())
            .unwrap();
    let second: Vec<SubRegionUnit> =
        serde_json::from_str(&std::fs::read_to_string(parts.join("worker-1.json")).unwrap())
            .unwrap();
    let ids = |units: &[SubRegionUnit]| -> Vec<String> {
        units.iter().map(|u| u.sub_region.id.clone()).collect()
    };
    assert_eq!(ids(&first), vec!["1", "3"]);
    assert_eq!(ids(&second), vec!["2", "4"]);

    // worker 0 cannot get past the form for Joinville
    let failing = two_region_site().with_stuck_step("3", 5);
    let report = run_mode(&config, "hash", failing, RunMode::Worker {
        id: 0,
        partition_file: None,
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.worker_id, "0");
    assert_eq!(report.global.units_failed, 1);
    assert_eq!(report.failed_units.len(), 1);
    assert_eq!(report.failed_units[0].sub_region.id, "3");

    let report = run_mode(&config, "hash", two_region_site(), RunMode::Worker {
        id: 1,
        partition_file: None,
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.global.units_failed, 0);

    // retry picks up only the failed unit
    let retry = run_mode(&config, "hash", two_region_site(), RunMode::Retry)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retry.worker_id, "retry");
    assert_eq!(retry.units.len(), 1);
    assert_eq!(retry.units[0].unit.sub_region.id, "3");
    assert_eq!(retry.units[0].status, UnitStatus::Success);
    assert!(parts.join("worker-retry.json").exists());

    let reports = read_reports(&dir.path().join("reports")).unwrap();
    let worker_ids: Vec<&str> = reports.iter().map(|r| r.worker_id.as_str()).collect();
    assert_eq!(worker_ids, vec!["0", "1", "retry"]);

    // the retry report supersedes the failure, so nothing is left to do
    let again = run_mode(&config, "hash", two_region_site(), RunMode::Retry)
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(stored_records(&config), 4);
}

#[tokio::test]
async fn test_worker_with_partition_file_override() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1);

    run_mode(&config, "hash", two_region_site(), RunMode::Divide)
        .await
        .unwrap();
    std::fs::rename(
        dir.path().join("parts").join("worker-0.json"),
        dir.path().join("parts").join("custom.json"),
    )
    .unwrap();

    let missing = run_mode(&config, "hash", two_region_site(), RunMode::Worker {
        id: 0,
        partition_file: None,
    })
    .await;
    assert!(matches!(missing, Err(SweepError::Partition(_))));

    let report = run_mode(&config, "hash", two_region_site(), RunMode::Worker {
        id: 0,
        partition_file: Some("custom.json".to_string()),
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.global.units_succeeded, 4);
}

#[tokio::test]
async fn test_crash_still_writes_report() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    let crashing = two_region_site().with_crash_on("2");
    let result = run_mode(&config, "hash", crashing, RunMode::Region("PR".to_string())).await;
    assert!(result.unwrap_err().is_fatal());

    let saved = dir.path().join("reports").join("sweep-region-PR-report.json");
    let report = WorkerReport::load(&saved).unwrap();
    assert_eq!(report.global.units_succeeded, 1);
    assert_eq!(report.global.units_failed, 1);
}

#[tokio::test]
async fn test_hand_written_partition_with_repeated_unit() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1);

    let curitiba = SubRegionUnit::new("Paraná", "PR", "Curitiba", "1");
    let units = vec![
        curitiba.clone(),
        curitiba,
        SubRegionUnit::new("Paraná", "PR", "Londrina", "2"),
        SubRegionUnit::new("Santa Catarina", "SC", "Joinville", "3"),
    ];
    let parts = dir.path().join("parts");
    std::fs::create_dir_all(&parts).unwrap();
    std::fs::write(
        parts.join("manual.json"),
        serde_json::to_string(&units).unwrap(),
    )
    .unwrap();

    let report = run_mode(&config, "hash", two_region_site(), RunMode::Worker {
        id: 0,
        partition_file: Some("manual.json".to_string()),
    })
    .await
    .unwrap()
    .unwrap();

    let swept: Vec<(&str, UnitStatus)> = report
        .units
        .iter()
        .map(|u| (u.unit.sub_region.id.as_str(), u.status))
        .collect();
    assert_eq!(
        swept,
        vec![
            ("1", UnitStatus::Success),
            ("2", UnitStatus::Success),
            ("3", UnitStatus::Success),
        ]
    );
    assert_eq!(stored_records(&config), 3);
}
