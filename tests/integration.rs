// tests/integration.rs
//! End-to-end tests of the alarm service, the statistics pipeline and sinks

use annunciator::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn config(max_alarms: usize, interval: u32, queue: usize) -> CoreConfig {
    CoreConfig {
        table: TableConfig { max_alarms },
        statistics: StatisticsConfig {
            interval_length_minutes: interval,
            queue_capacity: queue,
            top_n: 5,
        },
    }
}

#[test]
fn test_service_from_yaml_end_to_end() {
    let yaml = r#"
table:
  max_alarms: 3
statistics:
  interval_length_minutes: 1
  queue_capacity: 4
"#;
    let sink = Arc::new(MemorySink::new());
    let service = AlarmService::new(CoreConfig::from_yaml(yaml).unwrap(), sink.clone()).unwrap();
    service.start().unwrap();

    for id in ["A", "B", "C"] {
        service.ingest(AlarmEvent::activated(id, 2)).unwrap();
    }
    service.ingest(AlarmEvent::terminated("B", 2)).unwrap();
    service.ingest(AlarmEvent::activated("D", 1)).unwrap();

    // B was inactive and swept to make room for D
    assert_eq!(service.table().ids(), vec!["A", "C", "D"]);
    assert_eq!(service.table().highest_priority_unacknowledged(), Some(1));

    assert_eq!(service.rotate(), RotateOutcome::Queued);
    assert!(wait_until(|| sink.len() == 1));

    let summary = &sink.summaries()[0];
    assert_eq!(summary.total_alarms, 4);
    assert_eq!(summary.total_activations, 4);
    assert_eq!(summary.total_terminations, 1);
    assert_eq!(summary.total_operations, 5);
    assert_eq!(summary.top_by_terminations[0].id, "B");
    assert!((summary.avg_operations_per_second - 5.0 / 60.0).abs() < 1e-9);

    service.shutdown();
    service.pipeline().join().unwrap();
    assert_eq!(service.pipeline().state(), PipelineState::Stopped);
}

#[test]
fn test_summaries_reach_json_lines_file_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarm-stats.jsonl");
    let sink = Arc::new(JsonLinesSink::create(&path).unwrap());
    let service = AlarmService::new(config(16, 1, 8), sink).unwrap();
    service.start().unwrap();

    for round in 1..=3u64 {
        for _ in 0..round {
            service.ingest(AlarmEvent::activated("X", 0)).unwrap();
        }
        assert_eq!(service.rotate(), RotateOutcome::Queued);
    }
    assert!(wait_until(|| service.pipeline().metrics().summaries_emitted == 3));

    let content = std::fs::read_to_string(&path).unwrap();
    let totals: Vec<u64> = content
        .lines()
        .map(|line| serde_json::from_str::<IntervalSummary>(line).unwrap().total_activations)
        .collect();
    assert_eq!(totals, vec![1, 2, 3]);
}

#[test]
fn test_backpressure_never_blocks_producers() {
    let sink = Arc::new(MemorySink::new());
    let service = Arc::new(AlarmService::new(config(64, 1, 1), sink).unwrap());

    // Aggregator not started: the single slot fills on the first rotation
    service.ingest(AlarmEvent::activated("X", 1)).unwrap();
    assert_eq!(service.rotate(), RotateOutcome::Queued);

    let started = Instant::now();
    let outcomes: Vec<_> = (0..5)
        .map(|_| {
            service.ingest(AlarmEvent::activated("X", 1)).unwrap();
            service.rotate()
        })
        .collect();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(outcomes.iter().all(|o| *o == RotateOutcome::Dropped));

    let metrics = service.pipeline().metrics();
    assert_eq!(metrics.dropped_intervals, 5);
    assert_eq!(metrics.rotations, 6);
    assert_eq!(service.pipeline().queued_snapshots(), 1);
}

#[test]
fn test_disabled_statistics_keep_table_working() {
    let sink = Arc::new(MemorySink::new());
    let service = AlarmService::new(config(4, 0, 10), sink.clone()).unwrap();
    service.start().unwrap();

    service.ingest(AlarmEvent::activated("A", 3)).unwrap();
    assert!(service.table().contains("A"));
    assert_eq!(service.pipeline().live_counts("A"), None);
    assert_eq!(service.rotate(), RotateOutcome::Skipped);
    assert!(!service.pipeline().has_worker());
    assert_eq!(service.pipeline().state(), PipelineState::Disabled);
    assert!(sink.is_empty());
}

#[test]
fn test_parallel_producers_and_rotation() {
    let sink = Arc::new(MemorySink::new());
    let service = Arc::new(AlarmService::new(config(32, 1, 64), sink.clone()).unwrap());
    service.start().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let service = service.clone();
            thread::spawn(move || {
                for i in 0..500u32 {
                    let id = format!("P{}:{}", t, i % 20);
                    let event = if i % 3 == 0 {
                        AlarmEvent::terminated(id, (i % 4) as u8)
                    } else {
                        AlarmEvent::activated(id, (i % 4) as u8)
                    };
                    service.ingest(event).unwrap();
                }
            })
        })
        .collect();
    let rotator = {
        let service = service.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                service.rotate();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };
    for handle in producers {
        handle.join().unwrap();
    }
    rotator.join().unwrap();
    service.rotate();

    service.table().check_consistency().unwrap();
    assert!(service.table().len() <= 32);

    let metrics = service.pipeline().metrics();
    assert_eq!(metrics.recorded, 2000);
    assert_eq!(metrics.dropped_intervals, 0);
    assert!(wait_until(|| {
        service.pipeline().metrics().summaries_emitted == metrics.rotations
    }));
    let operations: u64 = sink.summaries().iter().map(|s| s.total_operations).sum();
    assert_eq!(operations, 2000);
}
