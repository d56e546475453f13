//! End-to-end scenarios over tiered loggers: history past the ring,
//! clone composition over disk-backed parents, and the drain-on-close
//! guarantee.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tempfile::tempdir;

use strata_engine::{LogLevel, Logger};

/// Line counts of every chunk file under `dir`, ordered by chunk index.
fn chunk_line_counts(dir: &Path) -> Vec<usize> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    // Chunk index is the numeric component before the extension.
    files.sort_by_key(|p| {
        p.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('-').next())
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
    });
    files
        .iter()
        .map(|p| BufReader::new(File::open(p).unwrap()).lines().count())
        .collect()
}

#[test]
fn history_survives_past_the_ring() {
    let dir = tempdir().unwrap();
    let logger = Logger::tiered(None, dir.path(), "app", &[]).unwrap();

    // Default chunk size is 1000; 2500 records span three chunks.
    for i in 0..2500 {
        logger
            .add_log(LogLevel::Info, &format!("m#{i}"), "", true)
            .unwrap();
    }

    assert_eq!(logger.n_logs(), 2500);

    // Random access across disk and ring.
    assert_eq!(logger.log_at(0).unwrap().message(), "m#0");
    assert_eq!(logger.log_at(999).unwrap().message(), "m#999");
    assert_eq!(logger.log_at(1000).unwrap().message(), "m#1000");
    assert_eq!(logger.log_at(2499).unwrap().message(), "m#2499");

    // A range straddling every region.
    let logs = logger.logs_in(900, 1700).unwrap();
    assert_eq!(logs.len(), 800);
    for (off, log) in logs.iter().enumerate() {
        assert_eq!(log.message(), format!("m#{}", 900 + off));
    }

    // Ascending index sets.
    let picked = logger.logs_at(&[5, 999, 1000, 1998, 2400]).unwrap();
    let messages: Vec<_> = picked.iter().map(|l| l.message()).collect();
    assert_eq!(messages, ["m#5", "m#999", "m#1000", "m#1998", "m#2400"]);

    logger.close().unwrap();
}

#[test]
fn drain_on_close_completes_every_chunk() {
    let dir = tempdir().unwrap();
    let logger = Logger::tiered(None, dir.path(), "burst", &[]).unwrap();
    logger.enable_heavy_load_detection();

    for i in 0..3000 {
        logger
            .add_log(LogLevel::Info, &format!("m#{i}"), "", true)
            .unwrap();
    }
    logger.close().unwrap();

    // Every chunk file holds exactly chunk_size lines except possibly the
    // last, and nothing is left pending.
    let counts = chunk_line_counts(dir.path());
    assert_eq!(counts.iter().sum::<usize>(), 3000);
    for (i, &count) in counts.iter().enumerate() {
        if i + 1 < counts.len() {
            assert_eq!(count, 1000, "chunk {i} incomplete");
        } else {
            assert!(count <= 1000);
        }
    }
}

#[test]
fn reads_are_consistent_after_close() {
    let dir = tempdir().unwrap();
    let logger = Logger::tiered(None, dir.path(), "app", &[]).unwrap();
    for i in 0..1500 {
        logger
            .add_log(LogLevel::Info, &format!("m#{i}"), "", true)
            .unwrap();
    }
    logger.close().unwrap();

    // Appends are rejected, history stays readable.
    assert!(logger.add_log(LogLevel::Info, "late", "", true).is_err());
    let logs = logger.logs_in(0, 1500).unwrap();
    for (i, log) in logs.iter().enumerate() {
        assert_eq!(log.message(), format!("m#{i}"));
    }
}

#[test]
fn clone_over_tiered_parent() {
    let dir = tempdir().unwrap();
    let root = Logger::tiered(None, dir.path(), "app", &["app"]).unwrap();
    let child = root.clone_with(None, false, &["job"]);

    for i in 0..1200 {
        child
            .add_log(LogLevel::Info, &format!("j#{i}"), "", true)
            .unwrap();
    }

    // The child's view projects through the parent's tiered storage,
    // including records that have left the ring.
    assert_eq!(child.n_logs(), 1200);
    assert_eq!(child.log_at(0).unwrap().message(), "j#0");
    assert!(child.log_at(0).unwrap().matches(&["app", "job"]));

    let logs = child.logs_in(100, 300).unwrap();
    for (off, log) in logs.iter().enumerate() {
        assert_eq!(log.message(), format!("j#{}", 100 + off));
    }

    child.close().unwrap();
    root.close().unwrap();
}

#[test]
fn tags_reach_the_persisted_form() {
    let dir = tempdir().unwrap();
    let logger = Logger::tiered(None, dir.path(), "tagged", &["svc"]).unwrap();
    for i in 0..1100 {
        logger
            .add_log(LogLevel::Info, &format!("m#{i}"), "", true)
            .unwrap();
    }
    logger.close().unwrap();

    // Record 0 now lives only on disk; the tag must have been persisted.
    let log = logger.log_at(0).unwrap();
    assert!(log.matches(&["svc"]));
    assert_eq!(log.level(), LogLevel::Info);
}
