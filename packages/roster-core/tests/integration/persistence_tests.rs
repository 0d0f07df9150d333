//! Persistence integration tests.

use std::fs;
use std::sync::Arc;

use ntest::timeout;
use tempfile::tempdir;

use roster_core::config::RosterConfig;
use roster_core::error::StoreError;
use roster_core::persistence::{PersistenceManager, DATA_FILE_NAME};
use roster_core::{ChangeFeed, FieldPatch, PersonDraft, PersonField, PersonTable};

fn new_table() -> PersonTable {
    PersonTable::new(Arc::new(ChangeFeed::new(16)))
}

fn config_for(dir: &std::path::Path) -> RosterConfig {
    RosterConfig {
        data_dir: Some(dir.to_path_buf()),
        persistence_interval_ticks: 3,
        persistence_retry_delay_ms: 0,
        ..Default::default()
    }
}

#[timeout(2000)]
#[test]
fn test_flush_and_reload_round_trip() {
    let temp_dir = tempdir().unwrap();
    let config = config_for(temp_dir.path());
    let persistence = PersistenceManager::from_config(&config).unwrap();

    let table = new_table();
    let ada = table.create(PersonDraft::new("Ada", "Lovelace", 36)).unwrap();
    let grace = table.create(PersonDraft::new("Grace", "Hopper", 85)).unwrap();
    table
        .update(&grace.id, &FieldPatch::parse_input(PersonField::Age, "86").unwrap())
        .unwrap();

    assert!(persistence.flush(&table).unwrap());
    assert!(temp_dir.path().join(DATA_FILE_NAME).exists());

    let restored = new_table();
    let reloaded = PersistenceManager::from_config(&config).unwrap();
    assert_eq!(reloaded.load(&restored).unwrap(), 2);

    let records = restored.find_many();
    assert_eq!(records[0], ada);
    assert_eq!(records[1].age, 86);
    assert_eq!(records[1].id, grace.id);
}

#[timeout(2000)]
#[test]
fn test_flush_skips_clean_table() {
    let temp_dir = tempdir().unwrap();
    let persistence = PersistenceManager::from_config(&config_for(temp_dir.path())).unwrap();
    let table = new_table();

    assert!(!persistence.flush(&table).unwrap());
    table.create(PersonDraft::new("A", "B", 1)).unwrap();
    assert!(persistence.flush(&table).unwrap());
    assert!(!persistence.flush(&table).unwrap());
}

#[timeout(2000)]
#[test]
fn test_tick_flushes_on_interval() {
    let temp_dir = tempdir().unwrap();
    let persistence = PersistenceManager::from_config(&config_for(temp_dir.path())).unwrap();
    let table = new_table();
    let data_file = temp_dir.path().join(DATA_FILE_NAME);

    // Tick 0 flushes, but the table is still clean.
    persistence.tick(&table).unwrap();
    assert!(!data_file.exists());

    table.create(PersonDraft::new("A", "B", 1)).unwrap();
    persistence.tick(&table).unwrap();
    persistence.tick(&table).unwrap();
    assert!(!data_file.exists());

    persistence.tick(&table).unwrap();
    assert!(data_file.exists());
}

#[timeout(2000)]
#[test]
fn test_missing_file_starts_empty() {
    let temp_dir = tempdir().unwrap();
    let persistence = PersistenceManager::from_config(&config_for(temp_dir.path())).unwrap();
    let table = new_table();
    assert_eq!(persistence.load(&table).unwrap(), 0);
    assert!(table.is_empty());
}

#[timeout(2000)]
#[test]
fn test_corrupted_file_is_reported() {
    let temp_dir = tempdir().unwrap();
    fs::write(temp_dir.path().join(DATA_FILE_NAME), b"{ not json").unwrap();

    let persistence = PersistenceManager::from_config(&config_for(temp_dir.path())).unwrap();
    let table = new_table();
    let err = persistence.load(&table).unwrap_err();
    assert!(matches!(err, StoreError::DataCorruption(_)));
    assert!(table.is_empty());
}

#[test]
fn test_in_memory_config_has_no_manager() {
    let config = RosterConfig {
        data_dir: None,
        ..Default::default()
    };
    assert!(PersistenceManager::from_config(&config).is_none());
}
