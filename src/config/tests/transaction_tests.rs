// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::super::*;
use std::{fs, thread, time::Duration};
use tempfile::TempDir;

fn create_test_rules() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rules.yaml");
    fs::write(&path, "---\n- Host: desk\n").unwrap();
    (temp_dir, path)
}

// ============================================================================
// SaveTransaction Tests
// ============================================================================

#[test]
fn test_transaction_basic_flow() {
    let (_temp_dir, path) = create_test_rules();

    let tx = SaveTransaction::begin(&path).unwrap();
    assert_eq!(list_backups(&path).unwrap().len(), 1, "Should have created one backup");

    let new_content = "---\n- Host: laptop\n";
    tx.commit(new_content).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), new_content);

    let backups = list_backups(&path).unwrap();
    assert_eq!(backups.len(), 1, "Backup should survive the commit");
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "---\n- Host: desk\n");
}

#[test]
fn test_backup_name_carries_timestamp() {
    let (_temp_dir, path) = create_test_rules();
    let tx = SaveTransaction::begin(&path).unwrap();
    let backup = tx.backup_path().unwrap();

    assert_eq!(backup.parent().unwrap(), path.parent().unwrap().join(transaction::BACKUP_DIR));

    let name = backup.file_name().unwrap().to_str().unwrap();
    let timestamp = name.strip_prefix("rules.yaml.").unwrap();
    let parsed = chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d_%H%M%S");
    assert!(parsed.is_ok(), "Timestamp should be valid chrono format: {}", timestamp);
}

#[test]
fn test_transaction_rollback() {
    let (_temp_dir, path) = create_test_rules();

    let tx = SaveTransaction::begin(&path).unwrap();
    fs::write(&path, "---\n- Host: broken\n").unwrap();
    tx.rollback().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "---\n- Host: desk\n");

    // Rollback can be repeated
    tx.rollback().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "---\n- Host: desk\n");
}

#[test]
fn test_new_document_has_no_backup() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("rules.yaml");

    let tx = SaveTransaction::begin(&path).unwrap();
    assert!(tx.backup_path().is_none());
    tx.commit("---\n[]\n").unwrap();
    assert!(path.exists());

    let tx = SaveTransaction::begin(&path).unwrap();
    assert!(tx.backup_path().is_some());
}

#[test]
fn test_rollback_of_new_document_removes_it() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rules.yaml");

    let tx = SaveTransaction::begin(&path).unwrap();
    fs::write(&path, "---\n- Host: desk\n").unwrap();
    tx.rollback().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_multiple_backups_dont_overwrite() {
    let (_temp_dir, path) = create_test_rules();

    SaveTransaction::begin(&path).unwrap().commit("second").unwrap();
    // Wait 1 second to ensure different timestamp
    thread::sleep(Duration::from_secs(1));
    SaveTransaction::begin(&path).unwrap().commit("third").unwrap();

    let backups = list_backups(&path).unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "---\n- Host: desk\n");
    assert_eq!(fs::read_to_string(&backups[1]).unwrap(), "second");
}

#[test]
fn test_back_to_back_saves_keep_every_backup() {
    let (_temp_dir, path) = create_test_rules();
    let mut store = FileStore::new();

    store.write(&path, "---\n- Host: v1\n").unwrap();
    store.write(&path, "---\n- Host: v2\n").unwrap();

    let backups = list_backups(&path).unwrap();
    let contents = backups
        .iter()
        .map(|b| fs::read_to_string(b).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(contents, vec!["---\n- Host: desk\n", "---\n- Host: v1\n"]);
    assert_eq!(fs::read_to_string(&path).unwrap(), "---\n- Host: v2\n");
}

#[test]
fn test_same_second_backups_get_suffix() {
    let (_temp_dir, path) = create_test_rules();

    let first = SaveTransaction::begin(&path).unwrap();
    let second = SaveTransaction::begin(&path).unwrap();
    let first = first.backup_path().unwrap().to_path_buf();
    let second = second.backup_path().unwrap().to_path_buf();

    assert_ne!(first, second);
    assert_eq!(fs::read_to_string(&first).unwrap(), "---\n- Host: desk\n");
    assert_eq!(fs::read_to_string(&second).unwrap(), "---\n- Host: desk\n");
}

#[test]
fn test_failed_file_store_write_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let blocked = temp_dir.path().join("blocked.yaml");
    fs::create_dir(&blocked).unwrap();
    fs::write(blocked.join("keep"), "x").unwrap();

    let result = FileStore::new().write(&blocked, "---\n- Host: laptop\n");
    assert!(matches!(result, Err(StorageError::WriteFailed(_))));
    assert_eq!(fs::read_to_string(blocked.join("keep")).unwrap(), "x");
}

#[test]
fn test_save_with_backup_writes_and_backs_up() {
    let (_temp_dir, path) = create_test_rules();

    save_with_backup(&path, "---\n- Host: laptop\n").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "---\n- Host: laptop\n");
    assert_eq!(list_backups(&path).unwrap().len(), 1);
}

#[test]
fn test_commit_failure_leaves_document_untouched() {
    let (temp_dir, path) = create_test_rules();
    // A directory where the document should be makes the rename fail
    let blocked = temp_dir.path().join("blocked.yaml");
    fs::create_dir(&blocked).unwrap();
    fs::write(blocked.join("keep"), "x").unwrap();

    let tx = SaveTransaction::begin(&blocked).unwrap();
    let result = tx.commit("---\n- Host: laptop\n");
    assert!(matches!(result, Err(StorageError::WriteFailed(_))));
    assert!(blocked.is_dir());
    assert_eq!(fs::read_to_string(&path).unwrap(), "---\n- Host: desk\n");
}

#[test]
fn test_file_store_read_missing() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::new();
    assert!(store.read(&temp_dir.path().join("absent.yaml")).unwrap().is_none());
}
