//! Fakes for the injected seams: snapshot storage and the semantic comparator

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use jk_consolidate::services::backup_manager::{
    BackupError, SnapshotInfo, SnapshotRepository, SnapshotScope, TableCounts,
};
use jk_consolidate::services::semantic_comparator::{
    ComparatorError, SemanticComparator, SemanticVerdict,
};

/// Snapshot storage that cannot create snapshots
#[derive(Default)]
pub struct FailingSnapshotRepository {
    pub create_attempts: AtomicU32,
}

#[async_trait]
impl SnapshotRepository for FailingSnapshotRepository {
    async fn create_snapshot(&self, _scope: SnapshotScope, _label: &str) -> Result<SnapshotInfo, BackupError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackupError::CreationFailed("disk full".to_string()))
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, BackupError> {
        Ok(Vec::new())
    }

    async fn get_snapshot(&self, id: &str) -> Result<SnapshotInfo, BackupError> {
        Err(BackupError::UnknownSnapshot(id.to_string()))
    }

    async fn live_counts(&self) -> Result<TableCounts, BackupError> {
        Ok(TableCounts::default())
    }

    async fn restore_snapshot(&self, id: &str) -> Result<(), BackupError> {
        Err(BackupError::UnknownSnapshot(id.to_string()))
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), BackupError> {
        Err(BackupError::UnknownSnapshot(id.to_string()))
    }
}

/// Comparator answering from a fixed table keyed by lowercase (a, b)
///
/// Unknown pairs answer "not similar" with full confidence.
#[derive(Default)]
pub struct ScriptedComparator {
    answers: HashMap<(String, String), (bool, f64)>,
    pub calls: AtomicU32,
}

impl ScriptedComparator {
    pub fn with(mut self, a: &str, b: &str, similar: bool, confidence: f64) -> Self {
        self.answers.insert(Self::key(a, b), (similar, confidence));
        self
    }

    fn key(a: &str, b: &str) -> (String, String) {
        let (a, b) = (a.to_lowercase(), b.to_lowercase());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[async_trait]
impl SemanticComparator for ScriptedComparator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn compare(&self, name_a: &str, name_b: &str) -> Result<SemanticVerdict, ComparatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (similar, confidence) = self
            .answers
            .get(&Self::key(name_a, name_b))
            .copied()
            .unwrap_or((false, 1.0));

        Ok(SemanticVerdict {
            similar,
            confidence,
            reason: "scripted".to_string(),
            manual_review: false,
        })
    }
}

/// Comparator that is always unreachable
#[derive(Default)]
pub struct FailingComparator {
    pub calls: AtomicU32,
}

#[async_trait]
impl SemanticComparator for FailingComparator {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn compare(&self, _name_a: &str, _name_b: &str) -> Result<SemanticVerdict, ComparatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ComparatorError::NetworkError("connection refused".to_string()))
    }
}
