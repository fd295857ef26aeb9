//! Artifact export.
//!
//! Every result of a snapshot (vesting supply, one leaderboard per asset, the
//! optional delegator board) is serialized and persisted on its own.  A failed
//! artifact is logged and reported to the caller; it never stops its siblings.

use blake2::digest::{consts::U32, Digest};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

type Blake2b256 = blake2::Blake2b<U32>;

/// What an artifact holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Locked supply across vesting accounts.
    VestingSupply,
    /// Top holders of one asset.
    Leaderboard {
        /// Asset ranked on.
        asset: String,
    },
    /// Top delegators by bonded stake.
    DelegatorLeaderboard,
}

impl ArtifactKind {
    /// File stem without the height/timestamp suffix.
    pub fn stem(&self) -> String {
        match self {
            Self::VestingSupply => "vesting".to_string(),
            Self::Leaderboard { asset } => format!("tracking-{}", sanitize(asset)),
            Self::DelegatorLeaderboard => "tracking-delegation".to_string(),
        }
    }

    /// Name used in logs.
    pub fn label(&self) -> String {
        match self {
            Self::VestingSupply => "vesting".to_string(),
            Self::Leaderboard { asset } => format!("leaderboard:{asset}"),
            Self::DelegatorLeaderboard => "delegators".to_string(),
        }
    }
}

/// Replaces anything but ASCII alphanumerics, `-` and `_` with `_`.
///
/// Denoms such as `ibc/27394F..` would otherwise introduce path separators.
pub fn sanitize(asset: &str) -> String {
    asset
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name of an artifact generated at `generated_at_ms` for block `height`.
pub fn artifact_file_name(kind: &ArtifactKind, height: u64, generated_at_ms: u64) -> String {
    format!("{}-{height}-{generated_at_ms}.json", kind.stem())
}

/// Errors surfaced while exporting one artifact.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode {artifact}: {source}")]
    /// The payload could not be serialized.
    Encode {
        /// Artifact label.
        artifact: String,
        /// Serializer failure.
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    /// The payload could not be persisted.
    Io {
        /// Target path.
        path: PathBuf,
        /// Filesystem failure.
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compute {artifact}: {reason}")]
    /// The result itself could not be computed.
    Compute {
        /// Artifact label.
        artifact: String,
        /// Failure description.
        reason: String,
    },
    #[error("export task for {artifact} did not complete: {reason}")]
    /// The background task panicked or was cancelled.
    Task {
        /// Artifact label.
        artifact: String,
        /// Join failure description.
        reason: String,
    },
}

/// Destination for serialized artifacts.
pub trait ArtifactSink: Send + Sync {
    /// Stores `bytes` as one artifact and returns where it went.
    fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// Writes artifacts into a directory, one file each.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Sink rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for FileSink {
    fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ExportError::Io { path, source }
        };
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.dir.join(file_name);
        let tmp_path = self.dir.join(format!("{file_name}.tmp"));
        let written = fs::write(&tmp_path, bytes)
            .map_err(io_err(&tmp_path))
            .and_then(|()| fs::rename(&tmp_path, &path).map_err(io_err(&path)));
        if written.is_err() && tmp_path.exists() {
            if let Err(err) = fs::remove_file(&tmp_path) {
                log::warn!(
                    "QSYS|mod=EXPORT|evt=TMP_LEFT|path={}|err={err}",
                    tmp_path.display()
                );
            }
        }
        written.map(|()| path)
    }
}

/// Where and what was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Final location.
    pub path: PathBuf,
    /// Payload size.
    pub bytes: usize,
    /// Hex BLAKE2b-256 of the payload.
    pub digest: String,
}

/// Hex BLAKE2b-256 of an artifact payload.
pub fn payload_digest(bytes: &[u8]) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(b"power-tracker-artifact-v1");
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Serializes results and hands them to a sink.
pub struct SnapshotExporter {
    sink: Box<dyn ArtifactSink>,
}

impl SnapshotExporter {
    /// Exporter writing through `sink`.
    pub fn new(sink: impl ArtifactSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Exporter writing files into `dir`.
    pub fn to_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileSink::new(dir))
    }

    /// Serializes `payload` as pretty JSON and persists it as a single write.
    ///
    /// Failures are logged here and returned; callers decide nothing else.
    pub fn export<T: Serialize + ?Sized>(
        &self,
        kind: ArtifactKind,
        height: u64,
        generated_at_ms: u64,
        payload: &T,
    ) -> Result<ExportRecord, ExportError> {
        let result = self.write(&kind, height, generated_at_ms, payload);
        match &result {
            Ok(record) => log::info!(
                "QSYS|mod=EXPORT|evt=WRITTEN|artifact={}|height={height}|bytes={}|digest={}|path={}",
                kind.label(),
                record.bytes,
                record.digest,
                record.path.display()
            ),
            Err(err) => log::error!(
                "QSYS|mod=EXPORT|evt=FAILED|artifact={}|height={height}|err={err}",
                kind.label()
            ),
        }
        result
    }

    fn write<T: Serialize + ?Sized>(
        &self,
        kind: &ArtifactKind,
        height: u64,
        generated_at_ms: u64,
        payload: &T,
    ) -> Result<ExportRecord, ExportError> {
        let bytes = serde_json::to_vec_pretty(payload).map_err(|source| ExportError::Encode {
            artifact: kind.label(),
            source,
        })?;
        let file_name = artifact_file_name(kind, height, generated_at_ms);
        let digest = payload_digest(&bytes);
        log::debug!(
            "QSYS|mod=EXPORT|evt=ENCODED|artifact={}|file={file_name}|bytes={}|digest={digest}",
            kind.label(),
            bytes.len()
        );
        let path = self.sink.persist(&file_name, &bytes)?;
        Ok(ExportRecord {
            kind: kind.clone(),
            path,
            bytes: bytes.len(),
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coins::Coins;
    use crate::leaderboard::LeaderboardEntry;
    use crate::test_util::temp_path as temp_dir;

    #[test]
    fn file_names_encode_kind_asset_height_and_time() {
        let leaderboard = ArtifactKind::Leaderboard {
            asset: "uluna".into(),
        };
        assert_eq!(
            artifact_file_name(&leaderboard, 42, 1_700_000_000_123),
            "tracking-uluna-42-1700000000123.json"
        );
        assert_eq!(
            artifact_file_name(&ArtifactKind::VestingSupply, 42, 7),
            "vesting-42-7.json"
        );
        assert_eq!(
            ArtifactKind::Leaderboard {
                asset: "ibc/27A..F".into()
            }
            .stem(),
            "tracking-ibc_27A__F"
        );
    }

    #[test]
    fn leaderboard_is_written_once_with_digest() {
        let dir = temp_dir("export");
        let exporter = SnapshotExporter::to_dir(&dir);
        let board = vec![LeaderboardEntry {
            address: "terra1abc".into(),
            amount: 130,
        }];
        let record = exporter
            .export(
                ArtifactKind::Leaderboard {
                    asset: "uluna".into(),
                },
                10,
                99,
                &board,
            )
            .unwrap();

        let written = fs::read(&record.path).unwrap();
        assert_eq!(record.bytes, written.len());
        assert_eq!(record.digest, payload_digest(&written));
        let parsed: Vec<LeaderboardEntry> = serde_json::from_slice(&written).unwrap();
        assert_eq!(parsed, board);
        assert!(!dir.join("tracking-uluna-10-99.json.tmp").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = temp_dir("rename");
        let sink = FileSink::new(&dir);
        // A non-empty directory squats on the final name, so the rename fails.
        fs::create_dir_all(dir.join("taken.json").join("inner")).unwrap();
        let err = sink.persist("taken.json", b"{}").unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
        assert!(!dir.join("taken.json.tmp").exists());
        assert!(dir.join("taken.json").is_dir());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_target_is_reported_not_raised() {
        let blocker = temp_dir("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let exporter = SnapshotExporter::to_dir(&blocker);
        let err = exporter
            .export(ArtifactKind::VestingSupply, 1, 1, &Coins::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));

        let ok = SnapshotExporter::to_dir(temp_dir("sibling"));
        let empty: Vec<LeaderboardEntry> = Vec::new();
        let record = ok
            .export(ArtifactKind::DelegatorLeaderboard, 1, 1, &empty)
            .unwrap();
        assert_eq!(fs::read_to_string(&record.path).unwrap(), "[]");
        fs::remove_file(&blocker).unwrap();
        fs::remove_dir_all(record.path.parent().unwrap()).unwrap();
    }
}
