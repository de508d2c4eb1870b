//! Paired forward/backward link maintenance across note files.
//!
//! A forward link on the source and the matching backward link on the target
//! live in two separate files. They are written one after the other with no
//! rollback: targets are persisted as they are processed and the source is
//! persisted once at the end. A failure in between leaves the pair
//! asymmetric, and concurrent callers on the same files are not guarded.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::note::NoteModel;
use crate::storage::{ids, parser, store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub target: String,
    pub description: String,
}

impl LinkRequest {
    pub fn new(target: impl Into<String>, description: impl Into<String>) -> Self {
        LinkRequest {
            target: target.into(),
            description: description.into(),
        }
    }

    /// One request per comma-separated id in `targets`, all sharing `description`.
    pub fn batch(targets: &str, description: &str) -> Vec<LinkRequest> {
        targets
            .split(',')
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(|target| LinkRequest::new(target, description))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Note with ZK_UID {0} not found")]
    NoteNotFound(String),

    #[error("Linked note with ZK_UID {0} not found")]
    LinkTargetNotFound(String),

    #[error("Failed to look up ZK_UID {id}: {source}")]
    Lookup {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a batch that got past locating its source note.
#[derive(Debug)]
pub struct LinkReport {
    pub source: PathBuf,
    /// Targets that received their backward link, in request order.
    pub linked: Vec<String>,
    /// Per-target failures. Their forward entries were still recorded on the source.
    pub failures: Vec<LinkError>,
}

impl LinkReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct LinkEngine {
    directories: Vec<PathBuf>,
}

impl LinkEngine {
    /// `directories` are searched in order when resolving a zk_uid prefix.
    pub fn new(directories: Vec<PathBuf>) -> Self {
        LinkEngine { directories }
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Add forward links from `source_id` to every target, and a backward link
    /// `Linked from: <source title>` on each target that can be found.
    pub fn link_forward(
        &self,
        source_id: &str,
        targets: &[LinkRequest],
    ) -> Result<LinkReport, LinkError> {
        let source_path = locate(source_id, &self.directories)?
            .ok_or_else(|| LinkError::NoteNotFound(source_id.to_string()))?;
        let mut source = load(&source_path)?;
        let backward_description = format!("Linked from: {}", source.title());

        let mut report = LinkReport {
            source: source_path.clone(),
            linked: Vec::new(),
            failures: Vec::new(),
        };

        for request in targets {
            source.add_forward_link(&request.target, &request.description);
            if !ids::is_zk_uid(&request.target) {
                debug!("Resolving {} as a zk_uid prefix", request.target);
            }

            match locate(&request.target, &self.directories)? {
                None => {
                    warn!("Linked note with ZK_UID {} not found", request.target);
                    report
                        .failures
                        .push(LinkError::LinkTargetNotFound(request.target.clone()));
                }
                Some(target_path) if target_path == source_path => {
                    // Self-link: the source is written last, so record it in memory.
                    source.add_backward_link(source_id, &backward_description);
                    report.linked.push(request.target.clone());
                }
                Some(target_path) => {
                    let mut target = load(&target_path)?;
                    target.add_backward_link(source_id, &backward_description);
                    persist(&target_path, &target)?;
                    debug!("Backward link {} -> {}", request.target, source_id);
                    report.linked.push(request.target.clone());
                }
            }
        }

        persist(&source_path, &source)?;
        info!(
            "Linked {} to {} note(s), {} failure(s)",
            source_id,
            report.linked.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Record backward links on a single note in `directory`, without touching
    /// the notes they point at.
    #[allow(dead_code)]
    pub fn link_backward(
        &self,
        target_id: &str,
        sources: &[LinkRequest],
        directory: &Path,
    ) -> Result<PathBuf, LinkError> {
        let path = locate(target_id, &[directory.to_path_buf()])?
            .ok_or_else(|| LinkError::NoteNotFound(target_id.to_string()))?;
        let mut note = load(&path)?;
        for request in sources {
            note.add_backward_link(&request.target, &request.description);
        }
        persist(&path, &note)?;
        Ok(path)
    }
}

fn locate(id: &str, directories: &[PathBuf]) -> Result<Option<PathBuf>, LinkError> {
    store::find_note_filepath(id, directories).map_err(|source| LinkError::Lookup {
        id: id.to_string(),
        source,
    })
}

fn load(path: &Path) -> Result<NoteModel, LinkError> {
    let raw = store::read_text(path).map_err(|source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parser::parse(&raw);
    for warning in &parsed.warnings {
        warn!("{}: {}", path.display(), warning);
    }
    Ok(parsed.note)
}

fn persist(path: &Path, note: &NoteModel) -> Result<(), LinkError> {
    store::write_text(path, &note.format()).map_err(|source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::note::{LinkEntry, NoteIdentifiers};
    use tempfile::tempdir;

    fn write_note(dir: &Path, zk_uid: &str, title: &str) -> PathBuf {
        let mut note = NoteModel::new(title, format!("Body of {}", title));
        note.identifiers = NoteIdentifiers {
            uuid: format!("uuid-{}", zk_uid),
            zk_uid: zk_uid.to_string(),
        };
        note.date = "2024-01-31 09:45:12".to_string();
        let path = dir.join(note.file_name());
        store::write_text(&path, &note.format()).unwrap();
        path
    }

    fn read_note(path: &Path) -> NoteModel {
        parser::parse(&store::read_text(path).unwrap()).note
    }

    #[test]
    fn test_link_forward_pairs_both_files() {
        let dir = tempdir().unwrap();
        let source = write_note(dir.path(), "20240101-100000", "Source note");
        let target = write_note(dir.path(), "20240102-100000", "Target note");
        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);

        let report = engine
            .link_forward("20240101-100000", &[LinkRequest::new("20240102-100000", "desc")])
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.source, source);
        assert_eq!(report.linked, vec!["20240102-100000"]);
        assert_eq!(
            read_note(&source).links.forward,
            vec![LinkEntry::new("20240102-100000", "desc")]
        );
        assert!(read_note(&source).links.backward.is_empty());
        assert_eq!(
            read_note(&target).links.backward,
            vec![LinkEntry::new("20240101-100000", "Linked from: Source note")]
        );
        assert!(read_note(&target).links.forward.is_empty());
    }

    #[test]
    fn test_link_forward_partial_failure() {
        let dir = tempdir().unwrap();
        let source = write_note(dir.path(), "20240101-100000", "Source");
        let target = write_note(dir.path(), "20240102-100000", "T1");
        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);

        let report = engine
            .link_forward(
                "20240101-100000",
                &[
                    LinkRequest::new("20240102-100000", "desc1"),
                    LinkRequest::new("20991231-235959", "desc2"),
                ],
            )
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.linked, vec!["20240102-100000"]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            LinkError::LinkTargetNotFound(id) if id == "20991231-235959"
        ));

        let forward = read_note(&source).links.forward;
        assert_eq!(
            forward,
            vec![
                LinkEntry::new("20240102-100000", "desc1"),
                LinkEntry::new("20991231-235959", "desc2"),
            ]
        );
        assert_eq!(read_note(&target).links.backward.len(), 1);
    }

    #[test]
    fn test_link_forward_keeps_header_like_body_lines() {
        let dir = tempdir().unwrap();
        let mut note = NoteModel::new("Weekly sync", "Agenda\ndate: friday\nbring notes");
        note.identifiers = NoteIdentifiers {
            uuid: "uuid-sync".to_string(),
            zk_uid: "20240101-100000".to_string(),
        };
        note.date = "2024-01-31 09:45:12".to_string();
        let source = dir.path().join(note.file_name());
        store::write_text(&source, &note.format()).unwrap();
        write_note(dir.path(), "20240102-100000", "Target");
        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);

        engine
            .link_forward("20240101-100000", &[LinkRequest::new("20240102-100000", "desc")])
            .unwrap();

        let reloaded = read_note(&source);
        assert_eq!(reloaded.content.body, "Agenda\ndate: friday\nbring notes");
        assert_eq!(reloaded.links.forward.len(), 1);
    }

    #[test]
    fn test_batch_requests_from_comma_separated_ids() {
        assert_eq!(
            LinkRequest::batch(" 20240102-100000, ,20240103 ", "see also"),
            vec![
                LinkRequest::new("20240102-100000", "see also"),
                LinkRequest::new("20240103", "see also"),
            ]
        );
        assert!(LinkRequest::batch(" , ", "x").is_empty());
    }

    #[test]
    fn test_missing_source_writes_nothing() {
        let dir = tempdir().unwrap();
        let target = write_note(dir.path(), "20240102-100000", "Target");
        let before = store::read_text(&target).unwrap();
        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);

        let err = engine
            .link_forward("20991231", &[LinkRequest::new("20240102-100000", "desc")])
            .unwrap_err();

        assert!(matches!(err, LinkError::NoteNotFound(id) if id == "20991231"));
        assert_eq!(store::read_text(&target).unwrap(), before);
    }

    #[test]
    fn test_targets_found_across_directories() {
        let inbox = tempdir().unwrap();
        let permanent = tempdir().unwrap();
        let source = write_note(inbox.path(), "20240101-100000", "Inbox note");
        let target = write_note(permanent.path(), "20240102-100000", "Permanent note");
        let engine = LinkEngine::new(vec![
            inbox.path().to_path_buf(),
            permanent.path().to_path_buf(),
        ]);

        let report = engine
            .link_forward("20240101", &[LinkRequest::new("20240102", "prefix")])
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(read_note(&source).links.forward[0].target_zk_uid, "20240102");
        assert_eq!(
            read_note(&target).links.backward,
            vec![LinkEntry::new("20240101", "Linked from: Inbox note")]
        );
    }

    #[test]
    fn test_repeated_link_is_not_deduplicated() {
        let dir = tempdir().unwrap();
        let source = write_note(dir.path(), "20240101-100000", "Source");
        let target = write_note(dir.path(), "20240102-100000", "Target");
        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);
        let request = [LinkRequest::new("20240102-100000", "again")];

        engine.link_forward("20240101-100000", &request).unwrap();
        engine.link_forward("20240101-100000", &request).unwrap();

        assert_eq!(read_note(&source).links.forward.len(), 2);
        assert_eq!(read_note(&target).links.backward.len(), 2);
    }

    #[test]
    fn test_self_link_keeps_both_entries() {
        let dir = tempdir().unwrap();
        let source = write_note(dir.path(), "20240101-100000", "Loop");
        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);

        engine
            .link_forward("20240101-100000", &[LinkRequest::new("20240101-100000", "self")])
            .unwrap();

        let note = read_note(&source);
        assert_eq!(note.links.forward, vec![LinkEntry::new("20240101-100000", "self")]);
        assert_eq!(
            note.links.backward,
            vec![LinkEntry::new("20240101-100000", "Linked from: Loop")]
        );
    }

    #[test]
    fn test_link_backward_single_file() {
        let dir = tempdir().unwrap();
        let target = write_note(dir.path(), "20240102-100000", "Target");
        let engine = LinkEngine::new(Vec::new());

        let path = engine
            .link_backward(
                "20240102-100000",
                &[
                    LinkRequest::new("20240101-100000", "Linked from: A"),
                    LinkRequest::new("20240103-100000", "Linked from: B"),
                ],
                dir.path(),
            )
            .unwrap();

        assert_eq!(path, target);
        let note = read_note(&target);
        assert_eq!(note.links.backward.len(), 2);
        assert_eq!(note.links.backward[1].description, "Linked from: B");
    }

    #[test]
    fn test_link_backward_missing_note() {
        let dir = tempdir().unwrap();
        let engine = LinkEngine::new(Vec::new());
        let err = engine
            .link_backward("20240102", &[LinkRequest::new("x", "y")], dir.path())
            .unwrap_err();
        assert!(matches!(err, LinkError::NoteNotFound(_)));
    }

    #[test]
    fn test_linking_preserves_other_fields() {
        let dir = tempdir().unwrap();
        let source = write_note(dir.path(), "20240101-100000", "Source");
        let mut note = read_note(&source);
        note.add_tag("#keep");
        note.add_reference("ref2020");
        note.set_thoughts("still here");
        store::write_text(&source, &note.format()).unwrap();
        write_note(dir.path(), "20240102-100000", "Target");

        let engine = LinkEngine::new(vec![dir.path().to_path_buf()]);
        engine
            .link_forward("20240101-100000", &[LinkRequest::new("20240102-100000", "d")])
            .unwrap();

        let after = read_note(&source);
        assert_eq!(after.metadata.tags, vec!["#keep"]);
        assert_eq!(after.metadata.references, vec!["ref2020"]);
        assert_eq!(after.content.thoughts.as_deref(), Some("still here"));
        assert_eq!(after.identifiers, note.identifiers);
        assert_eq!(after.date, note.date);
    }
}
