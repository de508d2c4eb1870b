use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Config, Stage};
use crate::service::links::{LinkEngine, LinkReport, LinkRequest};
use crate::storage::ids;
use crate::storage::note::NoteModel;
use crate::storage::parser::{self, ParsedNote};
use crate::storage::store::{self, NOTE_SUFFIX};

/// A note together with where it lives.
#[derive(Debug, Clone)]
pub struct StoredNote {
    pub path: PathBuf,
    pub stage: Stage,
    pub note: NoteModel,
}

impl StoredNote {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

pub struct NoteService {
    config: Config,
    links: LinkEngine,
}

impl NoteService {
    pub fn new(config: Config) -> Self {
        let links = LinkEngine::new(config.link_directories());
        NoteService { config, links }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the stage directories and fill in identity lines missing from
    /// hand-made inbox notes.
    pub fn initialize(&self) -> Result<()> {
        for stage in Stage::ALL {
            let dir = self.config.stage_dir(stage);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let updated = self.backfill_identity(Stage::Inbox)?;
        if updated > 0 {
            info!("Backfilled identity lines in {} inbox note(s)", updated);
        }
        Ok(())
    }

    /// Persist a new note. Identifiers are assigned here, exactly once.
    ///
    /// Title uniqueness is not checked; callers use `title_conflicts` first.
    pub fn create_note(&self, mut note: NoteModel, stage: Stage) -> Result<StoredNote> {
        if !stage.is_active() {
            bail!("{} notes cannot be created yet", stage.label());
        }
        if note.is_persisted() {
            bail!("Note already persisted with ZK_UID {}", note.zk_uid());
        }
        let title = note.title().trim();
        if title.is_empty() {
            bail!("Note title cannot be empty");
        }
        if title.contains(['/', '\\']) {
            bail!("Note title cannot contain path separators: {}", title);
        }

        note.identifiers.uuid = ids::generate_uuid();
        note.identifiers.zk_uid = ids::generate_zk_uid();

        let path = self.config.stage_dir(stage).join(note.file_name());
        if path.exists() {
            bail!("A note already exists at {}", path.display());
        }
        store::write_text(&path, &note.format())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(
            "Note created with UUID {} as {}",
            note.identifiers.uuid,
            path.display()
        );
        Ok(StoredNote { path, stage, note })
    }

    pub fn load(&self, path: &Path) -> Result<ParsedNote> {
        let raw = store::read_text(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed = parser::parse(&raw);
        if !parsed.is_clean() {
            for warning in &parsed.warnings {
                warn!("{}: {}", path.display(), warning);
            }
        }
        Ok(parsed)
    }

    /// Resolve a zk_uid prefix in the inbox and permanent notes.
    pub fn get_note(&self, id: &str) -> Result<Option<StoredNote>> {
        let Some(path) = store::find_note_filepath(id, self.links.directories())? else {
            return Ok(None);
        };
        let note = self.load(&path)?.note;
        let stage = self.stage_of(&path);
        Ok(Some(StoredNote { path, stage, note }))
    }

    /// All notes of a stage, newest zk_uid first.
    pub fn list_notes(&self, stage: Stage) -> Result<Vec<StoredNote>> {
        let dir = self.config.stage_dir(stage);
        let mut notes = Vec::new();
        for name in store::list_filenames_with_suffix(&dir, NOTE_SUFFIX)? {
            let path = dir.join(name);
            match self.load(&path) {
                Ok(parsed) => notes.push(StoredNote {
                    path,
                    stage,
                    note: parsed.note,
                }),
                Err(e) => warn!("Skipping unreadable note: {:#}", e),
            }
        }
        notes.sort_by(|a, b| b.note.zk_uid().cmp(a.note.zk_uid()));
        Ok(notes)
    }

    /// `(title, uuid)` for every note in a stage.
    pub fn list_titles(&self, stage: Stage) -> Result<Vec<(String, String)>> {
        Ok(self
            .list_notes(stage)?
            .into_iter()
            .map(|stored| (stored.note.content.title, stored.note.identifiers.uuid))
            .collect())
    }

    /// UUIDs of notes in `stage` that already use `title`.
    pub fn title_conflicts(&self, title: &str, stage: Stage) -> Result<Vec<String>> {
        Ok(self
            .list_titles(stage)?
            .into_iter()
            .filter(|(existing, _)| existing == title)
            .map(|(_, uuid)| uuid)
            .collect())
    }

    pub fn search_notes(&self, keyword: &str, stage: Stage) -> Result<Vec<StoredNote>> {
        let dir = self.config.stage_dir(stage);
        let mut hits = Vec::new();
        for name in store::search_notes(keyword, &dir)? {
            let path = dir.join(name);
            let note = self.load(&path)?.note;
            hits.push(StoredNote { path, stage, note });
        }
        debug!("Search {:?} in {} matched {}", keyword, stage.label(), hits.len());
        Ok(hits)
    }

    pub fn link_notes(&self, source_id: &str, requests: &[LinkRequest]) -> Result<LinkReport> {
        Ok(self.links.link_forward(source_id, requests)?)
    }

    /// Whitespace inside the tag becomes `_` so it survives a reload.
    pub fn add_tag(&self, id: &str, tag: &str) -> Result<StoredNote> {
        let tag = join_words(tag);
        if tag.is_empty() {
            bail!("Tag cannot be empty");
        }
        self.update_note(id, |note| note.add_tag(tag))
    }

    pub fn add_reference(&self, id: &str, reference: &str) -> Result<StoredNote> {
        self.update_note(id, |note| note.add_reference(reference))
    }

    pub fn set_thoughts(&self, id: &str, thoughts: &str) -> Result<StoredNote> {
        self.update_note(id, |note| note.set_thoughts(thoughts))
    }

    fn update_note(&self, id: &str, edit: impl FnOnce(&mut NoteModel)) -> Result<StoredNote> {
        let mut stored = self
            .get_note(id)?
            .ok_or_else(|| anyhow::anyhow!("Note with ZK_UID {} not found", id))?;
        edit(&mut stored.note);
        store::write_text(&stored.path, &stored.note.format())
            .with_context(|| format!("Failed to write {}", stored.path.display()))?;
        Ok(stored)
    }

    /// Fill empty or missing `UUID:` / `Date:` lines in place. Returns how many
    /// files were rewritten.
    pub fn backfill_identity(&self, stage: Stage) -> Result<usize> {
        let dir = self.config.stage_dir(stage);
        let mut updated = 0;
        for name in store::list_filenames_with_suffix(&dir, NOTE_SUFFIX)? {
            let path = dir.join(&name);
            let raw = match store::read_text(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping {} during backfill: {}", path.display(), e);
                    continue;
                }
            };
            if let Some(fixed) = backfill_text(&raw) {
                store::write_text(&path, &fixed)?;
                info!("Updated file: {}", name);
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub fn get_statistics(&self) -> Result<NoteStatistics> {
        let mut stats = NoteStatistics::default();
        let mut unique_tags = HashSet::new();

        for stage in Stage::ALL {
            let notes = self.list_notes(stage)?;
            stats.notes_per_stage.push((stage, notes.len()));
            for stored in &notes {
                let note = &stored.note;
                stats.total_notes += 1;
                stats.forward_links += note.links.forward.len();
                stats.backward_links += note.links.backward.len();
                stats.total_tags += note.metadata.tags.len();
                unique_tags.extend(note.metadata.tags.iter().map(|t| t.to_lowercase()));
            }
        }

        stats.unique_tags_count = unique_tags.len();
        Ok(stats)
    }

    fn stage_of(&self, path: &Path) -> Stage {
        Stage::ALL
            .into_iter()
            .find(|stage| path.parent() == Some(self.config.stage_dir(*stage).as_path()))
            .unwrap_or(Stage::Inbox)
    }
}

#[derive(Debug, Default)]
pub struct NoteStatistics {
    pub notes_per_stage: Vec<(Stage, usize)>,
    pub total_notes: usize,
    pub forward_links: usize,
    pub backward_links: usize,
    pub total_tags: usize,
    pub unique_tags_count: usize,
}

/// Comma-separated user input to `#tag` form. Tags are stored space-separated,
/// so words inside one tag are joined with `_`.
pub fn format_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(join_words)
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            if tag.starts_with('#') {
                tag
            } else {
                format!("#{}", tag)
            }
        })
        .collect()
}

fn join_words(tag: &str) -> String {
    tag.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Comma-separated references, trimmed.
pub fn split_references(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .map(str::to_string)
        .collect()
}

/// Line-level repair of the identity header. `None` when nothing is missing.
fn backfill_text(raw: &str) -> Option<String> {
    let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();

    let uuid_index = lines.iter().position(|line| line.starts_with("UUID:"));
    let date_index = lines.iter().position(|line| line.starts_with("Date:"));
    let has_value = |index: Option<usize>, key: &str| {
        index.is_some_and(|i| !lines[i][key.len()..].trim().is_empty())
    };
    let has_uuid = has_value(uuid_index, "UUID:");
    let has_date = has_value(date_index, "Date:");

    if has_uuid && has_date {
        return None;
    }

    if !has_uuid {
        let line = format!("UUID: {}", ids::generate_uuid());
        match uuid_index {
            Some(i) => lines[i] = line,
            None => lines.insert(0, line),
        }
    }

    if !has_date {
        let line = format!("Date: {}", ids::current_date());
        // Re-scan: inserting the UUID line may have shifted indexes.
        match lines.iter().position(|line| line.starts_with("Date:")) {
            Some(i) => lines[i] = line,
            None => {
                let anchor = lines
                    .iter()
                    .position(|line| line.starts_with("ZK_UID:"))
                    .or_else(|| lines.iter().position(|line| line.starts_with("UUID:")))
                    .unwrap_or(0);
                lines.insert(anchor + 1, line);
            }
        }
    }

    let mut fixed = lines.join("\n");
    if raw.ends_with('\n') {
        fixed.push('\n');
    }
    Some(fixed)
}
