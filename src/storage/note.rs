use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids;

/// Identifiers assigned at first persistence. Empty strings mean "not yet assigned".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteIdentifiers {
    pub uuid: String,
    pub zk_uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub target_zk_uid: String,
    pub description: String,
}

impl LinkEntry {
    pub fn new(target_zk_uid: impl Into<String>, description: impl Into<String>) -> Self {
        LinkEntry {
            target_zk_uid: target_zk_uid.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLinks {
    pub forward: Vec<LinkEntry>,
    pub backward: Vec<LinkEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    pub references: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContent {
    pub title: String,
    pub body: String,
    pub thoughts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteModel {
    pub identifiers: NoteIdentifiers,
    pub date: String,
    pub metadata: NoteMetadata,
    pub links: NoteLinks,
    pub content: NoteContent,
}

impl NoteModel {
    /// Create an unpersisted note dated now. Identifiers stay empty until the
    /// note is first written.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        NoteModel {
            identifiers: NoteIdentifiers::default(),
            date: ids::current_date(),
            metadata: NoteMetadata::default(),
            links: NoteLinks::default(),
            content: NoteContent {
                title: title.into(),
                body: body.into(),
                thoughts: None,
            },
        }
    }

    pub fn is_persisted(&self) -> bool {
        !self.identifiers.zk_uid.is_empty()
    }

    pub fn title(&self) -> &str {
        &self.content.title
    }

    pub fn zk_uid(&self) -> &str {
        &self.identifiers.zk_uid
    }

    pub fn add_reference(&mut self, reference: impl Into<String>) {
        self.metadata.references.push(reference.into());
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.metadata.tags.push(tag.into());
    }

    pub fn add_forward_link(&mut self, zk_uid: impl Into<String>, description: impl Into<String>) {
        self.links.forward.push(LinkEntry::new(zk_uid, description));
    }

    pub fn add_backward_link(&mut self, zk_uid: impl Into<String>, description: impl Into<String>) {
        self.links.backward.push(LinkEntry::new(zk_uid, description));
    }

    pub fn set_thoughts(&mut self, thoughts: impl Into<String>) {
        self.content.thoughts = Some(thoughts.into());
    }

    /// `<zk_uid>-<title with spaces replaced by underscores>.txt`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.txt",
            self.identifiers.zk_uid,
            self.content.title.replace(' ', "_")
        )
    }

    /// Canonical on-disk text. Empty sections are left out entirely.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("UUID: {}\n", self.identifiers.uuid));
        out.push_str(&format!("Title: {}\n", self.content.title));
        out.push_str(&format!("ZK_UID: {}\n", self.identifiers.zk_uid));
        out.push_str(&format!("Date: {}\n", self.date));
        out.push_str(&format!("Content:\n{}\n", self.content.body));

        if !self.metadata.references.is_empty() {
            out.push_str(&format!(
                "\nReferences:\n{}\n",
                self.metadata.references.join(", ")
            ));
        }

        if !self.metadata.tags.is_empty() {
            out.push_str(&format!("\nTags: {}\n", self.metadata.tags.join(" ")));
        }

        if !self.links.forward.is_empty() {
            out.push_str("\nLinks Forward to Other Notes:\n");
            push_link_lines(&mut out, &self.links.forward);
        }

        if !self.links.backward.is_empty() {
            out.push_str("\nLinked Backward from Other Notes:\n");
            push_link_lines(&mut out, &self.links.backward);
        }

        if let Some(thoughts) = self.content.thoughts.as_deref().filter(|t| !t.is_empty()) {
            out.push_str(&format!("\nThoughts/Connections:\n{}\n", thoughts));
        }

        out
    }

    /// Pretty JSON export of the record.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn push_link_lines(out: &mut String, links: &[LinkEntry]) {
    for link in links {
        out.push_str(&format!(
            "Related to: ZK_UID {} ({})\n",
            link.target_zk_uid, link.description
        ));
    }
}

impl fmt::Display for NoteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NoteModel {
        let mut note = NoteModel::new("Atomic notes", "One idea per note.");
        note.identifiers = NoteIdentifiers {
            uuid: "0b7c1f4e-5a55-4c1e-9f0e-2d8c8f6b7a10".to_string(),
            zk_uid: "20240131-094512".to_string(),
        };
        note.date = "2024-01-31 09:45:12".to_string();
        note
    }

    #[test]
    fn test_new_note_is_unpersisted() {
        let note = NoteModel::new("Title", "Body");
        assert!(!note.is_persisted());
        assert_eq!(note.identifiers.uuid, "");
        assert!(note.content.thoughts.is_none());
    }

    #[test]
    fn test_file_name_replaces_spaces() {
        assert_eq!(sample().file_name(), "20240131-094512-Atomic_notes.txt");
    }

    #[test]
    fn test_sparse_format() {
        let text = sample().format();
        assert_eq!(
            text,
            "UUID: 0b7c1f4e-5a55-4c1e-9f0e-2d8c8f6b7a10\n\
             Title: Atomic notes\n\
             ZK_UID: 20240131-094512\n\
             Date: 2024-01-31 09:45:12\n\
             Content:\n\
             One idea per note.\n"
        );
        assert!(!text.contains("References:"));
        assert!(!text.contains("Tags:"));
        assert!(!text.contains("Links Forward"));
        assert!(!text.contains("Linked Backward"));
        assert!(!text.contains("Thoughts/Connections:"));
    }

    #[test]
    fn test_full_format() {
        let mut note = sample();
        note.add_reference("luhmann1992");
        note.add_reference("ahrens2017");
        note.add_tag("#method");
        note.add_tag("#writing");
        note.add_forward_link("20240201-101010", "builds on");
        note.add_backward_link("20240115-080000", "Linked from: Slip box");
        note.set_thoughts("Compare with index cards.");

        let text = note.to_string();
        assert!(text.contains("\nReferences:\nluhmann1992, ahrens2017\n"));
        assert!(text.contains("\nTags: #method #writing\n"));
        assert!(text.contains(
            "\nLinks Forward to Other Notes:\nRelated to: ZK_UID 20240201-101010 (builds on)\n"
        ));
        assert!(text.contains(
            "\nLinked Backward from Other Notes:\nRelated to: ZK_UID 20240115-080000 (Linked from: Slip box)\n"
        ));
        assert!(text.ends_with("\nThoughts/Connections:\nCompare with index cards.\n"));
    }

    #[test]
    fn test_mutators_do_not_deduplicate() {
        let mut note = sample();
        note.add_forward_link("20240201-101010", "same");
        note.add_forward_link("20240201-101010", "same");
        note.add_tag("#x");
        note.add_tag("#x");
        assert_eq!(note.links.forward.len(), 2);
        assert_eq!(note.metadata.tags.len(), 2);
    }

    #[test]
    fn test_set_thoughts_replaces() {
        let mut note = sample();
        note.set_thoughts("first");
        note.set_thoughts("second");
        assert_eq!(note.content.thoughts.as_deref(), Some("second"));
    }

    #[test]
    fn test_empty_thoughts_are_omitted() {
        let mut note = sample();
        note.set_thoughts("");
        assert!(!note.format().contains("Thoughts/Connections:"));
    }

    #[test]
    fn test_json_export() {
        let mut note = sample();
        note.add_tag("#method");
        let json = note.to_json().unwrap();
        let back: NoteModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
    }
}
