//! Decoder for the plain-text note format produced by `NoteModel::format`.
//!
//! The grammar is a fixed vocabulary of `Header:` lines. Anything missing or
//! unreadable falls back to a default and is reported as a `ParseWarning`;
//! parsing itself never fails, so old or hand-edited notes stay loadable.
//!
//! Header recognition depends on position. Before `Content:` any header is
//! accepted in any case. After it only the trailing sections are, spelled the
//! way `format` writes them, after a blank line, and in canonical order. A
//! body line such as `date: friday` therefore stays part of the body.
//! Section values are trimmed, so leading indentation of a body is not kept.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use super::ids;
use super::note::{LinkEntry, NoteContent, NoteIdentifiers, NoteLinks, NoteMetadata, NoteModel};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(UUID|Title|ZK_UID|Date|Content|References|Tags|Links forward to Other Notes|Linked backward from Other Notes|Thoughts/Connections):",
    )
    .unwrap()
});

/// Headers recognised after `Content:`, including the older lowercase link
/// spellings.
const TRAILING_HEADERS: [(&str, Section); 7] = [
    ("References:", Section::References),
    ("Tags:", Section::Tags),
    ("Links Forward to Other Notes:", Section::LinksForward),
    ("Links forward to Other Notes:", Section::LinksForward),
    ("Linked Backward from Other Notes:", Section::LinksBackward),
    ("Linked backward from Other Notes:", Section::LinksBackward),
    ("Thoughts/Connections:", Section::Thoughts),
];

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ZK_UID[ \t]+([0-9A-Za-z.\-]+)[ \t]+\((.*)\)").unwrap());

/// Declaration order is the canonical section order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Uuid,
    Title,
    ZkUid,
    Date,
    Content,
    References,
    Tags,
    LinksForward,
    LinksBackward,
    Thoughts,
}

impl Section {
    const ALL: [Section; 10] = [
        Section::Uuid,
        Section::Title,
        Section::ZkUid,
        Section::Date,
        Section::Content,
        Section::References,
        Section::Tags,
        Section::LinksForward,
        Section::LinksBackward,
        Section::Thoughts,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Section::Uuid => "UUID",
            Section::Title => "Title",
            Section::ZkUid => "ZK_UID",
            Section::Date => "Date",
            Section::Content => "Content",
            Section::References => "References",
            Section::Tags => "Tags",
            Section::LinksForward => "Links forward to Other Notes",
            Section::LinksBackward => "Linked backward from Other Notes",
            Section::Thoughts => "Thoughts/Connections",
        }
    }

    fn from_header(header: &str) -> Option<Section> {
        Section::ALL
            .into_iter()
            .find(|section| section.keyword().eq_ignore_ascii_case(header))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// Section absent or empty; a default was substituted.
    MissingSection(Section),
    /// Header seen more than once; only the first occurrence was used.
    DuplicateSection(Section),
    MalformedLink { section: Section, line: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MissingSection(section) => {
                write!(f, "missing '{}' section, default used", section.keyword())
            }
            ParseWarning::DuplicateSection(section) => {
                write!(f, "repeated '{}' section ignored", section.keyword())
            }
            ParseWarning::MalformedLink { section, line } => {
                write!(f, "unreadable line in '{}': {}", section.keyword(), line)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub note: NoteModel,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedNote {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Rebuild a `NoteModel` from stored text.
pub fn parse(raw: &str) -> ParsedNote {
    let mut warnings = Vec::new();
    let sections = split_sections(raw, &mut warnings);
    let get = |section: Section| section_text(&sections, section);

    let mut required = |section: Section| -> String {
        match get(section).filter(|text| !text.is_empty()) {
            Some(text) => text.to_string(),
            None => {
                warnings.push(ParseWarning::MissingSection(section));
                String::new()
            }
        }
    };

    let uuid = required(Section::Uuid);
    let title = required(Section::Title);
    let zk_uid = required(Section::ZkUid);
    let date = required(Section::Date);
    let date = if date.is_empty() { ids::current_date() } else { date };

    // An empty body is legitimate; only a missing header is reported.
    let body = match get(Section::Content) {
        Some(text) => text.to_string(),
        None => {
            warnings.push(ParseWarning::MissingSection(Section::Content));
            String::new()
        }
    };

    let references = get(Section::References)
        .filter(|text| !text.is_empty())
        .map(|text| text.split(", ").map(str::to_string).collect())
        .unwrap_or_default();

    let tags = get(Section::Tags)
        .map(|text| text.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let forward = parse_links(Section::LinksForward, get(Section::LinksForward), &mut warnings);
    let backward = parse_links(Section::LinksBackward, get(Section::LinksBackward), &mut warnings);

    let thoughts = get(Section::Thoughts)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    ParsedNote {
        note: NoteModel {
            identifiers: NoteIdentifiers { uuid, zk_uid },
            date,
            metadata: NoteMetadata { references, tags },
            links: NoteLinks { forward, backward },
            content: NoteContent {
                title,
                body,
                thoughts,
            },
        },
        warnings,
    }
}

fn section_text<'a>(sections: &[(Section, &'a str)], section: Section) -> Option<&'a str> {
    sections
        .iter()
        .find(|(s, _)| *s == section)
        .map(|(_, text)| *text)
}

/// Split on header lines. Each value runs to the next header and is trimmed.
fn split_sections<'a>(raw: &'a str, warnings: &mut Vec<ParseWarning>) -> Vec<(Section, &'a str)> {
    let mut sections: Vec<(Section, &str)> = Vec::new();
    let mut close = |section: Section, text: &'a str| {
        if sections.iter().any(|(s, _)| *s == section) {
            warnings.push(ParseWarning::DuplicateSection(section));
        } else {
            sections.push((section, text.trim()));
        }
    };

    // Open section and the offset its value starts at.
    let mut open: Option<(Section, usize)> = None;
    let mut previous_blank = true;
    let mut offset = 0;

    for line in raw.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let header = match open {
            Some((current, _)) if current >= Section::Content => {
                trailing_header(line, current).filter(|_| previous_blank)
            }
            _ => leading_header(line),
        };
        previous_blank = line.trim().is_empty();

        let Some((section, value_offset)) = header else {
            continue;
        };
        if let Some((current, value_start)) = open.take() {
            close(current, &raw[value_start..line_start]);
        }
        open = Some((section, line_start + value_offset));
    }

    if let Some((current, value_start)) = open {
        close(current, &raw[value_start..]);
    }
    sections
}

fn leading_header(line: &str) -> Option<(Section, usize)> {
    let caps = HEADER_RE.captures(line)?;
    let whole = caps.get(0)?;
    Section::from_header(&caps[1]).map(|section| (section, whole.end()))
}

fn trailing_header(line: &str, current: Section) -> Option<(Section, usize)> {
    TRAILING_HEADERS
        .iter()
        .find(|(keyword, section)| *section > current && line.starts_with(keyword))
        .map(|(keyword, section)| (*section, keyword.len()))
}

fn parse_links(
    section: Section,
    text: Option<&str>,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<LinkEntry> {
    let Some(text) = text else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match LINK_RE.captures(line) {
            Some(caps) => links.push(LinkEntry::new(&caps[1], &caps[2])),
            None => warnings.push(ParseWarning::MalformedLink {
                section,
                line: line.to_string(),
            }),
        }
    }
    links
}
