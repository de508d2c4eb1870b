use crate::config::Stage;
use crate::service::NoteService;
use crate::service::links::LinkRequest;
use crate::service::note_service::{NoteStatistics, StoredNote, format_tags, split_references};
use crate::storage::note::{LinkEntry, NoteModel};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tracing::{error, info};

pub enum AppMode {
    List,
    View,
    Create,
    Search,
    LinkSelect,
    LinkIds,
    LinkDescribe,
    TagAdd,
    ReferenceAdd,
    ThoughtsEdit,
    Statistics,
    Help,
}

pub struct App {
    pub service: NoteService,
    pub stage: Stage,
    pub notes: Vec<StoredNote>,
    pub filtered_notes: Vec<StoredNote>,
    pub is_searching: bool,
    pub search_query: String,
    pub selected_index: usize,
    pub link_selected_index: usize,
    pub link_candidates: Vec<StoredNote>,
    /// Candidate indexes marked for a batch link.
    pub link_marked: Vec<usize>,
    pub link_targets: Vec<String>,
    pub statistics: Option<NoteStatistics>,
    pub mode: AppMode,
    pub current_note: Option<StoredNote>,
    pub input_buffer: String,
    pub should_quit: bool,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(service: NoteService) -> Result<Self> {
        let stage = Stage::Inbox;
        let notes = service.list_notes(stage)?;
        let filtered_notes = notes.clone();

        Ok(App {
            service,
            stage,
            notes,
            filtered_notes,
            is_searching: false,
            search_query: String::new(),
            selected_index: 0,
            link_selected_index: 0,
            link_candidates: Vec::new(),
            link_marked: Vec::new(),
            link_targets: Vec::new(),
            statistics: None,
            mode: AppMode::List,
            current_note: None,
            input_buffer: String::new(),
            should_quit: false,
            status_message: None,
        })
    }

    pub fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> Result<()> {
        match self.mode {
            AppMode::List => self.handle_list_key(key)?,
            AppMode::View => self.handle_view_key(key)?,
            AppMode::Create => self.handle_create_key(key, modifiers)?,
            AppMode::Search => self.handle_search_key(key)?,
            AppMode::LinkSelect => self.handle_link_select_key(key)?,
            AppMode::LinkIds => self.handle_link_ids_key(key)?,
            AppMode::LinkDescribe => self.handle_link_describe_key(key)?,
            AppMode::TagAdd | AppMode::ReferenceAdd => self.handle_metadata_key(key)?,
            AppMode::ThoughtsEdit => self.handle_thoughts_key(key, modifiers)?,
            AppMode::Statistics | AppMode::Help => {
                if matches!(key, KeyCode::Esc | KeyCode::Char('q')) {
                    self.mode = AppMode::List;
                }
            }
        }
        Ok(())
    }

    fn visible_notes(&self) -> &[StoredNote] {
        if self.is_searching {
            &self.filtered_notes
        } else {
            &self.notes
        }
    }

    fn refresh_notes(&mut self) -> Result<()> {
        self.notes = self.service.list_notes(self.stage)?;
        if self.is_searching {
            self.filtered_notes = self.service.search_notes(&self.search_query, self.stage)?;
        } else {
            self.filtered_notes = self.notes.clone();
        }
        if self.selected_index >= self.visible_notes().len() {
            self.selected_index = self.visible_notes().len().saturating_sub(1);
        }
        Ok(())
    }

    fn reload_current(&mut self) -> Result<()> {
        if let Some(ref current) = self.current_note {
            let id = current.note.zk_uid().to_string();
            if let Some(updated) = self.service.get_note(&id)? {
                self.current_note = Some(updated);
            }
        }
        self.refresh_notes()
    }

    fn clear_search(&mut self) {
        self.is_searching = false;
        self.search_query.clear();
        self.filtered_notes = self.notes.clone();
        self.selected_index = 0;
    }

    fn handle_list_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                if self.is_searching {
                    self.clear_search();
                } else {
                    self.should_quit = true;
                }
            }
            KeyCode::Tab => {
                self.stage = self.stage.next();
                self.clear_search();
                self.refresh_notes()?;
                self.status_message = None;
            }
            KeyCode::Char('/') => {
                self.mode = AppMode::Search;
                self.input_buffer = String::new();
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let max_index = self.visible_notes().len().saturating_sub(1);
                if self.selected_index < max_index {
                    self.selected_index += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }
            KeyCode::Char('n') => {
                self.mode = AppMode::Create;
                self.input_buffer = String::new();
            }
            KeyCode::Char('s') => match self.service.get_statistics() {
                Ok(stats) => {
                    self.statistics = Some(stats);
                    self.mode = AppMode::Statistics;
                }
                Err(e) => {
                    error!("Failed to collect statistics: {:#}", e);
                    self.status_message = Some(format!("✗ Failed to collect statistics: {}", e));
                }
            },
            KeyCode::Char('r') => {
                self.refresh_notes()?;
                self.status_message = Some("✓ Notes refreshed".to_string());
            }
            KeyCode::Char('?') => {
                self.mode = AppMode::Help;
            }
            KeyCode::Enter => {
                if let Some(stored) = self.visible_notes().get(self.selected_index).cloned() {
                    self.open_note(stored);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn open_note(&mut self, stored: StoredNote) {
        self.current_note = Some(stored);
        self.link_selected_index = 0;
        self.mode = AppMode::View;
    }

    /// Forward links followed by backward links, as shown in the view.
    fn current_links(&self) -> Vec<LinkEntry> {
        self.current_note
            .as_ref()
            .map(|stored| {
                let links = &stored.note.links;
                links.forward.iter().chain(links.backward.iter()).cloned().collect()
            })
            .unwrap_or_default()
    }

    fn handle_view_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::List;
                self.current_note = None;
                self.link_selected_index = 0;
                self.status_message = None;
            }
            KeyCode::Char('l') => {
                let Some(ref current) = self.current_note else {
                    return Ok(());
                };
                let current_path = current.path.clone();
                let mut candidates = Vec::new();
                for stage in Stage::ALL.into_iter().filter(|stage| stage.is_active()) {
                    candidates.extend(
                        self.service
                            .list_notes(stage)?
                            .into_iter()
                            .filter(|stored| stored.path != current_path),
                    );
                }
                if candidates.is_empty() {
                    self.status_message = Some("ℹ No other notes to link to".to_string());
                } else {
                    self.link_candidates = candidates;
                    self.link_marked.clear();
                    self.selected_index = 0;
                    self.mode = AppMode::LinkSelect;
                    self.status_message = None;
                }
            }
            KeyCode::Char('t') => {
                self.mode = AppMode::TagAdd;
                self.input_buffer = String::new();
                self.status_message = None;
            }
            KeyCode::Char('f') => {
                self.mode = AppMode::ReferenceAdd;
                self.input_buffer = String::new();
                self.status_message = None;
            }
            KeyCode::Char('o') => {
                self.input_buffer = self
                    .current_note
                    .as_ref()
                    .and_then(|stored| stored.note.content.thoughts.clone())
                    .unwrap_or_default();
                self.mode = AppMode::ThoughtsEdit;
                self.status_message = None;
            }
            KeyCode::Char('E') => {
                if let Some(ref stored) = self.current_note {
                    let filename = format!("{}.json", stored.file_name().trim_end_matches(".txt"));
                    let exported = stored
                        .note
                        .to_json()
                        .map_err(anyhow::Error::from)
                        .and_then(|json| Ok(std::fs::write(&filename, json)?));
                    self.status_message = Some(match exported {
                        Ok(()) => format!("✓ Exported to {}", filename),
                        Err(e) => format!("✗ Export failed: {}", e),
                    });
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let max_index = self.current_links().len().saturating_sub(1);
                if self.link_selected_index < max_index {
                    self.link_selected_index += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.link_selected_index > 0 {
                    self.link_selected_index -= 1;
                }
            }
            KeyCode::Enter => {
                if let Some(link) = self.current_links().get(self.link_selected_index) {
                    match self.service.get_note(&link.target_zk_uid)? {
                        Some(linked) => {
                            self.open_note(linked);
                            self.status_message = None;
                        }
                        None => {
                            self.status_message = Some(format!(
                                "✗ Note with ZK_UID {} not found",
                                link.target_zk_uid
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_create_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::List;
                self.input_buffer = String::new();
            }
            KeyCode::Char('s') if modifiers.contains(KeyModifiers::CONTROL) => {
                if self.input_buffer.trim().is_empty() {
                    return Ok(());
                }

                // First line is the title, the rest is the body
                let (title, body) = match self.input_buffer.split_once('\n') {
                    Some((title, body)) => (title.trim().to_string(), body.trim().to_string()),
                    None => (self.input_buffer.trim().to_string(), String::new()),
                };

                let existing = self.service.title_conflicts(&title, Stage::Permanent)?;
                if !existing.is_empty() {
                    self.status_message = Some(format!(
                        "✗ This title already exists in permanent notes with UUID(s): {}",
                        existing.join(", ")
                    ));
                    return Ok(());
                }

                match self.service.create_note(NoteModel::new(title, body), Stage::Inbox) {
                    Ok(stored) => {
                        self.stage = Stage::Inbox;
                        self.clear_search();
                        self.refresh_notes()?;
                        self.status_message = Some(format!(
                            "✓ Note created with UUID: {}",
                            stored.note.identifiers.uuid
                        ));
                        self.input_buffer = String::new();
                        self.open_note(stored);
                    }
                    Err(e) => {
                        error!("Failed to create note: {:#}", e);
                        self.status_message = Some(format!("✗ {}", e));
                    }
                }
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Enter => {
                self.input_buffer.push('\n');
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_search_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::List;
                self.input_buffer.clear();
                self.clear_search();
            }
            KeyCode::Enter => {
                self.selected_index = 0;
                self.input_buffer.clear();
                self.mode = AppMode::List;
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
                self.apply_search()?;
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                self.apply_search()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_search(&mut self) -> Result<()> {
        let query = self.input_buffer.trim().to_string();
        if query.is_empty() {
            self.clear_search();
        } else {
            self.filtered_notes = self.service.search_notes(&query, self.stage)?;
            self.search_query = query;
            self.is_searching = true;
            self.selected_index = 0;
        }
        Ok(())
    }

    fn handle_link_select_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::View;
                self.link_candidates.clear();
                self.link_marked.clear();
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let max_index = self.link_candidates.len().saturating_sub(1);
                if self.selected_index < max_index {
                    self.selected_index += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }
            KeyCode::Char(' ') => {
                if let Some(pos) = self.link_marked.iter().position(|i| *i == self.selected_index) {
                    self.link_marked.remove(pos);
                } else if self.selected_index < self.link_candidates.len() {
                    self.link_marked.push(self.selected_index);
                }
            }
            KeyCode::Char('i') => {
                self.input_buffer = String::new();
                self.mode = AppMode::LinkIds;
            }
            KeyCode::Enter => {
                let mut indexes = self.link_marked.clone();
                if indexes.is_empty() {
                    indexes.push(self.selected_index);
                }
                indexes.sort_unstable();
                self.link_targets = indexes
                    .into_iter()
                    .filter_map(|i| self.link_candidates.get(i))
                    .map(|target| target.note.zk_uid().to_string())
                    .collect();
                if !self.link_targets.is_empty() {
                    self.input_buffer = String::new();
                    self.mode = AppMode::LinkDescribe;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_link_ids_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::LinkSelect;
                self.input_buffer.clear();
            }
            KeyCode::Enter => {
                let targets: Vec<String> = LinkRequest::batch(&self.input_buffer, "")
                    .into_iter()
                    .map(|request| request.target)
                    .collect();
                if targets.is_empty() {
                    return Ok(());
                }
                self.link_targets = targets;
                self.input_buffer = String::new();
                self.mode = AppMode::LinkDescribe;
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_link_describe_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::LinkSelect;
                self.link_targets.clear();
                self.input_buffer.clear();
            }
            KeyCode::Enter => {
                let description = self.input_buffer.trim().to_string();
                if description.is_empty() {
                    return Ok(());
                }
                let source_id = self.current_note.as_ref().map(|c| c.note.zk_uid().to_string());
                let targets = std::mem::take(&mut self.link_targets);
                if let Some(source_id) = source_id {
                    let requests: Vec<LinkRequest> = targets
                        .into_iter()
                        .map(|target| LinkRequest::new(target, description.as_str()))
                        .collect();
                    self.status_message = Some(match self.service.link_notes(&source_id, &requests) {
                        Ok(report) if report.is_complete() => {
                            format!("✓ Linked to {} note(s)", report.linked.len())
                        }
                        Ok(report) => {
                            let failures: Vec<String> =
                                report.failures.iter().map(|e| e.to_string()).collect();
                            format!(
                                "✗ Linked {}, failed: {}",
                                report.linked.len(),
                                failures.join("; ")
                            )
                        }
                        Err(e) => {
                            error!("Linking {} failed: {:#}", source_id, e);
                            format!("✗ {}", e)
                        }
                    });
                    self.reload_current()?;
                }
                self.link_candidates.clear();
                self.link_marked.clear();
                self.input_buffer.clear();
                self.selected_index = 0;
                self.mode = AppMode::View;
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_metadata_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::View;
                self.input_buffer = String::new();
            }
            KeyCode::Enter => {
                if let Some(ref current) = self.current_note {
                    let id = current.note.zk_uid().to_string();
                    let added = if matches!(self.mode, AppMode::TagAdd) {
                        let tags = format_tags(&self.input_buffer);
                        for tag in &tags {
                            self.service.add_tag(&id, tag)?;
                        }
                        tags.len()
                    } else {
                        let references = split_references(&self.input_buffer);
                        for reference in &references {
                            self.service.add_reference(&id, reference)?;
                        }
                        references.len()
                    };
                    if added > 0 {
                        info!("Added {} metadata entries to {}", added, id);
                        self.reload_current()?;
                        self.status_message = Some(format!("✓ Added {}", added));
                    }
                }
                self.input_buffer = String::new();
                self.mode = AppMode::View;
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_thoughts_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> Result<()> {
        match key {
            KeyCode::Esc => {
                self.mode = AppMode::View;
                self.input_buffer = String::new();
            }
            KeyCode::Char('s') if modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(ref current) = self.current_note {
                    let id = current.note.zk_uid().to_string();
                    self.service.set_thoughts(&id, self.input_buffer.trim())?;
                    self.reload_current()?;
                    self.status_message = Some("✓ Thoughts saved".to_string());
                }
                self.input_buffer = String::new();
                self.mode = AppMode::View;
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Enter => {
                self.input_buffer.push('\n');
            }
            _ => {}
        }
        Ok(())
    }

    pub fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(frame.area());

        self.render_tabs(frame, chunks[0]);

        let help = match self.mode {
            AppMode::List => self.render_list(frame, chunks[1]),
            AppMode::View => self.render_view(frame, chunks[1]),
            AppMode::Create => self.render_input(frame, chunks[1], "New Note (first line is the title)"),
            AppMode::Search => self.render_search(frame, chunks[1]),
            AppMode::LinkSelect => self.render_link_select(frame, chunks[1]),
            AppMode::LinkIds => self.render_input(frame, chunks[1], "ZK_UIDs to link (comma-separated)"),
            AppMode::LinkDescribe => self.render_input(frame, chunks[1], "Link description"),
            AppMode::TagAdd => self.render_input(frame, chunks[1], "Tags (comma-separated)"),
            AppMode::ReferenceAdd => {
                self.render_input(frame, chunks[1], "References (comma-separated)")
            }
            AppMode::ThoughtsEdit => self.render_input(frame, chunks[1], "Thoughts/Connections"),
            AppMode::Statistics => self.render_statistics(frame, chunks[1]),
            AppMode::Help => self.render_help(frame, chunks[1]),
        };

        self.render_footer(frame, chunks[2], help);
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<String> = Stage::ALL
            .iter()
            .map(|stage| {
                if stage.is_active() {
                    stage.label().to_string()
                } else {
                    format!("{} (reserved)", stage.label())
                }
            })
            .collect();
        let selected = Stage::ALL.iter().position(|s| *s == self.stage).unwrap_or(0);
        let tabs = Tabs::new(titles)
            .select(selected)
            .block(Block::default().borders(Borders::ALL).title("zettelbox"))
            .style(Style::default().fg(Color::Cyan))
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect, help: &str) {
        let footer = match self.status_message {
            Some(ref message) => {
                let color = if message.starts_with('✓') {
                    Color::Green
                } else if message.starts_with('✗') {
                    Color::Red
                } else {
                    Color::Yellow
                };
                Paragraph::new(message.as_str())
                    .block(Block::default().borders(Borders::ALL).title("Status"))
                    .style(Style::default().fg(color))
            }
            None => Paragraph::new(help)
                .block(Block::default().borders(Borders::ALL).title("Help"))
                .style(Style::default().fg(Color::DarkGray)),
        };
        frame.render_widget(footer, area);
    }

    fn render_list(&self, frame: &mut Frame, area: Rect) -> &'static str {
        let notes = self.visible_notes();
        let items: Vec<ListItem> = notes
            .iter()
            .map(|stored| {
                let note = &stored.note;
                let mut lines = vec![Line::from(vec![
                    Span::styled(note.zk_uid(), Style::default().fg(Color::DarkGray)),
                    Span::raw("  "),
                    Span::styled(note.title(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
                ])];

                let mut meta = Vec::new();
                if !note.metadata.tags.is_empty() {
                    meta.push(Span::styled(
                        format!("[{}] ", note.metadata.tags.join(" ")),
                        Style::default().fg(Color::Blue),
                    ));
                }
                let link_count = note.links.forward.len() + note.links.backward.len();
                if link_count > 0 {
                    meta.push(Span::styled(
                        format!("🔗 {}", link_count),
                        Style::default().fg(Color::Magenta),
                    ));
                }
                if !meta.is_empty() {
                    lines.push(Line::from(meta));
                }
                ListItem::new(lines)
            })
            .collect();

        let title = if self.is_searching {
            format!("{} notes matching {:?} ({} found)", self.stage.label(), self.search_query, notes.len())
        } else {
            format!("{} notes ({})", self.stage.label(), notes.len())
        };

        let mut state = ListState::default();
        if !notes.is_empty() {
            state.select(Some(self.selected_index));
        }
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, area, &mut state);

        "j/k: navigate | Tab: stage | n: new | /: search | s: stats | r: refresh | ?: help | Enter: view | Esc: quit"
    }

    fn render_view(&self, frame: &mut Frame, area: Rect) -> &'static str {
        let Some(ref stored) = self.current_note else {
            return "Esc: back";
        };
        let note = &stored.note;
        let label = Style::default().fg(Color::Cyan);
        let mut lines: Vec<Line> = vec![
            Line::from(vec![
                Span::styled("ZK_UID: ", label),
                Span::raw(note.zk_uid()),
                Span::styled("  Date: ", label),
                Span::raw(note.date.as_str()),
                Span::styled("  Stage: ", label),
                Span::raw(stored.stage.label()),
            ]),
            Line::from(vec![
                Span::styled("UUID: ", label),
                Span::styled(note.identifiers.uuid.as_str(), Style::default().fg(Color::DarkGray)),
            ]),
        ];

        if !note.metadata.tags.is_empty() {
            lines.push(Line::from(vec![
                Span::styled("Tags: ", label),
                Span::styled(
                    note.metadata.tags.join(" "),
                    Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
                ),
            ]));
        }
        if !note.metadata.references.is_empty() {
            lines.push(Line::from(vec![
                Span::styled("References: ", label),
                Span::raw(note.metadata.references.join(", ")),
            ]));
        }

        lines.push(Line::default());
        for line in note.content.body.lines() {
            lines.push(Line::from(Span::styled(line, Style::default().fg(Color::White))));
        }

        if let Some(ref thoughts) = note.content.thoughts {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Thoughts/Connections:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            for line in thoughts.lines() {
                lines.push(Line::from(line));
            }
        }

        let sections = [
            ("→ Links forward:", &note.links.forward, Color::Green, 0),
            ("← Linked backward:", &note.links.backward, Color::Magenta, note.links.forward.len()),
        ];
        for (heading, links, color, offset) in sections {
            if links.is_empty() {
                continue;
            }
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                heading,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            for (i, link) in links.iter().enumerate() {
                let prefix = if offset + i == self.link_selected_index {
                    Span::styled("  ▶ ", Style::default().fg(Color::Yellow))
                } else {
                    Span::raw("    ")
                };
                lines.push(Line::from(vec![
                    prefix,
                    Span::styled(link.target_zk_uid.as_str(), Style::default().fg(Color::DarkGray)),
                    Span::raw(format!(" ({})", link.description)),
                ]));
            }
        }

        let content = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(note.title()))
            .wrap(Wrap { trim: false });
        frame.render_widget(content, area);

        "l: link | t: tag | f: reference | o: thoughts | j/k: select link | Enter: open | E: export | Esc: back"
    }

    fn render_input(&self, frame: &mut Frame, area: Rect, title: &str) -> &'static str {
        let char_count = self.input_buffer.chars().count();
        let input = Paragraph::new(self.input_buffer.as_str())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} ({} chars)", title, char_count)),
            )
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::White));
        frame.render_widget(input, area);

        match self.mode {
            AppMode::Create | AppMode::ThoughtsEdit => "Ctrl+S: save | Esc: cancel",
            _ => "Enter: confirm | Esc: cancel",
        }
    }

    fn render_search(&self, frame: &mut Frame, area: Rect) -> &'static str {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let input = Paragraph::new(self.input_buffer.as_str())
            .block(Block::default().borders(Borders::ALL).title(format!(
                "Search {} (keyword or regex, case-insensitive)",
                self.stage.label()
            )))
            .style(Style::default().fg(Color::Yellow));
        frame.render_widget(input, chunks[0]);
        self.render_list(frame, chunks[1]);

        "Type to search | Enter: keep results | Esc: cancel"
    }

    fn render_link_select(&self, frame: &mut Frame, area: Rect) -> &'static str {
        let items: Vec<ListItem> = self
            .link_candidates
            .iter()
            .enumerate()
            .map(|(i, stored)| {
                let mark = if self.link_marked.contains(&i) { "[x] " } else { "[ ] " };
                ListItem::new(Line::from(vec![
                    Span::styled(mark, Style::default().fg(Color::Green)),
                    Span::styled(stored.note.zk_uid(), Style::default().fg(Color::DarkGray)),
                    Span::raw("  "),
                    Span::raw(stored.note.title()),
                    Span::styled(
                        format!("  [{}]", stored.stage.label()),
                        Style::default().fg(Color::Blue),
                    ),
                ]))
            })
            .collect();

        let mut state = ListState::default();
        state.select(Some(self.selected_index));
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Link to note"))
            .highlight_style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, area, &mut state);

        "j/k: navigate | Space: mark | i: type ZK_UIDs | Enter: link marked or current | Esc: cancel"
    }

    fn render_statistics(&self, frame: &mut Frame, area: Rect) -> &'static str {
        let lines: Vec<Line> = match self.statistics {
            Some(ref stats) => {
                let mut lines = vec![Line::from(format!("Total notes: {}", stats.total_notes))];
                for (stage, count) in &stats.notes_per_stage {
                    lines.push(Line::from(format!("  {}: {}", stage.label(), count)));
                }
                lines.push(Line::from(format!("Forward links: {}", stats.forward_links)));
                lines.push(Line::from(format!("Backward links: {}", stats.backward_links)));
                lines.push(Line::from(format!(
                    "Tags: {} ({} distinct)",
                    stats.total_tags, stats.unique_tags_count
                )));
                lines
            }
            None => vec![Line::from("No statistics collected")],
        };
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Statistics"));
        frame.render_widget(paragraph, area);

        "Esc: back"
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) -> &'static str {
        let text = vec![
            Line::from("Notes start in the inbox and are identified by their ZK_UID,"),
            Line::from("a creation timestamp (YYYYMMDD-HHMMSS) that prefixes the file name."),
            Line::default(),
            Line::from("List:  Tab switch stage, n new note, / search, Enter open"),
            Line::from("View:  l link to another note, t add tags, f add references,"),
            Line::from("       o edit thoughts, E export JSON, j/k + Enter follow a link"),
            Line::default(),
            Line::from("Link picker: Space marks several notes, i types ZK_UIDs by hand."),
            Line::default(),
            Line::from("Linking records a forward link here and a backward link"),
            Line::from("(\"Linked from: <title>\") on the target note."),
            Line::default(),
            Line::from(format!(
                "Notes directory: {}",
                self.service.config().root.display()
            )),
        ];
        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);

        "Esc: back"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::ids;
    use crate::storage::store;
    use tempfile::{TempDir, tempdir};

    fn app_with_two_notes() -> (TempDir, App, String) {
        let dir = tempdir().unwrap();
        let service = NoteService::new(Config::with_root(dir.path()));
        service.initialize().unwrap();
        service
            .create_note(NoteModel::new("Source", "from here"), Stage::Inbox)
            .unwrap();

        let mut other = NoteModel::new("Other", "to there");
        other.identifiers.uuid = ids::generate_uuid();
        other.identifiers.zk_uid = "20000101-000000".to_string();
        let path = service.config().stage_dir(Stage::Inbox).join(other.file_name());
        store::write_text(&path, &other.format()).unwrap();

        let app = App::new(service).unwrap();
        (dir, app, "20000101-000000".to_string())
    }

    fn press(app: &mut App, key: KeyCode) {
        app.handle_key(key, KeyModifiers::NONE).unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_typed_ids_link_as_one_batch_and_report_missing() {
        let (_dir, mut app, other_id) = app_with_two_notes();
        // Newest first: the created note is selected.
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('l'));
        assert!(matches!(app.mode, AppMode::LinkSelect));

        press(&mut app, KeyCode::Char('i'));
        type_text(&mut app, &format!("20991231-000000, {}", other_id));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.link_targets, vec!["20991231-000000".to_string(), other_id.clone()]);

        type_text(&mut app, "related");
        press(&mut app, KeyCode::Enter);

        let status = app.status_message.clone().unwrap();
        assert!(status.starts_with('✗'), "{}", status);
        assert!(status.contains("20991231-000000 not found"), "{}", status);

        let source = app.current_note.clone().unwrap().note;
        assert_eq!(source.links.forward.len(), 2);
        let other = app.service.get_note(&other_id).unwrap().unwrap().note;
        assert_eq!(other.links.backward[0].description, "Linked from: Source");
    }

    #[test]
    fn test_marked_candidates_link_together() {
        let (_dir, mut app, other_id) = app_with_two_notes();
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.link_targets, vec![other_id.clone()]);

        type_text(&mut app, "see also");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.status_message.as_deref(), Some("✓ Linked to 1 note(s)"));
        assert!(matches!(app.mode, AppMode::View));
    }

    #[test]
    fn test_statistics_collected_on_entry() {
        let (_dir, mut app, _) = app_with_two_notes();
        assert!(app.statistics.is_none());
        press(&mut app, KeyCode::Char('s'));
        assert!(matches!(app.mode, AppMode::Statistics));
        assert_eq!(app.statistics.as_ref().unwrap().total_notes, 2);
    }
}
