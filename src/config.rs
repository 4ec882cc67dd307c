//! User configuration — keybindings, pane defaults, favorites and
//! file-type handlers (spec §6's persisted state).
//!
//! Stored as TOML at `$XDG_CONFIG_HOME/tfm/config.toml` (default
//! `~/.config/tfm/config.toml`), loaded through `serde`+`toml` with
//! `#[serde(default)]` so a missing or partial file still produces a
//! usable config — spec §6's "treats missing fields as defaults supplied
//! by a template".

use std::collections::HashMap;
use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};

use crate::app::event::KeyPayload;
use crate::core::sort::SortKey;

// ───────────────────────────────────────── actions ───────────

/// All user-triggerable actions the main screen and dialogs dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    Home,
    End,
    EnterDir,
    ParentDir,
    SwitchPane,
    ToggleHidden,
    ToggleSelect,
    SelectAll,
    DeselectAll,
    InvertSelection,
    CycleSortKey,
    ToggleSortDirection,
    ToggleDirsFirst,
    Filter,
    Copy,
    Move,
    Delete,
    MakeDir,
    Rename,
    ArchiveCreate,
    ArchiveExtract,
    DiffView,
    Search,
    Jump,
    Drives,
    BatchRename,
    ViewFile,
    InfoDialog,
    ToggleLogPane,
    ToggleGrouping,
    Quit,
}

impl Action {
    pub const ALL: &[Action] = &[
        Action::MoveUp,
        Action::MoveDown,
        Action::PageUp,
        Action::PageDown,
        Action::Home,
        Action::End,
        Action::EnterDir,
        Action::ParentDir,
        Action::SwitchPane,
        Action::ToggleHidden,
        Action::ToggleSelect,
        Action::SelectAll,
        Action::DeselectAll,
        Action::InvertSelection,
        Action::CycleSortKey,
        Action::ToggleSortDirection,
        Action::ToggleDirsFirst,
        Action::Filter,
        Action::Copy,
        Action::Move,
        Action::Delete,
        Action::MakeDir,
        Action::Rename,
        Action::ArchiveCreate,
        Action::ArchiveExtract,
        Action::DiffView,
        Action::Search,
        Action::Jump,
        Action::Drives,
        Action::BatchRename,
        Action::ViewFile,
        Action::InfoDialog,
        Action::ToggleLogPane,
        Action::ToggleGrouping,
        Action::Quit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Action::MoveUp => "Move Up",
            Action::MoveDown => "Move Down",
            Action::PageUp => "Page Up",
            Action::PageDown => "Page Down",
            Action::Home => "First Entry",
            Action::End => "Last Entry",
            Action::EnterDir => "Enter / Open",
            Action::ParentDir => "Parent Directory",
            Action::SwitchPane => "Switch Active Pane",
            Action::ToggleHidden => "Toggle Hidden",
            Action::ToggleSelect => "Toggle Selection",
            Action::SelectAll => "Select All",
            Action::DeselectAll => "Deselect All",
            Action::InvertSelection => "Invert Selection",
            Action::CycleSortKey => "Cycle Sort Key",
            Action::ToggleSortDirection => "Reverse Sort",
            Action::ToggleDirsFirst => "Toggle Dirs First",
            Action::Filter => "Filter",
            Action::Copy => "Copy",
            Action::Move => "Move",
            Action::Delete => "Delete",
            Action::MakeDir => "Make Directory",
            Action::Rename => "Rename",
            Action::ArchiveCreate => "Create Archive",
            Action::ArchiveExtract => "Extract Archive",
            Action::DiffView => "Compare Panes",
            Action::Search => "Search",
            Action::Jump => "Jump To Directory",
            Action::Drives => "Drives / Locations",
            Action::BatchRename => "Batch Rename",
            Action::ViewFile => "View File",
            Action::InfoDialog => "File Info",
            Action::ToggleLogPane => "Toggle Log Pane",
            Action::ToggleGrouping => "Toggle Grouping",
            Action::Quit => "Quit",
        }
    }

    fn config_key(self) -> &'static str {
        match self {
            Action::MoveUp => "move_up",
            Action::MoveDown => "move_down",
            Action::PageUp => "page_up",
            Action::PageDown => "page_down",
            Action::Home => "home",
            Action::End => "end",
            Action::EnterDir => "enter",
            Action::ParentDir => "parent",
            Action::SwitchPane => "switch_pane",
            Action::ToggleHidden => "toggle_hidden",
            Action::ToggleSelect => "toggle_select",
            Action::SelectAll => "select_all",
            Action::DeselectAll => "deselect_all",
            Action::InvertSelection => "invert_selection",
            Action::CycleSortKey => "cycle_sort_key",
            Action::ToggleSortDirection => "toggle_sort_direction",
            Action::ToggleDirsFirst => "toggle_dirs_first",
            Action::Filter => "filter",
            Action::Copy => "copy",
            Action::Move => "move",
            Action::Delete => "delete",
            Action::MakeDir => "make_dir",
            Action::Rename => "rename",
            Action::ArchiveCreate => "archive_create",
            Action::ArchiveExtract => "archive_extract",
            Action::DiffView => "diff_view",
            Action::Search => "search",
            Action::Jump => "jump",
            Action::Drives => "drives",
            Action::BatchRename => "batch_rename",
            Action::ViewFile => "view_file",
            Action::InfoDialog => "info",
            Action::ToggleLogPane => "toggle_log_pane",
            Action::ToggleGrouping => "toggle_grouping",
            Action::Quit => "quit",
        }
    }

    fn from_config_key(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.config_key() == s)
    }
}

// ───────────────────────────────────────── key bind ──────────

/// A single key binding — key code + modifier combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyBind {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBind {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    const MASK: KeyModifiers = KeyModifiers::CONTROL.union(KeyModifiers::ALT).union(KeyModifiers::SHIFT);

    pub fn matches(&self, event: KeyEvent) -> bool {
        self.code == event.code && (self.modifiers & Self::MASK) == (event.modifiers & Self::MASK)
    }

    pub fn matches_payload(&self, event: &KeyPayload) -> bool {
        self.code == event.code && (self.modifiers & Self::MASK) == (event.modifiers & Self::MASK)
    }

    pub fn from_key_event(event: KeyEvent) -> Self {
        Self {
            code: event.code,
            modifiers: event.modifiers & Self::MASK,
        }
    }

    pub fn display(&self) -> String {
        let mut s = String::new();
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            s.push_str("Ctrl+");
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            s.push_str("Alt+");
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            s.push_str("Shift+");
        }
        s.push_str(&code_display(self.code));
        s
    }

    fn to_config_string(&self) -> String {
        self.display()
    }

    fn parse(s: &str) -> Option<Self> {
        let mut modifiers = KeyModifiers::NONE;
        let parts: Vec<&str> = s.split('+').collect();
        let key_part = parts.last()?;
        for &part in &parts[..parts.len() - 1] {
            match part.to_lowercase().as_str() {
                "ctrl" => modifiers |= KeyModifiers::CONTROL,
                "alt" => modifiers |= KeyModifiers::ALT,
                "shift" => modifiers |= KeyModifiers::SHIFT,
                _ => return None,
            }
        }
        let code = parse_code(key_part)?;
        Some(KeyBind { code, modifiers })
    }
}

fn code_display(code: KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "Space".into(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Up => "Up".into(),
        KeyCode::Down => "Down".into(),
        KeyCode::Left => "Left".into(),
        KeyCode::Right => "Right".into(),
        KeyCode::Enter => "Enter".into(),
        KeyCode::Esc => "Esc".into(),
        KeyCode::Tab => "Tab".into(),
        KeyCode::Backspace => "Backspace".into(),
        KeyCode::Delete => "Delete".into(),
        KeyCode::Home => "Home".into(),
        KeyCode::End => "End".into(),
        KeyCode::PageUp => "PageUp".into(),
        KeyCode::PageDown => "PageDown".into(),
        KeyCode::F(n) => format!("F{n}"),
        other => format!("{other:?}"),
    }
}

fn parse_code(key_part: &str) -> Option<KeyCode> {
    Some(match key_part.to_lowercase().as_str() {
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backspace" | "bksp" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" => KeyCode::PageDown,
        "space" => KeyCode::Char(' '),
        s if s.starts_with('f') && s.len() > 1 => KeyCode::F(s[1..].parse().ok()?),
        s if s.chars().count() == 1 => KeyCode::Char(s.chars().next()?),
        _ => return None,
    })
}

impl Serialize for KeyBind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_config_string())
    }
}

impl<'de> Deserialize<'de> for KeyBind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyBind::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid key binding: {s}")))
    }
}

// ───────────────────────────────────────── config ────────────

/// The on-disk shape, loaded via `serde`+`toml`. Field names double as
/// the TOML keys. `#[serde(default)]` on every field means a truncated
/// or hand-edited file never fails to load — missing keys fall back to
/// [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    bindings: HashMap<String, Vec<KeyBind>>,
    double_click_ms: u64,
    default_sort_key: String,
    default_sort_descending: bool,
    dirs_first: bool,
    show_hidden: bool,
    favorites: Vec<String>,
    /// `true` selects the 19-column `YYYY-MM-DD HH:MM:SS` date format,
    /// `false` the 14-column short form (spec §4.5).
    full_date_format: bool,
    /// Extension (lowercase, no dot) → shell command template invoked by
    /// the enter action on a file (`{}` substituted with the path).
    file_type_handlers: HashMap<String, String>,
    log_capacity: usize,
    jump_scan_limit: usize,
    min_group_size: usize,
    /// Share of the body given to the log pane when visible, as a percentage.
    log_fraction: u16,
    /// Left pane's share of the two side-by-side list panes, as a percentage.
    pane_split: u16,
    log_pane_visible: bool,
    grouping_enabled: bool,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            bindings: default_bindings_raw(),
            double_click_ms: 250,
            default_sort_key: "name".into(),
            default_sort_descending: false,
            dirs_first: true,
            show_hidden: false,
            favorites: Vec::new(),
            full_date_format: false,
            file_type_handlers: HashMap::new(),
            log_capacity: 1000,
            jump_scan_limit: 5000,
            min_group_size: 5,
            log_fraction: 30,
            pane_split: 50,
            log_pane_visible: false,
            grouping_enabled: false,
        }
    }
}

fn default_bindings_raw() -> HashMap<String, Vec<KeyBind>> {
    AppConfig::default_bindings()
        .into_iter()
        .map(|(action, binds)| (action.config_key().to_string(), binds))
        .collect()
}

/// Runtime configuration, built from [`ConfigFile`] with the string keys
/// resolved back into [`Action`] variants.
pub struct AppConfig {
    pub bindings: HashMap<Action, Vec<KeyBind>>,
    pub double_click_ms: u64,
    pub default_sort_key: SortKey,
    pub default_sort_descending: bool,
    pub dirs_first: bool,
    pub show_hidden: bool,
    pub favorites: Vec<PathBuf>,
    pub full_date_format: bool,
    pub file_type_handlers: HashMap<String, String>,
    pub log_capacity: usize,
    pub jump_scan_limit: usize,
    pub min_group_size: usize,
    pub log_fraction: u16,
    pub pane_split: u16,
    pub log_pane_visible: bool,
    pub grouping_enabled: bool,
}

impl AppConfig {
    pub fn default_bindings() -> HashMap<Action, Vec<KeyBind>> {
        use Action::*;
        use KeyCode::*;
        let n = KeyModifiers::NONE;
        let ctrl = KeyModifiers::CONTROL;
        let shift = KeyModifiers::SHIFT;
        let mut m = HashMap::new();

        m.insert(MoveUp, vec![KeyBind::new(Up, n), KeyBind::new(Char('k'), n)]);
        m.insert(MoveDown, vec![KeyBind::new(Down, n), KeyBind::new(Char('j'), n)]);
        m.insert(PageUp, vec![KeyBind::new(PageUp, n)]);
        m.insert(PageDown, vec![KeyBind::new(PageDown, n)]);
        m.insert(Home, vec![KeyBind::new(Home, n)]);
        m.insert(End, vec![KeyBind::new(End, n)]);
        m.insert(EnterDir, vec![KeyBind::new(Enter, n)]);
        m.insert(ParentDir, vec![KeyBind::new(Backspace, n), KeyBind::new(Left, n)]);
        m.insert(SwitchPane, vec![KeyBind::new(Tab, n)]);
        m.insert(ToggleHidden, vec![KeyBind::new(Char('.'), n)]);
        m.insert(ToggleSelect, vec![KeyBind::new(Char(' '), n)]);
        m.insert(SelectAll, vec![KeyBind::new(Char('a'), ctrl)]);
        m.insert(DeselectAll, vec![KeyBind::new(Char('d'), ctrl)]);
        m.insert(InvertSelection, vec![KeyBind::new(Char('*'), n)]);
        m.insert(CycleSortKey, vec![KeyBind::new(Char('s'), n)]);
        m.insert(ToggleSortDirection, vec![KeyBind::new(Char('s'), shift)]);
        m.insert(ToggleDirsFirst, vec![KeyBind::new(Char('g'), n)]);
        m.insert(Filter, vec![KeyBind::new(Char('f'), n)]);
        m.insert(Copy, vec![KeyBind::new(F(5), n), KeyBind::new(Char('c'), ctrl)]);
        m.insert(Move, vec![KeyBind::new(F(6), n), KeyBind::new(Char('m'), ctrl)]);
        m.insert(Delete, vec![KeyBind::new(F(8), n), KeyBind::new(Delete, n)]);
        m.insert(MakeDir, vec![KeyBind::new(F(7), n)]);
        m.insert(Rename, vec![KeyBind::new(Char('r'), ctrl)]);
        m.insert(ArchiveCreate, vec![KeyBind::new(Char('z'), ctrl)]);
        m.insert(ArchiveExtract, vec![KeyBind::new(Char('x'), ctrl)]);
        m.insert(DiffView, vec![KeyBind::new(Char('u'), ctrl)]);
        m.insert(Search, vec![KeyBind::new(F(3), n.union(shift)), KeyBind::new(Char('/'), n)]);
        m.insert(Jump, vec![KeyBind::new(Char('g'), ctrl)]);
        m.insert(Drives, vec![KeyBind::new(F(2), n)]);
        m.insert(BatchRename, vec![KeyBind::new(Char('b'), ctrl)]);
        m.insert(ViewFile, vec![KeyBind::new(F(3), n)]);
        m.insert(InfoDialog, vec![KeyBind::new(Char('i'), ctrl)]);
        m.insert(ToggleLogPane, vec![KeyBind::new(Char('l'), ctrl)]);
        m.insert(ToggleGrouping, vec![KeyBind::new(Char('e'), n)]);
        m.insert(Quit, vec![KeyBind::new(F(10), n), KeyBind::new(Char('q'), n)]);

        m
    }

    fn from_file(file: ConfigFile) -> Self {
        let mut bindings = Self::default_bindings();
        for (key, binds) in file.bindings {
            if let Some(action) = Action::from_config_key(&key) {
                if !binds.is_empty() {
                    bindings.insert(action, binds);
                }
            }
        }
        let default_sort_key = match file.default_sort_key.as_str() {
            "size" => SortKey::Size,
            "mtime" => SortKey::Mtime,
            "extension" => SortKey::Extension,
            _ => SortKey::Name,
        };
        Self {
            bindings,
            double_click_ms: file.double_click_ms.clamp(100, 2000),
            default_sort_key,
            default_sort_descending: file.default_sort_descending,
            dirs_first: file.dirs_first,
            show_hidden: file.show_hidden,
            favorites: file.favorites.into_iter().map(PathBuf::from).collect(),
            full_date_format: file.full_date_format,
            file_type_handlers: file.file_type_handlers,
            log_capacity: file.log_capacity.max(16),
            jump_scan_limit: file.jump_scan_limit.max(1),
            min_group_size: file.min_group_size.max(1),
            log_fraction: file.log_fraction.clamp(10, 60),
            pane_split: file.pane_split.clamp(20, 80),
            log_pane_visible: file.log_pane_visible,
            grouping_enabled: file.grouping_enabled,
        }
    }

    pub fn match_key(&self, event: &KeyPayload) -> Option<Action> {
        let mut best: Option<Action> = None;
        let mut best_mod_count = -1i32;
        for (&action, binds) in &self.bindings {
            for bind in binds {
                if bind.matches_payload(event) {
                    let mc = bind.modifiers.bits().count_ones() as i32;
                    if mc > best_mod_count {
                        best = Some(action);
                        best_mod_count = mc;
                    }
                }
            }
        }
        best
    }

    pub fn display_bindings(&self, action: Action) -> String {
        match self.bindings.get(&action) {
            Some(binds) if !binds.is_empty() => binds.iter().map(|b| b.display()).collect::<Vec<_>>().join("/"),
            _ => "unbound".into(),
        }
    }

    fn short_binding(&self, action: Action) -> String {
        self.bindings
            .get(&action)
            .and_then(|b| b.first())
            .map(|b| b.display())
            .unwrap_or_else(|| "?".into())
    }

    pub fn status_bar_hint(&self) -> String {
        format!(
            "{}: nav | {}: copy | {}: move | {}: del | {}: quit",
            self.short_binding(Action::MoveUp),
            self.short_binding(Action::Copy),
            self.short_binding(Action::Move),
            self.short_binding(Action::Delete),
            self.short_binding(Action::Quit),
        )
    }

    // ── persistence ─────────────────────────────────────────────

    /// Load config from disk, falling back to defaults on any error
    /// (missing file, malformed TOML).
    pub fn load() -> Self {
        let path = config_path();
        let file = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default();
        Self::from_file(file)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = ConfigFile {
            bindings: self
                .bindings
                .iter()
                .map(|(action, binds)| (action.config_key().to_string(), binds.clone()))
                .collect(),
            double_click_ms: self.double_click_ms,
            default_sort_key: match self.default_sort_key {
                SortKey::Name => "name".into(),
                SortKey::Size => "size".into(),
                SortKey::Mtime => "mtime".into(),
                SortKey::Extension => "extension".into(),
            },
            default_sort_descending: self.default_sort_descending,
            dirs_first: self.dirs_first,
            show_hidden: self.show_hidden,
            favorites: self.favorites.iter().map(|p| p.display().to_string()).collect(),
            full_date_format: self.full_date_format,
            file_type_handlers: self.file_type_handlers.clone(),
            log_capacity: self.log_capacity,
            jump_scan_limit: self.jump_scan_limit,
            min_group_size: self.min_group_size,
            log_fraction: self.log_fraction,
            pane_split: self.pane_split,
            log_pane_visible: self.log_pane_visible,
            grouping_enabled: self.grouping_enabled,
        };
        std::fs::write(&path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/tfm/config.toml`, falling back to `~/.config` via
/// the `dirs` crate.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tfm")
        .join("config.toml")
}
