use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::board::Column;
use crate::config::Config;
use crate::edit::{EditableField, FormRow, label};
use crate::git_status::{DisplayClass, MenuAffordances};
use crate::sync::RepoMeta;
use crate::task::{Task, format_hours};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_board(&self, meta: &RepoMeta, columns: &[Column<'_>], hidden: usize) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_board(&mut out, meta, columns, hidden)
    }

    pub fn write_board<W: Write>(
        &self,
        mut out: W,
        meta: &RepoMeta,
        columns: &[Column<'_>],
        hidden: usize,
    ) -> anyhow::Result<()> {
        writeln!(out, "branch: {}", meta.display_branch())?;
        let legend: Vec<String> = [DisplayClass::Added, DisplayClass::Modified, DisplayClass::NotIncluded]
            .into_iter()
            .map(|class| self.paint(class.as_str(), class_color(class)))
            .collect();
        writeln!(out, "legend: {}", legend.join("  "))?;

        for column in columns {
            writeln!(out)?;
            let heading = format!("{} ({})", column.status, column.tasks.len());
            writeln!(out, "{}", self.paint(&heading, "1"))?;
            if column.tasks.is_empty() {
                continue;
            }

            let headers = ["ID", "Title", "Tags", "Pending", "Estimate", "Git"]
                .map(str::to_string)
                .to_vec();
            let rows = column.tasks.iter().map(|task| self.card_row(task)).collect();
            write_table(&mut out, headers, rows)?;
        }

        if hidden > 0 {
            writeln!(out)?;
            writeln!(out, "{hidden} task(s) with an unknown status not shown")?;
        }
        Ok(())
    }

    fn card_row(&self, task: &Task) -> Vec<String> {
        let id = task
            .id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let git = match task.git_status.display_class() {
            Some(class) => self.paint(task.git_status.code(), class_color(class)),
            None => task.git_status.code().to_string(),
        };

        vec![
            self.paint(&id, "33"),
            label(task, EditableField::Title),
            label(task, EditableField::Tags),
            format_hours(task.pending),
            format_hours(task.estimation),
            git,
        ]
    }

    #[tracing::instrument(skip_all)]
    pub fn print_form(&self, rows: &[FormRow]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_form(&mut out, rows)
    }

    pub fn write_form<W: Write>(&self, out: W, rows: &[FormRow]) -> anyhow::Result<()> {
        let headers = vec!["Field".to_string(), "Value".to_string()];
        let rows = rows
            .iter()
            .map(|row| {
                let key = if row.read_only {
                    self.paint(&row.key, "2")
                } else {
                    row.key.clone()
                };
                vec![key, row.value.clone()]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn write_menu<W: Write>(&self, mut out: W, task: &Task, menu: Option<MenuAffordances>) -> anyhow::Result<()> {
        writeln!(out, "{} [{}]", task.title, task.git_status)?;
        let Some(menu) = menu else {
            writeln!(out, "  no actions for this git status")?;
            return Ok(());
        };
        for (enabled, name) in [
            (menu.include, "stage"),
            (menu.exclude, "unstage"),
            (menu.discard, "discard"),
        ] {
            if enabled {
                writeln!(out, "  {name}")?;
            }
        }
        Ok(())
    }

    pub fn print_menu(&self, task: &Task, menu: Option<MenuAffordances>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_menu(&mut out, task, menu)
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.paint_for(io::stdout().is_terminal(), message, "32"));
    }

    pub fn failure(&self, message: &str) {
        eprintln!("{}", self.paint_for(io::stderr().is_terminal(), message, "31"));
    }

    /// Colors text bound for stdout.
    fn paint(&self, text: &str, code: &str) -> String {
        self.paint_for(io::stdout().is_terminal(), text, code)
    }

    /// `terminal` is whether the destination stream is a terminal.
    fn paint_for(&self, terminal: bool, text: &str, code: &str) -> String {
        if !self.color || !terminal {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn class_color(class: DisplayClass) -> &'static str {
    match class {
        DisplayClass::Added => "32",
        DisplayClass::Modified => "33",
        DisplayClass::NotIncluded => "90",
    }
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
