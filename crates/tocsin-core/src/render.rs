use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime;
use crate::store::Progress;
use crate::task::{Priority, Task};

const HEADERS: [&str; 6] = ["ID", "Done", "Pri", "Due", "Task", "Notes"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[&Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let today = datetime::to_project_date(now);
        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.id.to_string(), "33");
            let done = if task.completed { "x" } else { "" }.to_string();

            let pri = task.priority.label().to_string();
            let pri = match task.priority {
                Priority::High => self.paint(&pri, "31"),
                Priority::Medium => self.paint(&pri, "33"),
                Priority::Low => self.paint(&pri, "36"),
            };

            let due = task.due_date.map(datetime::canonical).unwrap_or_default();
            let due = match task.due_date {
                Some(date) if !task.completed && date < today => self.paint(&due, "31"),
                _ => due,
            };

            let text = if task.completed {
                self.paint(&task.text, "2")
            } else {
                task.text.clone()
            };
            let notes = if task.notes.is_empty() { "" } else { "*" }.to_string();

            rows.push(vec![id, done, pri, due, text, notes]);
        }

        write_table(&mut out, &HEADERS, &rows)?;
        Ok(())
    }

    pub fn print_progress(&mut self, progress: Progress) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "Progress: {} of {} tasks completed ({}%)",
            progress.completed, progress.total, progress.percent
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(mut writer: W, headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| visible_width(h)).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(visible_width(cell));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;
    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let padding = widths[idx].saturating_sub(visible_width(cell));
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Display width ignoring ANSI escape sequences.
fn visible_width(s: &str) -> usize {
    let mut escaped = false;
    let mut plain = String::with_capacity(s.len());

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
        plain.push(ch);
    }

    UnicodeWidthStr::width(plain.as_str())
}
