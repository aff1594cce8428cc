//! User-facing terminal output
//!
//! Status lines are coloured with crossterm. Reflections are rendered from
//! markdown into a boxed panel. Diagnostics go through `tracing` to stderr
//! instead.

use crossterm::style::Stylize;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const MAX_PANEL_WIDTH: usize = 100;
const MIN_PANEL_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warn,
    Error,
    Accent,
}

/// Print one coloured status line.
pub fn status(tone: Tone, message: &str) {
    let line = match tone {
        Tone::Info => message.cyan(),
        Tone::Success => message.green().bold(),
        Tone::Warn => message.yellow().bold(),
        Tone::Error => message.red().bold(),
        Tone::Accent => message.magenta().bold(),
    };
    println!("{}", line);
}

/// Print a reflection as a boxed panel.
pub fn reflection_panel(title: &str, markdown: &str) {
    let width = panel_width();
    for (line, heading) in panel(title, &markdown_lines(markdown), width) {
        if heading {
            println!("{}", line.bold());
        } else {
            println!("{}", line);
        }
    }
    println!();
}

fn panel_width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(MAX_PANEL_WIDTH)
        .clamp(MIN_PANEL_WIDTH, MAX_PANEL_WIDTH)
}

/// A rendered line, flagged when it came from a heading
type Line = (String, bool);

/// Flatten markdown into plain lines.
pub(crate) fn markdown_lines(markdown: &str) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut current = String::new();
    let mut in_heading = false;
    let mut in_code = false;
    let mut lists: Vec<Option<u64>> = Vec::new();

    fn flush(lines: &mut Vec<Line>, current: &mut String, heading: bool) {
        let text = current.trim_end();
        if !text.trim().is_empty() {
            lines.push((text.to_string(), heading));
        }
        current.clear();
    }

    fn blank(lines: &mut Vec<Line>) {
        if lines.last().is_some_and(|(l, _)| !l.is_empty()) {
            lines.push((String::new(), false));
        }
    }

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush(&mut lines, &mut current, false);
                in_heading = true;
                if level == HeadingLevel::H1 || level == HeadingLevel::H2 {
                    current.push_str("# ");
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                flush(&mut lines, &mut current, true);
                in_heading = false;
                blank(&mut lines);
            }
            Event::End(TagEnd::Paragraph) => {
                flush(&mut lines, &mut current, false);
                if lists.is_empty() {
                    blank(&mut lines);
                }
            }
            Event::Start(Tag::List(start)) => {
                flush(&mut lines, &mut current, false);
                lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                lists.pop();
                if lists.is_empty() {
                    blank(&mut lines);
                }
            }
            Event::Start(Tag::Item) => {
                flush(&mut lines, &mut current, false);
                let indent = "  ".repeat(lists.len().saturating_sub(1));
                let bullet = match lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}. ", n);
                        *n += 1;
                        bullet
                    }
                    _ => "• ".to_string(),
                };
                current.push_str(&indent);
                current.push_str(&bullet);
            }
            Event::End(TagEnd::Item) => flush(&mut lines, &mut current, false),
            Event::Start(Tag::CodeBlock(kind)) => {
                flush(&mut lines, &mut current, false);
                in_code = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        lines.push((format!("    [{}]", lang), false));
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code = false;
                blank(&mut lines);
            }
            Event::Text(text) if in_code => {
                for code_line in text.lines() {
                    lines.push((format!("    {}", code_line), false));
                }
            }
            Event::Text(text) => current.push_str(&text),
            Event::Code(code) => {
                current.push('`');
                current.push_str(&code);
                current.push('`');
            }
            Event::InlineMath(math) => {
                current.push('$');
                current.push_str(&math);
                current.push('$');
            }
            Event::DisplayMath(math) => {
                flush(&mut lines, &mut current, false);
                lines.push((format!("    {}", math.trim()), false));
            }
            Event::SoftBreak => current.push(' '),
            Event::HardBreak => flush(&mut lines, &mut current, in_heading),
            Event::Rule => {
                flush(&mut lines, &mut current, false);
                lines.push(("─".repeat(20), false));
                blank(&mut lines);
            }
            _ => {}
        }
    }
    flush(&mut lines, &mut current, in_heading);

    while lines.last().is_some_and(|(l, _)| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Wrap to `width` display columns; continuation lines keep the leading indent.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    let indent_len = text.len() - text.trim_start().len();
    let indent = " ".repeat(indent_len.min(width / 2));

    let mut out = Vec::new();
    let mut line = String::new();
    let mut line_width = 0;

    for word in text.split_whitespace() {
        let word_width = word.width();
        let sep = usize::from(line_width > 0);
        if line_width > 0 && line_width + sep + word_width > width {
            out.push(std::mem::take(&mut line));
            line_width = 0;
        }
        if line_width == 0 {
            line.push_str(&indent);
            line_width = indent.width();
        } else {
            line.push(' ');
            line_width += 1;
        }

        // Words wider than the panel are split on character boundaries
        for ch in word.chars() {
            let ch_width = ch.width().unwrap_or(0);
            if line_width + ch_width > width && line_width > indent.width() {
                out.push(std::mem::take(&mut line));
                line.push_str(&indent);
                line_width = indent.width();
            }
            line.push(ch);
            line_width += ch_width;
        }
    }
    if !line.trim().is_empty() || out.is_empty() {
        out.push(line);
    }
    out
}

/// Box `lines` in a panel `width` columns wide, titled.
pub(crate) fn panel(title: &str, lines: &[Line], width: usize) -> Vec<Line> {
    let inner = width.saturating_sub(4).max(8);

    let title: String = title.chars().take(inner.saturating_sub(2)).collect();
    let title_width = title.width();
    let mut out = vec![(
        format!(
            "╭─ {} {}╮",
            title,
            "─".repeat((inner + 1).saturating_sub(title_width + 2))
        ),
        false,
    )];

    for (text, heading) in lines {
        for row in wrap(text, inner) {
            let pad = inner.saturating_sub(row.width());
            out.push((format!("│ {}{} │", row, " ".repeat(pad)), *heading));
        }
    }

    out.push((format!("╰{}╯", "─".repeat(inner + 2)), false));
    out
}
