//! Rendering adapter: applies view trees to a concrete surface.

use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use unicode_width::UnicodeWidthStr;

use crate::error::{GarageError, Result};
use crate::vdom::{self, Element, Patch, VNode};

const BAR_WIDTH: usize = 20;

/// Something a view tree can be painted on.
pub trait Surface: fmt::Debug {
    /// `patches` is what changed since the last painted tree; a first
    /// paint receives a single root replacement. Surfaces may ignore them
    /// and lay out `tree` whole, as [`TerminalSurface`] does.
    fn paint(&mut self, tree: &VNode, patches: &[Patch]) -> io::Result<()>;
}

#[derive(Debug)]
pub struct Renderer {
    surface: Box<dyn Surface>,
    previous: Option<VNode>,
}

impl Renderer {
    pub fn new(surface: Box<dyn Surface>) -> Self {
        Self {
            surface,
            previous: None,
        }
    }

    pub fn previous(&self) -> Option<&VNode> {
        self.previous.as_ref()
    }

    /// Forces the next [`Renderer::apply`] to repaint in full.
    pub fn invalidate(&mut self) {
        self.previous = None;
    }

    /// Paints `tree` if it differs from the last painted one and returns
    /// whether a paint happened. On failure the previous tree is kept.
    #[tracing::instrument(level = "debug", skip(self, tree))]
    pub fn apply(&mut self, tree: VNode) -> Result<bool> {
        let patches = match &self.previous {
            Some(previous) => vdom::diff(previous, &tree),
            None => vec![Patch::Replace {
                path: Vec::new(),
                node: tree.clone(),
            }],
        };

        if patches.is_empty() {
            trace!("view unchanged; skipping paint");
            return Ok(false);
        }

        self.surface.paint(&tree, &patches).map_err(|err| {
            warn!(error = %err, "paint failed; keeping previous frame");
            GarageError::render(err)
        })?;
        debug!(patches = patches.len(), "painted view");
        self.previous = Some(tree);
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    accent: &'static str,
    muted: &'static str,
    danger: &'static str,
    done: &'static str,
}

impl Palette {
    fn for_theme(theme: Option<&str>) -> Self {
        if theme == Some("dark") {
            Self {
                accent: "96",
                muted: "90",
                danger: "91",
                done: "92",
            }
        } else {
            Self {
                accent: "34",
                muted: "2",
                danger: "31",
                done: "32",
            }
        }
    }
}

/// Paints whole frames as text. Compact layouts collapse each task onto a
/// table row; the regular layout prints a block per task.
pub struct TerminalSurface<W: Write> {
    out: W,
    color: bool,
    clear: bool,
}

impl<W: Write> fmt::Debug for TerminalSurface<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSurface")
            .field("color", &self.color)
            .field("clear", &self.clear)
            .finish_non_exhaustive()
    }
}

impl TerminalSurface<io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        let tty = io::stdout().is_terminal();
        Self {
            out: io::stdout(),
            color: color && tty,
            clear: tty,
        }
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            clear: false,
        }
    }

    fn paint_text(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn layout(&self, root: &Element) -> io::Result<Vec<u8>> {
        let palette = Palette::for_theme(root.attr_value("data-theme"));
        let compact = root.attr_value("data-compact") == Some("true");
        let mut frame = Vec::new();

        writeln!(
            frame,
            "{}  filter: {}  sort: {}",
            self.paint_text("taskgarage", palette.accent),
            root.attr_value("data-filter").unwrap_or("all"),
            root.attr_value("data-sort").unwrap_or("newest"),
        )?;

        if let Some(overall) = root.find_class("overall-progress")
            && !overall.hidden
        {
            let value = overall
                .find_class("overall-progress-fill")
                .and_then(|fill| fill.attr_value("data-value"))
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(0.0);
            let label = overall
                .find_class("overall-progress-label")
                .map(Element::text_content)
                .unwrap_or_default();
            writeln!(frame, "{} {label}", self.paint_text(&bar(value), palette.accent))?;
        }
        if !compact {
            writeln!(frame)?;
        }

        let mut cards = Vec::new();
        root.find_all_class("task", &mut cards);

        if compact {
            let rows = cards
                .iter()
                .enumerate()
                .map(|(idx, card)| self.card_row(idx, card, palette))
                .collect();
            if !cards.is_empty() {
                write_table(&mut frame, compact_headers(), rows)?;
            }
        } else {
            for (idx, card) in cards.iter().enumerate() {
                self.card_block(&mut frame, idx, card, palette)?;
            }
        }

        if let Some(empty) = root.find_class("empty-state")
            && !empty.hidden
        {
            writeln!(frame, "{}", self.paint_text(&empty.text_content(), palette.muted))?;
        }

        if let Some(modal) = root.find_class("modal")
            && !modal.hidden
        {
            writeln!(frame)?;
            writeln!(
                frame,
                "{}",
                self.paint_text(
                    &format!("── Edit task {} ──", modal.attr_value("data-id").unwrap_or_default()),
                    palette.accent
                )
            )?;
            let mut fields = Vec::new();
            modal.find_all_class("field", &mut fields);
            for field in fields {
                writeln!(frame, "  {}", field.text_content())?;
            }
            writeln!(
                frame,
                "{}",
                self.paint_text("  set <field> <value> | save | cancel", palette.muted)
            )?;
        }

        Ok(frame)
    }

    fn card_block(&self, frame: &mut Vec<u8>, idx: usize, card: &Element, palette: Palette) -> io::Result<()> {
        let completed = card.has_class("completed");
        let check = if completed { "[x]" } else { "[ ]" };
        let title = self.card_title(card, palette);
        let id = card.attr_value("data-id").unwrap_or_default();

        writeln!(
            frame,
            "{:>3}. {check} {title}  {}",
            idx + 1,
            self.paint_text(id, palette.muted)
        )?;

        let notes = card.find_class("notes").map(Element::text_content).unwrap_or_default();
        if !notes.is_empty() {
            writeln!(frame, "       {notes}")?;
        }

        let progress = card_progress(card);
        let code = if completed { palette.done } else { palette.accent };
        writeln!(
            frame,
            "       {} {}",
            self.paint_text(&bar(f64::from(progress)), code),
            card.find_class("progress-label").map(Element::text_content).unwrap_or_default()
        )?;

        let pills: Vec<String> = card_pills(card)
            .into_iter()
            .map(|(kind, text)| self.paint_pill(card, &kind, &text, palette))
            .collect();
        writeln!(frame, "       {}", pills.join(" · "))?;
        writeln!(frame)?;
        Ok(())
    }

    fn card_row(&self, idx: usize, card: &Element, palette: Palette) -> Vec<String> {
        let completed = card.has_class("completed");
        let pills = card_pills(card);
        let pill_text = |kind: &str| {
            pills
                .iter()
                .find(|(k, _)| k == kind)
                .map(|(_, text)| text.clone())
                .unwrap_or_default()
        };
        let priority = pill_text("priority");
        let due = pill_text("due").trim_start_matches("Due: ").to_string();

        vec![
            self.paint_text(&(idx + 1).to_string(), palette.muted),
            if completed { "x".to_string() } else { " ".to_string() },
            self.card_title(card, palette),
            self.paint_pill(card, "priority", &priority, palette),
            due,
            format!("{}%", card_progress(card)),
            card.attr_value("data-id").unwrap_or_default().to_string(),
        ]
    }

    fn card_title(&self, card: &Element, palette: Palette) -> String {
        let Some(title) = card.find_class("title") else {
            return String::new();
        };
        let text = title.text_content();
        if title.has_class("strike") {
            self.paint_text(&text, &format!("9;{}", palette.muted))
        } else {
            text
        }
    }

    fn paint_pill(&self, card: &Element, kind: &str, text: &str, palette: Palette) -> String {
        match kind {
            "priority" if card.has_class("priority-high") => self.paint_text(text, palette.danger),
            "priority" if card.has_class("priority-low") => self.paint_text(text, palette.muted),
            "priority" => self.paint_text(text, palette.accent),
            "done" => self.paint_text(text, palette.done),
            _ => text.to_string(),
        }
    }
}

impl<W: Write> Surface for TerminalSurface<W> {
    fn paint(&mut self, tree: &VNode, patches: &[Patch]) -> io::Result<()> {
        let VNode::Element(root) = tree else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "view root must be an element"));
        };
        trace!(patches = patches.len(), "laying out terminal frame");

        let frame = self.layout(root)?;
        if self.clear {
            self.out.write_all(b"\x1b[2J\x1b[H")?;
        }
        self.out.write_all(&frame)?;
        self.out.flush()
    }
}

/// Discards every frame. For one-shot commands that only report a result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn paint(&mut self, _tree: &VNode, _patches: &[Patch]) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every painted tree; clones share the same frame list.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    frames: Arc<Mutex<Vec<VNode>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn last(&self) -> Option<VNode> {
        self.frames.lock().last().cloned()
    }

    pub fn fail_paints(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl Surface for RecordingSurface {
    fn paint(&mut self, tree: &VNode, _patches: &[Patch]) -> io::Result<()> {
        if *self.failing.lock() {
            return Err(io::Error::other("surface unavailable"));
        }
        self.frames.lock().push(tree.clone());
        Ok(())
    }
}

fn card_progress(card: &Element) -> u8 {
    card.find_class("progress-bar")
        .and_then(|el| el.attr_value("data-value"))
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

fn card_pills(card: &Element) -> Vec<(String, String)> {
    let mut pills = Vec::new();
    card.find_all_class("pill", &mut pills);
    pills
        .into_iter()
        .map(|pill| {
            let kind = pill
                .classes
                .iter()
                .find(|class| class.as_str() != "pill")
                .cloned()
                .unwrap_or_default();
            (kind, pill.text_content())
        })
        .collect()
}

fn compact_headers() -> Vec<String> {
    ["#", "", "Title", "Priority", "Due", "Progress", "ID"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn bar(percent: f64) -> String {
    let clamped = percent.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> io::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

pub fn strip_ansi(s: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).expect("utf8")
        }
    }

    fn card(id: &str, title: &str, progress: u8, completed: bool) -> Element {
        let mut title_el = Element::new("span").class("title").text(title);
        if completed {
            title_el = title_el.class("strike");
        }
        Element::new("article")
            .key(id)
            .class("task")
            .class("priority-high")
            .class_if(completed, "completed")
            .attr("data-id", id)
            .child(title_el)
            .child(Element::new("p").class("notes").text("some notes"))
            .child(
                Element::new("div")
                    .class("progress-bar")
                    .attr("data-value", progress.to_string()),
            )
            .child(Element::new("span").class("progress-label").text(format!("{progress}% Complete")))
            .child(Element::new("span").class("pill").class("priority").text("High"))
            .child(Element::new("span").class("pill").class("due").text("Due: Oct 20, 2026"))
    }

    fn screen(compact: bool, cards: Vec<Element>) -> VNode {
        Element::new("main")
            .class("app")
            .attr("data-theme", "light")
            .attr("data-compact", if compact { "true" } else { "false" })
            .attr("data-filter", "all")
            .attr("data-sort", "newest")
            .child(
                Element::new("p")
                    .class("empty-state")
                    .hidden(!cards.is_empty())
                    .text("No tasks to show."),
            )
            .children(cards)
            .into()
    }

    #[test]
    fn unchanged_tree_is_not_repainted() {
        let surface = RecordingSurface::new();
        let mut renderer = Renderer::new(Box::new(surface.clone()));

        assert!(renderer.apply(screen(false, vec![card("a", "A", 0, false)])).expect("first"));
        assert!(!renderer.apply(screen(false, vec![card("a", "A", 0, false)])).expect("second"));
        assert!(renderer.apply(screen(false, vec![card("a", "A", 50, false)])).expect("third"));
        assert_eq!(surface.frame_count(), 2);
    }

    #[test]
    fn failed_paint_keeps_previous_tree() {
        let surface = RecordingSurface::new();
        let mut renderer = Renderer::new(Box::new(surface.clone()));
        let first = screen(false, Vec::new());
        renderer.apply(first.clone()).expect("first");

        surface.fail_paints(true);
        let err = renderer
            .apply(screen(false, vec![card("a", "A", 0, false)]))
            .expect_err("paint fails");
        assert!(matches!(err, GarageError::Render { .. }));
        assert_eq!(renderer.previous(), Some(&first));

        surface.fail_paints(false);
        assert!(renderer.apply(screen(false, vec![card("a", "A", 0, false)])).expect("retry"));
    }

    #[test]
    fn terminal_surface_prints_task_blocks() {
        let buf = SharedBuf::default();
        let mut renderer = Renderer::new(Box::new(TerminalSurface::new(buf.clone(), false)));
        renderer
            .apply(screen(false, vec![card("t_1", "Write report", 30, false)]))
            .expect("paint");

        let text = buf.text();
        assert!(text.contains("1. [ ] Write report  t_1"));
        assert!(text.contains("some notes"));
        assert!(text.contains("30% Complete"));
        assert!(text.contains("High · Due: Oct 20, 2026"));
        assert!(!text.contains("No tasks to show."));
    }

    #[test]
    fn terminal_surface_repaints_whole_frames() {
        let buf = SharedBuf::default();
        let mut renderer = Renderer::new(Box::new(TerminalSurface::new(buf.clone(), false)));
        renderer
            .apply(screen(false, vec![card("t_1", "Write report", 30, false), card("t_2", "Call bank", 0, false)]))
            .expect("first paint");
        renderer
            .apply(screen(false, vec![card("t_1", "Write report", 60, false), card("t_2", "Call bank", 0, false)]))
            .expect("second paint");

        let text = buf.text();
        assert_eq!(text.matches("taskgarage  filter: all").count(), 2);
        assert_eq!(text.matches("Call bank").count(), 2);
        assert!(text.contains("60% Complete"));
    }

    #[test]
    fn compact_layout_uses_a_table() {
        let buf = SharedBuf::default();
        let mut renderer = Renderer::new(Box::new(TerminalSurface::new(buf.clone(), false)));
        renderer
            .apply(screen(true, vec![card("t_1", "Write report", 100, true)]))
            .expect("paint");

        let text = buf.text();
        assert!(text.contains("Title"));
        assert!(text.contains("Oct 20, 2026"));
        assert!(text.contains("100%"));
        assert!(!text.contains("some notes"));
    }

    #[test]
    fn empty_view_prints_placeholder() {
        let buf = SharedBuf::default();
        let mut surface = TerminalSurface::new(buf.clone(), false);
        surface.paint(&screen(false, Vec::new()), &[]).expect("paint");
        assert!(buf.text().contains("No tasks to show."));
    }

    #[test]
    fn text_root_is_rejected() {
        let mut surface = TerminalSurface::new(Vec::new(), false);
        assert!(surface.paint(&VNode::Text("bare".into()), &[]).is_err());
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(UnicodeWidthStr::width(strip_ansi("\x1b[9;2mdone\x1b[0m").as_str()), 4);
    }
}
