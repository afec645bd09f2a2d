//! Virtual terminal engine port and its vt100-backed implementation.

use serde::Serialize;

/// Sink for bytes headed to a terminal surface.
pub trait TerminalWriter {
    fn write(&mut self, data: &str);
}

impl TerminalWriter for String {
    fn write(&mut self, data: &str) {
        self.push_str(data);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellColor {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl From<vt100::Color> for CellColor {
    fn from(c: vt100::Color) -> Self {
        match c {
            vt100::Color::Default => CellColor::Default,
            vt100::Color::Idx(n) => CellColor::Indexed(n),
            vt100::Color::Rgb(r, g, b) => CellColor::Rgb(r, g, b),
        }
    }
}

/// One grid cell. An empty `text` is a blank cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Cell {
    pub text: String,
    pub fg: CellColor,
    pub bg: CellColor,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
}

pub type Row = Vec<Cell>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
    pub visible: bool,
}

pub trait TerminalEngine: TerminalWriter {
    fn line(&self, row: u16) -> Row;
    fn cursor(&self) -> Cursor;
    fn cols(&self) -> u16;
    fn rows(&self) -> u16;
    fn resize(&mut self, cols: u16, rows: u16);

    /// Clear the visible screen and home the cursor.
    fn clear(&mut self) {
        self.write("\x1b[2J\x1b[H");
    }
}

/// Plain text of a row with trailing blanks removed.
pub fn row_text(row: &[Cell]) -> String {
    let mut s = String::new();
    for cell in row {
        if cell.text.is_empty() { s.push(' '); } else { s.push_str(&cell.text); }
    }
    s.truncate(s.trim_end().len());
    s
}

pub fn row_is_blank(row: &[Cell]) -> bool {
    row.iter().all(|c| c.text.trim().is_empty())
}

/// Rows worth keeping when the screen is about to be cleared: everything up to
/// the last row with content, extended to the row above the cursor. A screen
/// with no content yields nothing.
pub fn rows_to_capture(engine: &dyn TerminalEngine) -> Vec<Row> {
    let rows: Vec<Row> = (0..engine.rows()).map(|r| engine.line(r)).collect();
    let Some(last_content) = rows.iter().rposition(|r| !row_is_blank(r)) else { return Vec::new() };
    let end = last_content.max((engine.cursor().y as usize).saturating_sub(1));
    rows.into_iter().take(end + 1).collect()
}

pub struct Vt100Engine {
    parser: vt100::Parser,
}

impl Vt100Engine {
    pub fn new(cols: u16, rows: u16) -> Self {
        // The pane keeps its own scroll-back, so the parser keeps none.
        Self { parser: vt100::Parser::new(rows.max(1), cols.max(1), 0) }
    }
}

impl TerminalWriter for Vt100Engine {
    fn write(&mut self, data: &str) {
        self.parser.process(data.as_bytes());
    }
}

impl TerminalEngine for Vt100Engine {
    fn line(&self, row: u16) -> Row {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let mut out = Vec::with_capacity(cols as usize);
        for col in 0..cols {
            let Some(cell) = screen.cell(row, col) else {
                out.push(Cell::default());
                continue;
            };
            if cell.is_wide_continuation() { continue; }
            out.push(Cell {
                text: cell.contents().to_string(),
                fg: cell.fgcolor().into(),
                bg: cell.bgcolor().into(),
                bold: cell.bold(),
                italic: cell.italic(),
                underline: cell.underline(),
            });
        }
        out
    }

    fn cursor(&self) -> Cursor {
        let screen = self.parser.screen();
        let (y, x) = screen.cursor_position();
        Cursor { x, y, visible: !screen.hide_cursor() }
    }

    fn cols(&self) -> u16 {
        self.parser.screen().size().1
    }

    fn rows(&self) -> u16 {
        self.parser.screen().size().0
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.parser.screen_mut().set_size(rows.max(1), cols.max(1));
    }
}
