//! Terminal frame sink. Two grid rows share one character cell: the upper
//! half-block is painted with the top cell's colour and the background with
//! the bottom cell's.

use std::fmt::Write as _;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute, queue,
    style::{Print, ResetColor},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use owo_colors::OwoColorize;
use sandscape_core::{Cell, TypeClass};
use supports_color::{Stream, on_cached};
use tracing::error;

use crate::runner::{Frame, FrameSink};

const UPPER_HALF: &str = "\u{2580}";
const DEFAULT_MAX_COLUMNS: u32 = 160;

/// How cells are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    /// 24-bit half blocks.
    TrueColor,
    /// One glyph per cell pair, keyed by type class.
    Plain,
}

impl Palette {
    /// True colour when stdout advertises 16m colours, plain glyphs otherwise.
    #[must_use]
    pub fn detect() -> Self {
        match on_cached(Stream::Stdout) {
            Some(level) if level.has_16m => Palette::TrueColor,
            _ => Palette::Plain,
        }
    }
}

/// Raw mode plus the alternate screen, restored on drop.
#[derive(Debug)]
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let session = Self { _private: () };
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)
            .context("failed to enter alternate screen")?;
        Ok(session)
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, ResetColor, cursor::Show, LeaveAlternateScreen) {
            error!(?err, "failed to leave alternate screen");
        }
        if let Err(err) = disable_raw_mode() {
            error!(?err, "failed to disable raw mode");
        }
    }
}

/// Renders frames as half-block text. Interactive sinks own a
/// [`TerminalSession`], redraw in place and watch for quit keys.
#[derive(Debug)]
pub struct TerminalSink<W: Write> {
    out: W,
    palette: Palette,
    max_columns: u32,
    session: Option<TerminalSession>,
    quit: bool,
    buffer: String,
}

impl TerminalSink<Stdout> {
    /// Take over the terminal until the sink is dropped.
    pub fn interactive(palette: Palette) -> Result<Self> {
        let session = TerminalSession::enter()?;
        Ok(Self {
            session: Some(session),
            ..Self::new(io::stdout(), palette)
        })
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, palette: Palette) -> Self {
        Self {
            out,
            palette,
            max_columns: DEFAULT_MAX_COLUMNS,
            session: None,
            quit: false,
            buffer: String::new(),
        }
    }

    /// Downsample wider grids so a frame fits in `columns` characters.
    #[must_use]
    pub fn max_columns(mut self, columns: u32) -> Self {
        self.max_columns = columns.max(1);
        self
    }

    pub fn into_inner(mut self) -> W {
        self.session.take();
        self.out
    }

    fn compose(&mut self, frame: &Frame<'_>) {
        let grid = frame.grid;
        let step = grid.width().div_ceil(self.max_columns).max(1) as i32;
        let (width, height) = (grid.width() as i32, grid.height() as i32);
        let buffer = &mut self.buffer;
        buffer.clear();
        // Writing into a String cannot fail.
        let _ = writeln!(
            buffer,
            "tick {:>8}  changed chunks {:>4}",
            frame.tick.0,
            frame.changed.len()
        );
        for y in (0..height).step_by(2 * step as usize) {
            for x in (0..width).step_by(step as usize) {
                let top = grid.cell(x, y);
                let bottom = grid.cell(x, y + step);
                match self.palette {
                    Palette::TrueColor => {
                        let [tr, tg, tb] = top.map_or([0, 0, 0], Cell::rgb);
                        let [br, bg, bb] = bottom.map_or([0, 0, 0], Cell::rgb);
                        let _ = write!(
                            buffer,
                            "{}",
                            UPPER_HALF.truecolor(tr, tg, tb).on_truecolor(br, bg, bb)
                        );
                    }
                    Palette::Plain => buffer.push(glyph(top)),
                }
            }
            buffer.push('\n');
        }
    }

    /// Raw mode leaves newlines without a carriage return, so every line is
    /// positioned explicitly.
    fn draw_in_place(&mut self) -> io::Result<()> {
        for (row, line) in self.buffer.lines().enumerate() {
            let row = u16::try_from(row).unwrap_or(u16::MAX);
            queue!(self.out, cursor::MoveTo(0, row), Print(line))?;
        }
        Ok(())
    }

    fn poll_quit_keys(&mut self) -> Result<()> {
        while event::poll(Duration::ZERO).context("failed to poll terminal events")? {
            if let Event::Key(key) = event::read().context("failed to read terminal event")?
                && is_quit_key(key)
            {
                self.quit = true;
            }
        }
        Ok(())
    }
}

impl<W: Write> FrameSink for TerminalSink<W> {
    fn present(&mut self, frame: &Frame<'_>) -> Result<()> {
        self.compose(frame);
        if self.session.is_some() {
            self.draw_in_place()
                .context("failed to write terminal frame")?;
        } else {
            self.out
                .write_all(self.buffer.as_bytes())
                .context("failed to write terminal frame")?;
        }
        self.out.flush().context("failed to flush terminal frame")?;
        if self.session.is_some() {
            self.poll_quit_keys()?;
        }
        Ok(())
    }

    fn exit_requested(&self) -> bool {
        self.quit
    }
}

fn is_quit_key(key: KeyEvent) -> bool {
    matches!(
        (key.code, key.modifiers),
        (KeyCode::Esc, _)
            | (KeyCode::Char('q'), _)
            | (KeyCode::Char('Q'), _)
            | (KeyCode::Char('c'), KeyModifiers::CONTROL)
    )
}

/// Plain-text stand-in for a cell, keyed by how it moves.
fn glyph(cell: Option<Cell>) -> char {
    let Some(class) = cell.and_then(|cell| cell.type_class().ok()) else {
        return '?';
    };
    match class {
        TypeClass::Air => ' ',
        TypeClass::Static => '#',
        TypeClass::Falling => 'o',
        TypeClass::Powder | TypeClass::PowderWide | TypeClass::PowderWet => ':',
        TypeClass::PowderFloating => '\'',
        TypeClass::Fluid | TypeClass::FluidWide => '~',
    }
}
