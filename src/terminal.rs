//! Terminal hosts for the bundled interpreter binary
//!
//! A thin screen that writes to stdout, file-backed Quetzal storage, and a
//! crossterm-based input pump that handles timed reads by polling with a
//! timeout and ticking the machine's interrupt routine. When stdin is a
//! pipe rather than a terminal, input falls back to plain line reads so
//! scripted play works.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::debug;

use brasslantern::error::ZResult;
use brasslantern::executor::{InterruptOutcome, Machine};
use brasslantern::host::{Screen, ScreenCaps, Storage};

pub struct TerminalScreen {
    current_window: u16,
    current_font: u16,
    status: String,
}

impl TerminalScreen {
    pub fn new() -> TerminalScreen {
        TerminalScreen {
            current_window: 0,
            current_font: 1,
            status: String::new(),
        }
    }
}

impl Default for TerminalScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for TerminalScreen {
    fn print(&mut self, text: &str) {
        // The upper window would need full cursor addressing; this
        // front-end renders the main window only.
        if self.current_window == 0 {
            print!("{text}");
            io::stdout().flush().ok();
        }
    }

    fn split_window(&mut self, lines: u16) {
        debug!("split_window({lines})");
    }

    fn set_window(&mut self, window: u16) {
        self.current_window = window;
    }

    fn erase_window(&mut self, window: i16) {
        if window < 0 {
            print!("\x1b[2J\x1b[H");
            io::stdout().flush().ok();
        }
    }

    fn erase_line(&mut self) {}

    fn set_cursor(&mut self, _line: u16, _column: u16, _window: u16) {}

    fn get_cursor(&mut self) -> (u16, u16) {
        (1, 1)
    }

    fn set_text_style(&mut self, style: u16) {
        let code = match style {
            0 => "\x1b[0m",
            s if s & 1 != 0 => "\x1b[7m",
            s if s & 2 != 0 => "\x1b[1m",
            s if s & 4 != 0 => "\x1b[3m",
            _ => return,
        };
        if atty::is(atty::Stream::Stdout) {
            print!("{code}");
            io::stdout().flush().ok();
        }
    }

    fn set_colour(&mut self, _foreground: u16, _background: u16, _window: u16) {}

    fn set_font(&mut self, font: u16) -> u16 {
        let previous = self.current_font;
        if font != 0 {
            self.current_font = font;
        }
        previous
    }

    fn buffer_mode(&mut self, _buffered: bool) {}

    fn update_status_bar(&mut self, location: &str, a: i16, b: u16, is_time: bool) {
        self.status = if is_time {
            format!("{location}  {a:02}:{b:02}")
        } else {
            format!("{location}  {a}/{b}")
        };
        debug!("status: {}", self.status);
    }

    fn caps(&self) -> ScreenCaps {
        let (cols, rows) = terminal::size().unwrap_or((80, 24));
        ScreenCaps {
            rows,
            cols,
            timed: atty::is(atty::Stream::Stdin),
            ..ScreenCaps::default()
        }
    }
}

/// Quetzal files beside the story, `.qzl` extension.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> FileStorage {
        FileStorage { dir }
    }
}

impl Storage for FileStorage {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String> {
        let path = self.dir.join(name);
        fs::write(&path, data).map_err(|e| format!("cannot write {}: {e}", path.display()))
    }

    fn load(&mut self, name: &str) -> Result<Vec<u8>, String> {
        let path = self.dir.join(name);
        fs::read(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))
    }

    fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".qzl") {
                    names.push(name);
                }
            }
        }
        names.sort();
        names
    }
}

/// What one input request produced.
pub enum InputEvent {
    Line(String, u16),
    Char(u16),
    /// The interrupt routine ended the read; the machine has resumed.
    TimedOut,
    /// End of piped input or Ctrl-D: nothing more will arrive.
    Eof,
}

/// Pump a pending line read: raw-mode editing with timer ticks when the
/// read is timed, a plain blocking read when stdin is a pipe.
pub fn read_line(machine: &mut Machine) -> ZResult<InputEvent> {
    if !atty::is(atty::Stream::Stdin) {
        let mut line = String::new();
        return Ok(match io::stdin().lock().read_line(&mut line) {
            Ok(0) => InputEvent::Eof,
            Ok(_) => InputEvent::Line(line.trim_end_matches(['\r', '\n']).to_string(), 13),
            Err(_) => InputEvent::Eof,
        });
    }

    let timer = machine.pending_timer();
    let mut buffer = String::new();
    with_raw_mode(|| loop {
        match next_key(machine, timer)? {
            KeyInput::TimedOut => return Ok(InputEvent::TimedOut),
            KeyInput::Eof => return Ok(InputEvent::Eof),
            KeyInput::Key(13) => {
                print!("\r\n");
                io::stdout().flush().ok();
                return Ok(InputEvent::Line(std::mem::take(&mut buffer), 13));
            }
            KeyInput::Key(8) => {
                if buffer.pop().is_some() {
                    print!("\x08 \x08");
                    io::stdout().flush().ok();
                }
            }
            KeyInput::Key(code) => {
                if let Some(ch) = char::from_u32(code as u32).filter(|c| !c.is_control()) {
                    buffer.push(ch);
                    print!("{ch}");
                    io::stdout().flush().ok();
                }
            }
        }
    })
}

/// Pump a pending single-key read.
pub fn read_char(machine: &mut Machine) -> ZResult<InputEvent> {
    if !atty::is(atty::Stream::Stdin) {
        let mut line = String::new();
        return Ok(match io::stdin().lock().read_line(&mut line) {
            Ok(0) => InputEvent::Eof,
            Ok(_) => InputEvent::Char(line.chars().next().map(|c| c as u16).unwrap_or(13)),
            Err(_) => InputEvent::Eof,
        });
    }

    let timer = machine.pending_timer();
    with_raw_mode(|| match next_key(machine, timer)? {
        KeyInput::TimedOut => Ok(InputEvent::TimedOut),
        KeyInput::Eof => Ok(InputEvent::Eof),
        KeyInput::Key(code) => Ok(InputEvent::Char(code)),
    })
}

enum KeyInput {
    Key(u16),
    TimedOut,
    Eof,
}

/// Wait for one keypress, ticking the interrupt routine every `time`
/// tenths of a second when the read is timed.
fn next_key(machine: &mut Machine, timer: Option<(u16, u16)>) -> ZResult<KeyInput> {
    let tick = timer.map(|(time, _)| Duration::from_millis(time as u64 * 100));
    loop {
        let deadline = tick.map(|d| Instant::now() + d);
        loop {
            let wait = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::from_secs(3600),
            };
            if event::poll(wait).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match zscii_for_key(key) {
                        Some(0xffff) => return Ok(KeyInput::Eof),
                        Some(code) => return Ok(KeyInput::Key(code)),
                        None => continue,
                    }
                }
            } else if deadline.is_some() {
                break;
            }
        }
        if machine.tick_interrupt()? == InterruptOutcome::Terminated {
            return Ok(KeyInput::TimedOut);
        }
    }
}

/// Map a crossterm key event to a ZSCII input code. 0xffff marks Ctrl-D.
fn zscii_for_key(key: KeyEvent) -> Option<u16> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('d') | KeyCode::Char('c') => Some(0xffff),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Enter => Some(13),
        KeyCode::Backspace => Some(8),
        KeyCode::Esc => Some(27),
        KeyCode::Up => Some(129),
        KeyCode::Down => Some(130),
        KeyCode::Left => Some(131),
        KeyCode::Right => Some(132),
        KeyCode::F(n) if (1..=12).contains(&n) => Some(132 + n as u16),
        KeyCode::Delete => Some(8),
        KeyCode::Tab => Some(9),
        KeyCode::Char(c) => Some(c as u16),
        _ => None,
    }
}

fn with_raw_mode<T>(f: impl FnMut() -> ZResult<T>) -> ZResult<T> {
    let mut f = f;
    let raw = terminal::enable_raw_mode().is_ok();
    let result = f();
    if raw {
        terminal::disable_raw_mode().ok();
    }
    result
}
