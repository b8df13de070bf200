//! Host interfaces: screen, storage and multimedia collaborators
//!
//! The core never draws, never touches the filesystem and never plays a
//! sound; it calls through these traits. The buffering implementations here
//! let the whole machine run headless and deterministic, which is how the
//! scenario tests drive it.

use std::collections::HashMap;

use log::debug;

/// What the attached screen can actually do; folded into the header
/// capability bits at startup and on resize.
#[derive(Debug, Clone, Copy)]
pub struct ScreenCaps {
    pub colours: bool,
    pub bold: bool,
    pub italic: bool,
    pub fixed: bool,
    pub split: bool,
    pub status: bool,
    pub pictures: bool,
    pub sound: bool,
    pub timed: bool,
    pub rows: u16,
    pub cols: u16,
}

impl Default for ScreenCaps {
    fn default() -> Self {
        ScreenCaps {
            colours: false,
            bold: true,
            italic: true,
            fixed: true,
            split: true,
            status: true,
            pictures: false,
            sound: false,
            timed: true,
            rows: 24,
            cols: 80,
        }
    }
}

/// Output side of the host. One method per screen opcode the core
/// dispatches; implementations are free to ignore what they cannot render.
pub trait Screen {
    fn print(&mut self, text: &str);
    fn split_window(&mut self, lines: u16);
    fn set_window(&mut self, window: u16);
    fn erase_window(&mut self, window: i16);
    fn erase_line(&mut self);
    fn set_cursor(&mut self, line: u16, column: u16, window: u16);
    fn get_cursor(&mut self) -> (u16, u16);
    fn set_text_style(&mut self, style: u16);
    fn set_colour(&mut self, foreground: u16, background: u16, window: u16);
    /// Returns the previously active font.
    fn set_font(&mut self, font: u16) -> u16;
    fn buffer_mode(&mut self, buffered: bool);
    fn update_status_bar(&mut self, location: &str, a: i16, b: u16, is_time: bool);
    fn size(&self) -> (u16, u16) {
        let caps = self.caps();
        (caps.rows, caps.cols)
    }
    fn caps(&self) -> ScreenCaps;
}

/// Persistent storage for Quetzal files. Backed by the filesystem in the
/// bundled binary, by a map in tests.
pub trait Storage {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String>;
    fn load(&mut self, name: &str) -> Result<Vec<u8>, String>;
    fn list(&self) -> Vec<String>;
}

/// Sound and picture side, for v6/v7 stories and v5 sound effects.
pub trait Multimedia {
    fn play_sound(&mut self, id: u16, effect: u16, volume: u8, repeats: u8);
    fn stop_sound(&mut self, id: u16);
    fn draw_picture(&mut self, id: u16, x: u16, y: u16);
    fn erase_picture(&mut self, id: u16);
    fn picture_info(&mut self, id: u16) -> Option<(u16, u16)>;
}

/// Screen that collects everything into strings. The scenario tests and the
/// `--no-exec` dumps read the transcript back out.
#[derive(Default)]
pub struct BufferScreen {
    output: String,
    status: String,
    current_window: u16,
    current_font: u16,
    cursor: (u16, u16),
    caps: ScreenCaps,
}

impl BufferScreen {
    pub fn new() -> BufferScreen {
        BufferScreen {
            current_font: 1,
            caps: ScreenCaps::default(),
            ..Default::default()
        }
    }

    pub fn with_caps(caps: ScreenCaps) -> BufferScreen {
        BufferScreen {
            current_font: 1,
            caps,
            ..Default::default()
        }
    }

    pub fn contents(&self) -> &str {
        &self.output
    }

    pub fn status_line(&self) -> &str {
        &self.status
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl Screen for BufferScreen {
    fn print(&mut self, text: &str) {
        if self.current_window == 0 {
            self.output.push_str(text);
        }
    }

    fn split_window(&mut self, lines: u16) {
        debug!("buffer screen: split_window({})", lines);
    }

    fn set_window(&mut self, window: u16) {
        self.current_window = window;
    }

    fn erase_window(&mut self, window: i16) {
        if window == 0 || window < 0 {
            self.output.clear();
        }
    }

    fn erase_line(&mut self) {}

    fn set_cursor(&mut self, line: u16, column: u16, _window: u16) {
        self.cursor = (line, column);
    }

    fn get_cursor(&mut self) -> (u16, u16) {
        self.cursor
    }

    fn set_text_style(&mut self, _style: u16) {}

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
            format!("{}  {:02}:{:02}", location, a, b)
        } else {
            format!("{}  {}/{}", location, a, b)
        };
    }

    fn caps(&self) -> ScreenCaps {
        self.caps
    }
}

/// A shared handle is itself a screen, so a test (or a front-end) can keep
/// one end while the machine owns the other.
impl<S: Screen> Screen for std::rc::Rc<std::cell::RefCell<S>> {
    fn print(&mut self, text: &str) {
        self.borrow_mut().print(text)
    }
    fn split_window(&mut self, lines: u16) {
        self.borrow_mut().split_window(lines)
    }
    fn set_window(&mut self, window: u16) {
        self.borrow_mut().set_window(window)
    }
    fn erase_window(&mut self, window: i16) {
        self.borrow_mut().erase_window(window)
    }
    fn erase_line(&mut self) {
        self.borrow_mut().erase_line()
    }
    fn set_cursor(&mut self, line: u16, column: u16, window: u16) {
        self.borrow_mut().set_cursor(line, column, window)
    }
    fn get_cursor(&mut self) -> (u16, u16) {
        self.borrow_mut().get_cursor()
    }
    fn set_text_style(&mut self, style: u16) {
        self.borrow_mut().set_text_style(style)
    }
    fn set_colour(&mut self, foreground: u16, background: u16, window: u16) {
        self.borrow_mut().set_colour(foreground, background, window)
    }
    fn set_font(&mut self, font: u16) -> u16 {
        self.borrow_mut().set_font(font)
    }
    fn buffer_mode(&mut self, buffered: bool) {
        self.borrow_mut().buffer_mode(buffered)
    }
    fn update_status_bar(&mut self, location: &str, a: i16, b: u16, is_time: bool) {
        self.borrow_mut().update_status_bar(location, a, b, is_time)
    }
    fn caps(&self) -> ScreenCaps {
        self.borrow().caps()
    }
}

/// In-memory storage keyed by name.
#[derive(Default)]
pub struct MemStorage {
    slots: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }
}

impl Storage for MemStorage {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String> {
        self.slots.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&mut self, name: &str) -> Result<Vec<u8>, String> {
        self.slots
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no save named '{name}'"))
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Shared storage handles, so a front-end (or a test) can inspect saves
/// the machine wrote.
impl<S: Storage> Storage for std::rc::Rc<std::cell::RefCell<S>> {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String> {
        self.borrow_mut().save(name, data)
    }
    fn load(&mut self, name: &str) -> Result<Vec<u8>, String> {
        self.borrow_mut().load(name)
    }
    fn list(&self) -> Vec<String> {
        self.borrow().list()
    }
}

/// Multimedia host that acknowledges everything and renders nothing.
#[derive(Default)]
pub struct NullMedia;

impl Multimedia for NullMedia {
    fn play_sound(&mut self, id: u16, effect: u16, volume: u8, repeats: u8) {
        debug!(
            "sound_effect {} effect {} volume {} repeats {}",
            id, effect, volume, repeats
        );
    }

    fn stop_sound(&mut self, _id: u16) {}

    fn draw_picture(&mut self, id: u16, x: u16, y: u16) {
        debug!("draw_picture {} at {},{}", id, x, y);
    }

    fn erase_picture(&mut self, _id: u16) {}

    fn picture_info(&mut self, _id: u16) -> Option<(u16, u16)> {
        None
    }
}
