//! Text output, input, screen, stream, sound and picture handlers
//!
//! Screen and multimedia opcodes are thin dispatches to the host traits;
//! everything textual funnels through the executor's stream routing so a
//! selected memory stream captures it all.

use log::{debug, warn};

use crate::error::{RuntimeError, ZResult};
use crate::executor::{arg, arg_or, Machine, Outcome};
use crate::input::PendingInput;
use crate::instruction::Instruction;

impl Machine {
    // ---- printing ----

    pub(crate) fn op_print(&mut self, inst: &Instruction) -> ZResult<Outcome> {
        let text = self.inline_text(inst)?;
        self.print_str(&text)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_print_ret(&mut self, inst: &Instruction) -> ZResult<Outcome> {
        let text = self.inline_text(inst)?;
        self.print_str(&text)?;
        self.print_str("\n")?;
        Ok(Outcome::Return(1))
    }

    fn inline_text(&self, inst: &Instruction) -> ZResult<String> {
        let addr = inst.text_addr.ok_or_else(|| {
            RuntimeError::decode(self.pc, "print opcode without inline text")
        })?;
        let (text, _) = self.codec.decode(self.mem.raw(), addr as usize)?;
        Ok(text)
    }

    pub(crate) fn op_print_char(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let code = arg(self, ops, 0)?;
        if let Some(ch) = self.codec.zscii_to_char(code) {
            self.print_str(&ch.to_string())?;
        }
        Ok(Outcome::Done)
    }

    pub(crate) fn op_print_num(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let value = arg(self, ops, 0)? as i16;
        self.print_str(&value.to_string())?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_print_addr(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let addr = arg(self, ops, 0)? as u32;
        let (text, _) = self.codec.decode(self.mem.raw(), addr as usize)?;
        self.print_str(&text)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_print_paddr(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let packed = arg(self, ops, 0)?;
        let addr = self.mem.unpack_string(packed);
        let (text, _) = self.codec.decode(self.mem.raw(), addr as usize)?;
        self.print_str(&text)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_new_line(&mut self) -> ZResult<Outcome> {
        self.print_str("\n")?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_print_unicode(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let code = arg(self, ops, 0)?;
        if let Some(ch) = char::from_u32(code as u32) {
            self.print_str(&ch.to_string())?;
        }
        Ok(Outcome::Done)
    }

    /// check_unicode: bit 0 = can print, bit 1 = can receive. Everything
    /// representable is claimed printable; input is ASCII plus the
    /// translation table.
    pub(crate) fn op_check_unicode(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let code = arg(self, ops, 0)?;
        let printable = char::from_u32(code as u32).is_some();
        let receivable = code < 127
            || char::from_u32(code as u32)
                .and_then(|ch| self.codec.char_to_zscii(ch))
                .is_some();
        let mut result = 0;
        if printable {
            result |= 1;
        }
        if receivable {
            result |= 2;
        }
        Ok(Outcome::Value(result))
    }

    /// print_table: height rows of width ZSCII bytes, skipping `skip`
    /// bytes between rows.
    pub(crate) fn op_print_table(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let table = arg(self, ops, 0)? as u32;
        let width = arg(self, ops, 1)? as u32;
        let height = arg_or(ops, 2, 1) as u32;
        let skip = arg_or(ops, 3, 0) as u32;

        let mut addr = table;
        for row in 0..height {
            if row > 0 {
                self.print_str("\n")?;
            }
            let mut line = String::new();
            for i in 0..width {
                let code = self.mem.byte(addr + i)? as u16;
                if let Some(ch) = self.codec.zscii_to_char(code) {
                    line.push(ch);
                }
            }
            self.print_str(&line)?;
            addr += width + skip;
        }
        Ok(Outcome::Done)
    }

    /// encode_text: encode `length` ZSCII bytes starting at text+from into
    /// dictionary form at the destination.
    pub(crate) fn op_encode_text(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let text = arg(self, ops, 0)? as u32;
        let length = arg(self, ops, 1)? as u32;
        let from = arg(self, ops, 2)? as u32;
        let dest = arg(self, ops, 3)? as u32;

        let mut word = String::new();
        for i in 0..length {
            let code = self.mem.byte(text + from + i)? as u16;
            if let Some(ch) = self.codec.zscii_to_char(code) {
                word.push(ch);
            }
        }
        let zchars = self.mem.header.dictionary_word_zchars();
        let encoded = self.codec.encode_dictionary_word(&word, zchars);
        crate::zscii::write_encoded(&mut self.mem, dest, &encoded)?;
        Ok(Outcome::Done)
    }

    /// tokenise: explicit form of the parse step, with an optional user
    /// dictionary and the skip-unknown flag.
    pub(crate) fn op_tokenise(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let text_buf = arg(self, ops, 0)? as u32;
        let parse_buf = arg(self, ops, 1)? as u32;
        let dict = arg_or(ops, 2, 0) as u32;
        let skip_unknown = arg_or(ops, 3, 0) != 0;
        crate::dictionary::tokenise(
            &mut self.mem,
            &self.codec,
            text_buf,
            parse_buf,
            dict,
            skip_unknown,
        )?;
        Ok(Outcome::Done)
    }

    // ---- input ----

    /// read: install pending line input and suspend. v1-3 redraw the
    /// status line first; v5+ will store the terminator on completion.
    pub(crate) fn op_read(&mut self, inst: &Instruction, ops: &[u16]) -> ZResult<Outcome> {
        let text_buf = arg(self, ops, 0)? as u32;
        let parse_buf = arg_or(ops, 1, 0) as u32;
        let time = arg_or(ops, 2, 0);
        let routine = arg_or(ops, 3, 0);

        if self.mem.version() <= 3 {
            self.update_status()?;
        }
        self.install_pending(PendingInput::Line {
            text_buf,
            parse_buf,
            time,
            routine,
            store: inst.store_var,
        })?;
        Ok(Outcome::SuspendLine)
    }

    /// read_char: first operand is always 1 (the keyboard).
    pub(crate) fn op_read_char(&mut self, inst: &Instruction, ops: &[u16]) -> ZResult<Outcome> {
        let device = arg_or(ops, 0, 1);
        if device != 1 {
            warn!("read_char from device {}, treating as keyboard", device);
        }
        let time = arg_or(ops, 1, 0);
        let routine = arg_or(ops, 2, 0);
        self.install_pending(PendingInput::Char {
            time,
            routine,
            unicode: false,
            store: inst.store_var,
        })?;
        Ok(Outcome::SuspendChar)
    }

    pub(crate) fn op_input_stream(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let stream = arg(self, ops, 0)?;
        debug!("input_stream {} (host keeps command files)", stream);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_output_stream(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let number = arg(self, ops, 0)? as i16;
        let table = arg_or(ops, 1, 0) as u32;
        self.select_stream(number, table)?;
        Ok(Outcome::Done)
    }

    // ---- screen ----

    pub(crate) fn op_show_status(&mut self) -> ZResult<Outcome> {
        self.update_status()?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_split_window(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let lines = arg(self, ops, 0)?;
        self.screen_mut().split_window(lines);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_set_window(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let window = arg(self, ops, 0)?;
        self.screen_mut().set_window(window);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_erase_window(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let window = arg(self, ops, 0)? as i16;
        self.screen_mut().erase_window(window);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_erase_line(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        if arg_or(ops, 0, 1) == 1 {
            self.screen_mut().erase_line();
        }
        Ok(Outcome::Done)
    }

    pub(crate) fn op_set_cursor(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let line = arg(self, ops, 0)?;
        let column = arg_or(ops, 1, 1);
        let window = arg_or(ops, 2, u16::MAX);
        self.screen_mut().set_cursor(line, column, window);
        Ok(Outcome::Done)
    }

    /// get_cursor: write (row, column) into the operand array.
    pub(crate) fn op_get_cursor(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let array = arg(self, ops, 0)? as u32;
        let (row, column) = self.screen_mut().get_cursor();
        self.mem.set_word(array, row)?;
        self.mem.set_word(array + 2, column)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_set_text_style(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let style = arg(self, ops, 0)?;
        self.screen_mut().set_text_style(style);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_buffer_mode(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let buffered = arg(self, ops, 0)? != 0;
        self.screen_mut().buffer_mode(buffered);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_set_colour(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let foreground = arg(self, ops, 0)?;
        let background = arg(self, ops, 1)?;
        let window = arg_or(ops, 2, u16::MAX);
        self.screen_mut().set_colour(foreground, background, window);
        Ok(Outcome::Done)
    }

    /// set_font: stores the previous font; font 3 raises the flag the
    /// presentation layer uses for its own glyph translation.
    pub(crate) fn op_set_font(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let font = arg(self, ops, 0)?;
        let previous = self.set_font(font);
        Ok(Outcome::Value(previous))
    }

    // ---- sound and pictures ----

    pub(crate) fn op_sound_effect(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let number = arg_or(ops, 0, 1);
        let effect = arg_or(ops, 1, 2);
        let volume_repeats = arg_or(ops, 2, 0x00ff);
        let volume = (volume_repeats & 0xff) as u8;
        let repeats = (volume_repeats >> 8) as u8;
        if ops.len() > 3 {
            debug!("sound_effect completion routine ignored");
        }
        match effect {
            3 | 4 => self.media_mut().stop_sound(number),
            _ => self.media_mut().play_sound(number, effect, volume, repeats),
        }
        Ok(Outcome::Done)
    }

    /// draw_picture pic y x (the operand order is row-major).
    pub(crate) fn op_draw_picture(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let id = arg(self, ops, 0)?;
        let y = arg_or(ops, 1, 1);
        let x = arg_or(ops, 2, 1);
        self.media_mut().draw_picture(id, x, y);
        Ok(Outcome::Done)
    }

    /// picture_data: write (height, width) into the array and branch if
    /// the picture exists.
    pub(crate) fn op_picture_data(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let id = arg(self, ops, 0)?;
        let array = arg(self, ops, 1)? as u32;
        match self.media_mut().picture_info(id) {
            Some((width, height)) => {
                self.mem.set_word(array, height)?;
                self.mem.set_word(array + 2, width)?;
                Ok(Outcome::Cond(true))
            }
            None => Ok(Outcome::Cond(false)),
        }
    }

    pub(crate) fn op_erase_picture(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let id = arg(self, ops, 0)?;
        self.media_mut().erase_picture(id);
        Ok(Outcome::Done)
    }

    pub(crate) fn op_set_margins(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        debug!("set_margins {:?}", ops);
        Ok(Outcome::Done)
    }

    /// read_mouse: no pointing device; the coordinate array reads as all
    /// zeros.
    pub(crate) fn op_read_mouse(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let array = arg(self, ops, 0)? as u32;
        for i in 0..4 {
            self.mem.set_word(array + 2 * i, 0)?;
        }
        Ok(Outcome::Done)
    }

    pub(crate) fn op_mouse_window(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        debug!("mouse_window {:?}", ops);
        Ok(Outcome::Done)
    }
}
