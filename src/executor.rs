//! The executor: fetch, decode, dispatch, and the suspension state machine
//!
//! `Machine` owns the whole world: memory, call stack, text codec, object
//! table, RNG, output streams and the host handles. The public surface is a
//! step function returning what happened (`Stepped`, suspended for input,
//! `Halted`, `Restarted`); the host drives the loop and feeds input back in
//! through `complete_line`/`complete_char`. There are no threads and no
//! coroutines; a suspended read is just a pending-input record.

use log::{debug, info, warn};

use crate::error::{RuntimeError, ZResult};
use crate::frames::{CallStack, Disposition, Frame};
use crate::header::offset;
use crate::host::{Multimedia, Screen, Storage};
use crate::input::{PendingInput, Terminators};
use crate::instruction::Instruction;
use crate::memory::Memory;
use crate::objects::ObjectTable;
use crate::quetzal::{self, Snapshot};
use crate::random::ZRand;
use crate::zscii::TextCodec;

/// Result of one public step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// One instruction ran; call again.
    Stepped,
    /// A `read` wants a whole line from the host.
    SuspendedLine,
    /// A `read_char` wants a single keypress.
    SuspendedChar,
    /// quit, a fatal error, or a return from the entry frame.
    Halted,
    /// restart ran; dynamic memory is back to the load image.
    Restarted,
}

/// What a timer tick did to a pending read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterruptOutcome {
    /// The routine returned 0; keep waiting for input.
    Continue,
    /// The routine returned nonzero; the read is over, 0 stored.
    Terminated,
}

/// What a handler asks the executor to do afterwards. Store and branch
/// trailers are applied generically from the opcode metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Outcome {
    /// Fall through to the next instruction.
    Done,
    /// Store this value through the instruction's store byte.
    Value(u16),
    /// Apply the branch trailer with this condition.
    Cond(bool),
    /// Store, then branch (get_child, scan_table).
    ValueCond(u16, bool),
    /// Return from the current routine.
    Return(u16),
    /// The handler set the PC itself (jump, call).
    Jumped,
    Called,
    /// A read installed pending input.
    SuspendLine,
    SuspendChar,
    Quit,
    Restart,
    /// A restore repositioned the PC; the save result is already delivered.
    Restored,
}

/// Undo slots kept in memory for save_undo/restore_undo.
const UNDO_SLOTS: usize = 8;
/// Memory output streams may stack this deep.
const MAX_MEMORY_STREAMS: usize = 16;
/// Instruction budget for one interrupt routine activation.
const INTERRUPT_STEP_LIMIT: u64 = 10_000_000;

pub struct Machine {
    pub mem: Memory,
    pub codec: TextCodec,
    pub objects: ObjectTable,
    pub stack: CallStack,
    pub pc: u32,
    pub rng: ZRand,
    screen: Box<dyn Screen>,
    storage: Box<dyn Storage>,
    media: Box<dyn Multimedia>,
    terminators: Terminators,

    pending: PendingInput,
    halted: bool,
    /// Value delivered by a return from the entry frame.
    final_result: Option<u16>,
    /// Set when an interrupt-disposition frame returns.
    interrupt_result: Option<u16>,
    in_interrupt: bool,

    /// Stream 1 (screen) selected.
    screen_stream: bool,
    /// Stream 2 (transcript) selected via output_stream.
    transcript_stream: bool,
    transcript: String,
    /// Stream 3 tables, innermost last.
    memory_streams: Vec<u32>,

    undo: Vec<Snapshot>,
    save_name: String,
    interpreter_number: u8,
    font: u16,
    instruction_count: u64,
}

impl Machine {
    pub fn new(
        mem: Memory,
        screen: Box<dyn Screen>,
        storage: Box<dyn Storage>,
        media: Box<dyn Multimedia>,
    ) -> ZResult<Machine> {
        let codec = TextCodec::new(&mem)?;
        let objects = ObjectTable::new(&mem);
        let terminators = Terminators::from_header(&mem)?;
        let mut machine = Machine {
            pc: mem.header.initial_pc,
            mem,
            codec,
            objects,
            stack: CallStack::new(),
            rng: ZRand::new_uniform(),
            screen,
            storage,
            media,
            terminators,
            pending: PendingInput::Idle,
            halted: false,
            final_result: None,
            interrupt_result: None,
            in_interrupt: false,
            screen_stream: true,
            transcript_stream: false,
            transcript: String::new(),
            memory_streams: Vec::new(),
            undo: Vec::new(),
            save_name: "story.qzl".to_string(),
            interpreter_number: 6,
            font: 1,
            instruction_count: 0,
        };
        machine.write_interpreter_header()?;
        machine.enter_initial_routine()?;
        info!(
            "machine ready: v{}, initial PC {:#07x}",
            machine.mem.version(),
            machine.pc
        );
        Ok(machine)
    }

    /// v1-5 begin executing straight at the initial PC; v6 calls a main
    /// routine given as a packed address.
    fn enter_initial_routine(&mut self) -> ZResult<()> {
        if self.mem.version() == 6 {
            let packed = self.mem.header.initial_pc as u16;
            self.do_call(packed, &[], Disposition::Discard)?;
        }
        Ok(())
    }

    pub fn set_rng(&mut self, rng: ZRand) {
        self.rng = rng;
    }

    pub fn set_interpreter_number(&mut self, number: u8) -> ZResult<()> {
        self.interpreter_number = number;
        self.write_interpreter_header()
    }

    pub fn set_save_name(&mut self, name: impl Into<String>) {
        self.save_name = name.into();
    }

    /// True while the executor is waiting for the host (input pending).
    pub fn paused(&self) -> bool {
        !self.pending.is_idle()
    }

    /// Timer parameters of the pending read, when it is timed: (tenths of
    /// a second, routine). The host schedules `tick_interrupt` from this.
    pub fn pending_timer(&self) -> Option<(u16, u16)> {
        self.pending.timer()
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Value delivered by a return from the entry frame, if the program
    /// ended that way.
    pub fn final_result(&self) -> Option<u16> {
        self.final_result
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Transcript text accumulated so far (stream 2); draining is the
    /// host's business.
    pub fn take_transcript(&mut self) -> String {
        std::mem::take(&mut self.transcript)
    }

    pub fn font3_active(&self) -> bool {
        self.font == 3
    }

    /// Execute one instruction. Fatal errors print a one-line report
    /// through the screen host, halt the machine, and surface as `Err`.
    pub fn step(&mut self) -> ZResult<Step> {
        if self.halted {
            return Ok(Step::Halted);
        }
        match self.pending {
            PendingInput::Line { .. } => return Ok(Step::SuspendedLine),
            PendingInput::Char { .. } => return Ok(Step::SuspendedChar),
            PendingInput::Idle => {}
        }
        let at = self.pc;
        match self.step_inner() {
            Ok(step) => Ok(step),
            Err(e) if e.is_fatal() => {
                self.screen
                    .print(&format!("\n[fatal: {} at PC {:#07x}]\n", e, at));
                self.halted = true;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn step_inner(&mut self) -> ZResult<Step> {
        let inst = Instruction::decode(&self.mem, self.pc)?;
        debug!("{:#07x}: {}", self.pc, inst);
        self.pc += inst.size;
        self.instruction_count += 1;

        let operands = self.resolve_operands(&inst)?;
        let outcome = self.dispatch(&inst, &operands)?;
        match outcome {
            Outcome::Done | Outcome::Jumped | Outcome::Called | Outcome::Restored => {}
            Outcome::Value(value) => self.store_result(&inst, value)?,
            Outcome::Cond(condition) => self.apply_branch(&inst, condition)?,
            Outcome::ValueCond(value, condition) => {
                self.store_result(&inst, value)?;
                self.apply_branch(&inst, condition)?;
            }
            Outcome::Return(value) => self.do_return(value)?,
            Outcome::SuspendLine => return Ok(Step::SuspendedLine),
            Outcome::SuspendChar => return Ok(Step::SuspendedChar),
            Outcome::Quit => {
                self.halted = true;
                return Ok(Step::Halted);
            }
            Outcome::Restart => {
                self.restart()?;
                return Ok(Step::Restarted);
            }
        }
        if self.halted {
            return Ok(Step::Halted);
        }
        Ok(Step::Stepped)
    }

    /// Resolve raw operands: variable operands read (and for variable 0,
    /// pop) exactly once, in order, before store/branch processing.
    fn resolve_operands(&mut self, inst: &Instruction) -> ZResult<Vec<u16>> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for (i, &raw) in inst.operands.iter().enumerate() {
            let value = match inst.operand_types[i] {
                crate::instruction::OperandType::Variable => {
                    self.stack.read_var(&self.mem, raw as u8)?
                }
                _ => raw,
            };
            values.push(value);
        }
        Ok(values)
    }

    pub(crate) fn read_var(&mut self, var: u8) -> ZResult<u16> {
        self.stack.read_var(&self.mem, var)
    }

    pub(crate) fn write_var(&mut self, var: u8, value: u16) -> ZResult<u16> {
        self.stack.write_var(&mut self.mem, var, value)?;
        Ok(value)
    }

    fn store_result(&mut self, inst: &Instruction, value: u16) -> ZResult<()> {
        let var = inst.store_var.ok_or_else(|| {
            RuntimeError::decode(self.pc, format!("{} without a store byte", inst.opcode.name()))
        })?;
        self.write_var(var, value)?;
        Ok(())
    }

    /// Branch semantics: offsets 0 and 1 mean rfalse/rtrue; otherwise the
    /// new PC is the address after the branch data plus offset minus two.
    fn apply_branch(&mut self, inst: &Instruction, condition: bool) -> ZResult<()> {
        let branch = inst.branch.as_ref().ok_or_else(|| {
            RuntimeError::decode(self.pc, format!("{} without branch data", inst.opcode.name()))
        })?;
        if condition != branch.on_true {
            return Ok(());
        }
        match branch.offset {
            0 => self.do_return(0),
            1 => self.do_return(1),
            off => {
                self.pc = (self.pc as i64 + off as i64 - 2) as u32;
                if self.pc >= self.mem.len() {
                    return Err(RuntimeError::BadAddress(self.pc));
                }
                Ok(())
            }
        }
    }

    /// Pop the current frame and deliver `value` to its disposition. A
    /// return with only the entry frame left ends the program.
    pub(crate) fn do_return(&mut self, value: u16) -> ZResult<()> {
        match self.stack.pop_frame() {
            Some(frame) => {
                self.pc = frame.return_pc;
                match frame.disposition {
                    Disposition::Store(var) => {
                        self.write_var(var, value)?;
                    }
                    Disposition::Discard => {}
                    Disposition::Interrupt => {
                        self.interrupt_result = Some(value);
                    }
                }
                Ok(())
            }
            None => {
                debug!("return from the entry frame with {}", value);
                self.final_result = Some(value);
                self.halted = true;
                Ok(())
            }
        }
    }

    /// The call machinery shared by every call_* opcode and the timer
    /// interrupts. A packed address of 0 calls nothing and delivers 0.
    pub(crate) fn do_call(
        &mut self,
        packed: u16,
        args: &[u16],
        disposition: Disposition,
    ) -> ZResult<Outcome> {
        if packed == 0 {
            match disposition {
                Disposition::Store(var) => {
                    self.write_var(var, 0)?;
                }
                Disposition::Discard => {}
                Disposition::Interrupt => self.interrupt_result = Some(0),
            }
            return Ok(Outcome::Done);
        }

        let routine = self.mem.unpack_routine(packed);
        let locals_count = self.mem.byte(routine)? as usize;
        if locals_count > 15 {
            return Err(RuntimeError::decode(
                routine,
                format!("routine header claims {} locals", locals_count),
            ));
        }

        // v1-4 routines carry initial local values; v5+ locals start at 0.
        let mut locals = vec![0u16; locals_count];
        let mut code = routine + 1;
        if self.mem.version() <= 4 {
            for local in locals.iter_mut() {
                *local = self.mem.word(code)?;
                code += 2;
            }
        }
        for (local, &arg) in locals.iter_mut().zip(args.iter()) {
            *local = arg;
        }

        self.stack.push_frame(Frame {
            return_pc: self.pc,
            locals,
            eval: Vec::new(),
            disposition,
            arg_count: args.len() as u8,
        })?;
        self.pc = code;
        Ok(Outcome::Called)
    }

    // ---- input completion (the coordinator's executor side) ----

    /// Host delivers a finished line. Writes the text buffer, tokenises if
    /// a parse buffer was supplied, stores the terminator (v5+), resumes.
    pub fn complete_line(&mut self, input: &str, terminator: u16) -> ZResult<()> {
        let PendingInput::Line {
            text_buf,
            parse_buf,
            store,
            ..
        } = self.pending.clone()
        else {
            return Err(RuntimeError::InputCancelled);
        };
        self.pending = PendingInput::Idle;

        crate::input::write_line(&mut self.mem, text_buf, input)?;
        if self.transcript_active() {
            self.transcript.push_str(input);
            self.transcript.push('\n');
        }
        if parse_buf != 0 {
            crate::dictionary::tokenise(&mut self.mem, &self.codec, text_buf, parse_buf, 0, false)?;
        }
        if let Some(var) = store {
            let terminator = if self.terminators.is_terminator(terminator) {
                terminator
            } else {
                13
            };
            self.write_var(var, terminator)?;
        }
        Ok(())
    }

    /// Host delivers a keypress for a pending read_char.
    pub fn complete_char(&mut self, code: u16) -> ZResult<()> {
        let PendingInput::Char { store, .. } = self.pending.clone() else {
            return Err(RuntimeError::InputCancelled);
        };
        self.pending = PendingInput::Idle;
        if let Some(var) = store {
            self.write_var(var, code)?;
        }
        Ok(())
    }

    /// Host cancelled the pending read: resume as if an empty line (or a
    /// Return keypress) arrived.
    pub fn cancel_input(&mut self) -> ZResult<()> {
        match self.pending {
            PendingInput::Line { .. } => self.complete_line("", 13),
            PendingInput::Char { .. } => self.complete_char(13),
            PendingInput::Idle => Ok(()),
        }
    }

    /// One timer tick for a timed read: run the interrupt routine to
    /// completion. Nonzero return terminates the read with 0 stored.
    pub fn tick_interrupt(&mut self) -> ZResult<InterruptOutcome> {
        let Some((_, routine)) = self.pending.timer() else {
            return Ok(InterruptOutcome::Continue);
        };
        let value = self.run_interrupt(routine)?;
        if value == 0 {
            return Ok(InterruptOutcome::Continue);
        }
        let store = match self.pending.clone() {
            PendingInput::Line { store, .. } | PendingInput::Char { store, .. } => store,
            PendingInput::Idle => None,
        };
        self.pending = PendingInput::Idle;
        if let Some(var) = store {
            self.write_var(var, 0)?;
        }
        Ok(InterruptOutcome::Terminated)
    }

    /// Call an interrupt routine with the ordinary call machinery and run
    /// until its frame returns. Interrupt routines may print and mutate the
    /// world but must not read input.
    fn run_interrupt(&mut self, routine: u16) -> ZResult<u16> {
        self.interrupt_result = None;
        self.in_interrupt = true;
        let saved_pc = self.pc;
        let result = (|| {
            self.do_call(routine, &[], Disposition::Interrupt)?;
            let mut budget = INTERRUPT_STEP_LIMIT;
            while self.interrupt_result.is_none() {
                if self.halted {
                    return Ok(0);
                }
                self.step_inner()?;
                budget -= 1;
                if budget == 0 {
                    return Err(RuntimeError::decode(
                        self.pc,
                        "interrupt routine did not return",
                    ));
                }
            }
            Ok(self.interrupt_result.take().unwrap_or(0))
        })();
        self.in_interrupt = false;
        self.pc = saved_pc;
        result
    }

    pub(crate) fn install_pending(&mut self, pending: PendingInput) -> ZResult<()> {
        if self.in_interrupt {
            return Err(RuntimeError::decode(
                self.pc,
                "interrupt routine attempted to read input",
            ));
        }
        self.pending = pending;
        Ok(())
    }

    // ---- output streams ----

    fn transcript_active(&self) -> bool {
        if self.transcript_stream {
            return true;
        }
        self.mem
            .word(offset::FLAGS2)
            .map(|f| f & 1 != 0)
            .unwrap_or(false)
    }

    /// Route text through the output streams: an active memory stream
    /// swallows everything; otherwise the screen and transcript see it.
    pub(crate) fn print_str(&mut self, text: &str) -> ZResult<()> {
        if let Some(&table) = self.memory_streams.last() {
            for ch in text.chars() {
                let code = if ch == '\n' {
                    13
                } else {
                    self.codec.char_to_zscii(ch).unwrap_or(b'?' as u16)
                };
                let count = self.mem.word(table)?;
                self.mem.set_byte(table + 2 + count as u32, code as u8)?;
                self.mem.set_word(table, count + 1)?;
            }
            return Ok(());
        }
        if self.screen_stream {
            self.screen.print(text);
        }
        if self.transcript_active() {
            self.transcript.push_str(text);
        }
        Ok(())
    }

    /// output_stream opcode: positive selects, negative deselects. Stream 3
    /// takes the table operand and stacks.
    pub(crate) fn select_stream(&mut self, number: i16, table: u32) -> ZResult<()> {
        match number {
            0 => {}
            1 => self.screen_stream = true,
            -1 => self.screen_stream = false,
            2 => {
                self.transcript_stream = true;
                let flags2 = self.mem.word(offset::FLAGS2)?;
                self.mem.set_word(offset::FLAGS2, flags2 | 1)?;
            }
            -2 => {
                self.transcript_stream = false;
                let flags2 = self.mem.word(offset::FLAGS2)?;
                self.mem.set_word(offset::FLAGS2, flags2 & !1)?;
            }
            3 => {
                if table == 0 {
                    warn!("output_stream 3 without a table, ignored");
                    return Ok(());
                }
                if self.memory_streams.len() >= MAX_MEMORY_STREAMS {
                    return Err(RuntimeError::StackOverflow);
                }
                self.mem.set_word(table, 0)?;
                self.memory_streams.push(table);
            }
            -3 => {
                if self.memory_streams.pop().is_none() {
                    warn!("output_stream -3 with no memory stream active");
                }
            }
            4 | -4 => debug!("command-recording stream toggled ({})", number),
            _ => warn!("unknown output stream {}", number),
        }
        Ok(())
    }

    // ---- status line (executor is the single authority) ----

    /// Recompute and push the v1-3 status line: short name of the object in
    /// global 0, score/moves or hours/minutes per the header's status type.
    pub(crate) fn update_status(&mut self) -> ZResult<()> {
        if self.mem.version() > 3 {
            return Ok(());
        }
        let location_obj = self.stack.read_var(&self.mem, 0x10)?;
        let location = if location_obj == 0 {
            warn!("status line with no location object");
            String::new()
        } else {
            self.objects
                .name(&self.mem, &self.codec, location_obj)
                .unwrap_or_default()
        };
        let a = self.stack.read_var(&self.mem, 0x11)? as i16;
        let b = self.stack.read_var(&self.mem, 0x12)?;
        let is_time = self.mem.byte(offset::FLAGS1)? & 0x02 != 0;
        self.screen.update_status_bar(&location, a, b, is_time);
        Ok(())
    }

    // ---- header capabilities ----

    /// Stamp the interpreter-controlled header fields: capability bits,
    /// interpreter identity, screen geometry. Runs at startup, on restart
    /// and restore, and again whenever the host reports a resize.
    pub fn write_interpreter_header(&mut self) -> ZResult<()> {
        let caps = self.screen.caps();
        let version = self.mem.version();

        let mut flags1 = self.mem.byte(offset::FLAGS1)?;
        if version <= 3 {
            flags1 &= !0x70;
            if !caps.status {
                flags1 |= 0x10;
            }
            if caps.split {
                flags1 |= 0x20;
            }
        } else {
            flags1 = 0;
            if caps.colours {
                flags1 |= 0x01;
            }
            if caps.pictures && version == 6 {
                flags1 |= 0x02;
            }
            if caps.bold {
                flags1 |= 0x04;
            }
            if caps.italic {
                flags1 |= 0x08;
            }
            if caps.fixed {
                flags1 |= 0x10;
            }
            if caps.sound && version >= 5 {
                flags1 |= 0x20;
            }
            if caps.timed {
                flags1 |= 0x80;
            }
        }
        self.mem.set_header_byte(offset::FLAGS1, flags1)?;

        // flags2: mask the game's requests down to what we deliver. Undo is
        // always available; mouse never is.
        let mut flags2 = self.mem.word(offset::FLAGS2)?;
        if !caps.pictures {
            flags2 &= !0x0008;
        }
        flags2 &= !0x0020;
        if !caps.sound {
            flags2 &= !0x0080;
        }
        self.mem.set_header_word(offset::FLAGS2, flags2)?;

        if version >= 4 {
            self.mem
                .set_header_byte(offset::INTERPRETER_NUMBER, self.interpreter_number)?;
            self.mem.set_header_byte(offset::INTERPRETER_VERSION, b'B')?;
            self.mem
                .set_header_byte(offset::SCREEN_LINES, caps.rows.min(255) as u8)?;
            self.mem
                .set_header_byte(offset::SCREEN_COLS, caps.cols.min(255) as u8)?;
        }
        if version >= 5 {
            self.mem
                .set_header_word(offset::SCREEN_WIDTH_UNITS, caps.cols)?;
            self.mem
                .set_header_word(offset::SCREEN_HEIGHT_UNITS, caps.rows)?;
            self.mem.set_header_byte(offset::FONT_WIDTH, 1)?;
            self.mem.set_header_byte(offset::FONT_HEIGHT, 1)?;
            self.mem.set_header_byte(offset::DEFAULT_BG, 2)?;
            self.mem.set_header_byte(offset::DEFAULT_FG, 9)?;
        }
        self.mem
            .set_header_word(offset::STANDARD_REVISION, 0x0100)?;
        Ok(())
    }

    /// The host calls this when its window changed size.
    pub fn notify_resize(&mut self) -> ZResult<()> {
        self.write_interpreter_header()
    }

    // ---- restart / save / restore ----

    fn restart(&mut self) -> ZResult<()> {
        info!("restart: resetting dynamic memory and the call stack");
        self.mem.reset_dynamic();
        self.write_interpreter_header()?;
        self.stack.reset();
        self.pending = PendingInput::Idle;
        self.memory_streams.clear();
        self.pc = self.mem.header.initial_pc;
        self.enter_initial_routine()?;
        Ok(())
    }

    /// Build a Quetzal snapshot pinned at `save_pc` (the save instruction's
    /// store/branch byte) and hand it to the storage host.
    pub(crate) fn save_game(&mut self, save_pc: u32) -> Result<(), String> {
        let snapshot = Snapshot::capture(&self.mem, self.stack.frames(), save_pc);
        let bytes = quetzal::to_quetzal(&snapshot, &self.mem);
        self.storage.save(&self.save_name.clone(), &bytes)
    }

    /// Load a Quetzal file and rebuild the state triple. On success the PC
    /// points at the original save's store/branch byte; `finish_restore`
    /// then delivers the "restored" result through it.
    pub(crate) fn restore_game(&mut self) -> ZResult<()> {
        let bytes = self
            .storage
            .load(&self.save_name.clone())
            .map_err(RuntimeError::RestoreFailure)?;
        let snapshot = quetzal::from_quetzal(&bytes, &self.mem)?;
        self.apply_snapshot(snapshot)
    }

    pub(crate) fn apply_snapshot(&mut self, snapshot: Snapshot) -> ZResult<()> {
        self.mem.overwrite_dynamic(&snapshot.dynamic)?;
        self.stack.replace(snapshot.frames);
        self.pc = snapshot.pc;
        self.pending = PendingInput::Idle;
        self.memory_streams.clear();
        self.write_interpreter_header()?;
        self.finish_restore()
    }

    /// Deliver the save opcode's result at the restored PC: v1-3 re-read
    /// its branch data and take the branch; v4+ re-read its store byte and
    /// store 2 ("restored").
    fn finish_restore(&mut self) -> ZResult<()> {
        if self.mem.version() <= 3 {
            let first = self.mem.byte(self.pc)?;
            self.pc += 1;
            let on_true = first & 0x80 != 0;
            let offset = if first & 0x40 != 0 {
                (first & 0x3f) as i16
            } else {
                let second = self.mem.byte(self.pc)?;
                self.pc += 1;
                let raw = (((first & 0x3f) as i16) << 8) | second as i16;
                if raw & 0x2000 != 0 {
                    raw | (0xc000u16 as i16)
                } else {
                    raw
                }
            };
            if on_true {
                match offset {
                    0 => self.do_return(0)?,
                    1 => self.do_return(1)?,
                    off => self.pc = (self.pc as i64 + off as i64 - 2) as u32,
                }
            }
        } else {
            let var = self.mem.byte(self.pc)?;
            self.pc += 1;
            self.write_var(var, 2)?;
        }
        Ok(())
    }

    /// Capture the state triple at the current instruction boundary. Hosts
    /// use this for autosave-style checkpoints outside the story's own
    /// save opcodes.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.mem, self.stack.frames(), self.pc)
    }

    /// Reinstate a checkpoint taken with `snapshot`. Unlike a story-driven
    /// restore there is no pending save result to deliver; execution
    /// resumes exactly at the captured boundary.
    pub fn restore_snapshot(&mut self, snapshot: Snapshot) -> ZResult<()> {
        self.mem.overwrite_dynamic(&snapshot.dynamic)?;
        self.stack.replace(snapshot.frames);
        self.pc = snapshot.pc;
        self.pending = PendingInput::Idle;
        self.memory_streams.clear();
        self.halted = false;
        Ok(())
    }

    pub(crate) fn push_undo(&mut self, save_pc: u32) {
        if self.undo.len() >= UNDO_SLOTS {
            self.undo.remove(0);
        }
        self.undo
            .push(Snapshot::capture(&self.mem, self.stack.frames(), save_pc));
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Snapshot> {
        self.undo.pop()
    }

    // ---- small shared helpers for the opcode modules ----

    pub(crate) fn screen_mut(&mut self) -> &mut dyn Screen {
        self.screen.as_mut()
    }

    pub(crate) fn media_mut(&mut self) -> &mut dyn Multimedia {
        self.media.as_mut()
    }

    pub(crate) fn set_font(&mut self, font: u16) -> u16 {
        let previous = self.screen.set_font(font);
        if font != 0 {
            self.font = font;
        }
        previous
    }

    /// Address of the instruction currently being executed (the PC has
    /// already advanced past it).
    pub(crate) fn inst_addr(&self, inst: &Instruction) -> u32 {
        self.pc - inst.size
    }

    /// Route a decoded instruction to its handler. The handlers live in the
    /// opcodes_* modules, grouped by subsystem.
    fn dispatch(&mut self, inst: &Instruction, ops: &[u16]) -> ZResult<Outcome> {
        use crate::opcode_tables::Opcode::*;
        match inst.opcode {
            // arithmetic and logic
            Add | Sub | Mul | Div | Mod => self.op_arith(inst.opcode, ops),
            And | Or => self.op_bitwise(inst.opcode, ops),
            Not | NotVar => self.op_not(ops),
            LogShift => self.op_log_shift(ops),
            ArtShift => self.op_art_shift(ops),
            Je => self.op_je(ops),
            Jl | Jg => self.op_compare(inst.opcode, ops),
            Jz => self.op_jz(ops),
            Test => self.op_test(ops),
            Random => self.op_random(ops),

            // variables and tables
            Store => self.op_store(ops),
            Load => self.op_load(ops),
            Push => self.op_push(ops),
            Pull => self.op_pull(inst, ops),
            Inc => self.op_inc_dec(ops, 1),
            Dec => self.op_inc_dec(ops, -1),
            IncChk => self.op_step_chk(ops, 1),
            DecChk => self.op_step_chk(ops, -1),
            Loadw | Loadb => self.op_loadx(inst.opcode, ops),
            Storew | Storeb => self.op_storex(inst.opcode, ops),
            CopyTable => self.op_copy_table(ops),
            ScanTable => self.op_scan_table(ops),

            // objects
            GetSibling => self.op_relation(ops, 1),
            GetChild => self.op_relation(ops, 2),
            GetParent => self.op_get_parent(ops),
            Jin => self.op_jin(ops),
            TestAttr => self.op_test_attr(ops),
            SetAttr => self.op_write_attr(ops, true),
            ClearAttr => self.op_write_attr(ops, false),
            InsertObj => self.op_insert_obj(ops),
            RemoveObj => self.op_remove_obj(ops),
            GetProp => self.op_get_prop(ops),
            PutProp => self.op_put_prop(ops),
            GetPropAddr => self.op_get_prop_addr(ops),
            GetPropLen => self.op_get_prop_len(ops),
            GetNextProp => self.op_get_next_prop(ops),
            PrintObj => self.op_print_obj(ops),

            // control flow
            CallVs | CallVs2 | Call1s | Call2s => self.op_call(inst, ops, true),
            CallVn | CallVn2 | Call1n | Call2n => self.op_call(inst, ops, false),
            Ret => self.op_ret(ops),
            Rtrue => Ok(Outcome::Return(1)),
            Rfalse => Ok(Outcome::Return(0)),
            RetPopped => self.op_ret_popped(),
            Pop => self.op_pop(),
            Jump => self.op_jump(ops),
            Throw => self.op_throw(ops),
            Catch => Ok(Outcome::Value(self.stack.depth() as u16)),
            CheckArgCount => self.op_check_arg_count(ops),
            Nop => Ok(Outcome::Done),
            Quit => Ok(Outcome::Quit),
            Restart => Ok(Outcome::Restart),
            Verify => Ok(Outcome::Cond(self.mem.verify_checksum())),
            Piracy => Ok(Outcome::Cond(true)),
            Save | SaveExt => self.op_save(inst, ops),
            Restore | RestoreExt => self.op_restore(inst, ops),
            SaveUndo => self.op_save_undo(inst),
            RestoreUndo => self.op_restore_undo(),

            // text output
            Print => self.op_print(inst),
            PrintRet => self.op_print_ret(inst),
            PrintChar => self.op_print_char(ops),
            PrintNum => self.op_print_num(ops),
            PrintAddr => self.op_print_addr(ops),
            PrintPaddr => self.op_print_paddr(ops),
            NewLine => self.op_new_line(),
            PrintUnicode => self.op_print_unicode(ops),
            CheckUnicode => self.op_check_unicode(ops),
            PrintTable => self.op_print_table(ops),
            EncodeText => self.op_encode_text(ops),
            Tokenise => self.op_tokenise(ops),

            // input
            Read => self.op_read(inst, ops),
            ReadChar => self.op_read_char(inst, ops),

            // screen, streams, sound, pictures
            ShowStatus => self.op_show_status(),
            SplitWindow => self.op_split_window(ops),
            SetWindow => self.op_set_window(ops),
            EraseWindow => self.op_erase_window(ops),
            EraseLine => self.op_erase_line(ops),
            SetCursor => self.op_set_cursor(ops),
            GetCursor => self.op_get_cursor(ops),
            SetTextStyle => self.op_set_text_style(ops),
            BufferMode => self.op_buffer_mode(ops),
            SetColour => self.op_set_colour(ops),
            SetFont => self.op_set_font(ops),
            OutputStream => self.op_output_stream(ops),
            InputStream => self.op_input_stream(ops),
            SoundEffect => self.op_sound_effect(ops),
            DrawPicture => self.op_draw_picture(ops),
            PictureData => self.op_picture_data(ops),
            ErasePicture => self.op_erase_picture(ops),
            SetMargins => self.op_set_margins(ops),
            ReadMouse => self.op_read_mouse(ops),
            MouseWindow => self.op_mouse_window(ops),
        }
    }
}

/// Fetch operand `i` or fail with a decode error; handlers use this instead
/// of indexing so a short operand list cannot panic.
pub(crate) fn arg(machine: &Machine, ops: &[u16], i: usize) -> ZResult<u16> {
    ops.get(i)
        .copied()
        .ok_or_else(|| RuntimeError::decode(machine.pc, format!("missing operand {}", i)))
}

/// Operand `i`, or a default when omitted (trailing optional operands).
pub(crate) fn arg_or(ops: &[u16], i: usize, default: u16) -> u16 {
    ops.get(i).copied().unwrap_or(default)
}
