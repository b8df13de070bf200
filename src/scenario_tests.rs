//! End-to-end scenarios driving the whole machine through synthetic
//! stories: arithmetic through the call convention, variadic je, object
//! surgery, tokenisation, timed input, and the save/restore round trip.

use test_log::test;

use crate::executor::{InterruptOutcome, Step};
use crate::quetzal;
use crate::test_utils::*;

/// A routine is called with no arguments, adds two constants into its
/// local, and returns it; the top-level ret_popped delivers it out of the
/// entry frame, halting the machine.
#[test]
fn s1_arithmetic_through_a_call() {
    let mut builder = StoryBuilder::new(3);
    let code = builder.routine(0x1100, &[0]);
    builder.write(code, &[0x14, 0x05, 0x07, 0x01]); // add #5 #7 -> V01
    builder.write(code + 4, &[0xab, 0x01]); // ret V01
    let packed = builder.pack(0x1100);
    builder.write(
        CODE_BASE,
        &[
            0xe0, // call_vs
            0x3f, // one large-constant operand
            (packed >> 8) as u8,
            (packed & 0xff) as u8,
            0x00, // -> sp
            0xb8, // ret_popped
        ],
    );

    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 20);
    assert_eq!(machine.final_result(), Some(12));
}

fn je_story(pushed: u16) -> StoryBuilder {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0xe8, 0x7f, pushed as u8]); // push #n
    builder.write(
        CODE_BASE + 3,
        &[0xc1, 0x95, 0x00, 0x01, 0x02, 0x03, 0xc6], // je sp 1 2 3 [TRUE +6]
    );
    builder.write(CODE_BASE + 10, &[0x0d, 0x10, 0x02, 0xba]); // store G0 #2; quit
    builder.write(CODE_BASE + 14, &[0x0d, 0x10, 0x01, 0xba]); // store G0 #1; quit
    builder
}

#[test]
fn s2_je_four_operands_branches_on_any_match() {
    let (mut machine, _screen) = je_story(3).build();
    run_to_halt(&mut machine, 20);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 1);
}

#[test]
fn s2_je_four_operands_falls_through_on_no_match() {
    let (mut machine, _screen) = je_story(4).build();
    run_to_halt(&mut machine, 20);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 2);
}

/// remove_obj then insert_obj re-roots object 2 under its former sibling.
#[test]
fn s3_object_remove_and_insert() {
    let mut builder = StoryBuilder::new(3);
    builder.objects3(&[(0, 0, 3), (1, 0, 0), (1, 2, 0)]);
    builder.write(
        CODE_BASE,
        &[
            0x99, 0x02, // remove_obj #2
            0x0e, 0x02, 0x03, // insert_obj #2 #3
            0xba, // quit
        ],
    );

    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 20);

    let objects = machine.objects;
    assert_eq!(objects.parent(&machine.mem, 2).unwrap(), 3);
    assert_eq!(objects.child(&machine.mem, 3).unwrap(), 2);
    assert_eq!(objects.child(&machine.mem, 1).unwrap(), 3);
    assert_eq!(objects.sibling(&machine.mem, 3).unwrap(), 0);
}

/// A v5 aread suspends, input arrives, and the parse buffer fills with
/// dictionary addresses and 1-indexed positions.
#[test]
fn s4_read_line_tokenises_into_parse_buffer() {
    let mut builder = StoryBuilder::new(5);
    builder.dictionary(&[b'.'], &["look", "take", "bottle"]);
    builder.byte(TEXT_BUF, 60);
    builder.byte(PARSE_BUF, 10);
    builder.write(
        CODE_BASE,
        &[
            0xe4, // aread
            0x0f, // two large-constant operands
            (TEXT_BUF >> 8) as u8,
            (TEXT_BUF & 0xff) as u8,
            (PARSE_BUF >> 8) as u8,
            (PARSE_BUF & 0xff) as u8,
            0x00, // terminator -> sp
            0xba, // quit
        ],
    );

    let (mut machine, _screen) = builder.build();
    assert_eq!(machine.step().unwrap(), Step::SuspendedLine);
    assert!(machine.paused());
    machine.complete_line("take bottle.", 13).unwrap();

    let mem = &machine.mem;
    assert_eq!(mem.byte(PARSE_BUF + 1).unwrap(), 3);
    let take_addr = mem.word(PARSE_BUF + 2).unwrap();
    let bottle_addr = mem.word(PARSE_BUF + 6).unwrap();
    let dot_addr = mem.word(PARSE_BUF + 10).unwrap();
    assert_ne!(take_addr, 0);
    assert_ne!(bottle_addr, 0);
    assert_eq!(dot_addr, 0); // '.' is a separator, not a dictionary word

    let dict = crate::dictionary::Dictionary::parse(mem, DICT_ADDR).unwrap();
    assert_eq!(
        take_addr,
        dict.lookup(mem, &machine.codec, "take").unwrap()
    );
    assert_eq!(
        bottle_addr,
        dict.lookup(mem, &machine.codec, "bottle").unwrap()
    );

    // lengths and 1-indexed positions
    assert_eq!(mem.byte(PARSE_BUF + 4).unwrap(), 4);
    assert_eq!(mem.byte(PARSE_BUF + 5).unwrap(), 1);
    assert_eq!(mem.byte(PARSE_BUF + 8).unwrap(), 6);
    assert_eq!(mem.byte(PARSE_BUF + 9).unwrap(), 6);
    assert_eq!(mem.byte(PARSE_BUF + 13).unwrap(), 12);

    // the terminator landed in the store variable (the stack)
    assert_eq!(machine.stack.current().eval.last(), Some(&13));

    assert_eq!(machine.step().unwrap(), Step::Halted);
}

/// A timed read_char whose interrupt routine increments a global and
/// terminates the read on its third activation; the stored result is 0.
#[test]
fn s5_timed_read_char_terminated_by_routine() {
    let mut builder = StoryBuilder::new(5);
    let routine_code = builder.routine(0x1200, &[]);
    builder.write(routine_code, &[0x95, 0x10]); // inc G0
    builder.write(routine_code + 2, &[0x41, 0x10, 0x03, 0xc1]); // je G0 #3 [TRUE RTRUE]
    builder.write(routine_code + 6, &[0xb1]); // rfalse
    let packed = builder.pack(0x1200);
    builder.write(
        CODE_BASE,
        &[
            0xf6, // read_char
            0x53, // small, small, large
            0x01, // device 1
            0x0a, // time: 10 tenths
            (packed >> 8) as u8,
            (packed & 0xff) as u8,
            0x00, // -> sp
            0xba, // quit
        ],
    );

    let (mut machine, _screen) = builder.build();
    assert_eq!(machine.step().unwrap(), Step::SuspendedChar);

    assert_eq!(machine.tick_interrupt().unwrap(), InterruptOutcome::Continue);
    assert_eq!(machine.tick_interrupt().unwrap(), InterruptOutcome::Continue);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 2);
    assert_eq!(
        machine.tick_interrupt().unwrap(),
        InterruptOutcome::Terminated
    );

    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 3);
    assert_eq!(machine.stack.current().eval.last(), Some(&0));
    assert!(!machine.paused());
    assert_eq!(machine.step().unwrap(), Step::Halted);
}

/// Run, snapshot through the Quetzal wire format, run on, restore, and
/// verify the replayed stretch prints exactly the same output.
#[test]
fn s6_save_restore_round_trip_replays_identically() {
    let mut builder = StoryBuilder::new(3);
    builder.write(
        CODE_BASE,
        &[
            0x95, 0x11, // inc G1
            0xe6, 0xbf, 0x11, // print_num G1
            0xbb, // new_line
            0x8c, 0xff, 0xf9, // jump back to the top
        ],
    );

    let (mut machine, screen) = builder.build();
    for _ in 0..100 {
        assert_eq!(machine.step().unwrap(), Step::Stepped);
    }

    // Through the wire format, not just an in-memory clone.
    let snapshot = machine.snapshot();
    let wire = quetzal::to_quetzal(&snapshot, &machine.mem);
    let reloaded = quetzal::from_quetzal(&wire, &machine.mem).unwrap();
    assert_eq!(reloaded.pc, snapshot.pc);

    screen.borrow_mut().take();
    for _ in 0..100 {
        machine.step().unwrap();
    }
    let first_run = screen.borrow_mut().take();
    assert!(!first_run.is_empty());

    machine.restore_snapshot(reloaded).unwrap();
    for _ in 0..100 {
        machine.step().unwrap();
    }
    let replay = screen.borrow_mut().take();
    assert_eq!(first_run, replay);
}
