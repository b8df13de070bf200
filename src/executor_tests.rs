//! Executor behaviour tests: branch encodings, call conventions, stream
//! routing, fatal errors, restart, and the save family

use std::cell::RefCell;
use std::rc::Rc;

use test_log::test;

use crate::error::RuntimeError;
use crate::executor::Step;
use crate::header::offset;
use crate::host::{MemStorage, Storage};
use crate::test_utils::*;

#[test]
fn branch_offsets_zero_and_one_return_instead_of_jumping() {
    let mut builder = StoryBuilder::new(3);
    // jz #0 [TRUE RTRUE] — the branch "offset" 1 is a return of true.
    let r1 = builder.routine(0x1100, &[]);
    builder.write(r1, &[0x90, 0x00, 0xc1]);
    // jz #0 [TRUE RFALSE]
    let r2 = builder.routine(0x1180, &[]);
    builder.write(r2, &[0x90, 0x00, 0xc0]);

    let p1 = builder.pack(0x1100);
    let p2 = builder.pack(0x1180);
    builder.write(
        CODE_BASE,
        &[
            0xe0, 0x3f, (p1 >> 8) as u8, (p1 & 0xff) as u8, 0x00,
            0xe0, 0x3f, (p2 >> 8) as u8, (p2 & 0xff) as u8, 0x00,
            0xba,
        ],
    );

    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 20);
    assert_eq!(machine.stack.current().eval, vec![1, 0]);
}

#[test]
fn call_with_packed_address_zero_delivers_zero() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0xe0, 0x3f, 0x00, 0x00, 0x00, 0xba]);
    let (mut machine, _screen) = builder.build();

    assert_eq!(machine.step().unwrap(), Step::Stepped);
    // No frame was pushed and no routine ran; the result is just 0.
    assert_eq!(machine.stack.depth(), 1);
    assert_eq!(machine.stack.current().eval, vec![0]);
}

#[test]
fn popping_an_empty_eval_stack_is_fatal() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0xb8]); // ret_popped
    let (mut machine, screen) = builder.build();

    assert!(matches!(
        machine.step(),
        Err(RuntimeError::StackUnderflow)
    ));
    assert!(machine.halted());
    assert!(screen.borrow().contents().contains("fatal"));
    // The machine refuses further execution.
    assert_eq!(machine.step().unwrap(), Step::Halted);
}

#[test]
fn divide_by_zero_is_fatal() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0x17, 0x01, 0x00, 0x00]); // div #1 #0 -> sp
    let (mut machine, _screen) = builder.build();
    assert!(matches!(machine.step(), Err(RuntimeError::DivideByZero)));
}

#[test]
fn je_with_one_operand_is_a_decode_error() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0xc1, 0x7f, 0x05, 0xc1]);
    let (mut machine, _screen) = builder.build();
    assert!(matches!(machine.step(), Err(RuntimeError::Decode { .. })));
}

#[test]
fn je_with_three_operands_matches_any() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0xe8, 0x7f, 0x07]); // push #7
    builder.write(
        CODE_BASE + 3,
        &[0xc1, 0x97, 0x00, 0x01, 0x07, 0xc6], // je sp 1 7 [TRUE +6]
    );
    builder.write(CODE_BASE + 9, &[0x0d, 0x10, 0x02, 0xba]);
    builder.write(CODE_BASE + 13, &[0x0d, 0x10, 0x01, 0xba]);
    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 10);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 1);
}

#[test]
fn jump_outside_the_image_is_fatal() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0x8c, 0x7f, 0xff]);
    let (mut machine, _screen) = builder.build();
    assert!(matches!(machine.step(), Err(RuntimeError::BadAddress(_))));
}

#[test]
fn check_arg_count_sees_supplied_arguments() {
    let mut builder = StoryBuilder::new(5);
    // check_arg_count #1 [TRUE RTRUE]; rfalse
    let r1 = builder.routine(0x1200, &[0, 0]);
    builder.write(r1, &[0xff, 0x7f, 0x01, 0xc1, 0xb1]);
    // check_arg_count #2 [TRUE RTRUE]; rfalse
    let r2 = builder.routine(0x1280, &[0, 0]);
    builder.write(r2, &[0xff, 0x7f, 0x02, 0xc1, 0xb1]);

    let p1 = builder.pack(0x1200);
    let p2 = builder.pack(0x1280);
    builder.write(
        CODE_BASE,
        &[
            // both called with exactly one argument
            0xe0, 0x1f, (p1 >> 8) as u8, (p1 & 0xff) as u8, 0x07, 0x00,
            0xe0, 0x1f, (p2 >> 8) as u8, (p2 & 0xff) as u8, 0x07, 0x00,
            0xba,
        ],
    );

    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 20);
    assert_eq!(machine.stack.current().eval, vec![1, 0]);
}

#[test]
fn catch_then_throw_unwinds_and_returns() {
    let mut builder = StoryBuilder::new(5);
    builder.write(
        CODE_BASE,
        &[
            0xb9, 0x00, // catch -> sp
            0x3c, 0x2a, 0x00, // throw #42 sp
        ],
    );
    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 10);
    assert_eq!(machine.final_result(), Some(42));
}

#[test]
fn restart_resets_dynamic_memory_and_pc() {
    let mut builder = StoryBuilder::new(3);
    builder.write(CODE_BASE, &[0x95, 0x10, 0xb7]); // inc G0; restart
    let (mut machine, _screen) = builder.build();

    assert_eq!(machine.step().unwrap(), Step::Stepped);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 1);
    assert_eq!(machine.step().unwrap(), Step::Restarted);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 0);
    assert_eq!(machine.pc, CODE_BASE);
}

#[test]
fn memory_stream_swallows_screen_output() {
    let mut builder = StoryBuilder::new(3);
    builder.write(
        CODE_BASE,
        &[
            0xf3, 0x4f, 0x03, (SCRATCH >> 8) as u8, (SCRATCH & 0xff) as u8, // output_stream #3 table
            0xe5, 0x7f, 0x78, // print_char 'x'
            0xf3, 0x3f, 0xff, 0xfd, // output_stream #-3
            0xe5, 0x7f, 0x79, // print_char 'y'
            0xba,
        ],
    );
    let (mut machine, screen) = builder.build();
    run_to_halt(&mut machine, 20);

    // While the memory stream was up, nothing reached the screen.
    assert_eq!(screen.borrow().contents(), "y");
    assert_eq!(machine.mem.word(SCRATCH).unwrap(), 1);
    assert_eq!(machine.mem.byte(SCRATCH + 2).unwrap(), b'x');
}

#[test]
fn transcript_stream_mirrors_output_and_sets_the_flag() {
    let mut builder = StoryBuilder::new(3);
    builder.write(
        CODE_BASE,
        &[
            0xf3, 0x7f, 0x02, // output_stream #2
            0xe5, 0x7f, 0x68, // print_char 'h'
            0xba,
        ],
    );
    let (mut machine, screen) = builder.build();
    run_to_halt(&mut machine, 20);

    assert_eq!(screen.borrow().contents(), "h");
    assert_eq!(machine.take_transcript(), "h");
    assert_eq!(machine.mem.word(offset::FLAGS2).unwrap() & 1, 1);
}

#[test]
fn get_child_stores_then_branches() {
    let mut builder = StoryBuilder::new(3);
    builder.objects3(&[(0, 0, 2), (1, 0, 0)]);
    builder.write(
        CODE_BASE,
        &[
            0x92, 0x01, 0x00, 0xc6, // get_child #1 -> sp [TRUE +6]
            0x0d, 0x10, 0x02, 0xba, // store G0 #2; quit
            0x0d, 0x10, 0x01, 0xba, // store G0 #1; quit
        ],
    );
    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 10);

    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 1);
    assert_eq!(machine.stack.current().eval, vec![2]);
}

#[test]
fn status_line_comes_from_the_globals() {
    let mut builder = StoryBuilder::new(3);
    builder.objects3(&[(0, 0, 0)]);
    builder.global(0, 1).global(1, 5).global(2, 10);
    builder.write(CODE_BASE, &[0xbc, 0xba]); // show_status; quit
    let (mut machine, screen) = builder.build();
    run_to_halt(&mut machine, 10);
    assert_eq!(screen.borrow().status_line(), "  5/10");
}

#[test]
fn v3_save_branches_and_restore_resumes_there() {
    let storage = Rc::new(RefCell::new(MemStorage::new()));

    let mut builder = StoryBuilder::new(3);
    // First life: set G0, save (branching rtrue on success), and anything
    // past the branch only runs if the save failed.
    builder.write(
        CODE_BASE,
        &[
            0x0d, 0x10, 0x01, // store G0 #1
            0xb5, 0xc1, // save [TRUE RTRUE]
            0x0d, 0x10, 0x09, // store G0 #9 (failure path)
            0xba,
        ],
    );
    // Second life: a restore-only entry point.
    builder.write(
        0x2000,
        &[
            0xb6, 0xc1, // restore [TRUE RTRUE] (branch taken only on failure-free path)
            0x0d, 0x10, 0x09, // store G0 #9 (failure path)
            0xba,
        ],
    );

    let (mut first, _screen) = builder.build_with_storage(storage.clone());
    run_to_halt(&mut first, 10);
    assert_eq!(first.final_result(), Some(1));
    assert_eq!(first.mem.word(GLOBALS_ADDR).unwrap(), 1);
    assert_eq!(storage.borrow().list(), vec!["story.qzl".to_string()]);

    builder.initial_pc(0x2000);
    let (mut second, _screen) = builder.build_with_storage(storage);
    run_to_halt(&mut second, 10);
    // Restore rebuilt the first life's state and resumed at its save
    // branch, which returns true out of the entry frame.
    assert_eq!(second.final_result(), Some(1));
    assert_eq!(second.mem.word(GLOBALS_ADDR).unwrap(), 1);
}

#[test]
fn failed_restore_reports_and_continues() {
    let mut builder = StoryBuilder::new(3);
    builder.write(
        CODE_BASE,
        &[
            0xb6, 0xc1, // restore [TRUE RTRUE]
            0x0d, 0x10, 0x09, // store G0 #9
            0xba,
        ],
    );
    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 10);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 9);
    assert_eq!(machine.final_result(), None);
}

#[test]
fn undo_snapshots_deliver_the_restore_convention() {
    let mut builder = StoryBuilder::new(5);
    builder.write(
        CODE_BASE,
        &[
            0xbe, 0x09, 0xff, 0x00, // save_undo -> sp
            0x95, 0x10, // inc G0
            0xbe, 0x0a, 0xff, 0x00, // restore_undo -> sp
            0xba,
        ],
    );
    let (mut machine, _screen) = builder.build();
    run_to_halt(&mut machine, 10);

    // First pass stores 1, the undo restore re-delivers 2 at the same
    // store byte, the re-run restore_undo finds no snapshot and stores 0.
    assert_eq!(machine.stack.current().eval, vec![2, 0]);
    assert_eq!(machine.mem.word(GLOBALS_ADDR).unwrap(), 1);
}

#[test]
fn interpreter_header_fields_are_stamped() {
    let builder = StoryBuilder::new(5);
    let (machine, _screen) = builder.build();
    assert_eq!(machine.mem.byte(offset::INTERPRETER_NUMBER).unwrap(), 6);
    assert_eq!(machine.mem.byte(offset::SCREEN_LINES).unwrap(), 24);
    assert_eq!(machine.mem.byte(offset::SCREEN_COLS).unwrap(), 80);
    assert_eq!(
        machine.mem.word(offset::STANDARD_REVISION).unwrap(),
        0x0100
    );
}
