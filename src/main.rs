//! The bundled interpreter: load a story file, wire the core to the
//! terminal hosts, and drive the step loop until the story halts.

mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use brasslantern::dictionary::Dictionary;
use brasslantern::executor::{Machine, Step};
use brasslantern::header::interpreter_number;
use brasslantern::host::NullMedia;
use brasslantern::memory::Memory;
use brasslantern::objects::ObjectTable;
use brasslantern::zscii::TextCodec;

use terminal::{FileStorage, InputEvent, TerminalScreen};

#[derive(Parser)]
#[command(
    name = "brasslantern",
    about = "A Z-Machine interpreter for Infocom-format story files"
)]
struct Args {
    /// Story file to run (.z1 through .z8, .dat)
    story: PathBuf,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Interpreter identity to report to the story
    /// (amiga, dec, ibm-pc, c64, apple2e, mac, atari-st, next)
    #[arg(short = 'i', long = "interpreter")]
    interpreter: Option<String>,

    /// Dump the story header and exit
    #[arg(short = 'H', long = "header")]
    header: bool,

    /// Dump the object tree and exit
    #[arg(short = 'o', long = "object-tree")]
    object_tree: bool,

    /// Dump the dictionary and exit
    #[arg(short = 't', long = "dict")]
    dict: bool,

    /// Load and validate the story without executing it
    #[arg(short = 'n', long = "no-exec")]
    no_exec: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("brasslantern: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let bytes = std::fs::read(&args.story)
        .map_err(|e| format!("cannot read {}: {e}", args.story.display()))?;
    let mem = Memory::from_story(bytes).map_err(|e| e.to_string())?;
    info!(
        "loaded {} (v{}, {} bytes)",
        args.story.display(),
        mem.version(),
        mem.len()
    );

    let dumped = args.header || args.object_tree || args.dict;
    if args.header {
        print!("{}", mem.header);
    }
    if args.object_tree {
        dump_objects(&mem)?;
    }
    if args.dict {
        dump_dictionary(&mem)?;
    }
    if dumped || args.no_exec {
        return Ok(());
    }

    let save_dir = args
        .story
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let save_name = format!(
        "{}.qzl",
        args.story
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "story".to_string())
    );

    let mut machine = Machine::new(
        mem,
        Box::new(TerminalScreen::new()),
        Box::new(FileStorage::new(save_dir)),
        Box::new(NullMedia),
    )
    .map_err(|e| e.to_string())?;
    machine.set_save_name(save_name);

    if let Some(name) = &args.interpreter {
        let number = interpreter_number(name).ok_or_else(|| {
            format!(
                "unknown interpreter '{name}' \
                 (amiga, dec, ibm-pc, c64, apple2e, mac, atari-st, next)"
            )
        })?;
        machine
            .set_interpreter_number(number)
            .map_err(|e| e.to_string())?;
    }

    drive(&mut machine)
}

/// The host loop: step until halted, feeding input back in when the
/// machine suspends.
fn drive(machine: &mut Machine) -> Result<(), String> {
    loop {
        match machine.step() {
            Ok(Step::Stepped) | Ok(Step::Restarted) => {}
            Ok(Step::Halted) => {
                println!();
                return Ok(());
            }
            Ok(Step::SuspendedLine) => {
                match terminal::read_line(machine).map_err(|e| e.to_string())? {
                    InputEvent::Line(line, terminator) => machine
                        .complete_line(&line, terminator)
                        .map_err(|e| e.to_string())?,
                    InputEvent::TimedOut => {}
                    InputEvent::Eof | InputEvent::Char(_) => {
                        machine.cancel_input().map_err(|e| e.to_string())?;
                        return Ok(());
                    }
                }
            }
            Ok(Step::SuspendedChar) => {
                match terminal::read_char(machine).map_err(|e| e.to_string())? {
                    InputEvent::Char(code) => {
                        machine.complete_char(code).map_err(|e| e.to_string())?
                    }
                    InputEvent::Line(line, _) => machine
                        .complete_char(line.chars().next().map(|c| c as u16).unwrap_or(13))
                        .map_err(|e| e.to_string())?,
                    InputEvent::TimedOut => {}
                    InputEvent::Eof => {
                        machine.cancel_input().map_err(|e| e.to_string())?;
                        return Ok(());
                    }
                }
            }
            Err(e) => return Err(format!("fatal error: {e}")),
        }
    }
}

fn dump_objects(mem: &Memory) -> Result<(), String> {
    let codec = TextCodec::new(mem).map_err(|e| e.to_string())?;
    let objects = ObjectTable::new(mem);
    let count = objects.count_estimate(mem);
    println!("{count} objects:");
    for obj in 1..=count {
        let name = objects
            .name(mem, &codec, obj)
            .unwrap_or_else(|_| "<bad name>".to_string());
        let parent = objects.parent(mem, obj).unwrap_or(0);
        let sibling = objects.sibling(mem, obj).unwrap_or(0);
        let child = objects.child(mem, obj).unwrap_or(0);
        let attrs: Vec<u16> = (0..=objects.max_attribute())
            .filter(|&a| objects.get_attr(mem, obj, a).unwrap_or(false))
            .collect();
        println!(
            "{obj:5}. \"{name}\"  parent={parent} sibling={sibling} child={child} attrs={attrs:?}"
        );
    }
    Ok(())
}

fn dump_dictionary(mem: &Memory) -> Result<(), String> {
    let codec = TextCodec::new(mem).map_err(|e| e.to_string())?;
    let dict = Dictionary::parse(mem, mem.header.dictionary).map_err(|e| e.to_string())?;
    let separators: String = dict.separators.iter().map(|&b| b as char).collect();
    println!(
        "dictionary: {} entries of {} bytes, separators \"{}\"",
        dict.entry_count, dict.entry_len, separators
    );
    for i in 0..dict.entry_count.unsigned_abs() as u32 {
        let addr = dict.entries_addr + i * dict.entry_len;
        let (word, _) = codec
            .decode(mem.raw(), addr as usize)
            .unwrap_or_else(|_| ("<bad entry>".to_string(), 0));
        println!("  {addr:#06x}  {word}");
    }
    Ok(())
}
