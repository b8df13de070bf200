//! Whole-machine snapshots and their Quetzal wire form

use log::debug;

use crate::error::{RuntimeError, ZResult};
use crate::frames::Frame;
use crate::memory::Memory;
use crate::quetzal::chunks::{decode_stacks, encode_stacks, IfhdChunk};
use crate::quetzal::cmem;
use crate::quetzal::iff::IffForm;

/// The state triple a save captures: dynamic memory, call stack, PC.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pc: u32,
    pub frames: Vec<Frame>,
    pub dynamic: Vec<u8>,
}

impl Snapshot {
    pub fn capture(mem: &Memory, frames: &[Frame], pc: u32) -> Snapshot {
        Snapshot {
            pc,
            frames: frames.to_vec(),
            dynamic: mem.dynamic().to_vec(),
        }
    }
}

/// Serialise a snapshot as a Quetzal file, compressing dynamic memory
/// against the pristine image.
pub fn to_quetzal(snapshot: &Snapshot, mem: &Memory) -> Vec<u8> {
    let mut form = IffForm::new(*b"IFZS");
    form.add_chunk(
        *b"IFhd",
        IfhdChunk::new(&mem.header, snapshot.pc).to_bytes(),
    );
    form.add_chunk(
        *b"CMem",
        cmem::compress(&snapshot.dynamic, mem.pristine_dynamic()),
    );
    form.add_chunk(*b"Stks", encode_stacks(&snapshot.frames));
    form.to_bytes()
}

/// Parse a Quetzal file, verifying it belongs to the loaded story.
pub fn from_quetzal(bytes: &[u8], mem: &Memory) -> ZResult<Snapshot> {
    let form = IffForm::from_bytes(bytes).map_err(RuntimeError::RestoreFailure)?;
    if form.form_type != *b"IFZS" {
        return Err(RuntimeError::RestoreFailure(format!(
            "not a Quetzal file (form type {})",
            String::from_utf8_lossy(&form.form_type)
        )));
    }

    let ifhd_chunk = form
        .find(b"IFhd")
        .ok_or_else(|| RuntimeError::RestoreFailure("save lacks an IFhd chunk".into()))?;
    let ifhd = IfhdChunk::from_bytes(&ifhd_chunk.data)?;
    if !ifhd.matches(&mem.header) {
        return Err(RuntimeError::RestoreFailure(format!(
            "save is for release {} serial {}, not this story",
            ifhd.release,
            String::from_utf8_lossy(&ifhd.serial)
        )));
    }

    let dynamic = if let Some(chunk) = form.find(b"CMem") {
        cmem::decompress(&chunk.data, mem.pristine_dynamic())
            .map_err(RuntimeError::RestoreFailure)?
    } else if let Some(chunk) = form.find(b"UMem") {
        chunk.data.clone()
    } else {
        return Err(RuntimeError::RestoreFailure(
            "save lacks both CMem and UMem".into(),
        ));
    };

    let stks = form
        .find(b"Stks")
        .ok_or_else(|| RuntimeError::RestoreFailure("save lacks a Stks chunk".into()))?;
    let frames = decode_stacks(&stks.data)?;

    debug!(
        "restoring: pc {:#07x}, {} frames, {} dynamic bytes",
        ifhd.pc,
        frames.len(),
        dynamic.len()
    );
    Ok(Snapshot {
        pc: ifhd.pc,
        frames,
        dynamic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Disposition;
    use crate::header::offset;

    fn story() -> Memory {
        let mut bytes = vec![0u8; 0x800];
        bytes[0] = 3;
        bytes[2] = 0;
        bytes[3] = 88;
        bytes[offset::STATIC_BASE as usize] = 0x04;
        bytes[offset::HIGH_BASE as usize] = 0x04;
        bytes[0x12..0x18].copy_from_slice(b"880429");
        Memory::from_story(bytes).unwrap()
    }

    #[test]
    fn quetzal_round_trip() {
        let mut mem = story();
        mem.set_byte(0x200, 0x55).unwrap();
        mem.set_word(0x300, 0xbeef).unwrap();

        let frames = vec![
            Frame::entry(),
            Frame {
                return_pc: 0x432,
                locals: vec![3, 4],
                eval: vec![5],
                disposition: Disposition::Store(0),
                arg_count: 2,
            },
        ];
        let snapshot = Snapshot::capture(&mem, &frames, 0x510);
        let bytes = to_quetzal(&snapshot, &mem);

        let restored = from_quetzal(&bytes, &mem).unwrap();
        assert_eq!(restored.pc, 0x510);
        assert_eq!(restored.dynamic, mem.dynamic());
        assert_eq!(restored.frames.len(), 2);
        assert_eq!(restored.frames[1].locals, vec![3, 4]);
    }

    #[test]
    fn wrong_story_is_rejected() {
        let mem = story();
        let snapshot = Snapshot::capture(&mem, &[Frame::entry()], 0x500);
        let bytes = to_quetzal(&snapshot, &mem);

        let mut other_raw = mem.raw().to_vec();
        other_raw[3] = 89; // different release
        let other = Memory::from_story(other_raw).unwrap();
        assert!(matches!(
            from_quetzal(&bytes, &other),
            Err(RuntimeError::RestoreFailure(_))
        ));
    }

    #[test]
    fn umem_fallback_accepted() {
        let mem = story();
        let mut form = IffForm::new(*b"IFZS");
        form.add_chunk(
            *b"IFhd",
            IfhdChunk::new(&mem.header, 0x500).to_bytes(),
        );
        form.add_chunk(*b"UMem", mem.dynamic().to_vec());
        form.add_chunk(*b"Stks", encode_stacks(&[Frame::entry()]));
        let restored = from_quetzal(&form.to_bytes(), &mem).unwrap();
        assert_eq!(restored.dynamic, mem.dynamic());
    }

    #[test]
    fn garbage_is_rejected() {
        let mem = story();
        assert!(from_quetzal(b"not a save at all", &mem).is_err());
    }
}
