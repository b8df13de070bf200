//! XOR-RLE compression for the CMem chunk
//!
//! Current dynamic memory is XORed with the original story image; runs of
//! zero (unchanged bytes) are run-length encoded as a 0 byte followed by
//! (length - 1). Anything the story never touched costs two bytes total.

use log::debug;

pub fn compress(current: &[u8], original: &[u8]) -> Vec<u8> {
    debug_assert_eq!(current.len(), original.len());
    let mut out = Vec::new();
    let mut i = 0;
    while i < current.len() {
        let xor = current[i] ^ original[i];
        if xor != 0 {
            out.push(xor);
            i += 1;
            continue;
        }
        let start = i;
        while i < current.len() && current[i] ^ original[i] == 0 {
            i += 1;
        }
        let mut run = i - start;
        while run > 256 {
            out.push(0);
            out.push(255);
            run -= 256;
        }
        out.push(0);
        out.push((run - 1) as u8);
    }
    debug!("CMem: {} bytes compressed to {}", current.len(), out.len());
    out
}

pub fn decompress(compressed: &[u8], original: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(original.len());
    let mut at = 0;
    while at < compressed.len() {
        let byte = compressed[at];
        at += 1;
        if byte == 0 {
            if at >= compressed.len() {
                return Err("truncated CMem run".to_string());
            }
            let run = compressed[at] as usize + 1;
            at += 1;
            for _ in 0..run {
                if out.len() >= original.len() {
                    return Err("CMem run extends past dynamic memory".to_string());
                }
                out.push(original[out.len()]);
            }
        } else {
            if out.len() >= original.len() {
                return Err("CMem data extends past dynamic memory".to_string());
            }
            out.push(original[out.len()] ^ byte);
        }
    }
    // A short chunk means the tail is unchanged.
    while out.len() < original.len() {
        out.push(original[out.len()]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let original = vec![0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
        let mut current = original.clone();
        current[1] = 0x21;
        current[6] = 0x71;

        let packed = compress(&current, &original);
        assert_eq!(decompress(&packed, &original).unwrap(), current);
    }

    #[test]
    fn long_unchanged_run_compresses_well() {
        let original = vec![0xff; 2000];
        let mut current = original.clone();
        current[1500] = 0xfe;

        let packed = compress(&current, &original);
        assert!(packed.len() < 20);
        assert_eq!(decompress(&packed, &original).unwrap(), current);
    }

    #[test]
    fn short_chunk_leaves_tail_unchanged() {
        let original = vec![1, 2, 3, 4, 5];
        // One changed byte, rest omitted.
        let packed = vec![1 ^ 9];
        let restored = decompress(&packed, &original).unwrap();
        assert_eq!(restored, vec![9, 2, 3, 4, 5]);
    }

    #[test]
    fn truncated_run_is_an_error() {
        let original = vec![0; 4];
        assert!(decompress(&[0], &original).is_err());
    }
}
