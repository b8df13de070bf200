//! Minimal IFF container handling, in memory
//!
//! FORM header, typed chunks, big-endian lengths, odd chunks padded to even.

#[derive(Debug, Clone)]
pub struct IffChunk {
    pub id: [u8; 4],
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IffForm {
    pub form_type: [u8; 4],
    pub chunks: Vec<IffChunk>,
}

impl IffForm {
    pub fn new(form_type: [u8; 4]) -> IffForm {
        IffForm {
            form_type,
            chunks: Vec::new(),
        }
    }

    pub fn add_chunk(&mut self, id: [u8; 4], data: Vec<u8>) {
        self.chunks.push(IffChunk { id, data });
    }

    pub fn find(&self, id: &[u8; 4]) -> Option<&IffChunk> {
        self.chunks.iter().find(|c| &c.id == id)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let content_size = 4 + self
            .chunks
            .iter()
            .map(|c| 8 + c.data.len() + c.data.len() % 2)
            .sum::<usize>();

        let mut out = Vec::with_capacity(content_size + 8);
        out.extend_from_slice(b"FORM");
        out.extend_from_slice(&(content_size as u32).to_be_bytes());
        out.extend_from_slice(&self.form_type);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.id);
            out.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
            out.extend_from_slice(&chunk.data);
            if chunk.data.len() % 2 == 1 {
                out.push(0);
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<IffForm, String> {
        if bytes.len() < 12 || &bytes[0..4] != b"FORM" {
            return Err("not an IFF file (missing FORM header)".to_string());
        }
        let mut form_type = [0u8; 4];
        form_type.copy_from_slice(&bytes[8..12]);

        let mut form = IffForm::new(form_type);
        let mut at = 12;
        while at + 8 <= bytes.len() {
            let mut id = [0u8; 4];
            id.copy_from_slice(&bytes[at..at + 4]);
            let size = u32::from_be_bytes([
                bytes[at + 4],
                bytes[at + 5],
                bytes[at + 6],
                bytes[at + 7],
            ]) as usize;
            at += 8;
            if at + size > bytes.len() {
                return Err(format!(
                    "chunk {} runs past the end of the file",
                    String::from_utf8_lossy(&id)
                ));
            }
            form.chunks.push(IffChunk {
                id,
                data: bytes[at..at + size].to_vec(),
            });
            at += size + size % 2;
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_odd_padding() {
        let mut form = IffForm::new(*b"IFZS");
        form.add_chunk(*b"IFhd", vec![1, 2, 3, 4, 5]); // odd length
        form.add_chunk(*b"UMem", vec![9, 9]);

        let bytes = form.to_bytes();
        let parsed = IffForm::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.form_type, *b"IFZS");
        assert_eq!(parsed.chunks.len(), 2);
        assert_eq!(parsed.find(b"IFhd").unwrap().data, vec![1, 2, 3, 4, 5]);
        assert_eq!(parsed.find(b"UMem").unwrap().data, vec![9, 9]);
        assert!(parsed.find(b"Stks").is_none());
    }

    #[test]
    fn rejects_non_iff() {
        assert!(IffForm::from_bytes(b"GIF89a......").is_err());
        assert!(IffForm::from_bytes(b"FO").is_err());
    }
}
