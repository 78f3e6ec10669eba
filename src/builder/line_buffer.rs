/// Splits a byte stream into complete lines.
///
/// Bytes after the last newline are held back until a later chunk
/// completes them. There is no end-of-stream flush: a final line without a
/// newline is never emitted.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk`; return every line it completed, each ending in `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(newline + 1);
            let mut line = std::mem::take(&mut self.pending);
            line.extend_from_slice(head);
            lines.push(line);
            rest = tail;
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
