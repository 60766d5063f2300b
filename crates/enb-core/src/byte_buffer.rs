use std::fmt;

/// Default number of bytes reserved in front of a PDU, enough for the
/// PCAP-over-UDP start string plus the largest packed context
pub const DEFAULT_HEADROOM: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum BufferError {
    InsufficientHeadroom { needed: usize, available: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::InsufficientHeadroom { needed, available } => {
                write!(f, "insufficient headroom: need {} bytes, {} available", needed, available)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Owned byte buffer with reserved space in front of the payload.
/// Lower layers prepend headers into the headroom without reallocating.
pub struct ByteBuffer {
    buffer: Vec<u8>,
    start: usize, // bytes before this are free headroom
}

impl ByteBuffer {
    /// Empty buffer with `headroom` bytes reserved for headers
    pub fn new(headroom: usize) -> Self {
        ByteBuffer { buffer: vec![0; headroom], start: headroom }
    }

    /// Buffer holding `payload`, with `headroom` bytes in front of it
    pub fn from_payload(headroom: usize, payload: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(headroom + payload.len());
        buffer.resize(headroom, 0);
        buffer.extend_from_slice(payload);
        ByteBuffer { buffer, start: headroom }
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len() - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload view, including anything prepended so far
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.start..]
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Copies `bytes` into the headroom directly in front of the current payload
    pub fn prepend(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() > self.start {
            return Err(BufferError::InsufficientHeadroom { needed: bytes.len(), available: self.start });
        }
        let new_start = self.start - bytes.len();
        self.buffer[new_start..self.start].copy_from_slice(bytes);
        self.start = new_start;
        tracing::trace!("prepend {} bytes, headroom left {}", bytes.len(), self.start);
        Ok(())
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuffer {{ headroom: {}, len: {}, data: ", self.start, self.len())?;
        for b in self.data().iter().take(32) {
            write!(f, "{:02x}", b)?;
        }
        if self.len() > 32 {
            write!(f, "..")?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_into_headroom() {
        let mut buf = ByteBuffer::from_payload(8, &[0xaa, 0xbb]);
        assert_eq!(buf.len(), 2);
        buf.prepend(&[1, 2, 3]).unwrap();
        assert_eq!(buf.headroom(), 5);
        assert_eq!(buf.data(), &[1, 2, 3, 0xaa, 0xbb]);
        buf.append(&[0xcc]);
        assert_eq!(buf.data(), &[1, 2, 3, 0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_prepend_without_headroom_fails() {
        let mut buf = ByteBuffer::from_payload(2, &[0xaa]);
        let err = buf.prepend(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, BufferError::InsufficientHeadroom { needed: 3, available: 2 });
        // Failed prepend leaves the payload untouched
        assert_eq!(buf.data(), &[0xaa]);
    }
}
