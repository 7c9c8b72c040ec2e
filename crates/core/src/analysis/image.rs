use crate::model::ObjectHeader;

/// File bytes paired with the header that maps addresses onto them.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    pub bytes: &'a [u8],
    pub header: &'a ObjectHeader,
}

impl<'a> Image<'a> {
    pub fn new(bytes: &'a [u8], header: &'a ObjectHeader) -> Self {
        Self { bytes, header }
    }

    /// Bytes at the file offset backing `addr`, if mapped and in range.
    pub fn slice_at(&self, addr: u64, len: usize) -> Option<&'a [u8]> {
        let offset = usize::try_from(self.header.get_offset(addr)?).ok()?;
        self.bytes.get(offset..offset.checked_add(len)?)
    }

    /// Little-endian pointer at `addr`, four or eight bytes wide by instruction mode.
    pub fn read_pointer(&self, addr: u64) -> Option<u64> {
        let width = self.header.pointer_width();
        let raw = self.slice_at(addr, width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(raw);
        Some(u64::from_le_bytes(buf))
    }

    /// True when at least `len` zero bytes follow file offset `offset`.
    pub fn zero_run_at(&self, offset: u64, len: usize) -> bool {
        let Ok(start) = usize::try_from(offset) else {
            return false;
        };
        match start.checked_add(len).and_then(|end| self.bytes.get(start..end)) {
            Some(run) => run.iter().all(|b| *b == 0),
            None => false,
        }
    }
}
