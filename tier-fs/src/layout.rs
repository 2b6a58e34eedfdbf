use core::fmt;

use alloc::string::String;
use alloc::sync::Arc;

use log::warn;

use crate::bitmap::FreeMap;
use crate::error::{FsError, Result};
use crate::{
    BlockDevice, DIRECT_BOUND, FILE_NAME_LIMIT, INDIRECT1_BOUND, INDIRECT1_SLOT, INDIRECT2_SLOT,
    MAX_FILE_SIZE, NO_SECTOR, NUM_SLOTS, PTRS_PER_INDEX, SECTOR_SIZE,
};

pub(crate) fn sectors_for(num_bytes: usize) -> usize {
    (num_bytes + SECTOR_SIZE - 1) / SECTOR_SIZE
}

/// The on-disk shape of a file header. The sector count is recomputed from
/// the byte length on fetch, and the header's own sector is known from
/// where it was fetched, so neither is persisted.
#[repr(C)]
struct RawHeader {
    num_bytes: i32,
    data_sectors: [i32; NUM_SLOTS],
}

const_assert_eq!(core::mem::size_of::<RawHeader>(), SECTOR_SIZE);

/// Per-file index record, one per file, filling exactly one sector.
///
/// `data_sectors` slots `0..NUM_DIRECT` point straight at data. Files
/// larger than `DIRECT_BOUND` sectors store a single-indirect index block
/// in `INDIRECT1_SLOT`; files larger than `INDIRECT1_BOUND` sectors
/// additionally store an outer index block in `INDIRECT2_SLOT` whose
/// entries point at inner index blocks of data pointers. Unused slots hold
/// `NO_SECTOR`.
pub struct FileHeader {
    pub num_bytes: usize,
    pub num_sectors: usize,
    /// Sector holding this header; `NO_SECTOR` until placed on disk.
    pub sector: i32,
    pub data_sectors: [i32; NUM_SLOTS],
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            sector: NO_SECTOR,
            data_sectors: [NO_SECTOR; NUM_SLOTS],
        }
    }

    /// Sectors a file of `num_sectors` data sectors costs the free map,
    /// index blocks included. The extra `+1` is the header sector itself,
    /// which the caller reserves before `allocate` runs.
    pub fn sectors_needed(num_sectors: usize) -> usize {
        if num_sectors <= DIRECT_BOUND {
            num_sectors + 1
        } else if num_sectors <= INDIRECT1_BOUND {
            num_sectors + 2
        } else {
            let inner = (num_sectors - INDIRECT1_BOUND + PTRS_PER_INDEX - 1) / PTRS_PER_INDEX;
            num_sectors + 3 + inner
        }
    }

    /// Initialise an uninitialised header to describe a fresh region of
    /// `ceil(file_size / SECTOR_SIZE)` data sectors, claiming data and
    /// index sectors from `free_map`. Fails without touching the map when
    /// the free count cannot cover the request. Index blocks are written
    /// out here; the header itself is written back by the caller.
    pub fn allocate(
        &mut self,
        free_map: &mut FreeMap,
        device: &Arc<dyn BlockDevice>,
        file_size: usize,
    ) -> Result<()> {
        if file_size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        let num_sectors = sectors_for(file_size);
        if free_map.num_free() < Self::sectors_needed(num_sectors) {
            return Err(FsError::NoSpace);
        }
        self.num_bytes = file_size;
        self.num_sectors = num_sectors;

        for i in 0..num_sectors.min(DIRECT_BOUND) {
            self.data_sectors[i] = claim(free_map)?;
        }

        if num_sectors > DIRECT_BOUND {
            let mut index = IndexBlock::new();
            let index_sector = claim(free_map)?;
            self.data_sectors[INDIRECT1_SLOT] = index_sector;
            let in_single = (num_sectors - DIRECT_BOUND).min(PTRS_PER_INDEX);
            for i in 0..in_single {
                index.ptrs[i] = claim(free_map)?;
            }
            index.write_back(device, index_sector as usize);
        }

        if num_sectors > INDIRECT1_BOUND {
            let mut outer = IndexBlock::new();
            let outer_sector = claim(free_map)?;
            self.data_sectors[INDIRECT2_SLOT] = outer_sector;
            let mut remaining = num_sectors - INDIRECT1_BOUND;
            let mut group = 0;
            while remaining > 0 {
                let mut inner = IndexBlock::new();
                let inner_sector = claim(free_map)?;
                outer.ptrs[group] = inner_sector;
                let chunk = remaining.min(PTRS_PER_INDEX);
                for i in 0..chunk {
                    inner.ptrs[i] = claim(free_map)?;
                }
                inner.write_back(device, inner_sector as usize);
                remaining -= chunk;
                group += 1;
            }
            outer.write_back(device, outer_sector as usize);
        }

        Ok(())
    }

    /// Return every data sector and index-block sector of this file to the
    /// free map, walking the tiers in allocation order. The header's own
    /// sector stays claimed; releasing it is the caller's job.
    pub fn deallocate(&self, free_map: &mut FreeMap, device: &Arc<dyn BlockDevice>) {
        for i in 0..self.num_sectors.min(DIRECT_BOUND) {
            release(free_map, self.data_sectors[i]);
        }

        if self.num_sectors > DIRECT_BOUND {
            let index_sector = self.data_sectors[INDIRECT1_SLOT];
            if index_sector == NO_SECTOR {
                warn!("file at sector {} is missing its index block", self.sector);
                return;
            }
            let index = IndexBlock::fetch_from(device, index_sector as usize);
            let in_single = (self.num_sectors - DIRECT_BOUND).min(PTRS_PER_INDEX);
            for i in 0..in_single {
                release(free_map, index.ptrs[i]);
            }
            free_map.release(index_sector as usize);
        }

        if self.num_sectors > INDIRECT1_BOUND {
            let outer_sector = self.data_sectors[INDIRECT2_SLOT];
            if outer_sector == NO_SECTOR {
                warn!("file at sector {} is missing its outer index block", self.sector);
                return;
            }
            let outer = IndexBlock::fetch_from(device, outer_sector as usize);
            let mut remaining = self.num_sectors - INDIRECT1_BOUND;
            let mut group = 0;
            while remaining > 0 {
                let inner_sector = outer.ptrs[group];
                let chunk = remaining.min(PTRS_PER_INDEX);
                if inner_sector == NO_SECTOR {
                    warn!("outer index block at {} has an unassigned group", outer_sector);
                } else {
                    let inner = IndexBlock::fetch_from(device, inner_sector as usize);
                    for i in 0..chunk {
                        release(free_map, inner.ptrs[i]);
                    }
                    free_map.release(inner_sector as usize);
                }
                remaining -= chunk;
                group += 1;
            }
            free_map.release(outer_sector as usize);
        }
    }

    /// Direct-tier-only variant used when tearing down directories, whose
    /// tables never grow past the direct pointers.
    pub fn deallocate_direct(&self, free_map: &mut FreeMap) {
        debug_assert!(self.num_sectors <= DIRECT_BOUND);
        for i in 0..self.num_sectors.min(DIRECT_BOUND) {
            release(free_map, self.data_sectors[i]);
        }
    }

    /// Translate a byte offset within the file to the device sector that
    /// stores it. Costs at most two extra sector reads.
    pub fn byte_to_sector(&self, device: &Arc<dyn BlockDevice>, offset: usize) -> usize {
        let s = offset / SECTOR_SIZE;
        assert!(
            s < self.num_sectors,
            "offset {} beyond the last sector of the file",
            offset
        );
        if s < DIRECT_BOUND {
            self.data_sectors[s] as usize
        } else if s < INDIRECT1_BOUND {
            let index =
                IndexBlock::fetch_from(device, self.data_sectors[INDIRECT1_SLOT] as usize);
            index.ptrs[s - DIRECT_BOUND] as usize
        } else {
            let rest = s - INDIRECT1_BOUND;
            let outer =
                IndexBlock::fetch_from(device, self.data_sectors[INDIRECT2_SLOT] as usize);
            let inner =
                IndexBlock::fetch_from(device, outer.ptrs[rest / PTRS_PER_INDEX] as usize);
            inner.ptrs[rest % PTRS_PER_INDEX] as usize
        }
    }

    pub fn fetch_from(device: &Arc<dyn BlockDevice>, sector: usize) -> Self {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_block(sector, &mut buf);
        let raw = unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const RawHeader) };
        let num_bytes = raw.num_bytes as usize;
        Self {
            num_bytes,
            num_sectors: sectors_for(num_bytes),
            sector: sector as i32,
            data_sectors: raw.data_sectors,
        }
    }

    pub fn write_back(&mut self, device: &Arc<dyn BlockDevice>, sector: usize) {
        self.sector = sector as i32;
        let raw = RawHeader {
            num_bytes: self.num_bytes as i32,
            data_sectors: self.data_sectors,
        };
        let mut buf = [0u8; SECTOR_SIZE];
        unsafe {
            core::ptr::write_unaligned(buf.as_mut_ptr() as *mut RawHeader, raw);
        }
        device.write_block(sector, &buf);
    }

    /// Render the header and the contents of every data sector it owns,
    /// printable bytes as themselves and everything else escaped.
    pub fn print(&self, device: &Arc<dyn BlockDevice>) -> String {
        use core::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "header at sector {}: {} bytes in {} sectors",
            self.sector, self.num_bytes, self.num_sectors
        );
        let _ = write!(out, "  sectors:");
        for s in 0..self.num_sectors {
            let _ = write!(out, " {}", self.byte_to_sector(device, s * SECTOR_SIZE));
        }
        let _ = writeln!(out);

        let mut buf = [0u8; SECTOR_SIZE];
        let mut printed = 0;
        let _ = write!(out, "  contents: ");
        for s in 0..self.num_sectors {
            device.read_block(self.byte_to_sector(device, s * SECTOR_SIZE), &mut buf);
            for &byte in buf.iter().take(self.num_bytes - printed) {
                if (0x20..0x7f).contains(&byte) {
                    out.push(byte as char);
                } else {
                    let _ = write!(out, "\\{:02x}", byte);
                }
            }
            printed += (self.num_bytes - printed).min(SECTOR_SIZE);
        }
        let _ = writeln!(out);
        out
    }
}

impl fmt::Debug for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHeader")
            .field("num_bytes", &self.num_bytes)
            .field("num_sectors", &self.num_sectors)
            .field("sector", &self.sector)
            .finish()
    }
}

fn claim(free_map: &mut FreeMap) -> Result<i32> {
    free_map.find().map(|s| s as i32).ok_or(FsError::NoSpace)
}

fn release(free_map: &mut FreeMap, sector: i32) {
    if sector == NO_SECTOR {
        warn!("skipping an unassigned sector pointer");
        return;
    }
    free_map.release(sector as usize);
}

/// A sector holding nothing but pointers; the leaf of the single-indirect
/// tier, and both levels of the double-indirect tier.
#[repr(C)]
#[derive(Clone)]
pub struct IndexBlock {
    pub ptrs: [i32; PTRS_PER_INDEX],
}

const_assert_eq!(core::mem::size_of::<IndexBlock>(), SECTOR_SIZE);

impl IndexBlock {
    pub fn new() -> Self {
        Self {
            ptrs: [NO_SECTOR; PTRS_PER_INDEX],
        }
    }

    pub fn fetch_from(device: &Arc<dyn BlockDevice>, sector: usize) -> Self {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_block(sector, &mut buf);
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const IndexBlock) }
    }

    pub fn write_back(&self, device: &Arc<dyn BlockDevice>, sector: usize) {
        let mut buf = [0u8; SECTOR_SIZE];
        unsafe {
            core::ptr::write_unaligned(buf.as_mut_ptr() as *mut IndexBlock, self.clone());
        }
        device.write_block(sector, &buf);
    }
}

impl Default for IndexBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory = 0,
    File = 1,
}

impl FileKind {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => FileKind::Directory,
            1 => FileKind::File,
            other => panic!("corrupt directory entry kind {}", other),
        }
    }
}

/// One row of a directory table: 16 bytes on disk.
#[repr(C)]
#[derive(Clone)]
pub struct DirEntry {
    in_use: u8,
    kind: u8,
    name: [u8; FILE_NAME_LIMIT + 1],
    sector: i32,
}

const_assert_eq!(core::mem::size_of::<DirEntry>(), crate::DIR_ENTRY_SIZE);

impl Default for DirEntry {
    fn default() -> Self {
        Self {
            in_use: 0,
            kind: FileKind::File as u8,
            name: [0; FILE_NAME_LIMIT + 1],
            sector: NO_SECTOR,
        }
    }
}

impl DirEntry {
    pub fn new(name: &str, sector: i32, kind: FileKind) -> Result<Self> {
        let mut entry = Self {
            in_use: 1,
            kind: kind as u8,
            name: [0; FILE_NAME_LIMIT + 1],
            sector,
        };
        entry.set_name(name)?;
        Ok(entry)
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILE_NAME_LIMIT);
        core::str::from_utf8(&self.name[..len]).unwrap_or("<non-utf8>")
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > FILE_NAME_LIMIT {
            return Err(FsError::NameTooLong);
        }
        self.name = [0; FILE_NAME_LIMIT + 1];
        self.name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn sector(&self) -> i32 {
        self.sector
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_raw(self.kind)
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                self as *const Self as *const u8,
                core::mem::size_of::<Self>(),
            )
        }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(
                self as *mut Self as *mut u8,
                core::mem::size_of::<Self>(),
            )
        }
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DirEntry {{ name: {:?}, sector: {}, kind: {:?} }}",
            self.name(),
            self.sector,
            self.kind()
        )
    }
}
