use core::fmt;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{FsError, Result};
use crate::file::OpenFile;
use crate::layout::{DirEntry, FileKind};
use crate::{DIR_ENTRY_SIZE, NO_SECTOR, NUM_DIR_ENTRIES};

/// On-disk preamble of a directory file, ahead of the entry table.
#[repr(C)]
struct TablePreamble {
    table_size: i32,
    sector: i32,
    parent: i32,
    child: i32,
}

const PREAMBLE_SIZE: usize = core::mem::size_of::<TablePreamble>();

const_assert_eq!(PREAMBLE_SIZE, 16);

/// A directory: a table of `<name, header sector, kind>` rows stored as
/// the contents of a regular file, plus the links that stitch the
/// hierarchy together. `parent` names the directory holding this one
/// (`NO_SECTOR` at the root); `child` is a breadcrumb pointing at the
/// currently descended sub-directory, `NO_SECTOR` when nothing below is
/// active.
///
/// Like the free map, a directory is fetched into memory, mutated, and
/// written back only by operations that succeed.
pub struct Directory {
    pub entries: Vec<DirEntry>,
    pub sector: i32,
    pub parent: i32,
    pub child: i32,
}

impl Directory {
    pub fn empty(sector: i32) -> Self {
        Self {
            entries: Vec::new(),
            sector,
            parent: NO_SECTOR,
            child: NO_SECTOR,
        }
    }

    pub fn fetch_from(file: &OpenFile) -> Self {
        let mut buf = [0u8; PREAMBLE_SIZE];
        let n = file.read_at(0, &mut buf);
        assert_eq!(n, PREAMBLE_SIZE, "directory file is truncated");
        let preamble = unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const TablePreamble) };
        assert!(
            preamble.table_size >= 0 && preamble.table_size as usize <= NUM_DIR_ENTRIES,
            "corrupt directory table at sector {}",
            preamble.sector
        );

        let mut entries = Vec::with_capacity(preamble.table_size as usize);
        for i in 0..preamble.table_size as usize {
            let mut entry = DirEntry::default();
            let n = file.read_at(PREAMBLE_SIZE + i * DIR_ENTRY_SIZE, entry.as_bytes_mut());
            assert_eq!(n, DIR_ENTRY_SIZE, "directory file is truncated");
            if entry.is_in_use() {
                entries.push(entry);
            }
        }

        Self {
            entries,
            sector: preamble.sector,
            parent: preamble.parent,
            child: preamble.child,
        }
    }

    pub fn write_back(&self, file: &OpenFile) {
        let preamble = TablePreamble {
            table_size: self.entries.len() as i32,
            sector: self.sector,
            parent: self.parent,
            child: self.child,
        };
        let mut buf = [0u8; PREAMBLE_SIZE];
        unsafe {
            core::ptr::write_unaligned(buf.as_mut_ptr() as *mut TablePreamble, preamble);
        }
        let n = file.write_at(0, &buf);
        assert_eq!(n, PREAMBLE_SIZE, "directory file is truncated");
        for (i, entry) in self.entries.iter().enumerate() {
            let n = file.write_at(PREAMBLE_SIZE + i * DIR_ENTRY_SIZE, entry.as_bytes());
            assert_eq!(n, DIR_ENTRY_SIZE, "directory file is truncated");
        }
    }

    /// Header sector of `name`, whatever its kind.
    pub fn find(&self, name: &str) -> Option<i32> {
        self.entry(name).map(|e| e.sector())
    }

    /// Header sector of `name`, only if it is a sub-directory.
    pub fn find_dir(&self, name: &str) -> Option<i32> {
        self.entry(name)
            .filter(|e| e.kind() == FileKind::Directory)
            .map(|e| e.sector())
    }

    pub fn kind_of(&self, name: &str) -> Option<FileKind> {
        self.entry(name).map(|e| e.kind())
    }

    pub fn entry(&self, name: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn entry_mut(&mut self, name: &str) -> Option<&mut DirEntry> {
        self.entries.iter_mut().find(|e| e.name() == name)
    }

    /// Append a row. Duplicate names and full tables are rejected.
    pub fn add(&mut self, name: &str, sector: i32, kind: FileKind) -> Result<()> {
        if self.entry(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if self.entries.len() >= NUM_DIR_ENTRIES {
            return Err(FsError::DirectoryFull);
        }
        self.entries.push(DirEntry::new(name, sector, kind)?);
        Ok(())
    }

    /// Drop the row for `name` from the table.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let at = self
            .entries
            .iter()
            .position(|e| e.name() == name)
            .ok_or(FsError::NotFound)?;
        self.entries.remove(at);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the table row by row, for debugging.
    pub fn print(&self) -> String {
        use core::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "directory at sector {} (parent {}, child {}), {} entries:",
            self.sector,
            self.parent,
            self.child,
            self.entries.len()
        );
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "  {:<9} {:?} at sector {}",
                entry.name(),
                entry.kind(),
                entry.sector()
            );
        }
        out
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("sector", &self.sector)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("entries", &self.entries)
            .finish()
    }
}
