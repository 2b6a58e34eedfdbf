use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;

use crate::bitmap::{self, FreeMap};
use crate::directory::Directory;
use crate::error::{FsError, Result};
use crate::file::OpenFile;
use crate::layout::{FileHeader, FileKind};
use crate::{
    BlockDevice, DIRECTORY_FILE_SIZE, DIRECT_BOUND, FREE_MAP_SECTOR, NO_SECTOR, ROOT_DIR_SECTOR,
    SECTOR_SIZE,
};

/// The file system proper. Owns the device and the three files that stay
/// open for its whole lifetime: the free map, the root directory, and the
/// current working directory every name resolves against.
///
/// Operations follow one discipline: fetch the metadata they need into
/// memory, mutate it, and persist only on success, in the order header(s),
/// directory, free map. A failed operation writes nothing back, so the
/// on-disk image never sees its partial effects. There is no journalling;
/// a crash between two writes of the same operation can corrupt the image.
pub struct FileSystem {
    device: Arc<dyn BlockDevice>,
    num_sectors: usize,
    free_map_file: OpenFile,
    root_dir_file: OpenFile,
    current_dir_file: OpenFile,
}

impl FileSystem {
    /// Initialise an empty device: a free map covering `num_sectors`
    /// sectors persisted as the file at sector 0, and an empty root
    /// directory at sector 1. A device too small to hold its own
    /// bookkeeping is unusable, so that is fatal here.
    pub fn format(device: Arc<dyn BlockDevice>, num_sectors: usize) -> Self {
        debug!("formatting device with {} sectors", num_sectors);
        let mut free_map = bitmap::formatted(num_sectors);

        let mut map_header = FileHeader::new();
        map_header
            .allocate(&mut free_map, &device, FreeMap::size_bytes(num_sectors))
            .expect("device too small for its own free map");
        let mut root_header = FileHeader::new();
        root_header
            .allocate(&mut free_map, &device, DIRECTORY_FILE_SIZE)
            .expect("device too small for the root directory");

        map_header.write_back(&device, FREE_MAP_SECTOR);
        root_header.write_back(&device, ROOT_DIR_SECTOR);

        let free_map_file = OpenFile::open(device.clone(), FREE_MAP_SECTOR);
        let root_dir_file = OpenFile::open(device.clone(), ROOT_DIR_SECTOR);
        let current_dir_file = OpenFile::open(device.clone(), ROOT_DIR_SECTOR);

        let root = Directory::empty(ROOT_DIR_SECTOR as i32);
        root.write_back(&root_dir_file);
        free_map.write_back(&free_map_file);

        Self {
            device,
            num_sectors,
            free_map_file,
            root_dir_file,
            current_dir_file,
        }
    }

    /// Open an already formatted device. The working directory is
    /// recovered by following the child breadcrumbs down from the root,
    /// so a remount lands wherever the last descent left off.
    pub fn mount(device: Arc<dyn BlockDevice>, num_sectors: usize) -> Self {
        let free_map_file = OpenFile::open(device.clone(), FREE_MAP_SECTOR);
        assert_eq!(
            free_map_file.length(),
            FreeMap::size_bytes(num_sectors),
            "free map file does not match the device size"
        );
        let root_dir_file = OpenFile::open(device.clone(), ROOT_DIR_SECTOR);

        let mut current = ROOT_DIR_SECTOR;
        for _ in 0..num_sectors {
            let dir = Directory::fetch_from(&OpenFile::open(device.clone(), current));
            if dir.child == NO_SECTOR {
                break;
            }
            current = dir.child as usize;
        }
        debug!("mounted, working directory at sector {}", current);
        let current_dir_file = OpenFile::open(device.clone(), current);

        Self {
            device,
            num_sectors,
            free_map_file,
            root_dir_file,
            current_dir_file,
        }
    }

    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    fn free_map(&self) -> FreeMap {
        let mut free_map = FreeMap::new(self.num_sectors);
        free_map.fetch_from(&self.free_map_file);
        free_map
    }

    fn current_directory(&self) -> Directory {
        Directory::fetch_from(&self.current_dir_file)
    }

    /// Snapshot of the root directory, wherever the working directory
    /// currently is.
    pub fn root_directory(&self) -> Directory {
        Directory::fetch_from(&self.root_dir_file)
    }

    /// Free sectors left on the device.
    pub fn free_sectors(&self) -> usize {
        self.free_map().num_free()
    }

    /// Create `name` in the working directory with a fixed size of `size`
    /// bytes. Nothing is written back until every step has succeeded, so a
    /// failure leaves the image as it was. New directories start out empty
    /// with their parent link set to the creating directory.
    pub fn create(&mut self, name: &str, size: usize, kind: FileKind) -> Result<()> {
        debug!("creating {:?} {:?}, {} bytes", kind, name, size);
        let mut directory = self.current_directory();
        if directory.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if kind == FileKind::Directory && size > DIRECT_BOUND * SECTOR_SIZE {
            // directory teardown walks only the direct tier
            return Err(FsError::DirectoryTooLarge);
        }

        let mut free_map = self.free_map();
        let header_sector = free_map.find().ok_or(FsError::NoSpace)?;
        directory.add(name, header_sector as i32, kind)?;

        let mut header = FileHeader::new();
        header.allocate(&mut free_map, &self.device, size)?;

        header.write_back(&self.device, header_sector);
        directory.write_back(&self.current_dir_file);
        free_map.write_back(&self.free_map_file);

        if kind == FileKind::Directory {
            let dir_file = OpenFile::open(self.device.clone(), header_sector);
            let mut new_dir = Directory::empty(header_sector as i32);
            new_dir.parent = directory.sector;
            new_dir.write_back(&dir_file);
        }
        Ok(())
    }

    /// Create an empty sub-directory in the working directory.
    pub fn create_dir(&mut self, name: &str) -> Result<()> {
        self.create(name, DIRECTORY_FILE_SIZE, FileKind::Directory)
    }

    /// Open `name` in the working directory.
    pub fn open(&self, name: &str) -> Result<OpenFile> {
        let directory = self.current_directory();
        let sector = directory.find(name).ok_or(FsError::NotFound)?;
        Ok(OpenFile::open(self.device.clone(), sector as usize))
    }

    /// Remove `name` from the working directory, returning its header and
    /// every data and index sector to the free map. The entry must be of
    /// the expected kind; removing a directory this way does not recurse,
    /// use [`FileSystem::remove_dir`] for that.
    pub fn remove(&mut self, name: &str, kind: FileKind) -> Result<()> {
        debug!("removing {:?} {:?}", kind, name);
        let directory = self.current_directory();
        if directory.find(name).is_none() {
            return Err(FsError::NotFound);
        }
        if directory.kind_of(name) != Some(kind) {
            return Err(FsError::WrongKind);
        }
        self.remove_entry_in(&self.current_dir_file, name)
    }

    /// Remove the sub-directory `name` of the working directory and
    /// everything below it. Children go before parents, so an interrupted
    /// removal never leaves entries dangling from a vanished directory.
    pub fn remove_dir(&mut self, name: &str) -> Result<()> {
        debug!("recursively removing directory {:?}", name);
        self.remove_subtree(&self.current_dir_file, name)
    }

    /// Untyped single-entry removal against an explicit directory file;
    /// the flat helper under the recursive teardown.
    fn remove_entry_in(&self, dir_file: &OpenFile, name: &str) -> Result<()> {
        let mut directory = Directory::fetch_from(dir_file);
        let sector = directory.find(name).ok_or(FsError::NotFound)?;

        let header = FileHeader::fetch_from(&self.device, sector as usize);
        let mut free_map = self.free_map();
        header.deallocate(&mut free_map, &self.device);
        free_map.release(sector as usize);
        directory.remove(name)?;

        free_map.write_back(&self.free_map_file);
        directory.write_back(dir_file);
        Ok(())
    }

    fn remove_subtree(&self, parent_file: &OpenFile, name: &str) -> Result<()> {
        let mut parent = Directory::fetch_from(parent_file);
        let child_sector = parent.find(name).ok_or(FsError::NotFound)?;
        if parent.kind_of(name) != Some(FileKind::Directory) {
            return Err(FsError::WrongKind);
        }

        let child_file = OpenFile::open(self.device.clone(), child_sector as usize);
        let child = Directory::fetch_from(&child_file);
        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for entry in &child.entries {
            match entry.kind() {
                FileKind::File => files.push(String::from(entry.name())),
                FileKind::Directory => subdirs.push(String::from(entry.name())),
            }
        }
        for file in &files {
            self.remove_entry_in(&child_file, file)?;
        }
        for subdir in &subdirs {
            self.remove_subtree(&child_file, subdir)?;
        }

        // the child is empty now; release its table and header, then drop
        // its name from the parent
        let header = FileHeader::fetch_from(&self.device, child_sector as usize);
        let mut free_map = self.free_map();
        header.deallocate_direct(&mut free_map);
        free_map.release(child_sector as usize);
        parent.remove(name)?;

        free_map.write_back(&self.free_map_file);
        parent.write_back(parent_file);
        Ok(())
    }

    /// Descend into the sub-directory `name`, or ascend with `".."`. Both
    /// ends of the move are persisted: the breadcrumbs survive a remount.
    pub fn change_dir(&mut self, name: &str) -> Result<()> {
        if name == ".." {
            return self.change_to_parent();
        }
        let mut current = self.current_directory();
        let target = match current.find_dir(name) {
            Some(sector) => sector,
            None if current.find(name).is_some() => return Err(FsError::WrongKind),
            None => return Err(FsError::NotFound),
        };

        current.child = target;
        current.write_back(&self.current_dir_file);

        let child_file = OpenFile::open(self.device.clone(), target as usize);
        let mut child = Directory::fetch_from(&child_file);
        child.parent = current.sector;
        child.child = NO_SECTOR;
        child.write_back(&child_file);

        debug!("descended into {:?} at sector {}", name, target);
        self.current_dir_file = child_file;
        Ok(())
    }

    fn change_to_parent(&mut self) -> Result<()> {
        let mut current = self.current_directory();
        if current.parent == NO_SECTOR {
            return Err(FsError::RootHasNoParent);
        }

        let parent_file = OpenFile::open(self.device.clone(), current.parent as usize);
        let mut parent = Directory::fetch_from(&parent_file);
        parent.child = NO_SECTOR;
        // reconcile the grandparent link while we are passing through
        if parent.parent != NO_SECTOR {
            let grandparent =
                Directory::fetch_from(&OpenFile::open(self.device.clone(), parent.parent as usize));
            parent.parent = grandparent.sector;
        }

        current.child = NO_SECTOR;
        current.write_back(&self.current_dir_file);
        parent.write_back(&parent_file);

        debug!("ascended to sector {}", parent.sector);
        self.current_dir_file = parent_file;
        Ok(())
    }

    /// Give the file `old` the name `new`; the header sector and contents
    /// are untouched.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let mut directory = self.current_directory();
        if directory.entry(new).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let entry = directory.entry_mut(old).ok_or(FsError::NotFound)?;
        if entry.kind() != FileKind::File {
            return Err(FsError::WrongKind);
        }
        entry.set_name(new)?;
        directory.write_back(&self.current_dir_file);
        Ok(())
    }

    /// Names in the working directory.
    pub fn list(&self) -> Vec<String> {
        self.current_directory().names()
    }

    /// Render the state visible from the working directory: free-map
    /// summary, the table, and each entry's header and contents.
    pub fn report(&self) -> String {
        use core::fmt::Write as _;

        let mut out = String::new();
        let free_map = self.free_map();
        let directory = self.current_directory();
        let _ = writeln!(
            out,
            "{} of {} sectors free",
            free_map.num_free(),
            self.num_sectors
        );
        out.push_str(&directory.print());
        for entry in &directory.entries {
            let header = FileHeader::fetch_from(&self.device, entry.sector() as usize);
            out.push_str(&header.print(&self.device));
        }
        out
    }
}
