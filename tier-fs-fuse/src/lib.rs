//! Host-side plumbing for tier-fs images: a file-backed block device and
//! the helpers the tests and the CLI share.

mod block_file;

pub use block_file::BlockFile;

#[cfg(test)]
mod tests;

pub mod test_utils {
    use std::sync::{Arc, Mutex};

    use log::LevelFilter;
    use simple_logger::SimpleLogger;
    use tier_fs::{consts::SECTOR_SIZE, BlockDevice};

    use super::BlockFile;

    pub fn setup_logger(filter: LevelFilter) {
        // tests race to install it; whichever wins is fine
        let _ = SimpleLogger::new().with_level(filter).init();
    }

    /// A zero-filled scratch image of `sectors` sectors under the system
    /// temp directory. Each caller passes a distinct tag so tests do not
    /// trample each other.
    pub fn scratch_device(tag: &str, sectors: usize) -> Arc<dyn BlockDevice> {
        let path = std::env::temp_dir().join(format!("tier_fs_{tag}.img"));
        std::fs::remove_file(&path).ok();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        file.set_len((sectors * SECTOR_SIZE) as u64).unwrap();
        Arc::new(BlockFile(Mutex::new(file)))
    }
}
