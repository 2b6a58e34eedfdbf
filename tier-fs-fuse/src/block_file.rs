use std::{
    io::{Read, Seek, SeekFrom, Write},
    sync::Mutex,
};

use tier_fs::{consts::SECTOR_SIZE, BlockDevice};

/// A host file posing as a sector device; sector `i` lives at byte offset
/// `i * SECTOR_SIZE`.
pub struct BlockFile(pub Mutex<std::fs::File>);

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        let offset = block_id * SECTOR_SIZE;
        file.seek(SeekFrom::Start(offset as u64)).unwrap();
        assert_eq!(file.read(buf).unwrap(), SECTOR_SIZE, "not a whole sector");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        let offset = block_id * SECTOR_SIZE;
        file.seek(SeekFrom::Start(offset as u64)).unwrap();
        assert_eq!(file.write(buf).unwrap(), SECTOR_SIZE, "not a whole sector");
        file.flush().unwrap();
    }
}
