use spin::Mutex;
use tier_fs::consts::{NO_SECTOR, ROOT_DIR_SECTOR, SECTOR_SIZE};
use tier_fs::{Directory, FileKind, FileSystem, FsError, OpenFile};

use crate::test_utils::*;

#[test]
fn format_accounting() {
    setup_logger(log::LevelFilter::Debug);
    // 128 sectors: two well-known header sectors, one data sector for the
    // free map (16 bytes) and one for the root table
    let device = scratch_device("format", 128);
    let fs = FileSystem::format(device, 128);
    assert_eq!(fs.free_sectors(), 124);
    assert!(fs.list().is_empty());
}

#[test]
fn create_then_open_round_trip() {
    let device = scratch_device("create_open", 128);
    let mut fs = FileSystem::format(device, 128);

    fs.create("notes", 300, FileKind::File).unwrap();
    let file = fs.open("notes").unwrap();
    assert_eq!(file.length(), 300);

    let payload = b"sector payload";
    assert_eq!(file.write_at(200, payload), payload.len());
    let mut back = [0u8; 14];
    assert_eq!(file.read_at(200, &mut back), back.len());
    assert_eq!(&back, payload);

    // reads and writes stop at the fixed end of the file
    let mut long = [0u8; 64];
    assert_eq!(file.read_at(290, &mut long), 10);
    assert_eq!(file.write_at(290, &long), 10);
    assert_eq!(file.read_at(300, &mut long), 0);
}

#[test]
fn sequential_io_tracks_the_seek_position() {
    let device = scratch_device("seek", 128);
    let mut fs = FileSystem::format(device, 128);
    fs.create("log", 2 * SECTOR_SIZE, FileKind::File).unwrap();

    let mut file = fs.open("log").unwrap();
    assert_eq!(file.write(b"one"), 3);
    assert_eq!(file.write(b"two"), 3);
    assert_eq!(file.tell(), 6);

    file.seek(0);
    let mut buf = [0u8; 6];
    assert_eq!(file.read(&mut buf), 6);
    assert_eq!(&buf, b"onetwo");
}

#[test]
fn duplicate_names_are_rejected_without_leaking() {
    let device = scratch_device("dup", 128);
    let mut fs = FileSystem::format(device, 128);

    fs.create("a", SECTOR_SIZE, FileKind::File).unwrap();
    let free = fs.free_sectors();
    assert_eq!(
        fs.create("a", SECTOR_SIZE, FileKind::File),
        Err(FsError::AlreadyExists)
    );
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn failed_create_rolls_back() {
    // 10 sectors: 6 free after format; a 5-sector file needs 6 once its
    // header is claimed, so it misses by one
    let device = scratch_device("rollback", 10);
    let mut fs = FileSystem::format(device, 10);
    assert_eq!(fs.free_sectors(), 6);

    assert_eq!(
        fs.create("big", 5 * SECTOR_SIZE, FileKind::File),
        Err(FsError::NoSpace)
    );
    assert_eq!(fs.free_sectors(), 6);
    assert!(fs.list().is_empty());

    // one sector smaller fits exactly
    fs.create("big", 4 * SECTOR_SIZE, FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), 1);
}

#[test]
fn tier_boundaries() {
    let device = scratch_device("tiers", 512);
    let mut fs = FileSystem::format(device, 512);
    let base = fs.free_sectors();

    // 29 sectors: direct only, header + data
    fs.create("direct", 29 * SECTOR_SIZE, FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), base - 30);
    let header = fs.open("direct").unwrap();
    assert_eq!(header.header().data_sectors[29], NO_SECTOR);
    assert_eq!(header.header().data_sectors[30], NO_SECTOR);
    fs.remove("direct", FileKind::File).unwrap();

    // 30 sectors: one single-indirect block appears
    fs.create("single", 30 * SECTOR_SIZE, FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), base - 32);
    let header = fs.open("single").unwrap();
    assert_ne!(header.header().data_sectors[29], NO_SECTOR);
    assert_eq!(header.header().data_sectors[30], NO_SECTOR);
    fs.remove("single", FileKind::File).unwrap();

    // 61 sectors: still single-indirect
    fs.create("edge", 61 * SECTOR_SIZE, FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), base - 63);
    let header = fs.open("edge").unwrap();
    assert_eq!(header.header().data_sectors[30], NO_SECTOR);
    fs.remove("edge", FileKind::File).unwrap();

    // 62 sectors: the outer block appears with exactly one inner block
    fs.create("double", 62 * SECTOR_SIZE, FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), base - 66);
    let header = fs.open("double").unwrap();
    assert_ne!(header.header().data_sectors[30], NO_SECTOR);
    fs.remove("double", FileKind::File).unwrap();

    assert_eq!(fs.free_sectors(), base);
}

#[test]
fn big_file_spans_all_tiers() {
    setup_logger(log::LevelFilter::Debug);
    let device = scratch_device("big", 128);
    let mut fs = FileSystem::format(device, 128);
    let before = fs.free_sectors();

    // 8000 bytes is 63 sectors: data + single-indirect + outer + one inner
    fs.create("big", 8000, FileKind::File).unwrap();
    assert_eq!(before - fs.free_sectors(), 67);

    let file = fs.open("big").unwrap();
    let header = file.header();
    assert_eq!(
        header.byte_to_sector(fs.device(), 0),
        header.data_sectors[0] as usize
    );

    // a write through the double-indirect tier survives a read back
    let tail = b"the very last bytes";
    file.write_at(8000 - tail.len(), tail);
    let mut back = vec![0u8; tail.len()];
    file.read_at(8000 - tail.len(), &mut back);
    assert_eq!(&back, tail);

    // stripes across every tier keep their identity
    let stripe = vec![0xabu8; SECTOR_SIZE];
    for sector in [0usize, 28, 29, 60, 61, 62] {
        file.write_at(sector * SECTOR_SIZE, &stripe);
    }
    let mut all = vec![0u8; 8000];
    file.read_at(0, &mut all);
    assert_eq!(&all[61 * SECTOR_SIZE..62 * SECTOR_SIZE], &stripe[..]);

    fs.remove("big", FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), before);
}

#[test]
fn remove_then_recreate() {
    let device = scratch_device("recreate", 128);
    let mut fs = FileSystem::format(device, 128);
    let before = fs.free_sectors();

    fs.create("tmp", 10 * SECTOR_SIZE, FileKind::File).unwrap();
    fs.remove("tmp", FileKind::File).unwrap();
    assert_eq!(fs.free_sectors(), before);

    fs.create("tmp", 10 * SECTOR_SIZE, FileKind::File).unwrap();
    assert_eq!(fs.open("tmp").unwrap().length(), 10 * SECTOR_SIZE);
}

#[test]
fn remove_checks_name_and_kind() {
    let device = scratch_device("rm_kind", 128);
    let mut fs = FileSystem::format(device, 128);
    fs.create("file", SECTOR_SIZE, FileKind::File).unwrap();
    fs.create_dir("dir").unwrap();

    assert_eq!(fs.remove("ghost", FileKind::File), Err(FsError::NotFound));
    assert_eq!(fs.remove("dir", FileKind::File), Err(FsError::WrongKind));
    assert_eq!(fs.remove("file", FileKind::Directory), Err(FsError::WrongKind));
    fs.remove("file", FileKind::File).unwrap();
    assert!(!fs.list().contains(&"file".to_string()));
}

#[test]
fn oversized_directories_are_rejected() {
    // directory teardown only walks the direct tier, so a directory file
    // must never need an index block
    let device = scratch_device("big_dir", 512);
    let mut fs = FileSystem::format(device, 512);
    let free = fs.free_sectors();

    assert_eq!(
        fs.create("d", 30 * SECTOR_SIZE, FileKind::Directory),
        Err(FsError::DirectoryTooLarge)
    );
    assert_eq!(fs.free_sectors(), free);
    assert!(fs.list().is_empty());

    // an outsized plain file is still only bounded by the tiers
    fs.create("f", 30 * SECTOR_SIZE, FileKind::File).unwrap();
}

#[test]
fn directory_table_has_a_hard_capacity() {
    let device = scratch_device("full", 128);
    let mut fs = FileSystem::format(device, 128);
    for i in 0..7 {
        fs.create(&format!("f{i}"), 0, FileKind::File).unwrap();
    }
    assert_eq!(
        fs.create("f7", 0, FileKind::File),
        Err(FsError::DirectoryFull)
    );
    assert_eq!(fs.list().len(), 7);
}

#[test]
fn rename_keeps_the_header() {
    let device = scratch_device("rename", 128);
    let mut fs = FileSystem::format(device, 128);
    fs.create("old", SECTOR_SIZE, FileKind::File).unwrap();
    let sector = fs.open("old").unwrap().header_sector();

    fs.rename("old", "new").unwrap();
    assert!(matches!(fs.open("old"), Err(FsError::NotFound)));
    assert_eq!(fs.open("new").unwrap().header_sector(), sector);

    // directories cannot be renamed, and names stay bounded
    fs.create_dir("d").unwrap();
    assert_eq!(fs.rename("d", "e"), Err(FsError::WrongKind));
    assert_eq!(fs.rename("new", "much-too-long"), Err(FsError::NameTooLong));
    fs.create("taken", 0, FileKind::File).unwrap();
    assert_eq!(fs.rename("new", "taken"), Err(FsError::AlreadyExists));
}

#[test]
fn descend_ascend_and_breadcrumbs() {
    let device = scratch_device("cd", 128);
    let mut fs = FileSystem::format(device.clone(), 128);

    fs.create_dir("d").unwrap();
    fs.change_dir("d").unwrap();
    fs.create("inside", 0, FileKind::File).unwrap();
    assert_eq!(fs.list(), vec!["inside".to_string()]);

    // both ends of the move are on disk
    let root = fs.root_directory();
    let child_sector = root.child;
    assert_ne!(child_sector, NO_SECTOR);
    let child = Directory::fetch_from(&OpenFile::open(device.clone(), child_sector as usize));
    assert_eq!(child.parent as usize, ROOT_DIR_SECTOR);
    assert_eq!(child.child, NO_SECTOR);

    fs.change_dir("..").unwrap();
    assert_eq!(fs.list(), vec!["d".to_string()]);
    assert_eq!(fs.root_directory().child, NO_SECTOR);

    // the parent link survives the ascent
    let child = Directory::fetch_from(&OpenFile::open(device, child_sector as usize));
    assert_eq!(child.parent as usize, ROOT_DIR_SECTOR);
}

#[test]
fn cd_rejects_files_and_the_root_parent() {
    let device = scratch_device("cd_err", 128);
    let mut fs = FileSystem::format(device, 128);
    fs.create("f", 0, FileKind::File).unwrap();

    assert_eq!(fs.change_dir("ghost"), Err(FsError::NotFound));
    assert_eq!(fs.change_dir("f"), Err(FsError::WrongKind));

    let free = fs.free_sectors();
    assert_eq!(fs.change_dir(".."), Err(FsError::RootHasNoParent));
    assert_eq!(fs.free_sectors(), free);
    assert_eq!(fs.list(), vec!["f".to_string()]);
}

#[test]
fn recursive_removal_restores_the_free_map() {
    setup_logger(log::LevelFilter::Debug);
    let device = scratch_device("rmdir", 256);
    let mut fs = FileSystem::format(device, 256);
    let before = fs.free_sectors();

    fs.create_dir("d").unwrap();
    fs.change_dir("d").unwrap();
    fs.create("x", 3 * SECTOR_SIZE, FileKind::File).unwrap();
    fs.create_dir("sub").unwrap();
    fs.change_dir("sub").unwrap();
    fs.create("y", 40 * SECTOR_SIZE, FileKind::File).unwrap();
    fs.change_dir("..").unwrap();
    fs.change_dir("..").unwrap();

    fs.remove_dir("d").unwrap();
    assert_eq!(fs.free_sectors(), before);
    assert!(fs.list().is_empty());
}

#[test]
fn rmdir_requires_a_directory() {
    let device = scratch_device("rmdir_kind", 128);
    let mut fs = FileSystem::format(device, 128);
    fs.create("f", 0, FileKind::File).unwrap();
    assert_eq!(fs.remove_dir("f"), Err(FsError::WrongKind));
    assert_eq!(fs.remove_dir("ghost"), Err(FsError::NotFound));
}

#[test]
fn mount_recovers_the_working_directory() {
    let device = scratch_device("mount", 128);
    {
        let mut fs = FileSystem::format(device.clone(), 128);
        fs.create_dir("a").unwrap();
        fs.change_dir("a").unwrap();
        fs.create_dir("b").unwrap();
        fs.change_dir("b").unwrap();
        fs.create("deep", SECTOR_SIZE, FileKind::File).unwrap();
        let file = fs.open("deep").unwrap();
        file.write_at(0, b"still here");
    }

    // a fresh mount follows the breadcrumbs back to "b"
    let fs = Mutex::new(FileSystem::mount(device, 128));
    assert_eq!(fs.lock().list(), vec!["deep".to_string()]);
    let mut buf = [0u8; 10];
    fs.lock().open("deep").unwrap().read_at(0, &mut buf);
    assert_eq!(&buf, b"still here");
}

#[test]
fn report_names_the_visible_files() {
    let device = scratch_device("report", 128);
    let mut fs = FileSystem::format(device, 128);
    fs.create("hello", 16, FileKind::File).unwrap();
    fs.open("hello").unwrap().write_at(0, b"hi");
    fs.create_dir("docs").unwrap();

    let report = fs.report();
    assert!(report.contains("hello"));
    assert!(report.contains("docs"));
    assert!(report.contains("sectors free"));
    // the file dump escapes what is not printable
    assert!(report.contains("hi"));

    let table = fs.root_directory().print();
    assert!(table.contains("hello"));
    assert!(table.contains("docs"));
    assert!(table.contains("2 entries"));
}
