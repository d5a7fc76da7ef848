use std::path::PathBuf;

use tempfile::TempDir;

use fat16fs::fat_constants::{
    CLUSTER_SIZE, ENTRIES_PER_DIR, FAT_ENTRY_EOF, FAT_ENTRY_FREE, FIRST_DATA_CLUSTER,
};
use fat16fs::superblock::Superblock;
use fat16fs::{Attr, Driver, Fat16Fs, FsError};

fn temp_image() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir failed");
    let path = dir.path().join("disk.img");
    (dir, path)
}

fn file_attr(fs: &Fat16Fs, path: &str) -> (u64, u32) {
    match fs.getattr(path).expect("getattr failed") {
        Attr::File { size, clusters } => (size, clusters),
        Attr::Directory => panic!("{path} is a directory"),
    }
}

#[test]
fn fresh_format_lists_only_dot_entries() {
    let (_dir, path) = temp_image();
    let fs = Fat16Fs::mount(&path).expect("mount failed");
    assert_eq!(fs.readdir("/").expect("readdir failed"), vec![".", ".."]);
}

#[test]
fn nested_tree_write_and_read_back() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    fs.mkdir("/a").expect("mkdir /a failed");
    fs.mkdir("/a/b").expect("mkdir /a/b failed");
    fs.create("/a/b/c.txt").expect("create failed");
    assert_eq!(fs.write("/a/b/c.txt", b"hello", 0), Ok(5));

    let mut buf = [0u8; 5];
    assert_eq!(fs.read("/a/b/c.txt", &mut buf, 0), Ok(5));
    assert_eq!(&buf, b"hello");
    assert_eq!(file_attr(&fs, "/a/b/c.txt"), (5, 1));

    assert_eq!(fs.readdir("/").unwrap(), vec![".", "..", "a"]);
    assert_eq!(fs.readdir("/a").unwrap(), vec![".", "..", "b"]);
    assert_eq!(fs.readdir("/a/b").unwrap(), vec![".", "..", "c.txt"]);
}

#[test]
fn multi_cluster_file_spans_exactly_three_clusters() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    let data = vec![0xABu8; 10000];
    fs.create("/big.bin").expect("create failed");
    assert_eq!(fs.write("/big.bin", &data, 0), Ok(10000));
    assert_eq!(file_attr(&fs, "/big.bin"), (10000, 3));

    let mut buf = vec![0u8; 10000];
    assert_eq!(fs.read("/big.bin", &mut buf, 0), Ok(10000));
    assert!(buf.iter().all(|&b| b == 0xAB));
}

#[test]
fn cluster_boundary_sizes() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    fs.create("/one").expect("create failed");
    assert_eq!(fs.write("/one", &vec![1u8; CLUSTER_SIZE], 0), Ok(CLUSTER_SIZE));
    assert_eq!(file_attr(&fs, "/one"), (CLUSTER_SIZE as u64, 1));

    fs.create("/two").expect("create failed");
    assert_eq!(
        fs.write("/two", &vec![2u8; CLUSTER_SIZE + 1], 0),
        Ok(CLUSTER_SIZE + 1)
    );
    assert_eq!(file_attr(&fs, "/two"), (CLUSTER_SIZE as u64 + 1, 2));

    // reading at end-of-file yields nothing
    let mut buf = [0u8; 16];
    assert_eq!(fs.read("/one", &mut buf, CLUSTER_SIZE as u64), Ok(0));
    assert_eq!(fs.read("/one", &mut buf, CLUSTER_SIZE as u64 + 50), Ok(0));
}

#[test]
fn unlink_releases_cluster_and_slot_for_reuse() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    fs.create("/x").expect("create failed");
    assert_eq!(fs.write("/x", b"payload", 0), Ok(7));
    fs.flush().expect("flush failed");
    let image = std::fs::read(&path).expect("read image failed");
    let sb = Superblock::parse(&image).unwrap();
    let fat_entry = |image: &[u8], cluster: u16| {
        let i = sb.fat_offset as usize + cluster as usize * 2;
        u16::from_le_bytes([image[i], image[i + 1]])
    };
    assert_eq!(fat_entry(&image, FIRST_DATA_CLUSTER), FAT_ENTRY_EOF);

    fs.unlink("/x").expect("unlink failed");
    fs.flush().expect("flush failed");
    let image = std::fs::read(&path).expect("read image failed");
    assert_eq!(fat_entry(&image, FIRST_DATA_CLUSTER), FAT_ENTRY_FREE);
    assert_eq!(fs.readdir("/").unwrap(), vec![".", ".."]);

    // recreate: the lowest free cluster and the tombstoned slot come back
    fs.create("/x").expect("re-create failed");
    assert_eq!(fs.write("/x", b"again", 0), Ok(5));
    fs.flush().expect("flush failed");
    let image = std::fs::read(&path).expect("read image failed");
    assert_eq!(fat_entry(&image, FIRST_DATA_CLUSTER), FAT_ENTRY_EOF);
    assert_eq!(fs.readdir("/").unwrap(), vec![".", "..", "x"]);
}

#[test]
fn root_directory_capacity() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    // the root block has no physical dot records, so every slot is usable
    for i in 0..ENTRIES_PER_DIR {
        fs.create(&format!("/f{i}")).expect("create failed");
    }
    assert_eq!(fs.create("/overflow"), Err(FsError::NoSpace));

    // existing files stay usable after the capacity failure
    assert_eq!(fs.write("/f0", b"still here", 0), Ok(10));
    let mut buf = [0u8; 10];
    assert_eq!(fs.read("/f0", &mut buf, 0), Ok(10));
    assert_eq!(&buf, b"still here");
}

#[test]
fn rmdir_requires_an_empty_directory() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    fs.mkdir("/d").expect("mkdir failed");
    fs.create("/d/f").expect("create failed");
    assert_eq!(fs.rmdir("/d"), Err(FsError::NotEmpty));
    // the failed rmdir left the directory intact
    assert_eq!(fs.readdir("/d").unwrap(), vec![".", "..", "f"]);

    fs.unlink("/d/f").expect("unlink failed");
    fs.rmdir("/d").expect("rmdir failed");
    assert_eq!(fs.readdir("/").unwrap(), vec![".", ".."]);
}

#[test]
fn mkdir_rmdir_restores_listing() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");
    fs.create("/keep").expect("create failed");
    let before = fs.readdir("/").unwrap();

    fs.mkdir("/gone").expect("mkdir failed");
    fs.rmdir("/gone").expect("rmdir failed");
    assert_eq!(fs.readdir("/").unwrap(), before);
}

#[test]
fn namespace_conflicts() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    fs.mkdir("/d").expect("mkdir failed");
    fs.create("/f").expect("create failed");
    assert_eq!(fs.mkdir("/d"), Err(FsError::AlreadyExists));
    assert_eq!(fs.create("/f"), Err(FsError::AlreadyExists));
    assert_eq!(fs.create("/d"), Err(FsError::AlreadyExists));
    assert_eq!(fs.unlink("/d"), Err(FsError::IsADirectory));
    assert_eq!(fs.rmdir("/f"), Err(FsError::NotADirectory));
    assert_eq!(fs.mkdir("/missing/child"), Err(FsError::NotFound));
}

#[test]
fn remount_preserves_the_whole_tree() {
    let (_dir, path) = temp_image();
    let payload = vec![0x5Au8; 6000];
    {
        let mut fs = Fat16Fs::mount(&path).expect("mount failed");
        fs.mkdir("/a").expect("mkdir failed");
        fs.mkdir("/a/b").expect("mkdir failed");
        fs.create("/a/b/c.txt").expect("create failed");
        assert_eq!(fs.write("/a/b/c.txt", b"hello", 0), Ok(5));
        fs.create("/a/big.bin").expect("create failed");
        assert_eq!(fs.write("/a/big.bin", &payload, 0), Ok(6000));
        // dropping the mount flushes and unmaps
    }

    let fs = Fat16Fs::mount(&path).expect("remount failed");
    assert_eq!(fs.readdir("/").unwrap(), vec![".", "..", "a"]);
    assert_eq!(fs.readdir("/a").unwrap(), vec![".", "..", "b", "big.bin"]);
    assert_eq!(fs.readdir("/a/b").unwrap(), vec![".", "..", "c.txt"]);

    let mut buf = [0u8; 5];
    assert_eq!(fs.read("/a/b/c.txt", &mut buf, 0), Ok(5));
    assert_eq!(&buf, b"hello");

    let mut big = vec![0u8; 6000];
    assert_eq!(fs.read("/a/big.bin", &mut big, 0), Ok(6000));
    assert_eq!(big, payload);
}

#[test]
fn write_clamps_to_remaining_capacity() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    let data_capacity =
        (fs.total_clusters() as usize - FIRST_DATA_CLUSTER as usize) * CLUSTER_SIZE;
    let oversized = vec![0x42u8; data_capacity + CLUSTER_SIZE];

    fs.create("/hog").expect("create failed");
    assert_eq!(fs.write("/hog", &oversized, 0), Ok(data_capacity));
    assert_eq!(
        file_attr(&fs, "/hog"),
        (
            data_capacity as u64,
            fs.total_clusters() - u32::from(FIRST_DATA_CLUSTER)
        )
    );

    // a later file can still claim a slot, but no clusters remain
    fs.create("/empty").expect("create failed");
    assert_eq!(fs.write("/empty", b"no room", 0), Ok(0));
    assert_eq!(file_attr(&fs, "/empty"), (0, 0));
}

#[test]
fn partial_offset_reads_and_writes() {
    let (_dir, path) = temp_image();
    let mut fs = Fat16Fs::mount(&path).expect("mount failed");

    fs.create("/p").expect("create failed");
    assert_eq!(fs.write("/p", &vec![7u8; 5000], 0), Ok(5000));
    // overwrite a window straddling the first cluster boundary
    assert_eq!(fs.write("/p", &[9u8; 200], 4000), Ok(200));
    assert_eq!(file_attr(&fs, "/p"), (5000, 2));

    let mut buf = [0u8; 300];
    assert_eq!(fs.read("/p", &mut buf, 3950), Ok(300));
    assert!(buf[..50].iter().all(|&b| b == 7));
    assert!(buf[50..250].iter().all(|&b| b == 9));
    assert!(buf[250..].iter().all(|&b| b == 7));

    // a short tail read is clamped to the file size
    let mut tail = [0u8; 100];
    assert_eq!(fs.read("/p", &mut tail, 4990), Ok(10));
}

#[test]
fn driver_speaks_the_upcall_convention() {
    let (_dir, path) = temp_image();
    let driver = Driver::init(&path).expect("init failed");

    assert_eq!(driver.mkdir("/a"), 0);
    assert_eq!(driver.create("/a/f.txt"), 0);
    assert_eq!(driver.write("/a/f.txt", b"hello", 0), 5);

    let mut buf = [0u8; 5];
    assert_eq!(driver.read("/a/f.txt", &mut buf, 0), 5);
    assert_eq!(&buf, b"hello");

    let stat = driver.getattr("/a/f.txt").expect("getattr failed");
    assert_eq!(stat.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
    assert_eq!(stat.mode & 0o777, 0o644);
    assert_eq!(stat.nlink, 1);
    assert_eq!(stat.size, 5);
    assert_eq!(stat.uid, unsafe { libc::getuid() });

    let dir_stat = driver.getattr("/a").expect("getattr failed");
    assert_eq!(dir_stat.mode & libc::S_IFMT as u32, libc::S_IFDIR as u32);
    assert_eq!(dir_stat.mode & 0o777, 0o755);
    assert_eq!(dir_stat.nlink, 2);

    assert_eq!(driver.getattr("/nope").unwrap_err(), -libc::ENOENT);
    assert_eq!(driver.readdir("/a").unwrap(), vec![".", "..", "f.txt"]);
    assert_eq!(driver.readdir("/a/f.txt").unwrap_err(), -libc::ENOTDIR);
    assert_eq!(driver.mkdir("/"), -libc::EINVAL);
    assert_eq!(driver.rmdir("/a"), -libc::ENOTEMPTY);
    assert_eq!(driver.unlink("/a/f.txt"), 0);
    assert_eq!(driver.rmdir("/a"), 0);
    assert_eq!(driver.utimens("/gone"), -libc::ENOENT);
    assert_eq!(driver.truncate("/missing", 0), -libc::ENOENT);

    driver.destroy();
}
