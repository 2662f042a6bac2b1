//! Behaviour every backend must share.
//!
//! Each scenario is an async fn over `&dyn Fs`; `backend_suite!` runs all of
//! them once per backend:
//!
//! - **memory:** `MemFs`
//! - **sqlite:** `SqlFs` on a database file in a temp dir
//! - **sub:** `SubFs` over `MemFs`, rooted one directory down

use std::io::SeekFrom;
use std::sync::Arc;

use tempfile::TempDir;
use tsumiki_fs::{
    BLOCK_SIZE, DEFAULT_DIR_MODE, File, Fs, MemFs, OpenFlag, ReadOnlyFile, SqlFs, sub,
};
use tsumiki_io::{
    Buff, Closer, ErrorKind, Reader, Seeker, Span, Writer, copy, read_all, read_full,
};

const D: &[u8] = b"Royale with Cheese\nLe big Mac\n";
const MODE: u32 = 0o750;

// ============================================================================
// Shared test setup
// ============================================================================

/// Route `RUST_LOG`-filtered traces into the test output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A filesystem plus whatever must outlive it.
struct Fixture {
    fs: Arc<dyn Fs>,
    _dir: Option<TempDir>,
}

async fn memory() -> Fixture {
    init_tracing();
    Fixture {
        fs: Arc::new(MemFs::new()),
        _dir: None,
    }
}

async fn sqlite() -> Fixture {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let fs = SqlFs::open(dir.path().join("fs.db")).unwrap();
    Fixture {
        fs: Arc::new(fs),
        _dir: Some(dir),
    }
}

async fn sub_memory() -> Fixture {
    init_tracing();
    let inner = Arc::new(MemFs::new());
    inner.mkdir("jail", 0o755).await.unwrap();
    Fixture {
        fs: Arc::new(sub(inner, "jail").unwrap()),
        _dir: None,
    }
}

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 0xff) as u8).collect()
}

async fn put(fs: &dyn Fs, name: &str, data: &[u8]) {
    let mut f = fs.create(name).await.unwrap();
    f.write(&Span::from(data)).await.unwrap();
    f.close().await.unwrap();
}

async fn get(fs: &dyn Fs, name: &str) -> Vec<u8> {
    let mut f = fs.open(name).await.unwrap();
    let data = read_all(&mut f).await.unwrap().to_vec();
    f.close().await.unwrap();
    data
}

async fn open(fs: &dyn Fs, flag: OpenFlag) -> tsumiki_io::Result<Box<dyn File>> {
    fs.open_file("foo", flag, 0).await
}

fn kind<T>(r: tsumiki_io::Result<T>) -> ErrorKind {
    match r {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.kind(),
    }
}

// ============================================================================
// Files
// ============================================================================

async fn create_then_read(fs: &dyn Fs) {
    put(fs, "foo", &[0x12, 0x34]).await;
    assert_eq!(get(fs, "foo").await, [0x12, 0x34]);
    // A second open starts from the beginning again.
    assert_eq!(get(fs, "foo").await, [0x12, 0x34]);
}

async fn create_in_directory(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    put(fs, "foo/bar", &[0x12, 0x34]).await;
    assert_eq!(get(fs, "foo/bar").await, [0x12, 0x34]);
    assert_eq!(fs.stat("foo").await.unwrap().mode, MODE);
}

async fn readers_have_independent_cursors(fs: &dyn Fs) {
    let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
    put(fs, "foo", &data).await;

    let mut f1 = fs.open("foo").await.unwrap();
    let mut f2 = fs.open("foo").await.unwrap();
    let (b1, b2) = (Span::new(3), Span::new(2));

    read_full(&mut f1, &b1).await.unwrap();
    read_full(&mut f2, &b2).await.unwrap();
    assert_eq!(b1.to_vec(), &data[..3]);
    assert_eq!(b2.to_vec(), &data[..2]);

    read_full(&mut f1, &b1).await.unwrap();
    read_full(&mut f2, &b2).await.unwrap();
    assert_eq!(b1.to_vec(), &data[3..6]);
    assert_eq!(b2.to_vec(), &data[2..4]);
}

async fn open_missing_file(fs: &dyn Fs) {
    let err = fs.open("not-exists").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotExist);
    assert_eq!(err.path(), Some("not-exists"));
}

async fn open_directory(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    let mut f = fs.open("foo").await.unwrap();
    assert_eq!(kind(f.read(&Span::new(2)).await), ErrorKind::IsDirectory);
    assert!(f.stat().await.unwrap().is_dir());
    f.close().await.unwrap();

    assert_eq!(kind(fs.create("foo").await), ErrorKind::IsDirectory);
}

async fn open_through_file_is_not_directory(fs: &dyn Fs) {
    put(fs, "foo", D).await;
    assert_eq!(kind(fs.open("foo/bar").await), ErrorKind::NotDirectory);
    assert_eq!(kind(fs.create("foo/bar").await), ErrorKind::NotDirectory);
    assert_eq!(kind(fs.create("nope/bar").await), ErrorKind::NotExist);
}

async fn handle_stat_tracks_writes(fs: &dyn Fs) {
    let mut f = fs.create("foo").await.unwrap();
    f.write(&Span::from(D)).await.unwrap();
    let info = f.stat().await.unwrap();
    assert_eq!(info.name, "foo");
    assert_eq!(info.size, D.len() as u64);
    f.close().await.unwrap();
    assert_eq!(kind(f.stat().await), ErrorKind::Closed);
}

async fn read_only_handle_rejects_writes(fs: &dyn Fs) {
    put(fs, "foo", D).await;
    let mut f = fs.open_file("foo", OpenFlag::READ, 0).await.unwrap();
    assert_eq!(kind(f.write(&Span::from("x")).await), ErrorKind::ReadOnly);
}

// ============================================================================
// Open flags
// ============================================================================

async fn flag_read(fs: &dyn Fs) {
    assert_eq!(kind(open(fs, OpenFlag::READ).await), ErrorKind::NotExist);
    put(fs, "foo", D).await;
    let mut f = open(fs, OpenFlag::READ).await.unwrap();
    assert_eq!(read_all(&mut f).await.unwrap().to_vec(), D);
}

async fn flag_read_write(fs: &dyn Fs) {
    let rw = OpenFlag::READ | OpenFlag::WRITE;
    assert_eq!(kind(open(fs, rw).await), ErrorKind::NotExist);
    put(fs, "foo", D).await;
    let mut f = open(fs, rw).await.unwrap();
    assert_eq!(read_all(&mut f).await.unwrap().to_vec(), D);
}

async fn flag_append(fs: &dyn Fs) {
    let flag = OpenFlag::READ | OpenFlag::WRITE | OpenFlag::APPEND;
    assert_eq!(kind(open(fs, flag).await), ErrorKind::NotExist);

    put(fs, "foo", &D[..2]).await;
    let mut f = open(fs, flag).await.unwrap();
    assert_eq!(f.seek(SeekFrom::Start(1)).await.unwrap(), 2);
    f.write(&Span::from(&D[2..])).await.unwrap();
    assert_eq!(f.read(&Span::new(4)).await.unwrap(), None);
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, D);
}

async fn flag_trunc(fs: &dyn Fs) {
    let flag = OpenFlag::READ | OpenFlag::WRITE | OpenFlag::TRUNC;
    assert_eq!(kind(open(fs, flag).await), ErrorKind::NotExist);

    put(fs, "foo", &pattern(100)).await;
    let mut f = open(fs, flag).await.unwrap();
    f.write(&Span::from(D)).await.unwrap();
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, D);
}

async fn flag_at_end(fs: &dyn Fs) {
    let flag = OpenFlag::READ | OpenFlag::WRITE | OpenFlag::AT_END;
    assert_eq!(kind(open(fs, flag).await), ErrorKind::NotExist);

    put(fs, "foo", &D[..2]).await;
    let mut f = open(fs, flag).await.unwrap();
    f.write(&Span::from(&D[2..])).await.unwrap();
    // Unlike append, seeking back is allowed.
    assert_eq!(f.seek(SeekFrom::Start(0)).await.unwrap(), 0);
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, D);
}

async fn flag_write_creates_and_replaces(fs: &dyn Fs) {
    let mut f = open(fs, OpenFlag::WRITE).await.unwrap();
    f.write(&Span::from(D)).await.unwrap();
    f.close().await.unwrap();

    let mut f = open(fs, OpenFlag::WRITE).await.unwrap();
    f.write(&Span::from([1u8, 2].as_slice())).await.unwrap();
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, [1, 2]);
}

async fn flag_write_replaces_busy_file(fs: &dyn Fs) {
    let mut f1 = open(fs, OpenFlag::WRITE).await.unwrap();
    f1.write(&Span::from([1u8, 2].as_slice())).await.unwrap();

    let mut f2 = open(fs, OpenFlag::WRITE).await.unwrap();
    // f1 still holds the old file.
    f1.write(&Span::from([3u8, 4].as_slice())).await.unwrap();
    f2.write(&Span::from(D)).await.unwrap();
    f1.close().await.unwrap();
    f2.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, D);
}

async fn flag_busy(fs: &dyn Fs) {
    let _w = open(fs, OpenFlag::WRITE).await.unwrap();
    for flag in [
        OpenFlag::READ | OpenFlag::WRITE,
        OpenFlag::WRITE | OpenFlag::TRUNC,
        OpenFlag::WRITE | OpenFlag::APPEND,
    ] {
        assert_eq!(kind(open(fs, flag).await), ErrorKind::Busy, "{flag:?}");
    }
    // Readers wait for the writer too.
    assert_eq!(kind(open(fs, OpenFlag::READ).await), ErrorKind::Busy);
    assert_eq!(kind(fs.open("foo").await), ErrorKind::Busy);
}

async fn flag_second_rw_busy(fs: &dyn Fs) {
    put(fs, "foo", D).await;
    let rw = OpenFlag::READ | OpenFlag::WRITE;

    let mut w = open(fs, rw).await.unwrap();
    assert_eq!(kind(open(fs, rw).await), ErrorKind::Busy);
    assert_eq!(kind(open(fs, rw | OpenFlag::AT_END).await), ErrorKind::Busy);
    assert_eq!(kind(fs.create("foo").await), ErrorKind::Busy);
    w.close().await.unwrap();

    // Closing the writer lets the next one in.
    let mut w = open(fs, rw).await.unwrap();
    assert_eq!(read_all(&mut w).await.unwrap().to_vec(), D);
    w.close().await.unwrap();
}

async fn reader_sees_writer(fs: &dyn Fs) {
    put(fs, "foo", &D[..2]).await;

    let mut r = open(fs, OpenFlag::READ).await.unwrap();
    assert_eq!(read_all(&mut r).await.unwrap().to_vec(), &D[..2]);
    assert_eq!(r.read(&Span::new(4)).await.unwrap(), None);

    // Readers do not keep writers out.
    let mut w = open(fs, OpenFlag::READ | OpenFlag::WRITE | OpenFlag::APPEND)
        .await
        .unwrap();
    w.write(&Span::from(&D[2..])).await.unwrap();
    w.close().await.unwrap();

    assert_eq!(read_all(&mut r).await.unwrap().to_vec(), &D[2..]);
    r.close().await.unwrap();
}

async fn flag_no_replace(fs: &dyn Fs) {
    let flag = OpenFlag::WRITE | OpenFlag::NO_REPLACE;
    open(fs, flag).await.unwrap().close().await.unwrap();
    assert_eq!(kind(open(fs, flag).await), ErrorKind::Exist);
}

async fn empty_flag_means_read(fs: &dyn Fs) {
    assert_eq!(kind(open(fs, OpenFlag::empty()).await), ErrorKind::NotExist);
    put(fs, "foo", D).await;
    let mut f = open(fs, OpenFlag::empty()).await.unwrap();
    assert_eq!(kind(f.write(&Span::from("x")).await), ErrorKind::ReadOnly);
}

// ============================================================================
// Block chains
// ============================================================================

async fn large_file_in_parts(fs: &dyn Fs) {
    let d = pattern(BLOCK_SIZE * 3 / 2);
    let mut f = open(fs, OpenFlag::WRITE).await.unwrap();
    let n = copy(&mut f, &mut Buff::from(d.clone())).await.unwrap();
    assert_eq!(n, d.len() as u64);
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, d);
    assert_eq!(fs.stat("foo").await.unwrap().size, d.len() as u64);
}

async fn large_file_at_once(fs: &dyn Fs) {
    let d = pattern(BLOCK_SIZE * 3 / 2);
    let mut f = open(fs, OpenFlag::WRITE).await.unwrap();
    assert_eq!(f.write(&Span::from(d.clone())).await.unwrap(), d.len());
    f.close().await.unwrap();

    let p = Span::new(d.len());
    let mut f = open(fs, OpenFlag::READ).await.unwrap();
    assert_eq!(f.read(&p).await.unwrap(), Some(d.len()));
    assert_eq!(p.to_vec(), d);
}

async fn overwrite_before_close(fs: &dyn Fs) {
    let mut d = pattern(BLOCK_SIZE * 3 / 2);
    let mut f = open(fs, OpenFlag::WRITE).await.unwrap();
    copy(&mut f, &mut Buff::from(d.clone())).await.unwrap();

    d.reverse();
    f.seek(SeekFrom::Start(0)).await.unwrap();
    copy(&mut f, &mut Buff::from(d.clone())).await.unwrap();
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, d);
}

async fn overwrite_after_close(fs: &dyn Fs) {
    let mut d = pattern(BLOCK_SIZE * 3 / 2);
    let mut f = open(fs, OpenFlag::WRITE).await.unwrap();
    copy(&mut f, &mut Buff::from(d.clone())).await.unwrap();
    f.close().await.unwrap();

    d.reverse();
    let mut f = open(fs, OpenFlag::READ | OpenFlag::WRITE).await.unwrap();
    copy(&mut f, &mut Buff::from(d.clone())).await.unwrap();
    f.close().await.unwrap();

    assert_eq!(get(fs, "foo").await, d);
}

async fn seek_across_blocks(fs: &dyn Fs) {
    let d = pattern(BLOCK_SIZE * 2 + 7);
    put(fs, "foo", &d).await;

    let mut f = fs.open("foo").await.unwrap();
    let end = f.seek(SeekFrom::End(0)).await.unwrap();
    assert_eq!(end, d.len() as u64);
    assert_eq!(kind(f.seek(SeekFrom::End(1)).await), ErrorKind::OutOfRange);

    let pos = f.seek(SeekFrom::Current(-(BLOCK_SIZE as i64) - 10)).await.unwrap();
    let p = Span::new(20);
    read_full(&mut f, &p).await.unwrap();
    assert_eq!(p.to_vec(), &d[pos as usize..pos as usize + 20]);
}

// ============================================================================
// Directories
// ============================================================================

async fn mkdir_all_nested(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    fs.mkdir_all("foo/bar/baz", MODE).await.unwrap();
    assert!(fs.stat("foo/bar/baz").await.unwrap().is_dir());

    // Already there: nothing to do.
    fs.mkdir_all("foo/bar", MODE).await.unwrap();

    put(fs, "foo/file", D).await;
    assert_eq!(kind(fs.mkdir_all("foo/file/x", MODE).await), ErrorKind::NotDirectory);
    assert_eq!(kind(fs.mkdir_all("foo/file", MODE).await), ErrorKind::NotDirectory);
}

async fn mkdir_errors(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    assert_eq!(kind(fs.mkdir("foo", MODE).await), ErrorKind::Exist);
    assert_eq!(kind(fs.mkdir("a/b", MODE).await), ErrorKind::NotExist);

    put(fs, "file", D).await;
    assert_eq!(kind(fs.mkdir("file/x", MODE).await), ErrorKind::NotDirectory);
}

async fn mkdir_zero_mode_gets_default(fs: &dyn Fs) {
    fs.mkdir("foo", 0).await.unwrap();
    fs.mkdir_all("bar/baz", 0).await.unwrap();
    assert_eq!(fs.stat("foo").await.unwrap().mode, DEFAULT_DIR_MODE);
    assert_eq!(fs.stat("bar").await.unwrap().mode, DEFAULT_DIR_MODE);
    assert_eq!(fs.stat("bar/baz").await.unwrap().mode, DEFAULT_DIR_MODE);
}

async fn read_dir_lists_children(fs: &dyn Fs) {
    fs.mkdir_all("foo/bar", MODE).await.unwrap();
    fs.mkdir_all("foo/baz", MODE).await.unwrap();
    put(fs, "foo/qux", D).await;

    let mut entries = fs.read_dir("foo").await.unwrap();
    entries.sort_by(|a, b| a.name().cmp(b.name()));
    let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
    assert_eq!(names, ["bar", "baz", "qux"]);
    assert!(entries[0].is_dir());
    assert!(!entries[2].is_dir());

    let info = entries[2].info().await.unwrap();
    assert_eq!(info.size, D.len() as u64);

    assert_eq!(kind(fs.read_dir("foo/qux").await), ErrorKind::NotDirectory);
    assert_eq!(kind(fs.read_dir("nope").await), ErrorKind::NotExist);
}

// ============================================================================
// Rename and remove
// ============================================================================

async fn rename_file_to_new_name(fs: &dyn Fs) {
    put(fs, "foo", &[0x12, 0x34]).await;
    fs.rename("foo", "bar").await.unwrap();
    assert_eq!(kind(fs.stat("foo").await), ErrorKind::NotExist);
    assert_eq!(get(fs, "bar").await, [0x12, 0x34]);
}

async fn rename_file_over_file(fs: &dyn Fs) {
    put(fs, "foo", &[0x12, 0x34]).await;
    put(fs, "bar", &[0x56, 0x78]).await;
    fs.rename("foo", "bar").await.unwrap();
    assert_eq!(kind(fs.stat("foo").await), ErrorKind::NotExist);
    assert_eq!(get(fs, "bar").await, [0x12, 0x34]);
}

async fn rename_file_over_directory(fs: &dyn Fs) {
    put(fs, "foo", D).await;
    fs.mkdir("bar", MODE).await.unwrap();
    let err = fs.rename("foo", "bar").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsDirectory);
    assert_eq!(err.path(), Some("foo"));
}

async fn rename_directory(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    put(fs, "foo/baz", D).await;
    fs.rename("foo", "bar").await.unwrap();
    assert_eq!(kind(fs.stat("foo").await), ErrorKind::NotExist);
    assert_eq!(get(fs, "bar/baz").await, D);
}

async fn rename_directory_over_file(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    put(fs, "bar", D).await;
    assert_eq!(kind(fs.rename("foo", "bar").await), ErrorKind::NotDirectory);
}

async fn rename_directory_over_empty_directory(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    put(fs, "foo/baz", D).await;
    fs.mkdir("bar", MODE).await.unwrap();

    fs.rename("foo", "bar").await.unwrap();
    assert_eq!(kind(fs.stat("foo").await), ErrorKind::NotExist);
    assert_eq!(get(fs, "bar/baz").await, D);
}

async fn rename_directory_over_non_empty_directory(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    put(fs, "foo/baz", D).await;
    fs.mkdir("bar", MODE).await.unwrap();
    put(fs, "bar/qux", D).await;
    assert_eq!(kind(fs.rename("foo", "bar").await), ErrorKind::DirectoryNotEmpty);
}

async fn rename_into_itself(fs: &dyn Fs) {
    fs.mkdir_all("foo/bar", MODE).await.unwrap();
    assert_eq!(kind(fs.rename("foo", "foo/bar/x").await), ErrorKind::InvalidArgument);
    // Same node: no-op.
    fs.rename("foo", "foo/bar/..").await.unwrap();
    assert!(fs.stat("foo/bar").await.unwrap().is_dir());
}

async fn rename_missing(fs: &dyn Fs) {
    assert_eq!(kind(fs.rename("nope", "bar").await), ErrorKind::NotExist);
}

async fn rename_between_directories(fs: &dyn Fs) {
    fs.mkdir_all("a/b", MODE).await.unwrap();
    fs.mkdir("c", MODE).await.unwrap();
    put(fs, "a/b/f", D).await;

    fs.rename("a/b/f", "c/g").await.unwrap();
    assert_eq!(get(fs, "c/g").await, D);
    assert!(fs.read_dir("a/b").await.unwrap().is_empty());
}

async fn remove_file(fs: &dyn Fs) {
    put(fs, "foo", D).await;
    fs.remove("foo").await.unwrap();
    assert_eq!(kind(fs.stat("foo").await), ErrorKind::NotExist);
}

async fn remove_directories(fs: &dyn Fs) {
    fs.mkdir_all("foo/bar", MODE).await.unwrap();
    assert_eq!(kind(fs.remove("foo").await), ErrorKind::DirectoryNotEmpty);
    fs.remove("foo/bar").await.unwrap();
    fs.remove("foo").await.unwrap();
    assert_eq!(kind(fs.stat("foo").await), ErrorKind::NotExist);
}

async fn remove_missing(fs: &dyn Fs) {
    let err = fs.remove("not-exists").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotExist);
    assert_eq!(err.path(), Some("not-exists"));
}

// ============================================================================
// Links
// ============================================================================

async fn hard_link(fs: &dyn Fs) {
    put(fs, "foo", D).await;
    fs.link("foo", "bar").await.unwrap();
    assert_eq!(fs.stat("bar").await.unwrap().num_link, 2);

    let mut f = fs.open_file("bar", OpenFlag::WRITE | OpenFlag::APPEND, 0).await.unwrap();
    f.write(&Span::from("!")).await.unwrap();
    f.close().await.unwrap();
    assert_eq!(get(fs, "foo").await, [D, b"!".as_slice()].concat());

    fs.remove("foo").await.unwrap();
    assert_eq!(get(fs, "bar").await, [D, b"!".as_slice()].concat());
    assert_eq!(fs.stat("bar").await.unwrap().num_link, 1);

    assert_eq!(kind(fs.link("nope", "x").await), ErrorKind::NotExist);
    put(fs, "baz", D).await;
    assert_eq!(kind(fs.link("bar", "baz").await), ErrorKind::Exist);
    fs.mkdir("dir", MODE).await.unwrap();
    assert_eq!(kind(fs.link("dir", "dir2").await), ErrorKind::IsDirectory);
}

async fn symbolic_links(fs: &dyn Fs) {
    fs.mkdir_all("a/b", MODE).await.unwrap();
    put(fs, "a/b/f", D).await;
    fs.symlink("b/f", "a/rel").await.unwrap();
    fs.symlink("b", "a/dir").await.unwrap();

    assert_eq!(get(fs, "a/rel").await, D);
    assert_eq!(get(fs, "a/dir/f").await, D);
    assert_eq!(fs.read_link("a/rel").await.unwrap(), "b/f");

    let info = fs.lstat("a/rel").await.unwrap();
    assert!(info.is_symlink());
    assert_eq!(info.size, 3);
    assert_eq!(fs.stat("a/rel").await.unwrap().size, D.len() as u64);

    // Writing through the link reaches the target.
    put(fs, "a/rel", b"new").await;
    assert_eq!(get(fs, "a/b/f").await, b"new");

    // Removing the link leaves the target alone.
    fs.remove("a/rel").await.unwrap();
    assert!(fs.stat("a/b/f").await.is_ok());

    assert_eq!(kind(fs.symlink("x", "a/dir").await), ErrorKind::Exist);
    assert_eq!(kind(fs.read_link("a/b/f").await), ErrorKind::InvalidArgument);
}

async fn dangling_symbolic_link(fs: &dyn Fs) {
    fs.symlink("nowhere", "link").await.unwrap();
    assert_eq!(kind(fs.stat("link").await), ErrorKind::NotExist);
    assert!(fs.lstat("link").await.unwrap().is_symlink());

    // Creating through a dangling link creates the target.
    put(fs, "link", D).await;
    assert_eq!(get(fs, "nowhere").await, D);
}

async fn empty_symbolic_link(fs: &dyn Fs) {
    fs.mkdir("foo", MODE).await.unwrap();
    fs.symlink("", "foo/empty").await.unwrap();
    assert_eq!(kind(fs.stat("foo/empty").await), ErrorKind::NotExist);
    assert_eq!(kind(fs.open("foo/empty").await), ErrorKind::NotExist);
    assert_eq!(kind(fs.create("foo/empty").await), ErrorKind::NotExist);
    assert_eq!(fs.read_link("foo/empty").await.unwrap(), "");
    // Nothing leaked into the parent.
    assert_eq!(fs.read_dir("foo").await.unwrap().len(), 1);
}

async fn symbolic_link_cycle(fs: &dyn Fs) {
    fs.symlink("b", "a").await.unwrap();
    fs.symlink("a", "b").await.unwrap();
    assert_eq!(kind(fs.stat("a").await), ErrorKind::Loop);
    assert_eq!(kind(fs.open("a/x").await), ErrorKind::Loop);
}

async fn root_is_protected(fs: &dyn Fs) {
    assert!(fs.stat("/").await.unwrap().is_dir());
    assert_eq!(kind(fs.remove("/").await), ErrorKind::InvalidArgument);
    assert_eq!(kind(fs.mkdir(".", MODE).await), ErrorKind::Exist);
}

// ============================================================================
// Instantiation
// ============================================================================

macro_rules! backend_suite {
    ($($case:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $case() {
                    let f = super::memory().await;
                    super::$case(f.fs.as_ref()).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $case() {
                    let f = super::sqlite().await;
                    super::$case(f.fs.as_ref()).await;
                }
            )*
        }

        mod sub_view {
            $(
                #[tokio::test]
                async fn $case() {
                    let f = super::sub_memory().await;
                    super::$case(f.fs.as_ref()).await;
                }
            )*
        }
    };
}

backend_suite!(
    create_then_read,
    create_in_directory,
    readers_have_independent_cursors,
    open_missing_file,
    open_directory,
    open_through_file_is_not_directory,
    handle_stat_tracks_writes,
    read_only_handle_rejects_writes,
    flag_read,
    flag_read_write,
    flag_append,
    flag_trunc,
    flag_at_end,
    flag_write_creates_and_replaces,
    flag_write_replaces_busy_file,
    flag_busy,
    flag_second_rw_busy,
    reader_sees_writer,
    flag_no_replace,
    empty_flag_means_read,
    large_file_in_parts,
    large_file_at_once,
    overwrite_before_close,
    overwrite_after_close,
    seek_across_blocks,
    mkdir_all_nested,
    mkdir_errors,
    mkdir_zero_mode_gets_default,
    read_dir_lists_children,
    rename_file_to_new_name,
    rename_file_over_file,
    rename_file_over_directory,
    rename_directory,
    rename_directory_over_file,
    rename_directory_over_empty_directory,
    rename_directory_over_non_empty_directory,
    rename_into_itself,
    rename_missing,
    rename_between_directories,
    remove_file,
    remove_directories,
    remove_missing,
    hard_link,
    symbolic_links,
    dangling_symbolic_link,
    empty_symbolic_link,
    symbolic_link_cycle,
);

// Only meaningful on an unwrapped backend: a sub view never exposes the
// wrapped root.
#[tokio::test]
async fn memory_root_is_protected() {
    let f = memory().await;
    root_is_protected(f.fs.as_ref()).await;
}

#[tokio::test]
async fn sqlite_root_is_protected() {
    let f = sqlite().await;
    root_is_protected(f.fs.as_ref()).await;
}
