//! Filesystem-callback adapter: translates mount callbacks into core calls.
//!
//! The adapter surface (`attr`, `readdir`, `read_at`) always compiles and is
//! testable without any system library. The libfuse binding itself lives
//! behind the `fuse` cargo feature; mounts run in the foreground on a single
//! thread, matching the session's single-threaded model.

use crate::dir::DirectoryEntry;
use crate::error::{FsError, Result};
use crate::path;
use crate::session::FileSystem;

/// Whether callbacks re-open and re-parse the image before serving.
///
/// `Always` tolerates a backing image that changes between calls, at the
/// cost of a full header decode and root enumeration per callback. Refresh
/// is atomic: on failure the previous state stays usable and the callback
/// fails with `Transient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// Attributes reported for one node.
#[derive(Debug, Clone)]
pub struct FileAttributes {
    pub kind: FileKind,
    pub mode: u16,
    pub nlink: u32,
    pub size: u64,
    /// Last modification, seconds since the Unix epoch.
    pub mtime: i64,
    /// Creation, seconds since the Unix epoch.
    pub ctime: i64,
}

/// One name in a directory listing, with the kind the lister needs.
#[derive(Debug, Clone)]
pub struct DirEntryName {
    pub name: String,
    pub kind: FileKind,
}

/// The adapter over an open session.
pub struct Fat32Fuse {
    fs: FileSystem,
    policy: RefreshPolicy,
}

impl Fat32Fuse {
    pub fn new(fs: FileSystem, policy: RefreshPolicy) -> Self {
        Fat32Fuse { fs, policy }
    }

    fn maybe_refresh(&mut self) -> Result<()> {
        match self.policy {
            RefreshPolicy::Always => self.fs.refresh(),
            RefreshPolicy::Never => Ok(()),
        }
    }

    /// Attributes of the node a path names. The root is reported without
    /// consulting the image: directory, mode 0755, two links.
    pub fn attr(&mut self, path: &str) -> Result<FileAttributes> {
        log::trace!("attr: {path}");
        if path::normalize(path).is_empty() {
            return Ok(FileAttributes {
                kind: FileKind::Directory,
                mode: 0o755,
                nlink: 2,
                size: 0,
                mtime: 0,
                ctime: 0,
            });
        }
        self.maybe_refresh()?;
        let entry = self.fs.find_entry(path)?;
        Ok(entry_attributes(&entry))
    }

    /// Names in the directory a path names. The root listing is prefixed
    /// with `.` and `..` (subdirectories carry their own dot entries on
    /// disk).
    pub fn readdir(&mut self, path: &str) -> Result<Vec<DirEntryName>> {
        log::trace!("readdir: {path}");
        self.maybe_refresh()?;
        let mut names = Vec::new();
        if path::normalize(path).is_empty() {
            for dot in [".", ".."] {
                names.push(DirEntryName { name: dot.to_string(), kind: FileKind::Directory });
            }
        }
        self.fs.change_directory(path)?;
        for entry in self.fs.current_entries() {
            names.push(DirEntryName {
                name: entry.name.clone(),
                kind: if entry.is_directory() {
                    FileKind::Directory
                } else {
                    FileKind::RegularFile
                },
            });
        }
        Ok(names)
    }

    /// Read file bytes into `buf` starting at `offset`. The window is
    /// clamped to the file size.
    pub fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        log::trace!("read: {path} offset {offset} len {}", buf.len());
        self.maybe_refresh()?;
        let entry = self.fs.find_entry(path)?;
        if entry.is_directory() {
            return Err(FsError::IsADirectory);
        }
        self.fs.read_at(&entry, offset, buf)
    }
}

fn entry_attributes(entry: &DirectoryEntry) -> FileAttributes {
    let (kind, mode) = if entry.is_directory() {
        (FileKind::Directory, 0o555)
    } else {
        (FileKind::RegularFile, 0o444)
    };
    FileAttributes {
        kind,
        mode,
        nlink: 1,
        size: entry.size as u64,
        mtime: entry.modification_datetime().to_timestamp(),
        ctime: entry.creation_datetime().to_timestamp(),
    }
}

/// Map a core error onto the platform error number used at the mount
/// boundary.
#[cfg(feature = "fuse")]
pub fn error_number(err: &FsError) -> i32 {
    match err {
        FsError::NotFound => libc::ENOENT,
        FsError::NotADirectory => libc::ENOTDIR,
        FsError::IsADirectory => libc::EISDIR,
        FsError::Transient => libc::EAGAIN,
        FsError::Io(_) | FsError::InvalidImage(_) | FsError::BadCluster(_) => libc::EIO,
    }
}

#[cfg(feature = "fuse")]
mod mounted {
    use super::*;
    use fuser::{
        FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory,
        ReplyEntry, Request,
    };
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::path::Path;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    const TTL: Duration = Duration::from_secs(1);
    const ROOT_INO: u64 = 1;

    /// Paths interned as inode numbers for the kernel protocol. The core is
    /// path-based; inode 1 is the root (the empty path).
    struct InodeTable {
        paths: HashMap<u64, String>,
        inos: HashMap<String, u64>,
        next: u64,
    }

    impl InodeTable {
        fn new() -> Self {
            let mut table = InodeTable {
                paths: HashMap::new(),
                inos: HashMap::new(),
                next: ROOT_INO + 1,
            };
            table.paths.insert(ROOT_INO, String::new());
            table.inos.insert(String::new(), ROOT_INO);
            table
        }

        fn path(&self, ino: u64) -> Option<&str> {
            self.paths.get(&ino).map(String::as_str)
        }

        fn intern(&mut self, path: String) -> u64 {
            if let Some(&ino) = self.inos.get(&path) {
                return ino;
            }
            let ino = self.next;
            self.next += 1;
            self.paths.insert(ino, path.clone());
            self.inos.insert(path, ino);
            ino
        }
    }

    fn join(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        }
    }

    fn epoch(seconds: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(seconds.max(0) as u64)
    }

    fn to_fuse_attr(ino: u64, attr: &FileAttributes) -> FileAttr {
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: epoch(attr.mtime),
            mtime: epoch(attr.mtime),
            ctime: epoch(attr.ctime),
            crtime: epoch(attr.ctime),
            kind: match attr.kind {
                FileKind::Directory => FileType::Directory,
                FileKind::RegularFile => FileType::RegularFile,
            },
            perm: attr.mode,
            nlink: attr.nlink,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    pub struct MountedFs {
        adapter: Fat32Fuse,
        inodes: InodeTable,
    }

    impl Filesystem for MountedFs {
        fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let Some(parent_path) = self.inodes.path(parent).map(String::from) else {
                reply.error(libc::ENOENT);
                return;
            };
            let Some(name) = name.to_str() else {
                reply.error(libc::ENOENT);
                return;
            };
            let path = join(&parent_path, name);
            match self.adapter.attr(&path) {
                Ok(attr) => {
                    let ino = self.inodes.intern(path);
                    reply.entry(&TTL, &to_fuse_attr(ino, &attr), 0);
                }
                Err(err) => reply.error(error_number(&err)),
            }
        }

        fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
            let Some(path) = self.inodes.path(ino).map(String::from) else {
                reply.error(libc::ENOENT);
                return;
            };
            match self.adapter.attr(&path) {
                Ok(attr) => reply.attr(&TTL, &to_fuse_attr(ino, &attr)),
                Err(err) => reply.error(error_number(&err)),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request<'_>,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let Some(path) = self.inodes.path(ino).map(String::from) else {
                reply.error(libc::ENOENT);
                return;
            };
            let names = match self.adapter.readdir(&path) {
                Ok(names) => names,
                Err(err) => {
                    reply.error(error_number(&err));
                    return;
                }
            };
            for (i, entry) in names.iter().enumerate().skip(offset.max(0) as usize) {
                let child_ino = match entry.name.as_str() {
                    "." => ino,
                    ".." => ROOT_INO,
                    name => self.inodes.intern(join(&path, name)),
                };
                let kind = match entry.kind {
                    FileKind::Directory => FileType::Directory,
                    FileKind::RegularFile => FileType::RegularFile,
                };
                if reply.add(child_ino, (i + 1) as i64, kind, &entry.name) {
                    break;
                }
            }
            reply.ok();
        }

        fn read(
            &mut self,
            _req: &Request<'_>,
            ino: u64,
            _fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: ReplyData,
        ) {
            let Some(path) = self.inodes.path(ino).map(String::from) else {
                reply.error(libc::ENOENT);
                return;
            };
            let mut buf = vec![0u8; size as usize];
            match self.adapter.read_at(&path, offset.max(0) as u64, &mut buf) {
                Ok(n) => reply.data(&buf[..n]),
                Err(err) => reply.error(error_number(&err)),
            }
        }
    }

    /// Mount the session read-only at `mountpoint`, foreground and
    /// single-threaded. Blocks until unmounted.
    pub fn mount(fs: FileSystem, mountpoint: &Path, policy: RefreshPolicy) -> Result<()> {
        let mounted = MountedFs {
            adapter: Fat32Fuse::new(fs, policy),
            inodes: InodeTable::new(),
        };
        let options = [MountOption::RO, MountOption::FSName("fat32".to_string())];
        fuser::mount2(mounted, mountpoint, &options).map_err(FsError::Io)
    }
}

#[cfg(feature = "fuse")]
pub use mounted::mount;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testimg::{temp_image, ImageBuilder};

    fn adapter(policy: RefreshPolicy) -> (Fat32Fuse, crate::testimg::TempImage) {
        let mut builder = ImageBuilder::new();
        builder.add_file83(2, b"A       TXT", b"alpha");
        let dir1 = builder.add_dir(2, b"DIR1       ");
        builder.add_file83(dir1, b"INNER   BIN", b"0123456789");
        let image = temp_image(&builder.into_bytes());
        let fs = FileSystem::open(&image.path).unwrap();
        (Fat32Fuse::new(fs, policy), image)
    }

    #[test]
    fn root_attributes_are_synthesized() {
        let (mut fuse, _image) = adapter(RefreshPolicy::Never);
        let attr = fuse.attr("/").unwrap();
        assert_eq!(attr.kind, FileKind::Directory);
        assert_eq!(attr.mode, 0o755);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn file_and_directory_attributes() {
        let (mut fuse, _image) = adapter(RefreshPolicy::Never);
        let file = fuse.attr("/A.TXT").unwrap();
        assert_eq!(file.kind, FileKind::RegularFile);
        assert_eq!(file.mode, 0o444);
        assert_eq!(file.nlink, 1);
        assert_eq!(file.size, 5);
        assert_eq!(file.mtime, 1_684_326_896); // fixture timestamp
        assert_eq!(file.ctime, 1_684_326_896);

        let dir = fuse.attr("/DIR1").unwrap();
        assert_eq!(dir.kind, FileKind::Directory);
        assert_eq!(dir.mode, 0o555);

        assert!(matches!(fuse.attr("/MISSING"), Err(FsError::NotFound)));
    }

    #[test]
    fn readdir_lists_dots_then_entries() {
        let (mut fuse, _image) = adapter(RefreshPolicy::Never);
        let names: Vec<String> =
            fuse.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, [".", "..", "A.TXT", "DIR1"]);

        let inner: Vec<String> =
            fuse.readdir("/DIR1").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(inner, [".", "..", "INNER.BIN"]);

        assert!(matches!(fuse.readdir("/A.TXT"), Err(FsError::NotADirectory)));
    }

    #[test]
    fn read_clamps_and_rejects_directories() {
        let (mut fuse, _image) = adapter(RefreshPolicy::Never);
        let mut buf = [0u8; 16];
        let n = fuse.read_at("/DIR1/INNER.BIN", 4, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"456789");
        assert!(matches!(fuse.read_at("/DIR1", 0, &mut buf), Err(FsError::IsADirectory)));
        assert_eq!(fuse.read_at("/DIR1/INNER.BIN", 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn always_policy_surfaces_refresh_failures_as_transient() {
        let (mut fuse, image) = adapter(RefreshPolicy::Always);
        std::fs::remove_file(&image.path).unwrap();
        assert!(matches!(fuse.attr("/A.TXT"), Err(FsError::Transient)));
    }

    #[test]
    fn always_policy_reparses_per_call() {
        let (mut fuse, image) = adapter(RefreshPolicy::Always);
        let mut grown = ImageBuilder::new();
        grown.add_file83(2, b"A       TXT", b"alpha");
        grown.add_dir(2, b"DIR1       ");
        grown.add_file83(2, b"LATE    TXT", b"zz");
        std::fs::write(&image.path, grown.into_bytes()).unwrap();
        let attr = fuse.attr("/LATE.TXT").unwrap();
        assert_eq!(attr.size, 2);
    }
}
