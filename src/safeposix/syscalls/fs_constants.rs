// File system related constants
#![allow(dead_code)]

// Imported into fs_calls and every mount backend

pub const STARTINGFD: i32 = 0;
pub const MAXFD: i32 = 1024;
pub const MAXPATHLEN: usize = 256;
// largest file an in-memory backend will grow
pub const MAX_FILE_SIZE: usize = u32::MAX as usize;

pub const F_OK: u32 = 0;
pub const X_OK: u32 = 1;
pub const W_OK: u32 = 2;
pub const R_OK: u32 = 4;

pub const O_RDONLY: i32 = 0o0;
pub const O_WRONLY: i32 = 0o1;
pub const O_RDWR: i32 = 0o2;
pub const O_RDWRFLAGS: i32 = 0o3;

pub const O_CREAT: i32 = 0o100;
pub const O_EXCL: i32 = 0o200;
pub const O_TRUNC: i32 = 0o1000;
pub const O_APPEND: i32 = 0o2000;
pub const O_NONBLOCK: i32 = 0o4000;
pub const O_CLOEXEC: i32 = 0o2000000;

// flags F_SETFL is allowed to change
pub const SETFL_MASK: i32 = O_APPEND | O_NONBLOCK;

// ids reported by the in-memory tree
pub const DEFAULT_UID: u32 = 1001;
pub const DEFAULT_GID: u32 = 1002;
pub const DEFAULT_BLKSIZE: isize = 1024;

//Mode bits
pub const S_IRWXA: u32 = 0o777;
pub const S_IRWXU: u32 = 0o700;
pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IXUSR: u32 = 0o100;
pub const S_IRWXG: u32 = 0o070;
pub const S_IRWXO: u32 = 0o007;

//fcntl commands
pub const F_DUPFD: i32 = 0;
pub const F_GETFD: i32 = 1;
pub const F_SETFD: i32 = 2;
pub const F_GETFL: i32 = 3;
pub const F_SETFL: i32 = 4;

//File types
pub const S_IFCHR: u32 = 0o20000;
pub const S_IFDIR: u32 = 0o40000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_FILETYPEFLAGS: u32 = 0o170000;

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

//device numbers for the pseudo devices
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct DevNo {
    pub major: u32,
    pub minor: u32,
}
pub const NULLDEVNO: DevNo = DevNo { major: 1, minor: 3 };
pub const ZERODEVNO: DevNo = DevNo { major: 1, minor: 5 };
pub const RANDOMDEVNO: DevNo = DevNo { major: 1, minor: 8 };
pub const URANDOMDEVNO: DevNo = DevNo { major: 1, minor: 9 };

pub fn is_reg(mode: u32) -> bool {
    (mode & S_FILETYPEFLAGS) == S_IFREG
}

pub fn is_chr(mode: u32) -> bool {
    (mode & S_FILETYPEFLAGS) == S_IFCHR
}

pub fn is_dir(mode: u32) -> bool {
    (mode & S_FILETYPEFLAGS) == S_IFDIR
}

pub fn is_sock(mode: u32) -> bool {
    (mode & S_FILETYPEFLAGS) == S_IFSOCK
}

pub fn is_wronly(flags: i32) -> bool {
    (flags & O_RDWRFLAGS) == O_WRONLY
}
pub fn is_rdonly(flags: i32) -> bool {
    (flags & O_RDWRFLAGS) == O_RDONLY
}

//the same as the glibc makedev
pub fn makedev(dev: &DevNo) -> u64 {
    ((dev.major as u64 & 0x00000fff) << 8)
        | ((dev.major as u64 & 0xfffff000) << 32)
        | (dev.minor as u64 & 0x000000ff)
        | ((dev.minor as u64 & 0xffffff00) << 12)
}
