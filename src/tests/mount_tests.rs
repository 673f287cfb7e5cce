#[cfg(test)]
pub mod mount_tests {
    use super::super::*;
    use crate::interface::{self, Errno, MemoryHostFs, MemoryKvStore, MemoryRangeSource};
    use crate::safeposix::mount_manager::{MountError, MountManager};
    use crate::safeposix::mounts::{HostFsMount, KvMount, MemMount, Mount, RangeMount};
    use crate::safeposix::syscalls::fs_constants::*;
    use std::sync::mpsc;
    use std::thread;

    fn memmount() -> interface::RustRfc<dyn Mount> {
        interface::RustRfc::new(MemMount::new())
    }

    fn manager_with_nested() -> MountManager {
        setup_logging();
        let root = memmount();
        root.mkdir("usr", S_IRWXA).unwrap();
        root.mkdir("usr/local", S_IRWXA).unwrap();
        let manager = MountManager::new();
        manager.add_mount(root, "/").unwrap();
        manager.add_mount(memmount(), "/usr/local/mount2").unwrap();
        manager
    }

    #[test]
    pub fn ut_mount_routing() {
        let manager = manager_with_nested();

        let (mp, rest) = manager.get_mount("/usr/local/mount2/x").unwrap();
        assert_eq!(mp.path(), "/usr/local/mount2");
        assert_eq!(rest, "/x");

        let (mp, rest) = manager.get_mount("/usr/local/other").unwrap();
        assert_eq!(mp.path(), "/");
        assert_eq!(rest, "usr/local/other");

        let (mp, rest) = manager.get_mount("/usr/local/mount2").unwrap();
        assert_eq!(mp.path(), "/usr/local/mount2");
        assert_eq!(rest, "/");

        // a shared name prefix is not a path prefix
        let (mp, _) = manager.get_mount("/usr/local/mount22").unwrap();
        assert_eq!(mp.path(), "/");

        let (mp, st) = manager.get_node("/usr/local").unwrap();
        assert_eq!(mp.path(), "/");
        assert!(is_dir(st.st_mode));
        assert_eq!(manager.get_node("/usr/local/mount2/x").err(), Some(Errno::ENOENT));
        assert!(manager.get_node("/usr/local/mount2").is_ok());
    }

    #[test]
    pub fn ut_mount_errors() {
        let manager = manager_with_nested();

        assert_eq!(manager.add_mount(memmount(), ""), Err(MountError::BadPath));
        assert_eq!(manager.add_mount(memmount(), "relative/path"), Err(MountError::BadPath));
        assert_eq!(manager.add_mount(memmount(), "/"), Err(MountError::AlreadyMounted));
        assert_eq!(
            manager.add_mount(memmount(), "/usr/local/mount2/"),
            Err(MountError::AlreadyMounted)
        );
        assert_eq!(manager.add_mount(memmount(), "/missing/dir"), Err(MountError::ParentMissing));

        assert_eq!(MountError::AlreadyMounted.code(), -1);
        assert_eq!(MountError::BadPath.code(), -3);
        assert_eq!(MountError::ParentMissing.code(), -4);
        assert_eq!(MountError::BadPath.errno(), Errno::EINVAL);
    }

    #[test]
    pub fn ut_mount_refs() {
        let manager = manager_with_nested();

        // the child mount holds its parent
        let (root, _) = manager.get_mount("/").unwrap();
        assert_eq!(root.ref_count(), 1);
        assert_eq!(manager.remove_mount("/"), Err(Errno::EBUSY));

        let (child, _) = manager.get_mount("/usr/local/mount2").unwrap();
        child.ref_mount();
        assert_eq!(manager.remove_mount("/usr/local/mount2"), Err(Errno::EBUSY));
        child.unref_mount();
        manager.remove_mount("/usr/local/mount2").unwrap();
        assert_eq!(root.ref_count(), 0);
        assert_eq!(manager.remove_mount("/usr/local/mount2"), Err(Errno::ENOENT));

        manager.remove_mount("/").unwrap();
        assert!(manager.get_mount("/anything").is_none());
        assert_eq!(manager.get_node("/").err(), Some(Errno::ENOENT));
    }

    // Parks the first lookup until the test lets it go.
    struct GatedMount {
        inner: MemMount,
        entered: interface::Mutex<Option<mpsc::Sender<()>>>,
        release: interface::Mutex<mpsc::Receiver<()>>,
    }

    impl Mount for GatedMount {
        fn get_node(&self, path: &str) -> Result<interface::StatData, Errno> {
            if let Some(entered) = self.entered.lock().take() {
                entered.send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
            self.inner.get_node(path)
        }

        fn ref_node(&self, node: interface::NodeId) {
            self.inner.ref_node(node)
        }

        fn unref_node(&self, node: interface::NodeId) {
            self.inner.unref_node(node)
        }

        fn stat(&self, node: interface::NodeId) -> Result<interface::StatData, Errno> {
            self.inner.stat(node)
        }
    }

    #[test]
    pub fn ut_mount_busy_during_open() {
        let kernel = test_kernel();
        kernel.mkdir_syscall("/m", S_IRWXA).unwrap();
        let inner = MemMount::new();
        inner.creat("/f", 0o644).unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated = GatedMount {
            inner,
            entered: interface::Mutex::new(Some(entered_tx)),
            release: interface::Mutex::new(release_rx),
        };
        kernel.mount_syscall(interface::RustRfc::new(gated), "/m").unwrap();

        thread::scope(|s| {
            let opener = s.spawn(|| kernel.open_syscall("/m/f", O_RDONLY, 0));
            entered_rx.recv().unwrap();
            // the lookup is still running, yet the mount already counts as busy
            assert_eq!(kernel.umount_syscall("/m"), Err(Errno::EBUSY));
            release_tx.send(()).unwrap();
            let fd = opener.join().unwrap().unwrap();
            assert_eq!(kernel.umount_syscall("/m"), Err(Errno::EBUSY));
            kernel.close_syscall(fd).unwrap();
        });

        // a failed open gives its reference back
        assert_eq!(kernel.open_syscall("/m/missing", O_RDONLY, 0), Err(Errno::ENOENT));
        let (mp, _) = kernel.mount_manager().get_mount("/m").unwrap();
        assert_eq!(mp.ref_count(), 0);
        {
            let (held, rest) = kernel.mount_manager().get_mount_ref("/m/f").unwrap();
            assert_eq!(rest, "/f");
            assert_eq!(held.ref_count(), 1);
        }
        assert_eq!(mp.ref_count(), 0);
        kernel.umount_syscall("/m").unwrap();
    }

    #[test]
    pub fn ut_mount_root_paths() {
        let manager = manager_with_nested();

        assert!(manager.in_mount_root_path("/"));
        assert!(manager.in_mount_root_path("/usr"));
        assert!(manager.in_mount_root_path("/usr/local"));
        assert!(manager.in_mount_root_path("/usr/local/mount2"));
        assert!(!manager.in_mount_root_path("/usr/lib"));
        assert!(!manager.in_mount_root_path("/usr/local/mount2/x"));

        assert_eq!(manager.mount_paths(), vec!["/".to_string(), "/usr/local/mount2".to_string()]);
        manager.clear_mounts();
        assert!(manager.mount_paths().is_empty());
        assert!(!manager.in_mount_root_path("/"));
    }

    #[test]
    pub fn ut_mount_range() {
        let kernel = test_kernel();

        let source = interface::RustRfc::new(MemoryRangeSource::new(kernel.coordinator().clone()));
        let data: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
        source.insert("/data/file.bin", data.clone());

        let range = interface::RustRfc::new(RangeMount::new(kernel.coordinator().clone(), source.clone()));
        range.add_dir("/data").unwrap();
        range.add_file("/data/file.bin", 200).unwrap();
        range.add_file("/data/missing.bin", 10).unwrap();
        assert_eq!(range.add_file("/data/file.bin", 1), Err(Errno::EEXIST));
        assert_eq!(range.add_file("/nodir/file", 1), Err(Errno::ENOENT));

        kernel.mkdir_syscall("/remote", S_IRWXA).unwrap();
        kernel.mount_syscall(range.clone(), "/remote").unwrap();

        let fd = kernel.open_syscall("/remote/data/file.bin", O_RDONLY, 0).unwrap();
        assert_eq!(kernel.fstat_syscall(fd).unwrap().st_size, 200);
        let mut buf = sizecbuf(100);
        assert_eq!(kernel.read_syscall(fd, &mut buf).unwrap(), 100);
        assert_eq!(&buf[..], &data[..100]);
        assert_eq!(kernel.lseek_syscall(fd, 150, SEEK_SET).unwrap(), 150);
        assert_eq!(kernel.read_syscall(fd, &mut buf).unwrap(), 50);
        assert_eq!(&buf[..50], &data[150..]);
        assert_eq!(kernel.read_syscall(fd, &mut buf).unwrap(), 0);

        // declared, but the host has no such file
        assert_eq!(kernel.open_syscall("/remote/data/missing.bin", O_RDONLY, 0), Err(Errno::EIO));
        assert_eq!(kernel.open_syscall("/remote/data/other.bin", O_RDONLY, 0), Err(Errno::ENOENT));
        assert_eq!(
            kernel.open_syscall("/remote/data/new.bin", O_CREAT | O_RDWR, S_IRWXA),
            Err(Errno::ENOSYS)
        );

        let dirfd = kernel.open_syscall("/remote/data", O_RDONLY, 0).unwrap();
        let names: Vec<String> = kernel
            .getdents_syscall(dirfd, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.d_name)
            .collect();
        assert_eq!(names, vec!["file.bin", "missing.bin"]);
    }

    #[test]
    pub fn ut_mount_kv() {
        let kernel = test_kernel();

        let store = interface::RustRfc::new(MemoryKvStore::new(kernel.coordinator().clone()));
        store.set_value("/existing", b"old");
        let kv = interface::RustRfc::new(KvMount::new(kernel.coordinator().clone(), store.clone()));
        kernel.mkdir_syscall("/kv", S_IRWXA).unwrap();
        kernel.mount_syscall(kv.clone(), "/kv").unwrap();

        let fd = kernel.open_syscall("/kv/existing", O_RDWR, 0).unwrap();
        let mut buf = sizecbuf(3);
        assert_eq!(kernel.read_syscall(fd, &mut buf).unwrap(), 3);
        assert_eq!(cbuf2str(&buf), "old");
        assert_eq!(
            kernel.open_syscall("/kv/existing", O_CREAT | O_EXCL | O_RDWR, S_IRWXA),
            Err(Errno::EEXIST)
        );
        assert_eq!(kernel.open_syscall("/kv/absent", O_RDONLY, 0), Err(Errno::ENOENT));

        let newfd = kernel.open_syscall("/kv/new", O_CREAT | O_RDWR, S_IRWXA).unwrap();
        assert_eq!(kernel.write_syscall(newfd, b"fresh").unwrap(), 5);
        // writes stay local until pushed
        assert_eq!(store.value("/new"), None);
        kernel.fsync_syscall(newfd).unwrap();
        assert_eq!(store.value("/new"), Some(b"fresh".to_vec()));

        assert_eq!(kernel.write_syscall(newfd, b"!").unwrap(), 1);
        kernel.close_syscall(newfd).unwrap();
        // the last close pushes the whole value
        assert_eq!(store.value("/new"), Some(b"fresh!".to_vec()));

        let rootfd = kernel.open_syscall("/kv", O_RDONLY, 0).unwrap();
        let names: Vec<String> = kernel
            .getdents_syscall(rootfd, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.d_name)
            .collect();
        assert_eq!(names, vec!["existing", "new"]);

        kernel.close_syscall(fd).unwrap();
        kernel.close_syscall(rootfd).unwrap();
        assert_eq!(kv.resident(), 0);
        assert_eq!(store.value("/existing"), Some(b"old".to_vec()));
    }

    #[test]
    pub fn ut_mount_kv_lookups_unload() {
        let kernel = test_kernel();
        let store = interface::RustRfc::new(MemoryKvStore::new(kernel.coordinator().clone()));
        store.set_value("/k", b"one");
        let kv = interface::RustRfc::new(KvMount::new(kernel.coordinator().clone(), store.clone()));
        kernel.mkdir_syscall("/kv", S_IRWXA).unwrap();
        kernel.mount_syscall(kv.clone(), "/kv").unwrap();

        // path-only calls leave nothing loaded behind
        assert_eq!(kernel.stat_syscall("/kv/k").unwrap().st_size, 3);
        assert_eq!(kv.resident(), 0);
        kernel.access_syscall("/kv/k", R_OK).unwrap();
        assert_eq!(kernel.chdir_syscall("/kv/k"), Err(Errno::ENOTDIR));
        assert_eq!(kv.resident(), 0);

        // so the next lookup sees a remote update
        store.set_value("/k", b"three");
        assert_eq!(kernel.stat_syscall("/kv/k").unwrap().st_size, 5);

        let fd = kernel.open_syscall("/kv/k", O_RDONLY, 0).unwrap();
        assert_eq!(kv.resident(), 1);
        kernel.stat_syscall("/kv/k").unwrap();
        assert_eq!(kv.resident(), 1);
        kernel.close_syscall(fd).unwrap();
        assert_eq!(kv.resident(), 0);
        assert_eq!(store.value("/k"), Some(b"three".to_vec()));
    }

    #[test]
    pub fn ut_mount_hostfs() {
        let kernel = test_kernel();
        let host = interface::RustRfc::new(MemoryHostFs::new(kernel.coordinator().clone()));
        host.add_dir("/persistent");
        host.set_contents("/persistent/saved", b"state");
        let hostfs = interface::RustRfc::new(HostFsMount::new(
            kernel.coordinator().clone(),
            host.clone(),
            "/persistent",
        ));
        kernel.mkdir_syscall("/home", S_IRWXA).unwrap();
        kernel.mount_syscall(hostfs.clone(), "/home").unwrap();

        let fd = kernel.open_syscall("/home/saved", O_RDWR, 0).unwrap();
        assert_eq!(hostfs.open_files(), 1);
        assert_eq!(host.open_handles(), 1);
        assert_eq!(kernel.fstat_syscall(fd).unwrap().st_size, 5);
        let mut buf = sizecbuf(5);
        assert_eq!(kernel.read_syscall(fd, &mut buf).unwrap(), 5);
        assert_eq!(cbuf2str(&buf), "state");

        // writes go straight through to the host
        assert_eq!(kernel.write_syscall(fd, b"!").unwrap(), 1);
        assert_eq!(host.contents("/persistent/saved"), Some(b"state!".to_vec()));
        kernel.fsync_syscall(fd).unwrap();
        assert_eq!(host.flushes(), 1);

        let newfd = kernel
            .open_syscall("/home/notes", O_CREAT | O_EXCL | O_RDWR, S_IRWXA)
            .unwrap();
        assert_eq!(host.contents("/persistent/notes"), Some(Vec::new()));
        assert_eq!(kernel.write_syscall(newfd, b"hi").unwrap(), 2);
        assert_eq!(host.contents("/persistent/notes"), Some(b"hi".to_vec()));
        assert_eq!(
            kernel.open_syscall("/home/notes", O_CREAT | O_EXCL | O_RDWR, S_IRWXA),
            Err(Errno::EEXIST)
        );
        assert_eq!(kernel.open_syscall("/home/absent", O_RDONLY, 0), Err(Errno::ENOENT));

        kernel.mkdir_syscall("/home/sub", S_IRWXA).unwrap();
        assert_eq!(kernel.mkdir_syscall("/home/sub", S_IRWXA), Err(Errno::EEXIST));
        assert!(is_dir(kernel.stat_syscall("/home/sub").unwrap().st_mode));
        let rootfd = kernel.open_syscall("/home", O_RDONLY, 0).unwrap();
        let names: Vec<String> = kernel
            .getdents_syscall(rootfd, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.d_name)
            .collect();
        assert_eq!(names, vec!["notes", "saved", "sub"]);

        // sizes come from the host on every stat
        assert_eq!(kernel.stat_syscall("/home/saved").unwrap().st_size, 6);
        assert_eq!(hostfs.open_files(), 2);

        kernel.close_syscall(fd).unwrap();
        kernel.close_syscall(newfd).unwrap();
        kernel.close_syscall(rootfd).unwrap();
        assert_eq!(hostfs.open_files(), 0);
        assert_eq!(host.open_handles(), 0);

        // a lookup alone does not leave the host file open
        assert_eq!(kernel.stat_syscall("/home/notes").unwrap().st_size, 2);
        assert_eq!(host.open_handles(), 0);

        kernel.umount_syscall("/home").unwrap();
    }
}
