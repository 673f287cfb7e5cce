// Kernel proxy bring-up and teardown

use crate::config::KernelConfig;
use crate::interface::{self, Coordinator, Errno, HostNetwork};
use crate::safeposix::kernel::KernelProxy;
use crate::safeposix::mounts::{ConsoleMount, DevMount, MemMount, Mount};
use crate::safeposix::syscalls::fs_constants::*;

/// Builds a kernel proxy from `config`: an in-memory root, the device mount
/// at `/dev` and the process console at `/dev/fd`, with descriptors 0, 1 and
/// 2 open on the console.
pub fn kernelinit(
    config: KernelConfig,
    coordinator: Coordinator,
    network: interface::RustRfc<dyn HostNetwork>,
) -> Result<KernelProxy, Errno> {
    kernelinit_with_console(config, coordinator, network, None)
}

/// Like [`kernelinit`], with `console` standing in for the process streams.
pub fn kernelinit_with_console(
    config: KernelConfig,
    coordinator: Coordinator,
    network: interface::RustRfc<dyn HostNetwork>,
    console: Option<ConsoleMount>,
) -> Result<KernelProxy, Errno> {
    let kernel = KernelProxy::new(config, coordinator, network);

    let root: interface::RustRfc<dyn Mount> = interface::RustRfc::new(MemMount::new());
    kernel.mount_syscall(root, "/")?;

    // the working directory has to exist before anything is opened relative to it
    let cwd = kernel.getwd_syscall()?;
    if cwd != "/" {
        let mut prefix = String::new();
        for comp in cwd.split('/').filter(|c| !c.is_empty()) {
            prefix.push('/');
            prefix.push_str(comp);
            match kernel.mkdir_syscall(&prefix, S_IRWXA) {
                Ok(()) | Err(Errno::EEXIST) => {}
                Err(e) => return Err(e),
            }
        }
    }

    if kernel.config.dev_mount || kernel.config.console {
        let dev: interface::RustRfc<dyn Mount> = interface::RustRfc::new(DevMount::new());
        kernel.mount_syscall(dev, "/dev")?;
    }

    if kernel.config.console {
        let console: interface::RustRfc<dyn Mount> =
            interface::RustRfc::new(console.unwrap_or_default());
        kernel.mount_syscall(console, "/dev/fd")?;
        // lowest free descriptor each time, so these land on 0, 1 and 2
        kernel.open_syscall("/dev/fd/0", O_RDONLY, 0)?;
        kernel.open_syscall("/dev/fd/1", O_WRONLY, 0)?;
        kernel.open_syscall("/dev/fd/2", O_WRONLY, 0)?;
    }

    log::info!(
        "kernel proxy initialized with mounts {:?}",
        kernel.mount_manager().mount_paths()
    );
    Ok(kernel)
}

/// Closes every descriptor, then drops every mount.
pub fn kernelfinalize(kernel: &KernelProxy) {
    kernel.close_all();
    kernel.mount_manager().clear_mounts();
    log::info!("kernel proxy finalized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::LoopbackNetwork;

    fn network(coordinator: &Coordinator) -> interface::RustRfc<dyn HostNetwork> {
        interface::RustRfc::new(LoopbackNetwork::new(coordinator.clone()))
    }

    #[test]
    fn test_init_opens_console_descriptors() {
        let coordinator = Coordinator::new();
        let console = ConsoleMount::with_streams(
            Box::new(std::io::empty()),
            Box::new(std::io::sink()),
            Box::new(std::io::sink()),
        );
        let kernel = kernelinit_with_console(
            KernelConfig::default(),
            coordinator.clone(),
            network(&coordinator),
            Some(console),
        )
        .unwrap();
        assert_eq!(kernel.open_fds(), 3);
        assert_eq!(
            kernel.mount_manager().mount_paths(),
            vec!["/".to_string(), "/dev".to_string(), "/dev/fd".to_string()]
        );
        assert_eq!(kernel.write_syscall(1, b"hi").unwrap(), 2);
        assert!(kernel.isatty_syscall(2).unwrap());

        kernelfinalize(&kernel);
        assert_eq!(kernel.open_fds(), 0);
        assert!(kernel.mount_manager().mount_paths().is_empty());
    }

    #[test]
    fn test_init_without_devices() {
        let coordinator = Coordinator::new();
        let config = KernelConfig {
            dev_mount: false,
            console: false,
            initial_cwd: "/home/user".to_string(),
            ..KernelConfig::default()
        };
        let kernel = kernelinit(config, coordinator.clone(), network(&coordinator)).unwrap();
        assert_eq!(kernel.open_fds(), 0);
        assert_eq!(kernel.mount_manager().mount_paths(), vec!["/".to_string()]);
        assert_eq!(kernel.getwd_syscall().unwrap(), "/home/user");
        assert!(kernel.stat_syscall("/home/user").unwrap().st_mode & S_IFDIR != 0);
        kernelfinalize(&kernel);
    }
}
