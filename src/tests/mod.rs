mod job_tests;
mod mount_tests;
mod networking_tests;

use std::ops::Deref;

use crate::config::KernelConfig;
use crate::interface::{self, Coordinator, CoordinatorThread, HostNetwork, LoopbackNetwork};
use crate::safeposix::dispatcher::{kernelfinalize, kernelinit};
use crate::safeposix::kernel::KernelProxy;

pub fn setup_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A kernel proxy with its own coordinator thread and loopback network.
pub struct TestKernel {
    kernel: KernelProxy,
    coordinator: CoordinatorThread,
}

impl TestKernel {
    pub fn coordinator(&self) -> &Coordinator {
        self.coordinator.coordinator()
    }

    /// Waits until every job queued so far on the coordinator has run.
    pub fn sync(&self) {
        assert_eq!(
            self.coordinator()
                .run_job(Box::new(|entry: interface::JobEntry| entry.finish(0))),
            0
        );
    }
}

impl Deref for TestKernel {
    type Target = KernelProxy;

    fn deref(&self) -> &KernelProxy {
        &self.kernel
    }
}

impl Drop for TestKernel {
    fn drop(&mut self) {
        kernelfinalize(&self.kernel);
    }
}

/// No console, so the first descriptor handed out is 0.
pub fn test_config() -> KernelConfig {
    KernelConfig {
        console: false,
        ..KernelConfig::default()
    }
}

pub fn kernel_with(config: KernelConfig) -> TestKernel {
    kernel_and_network(config).0
}

/// Also hands back the loopback, for seeding its hosts table.
pub fn kernel_and_network(config: KernelConfig) -> (TestKernel, interface::RustRfc<LoopbackNetwork>) {
    setup_logging();
    let coordinator = Coordinator::new();
    let thread = coordinator.spawn();
    let loopback = interface::RustRfc::new(LoopbackNetwork::new(coordinator.clone()));
    let network: interface::RustRfc<dyn HostNetwork> = loopback.clone();
    let kernel = kernelinit(config, coordinator, network).unwrap();
    let kernel = TestKernel {
        kernel,
        coordinator: thread,
    };
    (kernel, loopback)
}

pub fn test_kernel() -> TestKernel {
    kernel_with(test_config())
}

pub fn sizecbuf(size: usize) -> Box<[u8]> {
    vec![0u8; size].into_boxed_slice()
}

pub fn cbuf2str(buf: &[u8]) -> &str {
    std::str::from_utf8(buf).unwrap()
}
