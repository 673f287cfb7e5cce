/* Benchmarks for read and write through the kernel proxy. As with the other
 * benches there is no results checking beyond the return value, to avoid
 * adding bias to the results. */

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use rustmounts::config::KernelConfig;
use rustmounts::interface::{self, Coordinator, HostNetwork, LoopbackNetwork};
use rustmounts::safeposix::dispatcher::{kernelfinalize, kernelinit};
use rustmounts::safeposix::kernel::KernelProxy;
use rustmounts::safeposix::mounts::{BufferMount, MemMount, Mount};
use rustmounts::safeposix::syscalls::fs_constants::*;

use std::ffi::{c_void, CString};
use std::os::unix::ffi::OsStrExt;

mod global_criterion_settings;

// Rather than track the file size, every loop rewinds after this much.
const RESET_LENGTH: usize = 1024 * 1024 * 4; // 4MB

const BUFLENS: [usize; 4] = [1, 64, 1024, 65536];

fn bench_kernel(c: &mut Criterion, label: &str, kernel: &KernelProxy, path: &str) {
    let mut group = c.benchmark_group(format!("Compare fs:write+read ({})", label));
    group.plot_config(
        criterion::PlotConfiguration::default().summary_scale(criterion::AxisScale::Logarithmic),
    );

    for buflen in BUFLENS.iter() {
        let data = vec![b'X'; *buflen];
        let fd = kernel
            .open_syscall(path, O_CREAT | O_TRUNC | O_RDWR, S_IRWXA)
            .unwrap();

        // My current position when writing...
        let mut pos = 0;
        group.bench_with_input(BenchmarkId::new("write", buflen), buflen, |b, buflen| {
            b.iter(|| {
                pos += *buflen;
                if RESET_LENGTH < pos {
                    kernel.lseek_syscall(fd, 0, SEEK_SET).unwrap();
                    pos = *buflen;
                }
                assert_eq!(kernel.write_syscall(fd, &data).unwrap(), *buflen);
            })
        });

        // fill the file so every read below is a full one
        let written = kernel.fstat_syscall(fd).unwrap().st_size;
        if written < RESET_LENGTH {
            kernel.lseek_syscall(fd, 0, SEEK_END).unwrap();
            let filler = vec![b'X'; RESET_LENGTH - written];
            kernel.write_syscall(fd, &filler).unwrap();
        }
        kernel.lseek_syscall(fd, 0, SEEK_SET).unwrap();

        pos = 0;
        let mut read_buffer = vec![0u8; *buflen];
        group.bench_with_input(BenchmarkId::new("read", buflen), buflen, |b, buflen| {
            b.iter(|| {
                pos += *buflen;
                if RESET_LENGTH < pos {
                    kernel.lseek_syscall(fd, 0, SEEK_SET).unwrap();
                    pos = *buflen;
                }
                assert_eq!(kernel.read_syscall(fd, &mut read_buffer).unwrap(), *buflen);
            })
        });

        kernel.close_syscall(fd).unwrap();
        kernel.unlink_syscall(path).unwrap();
    }
    group.finish();
}

fn bench_native(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compare fs:write+read (native)");
    let dir = tempfile::tempdir().unwrap();
    let c_path = CString::new(dir.path().join("foo").as_os_str().as_bytes()).unwrap();

    for buflen in BUFLENS.iter() {
        let expected_retval = *buflen as isize;
        let data = vec![b'X'; *buflen];
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_CREAT | libc::O_TRUNC | libc::O_RDWR,
                0o777 as libc::c_uint,
            )
        };

        group.bench_with_input(BenchmarkId::new("write", buflen), buflen, |b, buflen| {
            b.iter(|| unsafe {
                assert_eq!(libc::write(fd, data.as_ptr() as *const c_void, *buflen), expected_retval);
            })
        });

        // I'll read the file length so I don't overrun this with my reads...
        let file_length = unsafe { libc::lseek(fd, 0, libc::SEEK_CUR) } as isize;
        unsafe {
            libc::lseek(fd, 0, libc::SEEK_SET);
        }

        let mut pos = 0;
        let mut read_buffer = vec![0u8; *buflen];
        group.bench_with_input(BenchmarkId::new("read", buflen), buflen, |b, buflen| {
            b.iter(|| unsafe {
                pos += expected_retval;
                if file_length < pos {
                    libc::lseek(fd, 0, libc::SEEK_SET);
                    pos = expected_retval;
                }
                assert_eq!(
                    libc::read(fd, read_buffer.as_mut_ptr() as *mut c_void, *buflen),
                    expected_retval
                );
            })
        });

        unsafe {
            libc::close(fd);
            libc::unlink(c_path.as_ptr());
        }
    }
    group.finish();
}

pub fn run_benchmark(c: &mut Criterion) {
    let coordinator = Coordinator::new();
    let runner = coordinator.spawn();
    let network: interface::RustRfc<dyn HostNetwork> =
        interface::RustRfc::new(LoopbackNetwork::new(coordinator.clone()));
    let config = KernelConfig {
        console: false,
        ..KernelConfig::default()
    };
    let kernel = kernelinit(config, coordinator, network).unwrap();

    bench_kernel(c, "memory", &kernel, "/foo");

    let buffered: interface::RustRfc<dyn Mount> = interface::RustRfc::new(BufferMount::new(
        interface::RustRfc::new(MemMount::new()),
        64 * 1024,
        128,
    ));
    kernel.mkdir_syscall("/buffered", S_IRWXA).unwrap();
    kernel.mount_syscall(buffered, "/buffered").unwrap();
    bench_kernel(c, "buffered", &kernel, "/buffered/foo");

    bench_native(c);

    kernelfinalize(&kernel);
    runner.shutdown();
}

criterion_group!(name=benches;
                 config=global_criterion_settings::get_criterion();
                 targets=run_benchmark);
criterion_main!(benches);
