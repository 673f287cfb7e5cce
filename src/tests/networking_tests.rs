#[cfg(test)]
pub mod net_tests {
    use super::super::*;
    use crate::interface::{self, Errno};
    use crate::safeposix::net::AddrHints;
    use crate::safeposix::syscalls::fs_constants::*;
    use crate::safeposix::syscalls::net_constants::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::thread;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn fds(list: &[i32]) -> interface::RustHashSet<i32> {
        list.iter().copied().collect()
    }

    const SECOND: Option<interface::RustDuration> = Some(interface::RustDuration::from_secs(1));
    const POLL: Option<interface::RustDuration> = Some(interface::RustDuration::ZERO);

    fn listener(kernel: &TestKernel, at: &str) -> i32 {
        let fd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        kernel.bind_syscall(fd, &addr(at)).unwrap();
        kernel.listen_syscall(fd, 10).unwrap();
        fd
    }

    #[test]
    pub fn ut_net_loopback_exchange() {
        let kernel = test_kernel();
        let serverfd = listener(&kernel, "127.0.0.1:5000");
        assert_eq!(kernel.getsockname_syscall(serverfd).unwrap(), addr("127.0.0.1:5000"));

        let clientfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        kernel.connect_syscall(clientfd, &addr("127.0.0.1:5000")).unwrap();
        assert_eq!(kernel.getpeername_syscall(clientfd).unwrap(), addr("127.0.0.1:5000"));
        assert_eq!(
            kernel.connect_syscall(clientfd, &addr("127.0.0.1:5000")),
            Err(Errno::EISCONN)
        );

        let (connfd, peer) = kernel.accept_syscall(serverfd).unwrap();
        assert_eq!(peer, kernel.getsockname_syscall(clientfd).unwrap());
        assert_eq!(kernel.getpeername_syscall(connfd).unwrap(), peer);

        assert_eq!(kernel.send_syscall(clientfd, b"hello", 0).unwrap(), 5);
        let mut buf = sizecbuf(16);
        assert_eq!(kernel.recv_syscall(connfd, &mut buf, 0).unwrap(), 5);
        assert_eq!(cbuf2str(&buf[..5]), "hello");

        // plain read and write work on socket descriptors too
        assert_eq!(kernel.write_syscall(connfd, b"world!").unwrap(), 6);
        assert_eq!(kernel.read_syscall(clientfd, &mut buf).unwrap(), 6);
        assert_eq!(cbuf2str(&buf[..6]), "world!");

        kernel.close_syscall(clientfd).unwrap();
        assert_eq!(kernel.read_syscall(connfd, &mut buf).unwrap(), 0);

        kernel.close_syscall(connfd).unwrap();
        kernel.close_syscall(serverfd).unwrap();
        assert_eq!(kernel.sockets().socket_count(), 0);
    }

    #[test]
    pub fn ut_net_threaded_echo() {
        let kernel = test_kernel();
        let serverfd = listener(&kernel, "127.0.0.1:5001");
        let payload: Vec<u8> = (0..20000u32).map(|i| (i % 256) as u8).collect();

        thread::scope(|s| {
            let server = s.spawn(|| {
                let (connfd, _) = kernel.accept_syscall(serverfd).unwrap();
                let mut buf = sizecbuf(4096);
                let mut total = 0;
                loop {
                    let n = kernel.read_syscall(connfd, &mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    assert_eq!(kernel.write_syscall(connfd, &buf[..n]).unwrap(), n);
                    total += n;
                }
                kernel.close_syscall(connfd).unwrap();
                total
            });

            let clientfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
            kernel.connect_syscall(clientfd, &addr("127.0.0.1:5001")).unwrap();
            assert_eq!(kernel.write_syscall(clientfd, &payload).unwrap(), payload.len());

            let mut echoed = Vec::new();
            let mut buf = sizecbuf(4096);
            while echoed.len() < payload.len() {
                let n = kernel.read_syscall(clientfd, &mut buf).unwrap();
                assert!(n > 0);
                echoed.extend_from_slice(&buf[..n]);
            }
            assert_eq!(echoed, payload);

            kernel.shutdown_syscall(clientfd, SHUT_WR).unwrap();
            assert_eq!(server.join().unwrap(), payload.len());
            kernel.close_syscall(clientfd).unwrap();
        });
        kernel.close_syscall(serverfd).unwrap();
    }

    #[test]
    pub fn ut_net_nonblocking() {
        let kernel = test_kernel();
        let serverfd = listener(&kernel, "127.0.0.1:5002");
        kernel.fcntl_syscall(serverfd, F_SETFL, O_NONBLOCK).unwrap();
        assert_eq!(kernel.fcntl_syscall(serverfd, F_GETFL, 0).unwrap() & O_NONBLOCK, O_NONBLOCK);
        assert_eq!(kernel.accept_syscall(serverfd).err(), Some(Errno::EAGAIN));

        let clientfd = kernel.socket_syscall(AF_INET, SOCK_STREAM | SOCK_NONBLOCK, 0).unwrap();
        assert_eq!(
            kernel.connect_syscall(clientfd, &addr("127.0.0.1:5002")),
            Err(Errno::EINPROGRESS)
        );

        let mut writefds = fds(&[clientfd]);
        assert_eq!(kernel.select_syscall(clientfd + 1, None, Some(&mut writefds), None, SECOND).unwrap(), 1);
        assert!(writefds.contains(&clientfd));
        assert_eq!(
            kernel.connect_syscall(clientfd, &addr("127.0.0.1:5002")),
            Err(Errno::EISCONN)
        );

        let mut buf = sizecbuf(8);
        assert_eq!(kernel.read_syscall(clientfd, &mut buf), Err(Errno::EAGAIN));
        assert_eq!(kernel.write_syscall(clientfd, b"ping").unwrap(), 4);

        let mut readfds = fds(&[serverfd]);
        assert_eq!(kernel.select_syscall(serverfd + 1, Some(&mut readfds), None, None, SECOND).unwrap(), 1);
        let (connfd, _) = kernel.accept_syscall(serverfd).unwrap();

        let mut readfds = fds(&[connfd]);
        assert_eq!(kernel.select_syscall(connfd + 1, Some(&mut readfds), None, None, SECOND).unwrap(), 1);
        assert_eq!(kernel.read_syscall(connfd, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    pub fn ut_net_refused() {
        let kernel = test_kernel();

        let fd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        assert_eq!(
            kernel.connect_syscall(fd, &addr("127.0.0.1:6000")),
            Err(Errno::ECONNREFUSED)
        );
        // the failed socket can try again
        let _server = listener(&kernel, "127.0.0.1:6000");
        kernel.connect_syscall(fd, &addr("127.0.0.1:6000")).unwrap();

        let nbfd = kernel.socket_syscall(AF_INET, SOCK_STREAM | SOCK_NONBLOCK, 0).unwrap();
        assert_eq!(
            kernel.connect_syscall(nbfd, &addr("127.0.0.1:6001")),
            Err(Errno::EINPROGRESS)
        );
        let mut exceptfds = fds(&[nbfd]);
        assert_eq!(kernel.select_syscall(nbfd + 1, None, None, Some(&mut exceptfds), SECOND).unwrap(), 1);
        assert_eq!(
            kernel.connect_syscall(nbfd, &addr("127.0.0.1:6001")),
            Err(Errno::ECONNREFUSED)
        );
    }

    #[test]
    pub fn ut_net_select() {
        let kernel = test_kernel();
        let serverfd = listener(&kernel, "127.0.0.1:5003");

        // nothing pending, so a poll finds nothing and empties the set
        let mut readfds = fds(&[serverfd]);
        assert_eq!(kernel.select_syscall(serverfd + 1, Some(&mut readfds), None, None, POLL).unwrap(), 0);
        assert!(readfds.is_empty());

        // a fresh socket is both readable and writable
        let freshfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        let mut readfds = fds(&[freshfd]);
        let mut writefds = fds(&[freshfd, serverfd]);
        let mut exceptfds = fds(&[freshfd]);
        assert_eq!(
            kernel
                .select_syscall(
                    freshfd + 1,
                    Some(&mut readfds),
                    Some(&mut writefds),
                    Some(&mut exceptfds),
                    POLL
                )
                .unwrap(),
            2
        );
        assert_eq!(readfds, fds(&[freshfd]));
        assert_eq!(writefds, fds(&[freshfd]));
        assert!(exceptfds.is_empty());

        // descriptors at or above nfds are not examined
        let mut readfds = fds(&[freshfd]);
        assert_eq!(kernel.select_syscall(freshfd, Some(&mut readfds), None, None, POLL).unwrap(), 0);

        let clientfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        kernel.connect_syscall(clientfd, &addr("127.0.0.1:5003")).unwrap();
        let mut readfds = fds(&[serverfd]);
        assert_eq!(kernel.select_syscall(clientfd + 1, Some(&mut readfds), None, None, SECOND).unwrap(), 1);
    }

    #[test]
    pub fn ut_net_select_errors() {
        let kernel = test_kernel();
        let filefd = kernel.open_syscall("/plain", O_CREAT | O_RDWR, S_IRWXA).unwrap();
        let sockfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();

        let mut readfds = fds(&[sockfd, filefd]);
        assert_eq!(
            kernel.select_syscall(10, Some(&mut readfds), None, None, POLL),
            Err(Errno::ENOTSOCK)
        );
        let mut readfds = fds(&[sockfd, 7]);
        assert_eq!(
            kernel.select_syscall(10, Some(&mut readfds), None, None, POLL),
            Err(Errno::EBADF)
        );
        assert_eq!(kernel.select_syscall(-1, None, None, None, POLL), Err(Errno::EINVAL));
        assert_eq!(kernel.select_syscall(0, None, None, None, POLL).unwrap(), 0);
    }

    #[test]
    pub fn ut_net_bind_listen_errors() {
        let kernel = test_kernel();

        assert_eq!(kernel.socket_syscall(AF_UNIX, SOCK_STREAM, 0), Err(Errno::EAFNOSUPPORT));
        assert_eq!(kernel.socket_syscall(AF_INET, SOCK_DGRAM, 0), Err(Errno::EOPNOTSUPP));
        assert_eq!(kernel.socket_syscall(AF_INET, SOCK_STREAM, 17), Err(Errno::EOPNOTSUPP));

        let first = listener(&kernel, "127.0.0.1:5004");
        let second = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        kernel.bind_syscall(second, &addr("127.0.0.1:5004")).unwrap();
        assert_eq!(kernel.bind_syscall(second, &addr("127.0.0.1:5005")), Err(Errno::EINVAL));
        assert_eq!(kernel.listen_syscall(second, 10), Err(Errno::EADDRINUSE));

        // the port frees up once the first listener closes
        kernel.close_syscall(first).unwrap();
        kernel.sync();
        kernel.listen_syscall(second, 10).unwrap();

        let v4 = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        assert_eq!(kernel.bind_syscall(v4, &addr("[::1]:5006")), Err(Errno::EAFNOSUPPORT));

        // an unbound listener gets an ephemeral port
        let v6 = kernel.socket_syscall(AF_INET6, SOCK_STREAM, 0).unwrap();
        kernel.listen_syscall(v6, 1).unwrap();
        let bound = kernel.getsockname_syscall(v6).unwrap();
        assert!(bound.is_ipv6());
        assert_ne!(bound.port(), 0);
        assert_eq!(kernel.accept_syscall(v4).err(), Some(Errno::EINVAL));
    }

    #[test]
    pub fn ut_net_descriptor_behavior() {
        let kernel = test_kernel();
        let fd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();

        assert!(is_sock(kernel.fstat_syscall(fd).unwrap().st_mode));
        assert_eq!(kernel.lseek_syscall(fd, 0, SEEK_SET), Err(Errno::ESPIPE));
        assert!(!kernel.isatty_syscall(fd).unwrap());

        let mut buf = sizecbuf(4);
        assert_eq!(kernel.read_syscall(fd, &mut buf), Err(Errno::ENOTCONN));
        assert_eq!(kernel.write_syscall(fd, b"x"), Err(Errno::ENOTCONN));
        assert_eq!(kernel.getpeername_syscall(fd), Err(Errno::ENOTCONN));
        assert_eq!(kernel.shutdown_syscall(fd, SHUT_RDWR), Err(Errno::ENOTCONN));

        let filefd = kernel.open_syscall("/plain", O_CREAT | O_RDWR, S_IRWXA).unwrap();
        assert_eq!(kernel.send_syscall(filefd, b"x", 0), Err(Errno::ENOTSOCK));
        assert_eq!(kernel.listen_syscall(filefd, 1), Err(Errno::ENOTSOCK));
        assert_eq!(kernel.bind_syscall(42, &addr("127.0.0.1:1")), Err(Errno::EBADF));

        // a dup keeps the socket alive after the original closes
        let copy = kernel.dup_syscall(fd).unwrap();
        kernel.close_syscall(fd).unwrap();
        assert_eq!(kernel.sockets().socket_count(), 1);
        kernel.bind_syscall(copy, &addr("127.0.0.1:5007")).unwrap();
        kernel.close_syscall(copy).unwrap();
        assert_eq!(kernel.sockets().socket_count(), 0);
    }

    #[test]
    pub fn ut_net_shutdown() {
        let kernel = test_kernel();
        let serverfd = listener(&kernel, "127.0.0.1:5008");
        let clientfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        kernel.connect_syscall(clientfd, &addr("127.0.0.1:5008")).unwrap();
        let (connfd, _) = kernel.accept_syscall(serverfd).unwrap();

        assert_eq!(kernel.write_syscall(clientfd, b"last").unwrap(), 4);
        assert_eq!(kernel.shutdown_syscall(clientfd, 7), Err(Errno::EINVAL));
        kernel.shutdown_syscall(clientfd, SHUT_RDWR).unwrap();
        assert_eq!(kernel.write_syscall(clientfd, b"more"), Err(Errno::EPIPE));
        assert_eq!(kernel.getpeername_syscall(clientfd), Err(Errno::ENOTCONN));

        // bytes sent before the shutdown still arrive, then end of stream
        let mut buf = sizecbuf(8);
        assert_eq!(kernel.read_syscall(connfd, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"last");
        assert_eq!(kernel.read_syscall(connfd, &mut buf).unwrap(), 0);
        assert_eq!(kernel.write_syscall(connfd, b"late"), Err(Errno::EPIPE));

        // the descriptor survives until closed
        assert!(is_sock(kernel.fstat_syscall(clientfd).unwrap().st_mode));
        kernel.close_syscall(clientfd).unwrap();
    }

    #[test]
    pub fn ut_net_coordinator_stopped() {
        let kernel = test_kernel();
        let serverfd = listener(&kernel, "127.0.0.1:5010");
        let clientfd = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        kernel.connect_syscall(clientfd, &addr("127.0.0.1:5010")).unwrap();
        kernel.sync();

        kernel.coordinator().shutdown();

        // nothing reaches the host any more, so blocking calls fail at once
        let late = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        assert_eq!(kernel.connect_syscall(late, &addr("127.0.0.1:5010")), Err(Errno::EIO));
        let other = kernel.socket_syscall(AF_INET, SOCK_STREAM, 0).unwrap();
        assert_eq!(kernel.listen_syscall(other, 10), Err(Errno::EACCES));
        assert_eq!(kernel.write_syscall(clientfd, b"stuck"), Err(Errno::EIO));

        let mut excepts = fds(&[clientfd]);
        assert_eq!(kernel.select_syscall(clientfd + 1, None, None, Some(&mut excepts), SECOND), Ok(1));
        assert!(excepts.contains(&clientfd));

        for fd in [late, other, clientfd, serverfd] {
            kernel.close_syscall(fd).unwrap();
        }
    }

    #[test]
    pub fn ut_net_resolver() {
        let (kernel, loopback) = kernel_and_network(test_config());
        let server: IpAddr = "10.0.0.7".parse().unwrap();
        let server6: IpAddr = "fd00::7".parse().unwrap();
        loopback.add_host("files.example", &[server, server6]);

        assert_eq!(kernel.gethostbyname_syscall("files.example"), Ok(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(kernel.gethostbyname_syscall("LOCALHOST"), Ok(Ipv4Addr::LOCALHOST));
        assert_eq!(kernel.gethostbyname_syscall("nowhere.example"), Err(EAI_NONAME));

        let hints = AddrHints {
            flags: AI_CANONNAME,
            ..AddrHints::default()
        };
        let answers = kernel
            .getaddrinfo_syscall(Some("files.example"), Some("8080"), Some(&hints))
            .unwrap();
        let addrs: Vec<SocketAddr> = answers.iter().map(|a| a.addr).collect();
        assert_eq!(addrs, vec![addr("10.0.0.7:8080"), addr("[fd00::7]:8080")]);
        assert_eq!(answers[0].family, AF_INET);
        assert_eq!(answers[1].family, AF_INET6);
        assert!(answers.iter().all(|a| a.socktype == SOCK_STREAM));
        assert_eq!(answers[0].canonname.as_deref(), Some("files.example"));
        assert_eq!(answers[1].canonname, None);

        let v6_only = AddrHints {
            family: AF_INET6,
            ..AddrHints::default()
        };
        let answers = kernel
            .getaddrinfo_syscall(Some("files.example"), None, Some(&v6_only))
            .unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].addr, addr("[fd00::7]:0"));

        // numeric hosts and missing hosts never ask the host resolver
        let numeric = kernel.getaddrinfo_syscall(Some("192.168.1.2"), Some("22"), None).unwrap();
        assert_eq!(numeric[0].addr, addr("192.168.1.2:22"));
        let numeric_only = AddrHints {
            flags: AI_NUMERICHOST,
            ..AddrHints::default()
        };
        assert_eq!(
            kernel.getaddrinfo_syscall(Some("files.example"), None, Some(&numeric_only)),
            Err(EAI_NONAME)
        );
        let local = kernel.getaddrinfo_syscall(None, Some("5020"), None).unwrap();
        assert_eq!(local[0].addr, addr("127.0.0.1:5020"));
        let passive = AddrHints {
            flags: AI_PASSIVE,
            ..AddrHints::default()
        };
        let any = kernel.getaddrinfo_syscall(None, Some("5020"), Some(&passive)).unwrap();
        assert_eq!(any[0].addr, addr("0.0.0.0:5020"));

        assert_eq!(kernel.getaddrinfo_syscall(Some("localhost"), Some("http"), None), Err(EAI_SERVICE));
        let unix = AddrHints {
            family: AF_UNIX,
            ..AddrHints::default()
        };
        assert_eq!(kernel.getaddrinfo_syscall(Some("localhost"), None, Some(&unix)), Err(EAI_FAMILY));

        assert_eq!(
            kernel.getnameinfo_syscall(&addr("10.0.0.7:443"), 0),
            Ok(("files.example".to_string(), "443".to_string()))
        );
        assert_eq!(
            kernel.getnameinfo_syscall(&addr("10.0.0.7:443"), NI_NUMERICHOST),
            Ok(("10.0.0.7".to_string(), "443".to_string()))
        );
        assert_eq!(
            kernel.getnameinfo_syscall(&addr("10.9.9.9:1"), 0),
            Ok(("10.9.9.9".to_string(), "1".to_string()))
        );
        assert_eq!(kernel.getnameinfo_syscall(&addr("10.9.9.9:1"), NI_NAMEREQD), Err(EAI_NONAME));

        // a resolved address is one a socket can use
        let serverfd = listener(&kernel, "127.0.0.1:5021");
        let target = kernel.getaddrinfo_syscall(Some("localhost"), Some("5021"), None).unwrap();
        let clientfd = kernel.socket_syscall(target[0].family, target[0].socktype, 0).unwrap();
        kernel.connect_syscall(clientfd, &target[0].addr).unwrap();
        kernel.close_syscall(clientfd).unwrap();
        kernel.close_syscall(serverfd).unwrap();
    }
}
