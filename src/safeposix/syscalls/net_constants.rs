// Network related constants
#![allow(dead_code)]

// Imported into net_calls and the socket subsystem

pub const SOCK_STREAM: i32 = 1; //stream socket
pub const SOCK_DGRAM: i32 = 2; //datagram socket
pub const SOCK_CLOEXEC: i32 = 0o2000000;
pub const SOCK_NONBLOCK: i32 = 0o4000;
pub const SOCK_TYPEMASK: i32 = 0xf;

/* Supported address families. */
pub const AF_UNSPEC: i32 = 0;
pub const AF_UNIX: i32 = 1;
pub const AF_INET: i32 = 2;
pub const AF_INET6: i32 = 10;

pub const IPPROTO_IP: i32 = 0;
pub const IPPROTO_TCP: i32 = 6;

//shutdown directions
pub const SHUT_RD: i32 = 0;
pub const SHUT_WR: i32 = 1;
pub const SHUT_RDWR: i32 = 2;

pub const MSG_PEEK: i32 = 2;
pub const MSG_DONTWAIT: i32 = 0x40;

// size of the outbound queue before a socket stops reporting writable,
// and of each inbound read request
pub const SOCKET_BUF_SIZE: usize = 64 * 1024;

// getaddrinfo hint flags
pub const AI_PASSIVE: i32 = 0x0001;
pub const AI_CANONNAME: i32 = 0x0002;
pub const AI_NUMERICHOST: i32 = 0x0004;

// getnameinfo flags
pub const NI_NUMERICHOST: i32 = 1;
pub const NI_NUMERICSERV: i32 = 2;
pub const NI_NAMEREQD: i32 = 8;

// resolver error codes, as getaddrinfo and getnameinfo return them
pub const EAI_BADFLAGS: i32 = -1;
pub const EAI_NONAME: i32 = -2;
pub const EAI_FAIL: i32 = -4;
pub const EAI_FAMILY: i32 = -6;
pub const EAI_SOCKTYPE: i32 = -7;
pub const EAI_SERVICE: i32 = -8;
