//! Raw AF_PACKET/SOCK_RAW link layer: one socket per network interface,
//! bound to ETH_P_HPAV, filtered in-kernel to that ether type, wrapped in
//! `tokio::io::unix::AsyncFd` so session code can `.await` on it.

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use tokio::io::unix::AsyncFd;

use crate::error::CoreError;
use crate::ethernet::ETH_P_HPAV;
use crate::mac::MacAddr;

/// Matches `FramesSizes.BUFF_MAX_SIZE` — the largest frame this link will
/// ever hand back from a single recv.
pub const MAX_FRAME_LEN: usize = 1500;

/// A BPF program equivalent to `tcpdump -dd 'ether proto 0x88e1'`: load the
/// ether-type halfword at offset 12, accept if it equals ETH_P_HPAV,
/// otherwise drop. Keeping this filtering in-kernel means the thousands of
/// non-HPGP broadcast frames on a shared powerline segment never cross into
/// userspace.
fn hpav_filter() -> [libc::sock_filter; 4] {
    const BPF_LD: u16 = 0x00;
    const BPF_H: u16 = 0x08;
    const BPF_ABS: u16 = 0x20;
    const BPF_JMP: u16 = 0x05;
    const BPF_JEQ: u16 = 0x10;
    const BPF_K: u16 = 0x00;
    const BPF_RET: u16 = 0x06;

    [
        libc::sock_filter { code: BPF_LD | BPF_H | BPF_ABS, jt: 0, jf: 0, k: 12 },
        libc::sock_filter { code: BPF_JMP | BPF_JEQ | BPF_K, jt: 0, jf: 1, k: ETH_P_HPAV as u32 },
        libc::sock_filter { code: BPF_RET | BPF_K, jt: 0, jf: 0, k: u32::MAX },
        libc::sock_filter { code: BPF_RET | BPF_K, jt: 0, jf: 0, k: 0 },
    ]
}

fn last_errno(call: &'static str) -> io::Error {
    let err = io::Error::last_os_error();
    tracing::debug!(call, %err, "raw socket syscall failed");
    err
}

struct RawSocket(RawFd);

impl RawSocket {
    fn open(interface: &str) -> io::Result<Self> {
        // SAFETY: socket() with these arguments is always safe; the result
        // is checked immediately below.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                (ETH_P_HPAV as u16).to_be() as i32,
            )
        };
        if fd < 0 {
            return Err(last_errno("socket"));
        }
        let sock = RawSocket(fd);

        let mut ifreq: libc::ifreq = unsafe { mem::zeroed() };
        for (dst, src) in ifreq.ifr_name.iter_mut().zip(interface.bytes()) {
            *dst = src as libc::c_char;
        }
        // SAFETY: ifreq is a valid, zero-initialized struct; fd is open.
        let rc = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifreq) };
        if rc < 0 {
            return Err(last_errno("ioctl(SIOCGIFINDEX)"));
        }
        let if_index = unsafe { ifreq.ifr_ifru.ifru_ifindex };

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = (ETH_P_HPAV as u16).to_be();
        addr.sll_ifindex = if_index;
        // SAFETY: addr is fully initialized and of the size passed below.
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if rc < 0 {
            return Err(last_errno("bind"));
        }

        let filter = hpav_filter();
        let prog = libc::sock_fprog { len: filter.len() as u16, filter: filter.as_ptr() as *mut _ };
        // SAFETY: prog borrows `filter`, which outlives this call.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const _ as *const libc::c_void,
                mem::size_of::<libc::sock_fprog>() as u32,
            )
        };
        if rc < 0 {
            return Err(last_errno("setsockopt(SO_ATTACH_FILTER)"));
        }

        let broadcast_enable: libc::c_int = 1;
        // SAFETY: well-formed setsockopt call on an owned fd.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_BROADCAST,
                &broadcast_enable as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as u32,
            )
        };
        if rc < 0 {
            return Err(last_errno("setsockopt(SO_BROADCAST)"));
        }

        Ok(sock)
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// One HPGP raw link, bound to a single named interface and the EVSE's own
/// source MAC on that interface.
pub struct RawLink {
    inner: AsyncFd<RawSocket>,
    local_mac: MacAddr,
}

impl RawLink {
    pub fn open(interface: &str) -> Result<Self, CoreError> {
        let sock = RawSocket::open(interface)
            .map_err(|e| CoreError::link(format!("opening {interface}: {e}")))?;
        let local_mac = read_interface_mac(interface)
            .map_err(|e| CoreError::link(format!("reading MAC of {interface}: {e}")))?;
        let inner = AsyncFd::new(sock)
            .map_err(|e| CoreError::link(format!("registering {interface} with tokio: {e}")))?;
        Ok(RawLink { inner, local_mac })
    }

    pub fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    /// Send one already-framed (and already zero-padded) HPGP frame.
    pub async fn send(&self, frame: &[u8]) -> Result<(), CoreError> {
        loop {
            let mut guard = self
                .inner
                .writable()
                .await
                .map_err(|e| CoreError::link(e.to_string()))?;
            let result = guard.try_io(|inner| {
                let fd = inner.as_raw_fd();
                // SAFETY: frame is a valid slice for its own length; fd is open.
                let rc = unsafe {
                    libc::send(fd, frame.as_ptr() as *const libc::c_void, frame.len(), 0)
                };
                if rc < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(())
                }
            });
            match result {
                Ok(inner_result) => return inner_result.map_err(|e| CoreError::link(e.to_string())),
                Err(_would_block) => continue,
            }
        }
    }

    /// Block until a frame arrives (subject to `timeout` by the caller
    /// wrapping this in `tokio::time::timeout`), up to [`MAX_FRAME_LEN`]
    /// bytes.
    pub async fn recv(&self) -> Result<Vec<u8>, CoreError> {
        loop {
            let mut guard = self
                .inner
                .readable()
                .await
                .map_err(|e| CoreError::link(e.to_string()))?;
            let mut buf = vec![0u8; MAX_FRAME_LEN];
            let result = guard.try_io(|inner| {
                let fd = inner.as_raw_fd();
                // SAFETY: buf has capacity MAX_FRAME_LEN, matching the len passed.
                let rc = unsafe {
                    libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
                };
                if rc < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    buf.truncate(rc as usize);
                    Ok(buf.clone())
                }
            });
            match result {
                Ok(inner_result) => return inner_result.map_err(|e| CoreError::link(e.to_string())),
                Err(_would_block) => continue,
            }
        }
    }
}

fn read_interface_mac(interface: &str) -> io::Result<MacAddr> {
    // SAFETY: AF_INET/SOCK_DGRAM socket is only used for the SIOCGIFHWADDR
    // ioctl below and closed immediately after.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd is a valid open socket, closed unconditionally below.
    let result = unsafe {
        let mut ifreq: libc::ifreq = mem::zeroed();
        for (dst, src) in ifreq.ifr_name.iter_mut().zip(interface.bytes()) {
            *dst = src as libc::c_char;
        }
        let rc = libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifreq);
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            let sockaddr = ifreq.ifr_ifru.ifru_hwaddr;
            let mut mac = [0u8; 6];
            for (i, byte) in mac.iter_mut().enumerate() {
                *byte = sockaddr.sa_data[i] as u8;
            }
            Ok(MacAddr(mac))
        }
    };
    unsafe {
        libc::close(fd);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_only_hpav_ether_type() {
        let filter = hpav_filter();
        assert_eq!(filter.len(), 4);
        assert_eq!(filter[1].k, ETH_P_HPAV as u32);
    }
}
