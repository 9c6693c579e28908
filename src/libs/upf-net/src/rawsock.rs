//! Raw AF_PACKET sockets (Linux)
//!
//! Sends and receives whole Ethernet frames on one interface, with
//! optional promiscuous mode and MTU access. Opening these sockets
//! needs CAP_NET_RAW.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::buffer::{BufferView, BufferWritableView};
use crate::error::{NetError, NetResult};
use crate::interfaces::{ContextUserData, EthPacketSink, EthPacketSource};

fn last_os_error(context: &'static str) -> NetError {
    NetError::io(context, std::io::Error::last_os_error())
}

fn ifname_to_cstring(context: &'static str, ifname: &str) -> NetResult<CString> {
    CString::new(ifname)
        .map_err(|_| NetError::invalid_argument(context, "interface name contains a NUL byte"))
}

/// Look up the index of a network interface by name.
pub fn interface_index(ifname: &str) -> NetResult<u32> {
    const CONTEXT: &str = "interface_index";

    let name = ifname_to_cstring(CONTEXT, ifname)?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(last_os_error(CONTEXT));
    }
    Ok(index)
}

/// An ioctl on a throwaway datagram socket, the way interface queries
/// are done.
fn with_ifreq<R>(
    context: &'static str,
    ifname: &str,
    f: impl FnOnce(RawFd, &mut libc::ifreq) -> NetResult<R>,
) -> NetResult<R> {
    let name = ifname_to_cstring(context, ifname)?;

    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(last_os_error(context));
    }

    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    let bytes = name.as_bytes_with_nul();
    let copy_len = bytes.len().min(libc::IF_NAMESIZE - 1);
    unsafe {
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr() as *const libc::c_char,
            req.ifr_name.as_mut_ptr(),
            copy_len,
        );
    }

    let result = f(fd, &mut req);
    unsafe { libc::close(fd) };
    result
}

/// Get the MTU of a network interface.
pub fn interface_mtu(ifname: &str) -> NetResult<usize> {
    const CONTEXT: &str = "interface_mtu";

    with_ifreq(CONTEXT, ifname, |fd, req| {
        if unsafe { libc::ioctl(fd, libc::SIOCGIFMTU, req as *mut libc::ifreq) } != 0 {
            return Err(last_os_error(CONTEXT));
        }
        Ok(unsafe { req.ifr_ifru.ifru_mtu } as usize)
    })
}

/// Set the MTU of a network interface.
pub fn set_interface_mtu(ifname: &str, mtu: usize) -> NetResult<()> {
    const CONTEXT: &str = "set_interface_mtu";

    with_ifreq(CONTEXT, ifname, |fd, req| {
        req.ifr_ifru.ifru_mtu = mtu as libc::c_int;
        if unsafe { libc::ioctl(fd, libc::SIOCSIFMTU, req as *mut libc::ifreq) } != 0 {
            return Err(last_os_error(CONTEXT));
        }
        Ok(())
    })
}

/// A raw packet socket bound to one interface.
pub struct RawSocket {
    fd: RawFd,
    ifindex: u32,
}

impl RawSocket {
    /// Open a raw socket bound to the interface with the given index,
    /// receiving every EtherType.
    pub fn open(ifindex: u32, promiscuous: bool) -> NetResult<Self> {
        const CONTEXT: &str = "RawSocket::open";

        let protocol = (libc::ETH_P_ALL as u16).to_be() as libc::c_int;
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol) };
        if fd < 0 {
            return Err(last_os_error(CONTEXT));
        }

        let socket = RawSocket { fd, ifindex };

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::sa_family_t;
        addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = ifindex as libc::c_int;

        let rc = unsafe {
            libc::bind(
                socket.fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(last_os_error(CONTEXT));
        }

        if promiscuous {
            let mut mreq: libc::packet_mreq = unsafe { std::mem::zeroed() };
            mreq.mr_ifindex = ifindex as libc::c_int;
            mreq.mr_type = libc::PACKET_MR_PROMISC as libc::c_ushort;

            let rc = unsafe {
                libc::setsockopt(
                    socket.fd,
                    libc::SOL_PACKET,
                    libc::PACKET_ADD_MEMBERSHIP,
                    &mreq as *const libc::packet_mreq as *const libc::c_void,
                    std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(last_os_error(CONTEXT));
            }
        }

        Ok(socket)
    }

    /// Open by interface name.
    pub fn open_by_name(ifname: &str, promiscuous: bool) -> NetResult<Self> {
        Self::open(interface_index(ifname)?, promiscuous)
    }

    /// The index of the bound interface
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Send one frame. A partial send is reported as an I/O error.
    pub fn send(&mut self, data: BufferView<'_>) -> NetResult<()> {
        const CONTEXT: &str = "RawSocket::send";

        let sent = unsafe {
            libc::send(
                self.fd,
                data.as_slice().as_ptr() as *const libc::c_void,
                data.size(),
                0,
            )
        };
        if sent < 0 {
            return Err(last_os_error(CONTEXT));
        }
        if sent as usize != data.size() {
            return Err(NetError::Io {
                context: CONTEXT,
                cause: format!("partial send ({sent} of {} bytes)", data.size()),
            });
        }
        Ok(())
    }

    /// Receive one frame into `buffer`.
    pub fn recv<'a>(&mut self, buffer: &'a mut [u8]) -> NetResult<BufferWritableView<'a>> {
        const CONTEXT: &str = "RawSocket::recv";

        let received = unsafe {
            libc::recv(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
                0,
            )
        };
        if received < 0 {
            return Err(last_os_error(CONTEXT));
        }
        Ok(BufferWritableView::new(&mut buffer[..received as usize]))
    }

    /// True if a frame is waiting to be read (non-blocking poll).
    pub fn readable(&self) -> bool {
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pollfd, 1, 0) };
        rc > 0 && (pollfd.revents & libc::POLLIN) != 0
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl EthPacketSink for RawSocket {
    fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        _user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.send(eth_data)
    }
}

impl EthPacketSource for RawSocket {
    fn packet_available(&mut self) -> bool {
        self.readable()
    }

    fn read_eth_packet<'a>(&mut self, buffer: &'a mut [u8]) -> NetResult<BufferWritableView<'a>> {
        self.recv(buffer)
    }
}
