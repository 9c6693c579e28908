//! GTPv1-U encapsulation sink
//!
//! Accepts plain IPv4 packets and, using the router's UE map, wraps
//! each one into a GTPv1-U tunnel towards the proper endpoint before
//! handing it to a downstream sink.

use upf_net::buffer::BufferView;
use upf_net::encap::GtpIpv4Encap;
use upf_net::error::NetResult;
use upf_net::interfaces::{ContextUserData, Ipv4PacketSink};
use upf_net::ipv4::{Ipv4Decoder, Ipv4IdentificationSource};
use upf_net::pool::PooledBuffer;

use crate::router::{GtpTunnelInfo, UeMapHandle};

/// User-data tag: the packet was encapsulated towards the eNodeB
pub const USER_DATA_TO_ENB: i32 = 1;
/// User-data tag: the packet was encapsulated towards the EPC
pub const USER_DATA_TO_EPC: i32 = 0;
/// User-data tag: unknown UE, an empty view was emitted downstream
pub const USER_DATA_UNKNOWN_UE: i32 = 3;

enum Direction {
    ToUe(GtpTunnelInfo),
    FromUe(GtpTunnelInfo),
    Unknown,
}

type UnknownUeHook<'h> = Box<dyn FnMut(BufferView<'_>) -> bool + 'h>;

/// An `Ipv4PacketSink` encapsulating traffic of known UEs.
///
/// Traffic **to** a known UE leaves as EPC → eNodeB with the eNodeB
/// TEID; traffic **from** a known UE leaves as eNodeB → EPC with the
/// EPC TEID. For unknown UEs: with no `on_unknown_ue` hook installed
/// the packet is silently dropped; with one installed, the hook sees
/// the packet and, when it returns true, an empty view is emitted to
/// the downstream sink so a later stage can observe the drop.
pub struct GtpEncapSink<'h, D: Ipv4PacketSink> {
    destination: D,
    buffer: PooledBuffer,
    ue_map: UeMapHandle,
    identification_source: Ipv4IdentificationSource,
    enable_udp_checksum: bool,
    on_unknown_ue: Option<UnknownUeHook<'h>>,
}

impl<'h, D: Ipv4PacketSink> GtpEncapSink<'h, D> {
    /// `buffer` is the encapsulation work area (one pool slot);
    /// `identification_source` feeds the IPv4 identification of every
    /// packet built here.
    pub fn new(
        destination: D,
        buffer: PooledBuffer,
        ue_map: UeMapHandle,
        identification_source: Ipv4IdentificationSource,
    ) -> Self {
        GtpEncapSink {
            destination,
            buffer,
            ue_map,
            identification_source,
            enable_udp_checksum: true,
            on_unknown_ue: None,
        }
    }

    /// Enable/disable the UDP checksum on built packets (default:
    /// enabled).
    pub fn enable_udp_checksum(&mut self, enable: bool) {
        self.enable_udp_checksum = enable;
    }

    /// Install the unknown-UE hook.
    pub fn on_unknown_ue(&mut self, hook: impl FnMut(BufferView<'_>) -> bool + 'h) {
        self.on_unknown_ue = Some(Box::new(hook));
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }

    fn classify(&self, decoder: &Ipv4Decoder<'_>) -> Direction {
        let map = self.ue_map.borrow();

        // There is typically far more traffic towards UEs than from
        // them, so look up the destination first.
        if let Some(info) = map.get(&decoder.dst_address()) {
            Direction::ToUe(*info)
        } else if let Some(info) = map.get(&decoder.src_address()) {
            Direction::FromUe(*info)
        } else {
            Direction::Unknown
        }
    }
}

impl<D: Ipv4PacketSink> Ipv4PacketSink for GtpEncapSink<'_, D> {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        let decoder = Ipv4Decoder::new(ipv4_data)?;

        let (src, dst, teid) = match self.classify(&decoder) {
            Direction::ToUe(info) => {
                user_data.int_value = USER_DATA_TO_ENB;
                (
                    info.epc_endpoint.address,
                    info.enb_endpoint.address,
                    info.enb_endpoint.teid,
                )
            }
            Direction::FromUe(info) => {
                user_data.int_value = USER_DATA_TO_EPC;
                (
                    info.enb_endpoint.address,
                    info.epc_endpoint.address,
                    info.epc_endpoint.teid,
                )
            }
            Direction::Unknown => {
                log::debug!(
                    "IPv4 traffic {} -> {} matches no known UE",
                    decoder.src_address(),
                    decoder.dst_address(),
                );
                if let Some(hook) = &mut self.on_unknown_ue {
                    if hook(ipv4_data) {
                        user_data.int_value = USER_DATA_UNKNOWN_UE;
                        return self
                            .destination
                            .consume_ipv4_packet(BufferView::empty(), user_data);
                    }
                }
                return Ok(());
            }
        };

        let identification = self.identification_source.get();

        let mut encap = GtpIpv4Encap::new(self.buffer.writable_view())?;
        encap.enable_udp_checksum(self.enable_udp_checksum);
        encap
            .init()
            .set_src_address(src)
            .set_dst_address(dst)
            .set_teid(teid)
            .set_identification(identification);
        encap.set_payload(ipv4_data)?;
        encap.compute_and_set_checksums();

        self.destination
            .consume_ipv4_packet(encap.ipv4_packet(), user_data)
    }
}
