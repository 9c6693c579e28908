//! The UE-tracking router
//!
//! Watches the S1-AP control plane for Initial Context Setup
//! Request/Response pairs and distills them into the **UE map**:
//! UE IPv4 address → the eNodeB-side and EPC-side GTP tunnel endpoints
//! of that UE's session. Everything else the router does (forwarding
//! decisions, encapsulation, dropping) hangs off that map through
//! hooks and the [`GtpEncapSink`](crate::encap_sink::GtpEncapSink).
//!
//! Entries are never aged out: Context Release and handover procedures
//! are not interpreted, so a stale entry stays until a new pair for the
//! same UE address overwrites it or a caller removes it through
//! [`Router::ue_map_mut`].

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

use upf_net::buffer::BufferView;
use upf_net::error::NetResult;
use upf_net::gtp_u::GtpEndpoint;
use upf_net::interfaces::{ContextUserData, EthPacketSink, Ipv4PacketSink};
use upf_net::ipv4::Ipv4Decoder;
use upf_net::processor::{Context, PacketHandler};
use upf_net::types::port;
use upf_s1ap::codec::S1apCodec;
use upf_s1ap::processor::{S1apDecoder, S1apHandler, S1apProcessor};
use upf_s1ap::types::{InitialContextSetupRequest, InitialContextSetupResponse, S1apPdu};

/// Both endpoints of one UE's GTPv1-U tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GtpTunnelInfo {
    /// Endpoint on the eNodeB
    pub enb_endpoint: GtpEndpoint,
    /// Endpoint on the EPC
    pub epc_endpoint: GtpEndpoint,
}

/// UE IPv4 address → tunnel endpoints
pub type UeMap = HashMap<Ipv4Addr, GtpTunnelInfo>;

/// A shared handle on the UE map.
///
/// The router owns the map; encapsulation sinks hold a handle so they
/// can route while the router keeps learning. Everything runs on one
/// thread.
pub type UeMapHandle = Rc<RefCell<UeMap>>;

/// An entry about to be upserted into the UE map, handed mutably to the
/// `before_ue_map_upsert` hook.
pub type UeMapEntry = (Ipv4Addr, GtpTunnelInfo);

/// Pairs an Initial Context Setup Response with its Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SetupKey {
    mme_ue_s1ap_id: u32,
    enb_ue_s1ap_id: u32,
    e_rab_id: u8,
}

impl From<&InitialContextSetupRequest> for SetupKey {
    fn from(request: &InitialContextSetupRequest) -> Self {
        SetupKey {
            mme_ue_s1ap_id: request.mme_ue_s1ap_id,
            enb_ue_s1ap_id: request.enb_ue_s1ap_id,
            e_rab_id: request.e_rab_id,
        }
    }
}

impl From<&InitialContextSetupResponse> for SetupKey {
    fn from(response: &InitialContextSetupResponse) -> Self {
        SetupKey {
            mme_ue_s1ap_id: response.mme_ue_s1ap_id,
            enb_ue_s1ap_id: response.enb_ue_s1ap_id,
            e_rab_id: response.e_rab_id,
        }
    }
}

/// What a Request leaves behind while waiting for its Response.
#[derive(Debug, Clone, Copy)]
struct SetupData {
    tunnel_info: GtpTunnelInfo,
    ue_address: Ipv4Addr,
}

impl Default for SetupData {
    fn default() -> Self {
        SetupData {
            tunnel_info: GtpTunnelInfo::default(),
            ue_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}

type VoidHook<'h> = Box<dyn FnMut() + 'h>;
type UpsertHook<'h> = Box<dyn FnMut(&mut UeMapEntry) -> bool + 'h>;
type CtxHook<'h> = Box<dyn FnMut(&mut Context<'_>) -> bool + 'h>;
type FinalCtxHook<'h> = Box<dyn FnMut(&mut Context<'_>) + 'h>;

/// The router's handler: owns the maps and the user hooks, and plugs
/// into the S1-AP processor layer.
#[derive(Default)]
pub struct RouterCore<'h> {
    setup_map: HashMap<SetupKey, SetupData>,
    ue_map: UeMapHandle,

    on_s1ap_relevant_traffic: Option<VoidHook<'h>>,
    before_ue_map_upsert: Option<UpsertHook<'h>>,
    on_gtpv1u_ipv4: Option<CtxHook<'h>>,
    on_ipv4_post_process: Option<CtxHook<'h>>,
    on_non_ipv4: Option<CtxHook<'h>>,
    on_final_process: Option<FinalCtxHook<'h>>,
}

impl<'h> RouterCore<'h> {
    fn notify_s1ap_relevant_traffic(&mut self) {
        if let Some(hook) = &mut self.on_s1ap_relevant_traffic {
            hook();
        }
    }

    /// Requests travel EPC → eNodeB: record the EPC endpoint and the
    /// UE address, then wait for the matching Response.
    fn handle_requests(
        &mut self,
        requests: &[InitialContextSetupRequest],
        ctx: &mut Context<'_>,
    ) -> NetResult<bool> {
        // In practice there is exactly one item per PDU.
        self.notify_s1ap_relevant_traffic();

        for request in requests {
            let entry = self.setup_map.entry(SetupKey::from(request)).or_default();
            entry.tunnel_info.epc_endpoint.address = request.transport_layer_address;
            entry.tunnel_info.epc_endpoint.teid = request.gtp_teid;
            entry.ue_address = request.ue_address;

            log::debug!(
                "Initial Context Setup Request: mme {} enb {} e-rab {} epc {} teid 0x{:08x} ue {}",
                request.mme_ue_s1ap_id,
                request.enb_ue_s1ap_id,
                request.e_rab_id,
                request.transport_layer_address,
                request.gtp_teid,
                request.ue_address,
            );
        }

        // The SCTP packet carrying this S1-AP message must be forwarded
        // as-is, not treated like UE traffic.
        ctx.post_process_ipv4 = false;
        Ok(true)
    }

    /// Responses travel eNodeB → EPC: complete the pending entry and
    /// upsert the UE map. A Response without a pending Request is
    /// silently ignored.
    fn handle_responses(
        &mut self,
        responses: &[InitialContextSetupResponse],
        ctx: &mut Context<'_>,
    ) -> NetResult<bool> {
        self.notify_s1ap_relevant_traffic();

        for response in responses {
            let key = SetupKey::from(response);

            let Some(mut setup_data) = self.setup_map.remove(&key) else {
                log::debug!(
                    "orphan Initial Context Setup Response (mme {} enb {} e-rab {}), ignored",
                    response.mme_ue_s1ap_id,
                    response.enb_ue_s1ap_id,
                    response.e_rab_id,
                );
                continue;
            };

            setup_data.tunnel_info.enb_endpoint.address = response.transport_layer_address;
            setup_data.tunnel_info.enb_endpoint.teid = response.gtp_teid;

            // Neither message names a UDP port; a completed pair always
            // tunnels over the well-known GTPv1-U port.
            setup_data.tunnel_info.enb_endpoint.port = port::GTPV1U;
            setup_data.tunnel_info.epc_endpoint.port = port::GTPV1U;

            let mut entry: UeMapEntry = (setup_data.ue_address, setup_data.tunnel_info);

            let proceed = match &mut self.before_ue_map_upsert {
                Some(hook) => hook(&mut entry),
                None => true,
            };

            if proceed {
                log::trace!(
                    "UE map upsert: {} -> enb {}/0x{:08x}, epc {}/0x{:08x}",
                    entry.0,
                    entry.1.enb_endpoint.address,
                    entry.1.enb_endpoint.teid,
                    entry.1.epc_endpoint.address,
                    entry.1.epc_endpoint.teid,
                );
                self.ue_map.borrow_mut().insert(entry.0, entry.1);
            }
        }

        ctx.post_process_ipv4 = false;
        Ok(true)
    }
}

impl PacketHandler for RouterCore<'_> {
    /// All SCTP between eNodeBs and EPCs (S1-AP or not) is forwarded
    /// as-is: IPv4 post-processing would drop it for not belonging to
    /// any known UE.
    fn process_sctp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        ctx.post_process_ipv4 = false;
        Ok(true)
    }

    fn process_gtpv1u_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        match &mut self.on_gtpv1u_ipv4 {
            Some(hook) => Ok(hook(ctx)),
            None => Ok(true),
        }
    }

    fn post_process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        match &mut self.on_ipv4_post_process {
            Some(hook) => Ok(hook(ctx)),
            None => Ok(true),
        }
    }

    fn process_non_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        match &mut self.on_non_ipv4 {
            Some(hook) => Ok(hook(ctx)),
            None => Ok(true),
        }
    }

    fn final_process(&mut self, ctx: &mut Context<'_>) -> NetResult<()> {
        if let Some(hook) = &mut self.on_final_process {
            hook(ctx);
        }
        Ok(())
    }

    /// The router is fed bare IPv4 traffic, so final processing must
    /// fire for injected packets too.
    fn final_process_on_ipv4(&self) -> bool {
        true
    }
}

impl S1apHandler for RouterCore<'_> {
    fn process_s1ap(&mut self, ctx: &mut Context<'_>, s1ap: &S1apDecoder<'_>) -> NetResult<bool> {
        match s1ap.pdu() {
            S1apPdu::InitialContextSetupRequest(requests) => self.handle_requests(requests, ctx),
            S1apPdu::InitialContextSetupResponse(responses) => {
                self.handle_responses(responses, ctx)
            }
            S1apPdu::Other => Ok(true),
        }
    }
}

/// The stateful core of the UPF: consumes the IPv4 traffic between
/// eNodeBs and EPCs, learns UE sessions from S1-AP, and exposes the UE
/// map plus per-layer hooks to build forwarding on top of.
pub struct Router<'h, C: S1apCodec> {
    processor: S1apProcessor<RouterCore<'h>, C>,
}

impl<'h, C: S1apCodec> Router<'h, C> {
    pub fn new(codec: C) -> Self {
        Router {
            processor: S1apProcessor::new(RouterCore::default(), codec),
        }
    }

    fn core(&self) -> &RouterCore<'h> {
        self.processor.handler()
    }

    fn core_mut(&mut self) -> &mut RouterCore<'h> {
        self.processor.handler_mut()
    }

    /// Feed one IPv4 packet (the usual entry point).
    pub fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.processor.consume_ipv4_packet(ipv4_data, user_data)
    }

    /// Feed one Ethernet frame.
    pub fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.processor.consume_eth_packet(eth_data, user_data)
    }

    /// A shared handle on the UE map, for encapsulation sinks.
    pub fn ue_map_handle(&self) -> UeMapHandle {
        Rc::clone(&self.core().ue_map)
    }

    /// Read access to the UE map.
    pub fn ue_map(&self) -> Ref<'_, UeMap> {
        self.core().ue_map.borrow()
    }

    /// Write access to the UE map, e.g. to seed static entries or to
    /// remove sessions torn down out of band.
    pub fn ue_map_mut(&mut self) -> RefMut<'_, UeMap> {
        self.core().ue_map.borrow_mut()
    }

    /// Number of Requests still waiting for their Response.
    pub fn pending_setups(&self) -> usize {
        self.core().setup_map.len()
    }

    /// The tunnel info of the UE this packet comes from, if known.
    pub fn tunnel_from_known_ue(&self, ipv4: &Ipv4Decoder<'_>) -> Option<GtpTunnelInfo> {
        self.core().ue_map.borrow().get(&ipv4.src_address()).copied()
    }

    /// The tunnel info of the UE this packet goes to, if known.
    pub fn tunnel_to_known_ue(&self, ipv4: &Ipv4Decoder<'_>) -> Option<GtpTunnelInfo> {
        self.core().ue_map.borrow().get(&ipv4.dst_address()).copied()
    }

    /// True iff the packet's source or destination address belongs to a
    /// known UE.
    pub fn is_ipv4_traffic_of_known_ue(&self, ipv4_data: BufferView<'_>) -> NetResult<bool> {
        let decoder = Ipv4Decoder::new(ipv4_data)?;
        Ok(self.tunnel_from_known_ue(&decoder).is_some()
            || self.tunnel_to_known_ue(&decoder).is_some())
    }

    /// Called whenever Initial Context Setup traffic is seen.
    pub fn on_s1ap_relevant_traffic(&mut self, hook: impl FnMut() + 'h) {
        self.core_mut().on_s1ap_relevant_traffic = Some(Box::new(hook));
    }

    /// Called right before an entry is inserted or updated in the UE
    /// map. The hook may rewrite the entry; returning false vetoes the
    /// upsert (the pending setup entry is consumed either way).
    pub fn before_ue_map_upsert(&mut self, hook: impl FnMut(&mut UeMapEntry) -> bool + 'h) {
        self.core_mut().before_ue_map_upsert = Some(Box::new(hook));
    }

    /// Called on each GTPv1-U packet encapsulating IPv4 traffic.
    pub fn on_gtpv1u_ipv4(&mut self, hook: impl FnMut(&mut Context<'_>) -> bool + 'h) {
        self.core_mut().on_gtpv1u_ipv4 = Some(Box::new(hook));
    }

    /// Called on IPv4 post-processing: the phase where plain IPv4
    /// traffic gets encapsulated towards a UE or dropped. SCTP between
    /// eNodeBs and EPCs never reaches this phase, so control-plane
    /// associations survive.
    pub fn on_ipv4_post_process(&mut self, hook: impl FnMut(&mut Context<'_>) -> bool + 'h) {
        self.core_mut().on_ipv4_post_process = Some(Box::new(hook));
    }

    /// Called on non-IPv4 traffic.
    pub fn on_non_ipv4(&mut self, hook: impl FnMut(&mut Context<'_>) -> bool + 'h) {
        self.core_mut().on_non_ipv4 = Some(Box::new(hook));
    }

    /// Called at the end of processing for traffic that should be
    /// forwarded as-is.
    pub fn on_final_process(&mut self, hook: impl FnMut(&mut Context<'_>) + 'h) {
        self.core_mut().on_final_process = Some(Box::new(hook));
    }
}

impl<C: S1apCodec> Ipv4PacketSink for Router<'_, C> {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        Router::consume_ipv4_packet(self, ipv4_data, user_data)
    }
}

impl<C: S1apCodec> EthPacketSink for Router<'_, C> {
    fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        Router::consume_eth_packet(self, eth_data, user_data)
    }
}
