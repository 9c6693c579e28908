//! Layered packet processor
//!
//! The processor drives the decoder stack over each packet and calls
//! back into a [`PacketHandler`] at every layer. Handlers are a flat
//! dispatch surface: implement the trait on a type of your own, or fill
//! a [`HookTable`] with closures. There is no inheritance; layered
//! behaviors compose by wrapping one handler in another.
//!
//! Hook results split cleanly: `Err` carries a decode failure to the
//! packet boundary, `Ok(false)` skips the rest of this packet's descent,
//! `Ok(true)` continues.

use crate::buffer::BufferView;
use crate::error::NetResult;
use crate::eth::EthFrameDecoder;
use crate::gtp_u::Gtpv1uDecoder;
use crate::interfaces::ContextUserData;
use crate::ipv4::Ipv4Decoder;
use crate::sctp::{SctpDataChunkDecoder, SctpDecoder, SctpGenericChunkDecoder};
use crate::tcp::TcpDecoder;
use crate::udp::UdpDecoder;

/// Per-packet context handed to every hook.
///
/// Each layer's decoder is present exactly while that layer is being
/// processed and cleared again on layer exit.
#[derive(Debug, Default)]
pub struct Context<'a> {
    pub eth_frame: Option<EthFrameDecoder<'a>>,
    pub ipv4: Option<Ipv4Decoder<'a>>,
    pub tcp: Option<TcpDecoder<'a>>,
    pub udp: Option<UdpDecoder<'a>>,
    pub gtpv1u: Option<Gtpv1uDecoder<'a>>,
    pub sctp: Option<SctpDecoder<'a>>,
    pub sctp_generic_chunk: Option<SctpGenericChunkDecoder<'a>>,
    pub sctp_data_chunk: Option<SctpDataChunkDecoder<'a>>,

    /// When still true after a packet's descent, `post_process_ipv4`
    /// runs on IPv4 data. Hooks clear this to veto post-processing for
    /// traffic that must be forwarded as-is.
    pub post_process_ipv4: bool,

    /// Carried through from the sink interface, opaque to the core
    pub user_data: ContextUserData,
}

impl<'a> Context<'a> {
    fn new(user_data: ContextUserData) -> Self {
        Context {
            post_process_ipv4: true,
            user_data,
            ..Default::default()
        }
    }
}

/// The per-layer hooks of the processor.
///
/// All hooks default to "do nothing, continue". For every layer `L`,
/// `process_L` is the domain hook and `chain_on_process_L` is reserved
/// for wrapping handlers that extend the cascade, so the wrapped
/// handler's `process_L` stays free for its own users.
pub trait PacketHandler {
    fn process_eth(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_eth(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn process_ipv4(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_ipv4(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn process_tcp(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_tcp(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn process_udp(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_udp(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn process_sctp(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_sctp(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    /// Called once per SCTP chunk
    fn process_sctp_generic_chunk(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_sctp_generic_chunk(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    /// Called once per SCTP DATA chunk
    fn process_sctp_data_chunk(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_sctp_data_chunk(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn process_gtpv1u(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    fn chain_on_process_gtpv1u(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    /// Called on GTPv1-U packets whose payload is IPv4 (T-PDU)
    fn process_gtpv1u_ipv4(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    /// Called on Ethernet frames not carrying IPv4
    fn process_non_ipv4(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    /// Runs after a packet's IPv4 descent, unless some hook cleared
    /// `Context::post_process_ipv4`
    fn post_process_ipv4(&mut self, _ctx: &mut Context<'_>) -> NetResult<bool> {
        Ok(true)
    }

    /// Runs once at the end, when no traversed hook stopped processing
    fn final_process(&mut self, _ctx: &mut Context<'_>) -> NetResult<()> {
        Ok(())
    }

    /// Whether final processing is anchored at the IPv4 level instead
    /// of the Ethernet level. Handlers that consume bare IPv4 packets
    /// (via [`EthPacketProcessor::push_ipv4_packet`]) return true so
    /// injected traffic fires `final_process` too.
    fn final_process_on_ipv4(&self) -> bool {
        false
    }
}

/// The layered dispatcher.
///
/// Layer cascade for an Ethernet frame:
/// Eth → (IPv4 | non-IPv4); IPv4 → (UDP | TCP | SCTP | other);
/// UDP → GTPv1-U when the heuristic matches → IPv4 PDU;
/// SCTP → chunks → DATA chunk.
///
/// Within one layer hooks fire in order `process_L`,
/// `chain_on_process_L`, descent, then (for IPv4) `post_process_ipv4`.
/// A hook returning `Ok(false)` aborts this path's descent; siblings
/// and the layers above still finish their own sequence.
pub struct EthPacketProcessor<H: PacketHandler> {
    handler: H,
}

impl<H: PacketHandler> EthPacketProcessor<H> {
    pub fn new(handler: H) -> Self {
        EthPacketProcessor { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Feed one Ethernet frame through the cascade.
    pub fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        let mut ctx = Context::new(*user_data);

        let eth = EthFrameDecoder::new(eth_data)?;
        let is_ipv4 = eth.is_ipv4();
        let eth_payload = eth.data();
        ctx.eth_frame = Some(eth);

        if self.handler.process_eth(&mut ctx)? && self.handler.chain_on_process_eth(&mut ctx)? {
            if is_ipv4 {
                if self.process_ipv4_layer(eth_payload, &mut ctx)? {
                    self.handler.final_process(&mut ctx)?;
                }
            } else if self.handler.process_non_ipv4(&mut ctx)? {
                self.handler.final_process(&mut ctx)?;
            }
        }

        *user_data = ctx.user_data;
        Ok(())
    }

    /// Inject an IPv4 packet directly, entering the cascade at the IPv4
    /// layer. `Context::eth_frame` stays empty, and `final_process`
    /// fires only for handlers anchored at the IPv4 level.
    pub fn push_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        let mut ctx = Context::new(*user_data);

        let continue_processing = self.process_ipv4_layer(ipv4_data, &mut ctx)?;
        if continue_processing && self.handler.final_process_on_ipv4() {
            self.handler.final_process(&mut ctx)?;
        }

        *user_data = ctx.user_data;
        Ok(())
    }

    fn process_ipv4_layer<'a>(
        &mut self,
        ipv4_data: BufferView<'a>,
        ctx: &mut Context<'a>,
    ) -> NetResult<bool> {
        let ipv4 = Ipv4Decoder::new(ipv4_data)?;
        let is_udp = ipv4.is_udp();
        let is_sctp = ipv4.is_sctp();
        let is_tcp = ipv4.is_tcp();
        ctx.ipv4 = Some(ipv4.clone());

        let mut continue_processing = false;
        if self.handler.process_ipv4(ctx)? && self.handler.chain_on_process_ipv4(ctx)? {
            continue_processing = if is_udp {
                self.process_udp_layer(ipv4.data()?, ctx)?
            } else if is_sctp {
                self.process_sctp_layer(ipv4.data()?, ctx)?
            } else if is_tcp {
                self.process_tcp_layer(ipv4.data()?, ctx)?
            } else {
                true
            };

            if continue_processing && ctx.post_process_ipv4 {
                continue_processing = self.handler.post_process_ipv4(ctx)?;
            }
        }

        ctx.ipv4 = None;
        Ok(continue_processing)
    }

    fn process_udp_layer<'a>(
        &mut self,
        udp_data: BufferView<'a>,
        ctx: &mut Context<'a>,
    ) -> NetResult<bool> {
        let udp = UdpDecoder::new(udp_data)?;
        let gtp_data = if udp.is_gtpv1u() {
            Some(udp.data()?)
        } else {
            None
        };
        ctx.udp = Some(udp);

        let mut continue_processing = false;
        if self.handler.process_udp(ctx)? && self.handler.chain_on_process_udp(ctx)? {
            match gtp_data {
                Some(gtp_data) => {
                    let gtp = Gtpv1uDecoder::new(gtp_data)?;
                    let is_ipv4_pdu = gtp.is_ipv4_pdu();
                    ctx.gtpv1u = Some(gtp);

                    if self.handler.process_gtpv1u(ctx)?
                        && self.handler.chain_on_process_gtpv1u(ctx)?
                    {
                        continue_processing = if is_ipv4_pdu {
                            self.handler.process_gtpv1u_ipv4(ctx)?
                        } else {
                            true
                        };
                    }

                    ctx.gtpv1u = None;
                }
                None => continue_processing = true,
            }
        }

        ctx.udp = None;
        Ok(continue_processing)
    }

    fn process_sctp_layer<'a>(
        &mut self,
        sctp_data: BufferView<'a>,
        ctx: &mut Context<'a>,
    ) -> NetResult<bool> {
        let sctp = SctpDecoder::new(sctp_data)?;
        let chunks = sctp.chunks().to_vec();
        ctx.sctp = Some(sctp);

        let mut continue_processing = false;
        if self.handler.process_sctp(ctx)? && self.handler.chain_on_process_sctp(ctx)? {
            for chunk in chunks {
                let is_data = chunk.is_data_chunk();
                let chunk_view = chunk.data();
                ctx.sctp_generic_chunk = Some(chunk);

                if self.handler.process_sctp_generic_chunk(ctx)?
                    && self.handler.chain_on_process_sctp_generic_chunk(ctx)?
                {
                    if is_data {
                        let data_chunk = SctpDataChunkDecoder::new(chunk_view)?;
                        ctx.sctp_data_chunk = Some(data_chunk);

                        if self.handler.process_sctp_data_chunk(ctx)?
                            && self.handler.chain_on_process_sctp_data_chunk(ctx)?
                        {
                            continue_processing = true;
                        }

                        ctx.sctp_data_chunk = None;
                    } else {
                        // Non-DATA chunks don't stop the packet from
                        // reaching the end of processing.
                        continue_processing = true;
                    }
                }

                ctx.sctp_generic_chunk = None;
            }
        }

        ctx.sctp = None;
        Ok(continue_processing)
    }

    fn process_tcp_layer<'a>(
        &mut self,
        tcp_data: BufferView<'a>,
        ctx: &mut Context<'a>,
    ) -> NetResult<bool> {
        let tcp = TcpDecoder::new(tcp_data)?;
        ctx.tcp = Some(tcp);

        let mut continue_processing = false;
        if self.handler.process_tcp(ctx)? && self.handler.chain_on_process_tcp(ctx)? {
            continue_processing = true;
        }

        ctx.tcp = None;
        Ok(continue_processing)
    }
}

/// A boolean hook held in a [`HookTable`]
pub type HookFn<'h> = Box<dyn FnMut(&mut Context<'_>) -> bool + 'h>;

/// The final-process hook held in a [`HookTable`]
pub type FinalHookFn<'h> = Box<dyn FnMut(&mut Context<'_>) + 'h>;

/// A configuration record of optional per-layer closures.
///
/// A slot left empty behaves like the default hook (continue). Useful
/// for ad-hoc processors where defining a handler type is overkill.
#[derive(Default)]
pub struct HookTable<'h> {
    pub process_eth: Option<HookFn<'h>>,
    pub chain_on_process_eth: Option<HookFn<'h>>,
    pub process_ipv4: Option<HookFn<'h>>,
    pub chain_on_process_ipv4: Option<HookFn<'h>>,
    pub process_tcp: Option<HookFn<'h>>,
    pub chain_on_process_tcp: Option<HookFn<'h>>,
    pub process_udp: Option<HookFn<'h>>,
    pub chain_on_process_udp: Option<HookFn<'h>>,
    pub process_sctp: Option<HookFn<'h>>,
    pub chain_on_process_sctp: Option<HookFn<'h>>,
    pub process_sctp_generic_chunk: Option<HookFn<'h>>,
    pub chain_on_process_sctp_generic_chunk: Option<HookFn<'h>>,
    pub process_sctp_data_chunk: Option<HookFn<'h>>,
    pub chain_on_process_sctp_data_chunk: Option<HookFn<'h>>,
    pub process_gtpv1u: Option<HookFn<'h>>,
    pub chain_on_process_gtpv1u: Option<HookFn<'h>>,
    pub process_gtpv1u_ipv4: Option<HookFn<'h>>,
    pub process_non_ipv4: Option<HookFn<'h>>,
    pub post_process_ipv4: Option<HookFn<'h>>,
    pub final_process: Option<FinalHookFn<'h>>,
    pub final_process_on_ipv4: bool,
}

fn run_hook(slot: &mut Option<HookFn<'_>>, ctx: &mut Context<'_>) -> NetResult<bool> {
    match slot {
        Some(hook) => Ok(hook(ctx)),
        None => Ok(true),
    }
}

impl PacketHandler for HookTable<'_> {
    fn process_eth(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_eth, ctx)
    }

    fn chain_on_process_eth(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_eth, ctx)
    }

    fn process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_ipv4, ctx)
    }

    fn chain_on_process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_ipv4, ctx)
    }

    fn process_tcp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_tcp, ctx)
    }

    fn chain_on_process_tcp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_tcp, ctx)
    }

    fn process_udp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_udp, ctx)
    }

    fn chain_on_process_udp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_udp, ctx)
    }

    fn process_sctp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_sctp, ctx)
    }

    fn chain_on_process_sctp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_sctp, ctx)
    }

    fn process_sctp_generic_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_sctp_generic_chunk, ctx)
    }

    fn chain_on_process_sctp_generic_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_sctp_generic_chunk, ctx)
    }

    fn process_sctp_data_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_sctp_data_chunk, ctx)
    }

    fn chain_on_process_sctp_data_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_sctp_data_chunk, ctx)
    }

    fn process_gtpv1u(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_gtpv1u, ctx)
    }

    fn chain_on_process_gtpv1u(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.chain_on_process_gtpv1u, ctx)
    }

    fn process_gtpv1u_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_gtpv1u_ipv4, ctx)
    }

    fn process_non_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.process_non_ipv4, ctx)
    }

    fn post_process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        run_hook(&mut self.post_process_ipv4, ctx)
    }

    fn final_process(&mut self, ctx: &mut Context<'_>) -> NetResult<()> {
        if let Some(hook) = &mut self.final_process {
            hook(ctx);
        }
        Ok(())
    }

    fn final_process_on_ipv4(&self) -> bool {
        self.final_process_on_ipv4
    }
}
