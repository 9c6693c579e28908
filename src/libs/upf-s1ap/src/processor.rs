//! S1-AP-aware packet processing
//!
//! [`S1apLayer`] wraps any [`S1apHandler`] into a `PacketHandler`: the
//! generic cascade stays untouched except at the SCTP DATA chunk layer,
//! where complete chunks carrying PPID 18 are run through the codec and
//! handed to `process_s1ap`. SCTP fragments pass through undecoded.

use upf_net::buffer::BufferView;
use upf_net::error::{NetError, NetResult};
use upf_net::interfaces::ContextUserData;
use upf_net::processor::{Context, EthPacketProcessor, PacketHandler};

use crate::codec::S1apCodec;
use crate::types::S1apPdu;

/// A decoded S1AP-PDU: the raw bytes plus the projection the codec
/// produced from them.
#[derive(Debug, Clone)]
pub struct S1apDecoder<'a> {
    data: BufferView<'a>,
    pdu: S1apPdu,
}

impl<'a> S1apDecoder<'a> {
    /// Run `codec` over `s1ap_data`. A codec failure surfaces as
    /// `Malformed` and propagates to the packet boundary.
    pub fn new<C: S1apCodec>(s1ap_data: BufferView<'a>, codec: &C) -> NetResult<Self> {
        let pdu = codec
            .decode_pdu(s1ap_data.as_slice())
            .map_err(|e| NetError::malformed("S1apDecoder::new", e.to_string()))?;
        Ok(S1apDecoder {
            data: s1ap_data,
            pdu,
        })
    }

    /// The raw PDU bytes
    pub fn data(&self) -> BufferView<'a> {
        self.data
    }

    /// The projected PDU
    pub fn pdu(&self) -> &S1apPdu {
        &self.pdu
    }
}

/// A `PacketHandler` that additionally sees decoded S1-AP PDUs.
pub trait S1apHandler: PacketHandler {
    /// Called for each complete S1-AP message found in SCTP DATA
    /// chunks. The decoder is handed in alongside the layer context.
    fn process_s1ap(
        &mut self,
        _ctx: &mut Context<'_>,
        _s1ap: &S1apDecoder<'_>,
    ) -> NetResult<bool> {
        Ok(true)
    }
}

/// Wraps an [`S1apHandler`] and a codec into a `PacketHandler` for the
/// generic processor.
pub struct S1apLayer<H: S1apHandler, C: S1apCodec> {
    handler: H,
    codec: C,
}

impl<H: S1apHandler, C: S1apCodec> S1apLayer<H, C> {
    pub fn new(handler: H, codec: C) -> Self {
        S1apLayer { handler, codec }
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
}

impl<H: S1apHandler, C: S1apCodec> PacketHandler for S1apLayer<H, C> {
    fn process_eth(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_eth(ctx)
    }

    fn chain_on_process_eth(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_eth(ctx)
    }

    fn process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_ipv4(ctx)
    }

    fn chain_on_process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_ipv4(ctx)
    }

    fn process_tcp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_tcp(ctx)
    }

    fn chain_on_process_tcp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_tcp(ctx)
    }

    fn process_udp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_udp(ctx)
    }

    fn chain_on_process_udp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_udp(ctx)
    }

    fn process_sctp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_sctp(ctx)
    }

    fn chain_on_process_sctp(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_sctp(ctx)
    }

    fn process_sctp_generic_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_sctp_generic_chunk(ctx)
    }

    fn chain_on_process_sctp_generic_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_sctp_generic_chunk(ctx)
    }

    fn process_sctp_data_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_sctp_data_chunk(ctx)
    }

    /// The S1-AP chain rule: complete DATA chunks with PPID 18 are
    /// decoded and handed to the handler; fragments and other payload
    /// protocols pass through untouched.
    fn chain_on_process_sctp_data_chunk(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        let payload = match &ctx.sctp_data_chunk {
            None => return Ok(true),
            Some(chunk) => {
                // SCTP reassembly is out of scope: message fragments
                // are forwarded without S1-AP processing.
                if chunk.is_fragment() || !chunk.is_s1ap() {
                    return Ok(true);
                }
                chunk.data()?
            }
        };

        let decoder = S1apDecoder::new(payload, &self.codec)?;
        log::trace!("decoded S1AP-PDU ({} bytes)", payload.size());
        self.handler.process_s1ap(ctx, &decoder)
    }

    fn process_gtpv1u(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_gtpv1u(ctx)
    }

    fn chain_on_process_gtpv1u(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.chain_on_process_gtpv1u(ctx)
    }

    fn process_gtpv1u_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_gtpv1u_ipv4(ctx)
    }

    fn process_non_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.process_non_ipv4(ctx)
    }

    fn post_process_ipv4(&mut self, ctx: &mut Context<'_>) -> NetResult<bool> {
        self.handler.post_process_ipv4(ctx)
    }

    fn final_process(&mut self, ctx: &mut Context<'_>) -> NetResult<()> {
        self.handler.final_process(ctx)
    }

    fn final_process_on_ipv4(&self) -> bool {
        self.handler.final_process_on_ipv4()
    }
}

/// A packet processor with the S1-AP layer wired in, accepting both
/// Ethernet frames and bare IPv4 packets.
pub struct S1apProcessor<H: S1apHandler, C: S1apCodec> {
    processor: EthPacketProcessor<S1apLayer<H, C>>,
}

impl<H: S1apHandler, C: S1apCodec> S1apProcessor<H, C> {
    pub fn new(handler: H, codec: C) -> Self {
        S1apProcessor {
            processor: EthPacketProcessor::new(S1apLayer::new(handler, codec)),
        }
    }

    pub fn handler(&self) -> &H {
        self.processor.handler().handler()
    }

    pub fn handler_mut(&mut self) -> &mut H {
        self.processor.handler_mut().handler_mut()
    }

    pub fn into_handler(self) -> H {
        self.processor.into_handler().into_handler()
    }

    /// Feed one Ethernet frame.
    pub fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.processor.consume_eth_packet(eth_data, user_data)
    }

    /// Feed one bare IPv4 packet (useful for encapsulated traffic and
    /// IPv4-level captures).
    pub fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.processor.push_ipv4_packet(ipv4_data, user_data)
    }
}
