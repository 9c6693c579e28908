//! End-to-end scenarios: S1-AP correlation, GTP encapsulation and
//! decapsulation, rule matching.
//!
//! The S1-AP codec is a fixture here: it projects a compact test wire
//! format into the same records a real ASN.1 backend would return.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use upf_net::buffer::BufferView;
use upf_net::gtp_u::Gtpv1uDecoder;
use upf_net::interfaces::{ContextUserData, Ipv4PacketSink, Ipv4PacketTap};
use upf_net::ipv4::{Ipv4Decoder, Ipv4IdentificationSource};
use upf_net::pool::PacketBufferPool;
use upf_net::udp::UdpDecoder;
use upf_router::encap_sink::{
    GtpEncapSink, USER_DATA_TO_ENB, USER_DATA_TO_EPC, USER_DATA_UNKNOWN_UE,
};
use upf_router::router::Router;
use upf_router::rule::MatchingRule;
use upf_s1ap::codec::{S1apCodec, S1apCodecError};
use upf_s1ap::types::{InitialContextSetupRequest, InitialContextSetupResponse, S1apPdu};

// ---------------------------------------------------------------------
// Fixture codec and frame builders
// ---------------------------------------------------------------------

/// Decodes the test wire format: a tag byte (`Q` request, `P`
/// response), a count byte, then fixed-width items.
struct FixtureCodec;

impl S1apCodec for FixtureCodec {
    fn decode_pdu(&self, data: &[u8]) -> Result<S1apPdu, S1apCodecError> {
        let undecodable = || S1apCodecError::Undecodable("fixture format".to_string());

        let (&tag, rest) = data.split_first().ok_or_else(undecodable)?;
        let (&count, mut rest) = rest.split_first().ok_or_else(undecodable)?;

        let take_u32 = |rest: &mut &[u8]| -> Result<u32, S1apCodecError> {
            if rest.len() < 4 {
                return Err(undecodable());
            }
            let (head, tail) = rest.split_at(4);
            *rest = tail;
            Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
        };

        match tag {
            b'Q' => {
                let mut requests = Vec::new();
                for _ in 0..count {
                    let mme = take_u32(&mut rest)?;
                    let enb = take_u32(&mut rest)?;
                    let (&erab, tail) = rest.split_first().ok_or_else(undecodable)?;
                    rest = tail;
                    let tla = take_u32(&mut rest)?;
                    let teid = take_u32(&mut rest)?;
                    let ue = take_u32(&mut rest)?;
                    requests.push(InitialContextSetupRequest {
                        mme_ue_s1ap_id: mme,
                        enb_ue_s1ap_id: enb,
                        e_rab_id: erab,
                        transport_layer_address: Ipv4Addr::from(tla),
                        gtp_teid: teid,
                        ue_address: Ipv4Addr::from(ue),
                    });
                }
                Ok(S1apPdu::InitialContextSetupRequest(requests))
            }
            b'P' => {
                let mut responses = Vec::new();
                for _ in 0..count {
                    let mme = take_u32(&mut rest)?;
                    let enb = take_u32(&mut rest)?;
                    let (&erab, tail) = rest.split_first().ok_or_else(undecodable)?;
                    rest = tail;
                    let tla = take_u32(&mut rest)?;
                    let teid = take_u32(&mut rest)?;
                    responses.push(InitialContextSetupResponse {
                        mme_ue_s1ap_id: mme,
                        enb_ue_s1ap_id: enb,
                        e_rab_id: erab,
                        transport_layer_address: Ipv4Addr::from(tla),
                        gtp_teid: teid,
                    });
                }
                Ok(S1apPdu::InitialContextSetupResponse(responses))
            }
            _ => Ok(S1apPdu::Other),
        }
    }
}

fn encode_request(request: &InitialContextSetupRequest) -> Vec<u8> {
    let mut data = vec![b'Q', 1];
    data.extend_from_slice(&request.mme_ue_s1ap_id.to_be_bytes());
    data.extend_from_slice(&request.enb_ue_s1ap_id.to_be_bytes());
    data.push(request.e_rab_id);
    data.extend_from_slice(&u32::from(request.transport_layer_address).to_be_bytes());
    data.extend_from_slice(&request.gtp_teid.to_be_bytes());
    data.extend_from_slice(&u32::from(request.ue_address).to_be_bytes());
    data
}

fn encode_response(response: &InitialContextSetupResponse) -> Vec<u8> {
    let mut data = vec![b'P', 1];
    data.extend_from_slice(&response.mme_ue_s1ap_id.to_be_bytes());
    data.extend_from_slice(&response.enb_ue_s1ap_id.to_be_bytes());
    data.push(response.e_rab_id);
    data.extend_from_slice(&u32::from(response.transport_layer_address).to_be_bytes());
    data.extend_from_slice(&response.gtp_teid.to_be_bytes());
    data
}

fn build_ipv4_packet(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let total = 20 + payload.len();
    let mut packet = vec![0u8; total];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    packet[8] = 64;
    packet[9] = protocol;
    packet[12..16].copy_from_slice(&src.octets());
    packet[16..20].copy_from_slice(&dst.octets());
    packet[20..].copy_from_slice(payload);
    packet
}

/// Wrap an S1-AP payload into IPv4(SCTP(DATA chunk, PPID 18)).
fn build_s1ap_carrier(src: Ipv4Addr, dst: Ipv4Addr, s1ap_payload: &[u8]) -> Vec<u8> {
    let mut sctp = Vec::new();
    sctp.extend_from_slice(&36412u16.to_be_bytes());
    sctp.extend_from_slice(&36412u16.to_be_bytes());
    sctp.extend_from_slice(&[0u8; 8]); // vtag + checksum
    sctp.push(0); // DATA
    sctp.push(0x03); // B | E: complete message
    sctp.extend_from_slice(&((16 + s1ap_payload.len()) as u16).to_be_bytes());
    sctp.extend_from_slice(&[0u8; 8]); // tsn + stream
    sctp.extend_from_slice(&18u32.to_be_bytes()); // PPID: S1AP
    sctp.extend_from_slice(s1ap_payload);
    while sctp.len() % 4 != 0 {
        sctp.push(0);
    }
    build_ipv4_packet(132, src, dst, &sctp)
}

fn sample_request() -> InitialContextSetupRequest {
    InitialContextSetupRequest {
        mme_ue_s1ap_id: 1,
        enb_ue_s1ap_id: 42,
        e_rab_id: 5,
        transport_layer_address: Ipv4Addr::new(10, 0, 0, 1),
        gtp_teid: 0xAABB_CCDD,
        ue_address: Ipv4Addr::new(192, 168, 2, 2),
    }
}

fn sample_response() -> InitialContextSetupResponse {
    InitialContextSetupResponse {
        mme_ue_s1ap_id: 1,
        enb_ue_s1ap_id: 42,
        e_rab_id: 5,
        transport_layer_address: Ipv4Addr::new(10, 0, 0, 2),
        gtp_teid: 0x1122_3344,
    }
}

fn feed(router: &mut Router<'_, FixtureCodec>, packet: &[u8]) {
    let mut user = ContextUserData::default();
    router
        .consume_ipv4_packet(BufferView::new(packet), &mut user)
        .unwrap();
}

fn feed_request(router: &mut Router<'_, FixtureCodec>, request: &InitialContextSetupRequest) {
    // Requests travel MME → eNodeB
    let packet = build_s1ap_carrier(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        &encode_request(request),
    );
    feed(router, &packet);
}

fn feed_response(router: &mut Router<'_, FixtureCodec>, response: &InitialContextSetupResponse) {
    let packet = build_s1ap_carrier(
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(10, 0, 0, 1),
        &encode_response(response),
    );
    feed(router, &packet);
}

// ---------------------------------------------------------------------
// S1/S2: Request/Response correlation
// ---------------------------------------------------------------------

#[test]
fn s1_matched_pair_populates_ue_map() {
    let mut router = Router::new(FixtureCodec);

    feed_request(&mut router, &sample_request());
    assert_eq!(router.pending_setups(), 1);
    assert!(router.ue_map().is_empty());

    feed_response(&mut router, &sample_response());
    assert_eq!(router.pending_setups(), 0);

    let map = router.ue_map();
    assert_eq!(map.len(), 1);
    let info = map.get(&Ipv4Addr::new(192, 168, 2, 2)).unwrap();
    assert_eq!(info.enb_endpoint.address, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(info.enb_endpoint.port, 2152);
    assert_eq!(info.enb_endpoint.teid, 0x1122_3344);
    assert_eq!(info.epc_endpoint.address, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(info.epc_endpoint.port, 2152);
    assert_eq!(info.epc_endpoint.teid, 0xAABB_CCDD);
}

#[test]
fn s2_orphan_response_is_silently_ignored() {
    let mut router = Router::new(FixtureCodec);

    feed_response(&mut router, &sample_response());

    assert!(router.ue_map().is_empty());
    assert_eq!(router.pending_setups(), 0);
}

#[test]
fn interleaved_pairs_each_trace_back_to_a_request() {
    let mut router = Router::new(FixtureCodec);

    let mut request_b = sample_request();
    request_b.mme_ue_s1ap_id = 2;
    request_b.enb_ue_s1ap_id = 77;
    request_b.gtp_teid = 0x0000_0E9C;
    request_b.ue_address = Ipv4Addr::new(192, 168, 2, 3);

    let mut response_b = sample_response();
    response_b.mme_ue_s1ap_id = 2;
    response_b.enb_ue_s1ap_id = 77;
    response_b.gtp_teid = 0x0000_0B0B;

    feed_request(&mut router, &sample_request());
    feed_request(&mut router, &request_b);
    assert_eq!(router.pending_setups(), 2);

    // Responses arrive out of order, plus one orphan
    feed_response(&mut router, &response_b);
    let mut orphan = sample_response();
    orphan.enb_ue_s1ap_id = 9999;
    feed_response(&mut router, &orphan);
    feed_response(&mut router, &sample_response());

    assert_eq!(router.pending_setups(), 0);
    let map = router.ue_map();
    assert_eq!(map.len(), 2);
    assert_eq!(
        map.get(&Ipv4Addr::new(192, 168, 2, 3)).unwrap().enb_endpoint.teid,
        0x0000_0B0B
    );
}

#[test]
fn key_mismatch_on_any_field_means_orphan() {
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());

    let mut wrong_erab = sample_response();
    wrong_erab.e_rab_id = 6;
    feed_response(&mut router, &wrong_erab);

    assert!(router.ue_map().is_empty());
    assert_eq!(router.pending_setups(), 1); // request still pending
}

#[test]
fn upsert_hook_can_veto_and_rewrite() {
    // Veto: the pair completes, the setup entry is consumed, no map
    // entry appears.
    let mut router = Router::new(FixtureCodec);
    router.before_ue_map_upsert(|_entry| false);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());
    assert!(router.ue_map().is_empty());
    assert_eq!(router.pending_setups(), 0);

    // Rewrite: the hook may change the UE address.
    let mut router = Router::new(FixtureCodec);
    router.before_ue_map_upsert(|entry| {
        entry.0 = Ipv4Addr::new(172, 16, 0, 9);
        true
    });
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());
    let map = router.ue_map();
    assert!(map.contains_key(&Ipv4Addr::new(172, 16, 0, 9)));
    assert!(!map.contains_key(&Ipv4Addr::new(192, 168, 2, 2)));
}

#[test]
fn repeated_pair_overwrites_the_entry() {
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());

    // The same UE re-attaches with new TEIDs
    let mut request = sample_request();
    request.gtp_teid = 0x0000_1111;
    let mut response = sample_response();
    response.gtp_teid = 0x0000_2222;

    feed_request(&mut router, &request);
    feed_response(&mut router, &response);

    let map = router.ue_map();
    assert_eq!(map.len(), 1);
    let info = map.get(&Ipv4Addr::new(192, 168, 2, 2)).unwrap();
    assert_eq!(info.enb_endpoint.teid, 0x0000_2222);
    assert_eq!(info.epc_endpoint.teid, 0x0000_1111);
}

#[test]
fn s1ap_relevant_traffic_hook_counts_messages() {
    let count = Rc::new(RefCell::new(0u32));
    let seen = Rc::clone(&count);

    let mut router = Router::new(FixtureCodec);
    router.on_s1ap_relevant_traffic(move || *seen.borrow_mut() += 1);

    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());
    assert_eq!(*count.borrow(), 2);
}

// ---------------------------------------------------------------------
// Known-UE queries
// ---------------------------------------------------------------------

#[test]
fn known_ue_queries_cover_both_directions() {
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());

    let ue = Ipv4Addr::new(192, 168, 2, 2);
    let other = Ipv4Addr::new(8, 8, 8, 8);

    let from_ue = build_ipv4_packet(17, ue, other, b"up");
    let to_ue = build_ipv4_packet(17, other, ue, b"down");
    let unrelated = build_ipv4_packet(17, other, Ipv4Addr::new(9, 9, 9, 9), b"none");

    assert!(router.is_ipv4_traffic_of_known_ue(BufferView::new(&from_ue)).unwrap());
    assert!(router.is_ipv4_traffic_of_known_ue(BufferView::new(&to_ue)).unwrap());
    assert!(!router.is_ipv4_traffic_of_known_ue(BufferView::new(&unrelated)).unwrap());

    let decoder = Ipv4Decoder::new(BufferView::new(&to_ue)).unwrap();
    assert!(router.tunnel_to_known_ue(&decoder).is_some());
    assert!(router.tunnel_from_known_ue(&decoder).is_none());
}

// ---------------------------------------------------------------------
// S3: encapsulation through the sink
// ---------------------------------------------------------------------

#[test]
fn s3_plain_packet_to_known_ue_is_encapsulated() {
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());

    let pool = PacketBufferPool::new(4, 65600);
    let mut sink = GtpEncapSink::new(
        Ipv4PacketTap::new(),
        pool.acquire().unwrap(),
        router.ue_map_handle(),
        Ipv4IdentificationSource::starting_at(0x0100),
    );

    let inner = build_ipv4_packet(
        17,
        Ipv4Addr::new(8, 8, 8, 8),
        Ipv4Addr::new(192, 168, 2, 2),
        b"hello",
    );
    assert_eq!(inner.len(), 25);

    let mut user = ContextUserData::default();
    sink.consume_ipv4_packet(BufferView::new(&inner), &mut user)
        .unwrap();
    assert_eq!(user.int_value, USER_DATA_TO_ENB);

    let output = sink.destination().last_packet().to_vec();
    let ipv4 = Ipv4Decoder::new(BufferView::new(&output)).unwrap();
    assert_eq!(ipv4.src_address(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(ipv4.dst_address(), Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(ipv4.identification(), 0x0100);

    let udp = UdpDecoder::new(ipv4.data().unwrap()).unwrap();
    assert_eq!(udp.src_port(), 2152);
    assert_eq!(udp.dst_port(), 2152);

    let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
    assert_eq!(gtp.teid(), 0x1122_3344);
    assert_eq!(gtp.message_type(), 0xFF);
    assert_eq!(gtp.data().unwrap().as_slice(), &inner[..]);
}

#[test]
fn uplink_packet_from_known_ue_targets_the_epc() {
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());

    let pool = PacketBufferPool::new(4, 65600);
    let mut sink = GtpEncapSink::new(
        Ipv4PacketTap::new(),
        pool.acquire().unwrap(),
        router.ue_map_handle(),
        Ipv4IdentificationSource::new(),
    );

    let inner = build_ipv4_packet(
        17,
        Ipv4Addr::new(192, 168, 2, 2),
        Ipv4Addr::new(8, 8, 8, 8),
        b"up",
    );
    let mut user = ContextUserData::default();
    sink.consume_ipv4_packet(BufferView::new(&inner), &mut user)
        .unwrap();
    assert_eq!(user.int_value, USER_DATA_TO_EPC);

    let output = sink.destination().last_packet().to_vec();
    let ipv4 = Ipv4Decoder::new(BufferView::new(&output)).unwrap();
    assert_eq!(ipv4.src_address(), Ipv4Addr::new(10, 0, 0, 2)); // eNB
    assert_eq!(ipv4.dst_address(), Ipv4Addr::new(10, 0, 0, 1)); // EPC

    let udp = UdpDecoder::new(ipv4.data().unwrap()).unwrap();
    let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
    assert_eq!(gtp.teid(), 0xAABB_CCDD); // EPC-side TEID
}

#[test]
fn unknown_ue_is_dropped_or_reported() {
    let router: Router<'_, FixtureCodec> = Router::new(FixtureCodec);
    let pool = PacketBufferPool::new(4, 65600);

    let inner = build_ipv4_packet(
        17,
        Ipv4Addr::new(1, 1, 1, 1),
        Ipv4Addr::new(2, 2, 2, 2),
        b"lost",
    );

    // Without the hook: silent drop, nothing reaches the destination.
    let mut sink = GtpEncapSink::new(
        Ipv4PacketTap::new(),
        pool.acquire().unwrap(),
        router.ue_map_handle(),
        Ipv4IdentificationSource::new(),
    );
    let mut user = ContextUserData::default();
    sink.consume_ipv4_packet(BufferView::new(&inner), &mut user)
        .unwrap();
    assert!(sink.destination().last_packet().is_empty());
    assert_eq!(user.int_value, 0);

    // With a hook returning true: an empty view is emitted, tagged 3.
    let observed = Rc::new(RefCell::new(Vec::new()));
    let observer = Rc::clone(&observed);
    let mut sink = GtpEncapSink::new(
        Ipv4PacketTap::new(),
        pool.acquire().unwrap(),
        router.ue_map_handle(),
        Ipv4IdentificationSource::new(),
    );
    sink.on_unknown_ue(move |packet| {
        observer.borrow_mut().extend_from_slice(packet.as_slice());
        true
    });

    let mut user = ContextUserData::default();
    sink.consume_ipv4_packet(BufferView::new(&inner), &mut user)
        .unwrap();
    assert_eq!(user.int_value, USER_DATA_UNKNOWN_UE);
    assert_eq!(*observed.borrow(), inner);
    assert!(sink.destination().last_packet().is_empty());
    assert_eq!(sink.destination().last_user_data().int_value, USER_DATA_UNKNOWN_UE);
}

#[test]
fn udp_checksum_can_be_disabled_on_the_sink() {
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());

    let pool = PacketBufferPool::new(2, 65600);
    let mut sink = GtpEncapSink::new(
        Ipv4PacketTap::new(),
        pool.acquire().unwrap(),
        router.ue_map_handle(),
        Ipv4IdentificationSource::new(),
    );
    sink.enable_udp_checksum(false);

    let inner = build_ipv4_packet(
        17,
        Ipv4Addr::new(8, 8, 8, 8),
        Ipv4Addr::new(192, 168, 2, 2),
        b"nochk",
    );
    let mut user = ContextUserData::default();
    sink.consume_ipv4_packet(BufferView::new(&inner), &mut user)
        .unwrap();

    let output = sink.destination().last_packet().to_vec();
    let ipv4 = Ipv4Decoder::new(BufferView::new(&output)).unwrap();
    let udp = UdpDecoder::new(ipv4.data().unwrap()).unwrap();
    assert_eq!(udp.checksum(), 0x0000);
}

// ---------------------------------------------------------------------
// S4: decapsulation through the processor
// ---------------------------------------------------------------------

#[test]
fn s4_gtp_packet_fires_the_decap_hook_once() {
    // Build the S3 packet first.
    let mut router = Router::new(FixtureCodec);
    feed_request(&mut router, &sample_request());
    feed_response(&mut router, &sample_response());

    let pool = PacketBufferPool::new(2, 65600);
    let mut sink = GtpEncapSink::new(
        Ipv4PacketTap::new(),
        pool.acquire().unwrap(),
        router.ue_map_handle(),
        Ipv4IdentificationSource::new(),
    );

    let inner = build_ipv4_packet(
        17,
        Ipv4Addr::new(8, 8, 8, 8),
        Ipv4Addr::new(192, 168, 2, 2),
        b"hello",
    );
    let mut user = ContextUserData::default();
    sink.consume_ipv4_packet(BufferView::new(&inner), &mut user)
        .unwrap();
    let encapsulated = sink.destination().last_packet().to_vec();

    // Feed it back through a fresh router with counting hooks.
    let decapsulated = Rc::new(RefCell::new(Vec::new()));
    let non_ipv4_hits = Rc::new(RefCell::new(0u32));
    let post_process_hits = Rc::new(RefCell::new(0u32));

    let mut observer = Router::new(FixtureCodec);
    {
        let sink = Rc::clone(&decapsulated);
        observer.on_gtpv1u_ipv4(move |ctx| {
            let gtp = ctx.gtpv1u.as_ref().expect("gtp decoder in context");
            sink.borrow_mut()
                .push(gtp.data().unwrap().as_slice().to_vec());
            // The packet is consumed here; stop the descent.
            false
        });
    }
    {
        let hits = Rc::clone(&non_ipv4_hits);
        observer.on_non_ipv4(move |_ctx| {
            *hits.borrow_mut() += 1;
            true
        });
    }
    {
        let hits = Rc::clone(&post_process_hits);
        observer.on_ipv4_post_process(move |_ctx| {
            *hits.borrow_mut() += 1;
            true
        });
    }

    let mut user = ContextUserData::default();
    observer
        .consume_ipv4_packet(BufferView::new(&encapsulated), &mut user)
        .unwrap();

    let decapsulated = decapsulated.borrow();
    assert_eq!(decapsulated.len(), 1);
    assert_eq!(decapsulated[0], inner);
    // The decap hook stopped the descent: no other hook fired.
    assert_eq!(*non_ipv4_hits.borrow(), 0);
    assert_eq!(*post_process_hits.borrow(), 0);
}

// ---------------------------------------------------------------------
// S5: non-IPv4 traffic at the Ethernet level
// ---------------------------------------------------------------------

#[test]
fn s5_ipv6_frame_hits_only_the_non_ipv4_path() {
    fn ipv6_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&0x86DDu16.to_be_bytes());
        frame.extend_from_slice(&[0u8; 40]);
        frame
    }

    for (hook_result, expect_final) in [(true, 1u32), (false, 0u32)] {
        let non_ipv4_hits = Rc::new(RefCell::new(0u32));
        let ipv4_post_hits = Rc::new(RefCell::new(0u32));
        let final_hits = Rc::new(RefCell::new(0u32));

        let mut router = Router::new(FixtureCodec);
        {
            let hits = Rc::clone(&non_ipv4_hits);
            router.on_non_ipv4(move |_ctx| {
                *hits.borrow_mut() += 1;
                hook_result
            });
        }
        {
            let hits = Rc::clone(&ipv4_post_hits);
            router.on_ipv4_post_process(move |_ctx| {
                *hits.borrow_mut() += 1;
                true
            });
        }
        {
            let hits = Rc::clone(&final_hits);
            router.on_final_process(move |_ctx| *hits.borrow_mut() += 1);
        }

        let mut user = ContextUserData::default();
        router
            .consume_eth_packet(BufferView::new(&ipv6_frame()), &mut user)
            .unwrap();

        assert_eq!(*non_ipv4_hits.borrow(), 1);
        assert_eq!(*ipv4_post_hits.borrow(), 0);
        assert_eq!(*final_hits.borrow(), expect_final);
    }
}

// ---------------------------------------------------------------------
// SCTP forwarding override
// ---------------------------------------------------------------------

#[test]
fn sctp_traffic_skips_ipv4_post_processing_but_reaches_final() {
    let post_hits = Rc::new(RefCell::new(0u32));
    let final_hits = Rc::new(RefCell::new(0u32));

    let mut router = Router::new(FixtureCodec);
    {
        let hits = Rc::clone(&post_hits);
        router.on_ipv4_post_process(move |_ctx| {
            *hits.borrow_mut() += 1;
            // Would drop the packet, were it ever called on SCTP
            false
        });
    }
    {
        let hits = Rc::clone(&final_hits);
        router.on_final_process(move |_ctx| *hits.borrow_mut() += 1);
    }

    // Non-S1AP SCTP between eNodeB and EPC (PPID 46, DIAMETER-ish)
    let mut sctp = Vec::new();
    sctp.extend_from_slice(&1234u16.to_be_bytes());
    sctp.extend_from_slice(&5678u16.to_be_bytes());
    sctp.extend_from_slice(&[0u8; 8]);
    sctp.push(0);
    sctp.push(0x03);
    sctp.extend_from_slice(&20u16.to_be_bytes());
    sctp.extend_from_slice(&[0u8; 8]);
    sctp.extend_from_slice(&46u32.to_be_bytes());
    sctp.extend_from_slice(b"won\0");
    let packet = build_ipv4_packet(132, Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1), &sctp);

    let mut user = ContextUserData::default();
    router
        .consume_ipv4_packet(BufferView::new(&packet), &mut user)
        .unwrap();

    assert_eq!(*post_hits.borrow(), 0);
    assert_eq!(*final_hits.borrow(), 1);
}

// ---------------------------------------------------------------------
// S6: rule matching against live packets
// ---------------------------------------------------------------------

#[test]
fn s6_rule_distinguishes_tcp_from_udp() {
    let rule: MatchingRule = "6-192.168.1.0/24-80".parse().unwrap();

    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&40000u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&80u16.to_be_bytes());
    tcp[12] = 0x50;
    let tcp_packet = build_ipv4_packet(
        6,
        Ipv4Addr::new(9, 9, 9, 9),
        Ipv4Addr::new(192, 168, 1, 7),
        &tcp,
    );
    let decoder = Ipv4Decoder::new(BufferView::new(&tcp_packet)).unwrap();
    assert!(rule.matches(&decoder).unwrap());

    let mut udp = vec![0u8; 8];
    udp[0..2].copy_from_slice(&40000u16.to_be_bytes());
    udp[2..4].copy_from_slice(&80u16.to_be_bytes());
    udp[4..6].copy_from_slice(&8u16.to_be_bytes());
    let udp_packet = build_ipv4_packet(
        17,
        Ipv4Addr::new(9, 9, 9, 9),
        Ipv4Addr::new(192, 168, 1, 7),
        &udp,
    );
    let decoder = Ipv4Decoder::new(BufferView::new(&udp_packet)).unwrap();
    assert!(!rule.matches(&decoder).unwrap());
}
