//! UPF packet router front-end
//!
//! Reads a pcap capture (Ethernet or Linux cooked), runs every IPv4
//! packet through the router, and writes an IPv4-mode pcap out:
//!
//! * GTPv1-U T-PDUs are optionally decapsulated (`--decap`);
//! * plain IPv4 traffic of known UEs matching the configured rules is
//!   re-encapsulated into the proper tunnel;
//! * everything else is forwarded as-is.
//!
//! UE sessions come from static `--ue` entries or a YAML config file;
//! there is no ASN.1 backend wired in, so live S1-AP traffic is
//! forwarded untouched.

mod config;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use clap::Parser;

use upf_net::buffer::BufferView;
use upf_net::interfaces::{ContextUserData, Ipv4PacketSink, Ipv4PacketSource};
use upf_net::ipv4::Ipv4IdentificationSource;
use upf_net::pcap::{PcapIpv4Reader, PcapIpv4Writer};
use upf_net::pool::PacketBufferPool;
use upf_router::encap_sink::GtpEncapSink;
use upf_router::router::Router;
use upf_router::rule::RuleMatcher;
use upf_s1ap::codec::NullS1apCodec;

use config::{parse_ue_flag, RouterConfig};

/// User-data tag marking a packet some hook already wrote out
const USER_DATA_CONSUMED: i32 = 100;

/// UPF packet router: pcap in, routed pcap out
#[derive(Parser, Debug)]
#[command(name = "upf-routerd")]
#[command(version)]
#[command(about = "Routes, encapsulates and decapsulates GTPv1-U traffic from a pcap capture")]
struct Args {
    /// Input pcap file (Ethernet or Linux cooked link type)
    input: String,

    /// Output pcap file (IPv4 records behind a cooked pseudo-header)
    #[arg(short = 'o', long)]
    output: String,

    /// Configuration file with static UE entries and rules
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Static UE entry: <ue>,enb=<addr>:<teid>,epc=<addr>:<teid>
    /// (repeatable)
    #[arg(long = "ue")]
    ue_entries: Vec<String>,

    /// Matching rule <proto>-<cidr>-<port> selecting traffic to
    /// encapsulate; '*' means any (repeatable)
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Write GTP-U payloads decapsulated instead of forwarding the
    /// outer packet
    #[arg(long)]
    decap: bool,

    /// Leave the UDP checksum of encapsulated packets at zero
    #[arg(long)]
    no_udp_checksum: bool,

    /// Number of times to read the input (0 = forever)
    #[arg(long, default_value = "1")]
    repeats: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,
}

/// A pcap writer shared between the pass-through path and the
/// encapsulation sink.
#[derive(Clone)]
struct SharedWriter(Rc<RefCell<PcapIpv4Writer>>);

impl Ipv4PacketSink for SharedWriter {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> upf_net::NetResult<()> {
        self.0.borrow_mut().consume_ipv4_packet(ipv4_data, user_data)
    }
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    // Assemble the UE entries and rules from the config file plus the
    // command line.
    let config = match &args.config {
        Some(path) => RouterConfig::load(path)?,
        None => RouterConfig::default(),
    };

    let mut ue_entries = Vec::new();
    for entry in &config.ue_map {
        ue_entries.push(entry.to_entry()?);
    }
    for flag in &args.ue_entries {
        ue_entries.push(parse_ue_flag(flag)?);
    }

    let mut matcher = RuleMatcher::new();
    for rule in config.rules.iter().chain(args.rules.iter()) {
        matcher.add_rule(
            rule.parse()
                .with_context(|| format!("bad matching rule {rule:?}"))?,
            RuleMatcher::END_POSITION,
        );
    }
    let matcher = Rc::new(matcher);

    let mut reader = PcapIpv4Reader::open(&args.input, args.repeats)
        .with_context(|| format!("opening {}", args.input))?;
    let writer = SharedWriter(Rc::new(RefCell::new(
        PcapIpv4Writer::create(&args.output)
            .with_context(|| format!("creating {}", args.output))?,
    )));

    let mut router = Router::new(NullS1apCodec);
    for (ue, info) in ue_entries {
        log::info!(
            "static UE {ue}: enb {}/0x{:08x} epc {}/0x{:08x}",
            info.enb_endpoint.address,
            info.enb_endpoint.teid,
            info.epc_endpoint.address,
            info.epc_endpoint.teid,
        );
        router.ue_map_mut().insert(ue, info);
    }

    let pool = PacketBufferPool::default();
    let encap_sink = {
        let mut sink = GtpEncapSink::new(
            writer.clone(),
            pool.acquire().context("acquiring encapsulation buffer")?,
            router.ue_map_handle(),
            Ipv4IdentificationSource::new(),
        );
        sink.enable_udp_checksum(!args.no_udp_checksum);
        sink.on_unknown_ue(|packet| {
            log::debug!("dropping {}-byte packet of unknown UE", packet.size());
            false
        });
        Rc::new(RefCell::new(sink))
    };

    // Decapsulation: write the inner packet, swallow the outer one.
    if args.decap {
        let decap_writer = writer.clone();
        router.on_gtpv1u_ipv4(move |ctx| {
            let Some(gtp) = ctx.gtpv1u.as_ref() else {
                return true;
            };
            match gtp.data() {
                Ok(inner) => {
                    let mut writer = decap_writer.clone();
                    if let Err(e) = writer.consume_ipv4_packet(inner, &mut ctx.user_data) {
                        log::warn!("failed to write decapsulated packet: {e}");
                    }
                    ctx.user_data.int_value = USER_DATA_CONSUMED;
                    false
                }
                Err(e) => {
                    log::warn!("undecodable GTP-U payload: {e}");
                    true
                }
            }
        });
    }

    // Post-processing: plain IPv4 traffic of a known UE matching the
    // rules goes through the encapsulation sink.
    {
        let ue_map = router.ue_map_handle();
        let matcher = Rc::clone(&matcher);
        let sink = Rc::clone(&encap_sink);

        router.on_ipv4_post_process(move |ctx| {
            let Some(ipv4) = ctx.ipv4.as_ref() else {
                return true;
            };

            let known = ue_map.borrow().contains_key(&ipv4.src_address())
                || ue_map.borrow().contains_key(&ipv4.dst_address());
            if !known {
                return true;
            }

            match matcher.matches(ipv4) {
                Ok(matched) if matched || matcher.rules().is_empty() => {
                    if let Err(e) = sink
                        .borrow_mut()
                        .consume_ipv4_packet(ipv4.packet(), &mut ctx.user_data)
                    {
                        log::warn!("encapsulation failed: {e}");
                    }
                    ctx.user_data.int_value = USER_DATA_CONSUMED;
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    log::warn!("rule matching failed: {e}");
                    true
                }
            }
        });
    }

    // Drop non-IPv4 frames (only reachable from Ethernet captures).
    router.on_non_ipv4(|_ctx| {
        log::trace!("dropping non-IPv4 frame");
        false
    });

    let mut buffer = vec![0u8; reader.snaplen().max(upf_net::DEFAULT_PACKET_BUFFER_SIZE)];
    let mut total: u64 = 0;
    let mut forwarded: u64 = 0;
    let mut errors: u64 = 0;

    while reader.packet_available() {
        let packet = match reader.read_ipv4_packet(&mut buffer) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("skipping unreadable record: {e}");
                errors += 1;
                continue;
            }
        };
        if packet.is_empty() {
            // A record that carried no IPv4 data
            continue;
        }
        total += 1;

        let mut user = ContextUserData::default();
        if let Err(e) = router.consume_ipv4_packet(packet.as_view(), &mut user) {
            log::warn!("skipping undecodable packet: {e}");
            errors += 1;
            continue;
        }

        // Whatever no hook claimed is forwarded unchanged.
        if user.int_value != USER_DATA_CONSUMED {
            let mut writer = writer.clone();
            let mut user = ContextUserData::default();
            writer.consume_ipv4_packet(packet.as_view(), &mut user)?;
            forwarded += 1;
        }
    }

    log::info!("{total} packets processed, {forwarded} forwarded as-is, {errors} skipped");
    Ok(())
}
