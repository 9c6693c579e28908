//! Minimal pcap reading and writing, no libpcap dependency
//!
//! Supported on read: Ethernet (link-type 1) and Linux "cooked"
//! (link-type 113) captures, all four magic variants. On write, either
//! Ethernet records or IPv4 records behind a synthesized cooked
//! pseudo-header.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};

use crate::buffer::{BufferView, BufferWritableView};
use crate::error::{NetError, NetResult};
use crate::eth::EthFrameDecoder;
use crate::interfaces::{
    ContextUserData, EthPacketSink, EthPacketSource, Ipv4PacketSink, Ipv4PacketSource,
};
use crate::types::{ether_type, MacAddr};

/// pcap global header length
pub const PCAP_GLOBAL_HEADER_LEN: usize = 24;

/// pcap per-record header length
pub const PCAP_RECORD_HEADER_LEN: usize = 16;

/// Linux cooked pseudo-header length
pub const LINUX_COOKED_HEADER_LEN: usize = 16;

/// Magic numbers, as read in file byte order
pub const MAGIC_NATIVE_MICROS: u32 = 0xA1B2_C3D4;
pub const MAGIC_SWAPPED_MICROS: u32 = 0xD4C3_B2A1;
pub const MAGIC_NATIVE_NANOS: u32 = 0xA1B2_3C4D;
pub const MAGIC_SWAPPED_NANOS: u32 = 0x4D3C_B2A1;

/// Link types supported on read
pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_LINUX_COOKED: u32 = 113;

/// The MAC used wherever a capture gives us no real one
pub const FAKE_MAC: MacAddr = MacAddr::new(0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE);

const WRITER_SNAPLEN: u32 = 262_144;

/// The pcap global header.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcapHeader {
    pub magic_number: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub network: u32,
}

/// The per-record header.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcapRecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub incl_len: u32,
    pub orig_len: u32,
}

/// The Linux cooked pseudo-L2 header, always network byte order.
///
/// `packet_type` values: 0 sent to us, 1 broadcast, 2 multicast,
/// 3 to someone else, 4 sent by us.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxCookedHeader {
    pub packet_type: u16,
    pub arphrd_type: u16,
    pub address_length: u16,
    pub address: [u8; 8],
    pub protocol_type: u16,
}

/// One decoded record: headers plus the number of payload bytes placed
/// in the caller's buffer.
#[derive(Debug, Clone, Copy)]
pub struct PcapRecord {
    pub header: PcapRecordHeader,
    pub linux_cooked: Option<LinuxCookedHeader>,
    pub data_len: usize,
}

/// Reads `.pcap` files record by record.
///
/// The same file can be read once (default), `repeats` times, or
/// forever (`repeats == 0`).
#[derive(Debug)]
pub struct PcapReader {
    stream: BufReader<File>,
    repeats: usize,
    loop_count: usize,
    begin_of_records: u64,
    header: PcapHeader,
    needs_swapping: bool,
    nanosecond_resolution: bool,
}

impl PcapReader {
    pub fn open(path: impl AsRef<Path>, repeats: usize) -> NetResult<Self> {
        const CONTEXT: &str = "PcapReader::open";

        let file = File::open(path).map_err(|e| NetError::io(CONTEXT, e))?;
        let mut stream = BufReader::new(file);

        let mut raw = [0u8; PCAP_GLOBAL_HEADER_LEN];
        stream
            .read_exact(&mut raw)
            .map_err(|e| NetError::io(CONTEXT, e))?;

        let mut cursor = &raw[..];
        let magic = cursor.get_u32_le();

        let (needs_swapping, nanosecond_resolution) = match magic {
            MAGIC_NATIVE_MICROS => (false, false),
            MAGIC_SWAPPED_MICROS => (true, false),
            MAGIC_NATIVE_NANOS => (false, true),
            MAGIC_SWAPPED_NANOS => (true, true),
            other => {
                return Err(NetError::malformed(
                    CONTEXT,
                    format!("unknown pcap magic number {other:#010x}"),
                ))
            }
        };

        let header = if needs_swapping {
            PcapHeader {
                magic_number: magic.swap_bytes(),
                version_major: cursor.get_u16_le().swap_bytes(),
                version_minor: cursor.get_u16_le().swap_bytes(),
                thiszone: cursor.get_i32_le().swap_bytes(),
                sigfigs: cursor.get_u32_le().swap_bytes(),
                snaplen: cursor.get_u32_le().swap_bytes(),
                network: cursor.get_u32_le().swap_bytes(),
            }
        } else {
            PcapHeader {
                magic_number: magic,
                version_major: cursor.get_u16_le(),
                version_minor: cursor.get_u16_le(),
                thiszone: cursor.get_i32_le(),
                sigfigs: cursor.get_u32_le(),
                snaplen: cursor.get_u32_le(),
                network: cursor.get_u32_le(),
            }
        };

        Ok(PcapReader {
            stream,
            repeats,
            loop_count: 0,
            begin_of_records: PCAP_GLOBAL_HEADER_LEN as u64,
            header,
            needs_swapping,
            nanosecond_resolution,
        })
    }

    /// The (endianness-adjusted) global header
    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    /// Whether timestamps carry nanoseconds instead of microseconds
    pub fn nanosecond_resolution(&self) -> bool {
        self.nanosecond_resolution
    }

    fn at_eof(&mut self) -> NetResult<bool> {
        let buf = self
            .stream
            .fill_buf()
            .map_err(|e| NetError::io("PcapReader::at_eof", e))?;
        Ok(buf.is_empty())
    }

    /// True if another record can be read (accounting for repeats).
    pub fn more_records(&mut self) -> bool {
        match self.at_eof() {
            Ok(false) => true,
            Ok(true) => self.repeats == 0 || (self.loop_count + 1) < self.repeats,
            Err(_) => false,
        }
    }

    fn rewind_to_records(&mut self) -> NetResult<()> {
        self.stream
            .seek(SeekFrom::Start(self.begin_of_records))
            .map_err(|e| NetError::io("PcapReader::rewind_to_records", e))?;
        Ok(())
    }

    /// Read the next record's payload into `buffer`.
    ///
    /// For cooked captures the pseudo-header is consumed and returned
    /// in the record; the payload alone lands in the buffer, starting
    /// at offset 0.
    pub fn read_record(&mut self, buffer: &mut [u8]) -> NetResult<PcapRecord> {
        const CONTEXT: &str = "PcapReader::read_record";

        if self.at_eof()? {
            self.loop_count += 1;
            if self.loop_count < self.repeats || self.repeats == 0 {
                self.rewind_to_records()?;
            }
        }

        if self.at_eof()? {
            return Err(NetError::Io {
                context: CONTEXT,
                cause: "no more records".to_string(),
            });
        }

        let mut raw = [0u8; PCAP_RECORD_HEADER_LEN];
        self.stream
            .read_exact(&mut raw)
            .map_err(|e| NetError::io(CONTEXT, e))?;

        let mut cursor = &raw[..];
        let mut header = PcapRecordHeader {
            ts_sec: cursor.get_u32_le(),
            ts_usec: cursor.get_u32_le(),
            incl_len: cursor.get_u32_le(),
            orig_len: cursor.get_u32_le(),
        };
        if self.needs_swapping {
            header.ts_sec = header.ts_sec.swap_bytes();
            header.ts_usec = header.ts_usec.swap_bytes();
            header.incl_len = header.incl_len.swap_bytes();
            header.orig_len = header.orig_len.swap_bytes();
        }

        let mut data_len = header.incl_len as usize;
        let mut linux_cooked = None;

        if self.header.network == LINKTYPE_LINUX_COOKED {
            if data_len < LINUX_COOKED_HEADER_LEN {
                return Err(NetError::malformed(
                    CONTEXT,
                    "record too small for a Linux cooked header",
                ));
            }

            // The cooked header is always network byte order,
            // regardless of the file's magic.
            let mut raw = [0u8; LINUX_COOKED_HEADER_LEN];
            self.stream
                .read_exact(&mut raw)
                .map_err(|e| NetError::io(CONTEXT, e))?;

            let mut cursor = &raw[..];
            let mut cooked = LinuxCookedHeader {
                packet_type: cursor.get_u16(),
                arphrd_type: cursor.get_u16(),
                address_length: cursor.get_u16(),
                address: [0u8; 8],
                protocol_type: 0,
            };
            cursor.copy_to_slice(&mut cooked.address);
            cooked.protocol_type = cursor.get_u16();

            data_len -= LINUX_COOKED_HEADER_LEN;
            linux_cooked = Some(cooked);
        }

        if data_len > buffer.len() {
            // Skip the oversized payload so the stream stays aligned
            // on the next record, then report the problem.
            std::io::copy(
                &mut (&mut self.stream).take(data_len as u64),
                &mut std::io::sink(),
            )
            .map_err(|e| NetError::io(CONTEXT, e))?;

            return Err(NetError::CapacityExceeded {
                needed: data_len,
                available: buffer.len(),
                context: CONTEXT,
            });
        }

        self.stream
            .read_exact(&mut buffer[..data_len])
            .map_err(|e| NetError::io(CONTEXT, e))?;

        if header.incl_len > self.header.snaplen {
            return Err(NetError::malformed(
                CONTEXT,
                format!(
                    "record length {} exceeds snapshot length {}",
                    header.incl_len, self.header.snaplen
                ),
            ));
        }

        Ok(PcapRecord {
            header,
            linux_cooked,
            data_len,
        })
    }
}

/// The kind of records a [`PcapWriter`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Link-type 113: each record gets a synthesized cooked header
    Ipv4,
    /// Link-type 1: records are raw Ethernet frames
    Ethernet,
}

/// Writes `.pcap` files record by record.
pub struct PcapWriter {
    mode: WriteMode,
    header_written: bool,
    stream: BufWriter<File>,
}

impl PcapWriter {
    pub fn create(path: impl AsRef<Path>, mode: WriteMode) -> NetResult<Self> {
        let file = File::create(path).map_err(|e| NetError::io("PcapWriter::create", e))?;
        Ok(PcapWriter {
            mode,
            header_written: false,
            stream: BufWriter::new(file),
        })
    }

    fn write_global_header(&mut self) -> NetResult<()> {
        let mut header = BytesMut::with_capacity(PCAP_GLOBAL_HEADER_LEN);
        header.put_u32_le(MAGIC_NATIVE_MICROS);
        header.put_u16_le(2); // version 2.4
        header.put_u16_le(4);
        header.put_i32_le(0); // thiszone
        header.put_u32_le(0); // sigfigs
        header.put_u32_le(WRITER_SNAPLEN);
        header.put_u32_le(match self.mode {
            WriteMode::Ipv4 => LINKTYPE_LINUX_COOKED,
            WriteMode::Ethernet => LINKTYPE_ETHERNET,
        });

        self.stream
            .write_all(&header)
            .map_err(|e| NetError::io("PcapWriter::write_global_header", e))
    }

    /// Append one record, stamped with the current time.
    pub fn write_record(&mut self, data: BufferView<'_>) -> NetResult<()> {
        const CONTEXT: &str = "PcapWriter::write_record";

        if !self.header_written {
            self.write_global_header()?;
            self.header_written = true;
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let mut record_len = data.size() as u32;
        if self.mode == WriteMode::Ipv4 {
            record_len += LINUX_COOKED_HEADER_LEN as u32;
        }

        let mut header = BytesMut::with_capacity(PCAP_RECORD_HEADER_LEN + LINUX_COOKED_HEADER_LEN);
        header.put_u32_le(now.as_secs() as u32);
        header.put_u32_le(now.subsec_micros());
        header.put_u32_le(record_len);
        header.put_u32_le(record_len);

        if self.mode == WriteMode::Ipv4 {
            // No L2 information is available for bare IPv4 records, so
            // declare "sent by us" over a fake Ethernet address. The
            // cooked header is network byte order.
            header.put_u16(4); // packet_type: sent by us
            header.put_u16(1); // ARPHRD: Ethernet
            header.put_u16(6); // address length
            header.put_slice(&FAKE_MAC.octets());
            header.put_slice(&[0u8; 2]); // address padding
            header.put_u16(ether_type::IPV4);
        }

        self.stream
            .write_all(&header)
            .map_err(|e| NetError::io(CONTEXT, e))?;
        self.stream
            .write_all(data.as_slice())
            .map_err(|e| NetError::io(CONTEXT, e))
    }

    /// Flush and close the file.
    pub fn close(mut self) -> NetResult<()> {
        self.stream
            .flush()
            .map_err(|e| NetError::io("PcapWriter::close", e))
    }
}

/// An `EthPacketSink` writing every frame to a pcap file.
pub struct PcapEthWriter {
    writer: PcapWriter,
}

impl PcapEthWriter {
    pub fn create(path: impl AsRef<Path>) -> NetResult<Self> {
        Ok(PcapEthWriter {
            writer: PcapWriter::create(path, WriteMode::Ethernet)?,
        })
    }

    pub fn close(self) -> NetResult<()> {
        self.writer.close()
    }
}

impl EthPacketSink for PcapEthWriter {
    fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        _user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.writer.write_record(eth_data)
    }
}

/// An Ethernet-mode pcap writer that also accepts bare IPv4 packets,
/// framing them with configurable fake MAC addresses.
pub struct PcapEthWriterPlus {
    writer: PcapWriter,
    frame_buffer: Vec<u8>,
    default_src: MacAddr,
    default_dst: MacAddr,
}

impl PcapEthWriterPlus {
    pub fn create(path: impl AsRef<Path>) -> NetResult<Self> {
        Ok(PcapEthWriterPlus {
            writer: PcapWriter::create(path, WriteMode::Ethernet)?,
            frame_buffer: vec![0u8; crate::buffer::DEFAULT_PACKET_BUFFER_SIZE],
            default_src: MacAddr::default(),
            default_dst: MacAddr::default(),
        })
    }

    /// The MAC used as the frame source when framing IPv4 packets
    pub fn set_default_src_mac(&mut self, mac: MacAddr) {
        self.default_src = mac;
    }

    /// The MAC used as the frame destination when framing IPv4 packets
    pub fn set_default_dst_mac(&mut self, mac: MacAddr) {
        self.default_dst = mac;
    }

    pub fn close(self) -> NetResult<()> {
        self.writer.close()
    }
}

impl EthPacketSink for PcapEthWriterPlus {
    fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        _user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.writer.write_record(eth_data)
    }
}

impl Ipv4PacketSink for PcapEthWriterPlus {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        _user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        const CONTEXT: &str = "PcapEthWriterPlus::consume_ipv4_packet";
        const ETH_HEADER_LEN: usize = 14;

        let frame_len = ETH_HEADER_LEN + ipv4_data.size();
        if frame_len > self.frame_buffer.len() {
            return Err(NetError::CapacityExceeded {
                needed: frame_len,
                available: self.frame_buffer.len(),
                context: CONTEXT,
            });
        }

        let mut frame = BufferWritableView::new(&mut self.frame_buffer[..frame_len]);
        frame.set_mac_at_nocheck(0, self.default_dst);
        frame.set_mac_at_nocheck(6, self.default_src);
        frame.set_u16_at_nocheck(12, ether_type::IPV4);
        frame.copy_from(ETH_HEADER_LEN, ipv4_data)?;

        self.writer.write_record(frame.as_view())
    }
}

/// An `Ipv4PacketSink` writing every packet to an IPv4-mode pcap file.
pub struct PcapIpv4Writer {
    writer: PcapWriter,
}

impl PcapIpv4Writer {
    pub fn create(path: impl AsRef<Path>) -> NetResult<Self> {
        Ok(PcapIpv4Writer {
            writer: PcapWriter::create(path, WriteMode::Ipv4)?,
        })
    }

    pub fn close(self) -> NetResult<()> {
        self.writer.close()
    }
}

impl Ipv4PacketSink for PcapIpv4Writer {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        _user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.writer.write_record(ipv4_data)
    }
}

/// An `EthPacketSource` over a pcap file.
///
/// Ethernet captures are returned as-is; cooked captures get a
/// synthesized Ethernet header in front (fake destination MAC, source
/// MAC from the cooked header when it carries one, EtherType from the
/// cooked protocol field).
pub struct PcapEthReader {
    reader: PcapReader,
}

impl PcapEthReader {
    pub fn open(path: impl AsRef<Path>, repeats: usize) -> NetResult<Self> {
        const CONTEXT: &str = "PcapEthReader::open";

        let reader = PcapReader::open(path, repeats)?;
        match reader.header().network {
            LINKTYPE_ETHERNET | LINKTYPE_LINUX_COOKED => Ok(PcapEthReader { reader }),
            other => Err(NetError::malformed(
                CONTEXT,
                format!("unsupported link type {other}"),
            )),
        }
    }

    /// The capture's snapshot length: the maximum record payload size,
    /// useful to size read buffers.
    pub fn snaplen(&self) -> usize {
        self.reader.header().snaplen as usize
    }
}

impl EthPacketSource for PcapEthReader {
    fn packet_available(&mut self) -> bool {
        self.reader.more_records()
    }

    fn read_eth_packet<'a>(&mut self, buffer: &'a mut [u8]) -> NetResult<BufferWritableView<'a>> {
        const ETH_HEADER_LEN: usize = 14;

        if self.reader.header().network == LINKTYPE_ETHERNET {
            let record = self.reader.read_record(buffer)?;
            return Ok(BufferWritableView::new(&mut buffer[..record.data_len]));
        }

        // Cooked capture: land the L3 payload after room for a
        // synthesized Ethernet header.
        if buffer.len() < ETH_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: ETH_HEADER_LEN,
                available: buffer.len(),
                context: "PcapEthReader::read_eth_packet",
            });
        }

        let record = {
            let (_, payload_area) = buffer.split_at_mut(ETH_HEADER_LEN);
            self.reader.read_record(payload_area)?
        };

        let cooked = record.linux_cooked.unwrap_or_default();
        let src_mac = if cooked.arphrd_type == 1 && cooked.address_length == 6 {
            MacAddr::new(
                cooked.address[0],
                cooked.address[1],
                cooked.address[2],
                cooked.address[3],
                cooked.address[4],
                cooked.address[5],
            )
        } else {
            FAKE_MAC
        };

        let frame_len = ETH_HEADER_LEN + record.data_len;
        let mut frame = BufferWritableView::new(&mut buffer[..frame_len]);
        frame.set_mac_at_nocheck(0, FAKE_MAC);
        frame.set_mac_at_nocheck(6, src_mac);
        frame.set_u16_at_nocheck(12, cooked.protocol_type);
        Ok(frame)
    }
}

/// An `Ipv4PacketSource` over a pcap file: non-IPv4 records come back
/// as empty views.
pub struct PcapIpv4Reader {
    reader: PcapReader,
}

impl PcapIpv4Reader {
    pub fn open(path: impl AsRef<Path>, repeats: usize) -> NetResult<Self> {
        const CONTEXT: &str = "PcapIpv4Reader::open";

        let reader = PcapReader::open(path, repeats)?;
        match reader.header().network {
            LINKTYPE_ETHERNET | LINKTYPE_LINUX_COOKED => Ok(PcapIpv4Reader { reader }),
            other => Err(NetError::malformed(
                CONTEXT,
                format!("unsupported link type {other}"),
            )),
        }
    }

    /// The capture's snapshot length
    pub fn snaplen(&self) -> usize {
        self.reader.header().snaplen as usize
    }
}

impl Ipv4PacketSource for PcapIpv4Reader {
    fn packet_available(&mut self) -> bool {
        self.reader.more_records()
    }

    fn read_ipv4_packet<'a>(&mut self, buffer: &'a mut [u8]) -> NetResult<BufferWritableView<'a>> {
        let network = self.reader.header().network;
        let record = self.reader.read_record(buffer)?;

        if network == LINKTYPE_ETHERNET {
            let (offset, length) = {
                let eth = EthFrameDecoder::new(BufferView::new(&buffer[..record.data_len]))?;
                if !eth.is_ipv4() {
                    return Ok(BufferWritableView::default());
                }
                (eth.data_offset(), eth.data_length())
            };
            return Ok(BufferWritableView::new(
                &mut buffer[offset..offset + length],
            ));
        }

        match record.linux_cooked {
            Some(cooked) if cooked.protocol_type == ether_type::IPV4 => {
                Ok(BufferWritableView::new(&mut buffer[..record.data_len]))
            }
            _ => Ok(BufferWritableView::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_eth_frame, build_ipv4_packet, build_udp_packet};
    use std::net::Ipv4Addr;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static FILE_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_pcap(tag: &str) -> PathBuf {
        let n = FILE_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "upf-net-pcap-test-{}-{}-{}.pcap",
            std::process::id(),
            tag,
            n
        ))
    }

    fn sample_frame() -> Vec<u8> {
        let udp = build_udp_packet(1000, 2000, b"abc");
        let ipv4 = build_ipv4_packet(17, Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(5, 6, 7, 8), &udp);
        build_eth_frame(0x0800, &ipv4)
    }

    #[test]
    fn test_eth_write_read_roundtrip() {
        let path = temp_pcap("eth-roundtrip");
        let frame = sample_frame();

        {
            let mut writer = PcapWriter::create(&path, WriteMode::Ethernet).unwrap();
            writer.write_record(BufferView::new(&frame)).unwrap();
            writer.write_record(BufferView::new(&frame)).unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapReader::open(&path, 1).unwrap();
        assert_eq!(reader.header().network, LINKTYPE_ETHERNET);
        assert_eq!(reader.header().version_major, 2);
        assert!(!reader.nanosecond_resolution());

        let mut buffer = vec![0u8; 4096];
        let mut count = 0;
        while reader.more_records() {
            let record = reader.read_record(&mut buffer).unwrap();
            assert_eq!(&buffer[..record.data_len], &frame[..]);
            count += 1;
        }
        assert_eq!(count, 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_ipv4_mode_prepends_cooked_header() {
        let path = temp_pcap("cooked");
        let udp = build_udp_packet(1, 2, b"p");
        let ipv4 = build_ipv4_packet(17, Ipv4Addr::new(9, 9, 9, 9), Ipv4Addr::new(8, 8, 8, 8), &udp);

        {
            let mut writer = PcapWriter::create(&path, WriteMode::Ipv4).unwrap();
            writer.write_record(BufferView::new(&ipv4)).unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapReader::open(&path, 1).unwrap();
        assert_eq!(reader.header().network, LINKTYPE_LINUX_COOKED);

        let mut buffer = vec![0u8; 4096];
        let record = reader.read_record(&mut buffer).unwrap();
        let cooked = record.linux_cooked.unwrap();
        assert_eq!(cooked.packet_type, 4); // sent by us
        assert_eq!(cooked.arphrd_type, 1);
        assert_eq!(cooked.address_length, 6);
        assert_eq!(&cooked.address[..6], &FAKE_MAC.octets());
        assert_eq!(cooked.protocol_type, 0x0800);
        assert_eq!(&buffer[..record.data_len], &ipv4[..]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_eth_reader_synthesizes_header_for_cooked() {
        let path = temp_pcap("cooked-ethreader");
        let udp = build_udp_packet(1, 2, b"q");
        let ipv4 = build_ipv4_packet(17, Ipv4Addr::new(4, 4, 4, 4), Ipv4Addr::new(6, 6, 6, 6), &udp);

        {
            let mut writer = PcapIpv4Writer::create(&path).unwrap();
            let mut user = ContextUserData::default();
            writer
                .consume_ipv4_packet(BufferView::new(&ipv4), &mut user)
                .unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapEthReader::open(&path, 1).unwrap();
        let mut buffer = vec![0u8; 4096];
        assert!(reader.packet_available());

        let frame = reader.read_eth_packet(&mut buffer).unwrap();
        let eth = EthFrameDecoder::new(frame.as_view()).unwrap();
        assert!(eth.is_ipv4());
        assert_eq!(eth.src_mac(), FAKE_MAC); // address from the cooked header
        assert_eq!(eth.dst_mac(), FAKE_MAC);
        assert_eq!(eth.data().as_slice(), &ipv4[..]);

        assert!(!reader.packet_available());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_ipv4_reader_strips_eth_and_skips_non_ipv4() {
        let path = temp_pcap("ipv4reader");
        let udp = build_udp_packet(7, 8, b"zz");
        let ipv4 = build_ipv4_packet(17, Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), &udp);

        {
            let mut writer = PcapEthWriter::create(&path).unwrap();
            let mut user = ContextUserData::default();
            writer
                .consume_eth_packet(BufferView::new(&build_eth_frame(0x0800, &ipv4)), &mut user)
                .unwrap();
            writer
                .consume_eth_packet(
                    BufferView::new(&build_eth_frame(0x86DD, &[0u8; 40])),
                    &mut user,
                )
                .unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapIpv4Reader::open(&path, 1).unwrap();
        let mut buffer = vec![0u8; 4096];

        let first = reader.read_ipv4_packet(&mut buffer).unwrap();
        assert_eq!(first.as_slice(), &ipv4[..]);

        let mut buffer2 = vec![0u8; 4096];
        let second = reader.read_ipv4_packet(&mut buffer2).unwrap();
        assert!(second.is_empty());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_repeats() {
        let path = temp_pcap("repeats");
        let frame = sample_frame();

        {
            let mut writer = PcapWriter::create(&path, WriteMode::Ethernet).unwrap();
            writer.write_record(BufferView::new(&frame)).unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapReader::open(&path, 3).unwrap();
        let mut buffer = vec![0u8; 4096];
        let mut count = 0;
        while reader.more_records() {
            reader.read_record(&mut buffer).unwrap();
            count += 1;
        }
        assert_eq!(count, 3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_magic_rejected() {
        let path = temp_pcap("badmagic");
        std::fs::write(&path, [0u8; 24]).unwrap();
        assert!(matches!(
            PcapReader::open(&path, 1).unwrap_err(),
            NetError::Malformed { .. }
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_oversized_record_is_skipped_and_reported() {
        let path = temp_pcap("oversize");
        let frame = sample_frame();

        {
            let mut writer = PcapWriter::create(&path, WriteMode::Ethernet).unwrap();
            writer.write_record(BufferView::new(&frame)).unwrap();
            writer.write_record(BufferView::new(&frame)).unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapReader::open(&path, 1).unwrap();
        let mut tiny = vec![0u8; 8];

        // First record doesn't fit; the reader must stay aligned.
        assert!(matches!(
            reader.read_record(&mut tiny).unwrap_err(),
            NetError::CapacityExceeded { .. }
        ));

        let mut buffer = vec![0u8; 4096];
        let record = reader.read_record(&mut buffer).unwrap();
        assert_eq!(&buffer[..record.data_len], &frame[..]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_eth_writer_plus_accepts_both_kinds() {
        let path = temp_pcap("writerplus");
        let udp = build_udp_packet(1, 2, b"m");
        let ipv4 = build_ipv4_packet(17, Ipv4Addr::new(3, 3, 3, 3), Ipv4Addr::new(4, 4, 4, 4), &udp);
        let frame = build_eth_frame(0x0800, &ipv4);

        {
            let mut writer = PcapEthWriterPlus::create(&path).unwrap();
            writer.set_default_src_mac(MacAddr::new(1, 1, 1, 1, 1, 1));
            writer.set_default_dst_mac(MacAddr::new(2, 2, 2, 2, 2, 2));
            let mut user = ContextUserData::default();
            writer
                .consume_eth_packet(BufferView::new(&frame), &mut user)
                .unwrap();
            writer
                .consume_ipv4_packet(BufferView::new(&ipv4), &mut user)
                .unwrap();
            writer.close().unwrap();
        }

        let mut reader = PcapEthReader::open(&path, 1).unwrap();
        let mut buffer = vec![0u8; 4096];

        let first = reader.read_eth_packet(&mut buffer).unwrap();
        assert_eq!(first.as_slice(), &frame[..]);

        let mut buffer2 = vec![0u8; 4096];
        let second = reader.read_eth_packet(&mut buffer2).unwrap();
        let eth = EthFrameDecoder::new(second.as_view()).unwrap();
        assert_eq!(eth.src_mac(), MacAddr::new(1, 1, 1, 1, 1, 1));
        assert_eq!(eth.dst_mac(), MacAddr::new(2, 2, 2, 2, 2, 2));
        assert_eq!(eth.data().as_slice(), &ipv4[..]);

        std::fs::remove_file(&path).ok();
    }
}
