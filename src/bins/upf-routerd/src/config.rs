//! YAML configuration: static UE-map entries and matching rules

use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;

use upf_net::gtp_u::GtpEndpoint;
use upf_net::types::port;
use upf_router::router::GtpTunnelInfo;

/// Top-level configuration file.
///
/// ```yaml
/// ue_map:
///   - ue: 192.168.2.2
///     enb_address: 10.0.0.2
///     enb_teid: "0x11223344"
///     epc_address: 10.0.0.1
///     epc_teid: "0xaabbccdd"
/// rules:
///   - "6-192.168.1.0/24-80"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    #[serde(default)]
    pub ue_map: Vec<UeEntryConfig>,

    #[serde(default)]
    pub rules: Vec<String>,
}

/// One static UE-map entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UeEntryConfig {
    pub ue: String,
    pub enb_address: String,
    pub enb_teid: String,
    pub epc_address: String,
    pub epc_teid: String,
}

impl RouterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Parse a TEID given as decimal or 0x-prefixed hex.
pub fn parse_teid(s: &str) -> Result<u32> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.with_context(|| format!("bad TEID {s:?}"))
}

fn parse_address(s: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse()
        .with_context(|| format!("bad IPv4 address {s:?}"))
}

impl UeEntryConfig {
    pub fn to_entry(&self) -> Result<(Ipv4Addr, GtpTunnelInfo)> {
        Ok((
            parse_address(&self.ue)?,
            GtpTunnelInfo {
                enb_endpoint: GtpEndpoint::new(
                    parse_address(&self.enb_address)?,
                    port::GTPV1U,
                    parse_teid(&self.enb_teid)?,
                ),
                epc_endpoint: GtpEndpoint::new(
                    parse_address(&self.epc_address)?,
                    port::GTPV1U,
                    parse_teid(&self.epc_teid)?,
                ),
            },
        ))
    }
}

/// Parse a `--ue` command-line entry:
/// `<ue>,enb=<addr>:<teid>,epc=<addr>:<teid>`.
pub fn parse_ue_flag(s: &str) -> Result<(Ipv4Addr, GtpTunnelInfo)> {
    let mut parts = s.split(',');

    let ue = parse_address(
        parts
            .next()
            .context("missing UE address in --ue entry")?,
    )?;

    let mut enb = None;
    let mut epc = None;

    for part in parts {
        let (side, value) = part
            .split_once('=')
            .with_context(|| format!("bad --ue component {part:?}"))?;
        let (address, teid) = value
            .split_once(':')
            .with_context(|| format!("bad endpoint {value:?}, expected <addr>:<teid>"))?;
        let endpoint = GtpEndpoint::new(parse_address(address)?, port::GTPV1U, parse_teid(teid)?);

        match side {
            "enb" => enb = Some(endpoint),
            "epc" => epc = Some(endpoint),
            other => bail!("unknown endpoint side {other:?} in --ue entry"),
        }
    }

    Ok((
        ue,
        GtpTunnelInfo {
            enb_endpoint: enb.context("missing enb=<addr>:<teid> in --ue entry")?,
            epc_endpoint: epc.context("missing epc=<addr>:<teid> in --ue entry")?,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_teid_forms() {
        assert_eq!(parse_teid("4660").unwrap(), 4660);
        assert_eq!(parse_teid("0x11223344").unwrap(), 0x11223344);
        assert_eq!(parse_teid("0XAABBCCDD").unwrap(), 0xAABBCCDD);
        assert!(parse_teid("teid").is_err());
    }

    #[test]
    fn test_parse_ue_flag() {
        let (ue, info) =
            parse_ue_flag("192.168.2.2,enb=10.0.0.2:0x11223344,epc=10.0.0.1:0xaabbccdd").unwrap();
        assert_eq!(ue, Ipv4Addr::new(192, 168, 2, 2));
        assert_eq!(info.enb_endpoint.address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(info.enb_endpoint.teid, 0x11223344);
        assert_eq!(info.epc_endpoint.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(info.epc_endpoint.teid, 0xAABBCCDD);
        assert_eq!(info.enb_endpoint.port, 2152);
    }

    #[test]
    fn test_parse_ue_flag_errors() {
        assert!(parse_ue_flag("not-an-ip,enb=1.1.1.1:1,epc=2.2.2.2:2").is_err());
        assert!(parse_ue_flag("1.2.3.4,enb=1.1.1.1:1").is_err()); // no epc
        assert!(parse_ue_flag("1.2.3.4,foo=1.1.1.1:1,epc=2.2.2.2:2").is_err());
        assert!(parse_ue_flag("1.2.3.4,enb=1.1.1.1,epc=2.2.2.2:2").is_err()); // no teid
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
ue_map:
  - ue: 192.168.2.2
    enb_address: 10.0.0.2
    enb_teid: "0x11223344"
    epc_address: 10.0.0.1
    epc_teid: "2864434397"
rules:
  - "6-192.168.1.0/24-80"
"#;
        let config: RouterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ue_map.len(), 1);
        assert_eq!(config.rules.len(), 1);

        let (ue, info) = config.ue_map[0].to_entry().unwrap();
        assert_eq!(ue, Ipv4Addr::new(192, 168, 2, 2));
        assert_eq!(info.enb_endpoint.teid, 0x11223344);
        assert_eq!(info.epc_endpoint.teid, 0xAABBCCDD);
    }
}
