//! IP 허용/차단 정책
//!
//! 설정의 CIDR 목록을 시작 시 한 번 해석하여 [`IpPolicy`]로 만들고,
//! 이후에는 불변으로 공유합니다. 단일 주소 항목은 `/32`(IPv4) 또는
//! `/128`(IPv6)로 취급하며, IPv4-mapped IPv6 주소는 IPv4로 비교합니다.
//!
//! # 평가 순서 (`deny_first`, 기본값)
//! 1. 주소 해석 실패 -> `default_allow`
//! 2. 차단 목록 매칭 -> 거부
//! 3. 허용 목록이 비어 있지 않고 매칭 없음 -> 거부
//! 4. 그 외 -> 허용
//!
//! `allow_first`에서는 허용 목록 매칭이 차단 목록보다 먼저 확인됩니다.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use logship_core::config::{IpPolicyConfig, PolicyOrder};

use crate::error::LogPipelineError;

/// 하나의 CIDR 블록 (base는 마스크가 적용된 상태로 저장)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cidr {
    /// IPv4 블록
    V4 { base: u32, prefix: u8 },
    /// IPv6 블록
    V6 { base: u128, prefix: u8 },
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 { 0 } else { !0u32 << (32 - u32::from(prefix)) }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 { 0 } else { !0u128 << (128 - u32::from(prefix)) }
}

impl Cidr {
    fn v4(addr: Ipv4Addr, prefix: u8) -> Self {
        Self::V4 {
            base: u32::from(addr) & mask_v4(prefix),
            prefix,
        }
    }

    fn v6(addr: Ipv6Addr, prefix: u8) -> Self {
        // ::ffff:a.b.c.d/96+ 은 IPv4 블록으로 정규화
        if let Some(v4) = addr.to_ipv4_mapped() {
            if prefix >= 96 {
                return Self::v4(v4, prefix - 96);
            }
        }
        Self::V6 {
            base: u128::from(addr) & mask_v6(prefix),
            prefix,
        }
    }

    /// 주소가 블록에 포함되는지 확인합니다.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self, normalize(ip)) {
            (Self::V4 { base, prefix }, IpAddr::V4(v4)) => u32::from(v4) & mask_v4(*prefix) == *base,
            (Self::V6 { base, prefix }, IpAddr::V6(v6)) => u128::from(v6) & mask_v6(*prefix) == *base,
            _ => false,
        }
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (s, None),
        };
        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| format!("'{s}' is not an IP address or CIDR block"))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_part {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("'{s}' has an invalid prefix length (0-{max})"))?,
            None => max,
        };
        Ok(match addr {
            IpAddr::V4(v4) => Self::v4(v4, prefix),
            IpAddr::V6(v6) => Self::v6(v6, prefix),
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 { base, prefix } => write!(f, "{}/{}", Ipv4Addr::from(*base), prefix),
            Self::V6 { base, prefix } => write!(f, "{}/{}", Ipv6Addr::from(*base), prefix),
        }
    }
}

/// IPv4-mapped IPv6 주소를 IPv4로 변환합니다.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    }
}

/// 주소 문자열을 해석합니다. `ip` 또는 `ip:port` / `[ip]:port` 형식을 받습니다.
pub fn parse_peer(input: &str) -> Option<IpAddr> {
    let input = input.trim();
    if let Ok(ip) = input.parse::<IpAddr>() {
        return Some(normalize(ip));
    }
    input
        .parse::<SocketAddr>()
        .ok()
        .map(|sa| normalize(sa.ip()))
}

/// 불변 IP 정책
#[derive(Debug, Clone)]
pub struct IpPolicy {
    allow: Vec<Cidr>,
    deny: Vec<Cidr>,
    default_allow: bool,
    order: PolicyOrder,
}

impl Default for IpPolicy {
    /// 모든 주소를 허용하는 정책
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            default_allow: true,
            order: PolicyOrder::DenyFirst,
        }
    }
}

fn parse_list(field: &str, entries: &[String]) -> Result<Vec<Cidr>, LogPipelineError> {
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            entry.parse::<Cidr>().map_err(|reason| LogPipelineError::Config {
                field: format!("{field}[{idx}]"),
                reason,
            })
        })
        .collect()
}

impl IpPolicy {
    /// 설정에서 정책을 생성합니다. 잘못된 항목은 설정 에러입니다.
    pub fn from_config(config: &IpPolicyConfig) -> Result<Self, LogPipelineError> {
        Ok(Self {
            allow: parse_list("ip_policy.allow", &config.allow)?,
            deny: parse_list("ip_policy.deny", &config.deny)?,
            default_allow: config.default_allow,
            order: config.order,
        })
    }

    /// 허용 목록 매칭 여부
    fn in_allow(&self, ip: IpAddr) -> bool {
        self.allow.iter().any(|c| c.contains(ip))
    }

    /// 차단 목록 매칭 여부
    fn in_deny(&self, ip: IpAddr) -> bool {
        self.deny.iter().any(|c| c.contains(ip))
    }

    /// 주소가 허용되는지 평가합니다.
    pub fn allowed(&self, peer: &str) -> bool {
        let Some(ip) = parse_peer(peer) else {
            return self.default_allow;
        };

        match self.order {
            PolicyOrder::DenyFirst => {
                if self.in_deny(ip) {
                    return false;
                }
                self.allow.is_empty() || self.in_allow(ip)
            }
            PolicyOrder::AllowFirst => {
                if self.in_allow(ip) {
                    return true;
                }
                !self.in_deny(ip) && self.allow.is_empty()
            }
        }
    }

    /// 규칙이 하나도 없는지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}
