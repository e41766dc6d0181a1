use crate::error::{Result, TaskchainError};
use crate::topology::ResourceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Smallest subnet the provider accepts.
const MIN_SUBNET_PREFIX: u8 = 28;

// ---------------------------------------------------------------------------
// Ipv4Cidr
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| TaskchainError::InvalidCidr {
            cidr: text.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix) = text
            .split_once('/')
            .ok_or_else(|| invalid("missing '/<prefix>'"))?;
        let addr = Ipv4Addr::from_str(addr).map_err(|_| invalid("bad address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix"))?;
        if prefix > 32 {
            return Err(invalid("prefix must be at most 32"));
        }
        if u32::from(addr) & !Self::mask(prefix) != 0 {
            return Err(invalid("host bits are set"));
        }
        Ok(Self { addr, prefix })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Split into `count` equal blocks, rounding `count` up to a power of two.
    /// Trailing blocks beyond `count` are left unallocated.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        let count = count.max(1);
        let extra_bits = count.next_power_of_two().trailing_zeros() as u8;
        let prefix = self.prefix + extra_bits;
        if prefix > MIN_SUBNET_PREFIX {
            return Err(TaskchainError::InvalidCidr {
                cidr: self.to_string(),
                reason: format!("too small for {count} subnets of at least /{MIN_SUBNET_PREFIX}"),
            });
        }
        let size = 1u32 << (32 - u32::from(prefix));
        let base = u32::from(self.addr);
        Ok((0..count as u32)
            .map(|i| Ipv4Cidr {
                addr: Ipv4Addr::from(base + i * size),
                prefix,
            })
            .collect())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = TaskchainError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(c: Ipv4Cidr) -> Self {
        c.to_string()
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    Public,
    Private,
}

impl SubnetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubnetKind::Public => "public",
            SubnetKind::Private => "private",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    pub kind: SubnetKind,
    pub az_index: u8,
    pub cidr: Ipv4Cidr,
}

/// Most zones a network may span. Every supported region has at least this many.
pub const MAX_AZS: u8 = 6;

const ZONE_LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";

/// An isolated network with one public and one private subnet per zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: ResourceId,
    pub cidr: Ipv4Cidr,
    pub max_azs: u8,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
}

impl Network {
    /// Public subnets take the first half of the range, private the second,
    /// each ordered by zone.
    pub fn subnets(&self) -> Result<Vec<Subnet>> {
        self.check_zone_count()?;
        let azs = usize::from(self.max_azs);
        let blocks = self.cidr.split(azs * 2)?;
        let mut subnets = Vec::with_capacity(blocks.len());
        for (i, cidr) in blocks.into_iter().enumerate() {
            let (kind, az) = if i < azs {
                (SubnetKind::Public, i)
            } else {
                (SubnetKind::Private, i - azs)
            };
            subnets.push(Subnet {
                kind,
                az_index: az as u8,
                cidr,
            });
        }
        Ok(subnets)
    }

    pub fn check_zone_count(&self) -> Result<()> {
        if self.max_azs == 0 || self.max_azs > MAX_AZS {
            return Err(TaskchainError::InvalidCidr {
                cidr: self.cidr.to_string(),
                reason: format!(
                    "max_azs is {}, must be between 1 and {MAX_AZS}",
                    self.max_azs
                ),
            });
        }
        Ok(())
    }

    /// Zone names for `region`, e.g. `us-east-1a`, `us-east-1b`.
    pub fn availability_zones(&self, region: &str) -> Vec<String> {
        ZONE_LETTERS
            .chars()
            .take(usize::from(self.max_azs))
            .map(|letter| format!("{region}{letter}"))
            .collect()
    }
}
