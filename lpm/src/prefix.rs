use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// An address with an associated length. Matches any address whose top `len`
/// bits agree. Length 0 is the default route.
///
/// Construction masks off the host bits, so two spellings of the same prefix
/// compare equal and hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    addr: IpAddr,
    len: u8,
}

impl Prefix {
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, Error> {
        let addr = match addr {
            IpAddr::V4(a) => {
                if len > 32 {
                    return Err(Error::InvalidArgument(format!(
                        "prefix length {} exceeds 32",
                        len
                    )));
                }
                IpAddr::V4(Ipv4Addr::from(mask_v4(a.into(), len)))
            }
            IpAddr::V6(a) => {
                if len > 128 {
                    return Err(Error::InvalidArgument(format!(
                        "prefix length {} exceeds 128",
                        len
                    )));
                }
                IpAddr::V6(Ipv6Addr::from(mask_v6(a.into(), len)))
            }
        };
        Ok(Self { addr, len })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_default(&self) -> bool {
        self.len == 0
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// The prefix bits as a native u32, most-significant byte first octet.
    pub(crate) fn v4_bits(&self) -> u32 {
        match self.addr {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(_) => unreachable!("family checked by the table"),
        }
    }

    /// The prefix bits in network byte order.
    pub(crate) fn v6_bits(&self) -> [u8; 16] {
        match self.addr {
            IpAddr::V4(_) => unreachable!("family checked by the table"),
            IpAddr::V6(a) => a.octets(),
        }
    }
}

fn mask_v4(addr: u32, len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        addr & (u32::MAX << (32 - len))
    }
}

fn mask_v6(addr: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        addr & (u128::MAX << (128 - len))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for Prefix {
    type Err = Error;

    /// Parse `addr/len`. A bare address is a host route.
    fn from_str(s: &str) -> Result<Self, Error> {
        let (addr, len) = match s.split_once('/') {
            Some((a, l)) => {
                let addr: IpAddr = a.parse().map_err(|_| {
                    Error::InvalidArgument(format!("bad address: {}", a))
                })?;
                let len: u8 = l.parse().map_err(|_| {
                    Error::InvalidArgument(format!("bad prefix length: {}", l))
                })?;
                (addr, len)
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|_| {
                    Error::InvalidArgument(format!("bad address: {}", s))
                })?;
                let len = if addr.is_ipv4() { 32 } else { 128 };
                (addr, len)
            }
        };
        Self::new(addr, len)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}
