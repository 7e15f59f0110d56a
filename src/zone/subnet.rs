use std::net::IpAddr;

/// Convert a dotted-quad string into its integer value.
///
/// Each part is one to three decimal digits; parts above 255 are not
/// rejected, they simply weigh in at their face value.
pub fn ip2long(ip: &str) -> Option<i64> {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return None;
    }

    let mut value: i64 = 0;
    for part in parts {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value = value * 256 + part.parse::<i64>().ok()?;
    }
    Some(value)
}

/// An IPv4 CIDR block used to scope records to a client network.
///
/// Containment is strict at both ends: the network address is excluded, and
/// so are the last two addresses of the block (`x < base + size - 1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subnet {
    base: i64,
    size: i64,
}

impl Subnet {
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, bits) = cidr.rsplit_once('/')?;
        if bits.is_empty() || bits.len() > 2 || !bits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let bits: u32 = bits.parse().ok()?;
        // A prefix longer than 32 bits leaves no room for any address
        if bits > 32 {
            return None;
        }
        let base = ip2long(addr)?;
        Some(Self {
            base,
            size: 1i64 << (32 - bits),
        })
    }

    pub fn contains_long(&self, ip: i64) -> bool {
        ip > self.base && ip < self.base + self.size - 1
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        let v4 = match addr {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => return false,
            },
        };
        self.contains_long(u32::from(v4) as i64)
    }
}

/// String-level containment check: `ip` inside `cidr`
pub fn in_subnet(ip: &str, cidr: &str) -> bool {
    match (ip2long(ip), Subnet::parse(cidr)) {
        (Some(ip), Some(subnet)) => subnet.contains_long(ip),
        _ => false,
    }
}
