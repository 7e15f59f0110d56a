use std::net::{Ipv4Addr, Ipv6Addr};

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, encode_name, labels_to_name, name_to_labels, read_name},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: DNSResourceData,
}

/// Decoded RDATA for the record kinds this server produces or caches
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DNSResourceData {
    #[default]
    Empty,
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    MX {
        preference: u16,
        exchange: String,
    },
    TXT(Vec<String>),
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    CAA {
        flags: u8,
        tag: String,
        value: String,
    },
    /// RDATA of a type we pass through without interpreting
    Raw(Vec<u8>),
}

impl DNSResource {
    pub fn new(name: &str, rclass: DNSResourceClass, ttl: u32, rdata: DNSResourceData) -> Self {
        Self {
            labels: name_to_labels(name),
            rtype: rdata.rtype(),
            rclass,
            ttl,
            rdata,
        }
    }

    pub fn name(&self) -> String {
        labels_to_name(&self.labels)
    }
}

impl DNSResourceData {
    /// Record type implied by the data. `Raw` and `Empty` carry no type of
    /// their own and report `Unknown(0)`.
    pub fn rtype(&self) -> DNSResourceType {
        match self {
            DNSResourceData::A(_) => DNSResourceType::A,
            DNSResourceData::AAAA(_) => DNSResourceType::AAAA,
            DNSResourceData::NS(_) => DNSResourceType::NS,
            DNSResourceData::CNAME(_) => DNSResourceType::CNAME,
            DNSResourceData::MX { .. } => DNSResourceType::MX,
            DNSResourceData::TXT(_) => DNSResourceType::TXT,
            DNSResourceData::SOA { .. } => DNSResourceType::SOA,
            DNSResourceData::CAA { .. } => DNSResourceType::CAA,
            DNSResourceData::Raw(_) | DNSResourceData::Empty => DNSResourceType::Unknown(0),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::new();
        match self {
            DNSResourceData::Empty => {}
            DNSResourceData::A(addr) => out.extend_from_slice(&addr.octets()),
            DNSResourceData::AAAA(addr) => out.extend_from_slice(&addr.octets()),
            DNSResourceData::NS(name) | DNSResourceData::CNAME(name) => {
                encode_name(&name_to_labels(name), &mut out)?
            }
            DNSResourceData::MX {
                preference,
                exchange,
            } => {
                out.extend_from_slice(&preference.to_be_bytes());
                encode_name(&name_to_labels(exchange), &mut out)?;
            }
            DNSResourceData::TXT(strings) => {
                for s in strings {
                    // Character strings longer than 255 bytes are split
                    let bytes = s.as_bytes();
                    if bytes.is_empty() {
                        out.push(0);
                    }
                    for chunk in bytes.chunks(255) {
                        out.push(chunk.len() as u8);
                        out.extend_from_slice(chunk);
                    }
                }
            }
            DNSResourceData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                encode_name(&name_to_labels(mname), &mut out)?;
                encode_name(&name_to_labels(rname), &mut out)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    out.extend_from_slice(&value.to_be_bytes());
                }
            }
            DNSResourceData::CAA { flags, tag, value } => {
                if tag.len() > 255 {
                    return Err(ParseError::InvalidRecordData("CAA tag too long".into()));
                }
                out.push(*flags);
                out.push(tag.len() as u8);
                out.extend_from_slice(tag.as_bytes());
                out.extend_from_slice(value.as_bytes());
            }
            DNSResourceData::Raw(bytes) => out.extend_from_slice(bytes),
        }
        Ok(out)
    }

    /// Decode `data` as RDATA of `rtype`; names may point into `packet`
    pub fn parse(rtype: DNSResourceType, data: &[u8], packet: &[u8]) -> Result<Self, ParseError> {
        let invalid = |what: &str| ParseError::InvalidRecordData(format!("{:?}: {}", rtype, what));
        let rdata = match rtype {
            DNSResourceType::A => {
                let octets: [u8; 4] = data.try_into().map_err(|_| invalid("length"))?;
                DNSResourceData::A(Ipv4Addr::from(octets))
            }
            DNSResourceType::AAAA => {
                let octets: [u8; 16] = data.try_into().map_err(|_| invalid("length"))?;
                DNSResourceData::AAAA(Ipv6Addr::from(octets))
            }
            DNSResourceType::NS => {
                let (labels, _) = read_name(data, 0, packet)?;
                DNSResourceData::NS(labels_to_name(&labels))
            }
            DNSResourceType::CNAME => {
                let (labels, _) = read_name(data, 0, packet)?;
                DNSResourceData::CNAME(labels_to_name(&labels))
            }
            DNSResourceType::MX => {
                if data.len() < 3 {
                    return Err(invalid("length"));
                }
                let preference = u16::from_be_bytes([data[0], data[1]]);
                let (labels, _) = read_name(data, 2, packet)?;
                DNSResourceData::MX {
                    preference,
                    exchange: labels_to_name(&labels),
                }
            }
            DNSResourceType::TXT => {
                let mut strings = Vec::new();
                let mut pos = 0;
                while pos < data.len() {
                    let len = data[pos] as usize;
                    let chunk = data
                        .get(pos + 1..pos + 1 + len)
                        .ok_or_else(|| invalid("character string"))?;
                    strings.push(String::from_utf8_lossy(chunk).into_owned());
                    pos += 1 + len;
                }
                DNSResourceData::TXT(strings)
            }
            DNSResourceType::SOA => {
                let (mname, pos) = read_name(data, 0, packet)?;
                let (rname, pos) = read_name(data, pos, packet)?;
                let fixed = data.get(pos..pos + 20).ok_or_else(|| invalid("length"))?;
                let field = |i: usize| {
                    u32::from_be_bytes([fixed[i], fixed[i + 1], fixed[i + 2], fixed[i + 3]])
                };
                DNSResourceData::SOA {
                    mname: labels_to_name(&mname),
                    rname: labels_to_name(&rname),
                    serial: field(0),
                    refresh: field(4),
                    retry: field(8),
                    expire: field(12),
                    minimum: field(16),
                }
            }
            DNSResourceType::CAA => {
                if data.len() < 2 {
                    return Err(invalid("length"));
                }
                let tag_end = 2 + data[1] as usize;
                let tag = data.get(2..tag_end).ok_or_else(|| invalid("tag"))?;
                DNSResourceData::CAA {
                    flags: data[0],
                    tag: String::from_utf8_lossy(tag).into_owned(),
                    value: String::from_utf8_lossy(&data[tag_end..]).into_owned(),
                }
            }
            _ => DNSResourceData::Raw(data.to_vec()),
        };
        Ok(rdata)
    }

    /// Presentation form of the primary datum (address, target name, text)
    pub fn primary_text(&self) -> String {
        match self {
            DNSResourceData::Empty => String::new(),
            DNSResourceData::A(addr) => addr.to_string(),
            DNSResourceData::AAAA(addr) => addr.to_string(),
            DNSResourceData::NS(name) | DNSResourceData::CNAME(name) => name.clone(),
            DNSResourceData::MX { exchange, .. } => exchange.clone(),
            DNSResourceData::TXT(strings) => strings.concat(),
            DNSResourceData::SOA { mname, .. } => mname.clone(),
            DNSResourceData::CAA { value, .. } => value.clone(),
            DNSResourceData::Raw(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        let rdata = self.rdata.to_bytes()?;
        if rdata.len() > u16::MAX as usize {
            return Err(ParseError::InvalidRecordData("RDATA too long".into()));
        }
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, rdata.len() as u16)?;
        writer.write_bytes(&rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError> {
        self.labels = self.read_labels(reader, packet)?;
        self.rtype = reader.read_var::<u16>(16)?.into();
        self.rclass = reader.read_var::<u16>(16)?.into();
        self.ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)?;
        let mut buf = vec![0_u8; rdlength as usize];
        reader.read_bytes(&mut buf)?;
        self.rdata = DNSResourceData::parse(self.rtype, &buf, packet)?;

        Ok(())
    }
}
