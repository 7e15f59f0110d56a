use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Upper bound on compression pointer hops while decoding a single name
const MAX_POINTER_HOPS: usize = 16;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Read the component. `packet` is the whole message, used to follow
    /// compression pointers.
    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError>;

    fn read_labels<E: Endianness>(
        &self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        loop {
            let label_len = reader.read_var::<u8>(8)?;
            if label_len == 0 {
                break;
            }
            if label_len & 0xC0 == 0xC0 {
                let low = reader.read_var::<u8>(8)?;
                let offset = (((label_len & 0x3F) as usize) << 8) | low as usize;
                let (rest, _) = read_name(packet, offset, packet)?;
                labels.extend(rest);
                break;
            }
            if label_len > 63 {
                return Err(ParseError::InvalidLabel);
            }
            let mut buf = vec![0; label_len as usize];
            reader.read_bytes(&mut buf)?;
            labels.push(decode_label(buf)?);
        }

        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        let mut encoded = Vec::new();
        encode_name(labels, &mut encoded)?;
        writer.write_bytes(&encoded)?;
        Ok(())
    }
}

fn decode_label(buf: Vec<u8>) -> Result<String, ParseError> {
    String::from_utf8(buf).map_err(|_| ParseError::InvalidLabel)
}

/// Decode a possibly compressed name starting at `start` in `data`.
///
/// Pointers are resolved against `packet`. Returns the labels and the offset
/// in `data` just past the name.
pub fn read_name(
    data: &[u8],
    start: usize,
    packet: &[u8],
) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut buf = data;
    let mut pos = start;
    let mut end = None;
    let mut hops = 0;

    loop {
        let len = *buf.get(pos).ok_or(ParseError::InvalidLabel)?;
        if len == 0 {
            pos += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            let low = *buf.get(pos + 1).ok_or(ParseError::InvalidLabel)?;
            if end.is_none() {
                end = Some(pos + 2);
            }
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(ParseError::InvalidLabel);
            }
            buf = packet;
            pos = (((len & 0x3F) as usize) << 8) | low as usize;
            continue;
        }
        if len > 63 {
            return Err(ParseError::InvalidLabel);
        }
        let label_start = pos + 1;
        let label_end = label_start + len as usize;
        let label = buf
            .get(label_start..label_end)
            .ok_or(ParseError::InvalidLabel)?;
        labels.push(decode_label(label.to_vec())?);
        pos = label_end;
    }

    Ok((labels, end.unwrap_or(pos)))
}

/// Append the uncompressed wire form of `labels` (root terminated)
pub fn encode_name(labels: &[String], out: &mut Vec<u8>) -> Result<(), ParseError> {
    for label in labels.iter().filter(|l| !l.is_empty()) {
        if label.len() > 63 {
            return Err(ParseError::InvalidLabel);
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(())
}

/// Split a dotted name into labels, ignoring a trailing root dot
pub fn name_to_labels(name: &str) -> Vec<String> {
    name.split('.')
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

pub fn labels_to_name(labels: &[String]) -> String {
    labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(".")
}
