pub mod common;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use common::PacketComponent;
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use thiserror::Error;
use tracing::trace;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("Invalid record data: {0}")]
    InvalidRecordData(String),
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        if buf.len() < 12 {
            return Err(ParseError::InvalidHeader);
        }
        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut packet = DNSPacket::default();
        packet.header.read(&mut reader, buf)?;

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader, buf)?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer.read(&mut reader, buf)?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority.read(&mut reader, buf)?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let mut resource = DNSResource::default();
            resource.read(&mut reader, buf)?;
            packet.resources.push(resource);
        }

        Ok(packet)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        // Counts always follow the sections actually present
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.resources.len() as u16;
        header.write(&mut writer)?;

        for question in self.questions.iter() {
            question.write(&mut writer)?;
        }
        for answer in self.answers.iter() {
            answer.write(&mut writer)?;
        }
        for authority in self.authorities.iter() {
            authority.write(&mut writer)?;
        }
        for resource in self.resources.iter() {
            resource.write(&mut writer)?;
        }

        Ok(buf)
    }

    /// Minimal recursive query with a single IN-class question
    pub fn query(id: u16, question: DNSQuestion) -> Self {
        DNSPacket {
            header: DNSHeader {
                id,
                rd: true,
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![question],
            ..Default::default()
        }
    }

    /// Empty response mirroring this request: same id, questions echoed
    pub fn generate_response(&self) -> Self {
        DNSPacket {
            header: DNSHeader {
                id: self.header.id,
                qr: true,
                opcode: self.header.opcode,
                rd: self.header.rd,
                qdcount: self.questions.len() as u16,
                ..Default::default()
            },
            questions: self.questions.clone(),
            ..Default::default()
        }
    }
}
