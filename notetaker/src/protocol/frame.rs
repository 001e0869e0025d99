//! M210 request and response frames.
//!
//! ## Request Format
//!
//! Every request is written to the primary interface as one output report:
//!
//! ```text
//! +--------+-----------+--------+--------+-------------------+
//! | Report | Report ID | Length | Opcode |       Args        |
//! +--------+-----------+--------+--------+-------------------+
//! |  0x00  |   0x02    | 1 byte | 1 byte |  0 or 2 bytes BE  |
//! +--------+-----------+--------+--------+-------------------+
//! ```
//!
//! `Length` counts the opcode and its arguments.
//!
//! ## Responses
//!
//! Responses on the primary interface are 64-byte input reports:
//!
//! ```text
//! Ready:         80 a9 28 | fw (2) | analog (2) | pad (2) | 0e | mode
//! Upload header: aa aa aa aa aa | packet count (2) | 55 55
//! Data packet:   packet number (2) | payload (62)
//! Button event:  80 b5 ...            (unsolicited, skipped)
//! ```
//!
//! All multi-byte integers are big-endian.

use {
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder, WriteBytesExt},
};

/// Size of an input report on the primary interface.
pub const PRIMARY_REPORT_SIZE: usize = 64;

/// Size of an input report on the secondary interface.
pub const SECONDARY_REPORT_SIZE: usize = 9;

/// Payload bytes carried by one data packet.
pub const PACKET_PAYLOAD_SIZE: usize = 62;

/// Leading bytes of a request report.
pub const REQUEST_HEADER: [u8; 2] = [0x00, 0x02];

/// Prefix of an unsolicited mode button event.
pub const BUTTON_EVENT_MARKER: [u8; 2] = [0x80, 0xb5];

/// Prefix of a ready response.
pub const READY_MARKER: [u8; 3] = [0x80, 0xa9, 0x28];

/// Status byte of a ready response.
pub const READY_STATUS: u8 = 0x0e;

/// Prefix of an upload header.
pub const UPLOAD_LEAD: [u8; 5] = [0xaa; 5];

/// Trailer of an upload header.
pub const UPLOAD_TRAIL: [u8; 2] = [0x55, 0x55];

/// Request opcodes understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Ready / info poll (0x95).
    Ready = 0x95,

    /// Begin upload (0xB5).
    BeginUpload = 0xb5,

    /// Accept upload, or acknowledge its completion (0xB6).
    AcceptUpload = 0xb6,

    /// Reject upload, or re-request one packet when followed by a number (0xB7).
    RejectUpload = 0xb7,

    /// Erase all stored notes (0xB0).
    DeleteNotes = 0xb0,
}

impl Opcode {
    /// Look up an opcode by its wire value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x95 => Some(Self::Ready),
            0xb5 => Some(Self::BeginUpload),
            0xb6 => Some(Self::AcceptUpload),
            0xb7 => Some(Self::RejectUpload),
            0xb0 => Some(Self::DeleteNotes),
            _ => None,
        }
    }
}

/// A request to the primary interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    opcode: Opcode,
    args: Vec<u8>,
}

impl RequestFrame {
    /// Create a request without arguments.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            args: Vec::new(),
        }
    }

    /// Ready poll.
    pub fn ready() -> Self {
        Self::new(Opcode::Ready)
    }

    /// Ask the device to announce its stored packet count.
    pub fn begin_upload() -> Self {
        Self::new(Opcode::BeginUpload)
    }

    /// Start streaming, or close a finished download.
    pub fn accept_upload() -> Self {
        Self::new(Opcode::AcceptUpload)
    }

    /// Decline an announced upload.
    pub fn reject_upload() -> Self {
        Self::new(Opcode::RejectUpload)
    }

    /// Re-request a single packet by number.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn resend_packet(packet_number: u16) -> Self {
        let mut frame = Self::new(Opcode::RejectUpload);
        frame
            .args
            .write_u16::<BigEndian>(packet_number)
            .unwrap();
        frame
    }

    /// Erase all notes.
    pub fn delete_notes() -> Self {
        Self::new(Opcode::DeleteNotes)
    }

    /// Request opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Opcode arguments.
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Serialize into an output report.
    #[allow(clippy::cast_possible_truncation)] // args are at most 2 bytes
    pub fn build(&self) -> Vec<u8> {
        let body_len = 1 + self
            .args
            .len();
        let mut buf = Vec::with_capacity(REQUEST_HEADER.len() + 1 + body_len);
        buf.extend_from_slice(&REQUEST_HEADER);
        buf.push(body_len as u8);
        buf.push(self.opcode as u8);
        buf.extend_from_slice(&self.args);
        buf
    }
}

/// Whether a primary report is an unsolicited mode button event.
pub fn is_button_event(report: &[u8]) -> bool {
    report.starts_with(&BUTTON_EVENT_MARKER)
}

/// Parsed ready response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadyStatus {
    /// Firmware version.
    pub firmware_version: u16,
    /// Analog board version.
    pub analog_version: u16,
    /// Pad version.
    pub pad_version: u16,
    /// Current device mode.
    pub mode: u8,
}

impl ReadyStatus {
    /// Minimum length of a ready response.
    pub const MIN_LEN: usize = 11;

    /// Parse a ready response.
    pub fn parse(report: &[u8]) -> Result<Self> {
        if report.len() < Self::MIN_LEN
            || !report.starts_with(&READY_MARKER)
            || report[9] != READY_STATUS
        {
            return Err(Error::Communication(format!(
                "unexpected response to ready request: {:02x?}",
                report
            )));
        }

        Ok(Self {
            firmware_version: BigEndian::read_u16(&report[3..5]),
            analog_version: BigEndian::read_u16(&report[5..7]),
            pad_version: BigEndian::read_u16(&report[7..9]),
            mode: report[10],
        })
    }

    /// Encode as the device would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut report = vec![0u8; PRIMARY_REPORT_SIZE];
        report[..3].copy_from_slice(&READY_MARKER);
        BigEndian::write_u16(&mut report[3..5], self.firmware_version);
        BigEndian::write_u16(&mut report[5..7], self.analog_version);
        BigEndian::write_u16(&mut report[7..9], self.pad_version);
        report[9] = READY_STATUS;
        report[10] = self.mode;
        report
    }
}

/// Parse an upload header and return the announced packet count.
pub fn parse_upload_header(report: &[u8]) -> Result<u16> {
    if report.len() < 9 || !report.starts_with(&UPLOAD_LEAD) || report[7..9] != UPLOAD_TRAIL {
        let shown = &report[..report
            .len()
            .min(9)];
        return Err(Error::Communication(format!(
            "unrecognized upload response: {:02x?}",
            shown
        )));
    }

    Ok(BigEndian::read_u16(&report[5..7]))
}

/// Encode an upload header announcing `packet_count` packets.
pub fn encode_upload_header(packet_count: u16) -> Vec<u8> {
    let mut report = vec![0u8; PRIMARY_REPORT_SIZE];
    report[..5].copy_from_slice(&UPLOAD_LEAD);
    BigEndian::write_u16(&mut report[5..7], packet_count);
    report[7..9].copy_from_slice(&UPLOAD_TRAIL);
    report
}

/// One numbered chunk of the note archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Packet number (1-based).
    pub number: u16,
    /// Payload bytes.
    pub payload: [u8; PACKET_PAYLOAD_SIZE],
}

impl DataPacket {
    /// Parse a data packet.
    ///
    /// Short reports are zero-padded to a full payload.
    pub fn parse(report: &[u8]) -> Result<Self> {
        if report.len() < 2 {
            return Err(Error::Communication(format!(
                "data packet too short: {} bytes",
                report.len()
            )));
        }

        let body = &report[2..report
            .len()
            .min(2 + PACKET_PAYLOAD_SIZE)];
        let mut payload = [0u8; PACKET_PAYLOAD_SIZE];
        payload[..body.len()].copy_from_slice(body);

        Ok(Self {
            number: BigEndian::read_u16(&report[..2]),
            payload,
        })
    }

    /// Encode as the device would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut report = Vec::with_capacity(PRIMARY_REPORT_SIZE);
        report.extend_from_slice(&self.number.to_be_bytes());
        report.extend_from_slice(&self.payload);
        report
    }
}

/// Device information combining the ready response and the stored note size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Firmware version.
    pub firmware_version: u16,
    /// Analog board version.
    pub analog_version: u16,
    /// Pad version.
    pub pad_version: u16,
    /// Current device mode.
    pub mode: u8,
    /// Size of the stored note archive in bytes.
    pub download_size: u32,
}

impl DeviceInfo {
    /// Combine a ready response with an announced packet count.
    pub fn new(status: ReadyStatus, packet_count: u16) -> Self {
        Self {
            firmware_version: status.firmware_version,
            analog_version: status.analog_version,
            pad_version: status.pad_version,
            mode: status.mode,
            download_size: archive_size(packet_count),
        }
    }
}

/// Archive size in bytes for `packet_count` packets.
#[allow(clippy::cast_possible_truncation)]
pub fn archive_size(packet_count: u16) -> u32 {
    u32::from(packet_count) * PACKET_PAYLOAD_SIZE as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frames() {
        assert_eq!(RequestFrame::ready().build(), vec![0x00, 0x02, 0x01, 0x95]);
        assert_eq!(
            RequestFrame::begin_upload().build(),
            vec![0x00, 0x02, 0x01, 0xb5]
        );
        assert_eq!(
            RequestFrame::accept_upload().build(),
            vec![0x00, 0x02, 0x01, 0xb6]
        );
        assert_eq!(
            RequestFrame::reject_upload().build(),
            vec![0x00, 0x02, 0x01, 0xb7]
        );
        assert_eq!(
            RequestFrame::delete_notes().build(),
            vec![0x00, 0x02, 0x01, 0xb0]
        );
    }

    #[test]
    fn test_resend_frame() {
        let frame = RequestFrame::resend_packet(0x0102);
        assert_eq!(frame.opcode(), Opcode::RejectUpload);
        assert_eq!(frame.args(), &[0x01, 0x02]);
        assert_eq!(frame.build(), vec![0x00, 0x02, 0x03, 0xb7, 0x01, 0x02]);
    }

    #[test]
    fn test_opcode_from_byte() {
        assert_eq!(Opcode::from_byte(0x95), Some(Opcode::Ready));
        assert_eq!(Opcode::from_byte(0xb0), Some(Opcode::DeleteNotes));
        assert_eq!(Opcode::from_byte(0x00), None);
    }

    #[test]
    fn test_parse_ready() {
        let mut report = vec![0u8; 64];
        report[..11].copy_from_slice(&[
            0x80, 0xa9, 0x28, 0x01, 0x51, 0x01, 0x09, 0x7d, 0x1c, 0x0e, 0x02,
        ]);

        let status = ReadyStatus::parse(&report).unwrap();
        assert_eq!(status.firmware_version, 337);
        assert_eq!(status.analog_version, 265);
        assert_eq!(status.pad_version, 32028);
        assert_eq!(status.mode, 2);
        assert_eq!(ReadyStatus::parse(&status.encode()).unwrap(), status);
    }

    #[test]
    fn test_parse_ready_bad_status() {
        let mut report = ReadyStatus {
            firmware_version: 1,
            analog_version: 2,
            pad_version: 3,
            mode: 0,
        }
        .encode();
        report[9] = 0x0d;

        assert!(matches!(
            ReadyStatus::parse(&report),
            Err(Error::Communication(_))
        ));
    }

    #[test]
    fn test_parse_ready_bad_marker_or_short() {
        assert!(ReadyStatus::parse(&[0x80, 0xa9, 0x29, 0, 0, 0, 0, 0, 0, 0x0e, 0]).is_err());
        assert!(ReadyStatus::parse(&[0x80, 0xa9, 0x28, 0x0e]).is_err());
        assert!(ReadyStatus::parse(&[]).is_err());
    }

    #[test]
    fn test_parse_upload_header() {
        assert_eq!(parse_upload_header(&encode_upload_header(22)).unwrap(), 22);
        assert_eq!(
            parse_upload_header(&[0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01, 0x00, 0x55, 0x55]).unwrap(),
            256
        );
    }

    #[test]
    fn test_parse_upload_header_invalid() {
        let mut report = encode_upload_header(3);
        report[8] = 0x54;
        assert!(matches!(
            parse_upload_header(&report),
            Err(Error::Communication(_))
        ));

        let mut report = encode_upload_header(3);
        report[0] = 0xab;
        assert!(parse_upload_header(&report).is_err());

        assert!(parse_upload_header(&[0xaa; 5]).is_err());
    }

    #[test]
    fn test_parse_data_packet() {
        let mut report = vec![0x00, 0x07];
        report.extend((0..62).map(|i| i as u8));

        let packet = DataPacket::parse(&report).unwrap();
        assert_eq!(packet.number, 7);
        assert_eq!(packet.payload[0], 0);
        assert_eq!(packet.payload[61], 61);
        assert_eq!(packet.encode(), report);
    }

    #[test]
    fn test_parse_short_data_packet() {
        let packet = DataPacket::parse(&[0x01, 0x00, 0xff]).unwrap();
        assert_eq!(packet.number, 256);
        assert_eq!(packet.payload[0], 0xff);
        assert!(packet.payload[1..].iter().all(|&b| b == 0));

        assert!(DataPacket::parse(&[0x01]).is_err());
    }

    #[test]
    fn test_button_event() {
        assert!(is_button_event(&[0x80, 0xb5, 0x00]));
        assert!(!is_button_event(&[0x80, 0xa9, 0x28]));
        assert!(!is_button_event(&[0x80]));
    }

    #[test]
    fn test_device_info_size() {
        let status = ReadyStatus {
            firmware_version: 337,
            analog_version: 265,
            pad_version: 32028,
            mode: 2,
        };
        let info = DeviceInfo::new(status, 22);
        assert_eq!(info.download_size, 1364);
        assert_eq!(archive_size(0), 0);
        assert_eq!(archive_size(u16::MAX), 65535 * 62);
    }
}
