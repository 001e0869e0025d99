//! In-memory channels for tests.
//!
//! [`MockChannel`] replays a fixed script of reports, while
//! [`SimulatedM210`] answers requests the way the device does, with knobs
//! for injecting faults into a transfer.

use {
    crate::{
        channel::{Channel, DeviceIdentity, M210_IDENTITY},
        error::{Error, Result},
        protocol::{
            DataPacket, Opcode, PACKET_PAYLOAD_SIZE, ReadyStatus,
            frame::{BUTTON_EVENT_MARKER, PRIMARY_REPORT_SIZE, encode_upload_header},
        },
    },
    std::{collections::VecDeque, time::Duration},
};

/// One scripted read outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Deliver this report.
    Report(Vec<u8>),
    /// Let the read time out.
    Timeout,
}

fn timeout_error(name: &str) -> Error {
    Error::Timeout(format!("no report from {name}"))
}

fn copy_report(report: &[u8], buf: &mut [u8]) -> usize {
    let n = report
        .len()
        .min(buf.len());
    buf[..n].copy_from_slice(&report[..n]);
    n
}

/// A channel that replays scripted replies and records writes.
///
/// Reads past the end of the script time out.
#[derive(Debug, Clone)]
pub struct MockChannel {
    name: String,
    identity: DeviceIdentity,
    replies: VecDeque<MockReply>,
    written: Vec<Vec<u8>>,
}

impl MockChannel {
    /// Create an empty channel reporting the M210 identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: M210_IDENTITY,
            replies: VecDeque::new(),
            written: Vec::new(),
        }
    }

    /// Report a different identity.
    #[must_use]
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Queue a report.
    #[must_use]
    pub fn with_report(mut self, report: impl Into<Vec<u8>>) -> Self {
        self.push_report(report);
        self
    }

    /// Queue a read timeout.
    #[must_use]
    pub fn with_timeout(mut self) -> Self {
        self.replies
            .push_back(MockReply::Timeout);
        self
    }

    /// Queue a report on an existing channel.
    pub fn push_report(&mut self, report: impl Into<Vec<u8>>) {
        self.replies
            .push_back(MockReply::Report(report.into()));
    }

    /// Everything written so far, one entry per report.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Replies not consumed yet.
    pub fn pending(&self) -> usize {
        self.replies
            .len()
    }
}

impl Channel for MockChannel {
    fn identity(&self) -> Result<DeviceIdentity> {
        Ok(self.identity)
    }

    fn read_report(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        match self
            .replies
            .pop_front()
        {
            Some(MockReply::Report(report)) => Ok(copy_report(&report, buf)),
            Some(MockReply::Timeout) | None => Err(timeout_error(&self.name)),
        }
    }

    fn write_report(&mut self, data: &[u8]) -> Result<()> {
        self.written
            .push(data.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A behavioural model of the M210 primary interface.
///
/// Requests are decoded as they are written and the matching responses are
/// queued for the following reads. A request the device would not answer
/// leaves the queue empty, so the next read times out.
#[derive(Debug, Clone)]
pub struct SimulatedM210 {
    identity: DeviceIdentity,
    status: ReadyStatus,
    packets: Vec<[u8; PACKET_PAYLOAD_SIZE]>,
    outbox: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    upload_offered: bool,
    silent_ready_polls: usize,
    corrupted: Vec<u16>,
    misdirected_resends: Vec<u16>,
    truncate_after: Option<u16>,
    malformed_header: bool,
    button_events: usize,
}

impl SimulatedM210 {
    /// Create a device holding `packets`.
    pub fn new(packets: Vec<[u8; PACKET_PAYLOAD_SIZE]>) -> Self {
        Self {
            identity: M210_IDENTITY,
            status: ReadyStatus {
                firmware_version: 337,
                analog_version: 265,
                pad_version: 32028,
                mode: 2,
            },
            packets,
            outbox: VecDeque::new(),
            written: Vec::new(),
            upload_offered: false,
            silent_ready_polls: 0,
            corrupted: Vec::new(),
            misdirected_resends: Vec::new(),
            truncate_after: None,
            malformed_header: false,
            button_events: 0,
        }
    }

    /// Create a device holding `count` packets with distinct payloads.
    pub fn with_packet_count(count: u16) -> Self {
        Self::new(
            (1..=count)
                .map(sample_payload)
                .collect(),
        )
    }

    /// Report a different ready response.
    #[must_use]
    pub fn with_status(mut self, status: ReadyStatus) -> Self {
        self.status = status;
        self
    }

    /// Ignore the first `polls` ready requests.
    #[must_use]
    pub fn with_silent_ready_polls(mut self, polls: usize) -> Self {
        self.silent_ready_polls = polls;
        self
    }

    /// Deliver packet `number` with a wrong number during the initial stream.
    #[must_use]
    pub fn with_corrupted_packet(mut self, number: u16) -> Self {
        self.corrupted
            .push(number);
        self
    }

    /// Answer the first resend request for `number` with another stored packet.
    #[must_use]
    pub fn with_misdirected_resend(mut self, number: u16) -> Self {
        self.misdirected_resends
            .push(number);
        self
    }

    /// Stop the initial stream after `count` packets.
    #[must_use]
    pub fn with_truncated_stream(mut self, count: u16) -> Self {
        self.truncate_after = Some(count);
        self
    }

    /// Answer begin-upload with a malformed header.
    #[must_use]
    pub fn with_malformed_upload_header(mut self) -> Self {
        self.malformed_header = true;
        self
    }

    /// Emit `count` mode button events ahead of the next response.
    #[must_use]
    pub fn with_button_events(mut self, count: usize) -> Self {
        self.button_events = count;
        self
    }

    /// Report a different identity.
    #[must_use]
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Payloads currently stored.
    pub fn packets(&self) -> &[[u8; PACKET_PAYLOAD_SIZE]] {
        &self.packets
    }

    /// Stored payloads concatenated in packet order.
    pub fn archive(&self) -> Vec<u8> {
        self.packets
            .concat()
    }

    /// Everything written so far, one entry per report.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Opcode bytes of the written requests.
    pub fn opcodes(&self) -> Vec<u8> {
        self.written
            .iter()
            .filter_map(|report| {
                report
                    .get(3)
                    .copied()
            })
            .collect()
    }

    fn queue(&mut self, report: Vec<u8>) {
        for _ in 0..self.button_events {
            let mut event = vec![0u8; PRIMARY_REPORT_SIZE];
            event[..2].copy_from_slice(&BUTTON_EVENT_MARKER);
            self.outbox
                .push_back(event);
        }
        self.button_events = 0;
        self.outbox
            .push_back(report);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn packet_count(&self) -> u16 {
        self.packets
            .len()
            .min(usize::from(u16::MAX)) as u16
    }

    fn packet(&self, number: u16) -> Option<DataPacket> {
        let payload = *self
            .packets
            .get(usize::from(number).checked_sub(1)?)?;
        Some(DataPacket { number, payload })
    }

    fn stream(&mut self) {
        let last = self
            .truncate_after
            .unwrap_or(u16::MAX)
            .min(self.packet_count());
        for number in 1..=last {
            let Some(mut packet) = self.packet(number) else {
                break;
            };
            if self
                .corrupted
                .contains(&number)
            {
                packet.number = 0;
            }
            self.queue(packet.encode());
        }
    }

    fn handle(&mut self, opcode: Opcode, args: &[u8]) {
        match opcode {
            Opcode::Ready => {
                if self.silent_ready_polls > 0 {
                    self.silent_ready_polls -= 1;
                } else {
                    let report = self
                        .status
                        .encode();
                    self.queue(report);
                }
            },
            Opcode::BeginUpload => {
                if self.malformed_header {
                    self.queue(vec![0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x00, 0x01, 0x00, 0x00]);
                } else if !self
                    .packets
                    .is_empty()
                {
                    self.upload_offered = true;
                    self.queue(encode_upload_header(self.packet_count()));
                }
            },
            Opcode::AcceptUpload => {
                if self.upload_offered {
                    self.upload_offered = false;
                    self.stream();
                }
            },
            Opcode::RejectUpload => {
                if args.len() >= 2 {
                    let mut number = u16::from_be_bytes([args[0], args[1]]);
                    if let Some(pos) = self
                        .misdirected_resends
                        .iter()
                        .position(|&n| n == number)
                    {
                        self.misdirected_resends
                            .remove(pos);
                        number = if number == 1 { self.packet_count() } else { 1 };
                    }
                    if let Some(packet) = self.packet(number) {
                        self.queue(packet.encode());
                    }
                } else {
                    self.upload_offered = false;
                    self.outbox
                        .clear();
                }
            },
            Opcode::DeleteNotes => {
                self.packets
                    .clear();
            },
        }
    }
}

impl Channel for SimulatedM210 {
    fn identity(&self) -> Result<DeviceIdentity> {
        Ok(self.identity)
    }

    fn read_report(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        match self
            .outbox
            .pop_front()
        {
            Some(report) => Ok(copy_report(&report, buf)),
            None => Err(timeout_error("simulated M210")),
        }
    }

    fn write_report(&mut self, data: &[u8]) -> Result<()> {
        self.written
            .push(data.to_vec());

        if let Some(opcode) = data
            .get(3)
            .copied()
            .and_then(Opcode::from_byte)
        {
            self.handle(opcode, &data[4..]);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated M210"
    }
}

/// Distinct payload for packet `number`.
#[allow(clippy::cast_possible_truncation)]
pub fn sample_payload(number: u16) -> [u8; PACKET_PAYLOAD_SIZE] {
    let mut payload = [0u8; PACKET_PAYLOAD_SIZE];
    for (i, byte) in payload
        .iter_mut()
        .enumerate()
    {
        *byte = (usize::from(number) * 31 + i) as u8;
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestFrame;

    #[test]
    fn test_mock_channel_script() {
        let mut channel = MockChannel::new("mock")
            .with_report(vec![1, 2, 3])
            .with_timeout();
        let mut buf = [0u8; 64];
        assert_eq!(channel.pending(), 2);

        assert_eq!(
            channel
                .read_report(&mut buf, Duration::ZERO)
                .unwrap(),
            3
        );
        assert_eq!(channel.pending(), 1);
        assert!(
            channel
                .read_report(&mut buf, Duration::ZERO)
                .unwrap_err()
                .is_timeout()
        );
        assert!(
            channel
                .read_report(&mut buf, Duration::ZERO)
                .unwrap_err()
                .is_timeout()
        );

        channel
            .write_report(&[9])
            .unwrap();
        assert_eq!(channel.written(), &[vec![9]]);
    }

    #[test]
    fn test_simulator_answers_ready() {
        let mut device = SimulatedM210::with_packet_count(1);
        let mut buf = [0u8; 64];

        device
            .write_report(&RequestFrame::ready().build())
            .unwrap();
        let n = device
            .read_report(&mut buf, Duration::ZERO)
            .unwrap();
        assert_eq!(&buf[..3], &[0x80, 0xa9, 0x28]);
        assert_eq!(n, 64);
        assert_eq!(device.opcodes(), vec![0x95]);
    }

    #[test]
    fn test_simulator_silent_without_notes() {
        let mut device = SimulatedM210::new(Vec::new());
        let mut buf = [0u8; 64];

        device
            .write_report(&RequestFrame::begin_upload().build())
            .unwrap();
        assert!(
            device
                .read_report(&mut buf, Duration::ZERO)
                .is_err()
        );
    }
}
