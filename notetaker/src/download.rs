//! Note archive download with lost-packet recovery.
//!
//! A download walks through these states:
//!
//! ```text
//! Idle -> AwaitingReady -> NegotiatingUpload -+-> Streaming -> Recovering -> Done
//!                                             |
//!                                             +-> Done          (no notes)
//! ```
//!
//! While streaming, every packet whose number differs from the expected one
//! marks the expected number as lost. Payloads are written to the sink only
//! while nothing has been lost yet; after the first loss the remaining stream
//! is read but not written. Recovery then re-requests each lost packet by
//! number, in the order the losses were seen, and writes it on arrival.
//!
//! The returned size is always `packet_count * 62`, whether or not every
//! packet reached the sink.

use {
    crate::{
        channel::Channel,
        error::Result,
        protocol::{DataPacket, RequestFrame, frame::archive_size},
        session::DeviceSession,
    },
    log::{debug, info, warn},
    std::{fmt, io::Write},
};

/// Download progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    /// Not started.
    Idle,
    /// Waiting for the ready handshake.
    AwaitingReady,
    /// Asking for the packet count.
    NegotiatingUpload,
    /// Receiving the initial packet stream.
    Streaming,
    /// Re-requesting lost packets.
    Recovering,
    /// Finished.
    Done,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingReady => "waiting for device",
            Self::NegotiatingUpload => "negotiating upload",
            Self::Streaming => "receiving",
            Self::Recovering => "recovering lost packets",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Packet numbers that went missing, in the order they were detected.
///
/// Inserting a number that is already present does nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LostPackets {
    numbers: Vec<u16>,
}

impl LostPackets {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lost packet. Returns `false` if it was already recorded.
    pub fn insert(&mut self, number: u16) -> bool {
        if self.contains(number) {
            return false;
        }
        self.numbers
            .push(number);
        true
    }

    /// Forget a packet once it has been recovered.
    pub fn remove(&mut self, number: u16) -> bool {
        match self
            .numbers
            .iter()
            .position(|&n| n == number)
        {
            Some(index) => {
                self.numbers
                    .remove(index);
                true
            },
            None => false,
        }
    }

    /// Whether `number` is recorded.
    pub fn contains(&self, number: u16) -> bool {
        self.numbers
            .contains(&number)
    }

    /// Oldest unrecovered packet.
    pub fn first(&self) -> Option<u16> {
        self.numbers
            .first()
            .copied()
    }

    /// Number of unrecovered packets.
    pub fn len(&self) -> usize {
        self.numbers
            .len()
    }

    /// Whether every packet arrived.
    pub fn is_empty(&self) -> bool {
        self.numbers
            .is_empty()
    }

    /// Iterate in detection order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.numbers
            .iter()
            .copied()
    }
}

/// Drives one download over a session.
pub struct DownloadEngine<'a, P: Channel, S: Channel> {
    session: &'a mut DeviceSession<P, S>,
    state: DownloadState,
    lost: LostPackets,
    packet_count: u16,
}

impl<'a, P: Channel, S: Channel> DownloadEngine<'a, P, S> {
    /// Create an idle engine.
    pub fn new(session: &'a mut DeviceSession<P, S>) -> Self {
        Self {
            session,
            state: DownloadState::Idle,
            lost: LostPackets::new(),
            packet_count: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Packets still missing.
    pub fn lost_packets(&self) -> &LostPackets {
        &self.lost
    }

    /// Packet count announced by the device.
    pub fn packet_count(&self) -> u16 {
        self.packet_count
    }

    fn enter<F>(&mut self, state: DownloadState, done: usize, progress: &mut F)
    where
        F: FnMut(DownloadState, usize, usize),
    {
        debug!("Download state: {:?} -> {:?}", self.state, state);
        self.state = state;
        progress(state, done, usize::from(self.packet_count));
    }

    /// Run the download, writing the archive to `sink`.
    ///
    /// `progress` receives the state together with the packets handled so far
    /// and the announced total.
    pub fn run<W, F>(&mut self, sink: &mut W, mut progress: F) -> Result<u32>
    where
        W: Write + ?Sized,
        F: FnMut(DownloadState, usize, usize),
    {
        self.enter(DownloadState::AwaitingReady, 0, &mut progress);
        self.session
            .ensure_ready()?;

        self.enter(DownloadState::NegotiatingUpload, 0, &mut progress);
        self.packet_count = self
            .session
            .begin_upload()?;

        if self.packet_count == 0 {
            self.session
                .reject_upload()?;
            self.enter(DownloadState::Done, 0, &mut progress);
            info!("No notes stored");
            return Ok(0);
        }

        self.session
            .accept_upload()?;
        self.stream(sink, &mut progress)?;
        self.recover(sink, &mut progress)?;

        self.session
            .accept_upload()?;
        sink.flush()?;

        let total = usize::from(self.packet_count);
        self.enter(DownloadState::Done, total, &mut progress);

        let size = archive_size(self.packet_count);
        info!("Downloaded {} packet(s), {size} bytes", self.packet_count);
        Ok(size)
    }

    fn stream<W, F>(&mut self, sink: &mut W, progress: &mut F) -> Result<()>
    where
        W: Write + ?Sized,
        F: FnMut(DownloadState, usize, usize),
    {
        self.enter(DownloadState::Streaming, 0, progress);
        let recover_truncated = self
            .session
            .config()
            .recover_truncated_stream;

        for expected in 1..=self.packet_count {
            self.session
                .check_interrupted()?;

            let report = match self
                .session
                .read_response()
            {
                Ok(report) => report,
                Err(e) if e.is_timeout() && recover_truncated => {
                    warn!(
                        "Stream stopped at packet {expected}/{}, requesting the rest",
                        self.packet_count
                    );
                    for missing in expected..=self.packet_count {
                        self.lost
                            .insert(missing);
                    }
                    return Ok(());
                },
                Err(e) => return Err(e),
            };
            let packet = DataPacket::parse(&report)?;

            if packet.number != expected && self.lost.insert(expected) {
                debug!(
                    "Packet {expected} lost (received {})",
                    packet.number
                );
            }

            // Once anything is lost the rest of the stream is held back.
            if self
                .lost
                .is_empty()
            {
                sink.write_all(&packet.payload)?;
            }

            progress(
                DownloadState::Streaming,
                usize::from(expected),
                usize::from(self.packet_count),
            );
        }

        Ok(())
    }

    fn recover<W, F>(&mut self, sink: &mut W, progress: &mut F) -> Result<()>
    where
        W: Write + ?Sized,
        F: FnMut(DownloadState, usize, usize),
    {
        if self
            .lost
            .is_empty()
        {
            return Ok(());
        }

        let total = usize::from(self.packet_count);
        let lost_at_start = self
            .lost
            .len();
        info!("Recovering {lost_at_start} lost packet(s)");
        self.enter(DownloadState::Recovering, total - lost_at_start, progress);

        while let Some(number) = self
            .lost
            .first()
        {
            self.session
                .check_interrupted()?;
            self.session
                .send(&RequestFrame::resend_packet(number))?;

            let packet = DataPacket::parse(
                &self
                    .session
                    .read_response()?,
            )?;
            if packet.number == number {
                self.lost
                    .remove(number);
                sink.write_all(&packet.payload)?;
                progress(
                    DownloadState::Recovering,
                    total - self
                        .lost
                        .len(),
                    total,
                );
            } else {
                debug!(
                    "Asked for packet {number}, received {}; asking again",
                    packet.number
                );
            }
        }

        Ok(())
    }
}

impl<P: Channel, S: Channel> DeviceSession<P, S> {
    /// Download every stored note to `sink`.
    ///
    /// Returns the archive size announced by the device.
    pub fn download_notes<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u32> {
        self.download_notes_with_progress(sink, |_, _, _| {})
    }

    /// Download every stored note to `sink`, reporting progress.
    pub fn download_notes_with_progress<W, F>(&mut self, sink: &mut W, progress: F) -> Result<u32>
    where
        W: Write + ?Sized,
        F: FnMut(DownloadState, usize, usize),
    {
        DownloadEngine::new(self).run(sink, progress)
    }
}
