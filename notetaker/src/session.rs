//! Device session and handshake.
//!
//! A [`DeviceSession`] owns both interfaces of one M210 and drives the
//! request/response exchanges on the primary one:
//!
//! ```text
//! host                               M210
//!  |  0x95 ready  ------------------->  |   (repeated until answered)
//!  |  <------------ 80 a9 28 ... 0e mode |
//!  |  0xb5 begin upload -------------->  |
//!  |  <------- aa x5 | count | 55 55     |   (silence: no notes stored)
//!  |  0xb6 accept / 0xb7 reject ------>  |
//! ```
//!
//! Every public operation starts with [`DeviceSession::ensure_ready`] because
//! a previously failed call may have left the device busy.

use {
    crate::{
        channel::{Channel, M210_IDENTITY},
        error::{Error, Result},
        is_interrupted_requested,
        protocol::{
            DeviceInfo, ReadyStatus, RequestFrame,
            frame::{PRIMARY_REPORT_SIZE, SECONDARY_REPORT_SIZE, parse_upload_header},
            is_button_event,
        },
    },
    log::{debug, info, trace, warn},
    std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::{Duration, Instant},
    },
};

/// Default timeout for a single report read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared cancellation flag for one session.
///
/// Clones observe the same flag, so a token handed to a signal handler can
/// stop a session running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0
            .store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0
            .load(Ordering::Relaxed)
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for a single report read.
    pub read_timeout: Duration,
    /// Give up on the ready handshake after this long. `None` polls forever.
    pub ready_deadline: Option<Duration>,
    /// Treat a stream that stops early as lost packets instead of failing.
    pub recover_truncated_stream: bool,
    /// Per-session cancellation.
    pub cancel: CancelToken,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            ready_deadline: None,
            recover_truncated_stream: false,
            cancel: CancelToken::new(),
        }
    }
}

impl SessionConfig {
    /// Set the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bound the ready handshake.
    #[must_use]
    pub fn with_ready_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.ready_deadline = deadline;
        self
    }

    /// Recover from a stream that ends before the announced packet count.
    #[must_use]
    pub fn with_truncated_stream_recovery(mut self, enabled: bool) -> Self {
        self.recover_truncated_stream = enabled;
        self
    }

    /// Use a caller-owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Check that a channel belongs to an M210.
pub fn verify_identity<C: Channel + ?Sized>(channel: &C) -> Result<()> {
    let actual = channel.identity()?;
    if actual != M210_IDENTITY {
        return Err(Error::IdentityMismatch {
            path: channel
                .name()
                .to_string(),
            expected: M210_IDENTITY,
            actual,
        });
    }
    Ok(())
}

/// Read one primary report, skipping mode button events.
pub(crate) fn read_primary<C: Channel + ?Sized>(
    channel: &mut C,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut buf = [0u8; PRIMARY_REPORT_SIZE];
    loop {
        let n = channel.read_report(&mut buf, timeout)?;
        if is_button_event(&buf[..n]) {
            debug!("Ignoring mode button event");
            continue;
        }
        return Ok(buf[..n].to_vec());
    }
}

fn send<C: Channel + ?Sized>(channel: &mut C, request: &RequestFrame) -> Result<()> {
    trace!("Sending {:?}", request.opcode());
    channel.write_report(&request.build())
}

/// Sends a plain reject when dropped while armed.
///
/// Upload negotiation arms it so that any early return leaves the device out
/// of upload mode.
struct RejectOnDrop<'a, C: Channel + ?Sized> {
    channel: &'a mut C,
    armed: bool,
}

impl<'a, C: Channel + ?Sized> RejectOnDrop<'a, C> {
    fn new(channel: &'a mut C) -> Self {
        Self {
            channel,
            armed: true,
        }
    }

    fn channel(&mut self) -> &mut C {
        self.channel
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C: Channel + ?Sized> Drop for RejectOnDrop<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = send(self.channel, &RequestFrame::reject_upload()) {
                warn!("Failed to reject upload after error: {e}");
            }
        }
    }
}

/// An open session with one M210.
///
/// Generic over the channel types so that tests can substitute in-memory
/// channels for the hidraw nodes.
pub struct DeviceSession<P: Channel, S: Channel> {
    primary: P,
    secondary: S,
    config: SessionConfig,
    synchronized: bool,
}

impl<P: Channel, S: Channel> DeviceSession<P, S> {
    /// Create a session over the primary (command) and secondary (event)
    /// interfaces.
    ///
    /// Both interfaces must report the M210 identity. Nothing is read or
    /// written before that check passes.
    pub fn new(primary: P, secondary: S, config: SessionConfig) -> Result<Self> {
        verify_identity(&primary)?;
        verify_identity(&secondary)?;

        debug!(
            "Session opened on {} and {}",
            primary.name(),
            secondary.name()
        );

        Ok(Self {
            primary,
            secondary,
            config,
            synchronized: false,
        })
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a reference to the primary channel.
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// Get a mutable reference to the primary channel.
    pub fn primary_mut(&mut self) -> &mut P {
        &mut self.primary
    }

    /// Get a reference to the secondary channel.
    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    /// Consume the session and return both channels.
    pub fn into_channels(self) -> (P, S) {
        (self.primary, self.secondary)
    }

    /// Whether the last exchange left the device in the ready state.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Fail with [`Error::Interrupted`] if cancellation was requested.
    pub(crate) fn check_interrupted(&self) -> Result<()> {
        if self
            .config
            .cancel
            .is_cancelled()
            || is_interrupted_requested()
        {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    pub(crate) fn send(&mut self, request: &RequestFrame) -> Result<()> {
        send(&mut self.primary, request)
    }

    pub(crate) fn read_response(&mut self) -> Result<Vec<u8>> {
        read_primary(&mut self.primary, self.config.read_timeout)
    }

    /// Poll the device until it answers the ready request.
    ///
    /// Read timeouts are retried without limit unless a ready deadline is
    /// configured. A response that fails validation is a
    /// [`Error::Communication`] error.
    pub fn wait_ready(&mut self) -> Result<ReadyStatus> {
        self.synchronized = false;
        let start = Instant::now();
        let mut polls = 0usize;

        let report = loop {
            self.check_interrupted()?;
            self.send(&RequestFrame::ready())?;
            polls += 1;

            match self.read_response() {
                Ok(report) => break report,
                Err(e) if e.is_timeout() => {
                    if polls == 1 {
                        debug!("Device not ready yet, polling");
                    }
                    if let Some(deadline) = self.config.ready_deadline {
                        if start.elapsed() >= deadline {
                            return Err(Error::Timeout(format!(
                                "device not ready after {polls} polls in {}ms",
                                start
                                    .elapsed()
                                    .as_millis()
                            )));
                        }
                    }
                },
                Err(e) => return Err(e),
            }
        };

        let status = ReadyStatus::parse(&report)?;
        debug!(
            "Device ready after {polls} poll(s): firmware {}, mode {}",
            status.firmware_version, status.mode
        );
        self.synchronized = true;
        Ok(status)
    }

    /// Bring the device into the ready state and record it.
    ///
    /// Every public operation calls this first.
    pub fn ensure_ready(&mut self) -> Result<ReadyStatus> {
        self.wait_ready()
    }

    /// Ask the device how many packets it holds.
    ///
    /// Silence means no notes are stored and yields 0. On any other failure
    /// a plain reject is sent before the error is returned, and a failure of
    /// that reject is only logged.
    pub fn begin_upload(&mut self) -> Result<u16> {
        if !self.synchronized {
            self.ensure_ready()?;
        }
        self.synchronized = false;

        let timeout = self.config.read_timeout;
        let mut guard = RejectOnDrop::new(&mut self.primary);

        send(guard.channel(), &RequestFrame::begin_upload())?;
        let count = match read_primary(guard.channel(), timeout) {
            Ok(report) => parse_upload_header(&report)?,
            Err(e) if e.is_timeout() => {
                debug!("No upload header, device holds no notes");
                0
            },
            Err(e) => return Err(e),
        };

        guard.disarm();
        debug!("Device announced {count} packet(s)");
        Ok(count)
    }

    /// Accept the announced upload, or close a finished one.
    pub fn accept_upload(&mut self) -> Result<()> {
        self.send(&RequestFrame::accept_upload())
    }

    /// Decline the announced upload.
    pub fn reject_upload(&mut self) -> Result<()> {
        self.send(&RequestFrame::reject_upload())
    }

    /// Query versions, mode and the size of the stored notes.
    pub fn get_info(&mut self) -> Result<DeviceInfo> {
        let status = self.ensure_ready()?;
        let packet_count = self.begin_upload()?;
        self.reject_upload()?;

        let info = DeviceInfo::new(status, packet_count);
        info!(
            "Firmware {}, analog {}, pad {}, mode {}, {} bytes stored",
            info.firmware_version, info.analog_version, info.pad_version, info.mode, info.download_size
        );
        Ok(info)
    }

    /// Alias of [`get_info`](Self::get_info).
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        self.get_info()
    }

    /// Erase every note stored in the device.
    ///
    /// The device does not acknowledge the request.
    pub fn delete_notes(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.send(&RequestFrame::delete_notes())?;
        self.synchronized = false;
        info!("Stored notes erased");
        Ok(())
    }

    /// Alias of [`delete_notes`](Self::delete_notes).
    pub fn delete_all_notes(&mut self) -> Result<()> {
        self.delete_notes()
    }

    /// Read one report from the secondary interface.
    pub fn read_aux_report(&mut self) -> Result<Vec<u8>> {
        let mut buf = [0u8; SECONDARY_REPORT_SIZE];
        let n = self
            .secondary
            .read_report(&mut buf, self.config.read_timeout)?;
        trace!("Auxiliary report: {:02x?}", &buf[..n]);
        Ok(buf[..n].to_vec())
    }
}
