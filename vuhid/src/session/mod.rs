// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, error, info, trace, warn};

use crate::config::{Config, DescriptorPolicy};
use crate::descriptor::rewrite_usages;
use crate::discovery::{DiscoveryTag, DiscoveryWatcher, EvdevUniq, UniqProbe};
use crate::error::{Result, VuhidError};
use crate::event::{ReportType, UhidEvent, UHID_DATA_MAX, UHID_EVENT_SIZE};
use crate::identity::DeviceIdentity;

// Output reports nobody picked up are dropped beyond this.
const OUTPUT_QUEUE_LIMIT: usize = 64;

/// A report the kernel sent towards the device, e.g. LED state or rumble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputReport {
    pub data: Vec<u8>,
    pub rtype: ReportType,
}

/// One virtual device on /dev/uhid.
pub struct Session<D: Read + Write = File> {
    device: D,
    opened: bool,
    closed: bool,
    tag: DiscoveryTag,
    node: PathBuf,
    output_reports: VecDeque<OutputReport>,
}

pub fn open_uhid(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| {
            error!("couldn't open {}: {}", path.display(), e);
            VuhidError::unavailable(path.display().to_string(), e)
        })
}

impl Session<File> {
    /// Registers a virtual device for `identity` and waits until its input node exists.
    ///
    /// The report descriptor of `identity` is patched in place according to
    /// `config.descriptor_policy`. `correlation` identifies the physical device
    /// and goes into the uniq string the input node is found by.
    pub fn create(identity: &mut DeviceIdentity, correlation: u64, config: &Config) -> Result<Self> {
        identity.validate()?;
        let device = open_uhid(&config.uhid_path)?;
        Self::establish(device, EvdevUniq, identity, correlation, config)
    }
}

impl<D: Read + Write> Session<D> {
    pub fn create_with<P: UniqProbe>(
        device: D,
        probe: P,
        identity: &mut DeviceIdentity,
        correlation: u64,
        config: &Config,
    ) -> Result<Self> {
        identity.validate()?;
        Self::establish(device, probe, identity, correlation, config)
    }

    // `identity` has been validated by the caller.
    fn establish<P: UniqProbe>(
        device: D,
        probe: P,
        identity: &mut DeviceIdentity,
        correlation: u64,
        config: &Config,
    ) -> Result<Self> {
        let mut session = Session {
            device,
            opened: false,
            closed: false,
            tag: DiscoveryTag::for_correlation(correlation),
            node: PathBuf::new(),
            output_reports: VecDeque::new(),
        };

        match session.announce(probe, identity, config) {
            Ok(node) => {
                info!(
                    "created \"{}\" ({:04x}:{:04x}) as {}",
                    identity.display_name(),
                    identity.vendor_id,
                    identity.product_id,
                    node.display()
                );
                session.node = node;
                Ok(session)
            }
            Err(e) => {
                error!("creating uhid device \"{}\" failed: {}", session.tag, e);
                session.teardown();
                Err(e)
            }
        }
    }

    fn announce<P: UniqProbe>(
        &mut self,
        probe: P,
        identity: &mut DeviceIdentity,
        config: &Config,
    ) -> Result<PathBuf> {
        prepare_descriptor(&mut identity.descriptor, config.descriptor_policy)?;
        let create = UhidEvent::Create2(identity.create_request(self.tag.as_str()));

        // armed before the create request, released when it goes out of scope
        let watcher =
            DiscoveryWatcher::arm_with_probe(&config.input_dir, config.node_pattern.clone(), probe)?;
        self.send(&create)?;
        debug!("sent UHID_CREATE2 with uniq \"{}\"", self.tag);

        watcher.wait(&self.tag, Instant::now() + config.discovery_timeout)
    }

    /// Drains all pending kernel events and returns whether the device is opened
    /// by a reader. Never blocks. An error means the session is unusable.
    pub fn read(&mut self) -> Result<bool> {
        let mut record = vec![0u8; UHID_EVENT_SIZE];
        loop {
            let len = match self.device.read(&mut record) {
                Ok(0) => break,
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("{}: reading from uhid failed: {}", self.tag, e);
                    return Err(VuhidError::Io(e));
                }
            };
            match UhidEvent::decode(&record[..len]) {
                Some(event) => self.handle(event),
                None => warn!("{}: ignoring uhid record of {} bytes", self.tag, len),
            }
        }
        Ok(self.opened)
    }

    fn handle(&mut self, event: UhidEvent) {
        match event {
            UhidEvent::Start { dev_flags } => {
                debug!("{}: UHID_START (flags {:#x})", self.tag, dev_flags)
            }
            UhidEvent::Stop => debug!("{}: UHID_STOP", self.tag),
            UhidEvent::Open => {
                debug!("{}: UHID_OPEN", self.tag);
                self.opened = true;
            }
            UhidEvent::Close => {
                debug!("{}: UHID_CLOSE", self.tag);
                self.opened = false;
            }
            UhidEvent::Output { data, rtype } => {
                trace!("{}: output report of {} bytes", self.tag, data.len());
                if self.output_reports.len() == OUTPUT_QUEUE_LIMIT {
                    warn!("{}: dropping oldest unhandled output report", self.tag);
                    self.output_reports.pop_front();
                }
                self.output_reports.push_back(OutputReport { data, rtype });
            }
            UhidEvent::OutputEv { type_, code, value } => {
                trace!("{}: legacy output event {} {} {}", self.tag, type_, code, value)
            }
            // There is no device behind us to ask, refuse instead of letting the kernel time out.
            UhidEvent::GetReport { id, rnum, .. } => {
                debug!("{}: refusing GET_REPORT {} for report {}", self.tag, id, rnum);
                self.reply(UhidEvent::GetReportReply {
                    id,
                    err: libc::EIO as u16,
                    data: Vec::new(),
                });
            }
            UhidEvent::SetReport { id, rnum, .. } => {
                debug!("{}: refusing SET_REPORT {} for report {}", self.tag, id, rnum);
                self.reply(UhidEvent::SetReportReply {
                    id,
                    err: libc::EIO as u16,
                });
            }
            other => debug!("{}: ignoring uhid event type {}", self.tag, other.event_type()),
        }
    }

    fn reply(&mut self, event: UhidEvent) {
        if let Err(e) = self.send(&event) {
            warn!("{}: couldn't answer report request: {}", self.tag, e);
        }
    }

    /// Forwards one input report. Failures leave the session usable.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > UHID_DATA_MAX {
            return Err(VuhidError::OversizePayload {
                len: data.len(),
                max: UHID_DATA_MAX,
            });
        }
        self.send(&UhidEvent::Input2 {
            data: data.to_vec(),
        })
    }

    fn send(&mut self, event: &UhidEvent) -> Result<()> {
        let record = event.encode();
        let written = loop {
            match self.device.write(&record) {
                Ok(written) => break written,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(VuhidError::Io(e)),
            }
        };
        if written != record.len() {
            return Err(VuhidError::ProtocolViolation {
                written,
                expected: record.len(),
            });
        }
        Ok(())
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn tag(&self) -> &DiscoveryTag {
        &self.tag
    }

    /// The input node the kernel created for this device.
    pub fn node(&self) -> &Path {
        &self.node
    }

    pub fn take_output_reports(&mut self) -> Vec<OutputReport> {
        self.output_reports.drain(..).collect()
    }

    /// Destroys the virtual device and closes the uhid handle.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.send(&UhidEvent::Destroy) {
            warn!("{}: UHID_DESTROY failed: {}", self.tag, e);
        }
        self.opened = false;
        self.closed = true;
        debug!("{}: destroyed", self.tag);
    }
}

impl<D: Read + Write> Drop for Session<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl AsFd for Session<File> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.device.as_fd()
    }
}

impl<D: Read + Write> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("tag", &self.tag)
            .field("node", &self.node)
            .field("opened", &self.opened)
            .finish()
    }
}

fn prepare_descriptor(descriptor: &mut [u8], policy: DescriptorPolicy) -> Result<()> {
    match policy {
        DescriptorPolicy::Passthrough => Ok(()),
        DescriptorPolicy::Strict => {
            rewrite_usages(descriptor)?;
            Ok(())
        }
        DescriptorPolicy::Lenient => {
            if let Err(e) = rewrite_usages(descriptor) {
                debug!("continuing with a partially patched descriptor: {}", e);
            }
            Ok(())
        }
    }
}
