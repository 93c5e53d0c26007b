// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Finds the input node the kernel creates for a uhid device.
//!
//! UHID_CREATE2 does not tell which /dev/input/eventN belongs to the new device.
//! The device is therefore created with a unique `uniq` string and every node
//! appearing in the input directory is asked for its uniq (EVIOCGUNIQ) until one
//! matches. The watch has to be armed before the create request is written,
//! otherwise the node may appear before anybody is looking.

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_io::{Async, Timer};
use futures::future::{self, Either};
use futures::pin_mut;
use hid_ioctls::{eviocguniq, string_from_ioctl_buf, EVDEV_STRING_LEN};
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use regex::Regex;

use crate::error::{Result, VuhidError};

/// The uniq string a session puts into its create request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryTag(String);

impl DiscoveryTag {
    pub fn new(pid: u32, correlation: u64) -> Self {
        DiscoveryTag(format!("VUHID {} {:#x}", pid, correlation))
    }

    /// Tag for this process.
    pub fn for_correlation(correlation: u64) -> Self {
        Self::new(std::process::id(), correlation)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiscoveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asks a freshly created node for the uniq string its driver reports.
pub trait UniqProbe {
    fn unique_id(&self, node: &Path) -> io::Result<String>;
}

/// Queries evdev nodes with EVIOCGUNIQ.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvdevUniq;

impl UniqProbe for EvdevUniq {
    fn unique_id(&self, node: &Path) -> io::Result<String> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(node)?;
        let mut buf = [0u8; EVDEV_STRING_LEN];
        unsafe { eviocguniq(file.as_raw_fd(), &mut buf) }.map_err(io::Error::from)?;
        Ok(string_from_ioctl_buf(&buf))
    }
}

// Lets async-io poll the inotify descriptor without taking ownership of it.
struct FdWrap(RawFd);
impl AsRawFd for FdWrap {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}
impl AsFd for FdWrap {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the watcher owns the fd and outlives every FdWrap it hands out
        unsafe { BorrowedFd::borrow_raw(self.0) }
    }
}

/// An armed creation-only watch on the input directory. Dropping it releases the watch.
pub struct DiscoveryWatcher<P: UniqProbe = EvdevUniq> {
    inotify: Inotify,
    dir: PathBuf,
    node_pattern: Regex,
    probe: P,
}

impl DiscoveryWatcher<EvdevUniq> {
    pub fn arm(dir: &Path, node_pattern: Regex) -> Result<Self> {
        Self::arm_with_probe(dir, node_pattern, EvdevUniq)
    }
}

impl<P: UniqProbe> DiscoveryWatcher<P> {
    pub fn arm_with_probe(dir: &Path, node_pattern: Regex, probe: P) -> Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .map_err(|e| VuhidError::unavailable("inotify", e.into()))?;
        inotify
            .add_watch(dir, AddWatchFlags::IN_CREATE)
            .map_err(|e| VuhidError::unavailable(format!("watch on {}", dir.display()), e.into()))?;
        debug!("watching {} for new input nodes", dir.display());

        Ok(Self {
            inotify,
            dir: dir.to_path_buf(),
            node_pattern,
            probe,
        })
    }

    /// Blocks until a node reporting `tag` appears or `deadline` passes.
    pub fn wait(&self, tag: &DiscoveryTag, deadline: Instant) -> Result<PathBuf> {
        futures::executor::block_on(self.wait_async(tag, deadline))
    }

    pub async fn wait_async(&self, tag: &DiscoveryTag, deadline: Instant) -> Result<PathBuf> {
        let started = Instant::now();
        let watch = Async::new(FdWrap(self.inotify.as_fd().as_raw_fd()))
            .map_err(|e| VuhidError::unavailable("inotify reactor", e))?;

        loop {
            // Nodes may have been created between arming and waiting, so look before sleeping.
            if let Some(node) = self.drain(tag)? {
                return Ok(node);
            }

            let readable = watch.readable();
            let timer = Timer::at(deadline);
            pin_mut!(readable, timer);
            match future::select(readable, timer).await {
                Either::Left((ready, _)) => ready?,
                Either::Right(_) => {
                    warn!("no input node reported uniq \"{}\" in time", tag);
                    return Err(VuhidError::Timeout {
                        tag: tag.to_string(),
                        waited: started.elapsed(),
                    });
                }
            }
        }
    }

    /// Reads every queued creation record; returns the first node reporting `tag`.
    fn drain(&self, tag: &DiscoveryTag) -> Result<Option<PathBuf>> {
        loop {
            let events = match self.inotify.read_events() {
                Ok(events) => events,
                Err(Errno::EAGAIN) => return Ok(None),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(VuhidError::Io(e.into())),
            };

            for event in events {
                if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
                    warn!("inotify queue overflow on {}", self.dir.display());
                    continue;
                }
                let Some(name) = event.name else {
                    continue;
                };
                if !self.node_pattern.is_match(&name.to_string_lossy()) {
                    continue;
                }
                let node = self.dir.join(&name);
                if self.reports(&node, tag) {
                    debug!("{} reports uniq \"{}\"", node.display(), tag);
                    return Ok(Some(node));
                }
            }
        }
    }

    fn reports(&self, node: &Path, tag: &DiscoveryTag) -> bool {
        match self.probe.unique_id(node) {
            Ok(uniq) => uniq == tag.as_str(),
            Err(e) => {
                debug!("skipping {}: {}", node.display(), e);
                false
            }
        }
    }
}
