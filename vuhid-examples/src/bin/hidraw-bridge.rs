// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// Mirrors a physical device reachable through /dev/hidrawN as a uhid device.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use hid_ioctls::{
    hidiocgrawinfo, hidiocgrawname, hidiocgrdesc, hidiocgrdescsize, hidraw_devinfo,
    hidraw_report_descriptor, string_from_ioctl_buf, HID_MAX_DESCRIPTOR_SIZE,
};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use vuhid::{DeviceIdentity, Registry, SessionId};
use vuhid_examples::{hex_dump, init_logging, UhidArgs};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// List hidraw devices and exit
    #[arg(long, default_value_t = false)]
    list: bool,

    /// hidraw node to mirror (with /dev/)
    #[arg(long, value_name = "PATH", required_unless_present = "list")]
    hidraw: Option<PathBuf>,

    #[command(flatten)]
    uhid: UhidArgs,
}

struct UsbStrings {
    manufacturer: Option<String>,
    product: Option<String>,
}

fn attribute(device: &libudev::Device, name: &str) -> Option<String> {
    device
        .attribute_value(name)
        .map(OsStr::to_string_lossy)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// The hidraw node itself carries no strings, the USB device somewhere above it does.
fn usb_strings(device: &libudev::Device) -> UsbStrings {
    let mut current = device.parent();
    while let Some(parent) = current {
        let manufacturer = attribute(&parent, "manufacturer");
        let product = attribute(&parent, "product");
        if manufacturer.is_some() || product.is_some() {
            return UsbStrings {
                manufacturer,
                product,
            };
        }
        current = parent.parent();
    }
    UsbStrings {
        manufacturer: None,
        product: None,
    }
}

fn with_hidraw_devices<F>(mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&Path, &libudev::Device),
{
    let context = libudev::Context::new().context("couldn't create udev context")?;
    let mut enumerator = libudev::Enumerator::new(&context)?;
    enumerator.match_subsystem("hidraw")?;
    for device in enumerator.scan_devices()? {
        if let Some(devnode) = device.devnode() {
            f(devnode, &device);
        }
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    with_hidraw_devices(|devnode, device| {
        let strings = usb_strings(device);
        let ids = File::open(devnode)
            .ok()
            .and_then(|file| read_devinfo(&file).ok())
            .map(|info| format!("{:04x}:{:04x}", info.vendor as u16, info.product as u16))
            .unwrap_or_else(|| "????:????".to_string());
        println!(
            "{}\t{}\t{} {}",
            devnode.display(),
            ids,
            strings.manufacturer.as_deref().unwrap_or("-"),
            strings.product.as_deref().unwrap_or("-")
        );
    })
}

fn read_devinfo(hidraw: &File) -> anyhow::Result<hidraw_devinfo> {
    let mut info = hidraw_devinfo::default();
    unsafe { hidiocgrawinfo(hidraw.as_raw_fd(), &mut info) }.context("HIDIOCGRAWINFO failed")?;
    Ok(info)
}

fn read_descriptor(hidraw: &File) -> anyhow::Result<Vec<u8>> {
    let mut size: libc::c_int = 0;
    unsafe { hidiocgrdescsize(hidraw.as_raw_fd(), &mut size) }
        .context("HIDIOCGRDESCSIZE failed")?;
    let size = usize::try_from(size).context("negative descriptor size")?;
    if size == 0 || size > HID_MAX_DESCRIPTOR_SIZE {
        bail!("kernel reported a descriptor of {} bytes", size);
    }

    let mut descriptor = Box::new(hidraw_report_descriptor::default());
    descriptor.size = size as u32;
    unsafe { hidiocgrdesc(hidraw.as_raw_fd(), &mut *descriptor) }
        .context("HIDIOCGRDESC failed")?;
    Ok(descriptor.value[..size].to_vec())
}

fn raw_name(hidraw: &File) -> Option<String> {
    let mut buf = [0u8; 256];
    unsafe { hidiocgrawname(hidraw.as_raw_fd(), &mut buf) }.ok()?;
    Some(string_from_ioctl_buf(&buf)).filter(|s| !s.is_empty())
}

fn identity_of(path: &Path, hidraw: &File) -> anyhow::Result<DeviceIdentity> {
    let info = read_devinfo(hidraw)?;
    let descriptor = read_descriptor(hidraw)?;
    debug!("report descriptor of {}:\n{}", path.display(), hex_dump(&descriptor));

    let mut strings = UsbStrings {
        manufacturer: None,
        product: None,
    };
    with_hidraw_devices(|devnode, device| {
        if devnode == path {
            strings = usb_strings(device);
        }
    })?;
    if strings.manufacturer.is_none() && strings.product.is_none() {
        strings.product = raw_name(hidraw);
    }

    Ok(DeviceIdentity {
        vendor_id: info.vendor as u16,
        product_id: info.product as u16,
        version: 0,
        country_code: 0,
        manufacturer: strings.manufacturer,
        product: strings.product,
        descriptor,
    })
}

fn relay(registry: &mut Registry, id: SessionId, hidraw: &mut File) -> anyhow::Result<()> {
    let mut report = [0u8; HID_MAX_DESCRIPTOR_SIZE];
    loop {
        let (hidraw_flags, uhid_flags) = {
            let session = registry.get(id).context("session vanished")?;
            let mut fds = [
                PollFd::new(hidraw.as_fd(), PollFlags::POLLIN),
                PollFd::new(session.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).context("poll failed"),
            }
            (
                fds[0].revents().unwrap_or(PollFlags::empty()),
                fds[1].revents().unwrap_or(PollFlags::empty()),
            )
        };
        let session = registry.get_mut(id).context("session vanished")?;

        if uhid_flags.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
            let opened = session.read()?;
            for output in session.take_output_reports() {
                debug!("forwarding output report of {} bytes", output.data.len());
                if let Err(e) = hidraw.write_all(&output.data) {
                    warn!("couldn't forward output report: {}", e);
                }
            }
            debug!("virtual device opened: {}", opened);
        }

        if hidraw_flags.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
            let len = match hidraw.read(&mut report) {
                Ok(0) => {
                    info!("hidraw device closed");
                    return Ok(());
                }
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    info!("hidraw device gone: {}", e);
                    return Ok(());
                }
            };
            // Nobody listens, the kernel would drop it anyway.
            if session.is_opened() {
                if let Err(e) = session.write(&report[..len]) {
                    warn!("couldn't forward input report: {}", e);
                }
            }
        }
    }
}

fn bridge(path: &Path, args: &UhidArgs) -> anyhow::Result<()> {
    let mut hidraw = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("couldn't open {}", path.display()))?;
    let correlation = hidraw.metadata()?.rdev();
    let mut identity = identity_of(path, &hidraw)?;

    let mut registry = Registry::new();
    let id = registry
        .create(&mut identity, correlation, &args.config())
        .with_context(|| format!("couldn't mirror {}", path.display()))?;
    if let Some(session) = registry.get(id) {
        info!("{} is mirrored as {}", path.display(), session.node().display());
    }

    let result = relay(&mut registry, id, &mut hidraw);
    registry.close_all();
    result
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    if args.list {
        return list_devices();
    }
    match &args.hidraw {
        Some(path) => bridge(path, &args.uhid),
        None => bail!("--hidraw is required"),
    }
}
