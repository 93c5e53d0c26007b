// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use clap::Parser;
use log::{debug, info};
use vuhid::{DeviceIdentity, Session};
use vuhid_examples::{hex_dump, init_logging, UhidArgs};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Device identity (JSON encoded, descriptor as base64)
    #[arg(long, value_name = "JSON")]
    identity: Option<String>,

    /// Device identity (base64-encoded JSON)
    #[arg(long = "identity-base64", value_name = "BASE64")]
    identity_base64: Option<String>,

    /// Input report to send (base64). May be given several times; reports are sent in turn.
    #[arg(long, value_name = "BASE64")]
    report: Vec<String>,

    /// Pause between two reports
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    /// Number of reports to send
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Give up if nobody opens the device within this time
    #[arg(long, default_value_t = 10)]
    open_timeout_secs: u64,

    /// Correlation value that goes into the uniq string of the device
    #[arg(long, default_value_t = 0)]
    correlation: u64,

    #[command(flatten)]
    uhid: UhidArgs,
}

fn identity_json(args: &Args) -> anyhow::Result<String> {
    match (&args.identity, &args.identity_base64) {
        (Some(json), None) => Ok(json.clone()),
        (None, Some(b64)) => {
            let decoded = BASE64_STANDARD
                .decode(b64)
                .context("--identity-base64 is not valid base64")?;
            String::from_utf8(decoded).context("--identity-base64 is not UTF-8")
        }
        (None, None) => bail!("--identity or --identity-base64 is required"),
        (Some(_), Some(_)) => bail!("--identity and --identity-base64 may not be used together"),
    }
}

fn decode_reports(encoded: &[String]) -> anyhow::Result<Vec<Vec<u8>>> {
    encoded
        .iter()
        .map(|r| {
            BASE64_STANDARD
                .decode(r)
                .with_context(|| format!("report {r:?} is not valid base64"))
        })
        .collect()
}

fn wait_until_opened(session: &mut Session, timeout: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;
    while !session.read()? {
        if Instant::now() >= deadline {
            bail!("nobody opened {} within {:?}", session.node().display(), timeout);
        }
        sleep(Duration::from_millis(10));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let mut identity = DeviceIdentity::from_json(&identity_json(&args)?)?;
    let reports = decode_reports(&args.report)?;

    let mut session = Session::create(&mut identity, args.correlation, &args.uhid.config())?;
    debug!("descriptor as sent:\n{}", hex_dump(&identity.descriptor));
    info!("created {}", session.node().display());

    if !reports.is_empty() {
        wait_until_opened(&mut session, Duration::from_secs(args.open_timeout_secs))?;
        for report in reports.iter().cycle().take(args.count) {
            session.read()?;
            session.write(report)?;
            sleep(Duration::from_millis(args.interval_ms));
        }
        info!("sent {} reports", args.count);
    }

    session.close();
    Ok(())
}
