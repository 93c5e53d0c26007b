// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use vuhid::config::{INPUT_DIR, UHID_PATH};
use vuhid::{Config, DescriptorPolicy};

/// Options shared by the binaries for reaching the kernel interfaces.
#[derive(Debug, Args)]
pub struct UhidArgs {
    /// Path of the uhid character device
    #[arg(long, default_value = UHID_PATH)]
    pub uhid_path: PathBuf,

    /// Directory the kernel creates input nodes in
    #[arg(long, default_value = INPUT_DIR)]
    pub input_dir: PathBuf,

    /// How long to wait for the input node of a new device
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    pub discovery_timeout_ms: u64,

    /// Treatment of the report descriptor before it is handed to the kernel
    #[arg(long, value_enum, default_value_t)]
    pub descriptor_policy: DescriptorPolicy,
}

impl UhidArgs {
    pub fn config(&self) -> Config {
        Config {
            uhid_path: self.uhid_path.clone(),
            input_dir: self.input_dir.clone(),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            descriptor_policy: self.descriptor_policy,
            ..Config::default()
        }
    }
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// "05 01 09 05 ..." with a line break every 16 bytes.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        uhid: UhidArgs,
    }

    #[test]
    fn defaults_match_library_config() {
        let cli = Cli::parse_from(["test"]);
        let config = cli.uhid.config();
        assert_eq!(config.uhid_path, PathBuf::from("/dev/uhid"));
        assert_eq!(config.input_dir, PathBuf::from("/dev/input"));
        assert_eq!(config.discovery_timeout, Duration::from_secs(5));
        assert_eq!(config.descriptor_policy, DescriptorPolicy::Lenient);
    }

    #[test]
    fn policy_is_a_kebab_case_flag() {
        let cli = Cli::parse_from(["test", "--descriptor-policy", "passthrough"]);
        assert_eq!(cli.uhid.descriptor_policy, DescriptorPolicy::Passthrough);
    }

    #[test]
    fn hex_dump_breaks_lines() {
        let bytes: Vec<u8> = (0..18).collect();
        assert_eq!(
            hex_dump(&bytes),
            "00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n10 11"
        );
        assert_eq!(hex_dump(&[]), "");
    }
}
