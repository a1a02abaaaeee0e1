// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mounts a relay card as a directory of one-byte files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relayfs::device::{RelayDevice, SerialRelayDevice, SnmpRelayDevice};
use relayfs::fs::{RelayFs, fuse};
use relayfs::{SerialConfig, SnmpConfig};

#[derive(Parser, Debug)]
#[command(name = "relayfs", version, about = "Expose relay cards as a filesystem")]
struct Cli {
    /// JSON file with `snmp` and/or `serial` sections; flags override it.
    #[arg(long, global = true, env = "RELAYFS_CONFIG")]
    config: Option<PathBuf>,

    /// Extra mount option, may be repeated or comma separated.
    #[arg(short = 'o', global = true, value_name = "OPTION")]
    options: Vec<String>,

    /// Let other users access the mount.
    #[arg(long, global = true)]
    allow_other: bool,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount an SNMP relay card.
    Snmp(SnmpArgs),
    /// Mount a UDIN serial relay card.
    Serial(SerialArgs),
}

#[derive(Args, Debug)]
struct SnmpArgs {
    /// SNMP community string.
    #[arg(short, long)]
    community: Option<String>,

    /// Number of relays on the card (at most 16).
    #[arg(short = 'n', long)]
    relays: Option<u8>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retransmissions after the first attempt.
    #[arg(long)]
    retries: Option<u32>,

    /// `[PEER] MOUNTPOINT`. The agent address (`host` or `host:port`) may
    /// come from the config file instead.
    #[arg(value_names = ["PEER", "MOUNTPOINT"], num_args = 1..=2, required = true)]
    operands: Vec<String>,
}

#[derive(Args, Debug)]
struct SerialArgs {
    /// Keep the relay states found on the card instead of switching all off.
    #[arg(long)]
    no_reset: bool,

    /// `[DEVICE] MOUNTPOINT`. The serial device path may come from the
    /// config file instead.
    #[arg(value_names = ["DEVICE", "MOUNTPOINT"], num_args = 1..=2, required = true)]
    operands: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    snmp: Option<SnmpConfig>,
    serial: Option<SerialConfig>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConfigFile::default(),
    };
    let options = fuse::mount_options(cli.allow_other, &cli.options);

    match cli.command {
        Command::Snmp(args) => {
            let (config, mountpoint) = snmp_config(args, file.snmp)?;
            run(SnmpRelayDevice::new(config), &mountpoint, &options)
        }
        Command::Serial(args) => {
            let (config, mountpoint) = serial_config(args, file.serial)?;
            run(SerialRelayDevice::new(config), &mountpoint, &options)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<ConfigFile> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

/// Splits `[SOURCE] MOUNTPOINT` operands.
fn split_operands(mut operands: Vec<String>) -> anyhow::Result<(Option<String>, PathBuf)> {
    let Some(mountpoint) = operands.pop() else {
        bail!("a mountpoint is required");
    };
    Ok((operands.pop(), PathBuf::from(mountpoint)))
}

fn snmp_config(
    args: SnmpArgs,
    base: Option<SnmpConfig>,
) -> anyhow::Result<(SnmpConfig, PathBuf)> {
    let (peer, mountpoint) = split_operands(args.operands)?;
    let peer = match (peer, &base) {
        (Some(peer), _) => peer,
        (None, Some(base)) => base.peer().to_string(),
        (None, None) => bail!("an SNMP peer is required"),
    };

    let community = match (args.community, &base) {
        (Some(community), _) => community,
        (None, Some(base)) => base.community().to_string(),
        (None, None) => bail!("an SNMP community is required (--community)"),
    };

    let relays = match (args.relays, &base) {
        (Some(relays), _) => relays,
        (None, Some(base)) => base.relays(),
        (None, None) => SnmpConfig::MAX_RELAYS,
    };
    if relays > SnmpConfig::MAX_RELAYS {
        warn!(
            requested = relays,
            max = SnmpConfig::MAX_RELAYS,
            "Relay count above maximum, clamping"
        );
    }

    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .or(base.as_ref().map(SnmpConfig::timeout));
    let retries = args.retries.or(base.as_ref().map(SnmpConfig::retries));

    let mut config = SnmpConfig::new(peer, community).with_relays(relays);
    if let Some(timeout) = timeout {
        config = config.with_timeout(timeout);
    }
    if let Some(retries) = retries {
        config = config.with_retries(retries);
    }
    Ok((config, mountpoint))
}

fn serial_config(
    args: SerialArgs,
    base: Option<SerialConfig>,
) -> anyhow::Result<(SerialConfig, PathBuf)> {
    let (device, mountpoint) = split_operands(args.operands)?;
    let base = match (device, base) {
        (Some(device), Some(base)) => base.with_device(device),
        (Some(device), None) => SerialConfig::new(device),
        (None, Some(base)) => base,
        (None, None) => bail!("a serial device is required"),
    };
    let reset = base.reset_on_init() && !args.no_reset;
    Ok((base.with_reset_on_init(reset), mountpoint))
}

fn run<D: RelayDevice + 'static>(
    device: D,
    mountpoint: &Path,
    options: &[fuse::MountOption],
) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), device = %device.describe(), "Starting relayfs");
    fuse::mount(RelayFs::new(device), mountpoint, options)
        .with_context(|| format!("mounting on {}", mountpoint.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snmp_args(operands: &[&str]) -> SnmpArgs {
        SnmpArgs {
            community: None,
            relays: None,
            timeout_ms: None,
            retries: None,
            operands: operands.iter().map(ToString::to_string).collect(),
        }
    }

    fn serial_args(operands: &[&str], no_reset: bool) -> SerialArgs {
        SerialArgs {
            no_reset,
            operands: operands.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn snmp_peer_falls_back_to_file() {
        let base = SnmpConfig::new("10.0.0.5", "private").with_relays(4);
        let (config, mountpoint) = snmp_config(snmp_args(&["/mnt/relays"]), Some(base)).unwrap();
        assert_eq!(config.peer(), "10.0.0.5");
        assert_eq!(config.community(), "private");
        assert_eq!(config.relays(), 4);
        assert_eq!(mountpoint, PathBuf::from("/mnt/relays"));
    }

    #[test]
    fn snmp_peer_operand_overrides_file() {
        let base = SnmpConfig::new("10.0.0.5", "private");
        let (config, _) =
            snmp_config(snmp_args(&["10.0.0.9", "/mnt/relays"]), Some(base)).unwrap();
        assert_eq!(config.peer(), "10.0.0.9");
    }

    #[test]
    fn snmp_requires_peer_and_community() {
        assert!(snmp_config(snmp_args(&["/mnt/relays"]), None).is_err());
        assert!(snmp_config(snmp_args(&["10.0.0.5", "/mnt/relays"]), None).is_err());
    }

    #[test]
    fn serial_device_falls_back_to_file() {
        let base = SerialConfig::new("/dev/ttyS1").with_baud_rate(19_200);
        let (config, mountpoint) =
            serial_config(serial_args(&["/mnt/relays"], false), Some(base)).unwrap();
        assert_eq!(config.device(), Path::new("/dev/ttyS1"));
        assert_eq!(config.baud_rate(), 19_200);
        assert_eq!(mountpoint, PathBuf::from("/mnt/relays"));
    }

    #[test]
    fn serial_device_operand_keeps_file_settings() {
        let base = SerialConfig::new("/dev/ttyS1")
            .with_baud_rate(19_200)
            .with_reset_on_init(true);
        let (config, _) = serial_config(
            serial_args(&["/dev/ttyUSB0", "/mnt/relays"], true),
            Some(base),
        )
        .unwrap();
        assert_eq!(config.device(), Path::new("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate(), 19_200);
        assert!(!config.reset_on_init());
        assert!(serial_config(serial_args(&["/mnt/relays"], false), None).is_err());
    }
}
