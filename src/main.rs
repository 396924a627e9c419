use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use capture::Packet;
use output::OutputDir;
use randomization::fingerprint::Elements;

mod bluetooth;
mod capture;
mod cluster;
mod error;
mod frame;
mod mac;
mod output;
mod plot;
mod randomization;
mod stats;
mod timing;
mod wifi;

/// Offline analyses of wireless captures: Wi-Fi attacks, MAC randomization,
/// Bluetooth devices from Kismet logs and inter-arrival anomalies.
#[derive(Parser)]
#[clap(version)]
struct Cli {
    /// Directory receiving CSV files, plots and exports.
    #[clap(long, short, global = true, default_value = "output")]
    output_dir: PathBuf,
    /// More log output (-v debug, -vv trace).
    #[clap(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Less log output (-q warn, -qq error, -qqq off).
    #[clap(long, short, global = true, action = ArgAction::Count)]
    quiet: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wi-Fi attack detectors.
    Wifi {
        #[clap(subcommand)]
        command: WifiCommand,
    },
    /// Group randomized MAC addresses by device.
    Mac {
        #[clap(subcommand)]
        command: MacCommand,
    },
    /// Profile Bluetooth devices from a Kismet log.
    Bluetooth {
        db: PathBuf,
        /// Skip the JSON dump of every table.
        #[clap(long)]
        no_json: bool,
        /// Skip the KML export.
        #[clap(long)]
        no_kml: bool,
    },
    /// Anomalies in frame inter-arrival times.
    Timing {
        #[clap(subcommand)]
        command: TimingCommand,
    },
}

#[derive(Subcommand)]
enum WifiCommand {
    /// Deauthentication floods.
    Deauth { pcap: PathBuf },
    /// Repeated EAPOL key frames from one transmitter.
    Eapol {
        pcap: PathBuf,
        #[clap(long, default_value_t = wifi::eapol::DEFAULT_THRESHOLD)]
        threshold: usize,
    },
    /// SSIDs advertised by more than one BSSID.
    EvilTwin { pcap: PathBuf },
    /// Beacons for SSIDs outside the trusted list.
    RogueAp {
        pcap: PathBuf,
        /// Trusted SSIDs, comma separated or repeated.
        #[clap(long = "known-ssid", alias = "known-ssids")]
        known: Vec<String>,
    },
}

#[derive(Subcommand)]
enum MacCommand {
    /// Identical probe-request element fingerprints.
    Fingerprint {
        pcap: PathBuf,
        #[clap(long, value_enum, default_value_t)]
        elements: Elements,
        #[clap(long)]
        include_singletons: bool,
    },
    /// Overlapping lists of probed SSIDs.
    Ssid {
        pcap: PathBuf,
        #[clap(long, default_value_t = 0.5)]
        eps: f64,
        #[clap(long, default_value_t = 1)]
        min_samples: usize,
    },
    /// Similar transmission timing.
    Temporal {
        pcap: PathBuf,
        #[clap(long, default_value_t = 5.0)]
        eps: f64,
        #[clap(long, default_value_t = 1)]
        min_samples: usize,
        /// Also compare sequence number increments.
        #[clap(long)]
        with_sequence: bool,
    },
}

#[derive(Subcommand)]
enum TimingCommand {
    /// Δt outside mean ± 3σ.
    Statistical { pcap: PathBuf },
    /// Very short and very long gaps.
    Burst {
        pcap: PathBuf,
        #[clap(long, default_value_t = 0.001)]
        burst: f64,
        #[clap(long, default_value_t = 1.0)]
        silence: f64,
    },
    /// Residuals of ARIMA(2,0,1) forecasts.
    Arima { pcap: PathBuf },
    /// Reconstruction error of a dense autoencoder.
    Autoencoder {
        pcap: PathBuf,
        #[clap(long, default_value_t = 50)]
        epochs: usize,
        #[clap(long, default_value_t = 42)]
        seed: u64,
    },
    /// One-class SVM over windows of 50 gaps.
    Ocsvm { pcap: PathBuf },
    /// DBSCAN and k-means labels for every gap.
    Cluster { pcap: PathBuf },
}

fn log_level(verbose: u8, quiet: u8) -> LevelFilter {
    match i16::from(verbose) - i16::from(quiet) {
        x if x >= 2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) if verbose == 0 && quiet == 0 => {
            builder.parse_filters(&filters);
        }
        _ => {
            builder.filter_level(log_level(verbose, quiet));
        }
    }
    builder.init();
}

/// Decoded 802.11 packets, or `None` if the capture has another link type.
fn wifi_packets(path: &Path) -> Result<Option<Vec<Packet>>> {
    let (link, packets) = capture::read(path).with_context(|| format!("failed to read {path:?}"))?;
    if !link.is_wifi() {
        log::warn!("{path:?} is not an 802.11 capture ({link:?}), skipping detection");
        return Ok(None);
    }
    Ok(Some(packets))
}

fn load_series(path: &Path) -> Result<timing::Series> {
    timing::Series::load(path).with_context(|| format!("failed to read timestamps from {path:?}"))
}

fn run_wifi(command: WifiCommand, out: &OutputDir) -> Result<()> {
    match command {
        WifiCommand::Deauth { pcap } => {
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let report = wifi::deauth::detect(&packets);
            report.print();
            report.write(out)?;
        }
        WifiCommand::Eapol { pcap, threshold } => {
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let report = wifi::eapol::detect(&packets, threshold);
            report.print();
            report.write(out)?;
        }
        WifiCommand::EvilTwin { pcap } => {
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let report = wifi::evil_twin::detect(&packets);
            report.print();
            report.write(out)?;
        }
        WifiCommand::RogueAp { pcap, known } => {
            let mut known = wifi::rogue_ap::parse_known(&known);
            if known.is_empty() {
                known = wifi::rogue_ap::DEFAULT_KNOWN_SSIDS.iter().map(|s| s.to_string()).collect();
            }
            log::info!("trusted SSIDs: {known:?}");
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let report = wifi::rogue_ap::detect(&packets, &known);
            report.print();
            report.write(out)?;
        }
    }
    Ok(())
}

fn run_mac(command: MacCommand, out: &OutputDir) -> Result<()> {
    use randomization::{fingerprint, ssid, temporal};

    match command {
        MacCommand::Fingerprint {
            pcap,
            elements,
            include_singletons,
        } => {
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let clusters = fingerprint::cluster(&packets, elements, include_singletons);
            fingerprint::print(&clusters);
            fingerprint::write(&clusters, out)?;
        }
        MacCommand::Ssid { pcap, eps, min_samples } => {
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let rows = ssid::cluster(&packets, eps, min_samples);
            ssid::print(&rows);
            ssid::write(&rows, out)?;
        }
        MacCommand::Temporal {
            pcap,
            eps,
            min_samples,
            with_sequence,
        } => {
            let packets = wifi_packets(&pcap)?.unwrap_or_default();
            let params = temporal::TemporalParams {
                eps,
                min_samples,
                with_sequence,
            };
            let profiles = temporal::cluster(&packets, &params);
            temporal::print(&profiles);
            temporal::write(&profiles, out)?;
        }
    }
    Ok(())
}

fn run_timing(command: TimingCommand, out: &OutputDir) -> Result<()> {
    use timing::{arima, autoencoder, burst, clustering, ocsvm, statistical};

    match command {
        TimingCommand::Statistical { pcap } => {
            let report = statistical::detect(&load_series(&pcap)?);
            report.print();
            report.write(out)?;
        }
        TimingCommand::Burst { pcap, burst, silence } => {
            let rows = burst::detect(&load_series(&pcap)?, burst::Thresholds { burst, silence });
            burst::print(&rows);
            burst::write(&rows, out)?;
        }
        TimingCommand::Arima { pcap } => {
            let report = arima::detect(&load_series(&pcap)?).context("ARIMA fit failed")?;
            report.print();
            report.write(out)?;
        }
        TimingCommand::Autoencoder { pcap, epochs, seed } => {
            let params = autoencoder::Params {
                epochs,
                seed,
                ..Default::default()
            };
            let report = autoencoder::detect(&load_series(&pcap)?, &params).context("autoencoder failed")?;
            report.print();
            report.write(out)?;
        }
        TimingCommand::Ocsvm { pcap } => {
            let rows = ocsvm::detect(&load_series(&pcap)?).context("one-class SVM failed")?;
            ocsvm::print(&rows);
            ocsvm::write(&rows, out)?;
        }
        TimingCommand::Cluster { pcap } => {
            let rows = clustering::detect(&load_series(&pcap)?, &clustering::Params::default())
                .context("clustering failed")?;
            clustering::print(&rows);
            clustering::write(&rows, out)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let out = OutputDir::create(&cli.output_dir)
        .with_context(|| format!("failed to create {:?}", cli.output_dir))?;

    match cli.command {
        Command::Wifi { command } => run_wifi(command, &out)?,
        Command::Mac { command } => run_mac(command, &out)?,
        Command::Bluetooth { db, no_json, no_kml } => {
            let options = bluetooth::Options {
                json: !no_json,
                kml: !no_kml,
            };
            let devices = bluetooth::run(&db, &out, options)
                .with_context(|| format!("failed to analyze Kismet log {db:?}"))?;
            bluetooth::print(&devices);
        }
        Command::Timing { command } => run_timing(command, &out)?,
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::parse_from(["capsift", "-vv", "mac", "temporal", "x.pcap", "--with-sequence"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output_dir, PathBuf::from("output"));
        assert!(matches!(
            cli.command,
            Command::Mac {
                command: MacCommand::Temporal {
                    with_sequence: true,
                    min_samples: 1,
                    ..
                }
            }
        ));

        let cli = Cli::parse_from([
            "capsift",
            "wifi",
            "rogue-ap",
            "x.pcap",
            "--known-ssid",
            "a,b",
            "--known-ssid",
            "c",
            "--output-dir",
            "out",
        ]);
        assert_eq!(cli.output_dir, PathBuf::from("out"));
        match cli.command {
            Command::Wifi {
                command: WifiCommand::RogueAp { known, .. },
            } => assert_eq!(known, vec!["a,b".to_string(), "c".to_string()]),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn non_wifi_captures_are_skipped() {
        use crate::capture::test::{radiotap, write_pcap};
        use crate::frame::test::{beacon, AP};
        use pcap::Linktype;

        let dir = tempfile::tempdir().unwrap();
        let ethernet = dir.path().join("lan.pcap");
        write_pcap(&ethernet, Linktype::ETHERNET, &[(1, 0, vec![0u8; 14])]);
        assert!(wifi_packets(&ethernet).unwrap().is_none());

        let wifi = dir.path().join("wifi.pcap");
        write_pcap(&wifi, Linktype::IEEE802_11_RADIOTAP, &[(1, 0, radiotap(-50, &beacon(AP, "x")))]);
        let packets = wifi_packets(&wifi).unwrap().unwrap();
        assert_eq!(packets.len(), 1);

        // an ethernet capture still produces an empty report
        let out = OutputDir::create(dir.path().join("out")).unwrap();
        run_wifi(WifiCommand::EvilTwin { pcap: ethernet }, &out).unwrap();
        assert!(out.path("evil_twin_results.csv").exists());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(log_level(0, 0), LevelFilter::Info);
        assert_eq!(log_level(1, 0), LevelFilter::Debug);
        assert_eq!(log_level(3, 0), LevelFilter::Trace);
        assert_eq!(log_level(0, 1), LevelFilter::Warn);
        assert_eq!(log_level(0, 3), LevelFilter::Off);
    }
}
