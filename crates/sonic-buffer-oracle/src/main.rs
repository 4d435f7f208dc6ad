//! Buffer oracle command line
//!
//! Offline queries against the device model: derive a lossless profile,
//! predict a pool size, dump the headroom lookup table.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sonic_buffer_oracle::pool::expected_pool_size;
use sonic_buffer_oracle::{
    derive, CableLength, DerivationInput, DeviceModelConfig, ParamExpectation, VendorClass,
    DEFAULT_DYNAMIC_TH, DEFAULT_MTU,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reference model of SONiC dynamic lossless buffer allocation
#[derive(Parser, Debug)]
#[command(name = "buffer-oracle")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Headroom lookup table (pg_profile_lookup.ini)
    #[arg(long, global = true, default_value = "/usr/share/sonic/hwsku/pg_profile_lookup.ini")]
    lookup_file: PathBuf,

    /// Vendor parameter file (JSON, keyed by asic type)
    #[arg(long, global = true)]
    param_file: Option<PathBuf>,

    /// ASIC type of the device (mellanox, broadcom, barefoot, ...)
    #[arg(long, global = true, default_value = "mellanox")]
    asic_type: String,

    /// Number of ingress pools sharing the headroom budget
    #[arg(long, global = true, default_value = "1")]
    pool_count: u32,

    /// Default port MTU
    #[arg(long, global = true, default_value_t = DEFAULT_MTU)]
    default_mtu: u32,

    /// Default dynamic threshold of generated profiles
    #[arg(long, global = true, default_value_t = DEFAULT_DYNAMIC_TH, allow_hyphen_values = true)]
    default_dynamic_th: i32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the lossless profile of a port configuration
    Derive {
        #[arg(long)]
        speed: u32,
        /// Cable length, e.g. 40m
        #[arg(long)]
        cable: CableLength,
        #[arg(long)]
        mtu: Option<u32>,
        #[arg(long, allow_hyphen_values = true)]
        dynamic_th: Option<i32>,
    },
    /// Predict the lossless pool size after a headroom change
    PoolSize {
        /// Pool size observed now
        #[arg(long)]
        current: u64,
        /// Headroom per PG now
        #[arg(long)]
        old_headroom: u64,
        /// Lossless PGs now
        #[arg(long, default_value = "2")]
        old_pg_count: u32,
        /// Headroom per PG after the change, defaults to --old-headroom
        #[arg(long)]
        new_headroom: Option<u64>,
        /// Lossless PGs after the change, defaults to --old-pg-count
        #[arg(long)]
        new_pg_count: Option<u32>,
    },
    /// Print the lookup table entries of a speed
    Lookup {
        #[arg(long)]
        speed: u32,
    },
}

fn load_config(args: &Args) -> Result<DeviceModelConfig> {
    let vendor = VendorClass::from_asic_type(&args.asic_type);
    let mut builder = DeviceModelConfig::builder(vendor)
        .pool_count(args.pool_count)
        .default_mtu(args.default_mtu)
        .default_dynamic_th(args.default_dynamic_th)
        .lookup_file(&args.lookup_file)
        .with_context(|| format!("loading {}", args.lookup_file.display()))?;
    if let Some(path) = &args.param_file {
        builder = builder
            .param_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    Ok(builder.build()?)
}

fn expectation_json(expectation: &ParamExpectation) -> serde_json::Value {
    match expectation {
        ParamExpectation::Exact(headroom) => json!({
            "kind": "exact",
            "size": headroom.size,
            "xon": headroom.xon,
            "xoff": headroom.xoff,
        }),
        ParamExpectation::Monotonic { speed, cable_length } => json!({
            "kind": "monotonic",
            "speed": speed,
            "cable_length": cable_length.to_string(),
        }),
        ParamExpectation::Static(params) => json!({
            "kind": "static",
            "size": params.size,
            "xon": params.xon,
            "xoff": params.xoff,
            "dynamic_th": params.dynamic_th,
        }),
        ParamExpectation::Unknown => json!({ "kind": "unknown" }),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    info!(vendor = config.vendor().asic_type(), "Device model loaded");

    let output = match &args.command {
        Command::Derive {
            speed,
            cable,
            mtu,
            dynamic_th,
        } => {
            let mut input = DerivationInput::new(*speed, *cable, mtu.unwrap_or(config.default_mtu()));
            if let Some(th) = dynamic_th {
                input = input.with_dynamic_th(*th);
            }
            let profile = derive(&config, &input);
            json!({
                "profile": profile.identity.as_str(),
                "expectation": expectation_json(&profile.expectation),
                "threshold": profile.threshold.value(),
                "shareable": profile.shareable,
            })
        }
        Command::PoolSize {
            current,
            old_headroom,
            old_pg_count,
            new_headroom,
            new_pg_count,
        } => {
            let size = expected_pool_size(
                config.vendor(),
                *current,
                config.pool_count(),
                *old_headroom,
                *old_pg_count,
                *new_headroom,
                *new_pg_count,
            )?;
            json!({
                "accounting": config.accounting().name(),
                "size": size,
            })
        }
        Command::Lookup { speed } => {
            let Some(entries) = config.lookup().for_speed(*speed) else {
                bail!("speed {} is not in {}", speed, args.lookup_file.display());
            };
            let entries: Vec<_> = entries
                .iter()
                .map(|(cable, entry)| {
                    json!({
                        "cable_length": cable.to_string(),
                        "size": entry.headroom.size,
                        "xon": entry.headroom.xon,
                        "xoff": entry.headroom.xoff,
                        "threshold": entry.threshold,
                    })
                })
                .collect();
            json!({ "speed": speed, "entries": entries })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_defaults() {
        let args = Args::try_parse_from([
            "buffer-oracle",
            "pool-size",
            "--current",
            "1000000",
            "--old-headroom",
            "19456",
            "--new-headroom",
            "22528",
        ])
        .unwrap();

        match args.command {
            Command::PoolSize {
                current,
                old_headroom,
                old_pg_count,
                new_headroom,
                new_pg_count,
            } => {
                assert_eq!(old_pg_count, 2);
                assert_eq!(new_pg_count, None);
                // (1000000 * 2 + 19456 * 2 - 22528 * 2) / 2
                let size = expected_pool_size(
                    &VendorClass::Mellanox,
                    current,
                    2,
                    old_headroom,
                    old_pg_count,
                    new_headroom,
                    new_pg_count,
                )
                .unwrap();
                assert_eq!(size, 1_000_000 + 19456 - 22528);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
