use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::thread;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cip_transport::ExplicitMessaging;
use drive_registry as drv;
use drive_registry::{AcquisitionReport, DeviceRegistry, MatchRule, MetricsHub};

mod config;
mod sim;

use config::{DeviceConfig, FaultConfig, RunConfig};

#[derive(Parser, Debug)]
#[command(
    name = "drivebak",
    version,
    about = "Drive parameter backup over CIP explicit messaging",
    disable_help_subcommand = true
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered models and their match rules
    Models {
        /// Extra catalogs directory registered after the built-in models
        #[arg(long)]
        dir: Option<String>,
    },
    /// Validate a catalog file or a directory of catalogs
    CatalogValidate {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        dir: Option<String>,
        /// Print the parsed parameter list as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the identity of a simulated drive and the model it resolves to
    Identify {
        #[arg(long, default_value = "powerflex-525")]
        mock_model: String,
        /// Minor revision the drive reports instead of the catalog's
        #[arg(long)]
        minor: Option<u8>,
    },
    /// Acquire parameters from one or more simulated drives
    Acquire {
        /// YAML run configuration listing the devices
        #[arg(long, conflicts_with = "mock_model")]
        config: Option<String>,
        /// Acquire a single simulated drive of this model
        #[arg(long)]
        mock_model: Option<String>,
        /// Also read parameters not flagged for acquisition
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
        /// Make every scattered read fail on the simulated drives
        #[arg(long, action = ArgAction::SetTrue)]
        fail_scattered: bool,
        /// Print Prometheus metrics after the run
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Decode a raw parameter value
    Decode {
        /// Data type name, e.g. INT, UDINT, REAL, WORD
        #[arg(long = "type")]
        r#type: String,
        /// Bytes in hex (e.g., 0x2C 01)
        #[arg(num_args = 1.., value_delimiter = ' ')]
        data: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match cli.command {
        Commands::Models { dir } => models(dir.as_deref()),
        Commands::CatalogValidate { file, dir, json } => {
            catalog_validate(file.as_deref(), dir.as_deref(), json)
        }
        Commands::Identify { mock_model, minor } => identify(&mock_model, minor),
        Commands::Acquire {
            config,
            mock_model,
            all,
            fail_scattered,
            metrics,
        } => acquire(
            config.as_deref(),
            mock_model.as_deref(),
            all,
            cli.verbose,
            fail_scattered,
            metrics,
        ),
        Commands::Decode { r#type, data } => decode_value(&r#type, &data),
    }
}

fn setup_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_registry(dir: Option<&str>) -> Result<DeviceRegistry> {
    let mut reg = DeviceRegistry::builtin()?;
    if let Some(d) = dir {
        let extra = drv::load_catalogs_dir(d)?;
        for m in extra.models() {
            reg.register(m.clone());
        }
    }
    Ok(reg)
}

fn describe_rule(rule: &MatchRule) -> String {
    match *rule {
        MatchRule::Exact {
            vendor_id,
            product_code,
            major_revision,
            minor_revision,
        } => format!("vendor={vendor_id} product={product_code} rev={major_revision}.{minor_revision}"),
        MatchRule::Compatible {
            vendor_id,
            product_code,
            major_revision,
            min_minor,
        } => format!("vendor={vendor_id} product={product_code} rev={major_revision}.{min_minor}+"),
    }
}

fn models(dir: Option<&str>) -> Result<()> {
    let reg = build_registry(dir)?;
    for m in reg.models() {
        println!(
            "{}\t{}\tparams={}\tbatch={}",
            m.name,
            describe_rule(&m.rule),
            m.catalog.len(),
            m.strategy.batch_limit()
        );
    }
    Ok(())
}

fn catalog_validate(file: Option<&str>, dir: Option<&str>, json: bool) -> Result<()> {
    let models = match (file, dir) {
        (Some(f), None) => vec![drv::load_catalog_file(f)?],
        (None, Some(d)) => drv::load_catalogs_dir(d)?.models().to_vec(),
        _ => {
            return Err(anyhow::anyhow!("provide --file <path> or --dir <dir>"));
        }
    };
    for m in &models {
        println!(
            "ok: {} ({}, {} parameters)",
            m.name,
            describe_rule(&m.rule),
            m.catalog.len()
        );
        if json {
            let params: Vec<&drv::ParameterDefinition> = m.catalog.iter().collect();
            let doc = serde_json::json!({
                "model": m.name,
                "strategy": m.strategy,
                "parameters": params,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

fn identify(mock_model: &str, minor: Option<u8>) -> Result<()> {
    let reg = DeviceRegistry::builtin()?;
    let model = reg
        .get(mock_model)
        .ok_or_else(|| anyhow::anyhow!("unknown model: {mock_model}"))?;
    let mut bus = sim::simulated_drive(model, minor, &FaultConfig::default());
    let id = bus.identity()?;
    println!("{}", serde_json::to_string_pretty(&id)?);
    let resolved = reg.resolve(&id)?;
    let mut drive = resolved.open(bus, drv::AcquireOptions::default());
    println!("model: {}", resolved.name);
    match drive.read_max_parameter_number() {
        Ok(max) => println!("max parameter: {max}"),
        Err(e) => println!("max parameter: unavailable ({e})"),
    }
    if let Some(first) = resolved.catalog.iter().next() {
        let name = drive.read_parameter_name(first.number)?;
        println!("parameter {}: {}", first.number, name);
    }
    Ok(())
}

fn acquire(
    config: Option<&str>,
    mock_model: Option<&str>,
    all: bool,
    verbose: bool,
    fail_scattered: bool,
    metrics: bool,
) -> Result<()> {
    let mut run = match (config, mock_model) {
        (Some(path), None) => config::load_run_config(path)?,
        (None, Some(model)) => RunConfig {
            devices: vec![DeviceConfig {
                name: model.to_string(),
                model: model.to_string(),
                minor_revision: None,
                faults: FaultConfig::default(),
            }],
            ..Default::default()
        },
        _ => {
            return Err(anyhow::anyhow!("provide --config <yaml> or --mock-model <name>"));
        }
    };
    run.options.acquire_all_records |= all;
    run.options.verbose |= verbose;
    if fail_scattered {
        for d in &mut run.devices {
            d.faults.fail_scattered = true;
        }
    }

    let reg = build_registry(run.catalog_dir.as_deref())?;
    let hub = MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    hub.acq.models_loaded.set(reg.len() as i64);

    let outcomes: Vec<(String, Result<AcquisitionReport>)> = thread::scope(|s| {
        let handles: Vec<_> = run
            .devices
            .iter()
            .map(|dev| {
                let reg = &reg;
                let hub = &hub;
                let options = run.options;
                let h = s.spawn(move || acquire_device(reg, hub, dev, options));
                (dev.name.clone(), h)
            })
            .collect();
        handles
            .into_iter()
            .map(|(name, h)| {
                let res = h
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("acquisition thread panicked")));
                (name, res)
            })
            .collect()
    });

    let mut failed = 0usize;
    for (name, res) in outcomes {
        match res {
            Ok(report) => {
                println!("# {name}");
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(e) => {
                failed += 1;
                error!(device = %name, error = %format!("{e:#}"), "acquisition failed");
            }
        }
    }
    if metrics {
        print!("{}", hub.encode_text());
    }
    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{failed} of {} device(s) failed",
            run.devices.len()
        ));
    }
    Ok(())
}

fn acquire_device(
    reg: &DeviceRegistry,
    hub: &MetricsHub,
    dev: &DeviceConfig,
    options: drv::AcquireOptions,
) -> Result<AcquisitionReport> {
    let model = reg
        .get(&dev.model)
        .ok_or_else(|| anyhow::anyhow!("unknown model: {}", dev.model))?;
    let mut bus = sim::simulated_drive(model, dev.minor_revision, &dev.faults);
    let id = bus.identity()?;
    let resolved = reg.resolve(&id)?;
    let mut drive = resolved
        .open(bus, options)
        .with_metrics(hub.acq.clone());
    let report = drive.acquire_with(|p| {
        if options.verbose {
            info!(
                device = %dev.name,
                batch = p.batch,
                of = p.batches,
                acquired = p.acquired,
                fell_back = p.fell_back,
                "batch done"
            );
        }
        std::ops::ControlFlow::Continue(())
    });
    info!(
        device = %dev.name,
        model = %report.model,
        acquired = report.results.len(),
        missing = report.missing.len(),
        "acquisition finished"
    );
    Ok(report)
}

fn decode_value(type_name: &str, data_hex: &[String]) -> Result<()> {
    let dtype: drv::DataType = type_name.parse()?;
    let bytes = parse_hex_bytes(data_hex)?;
    let value = drv::decode(&bytes, dtype)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn parse_hex_bytes(items: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len());
    for s in items {
        let t = s.trim();
        let no_prefix = t.strip_prefix("0x").unwrap_or(t);
        let b = u8::from_str_radix(no_prefix, 16)
            .map_err(|e| anyhow::anyhow!("invalid hex byte '{t}': {e}"))?;
        out.push(b);
    }
    Ok(out)
}
