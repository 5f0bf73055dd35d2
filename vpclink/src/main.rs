//! Assemble the private-service topology and print its manifest

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;
use vpclink_core::{
    assemble, ConfigLoader, Plan, ProvisioningBackend, SimulatedBackend, AMI_ID_OUTPUT,
    API_ENDPOINT_OUTPUT,
};

#[derive(Parser, Debug)]
#[command(
    name = "vpclink",
    about = "Expose a private web service through an API gateway and a VPC link",
    version
)]
struct Args {
    /// Topology config file (TOML), overrides the user config
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the manifest to a file instead of stdout
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Resolve runtime attributes with the simulated backend
    #[arg(long)]
    simulate: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = if args.verbose {
        EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into())
    } else {
        EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::load_with_priority(args.config.clone())
        .context("Failed to load topology configuration")?;

    let mut assembly = assemble(&config).context("Failed to assemble topology")?;
    let plan = assembly
        .topology
        .finalize()
        .context("Failed to finalize topology")?;

    if args.simulate {
        SimulatedBackend::new()
            .provision(&plan)
            .context("Simulated provisioning failed")?;
    }

    let manifest = plan.render().context("Failed to render manifest")?;
    match &args.output {
        Some(path) => {
            fs::write(path, &manifest)
                .with_context(|| format!("Failed to write manifest to {:?}", path))?;
            tracing::info!("Wrote manifest to {:?}", path);
        }
        None => print!("{}", manifest),
    }

    report_outputs(&plan);
    Ok(())
}

fn report_outputs(plan: &Plan) {
    let outputs = plan.outputs();

    if let Some(ami_id) = outputs.ami_id {
        eprintln!("{} = {}", AMI_ID_OUTPUT, ami_id);
    }

    if let Some(endpoint) = outputs.api_endpoint {
        match endpoint.get() {
            Ok(url) => eprintln!("{} = {}", API_ENDPOINT_OUTPUT, url),
            Err(_) => eprintln!(
                "{} = <pending, known after provisioning>",
                API_ENDPOINT_OUTPUT
            ),
        }
    }
}
