//! VPC Peering CLI
//!
//! Synthesizes the peering topology into a CloudFormation template and
//! helps the operator inspect it. Deployment itself is left to the
//! provider's own tooling.
//!
//! # Usage
//! ```bash
//! # Write the template
//! vpc-peering synth --out template.json
//! aws cloudformation deploy --template-file template.json --stack-name VpcPeeringStack \
//!     --capabilities CAPABILITY_IAM
//!
//! # Check the graph and print it
//! vpc-peering validate
//! vpc-peering describe
//!
//! # Command for fetching the private key once the stack is up
//! vpc-peering ssh-command --key-pair-id key-0123456789abcdef0 --region us-east-1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vpc_peering::topology::types::Attribute;
use vpc_peering::topology::{StaticResolver, SSH_KEY_COMMAND_OUTPUT};
use vpc_peering::{declare, synthesize, Topology, TopologyConfig};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "vpc-peering")]
#[command(about = "Three-VPC peering topology for CloudFormation", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON topology config (defaults reproduce the three-network layout)
    #[arg(long, global = true, env = "VPC_PEERING_CONFIG")]
    config: Option<PathBuf>,

    /// Deployment region to embed instead of resolving it at deploy time
    #[arg(long, global = true)]
    region: Option<String>,

    /// Stack name used in resource tags
    #[arg(long, global = true)]
    stack_name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the CloudFormation template
    Synth {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Declare the topology and run the structural checks
    Validate,

    /// Print networks, links, routes, rules and instances
    Describe,

    /// Print the command that retrieves the private key
    SshCommand {
        /// Key pair id reported by the provider (e.g. key-0123456789abcdef0)
        #[arg(long)]
        key_pair_id: String,
    },
}

// ============================================================
// Main Entry Point
// ============================================================

fn init_logging(verbose: bool, format: &LogFormat) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, &cli.log_format);

    let config = match &cli.config {
        Some(path) => TopologyConfig::load(path)?,
        None => TopologyConfig::default(),
    }
    .apply_env()
    .with_overrides(cli.region.clone(), cli.stack_name.clone());

    let topology = declare(&config).context("Failed to declare topology")?;

    match cli.command {
        Commands::Synth { out } => {
            let template = synthesize(&topology);
            match out {
                Some(path) => template.write_to(&path)?,
                None => println!("{}", template.to_json_pretty()?),
            }
        }

        Commands::Validate => {
            // declare() already ran the checks
            println!(
                "✅ {}: {} networks, {} peering links, {} routes, {} instances",
                topology.stack_name,
                topology.networks.len(),
                topology.peering_links.len(),
                topology.routes.len(),
                topology.instances.len()
            );
        }

        Commands::Describe => describe(&topology),

        Commands::SshCommand { key_pair_id } => {
            let output = topology
                .output(SSH_KEY_COMMAND_OUTPUT)
                .context("Topology has no key command output")?;

            let mut resolver = StaticResolver::new().with_attribute(
                &topology.keypair.id,
                Attribute::KeyPairId,
                key_pair_id,
            );
            if let Some(region) = config.operator_region() {
                resolver = resolver.with_region(region);
            }

            let command = output
                .value
                .render(&resolver)
                .context("Pass --region or set AWS_REGION to render the command")?;
            println!("{command}");
        }
    }

    info!("Done");
    Ok(())
}

fn describe(topology: &Topology) {
    println!("\n{:<8} {:<8} {:<16} {:<16}", "ID", "NAME", "BLOCK", "PUBLIC SUBNET");
    println!("{}", "-".repeat(52));
    for n in &topology.networks {
        println!(
            "{:<8} {:<8} {:<16} {:<16}",
            n.id,
            n.name,
            n.cidr.to_string(),
            n.subnet.cidr.to_string()
        );
    }

    println!("\n{:<28} {:<10} {:<10}", "PEERING LINK", "REQUESTER", "ACCEPTER");
    println!("{}", "-".repeat(50));
    for l in &topology.peering_links {
        println!("{:<28} {:<10} {:<10}", l.id.as_str(), l.requester.as_str(), l.accepter.as_str());
    }

    println!("\n{:<16} {:<16} {:<28}", "ROUTE", "DESTINATION", "VIA");
    println!("{}", "-".repeat(62));
    for r in &topology.routes {
        println!(
            "{:<16} {:<16} {:<28}",
            r.id.as_str(),
            r.destination.to_string(),
            r.peering_link.as_str()
        );
    }

    println!("\n{:<16} {:<20} {:<6} {:<12}", "RULE SET", "SOURCE", "PROTO", "PORTS");
    println!("{}", "-".repeat(56));
    for f in &topology.firewalls {
        for rule in &f.ingress {
            println!(
                "{:<16} {:<20} {:<6} {:<12}",
                f.id.as_str(),
                rule.source.to_string(),
                rule.protocol.to_string(),
                rule.ports.to_string()
            );
        }
    }

    println!("\n{:<14} {:<8} {:<16} {:<10}", "INSTANCE", "NETWORK", "RULE SET", "TYPE");
    println!("{}", "-".repeat(50));
    for i in &topology.instances {
        println!(
            "{:<14} {:<8} {:<16} {:<10}",
            i.id.as_str(),
            i.network.as_str(),
            i.firewall.as_str(),
            i.instance_type
        );
    }

    println!(
        "\nKeypair: {} ({}, removal policy: {})",
        topology.keypair.key_name,
        topology.keypair.id,
        topology.keypair.removal_policy
    );
}
