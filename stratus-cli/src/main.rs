use clap::{Parser, Subcommand};

mod client;
mod commands;

use commands::{bucket, host, network, share, ssh, tenant, volume};

// Exit codes of the CLI
const EXIT_OK: i32 = 0;
const EXIT_GENERIC: i32 = 1;
const EXIT_INVALID_ARGUMENT: i32 = 2;
#[allow(dead_code)]
const EXIT_INVALID_OPTION: i32 = 3;
const EXIT_RPC: i32 = 4;
const EXIT_NOT_FOUND: i32 = 5;
const EXIT_DUPLICATE: i32 = 6;
const EXIT_REMOTE_SCRIPT: i32 = 7;
const EXIT_TIMEOUT: i32 = 8;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "STRATUS multi-cloud infrastructure CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tenants
    #[command(subcommand)]
    Tenant(tenant::TenantCommands),

    /// Manage networks
    #[command(subcommand)]
    Network(network::NetworkCommands),

    /// Manage hosts
    #[command(subcommand)]
    Host(host::HostCommands),

    /// Manage volumes
    #[command(subcommand)]
    Volume(volume::VolumeCommands),

    /// Manage NFS shares
    #[command(subcommand)]
    Share(share::ShareCommands),

    /// Manage object-storage buckets
    #[command(subcommand)]
    Bucket(bucket::BucketCommands),

    /// Open an SSH session or run a command on a host
    Ssh(ssh::SshArgs),
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(status) = err.downcast_ref::<tonic::Status>() {
        return match status.code() {
            tonic::Code::InvalidArgument => EXIT_INVALID_ARGUMENT,
            tonic::Code::NotFound => EXIT_NOT_FOUND,
            tonic::Code::AlreadyExists => EXIT_DUPLICATE,
            tonic::Code::DeadlineExceeded => EXIT_TIMEOUT,
            tonic::Code::Unavailable => EXIT_RPC,
            tonic::Code::Internal if status.message().contains("remote command") => {
                EXIT_REMOTE_SCRIPT
            }
            _ => EXIT_GENERIC,
        };
    }
    if err.downcast_ref::<tonic::transport::Error>().is_some()
        || err.to_string().contains("is the daemon running")
    {
        return EXIT_RPC;
    }
    EXIT_GENERIC
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Tenant(command) => tenant::run(command).await,
        Commands::Network(command) => network::run(command).await,
        Commands::Host(command) => host::run(command).await,
        Commands::Volume(command) => volume::run(command).await,
        Commands::Share(command) => share::run(command).await,
        Commands::Bucket(command) => bucket::run(command).await,
        Commands::Ssh(args) => ssh::run(args).await,
    };

    match result {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(err) => {
            eprintln!("stratus: {err:#}");
            std::process::exit(exit_code(&err));
        }
    }
}
