mod rackspace;
mod state_file;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Error};
use clap::{Parser, Subcommand, ValueEnum};
use cloud_ensure::{accessor, Coordinator};
use futures::{Stream, TryStreamExt};
use rackspace::Rackspace;
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "cloud-ensure-rackspace",
    version,
    about = "Converge Rackspace resources to a desired state"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure every resource of a YAML state file
    Apply {
        file: PathBuf,
        /// Report what would change without changing it
        #[arg(long)]
        test: bool,
    },
    /// Print every resource of a kind as JSON
    List {
        kind: Kind,
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        instance: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Zones,
    Records,
    Flavors,
    Instances,
    Databases,
    Users,
    Containers,
    LoadBalancers,
    Images,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    tracing::debug!("Starting..");

    match cli.command {
        Command::Apply { file, test } => {
            let entries = state_file::load(&file)?;
            let provider = Arc::new(Rackspace::connect(de_env::from_env()?).await?);
            apply(Coordinator::new(provider, test), entries).await?;
        }
        Command::List {
            kind,
            zone,
            instance,
        } => {
            let provider = Rackspace::connect(de_env::from_env()?).await?;
            list(&provider, kind, zone.as_deref(), instance.as_deref()).await?;
        }
    }

    tracing::debug!("Terminating..");

    Ok(())
}

async fn apply(
    coordinator: Coordinator<Rackspace>,
    entries: Vec<state_file::Entry>,
) -> Result<(), Error> {
    let mut reports = Vec::with_capacity(entries.len());
    let mut rejected = 0;

    for entry in &entries {
        match entry.apply(&coordinator).await {
            Ok(report) => reports.push(report),
            Err(err) => {
                tracing::error!("Rejected {} entry: {}", entry.kind(), err);
                rejected += 1;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);

    let failed = reports.iter().filter(|report| report.is_failure()).count();
    if failed + rejected > 0 {
        bail!("{failed} resources failed and {rejected} entries were rejected");
    }
    Ok(())
}

async fn list(
    provider: &Rackspace,
    kind: Kind,
    zone: Option<&str>,
    instance: Option<&str>,
) -> Result<(), Error> {
    match kind {
        Kind::Zones => print_all(accessor::zones(provider)).await,
        Kind::Records => {
            let Some(zone) = zone else {
                bail!("--zone is required to list records");
            };
            print_all(accessor::records(provider, zone)).await
        }
        Kind::Flavors => {
            let flavors = accessor::InstanceAccessor::list_flavors(provider).await?;
            print_json(&flavors)
        }
        Kind::Instances => print_all(accessor::instances(provider)).await,
        Kind::Databases => {
            let Some(instance) = instance else {
                bail!("--instance is required to list databases");
            };
            print_all(accessor::databases(provider, instance)).await
        }
        Kind::Users => {
            let Some(instance) = instance else {
                bail!("--instance is required to list users");
            };
            print_all(accessor::users(provider, instance)).await
        }
        Kind::Containers => print_all(accessor::containers(provider)).await,
        Kind::LoadBalancers => print_all(accessor::load_balancers(provider)).await,
        Kind::Images => print_all(accessor::images(provider)).await,
    }
}

async fn print_all<T, S>(items: S) -> Result<(), Error>
where
    T: Serialize,
    S: Stream<Item = Result<T, cloud_ensure::ProviderError>>,
{
    let items: Vec<T> = items.try_collect().await?;
    print_json(&items)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
