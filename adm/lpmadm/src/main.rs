use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lpm::{isa_level, Prefix, Table, INVALID_NEXT_HOP};
use serde::{Deserialize, Serialize};
use slog::{info, o, Drain, Logger};

#[derive(Parser)]
#[command(version, about = "administer an in-process lpm routing table")]
struct Cli {
    /// Route file (JSON) loaded before the command runs and written back
    /// after mutations.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Which table core to build.
    #[arg(long, value_enum, default_value = "v4-dir24")]
    table: Kind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    V4Dir24,
    V4Stride8,
    V6Wide16,
    V6Stride8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Add a route to the routing table.
    AddRoute {
        /// Destination address for the route.
        destination: IpAddr,

        /// Subnet mask for the destination.
        mask: u8,

        /// Next-hop identifier for the route.
        next_hop: u32,
    },

    /// Remove a route from the routing table.
    RemoveRoute {
        /// Destination address for the route.
        destination: IpAddr,

        /// Subnet mask for the destination.
        mask: u8,
    },

    /// Look up one address.
    Lookup {
        /// Address to resolve.
        address: IpAddr,
    },

    /// Resolve every address in a file, one per line, through the batch
    /// path.
    Batch {
        /// File of addresses.
        addresses: PathBuf,
    },

    /// Print table statistics as JSON.
    Stats,
}

#[derive(Debug, Serialize, Deserialize)]
struct Route {
    prefix: Prefix,
    next_hop: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = init_logger();

    let mut routes = match &cli.file {
        Some(f) if f.exists() => load_routes(f)?,
        _ => Vec::new(),
    };

    let mut table = build_table(cli.table).logged(log.clone());
    info!(log, "table created";
        "kind" => ?cli.table, "batch_isa" => %isa_level());
    for r in &routes {
        table
            .insert(r.prefix, r.next_hop)
            .with_context(|| format!("install {}", r.prefix))?;
    }
    info!(log, "routes loaded"; "count" => table.prefix_count());

    match cli.command {
        Commands::AddRoute {
            destination,
            mask,
            next_hop,
        } => {
            let prefix = Prefix::new(destination, mask)?;
            table.insert(prefix, next_hop)?;
            info!(log, "route added"; "prefix" => %prefix);
            routes.retain(|r| r.prefix != prefix);
            routes.push(Route { prefix, next_hop });
            if let Some(f) = &cli.file {
                store_routes(f, &routes)?;
            }
        }
        Commands::RemoveRoute { destination, mask } => {
            let prefix = Prefix::new(destination, mask)?;
            table.remove(prefix)?;
            info!(log, "route removed"; "prefix" => %prefix);
            routes.retain(|r| r.prefix != prefix);
            if let Some(f) = &cli.file {
                store_routes(f, &routes)?;
            }
        }
        Commands::Lookup { address } => {
            print_result(address, table.lookup(address));
        }
        Commands::Batch { addresses } => {
            let text = fs::read_to_string(&addresses)
                .with_context(|| format!("read {}", addresses.display()))?;
            let addrs: Vec<IpAddr> = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| {
                    l.trim()
                        .parse()
                        .map_err(|_| anyhow!("bad address: {}", l))
                })
                .collect::<Result<_>>()?;
            for (addr, nh) in batch_lookup(&table, &addrs)? {
                print_result(addr, nh);
            }
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&table.stats())?);
        }
    }

    Ok(())
}

fn build_table(kind: Kind) -> Table {
    match kind {
        Kind::V4Dir24 => Table::ipv4_dir24(),
        Kind::V4Stride8 => Table::ipv4_stride8(),
        Kind::V6Wide16 => Table::ipv6_wide16(),
        Kind::V6Stride8 => Table::ipv6_stride8(),
    }
}

fn batch_lookup(
    table: &Table,
    addrs: &[IpAddr],
) -> Result<Vec<(IpAddr, u32)>> {
    let v4: Vec<u32> = addrs
        .iter()
        .filter_map(|a| match a {
            IpAddr::V4(a) => Some(u32::from(*a)),
            IpAddr::V6(_) => None,
        })
        .collect();
    let v6: Vec<[u8; 16]> = addrs
        .iter()
        .filter_map(|a| match a {
            IpAddr::V4(_) => None,
            IpAddr::V6(a) => Some(a.octets()),
        })
        .collect();

    let mut out4 = vec![0u32; v4.len()];
    table.lookup_batch_ipv4(&v4, &mut out4)?;
    let mut out6 = vec![0u32; v6.len()];
    table.lookup_batch_ipv6(&v6, &mut out6)?;

    let mut it4 = v4
        .iter()
        .zip(out4)
        .map(|(a, o)| (IpAddr::from(std::net::Ipv4Addr::from(*a)), o));
    let mut it6 = v6
        .iter()
        .zip(out6)
        .map(|(a, o)| (IpAddr::from(std::net::Ipv6Addr::from(*a)), o));
    let mut result = Vec::with_capacity(addrs.len());
    for a in addrs {
        let pair = match a {
            IpAddr::V4(_) => it4.next(),
            IpAddr::V6(_) => it6.next(),
        };
        result.push(pair.expect("one output per input"));
    }
    Ok(result)
}

fn print_result(addr: IpAddr, nh: u32) {
    if nh == INVALID_NEXT_HOP {
        println!("{} no route", addr);
    } else {
        println!("{} -> {}", addr, nh);
    }
}

fn load_routes(path: &Path) -> Result<Vec<Route>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parse {}", path.display()))
}

fn store_routes(path: &Path, routes: &[Route]) -> Result<()> {
    let text = serde_json::to_string_pretty(routes)?;
    fs::write(path, text)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn init_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}
