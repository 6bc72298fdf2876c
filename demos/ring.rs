use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use taskfarm::message::tcp::Endpoint;
use taskfarm::{Builtin, Group, Op};

#[derive(Debug, Parser)]
#[clap(version = "1.0", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    #[clap(short = 'n', long, default_value = "8")]
    ranks: usize,

    #[clap(short = 'p', long, default_value = "8000")]
    port: u16,

    #[clap(short = 'l', long, default_value = "warn")]
    log_level: LevelFilter,
}

fn peer(port: u16, rank: usize) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port + rank as u16)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    SimpleLogger::new().with_level(opts.log_level).init()?;

    let peers: Vec<_> = (0..opts.ranks).map(|rank| peer(opts.port, rank)).collect();
    let endpoints = peers
        .iter()
        .map(|&addr| Endpoint::bind(addr))
        .collect::<Result<Vec<_>, _>>()?;

    let procs: Vec<_> = endpoints
        .into_iter()
        .enumerate()
        .map(|(rank, endpoint)| {
            let peers = peers.clone();
            thread::spawn(move || -> taskfarm::Result<()> {
                let comm = endpoint.connect(rank, peers)?;
                let group = Group::new(&comm);
                let dest = (group.rank() + 1) % group.size();
                let source = (group.rank() + group.size() - 1) % group.size();

                let mut incoming = group.source(source).irecv::<String>()?;
                group.dest(dest).send(&format!("hello from {}", group.rank()))?;
                println!("{} received '{}'", group.rank(), incoming.get()?);

                let total = group.all_reduce(&group.rank(), Op::builtin(Builtin::Sum))?;
                if group.rank() == 0 {
                    println!("sum of ranks is {}", total);
                }
                group.barrier()
            })
        })
        .collect();

    for process in procs {
        process.join().map_err(|_| "rank panicked")??
    }
    Ok(())
}
