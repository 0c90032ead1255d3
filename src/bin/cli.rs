//! bucketkv CLI Client
//!
//! Command-line interface for interacting with a bucketkv server.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use bucketkv::backend::{Item, StoreOperation};
use bucketkv::engine::BucketListing;
use bucketkv::protocol::{read_response, write_command, Command, Response, Status};
use clap::{Parser, Subcommand};

/// bucketkv CLI
#[derive(Parser, Debug)]
#[command(name = "bucketkv-cli")]
#[command(about = "CLI for the bucketkv server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    server: String,

    /// Authenticate as this identity before running the command
    #[arg(short, long)]
    user: Option<String>,

    /// Config for a bucket auto-created on authentication
    #[arg(short, long, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Increment a counter
    Incr {
        key: String,
        #[arg(default_value = "1")]
        delta: u64,
    },

    /// Decrement a counter
    Decr {
        key: String,
        #[arg(default_value = "1")]
        delta: u64,
    },

    /// Drop every item in the bound bucket
    Flush,

    /// Print stats (`bucket` lists bucket states)
    Stats {
        #[arg(default_value = "")]
        group: String,
    },

    /// Ping the server
    Ping,

    /// Create a bucket (admin)
    Create {
        name: String,
        #[arg(short, long, default_value = "memory")]
        engine: String,
        #[arg(long, default_value = "")]
        bucket_config: String,
    },

    /// Delete a bucket and wait for it to go away (admin)
    Drop {
        name: String,
        #[arg(short, long)]
        force: bool,
    },

    /// List buckets (admin)
    List,
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    fn connect(addr: &str) -> bucketkv::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    fn call(&mut self, command: &Command) -> bucketkv::Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }
}

fn to_command(command: Commands) -> Command {
    match command {
        Commands::Get { key } => Command::Get { key: key.into_bytes() },
        Commands::Set { key, value } => Command::Store {
            operation: StoreOperation::Set,
            key: key.into_bytes(),
            value: value.into_bytes(),
            flags: 0,
            exptime: 0,
            cas: 0,
        },
        Commands::Del { key } => Command::Delete {
            key: key.into_bytes(),
            cas: 0,
        },
        Commands::Incr { key, delta } => arithmetic(key, true, delta),
        Commands::Decr { key, delta } => arithmetic(key, false, delta),
        Commands::Flush => Command::Flush { when: 0 },
        Commands::Stats { group } => Command::Stats { key: group },
        Commands::Ping => Command::Ping,
        Commands::Create {
            name,
            engine,
            bucket_config,
        } => Command::CreateBucket {
            name,
            path: engine,
            config: bucket_config,
        },
        Commands::Drop { name, force } => Command::DeleteBucket {
            name,
            config: format!("force={}", force),
        },
        Commands::List => Command::ListBuckets,
    }
}

fn arithmetic(key: String, increment: bool, delta: u64) -> Command {
    Command::Arithmetic {
        key: key.into_bytes(),
        increment,
        create: true,
        delta,
        initial: 0,
        exptime: 0,
    }
}

fn print_response(command: &Command, response: &Response) -> bucketkv::Result<()> {
    if response.status != Status::Ok {
        println!("({:?}) {}", response.status, response.message());
        return Ok(());
    }

    let payload = response.payload.as_deref().unwrap_or(&[]);
    match command {
        Command::Get { .. } => {
            let item: Item = bincode::deserialize(payload)?;
            println!("{}", String::from_utf8_lossy(&item.value));
        }
        Command::Arithmetic { .. } if payload.len() >= 8 => {
            let mut value = [0u8; 8];
            value.copy_from_slice(&payload[..8]);
            println!("{}", u64::from_be_bytes(value));
        }
        Command::Stats { .. } => {
            let stats: Vec<(String, String)> = bincode::deserialize(payload)?;
            for (key, value) in stats {
                println!("{} {}", key, value);
            }
        }
        Command::ListBuckets => {
            let listing: Vec<BucketListing> = bincode::deserialize(payload)?;
            for row in listing {
                println!("{} ({})", row.name, row.state);
            }
        }
        Command::Ping => println!("{}", response.message()),
        _ => println!("OK"),
    }
    Ok(())
}

fn run(args: Args) -> bucketkv::Result<()> {
    let mut client = Client::connect(&args.server)?;

    if let Some(user) = args.user {
        let auth = Command::Auth {
            username: user,
            config: args.config,
        };
        let response = client.call(&auth)?;
        if response.status != Status::Ok {
            println!("auth failed: ({:?}) {}", response.status, response.message());
            return Ok(());
        }
    }

    let command = to_command(args.command);
    let response = client.call(&command)?;
    print_response(&command, &response)
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
