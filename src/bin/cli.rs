//! zparcel CLI
//!
//! Command-line interface for inspecting and editing parcel files.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use zparcel::{ObjectType, Parcel, ParcelConfig, ParcelError, Result, Value, Zuid};

/// zparcel CLI
#[derive(Parser, Debug)]
#[command(name = "zparcel")]
#[command(about = "Inspect and edit zparcel object store files")]
#[command(version)]
struct Args {
    /// Log allocation and tree decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Maximum tree depth
    #[arg(long, global = true, default_value = "128")]
    max_depth: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty parcel (destroys existing content)
    Create {
        file: PathBuf,

        /// Never grow the file; fail with NoFree when the freelist is exhausted
        #[arg(long)]
        no_extend: bool,
    },

    /// Print the header
    Info { file: PathBuf },

    /// List all objects in id order
    List { file: PathBuf },

    /// Store a new object
    Put {
        file: PathBuf,

        /// Object id (32 hex digits, dashes optional)
        id: Zuid,

        /// null, bool, uint, sint, float, zuid, string, blob (hex), list
        /// (comma-separated ids) or file (path on disk)
        kind: String,

        /// Value; omitted for null
        value: Option<String>,
    },

    /// Print an object
    Get { file: PathBuf, id: Zuid },

    /// Remove an object
    Rm { file: PathBuf, id: Zuid },

    /// Print the root id, or set it when `id` is given
    Root { file: PathBuf, id: Option<Zuid> },

    /// Check the tree and freelist for damage and overlapping ranges
    Verify { file: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "info,zparcel=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = ParcelConfig::builder().max_depth(args.max_depth).build();

    match run(args.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {} ({})", e, e.code());
            ExitCode::from(e.code() as u8)
        }
    }
}

fn run(command: Commands, config: ParcelConfig) -> Result<()> {
    match command {
        Commands::Create { file, no_extend } => {
            let config = ParcelConfig {
                tail_extend: !no_extend,
                ..config
            };
            let mut parcel = Parcel::create_path(&file, config)?;
            parcel.close()?;
            println!("created {}", file.display());
        }

        Commands::Info { file } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            let header = parcel.header().clone();
            println!("version     {}", header.version);
            println!("tail extend {}", header.tail_extend());
            println!("treehead    {}", header.treehead);
            println!("freehead    {}", header.freehead);
            println!("freetail    {}", header.freetail);
            println!("tailptr     {}", header.tailptr);
            println!("root        {}", header.root);
            parcel.close()?;
        }

        Commands::List { file } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            for entry in parcel.list_objects()? {
                println!(
                    "{}  {:<7} {:>10}  depth {:<3} @{}{}",
                    entry.id,
                    entry.obj_type,
                    entry.size,
                    entry.depth,
                    entry.offset,
                    if entry.out_of_line { "" } else { " (inline)" }
                );
            }
            parcel.close()?;
        }

        Commands::Put {
            file,
            id,
            kind,
            value,
        } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            put(&mut parcel, id, &kind, value.as_deref())?;
            parcel.close()?;
        }

        Commands::Get { file, id } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            let value = parcel.fetch(id)?;
            match value {
                Value::File(f) => {
                    let name = parcel.fetch_string(f.name_id)?;
                    let size = parcel.fetch_blob_reader(f.data_id)?.len();
                    println!("file {:?} ({} bytes, data {})", name, size, f.data_id);
                }
                other => println!("{}", render(&other)),
            }
            parcel.close()?;
        }

        Commands::Rm { file, id } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            parcel.remove_object(id)?;
            parcel.close()?;
        }

        Commands::Root { file, id } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            match id {
                Some(id) => parcel.set_root(id)?,
                None => println!("{}", parcel.root()?),
            }
            parcel.close()?;
        }

        Commands::Verify { file } => {
            let mut parcel = Parcel::open_path(&file, config)?;
            let report = parcel.verify()?;
            println!("objects      {}", report.objects);
            println!("live bytes   {}", report.live_bytes);
            println!("free ranges  {}", report.free_ranges);
            println!("free bytes   {}", report.free_bytes);
            println!("tailptr      {}", report.tailptr);
            parcel.close()?;
        }
    }
    Ok(())
}

/// Parse `value` as `kind` and store it
fn put(parcel: &mut Parcel<File>, id: Zuid, kind: &str, value: Option<&str>) -> Result<()> {
    let obj_type = ObjectType::from_name(kind)
        .ok_or_else(|| ParcelError::Encoding(format!("unknown kind {:?}", kind)))?;
    if obj_type == ObjectType::Null {
        return parcel.store_null(id);
    }

    let raw = value.ok_or_else(|| invalid(kind, "<missing>"))?;
    match obj_type {
        ObjectType::Bool => parcel.store_bool(id, raw.parse().map_err(|_| invalid(kind, raw))?),
        ObjectType::Uint => parcel.store_uint(id, raw.parse().map_err(|_| invalid(kind, raw))?),
        ObjectType::Sint => parcel.store_sint(id, raw.parse().map_err(|_| invalid(kind, raw))?),
        ObjectType::Float => parcel.store_float(id, raw.parse().map_err(|_| invalid(kind, raw))?),
        ObjectType::Zuid => parcel.store_zuid(id, raw.parse()?),
        ObjectType::String => parcel.store_string(id, raw),
        ObjectType::Blob => {
            parcel.store_blob(id, &hex::decode(raw).map_err(|_| invalid(kind, raw))?)
        }
        ObjectType::List => {
            let ids = raw
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<Zuid>>>()?;
            parcel.store_list(id, &ids)
        }
        ObjectType::File => {
            let path = Path::new(raw);
            let source = File::open(path).map_err(ParcelError::Open)?;
            let size = source.metadata().map_err(ParcelError::Read)?.len();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            parcel.store_file_from(id, &name, source, size).map(|_| ())
        }
        ObjectType::Null | ObjectType::Unknown => Err(invalid(kind, raw)),
    }
}

fn invalid(kind: &str, raw: &str) -> ParcelError {
    ParcelError::Encoding(format!("{:?} is not a valid {} value", raw, kind))
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Uint(n) => n.to_string(),
        Value::Sint(n) => n.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Zuid(id) => id.to_string(),
        Value::Blob(data) => hex::encode(data),
        Value::String(s) => format!("{:?}", s),
        Value::List(ids) => ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(","),
        Value::File(f) => format!("file name={} data={}", f.name_id, f.data_id),
        Value::Unknown { tag, data } => format!("<tag {}> {}", tag, hex::encode(data)),
    }
}
