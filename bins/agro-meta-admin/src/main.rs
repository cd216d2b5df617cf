use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use agro_logging::{init_logging, LogConfig};
use agro_meta_service::{
    create_backend, registry, BackendConfig, BlockLayerSpec, DirEntry, Directory, GlobalMetadata,
    INodeRef, MetadataService, Path, MEMORY_BACKEND,
};
use agro_types::{InodeId, Status};

/// agro metadata administration tool
///
/// Builds the configured metadata backend and runs one command against it,
/// or a sequence of commands read from stdin with `shell` (needed for the
/// in-process `memory` backend, whose state lives only as long as the tool).
#[derive(Parser, Debug)]
#[command(name = "agro-meta-admin", version, about)]
struct Cli {
    /// Backend config file (TOML). Defaults to the memory backend.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Format the filesystem.
    Mkfs {
        #[arg(long, default_value_t = GlobalMetadata::default().block_size)]
        block_size: u64,
        /// Block layer stack, e.g. `crc,rep=3,base`.
        #[arg(long, default_value = "crc,base")]
        block_spec: BlockLayerSpec,
    },
    /// Show the filesystem's global metadata.
    Info,
    /// Create a volume.
    CreateVolume { name: String },
    /// List volumes.
    Volumes,
    /// Resolve a volume name to its id.
    VolumeId { name: String },
    /// Issue a new inode id.
    AllocInode,
    /// Create a directory (`volume:/a/b/`).
    Mkdir { path: Path },
    /// List a directory (`volume:/a/`).
    Ls { path: Path },
    /// Bind a file (`volume:/a/f`) to a fresh inode, or to `--inode`.
    Bind {
        path: Path,
        #[arg(long)]
        inode: Option<u64>,
    },
    /// List registered backends.
    Backends,
    /// Read commands from stdin, one per line, against one backend instance.
    Shell,
}

/// One line of `shell` input.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BackendConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BackendConfig::new(MEMORY_BACKEND),
    };
    if cli.verbose {
        config.log = LogConfig {
            level: "debug".into(),
            ..config.log
        };
    }
    let _guard = init_logging(&config.log).context("initializing logging")?;

    let service = create_backend(&config.backend, &config)?;
    tracing::debug!(backend = %config.backend, "backend ready");

    let result = match cli.command {
        Command::Shell => run_shell(service.as_ref(), cli.format).await,
        command => {
            let output = execute(service.as_ref(), command).await?;
            print(&output, cli.format);
            Ok(())
        }
    };

    service.close().await?;
    result
}

async fn run_shell(service: &dyn MetadataService, format: OutputFormat) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        if matches!(parsed.command, Command::Shell) {
            eprintln!("already in a shell");
            continue;
        }
        match execute(service, parsed.command).await {
            Ok(output) => print(&output, format),
            Err(e) => print_error(&e, format),
        }
    }
    Ok(())
}

async fn execute(service: &dyn MetadataService, command: Command) -> Result<Value, Status> {
    let output = match command {
        Command::Mkfs {
            block_size,
            block_spec,
        } => {
            let md = GlobalMetadata {
                block_size,
                default_block_spec: block_spec,
            };
            service.mkfs(md.clone()).await?;
            global_json(&md)
        }
        Command::Info => global_json(&service.global_metadata().await?),
        Command::CreateVolume { name } => {
            let id = service.create_volume(&name).await?;
            json!({ "volume": name, "id": *id })
        }
        Command::Volumes => json!(service.get_volumes().await?),
        Command::VolumeId { name } => {
            let id = service.get_volume_id(&name).await?;
            json!({ "volume": name, "id": *id })
        }
        Command::AllocInode => json!({ "inode": *service.commit_inode_index().await? }),
        Command::Mkdir { path } => {
            service.mkdir(&path, Directory::new()).await?;
            json!({ "created": path.to_string() })
        }
        Command::Ls { path } => {
            let (dir, children) = service.getdir(&path).await?;
            let entries: Vec<Value> = dir
                .entries
                .iter()
                .map(|(name, entry)| match entry {
                    DirEntry::Directory => json!({ "name": name, "type": "dir" }),
                    DirEntry::File(r) => json!({
                        "name": name,
                        "type": "file",
                        "volume": *r.volume,
                        "inode": *r.inode,
                    }),
                })
                .collect();
            let children: Vec<String> = children.iter().map(Path::to_string).collect();
            json!({
                "path": path.to_string(),
                "mode": format!("{:o}", dir.metadata.mode),
                "ctime": dir.metadata.ctime.to_rfc3339(),
                "entries": entries,
                "subdirectories": children,
            })
        }
        Command::Bind { path, inode } => {
            let volume = service.get_volume_id(&path.volume).await?;
            let inode = match inode {
                Some(id) => InodeId(id),
                None => service.commit_inode_index().await?,
            };
            service
                .set_file_inode(&path, INodeRef::new(volume, inode))
                .await?;
            json!({ "path": path.to_string(), "volume": *volume, "inode": *inode })
        }
        Command::Backends => json!(registry::registered_backends()),
        Command::Shell => json!(null),
    };
    Ok(output)
}

fn global_json(md: &GlobalMetadata) -> Value {
    json!({
        "block_size": md.block_size,
        "block_spec": md.default_block_spec.to_string(),
    })
}

fn print(output: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(output).unwrap_or_default()
        ),
        OutputFormat::Table => print_table(output, 0),
    }
}

fn print_table(value: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if v.is_array() || v.is_object() {
                    println!("{}{}:", pad, k);
                    print_table(v, indent + 2);
                } else {
                    println!("{}{}: {}", pad, k, scalar(v));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() {
                    let row: Vec<String> = item
                        .as_object()
                        .into_iter()
                        .flatten()
                        .map(|(k, v)| format!("{}={}", k, scalar(v)))
                        .collect();
                    println!("{}{}", pad, row.join("  "));
                } else {
                    println!("{}{}", pad, scalar(item));
                }
            }
        }
        Value::Null => {}
        other => println!("{}{}", pad, scalar(other)),
    }
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_error(err: &Status, format: OutputFormat) {
    match format {
        OutputFormat::Json => eprintln!(
            "{}",
            json!({ "error": err.to_string(), "code": err.code(), "errno": agro_types::to_errno(err.code()) })
        ),
        OutputFormat::Table => eprintln!("Error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(s: &str) -> Command {
        ShellLine::try_parse_from(s.split_whitespace()).unwrap().command
    }

    #[test]
    fn test_parse_shell_lines() {
        assert!(matches!(line("mkdir v:/a/"), Command::Mkdir { path } if path == Path::new("v", "/a/")));
        assert!(matches!(line("bind v:/a/f --inode 7"), Command::Bind { inode: Some(7), .. }));
        match line("mkfs --block-size 4096 --block-spec rep=2,base") {
            Command::Mkfs { block_size, block_spec } => {
                assert_eq!(block_size, 4096);
                assert_eq!(block_spec.to_string(), "rep=2,base");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ShellLine::try_parse_from(["mkdir", "no-volume"]).is_err());
    }

    #[tokio::test]
    async fn test_session_against_memory_backend() {
        let service = create_backend(MEMORY_BACKEND, &BackendConfig::new(MEMORY_BACKEND)).unwrap();
        let svc = service.as_ref();

        let err = execute(svc, line("volumes")).await.unwrap_err();
        assert_eq!(err.kind(), agro_types::ErrorKind::NotFormatted);

        execute(svc, line("mkfs")).await.unwrap();
        execute(svc, line("create-volume v")).await.unwrap();
        execute(svc, line("mkdir v:/a/")).await.unwrap();
        let bound = execute(svc, line("bind v:/a/f")).await.unwrap();
        assert_eq!(bound["inode"], 1);

        let listing = execute(svc, line("ls v:/")).await.unwrap();
        assert_eq!(listing["subdirectories"], json!(["v:/a/"]));
        let listing = execute(svc, line("ls v:/a/")).await.unwrap();
        assert_eq!(listing["entries"][0]["name"], "f");
        assert_eq!(listing["entries"][0]["inode"], 1);
    }
}
