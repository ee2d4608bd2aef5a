mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bpak")]
#[command(about = "BPAK - build, sign, verify, and transport-encode firmware containers", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase verbosity (repeatable: -v, -vv, -vvv, -vvvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh archive with an initialized header
    Create {
        /// Archive file to create
        file: String,

        /// Overwrite an existing file without asking
        #[arg(short = 'Y', long)]
        force: bool,

        /// Payload digest algorithm
        #[arg(long, default_value = "sha256")]
        hash_kind: String,

        /// Signature scheme the header will declare
        #[arg(long, default_value = "ed25519")]
        signature_kind: String,
    },

    /// Append a part or a global meta entry
    Add {
        /// Archive file to modify
        file: String,

        /// Part name to add (omit to add a global meta entry via --meta)
        #[arg(long)]
        part: Option<String>,

        /// Read the part's bytes from this file
        #[arg(long)]
        from_file: Option<String>,

        /// Use this literal string as the part's bytes
        #[arg(long)]
        from_string: Option<String>,

        /// Name of a transport algorithm (e.g. bpak-heatshrink) to
        /// associate with this part for later `bpak transport` runs
        #[arg(long)]
        encoder: Option<String>,

        /// `<key>=<value>` meta entry; scoped to --part if given, else global
        #[arg(long)]
        meta: Option<String>,

        /// Exclude this part's bytes from the payload hash
        #[arg(long)]
        exclude_from_hash: bool,
    },

    /// Set the signing identity fields
    Set {
        /// Archive file to modify
        file: String,

        /// Human-readable key name (hashed into header.key_id)
        #[arg(long)]
        key_id: String,

        /// Human-readable keystore name (hashed into header.keystore_id)
        #[arg(long)]
        keystore_id: String,
    },

    /// Refresh the payload hash, sign the header, and write it back
    Sign {
        /// Archive file to sign
        file: String,

        /// PEM-encoded private key matching the header's signature_kind
        #[arg(long)]
        key: String,
    },

    /// Recompute the payload hash and verify the header signature
    Verify {
        /// Archive file to verify
        file: String,

        /// DER-encoded public key matching the header's signature_kind
        #[arg(long)]
        key: String,

        /// Additionally replay one Merkle block of this part
        #[arg(long)]
        part: Option<String>,

        /// Block index to replay (requires --part and --data)
        #[arg(long)]
        block: Option<usize>,

        /// Plain bytes of the block to replay (requires --part and --block)
        #[arg(long)]
        data: Option<String>,
    },

    /// Print a human-readable dump of an archive's header
    Show {
        /// Archive file to show
        file: String,
    },

    /// Re-encode or reconstitute an archive for transport
    Transport {
        /// Input archive
        input: String,

        /// Output archive
        output: String,

        /// Origin archive for delta algorithms
        #[arg(long)]
        origin: Option<String>,

        /// Transport-encode (default)
        #[arg(long, conflicts_with = "decode")]
        encode: bool,

        /// Transport-decode
        #[arg(long, conflicts_with = "encode")]
        decode: bool,
    },

    /// Diff the part and meta tables of two archives
    Compare {
        /// First archive
        a: String,
        /// Second archive
        b: String,
    },
}

/// Maps a [`bpak_core::BpakError`] to a distinct non-zero process exit code,
/// mirroring the reference tool's negative-integer error taxonomy
/// (spec.md §7). Errors the CLI itself raises (argument parsing, key I/O)
/// fall through to the generic `1`.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    use bpak_core::BpakError;
    match err.downcast_ref::<BpakError>() {
        Some(BpakError::NotFound(_)) => 2,
        Some(BpakError::InvalidHeader(_)) => 3,
        Some(BpakError::NoSpace(_)) => 4,
        Some(BpakError::Exists(_)) => 5,
        Some(BpakError::Io(_)) => 6,
        Some(BpakError::SizeError(_)) => 7,
        Some(BpakError::UnsupportedHash(_)) => 8,
        Some(BpakError::UnsupportedSignature(_)) => 9,
        Some(BpakError::PayloadHashMismatch) => 10,
        Some(BpakError::InvalidSignature) => 11,
        Some(BpakError::Failed(_)) => 12,
        Some(BpakError::InvalidArgument(_)) | Some(BpakError::BufferTooSmall { .. }) | None => 1,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace",
    };
    let filter = std::env::var("BPAK_VERBOSE")
        .ok()
        .and_then(|v| match v.as_str() {
            "0" => Some("info"),
            "1" => Some("debug"),
            _ => Some("trace"),
        })
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create {
            file,
            force,
            hash_kind,
            signature_kind,
        } => commands::create::execute(&file, &hash_kind, &signature_kind, force),

        Commands::Add {
            file,
            part,
            from_file,
            from_string,
            encoder,
            meta,
            exclude_from_hash,
        } => commands::add::execute(
            &file,
            part.as_deref(),
            from_file.as_deref(),
            from_string.as_deref(),
            encoder.as_deref(),
            meta.as_deref(),
            exclude_from_hash,
        ),

        Commands::Set {
            file,
            key_id,
            keystore_id,
        } => commands::set::execute(&file, &key_id, &keystore_id),

        Commands::Sign { file, key } => commands::sign::execute(&file, &key),

        Commands::Verify {
            file,
            key,
            part,
            block,
            data,
        } => commands::verify::execute(&file, &key, part.as_deref(), block, data.as_deref()),

        Commands::Show { file } => commands::show::execute(&file),

        Commands::Transport {
            input,
            output,
            origin,
            encode,
            decode,
        } => commands::transport::execute(&input, &output, origin.as_deref(), encode || !decode),

        Commands::Compare { a, b } => commands::compare::execute(&a, &b),
    }
}
