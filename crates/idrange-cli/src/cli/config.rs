use std::{path::PathBuf, time::Duration};

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use idrange::{AllocatorConfig, Namespace, OwnerState, PublicationType, StoreConfig};

/// Command line arguments for the `idrange` binary.
///
/// Every global option falls back to an environment variable, which may also
/// come from a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "idrange",
    version,
    about = "Administer ISBN, ISMN and ISSN ranges and issue identifiers"
)]
pub struct CliArgs {
    /// JSON state file. Created on the first mutating command.
    ///
    /// Environment variable: `IDRANGE_STATE`
    #[arg(long, env = "IDRANGE_STATE", default_value = "idrange.json")]
    pub state: PathBuf,

    /// How long a command waits for the state file lock or an owner row lock
    /// before giving up.
    ///
    /// Environment variable: `IDRANGE_LOCK_TIMEOUT_MS`
    #[arg(long, env = "IDRANGE_LOCK_TIMEOUT_MS", default_value_t = 5_000)]
    pub lock_timeout_ms: u64,

    /// Largest batch a single `issue` may request.
    ///
    /// Environment variable: `IDRANGE_MAX_BATCH_SIZE`
    #[arg(long, env = "IDRANGE_MAX_BATCH_SIZE", default_value_t = 1_000)]
    pub max_batch_size: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Computes the check digit of an identifier body.
    CheckDigit {
        /// `isbn`, `ismn` or `issn`.
        namespace: Namespace,
        /// Hyphenated body without the check digit, e.g. `978-951-12-0000`.
        body: String,
    },
    /// Validates a full identifier.
    Validate {
        identifier: String,
        /// Detected from the prefix when omitted.
        #[arg(long)]
        namespace: Option<Namespace>,
    },
    /// Range administration.
    #[command(subcommand)]
    Range(RangeCommand),
    /// Issues a batch of identifiers from a SubRange or an ISSN Range.
    Issue(IssueArgs),
    /// Cancels one issued identifier and puts it in the reuse pool.
    Cancel {
        identifier: String,
        #[arg(long)]
        canceled_by: String,
    },
    /// Undoes a whole batch.
    DeleteBatch { batch: u64 },
    /// Shows a batch record.
    Batch { batch: u64 },
    /// Shows the counters of an owner.
    Status { owner: u64 },
    /// Shows the reuse pool of an owner.
    Pool { owner: u64 },
    /// Moves an owner to `active`, `inactive` or `closed`.
    SetState { owner: u64, state: OwnerState },
    /// Finds the owner the next issuance should use.
    Candidate {
        namespace: Namespace,
        /// Picks among this publisher's subranges. Without it a Range is
        /// picked.
        #[arg(long)]
        publisher: Option<u64>,
        #[arg(long)]
        category: Option<u8>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RangeCommand {
    /// Defines a new Range.
    Create {
        namespace: Namespace,
        prefix: String,
        begin: String,
        end: String,
        /// Publisher identifier length. Required for ISBN and ISMN.
        #[arg(long)]
        category: Option<u8>,
        /// Starts the range `active` instead of `inactive`.
        #[arg(long, default_value_t = false)]
        active: bool,
    },
    /// Grants the next publisher identifier of a Range to a publisher.
    Grant { range: u64, publisher: u64 },
    /// Removes a SubRange that never issued anything.
    DeleteSubrange { subrange: u64 },
    /// Lists every Range and SubRange.
    List,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct IssueArgs {
    pub owner: u64,
    pub count: u32,
    #[arg(long)]
    pub publication: u64,
    #[arg(long)]
    pub issued_by: String,
    /// For example `print-paperback` or `ELECTRONIC_PDF`.
    #[arg(long)]
    pub publication_type: Option<PublicationType>,
    /// Replaying the same key returns the original batch.
    #[arg(long)]
    pub idempotency_key: Option<String>,
}

impl Command {
    /// Whether the command can change the state file.
    pub const fn mutates(&self) -> bool {
        match self {
            Self::Range(RangeCommand::List) => false,
            Self::Range(_)
            | Self::Issue(_)
            | Self::Cancel { .. }
            | Self::DeleteBatch { .. }
            | Self::SetState { .. } => true,
            Self::CheckDigit { .. }
            | Self::Validate { .. }
            | Self::Batch { .. }
            | Self::Status { .. }
            | Self::Pool { .. }
            | Self::Candidate { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub state: PathBuf,
    pub store: StoreConfig,
    pub allocator: AllocatorConfig,
    pub command: Command,
}

impl TryFrom<CliArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.lock_timeout_ms == 0 {
            bail!("IDRANGE_LOCK_TIMEOUT_MS must be greater than 0");
        }
        if args.max_batch_size == 0 {
            bail!("IDRANGE_MAX_BATCH_SIZE must be greater than 0");
        }
        if args.state.as_os_str().is_empty() {
            bail!("IDRANGE_STATE must name a file");
        }

        Ok(Self {
            state: args.state,
            store: StoreConfig::with_lock_timeout(Duration::from_millis(args.lock_timeout_ms)),
            allocator: AllocatorConfig {
                max_batch_size: args.max_batch_size,
            },
            command: args.command,
        })
    }
}
