//! Command-line definitions for the busboard CLI.

use clap::{Args, Parser, Subcommand};

use busboard_core::VERSION;

/// Busboard - local-first bus seating and roster management with optional
/// end-to-end-encrypted sync
#[derive(Parser)]
#[command(name = "busboard")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "BUSBOARD_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize configuration and the local store
    Init(InitArgs),

    /// Manage busses
    Bus {
        #[command(subcommand)]
        command: BusCommands,
    },

    /// Manage students
    Student {
        #[command(subcommand)]
        command: StudentCommands,
    },

    /// Manage seat assignments
    Seat {
        #[command(subcommand)]
        command: SeatCommands,
    },

    /// Manage boarding checkins
    Checkin {
        #[command(subcommand)]
        command: CheckinCommands,
    },

    /// Manage route sheets
    Route {
        #[command(subcommand)]
        command: RouteCommands,
    },

    /// Synchronize with the shared remote dataset
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Manage dataset encryption
    Encryption {
        #[command(subcommand)]
        command: EncryptionCommands,
    },

    /// Export or import a plaintext backup
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Shared dataset identifier (all devices must match)
    #[arg(long, value_name = "ID")]
    pub dataset: String,

    /// Local store path (defaults under XDG data dir)
    #[arg(long, value_name = "PATH")]
    pub store: Option<String>,

    /// Remote backend base URL (omit for local-only mode)
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,
}

#[derive(Subcommand)]
pub enum BusCommands {
    /// Add a bus
    Add {
        /// Display name (e.g., "Bus 12")
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// List busses
    List,
    /// Remove a bus (its seat assignments cascade)
    Rm {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum StudentCommands {
    /// Add a student
    Add(StudentAddArgs),
    /// List students
    List,
    /// Remove a student (their seat assignments cascade)
    Rm {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Args)]
pub struct StudentAddArgs {
    #[arg(long)]
    pub first: String,
    #[arg(long)]
    pub last: String,
    #[arg(long, default_value = "")]
    pub grade: String,
    /// Bus id for the AM route
    #[arg(long, value_name = "BUS_ID")]
    pub bus_am: Option<String>,
    /// Bus id for the PM route
    #[arg(long, value_name = "BUS_ID")]
    pub bus_pm: Option<String>,
    #[arg(long, default_value = "")]
    pub address: String,
    #[arg(long, default_value = "")]
    pub parent: String,
    #[arg(long, default_value = "")]
    pub phone: String,
}

#[derive(Subcommand)]
pub enum SeatCommands {
    /// Assign a student to a seat
    Assign {
        #[arg(value_name = "BUS_ID")]
        bus: String,
        /// AM or PM
        #[arg(value_name = "ROUTE")]
        route: String,
        #[arg(value_name = "STUDENT_ID")]
        student: String,
        #[arg(long)]
        row: i64,
        /// left or right
        #[arg(long)]
        side: String,
        #[arg(long)]
        position: i64,
    },
    /// Print the seat chart for a bus and route
    Chart {
        #[arg(value_name = "BUS_ID")]
        bus: String,
        #[arg(value_name = "ROUTE")]
        route: String,
    },
    /// Remove a seat assignment by id
    Rm {
        #[arg(value_name = "ASSIGNMENT_ID")]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CheckinCommands {
    /// Toggle a student's checkin for a day
    Toggle {
        #[arg(value_name = "BUS_ID")]
        bus: String,
        #[arg(value_name = "ROUTE")]
        route: String,
        #[arg(value_name = "STUDENT_ID")]
        student: String,
        /// Day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// List checkins for a bus, route, and day
    List {
        #[arg(value_name = "BUS_ID")]
        bus: String,
        #[arg(value_name = "ROUTE")]
        route: String,
        /// Day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RouteCommands {
    /// Add a stop to a route sheet
    Add {
        #[arg(value_name = "BUS_ID")]
        bus: String,
        #[arg(value_name = "ROUTE")]
        route: String,
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "pickup")]
        action: String,
        /// 1-based position in the sheet; defaults to the end
        #[arg(long)]
        order: Option<i64>,
        /// Tie the stop to a roster student
        #[arg(long, value_name = "STUDENT_ID")]
        student: Option<String>,
    },
    /// Print a route sheet in order
    List {
        #[arg(value_name = "BUS_ID")]
        bus: String,
        #[arg(value_name = "ROUTE")]
        route: String,
    },
    /// Move a stop to a new position
    Move {
        #[arg(value_name = "ROW_ID")]
        id: String,
        #[arg(value_name = "ORDER")]
        order: i64,
    },
    /// Remove a stop, closing the gap
    Rm {
        #[arg(value_name = "ROW_ID")]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Pull the full remote dataset into the local store
    Now,
    /// Follow the live change feeds and apply events as they arrive
    Watch,
    /// Push every local record to the remote (recovery / after restore)
    Resync,
    /// Show connection and encryption status
    Status,
}

#[derive(Subcommand)]
pub enum EncryptionCommands {
    /// Enable end-to-end encryption for the dataset (admin action)
    Enable,
    /// Unlock this device with the shared dataset password
    Unlock,
    /// Rotate the dataset password, re-encrypting every remote document
    Rotate,
    /// Show the published and cached key versions
    Status,
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Write a plaintext JSON backup of the whole dataset
    Export {
        #[arg(value_name = "PATH")]
        path: String,
    },
    /// Replace the local dataset from a backup, then push everything
    Import {
        #[arg(value_name = "PATH")]
        path: String,
    },
}
