//! Command-line interface definitions for the `scw-instance` binary.
//!
//! The parser structures live here so the build script can reuse them when
//! generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `scw-instance` binary.
#[derive(Debug, Parser)]
#[command(
    name = "scw-instance",
    about = "Run Scaleway Instance actions and lookups from the shell",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run a power action on a server.
    #[command(name = "server-action")]
    ServerAction(ServerActionCommand),
    /// Reboot a server and wait until it is running again.
    #[command(name = "server-reboot")]
    ServerReboot(ServerRebootCommand),
    /// Snapshot a volume of either storage backend.
    #[command(name = "create-snapshot")]
    CreateSnapshot(CreateSnapshotCommand),
    /// Export a snapshot to an object-storage bucket.
    #[command(name = "export-snapshot")]
    ExportSnapshot(ExportSnapshotCommand),
    /// Manage per-server user-data keys.
    #[command(name = "user-data", subcommand)]
    UserData(UserDataCommand),
    /// Read a data source and print its state as JSON.
    #[command(name = "lookup")]
    Lookup(LookupCommand),
    /// List the registered resources, data sources and actions.
    #[command(name = "list")]
    List,
}

/// Arguments for `scw-instance server-action`.
#[derive(Debug, Parser)]
pub(crate) struct ServerActionCommand {
    /// Server identifier, optionally prefixed with its zone.
    #[arg(long, value_name = "ID")]
    pub(crate) server_id: String,
    /// Action to run (poweron, poweroff, stop_in_place, reboot, terminate,
    /// backup, enable_routed_ip).
    #[arg(long, value_name = "ACTION")]
    pub(crate) action: String,
    /// Wait for the server, and any backup, to settle.
    #[arg(long)]
    pub(crate) wait: bool,
    /// Name of the image produced by a backup.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Zone of the server when the id carries none.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
}

/// Arguments for `scw-instance server-reboot`.
#[derive(Debug, Parser)]
pub(crate) struct ServerRebootCommand {
    /// Server identifier, optionally prefixed with its zone.
    #[arg(long, value_name = "ID")]
    pub(crate) server_id: String,
    /// Zone of the server when the id carries none.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
}

/// Arguments for `scw-instance create-snapshot`.
#[derive(Debug, Parser)]
pub(crate) struct CreateSnapshotCommand {
    /// Volume identifier, optionally prefixed with its zone.
    #[arg(long, value_name = "ID")]
    pub(crate) volume_id: String,
    /// Snapshot name; generated when omitted.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Restore type of an instance snapshot (l_ssd, b_ssd, unified).
    #[arg(long = "type", value_name = "TYPE")]
    pub(crate) snapshot_type: Option<String>,
    /// Tag to apply; repeat for several.
    #[arg(long = "tag", value_name = "TAG")]
    pub(crate) tags: Vec<String>,
    /// Zone of the volume when the id carries none.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
}

/// Arguments for `scw-instance export-snapshot`.
#[derive(Debug, Parser)]
pub(crate) struct ExportSnapshotCommand {
    /// Snapshot identifier, optionally prefixed with its zone.
    #[arg(long, value_name = "ID")]
    pub(crate) snapshot_id: String,
    /// Destination bucket.
    #[arg(long, value_name = "BUCKET")]
    pub(crate) bucket: String,
    /// Destination object key.
    #[arg(long, value_name = "KEY")]
    pub(crate) key: String,
    /// Zone of the snapshot when the id carries none.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
}

/// Subcommands of `scw-instance user-data`.
#[derive(Debug, Subcommand)]
pub(crate) enum UserDataCommand {
    /// Upload a file as the value of a user-data key.
    #[command(name = "set")]
    Set(UserDataSetCommand),
}

/// Arguments for `scw-instance user-data set`.
#[derive(Debug, Parser)]
pub(crate) struct UserDataSetCommand {
    /// Server identifier, optionally prefixed with its zone.
    #[arg(long, value_name = "ID")]
    pub(crate) server_id: String,
    /// User-data key, for example `cloud-init`.
    #[arg(long, value_name = "KEY")]
    pub(crate) key: String,
    /// File holding the value.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: String,
    /// Zone of the server when the id carries none.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
}

/// Arguments for `scw-instance lookup`.
#[derive(Debug, Parser)]
pub(crate) struct LookupCommand {
    /// Data source name, for example `scaleway_instance_server_type`.
    #[arg(value_name = "DATA_SOURCE")]
    pub(crate) data_source: String,
    /// Data source arguments as a JSON object.
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub(crate) input: String,
}
