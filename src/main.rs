//! Binary entry point for the `scw-instance` CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::Parser;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{
    Cli, CreateSnapshotCommand, ExportSnapshotCommand, LookupCommand, ServerActionCommand,
    ServerRebootCommand, UserDataCommand, UserDataSetCommand,
};
use scaleway_instance::config::ProviderConfig;
use scaleway_instance::locality::Zone;
use scaleway_instance::provider::{Diagnostics, Meta, Provider, ProviderError};
use scaleway_instance::scaleway::{HttpClient, HttpClientConfig};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },
    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };
    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    if let Cli::List = cli {
        return list_names();
    }
    let provider = connect()?;
    match cli {
        Cli::ServerAction(command) => server_action(&provider, command).await,
        Cli::ServerReboot(command) => server_reboot(&provider, command).await,
        Cli::CreateSnapshot(command) => create_snapshot(&provider, command).await,
        Cli::ExportSnapshot(command) => export_snapshot(&provider, command).await,
        Cli::UserData(UserDataCommand::Set(command)) => set_user_data(&provider, command).await,
        Cli::Lookup(command) => lookup(&provider, command).await,
        Cli::List => list_names(),
    }
}

fn connect() -> Result<Provider, CliError> {
    let config =
        ProviderConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let meta = config
        .meta()
        .map_err(|err| CliError::Config(err.to_string()))?;
    debug!(zone = %meta.default_zone, "provider configured");
    Ok(Provider::new(meta))
}

/// JSON object of the given pairs, leaving out absent values.
fn input(pairs: Vec<(&str, Option<Value>)>) -> Value {
    Value::Object(
        pairs
            .into_iter()
            .filter_map(|(key, value)| value.map(|present| (key.to_owned(), present)))
            .collect::<Map<String, Value>>(),
    )
}

async fn server_action(provider: &Provider, command: ServerActionCommand) -> Result<(), CliError> {
    let config = input(vec![
        ("server_id", Some(json!(command.server_id))),
        ("action", Some(json!(command.action))),
        ("wait", Some(json!(command.wait))),
        ("name", command.name.map(Value::from)),
        ("zone", command.zone.map(Value::from)),
    ]);
    let diagnostics = provider
        .invoke("scaleway_instance_server_action", config)
        .await?;
    report_diagnostics(&diagnostics)
}

async fn server_reboot(provider: &Provider, command: ServerRebootCommand) -> Result<(), CliError> {
    let config = input(vec![
        ("server_id", Some(json!(command.server_id))),
        ("zone", command.zone.map(Value::from)),
    ]);
    let diagnostics = provider
        .invoke("scaleway_instance_server_reboot", config)
        .await?;
    report_diagnostics(&diagnostics)
}

async fn create_snapshot(
    provider: &Provider,
    command: CreateSnapshotCommand,
) -> Result<(), CliError> {
    let config = input(vec![
        ("volume_id", Some(json!(command.volume_id))),
        ("name", command.name.map(Value::from)),
        ("type", command.snapshot_type.map(Value::from)),
        ("tags", Some(json!(command.tags))),
        ("zone", command.zone.map(Value::from)),
    ]);
    let diagnostics = provider
        .invoke("scaleway_instance_create_snapshot", config)
        .await?;
    report_diagnostics(&diagnostics)
}

async fn export_snapshot(
    provider: &Provider,
    command: ExportSnapshotCommand,
) -> Result<(), CliError> {
    let config = input(vec![
        ("snapshot_id", Some(json!(command.snapshot_id))),
        ("bucket", Some(json!(command.bucket))),
        ("key", Some(json!(command.key))),
        ("zone", command.zone.map(Value::from)),
    ]);
    let diagnostics = provider
        .invoke("scaleway_instance_export_snapshot", config)
        .await?;
    report_diagnostics(&diagnostics)
}

async fn set_user_data(provider: &Provider, command: UserDataSetCommand) -> Result<(), CliError> {
    const RESOURCE: &str = "scaleway_instance_user_data";
    let value = read_to_string_ambient(&command.file)?;
    let config = input(vec![
        ("server_id", Some(json!(command.server_id))),
        ("key", Some(json!(command.key))),
        ("value", Some(json!(value))),
        ("zone", command.zone.map(Value::from)),
    ]);
    let plan = provider.plan(RESOURCE, None, config).await?;
    report_diagnostics(&plan.diagnostics)?;
    let applied = provider.apply(RESOURCE, None, Some(plan.planned)).await?;
    report_diagnostics(&applied.diagnostics)?;
    if let Some((id, _)) = applied.state {
        writeln!(io::stdout(), "{id}")?;
    }
    Ok(())
}

async fn lookup(provider: &Provider, command: LookupCommand) -> Result<(), CliError> {
    let config: Value =
        serde_json::from_str(&command.input).map_err(|err| CliError::Input(err.to_string()))?;
    if !config.is_object() {
        return Err(CliError::Input(String::from("--input must be a JSON object")));
    }
    let applied = provider
        .read_data_source(&command.data_source, config)
        .await?;
    report_diagnostics(&applied.diagnostics)?;
    let (id, state) = applied
        .state
        .ok_or_else(|| CliError::Input(format!("{} returned no state", command.data_source)))?;
    let rendered = serde_json::to_string_pretty(&json!({"id": id, "state": state}))
        .map_err(|err| CliError::Input(err.to_string()))?;
    writeln!(io::stdout(), "{rendered}")?;
    Ok(())
}

fn list_names() -> Result<(), CliError> {
    let client = HttpClient::new(HttpClientConfig::new(String::new()));
    let provider = Provider::new(Meta::from_client(Arc::new(client), Zone::FrPar1, ""));
    let mut stdout = io::stdout();
    for name in provider.resource_names() {
        writeln!(stdout, "resource {name}")?;
    }
    for name in provider.data_source_names() {
        writeln!(stdout, "data_source {name}")?;
    }
    for name in provider.action_names() {
        writeln!(stdout, "action {name}")?;
    }
    Ok(())
}

fn report_diagnostics(diagnostics: &Diagnostics) -> Result<(), CliError> {
    let mut stderr = io::stderr();
    for diagnostic in diagnostics.iter() {
        writeln!(stderr, "{diagnostic}")?;
    }
    Ok(())
}

fn read_to_string_ambient(path: &str) -> Result<String, CliError> {
    let read_error = |message: String| CliError::Read {
        path: path.to_owned(),
        message,
    };
    let file = Utf8Path::new(path);
    let (dir_path, file_path) = if file.is_absolute() {
        let parent = file
            .parent()
            .ok_or_else(|| read_error(String::from("path has no parent directory")))?;
        let file_name = file
            .file_name()
            .ok_or_else(|| read_error(String::from("path has no file name")))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), file)
    };
    let dir = Dir::open_ambient_dir(dir_path, ambient_authority())
        .map_err(|err| read_error(err.to_string()))?;
    dir.read_to_string(file_path)
        .map_err(|err| read_error(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::{CliError, input, read_to_string_ambient, write_error};

    #[rstest]
    fn absent_values_are_left_out() {
        let built = input(vec![
            ("server_id", Some(json!("abc"))),
            ("zone", None::<Value>),
        ]);

        assert_eq!(built, json!({"server_id": "abc"}));
    }

    #[rstest]
    fn missing_files_name_the_path() {
        let err = read_to_string_ambient("does-not-exist.yaml").expect_err("missing file");

        assert!(
            matches!(&err, CliError::Read { path, .. } if path == "does-not-exist.yaml"),
            "unexpected error: {err}"
        );
    }

    #[rstest]
    fn absolute_paths_are_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cloud-init.yaml");
        std::fs::write(&path, "#cloud-config\n").expect("write");

        let content = read_to_string_ambient(path.to_str().expect("utf8")).expect("read");

        assert_eq!(content, "#cloud-config\n");
    }

    #[rstest]
    fn write_error_renders_the_message() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::Config(String::from("missing secret")));

        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(rendered.contains("configuration error: missing secret"));
    }
}
