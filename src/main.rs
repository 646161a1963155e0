//! Binary entry point for the `stratus` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::warn;

use stratus::config::{ConfigError, ProviderConfig};
use stratus::error::ProviderError;
use stratus::logging;
use stratus::provider::Provider;
use stratus::schema::AttributeMap;
use stratus::state::ResourceState;
use stratus::state_file::{Address, ConfigDocument, StateFile, StateFileError};

mod cli;

use cli::{ApplyCommand, Cli, Command, DestroyCommand, ImportCommand, ReadDataCommand, StateArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    State(#[from] StateFileError),
    #[error("{address} is already managed; destroy it or pick another address")]
    AlreadyManaged { address: String },
    #[error("{address} is not in the state file")]
    NotManaged { address: String },
    #[error("invalid data source arguments: {0}")]
    Arguments(String),
    #[error("failed to write output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose) {
        writeln!(io::stderr(), "{err}").ok();
    }

    let exit_code = match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };
    process::exit(exit_code);
}

async fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Schema => print_json(&Provider::schemas()),
        Command::Apply(args) => apply(args).await,
        Command::Refresh(args) => refresh(args).await,
        Command::Destroy(args) => destroy(args).await,
        Command::Import(args) => import(args).await,
        Command::ReadData(args) => read_data(args).await,
    }
}

fn provider() -> Result<Provider, CliError> {
    let config = ProviderConfig::load_without_cli_args()?;
    Ok(Provider::new(config.client()?))
}

async fn apply(args: ApplyCommand) -> Result<(), CliError> {
    let document = ConfigDocument::load(&args.config)?;
    let path = args.state.state.as_path();
    let mut state = StateFile::load(path)?;
    let provider = provider()?;

    let mut addresses = Vec::with_capacity(document.resources.len());
    for raw in document.resources.keys() {
        addresses.push(Address::parse(raw)?);
    }

    let mut summary = Map::new();
    for (address, config) in addresses.iter().zip(document.resources.values()) {
        let recorded = state.get(address).cloned();
        let had_entry = recorded.is_some();
        let (plan, prior) = provider
            .refresh_and_plan(&address.type_name, config, recorded)
            .await?;
        if had_entry && prior.is_none() {
            state.remove(address);
            state.save(path)?;
        }
        let outcome = provider.apply(&address.type_name, config, prior).await;
        let applied = record(&mut state, path, address, outcome)?;
        let action = if applied { plan.action.to_string() } else { String::from("gone") };
        summary.insert(address.to_string(), Value::from(action));
    }

    let orphans: Vec<String> = state
        .resources
        .keys()
        .filter(|key| !document.resources.contains_key(*key))
        .cloned()
        .collect();
    for raw in orphans.iter().rev() {
        let address = Address::parse(raw)?;
        destroy_one(&provider, &mut state, path, &address).await?;
        summary.insert(raw.clone(), Value::from("destroy"));
    }

    let mut data = Map::new();
    for (raw, config) in &document.data {
        let address = Address::parse(raw)?;
        let read = provider
            .read_data_source(&address.type_name, config)
            .await?;
        data.insert(raw.clone(), Value::Object(read.attributes));
    }

    print_json(&json!({ "resources": summary, "data": data }))
}

/// Stores the outcome of one apply, saving state before surfacing errors.
fn record(
    state: &mut StateFile,
    path: &Utf8Path,
    address: &Address,
    outcome: Result<Option<ResourceState>, ProviderError>,
) -> Result<bool, CliError> {
    match outcome {
        Ok(Some(applied)) => {
            state.insert(address, applied);
            state.save(path)?;
            Ok(true)
        }
        Ok(None) => {
            warn!(%address, "resource disappeared while applying");
            state.remove(address);
            state.save(path)?;
            Ok(false)
        }
        Err(err) => {
            if let ProviderError::Incomplete { state: remnant, .. } = &err {
                match remnant {
                    Some(left) => {
                        warn!(%address, id = %left.id, "recording tainted resource");
                        state.insert(address, (**left).clone());
                    }
                    None => {
                        warn!(%address, "prior resource was destroyed before the failure");
                        state.remove(address);
                    }
                }
            }
            state.save(path)?;
            Err(err.into())
        }
    }
}

async fn refresh(args: StateArgs) -> Result<(), CliError> {
    let path = args.state.as_path();
    let mut state = StateFile::load(path)?;
    let provider = provider()?;

    let mut summary = Map::new();
    let entries: Vec<(String, ResourceState)> = state
        .resources
        .iter()
        .map(|(key, entry)| (key.clone(), entry.clone()))
        .collect();
    for (raw, entry) in entries {
        let address = Address::parse(&raw)?;
        match provider.refresh(entry).await? {
            Some(fresh) => {
                state.insert(&address, fresh);
                summary.insert(raw, Value::from("refreshed"));
            }
            None => {
                state.remove(&address);
                summary.insert(raw, Value::from("removed"));
            }
        }
    }
    state.save(path)?;
    print_json(&Value::Object(summary))
}

async fn destroy(args: DestroyCommand) -> Result<(), CliError> {
    let path = args.state.state.as_path();
    let mut state = StateFile::load(path)?;
    let provider = provider()?;

    let targets: Vec<String> = if args.addresses.is_empty() {
        state.resources.keys().rev().cloned().collect()
    } else {
        args.addresses
    };
    let mut destroyed = Vec::with_capacity(targets.len());
    for raw in targets {
        let address = Address::parse(&raw)?;
        if state.get(&address).is_none() {
            return Err(CliError::NotManaged { address: raw });
        }
        destroy_one(&provider, &mut state, path, &address).await?;
        destroyed.push(Value::from(raw));
    }
    print_json(&json!({ "destroyed": destroyed }))
}

async fn destroy_one(
    provider: &Provider,
    state: &mut StateFile,
    path: &Utf8Path,
    address: &Address,
) -> Result<(), CliError> {
    if let Some(entry) = state.get(address).cloned() {
        provider.destroy(entry).await?;
        state.remove(address);
        state.save(path)?;
    }
    Ok(())
}

async fn import(args: ImportCommand) -> Result<(), CliError> {
    let path = args.state.state.as_path();
    let address = Address::parse(&args.address)?;
    let mut state = StateFile::load(path)?;
    if state.get(&address).is_some() {
        return Err(CliError::AlreadyManaged {
            address: args.address,
        });
    }
    let provider = provider()?;

    let imported = provider.import(&address.type_name, &args.id).await?;
    let attributes = Value::Object(imported.attributes.clone());
    state.insert(&address, imported);
    state.save(path)?;
    print_json(&attributes)
}

async fn read_data(args: ReadDataCommand) -> Result<(), CliError> {
    let config = parse_arguments(&args.args)?;
    let provider = provider()?;
    let read = provider.read_data_source(&args.type_name, &config).await?;
    print_json(&json!({ "id": read.id, "attributes": read.attributes }))
}

fn parse_arguments(raw: &str) -> Result<AttributeMap, CliError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CliError::Arguments(format!("expected a JSON object, got {other}"))),
        Err(err) => Err(CliError::Arguments(err.to_string())),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(io::stdout(), "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&["stratus", "schema"])]
    #[case(&["stratus", "apply", "main.json"])]
    #[case(&["stratus", "-v", "refresh", "--state", "other.json"])]
    #[case(&["stratus", "destroy", "workflow_domain.orders"])]
    #[case(&["stratus", "import", "workflow_domain.orders", "orders"])]
    #[case(&["stratus", "read-data", "statemachine_state_machines"])]
    fn subcommands_parse(#[case] argv: &[&str]) {
        Cli::try_parse_from(argv).unwrap_or_else(|err| panic!("parse {argv:?}: {err}"));
    }

    #[test]
    fn state_path_defaults_to_the_working_directory() {
        let cli = Cli::try_parse_from(["stratus", "refresh"])
            .unwrap_or_else(|err| panic!("parse: {err}"));
        let Command::Refresh(args) = cli.command else {
            panic!("expected refresh");
        };
        assert_eq!(args.state.as_str(), stratus::state_file::DEFAULT_STATE_PATH);
    }

    #[test]
    fn import_requires_an_identifier() {
        assert!(Cli::try_parse_from(["stratus", "import", "workflow_domain.orders"]).is_err());
    }

    #[rstest]
    #[case("{}", true)]
    #[case(r#"{ "name": "x" }"#, true)]
    #[case("[]", false)]
    #[case("{", false)]
    fn data_source_arguments_must_be_an_object(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(parse_arguments(raw).is_ok(), ok);
    }

    fn temp_state() -> (tempfile::TempDir, camino::Utf8PathBuf, Address) {
        let tmp = tempfile::TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = camino::Utf8PathBuf::from_path_buf(tmp.path().join("state.json"))
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
        let address = Address::parse("lattice_target_group.web")
            .unwrap_or_else(|err| panic!("address: {err}"));
        (tmp, path, address)
    }

    fn entry(id: &str, tainted: bool) -> ResourceState {
        ResourceState {
            type_name: String::from("lattice_target_group"),
            id: id.to_owned(),
            attributes: Map::new(),
            tainted,
        }
    }

    fn failure() -> ProviderError {
        ProviderError::Validation(vec![String::from("boom")])
    }

    #[test]
    fn record_drops_a_destroyed_prior() {
        let (_tmp, path, address) = temp_state();
        let mut state = StateFile::default();
        state.insert(&address, entry("tg-0001", false));

        let outcome = Err(ProviderError::Incomplete {
            state: None,
            source: Box::new(failure()),
        });
        assert!(record(&mut state, &path, &address, outcome).is_err());

        let saved = StateFile::load(&path).unwrap_or_else(|err| panic!("load: {err}"));
        assert!(saved.get(&address).is_none());
    }

    #[test]
    fn record_keeps_a_tainted_remnant() {
        let (_tmp, path, address) = temp_state();
        let mut state = StateFile::default();

        let outcome = Err(ProviderError::Incomplete {
            state: Some(Box::new(entry("tg-0002", true))),
            source: Box::new(failure()),
        });
        assert!(record(&mut state, &path, &address, outcome).is_err());

        let saved = StateFile::load(&path).unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(saved.get(&address), Some(&entry("tg-0002", true)));
    }

    #[test]
    fn record_leaves_state_alone_on_plain_failures() {
        let (_tmp, path, address) = temp_state();
        let mut state = StateFile::default();
        state.insert(&address, entry("tg-0001", false));

        assert!(record(&mut state, &path, &address, Err(failure())).is_err());

        let saved = StateFile::load(&path).unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(saved.get(&address), Some(&entry("tg-0001", false)));
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::NotManaged {
            address: String::from("workflow_domain.orders"),
        };
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert_eq!(rendered, "workflow_domain.orders is not in the state file\n");
    }
}
