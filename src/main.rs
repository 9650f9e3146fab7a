//! Purpose: `dynamite` CLI entry point for native-value DynamoDB requests.
//! Role: Binary crate; parses args, resolves config, emits JSON on stdout.
//! Invariants: Successful output is JSON on stdout; errors go to stderr.
//! Invariants: Non-TTY stderr receives a JSON error envelope; exit codes come from `to_exit_code`.
//! Invariants: Logging is opt-in through RUST_LOG and always writes to stderr.
#![allow(clippy::result_large_err)]

use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use dynamite::api::{
    Client, ClientConfig, ConversionOptions, ENDPOINT_VAR, Error, ErrorKind, HttpTransport, Item,
    KeysAndAttributes, NativeValue, WriteRequest, to_exit_code,
};
use std::collections::BTreeMap;

struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint(clap_error_hint(&err)));
            }
        },
    };

    init_tracing();
    command_dispatch::dispatch_command(cli.command, &cli.connection).map_err(add_protocol_hint)
}

#[derive(Parser)]
#[command(
    name = "dynamite",
    version,
    about = "Native-value requests against DynamoDB",
    long_about = None,
    before_help = r#"Parameters are plain JSON; attribute values are converted to and from
the tagged wire form ({"S": ...}, {"N": ...}) for you.
"#,
    after_help = r#"EXAMPLES
  $ dynamite get '{"TableName": "users", "Key": {"id": "42"}}'
  $ dynamite put -f item.json
  $ dynamite scan --all --item-limit 100 '{"TableName": "users"}'
  $ dynamite batch-write -f writes.json --max-rounds 10

CONFIGURATION
  Region:      --region, AWS_REGION, AWS_DEFAULT_REGION
  Endpoint:    --endpoint, DYNAMITE_ENDPOINT (default: regional public endpoint)
  Credentials: AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY, or --profile / AWS_PROFILE
               in ~/.aws/credentials
  Logging:     RUST_LOG (default: warn)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug, Default)]
struct ConnectionArgs {
    #[arg(long, global = true, help = "Region (default: AWS_REGION or AWS_DEFAULT_REGION)")]
    region: Option<String>,
    #[arg(
        long,
        global = true,
        value_hint = ValueHint::Url,
        help = "Endpoint URL, e.g. http://127.0.0.1:8000 for a local store"
    )]
    endpoint: Option<String>,
    #[arg(long, global = true, help = "Credentials profile from ~/.aws/credentials")]
    profile: Option<String>,
    #[arg(long, global = true, help = "Drop empty strings and binaries instead of failing")]
    remove_empty_values: bool,
    #[arg(long, global = true, help = "Send empty strings and binaries as NULL")]
    convert_empty_values: bool,
    #[arg(long, global = true, value_name = "SECS", help = "Per-request timeout in seconds")]
    timeout: Option<u64>,
}

#[derive(Args, Clone, Debug)]
struct ParamsInput {
    #[arg(help = "Request parameters as a JSON object")]
    params: Option<String>,
    #[arg(
        short = 'f',
        long = "file",
        value_hint = ValueHint::FilePath,
        conflicts_with = "params",
        help = "Read parameters from a file ('-' for stdin)"
    )]
    file: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct PagingArgs {
    #[arg(long, help = "Requests per batch call (writes: 1-25, gets: 1-100; default 25)")]
    page_size: Option<usize>,
    #[arg(long, help = "Give up after this many batch calls")]
    max_rounds: Option<usize>,
    #[arg(long, value_name = "MS", help = "Pause before retrying unprocessed work")]
    retry_delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Fetch one item by key (GetItem)")]
    Get {
        #[command(flatten)]
        input: ParamsInput,
    },
    #[command(about = "Write one item (PutItem)")]
    Put {
        #[command(flatten)]
        input: ParamsInput,
    },
    #[command(about = "Update one item (UpdateItem)")]
    Update {
        #[command(flatten)]
        input: ParamsInput,
    },
    #[command(about = "Delete one item (DeleteItem)")]
    Delete {
        #[command(flatten)]
        input: ParamsInput,
    },
    #[command(about = "Query by key condition (Query)")]
    Query {
        #[command(flatten)]
        input: ParamsInput,
        #[arg(long, help = "Follow LastEvaluatedKey until the query is exhausted")]
        all: bool,
        #[arg(long, requires = "all", help = "Stop paging once this many items matched")]
        item_limit: Option<u64>,
    },
    #[command(about = "Scan a table (Scan)")]
    Scan {
        #[command(flatten)]
        input: ParamsInput,
        #[arg(long, help = "Follow LastEvaluatedKey until the scan is exhausted")]
        all: bool,
        #[arg(long, requires = "all", help = "Stop paging once this many items were examined")]
        scan_limit: Option<u64>,
        #[arg(long, requires = "all", help = "Stop paging once this many items matched")]
        item_limit: Option<u64>,
    },
    #[command(
        about = "Fetch any number of keys in protocol-sized batches",
        after_help = r#"INPUT
  {"RequestItems": {"<table>": {"Keys": [{...}, ...], "ProjectionExpression": "..."}}}"#
    )]
    BatchGet {
        #[command(flatten)]
        input: ParamsInput,
        #[command(flatten)]
        paging: PagingArgs,
    },
    #[command(
        about = "Apply any number of puts/deletes in protocol-sized batches",
        after_help = r#"INPUT
  {"RequestItems": {"<table>": [{"PutRequest": {"Item": {...}}}, {"DeleteRequest": {"Key": {...}}}]}}"#
    )]
    BatchWrite {
        #[command(flatten)]
        input: ParamsInput,
        #[command(flatten)]
        paging: PagingArgs,
    },
    #[command(arg_required_else_help = true, about = "Create or delete tables")]
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TableCommand {
    #[command(about = "Create a table (parameters passed through unchanged)")]
    Create {
        #[command(flatten)]
        input: ParamsInput,
    },
    #[command(about = "Delete a table by name")]
    Delete {
        #[arg(help = "Table name")]
        name: String,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve_config(args: &ConnectionArgs) -> Result<ClientConfig, Error> {
    let lookup = |name: &str| -> Option<String> {
        match name {
            "AWS_REGION" if args.region.is_some() => args.region.clone(),
            ENDPOINT_VAR if args.endpoint.is_some() => args.endpoint.clone(),
            "AWS_PROFILE" if args.profile.is_some() => args.profile.clone(),
            // An explicit profile outranks credentials from the environment.
            "AWS_ACCESS_KEY_ID" | "AWS_SECRET_ACCESS_KEY" | "AWS_SESSION_TOKEN"
                if args.profile.is_some() =>
            {
                None
            }
            _ => std::env::var(name).ok(),
        }
    };
    let conversion = ConversionOptions::new()
        .remove_empty_values(args.remove_empty_values)
        .convert_empty_values(args.convert_empty_values);
    Ok(ClientConfig::from_lookup(lookup)?.with_conversion(conversion))
}

fn connect(args: &ConnectionArgs) -> Result<Client<HttpTransport>, Error> {
    let config = resolve_config(args)?;
    let mut transport = HttpTransport::new(&config)?;
    if let Some(secs) = args.timeout {
        transport = transport.with_timeout(Duration::from_secs(secs));
    }
    tracing::debug!(endpoint = %transport.endpoint(), region = %config.region, "connecting");
    Ok(Client::new(transport).with_options(config.conversion))
}

fn read_params(input: &ParamsInput) -> Result<Value, Error> {
    let text = match (&input.params, &input.file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) if path.as_os_str() == "-" => read_stdin()?,
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to read parameters file")
                .with_field(path.display().to_string())
                .with_source(err)
        })?,
        (None, None) if !io::stdin().is_terminal() => read_stdin()?,
        (None, None) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("missing request parameters")
                .with_hint("Pass a JSON object argument, -f <file>, or pipe JSON on stdin."));
        }
    };
    let value: Value = serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("parameters are not valid JSON")
            .with_source(err)
    })?;
    if !value.is_object() {
        return Err(Error::new(ErrorKind::Usage).with_message("parameters must be a JSON object"));
    }
    Ok(value)
}

fn read_stdin() -> Result<String, Error> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to read stdin")
            .with_source(err)
    })?;
    Ok(text)
}

fn read_item_params(input: &ParamsInput) -> Result<Item, Error> {
    let value = read_params(input)?;
    native_object(&value, "parameters")
}

fn native_object(value: &Value, what: &str) -> Result<Item, Error> {
    NativeValue::from_json(value)
        .into_map()
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message(format!("{what} must be a JSON object")))
}

fn request_items(value: &Value) -> Result<&Map<String, Value>, Error> {
    value
        .get("RequestItems")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("RequestItems must be an object keyed by table name")
        })
}

fn parse_batch_get(value: &Value) -> Result<BTreeMap<String, KeysAndAttributes>, Error> {
    let mut out = BTreeMap::new();
    for (table, request) in request_items(value)? {
        let mut read_params = request.as_object().cloned().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("batch get entry must be an object")
                .with_field(table.clone())
        })?;
        let keys = match read_params.remove("Keys") {
            Some(Value::Array(keys)) => keys
                .iter()
                .map(|key| native_object(key, "each key"))
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("batch get entry needs a Keys array")
                    .with_field(table.clone()));
            }
        };
        out.insert(table.clone(), KeysAndAttributes { keys, read_params });
    }
    Ok(out)
}

fn parse_batch_write(value: &Value) -> Result<BTreeMap<String, Vec<WriteRequest>>, Error> {
    let mut out = BTreeMap::new();
    for (table, requests) in request_items(value)? {
        let requests = requests.as_array().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("batch write entry must be an array of requests")
                .with_field(table.clone())
        })?;
        let parsed = requests
            .iter()
            .map(|request| parse_write_request(table, request))
            .collect::<Result<Vec<_>, _>>()?;
        out.insert(table.clone(), parsed);
    }
    Ok(out)
}

fn parse_write_request(table: &str, request: &Value) -> Result<WriteRequest, Error> {
    if let Some(item) = request.pointer("/PutRequest/Item") {
        return native_object(item, "PutRequest.Item").map(WriteRequest::Put);
    }
    if let Some(key) = request.pointer("/DeleteRequest/Key") {
        return native_object(key, "DeleteRequest.Key").map(WriteRequest::Delete);
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message("write request needs PutRequest.Item or DeleteRequest.Key")
        .with_field(table))
}

fn add_protocol_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match (err.kind(), err.code()) {
        (ErrorKind::Protocol, Some("ResourceNotFoundException")) => {
            err.with_hint("Check the table name and region.")
        }
        (ErrorKind::Protocol, Some("UnrecognizedClientException" | "InvalidSignatureException")) => {
            err.with_hint("Check the credentials and region.")
        }
        (ErrorKind::Transport, _) => err.with_hint("Check the endpoint and network connectivity."),
        (ErrorKind::EmptyValue, _) => {
            err.with_hint("Use --remove-empty-values or --convert-empty-values.")
        }
        _ => err,
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::EmptyValue => "empty value",
        ErrorKind::InvalidNumber => "invalid number",
        ErrorKind::InvalidSetType => "invalid set type",
        ErrorKind::UnknownWireType => "unknown wire type",
        ErrorKind::Transport => "transport error",
        ErrorKind::Protocol => "request rejected",
        ErrorKind::Unprocessed => "work left unprocessed",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(raw) = err.raw() {
        inner.insert("value".to_string(), json!(raw));
    }
    if let Some(code) = err.code() {
        inner.insert("code".to_string(), json!(code));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": inner })
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(field) = err.field() {
        lines.push(format!("field: {field}"));
    }
    if let Some(code) = err.code() {
        lines.push(format!("code: {code}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let subcommand = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            usage
                .split_whitespace()
                .skip_while(|token| *token != "dynamite")
                .nth(1)
                .filter(|token| !token.starts_with(['-', '<', '[']))
                .map(str::to_string)
        });
    match subcommand {
        Some(subcommand) => format!("Try `dynamite {subcommand} --help`."),
        None => "Try `dynamite --help`.".to_string(),
    }
}
