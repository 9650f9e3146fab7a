//! Purpose: Hold top-level CLI command dispatch for `dynamite`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command prints exactly one JSON document on success.
//! Invariants: Helpers in `main.rs` remain the source of input parsing and output shaping.

use super::*;
use dynamite::api::{BatchGetPager, BatchWritePager};

pub(super) fn dispatch_command(
    command: Command,
    connection: &ConnectionArgs,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "dynamite", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Get { input } => single(connection, &input, |client, params| client.get(params)),
        Command::Put { input } => single(connection, &input, |client, params| client.put(params)),
        Command::Update { input } => {
            single(connection, &input, |client, params| client.update(params))
        }
        Command::Delete { input } => {
            single(connection, &input, |client, params| client.delete(params))
        }
        Command::Query {
            input,
            all,
            item_limit,
        } => {
            let params = read_item_params(&input)?;
            let client = connect(connection)?;
            if all {
                let result = client.query_all(&params, item_limit)?;
                emit_json(result.to_native().to_json());
            } else {
                emit_json(NativeValue::Map(client.query(&params)?).to_json());
            }
            Ok(RunOutcome::ok())
        }
        Command::Scan {
            input,
            all,
            scan_limit,
            item_limit,
        } => {
            let params = read_item_params(&input)?;
            let client = connect(connection)?;
            if all {
                let result = client.scan_all(&params, scan_limit, item_limit)?;
                tracing::info!(pages = result.pages, count = result.count, "scan complete");
                emit_json(result.to_native().to_json());
            } else {
                emit_json(NativeValue::Map(client.scan(&params)?).to_json());
            }
            Ok(RunOutcome::ok())
        }
        Command::BatchGet { input, paging } => {
            let request = parse_batch_get(&read_params(&input)?)?;
            let client = connect(connection)?;
            let mut pager = BatchGetPager::new(&client);
            if let Some(size) = paging.page_size {
                pager = pager.with_page_size(size);
            }
            if let Some(rounds) = paging.max_rounds {
                pager = pager.with_max_rounds(rounds);
            }
            if let Some(ms) = paging.retry_delay_ms {
                pager = pager.with_retry_delay(Duration::from_millis(ms));
            }
            let result = pager.run(request)?;
            emit_json(result.to_native().to_json());
            Ok(RunOutcome::ok())
        }
        Command::BatchWrite { input, paging } => {
            let request = parse_batch_write(&read_params(&input)?)?;
            let client = connect(connection)?;
            let mut pager = BatchWritePager::new(&client);
            if let Some(size) = paging.page_size {
                pager = pager.with_page_size(size);
            }
            if let Some(rounds) = paging.max_rounds {
                pager = pager.with_max_rounds(rounds);
            }
            if let Some(ms) = paging.retry_delay_ms {
                pager = pager.with_retry_delay(Duration::from_millis(ms));
            }
            let summary = pager.run(request)?;
            let value = serde_json::to_value(summary).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode batch summary")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Table { command } => match command {
            TableCommand::Create { input } => {
                let params = read_params(&input)?;
                let client = connect(connection)?;
                emit_json(client.create_table(&params)?);
                Ok(RunOutcome::ok())
            }
            TableCommand::Delete { name } => {
                let client = connect(connection)?;
                emit_json(client.delete_table(&json!({ "TableName": name }))?);
                Ok(RunOutcome::ok())
            }
        },
    }
}

fn single<F>(connection: &ConnectionArgs, input: &ParamsInput, call: F) -> Result<RunOutcome, Error>
where
    F: FnOnce(&Client<HttpTransport>, &Item) -> Result<Item, Error>,
{
    let params = read_item_params(input)?;
    let client = connect(connection)?;
    let result = call(&client, &params)?;
    emit_json(NativeValue::Map(result).to_json());
    Ok(RunOutcome::ok())
}
