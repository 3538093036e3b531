//! valkey-cachedb - command-line front end for the cache client
//!
//! Runs one cache verb against the configured hosts and prints the result,
//! either as plain text or as a JSON object.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use valkey_cachedb::config::{tls_domains_from_cli, CacheCommand, CliArgs};
use valkey_cachedb::{
    CacheClient, CacheDbId, ClientConfig, ClientError, Field, Outcome, Removal, Row,
};

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// What a verb produced, before rendering
enum Reply {
    Done,
    Missing,
    Bytes(Vec<u8>),
    Integer(i64),
    Removed(bool),
    Rows(Vec<Row>),
}

impl Reply {
    fn outcome(&self) -> Outcome {
        match self {
            Reply::Done | Reply::Removed(false) => Outcome::Done,
            Reply::Missing => Outcome::NotFound,
            _ => Outcome::Value,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<&'a [Row]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Re-quote raw query words so the tokenizer sees them unchanged
fn join_query(words: &[String]) -> String {
    let mut query = String::new();
    for word in words {
        if !query.is_empty() {
            query.push(' ');
        }
        let needs_quotes =
            word.is_empty() || word.chars().any(|c| c.is_whitespace() || "'\"\\".contains(c));
        if needs_quotes {
            query.push('"');
            for c in word.chars() {
                if c == '"' || c == '\\' {
                    query.push('\\');
                }
                query.push(c);
            }
            query.push('"');
        } else {
            query.push_str(word);
        }
    }
    query
}

fn run_command(client: &mut CacheClient, command: &CacheCommand) -> valkey_cachedb::Result<Reply> {
    let reply = match command {
        CacheCommand::Get { key } => match client.get(key.as_bytes())? {
            Some(value) => Reply::Bytes(value),
            None => Reply::Missing,
        },
        CacheCommand::Set { key, value, ttl } => {
            client.set(key.as_bytes(), value.as_bytes(), *ttl)?;
            Reply::Done
        }
        CacheCommand::Del { key } => {
            Reply::Removed(client.remove(key.as_bytes())? == Removal::Removed)
        }
        CacheCommand::Incr { key, delta, ttl } => {
            Reply::Integer(client.add(key.as_bytes(), *delta, *ttl)?)
        }
        CacheCommand::Decr { key, delta, ttl } => {
            Reply::Integer(client.sub(key.as_bytes(), *delta, *ttl)?)
        }
        CacheCommand::GetCounter { key } => match client.get_counter(key.as_bytes())? {
            Some(n) => Reply::Integer(i64::from(n)),
            None => Reply::Missing,
        },
        CacheCommand::Raw { query, width } => {
            match client.raw_query(&join_query(query), *width)? {
                Some(rows) => Reply::Rows(rows),
                None => Reply::Missing,
            }
        }
    };
    Ok(reply)
}

fn print_field(field: &Field) -> String {
    match field {
        Field::Str(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Field::Int32(n) => format!("(integer) {}", n),
        Field::Null => "(nil)".to_string(),
    }
}

fn print_text(reply: &Reply) {
    match reply {
        Reply::Done => println!("OK"),
        Reply::Missing => println!("(nil)"),
        Reply::Bytes(value) => println!("{}", String::from_utf8_lossy(value)),
        Reply::Integer(n) => println!("(integer) {}", n),
        Reply::Removed(removed) => println!("(integer) {}", u8::from(*removed)),
        Reply::Rows(rows) => {
            if rows.is_empty() {
                println!("(empty)");
            }
            for (i, row) in rows.iter().enumerate() {
                let fields: Vec<String> = row.iter().map(print_field).collect();
                println!("{}) {}", i + 1, fields.join("\t"));
            }
        }
    }
}

fn print_json(result: &valkey_cachedb::Result<Reply>) -> Result<()> {
    let report = match result {
        Ok(reply) => JsonReport {
            outcome: reply.outcome(),
            value: match reply {
                Reply::Bytes(value) => Some(String::from_utf8_lossy(value).into_owned().into()),
                Reply::Integer(n) => Some((*n).into()),
                Reply::Removed(removed) => Some((*removed).into()),
                _ => None,
            },
            rows: match reply {
                Reply::Rows(rows) => Some(rows.as_slice()),
                _ => None,
            },
            error: None,
        },
        Err(e) => JsonReport {
            outcome: e.outcome(),
            value: None,
            rows: None,
            error: Some(e.to_string()),
        },
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

/// Run the selected verb; returns the process exit code
fn run() -> Result<i32> {
    let args = CliArgs::parse_args();
    setup_logging(args.verbose, args.quiet);

    let id = CacheDbId::from_cli(&args).context("Configuration error")?;
    let config = ClientConfig::from_cli(&args);
    let tls_domains = tls_domains_from_cli(&args).context("TLS configuration error")?;

    let result = CacheClient::new(id, config, tls_domains)
        .and_then(|mut client| run_command(&mut client, &args.command));

    if args.json {
        print_json(&result)?;
    }

    let outcome = match result {
        Ok(reply) => {
            if !args.json {
                print_text(&reply);
            }
            reply.outcome()
        }
        Err(e) => {
            if !args.json {
                report_error(&e);
            }
            e.outcome()
        }
    };

    Ok(match outcome {
        Outcome::Value | Outcome::Done => 0,
        Outcome::NotFound => 1,
        Outcome::TransientFailure => 2,
        Outcome::PermanentFailure => 3,
    })
}

fn report_error(e: &ClientError) {
    match e {
        ClientError::NoReachableHost { .. } => error!("{} ({})", e.root_cause(), e),
        _ => error!("{}", e),
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(3);
        }
    }
}
