#![forbid(unsafe_code)]

use orch_mcp::entry;
use orch_mcp::service::Service;
use std::io::{BufReader, BufWriter, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

struct CliArgs {
    repo: String,
    mode: String,
    method: String,
    params: String,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = CliArgs {
        repo: ".".to_string(),
        mode: "serve".to_string(),
        method: String::new(),
        params: "{}".to_string(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut take_value = |flag: &str| -> Result<String, String> {
            iter.next().ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag.as_str() {
            "--repo" => args.repo = take_value("--repo")?,
            "--mode" => args.mode = take_value("--mode")?,
            "--method" => args.method = take_value("--method")?,
            "--params" => args.params = take_value("--params")?,
            other => return Err(format!("unknown flag: {other}")),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout carries the JSON-RPC stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let mut service = match Service::new(&args.repo) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("failed to initialize service: {err}");
            return ExitCode::FAILURE;
        }
    };

    match args.mode.to_lowercase().as_str() {
        "once" => run_once(&mut service, &args.method, &args.params),
        "serve" => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let mut reader = BufReader::new(stdin.lock());
            let mut writer = BufWriter::new(stdout.lock());
            match entry::serve(&mut service, &mut reader, &mut writer) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("transport error: {err}");
                    ExitCode::FAILURE
                }
            }
        }
        other => {
            eprintln!("invalid mode: {other}");
            ExitCode::from(2)
        }
    }
}

fn run_once(service: &mut Service, method: &str, params: &str) -> ExitCode {
    if method.trim().is_empty() {
        eprintln!("--method is required when mode=once");
        return ExitCode::from(2);
    }

    let params_value = if params.trim().is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_str(params) {
            Ok(value) => value,
            Err(err) => {
                eprintln!("invalid --params JSON: {err}");
                return ExitCode::from(2);
            }
        }
    };

    let outcome = service.handle(method, params_value);
    let response = match &outcome {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "id": "once",
            "result": result,
        }),
        Err(err) => serde_json::json!({
            "jsonrpc": "2.0",
            "id": "once",
            "error": { "code": -32000, "message": err.to_string() },
        }),
    };

    let encoded = serde_json::to_string_pretty(&response)
        .unwrap_or_else(|_| "{}".to_string());
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{encoded}");

    if outcome.is_err() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
