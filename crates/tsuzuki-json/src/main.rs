use std::io::{self, Read};

use tsuzuki_core::{Engine, GenerationOutcome};

mod http;
mod input;
mod output;
mod sink;

#[tokio::main]
async fn main() {
    // stderr carries JSONL; plain log lines only when explicitly requested
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let args: Vec<String> = std::env::args().collect();

    // --json-schema: print input schema and exit
    if args.iter().any(|a| a == "--json-schema") {
        let schema = schemars::schema_for!(input::JsonInput);
        match serde_json::to_string_pretty(&schema) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // --version
    if args.iter().any(|a| a == "--version") {
        println!("tsuzuki-json {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = run().await;
    output::emit_done(&result);
    if !matches!(result, Ok(GenerationOutcome::Success { .. })) {
        std::process::exit(1);
    }
}

async fn run() -> io::Result<GenerationOutcome> {
    // Read JSON from stdin
    let mut json_str = String::new();
    io::stdin().read_to_string(&mut json_str)?;
    let json_input = input::JsonInput::parse(&json_str)?;

    let config = json_input.resolve_config()?;
    let transport = http::HttpTransport::new(
        json_input.endpoint.clone(),
        json_input.resolve_api_key(),
        json_input.timeout_secs,
    )?;
    let sink = sink::JsonDiagnosticSink::new(json_input.log_file.clone());
    let mut engine = Engine::new(transport, config, sink);

    let handle = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = engine.generate(json_input.prompt).await;
    output::emit_result(&outcome)?;
    Ok(outcome)
}
