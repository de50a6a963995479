// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::path::Path;
use std::process;

use tracing_subscriber::EnvFilter;

use texkiln::config::{load_and_validate_config, KilnBuilder};
use texkiln::errors::TaskError;
use texkiln::queue::CompileRequest;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <config.yaml> <input.tex> [more.tex ...]", args[0]);
        eprintln!("Example: {} texkiln.yaml snippets/integral.tex", args[0]);
        process::exit(1);
    }
    let config_file = &args[1];
    let inputs = &args[2..];

    let config = match load_and_validate_config(config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_file}: {e}");
            process::exit(1);
        }
    };

    let kiln = match KilnBuilder::from_config(&config).await {
        Ok(kiln) => kiln,
        Err(e) => {
            eprintln!("Failed to start the engine: {e}");
            process::exit(1);
        }
    };

    let mut failures = 0;
    for input in inputs {
        let source = match std::fs::read_to_string(input) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{input}: {e}");
                failures += 1;
                continue;
            }
        };
        let receiver = kiln
            .queue
            .submit(CompileRequest {
                block_id: input.clone(),
                source,
                origin: input.clone(),
                auto_includes: Vec::new(),
            })
            .await;

        match receiver.await {
            Ok(Ok(rendered)) => {
                let output = Path::new(input).with_extension("pdf");
                if let Err(e) = std::fs::write(&output, &rendered.artifact) {
                    eprintln!("{input}: could not write {}: {e}", output.display());
                    failures += 1;
                    continue;
                }
                let via = if rendered.from_cache { " (cached)" } else { "" };
                println!("{input} -> {}{via}", output.display());
            }
            Ok(Err(TaskError::Compile { status, diagnostics })) => {
                eprintln!("{input}: compile failed with status {status}");
                for diagnostic in diagnostics.visible() {
                    match diagnostic.line {
                        Some(line) => eprintln!("  line {line}: {}", diagnostic.message),
                        None => eprintln!("  {}", diagnostic.message),
                    }
                    if let Some(detail) = &diagnostic.detail {
                        eprintln!("    near: {detail}");
                    }
                }
                failures += 1;
            }
            Ok(Err(e)) => {
                eprintln!("{input}: {e}");
                failures += 1;
            }
            Err(_) => {
                eprintln!("{input}: task was dropped before completion");
                failures += 1;
            }
        }
    }

    kiln.queue.shutdown().await;
    if failures > 0 {
        process::exit(1);
    }
}
