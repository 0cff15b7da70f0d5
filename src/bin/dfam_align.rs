use anyhow::{Context, Result, anyhow};
use dfam_align::{
    AlignmentRequest, SearchError, SearchRequest, Searcher,
    config::SearchConfig,
    pool::SearchPool,
    store::FileSequenceStore,
    version_cli_text,
};
use log::info;
use serde::Serialize;
use std::{env, fs, sync::Arc};

const DEFAULT_CATALOG_PATH: &str = "dfam_catalog.json";

fn usage() {
    eprintln!(
        "Usage:\n  \
  dfam_align --version\n  \
  dfam_align [--config PATH] [--catalog PATH] relationships ACCESSION\n  \
  dfam_align [--config PATH] [--catalog PATH] self-alignment ACCESSION\n  \
  dfam_align [--config PATH] [--catalog PATH] protein ACCESSION\n  \
  dfam_align [--config PATH] [--catalog PATH] tandem ACCESSION\n  \
  dfam_align [--config PATH] [--catalog PATH] align ASSEMBLY CHROM START END FAMILY\n  \
  dfam_align [--config PATH] [--catalog PATH] batch '<request-list-json>'\n  \
  dfam_align [--config PATH] check-config\n\n  \
  Tip: pass @file.json instead of inline JSON"
    );
}

struct GlobalArgs {
    config: Option<String>,
    catalog: String,
    cmd_idx: usize,
}

fn parse_global_args(args: &[String]) -> Result<GlobalArgs> {
    let mut global = GlobalArgs {
        config: None,
        catalog: DEFAULT_CATALOG_PATH.to_string(),
        cmd_idx: 1,
    };
    while global.cmd_idx < args.len() {
        let flag = args[global.cmd_idx].as_str();
        if flag != "--config" && flag != "--catalog" {
            break;
        }
        let value = args
            .get(global.cmd_idx + 1)
            .cloned()
            .ok_or_else(|| anyhow!("Missing value for {flag}"))?;
        if flag == "--config" {
            global.config = Some(value);
        } else {
            global.catalog = value;
        }
        global.cmd_idx += 2;
    }
    Ok(global)
}

fn load_json_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Could not read JSON file '{path}'"))
        }
        None => Ok(value.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn accession_arg(args: &[String], idx: usize, command: &str) -> Result<String> {
    args.get(idx).cloned().ok_or_else(|| {
        usage();
        anyhow!("Missing accession for {command}")
    })
}

fn coordinate_arg(value: &str, what: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|e| SearchError::invalid_input(format!("Invalid {what} '{value}': {e}")).into())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        match e.downcast_ref::<SearchError>() {
            Some(err) => eprintln!("error (status {}): {err}", err.http_status()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err(anyhow!("Missing command"));
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", version_cli_text());
        return Ok(());
    }

    let global = parse_global_args(&args)?;
    let Some(command) = args.get(global.cmd_idx) else {
        usage();
        return Err(anyhow!("Missing command"));
    };
    let config_path = SearchConfig::effective_config_path(global.config.as_deref());
    let config = SearchConfig::from_json_file(&config_path)?;

    if command == "check-config" {
        config.validate()?;
        info!("Configuration '{config_path}' is valid");
        return print_json(&config);
    }

    let store = FileSequenceStore::from_json_file(&global.catalog)?;
    let searcher = Searcher::new(config, Arc::new(store));
    let first = global.cmd_idx + 1;

    let request = match command.as_str() {
        "relationships" => SearchRequest::Relationships {
            accession: accession_arg(&args, first, command)?,
        },
        "self-alignment" => SearchRequest::SelfAlignment {
            accession: accession_arg(&args, first, command)?,
        },
        "protein" => SearchRequest::Protein {
            accession: accession_arg(&args, first, command)?,
        },
        "tandem" => SearchRequest::TandemRepeats {
            accession: accession_arg(&args, first, command)?,
        },
        "align" => {
            if args.len() < first + 5 {
                usage();
                return Err(anyhow!("align requires: ASSEMBLY CHROM START END FAMILY"));
            }
            SearchRequest::Alignment(AlignmentRequest {
                assembly: args[first].clone(),
                chrom: args[first + 1].clone(),
                start: coordinate_arg(&args[first + 2], "start")?,
                end: coordinate_arg(&args[first + 3], "end")?,
                family: args[first + 4].clone(),
            })
        }
        "batch" => {
            let json = load_json_arg(
                args.get(first)
                    .ok_or_else(|| anyhow!("Missing request list for batch"))?,
            )?;
            let requests: Vec<SearchRequest> =
                serde_json::from_str(&json).map_err(SearchError::from)?;
            let pool = SearchPool::from_searcher(searcher)?;
            info!(
                "Running {} searches on {} worker threads",
                requests.len(),
                pool.threads()
            );
            let results: Vec<serde_json::Value> = pool
                .run_all(&requests)
                .into_iter()
                .map(|result| match result {
                    Ok(response) => serde_json::json!({ "ok": response }),
                    Err(err) => serde_json::json!({ "status": err.http_status(), "error": err }),
                })
                .collect();
            return print_json(&results);
        }
        other => {
            usage();
            return Err(anyhow!("Unknown command '{other}'"));
        }
    };

    let pool = SearchPool::from_searcher(searcher)?;
    let response = pool.run(&request)?;
    print_json(&response)
}
