use chrono::Local;
use exocortex_core::app::{open_database, today_tag_name};
use exocortex_core::config::{ConfigStore, ExoConfig};
use exocortex_core::links::{split_spans, Span};
use exocortex_core::{Row, Snapshot};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct DumpArgs {
    db_path: Option<PathBuf>,
    tag: Option<String>,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<DumpArgs, String> {
    let mut parsed = DumpArgs::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => {
                let value = iter.next().ok_or_else(|| "Missing --db value".to_string())?;
                parsed.db_path = Some(PathBuf::from(value));
            }
            "--tag" => {
                let value = iter.next().ok_or_else(|| "Missing --tag value".to_string())?;
                parsed.tag = Some(value.to_string());
            }
            "--json" => parsed.json = true,
            "--help" | "-h" => return Err(String::new()),
            _ => return Err(format!("Unknown argument: {arg}")),
        }
    }
    Ok(parsed)
}

fn init_tracing(config: &ExoConfig) {
    let filter = EnvFilter::try_from_env("EXO_LOG")
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn render_text(text: &str) -> String {
    split_spans(text)
        .into_iter()
        .map(|span| match span {
            Span::Text(text) => text.to_string(),
            Span::Link(name) => format!("<{name}>"),
        })
        .collect()
}

fn print_rows(rows: &[Row], indent: &str) {
    for row in rows {
        println!("{indent}{:>3}. {}", row.rank, render_text(&row.text));
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("# {}", snapshot.current_tag.name);
    if snapshot.current_rows.is_empty() {
        println!("  (no rows)");
    }
    print_rows(&snapshot.current_rows, "  ");

    if !snapshot.sorted_ref_tags.is_empty() {
        println!();
        println!("## linked from");
        for tag in &snapshot.sorted_ref_tags {
            println!("  {}", tag.name);
            if let Some(rows) = snapshot.current_refs.rows_from(tag.id) {
                print_rows(rows, "    ");
            }
        }
    }

    println!();
    println!("## recent tags");
    for tag in snapshot.all_tags.iter().take(10) {
        println!("  {}", tag.name);
    }
}

fn main() {
    let args = std::env::args().collect::<Vec<_>>();
    let parsed = match parse_args(&args) {
        Ok(value) => value,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            eprintln!("Usage: exo-dump [--db <path>] [--tag <name>] [--json]");
            std::process::exit(1);
        }
    };

    let store = match ConfigStore::default_store() {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Failed to locate config: {err}");
            std::process::exit(1);
        }
    };
    let config = match store.load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to read {}: {err}", store.config_path().display());
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    let db_path = parsed
        .db_path
        .unwrap_or_else(|| store.database_path(&config));
    let db = match open_database(&db_path, &config) {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Failed to open {}: {err}", db_path.display());
            std::process::exit(1);
        }
    };

    let name = parsed
        .tag
        .unwrap_or_else(|| today_tag_name(Local::now().date_naive(), &config.today_format));
    let tag = match db.get_tag_by_name(&name) {
        Ok(tag) => tag,
        Err(err) if err.is_not_found() => {
            println!("Nothing recorded under {name:?}");
            return;
        }
        Err(err) => {
            eprintln!("Lookup failed: {err}");
            std::process::exit(1);
        }
    };

    let snapshot = match db.snapshot(tag.id) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("Snapshot failed: {err}");
            std::process::exit(1);
        }
    };

    if parsed.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Failed to encode snapshot: {err}");
                std::process::exit(1);
            }
        }
    } else {
        print_snapshot(&snapshot);
    }
}
