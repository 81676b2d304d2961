use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use rustyline::{error::ReadlineError, Editor};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use relcalc::engine::{Engine, Limits, TableStore};
use relcalc::value::{is_valid_table_name, Tuple};
use relcalc::Error;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "relcalc",
    about = "Tuple-calculus query REPL over in-memory tables"
)]
struct Opt {
    /// File defining one table per line: NAME=[{"attr": value, ...}, ...]
    #[structopt(short, long, parse(from_os_str))]
    tables: Option<PathBuf>,

    /// Ceiling on materialized variable combinations per query
    #[structopt(long)]
    max_combinations: Option<u64>,
}

fn load_tables(text: &str) -> Result<TableStore> {
    let mut store = TableStore::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, json) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("line {}: expected NAME=[...]", idx + 1))?;
        let name = name.trim();
        if !is_valid_table_name(name) {
            return Err(anyhow!(
                "line {}: invalid table name {:?}; use letters, digits and underscores, starting with a letter",
                idx + 1,
                name
            ));
        }
        let table = relcalc::parse_table(json.trim())
            .with_context(|| format!("line {}: table {}", idx + 1, name))?;
        store.insert(name.to_string(), table);
    }
    Ok(store)
}

fn render(rows: &[Tuple]) -> String {
    if rows.is_empty() {
        return "no rows".to_string();
    }

    // Column order is first appearance across all rows.
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|header| {
                    row.get(*header)
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    out.push_str(
        &headers
            .iter()
            .enumerate()
            .map(|(i, header)| format!("{:<width$}", header, width = widths[i]))
            .join(" | "),
    );
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).join("-+-"));
    for row in &cells {
        out.push('\n');
        out.push_str(
            &row.iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .join(" | "),
        );
    }
    out.push_str(&format!("\n({} rows)", rows.len()));
    out
}

/// Map error kinds to a usage hint, the way the original UI keyed its help
/// text off the failure class.
fn hint(error: &Error) -> Option<&'static str> {
    match error {
        Error::Format(_) => Some("tables are JSON arrays of flat records, e.g. [{\"id\": 1, \"nombre\": \"Juan\"}]"),
        Error::QueryFormat(_) => Some("example: {e.nombre | EMPLEADO(e) AND e.edad > 25}"),
        Error::UnknownTable { .. } => Some("table names in the query must match the names defined in the tables file"),
        Error::NoBinding => Some("bind every variable with `var ∈ TABLE` or `TABLE(var)`"),
        _ => None,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();
    let store = match &opt.tables {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            load_tables(&text)?
        }
        None => TableStore::new(),
    };

    if store.is_empty() {
        println!("no tables loaded; start with --tables FILE to query data");
    } else {
        println!("tables: {}", store.keys().join(", "));
    }

    let limits = match opt.max_combinations {
        Some(max_combinations) => Limits { max_combinations },
        None => Limits::default(),
    };
    let engine = Engine::with_limits(store, limits);

    let mut editor = Editor::<()>::new();
    loop {
        let readline = editor.readline("> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(line.as_str());

                match engine.execute(&line) {
                    Ok(rows) => {
                        println!("{}", render(&rows));
                    }
                    Err(e) => {
                        println!("Error: {}", e);
                        if let Some(hint) = hint(&e) {
                            println!("Hint: {}", hint);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    Ok(())
}
