//! `corral list` - show managed containers

use anyhow::Result;

use super::definition::ListArgs;
use super::truncate;
use crate::config::Config;
use crate::container;
use crate::runtime::{self, RuntimeInterface};

/// Widest the free-form verbose columns may grow before being shortened.
const MAX_CELL_WIDTH: usize = 60;

pub fn run(args: ListArgs) -> Result<()> {
    let config = Config::load_or_default();
    let runtime = runtime::detect(config.runtime_preference())?;

    let containers = runtime.list_managed()?;
    if containers.is_empty() {
        println!("No corral-managed containers running");
        return Ok(());
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for c in &containers {
        let label = |key: &str| c.labels.get(key).cloned().unwrap_or_default();
        let mut row = vec![
            c.name.clone(),
            c.status.clone(),
            label(container::LABEL_PROJECT),
            label(container::LABEL_WORKTREE),
        ];
        if args.verbose {
            row.push(truncate(&label(container::LABEL_HOST_PATH), MAX_CELL_WIDTH));
            row.push(truncate(
                &label(container::LABEL_LAUNCH_COMMAND),
                MAX_CELL_WIDTH,
            ));
        }
        rows.push(row);
    }

    let mut header = vec!["CONTAINER", "STATUS", "PROJECT", "WORKTREE"];
    if args.verbose {
        header.push("HOST PATH");
        header.push("COMMAND");
    }

    print_table(&header, &rows);
    Ok(())
}

fn print_table(header: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("   ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(header.to_vec()));
    for row in rows {
        println!("{}", render(row.iter().map(String::as_str).collect()));
    }
}
