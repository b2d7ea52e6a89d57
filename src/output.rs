use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ActionResult, ProgressEvent, ProgressSink};
use crate::store::ProjectInfo;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_result(result: &ActionResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints progress lines as they happen.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => println!("{}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_project(info: &ProjectInfo) {
        println!("FandanGO project info:\n");
        let rows = info
            .rows
            .iter()
            .map(|row| {
                vec![
                    row.project_name.clone(),
                    row.key.clone(),
                    row.value.clone().unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>();
        print!("{}", render_table(&info.columns, &rows));
    }

    pub fn print_summary(result: &ActionResult) {
        let green = "\x1b[32m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        if result.success {
            println!("{green}done{reset}");
        } else {
            println!("{red}failed{reset}");
        }
    }
}

/// Bordered text table: header row, separator, one line per row, centered cells.
/// Multi-line values keep only their first line plus an ellipsis.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let cells = |row: &[String]| -> Vec<String> {
        (0..headers.len())
            .map(|index| cell_text(row.get(index).map(String::as_str).unwrap_or("")))
            .collect()
    };
    let header_cells = cells(headers);
    let body = rows.iter().map(|row| cells(row)).collect::<Vec<_>>();

    let widths = (0..headers.len())
        .map(|index| {
            std::iter::once(&header_cells)
                .chain(body.iter())
                .map(|row| row[index].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();

    let border = {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };
    let format_row = |row: &[String]| {
        let mut line = String::from("|");
        for (cell, width) in row.iter().zip(&widths) {
            let width = *width;
            line.push_str(&format!(" {cell:^width$} |"));
        }
        line.push('\n');
        line
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push_str(&format_row(&header_cells));
    out.push_str(&border);
    for row in &body {
        out.push_str(&format_row(row));
    }
    out.push_str(&border);
    out
}

fn cell_text(value: &str) -> String {
    let mut lines = value.lines();
    let first = lines.next().unwrap_or("");
    if lines.next().is_some() {
        format!("{first} ...")
    } else {
        first.to_string()
    }
}
