//! duke-xls CLI - inspect and rewrite BIFF8 workbooks

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use duke_xls::{WorkbookOptions, XlsDocument};
use duke_xls_records::{sid, Record};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "duke-xls")]
#[command(author, version, about = "BIFF8 (.xls) record-stream inspection tool")]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the record list of the workbook globals or of one sheet
    Records {
        /// Input .xls file
        input: PathBuf,

        /// Sheet index to dump (0-based, default: workbook globals)
        #[arg(short, long)]
        sheet: Option<usize>,
    },

    /// Show the structure of a workbook
    Info {
        /// Input .xls file
        input: PathBuf,
    },

    /// Read a workbook and write it back out
    Roundtrip {
        /// Input .xls file
        input: PathBuf,

        /// Output .xls file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Create a blank workbook
    New {
        /// Output .xls file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of sheets
        #[arg(long, default_value = "1")]
        sheets: usize,

        /// User name stored in WRITEACCESS
        #[arg(long)]
        username: Option<String>,

        /// Workbook options as JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Records { input, sheet } => dump_records(&input, sheet),
        Commands::Info { input } => show_info(&input),
        Commands::Roundtrip { input, output } => roundtrip(&input, &output),
        Commands::New {
            output,
            sheets,
            username,
            config,
        } => new_workbook(&output, sheets, username, config.as_deref()),
    }
}

fn open(input: &Path) -> Result<XlsDocument> {
    XlsDocument::read_file(input).with_context(|| format!("Failed to open '{}'", input.display()))
}

fn print_record(index: usize, record: &Record) {
    println!(
        "{:>6}  0x{:04X}  {:<16} {:>6}",
        index,
        record.sid(),
        record.name(),
        record.record_size()
    );
}

fn dump_records(input: &Path, sheet: Option<usize>) -> Result<()> {
    let doc = open(input)?;
    match sheet {
        None => {
            for (i, record) in doc.workbook().records().iter().enumerate() {
                print_record(i, record);
            }
        }
        Some(index) => {
            let sheet = doc
                .sheet(index)
                .with_context(|| format!("Sheet index {} not found", index))?;
            let mut i = 0;
            sheet.visit_serialized_records(0, &mut |record| {
                print_record(i, record);
                i += 1;
            });
        }
    }
    Ok(())
}

fn show_info(input: &Path) -> Result<()> {
    let doc = open(input)?;
    let wb = doc.workbook();

    println!("File: {}", input.display());
    println!("Globals records: {}", wb.num_records());
    println!(
        "Fonts: {}  XFs: {}  Formats: {}",
        wb.number_of_font_records(),
        wb.number_of_ex_formats(),
        wb.formats().len()
    );
    if let Some(sst) = wb.sst() {
        println!("Shared strings: {} unique, {} total", sst.num_unique_strings(), sst.num_strings);
    }
    println!("1904 dates: {}", wb.is_using_1904_date_windowing());
    println!("Write protected: {}", wb.is_write_protected());
    println!("Structure protected: {}", wb.is_structure_protected());
    println!(
        "Drawing group: {}",
        if wb.find_first_record_by_sid(sid::MSODRAWINGGROUP).is_some() {
            "present"
        } else {
            "none"
        }
    );

    println!();
    println!("Sheets: {}", wb.num_sheets());
    for (i, bound) in wb.bound_sheets().iter().enumerate() {
        println!("  Sheet {}: \"{}\" ({:?})", i, bound.sheet_name, bound.visibility);
        if let Some(sheet) = doc.sheet(i) {
            println!("    Cells: {}", sheet.cells().count());
            println!("    Merged regions: {}", sheet.num_merged_regions());
            println!("    Protected: {}", sheet.is_protected());
            if let Some(drawing) = sheet.drawing() {
                println!("    Drawing objects: {}", drawing.num_objects());
            }
        }
    }

    if wb.num_names() > 0 {
        println!();
        println!("Names: {}", wb.num_names());
        for name in wb.names() {
            let scope = match name.sheet_number {
                0 => "workbook".to_string(),
                n => wb.sheet_name(usize::from(n) - 1).unwrap_or("?").to_string(),
            };
            println!("  {} [{}]{}", name.name_text(), scope, if name.is_hidden() { " hidden" } else { "" });
        }
    }

    let refs = wb
        .link_table()
        .and_then(|lt| lt.extern_sheet())
        .map_or(0, |es| es.num_refs());
    if refs > 0 {
        println!();
        println!("Extern sheet entries: {}", refs);
        for i in 0..refs {
            match wb.external_sheet(i) {
                Some(ext) => println!(
                    "  {}: [{}] {}",
                    i,
                    ext.workbook_name,
                    ext.first_sheet_name.as_deref().unwrap_or("")
                ),
                None => println!(
                    "  {}: {}..{}",
                    i,
                    wb.find_sheet_first_name_from_extern_sheet(i).unwrap_or("?"),
                    wb.find_sheet_last_name_from_extern_sheet(i).unwrap_or("?")
                ),
            }
        }
    }

    Ok(())
}

fn roundtrip(input: &Path, output: &Path) -> Result<()> {
    let mut doc = open(input)?;
    doc.write_file(output)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    eprintln!("Wrote {} sheets to '{}'", doc.num_sheets(), output.display());
    Ok(())
}

fn load_options(config: Option<&Path>, username: Option<String>) -> Result<WorkbookOptions> {
    let mut options = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid options in '{}'", path.display()))?
        }
        None => WorkbookOptions::default(),
    };
    if let Some(username) = username {
        options = options.with_username(username);
    }
    Ok(options)
}

fn new_workbook(output: &Path, sheets: usize, username: Option<String>, config: Option<&Path>) -> Result<()> {
    if sheets == 0 {
        bail!("A workbook needs at least one sheet");
    }
    let options = load_options(config, username)?;
    let mut doc = XlsDocument::new(&options).context("Failed to create workbook")?;
    for i in 1..sheets {
        doc.create_sheet(&options.sheet_name(i))
            .with_context(|| format!("Failed to add sheet {}", i))?;
    }
    doc.write_file(output)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    eprintln!("Wrote {} sheets to '{}'", sheets, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_file_fills_missing_fields_and_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "sheet_name_prefix": "Tab", "username": "from-file" }"#).unwrap();

        let options = load_options(Some(&path), Some("flag".to_string())).unwrap();
        assert_eq!(options.username, "flag");
        assert_eq!(options.sheet_name_prefix, "Tab");
        assert_eq!(options.country, 1);
    }

    #[test]
    fn new_then_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("new.xls");
        let second = dir.path().join("copy.xls");
        new_workbook(&first, 3, None, None).unwrap();
        roundtrip(&first, &second).unwrap();

        let doc = XlsDocument::read_file(&second).unwrap();
        assert_eq!(doc.num_sheets(), 3);
        assert_eq!(doc.workbook().sheet_name(2), Some("Sheet3"));
    }
}
