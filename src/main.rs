use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use html2odf::{CellEntry, Options, PageLayout, Spreadsheet, TextDocument};
use log::{info, LevelFilter};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON file with converter options.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Convert the HTML as given, without sanitizing it.
    #[arg(long, global = true)]
    trust_html: bool,

    /// Font color of inserted text, e.g. `#008800`.
    #[arg(long, global = true)]
    color_ins: Option<String>,

    /// Font color of deleted text.
    #[arg(long, global = true)]
    color_del: Option<String>,

    /// More log output; repeat for trace level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill a text document template with HTML, one page per input file.
    Text {
        #[arg(long)]
        template: PathBuf,

        #[arg(long)]
        out: PathBuf,

        /// HTML fragment files; each one starts a new page.
        #[arg(long = "html-file")]
        html_files: Vec<PathBuf>,

        /// Use the line-numbered paragraph styles.
        #[arg(long)]
        line_numbered: bool,

        /// Template text replacement applied to every page.
        #[arg(long = "replace", value_name = "KEY=VALUE")]
        replacements: Vec<String>,
    },
    /// Render a JSON cell job into a spreadsheet template.
    Sheet {
        #[arg(long)]
        template: PathBuf,

        /// Job file with column widths and cells.
        #[arg(long)]
        cells: PathBuf,

        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "kebab-case")]
struct SheetJob {
    column_widths: BTreeMap<usize, f64>,
    row_heights: BTreeMap<usize, f64>,
    cells: Vec<CellEntry>,
    page: Option<PageLayout>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = env_logger::builder().filter_module("html2odf", level).try_init();
}

fn load_options(common: &CommonArgs) -> Result<Options> {
    let mut options = match &common.config {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("open {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?
        }
        None => Options::default(),
    };
    if common.trust_html {
        options.trust_html = true;
    }
    if let Some(c) = &common.color_ins {
        options.color_ins = c.clone();
    }
    if let Some(c) = &common.color_del {
        options.color_del = c.clone();
    }
    Ok(options)
}

fn write_output(out: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(out, bytes).with_context(|| format!("write {}", out.display()))?;
    info!("wrote {}", out.display());
    Ok(())
}

fn run_text(
    options: Options,
    template: &Path,
    out: &Path,
    html_files: &[PathBuf],
    line_numbered: bool,
    replacements: &[String],
) -> Result<()> {
    let mut doc = TextDocument::open(template, options).with_context(|| format!("open {}", template.display()))?;
    for (i, file) in html_files.iter().enumerate() {
        if i > 0 {
            doc.next_page();
        }
        for pair in replacements {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("replacement {pair:?} is not KEY=VALUE"))?;
            doc.add_replace(key, value)?;
        }
        let html = fs::read_to_string(file).with_context(|| format!("open {}", file.display()))?;
        doc.add_html_text_block(&html, line_numbered);
    }
    let bytes = doc.finish_and_get_document().context("build text document")?;
    write_output(out, &bytes)
}

fn run_sheet(options: Options, template: &Path, cells: &Path, out: &Path) -> Result<()> {
    let raw = fs::read_to_string(cells).with_context(|| format!("open {}", cells.display()))?;
    let job: SheetJob = serde_json::from_str(&raw).with_context(|| format!("parse {}", cells.display()))?;

    let mut sheet = Spreadsheet::open(template, options).with_context(|| format!("open {}", template.display()))?;
    for (col, width) in job.column_widths {
        sheet.set_column_width(col, width);
    }
    for (row, lines) in job.row_heights {
        sheet.set_min_row_height(row, lines);
    }
    for entry in job.cells {
        sheet.insert_cell(entry);
    }
    if let Some(page) = job.page {
        if let (Some(w), Some(h), Some(o)) = (&page.width, &page.height, &page.orientation) {
            sheet.set_page_orientation(w, h, o);
        }
        if let (Some(t), Some(l), Some(r), Some(b)) =
            (&page.margin_top, &page.margin_left, &page.margin_right, &page.margin_bottom)
        {
            sheet.set_margins(t, l, r, b);
        }
    }
    let bytes = sheet.finish_and_get_document().context("build spreadsheet")?;
    write_output(out, &bytes)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.common.verbose);
    let options = load_options(&cli.common)?;

    match cli.command {
        Command::Text {
            template,
            out,
            html_files,
            line_numbered,
            replacements,
        } => {
            if html_files.is_empty() {
                return Err(anyhow!("at least one --html-file is required"));
            }
            run_text(options, &template, &out, &html_files, line_numbered, &replacements)
        }
        Command::Sheet { template, cells, out } => run_sheet(options, &template, &cells, &out),
    }
}
