//! mu-pager - inspect how a markup document paginates

use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use mu_pager::{Page, PageKind, PaginatedDocument, PaginationOptions, ReaderError};

#[derive(Parser)]
#[command(name = "mu-pager")]
#[command(version, about = "Paginate markup documents by character budget", long_about = None)]
#[command(after_help = "EXAMPLES:
    mu-pager paginate book.html           List pages and their blocks
    mu-pager toc book.html --pretty       Show the table of contents
    mu-pager page book.html 3             Print the markup of page 3
    mu-pager search book.html dragon      List pages matching a query")]
struct Cli {
    /// Characters per page
    #[arg(short, long, global = true, default_value_t = PaginationOptions::DEFAULT_MAX_CHARS)]
    budget: usize,

    /// Do not generate a table-of-contents page
    #[arg(long, global = true)]
    no_toc: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every page with its kind, size and source blocks
    Paginate {
        /// Markup file
        input: String,
    },
    /// Show table-of-contents entries
    Toc {
        /// Markup file
        input: String,
    },
    /// Print one page
    Page {
        /// Markup file
        input: String,
        /// Page index (0 is the TOC page when enabled)
        index: usize,
    },
    /// List pages matching a query
    Search {
        /// Markup file
        input: String,
        /// Case-insensitive text to look for
        query: String,
    },
}

#[derive(Serialize)]
struct PageSummary {
    index: usize,
    kind: &'static str,
    chars: usize,
    first_block: Option<usize>,
    last_block: Option<usize>,
}

#[derive(Serialize)]
struct PagesReport<'a> {
    input: &'a str,
    budget: usize,
    blocks: usize,
    pages: Vec<PageSummary>,
}

#[derive(Serialize)]
struct TocRow<'a> {
    title: &'a str,
    level: u8,
    page: usize,
}

#[derive(Serialize)]
struct PageReport<'a> {
    #[serde(flatten)]
    summary: PageSummary,
    html: &'a str,
}

#[derive(Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    matches: usize,
    pages: Vec<PageSummary>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Command::Paginate { input } => {
            let doc = load(cli, input)?;
            let report = PagesReport {
                input,
                budget: cli.budget,
                blocks: doc.block_count(),
                pages: doc.pages().iter().map(summarize).collect(),
            };
            print_json(&report, cli.pretty)
        }
        Command::Toc { input } => {
            let doc = load(cli, input)?;
            let rows: Vec<TocRow<'_>> = doc
                .toc()
                .iter()
                .map(|entry| TocRow {
                    title: &entry.title,
                    level: entry.level,
                    page: entry.target_page_index,
                })
                .collect();
            print_json(&rows, cli.pretty)
        }
        Command::Page { input, index } => {
            let doc = load(cli, input)?;
            let page = doc.page(*index).ok_or_else(|| {
                ReaderError::PageOutOfBounds {
                    index: *index,
                    page_count: doc.page_count(),
                }
                .to_string()
            })?;
            let report = PageReport {
                summary: summarize(page),
                html: &page.html,
            };
            print_json(&report, cli.pretty)
        }
        Command::Search { input, query } => {
            let doc = load(cli, input)?;
            let report = match doc.search(query) {
                Some(results) => SearchReport {
                    query,
                    matches: results.match_count,
                    pages: results
                        .pages
                        .iter()
                        .filter(|p| p.kind != PageKind::NoResults)
                        .map(summarize)
                        .collect(),
                },
                None => SearchReport {
                    query,
                    matches: 0,
                    pages: doc.pages().iter().map(summarize).collect(),
                },
            };
            print_json(&report, cli.pretty)
        }
    }
}

fn load(cli: &Cli, path: &str) -> Result<PaginatedDocument, String> {
    let markup = fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    let mut builder = PaginatedDocument::builder().with_budget(cli.budget);
    if cli.no_toc {
        builder = builder.without_toc();
    }
    builder.build(&markup).map_err(|e| format!("{path}: {e}"))
}

fn summarize(page: &Page) -> PageSummary {
    PageSummary {
        index: page.page_index,
        kind: match page.kind {
            PageKind::Toc => "toc",
            PageKind::Content => "content",
            PageKind::NoResults => "no-results",
            _ => "other",
        },
        chars: page.char_len(),
        first_block: page.source_blocks.map(|r| r.first),
        last_block: page.source_blocks.map(|r| r.last),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), String> {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!("{}", out.map_err(|e| e.to_string())?);
    Ok(())
}
