use std::path::{Path, PathBuf};

use tracing_subscriber::{EnvFilter, fmt};
use vsdview::{ConvertConfig, ConvertError, Document};

const LOG_ENV: &str = "VSDVIEW_LOG";

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Convert(ConvertError),
    Json(serde_json::Error),
    PageNotFound { page: usize, count: usize },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Convert(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::PageNotFound { page, count } => {
                write!(f, "page {page} not found (document has {count} pages)")
            }
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConvertError> for CliError {
    fn from(value: ConvertError) -> Self {
        Self::Convert(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Command {
    #[default]
    Convert,
    Pages,
    Text,
    Search(String),
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    out_dir: Option<PathBuf>,
    /// 1-based.
    page: Option<usize>,
    media_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagram_id: Option<String>,
    strict: bool,
    pretty: bool,
}

fn usage() -> &'static str {
    "vsdview-cli\n\
\n\
USAGE:\n\
  vsdview-cli [convert] [--out-dir <dir>] [--page <n>] [--media-dir <dir>] [--config <file>] [--id <diagram-id>] [--strict] <path>\n\
  vsdview-cli pages [--pretty] [--config <file>] [--strict] <path>\n\
  vsdview-cli text [--config <file>] [--strict] <path>\n\
  vsdview-cli search <query> [--config <file>] [--strict] <path>\n\
\n\
NOTES:\n\
  - convert writes <stem>-page<n>.svg per page into --out-dir (default: next to the input).\n\
  - convert --page <n> without --out-dir prints that page's SVG to stdout. Pages are 1-based.\n\
  - Embedded bitmaps are inlined as data: URIs unless --media-dir is given.\n\
  - --config reads a JSON { \"parse\": {...}, \"render\": {...} } file; VSDVIEW_CONFIG names a default.\n\
  - VSDVIEW_LOG sets the log filter (default: warn); logs go to stderr.\n\
  - .vsd/.vss/.vst (legacy binary) files are not supported.\n\
"
}

fn next_value<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<&'a String, CliError> {
    it.next().ok_or(CliError::Usage(usage()))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();
    let mut command_seen = false;

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "convert" | "pages" | "text" | "search" if !command_seen && args.input.is_none() => {
                command_seen = true;
                args.command = match a.as_str() {
                    "convert" => Command::Convert,
                    "pages" => Command::Pages,
                    "text" => Command::Text,
                    _ => Command::Search(next_value(&mut it)?.clone()),
                };
            }
            "--out-dir" => args.out_dir = Some(PathBuf::from(next_value(&mut it)?)),
            "--media-dir" => args.media_dir = Some(PathBuf::from(next_value(&mut it)?)),
            "--config" => args.config = Some(PathBuf::from(next_value(&mut it)?)),
            "--id" => args.diagram_id = Some(next_value(&mut it)?.clone()),
            "--page" => {
                let page = next_value(&mut it)?
                    .parse::<usize>()
                    .map_err(|_| CliError::Usage(usage()))?;
                if page == 0 {
                    return Err(CliError::Usage(usage()));
                }
                args.page = Some(page);
            }
            "--strict" => args.strict = true,
            "--pretty" => args.pretty = true,
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') => return Err(CliError::Usage(usage())),
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    if args.input.is_none() {
        return Err(CliError::Usage(usage()));
    }
    Ok(args)
}

fn init_logging() {
    let directives = std::env::var(LOG_ENV).unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let _ = subscriber.try_init();
}

fn load_config(args: &Args) -> Result<ConvertConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => ConvertConfig::load(path)?,
        None => ConvertConfig::from_env()?.unwrap_or_default(),
    };
    if args.strict {
        config.parse.strict = true;
    }
    if let Some(dir) = &args.media_dir {
        config.render.media_dir = Some(dir.clone());
    }
    if let Some(id) = &args.diagram_id {
        config.render.diagram_id = Some(vsdview::sanitize_svg_id(id));
    }
    Ok(config)
}

fn page_file_name(input: &Path, page: usize) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drawing".to_string());
    format!("{stem}-page{page}.svg")
}

fn run_convert(args: &Args, input: &Path, doc: &Document, config: &ConvertConfig) -> Result<(), CliError> {
    if let Some(page) = args.page {
        let svg = vsdview::convert_page(doc, page - 1, &config.render)?.ok_or(
            CliError::PageNotFound {
                page,
                count: doc.page_count(),
            },
        )?;
        match &args.out_dir {
            None => print!("{svg}"),
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(page_file_name(input, page));
                std::fs::write(&path, svg)?;
                println!("{}", path.display());
            }
        }
        return Ok(());
    }

    let out_dir = match &args.out_dir {
        Some(dir) => dir.clone(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&out_dir)?;
    for (i, svg) in vsdview::convert(doc, &config.render)?.iter().enumerate() {
        let path = out_dir.join(page_file_name(input, i + 1));
        std::fs::write(&path, svg)?;
        println!("{}", path.display());
    }
    Ok(())
}

fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(&args)?;
    let input = PathBuf::from(args.input.as_deref().unwrap_or_default());
    let doc = vsdview::open_path(&input, &config.parse)?;
    tracing::debug!(path = %input.display(), pages = doc.page_count(), "opened document");

    match &args.command {
        Command::Convert => run_convert(&args, &input, &doc, &config)?,
        Command::Pages => {
            let index = vsdview::page_index(&doc);
            if args.pretty {
                serde_json::to_writer_pretty(std::io::stdout().lock(), &index)?;
            } else {
                serde_json::to_writer(std::io::stdout().lock(), &index)?;
            }
            println!();
        }
        Command::Text => {
            for page in vsdview::extract_text(&doc) {
                println!("== {} ==", page.name);
                if !page.text.is_empty() {
                    println!("{page}");
                }
            }
        }
        Command::Search(query) => {
            for hit in vsdview::search_text(&doc, query) {
                println!(
                    "{}\t{}\t{}\t{}",
                    hit.page_index + 1,
                    hit.page_name,
                    hit.shape_id,
                    hit.text.replace('\n', " ")
                );
            }
        }
    }
    Ok(())
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    init_logging();

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("vsdview-cli")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn convert_is_the_default_command() {
        let args = parse_args(&argv(&["--page", "2", "a.vsdx"])).unwrap();
        assert_eq!(args.command, Command::Convert);
        assert_eq!(args.page, Some(2));
        assert_eq!(args.input.as_deref(), Some("a.vsdx"));
    }

    #[test]
    fn search_takes_the_query_before_the_path() {
        let args = parse_args(&argv(&["search", "router", "net.vsdx"])).unwrap();
        assert_eq!(args.command, Command::Search("router".to_string()));
        assert_eq!(args.input.as_deref(), Some("net.vsdx"));
    }

    #[test]
    fn a_file_named_like_a_command_is_still_an_input() {
        let args = parse_args(&argv(&["pages", "text"])).unwrap();
        assert_eq!(args.command, Command::Pages);
        assert_eq!(args.input.as_deref(), Some("text"));
    }

    #[test]
    fn bad_arguments_are_usage_errors() {
        for bad in [
            &["--page", "0", "a.vsdx"][..],
            &["--page", "x", "a.vsdx"],
            &["--bogus", "a.vsdx"],
            &["a.vsdx", "b.vsdx"],
            &["pages"],
            &["search"],
        ] {
            assert!(
                matches!(parse_args(&argv(bad)), Err(CliError::Usage(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn page_files_are_named_after_the_input_stem() {
        assert_eq!(page_file_name(Path::new("dir/net.vsdx"), 3), "net-page3.svg");
    }
}
