use std::{
    env,
    fs::File,
    io::{self, BufReader, Read},
    process,
};

use anyhow::{bail, Context, Result};
use dts_xref::{AnalysisError, Analyzer, ParseOptions, Report, Tree};
use flexi_logger::Logger;
use log::{debug, warn};

const USAGE: &str = "usage: dtgpio [--keep-disabled] [--dump] [--gpio-only] [FILE...]";

#[derive(Debug, Default)]
struct Args {
    keep_disabled: bool,
    dump: bool,
    gpio_only: bool,
    files: Vec<String>,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();

        for arg in args {
            match arg.as_str() {
                "--keep-disabled" => parsed.keep_disabled = true,
                "--dump" => parsed.dump = true,
                "--gpio-only" => parsed.gpio_only = true,
                "-h" | "--help" => {
                    println!("{USAGE}");
                    process::exit(0);
                }
                flag if flag.starts_with("--") => bail!("unknown option `{flag}`\n{USAGE}"),
                _ => parsed.files.push(arg),
            }
        }

        Ok(parsed)
    }
}

fn read_source(fname: Option<&str>) -> Result<String> {
    let reader: Box<dyn Read> = match fname {
        Some(fname) => Box::new(File::open(fname).with_context(|| format!("cannot open {fname}"))?),
        None => Box::new(io::stdin()),
    };

    let mut buf = String::new();
    BufReader::new(reader)
        .read_to_string(&mut buf)
        .with_context(|| format!("cannot read {}", fname.unwrap_or("<stdin>")))?;
    Ok(buf)
}

fn report(tree: &Tree, gpio_only: bool) -> Result<Report> {
    let analyzer = Analyzer::new(tree);
    if gpio_only {
        return Ok(analyzer.gpio_report()?);
    }

    match analyzer.report() {
        Err(AnalysisError::PlatformUnknown) => {
            warn!("unknown platform, pinctrl groups are not decoded");
            Ok(analyzer.gpio_report()?)
        }
        result => Ok(result?),
    }
}

fn analyze_file(fname: Option<&str>, args: &Args) -> Result<()> {
    let name = fname.unwrap_or("<stdin>");
    let source = read_source(fname)?;

    let options = ParseOptions {
        keep_disabled: args.keep_disabled,
    };
    let tree = dts_xref::parse(&source, options).with_context(|| format!("{name}: parse error"))?;
    debug!("{name}: parsed {} nodes", tree.descendants(tree.root()).count());

    if args.dump {
        print!("{}", tree.dump(args.keep_disabled)?);
    } else {
        print!("{}", report(&tree, args.gpio_only).with_context(|| name.to_string())?);
    }

    Ok(())
}

fn run() -> Result<()> {
    let _logger = Logger::try_with_env_or_str("warn")?.start()?;

    let args = Args::parse(env::args().skip(1))?;
    if args.files.is_empty() {
        return analyze_file(None, &args);
    }
    for fname in &args.files {
        analyze_file(Some(fname), &args)?;
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        process::exit(-1);
    }
}
