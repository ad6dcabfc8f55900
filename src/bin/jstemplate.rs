//! Command-line interface for jstemplate
//!
//! Renders markup files against JSON data and inspects the bindings they
//! contain.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jstemplate::annotation::{Binding, BindingForm, LITERAL_REFERENCE_PREFIX};
use jstemplate::compiler::{split_list, split_sequence};
use jstemplate::dom::Document;
use jstemplate::{AnnotationCache, Engine, EngineConfig, ExpressionCompiler, parse};
use serde_json::Value;
use std::fmt::Write;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "jstemplate")]
#[command(about = "Render attribute-driven templates against JSON data")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON file with engine configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a markup file with JSON data
    Render {
        /// Markup file containing the template
        markup: PathBuf,
        /// JSON data file (reads from stdin if not provided)
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// JSON file with parent data; exposed as `$top`
        #[arg(long)]
        parent_data: Option<PathBuf>,
        /// Render only the element with this id instead of the whole document
        #[arg(short, long)]
        template: Option<String>,
        /// Render a copy of the template and print only the copy
        #[arg(long, requires = "template")]
        clone: bool,
        /// Render the result this many times, to inspect re-render behaviour
        #[arg(long, default_value = "1")]
        passes: usize,
    },
    /// Compile every binding of a markup file and report errors
    Check {
        /// Markup file to check
        markup: PathBuf,
        /// Suppress the summary line
        #[arg(short, long)]
        quiet: bool,
    },
    /// List the distinct annotation sets of a markup file
    Fingerprints {
        /// Markup file to inspect
        markup: PathBuf,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => serde_json::from_str(&read_file(path)?)
            .with_context(|| format!("invalid configuration in '{}'", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Render {
            markup,
            data,
            parent_data,
            template,
            clone,
            passes,
        } => {
            let output = handle_render(
                config,
                &markup,
                data.as_deref(),
                parent_data.as_deref(),
                template.as_deref(),
                clone,
                passes,
            )?;
            println!("{output}");
            Ok(())
        }
        Commands::Check { markup, quiet } => handle_check(&config, &markup, quiet),
        Commands::Fingerprints { markup } => handle_fingerprints(&config, &markup),
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read '{}'", path.display()))
}

fn read_json(path: Option<&Path>) -> Result<Value> {
    let text = match path {
        Some(path) => read_file(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("cannot read data from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&text).context("invalid JSON data")
}

fn load_document(source: &str) -> Result<Document> {
    Document::parse(source).context("cannot parse markup")
}

#[allow(clippy::too_many_arguments)]
fn handle_render(
    config: EngineConfig,
    markup: &Path,
    data: Option<&Path>,
    parent_data: Option<&Path>,
    template: Option<&str>,
    clone: bool,
    passes: usize,
) -> Result<String> {
    let source = read_file(markup)?;
    let data = read_json(data)?;
    let parent_data = parent_data.map(|path| read_json(Some(path))).transpose()?;
    render_markup(config, &source, data, parent_data, template, clone, passes)
        .with_context(|| format!("cannot render '{}'", markup.display()))
}

fn render_markup(
    config: EngineConfig,
    source: &str,
    data: Value,
    parent_data: Option<Value>,
    template: Option<&str>,
    clone: bool,
    passes: usize,
) -> Result<String> {
    let mut doc = load_document(source)?;
    let mut engine = Engine::with_config(config);

    let target = match template {
        Some(id) => engine
            .find_template(&mut doc, id)
            .with_context(|| format!("no element with id '{id}'"))?,
        None => doc.root(),
    };

    if clone {
        let copy = engine.render_clone(&mut doc, data, &target);
        return Ok(doc.outer_markup(copy));
    }

    for pass in 0..passes.max(1) {
        doc.reset_mutations();
        let stats = engine.render_with_parent(&mut doc, data.clone(), parent_data.clone(), &target, true);
        log::info!(
            "Pass {}: {} steps, {} mutations",
            pass + 1,
            stats.items,
            doc.mutations()
        );
    }
    Ok(doc.to_markup())
}

fn handle_check(config: &EngineConfig, markup: &Path, quiet: bool) -> Result<()> {
    let report = check_markup(config, &read_file(markup)?)?;
    for failure in &report.failures {
        println!("{failure}");
    }
    if !quiet {
        println!(
            "{} expressions checked, {} failed",
            report.checked,
            report.failures.len()
        );
    }
    if !report.failures.is_empty() {
        bail!("{} binding expressions failed to compile", report.failures.len());
    }
    Ok(())
}

/// Outcome of compiling every binding expression of a document
#[derive(Debug, Default)]
struct CheckReport {
    checked: usize,
    failures: Vec<String>,
}

fn check_markup(config: &EngineConfig, source: &str) -> Result<CheckReport> {
    let doc = load_document(source)?;
    let annotations = AnnotationCache::new(&config.attribute_prefix);
    let mut report = CheckReport::default();

    for node in doc.descendants(doc.root()) {
        for (binding, raw) in annotations.raw_bindings(&doc, &node) {
            for expression in expressions_of(binding, &raw) {
                report.checked += 1;
                if let Err(err) = parse(&expression) {
                    report.failures.push(format!(
                        "<{}> {}{}: '{}': {err}",
                        doc.tag_name(node).unwrap_or("?"),
                        config.attribute_prefix,
                        binding,
                        expression.trim()
                    ));
                }
            }
        }
    }
    Ok(report)
}

fn expressions_of(binding: Binding, raw: &str) -> Vec<String> {
    match binding.form() {
        BindingForm::Scalar => vec![raw.to_string()],
        BindingForm::List => split_list(raw)
            .into_iter()
            .filter_map(|token| token.split_once('=').map(|(_, expr)| expr.to_string()))
            .collect(),
        BindingForm::Sequence => split_sequence(raw).into_iter().map(str::to_string).collect(),
        BindingForm::Reference if !raw.starts_with(LITERAL_REFERENCE_PREFIX) => vec![raw.to_string()],
        BindingForm::Reference | BindingForm::Literal => Vec::new(),
    }
}

fn handle_fingerprints(config: &EngineConfig, markup: &Path) -> Result<()> {
    print!("{}", fingerprint_report(config, &read_file(markup)?)?);
    Ok(())
}

fn fingerprint_report(config: &EngineConfig, source: &str) -> Result<String> {
    let mut doc = load_document(source)?;
    let mut annotations = AnnotationCache::new(&config.attribute_prefix);
    let mut compiler = ExpressionCompiler::with_policy(config.compile_failure_policy);
    let root = doc.root();
    annotations.prime(&mut doc, &root, &mut compiler);

    let mut users = vec![0usize; annotations.stats().entries + 1];
    for node in doc.descendants(root) {
        if let Some(count) = annotations
            .slot_of(&doc, &node)
            .and_then(|slot| users.get_mut(slot as usize))
        {
            *count += 1;
        }
    }

    let mut out = String::new();
    for (set, count) in annotations.sets().zip(users.iter().skip(1)) {
        writeln!(out, "{count:>4}  {}", set.fingerprint)?;
    }
    let stats = annotations.stats();
    writeln!(
        out,
        "{} distinct sets, {} shared lookups ({:.1}% hit rate)",
        stats.entries,
        stats.hits,
        stats.hit_rate()
    )?;
    Ok(out)
}
