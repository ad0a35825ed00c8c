use anyhow::Context;
use clap::Parser;
use percolate_core::compiler::{CompileError, Compiler, PassthroughCompiler};
use percolate_core::concat::ConcatError;
use percolate_core::config::{BundleOptions, CliOverrides, PercolateConfig, CONFIG_FILE_NAME};
use percolate_core::di::Container;
use percolate_core::diagnostics::Diagnostic;
use percolate_core::fingerprint::SourceFingerprints;
use percolate_core::source::{DirectorySource, ModuleEnumerator, SourceProvider};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Percolate - dependency-ordered concatenation and cached compilation of CoffeeScript modules
#[derive(Parser, Debug, Clone)]
#[command(name = "percolate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Modules to compile one file at a time (paths or glob patterns under the source root)
    #[arg(value_name = "FILE")]
    files: Vec<String>,

    /// Path to percolate.yaml configuration file
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// Initialize a new Percolate project
    #[arg(long)]
    init: bool,

    /// Directory module identifiers are relative to
    #[arg(long, value_name = "DIR")]
    source_root: Option<String>,

    /// Suffix of module files (default: coffee)
    #[arg(long, value_name = "EXT")]
    source_extension: Option<String>,

    /// Pattern naming the bundle's root module(s)
    #[arg(long, value_name = "PATTERN")]
    bundle_root: Option<String>,

    /// Pattern naming every module the bundle may draw on
    #[arg(long, value_name = "PATTERN")]
    include: Option<String>,

    /// Output file for the bundle
    #[arg(long, value_name = "FILE")]
    out_file: Option<String>,

    /// Output directory for individually compiled files
    #[arg(long, value_name = "DIR")]
    out_dir: Option<String>,

    /// Compiler command line, fed the source on stdin (default: "coffee --stdio --print --bare")
    #[arg(long, value_name = "CMD")]
    compiler: Option<String>,

    /// Write concatenated sources without compiling them
    #[arg(long)]
    concat_only: bool,

    /// Watch sources for changes
    #[arg(short, long)]
    watch: bool,

    /// Maximum number of cached compilations (default: 100)
    #[arg(long, value_name = "N")]
    cache_size: Option<usize>,

    /// Seconds a cached compilation stays valid (default: 600)
    #[arg(long, value_name = "SECS")]
    cache_ttl_secs: Option<u64>,

    /// Pretty print diagnostics (default: true)
    #[arg(long, value_name = "BOOL")]
    pretty: Option<bool>,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    // Set RUST_LOG=debug for detailed logs, RUST_LOG=info for normal output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    if cli.init {
        init_project()?;
        return Ok(());
    }

    let mut config = load_config(&cli)?;

    if config.files.is_empty() && config.bundle.is_none() {
        eprintln!("Error: No input files specified. Use --help for usage information.");
        std::process::exit(1);
    }

    info!("Source root: {}", config.source_root);
    debug!("Watch mode: {}", cli.watch);

    if cli.watch {
        // Watcher events carry absolute paths
        config.source_root = std::fs::canonicalize(&config.source_root)
            .with_context(|| format!("Source root {} not found", config.source_root))?
            .to_string_lossy()
            .into_owned();
        let container = Container::new(config);
        return watch_mode(&container, cli.concat_only);
    }

    let container = Container::new(config);
    let report = build(&container, cli.concat_only)?;
    if report.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize a new Percolate project with a configuration file
fn init_project() -> anyhow::Result<()> {
    println!("Initializing new Percolate project...");

    let config_path = Path::new(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!("{} already exists", CONFIG_FILE_NAME);
    }
    PercolateConfig::init_file(config_path)?;
    println!("Created {}", CONFIG_FILE_NAME);

    std::fs::create_dir_all("src")?;
    println!("Created src/ directory");

    let main = r#"# Welcome to Percolate!
#= require <greeter.coffee>

new Greeter("World").greet()
"#;
    let greeter = r#"class Greeter
  constructor: (@name) ->

  greet: ->
    console.log "Hello, #{@name}!"
"#;

    std::fs::write("src/main.coffee", main)?;
    std::fs::write("src/greeter.coffee", greeter)?;
    println!("Created src/main.coffee and src/greeter.coffee");

    println!("\nProject initialized successfully!");
    println!("Run 'percolate' to build dist/app.js.");

    Ok(())
}

/// Load configuration from file (if any) and apply command line overrides
fn load_config(cli: &Cli) -> anyhow::Result<PercolateConfig> {
    let mut config = if let Some(ref project_path) = cli.project {
        PercolateConfig::from_file(project_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?
    } else {
        let default_path = PathBuf::from(CONFIG_FILE_NAME);
        if default_path.exists() {
            PercolateConfig::from_file(&default_path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", CONFIG_FILE_NAME, e))?
        } else {
            PercolateConfig::default()
        }
    };

    let mut overrides = CliOverrides {
        source_root: cli.source_root.clone(),
        source_extension: cli.source_extension.clone(),
        bundle_root: cli.bundle_root.clone(),
        bundle_include: cli.include.clone(),
        bundle_out_file: cli.out_file.clone(),
        out_dir: cli.out_dir.clone(),
        cache_max_entries: cli.cache_size,
        cache_time_to_live_secs: cli.cache_ttl_secs,
        pretty: cli.pretty,
        ..CliOverrides::default()
    };

    if !cli.files.is_empty() {
        overrides.files = Some(cli.files.clone());
    }

    if let Some(ref command_line) = cli.compiler {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(command) = parts.next() else {
            anyhow::bail!("--compiler needs a command");
        };
        overrides.compiler_command = Some(command);
        overrides.compiler_args = Some(parts.collect());
    }

    config.merge(&overrides);

    Ok(config)
}

/// What one build did
#[derive(Debug, Default)]
struct BuildReport {
    compiled: usize,
    failed: usize,
    /// Missing-reference diagnostics reported during this build
    warnings: usize,
    /// Roots and pool the bundle was built from
    bundle_pool: FxHashSet<String>,
}

fn make_compiler(config: &PercolateConfig, concat_only: bool) -> Box<dyn Compiler + Send> {
    if concat_only {
        Box::new(PassthroughCompiler)
    } else {
        Box::new(config.compiler.to_compiler())
    }
}

/// Compile the configured files and bundle, writing every output that succeeded
fn build(container: &Container, concat_only: bool) -> anyhow::Result<BuildReport> {
    use rayon::prelude::*;

    let config = container.config();
    let source = container.source();
    let cache = container.cache();
    let mut report = BuildReport::default();
    // The handler outlives a build in watch mode
    let warnings_before = container.warning_count();

    let mut ids = Vec::new();
    for pattern in &config.files {
        let matched = source.enumerate(pattern)?;
        if matched.is_empty() {
            warn!("No modules match {}", pattern);
        }
        ids.extend(matched);
    }
    ids.sort();
    ids.dedup();

    info!("Compiling {} file(s)...", ids.len());

    // Each rayon worker owns one compiler
    let results: Vec<(String, Result<Arc<str>, CompileError>)> = ids
        .par_iter()
        .map_init(
            || make_compiler(config, concat_only),
            |compiler, id| {
                let output = cache.get_or_compile(id, compiler, || source.read(id));
                (id.clone(), output)
            },
        )
        .collect();

    // Process results sequentially for deterministic output and error reporting
    for (id, output) in results {
        match output {
            Ok(js) => {
                write_output(&output_path(config, &source, &id), &js)?;
                report.compiled += 1;
            }
            Err(error) => {
                report.failed += 1;
                print_compile_error(&error, config.pretty);
            }
        }
    }

    if let Some(ref bundle) = config.bundle {
        let mut compiler = make_compiler(config, concat_only);
        build_bundle(container, bundle, &source, compiler.as_mut(), &mut report)?;
    }

    report.warnings = container.warning_count() - warnings_before;

    if report.failed > 0 {
        warn!(
            "Build finished with errors: {} compiled, {} failed, {} warning(s)",
            report.compiled, report.failed, report.warnings
        );
    } else {
        info!(
            "Build completed successfully: {} output(s), {} warning(s)",
            report.compiled, report.warnings
        );
    }

    Ok(report)
}

/// Concatenate the bundle's modules and compile them as one unit, keyed by the output file
fn build_bundle(
    container: &Container,
    bundle: &BundleOptions,
    source: &DirectorySource,
    compiler: &mut dyn Compiler,
    report: &mut BuildReport,
) -> anyhow::Result<()> {
    let roots = source.enumerate(&bundle.root)?;
    if roots.is_empty() {
        warn!("No root modules match {}", bundle.root);
    }
    let pool = source.enumerate(&bundle.include)?;
    report.bundle_pool = roots.iter().chain(&pool).cloned().collect();

    let cache = container.cache();
    let key = bundle.out_file.as_str();

    let output = match cache.get(key) {
        Some(output) => {
            debug!("Bundle {} is cached", key);
            Ok(output)
        }
        None => match container.concatenator().concatenate(&roots, &pool, source) {
            Ok(text) => cache.get_or_compile(key, compiler, move || Ok(text)),
            Err(ConcatError::Cycle(err)) => {
                report.failed += 1;
                container
                    .diagnostic_handler()
                    .report(Diagnostic::cyclic_dependency(&err, key));
                return Ok(());
            }
            Err(ConcatError::Source(err)) => {
                return Err(err).with_context(|| format!("Failed to build {}", key));
            }
        },
    };

    match output {
        Ok(js) => {
            write_output(Path::new(&bundle.out_file), &js)?;
            report.compiled += 1;
        }
        Err(error) => {
            report.failed += 1;
            print_compile_error(&error, container.config().pretty);
        }
    }

    Ok(())
}

/// Output location of an individually compiled module
fn output_path(config: &PercolateConfig, source: &DirectorySource, id: &str) -> PathBuf {
    let relative = Path::new(id).with_extension("js");
    match config.out_dir {
        Some(ref out_dir) => Path::new(out_dir).join(relative),
        None => source.root().join(relative),
    }
}

fn write_output(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Generated: {:?}", path);
    Ok(())
}

fn print_compile_error(error: &CompileError, pretty: bool) {
    if pretty {
        eprintln!(
            "\n\x1b[31m{}\x1b[0m [{}:{}]",
            error.title(),
            error.path(),
            error.line_number()
        );
        eprintln!("{}", error);

        for line in error.source_display() {
            if line.starts_with('>') || line.trim_end().ends_with('^') {
                eprintln!("\x1b[31m{}\x1b[0m", line);
            } else {
                eprintln!("{}", line);
            }
        }
        eprintln!();
    } else {
        eprintln!(
            "{}:{}: error: {}",
            error.path(),
            error.line_number(),
            error
        );
    }
}

/// Build once without stopping on errors
fn rebuild(container: &Container, concat_only: bool) -> BuildReport {
    build(container, concat_only).unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        BuildReport::default()
    })
}

/// Watch mode - rebuild on source changes, keeping the cache warm
fn watch_mode(container: &Container, concat_only: bool) -> anyhow::Result<()> {
    use notify::{
        event::{EventKind, ModifyKind},
        Event, RecursiveMode, Watcher,
    };
    use std::sync::mpsc::{channel, RecvTimeoutError};
    use std::time::{Duration, Instant};

    let source = container.source();
    let extension = container.config().source_extension.clone();

    let mut fingerprints = SourceFingerprints::new();
    for id in source.enumerate(&format!("**/*.{}", extension))? {
        match source.read(&id) {
            Ok(text) => {
                fingerprints.refresh(&id, &text);
            }
            Err(e) => warn!("Failed to read {}: {}", id, e),
        }
    }
    debug!("Fingerprinted {} module(s)", fingerprints.len());

    println!("Watching for changes... (Press Ctrl+C to stop)");

    println!("\nInitial build:");
    let mut report = rebuild(container, concat_only);

    let (tx, rx) = channel();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(source.root(), RecursiveMode::Recursive)?;

    let mut pending: FxHashSet<PathBuf> = FxHashSet::default();
    let mut last_event = Instant::now();
    let debounce_duration = Duration::from_millis(100);

    loop {
        match rx.recv_timeout(debounce_duration) {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Modify(ModifyKind::Data(_))
                        | EventKind::Modify(ModifyKind::Name(_))
                        | EventKind::Create(_)
                        | EventKind::Remove(_)
                );

                if relevant {
                    pending.extend(
                        event
                            .paths
                            .into_iter()
                            .filter(|path| path.extension().is_some_and(|ext| ext == extension.as_str())),
                    );
                    last_event = Instant::now();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if pending.is_empty() || last_event.elapsed() < debounce_duration {
                    continue;
                }

                let changed = invalidate_changed(
                    container,
                    &source,
                    &mut fingerprints,
                    pending.drain(),
                    &report,
                );
                if changed {
                    println!("\n\nSources changed, rebuilding...");
                    report = rebuild(container, concat_only);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow::anyhow!("File watcher disconnected"));
            }
        }
    }
}

/// Refresh the fingerprints of touched files and drop the cache entries they
/// feed; true when any content actually changed
fn invalidate_changed(
    container: &Container,
    source: &DirectorySource,
    fingerprints: &mut SourceFingerprints,
    paths: impl IntoIterator<Item = PathBuf>,
    report: &BuildReport,
) -> bool {
    let cache = container.cache();
    let bundle_key = container.config().bundle.as_ref().map(|b| b.out_file.as_str());
    let mut changed = false;

    for path in paths {
        let Some(id) = source.id_of(&path) else {
            continue;
        };

        let known = fingerprints.get(&id).is_some();
        let modified = match std::fs::read_to_string(&path) {
            Ok(text) => fingerprints.refresh(&id, &text),
            Err(_) => fingerprints.forget(&id),
        };
        if !modified {
            debug!("{} touched but unchanged", id);
            continue;
        }

        info!("Changed: {}", id);
        changed = true;
        cache.invalidate(&id);

        // A new module may satisfy a dependency the bundle was missing
        if !known || report.bundle_pool.contains(&id) {
            if let Some(key) = bundle_key {
                cache.invalidate(key);
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BUNDLE: &str = "app.js";

    struct Watched {
        _dir: TempDir,
        container: Container,
        source: DirectorySource,
        fingerprints: SourceFingerprints,
        report: BuildReport,
    }

    impl Watched {
        /// Three modules, a bundle drawn from two of them, everything cached
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("animal.coffee"), "class Animal").unwrap();
            fs::write(dir.path().join("snake.coffee"), "class Snake extends Animal").unwrap();
            fs::write(dir.path().join("other.coffee"), "x = 1").unwrap();

            let config = PercolateConfig {
                source_root: dir.path().to_string_lossy().into_owned(),
                bundle: Some(BundleOptions {
                    root: "snake.coffee".to_string(),
                    include: "animal.coffee".to_string(),
                    out_file: BUNDLE.to_string(),
                }),
                ..PercolateConfig::default()
            };
            let container = Container::new(config);
            let source = container.source();

            let mut fingerprints = SourceFingerprints::new();
            for id in source.enumerate("*.coffee").unwrap() {
                fingerprints.refresh(&id, &source.read(&id).unwrap());
            }
            let report = BuildReport {
                bundle_pool: ["snake.coffee", "animal.coffee"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                ..BuildReport::default()
            };

            let watched = Watched {
                _dir: dir,
                container,
                source,
                fingerprints,
                report,
            };
            for key in ["animal.coffee", "other.coffee", BUNDLE] {
                watched.warm(key);
            }
            watched
        }

        fn warm(&self, key: &str) {
            self.container
                .cache()
                .get_or_compile(key, &mut PassthroughCompiler, || Ok(key.to_string()))
                .unwrap();
        }

        fn write(&self, id: &str, text: &str) -> PathBuf {
            let path = self.source.root().join(id);
            fs::write(&path, text).unwrap();
            path
        }

        fn invalidate(&mut self, paths: Vec<PathBuf>) -> bool {
            invalidate_changed(
                &self.container,
                &self.source,
                &mut self.fingerprints,
                paths,
                &self.report,
            )
        }

        fn cached(&self, key: &str) -> bool {
            self.container.cache().contains(key)
        }
    }

    #[test]
    fn test_unchanged_touch_invalidates_nothing() {
        let mut watched = Watched::new();
        let path = watched.write("animal.coffee", "class Animal");

        assert!(!watched.invalidate(vec![path]));
        assert!(watched.cached("animal.coffee"));
        assert!(watched.cached("other.coffee"));
        assert!(watched.cached(BUNDLE));
    }

    #[test]
    fn test_changed_pool_module_drops_bundle() {
        let mut watched = Watched::new();
        let path = watched.write("animal.coffee", "class Animal\n  legs: 4");

        assert!(watched.invalidate(vec![path]));
        assert!(!watched.cached("animal.coffee"));
        assert!(!watched.cached(BUNDLE));
        assert!(watched.cached("other.coffee"));
    }

    #[test]
    fn test_changed_module_outside_pool_keeps_bundle() {
        let mut watched = Watched::new();
        let path = watched.write("other.coffee", "x = 2");

        assert!(watched.invalidate(vec![path]));
        assert!(!watched.cached("other.coffee"));
        assert!(watched.cached(BUNDLE));
    }

    #[test]
    fn test_new_module_drops_bundle() {
        let mut watched = Watched::new();
        let path = watched.write("lizard.coffee", "class Lizard extends Animal");

        assert!(watched.invalidate(vec![path]));
        assert!(!watched.cached(BUNDLE));
        assert!(watched.cached("animal.coffee"));
        assert_eq!(watched.fingerprints.len(), 4);
    }

    #[test]
    fn test_paths_outside_source_root_are_ignored() {
        let mut watched = Watched::new();
        let elsewhere = TempDir::new().unwrap();
        let path = elsewhere.path().join("animal.coffee");
        fs::write(&path, "class Impostor").unwrap();

        assert!(!watched.invalidate(vec![path]));
        assert!(watched.cached(BUNDLE));
    }
}
