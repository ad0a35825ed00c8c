//! Test fixtures - module sources for testing

use percolate_core::source::MemorySource;
use std::path::Path;

/// A base class with no dependencies
pub fn animal() -> &'static str {
    "class Animal\n  constructor: (@name) ->\n\n  move: (meters) ->\n    alert @name + \" moved #{meters}m.\"\n"
}

/// Extends `Animal`
pub fn snake() -> &'static str {
    "class Snake extends Animal\n  move: ->\n    alert \"Slithering...\"\n    super 5\n"
}

/// Extends `Snake`
pub fn python() -> &'static str {
    "class Python extends Snake\n  squeeze: ->\n    alert \"Squeezing...\"\n"
}

/// Plain functions, no classes and no directives
pub fn no_deps() -> &'static str {
    "square = (x) -> x * x\ncube = (x) -> square(x) * x\n"
}

/// Requires a class by symbol and a module by name, and nothing else
pub fn require_directive() -> &'static str {
    "#= require Animal\n#= require <no-deps.coffee>\n"
}

/// Requires itself by module name
pub fn self_require() -> &'static str {
    "#= require <loop.coffee>\nloop = true\n"
}

/// Fails to compile with the usual compilers
pub fn syntax_error() -> &'static str {
    "a = 1\nb = )\n"
}

/// The five classic modules keyed by their identifiers
pub fn zoo() -> Vec<(&'static str, &'static str)> {
    vec![
        ("animal.coffee", animal()),
        ("snake.coffee", snake()),
        ("python.coffee", python()),
        ("no-deps.coffee", no_deps()),
        ("require-directive.coffee", require_directive()),
    ]
}

/// An in-memory source holding [`zoo`]
pub fn zoo_source() -> MemorySource {
    memory_source(&zoo())
}

pub fn memory_source(modules: &[(&str, &str)]) -> MemorySource {
    let mut source = MemorySource::new();
    for (id, text) in modules {
        source.insert(*id, *text);
    }
    source
}

/// Write modules under `root`, creating parent directories as needed
pub fn write_modules(root: &Path, modules: &[(&str, &str)]) -> std::io::Result<()> {
    for (id, text) in modules {
        let path = root.join(id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
    }
    Ok(())
}
