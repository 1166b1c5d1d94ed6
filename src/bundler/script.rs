// src/bundler/script.rs

//! Built-in bundler for small ES-module style script trees.
//!
//! Supported module syntax is deliberately narrow, one statement per line:
//!
//! ```text
//! import foo from './foo.js';
//! import './side-effect';
//! export default <expr>;
//! export const|let|var|function|class ...
//! ```
//!
//! Only relative specifiers are resolved; a missing `.js` extension is
//! added. Modules are ordered dependencies-first and concatenated, each
//! module's default export bound to `__mod_<n>`. The first entry's default
//! export becomes the bundle's export (`module.exports` for `cjs`,
//! `export default` for `esm`).

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use tracing::{debug, trace};

use crate::bundler::{
    Artifact, BuildError, BuildErrorKind, BuildFuture, BuildOutput, BuildRequest, Bundler,
    DependencyGraph,
};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::BundleFormat;
use crate::watch::path_utils::normalize_lexically;

const IMPORT_PATTERN: &str =
    r#"^import\s+(?:([A-Za-z_$][\w$]*)\s+from\s+)?["']([^"']+)["']\s*;?$"#;
const EXPORT_DEFAULT_PATTERN: &str = r"^export\s+default\s+(.+?)\s*;?$";
const EXPORT_DECL_PATTERN: &str = r"^export\s+((?:const|let|var|function|class)\s.*)$";

/// `import` / `export` aware concatenating bundler.
#[derive(Debug, Clone)]
pub struct ScriptBundler {
    fs: Arc<dyn FileSystem>,
    import_re: Regex,
    export_default_re: Regex,
    export_decl_re: Regex,
}

/// One parsed source file.
#[derive(Debug)]
struct Module {
    path: PathBuf,
    /// `(binding, resolved path)` per import statement, in source order.
    imports: Vec<(Option<String>, PathBuf)>,
    lines: Vec<Line>,
    has_default: bool,
}

#[derive(Debug)]
enum Line {
    Verbatim(String),
    Import { binding: Option<String>, target: PathBuf },
    ExportDefault(String),
}

impl ScriptBundler {
    /// Bundler reading sources from the real filesystem.
    pub fn new() -> Result<Self> {
        Self::with_fs(Arc::new(RealFileSystem))
    }

    /// Bundler reading sources through `fs` (e.g. a `MockFileSystem`).
    pub fn with_fs(fs: Arc<dyn FileSystem>) -> Result<Self> {
        Ok(Self {
            fs,
            import_re: compile(IMPORT_PATTERN)?,
            export_default_re: compile(EXPORT_DEFAULT_PATTERN)?,
            export_decl_re: compile(EXPORT_DECL_PATTERN)?,
        })
    }

    /// Synchronous build: resolve, parse, order and concatenate.
    pub fn bundle(&self, request: &BuildRequest) -> std::result::Result<BuildOutput, BuildError> {
        if request.entries.is_empty() {
            return Err(BuildError::new(
                BuildErrorKind::Engine,
                "no entry modules given",
            ));
        }

        let mut entries = Vec::with_capacity(request.entries.len());
        for entry in &request.entries {
            let resolved = self.resolve_file(entry).ok_or_else(|| {
                BuildError::new(
                    BuildErrorKind::Unresolved,
                    format!("Could not resolve entry module {}", entry.display()),
                )
                .with_path(entry.clone())
            })?;
            entries.push(resolved);
        }

        let modules = self.load_modules(&entries)?;
        let order = order_modules(&modules)?;
        let code = self.emit(&modules, &order, &entries[0], request.format);

        let graph: DependencyGraph = modules.keys().cloned().collect();
        debug!(
            modules = graph.len(),
            changed = request.changed.len(),
            "script bundle assembled"
        );

        Ok(BuildOutput {
            graph,
            artifact: Artifact {
                code,
                modules: order.len(),
            },
        })
    }

    fn load_modules(
        &self,
        entries: &[PathBuf],
    ) -> std::result::Result<HashMap<PathBuf, Module>, BuildError> {
        let mut modules: HashMap<PathBuf, Module> = HashMap::new();
        let mut queue: VecDeque<PathBuf> = entries.iter().cloned().collect();

        while let Some(path) = queue.pop_front() {
            if modules.contains_key(&path) {
                continue;
            }
            let module = self.parse_module(&path)?;
            for (_, dep) in &module.imports {
                if !modules.contains_key(dep) {
                    queue.push_back(dep.clone());
                }
            }
            modules.insert(path, module);
        }

        Ok(modules)
    }

    fn parse_module(&self, path: &Path) -> std::result::Result<Module, BuildError> {
        let source = self.fs.read_to_string(path).map_err(|err| {
            BuildError::new(
                BuildErrorKind::Unresolved,
                format!("Could not load {}: {err}", path.display()),
            )
            .with_path(path)
        })?;

        let mut module = Module {
            path: path.to_path_buf(),
            imports: Vec::new(),
            lines: Vec::new(),
            has_default: false,
        };

        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if starts_with_keyword(line, "import") {
                let Some(caps) = self.import_re.captures(line) else {
                    return Err(syntax_error(path, line_no, line));
                };
                let binding = caps.get(1).map(|m| m.as_str().to_string());
                let spec = caps.get(2).map_or("", |m| m.as_str());
                let target = self.resolve_import(path, spec)?;
                trace!(from = ?path, spec, to = ?target, "import resolved");
                module.imports.push((binding.clone(), target.clone()));
                module.lines.push(Line::Import { binding, target });
                continue;
            }

            if starts_with_keyword(line, "export") {
                if let Some(caps) = self.export_default_re.captures(line) {
                    if module.has_default {
                        return Err(BuildError::new(
                            BuildErrorKind::Syntax,
                            format!(
                                "Duplicate export 'default' ({}:{line_no})",
                                path.display()
                            ),
                        )
                        .with_path(path));
                    }
                    module.has_default = true;
                    let expr = caps.get(1).map_or("", |m| m.as_str());
                    module.lines.push(Line::ExportDefault(expr.to_string()));
                    continue;
                }
                if let Some(caps) = self.export_decl_re.captures(line) {
                    let decl = caps.get(1).map_or("", |m| m.as_str());
                    module.lines.push(Line::Verbatim(decl.to_string()));
                    continue;
                }
                return Err(syntax_error(path, line_no, line));
            }

            module.lines.push(Line::Verbatim(raw.to_string()));
        }

        Ok(module)
    }

    fn resolve_import(&self, importer: &Path, spec: &str) -> std::result::Result<PathBuf, BuildError> {
        if !(spec.starts_with("./") || spec.starts_with("../")) {
            return Err(BuildError::new(
                BuildErrorKind::Unresolved,
                format!(
                    "Could not resolve '{spec}' from {}: only relative imports are supported",
                    importer.display()
                ),
            )
            .with_path(importer));
        }

        let base = importer.parent().unwrap_or_else(|| Path::new(""));
        let candidate = normalize_lexically(&base.join(spec));

        self.resolve_file(&candidate).ok_or_else(|| {
            let missing = if candidate.extension().is_some() {
                candidate.clone()
            } else {
                with_js_extension(&candidate)
            };
            BuildError::new(
                BuildErrorKind::Unresolved,
                format!(
                    "Could not resolve '{spec}' from {}",
                    importer.display()
                ),
            )
            .with_path(missing)
        })
    }

    /// Existing file for `path`, trying `<path>.js` as well.
    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        let candidates = [path.to_path_buf(), with_js_extension(path)];
        candidates
            .iter()
            .find(|c| self.fs.is_file(c))
            .and_then(|c| self.fs.canonicalize(c).ok())
    }

    fn emit(
        &self,
        modules: &HashMap<PathBuf, Module>,
        order: &[PathBuf],
        primary: &Path,
        format: BundleFormat,
    ) -> String {
        let index: HashMap<&Path, usize> = order
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_path(), i))
            .collect();

        let mut out = String::new();
        for (n, path) in order.iter().enumerate() {
            let Some(module) = modules.get(path) else {
                continue;
            };
            out.push_str(&format!("// {}\n", module.path.display()));
            for line in &module.lines {
                match line {
                    Line::Verbatim(text) => {
                        out.push_str(text);
                        out.push('\n');
                    }
                    Line::Import {
                        binding: Some(binding),
                        target,
                    } => {
                        if let Some(m) = index.get(target.as_path()) {
                            out.push_str(&format!("const {binding} = __mod_{m};\n"));
                        }
                    }
                    Line::Import { binding: None, .. } => {}
                    Line::ExportDefault(expr) => {
                        out.push_str(&format!("const __mod_{n} = {expr};\n"));
                    }
                }
            }
        }

        let exported = modules
            .get(primary)
            .filter(|m| m.has_default)
            .and_then(|_| index.get(primary));
        if let Some(n) = exported {
            match format {
                BundleFormat::Cjs => out.push_str(&format!("module.exports = __mod_{n};\n")),
                BundleFormat::Esm => out.push_str(&format!("export default __mod_{n};\n")),
            }
        }

        out
    }
}

impl Bundler for ScriptBundler {
    fn build<'a>(&'a self, request: &'a BuildRequest) -> BuildFuture<'a> {
        Box::pin(async move {
            let this = self.clone();
            let request = request.clone();
            match tokio::task::spawn_blocking(move || this.bundle(&request)).await {
                Ok(result) => result,
                Err(err) => Err(BuildError::new(
                    BuildErrorKind::Engine,
                    format!("bundler task failed: {err}"),
                )),
            }
        })
    }
}

/// Dependencies-first module order; errors on import cycles.
fn order_modules(
    modules: &HashMap<PathBuf, Module>,
) -> std::result::Result<Vec<PathBuf>, BuildError> {
    // Edge direction: dependency -> importer.
    let mut graph: DiGraph<PathBuf, ()> = DiGraph::new();
    let mut nodes: HashMap<&Path, NodeIndex> = HashMap::new();

    // Sorted insertion keeps the order stable between runs.
    let sorted: BTreeSet<&PathBuf> = modules.keys().collect();
    for path in &sorted {
        nodes.insert(path.as_path(), graph.add_node((*path).clone()));
    }
    for path in &sorted {
        if let Some(module) = modules.get(*path) {
            for (_, dep) in &module.imports {
                if let (Some(&from), Some(&to)) =
                    (nodes.get(dep.as_path()), nodes.get(path.as_path()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|ix| graph[ix].clone()).collect()),
        Err(cycle) => {
            let path = graph[cycle.node_id()].clone();
            Err(BuildError::new(
                BuildErrorKind::Cycle,
                format!("Circular import involving {}", path.display()),
            )
            .with_path(path))
        }
    }
}

/// `line` begins with `kw` as a statement keyword (not `important = 1`).
fn starts_with_keyword(line: &str, kw: &str) -> bool {
    line.strip_prefix(kw).is_some_and(|rest| {
        rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '{'))
    })
}

fn with_js_extension(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".js");
    PathBuf::from(s)
}

fn syntax_error(path: &Path, line_no: usize, line: &str) -> BuildError {
    BuildError::new(
        BuildErrorKind::Syntax,
        format!("Unexpected token ({}:{line_no}): {line}", path.display()),
    )
    .with_path(path)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| anyhow::Error::from(err).into())
}
