use std::path::{Path, PathBuf};

use anyhow::Context;
use dotweave::{
    file::{symbols_path_for, ModuleFile},
    pipeline::{weave, CompiledModule},
    resolution::{ChainedResolver, ReferenceResolver, RuntimeResolver, SearchPathResolver},
    weaver::{DeadCodePolicy, TimeOfDay, WeaveOptions, WeaveReport, WovenMethod},
};
use log::{debug, info};
use serde::Serialize;

use crate::{
    app::{GlobalOptions, ResolverKind, WeaveArgs},
    output::{print_output, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct MethodInfo {
    pub type_name: String,
    pub method: String,
    pub token: String,
}

impl From<&WovenMethod> for MethodInfo {
    fn from(method: &WovenMethod) -> Self {
        MethodInfo {
            type_name: method.type_name.clone(),
            method: method.method.clone(),
            token: format!("0x{:08X}", method.token.value()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WeaveSummary {
    pub module: String,
    pub symbols: String,
    pub time: String,
    pub constant: i32,
    pub written: bool,
    pub methods: Vec<MethodInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<MethodInfo>,
}

impl WeaveSummary {
    fn new(module: &Path, symbols: &Path, report: &WeaveReport, written: bool) -> Self {
        WeaveSummary {
            module: module.display().to_string(),
            symbols: symbols.display().to_string(),
            time: report.time.to_string(),
            constant: report.constant,
            written,
            methods: report.methods.iter().map(MethodInfo::from).collect(),
            skipped: report.skipped.iter().map(MethodInfo::from).collect(),
        }
    }
}

/// Read both files fully, so the mappings are gone before they are written back.
fn load(path: &Path, symbols_path: &Path, args: &WeaveArgs) -> anyhow::Result<CompiledModule> {
    let file = ModuleFile::open_with_symbols(path, symbols_path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    Ok(CompiledModule {
        name: file.name(),
        code: file.code.data().to_vec(),
        symbols: file
            .symbols
            .as_ref()
            .map(|symbols| symbols.data().to_vec())
            .unwrap_or_default(),
        references: args.references.clone(),
        defines: args.defines.clone(),
    })
}

fn search_path(module: &Path, references: &[String]) -> anyhow::Result<SearchPathResolver> {
    let mut resolver = SearchPathResolver::new();
    if let Some(directory) = module.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        resolver = resolver.with_directory(directory);
    } else {
        resolver = resolver.with_directory(".");
    }

    for reference in references.iter().map(Path::new) {
        resolver = resolver
            .with_path(reference)
            .with_context(|| format!("failed to load reference {}", reference.display()))?;
    }
    Ok(resolver)
}

fn resolver(
    kind: ResolverKind,
    module: &Path,
    references: &[String],
) -> anyhow::Result<Box<dyn ReferenceResolver>> {
    Ok(match kind {
        ResolverKind::Search => Box::new(search_path(module, references)?),
        ResolverKind::Runtime => Box::new(RuntimeResolver::new()),
        ResolverKind::Chain => Box::new(
            ChainedResolver::new()
                .with(search_path(module, references)?)
                .with(RuntimeResolver::new()),
        ),
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".dotweave-tmp");
    path.with_file_name(name)
}

/// Replace both files, or neither: the blobs are staged next to their targets and only
/// renamed into place once both are on disk.
fn write_back(
    module: &Path,
    code: &[u8],
    symbols: &Path,
    symbol_data: &[u8],
) -> anyhow::Result<()> {
    let staged = [
        (staging_path(module), module, code),
        (staging_path(symbols), symbols, symbol_data),
    ];

    for (index, (staging, target, data)) in staged.iter().enumerate() {
        if let Err(e) = std::fs::write(staging, data) {
            for (written, _, _) in &staged[..index] {
                let _ = std::fs::remove_file(written);
            }
            return Err(e).with_context(|| format!("failed to write {}", target.display()));
        }
    }

    for (staging, target, _) in &staged {
        std::fs::rename(staging, target)
            .with_context(|| format!("failed to replace {}", target.display()))?;
    }
    Ok(())
}

pub fn run(args: &WeaveArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let symbols_path = args
        .symbols
        .clone()
        .unwrap_or_else(|| symbols_path_for(&args.path));
    let input = load(&args.path, &symbols_path, args)?;
    let resolver = resolver(args.resolver, &args.path, &input.references)?;

    let time = args.time.unwrap_or_else(TimeOfDay::now);
    let options = WeaveOptions {
        dead_code: if args.strip_original {
            DeadCodePolicy::Strip
        } else {
            DeadCodePolicy::Preserve
        },
    };
    debug!(
        "weaving {} with {} at {} ({:?} resolver)",
        args.path.display(),
        symbols_path.display(),
        time,
        args.resolver
    );

    let output = weave(&input, time, resolver.as_ref(), &options)
        .with_context(|| format!("failed to weave {}", args.path.display()))?;

    let written = !args.dry_run;
    if written {
        write_back(&args.path, &output.code, &symbols_path, &output.symbols)?;
        info!("wrote {} and {}", args.path.display(), symbols_path.display());
    }

    let summary = WeaveSummary::new(&args.path, &symbols_path, &output.report, written);
    print_output(&summary, opts, |summary| {
        println!(
            "{}: {} method(s) woven at {} (ldc.i4 {}){}",
            summary.module,
            summary.methods.len(),
            summary.time,
            summary.constant,
            if summary.written { "" } else { ", not written" }
        );
        if !summary.methods.is_empty() {
            let mut table = TabWriter::new(&["TOKEN", "TYPE", "METHOD"], "  ");
            for method in &summary.methods {
                table.row([
                    method.token.clone(),
                    method.type_name.clone(),
                    method.method.clone(),
                ]);
            }
            table.print();
        }
        for method in &summary.skipped {
            println!(
                "  skipped {}::{} ({}): no body",
                method.type_name, method.method, method.token
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("dotweave-cli-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn write_back_replaces_both() {
        let dir = scratch("both");
        let (module, symbols) = (dir.join("Game.dll"), dir.join("Game.pdb"));
        std::fs::write(&module, b"old code").unwrap();
        std::fs::write(&symbols, b"old symbols").unwrap();

        write_back(&module, b"new code", &symbols, b"new symbols").unwrap();

        assert_eq!(std::fs::read(&module).unwrap(), b"new code");
        assert_eq!(std::fs::read(&symbols).unwrap(), b"new symbols");
        assert!(!staging_path(&module).exists());
        assert!(!staging_path(&symbols).exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn write_back_leaves_module_when_symbols_fail() {
        let dir = scratch("partial");
        let module = dir.join("Game.dll");
        std::fs::write(&module, b"old code").unwrap();
        let symbols = dir.join("missing").join("Game.pdb");

        assert!(write_back(&module, b"new code", &symbols, b"new symbols").is_err());

        assert_eq!(std::fs::read(&module).unwrap(), b"old code");
        assert!(!staging_path(&module).exists());
        assert!(!symbols.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
