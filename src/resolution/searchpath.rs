use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use log::{debug, warn};

use crate::{
    file::File,
    reader::read_definitions,
    resolution::{
        assembly_key, canonical_assembly, Catalog, Definition, ReferenceDescriptor,
        ReferenceResolver, CORE_LIBRARY, CORE_LIBRARY_ALIASES,
    },
    Error, Result,
};

/// File extensions probed for an assembly, in order
const PROBE_EXTENSIONS: [&str; 2] = ["dll", "exe"];

/// Resolves against candidate modules supplied by the caller.
///
/// Candidates are given as in-memory images ([`SearchPathResolver::with_image`]) or as
/// directories probed for `<assembly>.dll` and `<assembly>.exe`
/// ([`SearchPathResolver::with_directory`]). Every candidate is read at most once per
/// resolver; the resulting definitions, and assemblies that could not be found, are cached in
/// the instance. Nothing is shared between instances.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::resolution::SearchPathResolver;
///
/// let resolver = SearchPathResolver::new()
///     .with_directory("build/references")
///     .with_image("Game.Core.dll", std::fs::read("Game.Core.dll")?)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct SearchPathResolver {
    directories: Vec<PathBuf>,
    cache: DashMap<String, Option<Arc<Catalog>>>,
}

impl SearchPathResolver {
    /// A resolver without candidates
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `directory` for referenced assemblies
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directories.push(directory.into());
        self
    }

    /// Add an in-memory candidate module.
    ///
    /// The image is read right away and indexed under its assembly name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the image can not be read.
    pub fn with_image(self, name: &str, image: Vec<u8>) -> Result<Self> {
        self.add_image(name, &image)?;
        Ok(self)
    }

    /// Add a candidate: a module file, or a directory to probe.
    ///
    /// # Errors
    /// Returns an error if `path` is a file that can not be read as a module.
    pub fn with_path(self, path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(self.with_directory(path));
        }

        let file = File::from_file(path)?;
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        self.add_image(&name, file.data())?;
        Ok(self)
    }

    fn add_image(&self, name: &str, image: &[u8]) -> Result<()> {
        let module = read_definitions(name, image)?;
        let catalog = Catalog::from_module(&module)?;
        let assembly = module.assembly.as_ref().map_or_else(
            || name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string(),
            |identity| identity.name.clone(),
        );

        debug!(
            "search path: {} provides {} type(s) of {}",
            name,
            catalog.type_count(),
            assembly
        );
        self.cache
            .insert(assembly_key(&assembly), Some(Arc::new(catalog)));
        Ok(())
    }

    fn probe(&self, assembly: &str) -> Option<Arc<Catalog>> {
        let names: Vec<&str> = if canonical_assembly(assembly) == CORE_LIBRARY {
            std::iter::once(assembly)
                .chain(CORE_LIBRARY_ALIASES.iter().copied())
                .collect()
        } else {
            vec![assembly]
        };

        for directory in &self.directories {
            for name in &names {
                for extension in PROBE_EXTENSIONS {
                    let candidate = directory.join(format!("{name}.{extension}"));
                    if !candidate.is_file() {
                        continue;
                    }

                    let loaded = File::from_file(&candidate).and_then(|file| {
                        let module = read_definitions(&format!("{name}.{extension}"), file.data())?;
                        Catalog::from_module(&module)
                    });
                    match loaded {
                        Ok(catalog) => {
                            debug!("search path: loaded {}", candidate.display());
                            return Some(Arc::new(catalog));
                        }
                        Err(e) => warn!("search path: skipping {}: {e}", candidate.display()),
                    }
                }
            }
        }

        None
    }

    fn catalog(&self, assembly: &str) -> Option<Arc<Catalog>> {
        let key = assembly_key(assembly);
        if let Some(cached) = self.cache.get(&key) {
            return cached.value().clone();
        }

        let catalog = self.probe(assembly);
        self.cache
            .entry(key)
            .or_insert(catalog)
            .value()
            .clone()
    }
}

impl ReferenceResolver for SearchPathResolver {
    fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>> {
        self.catalog(reference.assembly())
            .and_then(|catalog| catalog.lookup(reference))
            .ok_or_else(|| Error::ReferenceNotFound(reference.to_string()))
    }
}
