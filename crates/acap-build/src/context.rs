//! Build context assembly
//!
//! Packages a source directory into the tar archive handed to the engine as
//! the build input. Entries are visited in a sorted, directory-first walk so
//! identical inputs give an identical archive, and two fixed entries (the
//! recipe and the Makefile generator) are appended after the walk.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tar::{Builder, EntryType, Header, HeaderMode};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{BuildError, Result};

/// Name of the recipe entry in the context
pub const RECIPE_NAME: &str = "Dockerfile";

/// Name of the Makefile generator entry in the context
pub const GENERATOR_NAME: &str = "generate_makefile.py";

/// Prefix marking private entries that never enter the context
pub const PRIVATE_PREFIX: &str = "_";

const DEFAULT_RECIPE: &str = include_str!("../assets/Dockerfile");
const DEFAULT_GENERATOR: &str = include_str!("../assets/generate_makefile.py");

/// Decision taken for each entry visited by the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDecision {
    /// Emit the entry and, for directories, descend into it
    Include,
    /// Leave the entry out
    SkipEntry,
    /// Leave the directory and everything below it out
    SkipSubtree,
}

/// Exclusion rules applied during the walk
#[derive(Debug, Clone)]
pub struct InclusionRules {
    private_prefixes: Vec<String>,
    ignore_dirs: Vec<PathBuf>,
}

impl Default for InclusionRules {
    fn default() -> Self {
        Self { private_prefixes: vec![PRIVATE_PREFIX.to_string()], ignore_dirs: Vec::new() }
    }
}

impl InclusionRules {
    /// Rules with the default private prefix and the given ignore directories
    pub fn new<I, P>(ignore_dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let ignore_dirs = ignore_dirs
            .into_iter()
            .map(|dir| normalize(dir.as_ref()))
            .filter(|dir| dir.components().next().is_some())
            .collect();

        Self { ignore_dirs, ..Default::default() }
    }

    /// Add another private name prefix
    pub fn with_private_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.private_prefixes.push(prefix.into());
        self
    }

    /// Decide what happens to an entry, given its path relative to the root.
    ///
    /// Ignore dirs match whole path components: `skipme` excludes
    /// `skipme/a.go` but not `skipme2/b.go`. A plain string-prefix test
    /// would drop both.
    pub fn decide(&self, relative: &Path, is_dir: bool) -> WalkDecision {
        let skip = if is_dir { WalkDecision::SkipSubtree } else { WalkDecision::SkipEntry };

        let base = relative
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        if self
            .private_prefixes
            .iter()
            .any(|prefix| base.starts_with(prefix.as_str()))
        {
            return skip;
        }

        let relative = normalize(relative);
        if self.ignore_dirs.iter().any(|dir| relative.starts_with(dir)) {
            return skip;
        }

        WalkDecision::Include
    }
}

/// The assembled build context
#[derive(Debug, Clone)]
pub struct BuildContextArchive {
    data: Vec<u8>,
    entries: Vec<String>,
}

impl BuildContextArchive {
    /// Entry names in archive order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Archive size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the archive holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw archive bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the archive, handing the bytes to the engine
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Builds the context archive for one build invocation
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    root: PathBuf,
    recipe_override: Option<PathBuf>,
    rules: InclusionRules,
}

impl ContextAssembler {
    /// Assembler for the given source directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), recipe_override: None, rules: InclusionRules::default() }
    }

    /// Use a custom recipe instead of the built-in one
    pub fn with_recipe(mut self, recipe: Option<PathBuf>) -> Self {
        self.recipe_override = recipe;
        self
    }

    /// Exclude these directories (relative to the root)
    pub fn with_ignore_dirs<I, P>(mut self, ignore_dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let private_prefixes = std::mem::take(&mut self.rules.private_prefixes);
        self.rules = InclusionRules { private_prefixes, ..InclusionRules::new(ignore_dirs) };
        self
    }

    /// Replace the exclusion rules
    pub fn with_rules(mut self, rules: InclusionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Walk the source tree and produce the archive
    pub fn assemble(&self) -> Result<BuildContextArchive> {
        let recipe = self.read_recipe()?;

        let mut builder = Builder::new(Vec::new());
        let mut entries = Vec::new();

        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| {
                BuildError::context(format!("Failed to walk {}: {e}", self.root.display()))
            })?;

            let relative = entry.path().strip_prefix(&self.root).map_err(|e| {
                BuildError::context(format!("{} escapes the context root: {e}", entry.path().display()))
            })?;
            let is_dir = entry.file_type().is_dir();

            match self.rules.decide(relative, is_dir) {
                WalkDecision::Include => {}
                WalkDecision::SkipEntry => continue,
                WalkDecision::SkipSubtree => {
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }

            let name = archive_name(relative);
            if name == RECIPE_NAME || name == GENERATOR_NAME {
                warn!("Ignoring {} from the source tree, the build provides its own", name);
                continue;
            }

            if append_entry(&mut builder, &entry, &name)? {
                entries.push(name);
            }
        }

        append_fixed(&mut builder, RECIPE_NAME, recipe.as_bytes())?;
        entries.push(RECIPE_NAME.to_string());
        append_fixed(&mut builder, GENERATOR_NAME, DEFAULT_GENERATOR.as_bytes())?;
        entries.push(GENERATOR_NAME.to_string());

        let data = builder
            .into_inner()
            .map_err(|e| BuildError::context(format!("Failed to finalize archive: {e}")))?;

        info!("Build context: {} entries, {} bytes", entries.len(), data.len());
        Ok(BuildContextArchive { data, entries })
    }

    fn read_recipe(&self) -> Result<String> {
        match &self.recipe_override {
            Some(path) => {
                info!("Using custom dockerfile: {}", path.display());
                fs::read_to_string(path).map_err(|e| {
                    BuildError::context(format!(
                        "Failed to read custom Dockerfile {}: {e}",
                        path.display()
                    ))
                })
            }
            None => Ok(DEFAULT_RECIPE.to_string()),
        }
    }
}

/// Join the normal components of a relative path with `/`
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Append one walked entry; returns false for entry kinds that are not archived
fn append_entry(builder: &mut Builder<Vec<u8>>, entry: &DirEntry, name: &str) -> Result<bool> {
    let path = entry.path();
    let io_err =
        |e: io::Error| BuildError::context(format!("Failed to add {}: {e}", path.display()));

    let metadata = entry
        .metadata()
        .map_err(|e| BuildError::context(format!("Failed to stat {}: {e}", path.display())))?;

    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);

    let file_type = entry.file_type();
    if file_type.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        builder
            .append_data(&mut header, name, io::empty())
            .map_err(io_err)?;
    } else if file_type.is_file() {
        debug!("Adding file to context: {}", name);
        let file = File::open(path).map_err(io_err)?;
        builder
            .append_data(&mut header, name, file)
            .map_err(io_err)?;
    } else if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(io_err)?;
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        builder
            .append_link(&mut header, name, &target)
            .map_err(io_err)?;
    } else {
        debug!("Skipping special file {}", path.display());
        return Ok(false);
    }

    Ok(true)
}

fn append_fixed(builder: &mut Builder<Vec<u8>>, name: &str, content: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);

    builder
        .append_data(&mut header, name, content)
        .map_err(|e| BuildError::context(format!("Failed to add {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Read back (name, content) pairs from an archive
    fn read_archive(bytes: &[u8]) -> Vec<(String, Option<Vec<u8>>)> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
                let content = if entry.header().entry_type().is_file() {
                    let mut buf = Vec::new();
                    entry.read_to_end(&mut buf).unwrap();
                    Some(buf)
                } else {
                    None
                };
                (name, content)
            })
            .collect()
    }

    #[test]
    fn test_private_and_ignored_entries_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "a.go", "package main");
        write(root, "_hidden/x.go", "package hidden");
        write(root, "skipme/y.go", "package skip");

        let archive = ContextAssembler::new(root)
            .with_ignore_dirs(["skipme"])
            .assemble()
            .unwrap();

        assert_eq!(archive.entries(), ["a.go", RECIPE_NAME, GENERATOR_NAME]);

        let names: Vec<String> = read_archive(archive.as_bytes())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["a.go", RECIPE_NAME, GENERATOR_NAME]);
    }

    #[test]
    fn test_pruned_directory_hides_all_descendants() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "main.go", "package main");
        write(root, "vendor/deep/nested/ok.go", "package ok");
        write(root, "_build/plain.txt", "x");
        write(root, "pkg/_private.go", "package pkg");
        write(root, "pkg/public.go", "package pkg");

        let archive = ContextAssembler::new(root)
            .with_ignore_dirs(["./vendor/"])
            .assemble()
            .unwrap();

        assert_eq!(
            archive.entries(),
            ["main.go", "pkg", "pkg/public.go", RECIPE_NAME, GENERATOR_NAME]
        );
    }

    #[test]
    fn test_nested_ignore_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "web/dist/app.js", "x");
        write(root, "web/src/app.ts", "y");

        let archive = ContextAssembler::new(root)
            .with_ignore_dirs(["web/dist"])
            .assemble()
            .unwrap();

        assert_eq!(
            archive.entries(),
            ["web", "web/src", "web/src/app.ts", RECIPE_NAME, GENERATOR_NAME]
        );
    }

    #[test]
    fn test_file_contents_and_separators() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "lib/inner/data.bin", "\u{0}\u{1}binary");

        let archive = ContextAssembler::new(root).assemble().unwrap();
        let entries = read_archive(archive.as_bytes());

        let (_, content) = entries
            .iter()
            .find(|(name, _)| name == "lib/inner/data.bin")
            .expect("nested file archived with forward slashes");
        assert_eq!(content.as_deref(), Some("\u{0}\u{1}binary".as_bytes()));
        assert!(entries.iter().all(|(name, _)| !name.contains('\\')));
    }

    #[test]
    fn test_recipe_override() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("src");
        write(&root, "main.go", "package main");
        let recipe = temp_dir.path().join("Custom.Dockerfile");
        fs::write(&recipe, "FROM scratch\n").unwrap();

        let archive = ContextAssembler::new(&root)
            .with_recipe(Some(recipe))
            .assemble()
            .unwrap();

        let entries = read_archive(archive.as_bytes());
        let recipe_entry = entries.iter().find(|(name, _)| name == RECIPE_NAME).unwrap();
        assert_eq!(recipe_entry.1.as_deref(), Some("FROM scratch\n".as_bytes()));

        let generator = entries.iter().find(|(name, _)| name == GENERATOR_NAME).unwrap();
        assert_eq!(generator.1.as_deref(), Some(DEFAULT_GENERATOR.as_bytes()));
    }

    #[test]
    fn test_missing_recipe_override_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let result = ContextAssembler::new(temp_dir.path())
            .with_recipe(Some(temp_dir.path().join("nope")))
            .assemble();
        assert!(matches!(result, Err(BuildError::ContextAssembly { .. })));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let result = ContextAssembler::new(temp_dir.path().join("missing")).assemble();
        assert!(matches!(result, Err(BuildError::ContextAssembly { .. })));
    }

    #[test]
    fn test_source_recipe_does_not_duplicate_fixed_entry() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, RECIPE_NAME, "FROM local");
        write(root, "main.go", "package main");

        let archive = ContextAssembler::new(root).assemble().unwrap();
        let recipes = archive
            .entries()
            .iter()
            .filter(|name| *name == RECIPE_NAME)
            .count();
        assert_eq!(recipes, 1);
    }

    #[test]
    fn test_assembly_is_reproducible() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "b.go", "b");
        write(root, "a/z.go", "z");
        write(root, "a/y.go", "y");

        let first = ContextAssembler::new(root).assemble().unwrap();
        let second = ContextAssembler::new(root).assemble().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.entries()[..4], ["a", "a/y.go", "a/z.go", "b.go"]);
    }

    #[test]
    fn test_decide() {
        let rules = InclusionRules::new(["skipme"]).with_private_prefix(".");

        assert_eq!(rules.decide(Path::new("_x"), true), WalkDecision::SkipSubtree);
        assert_eq!(rules.decide(Path::new("_x.go"), false), WalkDecision::SkipEntry);
        assert_eq!(rules.decide(Path::new(".git"), true), WalkDecision::SkipSubtree);
        assert_eq!(rules.decide(Path::new("skipme"), true), WalkDecision::SkipSubtree);
        assert_eq!(rules.decide(Path::new("skipme/y.go"), false), WalkDecision::SkipEntry);
        // component match, not a string prefix
        assert_eq!(rules.decide(Path::new("skipme2"), true), WalkDecision::Include);
        assert_eq!(rules.decide(Path::new("src/a_b.go"), false), WalkDecision::Include);
    }
}
