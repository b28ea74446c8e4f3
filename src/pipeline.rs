use chrono::{DateTime, Local};
use image::DynamicImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, OutputLayout, OverwritePolicy};
use crate::error::{ConvertError, Result};
use crate::metadata::{self, MetadataKey, PromptMetadata};
use crate::recode;

/// Extensions picked up for conversion.
pub const PNG_EXTENSIONS: &[&str] = &["png"];

/// Extensions readable by the metadata viewer.
pub const METADATA_EXTENSIONS: &[&str] = &["png", "webp"];

const WEBP_EXTENSION: &str = "webp";

/// Folder created under the input root by the dated layout.
const DATED_OUTPUT_DIR: &str = "webp";

/// A file found by the [`FileWalker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// The argument it was found under: the directory, or the file's parent
    /// for file arguments.
    pub root: PathBuf,
}

/// Enumerates input files from a mix of file and directory arguments.
///
/// Directories are walked (recursively unless disabled, following symlinks)
/// and filtered by extension, case-insensitively. File arguments with another
/// extension are skipped with a warning, and missing paths come out as
/// [`ConvertError::NotFound`]. [`FileWalker::iter`] starts a fresh walk every
/// time it is called.
///
/// # Example
///
/// ```rust,no_run
/// use png2webp::pipeline::FileWalker;
/// use std::path::PathBuf;
///
/// let walker = FileWalker::png(&[PathBuf::from("./renders")], true);
/// for file in walker.iter().flatten() {
///     println!("{}", file.path.display());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileWalker {
    roots: Vec<PathBuf>,
    recursive: bool,
    extensions: &'static [&'static str],
}

impl FileWalker {
    pub fn new(paths: &[PathBuf], recursive: bool, extensions: &'static [&'static str]) -> Self {
        Self {
            roots: paths.to_vec(),
            recursive,
            extensions,
        }
    }

    /// Walker for PNG files.
    pub fn png(paths: &[PathBuf], recursive: bool) -> Self {
        Self::new(paths, recursive, PNG_EXTENSIONS)
    }

    /// Lazily walk every root, in argument order.
    pub fn iter(&self) -> impl Iterator<Item = Result<InputFile>> + '_ {
        self.roots
            .iter()
            .flat_map(move |root| walk_root(root, self.recursive, self.extensions))
    }
}

fn walk_root(
    root: &Path,
    recursive: bool,
    extensions: &'static [&'static str],
) -> Box<dyn Iterator<Item = Result<InputFile>>> {
    let abs = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

    if abs.is_file() {
        if !has_extension(&abs, extensions) {
            log::warn!("Skipping unsupported file: {}", abs.display());
            return Box::new(std::iter::empty());
        }
        let parent = abs.parent().map(Path::to_path_buf).unwrap_or_default();
        return Box::new(std::iter::once(Ok(InputFile {
            path: abs,
            root: parent,
        })));
    }

    if !abs.is_dir() {
        log::warn!("Path does not exist: {}", root.display());
        return Box::new(std::iter::once(Err(ConvertError::NotFound(root.to_path_buf()))));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let files = WalkDir::new(&abs)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {err}");
                None
            }
        })
        .filter(move |e| e.file_type().is_file() && has_extension(e.path(), extensions))
        .map(move |e| {
            Ok(InputFile {
                path: e.into_path(),
                root: abs.clone(),
            })
        });
    Box::new(files)
}

/// Collect PNG files from the given paths for one batch.
///
/// Not-found errors come first, in argument order, followed by the files
/// sorted by path. A file reached through more than one argument is listed once.
///
/// # Example
///
/// ```rust,no_run
/// use png2webp::pipeline::collect_pngs;
/// use std::path::PathBuf;
///
/// let items = collect_pngs(&[
///     PathBuf::from("render.png"),   // single file
///     PathBuf::from("./outputs/"),   // entire directory
/// ], true);
/// println!("Found {} items", items.len());
/// ```
pub fn collect_pngs(paths: &[PathBuf], recursive: bool) -> Vec<Result<InputFile>> {
    collect_files(&FileWalker::png(paths, recursive))
}

/// Collect and order everything a walker yields. See [`collect_pngs`].
pub fn collect_files(walker: &FileWalker) -> Vec<Result<InputFile>> {
    let mut errors = Vec::new();
    let mut files = Vec::new();
    for item in walker.iter() {
        match item {
            Ok(file) => files.push(file),
            Err(e) => errors.push(Err(e)),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    errors.extend(files.into_iter().map(Ok));
    errors
}

/// Check if a file has one of the given extensions (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Where the WEBP for `file` goes under the given layout.
pub fn destination_for(file: &InputFile, layout: OutputLayout) -> PathBuf {
    match layout {
        OutputLayout::SideBySide => file.path.with_extension(WEBP_EXTENSION),
        OutputLayout::Dated => {
            let mut name = file.path.file_stem().unwrap_or_default().to_os_string();
            name.push(".");
            name.push(WEBP_EXTENSION);
            file.root
                .join(DATED_OUTPUT_DIR)
                .join(creation_date(&file.path))
                .join(name)
        }
    }
}

/// `YYYY_MM_DD` of the file's creation time, falling back to its modification
/// time, then to today.
fn creation_date(path: &Path) -> String {
    let time = std::fs::metadata(path).and_then(|m| m.created().or_else(|_| m.modified()));
    let date: DateTime<Local> = match time {
        Ok(t) => t.into(),
        Err(e) => {
            log::debug!("No timestamp for {}: {e}", path.display());
            Local::now()
        }
    };
    date.format("%Y_%m_%d").to_string()
}

/// A decoded PNG with its recognized metadata.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    pub pixels: DynamicImage,
    pub metadata: PromptMetadata,
}

impl SourceImage {
    /// Read and decode a PNG file.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = metadata::read_file(path)?;
        let pixels = recode::decode_png(&bytes)?;
        let metadata = metadata::png_metadata_from_bytes(&bytes)?;
        Ok(Self {
            path: path.to_path_buf(),
            pixels,
            metadata,
        })
    }
}

/// Outcome of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Success,
    Skipped,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// The result of converting (or attempting to convert) a single input.
///
/// # Example
///
/// ```rust,no_run
/// # use png2webp::config::Config;
/// # use png2webp::pipeline::{collect_pngs, Converter};
/// # use std::path::PathBuf;
/// let config = Config::default();
/// let mut converter = Converter::new(&config);
/// for item in collect_pngs(&[PathBuf::from("render.png")], true) {
///     let result = converter.convert(item);
///     match &result.error {
///         Some(err) => eprintln!("{}: {err}", result.source.display()),
///         None => println!("Wrote {:?} with {:?}", result.destination, result.metadata_keys),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct ConversionResult {
    pub source: PathBuf,
    /// The planned destination. `None` when the input was not found.
    pub destination: Option<PathBuf>,
    pub status: ConversionStatus,
    pub error: Option<ConvertError>,
    /// Metadata keys carried into the WEBP.
    pub metadata_keys: Vec<MetadataKey>,
}

impl ConversionResult {
    fn success(source: &Path, destination: PathBuf, metadata_keys: Vec<MetadataKey>) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: Some(destination),
            status: ConversionStatus::Success,
            error: None,
            metadata_keys,
        }
    }

    fn skipped(source: &Path, destination: PathBuf) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: Some(destination),
            status: ConversionStatus::Skipped,
            error: None,
            metadata_keys: Vec::new(),
        }
    }

    fn failed(source: &Path, destination: Option<PathBuf>, error: ConvertError) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            status: ConversionStatus::Failed,
            error: Some(error),
            metadata_keys: Vec::new(),
        }
    }
}

/// Progress report sent after each input.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// 1-based position in the batch.
    pub index: usize,
    pub total: usize,
    pub result: &'a ConversionResult,
}

/// Converts inputs one by one, remembering which destinations this batch
/// has already claimed.
pub struct Converter<'a> {
    config: &'a Config,
    claimed: HashSet<PathBuf>,
}

impl<'a> Converter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            claimed: HashSet::new(),
        }
    }

    /// Convert one walker item. Never fails: errors end up in the result.
    pub fn convert(&mut self, item: Result<InputFile>) -> ConversionResult {
        match item {
            Ok(file) => self.convert_file(&file),
            Err(err) => {
                let source = match &err {
                    ConvertError::NotFound(path) => path.clone(),
                    _ => PathBuf::new(),
                };
                ConversionResult::failed(&source, None, err)
            }
        }
    }

    /// Convert one PNG file.
    ///
    /// 1. **Plan**: destination from the layout. A destination already
    ///    claimed in this batch fails; an existing file goes through the
    ///    overwrite policy
    /// 2. **Read**: decode pixels and text metadata
    /// 3. **Encode**: WEBP, then embed the metadata
    /// 4. **Write**: via a temporary sibling renamed into place (skipped on dry run)
    pub fn convert_file(&mut self, file: &InputFile) -> ConversionResult {
        let dest = destination_for(file, self.config.output.layout);

        if !self.claimed.insert(dest.clone()) {
            let err = ConvertError::write(&dest, "another input in this batch targets the same file");
            return ConversionResult::failed(&file.path, Some(dest), err);
        }

        if dest.exists() {
            match self.config.output.on_existing {
                OverwritePolicy::Overwrite => {
                    log::debug!("Overwriting {}", dest.display());
                }
                OverwritePolicy::Skip => {
                    log::debug!("Destination exists, skipping: {}", dest.display());
                    return ConversionResult::skipped(&file.path, dest);
                }
                OverwritePolicy::Error => {
                    let err = ConvertError::write(&dest, "destination already exists");
                    return ConversionResult::failed(&file.path, Some(dest), err);
                }
            }
        }

        match self.run(&file.path, &dest) {
            Ok(keys) => ConversionResult::success(&file.path, dest, keys),
            Err(e) => {
                let err = e.at(&dest);
                ConversionResult::failed(&file.path, Some(dest), err)
            }
        }
    }

    fn run(&self, source: &Path, dest: &Path) -> Result<Vec<MetadataKey>> {
        let image = SourceImage::open(source)?;
        let webp = recode::encode_webp(&image.pixels, &self.config.encoding)?;
        let webp =
            metadata::embed_metadata(webp, &image.metadata, self.config.metadata.extra_layout)?;

        if self.config.output.dry_run {
            log::debug!("Dry run, not writing {} bytes to {}", webp.len(), dest.display());
        } else {
            persist(dest, &webp)?;
        }

        Ok(image.metadata.keys().collect())
    }
}

/// Convert a single file outside of a batch.
pub fn convert_file(file: &InputFile, config: &Config) -> ConversionResult {
    Converter::new(config).convert_file(file)
}

/// Convert every item in order, calling `on_progress` after each one.
///
/// Failures never stop the batch.
///
/// # Example
///
/// ```rust,no_run
/// use png2webp::config::Config;
/// use png2webp::pipeline::{collect_pngs, convert_batch, BatchSummary};
/// use std::path::PathBuf;
///
/// let config = Config::default();
/// let items = collect_pngs(&[PathBuf::from("./outputs")], true);
/// let results = convert_batch(items, &config, |p| {
///     println!("[{}/{}] {}", p.index, p.total, p.result.source.display());
/// });
/// let summary = BatchSummary::from_results(&results);
/// println!("{} converted, {} failed", summary.succeeded, summary.failed);
/// ```
pub fn convert_batch<F>(
    items: Vec<Result<InputFile>>,
    config: &Config,
    mut on_progress: F,
) -> Vec<ConversionResult>
where
    F: FnMut(Progress<'_>),
{
    let total = items.len();
    let mut converter = Converter::new(config);
    let mut results = Vec::with_capacity(total);

    for (i, item) in items.into_iter().enumerate() {
        let result = converter.convert(item);
        on_progress(Progress {
            index: i + 1,
            total,
            result: &result,
        });
        results.push(result);
    }

    results
}

/// Write `bytes` to `dest` through a temporary sibling, so a failed write
/// never leaves a truncated file at the destination.
fn persist(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::write(dest, e))?;
    }

    let file_name = dest.file_name().unwrap_or_default().to_string_lossy();
    let tmp = dest.with_file_name(format!(".{file_name}.part"));

    let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, dest));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(ConvertError::write(dest, e));
    }
    Ok(())
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ConversionResult]) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            succeeded: count(ConversionStatus::Success),
            failed: count(ConversionStatus::Failed),
            skipped: count(ConversionStatus::Skipped),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use img_parts::Bytes;
    use img_parts::png::{Png, PngChunk};
    use std::fs;
    use tempfile::TempDir;

    fn write_png(path: &Path, text: &[(&str, &str)]) {
        let img = image::RgbaImage::from_fn(8, 6, |x, y| image::Rgba([x as u8 * 30, y as u8 * 40, 90, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        let mut png = Png::from_bytes(Bytes::from(buf.into_inner())).unwrap();
        for (keyword, value) in text {
            let mut data = keyword.as_bytes().to_vec();
            data.push(0);
            data.extend_from_slice(value.as_bytes());
            let pos = png.chunks().len() - 1;
            png.chunks_mut().insert(pos, PngChunk::new(*b"tEXt", Bytes::from(data)));
        }
        fs::write(path, png.encoder().bytes()).unwrap();
    }

    fn input(path: &Path) -> InputFile {
        InputFile {
            path: path.to_path_buf(),
            root: path.parent().unwrap().to_path_buf(),
        }
    }

    fn ok_paths(items: &[Result<InputFile>]) -> Vec<PathBuf> {
        items.iter().filter_map(|i| i.as_ref().ok()).map(|f| f.path.clone()).collect()
    }

    // ── has_extension ────────────────────────────────────────────────

    #[test]
    fn png_extension_is_case_insensitive() {
        assert!(has_extension(Path::new("a.png"), PNG_EXTENSIONS));
        assert!(has_extension(Path::new("b.PNG"), PNG_EXTENSIONS));
        assert!(has_extension(Path::new("c.Png"), PNG_EXTENSIONS));
        assert!(!has_extension(Path::new("d.webp"), PNG_EXTENSIONS));
        assert!(!has_extension(Path::new("png"), PNG_EXTENSIONS));
        assert!(!has_extension(Path::new("e.png.txt"), PNG_EXTENSIONS));
    }

    // ── FileWalker / collect_pngs ────────────────────────────────────

    #[test]
    fn walk_matches_png_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        fs::write(dir.path().join("b.PNG"), b"x").unwrap();
        fs::write(dir.path().join("c.txt"), b"x").unwrap();

        let items = collect_pngs(&[dir.path().to_path_buf()], true);
        let names: Vec<_> = ok_paths(&items)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.PNG"]);
    }

    #[test]
    fn walk_is_recursive_by_default() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("2024").join("batch");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("top.png"), b"x").unwrap();
        fs::write(sub.join("deep.png"), b"x").unwrap();

        let items = collect_pngs(&[dir.path().to_path_buf()], true);
        assert_eq!(ok_paths(&items).len(), 2);

        let items = collect_pngs(&[dir.path().to_path_buf()], false);
        let paths = ok_paths(&items);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("top.png"));
    }

    #[test]
    fn walk_records_root() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("x.png"), b"x").unwrap();

        let items = collect_pngs(&[dir.path().to_path_buf()], true);
        let file = items[0].as_ref().unwrap();
        assert_eq!(file.root, std::path::absolute(dir.path()).unwrap());

        let items = collect_pngs(&[sub.join("x.png")], true);
        let file = items[0].as_ref().unwrap();
        assert_eq!(file.root, std::path::absolute(&sub).unwrap());
    }

    #[test]
    fn walk_skips_explicit_non_png() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        fs::write(&txt, b"hello").unwrap();
        assert!(collect_pngs(&[txt], true).is_empty());
    }

    #[test]
    fn walk_reports_missing_paths_first() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        let missing = PathBuf::from("/nonexistent/renders");

        let items = collect_pngs(&[dir.path().to_path_buf(), missing.clone()], true);
        assert_eq!(items.len(), 2);
        match &items[0] {
            Err(ConvertError::NotFound(p)) => assert_eq!(p, &missing),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(items[1].is_ok());
    }

    #[test]
    fn collect_sorts_and_dedups() {
        let dir = TempDir::new().unwrap();
        for name in ["c.png", "a.png", "b.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let items = collect_pngs(&[dir.path().to_path_buf(), dir.path().join("a.png")], true);
        let names: Vec<_> = ok_paths(&items)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn walker_is_restartable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        let walker = FileWalker::png(&[dir.path().to_path_buf()], true);
        assert_eq!(walker.iter().count(), 1);
        assert_eq!(walker.iter().count(), 1);
    }

    // ── destination_for ──────────────────────────────────────────────

    #[test]
    fn side_by_side_destination() {
        let file = input(Path::new("/renders/ComfyUI_00001_.png"));
        assert_eq!(
            destination_for(&file, OutputLayout::SideBySide),
            PathBuf::from("/renders/ComfyUI_00001_.webp")
        );
        let file = input(Path::new("/renders/v1.2.PNG"));
        assert_eq!(
            destination_for(&file, OutputLayout::SideBySide),
            PathBuf::from("/renders/v1.2.webp")
        );
    }

    #[test]
    fn dated_destination() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let png = sub.join("shot.png");
        fs::write(&png, b"x").unwrap();

        let file = InputFile {
            path: png,
            root: dir.path().to_path_buf(),
        };
        let dest = destination_for(&file, OutputLayout::Dated);
        assert_eq!(dest.file_name().unwrap(), "shot.webp");

        let date_dir = dest.parent().unwrap();
        let date = date_dir.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(date.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&date, "%Y_%m_%d").is_ok());
        assert_eq!(date_dir.parent().unwrap(), dir.path().join("webp"));
    }

    // ── Converter ────────────────────────────────────────────────────

    #[test]
    fn converts_and_carries_metadata() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("render.png");
        write_png(&png, &[("prompt", r#"{"1": {"inputs": {}}}"#), ("workflow", r#"{"nodes": []}"#)]);

        let result = convert_file(&input(&png), &Config::default());
        assert_eq!(result.status, ConversionStatus::Success, "{:?}", result.error);
        assert_eq!(result.metadata_keys, vec![MetadataKey::Prompt, MetadataKey::Workflow]);

        let dest = dir.path().join("render.webp");
        assert_eq!(result.destination.as_deref(), Some(dest.as_path()));
        let back = metadata::read_webp_metadata(&dest).unwrap();
        assert_eq!(back.metadata.get(MetadataKey::Prompt), Some(r#"{"1": {"inputs": {}}}"#));
        assert_eq!(back.metadata.get(MetadataKey::Workflow), Some(r#"{"nodes": []}"#));
        assert!(back.other.is_empty());
    }

    #[test]
    fn corrupt_png_fails_with_decode_error() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("broken.png");
        fs::write(&png, b"\x89PNG\r\n\x1a\ngarbage").unwrap();

        let result = convert_file(&input(&png), &Config::default());
        assert_eq!(result.status, ConversionStatus::Failed);
        assert!(matches!(result.error, Some(ConvertError::Decode(_))));
        assert!(!dir.path().join("broken.webp").exists());
    }

    #[test]
    fn skip_policy_leaves_existing_file() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("a.png");
        write_png(&png, &[]);
        fs::write(dir.path().join("a.webp"), b"keep me").unwrap();

        let mut config = Config::default();
        config.output.on_existing = OverwritePolicy::Skip;
        let result = convert_file(&input(&png), &config);
        assert_eq!(result.status, ConversionStatus::Skipped);
        assert!(result.error.is_none());
        assert_eq!(fs::read(dir.path().join("a.webp")).unwrap(), b"keep me");
    }

    #[test]
    fn error_policy_reports_write_error() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("a.png");
        write_png(&png, &[]);
        fs::write(dir.path().join("a.webp"), b"keep me").unwrap();

        let mut config = Config::default();
        config.output.on_existing = OverwritePolicy::Error;
        let result = convert_file(&input(&png), &config);
        assert_eq!(result.status, ConversionStatus::Failed);
        assert!(matches!(result.error, Some(ConvertError::Write { .. })));
        assert_eq!(fs::read(dir.path().join("a.webp")).unwrap(), b"keep me");
    }

    #[test]
    fn overwrite_policy_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("a.png");
        write_png(&png, &[]);
        fs::write(dir.path().join("a.webp"), b"stale").unwrap();

        let result = convert_file(&input(&png), &Config::default());
        assert_eq!(result.status, ConversionStatus::Success);
        let bytes = fs::read(dir.path().join("a.webp")).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
    }

    #[test]
    fn same_destination_twice_in_a_batch_fails() {
        let dir = TempDir::new().unwrap();
        let lower = dir.path().join("a.png");
        write_png(&lower, &[]);

        let config = Config::default();
        let mut converter = Converter::new(&config);
        let first = converter.convert_file(&input(&lower));
        let second = converter.convert_file(&input(&dir.path().join("a.PNG")));
        assert_eq!(first.status, ConversionStatus::Success);
        assert_eq!(second.status, ConversionStatus::Failed);
        assert!(matches!(second.error, Some(ConvertError::Write { .. })));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("a.png");
        write_png(&png, &[("prompt", "{}")]);

        let mut config = Config::default();
        config.output.dry_run = true;
        let result = convert_file(&input(&png), &config);
        assert_eq!(result.status, ConversionStatus::Success);
        assert!(!dir.path().join("a.webp").exists());
        assert!(fs::read_dir(dir.path()).unwrap().count() == 1);
    }

    #[test]
    fn not_found_item_becomes_failed_result() {
        let config = Config::default();
        let mut converter = Converter::new(&config);
        let result = converter.convert(Err(ConvertError::NotFound(PathBuf::from("/gone.png"))));
        assert_eq!(result.status, ConversionStatus::Failed);
        assert_eq!(result.source, PathBuf::from("/gone.png"));
        assert!(result.destination.is_none());
    }

    // ── convert_batch / BatchSummary ─────────────────────────────────

    #[test]
    fn batch_reports_progress_for_every_item() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("a.png"), &[]);
        write_png(&dir.path().join("b.png"), &[]);
        fs::write(dir.path().join("c.png"), b"broken").unwrap();

        let items = collect_pngs(&[dir.path().to_path_buf()], true);
        let mut seen = Vec::new();
        let results = convert_batch(items, &Config::default(), |p| seen.push((p.index, p.total)));
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);

        let summary = BatchSummary::from_results(&results);
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                succeeded: 2,
                failed: 1,
                skipped: 0
            }
        );
        assert!(summary.has_failures());
        assert!(results[2].source.ends_with("c.png"));
    }
}
