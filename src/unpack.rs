//! The unpack pipeline: the four outer archive pairs, the binder pass over
//! their leaves, the replacement injection, the manifest, and the inner
//! paired data files.
//!
//! Nested containers are handled with an explicit work queue rather than
//! recursion, so progress is reportable record by record.

use crate::{
    bdt::DataFile, bhd5, bhf3, bnd3, dcx, guess, names::NameTable, output, Error, Result,
};
use bstr::ByteSlice as _;
use core::fmt::Write as _;
use memmap2::Mmap;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// The directories the outer archives unpack into, rooted at the
/// destination.
pub const OUTPUT_DIRS: &[&str] = &[
    "chr", "event", "facegen", "font", "map", "menu", "msg", "mtd", "obj", "other", "param",
    "paramdef", "parts", "remo", "script", "sfx", "shader", "sound",
];

/// Holds binder-extracted files and the manifest.
pub const TEMP_DIR: &str = "unpackDS-BND";
pub const MANIFEST_NAME: &str = "bnd_manifest.txt";

const CONTENT_DATA: &str = "content-DATA";
const CONTENT_N: &str = "content-N";

// The one index the shipped archives are missing: without it the c4110
// texture data file cannot be paired.
const REPLACEMENT_CHRTPFBHD: &[u8] = include_bytes!("../data/c4110.chrtpfbhd");
const REPLACEMENT_CHRTPFBHD_PATH: &str = "FRPG/data/INTERROOT_win32/chr/c4110/c4110.chrtpfbhd";

/// The eight outer archive files, as (index, data) name pairs.
#[must_use]
pub fn archive_pairs() -> Vec<(String, String)> {
    (0..4)
        .map(|index| (format!("dvdbnd{index}.bhd5"), format!("dvdbnd{index}.bdt")))
        .collect()
}

/// Creates every output directory under `root`.
pub fn create_output_dirs(root: &Path) -> Result<()> {
    for dir in OUTPUT_DIRS {
        fs::create_dir_all(root.join(dir))?;
    }
    Ok(())
}

/// Which binders contained which files, plus the injected extras. Written
/// next to the extracted binder contents for modder reference.
#[derive(Default)]
pub struct Manifest {
    binders: Vec<(PathBuf, Vec<PathBuf>)>,
    custom: Vec<PathBuf>,
}

impl Manifest {
    fn record_binder(&mut self, container: PathBuf, children: Vec<PathBuf>) {
        self.binders.push((container, children));
    }

    fn record_custom(&mut self, path: PathBuf) {
        self.custom.push(path);
    }

    #[must_use]
    pub fn binders(&self) -> &[(PathBuf, Vec<PathBuf>)] {
        &self.binders
    }

    #[must_use]
    pub fn custom(&self) -> &[PathBuf] {
        &self.custom
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut text = String::new();
        for (container, children) in &self.binders {
            let _ = writeln!(text, "{}:", container.display());
            for child in children {
                let _ = writeln!(text, "    {}", child.display());
            }
        }
        let _ = writeln!(text, "-- Custom --");
        for custom in &self.custom {
            let _ = writeln!(text, "    {}", custom.display());
        }
        output::write_file(path, text.as_bytes())
    }
}

pub struct Unpacker<'names> {
    names: &'names NameTable,
    destination: PathBuf,
    temp: PathBuf,
    manifest: Manifest,
    leaves: BTreeSet<PathBuf>,
}

impl<'names> Unpacker<'names> {
    pub fn new<P>(destination: P, names: &'names NameTable) -> Self
    where
        P: Into<PathBuf>,
    {
        let destination = destination.into();
        let temp = destination.join(TEMP_DIR);
        Self {
            names,
            destination,
            temp,
            manifest: Manifest::default(),
            leaves: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Runs the whole pipeline against the destination directory, which must
    /// contain the four `dvdbnd` pairs.
    pub fn run(&mut self) -> Result<()> {
        for (header, data) in archive_pairs() {
            let header_path = self.destination.join(header);
            let data_path = self.destination.join(data);
            self.unpack_outer(&header_path, &data_path)?;
        }
        self.unpack_binders()?;
        self.inject_replacements()?;
        self.manifest.write_to(&self.temp.join(MANIFEST_NAME))?;
        self.unpack_paired()?;
        Ok(())
    }

    /// Unpacks one outer pair: every record is read from the data blob,
    /// inflated when it turns out to be a DCX frame, and written under the
    /// destination.
    pub fn unpack_outer(&mut self, header_path: &Path, data_path: &Path) -> Result<()> {
        info!(
            header = %header_path.display(),
            data = %data_path.display(),
            "unpacking outer archive"
        );
        let index = bhd5::Index::read(header_path)?;
        let resolved = index.resolve(self.names)?;
        info!("found {} records in the index", resolved.len());

        let file = fs::File::open(data_path)?;
        let map = unsafe { Mmap::map(&file)? };
        let data = DataFile::new(&map)?;
        let total = resolved.len();
        for (position, (name, record)) in resolved.into_iter().enumerate() {
            let bytes = data.record(record.payload_offset, record.payload_size)?;
            let written = self.write_leaf(name, bytes)?;
            debug!("unpacked {}/{total}: {}", position + 1, written.display());
        }
        Ok(())
    }

    fn write_leaf(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let inflated;
        let (name, payload): (&str, &[u8]) = if guess::appears_dcx(bytes) {
            inflated = dcx::decompress(bytes)?;
            (name.strip_suffix(".dcx").unwrap_or(name), &inflated)
        } else {
            (name, bytes)
        };
        let path = output::fix_filename(&self.destination, name);
        output::write_file(&path, payload)?;
        self.leaves.insert(path.clone());
        Ok(path)
    }

    /// Extracts every binder among the leaves into the temp tree, queueing
    /// binders found inside binders until none remain.
    fn unpack_binders(&mut self) -> Result<()> {
        let data_temp = self.temp.join(CONTENT_DATA);
        let n_temp = self.temp.join(CONTENT_N);
        let mut queue: VecDeque<PathBuf> = self
            .leaves
            .iter()
            .filter(|path| has_binder_extension(path))
            .cloned()
            .collect();

        while let Some(container) = queue.pop_front() {
            info!(container = %container.display(), "unpacking binder");
            let bytes = fs::read(&container)?;
            let relative_dir = container
                .parent()
                .and_then(|parent| parent.strip_prefix(&self.destination).ok())
                .unwrap_or_else(|| Path::new(""));
            let data_root = data_temp.join(relative_dir);

            let binder = bnd3::Binder::parse(&bytes)?;
            let mut children = Vec::with_capacity(binder.len());
            for file in binder.files() {
                let mut name = file.name.to_str_lossy().into_owned();
                let inflated;
                let payload: &[u8] = if guess::appears_dcx(file.payload()) {
                    inflated = dcx::decompress(file.payload())?;
                    if name.ends_with(".dcx") {
                        name.truncate(name.len() - 4);
                    }
                    &inflated
                } else {
                    file.payload()
                };

                let target = output::relativize(&name, file.n_rooted, &data_root, &n_temp);
                output::write_file(&target, payload)?;
                debug!("wrote {}", target.display());
                if has_binder_extension(&target) && guess::appears_bnd3(payload) {
                    queue.push_back(target.clone());
                }
                self.leaves.insert(target.clone());
                children.push(target);
            }
            self.manifest.record_binder(container, children);
        }
        Ok(())
    }

    fn inject_replacements(&mut self) -> Result<()> {
        let path = self.temp.join(CONTENT_N).join(REPLACEMENT_CHRTPFBHD_PATH);
        info!("injecting replacement index {}", path.display());
        output::write_file(&path, REPLACEMENT_CHRTPFBHD)?;
        self.leaves.insert(path.clone());
        self.manifest.record_custom(path);
        Ok(())
    }

    /// Pairs every named data file with its index, extracts it into the
    /// directory its extension selects, and removes the pair.
    fn unpack_paired(&mut self) -> Result<()> {
        let mut headers: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let mut data_files: Vec<PathBuf> = Vec::new();
        for leaf in &self.leaves {
            let Some(name) = leaf.file_name() else {
                continue;
            };
            let name = name.to_string_lossy().into_owned();
            if name.len() <= 3 {
                continue;
            }
            let key = name[..name.len() - 3].to_owned();
            if name.ends_with("bhd") {
                headers.entry(key).or_default().push(leaf.clone());
            } else if name.ends_with("bdt") {
                data_files.push(leaf.clone());
            }
        }

        for data_path in data_files {
            let name = data_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned();
            let header_path = headers
                .get(&name[..name.len() - 3])
                .and_then(|candidates| candidates.first())
                .ok_or_else(|| Error::Unpaired {
                    data: data_path.clone(),
                })?
                .clone();
            let out_root = self.destination.join(route_for_extension(&data_path)?);

            info!(
                data = %data_path.display(),
                header = %header_path.display(),
                "unpacking paired data file"
            );
            {
                let index = bhf3::Index::read(&header_path)?;
                let file = fs::File::open(&data_path)?;
                let map = unsafe { Mmap::map(&file)? };
                let data = DataFile::new(&map)?;
                for record in index.records() {
                    let bytes = data.record(record.payload_offset, record.payload_size)?;
                    let target = paired_record_target(&out_root, record.name.as_bstr());
                    output::write_file(&target, bytes)?;
                    debug!("wrote {}", target.display());
                }
            }

            fs::remove_file(&data_path)?;
            match fs::remove_file(&header_path) {
                // Already removed while serving an earlier data file.
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                result => result?,
            }
            self.leaves.remove(&data_path);
            self.leaves.remove(&header_path);
        }
        Ok(())
    }
}

fn has_binder_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.to_string_lossy().ends_with("bnd"))
}

fn route_for_extension(path: &Path) -> Result<&'static str> {
    let extension = path.extension().unwrap_or_default().to_string_lossy();
    match extension.as_ref() {
        "chrtpfbdt" => Ok("chr"),
        "hkxbdt" => Ok("map"),
        "tpfbdt" => Ok("map/tx"),
        _ => Err(Error::UnknownExtension {
            path: path.to_path_buf(),
        }),
    }
}

// Names that still carry the `N:` build-share prefix are flattened into the
// routed directory; relative names keep their structure below it.
fn paired_record_target(out_root: &Path, name: &bstr::BStr) -> PathBuf {
    let name = name.to_str_lossy();
    let n_prefixed = name.len() >= 2 && name.as_bytes()[..2].eq_ignore_ascii_case(b"n:");
    if n_prefixed {
        let basename = name.rsplit('/').next().unwrap_or_default();
        output::fix_filename(out_root, basename)
    } else {
        output::fix_filename(out_root, &name)
    }
}
