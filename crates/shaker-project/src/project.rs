//! Project lifecycle: create or load a project, wire the features generator
//! over it, save it back to an archive, close it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use shaker_core::cache::{CacheBounds, CacheSnapshot, FeaturesCache};
use shaker_core::enzyme::DigestionParameters;
use shaker_core::fasta::Fasta;
use shaker_core::features::FeaturesGenerator;
use shaker_core::identification::{IdentificationSnapshot, MemoryIdentification};
use shaker_core::metrics::Metrics;
use shaker_core::modification::ModificationRegistry;
use shaker_core::parameters::{DisplayParameters, SpectrumCountingParameters};
use shaker_core::waiting::WaitingHandler;

use crate::locate::DATA_FOLDER;
use crate::store::{keys, ObjectStore, EXTENSION};
use crate::{archive, locate, Error, Result};

/// Where the identification results come from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub name: String,
    /// Version of the crate that last wrote the project
    pub version: String,
    pub fasta_file: Option<PathBuf>,
    pub spectrum_files: Vec<PathBuf>,
}

impl ProjectDetails {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            fasta_file: None,
            spectrum_files: Vec::new(),
        }
    }

    fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.fasta_file.iter().chain(self.spectrum_files.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectParameters {
    pub digestion: DigestionParameters,
    pub spectrum_counting: SpectrumCountingParameters,
    pub display: DisplayParameters,
    pub cache_bounds: CacheBounds,
    pub modifications: ModificationRegistry,
}

impl Default for ProjectParameters {
    fn default() -> Self {
        Self {
            digestion: DigestionParameters::default(),
            spectrum_counting: SpectrumCountingParameters::default(),
            display: DisplayParameters::default(),
            cache_bounds: CacheBounds::default(),
            modifications: ModificationRegistry::common(),
        }
    }
}

/// What happened while loading a project. Files that could not be located
/// are reported here and leave the corresponding provider empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    pub missing_files: Vec<PathBuf>,
    pub cache_restored: bool,
    pub metrics_collected: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Drop every cached feature before writing, to shrink the archive
    pub clear_cache: bool,
    /// Copy the FASTA and spectrum files into the `data/` folder
    pub include_data: bool,
}

pub struct Project {
    details: ProjectDetails,
    parameters: ProjectParameters,
    identification: Arc<MemoryIdentification>,
    fasta: Arc<Fasta>,
    generator: FeaturesGenerator,
    /// Folder zipped on save
    root: PathBuf,
    /// Folder holding the object store and `data/`
    folder: PathBuf,
    store: ObjectStore,
    /// `root` was extracted from an archive and is removed on close
    extracted: bool,
}

fn generator(
    identification: &Arc<MemoryIdentification>,
    fasta: &Arc<Fasta>,
    parameters: &ProjectParameters,
    metrics: Metrics,
    cache: FeaturesCache,
) -> FeaturesGenerator {
    FeaturesGenerator::new(
        identification.clone(),
        fasta.clone(),
        Arc::new(parameters.modifications.clone()),
        parameters.digestion.clone(),
        metrics,
    )
    .with_spectrum_counting_parameters(parameters.spectrum_counting.clone())
    .with_display_parameters(parameters.display.clone())
    .with_cache(cache)
}

impl Project {
    pub fn details(&self) -> &ProjectDetails {
        &self.details
    }

    pub fn parameters(&self) -> &ProjectParameters {
        &self.parameters
    }

    pub fn identification(&self) -> &Arc<MemoryIdentification> {
        &self.identification
    }

    pub fn fasta(&self) -> &Arc<Fasta> {
        &self.fasta
    }

    pub fn generator(&self) -> &FeaturesGenerator {
        &self.generator
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    pub fn set_spectrum_counting_parameters(
        &mut self,
        parameters: SpectrumCountingParameters,
    ) -> Result<()> {
        self.generator
            .set_spectrum_counting_parameters(parameters.clone())?;
        self.parameters.spectrum_counting = parameters;
        Ok(())
    }

    pub fn set_display_parameters(&mut self, parameters: DisplayParameters) -> Result<()> {
        self.generator.set_display_parameters(parameters.clone())?;
        self.parameters.display = parameters;
        Ok(())
    }

    fn copy_data_files(&self) -> Result<()> {
        let data = self.folder.join(DATA_FOLDER);
        std::fs::create_dir_all(&data)?;
        for file in self.details.files() {
            let name = match file.file_name() {
                Some(name) => name,
                None => continue,
            };
            let target = data.join(name);
            if target.is_file() {
                continue;
            }
            match locate::resolve(file, &self.folder, None) {
                Some(source) => {
                    std::fs::copy(&source, &target)?;
                }
                None => log::warn!("{} not copied to the project", file.display()),
            }
        }
        Ok(())
    }

    /// Write every blob to the object store, then zip the project folder
    /// into `archive`
    pub fn save(&mut self, archive: &Path, options: SaveOptions) -> Result<()> {
        let start = Instant::now();
        self.details.version = env!("CARGO_PKG_VERSION").into();

        self.store
            .put(keys::IDENTIFICATION, &self.identification.snapshot())?;
        self.store.put(keys::PARAMETERS, &self.parameters)?;
        self.store.put(keys::METRICS, &self.generator.metrics()?)?;
        self.store.put(keys::PROJECT_DETAILS, &self.details)?;

        let cache = self.generator.cache();
        if options.clear_cache {
            cache.clear()?;
            self.store.remove(keys::FEATURES_CACHE);
        } else {
            self.store.put(keys::FEATURES_CACHE, &cache.snapshot())?;
        }
        self.store.flush()?;

        if options.include_data {
            self.copy_data_files()?;
        }
        if let Some(parent) = archive.parent() {
            std::fs::create_dir_all(parent)?;
        }
        archive::zip_folder(&self.root, archive)?;
        log::info!(
            "saved {} to {} in {}ms",
            self.details.name,
            archive.display(),
            start.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Holds at most one open project
#[derive(Default)]
pub enum ProjectManager {
    #[default]
    Unloaded,
    Loaded(Box<Project>),
}

impl ProjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ProjectManager::Loaded(_))
    }

    pub fn project(&self) -> Result<&Project> {
        match self {
            ProjectManager::Loaded(project) => Ok(project.as_ref()),
            ProjectManager::Unloaded => Err(Error::NotLoaded),
        }
    }

    pub fn project_mut(&mut self) -> Result<&mut Project> {
        match self {
            ProjectManager::Loaded(project) => Ok(project.as_mut()),
            ProjectManager::Unloaded => Err(Error::NotLoaded),
        }
    }

    /// Start a new project in `folder` from freshly imported results
    pub fn create<P: Into<PathBuf>>(
        &mut self,
        folder: P,
        details: ProjectDetails,
        parameters: ProjectParameters,
        identification: MemoryIdentification,
        fasta: Fasta,
        metrics: Metrics,
    ) -> Result<&mut Project> {
        self.close()?;
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;
        let store = ObjectStore::create(folder.join(format!("{}.{}", details.name, EXTENSION)));

        let identification = Arc::new(identification);
        let fasta = Arc::new(fasta);
        let cache = FeaturesCache::new(parameters.cache_bounds);
        let generator = generator(&identification, &fasta, &parameters, metrics, cache);

        *self = ProjectManager::Loaded(Box::new(Project {
            details,
            parameters,
            identification,
            fasta,
            generator,
            root: folder.clone(),
            folder,
            store,
            extracted: false,
        }));
        self.project_mut()
    }

    /// Open a project archive, closing the current project first.
    ///
    /// Returns `None` if the run was canceled. A canceled or failed load
    /// leaves no project loaded and no extraction folder behind
    pub fn load(
        &mut self,
        archive: &Path,
        fallback: Option<&Path>,
        waiting: &dyn WaitingHandler,
    ) -> Result<Option<LoadReport>> {
        self.close()?;
        let start = Instant::now();

        waiting.set_waiting_text("Unzipping project");
        let folder = archive::extraction_folder(archive);
        if folder.exists() {
            std::fs::remove_dir_all(&folder)?;
        }

        let loaded = archive::unzip(archive, &folder)
            .and_then(|_| read_extracted(&folder, fallback, waiting));
        let (project, report) = match loaded {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                std::fs::remove_dir_all(&folder)?;
                return Ok(None);
            }
            Err(e) => {
                match std::fs::remove_dir_all(&folder) {
                    Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                        log::warn!("cannot remove {}: {}", folder.display(), cleanup)
                    }
                    _ => {}
                }
                return Err(e);
            }
        };

        log::info!(
            "loaded {}: {} proteins, {} peptides, {} PSMs in {}ms",
            project.details.name,
            project.identification.n_proteins(),
            project.identification.n_peptides(),
            project.identification.n_spectra(),
            start.elapsed().as_millis()
        );
        *self = ProjectManager::Loaded(Box::new(project));
        Ok(Some(report))
    }

    pub fn save(&mut self, archive: &Path, options: SaveOptions) -> Result<()> {
        self.project_mut()?.save(archive, options)
    }

    /// Drop the current project, removing its extraction folder
    pub fn close(&mut self) -> Result<()> {
        if let ProjectManager::Loaded(project) = std::mem::take(self) {
            log::trace!("closing {}", project.details.name);
            if project.extracted {
                match std::fs::remove_dir_all(&project.root) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Build a project from an extracted archive in `root`.
///
/// Returns `None` if the run was canceled
fn read_extracted(
    root: &Path,
    fallback: Option<&Path>,
    waiting: &dyn WaitingHandler,
) -> Result<Option<(Project, LoadReport)>> {
    let mut report = LoadReport::default();

    waiting.set_waiting_text("Reading project");
    let store = ObjectStore::open(archive::find_store(root)?)?;
    let project_folder = store
        .path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());

    let snapshot: IdentificationSnapshot = store.get(keys::IDENTIFICATION)?;
    let identification = Arc::new(MemoryIdentification::from(snapshot));
    let parameters: ProjectParameters = store.get(keys::PARAMETERS)?;
    let mut details: ProjectDetails = store.get(keys::PROJECT_DETAILS)?;

    let metrics = match store.get_opt::<Metrics>(keys::METRICS)? {
        Some(metrics) => metrics,
        None => {
            report.metrics_collected = true;
            match Metrics::collect(identification.as_ref(), waiting)? {
                Some(metrics) => metrics,
                None => return Ok(None),
            }
        }
    };

    waiting.set_waiting_text("Locating files");
    let mut fasta = Fasta::default();
    if let Some(recorded) = details.fasta_file.clone() {
        match locate::resolve(&recorded, &project_folder, fallback) {
            Some(path) => {
                fasta = Fasta::parse(&std::fs::read_to_string(&path)?);
                details.fasta_file = Some(path);
            }
            None => report.missing_files.push(recorded),
        }
    }
    for recorded in details.spectrum_files.iter_mut() {
        match locate::resolve(recorded, &project_folder, fallback) {
            Some(path) => *recorded = path,
            None => report.missing_files.push(recorded.clone()),
        }
    }

    let cache = match store.get_opt::<CacheSnapshot>(keys::FEATURES_CACHE)? {
        Some(snapshot) => {
            let cache = FeaturesCache::from_snapshot(snapshot);
            cache.set_read_only(false);
            report.cache_restored = true;
            cache
        }
        None => FeaturesCache::new(parameters.cache_bounds),
    };

    let fasta = Arc::new(fasta);
    let generator = generator(&identification, &fasta, &parameters, metrics, cache);
    let project = Project {
        details,
        parameters,
        identification,
        fasta,
        generator,
        root: root.to_path_buf(),
        folder: project_folder,
        store,
        extracted: true,
    };
    Ok(Some((project, report)))
}
