use super::input::Settings;
use super::progress::ProgressHandler;
use anyhow::{anyhow, Context};
use log::info;
use shaker_core::features::FeaturesGenerator;
use shaker_core::Key;
use shaker_project::project::{Project, ProjectManager, SaveOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct Runner {
    pub parameters: Settings,
    manager: ProjectManager,
    pub(crate) progress: ProgressHandler,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Settings, progress: bool) -> anyhow::Result<Self> {
        let start = Instant::now();
        let progress = ProgressHandler::new(progress);
        let mut manager = ProjectManager::new();

        let report = manager
            .load(
                &parameters.project,
                parameters.fallback_folder.as_deref(),
                &progress,
            )
            .with_context(|| format!("Failed to load project `{}`", parameters.project.display()))?
            .ok_or_else(|| anyhow!("loading `{}` was canceled", parameters.project.display()))?;

        for file in &report.missing_files {
            log::warn!(
                "`{}` could not be located, try setting `fallback_folder`",
                file.display()
            );
        }
        if report.cache_restored {
            info!("restored features cache");
        }

        let project = manager.project_mut()?;
        if let Some(counting) = &parameters.spectrum_counting {
            project.set_spectrum_counting_parameters(counting.clone())?;
        }
        if !parameters.display.is_empty() {
            let display = parameters.display.apply(project.parameters().display.clone());
            project.set_display_parameters(display)?;
        }

        Ok(Self {
            parameters,
            manager,
            progress,
            start,
        })
    }

    pub(crate) fn project(&self) -> anyhow::Result<&Project> {
        Ok(self.manager.project()?)
    }

    pub(crate) fn generator(&self) -> anyhow::Result<&FeaturesGenerator> {
        Ok(self.project()?.generator())
    }

    // Create a path for `file_name` in the output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    fn displayed_proteins(&self) -> anyhow::Result<Arc<Vec<Key>>> {
        self.generator()?
            .displayed_protein_keys(&self.progress)?
            .ok_or_else(|| anyhow!("protein ordering was canceled"))
    }

    pub fn run(mut self) -> anyhow::Result<Settings> {
        let proteins = self.displayed_proteins()?;
        let generator = self.generator()?;
        generator
            .populate_protein_features(&proteins, &self.progress)?
            .ok_or_else(|| anyhow!("feature computation was canceled"))?;

        let metrics = generator.metrics()?;
        info!(
            "{} validated proteins, {} confident",
            metrics.n_validated_proteins.unwrap_or_default(),
            metrics.n_confident_proteins.unwrap_or_default()
        );

        let mut output_paths = vec![self.write_proteins(&proteins)?];
        let peptides = self.protein_peptides(&proteins)?;
        output_paths.push(self.write_peptides(&peptides)?);
        if self.parameters.write_psms {
            output_paths.push(self.write_psms(&peptides)?);
        }
        self.parameters.output_paths.extend(output_paths);
        self.progress.finish();

        if let Some(archive) = self.parameters.save.clone() {
            let options = SaveOptions {
                clear_cache: self.parameters.clear_cache,
                include_data: self.parameters.include_data,
            };
            self.manager
                .save(&archive, options)
                .with_context(|| format!("Failed to save project to `{}`", archive.display()))?;
            self.parameters.output_paths.push(archive.display().to_string());
        }

        let path = self.make_path("results.json");
        self.parameters.output_paths.push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)?;
        self.manager.close()?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}
