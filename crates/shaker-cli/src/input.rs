use anyhow::{ensure, Context};
use clap::{value_parser, Arg, ArgMatches, Command, ValueHint};
use serde::{Deserialize, Serialize};
use shaker_core::parameters::{DisplayParameters, SpectrumCountingBuilder, SpectrumCountingParameters};
use std::path::PathBuf;

pub fn command() -> Command {
    Command::new("shaker")
        .version(clap::crate_version!())
        .about("Protein, peptide and PSM feature reports from a proteomics project")
        .arg(
            Arg::new("project")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to the project archive (zip)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("parameters")
                .short('p')
                .long("parameters")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to report settings (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where reports will be written. Overrides the directory \
                     specified in the settings file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("fallback_folder")
                .short('f')
                .long("fallback_folder")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Folder searched for FASTA and spectrum files the project cannot locate")
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("save")
                .short('s')
                .long("save")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Save the project, with its features cache, to this archive")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("clear-cache")
                .long("clear-cache")
                .action(clap::ArgAction::SetTrue)
                .help("Do not store computed features in the saved project"),
        )
        .arg(
            Arg::new("include-data")
                .long("include-data")
                .action(clap::ArgAction::SetTrue)
                .help("Copy FASTA and spectrum files into the saved project"),
        )
        .arg(
            Arg::new("psms")
                .long("psms")
                .action(clap::ArgAction::SetTrue)
                .help("Also write a PSM report"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(clap::ArgAction::SetTrue)
                .help("Hide progress bars"),
        )
}

/// Changes to the display parameters stored in the project
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DisplayOptions {
    pub hide_decoys: Option<bool>,
    pub show_hidden: Option<bool>,
    pub displayed_modifications: Option<Vec<String>>,
}

impl DisplayOptions {
    pub fn is_empty(&self) -> bool {
        self == &DisplayOptions::default()
    }

    pub fn apply(&self, mut parameters: DisplayParameters) -> DisplayParameters {
        if let Some(hide_decoys) = self.hide_decoys {
            parameters.hide_decoys = hide_decoys;
        }
        if let Some(show_hidden) = self.show_hidden {
            parameters.show_hidden = show_hidden;
        }
        if let Some(modifications) = &self.displayed_modifications {
            parameters = parameters.with_modifications(modifications.iter().cloned());
        }
        parameters
    }
}

#[derive(Serialize)]
/// Actual report settings - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub project: PathBuf,
    /// `None` keeps the parameters stored in the project
    pub spectrum_counting: Option<SpectrumCountingParameters>,
    pub display: DisplayOptions,
    pub fallback_folder: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub clear_cache: bool,
    pub include_data: bool,
    pub write_psms: bool,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input report settings deserialized from JSON file
pub struct Input {
    project: Option<String>,
    spectrum_counting: Option<SpectrumCountingBuilder>,
    display: Option<DisplayOptions>,
    output_directory: Option<String>,
    fallback_folder: Option<String>,
    save: Option<String>,
    clear_cache: Option<bool>,
    include_data: Option<bool>,
    write_psms: Option<bool>,
}

impl Input {
    pub fn from_arguments(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            None => Input::default(),
        };

        if let Some(project) = matches.get_one::<String>("project") {
            input.project = Some(project.into());
        }
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(fallback_folder) = matches.get_one::<String>("fallback_folder") {
            log::trace!("overriding `fallback_folder` parameter.");
            input.fallback_folder = Some(fallback_folder.into());
        }
        if let Some(save) = matches.get_one::<String>("save") {
            log::trace!("overriding `save` parameter.");
            input.save = Some(save.into());
        }
        if matches.get_flag("clear-cache") {
            input.clear_cache = Some(true);
        }
        if matches.get_flag("include-data") {
            input.include_data = Some(true);
        }
        if matches.get_flag("psms") {
            input.write_psms = Some(true);
        }

        ensure!(
            input.project.is_some(),
            "`project` must be set. For more information try '--help'"
        );
        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let project = self
            .project
            .map(PathBuf::from)
            .context("`project` must be set. For more information try '--help'")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path)?;
                path
            }
            None => std::env::current_dir()?,
        };

        let include_data = self.include_data.unwrap_or(false);
        let clear_cache = self.clear_cache.unwrap_or(false);
        if self.save.is_none() && (include_data || clear_cache) {
            log::warn!("`include_data` and `clear_cache` only apply when `save` is set");
        }

        Ok(Settings {
            version: clap::crate_version!().into(),
            project,
            spectrum_counting: self.spectrum_counting.map(Into::into),
            display: self.display.unwrap_or_default(),
            fallback_folder: self.fallback_folder.map(PathBuf::from),
            save: self.save.map(PathBuf::from),
            clear_cache,
            include_data,
            write_psms: self.write_psms.unwrap_or(false),
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use shaker_core::parameters::{SpectrumCountingMethod, Units};

    #[test]
    fn command_line_overrides() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let parameters = dir.path().join("settings.json");
        std::fs::write(
            &parameters,
            r#"{
                "spectrum_counting": { "method": "empai", "normalize": true, "units": "percentage" },
                "display": { "displayed_modifications": ["Oxidation of M"] },
                "save": "from_json.zip",
                "write_psms": false
            }"#,
        )?;
        let output = dir.path().join("out");

        let matches = command().try_get_matches_from([
            "shaker",
            "project.zip",
            "-p",
            parameters.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--save",
            "other.zip",
            "--psms",
        ])?;
        let settings = Input::from_arguments(&matches)?.build()?;

        assert_eq!(settings.project, PathBuf::from("project.zip"));
        assert_eq!(settings.save, Some(PathBuf::from("other.zip")));
        assert!(settings.write_psms);
        assert!(!settings.clear_cache);
        assert_eq!(settings.output_directory, output);
        assert!(output.is_dir());

        let counting = settings.spectrum_counting.unwrap();
        assert_eq!(counting.method, SpectrumCountingMethod::Empai);
        assert_eq!(counting.units, Units::Percentage);

        let display = settings.display.apply(DisplayParameters::default());
        assert!(display.is_displayed("Oxidation of M"));
        assert!(display.hide_decoys);
        Ok(())
    }

    #[test]
    fn defaults_keep_project_parameters() -> anyhow::Result<()> {
        let matches = command().try_get_matches_from(["shaker", "project.zip"])?;
        let settings = Input::from_arguments(&matches)?.build()?;
        assert!(settings.spectrum_counting.is_none());
        assert!(settings.display.is_empty());
        assert_eq!(settings.save, None);
        Ok(())
    }

    #[test]
    fn project_is_required() {
        assert!(command().try_get_matches_from(["shaker"]).is_err());
    }
}
