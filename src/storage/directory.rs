//! A filesystem backed store of chart records.
//!
//! The [`Directory`] manages an organizational chart persisted as YAML files
//! under a root directory. It is a wrapper around the filesystem agnostic
//! [`Chart`]. Mutations write through eagerly: every successful change is on
//! disk before the call returns.
//!
//! Layout under the root:
//!
//! ```text
//! config.toml
//! levels/<uuid>.yaml
//! qualifications/<uuid>.yaml
//! people/<uuid>.yaml
//! units/<uuid>.yaml     (assignment history embedded)
//! ```

use std::{
    ffi::OsStr,
    fmt, io,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use nonempty::NonEmpty;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::de::DeserializeOwned;
use walkdir::WalkDir;

use super::records::{LevelRecord, PersonRecord, QualificationRecord, UnitRecord};
use crate::domain::{
    Chart, Config, Level, Person, Qualification, SaveError, SaveOutcome, Unit, ValidationError,
};

const LEVELS_DIR: &str = "levels";
const QUALIFICATIONS_DIR: &str = "qualifications";
const PEOPLE_DIR: &str = "people";
const UNITS_DIR: &str = "units";

/// State of a directory whose records have been read into memory.
#[derive(Debug, Clone)]
pub struct Loaded {
    chart: Chart,
    config: Config,
}

/// State of a directory that has not been read yet.
#[derive(Debug, PartialEq, Eq)]
pub struct Unloaded;

/// A filesystem backed store of chart records.
#[derive(Debug)]
pub struct Directory<S> {
    /// The root of the directory records are stored in.
    root: PathBuf,
    state: S,
}

impl Directory<Unloaded> {
    /// Opens a directory at the given path.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: Unloaded,
        }
    }

    /// Create the store scaffolding: the record subdirectories and a default
    /// `config.toml` (only if one does not already exist).
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or the default
    /// configuration cannot be written.
    pub fn init(&self) -> Result<(), InitError> {
        for sub in [LEVELS_DIR, QUALIFICATIONS_DIR, PEOPLE_DIR, UNITS_DIR] {
            std::fs::create_dir_all(self.root.join(sub))?;
        }
        let config_path = self.root.join("config.toml");
        if !config_path.exists() {
            Config::default()
                .save(&config_path)
                .map_err(InitError::Config)?;
        }
        Ok(())
    }

    /// Load all records from disk.
    ///
    /// # Errors
    ///
    /// Behaviour depends on the configuration file in the store root. If
    /// `allow_unrecognised` is `true`, YAML files that cannot be parsed as
    /// records are skipped. If it is `false` (the default), any unparseable
    /// file fails the load. Records that parse but violate a domain invariant
    /// (duplicate ids, inverted employment windows, overlapping assignment
    /// history) always fail the load.
    pub fn load_all(self) -> Result<Directory<Loaded>, DirectoryLoadError> {
        let config = load_config(&self.root);

        let (levels, mut unrecognised) = load_kind::<LevelRecord>(&self.root, LEVELS_DIR);
        let (qualifications, bad) =
            load_kind::<QualificationRecord>(&self.root, QUALIFICATIONS_DIR);
        unrecognised.extend(bad);
        let (people, bad) = load_kind::<PersonRecord>(&self.root, PEOPLE_DIR);
        unrecognised.extend(bad);
        let (units, bad) = load_kind::<UnitRecord>(&self.root, UNITS_DIR);
        unrecognised.extend(bad);

        if !config.allow_unrecognised && !unrecognised.is_empty() {
            return Err(DirectoryLoadError::UnrecognisedFiles(unrecognised));
        }

        let mut chart = Chart::new();
        for (_, record) in levels {
            chart.add_level(record.into());
        }
        for (_, record) in qualifications {
            chart.add_qualification(record.into());
        }
        for (path, record) in people {
            chart
                .add_person(record.into())
                .map_err(|e| DirectoryLoadError::Invalid {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
        }

        let mut histories = Vec::new();
        for (path, record) in units {
            let (unit, history) = record.into_parts();
            if chart.unit(unit.id).is_some() {
                return Err(DirectoryLoadError::Invalid {
                    path,
                    message: format!("duplicate unit id {}", unit.id),
                });
            }
            chart.insert_unit(unit);
            histories.push((path, history));
        }
        for (path, history) in histories {
            for assignment in history {
                chart
                    .restore_assignment(assignment)
                    .map_err(|e| DirectoryLoadError::Invalid {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(Directory {
            root: self.root,
            state: Loaded { chart, config },
        })
    }
}

impl Directory<Loaded> {
    /// The in-memory chart.
    #[must_use]
    pub const fn chart(&self) -> &Chart {
        &self.state.chart
    }

    /// The store configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.state.config
    }

    /// The store root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a level and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record file cannot be written.
    pub fn add_level(&mut self, level: Level) -> Result<(), PersistError> {
        let path = self.record_path(LEVELS_DIR, level.id);
        write_yaml(&path, &LevelRecord::from(level.clone()))?;
        self.state.chart.add_level(level);
        Ok(())
    }

    /// Register a qualification and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record file cannot be written.
    pub fn add_qualification(&mut self, qualification: Qualification) -> Result<(), PersistError> {
        let path = self.record_path(QUALIFICATIONS_DIR, qualification.id);
        write_yaml(&path, &QualificationRecord::from(qualification.clone()))?;
        self.state.chart.add_qualification(qualification);
        Ok(())
    }

    /// Register a person and persist them.
    ///
    /// # Errors
    ///
    /// Returns an error if the person's employment window is inverted or the
    /// record file cannot be written.
    pub fn add_person(&mut self, person: Person) -> Result<(), AddPersonError> {
        self.state.chart.add_person(person.clone())?;
        let path = self.record_path(PEOPLE_DIR, person.id);
        write_yaml(&path, &PersonRecord::from(person))?;
        Ok(())
    }

    /// Create or update a unit through the chart's lifecycle path and persist
    /// the result.
    ///
    /// # Errors
    ///
    /// Validation failures leave both memory and disk untouched. A
    /// reconciliation failure means the unit itself was saved (in memory and
    /// on disk) but its manager history is not synchronized; retrying with
    /// the same inputs is safe.
    pub fn save_unit(
        &mut self,
        unit: Unit,
        today: NaiveDate,
    ) -> Result<SaveOutcome, SaveUnitError> {
        let id = unit.id;
        match self.state.chart.save_unit(unit, today) {
            Ok(outcome) => {
                self.write_unit(id)?;
                Ok(outcome)
            }
            Err(error @ SaveError::Reconciliation(_)) => {
                // The unit was persisted in memory; keep the file in sync
                // before surfacing the error.
                self.write_unit(id)?;
                Err(error.into())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Remove a unit and its whole subtree, deleting the record files and the
    /// embedded assignment history. Returns the number of units removed.
    ///
    /// # Errors
    ///
    /// This method does not fail fast: it removes every file it can before
    /// reporting the ones it could not.
    pub fn remove_unit(&mut self, id: uuid::Uuid) -> Result<usize, RemoveUnitError> {
        let mut subtree = Vec::new();
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            subtree.push(current);
            queue.extend(self.state.chart.children_of(current));
        }

        let removed = self.state.chart.remove_unit(id);
        if removed == 0 {
            return Ok(0);
        }

        let failures: Vec<_> = subtree
            .iter()
            .filter_map(|unit_id| {
                let path = self.record_path(UNITS_DIR, *unit_id);
                match std::fs::remove_file(&path) {
                    Ok(()) => None,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(e) => Some((path, e)),
                }
            })
            .collect();

        NonEmpty::from_vec(failures).map_or(Ok(removed), |failures| Err(RemoveUnitError { failures }))
    }

    fn write_unit(&self, id: uuid::Uuid) -> Result<(), PersistError> {
        let Some(unit) = self.state.chart.unit(id) else {
            return Ok(());
        };
        let record = UnitRecord::new(unit.clone(), self.state.chart.history(id));
        write_yaml(&self.record_path(UNITS_DIR, id), &record)
    }

    fn record_path(&self, sub: &str, id: uuid::Uuid) -> PathBuf {
        self.root.join(sub).join(format!("{id}.yaml"))
    }
}

/// Errors from [`Directory::init`].
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// A store directory could not be created.
    #[error("failed to create store directory: {0}")]
    Io(#[from] io::Error),
    /// The default configuration could not be written.
    #[error("{0}")]
    Config(String),
}

/// Errors from [`Directory::load_all`].
#[derive(Debug, thiserror::Error)]
pub enum DirectoryLoadError {
    /// YAML files that could not be parsed as records, rejected because
    /// `allow_unrecognised` is off.
    UnrecognisedFiles(Vec<PathBuf>),
    /// A record parsed but violates a domain invariant.
    Invalid {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },
}

impl fmt::Display for DirectoryLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognisedFiles(paths) => {
                write!(f, "Unrecognised files: ")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            Self::Invalid { path, message } => {
                write!(f, "Invalid record {}: {message}", path.display())
            }
        }
    }
}

/// A record file could not be written.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Serialization to YAML failed.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_yaml::Error),
    /// The file could not be written.
    #[error("failed to write record: {0}")]
    Io(#[from] io::Error),
}

/// Errors from [`Directory::add_person`].
#[derive(Debug, thiserror::Error)]
pub enum AddPersonError {
    /// The person record is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The record file could not be written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors from [`Directory::save_unit`].
#[derive(Debug, thiserror::Error)]
pub enum SaveUnitError {
    /// The chart rejected the save, or saved it without reconciling history.
    #[error(transparent)]
    Chart(#[from] SaveError),
    /// The unit record could not be written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Some unit record files could not be deleted.
#[derive(Debug, thiserror::Error)]
pub struct RemoveUnitError {
    failures: NonEmpty<(PathBuf, io::Error)>,
}

impl fmt::Display for RemoveUnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_DISPLAY: usize = 5;

        write!(f, "failed to remove unit records: ")?;

        let total = self.failures.len();

        let displayed_paths: Vec<String> = self
            .failures
            .iter()
            .take(MAX_DISPLAY)
            .map(|(p, _e)| p.display().to_string())
            .collect();

        let msg = displayed_paths.join(", ");

        if total <= MAX_DISPLAY {
            write!(f, "{msg}")
        } else {
            write!(f, "{msg}... (and {} more)", total - MAX_DISPLAY)
        }
    }
}

fn write_yaml<T: serde::Serialize>(path: &Path, record: &T) -> Result<(), PersistError> {
    let content = serde_yaml::to_string(record)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn load_config(root: &Path) -> Config {
    let path = root.join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

fn collect_yaml_paths(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            let ext = entry.path().extension();
            ext == Some(OsStr::new("yaml")) || ext == Some(OsStr::new("yml"))
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn load_kind<T>(root: &Path, sub: &str) -> (Vec<(PathBuf, T)>, Vec<PathBuf>)
where
    T: DeserializeOwned + Send,
{
    let paths = collect_yaml_paths(&root.join(sub));

    let parsed: Vec<Result<(PathBuf, T), PathBuf>> =
        paths.par_iter().map(|path| try_parse(path)).collect();

    let mut records = Vec::new();
    let mut unrecognised = Vec::new();
    for result in parsed {
        match result {
            Ok(record) => records.push(record),
            Err(path) => unrecognised.push(path),
        }
    }
    (records, unrecognised)
}

fn try_parse<T: DeserializeOwned>(path: &Path) -> Result<(PathBuf, T), PathBuf> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        tracing::debug!("Failed to read {}: {e}", path.display());
        path.to_path_buf()
    })?;
    match serde_yaml::from_str(&content) {
        Ok(record) => Ok((path.to_path_buf(), record)),
        Err(e) => {
            tracing::debug!("Skipping unparseable record at {}: {e}", path.display());
            Err(path.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn setup_store() -> (TempDir, Directory<Loaded>) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let dir = Directory::new(tmp.path().to_path_buf());
        dir.init().unwrap();
        (tmp, dir.load_all().unwrap())
    }

    #[test]
    fn init_creates_scaffolding() {
        let tmp = TempDir::new().unwrap();
        Directory::new(tmp.path().to_path_buf()).init().unwrap();

        for sub in ["levels", "qualifications", "people", "units"] {
            assert!(tmp.path().join(sub).is_dir());
        }
        assert!(tmp.path().join("config.toml").is_file());
    }

    #[test]
    fn records_survive_a_reload() {
        let (tmp, mut dir) = setup_store();

        let level = Level::new("Direzione", 1, true);
        dir.add_level(level.clone()).unwrap();

        let person = Person::new("Maria", "Rossi", d("2020-01-01"));
        let person_id = person.id;
        dir.add_person(person).unwrap();

        let unit = Unit::new("Ragioneria", level.id, d("2021-01-01")).with_manager(person_id);
        let outcome = dir.save_unit(unit, d("2021-01-01")).unwrap();
        assert_eq!(outcome.code.to_string(), "1");

        let reloaded = Directory::new(tmp.path().to_path_buf()).load_all().unwrap();
        let chart = reloaded.chart();

        let loaded = chart.unit(outcome.unit).expect("unit should reload");
        assert_eq!(loaded.name, "Ragioneria");
        assert_eq!(loaded.code.as_ref().unwrap().to_string(), "1");
        assert_eq!(chart.history(outcome.unit).len(), 1);
        assert_eq!(
            chart.manager_on(outcome.unit, d("2022-01-01")).unwrap().id,
            person_id
        );
        assert_eq!(chart.levels().get(level.id).unwrap().name, "Direzione");
    }

    #[test]
    fn manager_change_persists_closed_record() {
        let (tmp, mut dir) = setup_store();
        let level = Level::new("Direzione", 1, true);
        dir.add_level(level.clone()).unwrap();

        let anna = Person::new("Anna", "Bianchi", d("2019-01-01"));
        let bruno = Person::new("Bruno", "Verdi", d("2019-01-01"));
        let (anna_id, bruno_id) = (anna.id, bruno.id);
        dir.add_person(anna).unwrap();
        dir.add_person(bruno).unwrap();

        let unit = Unit::new("Ragioneria", level.id, d("2021-01-01")).with_manager(anna_id);
        let saved = dir.save_unit(unit, d("2021-01-01")).unwrap();

        let mut changed = dir.chart().unit(saved.unit).unwrap().clone();
        changed.manager = Some(bruno_id);
        dir.save_unit(changed, d("2022-03-10")).unwrap();

        let reloaded = Directory::new(tmp.path().to_path_buf()).load_all().unwrap();
        let history = reloaded.chart().history(saved.unit);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].person, anna_id);
        assert_eq!(history[0].to, Some(d("2022-03-09")));
        assert_eq!(history[1].person, bruno_id);
        assert_eq!(history[1].to, None);
    }

    #[test]
    fn unrecognised_file_fails_load_by_default() {
        let (tmp, _dir) = setup_store();
        std::fs::write(tmp.path().join("units/notes.yaml"), "just: notes\n").unwrap();

        let error = Directory::new(tmp.path().to_path_buf())
            .load_all()
            .unwrap_err();
        assert!(matches!(error, DirectoryLoadError::UnrecognisedFiles(_)));
    }

    #[test]
    fn unrecognised_file_is_skipped_when_allowed() {
        let (tmp, _dir) = setup_store();
        std::fs::write(
            tmp.path().join("config.toml"),
            "_version = \"1\"\nallow_unrecognised = true\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join("units/notes.yaml"), "just: notes\n").unwrap();

        let loaded = Directory::new(tmp.path().to_path_buf()).load_all().unwrap();
        assert_eq!(loaded.chart().unit_count(), 0);
    }

    #[test]
    fn overlapping_history_on_disk_fails_load() {
        let (tmp, mut dir) = setup_store();
        let level = Level::new("Direzione", 1, true);
        dir.add_level(level.clone()).unwrap();
        let unit = Unit::new("Ragioneria", level.id, d("2021-01-01"));
        let saved = dir.save_unit(unit, d("2021-01-01")).unwrap();

        // Hand-edit the unit file to contain two open assignments.
        let path = tmp.path().join(format!("units/{}.yaml", saved.unit));
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(&format!(
            "assignments:\n- id: {}\n  person: {}\n  from: 2021-01-01\n- id: {}\n  person: {}\n  from: 2022-01-01\n",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        ));
        std::fs::write(&path, content).unwrap();

        let error = Directory::new(tmp.path().to_path_buf())
            .load_all()
            .unwrap_err();
        assert!(matches!(error, DirectoryLoadError::Invalid { .. }));
    }

    #[test]
    fn remove_unit_deletes_record_files() {
        let (tmp, mut dir) = setup_store();
        let direzione = Level::new("Direzione", 1, true);
        let settore = Level::new("Settore", 3, false);
        dir.add_level(direzione.clone()).unwrap();
        dir.add_level(settore.clone()).unwrap();

        let root = dir
            .save_unit(
                Unit::new("Direzione", direzione.id, d("2021-01-01")),
                d("2021-01-01"),
            )
            .unwrap();
        let child = dir
            .save_unit(
                Unit::new("Settore", settore.id, d("2021-01-01")).with_parent(root.unit),
                d("2021-01-01"),
            )
            .unwrap();

        let removed = dir.remove_unit(root.unit).unwrap();
        assert_eq!(removed, 2);
        assert!(!tmp.path().join(format!("units/{}.yaml", root.unit)).exists());
        assert!(!tmp.path().join(format!("units/{}.yaml", child.unit)).exists());
        assert_eq!(dir.chart().unit_count(), 0);
    }

    #[test]
    fn validation_failure_writes_nothing() {
        let (tmp, mut dir) = setup_store();
        let settore = Level::new("Settore", 3, false);
        dir.add_level(settore.clone()).unwrap();

        let unit = Unit::new("Orphan", settore.id, d("2021-01-01"));
        let id = unit.id;
        let error = dir.save_unit(unit, d("2021-01-01")).unwrap_err();
        assert!(matches!(
            error,
            SaveUnitError::Chart(SaveError::Validation(_))
        ));
        assert!(!tmp.path().join(format!("units/{id}.yaml")).exists());
    }
}
