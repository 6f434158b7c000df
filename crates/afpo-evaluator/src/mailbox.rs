//! Shared directory used as a rendezvous between the controller and evaluator processes.
//!
//! Every artifact is keyed by an individual id:
//!
//! | Artifact              | Written by  | Consumed by                          |
//! |-----------------------|-------------|--------------------------------------|
//! | `brain{id}.nndf`      | controller  | evaluator (usually deletes it)       |
//! | `tmp{id}.txt`         | evaluator   | renamed to the result artifact       |
//! | `fitness{id}.txt`     | evaluator   | controller, deleted after reading    |
//!
//! Each key has exactly one producer and one consumer, so there is no write contention. Results
//! are written to the staging name first and renamed into place, which keeps readers from ever
//! observing a partially written number. Artifacts left over by an aborted run are removed with
//! [`Mailbox::clear_stale`] before the first generation.

use std::{
    fs, io,
    num::ParseFloatError,
    path::{Path, PathBuf},
};

use afpo_core::{Fitness, IndividualId};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum MailboxError {
    #[display("failed to read result artifact {}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[display("result artifact {} is not a number: {content:?}", path.display())]
    Malformed {
        path: PathBuf,
        content: String,
        source: ParseFloatError,
    },
    #[display("result artifact {} contains NaN", path.display())]
    NotANumber {
        #[error(not(source))]
        path: PathBuf,
    },
    #[display("failed to remove artifact {}", path.display())]
    Remove { path: PathBuf, source: io::Error },
    #[display("failed to write result artifact {}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Brain,
    Staging,
    Result,
}

impl ArtifactKind {
    const ALL: [Self; 3] = [Self::Brain, Self::Staging, Self::Result];

    const fn prefix(self) -> &'static str {
        match self {
            Self::Brain => "brain",
            Self::Staging => "tmp",
            Self::Result => "fitness",
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Brain => ".nndf",
            Self::Staging | Self::Result => ".txt",
        }
    }

    fn file_name(self, id: IndividualId) -> String {
        format!("{}{id}{}", self.prefix(), self.extension())
    }

    /// Recognizes `{prefix}{digits}{extension}`.
    fn parse(file_name: &str) -> Option<(Self, IndividualId)> {
        Self::ALL.into_iter().find_map(|kind| {
            let digits = file_name
                .strip_prefix(kind.prefix())?
                .strip_suffix(kind.extension())?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let id = digits.parse().ok().map(IndividualId::new)?;
            Some((kind, id))
        })
    }
}

/// Filesystem mailbox rooted at a directory.
#[derive(Debug, Clone)]
pub struct Mailbox {
    dir: PathBuf,
}

impl Mailbox {
    pub fn new<P>(dir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn brain_path(&self, id: IndividualId) -> PathBuf {
        self.dir.join(ArtifactKind::Brain.file_name(id))
    }

    #[must_use]
    pub fn staging_path(&self, id: IndividualId) -> PathBuf {
        self.dir.join(ArtifactKind::Staging.file_name(id))
    }

    #[must_use]
    pub fn result_path(&self, id: IndividualId) -> PathBuf {
        self.dir.join(ArtifactKind::Result.file_name(id))
    }

    /// Consumes the result artifact for `id` if it exists.
    ///
    /// Returns `Ok(None)` while the evaluator has not finished. Once read, the artifact is
    /// deleted so that a later run reusing the id cannot pick it up.
    pub fn take_result(&self, id: IndividualId) -> Result<Option<Fitness>, MailboxError> {
        let path = self.result_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MailboxError::Read { path, source }),
        };
        let fitness = parse_fitness(&path, &content)?;
        fs::remove_file(&path).map_err(|source| MailboxError::Remove {
            path: path.clone(),
            source,
        })?;
        Ok(Some(fitness))
    }

    /// Publishes a result the way evaluators are expected to: staging file, then rename.
    pub fn post_result(&self, id: IndividualId, fitness: Fitness) -> Result<(), MailboxError> {
        let staging = self.staging_path(id);
        fs::write(&staging, fitness.to_string()).map_err(|source| MailboxError::Write {
            path: staging.clone(),
            source,
        })?;
        let path = self.result_path(id);
        fs::rename(&staging, &path).map_err(|source| MailboxError::Write { path, source })
    }

    /// Removes the brain description for `id`, if the evaluator has not already done so.
    pub fn discard_brain(&self, id: IndividualId) -> Result<(), MailboxError> {
        let path = self.brain_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MailboxError::Remove { path, source }),
        }
    }

    /// Deletes every brain, staging and result artifact in the directory.
    ///
    /// Other files are left alone. Creates the directory if it does not exist yet. Returns the
    /// number of files removed.
    pub fn clear_stale(&self) -> io::Result<usize> {
        fs::create_dir_all(&self.dir)?;
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if ArtifactKind::parse(name).is_some() {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(removed)
    }
}

fn parse_fitness(path: &Path, content: &str) -> Result<Fitness, MailboxError> {
    let fitness = content
        .trim()
        .parse::<Fitness>()
        .map_err(|source| MailboxError::Malformed {
            path: path.to_owned(),
            content: content.to_owned(),
            source,
        })?;
    if fitness.is_nan() {
        return Err(MailboxError::NotANumber {
            path: path.to_owned(),
        });
    }
    Ok(fitness)
}
