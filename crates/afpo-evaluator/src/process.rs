//! Evaluation through one external process per individual.

use std::{
    collections::HashMap,
    ffi::OsString,
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use afpo_core::{Fitness, Genome, IndividualId};
use tracing::{debug, warn};

use crate::{
    BrainLayout, EvaluationError, EvaluationMode, FitnessEvaluator, Mailbox, brain,
};

/// Program and leading arguments used to start an evaluator.
///
/// The evaluation mode and the individual id are appended as the last two arguments, e.g.
/// `python3 simulate.py DIRECT 17`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl EvaluatorCommand {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits `argv` into program and arguments. Returns `None` if `argv` is empty.
    pub fn from_argv<I, A>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }

    fn to_command(&self, mode: EvaluationMode, id: IndividualId) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(mode.to_string())
            .arg(id.to_string());
        command
    }
}

/// How results are waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Fixed delay between checks for the result artifact.
    pub interval: Duration,
    /// Maximum time to wait for one result; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Launches one evaluator process per submitted individual and collects results through a
/// [`Mailbox`].
///
/// Processes still running when the evaluator is dropped are killed.
#[derive(Debug)]
pub struct ProcessEvaluator {
    mailbox: Mailbox,
    command: EvaluatorCommand,
    layout: BrainLayout,
    poll: PollSettings,
    children: Mutex<HashMap<IndividualId, Child>>,
}

impl ProcessEvaluator {
    #[must_use]
    pub fn new(
        mailbox: Mailbox,
        command: EvaluatorCommand,
        layout: BrainLayout,
        poll: PollSettings,
    ) -> Self {
        Self {
            mailbox,
            command,
            layout,
            poll,
            children: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Number of evaluator processes that have been started but not yet collected.
    #[must_use]
    pub fn running(&self) -> usize {
        self.children().len()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<IndividualId, Child>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the exit status of the evaluator for `id` if it has terminated.
    fn try_wait(&self, id: IndividualId) -> Result<Option<ExitStatus>, EvaluationError> {
        let mut children = self.children();
        let child = children
            .get_mut(&id)
            .ok_or(EvaluationError::NotSubmitted { id })?;
        child
            .try_wait()
            .map_err(|source| EvaluationError::Wait { id, source })
    }

    /// Waits for the evaluator of a consumed result and forgets it.
    fn reap(&self, id: IndividualId) {
        let child = self.children().remove(&id);
        if let Some(mut child) = child
            && let Err(e) = child.wait()
        {
            warn!(%id, error = %e, "failed to reap evaluator process");
        }
    }

    fn kill(&self, id: IndividualId) {
        let child = self.children().remove(&id);
        if let Some(mut child) = child {
            if let Err(e) = child.kill() {
                debug!(%id, error = %e, "evaluator process already gone");
            }
            let _ = child.wait();
        }
    }

    fn finish(&self, id: IndividualId, fitness: Fitness) -> Fitness {
        self.reap(id);
        if let Err(e) = self.mailbox.discard_brain(id) {
            warn!(%id, error = %e, "failed to clean up brain description");
        }
        debug!(%id, fitness, "evaluation finished");
        fitness
    }
}

impl FitnessEvaluator for ProcessEvaluator {
    fn prepare(&self) -> Result<(), EvaluationError> {
        let removed =
            self.mailbox
                .clear_stale()
                .map_err(|source| EvaluationError::ClearStale {
                    dir: self.mailbox.dir().to_owned(),
                    source,
                })?;
        if removed > 0 {
            warn!(
                removed,
                dir = %self.mailbox.dir().display(),
                "removed artifacts left over from a previous run"
            );
        }
        Ok(())
    }

    fn submit(
        &self,
        id: IndividualId,
        genome: &Genome,
        mode: EvaluationMode,
    ) -> Result<(), EvaluationError> {
        brain::write_brain_file(self.mailbox.brain_path(id), genome, &self.layout)
            .map_err(|source| EvaluationError::WriteBrain { id, source })?;

        let mut command = self.command.to_command(mode, id);
        command
            .current_dir(self.mailbox.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        let child = command
            .spawn()
            .map_err(|source| EvaluationError::Spawn { id, source })?;
        debug!(%id, %mode, pid = child.id(), "evaluator started");

        if let Some(mut previous) = self.children().insert(id, child) {
            warn!(%id, "individual submitted twice; killing the earlier evaluator");
            let _ = previous.kill();
            let _ = previous.wait();
        }
        Ok(())
    }

    fn await_result(&self, id: IndividualId) -> Result<Fitness, EvaluationError> {
        let started = Instant::now();
        loop {
            if let Some(fitness) = self.mailbox.take_result(id)? {
                return Ok(self.finish(id, fitness));
            }
            if let Some(status) = self.try_wait(id)? {
                // the result may have been renamed into place just before the process exited
                if let Some(fitness) = self.mailbox.take_result(id)? {
                    return Ok(self.finish(id, fitness));
                }
                self.children().remove(&id);
                let _ = self.mailbox.discard_brain(id);
                return Err(EvaluationError::Exited { id, status });
            }
            if let Some(timeout) = self.poll.timeout
                && started.elapsed() >= timeout
            {
                self.kill(id);
                let _ = self.mailbox.discard_brain(id);
                return Err(EvaluationError::TimedOut { id, timeout });
            }
            thread::sleep(self.poll.interval);
        }
    }
}

impl Drop for ProcessEvaluator {
    fn drop(&mut self) {
        let children = self
            .children
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, mut child) in children.drain() {
            debug!(%id, "killing unfinished evaluator");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
