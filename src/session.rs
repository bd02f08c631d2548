//! Per-peer protocol state and the run-counting policy.
//!
//! A [`Session`] tracks the one remote shell the driver talks to. Every
//! completion token in an inbound datagram is one trigger; the session's
//! [`Strategy`] turns triggers into the commands to send back, and the
//! completed-run counter decides when automated driving stops.

use std::net::SocketAddr;

use rand::rngs::StdRng;

use crate::batch::BatchGenerator;

/// Launches a fresh shell on the remote.
pub const LAUNCH_COMMAND: &str = "exec sosh";

/// Launches the shell as a background process.
pub const BACKGROUND_LAUNCH_COMMAND: &str = "exec sosh &";

/// Leaves the current shell.
pub const EXIT_COMMAND: &str = "exit";

/// The prompt character the remote prints when it is ready for input.
pub const DEFAULT_COMPLETION_TOKEN: u8 = b'$';

/// How many times launch and exit are sent in a batch-injection cycle.
/// Datagrams can be lost, and a lost launch or exit stalls the remote.
pub const CONTROL_REPEAT: usize = 2;

/// Budget a fresh (or restarted) batch-injection session starts with, so the
/// very first trigger fires a cycle.
const INITIAL_BUDGET: i64 = 1;

/// Protocol state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// Next trigger launches a shell.
    #[default]
    Exec,
    /// Next trigger exits the shell (alternating strategy only).
    Exit,
    /// Target reached; triggers are counted but nothing is sent.
    Done,
}

/// How triggers are turned into outbound commands.
#[derive(Debug)]
pub enum Strategy {
    /// Launch and exit in turn, one command per trigger.
    Alternating,
    /// Launch twice, inject a random batch, exit twice, then wait for every
    /// one of those commands to echo a prompt back before the next cycle.
    BatchInjection {
        generator: BatchGenerator,
        rng: StdRng,
    },
}

/// What a session wants done after processing some triggers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Commands to send to the remote, in order.
    pub commands: Vec<String>,
    /// Set when this call moved the session into [`State::Done`].
    pub finished: bool,
}

#[derive(Debug)]
pub struct Session {
    remote: Option<SocketAddr>,
    state: State,
    completed_runs: u64,
    budget: i64,
    target_runs: u64,
    launch_command: String,
    completion_token: u8,
    strategy: Strategy,
}

impl Session {
    pub fn new(strategy: Strategy, target_runs: u64) -> Self {
        Self {
            remote: None,
            state: State::Exec,
            completed_runs: 0,
            budget: INITIAL_BUDGET,
            target_runs,
            launch_command: LAUNCH_COMMAND.to_string(),
            completion_token: DEFAULT_COMPLETION_TOKEN,
            strategy,
        }
    }

    /// Launch shells in the background (`exec sosh &`) instead of the
    /// foreground.
    pub fn with_background_launch(mut self, background: bool) -> Self {
        self.launch_command = if background {
            BACKGROUND_LAUNCH_COMMAND
        } else {
            LAUNCH_COMMAND
        }
        .to_string();
        self
    }

    pub fn with_completion_token(mut self, token: u8) -> Self {
        self.completion_token = token;
        self
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn completed_runs(&self) -> u64 {
        self.completed_runs
    }

    pub fn target_runs(&self) -> u64 {
        self.target_runs
    }

    /// Remaining commands expected to echo back before the next batch cycle.
    pub fn budget(&self) -> i64 {
        self.budget
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn launch_command(&self) -> &str {
        &self.launch_command
    }

    /// Handle one inbound datagram: learn the sender as the remote and apply
    /// one trigger per completion token in `payload`.
    pub fn on_datagram(&mut self, payload: &[u8], sender: SocketAddr) -> Reaction {
        if self.remote != Some(sender) {
            tracing::info!(remote = %sender, "remote endpoint learned");
        }
        self.remote = Some(sender);
        let triggers = count_tokens(payload, self.completion_token);
        self.apply_triggers(triggers)
    }

    /// Apply `triggers` triggers, then count them as completed runs.
    ///
    /// The target check happens after every trigger has been applied, so the
    /// trigger that reaches the target still produces its command.
    pub fn apply_triggers(&mut self, triggers: usize) -> Reaction {
        let mut commands = Vec::new();

        for _ in 0..triggers {
            match &mut self.strategy {
                Strategy::Alternating => match self.state {
                    State::Exec => {
                        commands.push(self.launch_command.clone());
                        self.state = State::Exit;
                    }
                    State::Exit => {
                        commands.push(EXIT_COMMAND.to_string());
                        self.state = State::Exec;
                    }
                    State::Done => {}
                },
                Strategy::BatchInjection { generator, rng } => {
                    self.budget -= 1;
                    if self.budget == 0 && self.state != State::Done {
                        let batch = generator.next_batch(rng);
                        tracing::debug!(len = batch.len(), "injecting command batch");
                        self.budget = (batch.len() + 2 * CONTROL_REPEAT) as i64;
                        commands.extend(batch_cycle(&self.launch_command, batch));
                    }
                }
            }
        }

        self.completed_runs += triggers as u64;

        let mut finished = false;
        if self.state != State::Done && self.completed_runs >= self.target_runs {
            self.state = State::Done;
            finished = true;
        }

        Reaction { commands, finished }
    }

    /// Start over from zero runs, whatever the current state. The learned
    /// remote is kept.
    pub fn restart(&mut self) {
        self.state = State::Exec;
        self.completed_runs = 0;
        self.budget = INITIAL_BUDGET;
    }
}

/// Launch, batch, exit, with the control commands repeated.
fn batch_cycle(launch: &str, batch: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(batch.len() + 2 * CONTROL_REPEAT);
    out.extend(std::iter::repeat(launch.to_string()).take(CONTROL_REPEAT));
    out.extend(batch);
    out.extend(std::iter::repeat(EXIT_COMMAND.to_string()).take(CONTROL_REPEAT));
    out
}

/// Number of times `token` occurs in `payload`.
pub fn count_tokens(payload: &[u8], token: u8) -> usize {
    payload.iter().filter(|&&b| b == token).count()
}
