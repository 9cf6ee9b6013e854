use std::time::Duration;

use super::runner::{ArchiveCommand, DEFAULT_STOP_TIMEOUT};

pub struct ArchiveCommandBuilder {
    command: ArchiveCommand,
}

impl ArchiveCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ArchiveCommand {
                program: program.to_string(),
                args: Vec::new(),
                stop_timeout: DEFAULT_STOP_TIMEOUT,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.command.stop_timeout = timeout;
        self
    }

    pub fn build(self) -> ArchiveCommand {
        self.command
    }
}
