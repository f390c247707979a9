use std::{process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{HeraclesError, Result},
    fixture::{Fixture, compose::ComposeStack},
    runner::until_cancelled,
};

/// Splits `command` into shell words. Quoting follows POSIX shell rules,
/// but no shell runs: operators like `;` or `&&` are plain arguments.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command)
        .ok_or_else(|| script_error(command, "unbalanced quotes or trailing escape".to_string()))?;
    if argv.is_empty() {
        return Err(script_error(command, "empty command".to_string()));
    }
    Ok(argv)
}

/// Runs one command with inherited stdio, failing on a non-zero exit.
pub async fn run_script(command: &str, cancel: &CancellationToken) -> Result<()> {
    let argv = split_command(command)?;
    debug!(command, program = %argv[0], "running script");
    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| script_error(command, err.to_string()))?;

    let status = until_cancelled(cancel, async {
        child
            .wait()
            .await
            .map_err(|err| script_error(command, err.to_string()))
    })
    .await?;

    if !status.success() {
        return Err(script_error(command, format!("exited with {status}")));
    }
    Ok(())
}

/// Runs commands in order, stopping at the first failure.
pub async fn run_scripts(commands: &[String], cancel: &CancellationToken) -> Result<()> {
    for command in commands {
        run_script(command, cancel).await?;
    }
    Ok(())
}

fn script_error(command: &str, message: String) -> HeraclesError {
    HeraclesError::Script {
        command: command.to_string(),
        message,
    }
}

#[derive(Debug, Clone)]
pub struct ScriptFixture {
    name: String,
    setup_commands: Vec<String>,
    teardown_commands: Vec<String>,
}

impl ScriptFixture {
    pub fn new(name: impl Into<String>, setup: Vec<String>, teardown: Vec<String>) -> Self {
        Self {
            name: name.into(),
            setup_commands: setup,
            teardown_commands: teardown,
        }
    }
}

#[async_trait]
impl Fixture for ScriptFixture {
    fn name(&self) -> String {
        format!("script:{}", self.name)
    }

    async fn setup(&self, cancel: &CancellationToken) -> Result<()> {
        run_scripts(&self.setup_commands, cancel).await
    }

    async fn tear_down(&self, cancel: &CancellationToken) -> Result<()> {
        run_scripts(&self.teardown_commands, cancel).await
    }
}

/// Script hooks executed inside one service of a compose stack.
#[derive(Debug, Clone)]
pub struct ContainerScriptFixture {
    stack: Arc<ComposeStack>,
    name: String,
    container: String,
    setup_commands: Vec<String>,
    teardown_commands: Vec<String>,
}

impl ContainerScriptFixture {
    pub fn new(
        stack: Arc<ComposeStack>,
        name: impl Into<String>,
        container: impl Into<String>,
        setup: Vec<String>,
        teardown: Vec<String>,
    ) -> Self {
        Self {
            stack,
            name: name.into(),
            container: container.into(),
            setup_commands: setup,
            teardown_commands: teardown,
        }
    }

    async fn run_in_container(&self, scripts: &[String], cancel: &CancellationToken) -> Result<()> {
        for script in scripts {
            debug!(container = %self.container, script, "running script in container");
            let argv = split_command(script)?;
            self.stack
                .exec(&self.container, &argv, cancel)
                .await
                .map_err(|err| script_error(script, err.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Fixture for ContainerScriptFixture {
    fn name(&self) -> String {
        format!("container-script:{}@{}", self.name, self.container)
    }

    async fn setup(&self, cancel: &CancellationToken) -> Result<()> {
        self.run_in_container(&self.setup_commands, cancel).await
    }

    async fn tear_down(&self, cancel: &CancellationToken) -> Result<()> {
        self.run_in_container(&self.teardown_commands, cancel).await
    }
}
