use clap::Parser;
use secrets_manager::commands::Cli;
use secrets_manager::logger;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let succeeded = run(cli)?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(windows)]
fn run(cli: Cli) -> anyhow::Result<bool> {
    use secrets_manager::commands::{self, ConsolePrompter};
    use secrets_manager::platform::{WindowsCredentialManager, WindowsSecurity};

    let store = WindowsCredentialManager::new();
    let api = WindowsSecurity::new();
    commands::run(cli, &store, &api, &mut ConsolePrompter)
}

#[cfg(not(windows))]
fn run(_cli: Cli) -> anyhow::Result<bool> {
    anyhow::bail!("secrets-manager needs the Windows Credential Manager and only runs on Windows")
}
