//! Command-line surface
//!
//! Parses arguments into an immutable [`Cli`] value, turns it into a batch of
//! core [`Operation`]s and prints one line per outcome.

use crate::config::AppConfig;
use crate::constants::ENV_CONFIG;
use crate::core::{
    execute, CredentialStore, ExecutionReport, IdentityResolver, Operation, OperationOutcome,
    SecurityApi, SecurityContext,
};
use crate::models::{CredentialRecord, Persistence, SecureBuffer};
use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::debug;
use zeroize::Zeroize;

/// Manage generic credentials in the Windows Credential Manager
#[derive(Parser, Debug)]
#[command(name = "secrets-manager", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Config file (default: %APPDATA%\SecretsManager\config.json)
    #[arg(long, env = ENV_CONFIG, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run as another local or domain user (prompts for the password)
    #[arg(long, value_name = "USER", conflicts_with = "run_as_system")]
    pub run_as: Option<String>,

    /// Run as the local system identity
    #[arg(long)]
    pub run_as_system: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print configuration keys (never values)
    List {
        /// Only targets starting with this prefix; it is stripped from keys
        #[arg(long, conflicts_with = "configured")]
        prefix: Option<String>,

        /// Use the prefix id from the config file or build
        #[arg(long)]
        configured: bool,
    },

    /// Print one record without its secret
    Show { target: String },

    /// Add or overwrite a credential (prompts for missing values)
    Add {
        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        username: Option<String>,

        /// session, local-machine or enterprise
        #[arg(long)]
        persistence: Option<Persistence>,
    },

    /// Change an existing credential
    Edit {
        target: String,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        persistence: Option<Persistence>,

        /// Do not prompt for a new password
        #[arg(long)]
        keep_password: bool,
    },

    /// Delete one or more credentials
    Delete {
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

/// Source of interactive input
pub trait Prompter {
    fn line(&mut self, prompt: &str) -> io::Result<String>;

    /// Read a secret without echo
    fn secret(&mut self, prompt: &str) -> io::Result<SecureBuffer>;
}

/// Reads from the console; secrets are read without echo.
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn line(&mut self, prompt: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt)?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn secret(&mut self, prompt: &str) -> io::Result<SecureBuffer> {
        let mut plaintext = rpassword::prompt_password(prompt)?;
        let mut buffer = SecureBuffer::new();
        let pushed = buffer.push_str(&plaintext);
        plaintext.zeroize();
        pushed.map_err(io::Error::other)?;
        buffer.seal();
        Ok(buffer)
    }
}

fn required_line<P: Prompter>(
    prompter: &mut P,
    given: Option<String>,
    prompt: &str,
) -> anyhow::Result<String> {
    let value = match given {
        Some(value) => value,
        None => prompter.line(prompt).context("Failed to read input")?,
    };
    if value.trim().is_empty() {
        bail!("{} must not be empty", prompt.trim_end_matches(&[':', ' '][..]));
    }
    Ok(value.trim().to_string())
}

fn required_secret<P: Prompter>(prompter: &mut P, prompt: &str) -> anyhow::Result<SecureBuffer> {
    let secret = prompter.secret(prompt).context("Failed to read password")?;
    if secret.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(secret)
}

/// Turn the parsed command into core operations
pub fn plan<P: Prompter>(
    command: Command,
    config: &AppConfig,
    prompter: &mut P,
) -> anyhow::Result<Vec<Operation>> {
    let operations = match command {
        Command::List { prefix, configured } => {
            let prefix = if configured {
                config.resolve_prefix_id(false)?
            } else {
                prefix.filter(|prefix| !prefix.is_empty())
            };
            vec![Operation::List { prefix }]
        }
        Command::Show { target } => vec![Operation::Read { target }],
        Command::Add {
            target,
            username,
            persistence,
        } => {
            let target = required_line(prompter, target, "Target: ")?;
            let username = required_line(prompter, username, "Username: ")?;
            let password = required_secret(prompter, "Password: ")?;
            let record = CredentialRecord::generic(target, username, password)
                .with_persistence(config.persistence_or_default(persistence));
            vec![Operation::Write(record)]
        }
        Command::Edit {
            target,
            username,
            persistence,
            keep_password,
        } => {
            let password = if keep_password {
                None
            } else {
                Some(required_secret(prompter, "New password: ")?)
            };
            if username.is_none() && password.is_none() && persistence.is_none() {
                bail!("Nothing to change for '{}'", target);
            }
            vec![Operation::Edit {
                target,
                username,
                password,
                persistence,
            }]
        }
        Command::Delete { targets } => targets
            .into_iter()
            .map(|target| Operation::Delete { target })
            .collect(),
    };
    Ok(operations)
}

/// Security context requested by `--run-as` / `--run-as-system`
pub fn security_context<P: Prompter>(
    run_as: Option<&str>,
    run_as_system: bool,
    resolver: &IdentityResolver,
    prompter: &mut P,
) -> anyhow::Result<SecurityContext> {
    if run_as_system {
        return Ok(SecurityContext::System);
    }
    let Some(user) = run_as else {
        return Ok(SecurityContext::Current);
    };

    let identity = resolver.resolve(user)?;
    debug!("Running as {} ({})", identity, identity.kind);
    let secret = required_secret(prompter, &format!("Password for {}: ", identity))?;
    Ok(SecurityContext::User { identity, secret })
}

/// Print one line per outcome; returns whether everything succeeded
pub fn render<O: Write, E: Write>(
    labels: &[String],
    report: &ExecutionReport,
    out: &mut O,
    err: &mut E,
) -> io::Result<bool> {
    for (label, outcome) in labels.iter().zip(&report.outcomes) {
        match outcome {
            Ok(OperationOutcome::Listed(data)) => {
                if data.is_empty() {
                    writeln!(out, "No credentials found.")?;
                }
                for key in data.keys() {
                    writeln!(out, "{}", key)?;
                }
            }
            Ok(OperationOutcome::Record(record)) => {
                writeln!(out, "Target:      {}", record.target)?;
                writeln!(out, "Type:        {}", record.credential_type)?;
                writeln!(out, "Username:    {}", record.username)?;
                writeln!(out, "Persistence: {}", record.persistence)?;
            }
            Ok(OperationOutcome::Written { target }) => {
                writeln!(out, "Credential '{}' saved.", target)?;
            }
            Ok(OperationOutcome::Deleted { target }) => {
                writeln!(out, "Credential '{}' deleted.", target)?;
            }
            Err(e) => writeln!(err, "Failed to {}: {}", label, e)?,
        }
    }

    for warning in &report.warnings {
        writeln!(err, "Warning: {}", warning)?;
    }
    Ok(report.all_succeeded())
}

/// Run a parsed command line against `store` and `api`
///
/// Returns `Ok(false)` when at least one requested action failed.
pub fn run<S, A, P>(cli: Cli, store: &S, api: &A, prompter: &mut P) -> anyhow::Result<bool>
where
    S: CredentialStore + ?Sized,
    A: SecurityApi,
    P: Prompter,
{
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let context = security_context(
        cli.run_as.as_deref(),
        cli.run_as_system,
        &IdentityResolver::for_local_machine(),
        prompter,
    )?;

    let operations = plan(cli.command, &config, prompter)?;
    let labels: Vec<String> = operations.iter().map(Operation::describe).collect();

    let report = execute(store, api, context, operations, &config.tags)?;
    let succeeded = render(&labels, &report, &mut io::stdout().lock(), &mut io::stderr().lock())?;
    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock_security::MockSecurity;
    use crate::core::ProjectionOptions;
    use crate::models::IdentityKind;
    use crate::platform::memory::InMemoryCredentialStore;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedPrompter {
        lines: VecDeque<&'static str>,
        secrets: VecDeque<&'static str>,
        prompts: Vec<String>,
    }

    impl ScriptedPrompter {
        fn new(lines: &[&'static str], secrets: &[&'static str]) -> Self {
            ScriptedPrompter {
                lines: lines.iter().copied().collect(),
                secrets: secrets.iter().copied().collect(),
                prompts: Vec::new(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn line(&mut self, prompt: &str) -> io::Result<String> {
            self.prompts.push(prompt.to_string());
            Ok(self.lines.pop_front().unwrap_or_default().to_string())
        }

        fn secret(&mut self, prompt: &str) -> io::Result<SecureBuffer> {
            self.prompts.push(prompt.to_string());
            Ok(SecureBuffer::from_plaintext(self.secrets.pop_front().unwrap_or_default()))
        }
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("secrets-manager").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_global_options_and_subcommand() {
        let cli = parse(&["-vv", "--run-as", "CORP\\svc", "delete", "a", "b"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.run_as.as_deref(), Some("CORP\\svc"));
        match cli.command {
            Command::Delete { targets } => assert_eq!(targets, vec!["a", "b"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn run_as_conflicts_with_system() {
        let result = Cli::try_parse_from([
            "secrets-manager",
            "--run-as",
            "alice",
            "--run-as-system",
            "list",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn persistence_is_parsed() {
        let cli = parse(&["add", "--target", "t", "--persistence", "session"]);
        assert!(matches!(
            cli.command,
            Command::Add { persistence: Some(Persistence::Session), .. }
        ));
        assert!(Cli::try_parse_from(["secrets-manager", "add", "--persistence", "forever"]).is_err());
    }

    #[test]
    fn delete_requires_a_target() {
        assert!(Cli::try_parse_from(["secrets-manager", "delete"]).is_err());
    }

    #[test]
    fn add_prompts_for_missing_values() {
        let mut prompter = ScriptedPrompter::new(&["AppX:db", "dbuser"], &["s3cret"]);
        let operations = plan(
            Command::Add {
                target: None,
                username: None,
                persistence: None,
            },
            &AppConfig::default(),
            &mut prompter,
        )
        .unwrap();

        assert_eq!(prompter.prompts, vec!["Target: ", "Username: ", "Password: "]);
        match &operations[..] {
            [Operation::Write(record)] => {
                assert_eq!(record.target, "AppX:db");
                assert_eq!(record.username, "dbuser");
                assert_eq!(record.password.to_plaintext().as_str(), "s3cret");
                assert_eq!(record.persistence, Persistence::LocalMachine);
            }
            other => panic!("unexpected plan: {:?}", other),
        }
    }

    #[test]
    fn add_rejects_empty_password() {
        let mut prompter = ScriptedPrompter::new(&[], &[""]);
        let result = plan(
            Command::Add {
                target: Some("t".to_string()),
                username: Some("u".to_string()),
                persistence: None,
            },
            &AppConfig::default(),
            &mut prompter,
        );
        assert!(result.is_err());
    }

    #[test]
    fn edit_without_changes_is_rejected() {
        let mut prompter = ScriptedPrompter::default();
        let result = plan(
            Command::Edit {
                target: "t".to_string(),
                username: None,
                persistence: None,
                keep_password: true,
            },
            &AppConfig::default(),
            &mut prompter,
        );
        assert!(result.is_err());
        assert!(prompter.prompts.is_empty());
    }

    #[test]
    fn configured_list_uses_config_prefix() {
        let config = AppConfig {
            prefix_id: Some("AppX:".to_string()),
            ..AppConfig::default()
        };
        let operations = plan(
            Command::List {
                prefix: None,
                configured: true,
            },
            &config,
            &mut ScriptedPrompter::default(),
        )
        .unwrap();
        assert!(matches!(
            &operations[..],
            [Operation::List { prefix: Some(prefix) }] if prefix == "AppX:"
        ));
    }

    #[test]
    fn run_as_prompts_for_identity_secret() {
        let mut prompter = ScriptedPrompter::new(&[], &["pw"]);
        let context = security_context(
            Some(".\\svc"),
            false,
            &IdentityResolver::new("HOST"),
            &mut prompter,
        )
        .unwrap();

        assert_eq!(prompter.prompts, vec!["Password for .\\svc: "]);
        match context {
            SecurityContext::User { identity, secret } => {
                assert_eq!(identity.kind, IdentityKind::Local);
                assert_eq!(secret.to_plaintext().as_str(), "pw");
            }
            other => panic!("unexpected context: {:?}", other),
        }
    }

    #[test]
    fn system_context_needs_no_prompt() {
        let mut prompter = ScriptedPrompter::default();
        let context =
            security_context(None, true, &IdentityResolver::new("HOST"), &mut prompter).unwrap();
        assert!(matches!(context, SecurityContext::System));
        assert!(prompter.prompts.is_empty());
    }

    #[test]
    fn render_reports_each_outcome() {
        let store = InMemoryCredentialStore::new();
        store
            .write(&CredentialRecord::generic(
                "AppX:db",
                "dbuser",
                SecureBuffer::from_plaintext("dbpass"),
            ))
            .unwrap();

        let operations = vec![
            Operation::List { prefix: Some("AppX:".to_string()) },
            Operation::Delete { target: "missing".to_string() },
            Operation::Delete { target: "AppX:db".to_string() },
        ];
        let labels: Vec<String> = operations.iter().map(Operation::describe).collect();
        let report = execute(
            &store,
            &MockSecurity::new(),
            SecurityContext::Current,
            operations,
            &ProjectionOptions::default(),
        )
        .unwrap();

        let mut out = Vec::new();
        let mut err = Vec::new();
        let succeeded = render(&labels, &report, &mut out, &mut err).unwrap();
        let out = String::from_utf8(out).unwrap();
        let err = String::from_utf8(err).unwrap();

        assert!(!succeeded);
        assert_eq!(
            out,
            "CustomCredentials:db:Username\nCustomCredentials:db:Password\n\
             Credential 'AppX:db' deleted.\n"
        );
        assert!(err.starts_with("Failed to delete 'missing':"));
        assert!(!out.contains("dbpass"));
    }
}
