//! Caller-level operations
//!
//! An [`Operation`] is one thing a caller asked for: list keys, show a record,
//! write, edit or delete. [`execute`] runs a batch of them against a store,
//! directly or wrapped in a single [`ImpersonationContext`]. Each operation
//! reports its own outcome so one failure does not stop the rest of the batch.

use crate::core::impersonation::{ImpersonationContext, SecurityApi};
use crate::core::provider::{
    ConfigurationData, ConfigurationSource, CredentialConfigurationProvider, ProjectionOptions,
};
use crate::core::CredentialStore;
use crate::models::{CredentialRecord, ParsedIdentity, Persistence, SecureBuffer};
use crate::utils::{OperationError, TeardownWarning};
use std::fmt;
use tracing::{debug, info};

/// One requested action
#[derive(Debug)]
pub enum Operation {
    /// Project records into configuration keys; `None` lists everything
    List { prefix: Option<String> },
    /// Read one record
    Read { target: String },
    /// Create or overwrite a record
    Write(CredentialRecord),
    /// Replace selected fields of an existing record
    Edit {
        target: String,
        username: Option<String>,
        password: Option<SecureBuffer>,
        persistence: Option<Persistence>,
    },
    Delete { target: String },
}

impl Operation {
    /// Short label for outcome lines
    pub fn describe(&self) -> String {
        match self {
            Operation::List { prefix: Some(prefix) } => format!("list '{}'", prefix),
            Operation::List { prefix: None } => "list".to_string(),
            Operation::Read { target } => format!("read '{}'", target),
            Operation::Write(record) => format!("write '{}'", record.target),
            Operation::Edit { target, .. } => format!("edit '{}'", target),
            Operation::Delete { target } => format!("delete '{}'", target),
        }
    }
}

/// Security context a batch runs under
pub enum SecurityContext {
    /// The calling process identity
    Current,
    /// Another local or domain identity, authenticated with `secret`
    User {
        identity: ParsedIdentity,
        secret: SecureBuffer,
    },
    /// The local system identity
    System,
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityContext::Current => f.write_str("Current"),
            SecurityContext::User { identity, .. } => {
                f.debug_struct("User").field("identity", identity).finish_non_exhaustive()
            }
            SecurityContext::System => f.write_str("System"),
        }
    }
}

/// Result of one successful operation
#[derive(Debug)]
pub enum OperationOutcome {
    Listed(ConfigurationData),
    Record(CredentialRecord),
    Written { target: String },
    Deleted { target: String },
}

/// Outcomes of a batch, in request order
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<Result<OperationOutcome, OperationError>>,
    /// Cleanup failures from the impersonation wrapper
    pub warnings: Vec<TeardownWarning>,
}

impl ExecutionReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_err()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures() == 0
    }
}

/// Run `operations` under `context`
///
/// Returns `Err` only when the context itself could not be established, in
/// which case none of the operations ran.
pub fn execute<S, A>(
    store: &S,
    api: &A,
    context: SecurityContext,
    operations: Vec<Operation>,
    options: &ProjectionOptions,
) -> Result<ExecutionReport, OperationError>
where
    S: CredentialStore + ?Sized,
    A: SecurityApi,
{
    let work = || -> Result<Vec<_>, OperationError> {
        Ok(operations
            .into_iter()
            .map(|operation| run_one(store, operation, options))
            .collect())
    };

    match context {
        SecurityContext::Current => Ok(ExecutionReport {
            outcomes: work()?,
            warnings: Vec::new(),
        }),
        SecurityContext::User { identity, secret } => {
            let mut impersonation = ImpersonationContext::new(api);
            let outcomes = impersonation.run_as(&identity, secret, work);
            let warnings = impersonation.warnings().to_vec();
            Ok(ExecutionReport {
                outcomes: outcomes?,
                warnings,
            })
        }
        SecurityContext::System => {
            let mut impersonation = ImpersonationContext::new(api);
            let outcomes = impersonation.run_as_system(work);
            let warnings = impersonation.warnings().to_vec();
            Ok(ExecutionReport {
                outcomes: outcomes?,
                warnings,
            })
        }
    }
}

fn run_one<S: CredentialStore + ?Sized>(
    store: &S,
    operation: Operation,
    options: &ProjectionOptions,
) -> Result<OperationOutcome, OperationError> {
    let label = operation.describe();
    debug!("Running {}", label);

    let outcome = match operation {
        Operation::List { prefix } => {
            let data = CredentialConfigurationProvider::new(store, prefix)
                .with_options(options.clone())
                .load()?;
            OperationOutcome::Listed(data)
        }
        Operation::Read { target } => OperationOutcome::Record(store.read(&target)?),
        Operation::Write(record) => {
            store.write(&record)?;
            OperationOutcome::Written {
                target: record.target,
            }
        }
        Operation::Edit {
            target,
            username,
            password,
            persistence,
        } => {
            let mut record = store.read(&target)?;
            if let Some(username) = username {
                record.username = username;
            }
            if let Some(password) = password {
                record.password = password;
            }
            if let Some(persistence) = persistence {
                record.persistence = persistence;
            }
            store.write(&record)?;
            OperationOutcome::Written {
                target: record.target,
            }
        }
        Operation::Delete { target } => {
            store.delete(&target)?;
            OperationOutcome::Deleted { target }
        }
    };

    info!("Completed {}", label);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock_security::{Call, MockSecurity};
    use crate::core::IdentityResolver;
    use crate::platform::memory::InMemoryCredentialStore;
    use crate::utils::{CredentialError, ImpersonationError};

    fn seeded() -> InMemoryCredentialStore {
        let store = InMemoryCredentialStore::new();
        for (target, user, password) in [("AppX:db", "dbuser", "dbpass"), ("Other:x", "u", "p")] {
            store
                .write(&CredentialRecord::generic(
                    target,
                    user,
                    SecureBuffer::from_plaintext(password),
                ))
                .unwrap();
        }
        store
    }

    fn run(
        store: &InMemoryCredentialStore,
        operations: Vec<Operation>,
    ) -> ExecutionReport {
        execute(
            store,
            &MockSecurity::new(),
            SecurityContext::Current,
            operations,
            &ProjectionOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn list_by_prefix_projects_keys() {
        let store = seeded();
        let report = run(&store, vec![Operation::List { prefix: Some("AppX:".to_string()) }]);

        match &report.outcomes[0] {
            Ok(OperationOutcome::Listed(data)) => {
                let keys: Vec<&str> = data.keys().collect();
                assert_eq!(
                    keys,
                    vec!["CustomCredentials:db:Username", "CustomCredentials:db:Password"]
                );
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn edit_replaces_only_given_fields() {
        let store = seeded();
        let report = run(
            &store,
            vec![Operation::Edit {
                target: "AppX:db".to_string(),
                username: None,
                password: Some(SecureBuffer::from_plaintext("rotated")),
                persistence: Some(Persistence::Session),
            }],
        );
        assert!(report.all_succeeded());

        let record = store.read("AppX:db").unwrap();
        assert_eq!(record.username, "dbuser");
        assert_eq!(record.password.to_plaintext().as_str(), "rotated");
        assert_eq!(record.persistence, Persistence::Session);
    }

    #[test]
    fn edit_missing_target_is_not_found() {
        let store = seeded();
        let report = run(
            &store,
            vec![Operation::Edit {
                target: "AppX:missing".to_string(),
                username: Some("x".to_string()),
                password: None,
                persistence: None,
            }],
        );
        assert!(matches!(
            report.outcomes[0],
            Err(OperationError::Credential(CredentialError::NotFound(_)))
        ));
        assert!(!store.exists("AppX:missing").unwrap());
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let store = seeded();
        let report = run(
            &store,
            vec![
                Operation::Delete { target: "missing".to_string() },
                Operation::Delete { target: "AppX:db".to_string() },
                Operation::Read { target: "Other:x".to_string() },
            ],
        );

        assert_eq!(report.failures(), 1);
        assert!(matches!(
            report.outcomes[0],
            Err(OperationError::Credential(CredentialError::Delete { .. }))
        ));
        assert!(matches!(report.outcomes[1], Ok(OperationOutcome::Deleted { .. })));
        assert!(matches!(report.outcomes[2], Ok(OperationOutcome::Record(_))));
        assert!(!store.exists("AppX:db").unwrap());
    }

    #[test]
    fn user_context_wraps_the_whole_batch_once() {
        let store = seeded();
        let api = MockSecurity::new();
        let identity = IdentityResolver::new("HOST").resolve("CORP\\svc").unwrap();

        let report = execute(
            &store,
            &api,
            SecurityContext::User {
                identity,
                secret: SecureBuffer::from_plaintext("pw"),
            },
            vec![
                Operation::Read { target: "AppX:db".to_string() },
                Operation::Delete { target: "Other:x".to_string() },
            ],
            &ProjectionOptions::default(),
        )
        .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(api.count(&Call::Impersonate), 1);
        assert_eq!(api.count(&Call::Revert), 1);
        assert!(api.is_balanced());
    }

    #[test]
    fn failed_context_runs_nothing() {
        let store = seeded();
        let api = MockSecurity::new().fail_logon(1326);
        let identity = IdentityResolver::new("HOST").resolve("CORP\\svc").unwrap();

        let result = execute(
            &store,
            &api,
            SecurityContext::User {
                identity,
                secret: SecureBuffer::from_plaintext("wrong"),
            },
            vec![Operation::Delete { target: "AppX:db".to_string() }],
            &ProjectionOptions::default(),
        );

        assert!(matches!(
            result,
            Err(OperationError::Impersonation(ImpersonationError::Authentication { code: 1326, .. }))
        ));
        assert!(store.exists("AppX:db").unwrap());
    }

    #[test]
    fn system_context_uses_system_process() {
        let store = seeded();
        let api = MockSecurity::new().with_process(crate::constants::SYSTEM_PROCESS_NAME, 4);

        let report = execute(
            &store,
            &api,
            SecurityContext::System,
            vec![Operation::List { prefix: None }],
            &ProjectionOptions::default(),
        )
        .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(api.count(&Call::OpenProcess(4)), 1);
        assert!(api.is_balanced());
    }
}
