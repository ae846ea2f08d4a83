//! Running work under another security context
//!
//! [`ImpersonationContext`] wraps a unit of work: it enables the privileges
//! the caller needs, obtains a token for the target identity, switches the
//! thread to it, runs the work and then always tears the context down. Raw
//! tokens never leave this module.
//!
//! The security context is thread-wide state. Only one impersonated operation
//! may run at a time and the work must stay on the calling thread.
//!
//! Privileges enabled on the caller's own token stay enabled for the rest of
//! the process.

use crate::constants::{
    SE_BACKUP_PRIVILEGE, SE_DEBUG_PRIVILEGE, SE_IMPERSONATE_PRIVILEGE, SE_RESTORE_PRIVILEGE,
    SYSTEM_PROCESS_NAME,
};
use crate::models::{LogonIdentity, ParsedIdentity, SecureBuffer};
use crate::utils::{ImpersonationError, TeardownStage, TeardownWarning};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Privileges this module may enable on the caller's token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Privilege {
    Backup,
    Restore,
    Impersonate,
    Debug,
}

impl Privilege {
    pub fn name(self) -> &'static str {
        match self {
            Privilege::Backup => SE_BACKUP_PRIVILEGE,
            Privilege::Restore => SE_RESTORE_PRIVILEGE,
            Privilege::Impersonate => SE_IMPERSONATE_PRIVILEGE,
            Privilege::Debug => SE_DEBUG_PRIVILEGE,
        }
    }
}

/// Needed before another user's profile can be loaded
pub const PROFILE_PRIVILEGES: [Privilege; 3] =
    [Privilege::Backup, Privilege::Restore, Privilege::Impersonate];

/// Needed before a system process token can be opened
pub const SYSTEM_PRIVILEGES: [Privilege; 1] = [Privilege::Debug];

/// Win32 ERROR_INVALID_HANDLE
const ERROR_INVALID_HANDLE: u32 = 6;

/// Native security primitives
///
/// Errors are native error codes; [`ImpersonationContext`] turns them into
/// typed errors for the stage that failed.
pub trait SecurityApi {
    type Token;
    type Profile;
    type Process;

    /// Enable a privilege on the current process token
    fn enable_privilege(&self, privilege: Privilege) -> Result<(), u32>;

    /// Authenticate an identity with a non-network logon
    fn logon_user(&self, identity: &LogonIdentity, secret: &SecureBuffer)
        -> Result<Self::Token, u32>;

    fn load_profile(&self, token: &Self::Token, user: &str) -> Result<Self::Profile, u32>;

    fn unload_profile(&self, token: &Self::Token, profile: Self::Profile) -> Result<(), u32>;

    /// Process id of the first process with this image name
    fn find_process(&self, image_name: &str) -> Result<Option<u32>, u32>;

    fn open_process(&self, process_id: u32) -> Result<Self::Process, u32>;

    fn open_process_token(&self, process: &Self::Process) -> Result<Self::Token, u32>;

    /// Duplicate into an impersonation-capable token
    fn duplicate_token(&self, token: &Self::Token) -> Result<Self::Token, u32>;

    /// Switch the calling thread to `token`
    fn impersonate(&self, token: &Self::Token) -> Result<(), u32>;

    /// Switch the calling thread back to the process identity
    fn revert(&self) -> Result<(), u32>;

    fn close_token(&self, token: Self::Token) -> Result<(), u32>;

    fn close_process(&self, process: Self::Process) -> Result<(), u32>;
}

/// Lifecycle of one impersonation request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpersonationState {
    Idle,
    PrivilegesEnabling,
    Authenticating,
    ContextLoaded,
    Running,
    TearingDown,
    Failed,
}

impl fmt::Display for ImpersonationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Runs work as another identity and guarantees teardown
pub struct ImpersonationContext<'a, A: SecurityApi> {
    api: &'a A,
    state: ImpersonationState,
    history: Vec<ImpersonationState>,
    warnings: Vec<TeardownWarning>,
}

impl<'a, A: SecurityApi> ImpersonationContext<'a, A> {
    pub fn new(api: &'a A) -> Self {
        ImpersonationContext {
            api,
            state: ImpersonationState::Idle,
            history: vec![ImpersonationState::Idle],
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> ImpersonationState {
        self.state
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[ImpersonationState] {
        &self.history
    }

    /// Cleanup failures recorded by the last run
    pub fn warnings(&self) -> &[TeardownWarning] {
        &self.warnings
    }

    /// Run `work` as `identity`, authenticated with `secret`
    ///
    /// Requires an elevated caller. The profile is unloaded, the thread
    /// reverted and the token and secret released on every exit path,
    /// including a panic inside `work`.
    pub fn run_as<T, E, F>(
        &mut self,
        identity: &ParsedIdentity,
        secret: SecureBuffer,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<ImpersonationError>,
    {
        self.begin();
        if secret.is_empty() {
            self.enter(ImpersonationState::Failed);
            return Err(ImpersonationError::EmptySecret.into());
        }

        let logon = identity.for_logon();
        let api = self.api;
        self.enable(&PROFILE_PRIVILEGES)?;

        self.enter(ImpersonationState::Authenticating);
        let token = match api.logon_user(&logon, &secret) {
            Ok(token) => token,
            Err(code) => {
                self.enter(ImpersonationState::Failed);
                return Err(ImpersonationError::Authentication {
                    user: logon.to_string(),
                    code,
                }
                .into());
            }
        };
        debug!("Logon succeeded for {}", logon);

        let mut session = Teardown::new(api);
        session.secret = Some(secret);
        let loaded = api.load_profile(&token, &logon.user);
        session.token = Some(token);

        match loaded {
            Ok(profile) => session.profile = Some(profile),
            Err(code) => {
                self.abort(session);
                return Err(ImpersonationError::ProfileLoad {
                    user: logon.to_string(),
                    code,
                }
                .into());
            }
        }
        self.enter(ImpersonationState::ContextLoaded);

        info!("Running as {}", logon);
        self.run_loaded(session, work)
    }

    /// Run `work` as the local system identity
    ///
    /// Borrows the token of a well-known system process. Requires an
    /// elevated caller.
    pub fn run_as_system<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<ImpersonationError>,
    {
        self.begin();
        let api = self.api;
        self.enable(&SYSTEM_PRIVILEGES)?;

        self.enter(ImpersonationState::Authenticating);
        let process_id = match api.find_process(SYSTEM_PROCESS_NAME) {
            Ok(Some(process_id)) => process_id,
            Ok(None) => {
                self.enter(ImpersonationState::Failed);
                let missing = ImpersonationError::ProcessNotFound(SYSTEM_PROCESS_NAME.to_string());
                return Err(missing.into());
            }
            Err(code) => {
                self.enter(ImpersonationState::Failed);
                return Err(token_error("CreateToolhelp32Snapshot", code).into());
            }
        };

        let mut session = Teardown::new(api);
        let process = match api.open_process(process_id) {
            Ok(process) => process,
            Err(code) => {
                self.abort(session);
                return Err(token_error("OpenProcess", code).into());
            }
        };

        let opened = api.open_process_token(&process);
        session.process = Some(process);
        let source_token = match opened {
            Ok(token) => token,
            Err(code) => {
                self.abort(session);
                return Err(token_error("OpenProcessToken", code).into());
            }
        };

        let duplicated = api.duplicate_token(&source_token);
        session.source_token = Some(source_token);
        match duplicated {
            Ok(token) => session.token = Some(token),
            Err(code) => {
                self.abort(session);
                return Err(token_error("DuplicateTokenEx", code).into());
            }
        }
        self.enter(ImpersonationState::ContextLoaded);

        info!("Running as local system (via {})", SYSTEM_PROCESS_NAME);
        self.run_loaded(session, work)
    }

    fn begin(&mut self) {
        self.warnings.clear();
        self.history.clear();
        self.state = ImpersonationState::Idle;
        self.history.push(ImpersonationState::Idle);
    }

    fn enter(&mut self, state: ImpersonationState) {
        debug!("Impersonation {} -> {}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    fn enable(&mut self, privileges: &[Privilege]) -> Result<(), ImpersonationError> {
        self.enter(ImpersonationState::PrivilegesEnabling);
        for privilege in privileges {
            if let Err(code) = self.api.enable_privilege(*privilege) {
                self.enter(ImpersonationState::Failed);
                return Err(ImpersonationError::Privilege {
                    privilege: privilege.name(),
                    code,
                });
            }
        }
        Ok(())
    }

    /// Release what a failed setup acquired, then fail.
    fn abort(&mut self, session: Teardown<'a, A>) {
        self.warnings.extend(session.finish());
        self.enter(ImpersonationState::Failed);
    }

    fn run_loaded<T, E, F>(&mut self, mut session: Teardown<'a, A>, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<ImpersonationError>,
    {
        let switched = match session.token.as_ref() {
            Some(token) => self.api.impersonate(token),
            None => Err(ERROR_INVALID_HANDLE),
        };
        match switched {
            Ok(()) => session.impersonating = true,
            Err(code) => {
                self.enter(ImpersonationState::TearingDown);
                self.abort(session);
                return Err(token_error("ImpersonateLoggedOnUser", code).into());
            }
        }

        self.enter(ImpersonationState::Running);
        let outcome = panic::catch_unwind(AssertUnwindSafe(work));

        self.enter(ImpersonationState::TearingDown);
        self.warnings.extend(session.finish());

        match outcome {
            Ok(Ok(value)) => {
                self.enter(ImpersonationState::Idle);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.enter(ImpersonationState::Failed);
                Err(e)
            }
            Err(payload) => {
                self.enter(ImpersonationState::Failed);
                panic::resume_unwind(payload)
            }
        }
    }
}

fn token_error(operation: &'static str, code: u32) -> ImpersonationError {
    ImpersonationError::Token { operation, code }
}

/// Resources held while a context is active
///
/// `finish` releases them in order: revert, unload profile, close tokens,
/// close process, zero secret. Dropping without `finish` does the same.
struct Teardown<'a, A: SecurityApi> {
    api: &'a A,
    impersonating: bool,
    profile: Option<A::Profile>,
    token: Option<A::Token>,
    source_token: Option<A::Token>,
    process: Option<A::Process>,
    secret: Option<SecureBuffer>,
    warnings: Vec<TeardownWarning>,
}

impl<'a, A: SecurityApi> Teardown<'a, A> {
    fn new(api: &'a A) -> Self {
        Teardown {
            api,
            impersonating: false,
            profile: None,
            token: None,
            source_token: None,
            process: None,
            secret: None,
            warnings: Vec::new(),
        }
    }

    fn finish(mut self) -> Vec<TeardownWarning> {
        self.release();
        std::mem::take(&mut self.warnings)
    }

    fn release(&mut self) {
        if self.impersonating {
            self.impersonating = false;
            let result = self.api.revert();
            self.record(TeardownStage::RevertContext, result);
        }

        if let Some(profile) = self.profile.take() {
            if let Some(token) = self.token.as_ref() {
                let result = self.api.unload_profile(token, profile);
                self.record(TeardownStage::UnloadProfile, result);
            }
        }

        for token in [self.token.take(), self.source_token.take()].into_iter().flatten() {
            let result = self.api.close_token(token);
            self.record(TeardownStage::CloseToken, result);
        }

        if let Some(process) = self.process.take() {
            let result = self.api.close_process(process);
            self.record(TeardownStage::CloseProcess, result);
        }

        if let Some(mut secret) = self.secret.take() {
            secret.release();
        }
    }

    fn record(&mut self, stage: TeardownStage, result: Result<(), u32>) {
        if let Err(code) = result {
            let warning = TeardownWarning { stage, code };
            warn!("{}", warning);
            self.warnings.push(warning);
        }
    }
}

impl<A: SecurityApi> Drop for Teardown<'_, A> {
    fn drop(&mut self) {
        self.release();
    }
}
