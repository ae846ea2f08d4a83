//! Scripted [`SecurityApi`] for tests
//!
//! Records every call, hands out numbered handles and tracks what is still
//! open so tests can check that each exit path releases everything.

use crate::core::impersonation::{Privilege, SecurityApi};
use crate::models::{LogonIdentity, SecureBuffer};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    EnablePrivilege(&'static str),
    Logon(String),
    LoadProfile(String),
    UnloadProfile,
    FindProcess(String),
    OpenProcess(u32),
    OpenProcessToken,
    DuplicateToken,
    Impersonate,
    Revert,
    CloseToken,
    CloseProcess,
}

#[derive(Default)]
pub struct MockSecurity {
    calls: RefCell<Vec<Call>>,
    next_handle: Cell<u32>,
    open_tokens: RefCell<Vec<u32>>,
    open_processes: RefCell<Vec<u32>>,
    loaded_profiles: Cell<i32>,
    impersonating: Cell<i32>,
    privilege_failures: HashMap<&'static str, u32>,
    processes: HashMap<String, u32>,
    logon_failure: Option<u32>,
    load_profile_failure: Option<u32>,
    unload_profile_failure: Option<u32>,
    duplicate_failure: Option<u32>,
    impersonate_failure: Option<u32>,
}

impl MockSecurity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_privilege(mut self, name: &'static str, code: u32) -> Self {
        self.privilege_failures.insert(name, code);
        self
    }

    pub fn fail_logon(mut self, code: u32) -> Self {
        self.logon_failure = Some(code);
        self
    }

    pub fn fail_load_profile(mut self, code: u32) -> Self {
        self.load_profile_failure = Some(code);
        self
    }

    pub fn fail_unload_profile(mut self, code: u32) -> Self {
        self.unload_profile_failure = Some(code);
        self
    }

    pub fn with_process(mut self, image_name: &str, process_id: u32) -> Self {
        self.processes.insert(image_name.to_ascii_lowercase(), process_id);
        self
    }

    pub fn fail_duplicate(mut self, code: u32) -> Self {
        self.duplicate_failure = Some(code);
        self
    }

    pub fn fail_impersonate(mut self, code: u32) -> Self {
        self.impersonate_failure = Some(code);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    /// Every handle closed, every profile unloaded, thread reverted
    pub fn is_balanced(&self) -> bool {
        self.open_tokens.borrow().is_empty()
            && self.open_processes.borrow().is_empty()
            && self.loaded_profiles.get() == 0
            && self.impersonating.get() == 0
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn handle(&self) -> u32 {
        let next = self.next_handle.get() + 1;
        self.next_handle.set(next);
        next
    }

    fn open_token(&self) -> u32 {
        let token = self.handle();
        self.open_tokens.borrow_mut().push(token);
        token
    }
}

impl SecurityApi for MockSecurity {
    type Token = u32;
    type Profile = u32;
    type Process = u32;

    fn enable_privilege(&self, privilege: Privilege) -> Result<(), u32> {
        self.record(Call::EnablePrivilege(privilege.name()));
        match self.privilege_failures.get(privilege.name()) {
            Some(&code) => Err(code),
            None => Ok(()),
        }
    }

    fn logon_user(&self, identity: &LogonIdentity, secret: &SecureBuffer) -> Result<u32, u32> {
        self.record(Call::Logon(identity.to_string()));
        assert!(!secret.is_empty(), "logon attempted with an empty secret");
        match self.logon_failure {
            Some(code) => Err(code),
            None => Ok(self.open_token()),
        }
    }

    fn load_profile(&self, _token: &u32, user: &str) -> Result<u32, u32> {
        self.record(Call::LoadProfile(user.to_string()));
        match self.load_profile_failure {
            Some(code) => Err(code),
            None => {
                self.loaded_profiles.set(self.loaded_profiles.get() + 1);
                Ok(self.handle())
            }
        }
    }

    fn unload_profile(&self, _token: &u32, _profile: u32) -> Result<(), u32> {
        self.record(Call::UnloadProfile);
        self.loaded_profiles.set(self.loaded_profiles.get() - 1);
        match self.unload_profile_failure {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn find_process(&self, image_name: &str) -> Result<Option<u32>, u32> {
        self.record(Call::FindProcess(image_name.to_string()));
        Ok(self.processes.get(&image_name.to_ascii_lowercase()).copied())
    }

    fn open_process(&self, process_id: u32) -> Result<u32, u32> {
        self.record(Call::OpenProcess(process_id));
        let process = self.handle();
        self.open_processes.borrow_mut().push(process);
        Ok(process)
    }

    fn open_process_token(&self, _process: &u32) -> Result<u32, u32> {
        self.record(Call::OpenProcessToken);
        Ok(self.open_token())
    }

    fn duplicate_token(&self, _token: &u32) -> Result<u32, u32> {
        self.record(Call::DuplicateToken);
        match self.duplicate_failure {
            Some(code) => Err(code),
            None => Ok(self.open_token()),
        }
    }

    fn impersonate(&self, _token: &u32) -> Result<(), u32> {
        self.record(Call::Impersonate);
        if let Some(code) = self.impersonate_failure {
            return Err(code);
        }
        self.impersonating.set(self.impersonating.get() + 1);
        Ok(())
    }

    fn revert(&self) -> Result<(), u32> {
        self.record(Call::Revert);
        self.impersonating.set(self.impersonating.get() - 1);
        Ok(())
    }

    fn close_token(&self, token: u32) -> Result<(), u32> {
        self.record(Call::CloseToken);
        self.open_tokens.borrow_mut().retain(|open| *open != token);
        Ok(())
    }

    fn close_process(&self, process: u32) -> Result<(), u32> {
        self.record(Call::CloseProcess);
        self.open_processes.borrow_mut().retain(|open| *open != process);
        Ok(())
    }
}
