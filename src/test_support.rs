//! Test support utilities shared across unit and integration tests.
//!
//! [`InMemoryControlPlane`] stands in for the vendor API. It keeps objects in
//! memory, walks target groups through their transitional statuses on
//! successive reads, records every call, and can inject failures.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::tags::Tags;
use crate::vendor::types::{
    CreateTargetGroupRequest, CreateTargetGroupResponse, DeleteTargetGroupResponse,
    DomainConfiguration, DomainDetail, DomainInfo, HealthCheckConfig, ListStateMachinesResponse,
    Matcher, RegisterDomainRequest, StateMachineListItem, TargetGroup, UpdateTargetGroupRequest,
    UpdateTargetGroupResponse, registration_status, target_group_status,
};
use crate::vendor::{
    ClientFuture, ControlPlane, ERR_DOMAIN_DEPRECATED_FAULT, ERR_RESOURCE_NOT_FOUND,
    ERR_UNKNOWN_RESOURCE_FAULT, VendorError,
};

/// Region used in generated resource names.
pub const TEST_REGION: &str = "eu-west-1";

const DEFAULT_PAGE_SIZE: usize = 2;

#[derive(Debug)]
struct StoredTargetGroup {
    group: TargetGroup,
    pending_reads: usize,
    deleting: bool,
}

#[derive(Debug)]
struct State {
    target_groups: BTreeMap<String, StoredTargetGroup>,
    client_tokens: BTreeMap<String, String>,
    domains: BTreeMap<String, DomainDetail>,
    state_machines: Vec<StateMachineListItem>,
    tags: BTreeMap<String, Tags>,
    calls: Vec<String>,
    failures: BTreeMap<String, VecDeque<VendorError>>,
    settle_reads: usize,
    settle_status: String,
    page_size: usize,
    repeat_page_token: bool,
    next_id: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            target_groups: BTreeMap::new(),
            client_tokens: BTreeMap::new(),
            domains: BTreeMap::new(),
            state_machines: Vec::new(),
            tags: BTreeMap::new(),
            calls: Vec::new(),
            failures: BTreeMap::new(),
            settle_reads: 0,
            settle_status: String::from(target_group_status::ACTIVE),
            page_size: DEFAULT_PAGE_SIZE,
            repeat_page_token: false,
            next_id: 0,
        }
    }
}

impl State {
    /// Records the call and returns an injected failure when one is queued.
    fn enter(&mut self, operation: &str) -> Result<(), VendorError> {
        self.calls.push(operation.to_owned());
        match self
            .failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory control plane used by unit and behaviour tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryControlPlane {
    state: Arc<Mutex<State>>,
}

fn not_found(what: &str) -> VendorError {
    VendorError::api(ERR_RESOURCE_NOT_FOUND, format!("{what} not found"))
}

fn unknown_domain(name: &str) -> VendorError {
    VendorError::api(ERR_UNKNOWN_RESOURCE_FAULT, format!("unknown domain: {name}"))
}

fn default_health_check(port: Option<i32>, protocol: Option<String>) -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: Some(true),
        health_check_interval_seconds: Some(30),
        health_check_timeout_seconds: Some(5),
        healthy_threshold_count: Some(5),
        matcher: Some(Matcher {
            http_code: String::from("200"),
        }),
        path: Some(String::from("/")),
        port,
        protocol,
        protocol_version: Some(String::from("HTTP1")),
        unhealthy_threshold_count: Some(2),
    }
}

/// Fills the fields the control plane computes when a request omits them.
fn apply_server_defaults(group: &mut TargetGroup) {
    let Some(config) = group.config.as_mut() else {
        return;
    };
    config
        .ip_address_type
        .get_or_insert_with(|| String::from("IPV4"));
    let (port, protocol) = (config.port, config.protocol.clone());
    let defaults = default_health_check(port, protocol.clone());
    let health = config.health_check.get_or_insert_with(|| defaults.clone());
    health.enabled = health.enabled.or(defaults.enabled);
    health.health_check_interval_seconds = health
        .health_check_interval_seconds
        .or(defaults.health_check_interval_seconds);
    health.health_check_timeout_seconds = health
        .health_check_timeout_seconds
        .or(defaults.health_check_timeout_seconds);
    health.healthy_threshold_count = health
        .healthy_threshold_count
        .or(defaults.healthy_threshold_count);
    if health.matcher.is_none() {
        health.matcher = defaults.matcher;
    }
    health.path = health.path.take().or(defaults.path);
    health.port = health.port.or(port);
    health.protocol = health.protocol.take().or(protocol);
    health.protocol_version = health.protocol_version.take().or(defaults.protocol_version);
    health.unhealthy_threshold_count = health
        .unhealthy_threshold_count
        .or(defaults.unhealthy_threshold_count);
}

impl InMemoryControlPlane {
    /// Creates an empty control plane whose target groups settle immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets how many reads a target group stays in a transitional status.
    #[must_use]
    pub fn with_settle_reads(self, reads: usize) -> Self {
        self.lock().settle_reads = reads;
        self
    }

    /// Sets the status a creating target group settles into.
    #[must_use]
    pub fn with_settle_status(self, status: &str) -> Self {
        status.clone_into(&mut self.lock().settle_status);
        self
    }

    /// Sets the number of state machines returned per page.
    #[must_use]
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    /// Makes every state machine listing answer with the same page token.
    #[must_use]
    pub fn with_repeated_page_token(self) -> Self {
        self.lock().repeat_page_token = true;
        self
    }

    /// Queues a failure returned by the next call to `operation`.
    pub fn fail_next(&self, operation: &str, error: VendorError) {
        self.lock()
            .failures
            .entry(operation.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Returns every operation name called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Counts calls to `operation`.
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    /// Returns a stored target group.
    #[must_use]
    pub fn target_group(&self, id: &str) -> Option<TargetGroup> {
        self.lock()
            .target_groups
            .get(id)
            .map(|stored| stored.group.clone())
    }

    /// Returns the number of stored target groups.
    #[must_use]
    pub fn target_group_count(&self) -> usize {
        self.lock().target_groups.len()
    }

    /// Removes a target group without going through the API.
    pub fn remove_target_group(&self, id: &str) {
        let mut state = self.lock();
        if let Some(stored) = state.target_groups.remove(id)
            && let Some(arn) = stored.group.arn
        {
            state.tags.remove(&arn);
        }
    }

    /// Returns a stored domain.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<DomainDetail> {
        self.lock().domains.get(name).cloned()
    }

    /// Marks a domain deprecated without going through the API.
    pub fn deprecate_domain_out_of_band(&self, name: &str) {
        if let Some(info) = self
            .lock()
            .domains
            .get_mut(name)
            .and_then(|detail| detail.domain_info.as_mut())
        {
            info.status = String::from(registration_status::DEPRECATED);
        }
    }

    /// Adds a state machine to the listing.
    pub fn seed_state_machine(&self, name: &str) {
        let arn = format!("arn:stratus:states:{TEST_REGION}:stateMachine:{name}");
        self.lock().state_machines.push(StateMachineListItem {
            state_machine_arn: arn,
            name: name.to_owned(),
        });
    }

    /// Returns the tags stored for a resource name.
    #[must_use]
    pub fn tags_for(&self, arn: &str) -> Tags {
        self.lock().tags.get(arn).cloned().unwrap_or_default()
    }

    fn create_target_group_now(
        &self,
        request: &CreateTargetGroupRequest,
    ) -> Result<CreateTargetGroupResponse, VendorError> {
        let mut state = self.lock();
        state.enter("CreateTargetGroup")?;

        if let Some(existing) = state.client_tokens.get(&request.client_token).cloned() {
            let stored = state
                .target_groups
                .get(&existing)
                .ok_or_else(|| not_found(&existing))?;
            return Ok(CreateTargetGroupResponse {
                id: stored.group.id.clone(),
                arn: stored.group.arn.clone(),
                status: stored.group.status.clone(),
            });
        }

        state.next_id += 1;
        let id = format!("tg-{:04}", state.next_id);
        let arn = format!("arn:stratus:lattice:{TEST_REGION}:targetgroup/{id}");
        let mut group = TargetGroup {
            id: Some(id.clone()),
            arn: Some(arn.clone()),
            name: Some(request.name.clone()),
            target_group_type: Some(request.target_group_type.clone()),
            status: Some(String::from(target_group_status::CREATE_IN_PROGRESS)),
            config: request.config.clone(),
        };
        apply_server_defaults(&mut group);
        let pending_reads = state.settle_reads;
        state.target_groups.insert(
            id.clone(),
            StoredTargetGroup {
                group,
                pending_reads,
                deleting: false,
            },
        );
        state
            .client_tokens
            .insert(request.client_token.clone(), id.clone());
        state.tags.insert(arn.clone(), request.tags.clone());

        Ok(CreateTargetGroupResponse {
            id: Some(id),
            arn: Some(arn),
            status: Some(String::from(target_group_status::CREATE_IN_PROGRESS)),
        })
    }

    fn get_target_group_now(&self, id: &str) -> Result<TargetGroup, VendorError> {
        let mut state = self.lock();
        state.enter("GetTargetGroup")?;
        let settle_status = state.settle_status.clone();

        let stored = state.target_groups.get_mut(id).ok_or_else(|| not_found(id))?;
        if stored.pending_reads > 0 {
            stored.pending_reads -= 1;
            return Ok(stored.group.clone());
        }
        if stored.deleting {
            let arn = stored.group.arn.clone();
            state.target_groups.remove(id);
            if let Some(name) = arn {
                state.tags.remove(&name);
            }
            return Err(not_found(id));
        }
        if stored.group.status.as_deref() == Some(target_group_status::CREATE_IN_PROGRESS) {
            stored.group.status = Some(settle_status);
        }
        Ok(stored.group.clone())
    }

    fn update_target_group_now(
        &self,
        request: &UpdateTargetGroupRequest,
    ) -> Result<UpdateTargetGroupResponse, VendorError> {
        let mut state = self.lock();
        state.enter("UpdateTargetGroup")?;
        let settle_reads = state.settle_reads;
        let id = request.target_group_identifier.as_str();
        let stored = state.target_groups.get_mut(id).ok_or_else(|| not_found(id))?;

        if let Some(config) = stored.group.config.as_mut() {
            config.health_check = Some(request.health_check.clone());
        }
        apply_server_defaults(&mut stored.group);
        stored.pending_reads = settle_reads;
        if settle_reads > 0 {
            stored.group.status = Some(String::from(target_group_status::CREATE_IN_PROGRESS));
        }
        Ok(UpdateTargetGroupResponse {
            id: Some(id.to_owned()),
            status: stored.group.status.clone(),
        })
    }

    fn delete_target_group_now(&self, id: &str) -> Result<DeleteTargetGroupResponse, VendorError> {
        let mut state = self.lock();
        state.enter("DeleteTargetGroup")?;
        let settle_reads = state.settle_reads;
        let stored = state.target_groups.get_mut(id).ok_or_else(|| not_found(id))?;
        stored.deleting = true;
        stored.pending_reads = settle_reads;
        stored.group.status = Some(String::from(target_group_status::DELETE_IN_PROGRESS));
        Ok(DeleteTargetGroupResponse {
            id: Some(id.to_owned()),
            status: stored.group.status.clone(),
        })
    }

    fn register_domain_now(&self, request: &RegisterDomainRequest) -> Result<(), VendorError> {
        let mut state = self.lock();
        state.enter("RegisterDomain")?;
        if state.domains.contains_key(&request.name) {
            return Err(VendorError::api(
                "DomainAlreadyExistsFault",
                format!("domain already exists: {}", request.name),
            ));
        }
        let arn = format!("arn:stratus:workflow:{TEST_REGION}:/domain/{}", request.name);
        state.domains.insert(
            request.name.clone(),
            DomainDetail {
                domain_info: Some(DomainInfo {
                    name: request.name.clone(),
                    arn: Some(arn.clone()),
                    status: String::from(registration_status::REGISTERED),
                    description: request.description.clone(),
                }),
                configuration: Some(DomainConfiguration {
                    workflow_execution_retention_period_in_days: request
                        .workflow_execution_retention_period_in_days
                        .clone(),
                }),
            },
        );
        state.tags.insert(arn, request.tags.clone());
        Ok(())
    }

    fn describe_domain_now(&self, name: &str) -> Result<DomainDetail, VendorError> {
        let mut state = self.lock();
        state.enter("DescribeDomain")?;
        state
            .domains
            .get(name)
            .cloned()
            .ok_or_else(|| unknown_domain(name))
    }

    fn deprecate_domain_now(&self, name: &str) -> Result<(), VendorError> {
        let mut state = self.lock();
        state.enter("DeprecateDomain")?;
        let info = state
            .domains
            .get_mut(name)
            .and_then(|detail| detail.domain_info.as_mut())
            .ok_or_else(|| unknown_domain(name))?;
        if info.status == registration_status::DEPRECATED {
            return Err(VendorError::api(
                ERR_DOMAIN_DEPRECATED_FAULT,
                format!("domain already deprecated: {name}"),
            ));
        }
        info.status = String::from(registration_status::DEPRECATED);
        Ok(())
    }

    fn list_state_machines_now(
        &self,
        next_token: Option<&str>,
    ) -> Result<ListStateMachinesResponse, VendorError> {
        let mut state = self.lock();
        state.enter("ListStateMachines")?;
        if state.repeat_page_token {
            return Ok(ListStateMachinesResponse {
                state_machines: Vec::new(),
                next_token: Some(String::from("again")),
            });
        }
        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| VendorError::api("InvalidToken", format!("bad token {token}")))?,
            None => 0,
        };
        let end = (start + state.page_size).min(state.state_machines.len());
        let page = state
            .state_machines
            .get(start..end)
            .map(<[StateMachineListItem]>::to_vec)
            .unwrap_or_default();
        Ok(ListStateMachinesResponse {
            state_machines: page,
            next_token: (end < state.state_machines.len()).then(|| end.to_string()),
        })
    }

    fn tag_resource_now(&self, arn: &str, tags: &Tags) -> Result<(), VendorError> {
        let mut state = self.lock();
        state.enter("TagResource")?;
        let stored = state.tags.get_mut(arn).ok_or_else(|| not_found(arn))?;
        stored.extend(tags.iter().map(|(key, value)| (key.clone(), value.clone())));
        Ok(())
    }

    fn untag_resource_now(&self, arn: &str, keys: &[String]) -> Result<(), VendorError> {
        let mut state = self.lock();
        state.enter("UntagResource")?;
        let stored = state.tags.get_mut(arn).ok_or_else(|| not_found(arn))?;
        for key in keys {
            stored.remove(key);
        }
        Ok(())
    }

    fn list_tags_now(&self, arn: &str) -> Result<Tags, VendorError> {
        let mut state = self.lock();
        state.enter("ListTagsForResource")?;
        state.tags.get(arn).cloned().ok_or_else(|| not_found(arn))
    }
}

impl ControlPlane for InMemoryControlPlane {
    fn create_target_group<'a>(
        &'a self,
        request: &'a CreateTargetGroupRequest,
    ) -> ClientFuture<'a, CreateTargetGroupResponse> {
        Box::pin(async move { self.create_target_group_now(request) })
    }

    fn get_target_group<'a>(&'a self, id: &'a str) -> ClientFuture<'a, TargetGroup> {
        Box::pin(async move { self.get_target_group_now(id) })
    }

    fn update_target_group<'a>(
        &'a self,
        request: &'a UpdateTargetGroupRequest,
    ) -> ClientFuture<'a, UpdateTargetGroupResponse> {
        Box::pin(async move { self.update_target_group_now(request) })
    }

    fn delete_target_group<'a>(
        &'a self,
        id: &'a str,
    ) -> ClientFuture<'a, DeleteTargetGroupResponse> {
        Box::pin(async move { self.delete_target_group_now(id) })
    }

    fn register_domain<'a>(&'a self, request: &'a RegisterDomainRequest) -> ClientFuture<'a, ()> {
        Box::pin(async move { self.register_domain_now(request) })
    }

    fn describe_domain<'a>(&'a self, name: &'a str) -> ClientFuture<'a, DomainDetail> {
        Box::pin(async move { self.describe_domain_now(name) })
    }

    fn deprecate_domain<'a>(&'a self, name: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move { self.deprecate_domain_now(name) })
    }

    fn list_state_machines<'a>(
        &'a self,
        next_token: Option<&'a str>,
    ) -> ClientFuture<'a, ListStateMachinesResponse> {
        Box::pin(async move { self.list_state_machines_now(next_token) })
    }

    fn tag_resource<'a>(&'a self, arn: &'a str, tags: &'a Tags) -> ClientFuture<'a, ()> {
        Box::pin(async move { self.tag_resource_now(arn, tags) })
    }

    fn untag_resource<'a>(&'a self, arn: &'a str, keys: &'a [String]) -> ClientFuture<'a, ()> {
        Box::pin(async move { self.untag_resource_now(arn, keys) })
    }

    fn list_tags<'a>(&'a self, arn: &'a str) -> ClientFuture<'a, Tags> {
        Box::pin(async move { self.list_tags_now(arn) })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)], removed: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(removed.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + removed.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }
        for key in removed {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
