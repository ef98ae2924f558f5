// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource controller: the request-level flows for every resource kind.
//!
//! Each operation authorizes first, then loads, patches, dispatches and
//! persists. Nothing is retried. After a dispatch timeout the stored row is
//! left as is, since the agent may still complete the work.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::agent_api::{AgentApi, FunctionDeployment};
use crate::context::RequestContext;
use crate::error::{DispatchError, OasisError};
use crate::objects::repository::ListParams;
use crate::objects::{
    FieldInput, FieldValue, Function, FunctionStatus, Ident, NodePool, NodePoolPolicy,
    ObjectRepository, VersionedObject, row_to_json,
};
use crate::patch::{PatchOperation, apply_patch};
use crate::persistence::Store;
use crate::policy::Authorizer;
use crate::routing::{NodePoolEntry, TopicRouter};

/// HTTP methods a function is exposed for on its nodepool.
pub const DEFAULT_FUNCTION_METHODS: &[&str] = &["POST"];

pub const NODEPOOL_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionCreate {
    pub name: String,
    pub nodepool_id: String,
    #[serde(default)]
    pub body: FieldInput<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodePoolCreate {
    pub name: String,
    #[serde(default)]
    pub agent_server: FieldInput<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodePoolPolicyCreate {
    #[serde(default)]
    pub name: FieldInput<String>,
    pub nodepool_id: String,
    pub min_size: i64,
    pub max_size: i64,
    #[serde(default)]
    pub scaleup_adjust: FieldInput<i64>,
    #[serde(default)]
    pub scaleup_cooldown: FieldInput<i64>,
    #[serde(default)]
    pub scaleup_period: FieldInput<i64>,
    #[serde(default)]
    pub scaleup_evaluation_periods: FieldInput<i64>,
    #[serde(default)]
    pub scaleup_threshold: FieldInput<i64>,
    #[serde(default)]
    pub scaledown_adjust: FieldInput<i64>,
    #[serde(default)]
    pub scaledown_cooldown: FieldInput<i64>,
    #[serde(default)]
    pub scaledown_period: FieldInput<i64>,
    #[serde(default)]
    pub scaledown_evaluation_periods: FieldInput<i64>,
    #[serde(default)]
    pub scaledown_threshold: FieldInput<i64>,
}

impl NodePoolPolicyCreate {
    fn knobs(&self) -> [(&'static str, &FieldInput<i64>); 10] {
        [
            ("scaleup_adjust", &self.scaleup_adjust),
            ("scaleup_cooldown", &self.scaleup_cooldown),
            ("scaleup_period", &self.scaleup_period),
            ("scaleup_evaluation_periods", &self.scaleup_evaluation_periods),
            ("scaleup_threshold", &self.scaleup_threshold),
            ("scaledown_adjust", &self.scaledown_adjust),
            ("scaledown_cooldown", &self.scaledown_cooldown),
            ("scaledown_period", &self.scaledown_period),
            ("scaledown_evaluation_periods", &self.scaledown_evaluation_periods),
            ("scaledown_threshold", &self.scaledown_threshold),
        ]
    }
}

fn project_of<T: VersionedObject>(object: &T) -> Option<String> {
    object
        .get_field("project_id")
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Stamp the owning tenant from the request context.
fn stamp_owner<T: VersionedObject>(object: &mut T, ctx: &RequestContext) -> Result<(), OasisError> {
    object.assign("project_id", ctx.project_id.clone())?;
    object.assign("user_id", ctx.user_id.clone())?;
    Ok(())
}

fn deployment(function: &Function) -> Result<FunctionDeployment<'_>, OasisError> {
    let function_id = function
        .uuid_field()
        .ok_or_else(|| OasisError::invalid_parameter("uuid", "function has not been persisted"))?;
    let rule = match function.name() {
        Some(name) => format!("/{}", name),
        None => format!("/{}", function_id),
    };
    Ok(FunctionDeployment {
        function_id,
        rule,
        body: function.body().map(String::as_str).unwrap_or_default(),
        methods: DEFAULT_FUNCTION_METHODS.iter().map(|m| m.to_string()).collect(),
    })
}

pub struct ResourceController {
    store: Arc<dyn Store>,
    authorizer: Arc<dyn Authorizer>,
    agents: AgentApi,
    functions: ObjectRepository<Function>,
    nodepools: ObjectRepository<NodePool>,
    policies: ObjectRepository<NodePoolPolicy>,
    max_limit: u32,
}

impl ResourceController {
    pub fn new(
        store: Arc<dyn Store>,
        authorizer: Arc<dyn Authorizer>,
        agents: AgentApi,
        max_limit: u32,
    ) -> Self {
        Self {
            functions: ObjectRepository::new(store.clone()),
            nodepools: ObjectRepository::new(store.clone()),
            policies: ObjectRepository::new(store.clone()),
            store,
            authorizer,
            agents,
            max_limit,
        }
    }

    pub fn router(&self) -> &Arc<TopicRouter> {
        self.agents.dispatcher().router()
    }

    pub fn agents(&self) -> &AgentApi {
        &self.agents
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    pub async fn health_check(&self) -> Result<bool, OasisError> {
        self.store.health_check().await
    }

    /// Register every persisted nodepool with the router.
    pub async fn load_registry(&self) -> Result<usize, OasisError> {
        let ctx = RequestContext::admin();
        let mut marker = None;
        let mut loaded = 0;
        loop {
            let page = self
                .nodepools
                .list(
                    &ctx,
                    ListParams {
                        marker: marker.clone(),
                        ..Default::default()
                    },
                    self.max_limit,
                )
                .await?;
            let Some(last) = page.last() else { break };
            marker = last.uuid_field().map(|u| u.to_string());
            let full_page = page.len() as u32 == self.max_limit;
            for pool in &page {
                self.register_pool(pool);
                loaded += 1;
            }
            if !full_page {
                break;
            }
        }
        Ok(loaded)
    }

    fn register_pool(&self, pool: &NodePool) {
        if let Some(name) = pool.name() {
            let mut entry = NodePoolEntry::new(name.clone());
            if let Some(server) = pool.agent_server() {
                entry = entry.with_server(server.clone());
            }
            self.router().register(entry);
        }
    }

    async fn load<T: VersionedObject>(
        &self,
        repo: &ObjectRepository<T>,
        ctx: &RequestContext,
        ident: &str,
        action: &str,
    ) -> Result<T, OasisError> {
        let ident = Ident::parse(ident)?;
        let object = repo.get(ctx, &ident).await?;
        self.authorizer
            .enforce(ctx, action, project_of(&object).as_deref())?;
        Ok(object)
    }

    fn require_nodepool(&self, nodepool_id: &str) -> Result<(), OasisError> {
        if self.router().contains(nodepool_id) {
            Ok(())
        } else {
            Err(DispatchError::UnknownNodePool {
                nodepool_id: nodepool_id.to_string(),
            }
            .into())
        }
    }

    // Functions

    pub async fn list_functions(
        &self,
        ctx: &RequestContext,
        params: ListParams,
        detail: bool,
    ) -> Result<Vec<Function>, OasisError> {
        let action = if detail { "function:detail" } else { "function:get_all" };
        self.authorizer.enforce(ctx, action, None)?;
        self.functions.list(ctx, params, self.max_limit).await
    }

    pub async fn get_function(&self, ctx: &RequestContext, ident: &str) -> Result<Function, OasisError> {
        self.load(&self.functions, ctx, ident, "function:get").await
    }

    /// Persist as `CREATE_IN_PROGRESS`, deploy on the owning nodepool, then
    /// record the outcome.
    #[instrument(skip(self, ctx, request), fields(request_id = %ctx.request_id, nodepool_id = %request.nodepool_id))]
    pub async fn create_function(
        &self,
        ctx: &RequestContext,
        request: FunctionCreate,
    ) -> Result<Function, OasisError> {
        self.authorizer.enforce(ctx, "function:create", None)?;
        let stack_id = ctx.project_id.clone().ok_or_else(|| {
            OasisError::invalid_parameter("project_id", "creating a function requires a project")
        })?;
        if !crate::objects::is_logical_name(&request.name) {
            return Err(OasisError::invalid_parameter(
                "name",
                format!("'{}' is not a valid function name", request.name),
            ));
        }
        self.require_nodepool(&request.nodepool_id)?;

        let mut function = Function::default();
        stamp_owner(&mut function, ctx)?;
        function.assign("name", request.name)?;
        function.assign("nodepool_id", request.nodepool_id.clone())?;
        function.assign("stack_id", stack_id)?;
        function.assign("body", request.body.value())?;
        function.assign("status", FunctionStatus::CreateInProgress)?;
        function.validate()?;
        self.functions.create(ctx, &mut function).await?;

        let outcome = self
            .agents
            .function_create(ctx, &request.nodepool_id, &deployment(&function)?)
            .await;

        match outcome {
            Ok(_) => {
                function.assign("status", FunctionStatus::CreateComplete)?;
                function.assign("status_reason", "CREATE completed successfully".to_string())?;
                self.functions.save(ctx, &mut function).await?;
                info!(uuid = ?function.uuid_field(), "function created");
                Ok(function)
            }
            Err(e) => {
                self.record_failure(ctx, &mut function, FunctionStatus::CreateFailed, &e)
                    .await;
                Err(e.into())
            }
        }
    }

    /// Store the failure on the row unless the outcome is unknown.
    async fn record_failure(
        &self,
        ctx: &RequestContext,
        function: &mut Function,
        status: FunctionStatus,
        error: &DispatchError,
    ) {
        let recorded = match error {
            DispatchError::RemoteTimeout { .. } => {
                function.assign("status_reason", error.to_string())
            }
            _ => function
                .assign("status", status)
                .and_then(|_| function.assign("status_reason", error.to_string())),
        };
        if let Err(e) = recorded {
            warn!(error = %e, "could not record function failure");
            return;
        }
        if let Err(e) = self.functions.save(ctx, function).await {
            warn!(error = %e, "could not persist function failure");
        }
    }

    #[instrument(skip(self, ctx, operations), fields(request_id = %ctx.request_id))]
    pub async fn patch_function(
        &self,
        ctx: &RequestContext,
        ident: &str,
        operations: &[PatchOperation],
    ) -> Result<Function, OasisError> {
        let mut function = self.load(&self.functions, ctx, ident, "function:update").await?;
        let changed = apply_patch(&mut function, operations)?;
        if changed.is_empty() {
            return Ok(function);
        }

        let nodepool_id = function
            .nodepool_id()
            .cloned()
            .ok_or_else(|| OasisError::invalid_parameter("nodepool_id", "function has no nodepool"))?;

        let outcome = self
            .agents
            .function_update(ctx, &nodepool_id, &deployment(&function)?)
            .await;

        match outcome {
            Ok(_) => {
                self.functions.save(ctx, &mut function).await?;
                Ok(function)
            }
            Err(e) => {
                // The patch itself is not kept; only the failure is recorded.
                self.functions.refresh(ctx, &mut function).await?;
                self.record_failure(ctx, &mut function, FunctionStatus::UpdateFailed, &e)
                    .await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn delete_function(&self, ctx: &RequestContext, ident: &str) -> Result<(), OasisError> {
        let mut function = self.load(&self.functions, ctx, ident, "function:delete").await?;
        let function_id = function
            .uuid_field()
            .ok_or_else(|| OasisError::invalid_parameter("uuid", "function has not been persisted"))?;
        let nodepool_id = function
            .nodepool_id()
            .cloned()
            .ok_or_else(|| OasisError::invalid_parameter("nodepool_id", "function has no nodepool"))?;

        function.assign("status", FunctionStatus::DeleteInProgress)?;
        self.functions.save(ctx, &mut function).await?;

        match self.agents.function_delete(ctx, &nodepool_id, &function_id).await {
            Ok(_) => {
                self.functions.destroy(ctx, &mut function).await?;
                info!(uuid = %function_id, "function deleted");
                Ok(())
            }
            Err(e) => {
                self.record_failure(ctx, &mut function, FunctionStatus::DeleteFailed, &e)
                    .await;
                Err(e.into())
            }
        }
    }

    // NodePools

    pub async fn list_nodepools(
        &self,
        ctx: &RequestContext,
        params: ListParams,
    ) -> Result<Vec<NodePool>, OasisError> {
        self.authorizer.enforce(ctx, "nodepool:get_all", None)?;
        self.nodepools.list(ctx, params, self.max_limit).await
    }

    pub async fn get_nodepool(&self, ctx: &RequestContext, ident: &str) -> Result<NodePool, OasisError> {
        self.load(&self.nodepools, ctx, ident, "nodepool:get").await
    }

    /// Persist a nodepool and make it routable. Names are global because
    /// they address agent topics.
    #[instrument(skip(self, ctx, request), fields(request_id = %ctx.request_id, name = %request.name))]
    pub async fn create_nodepool(
        &self,
        ctx: &RequestContext,
        request: NodePoolCreate,
    ) -> Result<NodePool, OasisError> {
        self.authorizer.enforce(ctx, "nodepool:create", None)?;

        let mut pool = NodePool::default();
        stamp_owner(&mut pool, ctx)?;
        pool.assign("name", request.name.clone())?;
        pool.assign("agent_server", request.agent_server.value())?;
        pool.assign("status", NODEPOOL_ACTIVE.to_string())?;
        pool.validate()?;

        let taken = self
            .store
            .get_by_name(&RequestContext::admin(), NodePool::schema().kind, &request.name)
            .await?;
        if !taken.is_empty() || self.router().contains(&request.name) {
            return Err(OasisError::invalid_parameter(
                "name",
                format!("nodepool '{}' already exists", request.name),
            ));
        }

        self.nodepools.create(ctx, &mut pool).await?;
        self.register_pool(&pool);
        Ok(pool)
    }

    /// Refused while any function or policy still names the pool.
    pub async fn delete_nodepool(&self, ctx: &RequestContext, ident: &str) -> Result<(), OasisError> {
        let mut pool = self.load(&self.nodepools, ctx, ident, "nodepool:delete").await?;
        let name = pool.name().cloned().unwrap_or_default();

        if self.references_pool(&self.functions, &name).await? {
            return Err(OasisError::invalid_parameter(
                "nodepool",
                format!("nodepool '{}' still hosts functions", name),
            ));
        }
        if self.references_pool(&self.policies, &name).await? {
            return Err(OasisError::invalid_parameter(
                "nodepool",
                format!("nodepool '{}' still has policies", name),
            ));
        }

        self.nodepools.destroy(ctx, &mut pool).await?;
        self.router().unregister(&name);
        Ok(())
    }

    /// Whether any row of `repo`, in any tenant, has `nodepool_id == name`.
    async fn references_pool<T: VersionedObject>(
        &self,
        repo: &ObjectRepository<T>,
        name: &str,
    ) -> Result<bool, OasisError> {
        let params = ListParams {
            filters: [("nodepool_id".to_string(), FieldValue::Text(name.to_string()))]
                .into_iter()
                .collect(),
            limit: Some(1),
            ..Default::default()
        };
        let found = repo.list(&RequestContext::admin(), params, self.max_limit).await?;
        Ok(!found.is_empty())
    }

    // NodePoolPolicies

    pub async fn list_policies(
        &self,
        ctx: &RequestContext,
        params: ListParams,
        detail: bool,
    ) -> Result<Vec<NodePoolPolicy>, OasisError> {
        let action = if detail {
            "nodepool_policy:detail"
        } else {
            "nodepool_policy:get_all"
        };
        self.authorizer.enforce(ctx, action, None)?;
        self.policies.list(ctx, params, self.max_limit).await
    }

    pub async fn get_policy(
        &self,
        ctx: &RequestContext,
        ident: &str,
    ) -> Result<NodePoolPolicy, OasisError> {
        self.load(&self.policies, ctx, ident, "nodepool_policy:get").await
    }

    pub async fn create_policy(
        &self,
        ctx: &RequestContext,
        request: NodePoolPolicyCreate,
    ) -> Result<NodePoolPolicy, OasisError> {
        self.authorizer.enforce(ctx, "nodepool_policy:create", None)?;
        self.require_nodepool(&request.nodepool_id)?;

        let mut policy = NodePoolPolicy::default();
        stamp_owner(&mut policy, ctx)?;
        policy.assign("name", request.name.clone().value())?;
        policy.assign("nodepool_id", request.nodepool_id.clone())?;
        policy.assign("min_size", request.min_size)?;
        policy.assign("max_size", request.max_size)?;
        for (field, value) in request.knobs() {
            policy.assign(field, value.clone().value())?;
        }
        policy.validate()?;

        self.policies.create(ctx, &mut policy).await?;
        Ok(policy)
    }

    /// Persist the delta, then push it to the owning nodepool's agent.
    #[instrument(skip(self, ctx, operations), fields(request_id = %ctx.request_id))]
    pub async fn patch_policy(
        &self,
        ctx: &RequestContext,
        ident: &str,
        operations: &[PatchOperation],
    ) -> Result<NodePoolPolicy, OasisError> {
        let mut policy = self
            .load(&self.policies, ctx, ident, "nodepool_policy:update")
            .await?;
        apply_patch(&mut policy, operations)?;
        let changes: Map<String, Value> = row_to_json(policy.get_changes());
        if changes.is_empty() {
            return Ok(policy);
        }

        // Resolve the route before writing, so an unroutable patch leaves
        // the stored row untouched.
        let nodepool_id = policy.nodepool_id().cloned().unwrap_or_default();
        self.require_nodepool(&nodepool_id)?;

        let written = self.policies.save(ctx, &mut policy).await?;
        if written.is_empty() {
            return Ok(policy);
        }

        if let Some(policy_id) = policy.uuid_field() {
            self.agents
                .nodepool_policy_update(ctx, &nodepool_id, &policy_id, changes)
                .await?;
        }
        Ok(policy)
    }

    pub async fn delete_policy(&self, ctx: &RequestContext, ident: &str) -> Result<(), OasisError> {
        let mut policy = self
            .load(&self.policies, ctx, ident, "nodepool_policy:delete")
            .await?;
        self.policies.destroy(ctx, &mut policy).await
    }
}
