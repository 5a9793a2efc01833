//! LBaaS adapter: a REST load balancer that queues every change as jobs.
//!
//! Resources live under `/loadbalancers/tenant/<tenant>/`:
//!
//! | operation      | request                                        |
//! |----------------|------------------------------------------------|
//! | create_pool    | `PUT pools/<pool>`                             |
//! | delete_pool    | `DELETE pools/<pool>`                          |
//! | create_route   | `PUT policies/<route>` with a path rule        |
//! | delete_route   | `DELETE policies/<route>`                      |
//! | add_member     | `POST pools` with a services list              |
//! | delete_member  | `DELETE pools/services/<address:port>`         |
//! | job status     | `GET jobs/<id>`                                |
//!
//! Change requests must answer 202 with `Lb_Job_List.jobIds`. Monitors and
//! route attachment have no LBaaS counterpart and complete immediately.
//!
//! Authentication is the keystone v2 exchange: an unscoped token, a tenant
//! lookup, then a tenant-scoped token sent as `X-Auth-Token`.

use async_trait::async_trait;
use http::Method;
use lbsync_core::config::LbaasConfig;
use lbsync_core::{Inventory, Member, PoolRecord, RouteRecord};
use lbsync_scheduler::{Backend, BackendError, BackendResult, JobId, JobStatus, OpKind, Operation};
use regex::Regex;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::http::send_json;

/// Adapter for an LBaaS REST endpoint.
pub struct LbaasBackend {
    config: LbaasConfig,
    token: RwLock<Option<String>>,
}

impl LbaasBackend {
    pub fn new(config: LbaasConfig) -> Self {
        Self {
            config,
            token: RwLock::new(None),
        }
    }

    fn tenant_path(&self, suffix: &str) -> String {
        format!("/loadbalancers/tenant/{}/{suffix}", self.config.tenant)
    }

    async fn token(&self) -> BackendResult<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| BackendError::Auth("not authenticated".into()))
    }

    /// `GET` a tenant resource and decode the JSON body.
    async fn get(&self, suffix: &str) -> BackendResult<Value> {
        let token = self.token().await?;
        send_json(
            Method::GET,
            &self.config.host,
            &self.tenant_path(suffix),
            Some(&token),
            None,
        )
        .await?
        .expect_status(200)?
        .json()
    }

    /// Send a change request and return the jobs it queued.
    async fn change(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> BackendResult<Vec<JobId>> {
        let token = self.token().await?;
        let resp = send_json(
            method,
            &self.config.host,
            &self.tenant_path(suffix),
            Some(&token),
            body.as_ref(),
        )
        .await?
        .expect_status(202)?;
        parse_job_ids(&resp.json()?)
    }

    async fn pool_members(&self, pool: &str) -> BackendResult<Vec<Member>> {
        let body = self.get(&format!("pools/{pool}")).await?;
        let mut members = Vec::new();
        for name in names_in(body.get("pool")) {
            match name.parse::<Member>() {
                Ok(member) => members.push(member),
                Err(e) => warn!(pool, error = %e, "skipping unparseable pool member"),
            }
        }
        Ok(members)
    }
}

#[async_trait]
impl Backend for LbaasBackend {
    fn name(&self) -> &str {
        "lbaas"
    }

    async fn authenticate(&self) -> BackendResult<()> {
        let keystone = self.config.keystone_host();
        let credentials = json!({
            "username": self.config.username,
            "password": self.config.password,
        });
        info!(host = keystone, user = %self.config.username, "authenticating with keystone");

        let unscoped = send_json(
            Method::POST,
            keystone,
            "/v2.0/tokens",
            None,
            Some(&json!({ "auth": { "passwordCredentials": credentials } })),
        )
        .await?
        .expect_status(200)
        .map_err(auth_error)?
        .json()?;
        let temp_token = token_id(&unscoped)?;

        let tenants = send_json(Method::GET, keystone, "/v2.0/tenants", Some(&temp_token), None)
            .await?
            .expect_status(200)
            .map_err(auth_error)?
            .json()?;
        let tenant_id = tenant_id(&tenants, &self.config.tenant)?;

        let scoped = send_json(
            Method::POST,
            keystone,
            "/v2.0/tokens",
            None,
            Some(&json!({
                "auth": {
                    "project": self.config.tenant,
                    "passwordCredentials": credentials,
                    "tenantId": tenant_id,
                }
            })),
        )
        .await?
        .expect_status(200)
        .map_err(auth_error)?
        .json()?;

        *self.token.write().await = Some(token_id(&scoped)?);
        info!(tenant = %self.config.tenant, %tenant_id, "keystone token acquired");
        Ok(())
    }

    async fn inventory(&self) -> BackendResult<Inventory> {
        let mut inventory = Inventory::default();

        let pools = self.get("pools").await?;
        for name in names_in(Some(&pools)) {
            let members = self.pool_members(&name).await?;
            inventory.pools.push(PoolRecord {
                name,
                members,
                monitor: None,
            });
        }

        let policies = self.get("policies").await?;
        for policy in policies.as_array().into_iter().flatten() {
            let Some(name) = policy.get("name").and_then(Value::as_str) else {
                continue;
            };
            let (pool, path) = match policy.get("rule").and_then(Value::as_str) {
                Some(rule) => parse_route_rule(rule)?.unwrap_or_default(),
                None => Default::default(),
            };
            inventory.routes.push(RouteRecord {
                name: name.to_string(),
                pool,
                path,
                attached_to: None,
            });
        }

        Ok(inventory)
    }

    async fn submit(&self, op: &Operation) -> BackendResult<Vec<JobId>> {
        let arg = |i: usize| op.operand(i).unwrap_or_default();
        match op.kind() {
            OpKind::CreatePool => {
                let pool = arg(0);
                let body = json!({
                    "pool": {
                        "name": pool,
                        "method": "LeastConnection",
                        "port": "80",
                        "enabled": false,
                        "monitors": ["http"],
                    }
                });
                self.change(Method::PUT, &format!("pools/{pool}"), Some(body))
                    .await
            }
            OpKind::DeletePool => {
                self.change(Method::DELETE, &format!("pools/{}", arg(0)), None)
                    .await
            }
            OpKind::CreateRoute => {
                let (pool, route, path) = (arg(0), arg(1), arg(2));
                let body = json!({
                    "policy": {
                        "name": route,
                        "rule": route_rule(path, pool, &self.config.default_pool),
                    }
                });
                self.change(Method::PUT, &format!("policies/{route}"), Some(body))
                    .await
            }
            OpKind::DeleteRoute => {
                self.change(Method::DELETE, &format!("policies/{}", arg(1)), None)
                    .await
            }
            OpKind::AddMember => {
                let (pool, address, port) = (arg(0), arg(1), arg(2));
                let port: u16 = port.parse().map_err(|_| {
                    BackendError::Protocol(format!("{op}: port is not a number"))
                })?;
                let body = json!([{
                    "pool": {
                        "name": pool,
                        "services": [{
                            "ip": address,
                            "enabled": false,
                            "name": format!("{address}:{port}"),
                            "weight": 10,
                            "port": port,
                        }],
                    }
                }]);
                self.change(Method::POST, "pools", Some(body)).await
            }
            OpKind::DeleteMember => {
                let member = format!("{}:{}", arg(1), arg(2));
                self.change(Method::DELETE, &format!("pools/services/{member}"), None)
                    .await
            }
            OpKind::CreateMonitor | OpKind::DeleteMonitor => {
                warn!(%op, "LBaaS has no health monitors; nothing to do");
                Ok(Vec::new())
            }
            OpKind::AttachRoute | OpKind::DetachRoute => {
                debug!(%op, "LBaaS policies apply tenant-wide; nothing to do");
                Ok(Vec::new())
            }
        }
    }

    async fn status(&self, job: &JobId) -> BackendResult<JobStatus> {
        let body = self.get(&format!("jobs/{job}")).await?;
        parse_job_status(&body, job)
    }
}

fn auth_error(e: BackendError) -> BackendError {
    match e {
        BackendError::Status { code, body } => {
            BackendError::Auth(format!("keystone answered {code}: {body}"))
        }
        other => other,
    }
}

/// `access.token.id` of a keystone token response.
fn token_id(body: &Value) -> BackendResult<String> {
    body.pointer("/access/token/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Auth("keystone response carries no token".into()))
}

/// Id of the tenant called `tenant` in a keystone tenant listing.
fn tenant_id(body: &Value, tenant: &str) -> BackendResult<String> {
    body.get("tenants")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|t| t.get("name").and_then(Value::as_str) == Some(tenant))
        .and_then(|t| t.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Auth(format!("tenant {tenant} not found")))
}

/// The `name` fields of a JSON array of objects.
fn names_in(list: Option<&Value>) -> Vec<String> {
    list.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// The rule text of a policy that sends `path` to `pool` and everything
/// else to `default_pool`.
pub fn route_rule(path: &str, pool: &str, default_pool: &str) -> String {
    format!(
        "when HTTP_REQUEST {{ if {{[HTTP::path] starts_with \"{path}\"}} {{pool {pool}}} else {{pool {default_pool}}}}}"
    )
}

/// Recover `(pool, path)` from a rule written by [`route_rule`].
pub fn parse_route_rule(rule: &str) -> BackendResult<Option<(String, String)>> {
    let rule_re = Regex::new(r#"starts_with\s+"([^"]*)"\s*\}\s*\{\s*pool\s+([^\s}]+)"#)
        .map_err(|e| BackendError::Protocol(e.to_string()))?;
    Ok(rule_re
        .captures(rule)
        .map(|caps| (caps[2].to_string(), caps[1].to_string())))
}

/// `Lb_Job_List.jobIds` of a change response. Ids may be strings or numbers.
pub fn parse_job_ids(body: &Value) -> BackendResult<Vec<JobId>> {
    let ids = body
        .pointer("/Lb_Job_List/jobIds")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Protocol("response carries no Lb_Job_List.jobIds".into()))?;
    ids.iter()
        .map(|id| match id {
            Value::String(s) => Ok(JobId::new(s.as_str())),
            Value::Number(n) => Ok(JobId::new(n.to_string())),
            other => Err(BackendError::Protocol(format!("job id {other} is not a string"))),
        })
        .collect()
}

/// Decode `Tenant_Job_Details` for `requested`.
pub fn parse_job_status(body: &Value, requested: &JobId) -> BackendResult<JobStatus> {
    let details = body
        .get("Tenant_Job_Details")
        .ok_or_else(|| BackendError::Protocol("response carries no Tenant_Job_Details".into()))?;

    let reported = match details.get("jobId") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    if let Some(reported) = reported.filter(|r| r != requested.as_str()) {
        return Err(BackendError::Protocol(format!(
            "asked for job {requested}, got status of job {reported}"
        )));
    }

    match details.get("status").and_then(Value::as_str) {
        Some("PENDING") => Ok(JobStatus::Pending),
        Some("COMPLETED") => Ok(JobStatus::Completed),
        Some("FAILED") => Ok(JobStatus::Failed),
        Some(other) => Err(BackendError::Protocol(format!(
            "unknown status {other} for job {requested}"
        ))),
        None => Err(BackendError::Protocol(format!(
            "no status for job {requested}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A request as seen by the canned server: `METHOD /path`, auth token,
    /// and body.
    #[derive(Debug, Clone)]
    struct Seen {
        line: String,
        token: Option<String>,
        body: String,
    }

    /// Serve one canned `(status, body)` response per connection, in order.
    async fn canned_server(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (addr, seen)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> Seen {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let header = |name: &str| {
            head.lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case(name).then(|| v.trim().to_string())
                })
        };
        let length: usize = header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let line = head
            .lines()
            .next()
            .unwrap()
            .rsplit_once(' ')
            .unwrap()
            .0
            .to_string();
        Seen {
            line,
            token: header("x-auth-token"),
            body: String::from_utf8_lossy(&buf[header_end..header_end + length]).to_string(),
        }
    }

    fn config(host: &str) -> LbaasConfig {
        LbaasConfig {
            host: host.to_string(),
            tenant: "lbms".into(),
            default_pool: "pool_default".into(),
            ..LbaasConfig::default()
        }
    }

    fn token_body(id: &str) -> String {
        json!({ "access": { "token": { "id": id } } }).to_string()
    }

    async fn authenticated(responses: Vec<(u16, String)>) -> (LbaasBackend, Arc<Mutex<Vec<Seen>>>) {
        let mut all = vec![
            (200, token_body("unscoped")),
            (
                200,
                json!({ "tenants": [
                    { "name": "other", "id": "t-0" },
                    { "name": "lbms", "id": "t-1" }
                ]})
                .to_string(),
            ),
            (200, token_body("scoped")),
        ];
        all.extend(responses);
        let (addr, seen) = canned_server(all).await;
        let backend = LbaasBackend::new(config(&addr));
        backend.authenticate().await.unwrap();
        (backend, seen)
    }

    // ── Rule and response parsing ──────────────────────────────────

    #[test]
    fn route_rule_round_trips_through_parser() {
        let rule = route_rule("/shop", "pool_shop", "pool_default");
        assert_eq!(
            rule,
            "when HTTP_REQUEST { if {[HTTP::path] starts_with \"/shop\"} {pool pool_shop} else {pool pool_default}}"
        );
        assert_eq!(
            parse_route_rule(&rule).unwrap(),
            Some(("pool_shop".to_string(), "/shop".to_string()))
        );
    }

    #[test]
    fn foreign_rule_parses_to_none() {
        assert_eq!(parse_route_rule("when HTTP_REQUEST { drop }").unwrap(), None);
    }

    #[test]
    fn job_ids_accept_strings_and_numbers() {
        let body = json!({ "Lb_Job_List": { "jobIds": ["a1", 42] } });
        assert_eq!(
            parse_job_ids(&body).unwrap(),
            vec![JobId::new("a1"), JobId::new("42")]
        );
        assert!(matches!(
            parse_job_ids(&json!({})),
            Err(BackendError::Protocol(_))
        ));
    }

    #[test]
    fn job_status_maps_known_states() {
        let job = JobId::new("7");
        for (text, expected) in [
            ("PENDING", JobStatus::Pending),
            ("COMPLETED", JobStatus::Completed),
            ("FAILED", JobStatus::Failed),
        ] {
            let body = json!({ "Tenant_Job_Details": { "status": text, "jobId": "7" } });
            assert_eq!(parse_job_status(&body, &job).unwrap(), expected);
        }
    }

    #[test]
    fn job_status_rejects_unknown_state_and_mismatched_id() {
        let job = JobId::new("7");
        let unknown = json!({ "Tenant_Job_Details": { "status": "EXPLODED", "jobId": "7" } });
        assert!(matches!(
            parse_job_status(&unknown, &job),
            Err(BackendError::Protocol(_))
        ));

        let mismatch = json!({ "Tenant_Job_Details": { "status": "COMPLETED", "jobId": 8 } });
        let err = parse_job_status(&mismatch, &job).unwrap_err();
        assert!(err.to_string().contains("asked for job 7"));
    }

    #[test]
    fn tenant_lookup_matches_by_name() {
        let body = json!({ "tenants": [{ "name": "lbms", "id": "abc" }] });
        assert_eq!(tenant_id(&body, "lbms").unwrap(), "abc");
        assert!(matches!(tenant_id(&body, "nope"), Err(BackendError::Auth(_))));
    }

    // ── Against a canned server ────────────────────────────────────

    #[tokio::test]
    async fn calls_before_authentication_fail() {
        let backend = LbaasBackend::new(config("127.0.0.1:9"));
        let err = backend
            .submit(&Operation::delete_pool("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));
    }

    #[tokio::test]
    async fn authentication_scopes_token_to_tenant() {
        let (backend, seen) = authenticated(vec![(
            202,
            json!({ "Lb_Job_List": { "jobIds": ["j1"] } }).to_string(),
        )])
        .await;

        let jobs = backend
            .submit(&Operation::delete_pool("p1"))
            .await
            .unwrap();
        assert_eq!(jobs, vec![JobId::new("j1")]);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].line, "POST /v2.0/tokens");
        assert_eq!(seen[1].line, "GET /v2.0/tenants");
        assert_eq!(seen[1].token.as_deref(), Some("unscoped"));
        let scoped: Value = serde_json::from_str(&seen[2].body).unwrap();
        assert_eq!(scoped["auth"]["tenantId"], "t-1");
        assert_eq!(seen[3].line, "DELETE /loadbalancers/tenant/lbms/pools/p1");
        assert_eq!(seen[3].token.as_deref(), Some("scoped"));
    }

    #[tokio::test]
    async fn rejected_credentials_are_an_auth_error() {
        let (addr, _seen) = canned_server(vec![(401, "{}".to_string())]).await;
        let backend = LbaasBackend::new(config(&addr));
        assert!(matches!(
            backend.authenticate().await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn submissions_send_expected_requests() {
        let accepted = || (202, json!({ "Lb_Job_List": { "jobIds": ["j"] } }).to_string());
        let (backend, seen) =
            authenticated(vec![accepted(), accepted(), accepted()]).await;

        backend
            .submit(&Operation::create_pool("p1", None))
            .await
            .unwrap();
        backend
            .submit(&Operation::create_route("p1", "r1", "/app"))
            .await
            .unwrap();
        backend
            .submit(&Operation::add_member("p1", "10.0.0.1", 8080))
            .await
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[3].line, "PUT /loadbalancers/tenant/lbms/pools/p1");
        let pool: Value = serde_json::from_str(&seen[3].body).unwrap();
        assert_eq!(pool["pool"]["method"], "LeastConnection");

        assert_eq!(seen[4].line, "PUT /loadbalancers/tenant/lbms/policies/r1");
        let policy: Value = serde_json::from_str(&seen[4].body).unwrap();
        assert_eq!(
            policy["policy"]["rule"],
            route_rule("/app", "p1", "pool_default")
        );

        assert_eq!(seen[5].line, "POST /loadbalancers/tenant/lbms/pools");
        let members: Value = serde_json::from_str(&seen[5].body).unwrap();
        assert_eq!(members[0]["pool"]["services"][0]["name"], "10.0.0.1:8080");
        assert_eq!(members[0]["pool"]["services"][0]["port"], 8080);
    }

    #[tokio::test]
    async fn submission_not_accepted_is_a_status_error() {
        let (backend, _seen) = authenticated(vec![(500, "oops".to_string())]).await;
        let err = backend
            .submit(&Operation::delete_member("p1", "10.0.0.1", 8080))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { code: 500, .. }));
    }

    #[tokio::test]
    async fn monitors_and_attachment_complete_without_requests() {
        let (backend, seen) = authenticated(Vec::new()).await;
        for op in [
            Operation::create_monitor("m1", "/health", "1"),
            Operation::delete_monitor("m1"),
            Operation::attach_route("r1", "vs"),
            Operation::detach_route("r1", "vs"),
        ] {
            assert!(backend.submit(&op).await.unwrap().is_empty());
        }
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn status_reads_tenant_job_details() {
        let (backend, seen) = authenticated(vec![(
            200,
            json!({ "Tenant_Job_Details": { "status": "COMPLETED", "jobId": "j9" } }).to_string(),
        )])
        .await;
        let status = backend.status(&JobId::new("j9")).await.unwrap();
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(
            seen.lock().unwrap()[3].line,
            "GET /loadbalancers/tenant/lbms/jobs/j9"
        );
    }

    #[tokio::test]
    async fn inventory_reads_pools_members_and_policies() {
        let (backend, _seen) = authenticated(vec![
            (200, json!([{ "name": "p1" }]).to_string()),
            (
                200,
                json!({ "pool": [{ "name": "10.0.0.1:8080" }, { "name": "garbage" }] }).to_string(),
            ),
            (
                200,
                json!([{
                    "name": "r1",
                    "rule": route_rule("/app", "p1", "pool_default"),
                }])
                .to_string(),
            ),
        ])
        .await;

        let inventory = backend.inventory().await.unwrap();
        assert_eq!(inventory.pools.len(), 1);
        assert_eq!(inventory.pools[0].members, vec![Member::new("10.0.0.1", 8080)]);
        assert_eq!(inventory.routes[0].pool, "p1");
        assert_eq!(inventory.routes[0].path, "/app");
        assert!(inventory.monitors.is_empty());
    }
}
