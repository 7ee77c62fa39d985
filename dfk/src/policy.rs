//! Build and provision permissions taken from the configuration.

use dfk_common::config::{CloudConfig, SecurityConfig, WorkerConfig, principal_listed};
use dfk_common::{ExecutionPool, PoolKind, Principal};

/// Principals granted one permission; `*` grants it to everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    allowed: Vec<String>,
}

impl Acl {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permits(&self, principal: &Principal) -> bool {
        principal_listed(&self.allowed, principal.as_str())
    }
}

/// A configured worker, answering for the build permission on itself.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    build: Acl,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, build: Acl) -> Self {
        Self {
            name: name.into(),
            build,
        }
    }

    pub fn from_config(worker: &WorkerConfig, security: &SecurityConfig) -> Self {
        let allowed = worker
            .build_principals
            .as_ref()
            .unwrap_or(&security.build_principals);
        Self::new(&worker.name, Acl::new(allowed.iter().cloned()))
    }
}

impl ExecutionPool for WorkerPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PoolKind {
        PoolKind::Worker
    }

    fn may_build(&self, principal: &Principal) -> bool {
        self.build.permits(principal)
    }
}

/// A configured cloud. Building there needs provision permission on the
/// cloud, or build permission on the root ACL.
#[derive(Debug, Clone)]
pub struct CloudPool {
    name: String,
    provision: Acl,
    root_build: Acl,
}

impl CloudPool {
    pub fn new(name: impl Into<String>, provision: Acl, root_build: Acl) -> Self {
        Self {
            name: name.into(),
            provision,
            root_build,
        }
    }

    pub fn from_config(cloud: &CloudConfig, security: &SecurityConfig) -> Self {
        let provision = cloud
            .provision_principals
            .as_ref()
            .unwrap_or(&security.provision_principals);
        Self::new(
            &cloud.name,
            Acl::new(provision.iter().cloned()),
            Acl::new(security.root_build.iter().cloned()),
        )
    }
}

impl ExecutionPool for CloudPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PoolKind {
        PoolKind::Provisioner
    }

    fn may_build(&self, principal: &Principal) -> bool {
        self.provision.permits(principal) || self.root_build.permits(principal)
    }
}
