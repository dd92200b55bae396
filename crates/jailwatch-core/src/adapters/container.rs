//! Container runtime adapter (Docker / Podman CLI).
//!
//! Enumerates and kills the containers a compose-style network setup
//! started for each node.

use async_trait::async_trait;
use tokio::process::Command;

use crate::adapter::{FaultError, FaultInjector, FaultResult};
use crate::config::RuntimeKind;
use crate::types::{ContainerHandle, ContainerSet};

/// `ps` output template: one `<id>\t<name>` line per container.
const PS_FORMAT: &str = "{{.ID}}\t{{.Names}}";

/// Container runtime CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker runtime.
    Docker,
    /// Podman runtime.
    Podman,
}

impl ContainerRuntime {
    /// Returns the runtime CLI command name.
    #[must_use]
    pub const fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl From<RuntimeKind> for ContainerRuntime {
    fn from(kind: RuntimeKind) -> Self {
        match kind {
            RuntimeKind::Docker => Self::Docker,
            RuntimeKind::Podman => Self::Podman,
        }
    }
}

/// [`FaultInjector`] that shells out to the container runtime.
///
/// # Example
///
/// ```rust,ignore
/// use jailwatch_core::adapters::ContainerFaultInjector;
/// use jailwatch_core::FaultInjector;
///
/// let injector = ContainerFaultInjector::docker();
/// let running = injector.list_running().await?;
/// if let Some(node) = running.get("jail_chain1_1") {
///     injector.kill(node).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ContainerFaultInjector {
    runtime: ContainerRuntime,
}

impl ContainerFaultInjector {
    /// Creates an injector for the given runtime.
    #[must_use]
    pub const fn new(runtime: ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Creates an injector driving Docker.
    #[must_use]
    pub const fn docker() -> Self {
        Self::new(ContainerRuntime::Docker)
    }

    /// Creates an injector driving Podman.
    #[must_use]
    pub const fn podman() -> Self {
        Self::new(ContainerRuntime::Podman)
    }

    /// Returns the container runtime.
    #[must_use]
    pub const fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Runs the runtime CLI with `args`, returning stdout.
    async fn run(&self, args: &[&str]) -> FaultResult<String> {
        let command_line = format!("{} {}", self.runtime.command(), args.join(" "));
        let output = Command::new(self.runtime.command())
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(FaultError::CommandFailed {
                command: command_line,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for ContainerFaultInjector {
    fn default() -> Self {
        Self::docker()
    }
}

impl From<RuntimeKind> for ContainerFaultInjector {
    fn from(kind: RuntimeKind) -> Self {
        Self::new(kind.into())
    }
}

/// Parses `ps --format "{{.ID}}\t{{.Names}}"` output.
///
/// A container with several names yields one entry per name.
pub fn parse_ps_output(output: &str) -> FaultResult<ContainerSet> {
    let mut set = ContainerSet::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (id, names) = line
            .split_once('\t')
            .ok_or_else(|| FaultError::Parse(format!("expected <id>\\t<names>, got {line:?}")))?;
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            set.insert(ContainerHandle::new(id.trim(), name));
        }
    }
    Ok(set)
}

#[async_trait]
impl FaultInjector for ContainerFaultInjector {
    async fn list_running(&self) -> FaultResult<ContainerSet> {
        let stdout = self.run(&["ps", "--no-trunc", "--format", PS_FORMAT]).await?;
        let set = parse_ps_output(&stdout)?;
        tracing::debug!(
            runtime = self.runtime.command(),
            containers = ?set.names().collect::<Vec<_>>(),
            "listed running containers"
        );
        Ok(set)
    }

    async fn kill(&self, handle: &ContainerHandle) -> FaultResult<()> {
        tracing::warn!(container = %handle, "killing container");
        match self.run(&["kill", &handle.id]).await {
            Err(FaultError::CommandFailed { stderr, .. })
                if stderr.to_ascii_lowercase().contains("no such container") =>
            {
                Err(FaultError::NotFound(handle.name.clone()))
            }
            other => other.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_command() {
        assert_eq!(ContainerRuntime::Docker.command(), "docker");
        assert_eq!(ContainerRuntime::Podman.command(), "podman");
        assert_eq!(ContainerRuntime::from(RuntimeKind::Podman), ContainerRuntime::Podman);
    }

    #[test]
    fn test_default_is_docker() {
        assert_eq!(ContainerFaultInjector::default().runtime(), ContainerRuntime::Docker);
        assert_eq!(ContainerFaultInjector::podman().runtime(), ContainerRuntime::Podman);
        assert_eq!(
            ContainerFaultInjector::from(RuntimeKind::Podman).runtime(),
            ContainerRuntime::Podman
        );
    }

    #[test]
    fn test_parse_ps_output() {
        let output = "3f1c2b\tjail_chain0_1\n9a8e7d\tjail_chain1_1\n\n";
        let set = parse_ps_output(output).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("jail_chain1_1").unwrap().id, "9a8e7d");
    }

    #[test]
    fn test_parse_ps_output_multiple_names() {
        let set = parse_ps_output("abc\tjail_chain0_1,chain0\n").unwrap();
        assert!(set.contains("jail_chain0_1"));
        assert!(set.contains("chain0"));
    }

    #[test]
    fn test_parse_ps_output_empty() {
        assert!(parse_ps_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ps_output_malformed() {
        let err = parse_ps_output("no-tab-here\n").unwrap_err();
        assert!(matches!(err, FaultError::Parse(_)));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every well-formed ps line is recovered by name with its ID.
        #[test]
        fn parse_recovers_every_container(
            entries in proptest::collection::btree_map("[a-z][a-z0-9_]{0,20}", "[0-9a-f]{12}", 0..8)
        ) {
            let output: String = entries
                .iter()
                .map(|(name, id)| format!("{id}\t{name}\n"))
                .collect();
            let set = parse_ps_output(&output).unwrap();
            prop_assert_eq!(set.len(), entries.len());
            for (name, id) in &entries {
                prop_assert_eq!(set.get(name).map(|h| h.id.as_str()), Some(id.as_str()));
            }
        }
    }
}
