//! The command lines this monitor sends to the runtime.

use crate::conf::MonitorConfig;
use crate::exec::ShellCommand;

/// Go template for `docker ps`: container name, the two job labels, then the
/// ports column. Ports go last because their rendering differs between hosts
/// (`0.0.0.0:7020->7000/tcp` vs `0.0.0.0:7000->7000/tcp, :::7000->7000/tcp`).
pub const LIST_FORMAT: &str =
    r#"{{.Names}} {{ .Label "job-name" }} {{ .Label "job-version" }} {{.Ports}}"#;

/// Builds docker CLI invocations targeting one daemon.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    docker_host: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, docker_host: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            docker_host: docker_host.into(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.docker_binary.clone(), config.docker_host.clone())
    }

    /// Base command with the `DOCKER_HOST` override applied.
    fn command(&self) -> ShellCommand {
        let cmd = ShellCommand::new(self.binary.clone());
        if self.docker_host.is_empty() {
            return cmd;
        }
        let host = if self.docker_host.contains("://") {
            self.docker_host.clone()
        } else {
            format!("unix://{}", self.docker_host)
        };
        cmd.env("DOCKER_HOST", host)
    }

    /// All job containers, one formatted line each.
    pub fn list_jobs(&self) -> ShellCommand {
        self.command()
            .args(["ps", "-a", "--filter", "name=^/job-", "--format", LIST_FORMAT])
    }

    /// Follow a container's output, starting `tail` lines back.
    pub fn follow_logs(&self, container: &str, tail: u32) -> ShellCommand {
        self.command()
            .args(["logs", container, "--follow", "--tail"])
            .arg(tail.to_string())
    }

    /// The last `tail` lines of a container's output.
    pub fn recent_logs(&self, container: &str, tail: u32) -> ShellCommand {
        self.command()
            .args(["logs", container, "--tail"])
            .arg(tail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_command_without_host_override() {
        let cmd = DockerCli::new("docker", "").list_jobs();
        assert_eq!(cmd.program(), "docker");
        assert_eq!(cmd.get_env("DOCKER_HOST"), None);
        assert_eq!(
            cmd.get_args(),
            &["ps", "-a", "--filter", "name=^/job-", "--format", LIST_FORMAT]
        );
    }

    #[test]
    fn test_tcp_host_is_passed_through() {
        let cmd = DockerCli::new("docker", "tcp://10.0.0.7:2375").list_jobs();
        assert_eq!(cmd.get_env("DOCKER_HOST"), Some("tcp://10.0.0.7:2375"));
    }

    #[test]
    fn test_bare_socket_path_gets_unix_scheme() {
        let cmd = DockerCli::new("docker", "/var/run/docker.sock").list_jobs();
        assert_eq!(cmd.get_env("DOCKER_HOST"), Some("unix:///var/run/docker.sock"));
    }

    #[test]
    fn test_follow_logs_keeps_container_name_as_single_argument() {
        let cmd = DockerCli::new("docker", "").follow_logs("job-my app; rm -rf /-v-1", 50);
        assert_eq!(
            cmd.get_args(),
            &["logs", "job-my app; rm -rf /-v-1", "--follow", "--tail", "50"]
        );
    }

    #[test]
    fn test_recent_logs() {
        let cmd = DockerCli::new("/usr/local/bin/docker", "").recent_logs("job-foo-v-1", 20);
        assert_eq!(cmd.program(), "/usr/local/bin/docker");
        assert_eq!(cmd.get_args(), &["logs", "job-foo-v-1", "--tail", "20"]);
    }

    #[test]
    fn test_from_config() {
        let config = MonitorConfig {
            docker_host: "ssh://deploy@node1".to_string(),
            ..Default::default()
        };
        let cmd = DockerCli::from_config(&config).recent_logs("x", 1);
        assert_eq!(cmd.get_env("DOCKER_HOST"), Some("ssh://deploy@node1"));
    }
}
