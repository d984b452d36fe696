//! `docker ps` listing lines into job candidates.

use std::sync::LazyLock;

use regex::Regex;

/// Container name, job name, job version, then the ports column. The ports
/// column starts at the first port token, published (`0.0.0.0:7020->7000/tcp`)
/// or not (`9100/tcp`, `8000-8001/tcp`). The job name is lazy so a name with
/// spaces still leaves the version intact.
static LISTING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<resource_name>job-\S+) (?P<job_name>.+?) (?P<job_version>\S+) (?P<ports>(?:(?:\S*:)?\d+(?:-\d+)?->)?\d+(?:-\d+)?/\w+.*)$",
    )
    .expect("constant regex pattern is valid")
});

/// IPv4 mapping of the job's internal port 7000.
static JOB_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"0\.0\.0\.0:(?P<port>\d+)->7000/tcp").expect("constant regex pattern is valid")
});

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedJob {
    pub resource_name: String,
    pub job_name: String,
    pub job_version: String,
    pub port: u16,
}

impl ListedJob {
    pub fn internal_name(&self, hostname: &str) -> String {
        format!("{}:{}", hostname, self.port)
    }
}

/// Parse one line, or `None` if it does not describe a reachable job.
///
/// When the host publishes several mappings of port 7000 the last IPv4 one
/// wins.
pub fn parse_listing_line(line: &str) -> Option<ListedJob> {
    let caps = LISTING_LINE.captures(line.trim())?;
    let port = JOB_PORT
        .captures_iter(&caps["ports"])
        .last()
        .and_then(|m| m["port"].parse::<u16>().ok())?;

    Some(ListedJob {
        resource_name: caps["resource_name"].to_string(),
        job_name: caps["job_name"].to_string(),
        job_version: caps["job_version"].to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_line() {
        let job = parse_listing_line("job-foo-1 foo 1 0.0.0.0:7020->7000/tcp").unwrap();
        assert_eq!(job.resource_name, "job-foo-1");
        assert_eq!(job.job_name, "foo");
        assert_eq!(job.job_version, "1");
        assert_eq!(job.port, 7020);
        assert_eq!(job.internal_name("node1"), "node1:7020");
    }

    #[test]
    fn test_parse_ipv4_and_ipv6_mappings() {
        let job = parse_listing_line(
            "job-adder-v-0-0-1 adder 0.0.1 0.0.0.0:7000->7000/tcp, :::7000->7000/tcp",
        )
        .unwrap();
        assert_eq!(job.job_version, "0.0.1");
        assert_eq!(job.port, 7000);
    }

    #[test]
    fn test_parse_takes_last_ipv4_mapping() {
        let job = parse_listing_line(
            "job-foo-v-2 foo 2 0.0.0.0:7020->7000/tcp, 0.0.0.0:7031->7000/tcp, :::7031->7000/tcp",
        )
        .unwrap();
        assert_eq!(job.port, 7031);
    }

    #[test]
    fn test_parse_ignores_other_container_ports() {
        let job = parse_listing_line(
            "job-foo-v-2 foo 2 0.0.0.0:9100->9100/tcp, 0.0.0.0:7044->7000/tcp",
        )
        .unwrap();
        assert_eq!(job.port, 7044);
    }

    #[test]
    fn test_parse_unpublished_port_listed_first() {
        let job = parse_listing_line("job-foo-v-1 foo 1 9100/tcp, 0.0.0.0:7020->7000/tcp").unwrap();
        assert_eq!(job.job_name, "foo");
        assert_eq!(job.job_version, "1");
        assert_eq!(job.port, 7020);
    }

    #[test]
    fn test_parse_port_ranges_before_job_port() {
        let job = parse_listing_line(
            "job-foo-v-1 foo 1 8000-8001/tcp, 0.0.0.0:9000-9001->9000-9001/tcp, 0.0.0.0:7020->7000/tcp",
        )
        .unwrap();
        assert_eq!(job.job_name, "foo");
        assert_eq!(job.job_version, "1");
        assert_eq!(job.port, 7020);
    }

    #[test]
    fn test_parse_job_name_with_spaces_and_unpublished_port() {
        let job = parse_listing_line("job-my-job-v-3 my job 3 9100/tcp, 0.0.0.0:7001->7000/tcp").unwrap();
        assert_eq!(job.job_name, "my job");
        assert_eq!(job.job_version, "3");
        assert_eq!(job.port, 7001);
    }

    #[test]
    fn test_parse_job_name_with_spaces() {
        let job = parse_listing_line("job-my-job-v-3 my job 3 0.0.0.0:7001->7000/tcp").unwrap();
        assert_eq!(job.job_name, "my job");
        assert_eq!(job.job_version, "3");
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        let job = parse_listing_line("   job-foo-1 foo 1 0.0.0.0:7020->7000/tcp  \r").unwrap();
        assert_eq!(job.port, 7020);
    }

    #[test]
    fn test_parse_skips_non_job_lines() {
        // stopped container: no published ports
        assert_eq!(parse_listing_line("job-foo-1 foo 1 "), None);
        assert_eq!(parse_listing_line("job-foo-1 foo 1"), None);
        // not a job container
        assert_eq!(parse_listing_line("postgres   0.0.0.0:5432->5432/tcp"), None);
        // job port not published on IPv4
        assert_eq!(parse_listing_line("job-foo-1 foo 1 :::7020->7000/tcp"), None);
        // only exposed, never published
        assert_eq!(parse_listing_line("job-foo-1 foo 1 7000/tcp"), None);
        // wrong internal port
        assert_eq!(parse_listing_line("job-foo-1 foo 1 0.0.0.0:7020->8080/tcp"), None);
        assert_eq!(parse_listing_line(""), None);
    }
}
