//! Service endpoint types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network endpoint of a running service job
///
/// Derived from the job's assigned node and a configured port. It is
/// recomputed on every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// Creates an endpoint from a scheduler node list
    ///
    /// Multi-node allocations (`node[01-04]` or `a,b`) resolve to the first
    /// node, where the server process runs.
    pub fn from_node_list(node_list: &str, port: u16) -> Self {
        Self {
            host: first_node(node_list),
            port,
        }
    }

    /// Base URL of the service (`http://host:port`)
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// First host of a compact Slurm node list
fn first_node(node_list: &str) -> String {
    let first = node_list.split(',').next().unwrap_or("").trim();

    let Some(open) = first.find('[') else {
        return first.to_string();
    };

    let prefix = &first[..open];
    let range = first[open + 1..].trim_end_matches(']');
    let start = range.split([',', '-']).next().unwrap_or("");
    format!("{}{}", prefix, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_node() {
        let endpoint = ServiceEndpoint::from_node_list("gpu-node-03", 8000);
        assert_eq!(endpoint.host, "gpu-node-03");
        assert_eq!(endpoint.base_url(), "http://gpu-node-03:8000");
        assert_eq!(endpoint.to_string(), "gpu-node-03:8000");
    }

    #[test]
    fn test_compact_node_list() {
        assert_eq!(
            ServiceEndpoint::from_node_list("gpu[07-10]", 80).host,
            "gpu07"
        );
        assert_eq!(
            ServiceEndpoint::from_node_list("gpu[3,5]", 80).host,
            "gpu3"
        );
        assert_eq!(
            ServiceEndpoint::from_node_list("a01,b02", 80).host,
            "a01"
        );
    }
}
