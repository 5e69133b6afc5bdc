//! `kubectl` invocation builders.
//!
//! Observation queries use jsonpath output so the result is a plain
//! whitespace-separated token list (see [`crate::phase`]).

use deploycheck_core::config::ClusterConfig;

use crate::command::Invocation;

const PHASES_JSONPATH: &str = "jsonpath={.items[*].status.phase}";
const NAMES_JSONPATH: &str = "jsonpath={.items[*].metadata.name}";

/// Builds `kubectl` command lines against one context.
#[derive(Debug, Clone)]
pub struct Kubectl {
    bin: String,
    context: Option<String>,
}

impl Kubectl {
    pub fn new(bin: impl Into<String>, context: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            context,
        }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Self {
        Self::new(&cluster.kubectl_bin, cluster.context().map(str::to_owned))
    }

    /// Phases of every pod matching `selector` (all pods when `None`).
    pub fn pod_phases(&self, namespace: &str, selector: Option<&str>) -> Invocation {
        self.get_pods(namespace, selector, PHASES_JSONPATH)
    }

    /// Names of every pod matching `selector` (all pods when `None`).
    pub fn pod_names(&self, namespace: &str, selector: Option<&str>) -> Invocation {
        self.get_pods(namespace, selector, NAMES_JSONPATH)
    }

    pub fn delete_pod(&self, namespace: &str, name: &str) -> Invocation {
        self.base().args(["delete", "pod", name, "-n", namespace])
    }

    pub fn scale_deployment(&self, namespace: &str, deployment: &str, replicas: u32) -> Invocation {
        self.base()
            .args(["scale", "deployment", deployment])
            .arg(format!("--replicas={replicas}"))
            .args(["-n", namespace])
    }

    pub fn create_namespace(&self, namespace: &str) -> Invocation {
        self.base().args(["create", "namespace", namespace])
    }

    pub fn delete_namespace(&self, namespace: &str) -> Invocation {
        self.base().args(["delete", "namespace", namespace])
    }

    /// `kubectl port-forward svc/<service> <local>:<remote> -n <ns>`
    pub fn port_forward(
        &self,
        namespace: &str,
        service: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Invocation {
        self.base()
            .arg("port-forward")
            .arg(format!("svc/{service}"))
            .arg(format!("{local_port}:{remote_port}"))
            .args(["-n", namespace])
    }

    fn get_pods(&self, namespace: &str, selector: Option<&str>, jsonpath: &str) -> Invocation {
        let inv = self.base().args(["get", "pods", "-n", namespace]);
        let inv = match selector {
            Some(selector) => inv.arg("-l").arg(selector),
            None => inv,
        };
        inv.arg("-o").arg(jsonpath)
    }

    fn base(&self) -> Invocation {
        let inv = Invocation::new(&self.bin);
        match &self.context {
            Some(ctx) => inv.arg("--context").arg(ctx),
            None => inv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kubectl() -> Kubectl {
        Kubectl::new("kubectl", None)
    }

    #[test]
    fn pod_phases_with_selector() {
        let inv = kubectl().pod_phases("ns-1", Some("app.kubernetes.io/instance=rel"));
        assert_eq!(
            inv.to_string(),
            "kubectl get pods -n ns-1 -l app.kubernetes.io/instance=rel -o jsonpath={.items[*].status.phase}"
        );
    }

    #[test]
    fn pod_phases_without_selector() {
        let inv = kubectl().pod_phases("ns-1", None);
        assert!(!inv.args.contains(&"-l".to_owned()));
    }

    #[test]
    fn pod_names_uses_metadata_name() {
        let inv = kubectl().pod_names("ns-1", None);
        assert_eq!(inv.args.last().map(String::as_str), Some(NAMES_JSONPATH));
    }

    #[test]
    fn scale_sets_replicas() {
        let inv = kubectl().scale_deployment("ns-1", "rel-frontend", 3);
        assert_eq!(
            inv.to_string(),
            "kubectl scale deployment rel-frontend --replicas=3 -n ns-1"
        );
    }

    #[test]
    fn delete_pod_by_name() {
        assert_eq!(
            kubectl().delete_pod("ns-1", "web-abc").to_string(),
            "kubectl delete pod web-abc -n ns-1"
        );
    }

    #[test]
    fn port_forward_targets_service() {
        let inv = kubectl().port_forward("ns-1", "rel-frontend", 3000, 80);
        assert_eq!(
            inv.to_string(),
            "kubectl port-forward svc/rel-frontend 3000:80 -n ns-1"
        );
    }

    #[test]
    fn namespace_commands() {
        assert_eq!(
            kubectl().create_namespace("ns-1").to_string(),
            "kubectl create namespace ns-1"
        );
        assert_eq!(
            kubectl().delete_namespace("ns-1").to_string(),
            "kubectl delete namespace ns-1"
        );
    }

    #[test]
    fn context_flag_is_prepended() {
        let kubectl = Kubectl::new("kubectl", Some("kind-ci".to_owned()));
        assert_eq!(
            kubectl.create_namespace("ns").to_string(),
            "kubectl --context kind-ci create namespace ns"
        );
    }
}
