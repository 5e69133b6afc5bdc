//! `helm` invocation builders.

use std::path::Path;

use deploycheck_core::config::ClusterConfig;
use deploycheck_core::types::Release;

use crate::command::Invocation;

/// Builds `helm` command lines against one kube context.
#[derive(Debug, Clone)]
pub struct Helm {
    bin: String,
    context: Option<String>,
}

impl Helm {
    pub fn new(bin: impl Into<String>, context: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            context,
        }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Self {
        Self::new(&cluster.helm_bin, cluster.context().map(str::to_owned))
    }

    /// `helm install <release> <chart> -n <ns> -f <values>`
    pub fn install(&self, release: &Release, chart: &Path, values: &Path) -> Invocation {
        self.chart_command("install", release, chart, values)
    }

    /// `helm upgrade <release> <chart> -n <ns> -f <values>`
    pub fn upgrade(&self, release: &Release, chart: &Path, values: &Path) -> Invocation {
        self.chart_command("upgrade", release, chart, values)
    }

    /// `helm uninstall <release> -n <ns>`
    pub fn uninstall(&self, release: &Release) -> Invocation {
        self.base()
            .args(["uninstall", release.name.as_str(), "-n", release.namespace.as_str()])
    }

    fn chart_command(
        &self,
        verb: &str,
        release: &Release,
        chart: &Path,
        values: &Path,
    ) -> Invocation {
        self.base()
            .args([verb, release.name.as_str()])
            .arg(chart.display().to_string())
            .args(["-n", release.namespace.as_str(), "-f"])
            .arg(values.display().to_string())
    }

    fn base(&self) -> Invocation {
        let inv = Invocation::new(&self.bin);
        match &self.context {
            Some(ctx) => inv.arg("--kube-context").arg(ctx),
            None => inv,
        }
    }
}
