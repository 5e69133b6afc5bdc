//! Port-forward tunnel to a service inside the cluster.
//!
//! The tunnel is a background `kubectl port-forward` process. It is usable
//! once the local port accepts TCP connections. [`with_tunnel`] scopes the
//! tunnel to a closure and always stops the process afterwards, whatever
//! the closure returned.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::{BackgroundChild, CommandRunner};
use crate::error::VerifierError;
use crate::kubectl::Kubectl;
use crate::wait::{Backoff, Probe, poll_until};

/// Which service to forward, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub namespace: String,
    pub service: String,
    pub local_port: u16,
    pub remote_port: u16,
}

impl TunnelSpec {
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_port))
    }

    /// `http://127.0.0.1:<local_port>`
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }
}

/// A running port-forward.
pub struct Tunnel<C: BackgroundChild> {
    child: C,
    spec: TunnelSpec,
}

impl<C: BackgroundChild> Tunnel<C> {
    /// Starts the port-forward and waits until the local port accepts
    /// connections.
    ///
    /// Fails with [`VerifierError::Tunnel`] if the process exits before the
    /// port is ready. The process is stopped on every error path.
    pub async fn open<R>(
        runner: &R,
        kubectl: &Kubectl,
        spec: TunnelSpec,
        ready: &Backoff,
        cancel: &CancellationToken,
    ) -> Result<Self, VerifierError>
    where
        R: CommandRunner<Child = C>,
    {
        let invocation =
            kubectl.port_forward(&spec.namespace, &spec.service, spec.local_port, spec.remote_port);
        let mut child = runner.spawn(&invocation).await?;
        let command = invocation.to_string();

        let addr = spec.local_addr();
        let what = format!("port-forward to svc/{} on {addr}", spec.service);
        let readiness = poll_until(&what, ready, cancel, || {
            let exited = child.try_exit();
            let command = &command;
            async move {
                match exited {
                    Err(e) => Err(e),
                    Ok(Some(code)) => Err(VerifierError::Tunnel(format!(
                        "'{command}' exited early with {code:?}"
                    ))),
                    Ok(None) => match TcpStream::connect(addr).await {
                        Ok(_) => Ok(Probe::Ready(())),
                        Err(e) => Ok(Probe::NotYet(format!("connect {addr}: {e}"))),
                    },
                }
            }
        })
        .await;

        if let Err(e) = readiness {
            if let Err(stop) = child.terminate().await {
                warn!(error = %stop, "failed to stop port-forward after setup error");
            }
            return Err(match e {
                VerifierError::Timeout {
                    waited,
                    last_observed,
                    ..
                } => VerifierError::Tunnel(format!(
                    "{what} not ready after {waited:?} ({last_observed})"
                )),
                other => other,
            });
        }

        info!(service = %spec.service, local_port = spec.local_port, "tunnel ready");
        Ok(Self { child, spec })
    }

    pub fn spec(&self) -> &TunnelSpec {
        &self.spec
    }

    /// Stops the port-forward and waits for the process to exit.
    pub async fn close(self) -> Result<(), VerifierError> {
        self.child.terminate().await?;
        info!(service = %self.spec.service, "tunnel closed");
        Ok(())
    }
}

/// Runs `body` with a tunnel open, passing it the local base URL.
///
/// The tunnel is closed after `body` finishes, whether it succeeded or not.
/// A failure to close is logged and does not replace `body`'s result.
pub async fn with_tunnel<R, F, Fut, T>(
    runner: &R,
    kubectl: &Kubectl,
    spec: TunnelSpec,
    ready: &Backoff,
    cancel: &CancellationToken,
    body: F,
) -> Result<T, VerifierError>
where
    R: CommandRunner,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T, VerifierError>>,
{
    let tunnel = Tunnel::open(runner, kubectl, spec, ready, cancel).await?;
    let result = body(tunnel.spec().base_url()).await;
    if let Err(e) = tunnel.close().await {
        warn!(error = %e, "failed to close tunnel");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::command::MockRunner;

    fn backoff() -> Backoff {
        Backoff {
            initial: Duration::from_millis(10),
            max_interval: Duration::from_millis(20),
            multiplier: 2.0,
            timeout: Duration::from_millis(200),
        }
    }

    fn spec(port: u16) -> TunnelSpec {
        TunnelSpec {
            namespace: "ns".to_owned(),
            service: "rel-frontend".to_owned(),
            local_port: port,
            remote_port: 80,
        }
    }

    async fn listening_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn base_url_uses_local_port() {
        assert_eq!(spec(3000).base_url(), "http://127.0.0.1:3000");
    }

    #[tokio::test]
    async fn with_tunnel_runs_body_and_closes() {
        let (_listener, port) = listening_port().await;
        let runner = MockRunner::new();
        let kubectl = Kubectl::new("kubectl", None);

        let url = with_tunnel(
            &runner,
            &kubectl,
            spec(port),
            &backoff(),
            &CancellationToken::new(),
            |url| async move { Ok(url) },
        )
        .await
        .unwrap();

        assert_eq!(url, format!("http://127.0.0.1:{port}"));
        assert!(runner.called("port-forward svc/rel-frontend"));
        assert_eq!(runner.terminated_children(), 1);
    }

    #[tokio::test]
    async fn with_tunnel_closes_after_body_error() {
        let (_listener, port) = listening_port().await;
        let runner = MockRunner::new();
        let kubectl = Kubectl::new("kubectl", None);

        let err = with_tunnel(
            &runner,
            &kubectl,
            spec(port),
            &backoff(),
            &CancellationToken::new(),
            |_url| async { Err::<(), _>(VerifierError::Http("boom".to_owned())) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VerifierError::Http(_)));
        assert_eq!(runner.terminated_children(), 1);
    }

    #[tokio::test]
    async fn early_exit_is_tunnel_error() {
        let runner = MockRunner::new().with_exiting_children();
        let kubectl = Kubectl::new("kubectl", None);

        let result = Tunnel::open(
            &runner,
            &kubectl,
            spec(1),
            &backoff(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(VerifierError::Tunnel(_))));
        assert_eq!(runner.terminated_children(), 1);
    }

    #[tokio::test]
    async fn unreachable_port_times_out_as_tunnel_error() {
        // bind then drop to get a port nothing listens on
        let (listener, port) = listening_port().await;
        drop(listener);
        let runner = MockRunner::new();
        let kubectl = Kubectl::new("kubectl", None);

        let result = Tunnel::open(
            &runner,
            &kubectl,
            spec(port),
            &backoff(),
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(VerifierError::Tunnel(msg)) => assert!(msg.contains("not ready")),
            Err(other) => panic!("expected Tunnel error, got {other:?}"),
            Ok(_) => panic!("expected Tunnel error, got a tunnel"),
        }
        assert_eq!(runner.terminated_children(), 1);
    }

    #[tokio::test]
    async fn spawn_failure_propagates() {
        let runner = MockRunner::new().with_failing_spawn();
        let kubectl = Kubectl::new("kubectl", None);

        let result = Tunnel::open(
            &runner,
            &kubectl,
            spec(1),
            &backoff(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(VerifierError::Spawn { .. })));
    }
}
