//! Periodic XStat/SawStat snapshots through the connector.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use nodelink_client::Connector;
use nodelink_core::CombinedNodeStatus;
use nodelink_core::error::Result;
use nodelink_proto::{Action, parse_sawstat, parse_xstat};

use crate::update::StateUpdate;

/// Polls the controller for link snapshots.
#[derive(Clone)]
pub struct Poller {
    connector: Connector,
    local_node: u32,
    interval: Duration,
}

impl Poller {
    /// A poller for `local_node` running every `interval`.
    pub fn new(connector: Connector, local_node: u32, interval: Duration) -> Self {
        Self {
            connector,
            local_node,
            interval,
        }
    }

    /// Take one snapshot: XStat, then SawStat, merged.
    pub async fn poll_once(&self) -> Result<CombinedNodeStatus> {
        let node = self.local_node;

        let response = self.connector.request(Action::xstat(node)).await?;
        let xstat = parse_xstat(node, &response.body())?;

        let response = self.connector.request(Action::sawstat(node)).await?;
        let sawstat = parse_sawstat(node, &response.body(), Utc::now())?;

        if xstat.skipped + sawstat.skipped > 0 {
            debug!(
                xstat_skipped = xstat.skipped,
                sawstat_skipped = sawstat.skipped,
                "snapshot had malformed lines"
            );
        }

        let partial = !xstat.membership_complete();
        let local_tx_keyed = xstat.tx_keyed();
        let local_rx_keyed = xstat.rx_keyed();
        let mut status = CombinedNodeStatus::combine(xstat.connections, &sawstat.keying);
        status.local_tx_keyed = local_tx_keyed;
        status.local_rx_keyed = local_rx_keyed;
        status.partial = partial;
        Ok(status)
    }

    /// Run until `cancel` fires, sending each snapshot to `tx`.
    ///
    /// Ticks while the connector is not Ready are skipped, as are ticks
    /// whose requests fail.
    pub fn spawn(self, tx: mpsc::Sender<StateUpdate>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, cancel))
    }

    async fn run(self, tx: mpsc::Sender<StateUpdate>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(node = self.local_node, interval = ?self.interval, "poller started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.connector.state().is_ready() {
                trace!("connector not ready, skipping poll");
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once() => result,
            };
            let status = match result {
                Ok(status) => status,
                Err(e) => {
                    warn!(node = self.local_node, error = %e, "poll failed, skipping tick");
                    continue;
                }
            };

            trace!(links = status.len(), "snapshot polled");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(status.into()) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(node = self.local_node, "poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodelink_client::ConnectorBuilder;
    use nodelink_core::Error;
    use nodelink_test_harness::MockAmiServer;

    const XSTAT: &[&str] = &[
        "Response: Success",
        "Node: 1999",
        "Conn: 2000 192.168.1.10 0 OUT 00:15:30 ESTABLISHED",
        "Conn: 2001 10.0.0.7 0 IN 00:01:00 ESTABLISHED",
        "LinkedNodes: T2000, R2001",
        "Var: RPT_TXKEYED=1",
        "Var: RPT_RXKEYED=0",
    ];

    const SAWSTAT: &[&str] = &[
        "Response: Success",
        "Node: 1999",
        "Conn: 2001 1 0 12",
    ];

    async fn ready_connector(server: &MockAmiServer) -> Connector {
        let connector = ConnectorBuilder::new()
            .port(server.port())
            .credentials("admin", "secret")
            .keepalive_interval(None)
            .request_timeout(Duration::from_millis(300))
            .start()
            .unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();
        connector
    }

    #[tokio::test]
    async fn poll_once_combines_both_reports() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply("RptStatus:XStat", XSTAT);
        server.reply("RptStatus:SawStat", SAWSTAT);
        let connector = ready_connector(&server).await;

        let poller = Poller::new(connector.clone(), 1999, Duration::from_secs(5));
        let status = poller.poll_once().await.unwrap();
        assert_eq!(status.len(), 2);
        assert!(!status.nodes[&2000].is_keyed());
        // SawStat overrides the XStat keyed column.
        assert!(status.nodes[&2001].is_keyed());
        assert_eq!(status.local_tx_keyed, Some(true));
        assert_eq!(status.local_rx_keyed, Some(false));

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn out_of_range_fields_do_not_sink_the_poll() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply(
            "RptStatus:XStat",
            &[
                "Response: Success",
                "Node: 1999",
                "Conn: 2000 192.168.1.10 0 OUT 3000000000:00:00 ESTABLISHED",
                "Conn: 2001 10.0.0.7 0 IN 00:01:00 ESTABLISHED",
                "Conn: 20#2 10.0.0.8 0 IN 00:01:00 ESTABLISHED",
            ],
        );
        server.reply(
            "RptStatus:SawStat",
            &[
                "Response: Success",
                "Node: 1999",
                "Conn: 2000 0 100000000000000 5",
                "Conn: 2001 1 0 9999999999999999",
            ],
        );
        let connector = ready_connector(&server).await;

        let poller = Poller::new(connector.clone(), 1999, Duration::from_secs(5));
        let status = poller.poll_once().await.unwrap();
        assert_eq!(status.len(), 2);
        assert!(status.partial);
        // Both keying rows were rejected, so keying falls back to the Conn rows.
        assert!(!status.nodes[&2000].has_keying);
        assert!(!status.nodes[&2001].is_keyed());

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn clean_snapshot_is_not_partial() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply("RptStatus:XStat", XSTAT);
        server.reply("RptStatus:SawStat", SAWSTAT);
        let connector = ready_connector(&server).await;

        let poller = Poller::new(connector.clone(), 1999, Duration::from_secs(5));
        assert!(!poller.poll_once().await.unwrap().partial);
        connector.shutdown().await;
    }

    #[tokio::test]
    async fn poll_once_reports_error_response() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply(
            "RptStatus:XStat",
            &["Response: Error", "Message: Invalid node"],
        );
        let connector = ready_connector(&server).await;

        let poller = Poller::new(connector.clone(), 1999, Duration::from_secs(5));
        assert!(matches!(poller.poll_once().await, Err(Error::Protocol(_))));
        connector.shutdown().await;
    }

    #[tokio::test]
    async fn spawned_poller_sends_snapshots_until_cancelled() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply("RptStatus:XStat", XSTAT);
        server.reply("RptStatus:SawStat", SAWSTAT);
        let connector = ready_connector(&server).await;

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = Poller::new(connector.clone(), 1999, Duration::from_millis(50))
            .spawn(tx, cancel.clone());

        for _ in 0..2 {
            let update = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(update, StateUpdate::Snapshot(s) if s.len() == 2));
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        connector.shutdown().await;
    }

    #[tokio::test]
    async fn skips_ticks_while_disconnected() {
        let server = MockAmiServer::start().await.unwrap();
        server.set_accept_login(false);
        let connector = ConnectorBuilder::new()
            .port(server.port())
            .credentials("admin", "wrong")
            .min_backoff(Duration::from_millis(20))
            .max_backoff(Duration::from_millis(40))
            .start()
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = Poller::new(connector.clone(), 1999, Duration::from_millis(20))
            .spawn(tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
        assert!(!server.received_actions().iter().any(|a| a == "RptStatus"));

        cancel.cancel();
        task.await.unwrap();
        connector.shutdown().await;
    }
}
