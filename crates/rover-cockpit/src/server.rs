//! [`EventServer`] – WebSocket transport for the watch gateway.
//!
//! Every accepted connection is one gateway session.  Incoming text frames
//! go through [`Gateway::handle_text`]; acks are written straight back,
//! room pushes arrive through the session's outbound queue.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rover_middleware::Gateway;
use rover_types::GatewayError;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct EventServer {
    gateway: Arc<Gateway>,
    listener: TcpListener,
}

impl EventServer {
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the listener cannot bind.
    pub async fn bind(addr: SocketAddr, gateway: Arc<Gateway>) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Transport(format!("event server bind on {addr}: {e}")))?;
        Ok(Self { gateway, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        self.listener
            .local_addr()
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    /// Accept connections until `shutdown` is cancelled.  Open connections
    /// are closed and their sessions released on the same signal.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        let addr = self.local_addr()?;
        info!(%addr, "event server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let gateway = Arc::clone(&self.gateway);
                        let shutdown = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_ws(stream, peer, gateway, shutdown).await {
                                warn!(%peer, error = %e, "event client error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept error"),
                },
            }
        }

        info!(%addr, "event server stopped");
        Ok(())
    }
}

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
) -> Result<(), GatewayError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| GatewayError::Transport(format!("handshake from {peer}: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (session, mut outbound) = gateway.connect().await;
    info!(%peer, %session, "event client connected");

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break Ok(());
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        break Err(GatewayError::Transport(e.to_string()));
                    }
                }
                None => break Ok(()),
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(ack) = gateway.handle_text(session, text.as_str()).await {
                        if let Err(e) = ws_tx.send(Message::Text(ack.into())).await {
                            break Err(GatewayError::Transport(e.to_string()));
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(other)) => debug!(%session, kind = ?other, "ignoring non-text frame"),
                Some(Err(e)) => break Err(GatewayError::Transport(e.to_string())),
            },
        }
    };

    gateway.disconnect(session).await;
    info!(%peer, %session, "event client disconnected");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::Robot;
    use rover_middleware::GracePeriods;
    use rover_middleware::protocol::ServerFrame;
    use serde_json::json;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    fn quiet() -> GracePeriods {
        GracePeriods {
            motor: Duration::ZERO,
            led_output: Duration::ZERO,
            rc: Duration::ZERO,
            rc_channels: Duration::ZERO,
            telemetry: Duration::ZERO,
            system: Duration::ZERO,
        }
    }

    async fn next_frame<S>(ws: &mut S) -> ServerFrame
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("frame expected")
                .expect("stream open")
                .expect("valid frame");
            if let Message::Text(text) = msg {
                return ServerFrame::parse(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn loopback_watch_round_trip() {
        let robot = Robot::simulated(1);
        let gateway = Arc::new(Gateway::for_robot(&robot, &quiet()));
        let server = EventServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&gateway))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let serving = tokio::spawn(server.serve(shutdown.clone()));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let request = json!({
            "namespace": "/motors",
            "event": "add-watch",
            "name": "update_motor_0",
            "ack": 1,
        });
        ws.send(Message::Text(request.to_string().into())).await.unwrap();

        let ServerFrame::Ack { ack, data } = next_frame(&mut ws).await else {
            panic!("ack expected first");
        };
        assert_eq!(ack, 1);
        assert_eq!(data["id"], 0);

        robot.motors()[0].set_enabled(true);
        let ServerFrame::Event {
            namespace,
            event,
            data,
        } = next_frame(&mut ws).await
        else {
            panic!("event expected");
        };
        assert_eq!(namespace, "/motors");
        assert_eq!(event, "update_motor_0");
        assert_eq!(data["enabled"], true);

        let watch = gateway
            .namespace("/motors")
            .unwrap()
            .watch("update_motor_0")
            .unwrap();
        assert_eq!(watch.interest(), 1);

        ws.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while watch.interest() != 0 || watch.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("close releases interest");

        shutdown.cancel();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_open_connections() {
        let gateway = Arc::new(Gateway::for_robot(&Robot::simulated(0), &quiet()));
        let server = EventServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&gateway))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let serving = tokio::spawn(server.serve(shutdown.clone()));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gateway.hub().session_count(), 1);

        shutdown.cancel();
        serving.await.unwrap().unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "server must close the socket");
    }

    #[tokio::test]
    async fn bind_conflict_is_a_transport_error() {
        let gateway = Arc::new(Gateway::for_robot(&Robot::simulated(0), &quiet()));
        let first = EventServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&gateway))
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();
        let second = EventServer::bind(addr, gateway).await;
        assert!(matches!(second, Err(GatewayError::Transport(_))));
    }
}
