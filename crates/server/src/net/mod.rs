//! TCP server loop.
//!
//! Single-threaded cooperative scheduling: the listener, every connection
//! task and the maintenance tick all run on one current-thread runtime via
//! `spawn_local`. The store is owned through `Rc<RefCell<..>>`; commands
//! execute synchronously between awaits, so each command is atomic with
//! respect to all others.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub mod connection;

use kestrel_core::store::aol::AolWriter;
use kestrel_core::store::Db;

/// Maintenance (active expiration, rewrite reaping) runs at least once per
/// second even while connections are idle.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

pub struct Server {
    db: Rc<RefCell<Db>>,
    aol: Rc<RefCell<Option<AolWriter>>>,
}

impl Server {
    pub fn new(db: Rc<RefCell<Db>>, aol: Rc<RefCell<Option<AolWriter>>>) -> Self {
        Self { db, aol }
    }

    pub async fn run_with_shutdown(
        &self,
        addr: &str,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, "server listening");

        let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            info!(peer = %peer_addr, "accepted new connection");
                            let mut conn = connection::Connection::new(
                                socket,
                                peer_addr,
                                Rc::clone(&self.db),
                                Rc::clone(&self.aol),
                            );
                            tokio::task::spawn_local(async move {
                                if let Err(e) = conn.handle().await {
                                    warn!(error = %e, "connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = maintenance.tick() => {
                    let purged = self.db.borrow_mut().active_expire();
                    if purged > 0 {
                        debug!(purged, "maintenance tick purged expired keys");
                    }
                    if let Some(aol) = self.aol.borrow_mut().as_mut() {
                        aol.poll_rewrite();
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("shutting down server");
                    break;
                }
            }
        }

        // In-flight connection tasks are dropped with the local set; flush
        // whatever the log already accepted.
        if let Some(aol) = self.aol.borrow_mut().as_mut() {
            if let Err(e) = aol.sync() {
                warn!(error = %e, "final append log sync failed");
            }
        }

        Ok(())
    }
}
