use clap::Parser;
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use slotkv::config::NodeConfig;
use slotkv::membership::{GossipService, MembershipOverlay};
use slotkv::replication::adapter::request_join;
use slotkv::replication::fsm::{FileSnapshotSink, SNAPSHOT_FILE};
use slotkv::replication::{leadership_channel, LocalGroup, ReplicationHandle, StateMachine};
use slotkv::routing::handlers::router;
use slotkv::routing::RoutingContext;
use slotkv::store::KvTable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_addr = config.api_addr();
    let (slot_begin, slot_end) = config.slot_range()?;

    tracing::info!("starting node on {}", api_addr);
    tracing::info!("owned slot range: {}-{}", slot_begin, slot_end);

    // 1. Table and state machine:
    let table = Arc::new(KvTable::new());
    let fsm = Arc::new(StateMachine::new(table.clone()));

    let snapshot_path = config.data_dir.join(SNAPSHOT_FILE);
    if snapshot_path.exists() {
        let file = File::open(&snapshot_path)?;
        fsm.restore(file)?;
        tracing::info!(keys = table.len(), "restored table from {:?}", snapshot_path);
    }

    // 2. Consensus group. No join target means this node founds its own
    // single-member group:
    let bootstrap = config.join.is_none();
    let (leader_tx, leader_rx) = leadership_channel();
    let group = Arc::new(LocalGroup::new(fsm.clone(), leader_tx, bootstrap));
    let replication = Arc::new(ReplicationHandle::new(group, leader_rx));

    // 3. Routing context:
    let ctx = Arc::new(RoutingContext::new(
        table.clone(),
        Some(replication),
        api_addr.clone(),
        slot_begin,
        slot_end,
    ));
    ctx.watch_leadership();

    if let Some(join_addr) = &config.join {
        tracing::info!("joining existing member at {}", join_addr);
        request_join(join_addr, &api_addr).await?;
    }

    // 4. Membership overlay (optional):
    if let Some(gossip_bind) = config.gossip_bind {
        let service = GossipService::new(gossip_bind, config.seeds.clone(), Vec::new()).await?;
        tracing::info!("gossip overlay on {} as {}", gossip_bind, service.local_name());

        service.subscribe(ctx.clone());
        service.clone().start().await;
        ctx.set_cluster(service, gossip_bind.to_string());
    } else {
        tracing::info!("no gossip bind address, running standalone");
    }

    // 5. HTTP server with graceful shutdown:
    tracing::info!("API listening on {}", api_addr);
    tracing::info!("press ctrl-c to shut down");

    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    axum::serve(listener, router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Persist a final snapshot and tear the stack down:
    let snapshot = fsm.snapshot();
    let mut sink = FileSnapshotSink::create(&config.data_dir)?;
    match snapshot.persist(&mut sink) {
        Ok(()) => tracing::info!(keys = snapshot.len(), "final snapshot written"),
        Err(e) => tracing::error!("failed to write final snapshot: {}", e),
    }
    snapshot.release();

    ctx.shutdown();
    tracing::info!("node stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("shutdown signal received");
}
