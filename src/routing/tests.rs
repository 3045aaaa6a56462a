//! Routing Module Tests
//!
//! Validates the serve/redirect/reject decision tree, command execution
//! through and around replication, and the overlay-event-to-ledger glue.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cluster::slots::{slot_for_key, SLOT_COUNT};
    use crate::cluster::{NodeDescriptor, Readiness};
    use crate::membership::overlay::WaitFuture;
    use crate::membership::{MembershipOverlay, PeerEvents};
    use crate::replication::{leadership_channel, LocalGroup, ReplicationHandle, StateMachine};
    use crate::routing::context::{RoutingContext, RoutingError};
    use crate::store::{Command, KvTable};

    /// Overlay stub that reports enabled without any network underneath.
    struct EnabledStub;

    impl MembershipOverlay for EnabledStub {
        fn enabled(&self) -> bool {
            true
        }
        fn local_name(&self) -> String {
            "stub".to_string()
        }
        fn update_local(&self, _meta: Vec<u8>) {}
        fn update_local_and_wait(&self, _meta: Vec<u8>, _timeout: Duration) -> WaitFuture<'_> {
            Box::pin(async { Ok(()) })
        }
        fn close(&self) {}
    }

    fn descriptor(api: &str, addr: &str, begin: u32, end: u32, leader: bool) -> NodeDescriptor {
        NodeDescriptor {
            api_addr: api.to_string(),
            addr: addr.to_string(),
            slot_begin: begin,
            slot_end: end,
            leader,
        }
    }

    fn standalone() -> (Arc<RoutingContext>, Arc<KvTable>) {
        let table = Arc::new(KvTable::new());
        let ctx = Arc::new(RoutingContext::new(
            table.clone(),
            None,
            "127.0.0.1:8000".to_string(),
            0,
            SLOT_COUNT - 1,
        ));
        (ctx, table)
    }

    fn replicated(bootstrap: bool) -> (Arc<RoutingContext>, Arc<KvTable>) {
        let table = Arc::new(KvTable::new());
        let fsm = Arc::new(StateMachine::new(table.clone()));
        let (tx, rx) = leadership_channel();
        let group = Arc::new(LocalGroup::new(fsm, tx, bootstrap));
        let handle = Arc::new(ReplicationHandle::new(group, rx));
        let ctx = Arc::new(RoutingContext::new(
            table.clone(),
            Some(handle),
            "127.0.0.1:8000".to_string(),
            0,
            SLOT_COUNT - 1,
        ));
        (ctx, table)
    }

    // ============================================================
    // OWNERSHIP CHECKS
    // ============================================================

    #[test]
    fn test_standalone_check_self_always_true() {
        let (ctx, _) = standalone();

        assert!(ctx.check_self("any-key", true));
        assert!(ctx.check_self("other-key", false));
        assert!(ctx.is_leader());
    }

    #[test]
    fn test_check_self_respects_slot_range() {
        let slot = slot_for_key("target");
        let table = Arc::new(KvTable::new());

        // Own everything except the target's slot.
        let begin = if slot == 0 { 1 } else { 0 };
        let end = if slot == 0 { SLOT_COUNT - 1 } else { slot - 1 };
        let ctx = RoutingContext::new(table, None, "127.0.0.1:8000".to_string(), begin, end);
        ctx.set_cluster(Arc::new(EnabledStub), "127.0.0.1:7946".to_string());

        assert!(!ctx.check_self("target", false));
    }

    #[test]
    fn test_check_self_write_needs_leadership() {
        let (ctx, _) = replicated(false);
        ctx.set_cluster(Arc::new(EnabledStub), "127.0.0.1:7946".to_string());

        // Full slot range, but not the leader: reads yes, writes no.
        assert!(ctx.check_self("key", false));
        assert!(!ctx.check_self("key", true));
    }

    // ============================================================
    // CLUSTER NODE SELECTION
    // ============================================================

    #[test]
    fn test_select_returns_none_for_own_api_address() {
        let (ctx, _) = standalone();
        ctx.ledger().join(descriptor(
            "127.0.0.1:8000",
            "127.0.0.1:7946",
            0,
            SLOT_COUNT - 1,
            true,
        ));

        let resolved = ctx.select_cluster_node("key", true).expect("select failed");
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_select_returns_owner_address() {
        let slot = slot_for_key("key");
        let (ctx, _) = standalone();

        // Two leaders split the keyspace; figure out which one owns "key".
        let mid = 8192;
        ctx.ledger()
            .join(descriptor("10.0.0.1:8000", "10.0.0.1:7946", 0, mid - 1, true));
        ctx.ledger().join(descriptor(
            "10.0.0.2:8000",
            "10.0.0.2:7946",
            mid,
            SLOT_COUNT - 1,
            true,
        ));

        let expected = if slot < mid {
            "10.0.0.1:8000"
        } else {
            "10.0.0.2:8000"
        };
        let resolved = ctx.select_cluster_node("key", true).expect("select failed");
        assert_eq!(resolved, Some(expected.to_string()));
    }

    #[test]
    fn test_select_fails_while_cluster_not_ready() {
        let (ctx, _) = standalone();
        // Coverage ends at 16382: one slot uncovered.
        ctx.ledger().join(descriptor(
            "10.0.0.1:8000",
            "10.0.0.1:7946",
            0,
            SLOT_COUNT - 2,
            true,
        ));
        assert_eq!(ctx.ledger().readiness(), Readiness::NotReady);

        let err = ctx.select_cluster_node("key", true).unwrap_err();
        assert!(matches!(err, RoutingError::ClusterNotReady("NOT_READY")));
    }

    #[test]
    fn test_select_fails_with_no_leaders() {
        let (ctx, _) = standalone();

        let err = ctx.select_cluster_node("key", true).unwrap_err();
        assert!(matches!(err, RoutingError::ClusterNotReady("ERROR")));
    }

    // ============================================================
    // ROUTE DECISIONS
    // ============================================================

    #[test]
    fn test_route_serves_locally_when_standalone() {
        let (ctx, _) = standalone();

        let decision = ctx.route("key", true).expect("route failed");
        assert_eq!(decision, None);
    }

    #[test]
    fn test_route_redirects_to_owner() {
        let slot = slot_for_key("key");
        let table = Arc::new(KvTable::new());

        // This node leads every slot except the key's; the remote node leads
        // the rest, so together the cover is exact.
        let (begin, end, remote_begin, remote_end) = if slot == 0 {
            (1, SLOT_COUNT - 1, 0, 0)
        } else {
            (0, slot - 1, slot, SLOT_COUNT - 1)
        };
        let ctx = RoutingContext::new(table, None, "127.0.0.1:8000".to_string(), begin, end);
        ctx.set_cluster(Arc::new(EnabledStub), "127.0.0.1:7946".to_string());
        ctx.ledger().update(descriptor(
            "10.0.0.9:8000",
            "10.0.0.9:7946",
            remote_begin,
            remote_end,
            true,
        ));
        assert_eq!(ctx.ledger().readiness(), Readiness::Ok);

        let decision = ctx.route("key", false).expect("route failed");
        assert_eq!(decision, Some("10.0.0.9:8000".to_string()));
    }

    #[test]
    fn test_route_rejects_write_without_leadership() {
        let (ctx, _) = replicated(false);

        let err = ctx.route("key", true).unwrap_err();
        assert!(matches!(err, RoutingError::NotLeader));
    }

    // ============================================================
    // COMMAND EXECUTION
    // ============================================================

    #[tokio::test]
    async fn test_process_cmd_direct_when_no_replication() {
        let (ctx, table) = standalone();

        let cmd = Command::Set {
            key: "a".to_string(),
            value: "1".to_string(),
        };
        ctx.process_cmd(&cmd, false).await.expect("apply failed");

        assert_eq!(table.get("a"), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_process_cmd_through_replication() {
        let (ctx, table) = replicated(true);

        let cmd = Command::Set {
            key: "a".to_string(),
            value: "1".to_string(),
        };
        ctx.process_cmd(&cmd, false).await.expect("apply failed");

        assert_eq!(table.get("a"), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_read_bypasses_replication() {
        let (ctx, table) = replicated(true);
        table.set("a", "1");

        let cmd = Command::Get {
            key: "a".to_string(),
        };
        let value = ctx.process_cmd(&cmd, true).await.expect("read failed");

        assert_eq!(value, Some("1".to_string()));
    }

    #[test]
    fn test_replica_join_requires_replication() {
        let (ctx, _) = standalone();

        let err = ctx.replica_join("127.0.0.1:9001").unwrap_err();
        assert!(matches!(err, RoutingError::NoReplication));
    }

    // ============================================================
    // OVERLAY EVENT GLUE
    // ============================================================

    #[test]
    fn test_peer_joined_registers_descriptor() {
        let (ctx, _) = standalone();

        let meta = descriptor("10.0.0.1:8000", "10.0.0.1:7946", 0, SLOT_COUNT - 1, true)
            .encode_meta()
            .unwrap();
        ctx.peer_joined("peer-1", &meta);

        assert_eq!(ctx.ledger().node_count(), 1);
        assert_eq!(ctx.ledger().readiness(), Readiness::Ok);
    }

    #[test]
    fn test_undecodable_metadata_is_dropped() {
        let (ctx, _) = standalone();

        ctx.peer_joined("peer-1", b"\xff not json");
        ctx.peer_updated("peer-1", b"\xff not json");

        assert_eq!(ctx.ledger().node_count(), 0);
    }

    #[test]
    fn test_peer_left_removes_descriptor() {
        let (ctx, _) = standalone();
        let d = descriptor("10.0.0.1:8000", "10.0.0.1:7946", 0, SLOT_COUNT - 1, true);
        let meta = d.encode_meta().unwrap();

        ctx.peer_joined("peer-1", &meta);
        assert_eq!(ctx.ledger().node_count(), 1);

        ctx.peer_left("peer-1", &meta);
        assert_eq!(ctx.ledger().node_count(), 0);
        assert_eq!(ctx.ledger().readiness(), Readiness::Error);
    }

    #[test]
    fn test_leadership_change_updates_own_ledger_entry() {
        let (ctx, _) = replicated(false);
        ctx.set_cluster(Arc::new(EnabledStub), "127.0.0.1:7946".to_string());
        assert_eq!(ctx.ledger().readiness(), Readiness::Error);

        ctx.leadership_changed(true);

        assert!(ctx.is_leader());
        assert_eq!(ctx.ledger().readiness(), Readiness::Ok);
    }
}
