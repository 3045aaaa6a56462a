//! Cluster Module Tests
//!
//! Validates slot hashing, descriptor metadata encoding, and the ledger's
//! readiness derivation.
//!
//! ## Test Scopes
//! - **Slots**: determinism, range bounds, distribution across buckets.
//! - **NodeDescriptor**: lossless metadata round-trips and omitted-field decoding.
//! - **SlotLedger**: join/update/leave semantics and readiness under full,
//!   partial, and empty leader coverage.

#[cfg(test)]
mod tests {
    use crate::cluster::ledger::SlotLedger;
    use crate::cluster::slots::{slot_for_key, SLOT_COUNT};
    use crate::cluster::types::{NodeDescriptor, Readiness};

    fn descriptor(addr: &str, begin: u32, end: u32, leader: bool) -> NodeDescriptor {
        NodeDescriptor {
            api_addr: format!("{}-api", addr),
            addr: addr.to_string(),
            slot_begin: begin,
            slot_end: end,
            leader,
        }
    }

    // ============================================================
    // SLOT HASHING TESTS
    // ============================================================

    #[test]
    fn test_slot_is_deterministic() {
        let s1 = slot_for_key("somekey");
        let s2 = slot_for_key("somekey");
        assert_eq!(s1, s2, "the same key should always map to the same slot");
    }

    #[test]
    fn test_slot_is_within_range() {
        for i in 0..1000 {
            let key = format!("test_key_{}", i);
            let slot = slot_for_key(&key);
            assert!(slot < SLOT_COUNT, "slot {} should be < {}", slot, SLOT_COUNT);
        }
    }

    #[test]
    fn test_slot_distribution() {
        // Ensure the checksum doesn't collapse keys onto a few buckets.
        let mut slot_counts = std::collections::HashMap::new();

        for i in 0..10000 {
            let key = format!("key_{}", i);
            *slot_counts.entry(slot_for_key(&key)).or_insert(0) += 1;
        }

        assert!(
            slot_counts.len() > 4000,
            "10000 keys should land in well over 4000 distinct slots, got {}",
            slot_counts.len()
        );
    }

    #[test]
    fn test_slot_empty_key() {
        // Empty keys are legal input to the hash; just has to stay in range.
        assert!(slot_for_key("") < SLOT_COUNT);
    }

    #[test]
    fn test_checksum_differs_between_keys() {
        use crate::cluster::slots::checksum;
        assert_ne!(checksum(b"key-a"), checksum(b"key-b"));
    }

    #[test]
    fn test_slot_known_answers() {
        use crate::cluster::slots::checksum;

        // Pinned against the reference checksum values so an encoding drift
        // (polynomial form, reflection, init/xorout) cannot pass unnoticed.
        assert_eq!(checksum(b""), 0x0000_0000);
        assert_eq!(checksum(b"foo"), 0x59DC_F795);
        assert_eq!(checksum(b"bar"), 0x5382_FECE);
        assert_eq!(checksum(b"user:1000"), 0x2FE2_7345);

        assert_eq!(slot_for_key("foo"), 14229);
        assert_eq!(slot_for_key("bar"), 16078);
        assert_eq!(slot_for_key("somekey"), 13267);
        assert_eq!(slot_for_key("user:1000"), 13125);
        assert_eq!(slot_for_key("hello world"), 12038);
    }

    // ============================================================
    // NODE DESCRIPTOR TESTS
    // ============================================================

    #[test]
    fn test_descriptor_meta_roundtrip() {
        let node = descriptor("10.0.0.1:9000", 100, 8191, true);

        let meta = node.encode_meta().expect("encode failed");
        let decoded = NodeDescriptor::decode_meta(&meta).expect("decode failed");

        assert_eq!(decoded, node);
    }

    #[test]
    fn test_descriptor_meta_omits_empty_fields() {
        let node = NodeDescriptor {
            addr: "n1".to_string(),
            ..Default::default()
        };

        let meta = node.encode_meta().unwrap();
        let text = String::from_utf8(meta).unwrap();

        assert!(text.contains("addr"));
        assert!(!text.contains("slotBegin"), "zero fields should be omitted: {}", text);
        assert!(!text.contains("leader"), "false leader flag should be omitted: {}", text);
    }

    #[test]
    fn test_descriptor_decode_tolerates_missing_fields() {
        let decoded = NodeDescriptor::decode_meta(b"{}").expect("empty object should decode");
        assert_eq!(decoded, NodeDescriptor::default());
    }

    #[test]
    fn test_descriptor_decode_rejects_garbage() {
        assert!(NodeDescriptor::decode_meta(b"\x00\x01\x02").is_err());
    }

    #[test]
    fn test_descriptor_covers_slot() {
        let node = descriptor("n1", 100, 200, true);

        assert!(node.covers_slot(100));
        assert!(node.covers_slot(150));
        assert!(node.covers_slot(200));
        assert!(!node.covers_slot(99));
        assert!(!node.covers_slot(201));
    }

    // ============================================================
    // SLOT LEDGER — MEMBERSHIP MUTATIONS
    // ============================================================

    #[test]
    fn test_ledger_starts_unready() {
        let ledger = SlotLedger::new();
        assert!(!ledger.enabled());
        assert_eq!(ledger.readiness(), Readiness::Error);
    }

    #[test]
    fn test_ledger_join_ignores_empty_address() {
        let ledger = SlotLedger::new();
        ledger.join(NodeDescriptor::default());
        assert_eq!(ledger.node_count(), 0);
    }

    #[test]
    fn test_ledger_join_is_idempotent() {
        let ledger = SlotLedger::new();
        let node = descriptor("n1", 0, 16383, true);

        ledger.join(node.clone());
        ledger.join(node);

        assert_eq!(ledger.node_count(), 1);
    }

    #[test]
    fn test_ledger_rejects_out_of_keyspace_descriptor() {
        let ledger = SlotLedger::new();

        // Gossiped blobs come off the network and can claim any range; the
        // keyspace bound is enforced at ingest so readiness derivation never
        // arithmetics on a hostile slot_end.
        let hostile = NodeDescriptor::decode_meta(
            br#"{"addr":"n1","apiAddr":"n1-api","slotEnd":4294967295,"leader":true}"#,
        )
        .expect("decode itself is tolerant, validation happens at ingest");
        assert!(!hostile.valid_slot_range());

        ledger.join(hostile.clone());
        ledger.join(descriptor("n2", 0, 16383, true));
        ledger.update(hostile);

        assert_eq!(ledger.node_count(), 1);
        assert!(ledger.enabled());
    }

    #[test]
    fn test_ledger_rejects_inverted_slot_range() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 9000, 100, true));

        assert_eq!(ledger.node_count(), 0);
        assert_eq!(ledger.readiness(), Readiness::Error);
    }

    #[test]
    fn test_ledger_update_overwrites_in_place() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16383, false));
        assert_eq!(ledger.readiness(), Readiness::Error);

        // Same address, now a leader: must update the existing entry.
        ledger.update(descriptor("n1", 0, 16383, true));

        assert_eq!(ledger.node_count(), 1);
        assert_eq!(ledger.readiness(), Readiness::Ok);
    }

    #[test]
    fn test_ledger_update_unknown_node_joins() {
        let ledger = SlotLedger::new();
        ledger.update(descriptor("n1", 0, 16383, true));

        assert_eq!(ledger.node_count(), 1);
        assert!(ledger.enabled());
    }

    #[test]
    fn test_ledger_leave_removes_and_recomputes() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 8191, true));
        ledger.join(descriptor("n2", 8192, 16383, true));
        assert!(ledger.enabled());

        ledger.leave(descriptor("n2", 8192, 16383, true));

        assert_eq!(ledger.node_count(), 1);
        assert_eq!(ledger.readiness(), Readiness::NotReady);
    }

    #[test]
    fn test_ledger_leave_unknown_node_is_noop() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16383, true));
        ledger.leave(descriptor("ghost", 0, 0, false));

        assert_eq!(ledger.node_count(), 1);
        assert!(ledger.enabled());
    }

    // ============================================================
    // SLOT LEDGER — READINESS DERIVATION
    // ============================================================

    #[test]
    fn test_readiness_ok_with_full_two_node_cover() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 8191, true));
        ledger.join(descriptor("n2", 8192, 16383, true));

        assert_eq!(ledger.readiness(), Readiness::Ok);
        assert!(ledger.enabled());
    }

    #[test]
    fn test_readiness_error_with_no_leaders() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16383, false));

        assert_eq!(ledger.readiness(), Readiness::Error);
    }

    #[test]
    fn test_readiness_not_ready_when_end_short() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16382, true));

        assert_eq!(ledger.readiness(), Readiness::NotReady);
    }

    #[test]
    fn test_readiness_not_ready_when_begin_nonzero() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 1, 16383, true));

        assert_eq!(ledger.readiness(), Readiness::NotReady);
    }

    #[test]
    fn test_readiness_not_ready_on_gap() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 8000, true));
        ledger.join(descriptor("n2", 8192, 16383, true));

        assert_eq!(ledger.readiness(), Readiness::NotReady);
    }

    #[test]
    fn test_readiness_not_ready_on_overlap() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 9000, true));
        ledger.join(descriptor("n2", 8192, 16383, true));

        assert_eq!(ledger.readiness(), Readiness::NotReady);
    }

    #[test]
    fn test_readiness_ok_with_three_leaders_out_of_order_join() {
        let ledger = SlotLedger::new();
        // Joins arrive unordered; the ledger must sort by slot begin.
        ledger.join(descriptor("n3", 11000, 16383, true));
        ledger.join(descriptor("n1", 0, 5000, true));
        ledger.join(descriptor("n2", 5001, 10999, true));

        assert!(ledger.enabled());
        let leaders = ledger.leaders();
        assert_eq!(leaders.len(), 3);
        assert_eq!(leaders[0].addr, "n1");
        assert_eq!(leaders[2].addr, "n3");
    }

    #[test]
    fn test_followers_do_not_affect_readiness() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16383, true));
        // A follower replica with an overlapping range is fine.
        ledger.join(descriptor("n1-replica", 0, 16383, false));

        assert!(ledger.enabled());
        assert_eq!(ledger.leaders().len(), 1);
    }

    // ============================================================
    // SLOT LEDGER — FIND NODE
    // ============================================================

    #[test]
    fn test_find_node_resolves_owner() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 8191, true));
        ledger.join(descriptor("n2", 8192, 16383, true));

        let (addr, status) = ledger.find_node("somekey", true);

        assert_eq!(status, Readiness::Ok);
        assert!(
            addr == "n1-api" || addr == "n2-api",
            "owner must be one of the two leaders, got {:?}",
            addr
        );
    }

    #[test]
    fn test_find_node_consistent_with_slot() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 8191, true));
        ledger.join(descriptor("n2", 8192, 16383, true));

        let slot = slot_for_key("somekey");
        let expected = if slot <= 8191 { "n1-api" } else { "n2-api" };

        let (addr, _) = ledger.find_node("somekey", true);
        assert_eq!(addr, expected);
    }

    #[test]
    fn test_find_node_refuses_while_not_ready() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16382, true));

        let (addr, status) = ledger.find_node("somekey", true);

        assert_eq!(addr, "");
        assert_eq!(status, Readiness::NotReady);
    }

    #[test]
    fn test_find_node_refuses_on_empty_ledger() {
        let ledger = SlotLedger::new();

        let (addr, status) = ledger.find_node("somekey", true);

        assert_eq!(addr, "");
        assert_eq!(status, Readiness::Error);
    }

    #[test]
    fn test_find_node_follower_allowed_for_reads() {
        let ledger = SlotLedger::new();
        ledger.join(descriptor("n1", 0, 16383, true));

        let key = "anything";
        let slot = slot_for_key(key);

        // A follower covering the slot is eligible when leadership isn't required.
        let mut follower = descriptor("n1-replica", 0, 16383, false);
        follower.api_addr = "replica-api".to_string();
        ledger.join(follower);

        let (addr, status) = ledger.find_node(key, false);
        assert_eq!(status, Readiness::Ok);
        assert!(addr == "n1-api" || addr == "replica-api", "slot {} owner: {}", slot, addr);
    }
}
