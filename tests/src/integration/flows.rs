//! # Fire Flows
//!
//! Peer → coordinator and coordinator → peer traffic over the memory
//! network: ordering, targeting, rate limiting, middleware on both ends and
//! recovery after lost frames or a reconnect.

#[cfg(test)]
mod tests {
    use crate::{Cluster, ALICE, BOB, SERVER};
    use bridge_net::adapters::MemoryNetwork;
    use bridge_net::{
        Bridge, BridgeConfig, BridgeError, BridgeTree, MiddlewareChain, MiddlewareError,
        NodeBuilder, Payload, PeerId, ReplicationRate,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    type Inbox = Arc<Mutex<Vec<(PeerId, Payload)>>>;

    fn listen(bridge: &Bridge) -> Inbox {
        let inbox: Inbox = Arc::default();
        let sink = inbox.clone();
        bridge
            .connect(move |from, args| sink.lock().push((from, args.to_vec())))
            .expect("bridge is live");
        inbox
    }

    fn numbers(inbox: &Inbox) -> Vec<i64> {
        inbox
            .lock()
            .iter()
            .filter_map(|(_, args)| args.first().and_then(Value::as_i64))
            .collect()
    }

    fn hz(rate: u32) -> ReplicationRate {
        ReplicationRate::per_second(rate).expect("non-zero rate")
    }

    // =============================================================================
    // ORDERING AND BATCHING
    // =============================================================================

    #[test]
    fn test_peer_fires_arrive_in_order_in_one_frame() {
        let cluster = Cluster::new();
        let inbox = listen(&cluster.server.create_bridge("Move", BridgeConfig::new()).unwrap());
        let moves = cluster
            .alice
            .create_bridge("Move", BridgeConfig::new().replication_rate(hz(10)))
            .unwrap()
            .into_peer()
            .unwrap();

        for step in 0..20 {
            moves.fire(vec![json!(step)]).unwrap();
        }
        cluster.alice.tick(Duration::from_millis(100));

        assert_eq!(numbers(&inbox), (0..20).collect::<Vec<_>>());
        assert_eq!(cluster.network.frames_to(SERVER), 1);
        assert_eq!(cluster.network.packets_to(SERVER), 20);
    }

    #[test]
    fn test_rate_limit_holds_packets_until_interval() {
        let cluster = Cluster::new();
        let inbox = listen(&cluster.server.create_bridge("Slow", BridgeConfig::new()).unwrap());
        let slow = cluster
            .alice
            .create_bridge("Slow", BridgeConfig::new().replication_rate(hz(4)))
            .unwrap()
            .into_peer()
            .unwrap();

        slow.fire(vec![json!(1)]).unwrap();
        for _ in 0..4 {
            cluster.alice.tick(Duration::from_millis(50));
        }
        assert!(inbox.lock().is_empty());
        assert_eq!(cluster.alice.queue_snapshot().outbound.len(), 1);

        cluster.alice.tick(Duration::from_millis(50));
        assert_eq!(numbers(&inbox), vec![1]);
        assert!(cluster.alice.queue_snapshot().outbound.is_empty());
    }

    #[test]
    fn test_channels_flush_independently() {
        let cluster = Cluster::new();
        let fast_inbox = listen(&cluster.server.create_bridge("Fast", BridgeConfig::new()).unwrap());
        let slow_inbox = listen(&cluster.server.create_bridge("Slow", BridgeConfig::new()).unwrap());
        let fast = cluster
            .alice
            .create_bridge("Fast", BridgeConfig::new().replication_rate(hz(20)))
            .unwrap()
            .into_peer()
            .unwrap();
        let slow = cluster
            .alice
            .create_bridge("Slow", BridgeConfig::new().replication_rate(hz(5)))
            .unwrap()
            .into_peer()
            .unwrap();
        assert_eq!(cluster.alice.base_interval(), Duration::from_millis(50));

        fast.fire(vec![json!(1)]).unwrap();
        slow.fire(vec![json!(2)]).unwrap();
        cluster.alice.tick(Duration::from_millis(50));
        assert_eq!(numbers(&fast_inbox), vec![1]);
        assert!(slow_inbox.lock().is_empty());

        for _ in 0..3 {
            cluster.alice.tick(Duration::from_millis(50));
        }
        assert_eq!(numbers(&slow_inbox), vec![2]);
    }

    // =============================================================================
    // COORDINATOR TARGETING
    // =============================================================================

    #[test]
    fn test_broadcast_resolves_peers_at_flush_time() {
        let cluster = Cluster::new();
        let alice_inbox = listen(&cluster.alice.create_bridge("News", BridgeConfig::new()).unwrap());
        let bob_inbox = listen(&cluster.bob.create_bridge("News", BridgeConfig::new()).unwrap());
        let news = cluster
            .server
            .create_bridge("News", BridgeConfig::new())
            .unwrap()
            .into_coordinator()
            .unwrap();

        news.fire_all(vec![json!(1)]).unwrap();
        // Bob leaves before the flush.
        cluster.server.remove_peer(BOB);
        cluster.server.tick(Duration::from_secs(1));

        assert_eq!(numbers(&alice_inbox), vec![1]);
        assert!(bob_inbox.lock().is_empty());
    }

    #[test]
    fn test_fire_to_all_except_reports_targets() {
        let cluster = Cluster::new();
        let alice_inbox = listen(&cluster.alice.create_bridge("News", BridgeConfig::new()).unwrap());
        let bob_inbox = listen(&cluster.bob.create_bridge("News", BridgeConfig::new()).unwrap());
        let news = cluster
            .server
            .create_bridge("News", BridgeConfig::new())
            .unwrap()
            .into_coordinator()
            .unwrap();

        let targeted = news.fire_to_all_except(&[BOB], vec![json!(7)]).unwrap();
        assert_eq!(targeted, vec![ALICE]);
        cluster.server.tick(Duration::from_secs(1));

        assert_eq!(numbers(&alice_inbox), vec![7]);
        assert!(bob_inbox.lock().is_empty());
    }

    #[test]
    fn test_unreachable_peer_reported_not_fatal() {
        let cluster = Cluster::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        cluster.server.on_error(move |e| sink.lock().push(e.clone()));

        let ghost = PeerId::new(42);
        cluster.server.add_peer(ghost);
        let alice_inbox = listen(&cluster.alice.create_bridge("News", BridgeConfig::new()).unwrap());
        let news = cluster
            .server
            .create_bridge("News", BridgeConfig::new())
            .unwrap()
            .into_coordinator()
            .unwrap();

        news.fire_all(vec![json!(1)]).unwrap();
        let report = cluster.server.tick(Duration::from_secs(1));

        assert_eq!(numbers(&alice_inbox), vec![1]);
        assert_eq!(report.frames_sent, 2);
        assert!(matches!(errors.lock().as_slice(), [BridgeError::Transport(_)]));
    }

    // =============================================================================
    // MIDDLEWARE ON BOTH ENDS
    // =============================================================================

    #[test]
    fn test_outbound_and_inbound_middleware_compose() {
        let cluster = Cluster::new();
        let tag = |label: &'static str| {
            move |mut args: Payload| {
                args.push(json!(label));
                Ok::<_, MiddlewareError>(args)
            }
        };

        let server_chat = cluster
            .server
            .create_bridge(
                "Chat",
                BridgeConfig::new().inbound_middleware(MiddlewareChain::new().then(tag("in"))),
            )
            .unwrap();
        let inbox = listen(&server_chat);

        let chat = cluster
            .alice
            .create_bridge(
                "Chat",
                BridgeConfig::new().outbound_middleware(
                    MiddlewareChain::new().then(tag("out-1")).then(tag("out-2")),
                ),
            )
            .unwrap()
            .into_peer()
            .unwrap();

        chat.fire(vec![json!("hi")]).unwrap();
        cluster.alice.tick(Duration::from_secs(1));

        let got = inbox.lock().clone();
        assert_eq!(
            got,
            vec![(ALICE, vec![json!("hi"), json!("out-1"), json!("out-2"), json!("in")])]
        );
    }

    #[test]
    fn test_nil_policy_per_bridge() {
        let cluster = Cluster::new();
        let inbox = listen(&cluster.server.create_bridge("Loose", BridgeConfig::new()).unwrap());
        let loose = cluster
            .alice
            .create_bridge("Loose", BridgeConfig::new())
            .unwrap()
            .into_peer()
            .unwrap();
        let strict = cluster
            .alice
            .create_bridge("Strict", BridgeConfig::new().allows_nil(false))
            .unwrap()
            .into_peer()
            .unwrap();

        loose.fire(vec![Value::Null, json!(1)]).unwrap();
        assert!(matches!(
            strict.fire(vec![json!(1), Value::Null]),
            Err(BridgeError::NilNotAllowed { index: 1, .. })
        ));
        cluster.alice.tick(Duration::from_secs(1));

        assert_eq!(inbox.lock()[0].1, vec![Value::Null, json!(1)]);
    }

    // =============================================================================
    // IDENTIFIERS AND LIFECYCLE
    // =============================================================================

    #[test]
    fn test_reconnected_peer_understands_next_frame() {
        let network = MemoryNetwork::new();
        let server = network.join(NodeBuilder::coordinator(SERVER)).unwrap();
        server.add_peer(ALICE);
        let ping = server
            .create_bridge("Ping", BridgeConfig::new())
            .unwrap()
            .into_coordinator()
            .unwrap();

        {
            let first = network.join(NodeBuilder::peer(ALICE, SERVER)).unwrap();
            let inbox = listen(&first.create_bridge("Ping", BridgeConfig::new()).unwrap());
            ping.fire_to(ALICE, vec![json!(1)]).unwrap();
            server.tick(Duration::from_secs(1));
            assert_eq!(numbers(&inbox), vec![1]);
        }

        // Same id, fresh node with no memory of earlier frames.
        let second = network.join(NodeBuilder::peer(ALICE, SERVER)).unwrap();
        let inbox = listen(&second.create_bridge("Ping", BridgeConfig::new()).unwrap());
        ping.fire_to(ALICE, vec![json!(2)]).unwrap();
        server.tick(Duration::from_secs(1));
        assert_eq!(numbers(&inbox), vec![2]);
    }

    #[test]
    fn test_lost_frame_does_not_strand_later_packets() {
        let cluster = Cluster::new();
        let inbox = listen(&cluster.server.create_bridge("Chat", BridgeConfig::new()).unwrap());
        let chat = cluster
            .alice
            .create_bridge("Chat", BridgeConfig::new())
            .unwrap()
            .into_peer()
            .unwrap();

        cluster.network.set_dropping(SERVER, true);
        chat.fire(vec![json!(1)]).unwrap();
        cluster.alice.tick(Duration::from_secs(1));
        cluster.network.set_dropping(SERVER, false);

        chat.fire(vec![json!(2)]).unwrap();
        cluster.alice.tick(Duration::from_secs(1));
        assert_eq!(numbers(&inbox), vec![2]);
        assert_eq!(cluster.network.dropped_frames(), 1);
    }

    #[test]
    fn test_destroyed_bridge_drops_inbound_and_queued() {
        let cluster = Cluster::new();
        let server_chat = cluster.server.create_bridge("Chat", BridgeConfig::new()).unwrap();
        let inbox = listen(&server_chat);
        let chat = cluster
            .alice
            .create_bridge("Chat", BridgeConfig::new())
            .unwrap()
            .into_peer()
            .unwrap();

        chat.fire(vec![json!(1)]).unwrap();
        server_chat.destroy().unwrap();
        cluster.alice.tick(Duration::from_secs(1));
        assert!(inbox.lock().is_empty());

        // Recreated under the same name, it receives again.
        let inbox = listen(&cluster.server.create_bridge("Chat", BridgeConfig::new()).unwrap());
        chat.fire(vec![json!(2)]).unwrap();
        chat.destroy().unwrap();
        cluster.alice.tick(Duration::from_secs(1));
        assert!(inbox.lock().is_empty());
    }

    #[test]
    fn test_bridge_tree_on_both_sides() {
        let cluster = Cluster::new();
        let tree = || {
            BridgeTree::new().group(
                "Combat",
                BridgeTree::new()
                    .bridge("Attack", BridgeConfig::new())
                    .bridge("Block", BridgeConfig::new()),
            )
        };
        let server_side = cluster.server.create_bridge_tree(&tree()).unwrap();
        let alice_side = cluster.alice.create_bridge_tree(&tree()).unwrap();
        assert_eq!(
            server_side.keys().cloned().collect::<Vec<_>>(),
            vec!["Combat.Attack".to_string(), "Combat.Block".to_string()]
        );

        let inbox = listen(&server_side["Combat.Block"]);
        let block = alice_side["Combat.Block"].clone().into_peer().unwrap();
        block.fire(vec![json!(5)]).unwrap();
        cluster.alice.tick(Duration::from_secs(1));
        assert_eq!(numbers(&inbox), vec![5]);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let cluster = Cluster::new();
        assert!(cluster.server.receive_bytes(ALICE, b"not json").is_err());
        assert!(cluster
            .server
            .receive_bytes(ALICE, br#"{"p":[]}"#)
            .is_ok());
    }

    // =============================================================================
    // SCHEDULER-DRIVEN
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_bridge_then_receive() {
        let cluster = Cluster::new();
        let _loops = cluster.spawn_schedulers();

        let server = cluster.server.clone();
        let waiter = tokio::spawn(async move { server.wait_for_bridge("Lobby").await });
        tokio::task::yield_now().await;

        cluster
            .server
            .create_bridge("Lobby", BridgeConfig::new())
            .unwrap();
        let lobby = waiter.await.unwrap().unwrap();
        let inbox = listen(&lobby);

        let join = cluster
            .bob
            .create_bridge("Lobby", BridgeConfig::new())
            .unwrap()
            .into_peer()
            .unwrap();
        join.fire(vec![json!(99)]).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(inbox.lock().clone(), vec![(BOB, vec![json!(99)])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staged_rate_change_under_scheduler() {
        let cluster = Cluster::new();
        let inbox = listen(&cluster.server.create_bridge("Beat", BridgeConfig::new()).unwrap());
        let beat = cluster
            .alice
            .create_bridge("Beat", BridgeConfig::new().replication_rate(hz(1)))
            .unwrap()
            .into_peer()
            .unwrap();
        let _loops = cluster.spawn_schedulers();

        beat.set_replication_rate(hz(10)).unwrap();
        beat.fire(vec![json!(1)]).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(beat.replication_rate().unwrap().hz(), 10);
        assert_eq!(numbers(&inbox), vec![1]);
    }
}
