mod common;

use std::sync::Arc;
use std::time::Duration;

use avalanche_db::MemDb;
use avalanche_ids::Id;
use avalanche_snow::{
    BootstrapConfig, Bootstrapper, ChannelSender, ConsensusContext, EngineState, Getter, Handler,
    Message, OutboundMessage, PollConfig, StartupConfig, StartupTracker, Validator, ValidatorSet,
};
use common::{beacons, drain, node, Dag, TestVm};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Chain {
    handler: Handler,
    inbox: mpsc::Sender<Message>,
    results: mpsc::UnboundedReceiver<avalanche_utils::Bag<Id>>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    ctx: ConsensusContext,
    vm: TestVm,
}

fn chain(dag: Arc<Dag>, validators: Arc<ValidatorSet>, config: BootstrapConfig) -> Chain {
    let ctx = ConsensusContext::new(Id::from_hash(b"chain"));
    let vm = TestVm::new(dag);
    let (sender, outbound) = ChannelSender::new();
    let sender = Arc::new(sender);
    let startup = StartupTracker::from_config(validators.clone(), &StartupConfig::default());
    let bootstrapper = Bootstrapper::new(
        config.clone(),
        ctx.clone(),
        Arc::new(MemDb::new()),
        Arc::new(vm.clone()),
        sender.clone(),
        validators.clone(),
        startup,
    );
    let getter = Getter::new(Arc::new(vm.clone()), sender.clone(), &config);
    let poll_config = PollConfig {
        sample_size: 3,
        ..Default::default()
    };
    let (handler, inbox, results) = Handler::new(
        ctx.clone(),
        bootstrapper,
        getter,
        validators,
        sender,
        &poll_config,
    );
    Chain {
        handler,
        inbox,
        results,
        outbound,
        ctx,
        vm,
    }
}

#[tokio::test]
async fn test_bootstrap_then_poll() {
    avalanche_utils::logging::try_init(&avalanche_utils::LogConfig::default());

    let mut dag = Dag::new();
    let tx = dag.tx("tx", &[]);
    let genesis = dag.vertex("genesis", &[], &[]);
    let a = dag.vertex("a", &[genesis], &[tx]);
    let b = dag.vertex("b", &[genesis], &[]);
    let stop = dag.vertex("stop", &[a, b], &[]);
    let dag = Arc::new(dag);

    let config = BootstrapConfig {
        frontier_sample_size: 3,
        frontier_alpha: 2,
        ..Default::default()
    };
    let Chain {
        handler,
        inbox,
        mut results,
        mut outbound,
        ctx,
        vm,
    } = chain(dag.clone(), beacons(3), config.clone());
    let task = tokio::spawn(handler.run());

    let (remote_sender, mut remote_outbound) = ChannelSender::new();
    let remote = Getter::new(
        Arc::new(TestVm::with_all_accepted(dag)),
        Arc::new(remote_sender),
        &config,
    );

    // A query before bootstrapping is dropped.
    inbox.send(Message::PushQuery { container_id: stop }).await.unwrap();
    inbox.send(Message::Start { request_id: 0 }).await.unwrap();
    for i in 1..=3 {
        inbox.send(Message::Connected(node(i))).await.unwrap();
    }

    let bootstrap = async {
        while ctx.state() != EngineState::NormalOp {
            let Ok(msg) = timeout(Duration::from_millis(50), outbound.recv()).await else {
                continue;
            };
            match msg.unwrap() {
                OutboundMessage::GetAcceptedFrontier { peers, request_id } => {
                    for peer in peers {
                        remote.get_accepted_frontier(peer, request_id);
                        let Some(OutboundMessage::AcceptedFrontier { container_ids, .. }) =
                            remote_outbound.recv().await
                        else {
                            panic!("expected AcceptedFrontier");
                        };
                        inbox
                            .send(Message::AcceptedFrontier {
                                peer,
                                request_id,
                                container_ids,
                            })
                            .await
                            .unwrap();
                    }
                }
                OutboundMessage::GetAncestors {
                    peer,
                    request_id,
                    vertex_id,
                } => {
                    remote.get_ancestors(peer, request_id, vertex_id).unwrap();
                    let Some(OutboundMessage::Ancestors { containers, .. }) =
                        remote_outbound.recv().await
                    else {
                        panic!("expected Ancestors");
                    };
                    inbox
                        .send(Message::Ancestors {
                            peer,
                            request_id,
                            containers,
                        })
                        .await
                        .unwrap();
                }
                other => panic!("unexpected message during bootstrap: {other:?}"),
            }
        }
    };
    timeout(Duration::from_secs(10), bootstrap)
        .await
        .expect("bootstrap stalled");
    assert_eq!(vm.linearized(), Some(stop));
    assert_eq!(vm.accepted().last(), Some(&stop));

    inbox.send(Message::PushQuery { container_id: stop }).await.unwrap();
    let (peers, request_id) = match timeout(Duration::from_secs(5), outbound.recv()).await {
        Ok(Some(OutboundMessage::PushQuery {
            peers,
            request_id,
            container_id,
        })) => {
            assert_eq!(container_id, stop);
            (peers, request_id)
        }
        other => panic!("expected PushQuery, got {other:?}"),
    };
    for peer in peers {
        inbox
            .send(Message::Chits {
                peer,
                request_id,
                vote: stop,
            })
            .await
            .unwrap();
    }

    let result = timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("poll never finished")
        .unwrap();
    assert_eq!(result.count(&stop), 3);
    assert_eq!(result.len(), 3);

    inbox.send(Message::Shutdown).await.unwrap();
    task.await.unwrap().unwrap();
}

#[test]
fn test_handle_validator_changes() {
    let mut dag = Dag::new();
    let v0 = dag.vertex("v0", &[], &[]);
    let validators = Arc::new(ValidatorSet::from_validators([Validator::new(node(1), 10)]));
    let config = BootstrapConfig {
        stop_vertex_id: Some(v0),
        ..Default::default()
    };
    let mut chain = chain(Arc::new(dag), validators.clone(), config);

    chain.handler.handle(Message::Start { request_id: 0 }).unwrap();
    chain.handler.handle(Message::Connected(node(2))).unwrap();
    assert!(drain(&mut chain.outbound).is_empty(), "node 2 has no stake yet");

    // Duplicates and unknown validators are ignored.
    chain
        .handler
        .handle(Message::ValidatorAdded(Validator::new(node(1), 5)))
        .unwrap();
    chain
        .handler
        .handle(Message::ValidatorRemoved(node(7)))
        .unwrap();
    assert_eq!(validators.weight(&node(1)), 10);

    chain
        .handler
        .handle(Message::ValidatorAdded(Validator::new(node(2), 20)))
        .unwrap();
    assert_eq!(chain.ctx.state(), EngineState::Bootstrapping);
    assert!(chain.handler.bootstrapper().is_bootstrapping());
    // node 2 became a connected beacon with enough stake to start.
    assert_eq!(
        drain(&mut chain.outbound),
        vec![OutboundMessage::GetAncestors {
            peer: node(2),
            request_id: 0,
            vertex_id: v0,
        }]
    );

    chain.handler.handle(Message::PushQuery { container_id: v0 }).unwrap();
    assert!(chain.handler.polls().is_empty());
}
