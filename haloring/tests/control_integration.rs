//! Concurrent control-plane behaviour: snapshots, counts, pause, and run
//! supersession against a live ring.

mod common;

use std::time::Duration;

use common::{glider_8x8, random_board, reference, Ring};
use haloring::board::Board;
use haloring::protocol::{
    methods, AliveCellsCountResponse, CurrentWorldResponse, Empty, PauseResponse, RunGolResponse,
};
use haloring::rpc::RpcError;

async fn get_world(ring: &Ring) -> Result<CurrentWorldResponse, RpcError> {
    ring.broker.call(methods::BROKER_GET_WORLD, &Empty {}).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_control_calls_before_first_run_are_rejected() {
    let ring = Ring::start(2).await;

    let result = get_world(&ring).await;
    match result {
        Err(RpcError::Remote(message)) => assert_eq!(message, "no run in progress"),
        other => panic!("expected remote error, got {other:?}"),
    }

    ring.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_count_matches_snapshot_popcount() {
    let board = random_board(8, 8, 5);
    let ring = Ring::start(2).await;

    ring.run_gol(&board, 3, 1).await.unwrap();

    let snapshot = get_world(&ring).await.unwrap();
    let count: AliveCellsCountResponse = ring
        .broker
        .call(methods::BROKER_COUNT_ALIVE_CELLS, &Empty {})
        .await
        .unwrap();

    assert_eq!(snapshot.current_turn, 3);
    assert_eq!(count.current_turn, 3);
    assert_eq!(snapshot.world, reference(&board, 3));
    assert_eq!(count.count, snapshot.world.alive_count());

    ring.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_ignores_workers_outside_the_ring() {
    // 2 rows over 4 connected workers: only 2 join the ring, and the idle
    // pair must not drag the reconciled turn down to zero.
    let board = random_board(6, 2, 13);
    let ring = Ring::start(4).await;

    ring.run_gol(&board, 3, 1).await.unwrap();

    let snapshot = get_world(&ring).await.unwrap();
    assert_eq!(snapshot.current_turn, 3);
    assert_eq!(snapshot.world, reference(&board, 3));

    ring.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_storm_during_run() {
    let glider = glider_8x8();
    let turns = 3000;
    let ring = Ring::start(4).await;

    let run_client = ring.broker.clone();
    let board = glider.clone();
    let run = tokio::spawn(async move {
        run_client
            .call::<_, RunGolResponse>(
                methods::BROKER_RUN_GOL,
                &haloring::protocol::RunGolRequest {
                    board,
                    current_turn: 0,
                    turns,
                    threads: 2,
                },
            )
            .await
    });

    // The run may not have registered its board yet; poll until the first
    // snapshot lands.
    let mut first = None;
    for _ in 0..100 {
        match get_world(&ring).await {
            Ok(snapshot) => {
                first = Some(snapshot);
                break;
            }
            Err(RpcError::Remote(message)) if message == "no run in progress" => {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Err(other) => panic!("snapshot failed: {other}"),
        }
    }
    let first = first.expect("run never became visible");

    // Every reported world must equal the reference at its reported turn,
    // the turn must never decrease, and "server not sync" must not happen.
    let mut references: Vec<Board> = vec![glider.clone()];
    let mut check = |snapshot: &CurrentWorldResponse| {
        let turn = snapshot.current_turn as usize;
        while references.len() <= turn {
            let next = haloring::engine::step(references.last().unwrap());
            references.push(next);
        }
        assert_eq!(
            &snapshot.world, &references[turn],
            "snapshot diverges from reference at turn {turn}"
        );
    };

    check(&first);
    let mut last_turn = first.current_turn;
    for _ in 0..50 {
        let snapshot = get_world(&ring).await.expect("snapshot during run failed");
        assert!(
            snapshot.current_turn >= last_turn,
            "turn went backwards: {} -> {}",
            last_turn,
            snapshot.current_turn
        );
        check(&snapshot);
        last_turn = snapshot.current_turn;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let final_board = run.await.unwrap().unwrap();
    assert_eq!(final_board.current_turn, turns);
    assert_eq!(final_board.board, reference(&glider, turns));

    ring.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_and_resume_conserve_the_run() {
    let board = random_board(8, 8, 42);
    let turns = 500;
    let ring = Ring::start(2).await;

    let run_client = ring.broker.clone();
    let run_board = board.clone();
    let run = tokio::spawn(async move {
        run_client
            .call::<_, RunGolResponse>(
                methods::BROKER_RUN_GOL,
                &haloring::protocol::RunGolRequest {
                    board: run_board,
                    current_turn: 0,
                    turns,
                    threads: 1,
                },
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    let paused_at: PauseResponse = ring
        .broker
        .call(methods::BROKER_PAUSE, &Empty {})
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let resumed_at: PauseResponse = ring
        .broker
        .call(methods::BROKER_PAUSE, &Empty {})
        .await
        .unwrap();

    // The in-flight generation may land after the pause reply, but a
    // paused ring must not advance beyond it.
    assert!(resumed_at.current_turn >= paused_at.current_turn);
    assert!(
        resumed_at.current_turn - paused_at.current_turn <= 1,
        "ring advanced while paused: {} -> {}",
        paused_at.current_turn,
        resumed_at.current_turn
    );

    let final_board = run.await.unwrap().unwrap();
    assert_eq!(final_board.current_turn, turns);
    assert_eq!(final_board.board, reference(&board, turns));

    ring.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fresh_run_supersedes_active_run() {
    let board = random_board(8, 8, 9);
    let ring = Ring::start(2).await;

    let run_client = ring.broker.clone();
    let first_board = board.clone();
    let first = tokio::spawn(async move {
        run_client
            .call::<_, RunGolResponse>(
                methods::BROKER_RUN_GOL,
                &haloring::protocol::RunGolRequest {
                    board: first_board,
                    current_turn: 0,
                    turns: 1_000_000,
                    threads: 1,
                },
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The second run cancels the first and produces a correct result on
    // the same, re-initialised workers.
    let second = ring.run_gol(&board, 4, 1).await.unwrap();
    assert_eq!(second.board, reference(&board, 4));

    match first.await.unwrap() {
        Err(RpcError::Remote(message)) => assert_eq!(message, "broker closed"),
        other => panic!("superseded run should fail with broker closed, got {other:?}"),
    }

    ring.stop();
}
